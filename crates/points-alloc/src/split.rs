//! Per-contract attribution of consumed points.

use crate::CohortAllocation;
use points_core::{ContractId, EligibleContract, Points};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

/// Points attributed to one contract.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractSplit {
    pub contract_id: ContractId,
    pub amount: Points,
    pub base_used: Points,
    pub self_used: Points,
    /// Only produced by the sequential split; never persisted.
    pub excellent_used: Points,
}

/// `round(used * amount / total)`, halves rounded up.
fn share(used: Points, amount: Points, total: Points) -> Points {
    if total == 0 {
        return 0;
    }
    let (used, amount, total) = (used as u128, amount as u128, total as u128);
    let rounded = (2 * used * amount + total) / (2 * total);
    // share <= used because amount <= total
    rounded as Points
}

/// Distribute each cohort's funded totals over its contracts by amount.
///
/// Self-first contracts come first in the output, then base-only ones, each in
/// input order. Rounding is per contract and uncorrected, so a cohort's splits
/// may differ from its aggregate by up to one point per contract.
pub fn split_proportional(
    contracts: &[EligibleContract],
    allocation: &CohortAllocation,
) -> Vec<ContractSplit> {
    let mut out = Vec::with_capacity(contracts.len());
    for (self_first, cohort) in [
        (true, &allocation.self_first),
        (false, &allocation.base_only),
    ] {
        let d = cohort.distribution;
        for c in contracts.iter().filter(|c| c.self_first == self_first) {
            out.push(ContractSplit {
                contract_id: c.contract_id.clone(),
                amount: c.amount,
                self_used: share(d.self_used, c.amount, cohort.requested),
                base_used: share(d.base_used, c.amount, cohort.requested),
                excellent_used: 0,
            });
        }
    }
    out
}

/// Earliest work end date first, undated last, then contract id.
fn maturity_order(a: &EligibleContract, b: &EligibleContract) -> Ordering {
    match (a.work_end_date, b.work_end_date) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.contract_id.cmp(&b.contract_id))
}

/// Consume the pooled base capacity in maturity order, overflowing onto excellence.
///
/// `base_capacity` is the game's base + self points; for excellence studios
/// both count as one tier beneath the bonus. The excellence pool is treated
/// as uncapped here. For studios without excellence every contract is
/// attributed to base in full.
pub fn split_sequential(
    contracts: &[EligibleContract],
    base_capacity: Points,
    excellent: bool,
) -> Vec<ContractSplit> {
    let mut ordered: Vec<&EligibleContract> = contracts.iter().collect();
    ordered.sort_by(|a, b| maturity_order(a, b));

    let mut remaining = base_capacity;
    ordered
        .into_iter()
        .map(|c| {
            let base_used = if excellent {
                let b = c.amount.min(remaining);
                remaining -= b;
                b
            } else {
                c.amount
            };
            let split = ContractSplit {
                contract_id: c.contract_id.clone(),
                amount: c.amount,
                base_used,
                self_used: 0,
                excellent_used: c.amount - base_used,
            };
            debug!(
                contract = %split.contract_id,
                base = split.base_used,
                excellent = split.excellent_used,
                remaining,
                "sequential split"
            );
            split
        })
        .collect()
}
