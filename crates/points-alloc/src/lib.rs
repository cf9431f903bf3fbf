#![deny(warnings)]

//! Point allocation arithmetic.
//!
//! Pure functions, no I/O:
//! - Two-pool distribution of a lump sum under a self-first or base-only policy
//! - Cohort allocation for a game (self-first cohort claims capacity first)
//! - Per-contract splits, proportional or maturity-ordered
//! - Category breakdown for reporting

use points_core::{EligibleContract, Points};
use serde::{Deserialize, Serialize};

mod category;
mod split;

pub use category::{category_breakdown, CategoryUsage, OTHER_CATEGORY};
pub use split::{split_proportional, split_sequential, ContractSplit};

/// How a lump sum landed on the two pools.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distribution {
    pub self_used: Points,
    pub base_used: Points,
    /// The pools could not cover the requested amount.
    pub insufficient: bool,
}

impl Distribution {
    pub fn total_used(&self) -> Points {
        self.self_used.saturating_add(self.base_used)
    }
}

/// Split `total_amount` across the self and base pools.
///
/// Self-first drains the self pool and spills the remainder onto base.
/// Otherwise only the base pool is drawn. Unfunded remainder is not assigned
/// anywhere; it shows up as `insufficient`.
///
/// Example:
/// let d = distribute(150, 100, 100, true);
/// assert_eq!((d.self_used, d.base_used, d.insufficient), (100, 50, false));
pub fn distribute(
    total_amount: Points,
    available_self: Points,
    available_base: Points,
    self_first: bool,
) -> Distribution {
    let (self_used, base_used) = if self_first {
        let s = total_amount.min(available_self);
        (s, (total_amount - s).min(available_base))
    } else {
        (0, total_amount.min(available_base))
    };
    Distribution {
        self_used,
        base_used,
        insufficient: self_used + base_used < total_amount,
    }
}

/// Capacities a game's contracts draw on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capacity {
    pub self_points: Points,
    pub base_points: Points,
}

/// One policy cohort: requested total and how it was funded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CohortUsage {
    pub requested: Points,
    pub contracts: usize,
    pub distribution: Distribution,
}

/// Result of funding both cohorts of one game.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CohortAllocation {
    pub self_first: CohortUsage,
    pub base_only: CohortUsage,
}

impl CohortAllocation {
    pub fn self_used(&self) -> Points {
        self.self_first
            .distribution
            .self_used
            .saturating_add(self.base_only.distribution.self_used)
    }

    pub fn base_used(&self) -> Points {
        self.self_first
            .distribution
            .base_used
            .saturating_add(self.base_only.distribution.base_used)
    }

    pub fn total_used(&self) -> Points {
        self.self_used().saturating_add(self.base_used())
    }

    pub fn requested(&self) -> Points {
        self.self_first.requested.saturating_add(self.base_only.requested)
    }

    /// Requested but unfunded.
    pub fn shortfall(&self) -> Points {
        self.requested().saturating_sub(self.total_used())
    }

    pub fn insufficient(&self) -> bool {
        self.self_first.distribution.insufficient || self.base_only.distribution.insufficient
    }
}

fn cohort(contracts: &[EligibleContract], self_first: bool) -> (Points, usize) {
    contracts
        .iter()
        .filter(|c| c.self_first == self_first)
        .fold((0, 0), |(sum, n), c| (sum.saturating_add(c.amount), n + 1))
}

/// Fund a game's eligible contracts against its capacity.
///
/// The self-first cohort is funded first against the full capacity; the
/// base-only cohort then draws on what is left. Flagged contracts get
/// priority on both pools.
pub fn allocate_cohorts(capacity: Capacity, contracts: &[EligibleContract]) -> CohortAllocation {
    let (sf_total, sf_count) = cohort(contracts, true);
    let (bo_total, bo_count) = cohort(contracts, false);

    let sf = distribute(sf_total, capacity.self_points, capacity.base_points, true);
    let remaining_self = capacity.self_points - sf.self_used;
    let remaining_base = capacity.base_points - sf.base_used;
    let bo = distribute(bo_total, remaining_self, remaining_base, false);

    CohortAllocation {
        self_first: CohortUsage {
            requested: sf_total,
            contracts: sf_count,
            distribution: sf,
        },
        base_only: CohortUsage {
            requested: bo_total,
            contracts: bo_count,
            distribution: bo,
        },
    }
}


#[cfg(test)]
mod tests {
    use super::testutil::contract;
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn self_first_spills_onto_base() {
        let d = distribute(150, 100, 100, true);
        assert_eq!(
            d,
            Distribution {
                self_used: 100,
                base_used: 50,
                insufficient: false
            }
        );
    }

    #[test]
    fn base_only_never_touches_self() {
        let d = distribute(80, 100, 50, false);
        assert_eq!(
            d,
            Distribution {
                self_used: 0,
                base_used: 50,
                insufficient: true
            }
        );
    }

    #[test]
    fn zero_amount_is_all_zero() {
        assert_eq!(distribute(0, 10, 10, true), Distribution::default());
        assert_eq!(distribute(0, 0, 0, false), Distribution::default());
    }

    #[test]
    fn self_first_cohort_claims_base_before_base_only() {
        let cap = Capacity {
            self_points: 0,
            base_points: 100,
        };
        let a = allocate_cohorts(cap, &[contract("A", 60, true), contract("B", 60, false)]);
        assert_eq!(a.self_first.distribution.base_used, 60);
        assert_eq!(a.base_only.distribution.base_used, 40);
        assert_eq!(a.self_used(), 0);
        assert_eq!(a.base_used(), 100);
        assert_eq!(a.requested(), 120);
        assert_eq!(a.shortfall(), 20);
        assert!(a.insufficient());
    }

    #[test]
    fn end_to_end_two_cohorts() {
        let cap = Capacity {
            self_points: 500_000,
            base_points: 1_000_000,
        };
        let a = allocate_cohorts(
            cap,
            &[contract("A", 600_000, true), contract("B", 700_000, false)],
        );
        assert_eq!(a.self_first.distribution.self_used, 500_000);
        assert_eq!(a.self_first.distribution.base_used, 100_000);
        assert_eq!(a.base_only.distribution.base_used, 700_000);
        assert!(!a.base_only.distribution.insufficient);
        assert_eq!(a.self_used(), 500_000);
        assert_eq!(a.base_used(), 800_000);
        assert!(!a.insufficient());
    }

    #[test]
    fn cohort_order_is_independent_of_input_order() {
        let cap = Capacity {
            self_points: 30,
            base_points: 100,
        };
        let fwd = allocate_cohorts(
            cap,
            &[contract("A", 50, false), contract("B", 70, true), contract("C", 10, false)],
        );
        let rev = allocate_cohorts(
            cap,
            &[contract("C", 10, false), contract("B", 70, true), contract("A", 50, false)],
        );
        assert_eq!(fwd, rev);
        assert_eq!(fwd.self_first.distribution.self_used, 30);
        assert_eq!(fwd.self_first.distribution.base_used, 40);
        assert_eq!(fwd.base_only.distribution.base_used, 60);
    }

    #[test]
    fn huge_amounts_saturate_instead_of_overflowing() {
        let cap = Capacity {
            self_points: 1_000,
            base_points: 1_000,
        };
        let huge = points_core::parse_amount(Some("10,000,000,000,000,000,000 원"));
        assert_eq!(huge, 10_000_000_000_000_000_000);
        let a = allocate_cohorts(cap, &[contract("A", huge, true), contract("B", huge, false)]);
        assert_eq!(a.requested(), Points::MAX);
        assert_eq!(a.total_used(), 2_000);
        assert_eq!(a.shortfall(), Points::MAX - 2_000);
        assert!(a.insufficient());
    }

    proptest! {
        #[test]
        fn distribution_conserves(total in 0u64..1_000_000_000,
                                  s in 0u64..1_000_000_000,
                                  b in 0u64..1_000_000_000,
                                  self_first in any::<bool>()) {
            let d = distribute(total, s, b, self_first);
            prop_assert!(d.self_used + d.base_used <= total);
            prop_assert!(d.self_used <= s);
            prop_assert!(d.base_used <= b);
            prop_assert_eq!(d.insufficient, d.total_used() < total);
            if !self_first {
                prop_assert_eq!(d.self_used, 0);
            }
        }

        #[test]
        fn cohorts_never_exceed_capacity(amounts in proptest::collection::vec((1u64..1_000_000, any::<bool>()), 0..20),
                                         s in 0u64..5_000_000,
                                         b in 0u64..5_000_000) {
            let contracts: Vec<_> = amounts
                .iter()
                .enumerate()
                .map(|(i, (amt, sf))| contract(&format!("C{i}"), *amt, *sf))
                .collect();
            let a = allocate_cohorts(Capacity { self_points: s, base_points: b }, &contracts);
            prop_assert!(a.self_used() <= s);
            prop_assert!(a.base_used() <= b);
            prop_assert!(a.total_used() <= a.requested());
            prop_assert_eq!(a.insufficient(), a.shortfall() > 0);
        }
    }
}
