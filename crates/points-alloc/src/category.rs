//! Service-category breakdown for reporting.

use points_core::{EligibleContract, Points};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Bucket for contracts without a known category.
pub const OTHER_CATEGORY: &str = "Other";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryUsage {
    pub total_used: Points,
    pub self_used: Points,
    pub base_used: Points,
    pub contract_count: usize,
}

/// Group contracts by service category, attributing each contract's full
/// amount to self or base by its own policy flag.
///
/// This is a contract-local approximation: capacity is not consulted, so the
/// sum over categories equals the requested amount and exceeds the pooled
/// usage by exactly the pooled shortfall. Known categories always appear,
/// zeroed if unused.
pub fn category_breakdown<S: AsRef<str>>(
    contracts: &[EligibleContract],
    known_categories: &[S],
) -> BTreeMap<String, CategoryUsage> {
    let mut out: BTreeMap<String, CategoryUsage> = known_categories
        .iter()
        .map(|k| (k.as_ref().to_string(), CategoryUsage::default()))
        .collect();

    for c in contracts {
        let category = c
            .service_category
            .as_deref()
            .map(str::trim)
            .filter(|cat| known_categories.iter().any(|k| k.as_ref() == *cat))
            .unwrap_or(OTHER_CATEGORY);
        let entry = out.entry(category.to_string()).or_default();
        if c.self_first {
            entry.self_used = entry.self_used.saturating_add(c.amount);
        } else {
            entry.base_used = entry.base_used.saturating_add(c.amount);
        }
        entry.total_used = entry.total_used.saturating_add(c.amount);
        entry.contract_count += 1;
    }
    out
}
