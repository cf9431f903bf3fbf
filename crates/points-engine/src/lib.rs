#![deny(warnings)]

//! Point usage engine: aggregators and reconciliation over a [`PointStore`].
//!
//! Every operation is read-compute-write against the injected store and runs
//! to completion per call. Reconciliation of one game is serialized through
//! [`GameLocks`]; different games proceed independently.

use points_core::{ContractId, GameId, PointStore, Points, StoreError, ValidationError};
use rust_decimal::Decimal;
use thiserror::Error;

mod alerts;
mod category;
mod locks;
pub mod memory;
mod policy;
mod portfolio;
mod reconcile;
mod usage;

pub use alerts::{check_thresholds, ThresholdBreach, ThresholdRule};
pub use category::CategoryUsageAggregator;
pub use locks::GameLocks;
pub use policy::PolicyEditor;
pub use portfolio::{
    CategoryShare, CategoryStatistics, CompanySummary, GameSummary, PoolCapacity, PoolRemaining,
    PoolUsage, PortfolioAggregator,
};
pub use reconcile::{
    PerContractReconciler, PortfolioReconcile, ReconcileMode, ReconcileReport, WriteFailure,
};
pub use usage::{GameUsage, GameUsageAggregator, UsageMemo};

/// Default bonus granted when an excellence tier is switched on.
pub const DEFAULT_EXCELLENCE_BONUS: Points = 100_000_000;

/// Errors from engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("game {0} not found")]
    GameNotFound(GameId),
    #[error("contract {0} not found")]
    ContractNotFound(ContractId),
    /// Policy flags only apply to confirmed contracts with vendor and amount.
    #[error("contract {0} is not confirmed with vendor and amount; policy cannot change")]
    PolicyNotSettable(ContractId),
}

/// Tunables shared by the aggregators.
#[derive(Clone, Debug)]
pub struct EngineSettings {
    pub excellence_bonus_points: Points,
    /// Known reporting categories; anything else lands in "Other".
    pub service_categories: Vec<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            excellence_bonus_points: DEFAULT_EXCELLENCE_BONUS,
            service_categories: ["게임 서비스", "마케팅", "인프라", "컨설팅"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Entry point bundling a store, its reconciliation locks and settings.
#[derive(Debug)]
pub struct PointEngine<S> {
    store: S,
    locks: GameLocks,
    settings: EngineSettings,
}

impl<S: PointStore> PointEngine<S> {
    pub fn new(store: S, settings: EngineSettings) -> Self {
        Self {
            store,
            locks: GameLocks::default(),
            settings,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn usage(&self) -> GameUsageAggregator<'_, S> {
        GameUsageAggregator::new(&self.store)
    }

    pub fn reconciler(&self) -> PerContractReconciler<'_, S> {
        PerContractReconciler::new(&self.store, &self.locks)
    }

    pub fn categories(&self) -> CategoryUsageAggregator<'_, S> {
        CategoryUsageAggregator::new(&self.store, &self.settings.service_categories)
    }

    pub fn portfolio(&self) -> PortfolioAggregator<'_, S> {
        PortfolioAggregator::new(&self.store, &self.settings.service_categories)
    }

    pub fn policy(&self) -> PolicyEditor<'_, S> {
        PolicyEditor::new(&self.store, &self.locks, self.settings.excellence_bonus_points)
    }
}

/// Used share of a capacity in percent, two decimal places. Zero capacity reads as 0%.
pub fn usage_rate(used: Points, capacity: Points) -> Decimal {
    if capacity == 0 {
        return Decimal::ZERO;
    }
    (Decimal::from(used) * Decimal::ONE_HUNDRED / Decimal::from(capacity)).round_dp(2)
}

/// `capacity - used` as a signed figure; negative when a pool is overdrawn.
pub(crate) fn remaining(capacity: Points, used: Points) -> i64 {
    let diff = i128::from(capacity) - i128::from(used);
    diff.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}
