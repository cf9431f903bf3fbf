//! Per-contract reconciliation: push a game's consumption down to its contracts.

use crate::usage::capacity_of;
use crate::{EngineError, GameLocks};
use points_alloc::{allocate_cohorts, split_proportional, split_sequential, ContractSplit};
use points_core::{eligible_contracts, ContractId, GameId, PointStore, Points};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};

/// How consumed points are attributed to individual contracts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcileMode {
    /// Each policy cohort's funded totals, split by contract amount.
    #[default]
    Proportional,
    /// Earliest work end date first against pooled base + self capacity;
    /// overflow is attributed to excellence points.
    Sequential,
}

impl fmt::Display for ReconcileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReconcileMode::Proportional => "proportional",
            ReconcileMode::Sequential => "sequential",
        })
    }
}

impl FromStr for ReconcileMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "proportional" => Ok(ReconcileMode::Proportional),
            "sequential" => Ok(ReconcileMode::Sequential),
            other => Err(format!("unknown reconcile mode: {other}")),
        }
    }
}

/// A contract whose write-back failed; its stored figures are stale.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WriteFailure {
    pub contract_id: ContractId,
    pub error: String,
}

/// Outcome of reconciling one game.
#[derive(Clone, Debug, Serialize)]
pub struct ReconcileReport {
    pub game_id: GameId,
    pub mode: ReconcileMode,
    /// Splits successfully written.
    pub written: Vec<ContractSplit>,
    /// Assigned contracts that no longer qualify and were reset to zero.
    pub cleared: Vec<ContractId>,
    pub failed: Vec<WriteFailure>,
}

impl ReconcileReport {
    /// True when every write landed.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn base_total(&self) -> Points {
        self.sum_of(|s| s.base_used)
    }

    pub fn self_total(&self) -> Points {
        self.sum_of(|s| s.self_used)
    }

    pub fn excellent_total(&self) -> Points {
        self.sum_of(|s| s.excellent_used)
    }

    fn sum_of(&self, field: impl Fn(&ContractSplit) -> Points) -> Points {
        self.written
            .iter()
            .fold(0, |acc: Points, s| acc.saturating_add(field(s)))
    }
}

/// Reconciliation across every game.
#[derive(Clone, Debug, Default, Serialize)]
pub struct PortfolioReconcile {
    pub reports: Vec<ReconcileReport>,
    /// Games that could not be reconciled at all.
    pub errors: Vec<(GameId, String)>,
}

impl PortfolioReconcile {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty() && self.reports.iter().all(ReconcileReport::is_complete)
    }
}

/// Recomputes and persists `base_points_used` / `self_points_used` per contract.
///
/// Each call is a full, destructive recompute of the game. Per-contract
/// writes are independent; a failed write is reported and the rest proceed.
pub struct PerContractReconciler<'a, S> {
    store: &'a S,
    locks: &'a GameLocks,
}

impl<'a, S: PointStore> PerContractReconciler<'a, S> {
    pub fn new(store: &'a S, locks: &'a GameLocks) -> Self {
        Self { store, locks }
    }

    pub async fn reconcile(
        &self,
        game: GameId,
        mode: ReconcileMode,
    ) -> Result<ReconcileReport, EngineError> {
        let _guard = self.locks.acquire(game).await;

        let pool = self
            .store
            .point_pool(game)
            .await?
            .ok_or(EngineError::GameNotFound(game))?;
        // One read; eligibility and stale clearing see the same snapshot.
        let assigned = self.store.contracts_for_game(game).await?;
        let eligible = eligible_contracts(&assigned);

        let splits = match mode {
            ReconcileMode::Proportional => {
                let allocation = allocate_cohorts(capacity_of(&pool), &eligible);
                split_proportional(&eligible, &allocation)
            }
            ReconcileMode::Sequential => split_sequential(
                &eligible,
                pool.base_points.saturating_add(pool.self_points),
                pool.is_excellent(),
            ),
        };

        let mut report = ReconcileReport {
            game_id: game,
            mode,
            written: Vec::with_capacity(splits.len()),
            cleared: Vec::new(),
            failed: Vec::new(),
        };

        for split in splits {
            match self
                .store
                .set_contract_points_used(&split.contract_id, split.base_used, split.self_used)
                .await
            {
                Ok(()) => report.written.push(split),
                Err(e) => {
                    warn!(%game, contract = %split.contract_id, error = %e, "write-back failed");
                    report.failed.push(WriteFailure {
                        contract_id: split.contract_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        let eligible_ids: HashSet<&ContractId> = eligible.iter().map(|c| &c.contract_id).collect();
        for stale in assigned.iter().filter(|c| {
            !eligible_ids.contains(&c.contract_id)
                && (c.base_points_used > 0 || c.self_points_used > 0)
        }) {
            match self.store.set_contract_points_used(&stale.contract_id, 0, 0).await {
                Ok(()) => report.cleared.push(stale.contract_id.clone()),
                Err(e) => {
                    warn!(%game, contract = %stale.contract_id, error = %e, "clearing failed");
                    report.failed.push(WriteFailure {
                        contract_id: stale.contract_id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            %game,
            %mode,
            written = report.written.len(),
            cleared = report.cleared.len(),
            failed = report.failed.len(),
            base = report.base_total(),
            self_points = report.self_total(),
            excellent = report.excellent_total(),
            "game reconciled"
        );
        Ok(report)
    }

    /// Reconcile every registered game, one after another.
    pub async fn reconcile_all(&self, mode: ReconcileMode) -> Result<PortfolioReconcile, EngineError> {
        let pools = self.store.point_pools().await?;
        let mut out = PortfolioReconcile::default();
        for pool in pools {
            match self.reconcile(pool.game_id, mode).await {
                Ok(report) => out.reports.push(report),
                Err(e) => {
                    warn!(game = %pool.game_id, error = %e, "game not reconciled");
                    out.errors.push((pool.game_id, e.to_string()));
                }
            }
        }
        Ok(out)
    }
}
