use crate::EngineError;
use points_alloc::{allocate_cohorts, Capacity, CohortAllocation};
use points_core::{eligible_contracts, EligibleContract, GameId, PointPool, PointStore, Points};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Pooled usage of one game.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct GameUsage {
    pub total_used: Points,
    pub self_used: Points,
    pub base_used: Points,
    /// Sum of eligible contract amounts, funded or not.
    pub requested: Points,
    pub allocation: CohortAllocation,
}

impl GameUsage {
    fn from_allocation(allocation: CohortAllocation) -> Self {
        Self {
            total_used: allocation.total_used(),
            self_used: allocation.self_used(),
            base_used: allocation.base_used(),
            requested: allocation.requested(),
            allocation,
        }
    }

    pub fn insufficient(&self) -> bool {
        self.allocation.insufficient()
    }

    pub fn shortfall(&self) -> Points {
        self.allocation.shortfall()
    }
}

pub(crate) fn capacity_of(pool: &PointPool) -> Capacity {
    Capacity {
        self_points: pool.self_points,
        base_points: pool.base_points,
    }
}

pub(crate) async fn load_eligible<S: PointStore>(
    store: &S,
    game: GameId,
) -> Result<Vec<EligibleContract>, EngineError> {
    let contracts = store.contracts_for_game(game).await?;
    Ok(eligible_contracts(&contracts))
}

/// Per-pass memo of game usage, so one aggregation pass reads each game once.
#[derive(Debug, Default)]
pub struct UsageMemo {
    entries: HashMap<GameId, GameUsage>,
}

impl UsageMemo {
    pub fn get(&self, game: GameId) -> Option<&GameUsage> {
        self.entries.get(&game)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Computes pooled self/base consumption per game.
pub struct GameUsageAggregator<'a, S> {
    store: &'a S,
}

impl<'a, S: PointStore> GameUsageAggregator<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Usage of `game`; an unknown game reads as zero usage.
    pub async fn compute_usage(&self, game: GameId) -> Result<GameUsage, EngineError> {
        match self.store.point_pool(game).await? {
            Some(pool) => self.usage_for_pool(&pool).await,
            None => {
                debug!(%game, "no point pool; reporting zero usage");
                Ok(GameUsage::default())
            }
        }
    }

    /// Usage for an already loaded pool.
    pub async fn usage_for_pool(&self, pool: &PointPool) -> Result<GameUsage, EngineError> {
        let eligible = load_eligible(self.store, pool.game_id).await?;
        let usage = GameUsage::from_allocation(allocate_cohorts(capacity_of(pool), &eligible));
        if usage.insufficient() {
            warn!(
                game = %pool.game_id,
                requested = usage.requested,
                funded = usage.total_used,
                shortfall = usage.shortfall(),
                "contracts exceed available points"
            );
        }
        Ok(usage)
    }

    /// Like [`Self::usage_for_pool`], reusing a result already in `memo`.
    pub async fn usage_memoized(
        &self,
        pool: &PointPool,
        memo: &mut UsageMemo,
    ) -> Result<GameUsage, EngineError> {
        if let Some(hit) = memo.get(pool.game_id) {
            return Ok(*hit);
        }
        let usage = self.usage_for_pool(pool).await?;
        memo.entries.insert(pool.game_id, usage);
        Ok(usage)
    }
}
