//! Dashboard-wide roll-ups across every game and studio.

use crate::alerts::{check_thresholds, ThresholdBreach, ThresholdRule};
use crate::category::CategoryUsageAggregator;
use crate::usage::{GameUsageAggregator, UsageMemo};
use crate::{remaining, usage_rate, EngineError};
use points_alloc::CategoryUsage;
use points_core::{GameId, PointPool, PointStore, Points};
use rust_decimal::Decimal;
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::ops::AddAssign;
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PoolCapacity {
    pub base: Points,
    pub self_points: Points,
    pub excellence: Points,
    /// Derived total, never the stored one.
    pub total: Points,
}

impl PoolCapacity {
    fn of(pool: &PointPool) -> Self {
        Self {
            base: pool.base_points,
            self_points: pool.self_points,
            excellence: pool.excellence_points(),
            total: pool.derived_total(),
        }
    }
}

impl AddAssign for PoolCapacity {
    fn add_assign(&mut self, rhs: Self) {
        self.base = self.base.saturating_add(rhs.base);
        self.self_points = self.self_points.saturating_add(rhs.self_points);
        self.excellence = self.excellence.saturating_add(rhs.excellence);
        self.total = self.total.saturating_add(rhs.total);
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PoolUsage {
    pub total: Points,
    pub self_points: Points,
    pub base: Points,
}

impl AddAssign for PoolUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.total = self.total.saturating_add(rhs.total);
        self.self_points = self.self_points.saturating_add(rhs.self_points);
        self.base = self.base.saturating_add(rhs.base);
    }
}

/// `capacity - used` per pool; negative when overdrawn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PoolRemaining {
    pub total: i64,
    pub self_points: i64,
    pub base: i64,
}

impl PoolRemaining {
    fn between(capacity: &PoolCapacity, used: &PoolUsage) -> Self {
        Self {
            total: remaining(capacity.total, used.total),
            self_points: remaining(capacity.self_points, used.self_points),
            base: remaining(capacity.base, used.base),
        }
    }
}

/// One game's row on the dashboard.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GameSummary {
    pub game_id: GameId,
    pub game_name: String,
    pub company_name: String,
    pub capacity: PoolCapacity,
    pub used: PoolUsage,
    pub remaining: PoolRemaining,
    pub usage_rate: Decimal,
    pub insufficient: bool,
    pub shortfall: Points,
    /// Stored total disagreed with the derived one.
    pub total_mismatch: bool,
}

/// A studio's games summed together.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CompanySummary {
    pub company_name: String,
    pub game_count: usize,
    pub capacity: PoolCapacity,
    pub used: PoolUsage,
    pub remaining: PoolRemaining,
    pub usage_rate: Decimal,
    pub insufficient: bool,
    pub shortfall: Points,
    /// Confirmed contract amounts of the studio, assigned to a game or not.
    pub contracted: Points,
    /// `contracted` against total capacity, in percent.
    pub contract_rate: Decimal,
}

/// One category's slice of the portfolio.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CategoryShare {
    pub category: String,
    pub usage: CategoryUsage,
    /// Percent of the portfolio-wide category total.
    pub share: Decimal,
}

/// Category usage summed over every game, largest first.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CategoryStatistics {
    pub categories: Vec<CategoryShare>,
    pub total_used: Points,
}

pub struct PortfolioAggregator<'a, S> {
    store: &'a S,
    known_categories: &'a [String],
}

impl<'a, S: PointStore> PortfolioAggregator<'a, S> {
    pub fn new(store: &'a S, known_categories: &'a [String]) -> Self {
        Self {
            store,
            known_categories,
        }
    }

    /// Summaries for every game, in store order.
    pub async fn compute_all(&self) -> Result<Vec<GameSummary>, EngineError> {
        let mut memo = UsageMemo::default();
        self.compute_all_with(&mut memo).await
    }

    /// Like [`Self::compute_all`] but sharing `memo` with the caller's pass.
    pub async fn compute_all_with(
        &self,
        memo: &mut UsageMemo,
    ) -> Result<Vec<GameSummary>, EngineError> {
        let pools = self.store.point_pools().await?;
        let usage = GameUsageAggregator::new(self.store);
        let mut out = Vec::with_capacity(pools.len());

        for pool in &pools {
            let total_mismatch = match pool.validate() {
                Ok(()) => false,
                Err(e) => {
                    warn!(game = %pool.game_id, error = %e, "point pool failed integrity check");
                    pool.total_points != pool.derived_total()
                }
            };
            let game_usage = usage.usage_memoized(pool, memo).await?;
            let capacity = PoolCapacity::of(pool);
            let used = PoolUsage {
                total: game_usage.total_used,
                self_points: game_usage.self_used,
                base: game_usage.base_used,
            };
            out.push(GameSummary {
                game_id: pool.game_id,
                game_name: pool.game_name.clone(),
                company_name: pool.company_name.clone(),
                remaining: PoolRemaining::between(&capacity, &used),
                usage_rate: usage_rate(used.total, capacity.total),
                capacity,
                used,
                insufficient: game_usage.insufficient(),
                shortfall: game_usage.shortfall(),
                total_mismatch,
            });
        }

        info!(games = out.len(), "portfolio computed");
        Ok(out)
    }

    /// Studio roll-up keyed by company name.
    pub async fn compute_by_company(&self) -> Result<BTreeMap<String, CompanySummary>, EngineError> {
        let games = self.compute_all().await?;
        let mut companies = roll_up(&games);
        for company in companies.values_mut() {
            let contracts = self.store.contracts_for_company(&company.company_name).await?;
            company.contracted = contracts
                .iter()
                .filter(|c| c.is_eligible())
                .fold(0, |acc: Points, c| acc.saturating_add(c.amount()));
            company.contract_rate = usage_rate(company.contracted, company.capacity.total);
        }
        Ok(companies)
    }

    /// Studios ordered by usage rate, highest first; ties by name.
    pub async fn company_ranking(&self) -> Result<Vec<CompanySummary>, EngineError> {
        let mut ranked: Vec<CompanySummary> =
            self.compute_by_company().await?.into_values().collect();
        rank_by_usage(&mut ranked);
        Ok(ranked)
    }

    /// Games whose remaining points sit at or below a matching rule.
    pub async fn threshold_breaches(
        &self,
        rules: &[ThresholdRule],
    ) -> Result<Vec<ThresholdBreach>, EngineError> {
        let games = self.compute_all().await?;
        Ok(check_thresholds(&games, rules))
    }

    /// Contract-local category usage summed across every game.
    pub async fn compute_categories(&self) -> Result<CategoryStatistics, EngineError> {
        let pools = self.store.point_pools().await?;
        let per_game = CategoryUsageAggregator::new(self.store, self.known_categories);
        let mut merged: BTreeMap<String, CategoryUsage> = self
            .known_categories
            .iter()
            .map(|k| (k.clone(), CategoryUsage::default()))
            .collect();
        for pool in &pools {
            for (name, usage) in per_game.compute_by_category(pool.game_id).await? {
                let entry = merged.entry(name).or_default();
                entry.total_used = entry.total_used.saturating_add(usage.total_used);
                entry.self_used = entry.self_used.saturating_add(usage.self_used);
                entry.base_used = entry.base_used.saturating_add(usage.base_used);
                entry.contract_count += usage.contract_count;
            }
        }
        let stats = category_shares(merged);
        info!(
            games = pools.len(),
            categories = stats.categories.len(),
            total = stats.total_used,
            "portfolio categories computed"
        );
        Ok(stats)
    }
}

fn rank_by_usage(companies: &mut [CompanySummary]) {
    companies.sort_by(|a, b| {
        b.usage_rate
            .cmp(&a.usage_rate)
            .then_with(|| a.company_name.cmp(&b.company_name))
    });
}

fn category_shares(merged: BTreeMap<String, CategoryUsage>) -> CategoryStatistics {
    let total_used = merged
        .values()
        .fold(0, |acc: Points, u| acc.saturating_add(u.total_used));
    let mut categories: Vec<CategoryShare> = merged
        .into_iter()
        .map(|(category, usage)| CategoryShare {
            share: usage_rate(usage.total_used, total_used),
            category,
            usage,
        })
        .collect();
    // Stable sort keeps name order among equal amounts.
    categories.sort_by_key(|c| Reverse(c.usage.total_used));
    CategoryStatistics {
        categories,
        total_used,
    }
}

fn roll_up(games: &[GameSummary]) -> BTreeMap<String, CompanySummary> {
    let mut out: BTreeMap<String, CompanySummary> = BTreeMap::new();
    for g in games {
        let entry = out
            .entry(g.company_name.clone())
            .or_insert_with(|| CompanySummary {
                company_name: g.company_name.clone(),
                ..CompanySummary::default()
            });
        entry.game_count += 1;
        entry.capacity += g.capacity;
        entry.used += g.used;
        entry.insufficient |= g.insufficient;
        entry.shortfall = entry.shortfall.saturating_add(g.shortfall);
    }
    for company in out.values_mut() {
        company.remaining = PoolRemaining::between(&company.capacity, &company.used);
        company.usage_rate = usage_rate(company.used.total, company.capacity.total);
    }
    out
}
