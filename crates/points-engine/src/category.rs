use crate::usage::load_eligible;
use crate::EngineError;
use points_alloc::{category_breakdown, CategoryUsage};
use points_core::{GameId, PointStore};
use std::collections::BTreeMap;
use tracing::debug;

/// Per-category reporting view of a game's contracts.
///
/// Each contract is attributed in full to the pool its own policy flag names,
/// without consulting capacity. Totals therefore differ from
/// [`crate::GameUsageAggregator`] when the game is overdrawn.
pub struct CategoryUsageAggregator<'a, S> {
    store: &'a S,
    known: &'a [String],
}

impl<'a, S: PointStore> CategoryUsageAggregator<'a, S> {
    pub fn new(store: &'a S, known: &'a [String]) -> Self {
        Self { store, known }
    }

    pub async fn compute_by_category(
        &self,
        game: GameId,
    ) -> Result<BTreeMap<String, CategoryUsage>, EngineError> {
        let eligible = load_eligible(self.store, game).await?;
        let out = category_breakdown(&eligible, self.known);
        debug!(%game, contracts = eligible.len(), categories = out.len(), "category breakdown");
        Ok(out)
    }
}
