//! Low-balance thresholds over portfolio summaries.

use crate::GameSummary;
use points_core::{GameId, Points};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Alert when a matching game's remaining points fall to `threshold` or below.
///
/// `company_name` and `game_name` narrow the rule; unset means every game.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdRule {
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub game_name: Option<String>,
    pub threshold: Points,
}

impl ThresholdRule {
    pub fn matches(&self, game: &GameSummary) -> bool {
        self.company_name
            .as_deref()
            .map_or(true, |c| c == game.company_name)
            && self
                .game_name
                .as_deref()
                .map_or(true, |g| g == game.game_name)
    }
}

/// A game at or under one of its thresholds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ThresholdBreach {
    pub game_id: GameId,
    pub game_name: String,
    pub company_name: String,
    pub remaining: i64,
    pub threshold: Points,
}

/// Every (game, rule) pair where the game's remaining total is at or below the
/// rule's threshold, in game order then rule order.
pub fn check_thresholds(games: &[GameSummary], rules: &[ThresholdRule]) -> Vec<ThresholdBreach> {
    let mut out = Vec::new();
    for game in games {
        for rule in rules.iter().filter(|r| r.matches(game)) {
            let threshold = i64::try_from(rule.threshold).unwrap_or(i64::MAX);
            if game.remaining.total > threshold {
                continue;
            }
            warn!(
                game = %game.game_id,
                company = %game.company_name,
                remaining = game.remaining.total,
                threshold = rule.threshold,
                "points at or below threshold"
            );
            out.push(ThresholdBreach {
                game_id: game.game_id,
                game_name: game.game_name.clone(),
                company_name: game.company_name.clone(),
                remaining: game.remaining.total,
                threshold: rule.threshold,
            });
        }
    }
    out
}
