//! Import records for games and contracts.
//!
//! These mirror the loose shape of the source sheets (signed integers, string
//! dates, status labels) and are converted into validated records before
//! anything reaches a store.

use crate::{
    non_negative, parse_work_date, ContractId, ContractRecord, ContractStatus, ExcellenceTier,
    GameId, PointPool, Points, ValidationError,
};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("malformed import file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("record {index}: {source}")]
    Record {
        index: usize,
        #[source]
        source: ValidationError,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct TierImport {
    pub tier: String,
    pub points: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GameImport {
    pub id: i64,
    pub game_name: String,
    pub company_name: String,
    #[serde(default)]
    pub base_points: i64,
    #[serde(default)]
    pub self_points: i64,
    /// When present it must agree with the derived total.
    #[serde(default)]
    pub total_points: Option<i64>,
    #[serde(default)]
    pub excellence: Vec<TierImport>,
}

impl TryFrom<GameImport> for PointPool {
    type Error = ValidationError;

    fn try_from(g: GameImport) -> Result<Self, Self::Error> {
        if g.game_name.trim().is_empty() {
            return Err(ValidationError::MissingField("game_name"));
        }
        let mut pool = PointPool::new(
            GameId(g.id),
            g.game_name.trim(),
            g.company_name.trim(),
            non_negative("base_points", g.base_points)?,
            non_negative("self_points", g.self_points)?,
        );
        for t in &g.excellence {
            let tier = ExcellenceTier::from_label(&t.tier)?;
            let points: Points = non_negative("excellence.points", t.points)?;
            pool.set_tier(tier, true, points);
        }
        if let Some(stored) = g.total_points {
            pool.total_points = non_negative("total_points", stored)?;
        }
        pool.validate()?;
        Ok(pool)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContractImport {
    pub contract_id: String,
    pub company_name: String,
    #[serde(default)]
    pub assigned_game_id: Option<i64>,
    #[serde(default)]
    pub contract_amount: Option<String>,
    #[serde(default)]
    pub selected_vendor: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub use_self_points: bool,
    #[serde(default)]
    pub service_category: Option<String>,
    #[serde(default)]
    pub work_end_date: Option<String>,
}

impl TryFrom<ContractImport> for ContractRecord {
    type Error = ValidationError;

    fn try_from(c: ContractImport) -> Result<Self, Self::Error> {
        let contract_id = c.contract_id.trim();
        if contract_id.is_empty() {
            return Err(ValidationError::MissingField("contract_id"));
        }
        let work_end_date = match c.work_end_date.as_deref() {
            Some(raw) => parse_work_date(raw)?,
            None => None,
        };
        let blank_to_none = |s: Option<String>| s.filter(|v| !v.trim().is_empty());
        Ok(ContractRecord {
            contract_id: ContractId(contract_id.to_string()),
            company_name: c.company_name.trim().to_string(),
            assigned_game: c.assigned_game_id.map(GameId),
            amount_raw: blank_to_none(c.contract_amount),
            selected_vendor: blank_to_none(c.selected_vendor),
            status: ContractStatus::from_label(&c.status),
            use_self_points_first: c.use_self_points,
            service_category: blank_to_none(c.service_category),
            work_end_date,
            base_points_used: 0,
            self_points_used: 0,
        })
    }
}

fn convert<T, R>(items: Vec<T>) -> Result<Vec<R>, ImportError>
where
    R: TryFrom<T, Error = ValidationError>,
{
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| R::try_from(item).map_err(|source| ImportError::Record { index, source }))
        .collect()
}

/// Parse a JSON array of games.
pub fn games_from_json(text: &str) -> Result<Vec<PointPool>, ImportError> {
    let raw: Vec<GameImport> = serde_json::from_str(text)?;
    convert(raw)
}

/// Parse a JSON array of contracts.
pub fn contracts_from_json(text: &str) -> Result<Vec<ContractRecord>, ImportError> {
    let raw: Vec<ContractImport> = serde_json::from_str(text)?;
    convert(raw)
}
