#![deny(warnings)]

//! Core domain models and invariants for the game points ledger.
//!
//! This crate defines the per-game point pool and the contract records that
//! draw on it, the amount parser used wherever a raw contract amount is read,
//! and the storage collaborator trait the aggregators run against. Records are
//! validated here, at the boundary where data enters from import or storage.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

mod amount;
pub mod import;
mod store;

pub use amount::{format_amount, parse_amount};
pub use store::{PointStore, StoreError};

/// Budget unit. One point equals one currency unit.
pub type Points = u64;

/// Opaque game identifier (row id of the `games` table).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GameId(pub i64);

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// External contract identifier as it appears in the contract sheet.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContractId(pub String);

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Excellence designation rounds. Each tier is switched on independently.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ExcellenceTier {
    First,
    Second,
    Third,
}

impl ExcellenceTier {
    pub const ALL: [ExcellenceTier; 3] = [
        ExcellenceTier::First,
        ExcellenceTier::Second,
        ExcellenceTier::Third,
    ];

    fn index(self) -> usize {
        match self {
            ExcellenceTier::First => 0,
            ExcellenceTier::Second => 1,
            ExcellenceTier::Third => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ExcellenceTier::First => "1st",
            ExcellenceTier::Second => "2nd",
            ExcellenceTier::Third => "3rd",
        }
    }

    /// Parse "1st"/"2nd"/"3rd" (also "1"/"2"/"3").
    pub fn from_label(label: &str) -> Result<Self, ValidationError> {
        match label.trim().to_ascii_lowercase().as_str() {
            "1st" | "1" | "first" => Ok(ExcellenceTier::First),
            "2nd" | "2" | "second" => Ok(ExcellenceTier::Second),
            "3rd" | "3" | "third" => Ok(ExcellenceTier::Third),
            other => Err(ValidationError::UnknownTier(other.to_string())),
        }
    }
}

/// Bonus capacity granted for one excellence tier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierGrant {
    pub enabled: bool,
    pub points: Points,
}

/// Per-game point capacities.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointPool {
    pub game_id: GameId,
    pub game_name: String,
    /// Studio the game belongs to.
    pub company_name: String,
    /// Primary-funded pool.
    pub base_points: Points,
    /// Studio self-funded pool.
    pub self_points: Points,
    /// Bonus grants indexed by tier (1st, 2nd, 3rd).
    pub excellence: [TierGrant; 3],
    /// Stored total. Must equal [`PointPool::derived_total`].
    pub total_points: Points,
}

impl PointPool {
    /// New pool without excellence grants; the stored total is derived.
    pub fn new(
        game_id: GameId,
        game_name: impl Into<String>,
        company_name: impl Into<String>,
        base_points: Points,
        self_points: Points,
    ) -> Self {
        let mut pool = Self {
            game_id,
            game_name: game_name.into(),
            company_name: company_name.into(),
            base_points,
            self_points,
            excellence: [TierGrant::default(); 3],
            total_points: 0,
        };
        pool.total_points = pool.derived_total();
        pool
    }

    pub fn grant(&self, tier: ExcellenceTier) -> TierGrant {
        self.excellence[tier.index()]
    }

    /// Sum of the bonus points of every enabled tier.
    pub fn excellence_points(&self) -> Points {
        self.excellence
            .iter()
            .filter(|g| g.enabled)
            .fold(0, |acc: Points, g| acc.saturating_add(g.points))
    }

    pub fn derived_total(&self) -> Points {
        self.base_points
            .saturating_add(self.self_points)
            .saturating_add(self.excellence_points())
    }

    /// True when any excellence tier is switched on.
    pub fn is_excellent(&self) -> bool {
        self.excellence.iter().any(|g| g.enabled)
    }

    /// Switch a tier on (granting `bonus`) or off, keeping the stored total in step.
    pub fn set_tier(&mut self, tier: ExcellenceTier, enabled: bool, bonus: Points) {
        self.excellence[tier.index()] = if enabled {
            TierGrant {
                enabled: true,
                points: bonus,
            }
        } else {
            TierGrant::default()
        };
        self.total_points = self.derived_total();
    }

    /// Check the stored total against the sum of its parts.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.company_name.trim().is_empty() {
            return Err(ValidationError::MissingField("company_name"));
        }
        let derived = self.derived_total();
        if self.total_points != derived {
            return Err(ValidationError::TotalMismatch {
                game: self.game_id,
                stored: self.total_points,
                derived,
            });
        }
        Ok(())
    }
}

/// Contract lifecycle status as recorded in the contract sheet.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ContractStatus {
    QuoteRequested,
    VendorChosen,
    /// 최종계약체결
    FinalContractSigned,
    /// 계약종료(정산)
    SettlementClosed,
    Other(String),
}

impl ContractStatus {
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "견적요청" | "QuoteRequested" => ContractStatus::QuoteRequested,
            "선정완료" | "VendorChosen" => ContractStatus::VendorChosen,
            "최종계약체결" | "FinalContractSigned" => ContractStatus::FinalContractSigned,
            "계약종료(정산)" | "SettlementClosed" => ContractStatus::SettlementClosed,
            other => ContractStatus::Other(other.to_string()),
        }
    }

    /// Label used in storage and in the source sheet.
    pub fn label(&self) -> &str {
        match self {
            ContractStatus::QuoteRequested => "견적요청",
            ContractStatus::VendorChosen => "선정완료",
            ContractStatus::FinalContractSigned => "최종계약체결",
            ContractStatus::SettlementClosed => "계약종료(정산)",
            ContractStatus::Other(s) => s,
        }
    }

    /// Only signed or settled contracts count toward usage.
    pub fn is_confirmed(&self) -> bool {
        matches!(
            self,
            ContractStatus::FinalContractSigned | ContractStatus::SettlementClosed
        )
    }
}

impl From<String> for ContractStatus {
    fn from(s: String) -> Self {
        ContractStatus::from_label(&s)
    }
}

impl From<ContractStatus> for String {
    fn from(s: ContractStatus) -> Self {
        s.label().to_string()
    }
}

/// A procurement contract drawing on a game's point pool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractRecord {
    pub contract_id: ContractId,
    pub company_name: String,
    pub assigned_game: Option<GameId>,
    /// Localized amount, e.g. "3,986,400 원". `None` or empty means no amount yet.
    pub amount_raw: Option<String>,
    pub selected_vendor: Option<String>,
    pub status: ContractStatus,
    pub use_self_points_first: bool,
    pub service_category: Option<String>,
    pub work_end_date: Option<NaiveDate>,
    /// Output of reconciliation; overwritten on every recompute.
    pub base_points_used: Points,
    pub self_points_used: Points,
}

impl ContractRecord {
    pub fn amount(&self) -> Points {
        parse_amount(self.amount_raw.as_deref())
    }

    pub fn vendor_selected(&self) -> bool {
        self.selected_vendor
            .as_deref()
            .is_some_and(|v| !v.trim().is_empty())
    }

    pub fn is_confirmed(&self) -> bool {
        self.status.is_confirmed()
    }

    /// Vendor chosen, amount present and status confirmed.
    pub fn is_eligible(&self) -> bool {
        self.vendor_selected() && self.amount() > 0 && self.is_confirmed()
    }

    /// The allocation view of this contract, if it participates in consumption.
    pub fn eligible(&self) -> Option<EligibleContract> {
        if !self.is_eligible() {
            return None;
        }
        Some(EligibleContract {
            contract_id: self.contract_id.clone(),
            amount: self.amount(),
            self_first: self.use_self_points_first,
            service_category: self.service_category.clone(),
            work_end_date: self.work_end_date,
        })
    }
}

/// A contract that passed the eligibility filter, with its amount already parsed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibleContract {
    pub contract_id: ContractId,
    pub amount: Points,
    pub self_first: bool,
    pub service_category: Option<String>,
    pub work_end_date: Option<NaiveDate>,
}

/// Filter a game's contracts down to the ones that consume points.
pub fn eligible_contracts<'a, I>(contracts: I) -> Vec<EligibleContract>
where
    I: IntoIterator<Item = &'a ContractRecord>,
{
    contracts
        .into_iter()
        .filter_map(ContractRecord::eligible)
        .collect()
}

/// Parse a work end date as written in the sheet ("2025-03-31", "2025.03.31", "2025/03/31").
/// Blank input is `Ok(None)`.
pub fn parse_work_date(raw: &str) -> Result<Option<NaiveDate>, ValidationError> {
    let trimmed = raw.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        return Ok(None);
    }
    for fmt in ["%Y-%m-%d", "%Y.%m.%d", "%Y/%m/%d", "%Y. %m. %d"] {
        if let Ok(d) = NaiveDate::parse_from_str(trimmed, fmt) {
            return Ok(Some(d));
        }
    }
    Err(ValidationError::InvalidDate(raw.to_string()))
}

/// Validation errors for records entering the core.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Stored total disagrees with base + self + enabled excellence bonuses.
    #[error("game {game}: stored total {stored} != derived total {derived}")]
    TotalMismatch {
        game: GameId,
        stored: Points,
        derived: Points,
    },
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("{field} must be non-negative, got {value}")]
    NegativePoints { field: &'static str, value: i64 },
    #[error("unknown excellence tier: {0}")]
    UnknownTier(String),
    #[error("unparseable date: {0}")]
    InvalidDate(String),
}

/// Convert a signed integer column into points.
pub fn non_negative(field: &'static str, value: i64) -> Result<Points, ValidationError> {
    u64::try_from(value).map_err(|_| ValidationError::NegativePoints { field, value })
}
