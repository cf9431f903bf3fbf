//! Storage collaborator consumed by the aggregators.

use crate::{ContractId, ContractRecord, GameId, PointPool, Points, ValidationError};
use std::future::Future;
use thiserror::Error;

/// Errors surfaced by a [`PointStore`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend: {0}")]
    Backend(String),
    #[error("invalid stored record: {0}")]
    Invalid(#[from] ValidationError),
    #[error("no such {0}")]
    NotFound(String),
}

/// Read/write access to point pools and contracts.
///
/// Reads return every contract assigned to a game; eligibility filtering is
/// left to the caller via [`ContractRecord::is_eligible`]. Writes of point
/// usage touch one contract at a time and must set both fields together.
pub trait PointStore: Send + Sync {
    fn point_pool(
        &self,
        game: GameId,
    ) -> impl Future<Output = Result<Option<PointPool>, StoreError>> + Send;

    /// All registered games, ordered by company name then id.
    fn point_pools(&self) -> impl Future<Output = Result<Vec<PointPool>, StoreError>> + Send;

    fn contracts_for_game(
        &self,
        game: GameId,
    ) -> impl Future<Output = Result<Vec<ContractRecord>, StoreError>> + Send;

    fn contracts_for_company(
        &self,
        company: &str,
    ) -> impl Future<Output = Result<Vec<ContractRecord>, StoreError>> + Send;

    fn contract(
        &self,
        id: &ContractId,
    ) -> impl Future<Output = Result<Option<ContractRecord>, StoreError>> + Send;

    /// Overwrite the reconciled usage of one contract.
    fn set_contract_points_used(
        &self,
        id: &ContractId,
        base_points_used: Points,
        self_points_used: Points,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn set_self_points_first(
        &self,
        id: &ContractId,
        enabled: bool,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Insert or replace a game's pool.
    fn save_point_pool(
        &self,
        pool: &PointPool,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Insert or update a contract. Reconciled usage of an existing row is kept.
    fn save_contract(
        &self,
        contract: &ContractRecord,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}
