use crate::{EngineError, GameLocks};
use points_core::{
    ContractId, ContractRecord, ExcellenceTier, GameId, PointPool, PointStore, Points,
};
use tracing::{debug, info};

/// Edits the inputs reconciliation depends on: contract policy flags and
/// excellence tiers. Edits on an assigned game wait for its reconciliation.
pub struct PolicyEditor<'a, S> {
    store: &'a S,
    locks: &'a GameLocks,
    excellence_bonus: Points,
}

impl<'a, S: PointStore> PolicyEditor<'a, S> {
    pub fn new(store: &'a S, locks: &'a GameLocks, excellence_bonus: Points) -> Self {
        Self {
            store,
            locks,
            excellence_bonus,
        }
    }

    /// Flip a contract's self-points-first flag.
    ///
    /// Only confirmed contracts with a vendor and an amount accept the change.
    /// Eligibility is checked under the assigned game's lock.
    pub async fn set_self_points_first(
        &self,
        id: &ContractId,
        enabled: bool,
    ) -> Result<(), EngineError> {
        let game = self.load_contract(id).await?.assigned_game;
        let _guard = match game {
            Some(game) => Some(self.locks.acquire(game).await),
            None => None,
        };

        let contract = self.load_contract(id).await?;
        if contract.assigned_game != game {
            debug!(contract = %id, "contract reassigned while waiting for its game");
        }
        if !contract.is_eligible() {
            return Err(EngineError::PolicyNotSettable(id.clone()));
        }
        self.store.set_self_points_first(id, enabled).await?;
        info!(contract = %id, enabled, "self-points-first updated");
        Ok(())
    }

    async fn load_contract(&self, id: &ContractId) -> Result<ContractRecord, EngineError> {
        self.store
            .contract(id)
            .await?
            .ok_or_else(|| EngineError::ContractNotFound(id.clone()))
    }

    /// Switch an excellence tier on or off and persist the new total.
    pub async fn set_excellence(
        &self,
        game: GameId,
        tier: ExcellenceTier,
        enabled: bool,
    ) -> Result<PointPool, EngineError> {
        let _guard = self.locks.acquire(game).await;
        let mut pool = self
            .store
            .point_pool(game)
            .await?
            .ok_or(EngineError::GameNotFound(game))?;

        pool.set_tier(tier, enabled, self.excellence_bonus);
        pool.validate()?;
        self.store.save_point_pool(&pool).await?;
        info!(
            %game,
            tier = tier.label(),
            enabled,
            total = pool.total_points,
            "excellence tier updated"
        );
        Ok(pool)
    }
}
