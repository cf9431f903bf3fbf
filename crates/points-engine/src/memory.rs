//! In-process [`PointStore`] for tests, benches and dry runs.

use points_core::{
    ContractId, ContractRecord, GameId, PointPool, PointStore, Points, StoreError,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct State {
    pools: BTreeMap<GameId, PointPool>,
    contracts: Vec<ContractRecord>,
    failing_writes: HashSet<ContractId>,
    game_reads: usize,
}

/// Keeps pools and contracts in memory. Contracts keep insertion order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn with_data(
        pools: impl IntoIterator<Item = PointPool>,
        contracts: impl IntoIterator<Item = ContractRecord>,
    ) -> Self {
        let state = State {
            pools: pools.into_iter().map(|p| (p.game_id, p)).collect(),
            contracts: contracts.into_iter().collect(),
            failing_writes: HashSet::new(),
            game_reads: 0,
        };
        Self {
            state: Mutex::new(state),
        }
    }

    /// Make usage write-back for `id` fail from now on.
    pub fn fail_writes_for(&self, id: ContractId) {
        self.lock().failing_writes.insert(id);
    }

    /// How many times a game's contracts have been listed.
    pub fn game_reads(&self) -> usize {
        self.lock().game_reads
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl State {
    fn contract_mut(&mut self, id: &ContractId) -> Result<&mut ContractRecord, StoreError> {
        self.contracts
            .iter_mut()
            .find(|c| &c.contract_id == id)
            .ok_or_else(|| StoreError::NotFound(format!("contract {id}")))
    }
}

impl PointStore for MemoryStore {
    async fn point_pool(&self, game: GameId) -> Result<Option<PointPool>, StoreError> {
        Ok(self.lock().pools.get(&game).cloned())
    }

    async fn point_pools(&self) -> Result<Vec<PointPool>, StoreError> {
        let mut pools: Vec<PointPool> = self.lock().pools.values().cloned().collect();
        pools.sort_by(|a, b| {
            a.company_name
                .cmp(&b.company_name)
                .then(a.game_id.cmp(&b.game_id))
        });
        Ok(pools)
    }

    async fn contracts_for_game(&self, game: GameId) -> Result<Vec<ContractRecord>, StoreError> {
        let mut state = self.lock();
        state.game_reads += 1;
        Ok(state
            .contracts
            .iter()
            .filter(|c| c.assigned_game == Some(game))
            .cloned()
            .collect())
    }

    async fn contracts_for_company(&self, company: &str) -> Result<Vec<ContractRecord>, StoreError> {
        Ok(self
            .lock()
            .contracts
            .iter()
            .filter(|c| c.company_name == company)
            .cloned()
            .collect())
    }

    async fn contract(&self, id: &ContractId) -> Result<Option<ContractRecord>, StoreError> {
        Ok(self
            .lock()
            .contracts
            .iter()
            .find(|c| &c.contract_id == id)
            .cloned())
    }

    async fn set_contract_points_used(
        &self,
        id: &ContractId,
        base_points_used: Points,
        self_points_used: Points,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        if state.failing_writes.contains(id) {
            return Err(StoreError::Backend(format!("injected write failure for {id}")));
        }
        let c = state.contract_mut(id)?;
        c.base_points_used = base_points_used;
        c.self_points_used = self_points_used;
        Ok(())
    }

    async fn set_self_points_first(&self, id: &ContractId, enabled: bool) -> Result<(), StoreError> {
        self.lock().contract_mut(id)?.use_self_points_first = enabled;
        Ok(())
    }

    async fn save_point_pool(&self, pool: &PointPool) -> Result<(), StoreError> {
        self.lock().pools.insert(pool.game_id, pool.clone());
        Ok(())
    }

    async fn save_contract(&self, contract: &ContractRecord) -> Result<(), StoreError> {
        let mut state = self.lock();
        let at = state
            .contracts
            .iter()
            .position(|c| c.contract_id == contract.contract_id);
        match at {
            Some(i) => {
                let existing = &mut state.contracts[i];
                let (base, own) = (existing.base_points_used, existing.self_points_used);
                *existing = contract.clone();
                existing.base_points_used = base;
                existing.self_points_used = own;
            }
            None => state.contracts.push(contract.clone()),
        }
        Ok(())
    }
}
