use points_core::GameId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per game; writers of the same game queue up.
#[derive(Debug, Default)]
pub struct GameLocks {
    inner: Mutex<HashMap<GameId, Arc<AsyncMutex<()>>>>,
}

impl GameLocks {
    /// Wait for exclusive access to `game`. Released when the guard drops.
    pub async fn acquire(&self, game: GameId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(map.entry(game).or_default())
        };
        lock.lock_owned().await
    }
}
