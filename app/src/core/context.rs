use std::sync::Arc;

use sea_orm::DbConn;
use tracing::{debug, warn};

use crate::{
    broadcast::Broadcaster,
    config::TournamentSettings,
    error::TournamentResult,
    lock::DistributedLock,
    presence::PresenceRegistry,
    store::{KvBackend, TournamentStore},
};

/// Everything a coordinator or an inbound operation needs to touch a tournament.
#[derive(Clone)]
pub struct TournamentContext {
    pub conn: DbConn,
    pub store: TournamentStore,
    pub lock: DistributedLock,
    pub broadcaster: Arc<dyn Broadcaster>,
    pub presence: PresenceRegistry,
    pub settings: TournamentSettings,
}

impl TournamentContext {
    pub fn new(
        conn: DbConn,
        backend: Arc<dyn KvBackend>,
        broadcaster: Arc<dyn Broadcaster>,
        presence: PresenceRegistry,
        settings: TournamentSettings,
    ) -> Self {
        Self {
            store: TournamentStore::new(backend.clone(), conn.clone(), settings.clone()),
            lock: DistributedLock::new(backend),
            conn,
            broadcaster,
            presence,
            settings,
        }
    }

    /// Runs `op` under the tournament lock, retrying a held lock a few times
    /// before giving up with `Busy`.
    pub(crate) async fn locked<T, F, Fut>(&self, tournament_id: &str, op: F) -> TournamentResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = TournamentResult<T>>,
    {
        self.lock
            .acquire_with_retry(
                tournament_id,
                self.settings.lock_ttl,
                self.settings.lock_retry_attempts,
                self.settings.lock_retry_delay,
            )
            .await?;
        let result = op().await;
        self.release(tournament_id).await;
        result
    }

    /// Single attempt at the lock; `None` when someone else holds it.
    pub(crate) async fn try_locked<T, F, Fut>(
        &self,
        tournament_id: &str,
        op: F,
    ) -> TournamentResult<Option<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = TournamentResult<T>>,
    {
        if !self.lock.acquire(tournament_id, self.settings.lock_ttl).await? {
            debug!(tournament_id, "lock held elsewhere, skipping this pass");
            return Ok(None);
        }
        let result = op().await;
        self.release(tournament_id).await;
        result.map(Some)
    }

    async fn release(&self, tournament_id: &str) {
        if let Err(e) = self.lock.release(tournament_id).await {
            warn!(tournament_id, "Failed to release tournament lock: {}", e);
        }
    }
}
