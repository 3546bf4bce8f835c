use std::{sync::Arc, time::Duration};

use tracing::{debug, warn};

use crate::{
    error::{TournamentError, TournamentResult},
    store::KvBackend,
};

const LOCK_TOKEN_LENGTH: usize = 21;

pub fn lock_key(tournament_id: &str) -> String {
    format!("tournament_lock:{tournament_id}")
}

/// Per-tournament mutual exclusion held in the shared store.
///
/// Acquisition never queues: a held lock is reported as `false` and the
/// caller decides whether to surface `Busy`. Release is unconditional, so a
/// lock that outlived its TTL and was re-taken elsewhere is dropped as well;
/// every mutation re-reads the state under the lock before acting.
#[derive(Clone)]
pub struct DistributedLock {
    backend: Arc<dyn KvBackend>,
}

impl DistributedLock {
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self { backend }
    }

    pub async fn acquire(&self, tournament_id: &str, timeout: Duration) -> TournamentResult<bool> {
        let token = nanoid::nanoid!(LOCK_TOKEN_LENGTH);
        let acquired = self
            .backend
            .set_nx(&lock_key(tournament_id), &token, timeout)
            .await?;
        debug!(tournament_id, acquired, "lock acquire attempt");
        Ok(acquired)
    }

    /// Retries a held lock `attempts` times, `delay` apart, then reports `Busy`.
    pub async fn acquire_with_retry(
        &self,
        tournament_id: &str,
        timeout: Duration,
        attempts: u32,
        delay: Duration,
    ) -> TournamentResult<()> {
        for attempt in 0..attempts.max(1) {
            if self.acquire(tournament_id, timeout).await? {
                return Ok(());
            }
            if attempt + 1 < attempts {
                tokio::time::sleep(delay).await;
            }
        }
        warn!(tournament_id, "Tournament lock busy after {} attempts", attempts);
        Err(TournamentError::Busy)
    }

    pub async fn release(&self, tournament_id: &str) -> TournamentResult<()> {
        self.backend.del(&[lock_key(tournament_id)]).await
    }
}
