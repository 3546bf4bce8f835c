use std::{
    collections::HashMap,
    future::Future,
    sync::{Arc, Mutex},
    time::Duration,
};

use app::{
    broadcast::Broadcaster,
    config::TournamentSettings,
    core::{TournamentContext, TournamentManager},
    error::{TournamentError, TournamentResult},
    presence::PresenceRegistry,
    store::{KvBackend, KvOp, MemoryBackend},
};
use async_trait::async_trait;
use models::schemas::events::TournamentEvent;
use sea_orm::DatabaseConnection;
use tokio::sync::Mutex as AsyncMutex;
use utils::testing::setup_test_db;

#[derive(Default)]
pub struct RecordingBroadcaster {
    events: AsyncMutex<Vec<(String, TournamentEvent)>>,
}

impl RecordingBroadcaster {
    pub async fn events(&self) -> Vec<(String, TournamentEvent)> {
        self.events.lock().await.clone()
    }

    pub async fn in_room(&self, room: &str) -> Vec<TournamentEvent> {
        self.events
            .lock()
            .await
            .iter()
            .filter(|(r, _)| r == room)
            .map(|(_, e)| e.clone())
            .collect()
    }
}

#[async_trait]
impl Broadcaster for RecordingBroadcaster {
    async fn emit(&self, room: &str, event: &TournamentEvent) {
        self.events.lock().await.push((room.to_owned(), event.clone()));
    }
}

/// `MemoryBackend` whose write batches can be made to fail on demand.
pub struct FlakyBackend {
    inner: MemoryBackend,
    /// Batches still allowed through before the next one fails.
    fail_after: Mutex<Option<usize>>,
}

impl FlakyBackend {
    pub fn new(inner: MemoryBackend) -> Self {
        Self {
            inner,
            fail_after: Mutex::new(None),
        }
    }

    /// Lets `skip` batches through, then fails exactly one.
    pub fn fail_batch_after(&self, skip: usize) {
        *self.fail_after.lock().unwrap() = Some(skip);
    }

    /// Whether a failure is still pending.
    pub fn armed(&self) -> bool {
        self.fail_after.lock().unwrap().is_some()
    }

    fn should_fail(&self) -> bool {
        let mut fail_after = self.fail_after.lock().unwrap();
        match *fail_after {
            Some(0) => {
                *fail_after = None;
                true
            }
            Some(n) => {
                *fail_after = Some(n - 1);
                false
            }
            None => false,
        }
    }
}

#[async_trait]
impl KvBackend for FlakyBackend {
    async fn hgetall(&self, key: &str) -> TournamentResult<HashMap<String, String>> {
        self.inner.hgetall(key).await
    }

    async fn lrange(&self, key: &str) -> TournamentResult<Vec<String>> {
        self.inner.lrange(key).await
    }

    async fn apply(&self, ops: Vec<KvOp>) -> TournamentResult<()> {
        if self.should_fail() {
            return Err(TournamentError::StoreUnavailable("connection reset".into()));
        }
        self.inner.apply(ops).await
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> TournamentResult<bool> {
        self.inner.set_nx(key, value, ttl).await
    }

    async fn del(&self, keys: &[String]) -> TournamentResult<()> {
        self.inner.del(keys).await
    }
}

/// Millisecond-scale timings so whole tournaments run within a test.
pub fn fast_settings() -> TournamentSettings {
    TournamentSettings {
        init_poll: Duration::from_millis(10),
        idle_poll: Duration::from_millis(10),
        round_poll: Duration::from_millis(10),
        round_timeout: Duration::from_secs(60),
        round_grace: Duration::from_millis(10),
        lock_ttl: Duration::from_secs(5),
        lock_retry_attempts: 100,
        lock_retry_delay: Duration::from_millis(5),
        read_cache_ttl: Duration::ZERO,
        eviction_delay: Duration::from_millis(50),
        ..TournamentSettings::default()
    }
}

pub struct Harness {
    pub conn: DatabaseConnection,
    pub backend: MemoryBackend,
    pub flaky: Arc<FlakyBackend>,
    pub broadcaster: Arc<RecordingBroadcaster>,
    pub presence: PresenceRegistry,
    pub manager: TournamentManager,
}

pub async fn harness(settings: TournamentSettings) -> Harness {
    let conn = setup_test_db("sqlite::memory:")
        .await
        .expect("Set up db failed!");
    let backend = MemoryBackend::new();
    let flaky = Arc::new(FlakyBackend::new(backend.clone()));
    let broadcaster = Arc::new(RecordingBroadcaster::default());
    let presence = PresenceRegistry::new();

    let ctx = TournamentContext::new(
        conn.clone(),
        flaky.clone(),
        broadcaster.clone(),
        presence.clone(),
        settings,
    );

    Harness {
        conn,
        backend,
        flaky,
        broadcaster,
        presence,
        manager: TournamentManager::new(ctx),
    }
}

/// Polls `check` until it holds or `timeout` passes.
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
