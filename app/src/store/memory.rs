use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::{sync::Mutex, time::Instant};

use super::backend::{KvBackend, KvOp};
use crate::error::{TournamentError, TournamentResult};

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Hash(HashMap<String, String>),
    List(Vec<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

type Storage = HashMap<String, Entry>;

/// In-process stand-in for Redis with per-key expiry.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    data: Arc<Mutex<Storage>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.data
            .lock()
            .await
            .values()
            .filter(|e| e.is_live(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remaining time to live of `key`, `None` when absent or persistent.
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let data = self.data.lock().await;
        let entry = data.get(key).filter(|e| e.is_live(now))?;
        entry.expires_at.map(|at| at - now)
    }
}

fn live<'a>(data: &'a mut Storage, key: &str, now: Instant) -> Option<&'a mut Entry> {
    if data.get(key).is_some_and(|e| !e.is_live(now)) {
        data.remove(key);
    }
    data.get_mut(key)
}

fn wrong_type(key: &str) -> TournamentError {
    TournamentError::StoreUnavailable(format!(
        "WRONGTYPE operation against key {key} holding the wrong kind of value"
    ))
}

fn apply_op(data: &mut Storage, op: KvOp, now: Instant) -> TournamentResult<()> {
    match op {
        KvOp::HSet { fields, .. } if fields.is_empty() => {}
        KvOp::HSet { key, fields } => {
            let entry = live(data, &key, now);
            match entry {
                Some(Entry {
                    value: Value::Hash(hash),
                    ..
                }) => hash.extend(fields),
                Some(_) => return Err(wrong_type(&key)),
                None => {
                    data.insert(
                        key,
                        Entry {
                            value: Value::Hash(fields.into_iter().collect()),
                            expires_at: None,
                        },
                    );
                }
            }
        }
        KvOp::Del { key } => {
            data.remove(&key);
        }
        KvOp::RPush { values, .. } if values.is_empty() => {}
        KvOp::RPush { key, values } => {
            let entry = live(data, &key, now);
            match entry {
                Some(Entry {
                    value: Value::List(list),
                    ..
                }) => list.extend(values),
                Some(_) => return Err(wrong_type(&key)),
                None => {
                    data.insert(
                        key,
                        Entry {
                            value: Value::List(values),
                            expires_at: None,
                        },
                    );
                }
            }
        }
        KvOp::Expire { key, ttl } => {
            if let Some(entry) = live(data, &key, now) {
                entry.expires_at = Some(now + ttl);
            }
        }
    }
    Ok(())
}

#[async_trait]
impl KvBackend for MemoryBackend {
    async fn hgetall(&self, key: &str) -> TournamentResult<HashMap<String, String>> {
        let mut data = self.data.lock().await;
        match live(&mut data, key, Instant::now()) {
            Some(Entry {
                value: Value::Hash(hash),
                ..
            }) => Ok(hash.clone()),
            Some(_) => Err(wrong_type(key)),
            None => Ok(HashMap::new()),
        }
    }

    async fn lrange(&self, key: &str) -> TournamentResult<Vec<String>> {
        let mut data = self.data.lock().await;
        match live(&mut data, key, Instant::now()) {
            Some(Entry {
                value: Value::List(list),
                ..
            }) => Ok(list.clone()),
            Some(_) => Err(wrong_type(key)),
            None => Ok(Vec::new()),
        }
    }

    async fn apply(&self, ops: Vec<KvOp>) -> TournamentResult<()> {
        let mut data = self.data.lock().await;
        let now = Instant::now();
        // work on a copy so a failing op leaves nothing half-written
        let mut staged = data.clone();
        for op in ops {
            apply_op(&mut staged, op, now)?;
        }
        *data = staged;
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> TournamentResult<bool> {
        let mut data = self.data.lock().await;
        let now = Instant::now();
        if live(&mut data, key, now).is_some() {
            return Ok(false);
        }
        data.insert(
            key.to_owned(),
            Entry {
                value: Value::Str(value.to_owned()),
                expires_at: Some(now + ttl),
            },
        );
        Ok(true)
    }

    async fn del(&self, keys: &[String]) -> TournamentResult<()> {
        let mut data = self.data.lock().await;
        for key in keys {
            data.remove(key);
        }
        Ok(())
    }
}
