use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;

use crate::error::TournamentResult;

/// One step of an atomic write batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvOp {
    HSet {
        key: String,
        fields: Vec<(String, String)>,
    },
    Del {
        key: String,
    },
    RPush {
        key: String,
        values: Vec<String>,
    },
    Expire {
        key: String,
        ttl: Duration,
    },
}

/// The slice of a Redis-like store the tournament subsystem relies on.
#[async_trait]
pub trait KvBackend: Send + Sync {
    async fn hgetall(&self, key: &str) -> TournamentResult<HashMap<String, String>>;

    async fn lrange(&self, key: &str) -> TournamentResult<Vec<String>>;

    /// Applies every op or none of them.
    async fn apply(&self, ops: Vec<KvOp>) -> TournamentResult<()>;

    /// Sets `key` only if it is absent. Returns whether the value was written.
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> TournamentResult<bool>;

    async fn del(&self, keys: &[String]) -> TournamentResult<()>;
}
