use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use redis::{AsyncCommands, Client, aio::ConnectionManager};
use tracing::info;

use super::backend::{KvBackend, KvOp};
use crate::error::TournamentResult;

/// Shared Redis connection; clones share the same multiplexed connection.
#[derive(Clone)]
pub struct RedisBackend {
    conn: ConnectionManager,
}

impl RedisBackend {
    pub async fn connect(redis_url: &str) -> TournamentResult<Self> {
        let client = Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        info!("Connected to redis at {}", redis_url);
        Ok(Self { conn })
    }
}

fn millis(ttl: Duration) -> i64 {
    ttl.as_millis().max(1) as i64
}

#[async_trait]
impl KvBackend for RedisBackend {
    async fn hgetall(&self, key: &str) -> TournamentResult<HashMap<String, String>> {
        let mut conn = self.conn.clone();
        Ok(conn.hgetall(key).await?)
    }

    async fn lrange(&self, key: &str) -> TournamentResult<Vec<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.lrange(key, 0, -1).await?)
    }

    async fn apply(&self, ops: Vec<KvOp>) -> TournamentResult<()> {
        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in ops {
            match op {
                KvOp::HSet { key, fields } => {
                    if !fields.is_empty() {
                        pipe.hset_multiple(key, &fields).ignore();
                    }
                }
                KvOp::Del { key } => {
                    pipe.del(key).ignore();
                }
                KvOp::RPush { key, values } => {
                    if !values.is_empty() {
                        pipe.rpush(key, values).ignore();
                    }
                }
                KvOp::Expire { key, ttl } => {
                    pipe.pexpire(key, millis(ttl)).ignore();
                }
            }
        }

        let mut conn = self.conn.clone();
        pipe.query_async::<()>(&mut conn).await?;
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> TournamentResult<bool> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(millis(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn del(&self, keys: &[String]) -> TournamentResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(keys).await?;
        Ok(())
    }
}
