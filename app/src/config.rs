use anyhow::{Context, Result};
use std::{ops::Deref, str::FromStr, sync::Arc, time::Duration};

/// How a round that ran out of time decides each unfinished game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeoutPolicy {
    /// If exactly one side is connected it advances, otherwise pick at random.
    #[default]
    PreferConnected,
    Random,
}

impl FromStr for TimeoutPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "prefer_connected" => Ok(Self::PreferConnected),
            "random" => Ok(Self::Random),
            other => Err(anyhow::anyhow!("unknown timeout policy: {other}")),
        }
    }
}

/// Timings and expirations that drive the tournament lifecycle.
#[derive(Debug, Clone)]
pub struct TournamentSettings {
    pub init_poll: Duration,
    pub idle_poll: Duration,
    pub round_poll: Duration,
    pub round_timeout: Duration,
    pub round_grace: Duration,
    pub lock_ttl: Duration,
    pub lock_retry_attempts: u32,
    pub lock_retry_delay: Duration,
    pub read_cache_ttl: Duration,
    pub root_ttl: Duration,
    pub active_games_ttl: Duration,
    pub round_ttl: Duration,
    pub completed_ttl: Duration,
    pub eviction_delay: Duration,
    pub timeout_policy: TimeoutPolicy,
}

impl Default for TournamentSettings {
    fn default() -> Self {
        Self {
            init_poll: Duration::from_secs(1),
            idle_poll: Duration::from_secs(2),
            round_poll: Duration::from_secs(5),
            round_timeout: Duration::from_secs(300),
            round_grace: Duration::from_secs(3),
            lock_ttl: Duration::from_secs(30),
            lock_retry_attempts: 10,
            lock_retry_delay: Duration::from_millis(50),
            read_cache_ttl: Duration::from_secs(10),
            root_ttl: Duration::from_secs(6 * 60 * 60),
            // shorter than the round timeout: an orphaned round clears itself
            active_games_ttl: Duration::from_secs(240),
            round_ttl: Duration::from_secs(30 * 60),
            completed_ttl: Duration::from_secs(60 * 60),
            eviction_delay: Duration::from_secs(15 * 60),
            timeout_policy: TimeoutPolicy::PreferConnected,
        }
    }
}

impl TournamentSettings {
    /// Defaults overridden by whichever tuning variables are present.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            init_poll: env_millis("INIT_POLL_MS", defaults.init_poll)?,
            idle_poll: env_millis("IDLE_POLL_MS", defaults.idle_poll)?,
            round_poll: env_millis("ROUND_POLL_MS", defaults.round_poll)?,
            round_timeout: env_secs("ROUND_TIMEOUT_SECS", defaults.round_timeout)?,
            round_grace: env_millis("ROUND_GRACE_MS", defaults.round_grace)?,
            lock_ttl: env_secs("LOCK_TTL_SECS", defaults.lock_ttl)?,
            lock_retry_attempts: env_parse("LOCK_RETRY_ATTEMPTS", defaults.lock_retry_attempts)?,
            lock_retry_delay: env_millis("LOCK_RETRY_DELAY_MS", defaults.lock_retry_delay)?,
            read_cache_ttl: env_millis("READ_CACHE_TTL_MS", defaults.read_cache_ttl)?,
            root_ttl: env_secs("ROOT_TTL_SECS", defaults.root_ttl)?,
            active_games_ttl: env_secs("ACTIVE_GAMES_TTL_SECS", defaults.active_games_ttl)?,
            round_ttl: env_secs("ROUND_TTL_SECS", defaults.round_ttl)?,
            completed_ttl: env_secs("COMPLETED_TTL_SECS", defaults.completed_ttl)?,
            eviction_delay: env_secs("EVICTION_DELAY_SECS", defaults.eviction_delay)?,
            timeout_policy: env_parse("TIMEOUT_POLICY", defaults.timeout_policy)?,
        })
    }
}

pub struct ConfigInner {
    pub db_url: String,
    pub redis_url: String,
    pub host: String,
    pub port: u16,
    pub allowed_origin: String,
    pub tournament: TournamentSettings,
}

#[derive(Clone)]
pub struct Config(Arc<ConfigInner>);

impl Config {
    pub fn from_env() -> Result<Config> {
        let v = ConfigInner {
            db_url: std::env::var("DATABASE_URL").context("DATABASE_URL is not set in .env file")?,
            redis_url: std::env::var("REDIS_URL").context("REDIS_URL is not set in .env file")?,
            host: std::env::var("HOST").context("HOST is not set in .env file")?,
            port: std::env::var("PORT")
                .context("PORT is not set in .env file")?
                .parse()
                .context("PORT is not a number")?,
            allowed_origin: std::env::var("ALLOWED_ORIGIN")
                .context("ALLOWED_ORIGIN is not set in .env file")?,
            tournament: TournamentSettings::from_env()?,
        };

        Ok(Self(Arc::new(v)))
    }

    pub fn get_server_url(&self) -> String {
        format!("{}:{}", self.0.host, self.0.port)
    }
}

impl Deref for Config {
    type Target = ConfigInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

fn env_parse<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("{name} is not valid: {e}")),
        Err(_) => Ok(default),
    }
}

fn env_millis(name: &str, default: Duration) -> Result<Duration> {
    let millis = env_parse(name, default.as_millis() as u64)?;
    Ok(Duration::from_millis(millis))
}

fn env_secs(name: &str, default: Duration) -> Result<Duration> {
    let secs = env_parse(name, default.as_secs())?;
    Ok(Duration::from_secs(secs))
}
