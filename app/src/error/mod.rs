use thiserror::Error;

#[derive(Debug, Error)]
pub enum TournamentError {
    #[error("Tournament is busy, retry shortly")]
    Busy,
    #[error("{0}")]
    InvalidState(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("Round exceeded its time budget")]
    Timeout,
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

pub type TournamentResult<T> = Result<T, TournamentError>;

impl TournamentError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Stable code carried in failure envelopes.
    pub fn code(&self) -> i32 {
        match self {
            Self::Busy => 1001,
            Self::InvalidState(_) => 1002,
            Self::NotFound(_) => 1003,
            Self::Timeout => 1004,
            Self::StoreUnavailable(_) => 1005,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy | Self::StoreUnavailable(_))
    }
}

impl From<redis::RedisError> for TournamentError {
    fn from(err: redis::RedisError) -> Self {
        Self::StoreUnavailable(format!("redis: {err}"))
    }
}

impl From<sea_orm::DbErr> for TournamentError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::StoreUnavailable(format!("database: {err}"))
    }
}

impl From<serde_json::Error> for TournamentError {
    fn from(err: serde_json::Error) -> Self {
        Self::StoreUnavailable(format!("corrupt stored value: {err}"))
    }
}
