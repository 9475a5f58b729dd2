use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by the rotation engine.
///
/// Every validation and state-machine violation carries its specific kind so
/// callers can render an accurate message. Retryable processor failures are
/// absorbed by the collection state machine and never reach callers.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("payout already processed for pool {pool_id} round {round}")]
    AlreadyProcessed { pool_id: u64, round: u32 },

    #[error("invalid permutation: {0}")]
    InvalidPermutation(String),

    #[error("pool {0} is closed")]
    PoolClosed(u64),

    #[error("pool {0} is full")]
    PoolFull(u64),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("invalid collection state: {0}")]
    InvalidState(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("processor declined: {reason} (retryable: {retryable})")]
    Processor { reason: String, retryable: bool },

    #[error("processor call timed out after {0:?}")]
    Timeout(Duration),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(String),
}
