//! Scheduler error types.

use thiserror::Error;

use urlcheck_state::CheckId;

/// Errors that can occur during scheduling operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A check was reconciled by a probe that does not hold its claim.
    #[error("check {check_id} is not claimed by this probe: {reason}")]
    ClaimViolation { check_id: CheckId, reason: String },

    #[error("state store error: {0}")]
    State(#[from] urlcheck_state::StateError),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
