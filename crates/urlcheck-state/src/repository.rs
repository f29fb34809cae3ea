//! Store contracts consumed by the scheduling core.
//!
//! The scheduler only ever talks to storage through these traits, so a
//! networked backend can stand in for the embedded [`StateStore`].
//!
//! [`StateStore`]: crate::StateStore

use crate::error::StateResult;
use crate::types::*;

/// Durable record of monitored checks and their scheduling state.
pub trait CheckStore: Send + Sync {
    /// Checks admitted by `query`, oldest `refresh` first, at most
    /// `query.pool_size` of them.
    fn find_electable(&self, query: &ElectionQuery) -> StateResult<Vec<Check>>;

    /// Atomically claim each candidate whose stored version still matches.
    ///
    /// Returns the claimed rows as stored. Candidates lost to a concurrent
    /// claim are omitted; that is not an error.
    fn claim(&self, candidates: &[Check], claim: &Claim) -> StateResult<Vec<Check>>;

    /// Write back reconciled checks in one batch.
    ///
    /// A row is applied only while the store still holds it at the same
    /// version, claimed by the same probe. Returns the number applied.
    fn batch_persist(&self, checks: &[Check]) -> StateResult<usize>;
}

/// Append-only log of probe results.
pub trait ResultStore: Send + Sync {
    /// Persist a result and return it with its store-assigned id.
    fn save(&self, result: NewResult) -> StateResult<CheckResult>;

    /// Delete at most `limit` results past their owner's retention.
    /// Returns the number deleted.
    fn expire(&self, limit: usize, now: u64) -> StateResult<usize>;
}

/// Per-owner retention lookup, derived from role assignments.
pub trait RetentionPolicy: Send + Sync {
    /// Maximum `result_retention` (seconds) across the owner's roles, or
    /// `None` if the owner holds no role.
    fn max_retention(&self, user_id: UserId) -> StateResult<Option<u64>>;
}
