//! urlcheck-scheduler — check election, status reconciliation, and result
//! retention.
//!
//! Each probe process runs one [`CheckScheduler`]. Every tick it:
//!
//! - Elects and claims due checks through the shared [`CheckStore`], so
//!   that probes sharing a store never check the same URL concurrently
//! - Probes the claimed checks with bounded parallelism
//! - Reconciles each outcome through the anti-flap state machine
//! - Appends results and writes the checks back in one batch
//!
//! A [`RetentionSweeper`] runs alongside, trimming old results per owner.
//!
//! # Architecture
//!
//! ```text
//! CheckScheduler
//!   ├── Election ──────────── CheckStore (find_electable, claim)
//!   ├── Prober (HTTP GET, buffer_unordered(pool_size))
//!   ├── reconcile() ───────── pure state machine
//!   ├── ResultStore (save)
//!   └── CheckStore (batch_persist)
//!
//! RetentionSweeper ───────── ResultStore (expire, in bounded batches)
//! ```
//!
//! [`CheckStore`]: urlcheck_state::CheckStore

pub mod driver;
pub mod election;
pub mod error;
pub mod reconciler;
pub mod retention;

pub use driver::{
    CheckScheduler, DEFAULT_POOL_SIZE, DEFAULT_TICK_INTERVAL, SchedulerConfig, TickReport,
};
pub use election::{DEFAULT_LEASE_TIMEOUT, Election};
pub use error::{SchedulerError, SchedulerResult};
pub use reconciler::{Reconciliation, Transition, reconcile};
pub use retention::{DEFAULT_EXPIRY_LIMIT, DEFAULT_SWEEP_INTERVAL, RetentionSweeper};
