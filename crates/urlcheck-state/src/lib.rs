//! urlcheck-state — check and result storage for urlcheck.
//!
//! Defines the domain model (checks, results, retention roles), the store
//! contracts the scheduling core consumes ([`CheckStore`], [`ResultStore`],
//! [`RetentionPolicy`]), and an embedded implementation of all three backed
//! by [redb](https://docs.rs/redb).
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns,
//! keyed by store-assigned `u64` ids drawn from a sequence table.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks and worker threads.

pub mod error;
pub mod repository;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use repository::{CheckStore, ResultStore, RetentionPolicy};
pub use store::StateStore;
pub use types::*;
