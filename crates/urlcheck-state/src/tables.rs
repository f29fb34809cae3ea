//! redb table definitions for the urlcheck state store.
//!
//! Record tables use `u64` keys (store-assigned identities) and `&[u8]`
//! values holding JSON-serialized domain types.

use redb::TableDefinition;

/// Checks keyed by check id.
pub const CHECKS: TableDefinition<u64, &[u8]> = TableDefinition::new("checks");

/// Probe results keyed by result id. Ids grow monotonically, so key order
/// is creation order.
pub const RESULTS: TableDefinition<u64, &[u8]> = TableDefinition::new("results");

/// Roles keyed by role id.
pub const ROLES: TableDefinition<u64, &[u8]> = TableDefinition::new("roles");

/// Role ids assigned to an owner, keyed by user id.
pub const ROLE_ASSIGNMENTS: TableDefinition<u64, &[u8]> =
    TableDefinition::new("role_assignments");

/// Id sequences keyed by record kind.
pub const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

pub const CHECK_SEQUENCE: &str = "check";
pub const RESULT_SEQUENCE: &str = "result";
