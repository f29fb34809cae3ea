//! StateStore — redb-backed persistence for checks, results and roles.
//!
//! Implements the [`CheckStore`], [`ResultStore`] and [`RetentionPolicy`]
//! contracts plus the handful of seeding and inspection operations the
//! daemon needs. All values are JSON-serialized into redb's `&[u8]` value
//! columns. The store supports both on-disk and in-memory backends (the
//! latter for testing).
//!
//! redb admits one write transaction at a time, so every claim and persist
//! batch below is atomic with respect to all other workers sharing the
//! database handle.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, WriteTransaction};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{StateError, StateResult};
use crate::repository::{CheckStore, ResultStore, RetentionPolicy};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(CHECKS).map_err(map_err!(Table))?;
        txn.open_table(RESULTS).map_err(map_err!(Table))?;
        txn.open_table(ROLES).map_err(map_err!(Table))?;
        txn.open_table(ROLE_ASSIGNMENTS).map_err(map_err!(Table))?;
        txn.open_table(SEQUENCES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Checks ─────────────────────────────────────────────────────

    /// Insert a new check, assigning it the next check id.
    pub fn insert_check(&self, check: &Check) -> StateResult<Check> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let stored = {
            let id = next_id(&txn, CHECK_SEQUENCE)?;
            let stored = Check {
                id,
                ..check.clone()
            };
            let value = encode(&stored)?;
            let mut table = txn.open_table(CHECKS).map_err(map_err!(Table))?;
            table
                .insert(id, value.as_slice())
                .map_err(map_err!(Write))?;
            stored
        };
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(check_id = stored.id, url = %stored.url, "check stored");
        Ok(stored)
    }

    /// Overwrite a check row as-is, without any version check.
    pub fn put_check(&self, check: &Check) -> StateResult<()> {
        let value = encode(check)?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(CHECKS).map_err(map_err!(Table))?;
            table
                .insert(check.id, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Get a check by id.
    pub fn get_check(&self, id: CheckId) -> StateResult<Option<Check>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(CHECKS).map_err(map_err!(Table))?;
        match table.get(id).map_err(map_err!(Read))? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Ok(None),
        }
    }

    /// List all checks in id order.
    pub fn list_checks(&self) -> StateResult<Vec<Check>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(CHECKS).map_err(map_err!(Table))?;
        let mut checks = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            checks.push(decode(value.value())?);
        }
        Ok(checks)
    }

    // ── Results ────────────────────────────────────────────────────

    /// Get a result by id.
    pub fn get_result(&self, id: ResultId) -> StateResult<Option<CheckResult>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RESULTS).map_err(map_err!(Table))?;
        match table.get(id).map_err(map_err!(Read))? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Ok(None),
        }
    }

    /// List all results recorded for a check, oldest first.
    pub fn list_results_for_check(&self, check_id: CheckId) -> StateResult<Vec<CheckResult>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RESULTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let result: CheckResult = decode(value.value())?;
            if result.check_id == check_id {
                results.push(result);
            }
        }
        Ok(results)
    }

    // ── Roles ──────────────────────────────────────────────────────

    /// Insert or update a role.
    pub fn put_role(&self, role: &Role) -> StateResult<()> {
        let value = encode(role)?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(ROLES).map_err(map_err!(Table))?;
            table
                .insert(role.id, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(role_id = role.id, name = %role.name, "role stored");
        Ok(())
    }

    /// Assign an existing role to an owner. Assigning twice is a no-op.
    pub fn assign_role(&self, user_id: UserId, role_id: RoleId) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let roles = txn.open_table(ROLES).map_err(map_err!(Table))?;
            if roles.get(role_id).map_err(map_err!(Read))?.is_none() {
                return Err(StateError::NotFound(format!("role {role_id}")));
            }

            let mut table = txn.open_table(ROLE_ASSIGNMENTS).map_err(map_err!(Table))?;
            let mut assigned: Vec<RoleId> = match table.get(user_id).map_err(map_err!(Read))? {
                Some(guard) => decode(guard.value())?,
                None => Vec::new(),
            };
            if !assigned.contains(&role_id) {
                assigned.push(role_id);
                let value = encode(&assigned)?;
                table
                    .insert(user_id, value.as_slice())
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(user_id, role_id, "role assigned");
        Ok(())
    }
}

impl CheckStore for StateStore {
    fn find_electable(&self, query: &ElectionQuery) -> StateResult<Vec<Check>> {
        let candidates = query.select(self.list_checks()?);
        debug!(
            probe = %query.probe,
            clustered = query.clustered,
            candidates = candidates.len(),
            "electable checks found"
        );
        Ok(candidates)
    }

    fn claim(&self, candidates: &[Check], claim: &Claim) -> StateResult<Vec<Check>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let mut claimed = Vec::with_capacity(candidates.len());
        {
            let mut table = txn.open_table(CHECKS).map_err(map_err!(Table))?;
            for candidate in candidates {
                let stored: Option<Check> = match table.get(candidate.id).map_err(map_err!(Read))? {
                    Some(guard) => Some(decode(guard.value())?),
                    None => None,
                };
                // Compare-and-swap on the version read at election time.
                match stored {
                    Some(stored) if stored.version == candidate.version => {
                        let elected = stored.claimed(claim);
                        let value = encode(&elected)?;
                        table
                            .insert(elected.id, value.as_slice())
                            .map_err(map_err!(Write))?;
                        claimed.push(elected);
                    }
                    _ => {
                        debug!(check_id = candidate.id, probe = %claim.probe, "claim lost");
                    }
                }
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(
            probe = %claim.probe,
            requested = candidates.len(),
            claimed = claimed.len(),
            "checks claimed"
        );
        Ok(claimed)
    }

    fn batch_persist(&self, checks: &[Check]) -> StateResult<usize> {
        if checks.is_empty() {
            return Ok(0);
        }

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let mut applied = 0;
        {
            let mut table = txn.open_table(CHECKS).map_err(map_err!(Table))?;
            for check in checks {
                let stored: Option<Check> = match table.get(check.id).map_err(map_err!(Read))? {
                    Some(guard) => Some(decode(guard.value())?),
                    None => None,
                };
                match stored {
                    Some(stored)
                        if stored.version == check.version
                            && stored.state == CheckState::Elected
                            && stored.probe == check.probe =>
                    {
                        let next = Check {
                            version: stored.version + 1,
                            ..check.clone()
                        };
                        let value = encode(&next)?;
                        table
                            .insert(next.id, value.as_slice())
                            .map_err(map_err!(Write))?;
                        applied += 1;
                    }
                    _ => {
                        warn!(
                            check_id = check.id,
                            version = check.version,
                            "check changed since claim, update skipped"
                        );
                    }
                }
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(requested = checks.len(), applied, "checks persisted");
        Ok(applied)
    }
}

impl ResultStore for StateStore {
    fn save(&self, result: NewResult) -> StateResult<CheckResult> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let saved = {
            let id = next_id(&txn, RESULT_SEQUENCE)?;
            let saved = result.with_id(id);
            let value = encode(&saved)?;
            let mut table = txn.open_table(RESULTS).map_err(map_err!(Table))?;
            table
                .insert(id, value.as_slice())
                .map_err(map_err!(Write))?;
            saved
        };
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(result_id = saved.id, check_id = saved.check_id, "result stored");
        Ok(saved)
    }

    fn expire(&self, limit: usize, now: u64) -> StateResult<usize> {
        if limit == 0 {
            return Ok(0);
        }

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let expired = {
            let checks = txn.open_table(CHECKS).map_err(map_err!(Table))?;
            let roles = txn.open_table(ROLES).map_err(map_err!(Table))?;
            let assignments = txn.open_table(ROLE_ASSIGNMENTS).map_err(map_err!(Table))?;
            let mut results = txn.open_table(RESULTS).map_err(map_err!(Table))?;

            let mut owners: HashMap<CheckId, Option<(UserId, Option<ResultId>)>> = HashMap::new();
            let mut retention: HashMap<UserId, Option<u64>> = HashMap::new();
            let mut doomed: Vec<ResultId> = Vec::new();

            for entry in results.iter().map_err(map_err!(Read))? {
                if doomed.len() >= limit {
                    break;
                }
                let (_, value) = entry.map_err(map_err!(Read))?;
                let result: CheckResult = decode(value.value())?;

                let owner = match owners.get(&result.check_id) {
                    Some(owner) => *owner,
                    None => {
                        let owner = match checks.get(result.check_id).map_err(map_err!(Read))? {
                            Some(guard) => {
                                let check: Check = decode(guard.value())?;
                                Some((check.user_id, check.latest_result_id))
                            }
                            None => None,
                        };
                        owners.insert(result.check_id, owner);
                        owner
                    }
                };
                // Orphaned results have no owner policy to apply.
                let Some((user_id, latest_result_id)) = owner else {
                    continue;
                };

                let max_retention = match retention.get(&user_id) {
                    Some(max) => *max,
                    None => {
                        let max = max_retention_from(&assignments, &roles, user_id)?;
                        retention.insert(user_id, max);
                        max
                    }
                };
                let Some(max_retention) = max_retention else {
                    continue;
                };

                if result.is_expirable(latest_result_id, max_retention, now) {
                    doomed.push(result.id);
                }
            }

            for id in &doomed {
                results.remove(*id).map_err(map_err!(Write))?;
            }
            doomed.len()
        };
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(limit, expired, "results expired");
        Ok(expired)
    }
}

impl RetentionPolicy for StateStore {
    fn max_retention(&self, user_id: UserId) -> StateResult<Option<u64>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let roles = txn.open_table(ROLES).map_err(map_err!(Table))?;
        let assignments = txn.open_table(ROLE_ASSIGNMENTS).map_err(map_err!(Table))?;
        max_retention_from(&assignments, &roles, user_id)
    }
}

/// Maximum role retention for an owner, read through any table handle.
fn max_retention_from(
    assignments: &impl ReadableTable<u64, &'static [u8]>,
    roles: &impl ReadableTable<u64, &'static [u8]>,
    user_id: UserId,
) -> StateResult<Option<u64>> {
    let role_ids: Vec<RoleId> = match assignments.get(user_id).map_err(map_err!(Read))? {
        Some(guard) => decode(guard.value())?,
        None => return Ok(None),
    };

    let mut max: Option<u64> = None;
    for role_id in role_ids {
        let Some(guard) = roles.get(role_id).map_err(map_err!(Read))? else {
            warn!(user_id, role_id, "assigned role missing");
            continue;
        };
        let role: Role = decode(guard.value())?;
        max = Some(max.map_or(role.result_retention, |m| m.max(role.result_retention)));
    }
    Ok(max)
}

/// Advance and return the named id sequence.
fn next_id(txn: &WriteTransaction, sequence: &str) -> StateResult<u64> {
    let mut table = txn.open_table(SEQUENCES).map_err(map_err!(Table))?;
    let current = table
        .get(sequence)
        .map_err(map_err!(Read))?
        .map(|guard| guard.value())
        .unwrap_or(0);
    let next = current + 1;
    table.insert(sequence, next).map_err(map_err!(Write))?;
    Ok(next)
}

fn encode<T: Serialize>(value: &T) -> StateResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(map_err!(Serialize))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StateResult<T> {
    serde_json::from_slice(bytes).map_err(map_err!(Deserialize))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    const HOUR: u64 = 3600;

    fn test_check(user_id: UserId, name: &str, refresh: u64) -> Check {
        Check::new(user_id, name, &format!("https://{name}.example.com"), 1, refresh).unwrap()
    }

    fn query(now: u64, pool_size: usize, clustered: bool) -> ElectionQuery {
        ElectionQuery {
            probe: "probe-a".to_string(),
            clustered,
            now,
            pool_size,
            lease_timeout: 300,
        }
    }

    fn claim(probe: &str, at: u64) -> Claim {
        Claim {
            probe: probe.to_string(),
            locked_at: at,
        }
    }

    fn test_result(check: &Check, created: u64, changed: bool, confirmation: bool) -> NewResult {
        NewResult {
            check_id: check.id,
            previous_result_id: check.latest_result_id,
            status: Status::Up,
            probe: "probe-a".to_string(),
            status_code: 200,
            response_time: Some(42),
            changed,
            confirmation,
            created,
        }
    }

    // ── Checks ─────────────────────────────────────────────────────

    #[test]
    fn insert_assigns_sequential_ids() {
        let store = StateStore::open_in_memory().unwrap();
        let a = store.insert_check(&test_check(1, "a", 0)).unwrap();
        let b = store.insert_check(&test_check(1, "b", 0)).unwrap();

        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
        assert_eq!(store.get_check(2).unwrap(), Some(b));
        assert_eq!(store.list_checks().unwrap().len(), 2);
    }

    #[test]
    fn get_nonexistent_check_returns_none() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.get_check(99).unwrap().is_none());
    }

    // ── Election ───────────────────────────────────────────────────

    #[test]
    fn find_electable_returns_oldest_refresh_first() {
        let store = StateStore::open_in_memory().unwrap();
        for (name, refresh) in [("a", 50), ("b", 10), ("c", 30), ("d", 10), ("e", 500)] {
            store.insert_check(&test_check(1, name, refresh)).unwrap();
        }

        let found = store.find_electable(&query(100, 3, false)).unwrap();
        let names: Vec<_> = found.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["b", "d", "c"]);
    }

    #[test]
    fn find_electable_on_empty_store_is_empty() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.find_electable(&query(100, 5, true)).unwrap().is_empty());
    }

    #[test]
    fn claim_marks_rows_elected() {
        let store = StateStore::open_in_memory().unwrap();
        store.insert_check(&test_check(1, "a", 0)).unwrap();

        let candidates = store.find_electable(&query(100, 5, true)).unwrap();
        let claimed = store.claim(&candidates, &claim("probe-a", 100)).unwrap();

        assert_eq!(claimed.len(), 1);
        let stored = store.get_check(claimed[0].id).unwrap().unwrap();
        assert_eq!(stored.state, CheckState::Elected);
        assert_eq!(stored.locked, Some(100));
        assert_eq!(stored.probe.as_deref(), Some("probe-a"));
        assert_eq!(stored, claimed[0]);

        // Elected rows are not electable again while the lease is live.
        assert!(store.find_electable(&query(200, 5, true)).unwrap().is_empty());
    }

    #[test]
    fn stale_candidates_lose_the_claim() {
        let store = StateStore::open_in_memory().unwrap();
        store.insert_check(&test_check(1, "a", 0)).unwrap();
        store.insert_check(&test_check(1, "b", 0)).unwrap();

        let first = store.find_electable(&query(100, 5, true)).unwrap();
        let second = first.clone();

        let won = store.claim(&first, &claim("probe-a", 100)).unwrap();
        let lost = store.claim(&second, &claim("probe-b", 100)).unwrap();

        assert_eq!(won.len(), 2);
        assert!(lost.is_empty());
    }

    #[test]
    fn concurrent_claims_are_disjoint() {
        let store = StateStore::open_in_memory().unwrap();
        for i in 0..20 {
            store.insert_check(&test_check(1, &format!("site{i}"), 0)).unwrap();
        }
        let candidates = store.find_electable(&query(100, 20, true)).unwrap();

        let handles: Vec<_> = ["probe-a", "probe-b", "probe-c"]
            .into_iter()
            .map(|probe| {
                let store = store.clone();
                let candidates = candidates.clone();
                thread::spawn(move || store.claim(&candidates, &claim(probe, 100)).unwrap())
            })
            .collect();

        let mut seen = std::collections::HashSet::new();
        let mut total = 0;
        for handle in handles {
            for check in handle.join().unwrap() {
                assert!(seen.insert(check.id), "check {} claimed twice", check.id);
                total += 1;
            }
        }
        assert_eq!(total, candidates.len());
    }

    #[test]
    fn expired_lease_is_reclaimable() {
        let store = StateStore::open_in_memory().unwrap();
        store.insert_check(&test_check(1, "a", 0)).unwrap();

        let candidates = store.find_electable(&query(100, 5, true)).unwrap();
        store.claim(&candidates, &claim("crashed", 100)).unwrap();

        assert!(store.find_electable(&query(399, 5, true)).unwrap().is_empty());
        let reclaimable = store.find_electable(&query(400, 5, true)).unwrap();
        assert_eq!(reclaimable.len(), 1);

        let reclaimed = store.claim(&reclaimable, &claim("probe-b", 400)).unwrap();
        assert_eq!(reclaimed[0].probe.as_deref(), Some("probe-b"));
    }

    // ── Persistence of reconciled checks ───────────────────────────

    #[test]
    fn batch_persist_applies_owned_rows() {
        let store = StateStore::open_in_memory().unwrap();
        store.insert_check(&test_check(1, "a", 0)).unwrap();
        let candidates = store.find_electable(&query(100, 5, false)).unwrap();
        let mut claimed = store.claim(&candidates, &claim("probe-a", 100)).unwrap();

        let mut next = claimed.remove(0);
        next.state = CheckState::Waiting;
        next.locked = None;
        next.refresh = 160;

        assert_eq!(store.batch_persist(&[next.clone()]).unwrap(), 1);
        let stored = store.get_check(next.id).unwrap().unwrap();
        assert_eq!(stored.state, CheckState::Waiting);
        assert_eq!(stored.refresh, 160);
        assert_eq!(stored.version, next.version + 1);
    }

    #[test]
    fn batch_persist_skips_rows_reclaimed_by_another_probe() {
        let store = StateStore::open_in_memory().unwrap();
        store.insert_check(&test_check(1, "a", 0)).unwrap();

        let candidates = store.find_electable(&query(100, 5, true)).unwrap();
        let slow = store.claim(&candidates, &claim("slow", 100)).unwrap();

        let reclaimable = store.find_electable(&query(500, 5, true)).unwrap();
        store.claim(&reclaimable, &claim("fast", 500)).unwrap();

        let mut late = slow[0].clone();
        late.state = CheckState::Waiting;
        late.locked = None;
        assert_eq!(store.batch_persist(&[late]).unwrap(), 0);

        let stored = store.get_check(slow[0].id).unwrap().unwrap();
        assert_eq!(stored.probe.as_deref(), Some("fast"));
        assert_eq!(stored.state, CheckState::Elected);
    }

    #[test]
    fn batch_persist_empty_is_noop() {
        let store = StateStore::open_in_memory().unwrap();
        assert_eq!(store.batch_persist(&[]).unwrap(), 0);
    }

    // ── Results ────────────────────────────────────────────────────

    #[test]
    fn save_assigns_ids_and_keeps_chain() {
        let store = StateStore::open_in_memory().unwrap();
        let mut check = store.insert_check(&test_check(1, "a", 0)).unwrap();

        let first = store.save(test_result(&check, 10, false, false)).unwrap();
        check.latest_result_id = Some(first.id);
        let second = store.save(test_result(&check, 20, false, false)).unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(second.previous_result_id, Some(first.id));
        assert_eq!(store.get_result(2).unwrap(), Some(second));
        assert_eq!(store.list_results_for_check(check.id).unwrap().len(), 2);
    }

    // ── Roles and retention ────────────────────────────────────────

    #[test]
    fn max_retention_takes_largest_role() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_role(&Role::new(1, "free", HOUR).unwrap()).unwrap();
        store.put_role(&Role::new(2, "paid", 24 * HOUR).unwrap()).unwrap();
        store.assign_role(7, 1).unwrap();
        store.assign_role(7, 2).unwrap();
        store.assign_role(7, 2).unwrap();

        assert_eq!(store.max_retention(7).unwrap(), Some(24 * HOUR));
        assert_eq!(store.max_retention(8).unwrap(), None);
    }

    #[test]
    fn assign_unknown_role_fails() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(matches!(
            store.assign_role(7, 42),
            Err(StateError::NotFound(_))
        ));
    }

    #[test]
    fn expire_deletes_aged_results_but_never_latest() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_role(&Role::new(1, "free", HOUR).unwrap()).unwrap();
        store.assign_role(7, 1).unwrap();

        let mut check = store.insert_check(&test_check(7, "a", 0)).unwrap();
        let old = store.save(test_result(&check, 0, false, false)).unwrap();
        let confirmed = store.save(test_result(&check, 0, true, true)).unwrap();
        let latest = store.save(test_result(&check, 0, false, false)).unwrap();
        let fresh = store.save(test_result(&check, 10 * HOUR, false, false)).unwrap();
        check.latest_result_id = Some(latest.id);
        store.put_check(&check).unwrap();

        let now = 2 * HOUR;
        assert_eq!(store.expire(100, now).unwrap(), 1);

        assert!(store.get_result(old.id).unwrap().is_none());
        assert!(store.get_result(confirmed.id).unwrap().is_some());
        assert!(store.get_result(latest.id).unwrap().is_some());
        assert!(store.get_result(fresh.id).unwrap().is_some());
    }

    #[test]
    fn expire_respects_limit() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_role(&Role::new(1, "free", HOUR).unwrap()).unwrap();
        store.assign_role(7, 1).unwrap();
        let check = store.insert_check(&test_check(7, "a", 0)).unwrap();
        for _ in 0..5 {
            store.save(test_result(&check, 0, false, false)).unwrap();
        }

        assert_eq!(store.expire(2, 2 * HOUR).unwrap(), 2);
        assert_eq!(store.expire(2, 2 * HOUR).unwrap(), 2);
        assert_eq!(store.expire(2, 2 * HOUR).unwrap(), 1);
        assert_eq!(store.expire(2, 2 * HOUR).unwrap(), 0);
    }

    #[test]
    fn expire_keeps_results_of_owners_without_roles() {
        let store = StateStore::open_in_memory().unwrap();
        let check = store.insert_check(&test_check(9, "a", 0)).unwrap();
        store.save(test_result(&check, 0, false, false)).unwrap();

        assert_eq!(store.expire(100, 100 * HOUR).unwrap(), 0);
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        {
            let store = StateStore::open(&db_path).unwrap();
            store.insert_check(&test_check(1, "a", 0)).unwrap();
        }

        // Reopen the same database file; the sequence must survive too.
        let store = StateStore::open(&db_path).unwrap();
        assert_eq!(store.list_checks().unwrap().len(), 1);
        let next = store.insert_check(&test_check(1, "b", 0)).unwrap();
        assert_eq!(next.id, 2);
    }
}
