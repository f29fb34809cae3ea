//! Domain types for the urlcheck state store.
//!
//! These types represent monitored checks, their probe results, and the
//! retention roles assigned to check owners. All types are serializable
//! to/from JSON for storage in redb tables.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{StateError, StateResult};

/// Store-assigned identifier for a check.
pub type CheckId = u64;

/// Store-assigned identifier for a probe result.
pub type ResultId = u64;

/// Identifier of the user owning a check.
pub type UserId = u64;

/// Identifier of a retention role.
pub type RoleId = u64;

// ── Status ────────────────────────────────────────────────────────

/// Up/down status of a monitored URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Up,
    Down,
    Unknown,
}

impl Status {
    /// `Up` for any 2xx status code, `Down` for everything else.
    pub fn from_status_code(code: u16) -> Self {
        if (200..300).contains(&code) {
            Status::Up
        } else {
            Status::Down
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Up => "UP",
            Status::Down => "DOWN",
            Status::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Scheduling state of a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckState {
    /// Idle, waiting for `refresh` to come due.
    Waiting,
    /// Claimed by a probe for the current tick.
    Elected,
}

impl fmt::Display for CheckState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckState::Waiting => f.write_str("WAITING"),
            CheckState::Elected => f.write_str("ELECTED"),
        }
    }
}

// ── Check ─────────────────────────────────────────────────────────

/// A monitored URL plus its scheduling and committed-status state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Check {
    pub id: CheckId,
    pub user_id: UserId,
    pub name: String,
    pub url: String,
    /// Minutes between runs.
    pub interval: u32,
    /// Committed status.
    pub status: Status,
    pub state: CheckState,
    /// Unix timestamp (seconds) of the earliest re-election.
    pub refresh: u64,
    /// True while a status change awaits a corroborating probe.
    pub confirming: bool,
    /// Unix timestamp (seconds) the current claim was taken, if claimed.
    pub locked: Option<u64>,
    /// Probe currently owning, or last owning, the claim.
    pub probe: Option<String>,
    pub latest_result_id: Option<ResultId>,
    /// Optimistic concurrency counter, bumped on every claim and persist.
    pub version: u64,
}

impl Check {
    /// Build a new, never-probed check that is due immediately.
    ///
    /// The id is assigned by the store on insert.
    pub fn new(
        user_id: UserId,
        name: &str,
        url: &str,
        interval: u32,
        now: u64,
    ) -> StateResult<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StateError::Invalid {
                field: "name",
                reason: "must not be empty".to_string(),
            });
        }
        let url = url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(StateError::Invalid {
                field: "url",
                reason: format!("{url:?} is not an http(s) URL"),
            });
        }
        if interval == 0 {
            return Err(StateError::Invalid {
                field: "interval",
                reason: "must be at least one minute".to_string(),
            });
        }

        Ok(Self {
            id: 0,
            user_id,
            name: name.to_string(),
            url: url.to_string(),
            interval,
            status: Status::Unknown,
            state: CheckState::Waiting,
            refresh: now,
            confirming: false,
            locked: None,
            probe: None,
            latest_result_id: None,
            version: 1,
        })
    }

    /// Interval between runs, in seconds.
    pub fn interval_secs(&self) -> u64 {
        u64::from(self.interval) * 60
    }

    /// Whether the claim marker is older than `lease_timeout` seconds.
    pub fn lease_expired(&self, now: u64, lease_timeout: u64) -> bool {
        self.locked
            .is_some_and(|locked| locked.saturating_add(lease_timeout) <= now)
    }

    /// Apply a claim: mark elected, stamp the lease, record the owner.
    pub fn claimed(mut self, claim: &Claim) -> Self {
        self.state = CheckState::Elected;
        self.locked = Some(claim.locked_at);
        self.probe = Some(claim.probe.clone());
        self.version += 1;
        self
    }
}

// ── Election ──────────────────────────────────────────────────────

/// Parameters of one election round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElectionQuery {
    /// Probe running the election.
    pub probe: String,
    /// Whether other probes share the store.
    pub clustered: bool,
    pub now: u64,
    /// Maximum number of candidates returned.
    pub pool_size: usize,
    /// Seconds after which a claim is considered abandoned.
    pub lease_timeout: u64,
}

impl ElectionQuery {
    /// Whether `check` may be elected in this round.
    pub fn admits(&self, check: &Check) -> bool {
        match check.state {
            CheckState::Waiting => {
                check.refresh <= self.now
                    && (!self.clustered
                        || check.locked.is_none()
                        || check.lease_expired(self.now, self.lease_timeout))
            }
            // An elected row is only reclaimable once its lease went stale.
            CheckState::Elected => check.lease_expired(self.now, self.lease_timeout),
        }
    }

    /// Filter, order (oldest `refresh` first, then id) and bound candidates.
    pub fn select<I>(&self, checks: I) -> Vec<Check>
    where
        I: IntoIterator<Item = Check>,
    {
        let mut candidates: Vec<Check> =
            checks.into_iter().filter(|c| self.admits(c)).collect();
        candidates.sort_by_key(|c| (c.refresh, c.id));
        candidates.truncate(self.pool_size);
        candidates
    }
}

/// The marker written onto a check when a probe claims it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    pub probe: String,
    pub locked_at: u64,
}

// ── Result ────────────────────────────────────────────────────────

/// A probe result that has not been persisted yet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewResult {
    pub check_id: CheckId,
    pub previous_result_id: Option<ResultId>,
    pub status: Status,
    pub probe: String,
    pub status_code: u16,
    /// Response time in milliseconds.
    pub response_time: Option<u64>,
    /// Differs from the check's committed status at probe time.
    pub changed: bool,
    /// This result is the corroborating probe of a pending change.
    pub confirmation: bool,
    /// Unix timestamp (seconds).
    pub created: u64,
}

impl NewResult {
    /// Attach the store-assigned identity.
    pub fn with_id(self, id: ResultId) -> CheckResult {
        CheckResult {
            id,
            check_id: self.check_id,
            previous_result_id: self.previous_result_id,
            status: self.status,
            probe: self.probe,
            status_code: self.status_code,
            response_time: self.response_time,
            changed: self.changed,
            confirmation: self.confirmation,
            created: self.created,
        }
    }
}

/// One immutable probe outcome, chained to its predecessor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckResult {
    pub id: ResultId,
    pub check_id: CheckId,
    pub previous_result_id: Option<ResultId>,
    pub status: Status,
    pub probe: String,
    pub status_code: u16,
    pub response_time: Option<u64>,
    pub changed: bool,
    pub confirmation: bool,
    pub created: u64,
}

impl CheckResult {
    /// Whether the retention sweep may delete this result.
    ///
    /// The check's latest result is never expirable, and neither is a
    /// confirmed status change.
    pub fn is_expirable(
        &self,
        latest_result_id: Option<ResultId>,
        retention_secs: u64,
        now: u64,
    ) -> bool {
        latest_result_id != Some(self.id)
            && (!self.changed || !self.confirmation)
            && self.created.saturating_add(retention_secs) < now
    }
}

// ── Roles ─────────────────────────────────────────────────────────

/// A role granting its holders a result retention duration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    /// Seconds results are kept for owners holding this role.
    pub result_retention: u64,
}

impl Role {
    pub fn new(id: RoleId, name: &str, result_retention: u64) -> StateResult<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StateError::Invalid {
                field: "name",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(Self {
            id,
            name: name.to_string(),
            result_retention,
        })
    }
}

/// Current Unix epoch in seconds.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
