//! Election engine.
//!
//! Selects the due checks for one probe and claims them through the
//! [`CheckStore`], so two probes never hold the same check at once.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use urlcheck_state::{Check, CheckState, CheckStore, Claim, ElectionQuery};

use crate::error::{SchedulerError, SchedulerResult};

/// Default time after which an unreleased claim may be taken over.
pub const DEFAULT_LEASE_TIMEOUT: Duration = Duration::from_secs(300);

/// Elects and claims checks on behalf of a probe.
pub struct Election {
    checks: Arc<dyn CheckStore>,
    /// Lease in whole seconds, rounded up.
    lease_secs: u64,
}

impl Election {
    /// Fails unless `lease_timeout` is at least one second.
    pub fn new(checks: Arc<dyn CheckStore>, lease_timeout: Duration) -> SchedulerResult<Self> {
        if lease_timeout < Duration::from_secs(1) {
            return Err(SchedulerError::InvalidConfig(format!(
                "lease timeout must be at least 1s, got {lease_timeout:?}"
            )));
        }
        let lease_secs = lease_timeout.as_secs() + u64::from(lease_timeout.subsec_nanos() > 0);
        Ok(Self { checks, lease_secs })
    }

    /// Lease in whole seconds as applied to claims.
    pub fn lease_secs(&self) -> u64 {
        self.lease_secs
    }

    /// Claim up to `pool_size` due checks for `probe`, oldest refresh first.
    ///
    /// In clustered mode a check is only electable while no other probe holds
    /// an unexpired lease on it. Losing a race to another probe shrinks the
    /// returned set; it is not an error.
    pub fn elect_and_claim(
        &self,
        probe: &str,
        clustered: bool,
        now: u64,
        pool_size: usize,
    ) -> SchedulerResult<Vec<Check>> {
        if pool_size == 0 {
            return Err(SchedulerError::InvalidConfig(
                "candidate pool size must be at least 1".into(),
            ));
        }

        let query = ElectionQuery {
            probe: probe.to_string(),
            clustered,
            now,
            pool_size,
            lease_timeout: self.lease_secs,
        };

        let candidates = self.checks.find_electable(&query)?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let claim = Claim {
            probe: probe.to_string(),
            locked_at: now,
        };
        let claimed = self.checks.claim(&candidates, &claim)?;

        for check in &claimed {
            if check.state != CheckState::Elected || check.probe.as_deref() != Some(probe) {
                return Err(SchedulerError::ClaimViolation {
                    check_id: check.id,
                    reason: "store returned a row not claimed by this probe".into(),
                });
            }
        }

        if claimed.len() < candidates.len() {
            debug!(
                probe,
                candidates = candidates.len(),
                claimed = claimed.len(),
                "lost some candidates to concurrent claims"
            );
        }

        Ok(claimed)
    }
}
