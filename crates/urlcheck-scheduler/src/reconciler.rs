//! Status reconciler — the anti-flap state machine.
//!
//! Given a claimed check and one probe outcome, computes the result record
//! to append and the check's next state. A status flip is only committed
//! once two consecutive probes agree on it:
//!
//! | Transition       | changed | confirming | committed status | refresh          |
//! |------------------|---------|------------|------------------|------------------|
//! | `Confirmed`      | yes     | yes        | derived          | now + interval   |
//! | `ChangeDetected` | yes     | no         | unchanged        | unchanged (due)  |
//! | `Inconclusive`   | no      | yes        | unchanged        | now + interval   |
//! | `Steady`         | no      | no         | unchanged        | now + interval   |
//!
//! Everything here is synchronous and side-effect free.

use urlcheck_probe::ProbeOutcome;
use urlcheck_state::{Check, CheckResult, CheckState, NewResult};

use crate::error::{SchedulerError, SchedulerResult};

/// Which row of the debounce table a probe outcome fell into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    /// Second probe agreed with a pending change; the change is committed.
    Confirmed,
    /// First probe disagreeing with the committed status; re-check at once.
    ChangeDetected,
    /// A pending change was not corroborated; the blip is discarded.
    Inconclusive,
    /// Nothing changed.
    Steady,
}

impl Transition {
    pub fn classify(changed: bool, confirming: bool) -> Self {
        match (changed, confirming) {
            (true, true) => Transition::Confirmed,
            (true, false) => Transition::ChangeDetected,
            (false, true) => Transition::Inconclusive,
            (false, false) => Transition::Steady,
        }
    }
}

/// Output of [`reconcile`]: the result to persist and the pending next state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub transition: Transition,
    /// Result record to hand to the result store.
    pub result: NewResult,
    next: Check,
}

impl Reconciliation {
    /// The next check state, before the new result id is linked in.
    pub fn next(&self) -> &Check {
        &self.next
    }

    /// Link the persisted result and return the check to write back.
    pub fn into_next(self, saved: &CheckResult) -> SchedulerResult<Check> {
        if saved.check_id != self.next.id {
            return Err(SchedulerError::ClaimViolation {
                check_id: self.next.id,
                reason: format!("result {} belongs to check {}", saved.id, saved.check_id),
            });
        }
        let mut next = self.next;
        next.latest_result_id = Some(saved.id);
        Ok(next)
    }
}

/// Compute the result and next state of `check` after `outcome`.
///
/// Fails with [`SchedulerError::ClaimViolation`] unless `check` is elected
/// and locked by `probe`.
pub fn reconcile(
    check: &Check,
    outcome: ProbeOutcome,
    probe: &str,
    now: u64,
) -> SchedulerResult<Reconciliation> {
    verify_claim(check, probe)?;

    let derived = outcome.status();
    let changed = derived != check.status;
    let transition = Transition::classify(changed, check.confirming);

    let result = NewResult {
        check_id: check.id,
        previous_result_id: check.latest_result_id,
        status: derived,
        probe: probe.to_string(),
        status_code: outcome.status_code,
        response_time: Some(outcome.elapsed_ms),
        changed,
        confirmation: check.confirming,
        created: now,
    };

    let mut next = check.clone();
    next.state = CheckState::Waiting;
    next.locked = None;
    next.probe = Some(probe.to_string());

    let next_refresh = now.saturating_add(check.interval_secs());
    match transition {
        Transition::Confirmed => {
            next.status = derived;
            next.confirming = false;
            next.refresh = next_refresh;
        }
        Transition::ChangeDetected => {
            next.confirming = true;
        }
        Transition::Inconclusive | Transition::Steady => {
            next.confirming = false;
            next.refresh = next_refresh;
        }
    }

    Ok(Reconciliation {
        transition,
        result,
        next,
    })
}

fn verify_claim(check: &Check, probe: &str) -> SchedulerResult<()> {
    let reason = if check.state != CheckState::Elected {
        format!("state is {}", check.state)
    } else if check.locked.is_none() {
        "no lease held".to_string()
    } else if check.probe.as_deref() != Some(probe) {
        format!("claimed by {:?}", check.probe)
    } else {
        return Ok(());
    };
    Err(SchedulerError::ClaimViolation {
        check_id: check.id,
        reason,
    })
}
