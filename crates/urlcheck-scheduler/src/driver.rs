//! Scheduler driver.
//!
//! Runs the periodic tick: elect and claim due checks, probe them with
//! bounded parallelism, reconcile each outcome, append results, and write
//! the next check states back in one batch.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use urlcheck_probe::{ProbeOutcome, Prober};
use urlcheck_state::{Check, CheckStore, ResultStore, epoch_secs};

use crate::election::{DEFAULT_LEASE_TIMEOUT, Election};
use crate::error::{SchedulerError, SchedulerResult};
use crate::reconciler::{Transition, reconcile};

/// Default candidate pool size.
pub const DEFAULT_POOL_SIZE: usize = 5;

/// Default delay between ticks.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(10);

/// Identity and limits of the probe running this scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Name recorded on claims and results.
    pub probe: String,
    /// Whether other probes share the store.
    pub clustered: bool,
    /// Checks claimed per tick, and the probe parallelism bound.
    pub pool_size: usize,
    /// Time after which another probe may take over an unreleased claim.
    pub lease_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            probe: "Standalone".to_string(),
            clustered: false,
            pool_size: DEFAULT_POOL_SIZE,
            lease_timeout: DEFAULT_LEASE_TIMEOUT,
        }
    }
}

/// Summary of one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Checks claimed by this probe.
    pub elected: usize,
    /// Results appended.
    pub recorded: usize,
    /// Check rows written back.
    pub persisted: usize,
    pub confirmed: usize,
    pub changes_detected: usize,
    pub inconclusive: usize,
    pub steady: usize,
}

impl TickReport {
    fn count(&mut self, transition: Transition) {
        match transition {
            Transition::Confirmed => self.confirmed += 1,
            Transition::ChangeDetected => self.changes_detected += 1,
            Transition::Inconclusive => self.inconclusive += 1,
            Transition::Steady => self.steady += 1,
        }
    }
}

/// Drives election, probing and reconciliation for one probe.
pub struct CheckScheduler {
    config: SchedulerConfig,
    election: Election,
    checks: Arc<dyn CheckStore>,
    results: Arc<dyn ResultStore>,
    prober: Arc<dyn Prober>,
}

impl CheckScheduler {
    pub fn new(
        config: SchedulerConfig,
        checks: Arc<dyn CheckStore>,
        results: Arc<dyn ResultStore>,
        prober: Arc<dyn Prober>,
    ) -> SchedulerResult<Self> {
        if config.probe.trim().is_empty() {
            return Err(SchedulerError::InvalidConfig(
                "probe name must not be empty".into(),
            ));
        }
        if config.pool_size == 0 {
            return Err(SchedulerError::InvalidConfig(
                "candidate pool size must be at least 1".into(),
            ));
        }

        let election = Election::new(Arc::clone(&checks), config.lease_timeout)?;
        Ok(Self {
            config,
            election,
            checks,
            results,
            prober,
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Run one election-probe-reconcile-persist cycle at time `now`.
    ///
    /// Store failures abort the tick; claims left behind are recovered once
    /// their lease expires.
    ///
    /// Results are appended before the checks are written back. A result
    /// whose check then fails to persist, or was taken over by another probe,
    /// stays in the log unlinked: the check's `latest_result_id` never points
    /// at it, so the chain reachable from the check stays linear, and the
    /// next result links to the last persisted one. Unlinked results age out
    /// through the retention sweep like any other non-latest result.
    pub async fn tick(&self, now: u64) -> SchedulerResult<TickReport> {
        let probe = self.config.probe.as_str();
        let claimed = self.election.elect_and_claim(
            probe,
            self.config.clustered,
            now,
            self.config.pool_size,
        )?;

        let mut report = TickReport {
            elected: claimed.len(),
            ..TickReport::default()
        };
        if claimed.is_empty() {
            debug!(probe, "no checks due");
            return Ok(report);
        }

        let outcomes = self.probe_all(claimed).await;

        // Reconcile everything before writing anything.
        let reconciled = outcomes
            .iter()
            .map(|(check, outcome)| reconcile(check, *outcome, probe, now))
            .collect::<SchedulerResult<Vec<_>>>()?;

        let mut next_checks = Vec::with_capacity(reconciled.len());
        for reconciliation in reconciled {
            report.count(reconciliation.transition);
            let saved = self.results.save(reconciliation.result.clone())?;
            report.recorded += 1;

            if reconciliation.transition == Transition::Confirmed {
                info!(
                    check_id = saved.check_id,
                    status = %saved.status,
                    status_code = saved.status_code,
                    "check status changed"
                );
            }
            next_checks.push(reconciliation.into_next(&saved)?);
        }

        report.persisted = self.checks.batch_persist(&next_checks)?;
        if report.persisted < next_checks.len() {
            warn!(
                probe,
                reconciled = next_checks.len(),
                persisted = report.persisted,
                "some checks changed underneath this probe and were not written"
            );
        }

        Ok(report)
    }

    async fn probe_all(&self, claimed: Vec<Check>) -> Vec<(Check, ProbeOutcome)> {
        let prober = &self.prober;
        stream::iter(claimed)
            .map(|check| async move {
                let outcome = prober.probe(&check).await;
                debug!(
                    check_id = check.id,
                    status_code = outcome.status_code,
                    elapsed_ms = outcome.elapsed_ms,
                    "probe finished"
                );
                (check, outcome)
            })
            .buffer_unordered(self.config.pool_size)
            .collect()
            .await
    }

    /// Tick every `interval` until `shutdown` flips.
    ///
    /// A failed tick is logged and the loop carries on.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(
            probe = %self.config.probe,
            clustered = self.config.clustered,
            pool_size = self.config.pool_size,
            interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
            "scheduler started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    match self.tick(epoch_secs()).await {
                        Ok(report) if report.elected > 0 => {
                            info!(
                                elected = report.elected,
                                persisted = report.persisted,
                                confirmed = report.confirmed,
                                changes_detected = report.changes_detected,
                                "tick complete"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => {
                            error!(error = %e, "scheduler tick failed");
                        }
                    }
                }
                _ = shutdown.changed() => {
                    info!("scheduler shutting down");
                    break;
                }
            }
        }
    }
}
