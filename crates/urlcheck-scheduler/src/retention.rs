//! Retention sweeper.
//!
//! Deletes results older than their owner's retention allowance, in bounded
//! batches, while keeping each check's latest result and every confirmed
//! state change.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info};

use urlcheck_state::{ResultStore, epoch_secs};

use crate::error::{SchedulerError, SchedulerResult};

/// Default number of results deleted per batch.
pub const DEFAULT_EXPIRY_LIMIT: usize = 1000;

/// Default delay between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

pub struct RetentionSweeper {
    results: Arc<dyn ResultStore>,
}

impl RetentionSweeper {
    pub fn new(results: Arc<dyn ResultStore>) -> Self {
        Self { results }
    }

    /// Delete one batch of at most `limit` expired results.
    pub fn expire(&self, limit: usize, now: u64) -> SchedulerResult<usize> {
        if limit == 0 {
            return Err(SchedulerError::InvalidConfig(
                "expiry limit must be at least 1".into(),
            ));
        }
        Ok(self.results.expire(limit, now)?)
    }

    /// Delete batches until one comes back short. Returns the total deleted.
    pub fn drain(&self, limit: usize, now: u64) -> SchedulerResult<usize> {
        let mut total = 0;
        loop {
            let expired = self.expire(limit, now)?;
            total += expired;
            if expired < limit {
                break;
            }
        }
        if total > 0 {
            info!(expired = total, limit, "expired old results");
        } else {
            debug!("no results to expire");
        }
        Ok(total)
    }

    /// Drain every `interval` until `shutdown` flips.
    pub async fn run(
        &self,
        interval: Duration,
        limit: usize,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = self.drain(limit, epoch_secs()) {
                        error!(error = %e, "retention sweep failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("retention sweeper shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use urlcheck_state::{Check, NewResult, Role, StateStore, Status};

    const DAY: u64 = 86_400;

    /// One owner with a one-day allowance and a check holding `count`
    /// day-old results.
    fn store_with_results(count: usize, changed: bool) -> (StateStore, Check) {
        let store = StateStore::open_in_memory().unwrap();
        store.put_role(&Role::new(1, "free", DAY).unwrap()).unwrap();
        store.assign_role(7, 1).unwrap();

        let mut check = store
            .insert_check(&Check::new(7, "site", "https://example.com", 1, 0).unwrap())
            .unwrap();
        for i in 0..count {
            let saved = store
                .save(NewResult {
                    check_id: check.id,
                    previous_result_id: check.latest_result_id,
                    status: Status::Up,
                    probe: "p".to_string(),
                    status_code: 200,
                    response_time: Some(5),
                    changed,
                    confirmation: changed,
                    created: 100 + i as u64,
                })
                .unwrap();
            check.latest_result_id = Some(saved.id);
        }
        store.put_check(&check).unwrap();
        (store, check)
    }

    #[test]
    fn zero_limit_is_rejected() {
        let (store, check) = store_with_results(3, false);
        let sweeper = RetentionSweeper::new(Arc::new(store.clone()));
        assert!(matches!(
            sweeper.drain(0, 10 * DAY),
            Err(SchedulerError::InvalidConfig(_))
        ));
        assert_eq!(store.list_results_for_check(check.id).unwrap().len(), 3);
    }

    #[test]
    fn expire_deletes_a_single_bounded_batch() {
        let (store, check) = store_with_results(10, false);
        let sweeper = RetentionSweeper::new(Arc::new(store.clone()));

        assert_eq!(sweeper.expire(4, 10 * DAY).unwrap(), 4);
        assert_eq!(store.list_results_for_check(check.id).unwrap().len(), 6);
    }

    #[test]
    fn drain_keeps_only_the_latest_result() {
        let (store, check) = store_with_results(10, false);
        let sweeper = RetentionSweeper::new(Arc::new(store.clone()));

        assert_eq!(sweeper.drain(4, 10 * DAY).unwrap(), 9);

        let remaining = store.list_results_for_check(check.id).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(Some(remaining[0].id), check.latest_result_id);
    }

    #[test]
    fn drain_keeps_confirmed_changes() {
        let (store, check) = store_with_results(3, true);
        let sweeper = RetentionSweeper::new(Arc::new(store.clone()));

        assert_eq!(sweeper.drain(10, 10 * DAY).unwrap(), 0);
        assert_eq!(store.list_results_for_check(check.id).unwrap().len(), 3);
    }

    #[test]
    fn nothing_expires_within_retention() {
        let (store, _) = store_with_results(5, false);
        let sweeper = RetentionSweeper::new(Arc::new(store));
        assert_eq!(sweeper.drain(10, DAY).unwrap(), 0);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let store = StateStore::open_in_memory().unwrap();
        let sweeper = RetentionSweeper::new(Arc::new(store));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            sweeper.run(Duration::from_millis(5), 10, rx).await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
