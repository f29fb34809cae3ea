//! Probe executor.
//!
//! Performs one HTTP GET per check with a browser-like client identity and
//! a bounded timeout, mapping any transport failure to
//! [`TRANSPORT_FAILURE_STATUS`].

use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::debug;

use urlcheck_state::{Check, Status};

/// Client identity presented to probed sites.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 6.1) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/41.0.2228.0 Safari/537.36";

/// Status code reported when no HTTP response was received.
pub const TRANSPORT_FAILURE_STATUS: u16 = 500;

/// Default per-probe timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors building a prober. Probing itself never fails.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

/// What a single probe observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOutcome {
    /// HTTP status code, or [`TRANSPORT_FAILURE_STATUS`].
    pub status_code: u16,
    /// Wall-clock time from request start to response or failure.
    pub elapsed_ms: u64,
}

impl ProbeOutcome {
    /// Derived status: `Up` for 2xx, `Down` otherwise.
    pub fn status(&self) -> Status {
        Status::from_status_code(self.status_code)
    }
}

/// Boxed future returned by [`Prober::probe`].
pub type ProbeFuture<'a> = Pin<Box<dyn Future<Output = ProbeOutcome> + Send + 'a>>;

/// Probes one check. Injected into the scheduler for testability.
pub trait Prober: Send + Sync {
    fn probe<'a>(&'a self, check: &'a Check) -> ProbeFuture<'a>;
}

/// [`Prober`] issuing real HTTP requests through reqwest.
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpProber {
    /// Build a prober whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| ProbeError::Client(e.to_string()))?;
        Ok(Self { client, timeout })
    }

    /// Per-probe timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn get(&self, check: &Check) -> ProbeOutcome {
        let start = Instant::now();

        let request = self.client.get(check.url.as_str()).send();
        let result = tokio::time::timeout(self.timeout, request).await;

        let status_code = match result {
            Ok(Ok(resp)) => {
                let status = resp.status();
                if !status.is_success() {
                    debug!(check_id = check.id, %status, url = %check.url, "probe non-2xx");
                }
                status.as_u16()
            }
            Ok(Err(e)) => {
                debug!(check_id = check.id, error = %e, url = %check.url, "probe request failed");
                TRANSPORT_FAILURE_STATUS
            }
            Err(_) => {
                debug!(check_id = check.id, url = %check.url, "probe timed out");
                TRANSPORT_FAILURE_STATUS
            }
        };

        let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        ProbeOutcome {
            status_code,
            elapsed_ms,
        }
    }
}

impl Prober for HttpProber {
    fn probe<'a>(&'a self, check: &'a Check) -> ProbeFuture<'a> {
        Box::pin(self.get(check))
    }
}
