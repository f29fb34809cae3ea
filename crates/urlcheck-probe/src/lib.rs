//! urlcheck-probe — the network step of a scheduler tick.
//!
//! Issues a single GET against a claimed check's URL and reports the status
//! code and wall-clock response time. Transport failures never escape as
//! errors: they are reported as a synthetic server error so they flow
//! through reconciliation like any other outcome.
//!
//! # Architecture
//!
//! ```text
//! Prober (trait, injectable)
//!   └── HttpProber
//!       ├── reqwest::Client (browser User-Agent, bounded timeout)
//!       └── probe(check) → ProbeOutcome { status_code, elapsed_ms }
//! ```
//!
//! There are no retries here; the check's interval is the retry.

pub mod executor;

pub use executor::{
    DEFAULT_TIMEOUT, HttpProber, ProbeError, ProbeFuture, ProbeOutcome, Prober,
    TRANSPORT_FAILURE_STATUS, USER_AGENT,
};
