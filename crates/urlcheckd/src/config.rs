//! urlcheckd.toml configuration parser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

use urlcheck_probe::DEFAULT_TIMEOUT;
use urlcheck_scheduler::{
    DEFAULT_EXPIRY_LIMIT, DEFAULT_LEASE_TIMEOUT, DEFAULT_POOL_SIZE, DEFAULT_SWEEP_INTERVAL,
    DEFAULT_TICK_INTERVAL, SchedulerConfig,
};

pub const DEFAULT_STORE_PATH: &str = "/var/lib/urlcheck/urlcheck.redb";
pub const DEFAULT_PROBE_NAME: &str = "Standalone";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProbeConfig {
    pub name: Option<String>,
    pub clustered: Option<bool>,
    pub candidate_pool_size: Option<usize>,
    pub timeout: Option<String>,
    pub tick_interval: Option<String>,
    pub lease_timeout: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetentionConfig {
    pub interval: Option<String>,
    pub expiry_limit: Option<usize>,
}

/// Fully-defaulted settings the daemon runs with.
#[derive(Debug, Clone)]
pub struct Settings {
    pub store_path: PathBuf,
    pub scheduler: SchedulerConfig,
    pub probe_timeout: Duration,
    pub tick_interval: Duration,
    pub sweep_interval: Duration,
    pub expiry_limit: usize,
}

impl DaemonConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load from `path`, or use all defaults when no file is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Fill in defaults and validate.
    pub fn resolve(&self) -> anyhow::Result<Settings> {
        let probe = &self.probe;
        let pool_size = probe.candidate_pool_size.unwrap_or(DEFAULT_POOL_SIZE);
        if pool_size == 0 {
            bail!("probe.candidate_pool_size must be at least 1");
        }
        let expiry_limit = self.retention.expiry_limit.unwrap_or(DEFAULT_EXPIRY_LIMIT);
        if expiry_limit == 0 {
            bail!("retention.expiry_limit must be at least 1");
        }

        let lease_timeout = duration_or(
            "probe.lease_timeout",
            &probe.lease_timeout,
            DEFAULT_LEASE_TIMEOUT,
        )?;
        let probe_timeout = duration_or("probe.timeout", &probe.timeout, DEFAULT_TIMEOUT)?;
        if lease_timeout < Duration::from_secs(1) {
            bail!("probe.lease_timeout must be at least 1s");
        }
        if lease_timeout <= probe_timeout {
            bail!(
                "probe.lease_timeout ({lease_timeout:?}) must exceed probe.timeout ({probe_timeout:?})"
            );
        }

        Ok(Settings {
            store_path: self
                .store
                .path
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_PATH)),
            scheduler: SchedulerConfig {
                probe: probe
                    .name
                    .clone()
                    .unwrap_or_else(|| DEFAULT_PROBE_NAME.to_string()),
                clustered: probe.clustered.unwrap_or(false),
                pool_size,
                lease_timeout,
            },
            probe_timeout,
            tick_interval: duration_or(
                "probe.tick_interval",
                &probe.tick_interval,
                DEFAULT_TICK_INTERVAL,
            )?,
            sweep_interval: duration_or(
                "retention.interval",
                &self.retention.interval,
                DEFAULT_SWEEP_INTERVAL,
            )?,
            expiry_limit,
        })
    }
}

fn duration_or(
    field: &str,
    value: &Option<String>,
    default: Duration,
) -> anyhow::Result<Duration> {
    match value {
        Some(s) => parse_duration(s).with_context(|| format!("invalid {field}")),
        None => Ok(default),
    }
}

/// Parse `"500ms"`, `"10s"`, `"5m"`, `"1h"`, or bare seconds.
pub fn parse_duration(s: &str) -> anyhow::Result<Duration> {
    let s = s.trim();
    let (digits, millis_per_unit) = if let Some(ms) = s.strip_suffix("ms") {
        (ms, 1)
    } else if let Some(secs) = s.strip_suffix('s') {
        (secs, 1_000)
    } else if let Some(mins) = s.strip_suffix('m') {
        (mins, 60_000)
    } else if let Some(hours) = s.strip_suffix('h') {
        (hours, 3_600_000)
    } else {
        (s, 1_000)
    };

    let value: u64 = digits
        .trim()
        .parse()
        .with_context(|| format!("{s:?} is not a duration"))?;
    let millis = value
        .checked_mul(millis_per_unit)
        .with_context(|| format!("{s:?} is too large"))?;
    Ok(Duration::from_millis(millis))
}
