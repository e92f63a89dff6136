//! Configuration system (layered: code > env > config file > defaults).

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::LapseError;
use crate::poll::BackoffSchedule;

pub const ENV_REFRESH_BUFFER_SECONDS: &str = "LAPSE_REFRESH_BUFFER_SECONDS";
pub const ENV_BASE_INTERVAL_MS: &str = "LAPSE_BASE_INTERVAL_MS";
pub const ENV_BACKOFF_THRESHOLDS: &str = "LAPSE_BACKOFF_THRESHOLDS";
pub const ENV_BACKOFF_MULTIPLIERS: &str = "LAPSE_BACKOFF_MULTIPLIERS";
pub const ENV_NETWORK_RETRY_DELAY_MS: &str = "LAPSE_NETWORK_RETRY_DELAY_MS";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "LAPSE_REQUEST_TIMEOUT_MS";

/// Timing knobs for credential renewal and status polling.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use lapse::config::LapseConfig;
///
/// let config = LapseConfig::default().with_base_interval(Duration::from_secs(5));
/// assert_eq!(config.refresh_buffer, Duration::from_secs(120));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct LapseConfig {
    /// How long before expiry a renewal is attempted.
    pub refresh_buffer: Duration,
    /// Poll interval for the first backoff stage.
    pub base_interval: Duration,
    pub backoff: BackoffSchedule,
    /// Fixed retry cadence while the network is unreachable.
    pub network_retry_delay: Duration,
    /// Deadline for a single refresh or status request.
    pub request_timeout: Duration,
}

impl Default for LapseConfig {
    fn default() -> Self {
        Self {
            refresh_buffer: Duration::from_secs(120),
            base_interval: Duration::from_millis(15_000),
            backoff: BackoffSchedule::default(),
            network_retry_delay: Duration::from_millis(120_000),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl LapseConfig {
    /// Defaults overlaid with `LAPSE_*` environment variables (and `.env`).
    pub fn from_env() -> Result<Self, LapseError> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        Self::default().apply_env()
    }

    /// Config file (if it exists) overlaid with the environment.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LapseError> {
        let _ = dotenvy::dotenv();
        Self::load_from_path(path)?.apply_env()
    }

    /// Read a TOML config file over the defaults.
    ///
    /// A missing file yields the defaults.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, LapseError> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(raw) => Self::from_toml_str(&raw).map_err(|e| match e {
                LapseError::Configuration(msg) => {
                    LapseError::Configuration(format!("{}: {msg}", path.display()))
                }
                other => other,
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(LapseError::Io(err)),
        }
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, LapseError> {
        let file: ConfigFile =
            toml::from_str(raw).map_err(|e| LapseError::Configuration(e.to_string()))?;
        let mut config = Self::default();
        if let Some(secs) = file.refresh_buffer_seconds {
            config.refresh_buffer = Duration::from_secs(secs);
        }
        if let Some(ms) = file.base_interval_ms {
            config.base_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = file.network_retry_delay_ms {
            config.network_retry_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = file.request_timeout_ms {
            config.request_timeout = Duration::from_millis(ms);
        }
        if file.backoff_thresholds.is_some() || file.backoff_multipliers.is_some() {
            config.backoff = BackoffSchedule::new(
                file.backoff_thresholds
                    .unwrap_or_else(|| config.backoff.thresholds().to_vec()),
                file.backoff_multipliers
                    .unwrap_or_else(|| config.backoff.multipliers().to_vec()),
            )?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Overlay `LAPSE_*` variables from the process environment.
    pub fn apply_env(self) -> Result<Self, LapseError> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    /// Overlay variables from an arbitrary lookup.
    pub fn apply_vars(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, LapseError> {
        if let Some(secs) = parse_var::<u64>(&lookup, ENV_REFRESH_BUFFER_SECONDS)? {
            self.refresh_buffer = Duration::from_secs(secs);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, ENV_BASE_INTERVAL_MS)? {
            self.base_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, ENV_NETWORK_RETRY_DELAY_MS)? {
            self.network_retry_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, ENV_REQUEST_TIMEOUT_MS)? {
            self.request_timeout = Duration::from_millis(ms);
        }
        let thresholds = parse_list(&lookup, ENV_BACKOFF_THRESHOLDS)?;
        let multipliers = parse_list(&lookup, ENV_BACKOFF_MULTIPLIERS)?;
        if thresholds.is_some() || multipliers.is_some() {
            self.backoff = BackoffSchedule::new(
                thresholds.unwrap_or_else(|| self.backoff.thresholds().to_vec()),
                multipliers.unwrap_or_else(|| self.backoff.multipliers().to_vec()),
            )?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn with_refresh_buffer(mut self, buffer: Duration) -> Self {
        self.refresh_buffer = buffer;
        self
    }

    pub fn with_base_interval(mut self, interval: Duration) -> Self {
        self.base_interval = interval;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffSchedule) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_network_retry_delay(mut self, delay: Duration) -> Self {
        self.network_retry_delay = delay;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Reject values that would make a timer spin.
    pub fn validate(&self) -> Result<(), LapseError> {
        if self.base_interval.is_zero() {
            return Err(LapseError::Configuration(
                "base poll interval must be greater than zero".to_string(),
            ));
        }
        if self.network_retry_delay.is_zero() {
            return Err(LapseError::Configuration(
                "network retry delay must be greater than zero".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(LapseError::Configuration(
                "request timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    refresh_buffer_seconds: Option<u64>,
    base_interval_ms: Option<u64>,
    backoff_thresholds: Option<Vec<u32>>,
    backoff_multipliers: Option<Vec<u32>>,
    network_retry_delay_ms: Option<u64>,
    request_timeout_ms: Option<u64>,
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, LapseError> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| LapseError::Configuration(format!("{key} is not a valid number: {raw}"))),
    }
}

fn parse_list(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<Vec<u32>>, LapseError> {
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            item.parse::<u32>().map_err(|_| {
                LapseError::Configuration(format!("{key} has a non-numeric entry: {item}"))
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}
