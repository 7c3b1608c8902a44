//! Configuration system (layered: code > env > config file > defaults).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::LoginError;
use crate::gateway::HttpGatewayConfig;
use crate::util::backoff::BackoffPolicy;

const ENV_POLL_INTERVAL: &str = "QRLOGIN_POLL_INTERVAL_SECS";
const ENV_POLL_TIMEOUT: &str = "QRLOGIN_POLL_TIMEOUT_SECS";
const ENV_CREATE_TIMEOUT: &str = "QRLOGIN_CREATE_TIMEOUT_SECS";
const ENV_BACKOFF_INITIAL: &str = "QRLOGIN_BACKOFF_INITIAL_SECS";
const ENV_BACKOFF_MAX: &str = "QRLOGIN_BACKOFF_MAX_SECS";
const ENV_MAX_TRANSIENT_FAILURES: &str = "QRLOGIN_MAX_TRANSIENT_FAILURES";
const ENV_RETENTION: &str = "QRLOGIN_RETENTION_SECS";
const ENV_BASE_URL: &str = "QRLOGIN_BASE_URL";
const ENV_LONG_POLL: &str = "QRLOGIN_LONG_POLL";

/// Every environment variable read by [`LoginConfig::from_env`].
pub const ENV_VARS: [&str; 9] = [
    ENV_POLL_INTERVAL,
    ENV_POLL_TIMEOUT,
    ENV_CREATE_TIMEOUT,
    ENV_BACKOFF_INITIAL,
    ENV_BACKOFF_MAX,
    ENV_MAX_TRANSIENT_FAILURES,
    ENV_RETENTION,
    ENV_BASE_URL,
    ENV_LONG_POLL,
];

/// Timing and retry settings for login sessions, plus the endpoint settings
/// used when the HTTP gateway is selected.
#[derive(Debug, Clone, PartialEq)]
pub struct LoginConfig {
    /// Delay between queries for providers that answer immediately.
    pub poll_interval: Duration,
    /// Deadline for one status query; must exceed the provider's long-poll
    /// hold time.
    pub poll_timeout: Duration,
    /// Deadline for creating a session.
    pub create_timeout: Duration,
    /// Delays between retries after transport faults.
    pub backoff: BackoffPolicy,
    /// Consecutive transport faults tolerated before the session fails.
    pub max_transient_failures: u32,
    /// How long a finished session stays readable before eviction.
    pub retention: Duration,
    pub gateway: HttpGatewayConfig,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            poll_timeout: Duration::from_secs(60),
            create_timeout: Duration::from_secs(15),
            backoff: BackoffPolicy::default(),
            max_transient_failures: 5,
            retention: Duration::from_secs(300),
            gateway: HttpGatewayConfig::default(),
        }
    }
}

/// On-disk shape of the config file. Durations are whole seconds.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    poll_interval_secs: Option<u64>,
    poll_timeout_secs: Option<u64>,
    create_timeout_secs: Option<u64>,
    backoff_initial_secs: Option<u64>,
    backoff_max_secs: Option<u64>,
    backoff_multiplier: Option<f64>,
    max_transient_failures: Option<u32>,
    retention_secs: Option<u64>,
    gateway: Option<HttpGatewayConfig>,
}

impl LoginConfig {
    /// Defaults overridden by environment variables (`.env` is loaded first).
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Parse a TOML document on top of the defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, LoginError> {
        let file: ConfigFile = toml::from_str(raw)?;
        let mut config = Self::default();
        config.apply_file(file)?;
        Ok(config)
    }

    /// Load a TOML config file on top of the defaults.
    pub fn load(path: &Path) -> Result<Self, LoginError> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            LoginError::Configuration(format!("cannot read {}: {err}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Full resolution: defaults, then the config file (`path`, or the
    /// default location when it exists), then the environment.
    pub fn layered(path: Option<&Path>) -> Result<Self, LoginError> {
        let _ = dotenvy::dotenv();
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => {
                let default_path = Self::default_path();
                if default_path.is_file() {
                    Self::load(&default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// `~/.qrlogin/config.toml`.
    pub fn default_path() -> PathBuf {
        directories::UserDirs::new()
            .map(|dirs| dirs.home_dir().join(".qrlogin"))
            .unwrap_or_else(|| PathBuf::from(".qrlogin"))
            .join("config.toml")
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn with_create_timeout(mut self, timeout: Duration) -> Self {
        self.create_timeout = timeout;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_max_transient_failures(mut self, max: u32) -> Self {
        self.max_transient_failures = max;
        self
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_gateway(mut self, gateway: HttpGatewayConfig) -> Self {
        self.gateway = gateway;
        self
    }

    fn apply_file(&mut self, file: ConfigFile) -> Result<(), LoginError> {
        if let Some(secs) = file.poll_interval_secs {
            self.poll_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = file.poll_timeout_secs {
            self.poll_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.create_timeout_secs {
            self.create_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.backoff_initial_secs {
            self.backoff.initial_backoff = Duration::from_secs(secs);
        }
        if let Some(secs) = file.backoff_max_secs {
            self.backoff.max_backoff = Duration::from_secs(secs);
        }
        if let Some(multiplier) = file.backoff_multiplier {
            if !multiplier.is_finite() || multiplier < 1.0 {
                return Err(LoginError::Configuration(format!(
                    "backoff_multiplier must be >= 1.0, got {multiplier}"
                )));
            }
            self.backoff.multiplier = multiplier;
        }
        if let Some(max) = file.max_transient_failures {
            self.max_transient_failures = max;
        }
        if let Some(secs) = file.retention_secs {
            self.retention = Duration::from_secs(secs);
        }
        if let Some(gateway) = file.gateway {
            self.gateway = gateway;
        }
        if self.poll_timeout.is_zero() {
            return Err(LoginError::Configuration(
                "poll_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let secs = |key: &str| parse_env::<u64>(key, lookup(key)).map(Duration::from_secs);

        if let Some(value) = secs(ENV_POLL_INTERVAL) {
            self.poll_interval = value;
        }
        if let Some(value) = secs(ENV_POLL_TIMEOUT).filter(|d| !d.is_zero()) {
            self.poll_timeout = value;
        }
        if let Some(value) = secs(ENV_CREATE_TIMEOUT) {
            self.create_timeout = value;
        }
        if let Some(value) = secs(ENV_BACKOFF_INITIAL) {
            self.backoff.initial_backoff = value;
        }
        if let Some(value) = secs(ENV_BACKOFF_MAX) {
            self.backoff.max_backoff = value;
        }
        if let Some(value) =
            parse_env::<u32>(ENV_MAX_TRANSIENT_FAILURES, lookup(ENV_MAX_TRANSIENT_FAILURES))
        {
            self.max_transient_failures = value;
        }
        if let Some(value) = secs(ENV_RETENTION) {
            self.retention = value;
        }
        if let Some(url) = lookup(ENV_BASE_URL).filter(|url| !url.trim().is_empty()) {
            self.gateway.base_url = url.trim().to_string();
        }
        if let Some(flag) = parse_env::<bool>(ENV_LONG_POLL, lookup(ENV_LONG_POLL)) {
            self.gateway.long_poll = flag;
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: Option<String>) -> Option<T> {
    let raw = raw?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(variable = key, value = %raw, "ignoring invalid environment value");
            None
        }
    }
}
