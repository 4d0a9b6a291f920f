//! Environment-driven configuration for the api and worker binaries.
//!
//! Every setting is read from a `PIGEONHOLE_*` environment variable, plus
//! `RUST_LOG` and `LOG_FORMAT` for logging. Binaries seed the environment from
//! a `.env` file with `dotenvy` before calling [`Config::from_env`].

use std::{fmt, net::SocketAddr, time::Duration};

use tracing_error::SpanTrace;

use crate::consumer::PollerConfig;

/// Listen address of the api.
pub const BIND_ADDR: &str = "PIGEONHOLE_BIND_ADDR";
/// Queue URL, used by both binaries.
pub const QUEUE_URL: &str = "PIGEONHOLE_QUEUE_URL";
/// Archive bucket, used by the worker.
pub const BUCKET: &str = "PIGEONHOLE_BUCKET";
/// SSM parameter holding the API token, used by the api.
pub const TOKEN_PARAMETER: &str = "PIGEONHOLE_TOKEN_PARAMETER";
/// Seconds between poll cycles.
pub const POLL_INTERVAL_SECS: &str = "PIGEONHOLE_POLL_INTERVAL_SECS";
/// Batch size of one receive, 1 to 10.
pub const MAX_MESSAGES: &str = "PIGEONHOLE_MAX_MESSAGES";
/// Long-poll wait of one receive, 0 to 20 seconds.
pub const WAIT_TIME_SECS: &str = "PIGEONHOLE_WAIT_TIME_SECS";
/// Log filter directives.
pub const RUST_LOG: &str = "RUST_LOG";
/// `text` or `json`.
pub const LOG_FORMAT: &str = "LOG_FORMAT";

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_LOG_FILTER: &str = "info";

/// Service configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub queue_url: String,
    /// Archive bucket, required by the worker only.
    pub bucket: Option<String>,
    /// Secret-store parameter holding the API token, required by the api only.
    pub token_parameter: Option<String>,
    pub poller: PollerConfig,
    pub logging: LoggingConfig,
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// `EnvFilter` directives.
    pub filter: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_owned(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
/// Output format of the log subscriber.
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl Config {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup`, which maps a variable name to
    /// its value.
    ///
    /// Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let bind_addr = get(BIND_ADDR).unwrap_or_else(|| DEFAULT_BIND_ADDR.to_owned());
        let bind_addr: SocketAddr = bind_addr
            .parse()
            .map_err(|_| ConfigError::invalid(BIND_ADDR, &bind_addr, "not a socket address"))?;

        let queue_url = get(QUEUE_URL).ok_or_else(|| ConfigError::missing(QUEUE_URL))?;

        let defaults = PollerConfig::default();
        let interval = parse_or(
            get(POLL_INTERVAL_SECS),
            POLL_INTERVAL_SECS,
            defaults.interval.as_secs(),
        )?;
        if interval == 0 {
            return Err(ConfigError::invalid(POLL_INTERVAL_SECS, "0", "must be at least 1"));
        }
        let max_messages = parse_or(get(MAX_MESSAGES), MAX_MESSAGES, defaults.max_messages)?;
        if !(1..=10).contains(&max_messages) {
            return Err(ConfigError::invalid(
                MAX_MESSAGES,
                &max_messages.to_string(),
                "must be between 1 and 10",
            ));
        }
        let wait_time = parse_or(
            get(WAIT_TIME_SECS),
            WAIT_TIME_SECS,
            defaults.wait_time.as_secs(),
        )?;
        if wait_time > 20 {
            return Err(ConfigError::invalid(
                WAIT_TIME_SECS,
                &wait_time.to_string(),
                "must be between 0 and 20",
            ));
        }

        let format = match get(LOG_FORMAT) {
            None => LogFormat::Text,
            Some(format) => match format.trim().to_ascii_lowercase().as_str() {
                "text" => LogFormat::Text,
                "json" => LogFormat::Json,
                _ => return Err(ConfigError::invalid(LOG_FORMAT, &format, "expected text or json")),
            },
        };

        Ok(Self {
            bind_addr,
            queue_url,
            bucket: get(BUCKET),
            token_parameter: get(TOKEN_PARAMETER),
            poller: PollerConfig {
                interval: Duration::from_secs(interval),
                max_messages,
                wait_time: Duration::from_secs(wait_time),
            },
            logging: LoggingConfig {
                filter: get(RUST_LOG).unwrap_or_else(|| DEFAULT_LOG_FILTER.to_owned()),
                format,
            },
        })
    }

    /// The archive bucket, or an error naming the missing variable.
    pub fn bucket(&self) -> Result<&str, ConfigError> {
        self.bucket.as_deref().ok_or_else(|| ConfigError::missing(BUCKET))
    }

    /// The token parameter name, or an error naming the missing variable.
    pub fn token_parameter(&self) -> Result<&str, ConfigError> {
        self.token_parameter
            .as_deref()
            .ok_or_else(|| ConfigError::missing(TOKEN_PARAMETER))
    }
}

fn parse_or<T: std::str::FromStr>(
    value: Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::invalid(key, &value, "not a number")),
    }
}

/// Error returned when the configuration is incomplete or malformed.
#[derive(Debug)]
pub struct ConfigError {
    context: SpanTrace,
    kind: ConfigErrorKind,
}

/// Configuration error kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigErrorKind {
    /// A required variable is unset or blank.
    Missing(&'static str),
    /// A variable is set to something unusable.
    Invalid {
        key: &'static str,
        value: String,
        reason: &'static str,
    },
}

impl ConfigError {
    fn missing(key: &'static str) -> Self {
        Self {
            context: SpanTrace::capture(),
            kind: ConfigErrorKind::Missing(key),
        }
    }

    fn invalid(key: &'static str, value: &str, reason: &'static str) -> Self {
        Self {
            context: SpanTrace::capture(),
            kind: ConfigErrorKind::Invalid {
                key,
                value: value.to_owned(),
                reason,
            },
        }
    }

    /// Returns the kind of configuration error.
    pub fn kind(&self) -> &ConfigErrorKind {
        &self.kind
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ConfigErrorKind::Missing(key) => writeln!(f, "Missing environment variable {key}"),
            ConfigErrorKind::Invalid { key, value, reason } => {
                writeln!(f, "Invalid value {value:?} for {key}: {reason}")
            }
        }?;
        self.context.fmt(f)
    }
}

impl std::error::Error for ConfigError {}
