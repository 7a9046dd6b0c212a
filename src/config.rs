//! Shell configuration.
//!
//! A [`Config`] is built once, from a flat `HashMap<String, String>` of
//! properties (the same shape an external `sensorshell.properties` parser
//! or a `-D` command line override collaborator would produce), validated,
//! and then handed to a [`crate::shell::SensorShell`] or
//! [`crate::multi_shell::MultiSensorShell`].

use std::collections::HashMap;
use std::time::Duration;

/// Below this many minutes, `autosend.timeinterval` disables the autoflush
/// timer entirely rather than firing unreasonably often.
pub const AUTOSEND_DISABLE_THRESHOLD_MINUTES: f64 = 0.01;

const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_AUTOSEND_INTERVAL_MINUTES: f64 = 1.0;
const DEFAULT_AUTOSEND_MAXBUFFER: usize = 250;
const DEFAULT_OFFLINE_CACHE_ENABLED: bool = true;
const DEFAULT_OFFLINE_RECOVERY_ENABLED: bool = true;
const DEFAULT_STATECHANGE_INTERVAL_SECS: u64 = 30;
const DEFAULT_MULTISHELL_ENABLED: bool = false;
const DEFAULT_MULTISHELL_NUMSHELLS: usize = 10;
const DEFAULT_MULTISHELL_BATCHSIZE: usize = 499;
const DEFAULT_MULTISHELL_MAXBUFFER: usize = 500;
const DEFAULT_MULTISHELL_AUTOSEND_INTERVAL_MINUTES: f64 = 0.05;

/// Errors raised while building a [`Config`] from raw properties.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    /// One of `host`, `user` or `password` was absent or empty.
    #[error("missing required configuration key: {0}")]
    MissingRequired(&'static str),
}

/// Verbosity requested via `logging.level`. Purely advisory: `tools/cli`
/// and other consumers may use it to pick a `tracing` filter, but nothing
/// in the core enforces it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogLevel {
    /// Most verbose.
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    /// Least verbose.
    Error,
}

impl LogLevel {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "TRACE" => Some(Self::Trace),
            "DEBUG" => Some(Self::Debug),
            "INFO" => Some(Self::Info),
            "WARN" | "WARNING" => Some(Self::Warn),
            "ERROR" => Some(Self::Error),
            _ => None,
        }
    }

    /// Maps onto the `tracing` verbosity level a consumer would filter by.
    #[must_use]
    pub fn as_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

/// Validated, immutable settings for one shell (or one child of a
/// [`crate::multi_shell::MultiSensorShell`]).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Base URL of the SensorBase server, always ending in `/`.
    pub host: String,
    /// User identifier sent as HTTP basic auth username and record owner.
    pub user: String,
    /// Password sent as HTTP basic auth password.
    pub password: String,
    /// Per-request HTTP timeout (excludes the hardcoded ping timeout).
    pub timeout: Duration,
    /// Period between automatic flushes. `None` when `autosend.timeinterval`
    /// is below [`AUTOSEND_DISABLE_THRESHOLD_MINUTES`], disabling the timer.
    pub autosend_interval: Option<Duration>,
    /// Buffer size that forces a synchronous flush. `0` disables the trigger
    /// entirely (the buffer grows until the timer fires or `send` is called).
    pub autosend_maxbuffer: usize,
    /// Whether failed sends are spooled to disk for later recovery.
    pub offline_cache_enabled: bool,
    /// Whether spooled batches are replayed at startup.
    pub offline_recovery_enabled: bool,
    /// Advisory period for `statechange` callers; not enforced by the core.
    pub statechange_interval: Duration,
    /// Whether a [`crate::multi_shell::MultiSensorShell`] is constructed
    /// instead of a single [`crate::shell::SensorShell`].
    pub multishell_enabled: bool,
    /// Number of child shells when `multishell_enabled` is set.
    pub multishell_numshells: usize,
    /// Consecutive records routed to one child before round-robin advances;
    /// `0` selects a child uniformly at random on every `add` instead.
    pub multishell_batchsize: usize,
    /// Overrides `autosend_maxbuffer` for each child shell.
    pub multishell_maxbuffer: usize,
    /// Overrides `autosend_interval` for each child shell.
    pub multishell_autosend_interval: Option<Duration>,
    /// Requested log verbosity.
    pub logging_level: LogLevel,
}

fn get_required<'a>(map: &'a HashMap<String, String>, key: &'static str) -> Result<&'a str, ConfigError> {
    map.get(key)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::MissingRequired(key))
}

fn parse_bool(map: &HashMap<String, String>, key: &str, default: bool) -> bool {
    match map.get(key).map(|v| v.parse::<bool>()) {
        Some(Ok(value)) => value,
        Some(Err(_)) => {
            tracing::warn!(key, "configuration value is not a boolean, using default");
            default
        }
        None => default,
    }
}

/// Parses a non-negative count, replacing an unparsable value with the
/// default but otherwise accepting any value, including `0` (which several
/// keys give special "disabled"/"random" meaning to).
fn parse_count(map: &HashMap<String, String>, key: &str, default: usize) -> usize {
    match map.get(key).map(|v| v.parse::<usize>()) {
        Some(Ok(value)) => value,
        Some(Err(_)) => {
            tracing::warn!(key, "configuration value failed to parse, using default");
            default
        }
        None => default,
    }
}

/// Like [`parse_count`] but rejects `0`, for keys where zero would leave the
/// shell with no usable configuration (e.g. no child shells at all).
fn parse_count_min1(map: &HashMap<String, String>, key: &str, default: usize) -> usize {
    match map.get(key).map(|v| v.parse::<usize>()) {
        Some(Ok(value)) if value >= 1 => value,
        Some(Ok(_)) => {
            tracing::warn!(key, "configuration value must be at least 1, using default");
            default
        }
        Some(Err(_)) => {
            tracing::warn!(key, "configuration value failed to parse, using default");
            default
        }
        None => default,
    }
}

fn parse_seconds_min1(map: &HashMap<String, String>, key: &str, default: u64) -> u64 {
    match map.get(key).map(|v| v.parse::<u64>()) {
        Some(Ok(value)) if value >= 1 => value,
        Some(Ok(_)) => {
            tracing::warn!(key, "configuration value must be at least 1 second, using default");
            default
        }
        Some(Err(_)) => {
            tracing::warn!(key, "configuration value failed to parse, using default");
            default
        }
        None => default,
    }
}

fn parse_seconds(map: &HashMap<String, String>, key: &str, default: u64) -> u64 {
    match map.get(key).map(|v| v.parse::<u64>()) {
        Some(Ok(value)) => value,
        Some(Err(_)) => {
            tracing::warn!(key, "configuration value failed to parse, using default");
            default
        }
        None => default,
    }
}

fn parse_minutes(map: &HashMap<String, String>, key: &str, default_minutes: f64) -> f64 {
    match map.get(key).map(|v| v.parse::<f64>()) {
        Some(Ok(value)) if value >= 0.0 => value,
        Some(Ok(_)) => {
            tracing::warn!(key, "configuration value must not be negative, using default");
            default_minutes
        }
        Some(Err(_)) => {
            tracing::warn!(key, "configuration value failed to parse, using default");
            default_minutes
        }
        None => default_minutes,
    }
}

fn interval_from_minutes(minutes: f64) -> Option<Duration> {
    if minutes < AUTOSEND_DISABLE_THRESHOLD_MINUTES {
        None
    } else {
        Some(Duration::from_secs_f64(minutes * 60.0))
    }
}

impl Config {
    /// Builds a [`Config`] from a flat property map.
    ///
    /// `host`, `user` and `password` are required; every other key falls
    /// back to its documented default when absent, unparsable, or out of
    /// bounds (a warning is logged in the latter two cases). A
    /// `host` missing a trailing `/` has one appended.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingRequired`] naming the first missing
    /// required key.
    pub fn from_map(map: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let host_raw = get_required(map, "host")?;
        let host = if host_raw.ends_with('/') {
            host_raw.to_owned()
        } else {
            format!("{host_raw}/")
        };
        let user = get_required(map, "user")?.to_owned();
        let password = get_required(map, "password")?.to_owned();

        let timeout_secs = parse_seconds_min1(map, "timeout", DEFAULT_TIMEOUT_SECS);

        let autosend_interval_minutes = parse_minutes(map, "autosend.timeinterval", DEFAULT_AUTOSEND_INTERVAL_MINUTES);
        let autosend_interval = interval_from_minutes(autosend_interval_minutes);
        if autosend_interval.is_none() {
            tracing::info!("autosend.timeinterval below disable threshold, autoflush timer is off");
        }

        let autosend_maxbuffer = parse_count(map, "autosend.maxbuffer", DEFAULT_AUTOSEND_MAXBUFFER);

        let offline_cache_enabled = parse_bool(map, "offline.cache.enabled", DEFAULT_OFFLINE_CACHE_ENABLED);
        let offline_recovery_enabled = parse_bool(map, "offline.recovery.enabled", DEFAULT_OFFLINE_RECOVERY_ENABLED);

        let statechange_interval_secs = parse_seconds(map, "statechange.interval", DEFAULT_STATECHANGE_INTERVAL_SECS);

        let multishell_enabled = parse_bool(map, "multishell.enabled", DEFAULT_MULTISHELL_ENABLED);
        let multishell_numshells = parse_count_min1(map, "multishell.numshells", DEFAULT_MULTISHELL_NUMSHELLS);
        let multishell_batchsize = parse_count(map, "multishell.batchsize", DEFAULT_MULTISHELL_BATCHSIZE);
        let multishell_maxbuffer = parse_count(map, "multishell.maxbuffer", DEFAULT_MULTISHELL_MAXBUFFER);
        let multishell_autosend_interval_minutes = parse_minutes(
            map,
            "multishell.autosend.timeinterval",
            DEFAULT_MULTISHELL_AUTOSEND_INTERVAL_MINUTES,
        );
        let multishell_autosend_interval = interval_from_minutes(multishell_autosend_interval_minutes);

        let logging_level = map.get("logging.level").map_or_else(LogLevel::default, |value| {
            LogLevel::parse(value).unwrap_or_else(|| {
                tracing::warn!(value, "unrecognized logging.level, using default");
                LogLevel::default()
            })
        });

        Ok(Self {
            host,
            user,
            password,
            timeout: Duration::from_secs(timeout_secs),
            autosend_interval,
            autosend_maxbuffer,
            offline_cache_enabled,
            offline_recovery_enabled,
            statechange_interval: Duration::from_secs(statechange_interval_secs),
            multishell_enabled,
            multishell_numshells,
            multishell_batchsize,
            multishell_maxbuffer,
            multishell_autosend_interval,
            logging_level,
        })
    }

    /// Returns a copy of this config with `autosend_*` replaced by the
    /// `multishell.*` overrides, as applied to each child of a
    /// [`crate::multi_shell::MultiSensorShell`]. The two defaults
    /// (`autosend.maxbuffer = 250` vs `multishell.maxbuffer = 500`, and the
    /// interval shrinking from 1 minute to 0.05 minutes) intentionally keep
    /// the per-child timer winning over the size trigger; preserve that
    /// inequality if these defaults are ever revisited.
    #[must_use]
    pub fn for_multishell_child(&self) -> Self {
        Self {
            autosend_interval: self.multishell_autosend_interval,
            autosend_maxbuffer: self.multishell_maxbuffer,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn required_only() -> HashMap<String, String> {
        HashMap::from([
            ("host".to_owned(), "http://localhost:9876".to_owned()),
            ("user".to_owned(), "alice".to_owned()),
            ("password".to_owned(), "secret".to_owned()),
        ])
    }

    #[test]
    fn fills_in_defaults_when_only_required_keys_are_present() {
        let config = Config::from_map(&required_only()).unwrap();
        assert_eq!(config.host, "http://localhost:9876/");
        assert_eq!(config.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert_eq!(config.autosend_maxbuffer, DEFAULT_AUTOSEND_MAXBUFFER);
        assert_eq!(
            config.autosend_interval,
            Some(Duration::from_secs_f64(DEFAULT_AUTOSEND_INTERVAL_MINUTES * 60.0))
        );
        assert!(config.offline_cache_enabled);
        assert!(config.offline_recovery_enabled);
        assert!(!config.multishell_enabled);
        assert_eq!(config.multishell_numshells, DEFAULT_MULTISHELL_NUMSHELLS);
        assert_eq!(config.multishell_batchsize, DEFAULT_MULTISHELL_BATCHSIZE);
        assert_eq!(config.logging_level, LogLevel::Info);
    }

    #[test]
    fn host_with_a_trailing_slash_is_left_alone() {
        let mut map = required_only();
        map.insert("host".to_owned(), "http://localhost:9876/".to_owned());
        let config = Config::from_map(&map).unwrap();
        assert_eq!(config.host, "http://localhost:9876/");
    }

    #[test]
    fn rejects_missing_required_keys() {
        let mut map = required_only();
        map.remove("host");
        assert_eq!(Config::from_map(&map), Err(ConfigError::MissingRequired("host")));
    }

    #[test]
    fn below_threshold_autosend_interval_disables_the_timer() {
        let mut map = required_only();
        map.insert("autosend.timeinterval".to_owned(), "0.001".to_owned());
        let config = Config::from_map(&map).unwrap();
        assert_eq!(config.autosend_interval, None);
    }

    #[test]
    fn negative_autosend_interval_falls_back_to_default() {
        let mut map = required_only();
        map.insert("autosend.timeinterval".to_owned(), "-1".to_owned());
        let config = Config::from_map(&map).unwrap();
        assert_eq!(
            config.autosend_interval,
            Some(Duration::from_secs_f64(DEFAULT_AUTOSEND_INTERVAL_MINUTES * 60.0))
        );
    }

    #[test]
    fn zero_maxbuffer_is_accepted_verbatim() {
        let mut map = required_only();
        map.insert("autosend.maxbuffer".to_owned(), "0".to_owned());
        let config = Config::from_map(&map).unwrap();
        assert_eq!(config.autosend_maxbuffer, 0);
    }

    #[test]
    fn substitutes_default_for_unparsable_values() {
        let mut map = required_only();
        map.insert("autosend.maxbuffer".to_owned(), "lots".to_owned());
        let config = Config::from_map(&map).unwrap();
        assert_eq!(config.autosend_maxbuffer, DEFAULT_AUTOSEND_MAXBUFFER);
    }

    #[test]
    fn zero_numshells_falls_back_to_default() {
        let mut map = required_only();
        map.insert("multishell.numshells".to_owned(), "0".to_owned());
        let config = Config::from_map(&map).unwrap();
        assert_eq!(config.multishell_numshells, DEFAULT_MULTISHELL_NUMSHELLS);
    }

    #[test]
    fn multishell_child_config_overrides_autosend_settings() {
        let mut map = required_only();
        map.insert("multishell.maxbuffer".to_owned(), "42".to_owned());
        map.insert("multishell.autosend.timeinterval".to_owned(), "5".to_owned());
        let config = Config::from_map(&map).unwrap();
        let child = config.for_multishell_child();
        assert_eq!(child.autosend_maxbuffer, 42);
        assert_eq!(child.autosend_interval, Some(Duration::from_secs(5 * 60)));
    }

    #[test]
    fn unrecognized_logging_level_falls_back_to_default() {
        let mut map = required_only();
        map.insert("logging.level".to_owned(), "VERY_LOUD".to_owned());
        let config = Config::from_map(&map).unwrap();
        assert_eq!(config.logging_level, LogLevel::Info);
    }
}
