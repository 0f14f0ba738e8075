//! Config shared by every league role
//!
//! This module provides configuration options for controlling where a role stores its data,
//! how it logs, and how patient it is with its peers.
//!
//! Configuration can be created programmatically using [`Configuration::new()`] or by reading
//! environment variables using [`Configuration::from_env()`].
//!
//! # Environment Variables
//!
//! The following environment variables can be used to override configuration values. All
//! values are optional. Flags are case-insensitive, set the value to `"true"` to enable one.
//! Unparseable numbers fall back to the default.
//!
//! - `LEAGUE_ID` — League identifier (default: `league_2025_even_odd`)
//! - `LEAGUE_DATA_ROOT` — Root of the persisted documents (default: `data`)
//! - `LEAGUE_LOG_ROOT` — Root of the log files (default: `logs`)
//! - `LEAGUE_VERBOSE` — Debug-level console output (default: `true`)
//! - `LEAGUE_LOG` — Write the tracing output to a file instead of stdout (default: `false`)
//! - `LEAGUE_MAX_RETRIES` — Attempts per retried call (default: `3`)
//! - `LEAGUE_BASE_DELAY_MS` — First backoff sleep in milliseconds (default: `2000`)
//! - `LEAGUE_BACKOFF_MULTIPLIER` — Backoff growth factor (default: `2.0`)
//! - `LEAGUE_SEED` — Seed making referee draws and player strategies reproducible (default: unset)

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::transport::RetryPolicy;

pub const DEFAULT_LEAGUE_ID: &str = "league_2025_even_odd";

/// Per-call timeouts. Each retried attempt gets the full timeout again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub registration: Duration,
    /// Game invitation, answered by a join acknowledgement.
    pub invitation: Duration,
    /// Decision request, answered by a parity choice.
    pub decision: Duration,
    /// Game-over and other fire-and-forget notifications.
    pub notification: Duration,
    pub report: Duration,
    pub query: Duration,
    pub assignment: Duration,
    /// How long the conductor waits for a whole round to be reported.
    pub round: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            registration: Duration::from_secs(10),
            invitation: Duration::from_secs(5),
            decision: Duration::from_secs(30),
            notification: Duration::from_secs(5),
            report: Duration::from_secs(10),
            query: Duration::from_secs(5),
            assignment: Duration::from_secs(10),
            round: Duration::from_secs(300),
        }
    }
}

/// Configuration for league roles.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub(crate) league_id: String,
    pub(crate) data_root: PathBuf,
    pub(crate) log_root: PathBuf,
    pub(crate) verbose: bool,
    pub(crate) log: bool,
    pub(crate) retry: RetryPolicy,
    pub(crate) timeouts: Timeouts,
    pub(crate) seed: Option<u64>,
}

impl Configuration {
    /// Create a new configuration with default parameters.
    ///
    /// By default:
    /// - The league is `league_2025_even_odd`.
    /// - Documents go under `./data`, logs under `./logs`.
    /// - Console output is verbose and not written to a file.
    /// - Calls are attempted 3 times, sleeping 2 s then 4 s.
    /// - Randomness is not seeded.
    pub fn new() -> Self {
        Self {
            league_id: DEFAULT_LEAGUE_ID.to_string(),
            data_root: PathBuf::from("data"),
            log_root: PathBuf::from("logs"),
            verbose: true,
            log: false,
            retry: RetryPolicy::default(),
            timeouts: Timeouts::default(),
            seed: None,
        }
    }

    /// Create configuration from environment variables.
    ///
    /// See the module documentation for the recognized variables. Any other value (including
    /// unset) will result in using the default value for each field.
    pub fn from_env() -> Self {
        fn get_env_flag(var: &str, default: bool) -> bool {
            match std::env::var(var) {
                Ok(val) => val.eq_ignore_ascii_case("true"),
                Err(_) => default,
            }
        }

        fn get_env_parsed<T: FromStr>(var: &str) -> Option<T> {
            std::env::var(var).ok()?.trim().parse().ok()
        }

        let defaults = Self::new();
        let retry = RetryPolicy {
            max_retries: get_env_parsed("LEAGUE_MAX_RETRIES").unwrap_or(defaults.retry.max_retries),
            base_delay: get_env_parsed("LEAGUE_BASE_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry.base_delay),
            multiplier: get_env_parsed("LEAGUE_BACKOFF_MULTIPLIER")
                .unwrap_or(defaults.retry.multiplier),
        };

        Self {
            league_id: std::env::var("LEAGUE_ID").unwrap_or(defaults.league_id),
            data_root: std::env::var_os("LEAGUE_DATA_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_root),
            log_root: std::env::var_os("LEAGUE_LOG_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.log_root),
            verbose: get_env_flag("LEAGUE_VERBOSE", true),
            log: get_env_flag("LEAGUE_LOG", false),
            retry,
            timeouts: defaults.timeouts,
            seed: get_env_parsed("LEAGUE_SEED"),
        }
    }

    pub fn with_league_id(mut self, league_id: impl Into<String>) -> Self {
        self.league_id = league_id.into();
        self
    }

    /// Directory holding `leagues/` and `matches/`.
    pub fn with_data_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_root = path.into();
        self
    }

    pub fn with_log_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_root = path.into();
        self
    }

    /// Enable or disable debug-level output.
    pub fn with_verbose(mut self, value: bool) -> Self {
        self.verbose = value;
        self
    }

    /// Enable or disable logging to file.
    pub fn with_log(mut self, value: bool) -> Self {
        self.log = value;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Seed every random choice. Unseeded runs draw from OS entropy.
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn league_id(&self) -> &str {
        &self.league_id
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    pub fn log_root(&self) -> &Path {
        &self.log_root
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_protocol_constants() {
        let config = Configuration::new();
        assert_eq!(config.league_id(), DEFAULT_LEAGUE_ID);
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert_eq!(config.timeouts().invitation, Duration::from_secs(5));
        assert_eq!(config.timeouts().decision, Duration::from_secs(30));
        assert_eq!(config.seed(), None);
    }

    #[test]
    fn builder_overrides() {
        let config = Configuration::new()
            .with_league_id("test_league")
            .with_data_root("/tmp/league")
            .with_seed(Some(7))
            .with_log(true);
        assert_eq!(config.league_id(), "test_league");
        assert_eq!(config.data_root(), Path::new("/tmp/league"));
        assert_eq!(config.seed(), Some(7));
        assert!(config.log);
    }
}
