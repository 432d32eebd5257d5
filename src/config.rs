//! Worker configuration
//!
//! All tunables the orchestrator consumes, with defaults matching a local
//! single-host deployment. Every knob can be overridden through the
//! environment; the coordinator address can additionally be passed as the
//! first CLI argument in `ip:port` form.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use regex::Regex;

/// Default coordinator address and port.
pub const DEFAULT_COORDINATOR: &str = "http://0.0.0.0:8000";

/// `ip:port` shape accepted as a CLI address override. Hostnames go
/// through the environment variable instead.
const IPV4_WITH_PORT: &str = r"^\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}:\d{1,5}$";

/// Tunables consumed by the orchestrator and its collaborators.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Coordinator base URL
    pub coordinator: String,
    /// Wait after a failed poll
    pub poll_retry: Duration,
    /// Wait after an empty poll
    pub no_work_delay: Duration,
    /// Interval between liveness pings
    pub heartbeat_interval: Duration,
    /// Wait between registration attempts
    pub register_backoff: Duration,
    /// Client-side timeout for each coordinator request
    pub request_timeout: Duration,
    /// Records per submitted result batch
    pub batch_size: usize,
    /// CPU lanes kept free for the heartbeat and I/O tasks
    pub reserved_lanes: usize,
    /// Full-matrix byte budget before the bounded-memory tier is used
    pub memory_budget: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            coordinator: DEFAULT_COORDINATOR.to_string(),
            poll_retry: Duration::from_secs(1),
            no_work_delay: Duration::from_secs(1),
            heartbeat_interval: Duration::from_secs(8),
            register_backoff: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            batch_size: 100,
            reserved_lanes: 1,
            memory_budget: 256 * 1024 * 1024,
        }
    }
}

impl WorkerConfig {
    /// Defaults overridden by `SWGRID_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            coordinator: env::var("SWGRID_COORDINATOR").unwrap_or(defaults.coordinator),
            poll_retry: env_duration_secs("SWGRID_POLL_RETRY_SECS", defaults.poll_retry),
            no_work_delay: env_duration_secs("SWGRID_NO_WORK_DELAY_SECS", defaults.no_work_delay),
            heartbeat_interval: env_duration_secs("SWGRID_HEARTBEAT_SECS", defaults.heartbeat_interval),
            register_backoff: env_duration_secs("SWGRID_REGISTER_BACKOFF_SECS", defaults.register_backoff),
            request_timeout: env_duration_secs("SWGRID_REQUEST_TIMEOUT_SECS", defaults.request_timeout),
            batch_size: env_parse("SWGRID_BATCH_SIZE", defaults.batch_size),
            reserved_lanes: env_parse("SWGRID_RESERVED_LANES", defaults.reserved_lanes),
            memory_budget: env_parse::<usize>("SWGRID_MEMORY_BUDGET_MB", 256) * 1024 * 1024,
        }
    }

    /// Apply an `ip:port` CLI override for the coordinator address.
    ///
    /// Anything that does not match the expected shape keeps the
    /// configured address and logs the fallback.
    pub fn with_address_arg(mut self, arg: Option<&str>) -> Self {
        let pattern = Regex::new(IPV4_WITH_PORT).expect("address pattern is valid");
        match arg {
            Some(address) if pattern.is_match(address) => {
                self.coordinator = format!("http://{}", address);
            }
            Some(address) => {
                log::warn!(
                    "ignoring malformed coordinator address {:?}; using {}",
                    address,
                    self.coordinator
                );
            }
            None => {
                log::info!("no coordinator address passed; using {}", self.coordinator);
            }
        }
        self
    }
}

fn env_duration_secs(key: &str, default: Duration) -> Duration {
    env_parse_opt::<u64>(key).map_or(default, Duration::from_secs)
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env_parse_opt(key).unwrap_or(default)
}

fn env_parse_opt<T: FromStr>(key: &str) -> Option<T> {
    let value = env::var(key).ok()?;
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            log::warn!("ignoring unparsable value {:?} for {}", value, key);
            None
        }
    }
}
