//! Configuration for the Diamond client.

use crate::error::{DiamondError, DiamondResult};
use std::path::PathBuf;
use std::time::Duration;

/// Default bootstrap endpoint listing the configuration servers.
pub const DEFAULT_ADDRESS_ENDPOINT: &str = "http://a.b.c:8080/diamond-server/diamond";

/// Name of the per-user directory under the home directory.
pub const DEFAULT_ROOT_DIR_NAME: &str = ".diamond";

/// Configuration for a [`crate::DiamondManager`].
#[derive(Debug, Clone)]
pub struct DiamondConfig {
    /// Bootstrap endpoint returning the server list.
    pub address_endpoint: String,
    /// Root of the local snapshot store. `None` means `<home>/.diamond`.
    pub root_dir: Option<PathBuf>,
    /// Interval between periodic server-list refreshes.
    pub server_address_refresh_interval: Duration,
    /// Interval between configuration polls.
    pub config_poll_interval: Duration,
    /// Upper bound on the first, blocking server-list resolution.
    pub initial_resolution_timeout: Duration,
    /// Start from the persisted server list when the first resolution fails.
    pub fallback_to_persisted_addresses: bool,
    /// Capacity of the resolver's command queue.
    pub command_queue_capacity: usize,
    /// HTTP transport settings.
    pub http: HttpConfig,
    /// Backoff used when restarting a crashed background task.
    pub restart: RetryConfig,
}

impl DiamondConfig {
    /// Creates a configuration with defaults for the given bootstrap endpoint.
    pub fn new(address_endpoint: impl Into<String>) -> Self {
        Self {
            address_endpoint: address_endpoint.into(),
            root_dir: None,
            server_address_refresh_interval: Duration::from_secs(5 * 60),
            config_poll_interval: Duration::from_secs(5),
            initial_resolution_timeout: Duration::from_secs(30),
            fallback_to_persisted_addresses: true,
            command_queue_capacity: 8,
            http: HttpConfig::default(),
            restart: RetryConfig::new(u32::MAX)
                .with_initial_delay(Duration::from_millis(200))
                .with_max_delay(Duration::from_secs(30)),
        }
    }

    /// Sets the root directory of the local snapshot store.
    pub fn with_root_dir(mut self, root: impl Into<PathBuf>) -> Self {
        self.root_dir = Some(root.into());
        self
    }

    /// Sets the server-list refresh interval.
    pub fn with_server_address_refresh_interval(mut self, interval: Duration) -> Self {
        self.server_address_refresh_interval = interval;
        self
    }

    /// Sets the configuration poll interval.
    pub fn with_config_poll_interval(mut self, interval: Duration) -> Self {
        self.config_poll_interval = interval;
        self
    }

    /// Sets the bound on the first server-list resolution.
    pub fn with_initial_resolution_timeout(mut self, timeout: Duration) -> Self {
        self.initial_resolution_timeout = timeout;
        self
    }

    /// Enables or disables starting from the persisted server list.
    pub fn with_fallback_to_persisted_addresses(mut self, enabled: bool) -> Self {
        self.fallback_to_persisted_addresses = enabled;
        self
    }

    /// Sets the HTTP transport settings.
    pub fn with_http(mut self, http: HttpConfig) -> Self {
        self.http = http;
        self
    }

    /// Sets the restart backoff for background tasks.
    pub fn with_restart(mut self, restart: RetryConfig) -> Self {
        self.restart = restart;
        self
    }

    /// Checks that the timers and the command queue can be built.
    ///
    /// # Errors
    ///
    /// Returns [`DiamondError::InvalidConfig`] for a zero interval or a zero
    /// queue capacity.
    pub fn validate(&self) -> DiamondResult<()> {
        if self.server_address_refresh_interval.is_zero() {
            return Err(DiamondError::InvalidConfig(
                "server_address_refresh_interval must be non-zero".into(),
            ));
        }
        if self.config_poll_interval.is_zero() {
            return Err(DiamondError::InvalidConfig(
                "config_poll_interval must be non-zero".into(),
            ));
        }
        if self.command_queue_capacity == 0 {
            return Err(DiamondError::InvalidConfig(
                "command_queue_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Resolves the store root, defaulting to `<home>/.diamond`.
    ///
    /// Returns `None` when no root was configured and the home directory
    /// cannot be determined.
    pub fn resolve_root_dir(&self) -> Option<PathBuf> {
        self.root_dir
            .clone()
            .or_else(|| dirs::home_dir().map(|home| home.join(DEFAULT_ROOT_DIR_NAME)))
    }
}

impl Default for DiamondConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ADDRESS_ENDPOINT)
    }
}

/// Settings for the HTTP transport collaborator.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Whole-request timeout.
    pub request_timeout: Duration,
    /// Retry policy for connection failures and timeouts.
    pub retry: RetryConfig,
}

impl HttpConfig {
    /// Sets the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the maximum number of attempts per request.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.retry.max_attempts = max_retries.max(1);
        self
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(5),
            retry: RetryConfig::new(10).with_max_delay(Duration::from_secs(2)),
        }
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts.
    pub max_attempts: u32,
    /// Initial delay between retries.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Calculates the delay for a given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base_delay = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);

        let delay_secs = base_delay.min(self.max_delay.as_secs_f64());

        if self.add_jitter {
            // Up to 25% jitter
            let jitter = delay_secs * 0.25 * rand_jitter();
            Duration::from_secs_f64(delay_secs + jitter)
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Cheap jitter source derived from the clock.
fn rand_jitter() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % 1000) as f64 / 1000.0
}
