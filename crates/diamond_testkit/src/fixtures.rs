//! Test environments.

use crate::http::ScriptedHttpClient;
use diamond_client::{
    ConfigKey, ConfigWatcher, DiamondConfig, DiamondManager, DiamondResult, HttpConfigFetcher,
    RetryConfig,
};
use diamond_storage::SnapshotStore;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};
use std::time::Duration;
use tempfile::TempDir;

/// Bootstrap endpoint used by [`TestEnv`] configurations.
pub const TEST_ENDPOINT: &str = "http://bootstrap.test/diamond-server/diamond";

/// Group used by [`TestEnv::start`].
pub const TEST_GROUP: &str = "testgroup";

/// Data ID used by [`TestEnv::start`].
pub const TEST_DATA_ID: &str = "testdata";

/// Poll interval used by [`TestEnv`] configurations.
pub const TEST_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A temporary store root with fast timers.
pub struct TestEnv {
    temp_dir: TempDir,
}

impl TestEnv {
    /// Creates a fresh environment.
    pub fn new() -> Self {
        init_tracing();
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Returns the store root.
    pub fn root(&self) -> PathBuf {
        self.temp_dir.path().join(".diamond")
    }

    /// Returns the temp directory itself.
    pub fn dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Returns a store over the root.
    pub fn store(&self) -> SnapshotStore {
        SnapshotStore::open(self.root())
    }

    /// Returns the key used by [`TestEnv::start`].
    pub fn key(&self) -> ConfigKey {
        ConfigKey::new(TEST_GROUP, TEST_DATA_ID).expect("valid test key")
    }

    /// Returns a configuration rooted in the environment.
    ///
    /// Polls every 50ms; periodic address refresh is effectively disabled.
    pub fn config(&self) -> DiamondConfig {
        DiamondConfig::new(TEST_ENDPOINT)
            .with_root_dir(self.root())
            .with_config_poll_interval(TEST_POLL_INTERVAL)
            .with_server_address_refresh_interval(Duration::from_secs(3600))
            .with_initial_resolution_timeout(Duration::from_secs(5))
            .with_restart(
                RetryConfig::new(u32::MAX)
                    .with_initial_delay(Duration::from_millis(10))
                    .with_max_delay(Duration::from_millis(100)),
            )
    }

    /// Starts a manager over a scripted client with [`TestEnv::config`].
    pub async fn start(
        &self,
        http: &Arc<ScriptedHttpClient>,
        watchers: Vec<Arc<dyn ConfigWatcher>>,
    ) -> DiamondResult<DiamondManager> {
        self.start_with(self.config(), http, watchers).await
    }

    /// Starts a manager over a scripted client with a custom configuration.
    pub async fn start_with(
        &self,
        config: DiamondConfig,
        http: &Arc<ScriptedHttpClient>,
        watchers: Vec<Arc<dyn ConfigWatcher>>,
    ) -> DiamondResult<DiamondManager> {
        DiamondManager::with_components(
            self.key(),
            watchers,
            config,
            Arc::clone(http),
            HttpConfigFetcher::new(Arc::clone(http)),
        )
        .await
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// Installs a test-friendly tracing subscriber once per process.
///
/// Honors `RUST_LOG`; defaults to warnings.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Polls `condition` until it holds or `timeout` passes.
pub async fn eventually<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
