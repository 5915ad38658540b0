//! The Diamond manager facade.

use crate::config::DiamondConfig;
use crate::error::{DiamondError, DiamondResult};
use crate::fetch::{ConfigFetcher, HttpConfigFetcher};
use crate::http::{HttpClient, ReqwestHttpClient};
use crate::persist::with_store;
use crate::poll::{CachedValue, PollLoop, ValueSource};
use crate::resolver::{run_refresh_timer, Resolver, ResolverHandle};
use crate::state::{PollStats, StateCell, SubscriberState};
use crate::supervisor::supervise;
use crate::watcher::ConfigWatcher;
use diamond_protocol::{ConfigKey, ConfigValue, ServerAddressList};
use diamond_storage::{SnapshotStore, StorageError};
use parking_lot::RwLock;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Client for one configuration key.
///
/// Construction prepares the local store, resolves the server list and
/// starts the background subscribers:
///
/// - the resolver worker, owning every bootstrap call
/// - the refresh timer, asking the worker for a new list periodically
/// - the poll loop, fetching the value and notifying watchers on change
///
/// Steady-state failures never reach the caller; the manager keeps serving
/// the last known value. Call [`DiamondManager::shutdown`] to stop every
/// task deterministically. Dropping the manager cancels the tasks without
/// waiting for them.
///
/// # Example
///
/// ```no_run
/// use diamond_client::{watch_fn, DiamondManager};
/// use std::time::Duration;
///
/// # async fn run() -> diamond_client::DiamondResult<()> {
/// let mut manager = DiamondManager::new(
///     "testgroup",
///     "testdata",
///     vec![watch_fn(|value| println!("changed: {}", value.content()))],
/// )
/// .await?;
///
/// let config = manager
///     .available_configure_information(Duration::from_secs(10))
///     .await?;
/// println!("{config}");
///
/// manager.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct DiamondManager {
    key: ConfigKey,
    config: DiamondConfig,
    store: SnapshotStore,
    resolver: ResolverHandle,
    addresses: watch::Receiver<ServerAddressList>,
    current: watch::Receiver<Option<CachedValue>>,
    resolver_state: StateCell,
    poll_state: StateCell,
    stats: Arc<RwLock<PollStats>>,
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl DiamondManager {
    /// Creates a manager with the default configuration and HTTP transport.
    pub async fn new(
        group: impl Into<String>,
        data_id: impl Into<String>,
        watchers: Vec<Arc<dyn ConfigWatcher>>,
    ) -> DiamondResult<Self> {
        Self::with_config(group, data_id, watchers, DiamondConfig::default()).await
    }

    /// Creates a manager with an explicit configuration.
    pub async fn with_config(
        group: impl Into<String>,
        data_id: impl Into<String>,
        watchers: Vec<Arc<dyn ConfigWatcher>>,
        config: DiamondConfig,
    ) -> DiamondResult<Self> {
        let key = ConfigKey::new(group, data_id)?;
        let client = Arc::new(ReqwestHttpClient::new(&config.http)?);
        let fetcher = HttpConfigFetcher::new(Arc::clone(&client));
        Self::with_components(key, watchers, config, client, fetcher).await
    }

    /// Creates a manager over caller-supplied transport and fetcher.
    ///
    /// # Errors
    ///
    /// - [`DiamondError::InvalidConfig`] if `config` fails
    ///   [`DiamondConfig::validate`]
    /// - [`DiamondError::StorageUnavailable`] if the local directories can't
    ///   be prepared
    /// - [`DiamondError::ResolutionFailed`] if the first server-list
    ///   resolution fails and no persisted list may be used instead
    pub async fn with_components<C, F>(
        key: ConfigKey,
        watchers: Vec<Arc<dyn ConfigWatcher>>,
        config: DiamondConfig,
        client: Arc<C>,
        fetcher: F,
    ) -> DiamondResult<Self>
    where
        C: HttpClient,
        F: ConfigFetcher,
    {
        config.validate()?;
        let root = config.resolve_root_dir().ok_or_else(|| {
            DiamondError::StorageUnavailable(StorageError::Io {
                path: "~".into(),
                source: io::Error::new(io::ErrorKind::NotFound, "home directory not found"),
            })
        })?;
        let store = SnapshotStore::open(root);
        with_store(&store, |store| store.ensure_directories()).await?;

        let persisted = match with_store(&store, |store| store.read_server_addresses()).await {
            Ok(list) => list,
            Err(e) => {
                warn!(error = %e, "ignoring unreadable persisted server addresses");
                ServerAddressList::default()
            }
        };

        let token = CancellationToken::new();
        let mut tasks = Vec::new();

        let resolver_state = StateCell::new();
        let (addr_tx, addr_rx) = watch::channel(persisted.clone());
        let resolver = Arc::new(Resolver::new(
            config.address_endpoint.clone(),
            client,
            store.clone(),
            addr_tx,
            resolver_state.clone(),
        ));
        let (handle, queue) = ResolverHandle::channel(config.command_queue_capacity);
        {
            let token = token.clone();
            tasks.push(supervise(
                "resolver",
                token.clone(),
                config.restart.clone(),
                resolver_state.clone(),
                move || Arc::clone(&resolver).run_worker(Arc::clone(&queue), token.clone()),
            ));
        }

        let first = tokio::time::timeout(config.initial_resolution_timeout, handle.refresh())
            .await
            .unwrap_or_else(|_| {
                Err(DiamondError::ResolutionFailed {
                    status: None,
                    message: format!(
                        "no answer within {:?}",
                        config.initial_resolution_timeout
                    ),
                })
            });
        match first {
            Ok(list) => info!(servers = list.len(), "server addresses resolved"),
            Err(e) if config.fallback_to_persisted_addresses && !persisted.is_empty() => {
                warn!(error = %e, servers = persisted.len(), "starting from persisted server addresses");
                resolver_state.set(SubscriberState::Degraded);
            }
            Err(e) => {
                token.cancel();
                for task in tasks {
                    let _ = task.await;
                }
                return Err(e);
            }
        }

        {
            let token = token.clone();
            let handle = handle.clone();
            let period = config.server_address_refresh_interval;
            tasks.push(supervise(
                "address-refresh",
                token.clone(),
                config.restart.clone(),
                StateCell::new(),
                move || run_refresh_timer(handle.clone(), period, token.clone()),
            ));
        }

        let seed = match with_store(&store, {
            let key = key.clone();
            move |store| store.read_config_snapshot(&key)
        })
        .await
        {
            Ok(Some(value)) => {
                info!(key = %key, "serving cached configuration until the first poll");
                Some(CachedValue {
                    value,
                    source: ValueSource::Snapshot,
                })
            }
            Ok(None) => None,
            Err(e) => {
                warn!(key = %key, error = %e, "ignoring unreadable configuration snapshot");
                None
            }
        };
        let (cur_tx, cur_rx) = watch::channel(seed);

        let poll_state = StateCell::new();
        let stats = Arc::new(RwLock::new(PollStats::default()));
        let poll = PollLoop::new(
            key.clone(),
            Arc::new(fetcher),
            addr_rx.clone(),
            Arc::new(cur_tx),
            store.clone(),
            watchers.into(),
            poll_state.clone(),
            Arc::clone(&stats),
        );
        {
            let token = token.clone();
            let period = config.config_poll_interval;
            tasks.push(supervise(
                "config-poll",
                token.clone(),
                config.restart.clone(),
                poll_state.clone(),
                move || poll.clone().run(period, token.clone()),
            ));
        }

        Ok(Self {
            key,
            config,
            store,
            resolver: handle,
            addresses: addr_rx,
            current: cur_rx,
            resolver_state,
            poll_state,
            stats,
            token,
            tasks,
        })
    }

    /// Returns the current value's content, waiting up to `timeout` for the
    /// first one.
    ///
    /// A value restored from the local snapshot counts as available. A
    /// configuration the server reports as absent reads as an empty string.
    ///
    /// # Errors
    ///
    /// - [`DiamondError::Timeout`] if nothing arrives in time
    /// - [`DiamondError::ShutDown`] if the manager stopped before a value
    ///   arrived
    pub async fn available_configure_information(&self, timeout: Duration) -> DiamondResult<String> {
        let mut current = self.current.clone();
        let waited = tokio::time::timeout(timeout, current.wait_for(Option::is_some)).await;
        match waited {
            Ok(Ok(cached)) => cached
                .as_ref()
                .map(|c| c.value.content().to_string())
                .ok_or(DiamondError::NotYetAvailable),
            Ok(Err(_)) => Err(DiamondError::ShutDown),
            Err(_) => Err(DiamondError::Timeout),
        }
    }

    /// Returns the current value without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`DiamondError::NotYetAvailable`] when neither a poll nor the
    /// local snapshot produced a value yet.
    pub fn current_value(&self) -> DiamondResult<ConfigValue> {
        self.current
            .borrow()
            .as_ref()
            .map(|c| c.value.clone())
            .ok_or(DiamondError::NotYetAvailable)
    }

    /// Returns where the current value came from, if there is one.
    pub fn current_source(&self) -> Option<ValueSource> {
        self.current.borrow().as_ref().map(|c| c.source)
    }

    /// Returns the server list the next poll will use.
    pub fn server_addresses(&self) -> ServerAddressList {
        self.addresses.borrow().clone()
    }

    /// Refreshes the server list now, through the resolver worker.
    ///
    /// On failure the previous list stays in effect.
    pub async fn refresh_server_addresses(&self) -> DiamondResult<ServerAddressList> {
        if self.token.is_cancelled() {
            return Err(DiamondError::ShutDown);
        }
        self.resolver.refresh().await
    }

    /// Returns the key this manager follows.
    pub fn key(&self) -> &ConfigKey {
        &self.key
    }

    /// Returns the configuration in use.
    pub fn config(&self) -> &DiamondConfig {
        &self.config
    }

    /// Returns the local snapshot store.
    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Returns the resolver's lifecycle state.
    pub fn resolver_state(&self) -> SubscriberState {
        self.resolver_state.get()
    }

    /// Returns the poll loop's lifecycle state.
    pub fn poll_state(&self) -> SubscriberState {
        self.poll_state.get()
    }

    /// Returns poll statistics.
    pub fn poll_stats(&self) -> PollStats {
        self.stats.read().clone()
    }

    /// Stops every background task and waits for them to finish.
    ///
    /// Once this returns no further network calls are made. Calling it again
    /// is a no-op.
    pub async fn shutdown(&mut self) {
        self.token.cancel();
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
        self.resolver_state.stop();
        self.poll_state.stop();
        info!(key = %self.key, "diamond manager shut down");
    }
}

impl Drop for DiamondManager {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl std::fmt::Debug for DiamondManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiamondManager")
            .field("key", &self.key)
            .field("store", &self.store)
            .field("resolver_state", &self.resolver_state())
            .field("poll_state", &self.poll_state())
            .finish()
    }
}
