//! Configuration poll loop.
//!
//! Each tick walks the current server list in order until one server
//! answers, compares the answer's fingerprint with the last one, and on a
//! change persists the value, publishes it and notifies the watchers.
//!
//! ```text
//! Idle -> Fetching -> Unchanged -> Idle
//!                  -> Changed: Persisting -> Notifying -> Idle
//!                  -> Failed -> Idle
//! ```

use crate::fetch::ConfigFetcher;
use crate::persist::with_store;
use crate::state::{PollStats, StateCell, SubscriberState, TickOutcome};
use crate::watcher::{notify_all, panic_message, ConfigWatcher};
use diamond_protocol::{ConfigKey, ConfigValue, Fingerprint, ServerAddressList};
use diamond_storage::SnapshotStore;
use futures::FutureExt;
use parking_lot::RwLock;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Where the currently readable value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    /// Loaded from the local snapshot at startup.
    Snapshot,
    /// Fetched from a server by the poll loop.
    Live,
}

/// The value readers see, with its origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CachedValue {
    pub(crate) value: ConfigValue,
    pub(crate) source: ValueSource,
}

/// The poll loop for one key.
pub(crate) struct PollLoop<F: ConfigFetcher> {
    key: ConfigKey,
    fetcher: Arc<F>,
    addresses: watch::Receiver<ServerAddressList>,
    current: Arc<watch::Sender<Option<CachedValue>>>,
    store: SnapshotStore,
    watchers: Arc<[Arc<dyn ConfigWatcher>]>,
    state: StateCell,
    stats: Arc<RwLock<PollStats>>,
    last_fingerprint: Option<Fingerprint>,
    warned_empty: bool,
}

impl<F: ConfigFetcher> Clone for PollLoop<F> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            fetcher: Arc::clone(&self.fetcher),
            addresses: self.addresses.clone(),
            current: Arc::clone(&self.current),
            store: self.store.clone(),
            watchers: Arc::clone(&self.watchers),
            state: self.state.clone(),
            stats: Arc::clone(&self.stats),
            last_fingerprint: self.last_fingerprint.clone(),
            warned_empty: self.warned_empty,
        }
    }
}

impl<F: ConfigFetcher> PollLoop<F> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        key: ConfigKey,
        fetcher: Arc<F>,
        addresses: watch::Receiver<ServerAddressList>,
        current: Arc<watch::Sender<Option<CachedValue>>>,
        store: SnapshotStore,
        watchers: Arc<[Arc<dyn ConfigWatcher>]>,
        state: StateCell,
        stats: Arc<RwLock<PollStats>>,
    ) -> Self {
        Self {
            key,
            fetcher,
            addresses,
            current,
            store,
            watchers,
            state,
            stats,
            last_fingerprint: None,
            warned_empty: false,
        }
    }

    /// Picks up the last live fingerprint, so a restarted loop doesn't
    /// re-announce a value watchers already saw.
    fn resume(&mut self) {
        self.last_fingerprint = self
            .current
            .borrow()
            .as_ref()
            .filter(|cached| cached.source == ValueSource::Live)
            .map(|cached| cached.value.fingerprint().clone());
    }

    /// Runs one poll tick.
    pub(crate) async fn tick(&mut self) -> TickOutcome {
        let outcome = self.tick_inner().await;
        self.stats.write().record(outcome);
        outcome
    }

    async fn tick_inner(&mut self) -> TickOutcome {
        let servers = self.addresses.borrow_and_update().clone();
        if servers.is_empty() {
            if !self.warned_empty {
                warn!(key = %self.key, "no configuration servers known, skipping polls");
                self.warned_empty = true;
            }
            return TickOutcome::Skipped;
        }
        self.warned_empty = false;

        let Some(value) = self.fetch_with_failover(&servers).await else {
            self.state.set(SubscriberState::Degraded);
            return TickOutcome::Failed;
        };
        self.state.set(SubscriberState::Running);

        if self.last_fingerprint.as_ref() == Some(value.fingerprint()) {
            return TickOutcome::Unchanged;
        }

        info!(key = %self.key, md5 = %value.fingerprint(), "configuration changed");

        let key = self.key.clone();
        let snapshot = value.clone();
        if let Err(e) = with_store(&self.store, move |store| store.write_config_snapshot(&key, &snapshot)).await {
            warn!(key = %self.key, error = %e, "failed to persist configuration snapshot");
            self.stats.write().persist_failures += 1;
        }

        self.last_fingerprint = Some(value.fingerprint().clone());
        self.current.send_replace(Some(CachedValue {
            value: value.clone(),
            source: ValueSource::Live,
        }));

        let failures = notify_all(&self.watchers, &value);
        if !failures.is_empty() {
            let mut stats = self.stats.write();
            for failure in failures {
                warn!(key = %self.key, error = %failure, "config watcher failed");
                stats.watcher_failures += 1;
                stats.last_error = Some(failure.to_string());
            }
        }

        TickOutcome::Changed
    }

    /// Asks each server in order; the first answer wins.
    async fn fetch_with_failover(&self, servers: &ServerAddressList) -> Option<ConfigValue> {
        let mut last_error = None;
        for server in servers.iter() {
            match self.fetcher.fetch(server, &self.key).await {
                Ok(value) => return Some(value),
                Err(e) => {
                    if e.is_retryable() {
                        debug!(key = %self.key, server, error = %e, "fetch failed, trying next server");
                    } else {
                        warn!(key = %self.key, server, error = %e, "server rejected fetch, trying next server");
                    }
                    last_error = Some(e.to_string());
                }
            }
        }

        warn!(
            key = %self.key,
            servers = servers.len(),
            error = last_error.as_deref().unwrap_or("unknown"),
            "every configuration server failed, keeping cached value"
        );
        self.stats.write().last_error = last_error;
        None
    }

    /// Ticks every `period` until cancelled.
    ///
    /// A panicking tick is logged and the loop carries on with the next one.
    pub(crate) async fn run(mut self, period: Duration, token: CancellationToken) {
        self.resume();
        self.state.set(SubscriberState::Running);

        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if let Err(payload) = AssertUnwindSafe(self.tick()).catch_unwind().await {
                error!(key = %self.key, panic = %panic_message(payload.as_ref()), "poll tick panicked");
                self.state.set(SubscriberState::Degraded);
                self.stats.write().last_error = Some("poll tick panicked".into());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DiamondError, DiamondResult};
    use crate::watcher::{watch_fn, WatcherError};
    use diamond_storage::{InMemoryBackend, SnapshotBackend};
    use parking_lot::Mutex;
    use std::collections::{HashMap, VecDeque};

    /// Fetcher answering from per-server scripts; an empty script fails.
    #[derive(Default)]
    struct TestFetcher {
        scripts: Mutex<HashMap<String, VecDeque<DiamondResult<ConfigValue>>>>,
        calls: Mutex<Vec<String>>,
    }

    impl TestFetcher {
        fn push(&self, server: &str, result: DiamondResult<ConfigValue>) {
            self.scripts
                .lock()
                .entry(server.to_string())
                .or_default()
                .push_back(result);
        }
    }

    impl ConfigFetcher for TestFetcher {
        async fn fetch(&self, server: &str, _key: &ConfigKey) -> DiamondResult<ConfigValue> {
            self.calls.lock().push(server.to_string());
            self.scripts
                .lock()
                .get_mut(server)
                .and_then(VecDeque::pop_front)
                .unwrap_or_else(|| {
                    Err(DiamondError::FetchFailed {
                        server: server.to_string(),
                        status: None,
                        message: "unreachable".into(),
                    })
                })
        }
    }

    fn down(server: &str) -> DiamondResult<ConfigValue> {
        Err(DiamondError::FetchFailed {
            server: server.to_string(),
            status: Some(500),
            message: "down".into(),
        })
    }

    struct Fixture {
        fetcher: Arc<TestFetcher>,
        backend: Arc<InMemoryBackend>,
        store: SnapshotStore,
        addresses: watch::Sender<ServerAddressList>,
        current: watch::Receiver<Option<CachedValue>>,
        seen: Arc<Mutex<Vec<String>>>,
        poll: PollLoop<TestFetcher>,
    }

    fn fixture_with(extra: Vec<Arc<dyn ConfigWatcher>>, servers: &[&str]) -> Fixture {
        let fetcher = Arc::new(TestFetcher::default());
        let backend = Arc::new(InMemoryBackend::new());
        let store = SnapshotStore::new(Arc::clone(&backend) as Arc<dyn SnapshotBackend>);
        let (addr_tx, addr_rx) = watch::channel(ServerAddressList::new(
            servers.iter().map(|s| s.to_string()).collect(),
        ));
        let (cur_tx, cur_rx) = watch::channel(None);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let first = Arc::clone(&seen);
        let last = Arc::clone(&seen);
        let mut watchers: Vec<Arc<dyn ConfigWatcher>> =
            vec![watch_fn(move |v| first.lock().push(format!("a:{}", v.content())))];
        watchers.extend(extra);
        watchers.push(watch_fn(move |v| last.lock().push(format!("b:{}", v.content()))));

        let poll = PollLoop::new(
            ConfigKey::new("testgroup", "testdata").unwrap(),
            Arc::clone(&fetcher),
            addr_rx,
            Arc::new(cur_tx),
            store.clone(),
            watchers.into(),
            StateCell::new(),
            Arc::new(RwLock::new(PollStats::default())),
        );

        Fixture {
            fetcher,
            backend,
            store,
            addresses: addr_tx,
            current: cur_rx,
            seen,
            poll,
        }
    }

    fn fixture(servers: &[&str]) -> Fixture {
        fixture_with(Vec::new(), servers)
    }

    fn current_content(fx: &Fixture) -> Option<String> {
        fx.current
            .borrow()
            .as_ref()
            .map(|c| c.value.content().to_string())
    }

    #[tokio::test]
    async fn change_notifies_in_registration_order() {
        let mut fx = fixture(&["s1:80"]);
        fx.fetcher.push("s1:80", Ok(ConfigValue::new("v1")));

        assert_eq!(fx.poll.tick().await, TickOutcome::Changed);
        assert_eq!(*fx.seen.lock(), vec!["a:v1", "b:v1"]);
        assert_eq!(current_content(&fx).as_deref(), Some("v1"));
        assert_eq!(
            fx.store
                .read_config_snapshot(&fx.poll.key)
                .unwrap()
                .unwrap()
                .content(),
            "v1"
        );
    }

    #[tokio::test]
    async fn identical_fingerprint_does_not_notify() {
        let mut fx = fixture(&["s1:80"]);
        fx.fetcher.push("s1:80", Ok(ConfigValue::new("v1")));
        fx.fetcher.push("s1:80", Ok(ConfigValue::new("v1")));

        fx.poll.tick().await;
        let writes = fx.backend.write_count();
        assert_eq!(fx.poll.tick().await, TickOutcome::Unchanged);

        assert_eq!(fx.seen.lock().len(), 2);
        assert_eq!(fx.backend.write_count(), writes);
    }

    #[tokio::test]
    async fn different_fingerprint_notifies_once_each() {
        let mut fx = fixture(&["s1:80"]);
        fx.fetcher.push("s1:80", Ok(ConfigValue::new("v1")));
        fx.fetcher.push("s1:80", Ok(ConfigValue::new("v2")));

        fx.poll.tick().await;
        fx.poll.tick().await;

        assert_eq!(*fx.seen.lock(), vec!["a:v1", "b:v1", "a:v2", "b:v2"]);
    }

    #[tokio::test]
    async fn failover_to_next_server() {
        let mut fx = fixture(&["s1:80", "s2:80"]);
        fx.fetcher.push("s1:80", down("s1:80"));
        fx.fetcher.push("s2:80", Ok(ConfigValue::new("v1")));

        assert_eq!(fx.poll.tick().await, TickOutcome::Changed);
        assert_eq!(*fx.fetcher.calls.lock(), vec!["s1:80", "s2:80"]);
        assert_eq!(fx.poll.state.get(), SubscriberState::Running);
    }

    #[tokio::test]
    async fn all_servers_failing_keeps_cached_value() {
        let mut fx = fixture(&["s1:80", "s2:80"]);
        fx.fetcher.push("s1:80", Ok(ConfigValue::new("v1")));
        fx.poll.tick().await;

        assert_eq!(fx.poll.tick().await, TickOutcome::Failed);
        assert_eq!(fx.poll.state.get(), SubscriberState::Degraded);
        assert_eq!(current_content(&fx).as_deref(), Some("v1"));
        assert_eq!(fx.seen.lock().len(), 2);

        let stats = fx.poll.stats.read().clone();
        assert_eq!(stats.failures, 1);
        assert!(stats.last_error.is_some());
    }

    #[tokio::test]
    async fn empty_address_list_skips() {
        let mut fx = fixture(&[]);
        assert_eq!(fx.poll.tick().await, TickOutcome::Skipped);
        assert_eq!(fx.poll.tick().await, TickOutcome::Skipped);
        assert!(fx.fetcher.calls.lock().is_empty());

        fx.addresses
            .send_replace(ServerAddressList::new(vec!["s1:80".into()]));
        fx.fetcher.push("s1:80", Ok(ConfigValue::new("v1")));
        assert_eq!(fx.poll.tick().await, TickOutcome::Changed);
    }

    #[tokio::test]
    async fn address_update_visible_to_next_tick() {
        let mut fx = fixture(&["s1:80"]);
        fx.addresses
            .send_replace(ServerAddressList::new(vec!["s9:80".into()]));
        fx.fetcher.push("s9:80", Ok(ConfigValue::new("v1")));

        assert_eq!(fx.poll.tick().await, TickOutcome::Changed);
        assert_eq!(*fx.fetcher.calls.lock(), vec!["s9:80"]);
    }

    struct Rejecting;

    impl ConfigWatcher for Rejecting {
        fn on_change(&self, _value: &ConfigValue) -> Result<(), WatcherError> {
            Err("rejected".into())
        }
    }

    #[tokio::test]
    async fn failing_watchers_are_isolated() {
        let mut fx = fixture_with(
            vec![Arc::new(Rejecting), watch_fn(|_| panic!("watcher bug"))],
            &["s1:80"],
        );
        fx.fetcher.push("s1:80", Ok(ConfigValue::new("v1")));
        fx.fetcher.push("s1:80", Ok(ConfigValue::new("v2")));

        assert_eq!(fx.poll.tick().await, TickOutcome::Changed);
        assert_eq!(*fx.seen.lock(), vec!["a:v1", "b:v1"]);

        // The loop keeps working afterwards.
        assert_eq!(fx.poll.tick().await, TickOutcome::Changed);
        assert_eq!(fx.poll.stats.read().watcher_failures, 4);
    }

    #[tokio::test]
    async fn persist_failure_still_advances() {
        let mut fx = fixture(&["s1:80"]);
        fx.backend.set_fail_writes(true);
        fx.fetcher.push("s1:80", Ok(ConfigValue::new("v1")));

        assert_eq!(fx.poll.tick().await, TickOutcome::Changed);
        assert_eq!(current_content(&fx).as_deref(), Some("v1"));
        assert_eq!(fx.seen.lock().len(), 2);
        assert_eq!(fx.poll.stats.read().persist_failures, 1);
    }

    #[tokio::test]
    async fn absent_value_clears_snapshot() {
        let mut fx = fixture(&["s1:80"]);
        fx.fetcher.push("s1:80", Ok(ConfigValue::new("v1")));
        fx.fetcher.push("s1:80", Ok(ConfigValue::absent()));

        fx.poll.tick().await;
        assert_eq!(fx.poll.tick().await, TickOutcome::Changed);
        assert!(fx
            .store
            .read_config_snapshot(&fx.poll.key)
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn resumed_loop_skips_known_value() {
        let mut fx = fixture(&["s1:80"]);
        fx.fetcher.push("s1:80", Ok(ConfigValue::new("v1")));
        fx.fetcher.push("s1:80", Ok(ConfigValue::new("v1")));
        fx.poll.tick().await;

        let mut restarted = PollLoop::new(
            fx.poll.key.clone(),
            Arc::clone(&fx.fetcher),
            fx.poll.addresses.clone(),
            Arc::clone(&fx.poll.current),
            fx.store.clone(),
            Arc::clone(&fx.poll.watchers),
            fx.poll.state.clone(),
            Arc::clone(&fx.poll.stats),
        );
        restarted.resume();

        assert_eq!(restarted.tick().await, TickOutcome::Unchanged);
    }

    #[tokio::test]
    async fn snapshot_value_is_not_resumed() {
        let fx = fixture(&["s1:80"]);
        fx.poll.current.send_replace(Some(CachedValue {
            value: ConfigValue::new("v1"),
            source: ValueSource::Snapshot,
        }));
        fx.fetcher.push("s1:80", Ok(ConfigValue::new("v1")));

        let mut poll = fx.poll.clone();
        poll.resume();
        assert_eq!(poll.tick().await, TickOutcome::Changed);
        assert_eq!(*fx.seen.lock(), vec!["a:v1", "b:v1"]);
    }
}
