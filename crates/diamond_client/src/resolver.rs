//! Server address resolver.
//!
//! A single worker task owns the bootstrap call. Refreshes are requested
//! through a bounded command queue and answered on a per-request reply
//! channel, so the periodic timer and on-demand callers share the worker
//! without ever running two bootstrap calls at once.

use crate::error::{DiamondError, DiamondResult};
use crate::http::HttpClient;
use crate::persist::with_store;
use crate::state::{StateCell, SubscriberState};
use crate::watcher::panic_message;
use diamond_protocol::ServerAddressList;
use diamond_storage::SnapshotStore;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A request to the resolver worker.
pub(crate) enum ResolverCommand {
    /// Resolve now and report the outcome.
    Refresh {
        reply: oneshot::Sender<DiamondResult<ServerAddressList>>,
    },
}

/// Queue of pending resolver commands, shared across worker restarts.
pub(crate) type CommandQueue = Arc<Mutex<mpsc::Receiver<ResolverCommand>>>;

/// Cheap handle for asking the resolver worker to refresh.
#[derive(Debug, Clone)]
pub(crate) struct ResolverHandle {
    commands: mpsc::Sender<ResolverCommand>,
}

impl ResolverHandle {
    /// Creates a handle and the queue the worker consumes.
    pub(crate) fn channel(capacity: usize) -> (Self, CommandQueue) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { commands: tx }, Arc::new(Mutex::new(rx)))
    }

    /// Requests a refresh and waits for its outcome.
    pub(crate) async fn refresh(&self) -> DiamondResult<ServerAddressList> {
        let (reply, outcome) = oneshot::channel();
        self.commands
            .send(ResolverCommand::Refresh { reply })
            .await
            .map_err(|_| DiamondError::ShutDown)?;
        outcome.await.map_err(|_| DiamondError::ShutDown)?
    }
}

/// Fetches the server list from the bootstrap endpoint and publishes it.
pub(crate) struct Resolver<C: HttpClient> {
    endpoint: String,
    client: Arc<C>,
    store: SnapshotStore,
    addresses: watch::Sender<ServerAddressList>,
    state: StateCell,
}

impl<C: HttpClient> Resolver<C> {
    pub(crate) fn new(
        endpoint: impl Into<String>,
        client: Arc<C>,
        store: SnapshotStore,
        addresses: watch::Sender<ServerAddressList>,
        state: StateCell,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            client,
            store,
            addresses,
            state,
        }
    }

    /// Runs one resolution: fetch, persist, publish.
    ///
    /// On failure the previously published list stays in effect.
    pub(crate) async fn resolve_once(&self) -> DiamondResult<ServerAddressList> {
        let response = self
            .client
            .get(&self.endpoint, &[])
            .await
            .map_err(|e| DiamondError::ResolutionFailed {
                status: None,
                message: e.to_string(),
            })?;

        if !response.is_success() {
            return Err(DiamondError::ResolutionFailed {
                status: Some(response.status),
                message: format!("bootstrap endpoint {} refused", self.endpoint),
            });
        }

        let list = ServerAddressList::parse(&response.body);
        if list.is_empty() {
            warn!(endpoint = %self.endpoint, "bootstrap endpoint reported no servers");
        }

        let snapshot = list.clone();
        if let Err(e) = with_store(&self.store, move |store| store.write_server_addresses(&snapshot)).await {
            warn!(error = %e, "failed to persist server addresses");
        }

        if *self.addresses.borrow() != list {
            info!(servers = list.len(), "server address list updated");
        }
        self.addresses.send_replace(list.clone());
        Ok(list)
    }

    /// Serves refresh commands until cancelled or every handle is gone.
    pub(crate) async fn run_worker(self: Arc<Self>, queue: CommandQueue, token: CancellationToken) {
        let mut commands = queue.lock().await;
        self.state.set(SubscriberState::Running);

        loop {
            let command = tokio::select! {
                _ = token.cancelled() => break,
                command = commands.recv() => match command {
                    Some(command) => command,
                    None => break,
                },
            };

            match command {
                ResolverCommand::Refresh { reply } => {
                    let result = AssertUnwindSafe(self.resolve_once())
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|payload| {
                            Err(DiamondError::ResolutionFailed {
                                status: None,
                                message: format!("resolver panicked: {}", panic_message(payload.as_ref())),
                            })
                        });

                    match &result {
                        Ok(_) => self.state.set(SubscriberState::Running),
                        Err(e) => {
                            warn!(error = %e, "server address refresh failed, keeping previous list");
                            self.state.set(SubscriberState::Degraded);
                        }
                    }
                    let _ = reply.send(result);
                }
            }
        }
    }
}

/// Requests a refresh every `period`, starting one period from now.
pub(crate) async fn run_refresh_timer(handle: ResolverHandle, period: Duration, token: CancellationToken) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match handle.refresh().await {
            Ok(list) => debug!(servers = list.len(), "periodic server address refresh done"),
            Err(DiamondError::ShutDown) => break,
            Err(_) => {}
        }
    }
}
