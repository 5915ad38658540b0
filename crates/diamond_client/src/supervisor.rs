//! Supervised background tasks.

use crate::config::RetryConfig;
use crate::state::{StateCell, SubscriberState};
use crate::watcher::panic_message;
use std::future::Future;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Spawns a task that is restarted with backoff whenever it panics.
///
/// `factory` builds a fresh run of the task. The supervisor exits when the
/// task returns normally or `token` is cancelled; on cancellation the running
/// task is aborted and awaited, so nothing it started outlives the
/// supervisor. `state` is left `Stopped` on exit.
pub(crate) fn supervise<F, Fut>(
    name: &'static str,
    token: CancellationToken,
    backoff: RetryConfig,
    state: StateCell,
    mut factory: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut restarts: u32 = 0;

        loop {
            let mut task = tokio::spawn(factory());

            let outcome = tokio::select! {
                _ = token.cancelled() => {
                    task.abort();
                    let _ = task.await;
                    break;
                }
                outcome = &mut task => outcome,
            };

            match outcome {
                Ok(()) => break,
                Err(e) if e.is_panic() => {
                    let message = panic_message(e.into_panic().as_ref());
                    restarts = restarts.saturating_add(1);
                    error!(task = name, restarts, panic = %message, "background task panicked, restarting");
                    state.set(SubscriberState::Degraded);

                    let delay = backoff.delay_for_attempt(restarts);
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(_) => break,
            }
        }

        debug!(task = name, "background task stopped");
        state.stop();
    })
}
