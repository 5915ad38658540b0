//! Subscriber lifecycle and statistics.

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;

/// Lifecycle state of a background subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberState {
    /// Constructed, not started yet.
    Created,
    /// Running and the last operation succeeded.
    Running,
    /// Running, but the last operation failed; retried on the next timer.
    Degraded,
    /// Shut down.
    Stopped,
}

impl SubscriberState {
    /// Returns true while the subscriber is doing work.
    pub fn is_active(&self) -> bool {
        matches!(self, SubscriberState::Running | SubscriberState::Degraded)
    }
}

/// Shared, observable state of one subscriber.
#[derive(Debug, Clone)]
pub(crate) struct StateCell(Arc<RwLock<SubscriberState>>);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(Arc::new(RwLock::new(SubscriberState::Created)))
    }

    pub(crate) fn get(&self) -> SubscriberState {
        *self.0.read()
    }

    /// Sets the state unless the subscriber already stopped.
    pub(crate) fn set(&self, state: SubscriberState) {
        let mut current = self.0.write();
        if *current != SubscriberState::Stopped {
            *current = state;
        }
    }

    pub(crate) fn stop(&self) {
        *self.0.write() = SubscriberState::Stopped;
    }
}

/// Outcome of one poll tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No server addresses; nothing was fetched.
    Skipped,
    /// The fetched value matched the last one.
    Unchanged,
    /// A new value was stored and watchers were notified.
    Changed,
    /// Every server failed.
    Failed,
}

/// Statistics about poll-loop activity.
#[derive(Debug, Clone, Default)]
pub struct PollStats {
    /// Total ticks run.
    pub ticks: u64,
    /// Ticks skipped for lack of servers.
    pub skipped: u64,
    /// Ticks that found the value unchanged.
    pub unchanged: u64,
    /// Ticks that detected a change.
    pub changes: u64,
    /// Ticks where every server failed.
    pub failures: u64,
    /// Individual watcher failures.
    pub watcher_failures: u64,
    /// Snapshot writes that failed.
    pub persist_failures: u64,
    /// Time of the last detected change.
    pub last_change_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

impl PollStats {
    pub(crate) fn record(&mut self, outcome: TickOutcome) {
        self.ticks += 1;
        match outcome {
            TickOutcome::Skipped => self.skipped += 1,
            TickOutcome::Unchanged => self.unchanged += 1,
            TickOutcome::Changed => {
                self.changes += 1;
                self.last_change_time = Some(Instant::now());
            }
            TickOutcome::Failed => self.failures += 1,
        }
    }
}
