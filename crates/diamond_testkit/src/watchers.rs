//! Watchers for assertions.

use diamond_client::{ConfigValue, ConfigWatcher, WatcherError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Records every notification and lets tests await them.
#[derive(Debug)]
pub struct RecordingWatcher {
    seen: Mutex<Vec<String>>,
    tx: mpsc::UnboundedSender<String>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
}

impl RecordingWatcher {
    /// Creates a watcher, shared so it can be both registered and inspected.
    pub fn new() -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            seen: Mutex::new(Vec::new()),
            tx,
            rx: tokio::sync::Mutex::new(rx),
        })
    }

    /// Returns every content seen so far, in order.
    pub fn values(&self) -> Vec<String> {
        self.seen.lock().clone()
    }

    /// Waits for the next notification not yet consumed by `next`.
    pub async fn next(&self, timeout: Duration) -> Option<String> {
        let mut rx = self.rx.lock().await;
        tokio::time::timeout(timeout, rx.recv()).await.ok().flatten()
    }
}

impl ConfigWatcher for RecordingWatcher {
    fn on_change(&self, value: &ConfigValue) -> Result<(), WatcherError> {
        self.seen.lock().push(value.content().to_string());
        let _ = self.tx.send(value.content().to_string());
        Ok(())
    }
}

/// A watcher that always returns an error.
#[derive(Debug, Default)]
pub struct FailingWatcher;

impl ConfigWatcher for FailingWatcher {
    fn on_change(&self, _value: &ConfigValue) -> Result<(), WatcherError> {
        Err("watcher rejected the value".into())
    }
}

/// A watcher that always panics.
#[derive(Debug, Default)]
pub struct PanickingWatcher;

impl ConfigWatcher for PanickingWatcher {
    fn on_change(&self, value: &ConfigValue) -> Result<(), WatcherError> {
        panic!("watcher crashed on {}", value.content());
    }
}
