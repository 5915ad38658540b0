//! Configuration watchers.

use crate::error::DiamondError;
use diamond_protocol::ConfigValue;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Error type watchers may return.
pub type WatcherError = Box<dyn std::error::Error + Send + Sync>;

/// Callback notified when the polled value of a key changes.
///
/// Watchers run on the poll loop, one at a time, in registration order. A
/// watcher that returns an error or panics is logged and skipped; the
/// remaining watchers and the loop carry on.
pub trait ConfigWatcher: Send + Sync {
    /// Called with the new value.
    fn on_change(&self, value: &ConfigValue) -> Result<(), WatcherError>;
}

/// A [`ConfigWatcher`] wrapping a closure.
pub struct FnWatcher<F>(F);

impl<F> ConfigWatcher for FnWatcher<F>
where
    F: Fn(&ConfigValue) + Send + Sync,
{
    fn on_change(&self, value: &ConfigValue) -> Result<(), WatcherError> {
        (self.0)(value);
        Ok(())
    }
}

impl<F> fmt::Debug for FnWatcher<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnWatcher")
    }
}

/// Wraps a closure as a shareable watcher.
///
/// # Example
///
/// ```
/// use diamond_client::watch_fn;
///
/// let watcher = watch_fn(|value| println!("config is now {}", value.content()));
/// ```
pub fn watch_fn<F>(f: F) -> Arc<dyn ConfigWatcher>
where
    F: Fn(&ConfigValue) + Send + Sync + 'static,
{
    Arc::new(FnWatcher(f))
}

/// Invokes every watcher in order, isolating failures.
///
/// Returns the failures, each tagged with the watcher's registration index.
pub(crate) fn notify_all(watchers: &[Arc<dyn ConfigWatcher>], value: &ConfigValue) -> Vec<DiamondError> {
    let mut failures = Vec::new();
    for (index, watcher) in watchers.iter().enumerate() {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| watcher.on_change(value)));
        let message = match outcome {
            Ok(Ok(())) => continue,
            Ok(Err(e)) => e.to_string(),
            Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
        };
        failures.push(DiamondError::WatcherFailure { index, message });
    }
    failures
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Failing;

    impl ConfigWatcher for Failing {
        fn on_change(&self, _value: &ConfigValue) -> Result<(), WatcherError> {
            Err("rejected".into())
        }
    }

    #[test]
    fn watchers_run_in_order_despite_failures() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let first = Arc::clone(&seen);
        let last = Arc::clone(&seen);

        let watchers: Vec<Arc<dyn ConfigWatcher>> = vec![
            watch_fn(move |v| first.lock().push(format!("first:{}", v.content()))),
            Arc::new(Failing),
            watch_fn(|_| panic!("boom")),
            watch_fn(move |v| last.lock().push(format!("last:{}", v.content()))),
        ];

        let failures = notify_all(&watchers, &ConfigValue::new("v1"));

        assert_eq!(*seen.lock(), vec!["first:v1", "last:v1"]);
        assert_eq!(failures.len(), 2);
        assert!(matches!(
            &failures[0],
            DiamondError::WatcherFailure { index: 1, message } if message == "rejected"
        ));
        assert!(matches!(
            &failures[1],
            DiamondError::WatcherFailure { index: 2, message } if message.contains("boom")
        ));
    }

    #[test]
    fn no_watchers_no_failures() {
        assert!(notify_all(&[], &ConfigValue::new("v1")).is_empty());
    }
}
