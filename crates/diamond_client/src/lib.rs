//! # Diamond Client
//!
//! Resilient polling client for the Diamond configuration service.
//!
//! This crate provides:
//! - [`DiamondManager`], the facade owning one `(group, dataID)` subscription
//! - Server-list resolution through a single-flight worker with periodic refresh
//! - A fixed-interval poll loop with failover, change detection and watchers
//! - Local snapshots for offline and cold-start resilience
//! - Supervised background tasks and deterministic shutdown
//!
//! ## Architecture
//!
//! ```text
//! bootstrap endpoint --> resolver worker --> ServerAddress file
//!                               |
//!                        address list (watch)
//!                               v
//!       servers <-------- poll loop --> data/ + snapshot/ files
//!                               |
//!                        current value (watch) --> watchers, callers
//! ```
//!
//! ## Key Invariants
//!
//! - At most one bootstrap call is in flight
//! - A resolved list is persisted before it is published
//! - Failed refreshes and polls keep the previous list and value
//! - Watchers run in registration order, one change at a time, isolated
//!   from each other's failures
//! - Nothing in steady state propagates an error to the caller

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod fetch;
mod http;
mod manager;
mod persist;
mod poll;
mod resolver;
mod state;
mod supervisor;
mod watcher;

pub use config::{
    DiamondConfig, HttpConfig, RetryConfig, DEFAULT_ADDRESS_ENDPOINT, DEFAULT_ROOT_DIR_NAME,
};
pub use diamond_protocol::{ConfigKey, ConfigValue, Fingerprint, ServerAddressList};
pub use error::{DiamondError, DiamondResult};
pub use fetch::{ConfigFetcher, HttpConfigFetcher};
pub use http::{HttpClient, HttpResponse, ReqwestHttpClient};
pub use manager::DiamondManager;
pub use poll::ValueSource;
pub use state::{PollStats, SubscriberState, TickOutcome};
pub use watcher::{watch_fn, ConfigWatcher, FnWatcher, WatcherError};
