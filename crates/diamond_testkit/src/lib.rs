//! # Diamond Testkit
//!
//! Test utilities for the Diamond client.
//!
//! This crate provides:
//! - [`ScriptedHttpClient`], an [`HttpClient`](diamond_client::HttpClient)
//!   answering from per-URL scripts and counting calls
//! - Recording, failing and panicking watchers
//! - [`TestEnv`], a temporary store root with fast timers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use diamond_testkit::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::test]
//! async fn follows_changes() {
//!     let env = TestEnv::new();
//!     let http = Arc::new(ScriptedHttpClient::new());
//!     http.bootstrap(TEST_ENDPOINT, &["s1:80"]);
//!     http.config("s1:80", [Scripted::ok("v1")]);
//!     let manager = env.start(&http, vec![]).await.unwrap();
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod http;
pub mod watchers;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::http::*;
    pub use crate::watchers::*;
}

pub use fixtures::*;
pub use http::*;
pub use watchers::*;
