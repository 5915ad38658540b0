//! Scripted HTTP transport.

use diamond_client::{DiamondError, DiamondResult, HttpClient, HttpResponse};
use diamond_protocol::wire;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

/// One scripted answer.
#[derive(Debug, Clone)]
pub enum Scripted {
    /// A response with a status and body.
    Respond(HttpResponse),
    /// A connection failure.
    Unreachable,
}

impl Scripted {
    /// `200 OK` with a body.
    pub fn ok(body: impl Into<String>) -> Self {
        Self::Respond(HttpResponse::new(200, body))
    }

    /// A response with the given status.
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Respond(HttpResponse::new(status, body))
    }

    /// A connection failure.
    pub fn unreachable() -> Self {
        Self::Unreachable
    }
}

/// An [`HttpClient`] answering from per-URL scripts.
///
/// Each URL (query string ignored) has a queue of answers. Answers are
/// consumed in order and the last one repeats forever. Unscripted URLs are
/// unreachable.
#[derive(Debug, Default)]
pub struct ScriptedHttpClient {
    scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<HashMap<String, u64>>,
    total: AtomicU64,
}

impl ScriptedHttpClient {
    /// Creates a client with no scripts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends answers for a URL.
    pub fn script(&self, url: &str, answers: impl IntoIterator<Item = Scripted>) {
        self.scripts
            .lock()
            .entry(url.to_string())
            .or_default()
            .extend(answers);
    }

    /// Scripts a bootstrap endpoint returning the given addresses.
    pub fn bootstrap(&self, endpoint: &str, servers: &[&str]) {
        let body: String = servers.iter().map(|s| format!("{}\n", s)).collect();
        self.script(endpoint, [Scripted::ok(body)]);
    }

    /// Appends answers for a server's config endpoint.
    pub fn config(&self, server: &str, answers: impl IntoIterator<Item = Scripted>) {
        self.script(&wire::config_url(server), answers);
    }

    /// Returns how many requests hit a URL.
    pub fn calls_to(&self, url: &str) -> u64 {
        self.calls.lock().get(url).copied().unwrap_or(0)
    }

    /// Returns how many requests hit a server's config endpoint.
    pub fn config_calls(&self, server: &str) -> u64 {
        self.calls_to(&wire::config_url(server))
    }

    /// Returns the total number of requests.
    pub fn total_calls(&self) -> u64 {
        self.total.load(Ordering::SeqCst)
    }

    fn next_answer(&self, url: &str) -> Scripted {
        let mut scripts = self.scripts.lock();
        match scripts.get_mut(url) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(Scripted::Unreachable),
            Some(queue) => queue.front().cloned().unwrap_or(Scripted::Unreachable),
            None => Scripted::Unreachable,
        }
    }
}

impl HttpClient for ScriptedHttpClient {
    async fn get(&self, url: &str, _query: &[(&str, &str)]) -> DiamondResult<HttpResponse> {
        self.total.fetch_add(1, Ordering::SeqCst);
        *self.calls.lock().entry(url.to_string()).or_default() += 1;

        match self.next_answer(url) {
            Scripted::Respond(response) => Ok(response),
            Scripted::Unreachable => Err(DiamondError::transport_retryable(format!(
                "connection refused: {}",
                url
            ))),
        }
    }
}
