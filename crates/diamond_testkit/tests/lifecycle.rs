//! Construction, address resolution and shutdown.

use diamond_client::{ConfigValue, DiamondError, ServerAddressList, SubscriberState, ValueSource};
use diamond_testkit::prelude::*;
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

fn list(servers: &[&str]) -> ServerAddressList {
    ServerAddressList::new(servers.iter().map(|s| s.to_string()).collect())
}

#[tokio::test]
async fn construction_persists_resolved_addresses() {
    let env = TestEnv::new();
    let http = Arc::new(ScriptedHttpClient::new());
    http.bootstrap(TEST_ENDPOINT, &["s1:80", "s2:80"]);

    let mut manager = env.start(&http, vec![]).await.unwrap();

    assert_eq!(manager.server_addresses(), list(&["s1:80", "s2:80"]));
    assert_eq!(
        env.store().read_server_addresses().unwrap(),
        manager.server_addresses()
    );
    assert_eq!(manager.resolver_state(), SubscriberState::Running);

    manager.shutdown().await;
}

#[tokio::test]
async fn failed_refresh_keeps_previous_list() {
    let env = TestEnv::new();
    let http = Arc::new(ScriptedHttpClient::new());
    http.script(
        TEST_ENDPOINT,
        [
            Scripted::ok("s1:80\n"),
            Scripted::ok("s1:80\ns2:80\n"),
            Scripted::status(500, "boom"),
        ],
    );

    let mut manager = env.start(&http, vec![]).await.unwrap();

    let refreshed = manager.refresh_server_addresses().await.unwrap();
    assert_eq!(refreshed, list(&["s1:80", "s2:80"]));

    let err = manager.refresh_server_addresses().await.unwrap_err();
    assert!(matches!(
        err,
        DiamondError::ResolutionFailed {
            status: Some(500),
            ..
        }
    ));

    assert_eq!(manager.server_addresses(), list(&["s1:80", "s2:80"]));
    assert_eq!(
        env.store().read_server_addresses().unwrap(),
        list(&["s1:80", "s2:80"])
    );

    manager.shutdown().await;
}

#[tokio::test]
async fn cold_start_falls_back_to_persisted_state() {
    let env = TestEnv::new();
    let store = env.store();
    store.ensure_directories().unwrap();
    store.write_server_addresses(&list(&["s9:80"])).unwrap();
    store
        .write_config_snapshot(&env.key(), &ConfigValue::new("cached"))
        .unwrap();

    let http = Arc::new(ScriptedHttpClient::new());
    http.script(TEST_ENDPOINT, [Scripted::status(500, "")]);
    http.config("s9:80", [Scripted::unreachable()]);

    let mut manager = env.start(&http, vec![]).await.unwrap();

    assert_eq!(manager.server_addresses(), list(&["s9:80"]));
    assert_eq!(
        manager
            .available_configure_information(Duration::from_millis(100))
            .await
            .unwrap(),
        "cached"
    );
    assert_eq!(manager.current_source(), Some(ValueSource::Snapshot));
    assert_eq!(manager.resolver_state(), SubscriberState::Degraded);

    // The poll loop still tries the persisted server.
    assert!(eventually(WAIT, || http.config_calls("s9:80") >= 2).await);

    manager.shutdown().await;
}

#[tokio::test]
async fn construction_fails_without_fallback() {
    let env = TestEnv::new();
    let store = env.store();
    store.ensure_directories().unwrap();
    store.write_server_addresses(&list(&["s9:80"])).unwrap();

    let http = Arc::new(ScriptedHttpClient::new());
    http.script(TEST_ENDPOINT, [Scripted::status(503, "")]);

    let config = env.config().with_fallback_to_persisted_addresses(false);
    let result = env.start_with(config, &http, vec![]).await;

    assert!(matches!(
        result,
        Err(DiamondError::ResolutionFailed {
            status: Some(503),
            ..
        })
    ));

    // No background work survives a failed construction.
    let calls = http.total_calls();
    tokio::time::sleep(TEST_POLL_INTERVAL * 4).await;
    assert_eq!(http.total_calls(), calls);
}

#[tokio::test]
async fn construction_fails_with_nothing_persisted() {
    let env = TestEnv::new();
    let http = Arc::new(ScriptedHttpClient::new());
    http.script(TEST_ENDPOINT, [Scripted::unreachable()]);

    let result = env.start(&http, vec![]).await;
    assert!(matches!(result, Err(DiamondError::ResolutionFailed { .. })));
}

#[tokio::test]
async fn periodic_refresh_survives_a_failed_round() {
    let env = TestEnv::new();
    let http = Arc::new(ScriptedHttpClient::new());
    http.script(
        TEST_ENDPOINT,
        [
            Scripted::ok("s1:80\n"),
            Scripted::status(500, "boom"),
            Scripted::ok("s2:80\n"),
        ],
    );

    let config = env
        .config()
        .with_server_address_refresh_interval(Duration::from_millis(100));
    let mut manager = env.start_with(config, &http, vec![]).await.unwrap();
    assert_eq!(manager.server_addresses(), list(&["s1:80"]));

    // The second round answers 500; the list must not move.
    assert!(eventually(WAIT, || http.calls_to(TEST_ENDPOINT) >= 2).await);
    assert_eq!(manager.server_addresses(), list(&["s1:80"]));

    assert!(eventually(WAIT, || manager.server_addresses() == list(&["s2:80"])).await);
    assert!(http.calls_to(TEST_ENDPOINT) >= 3);
    assert!(
        eventually(WAIT, || env.store().read_server_addresses().unwrap() == list(&["s2:80"])).await
    );
    assert_eq!(manager.resolver_state(), SubscriberState::Running);

    manager.shutdown().await;
}

#[tokio::test]
async fn zero_intervals_fail_construction() {
    let env = TestEnv::new();
    let http = Arc::new(ScriptedHttpClient::new());
    http.bootstrap(TEST_ENDPOINT, &["s1:80"]);
    http.config("s1:80", [Scripted::ok("v1")]);

    let config = env.config().with_config_poll_interval(Duration::ZERO);
    let result = env.start_with(config, &http, vec![]).await;
    assert!(matches!(result, Err(DiamondError::InvalidConfig(_))));

    let config = env
        .config()
        .with_server_address_refresh_interval(Duration::ZERO);
    let result = env.start_with(config, &http, vec![]).await;
    assert!(matches!(result, Err(DiamondError::InvalidConfig(_))));

    // Rejected before touching the network or the disk.
    assert_eq!(http.total_calls(), 0);
    assert!(!env.root().exists());
}

#[tokio::test]
async fn unusable_root_is_storage_unavailable() {
    let env = TestEnv::new();
    let blocker = env.dir().join("blocker");
    std::fs::write(&blocker, b"not a directory").unwrap();

    let http = Arc::new(ScriptedHttpClient::new());
    http.bootstrap(TEST_ENDPOINT, &["s1:80"]);

    let config = env.config().with_root_dir(blocker.join(".diamond"));
    let result = env.start_with(config, &http, vec![]).await;

    assert!(matches!(result, Err(DiamondError::StorageUnavailable(_))));
    assert_eq!(http.total_calls(), 0);
}

#[tokio::test]
async fn shutdown_stops_all_network_activity() {
    let env = TestEnv::new();
    let http = Arc::new(ScriptedHttpClient::new());
    http.bootstrap(TEST_ENDPOINT, &["s1:80"]);
    http.config("s1:80", [Scripted::ok("v1")]);

    let mut manager = env.start(&http, vec![]).await.unwrap();
    assert_eq!(
        manager.available_configure_information(WAIT).await.unwrap(),
        "v1"
    );

    manager.shutdown().await;
    assert_eq!(manager.poll_state(), SubscriberState::Stopped);
    assert_eq!(manager.resolver_state(), SubscriberState::Stopped);

    let calls = http.total_calls();
    tokio::time::sleep(TEST_POLL_INTERVAL * 5).await;
    assert_eq!(http.total_calls(), calls);

    let err = manager.refresh_server_addresses().await.unwrap_err();
    assert!(matches!(err, DiamondError::ShutDown));

    // Shutting down twice is harmless.
    manager.shutdown().await;
}

#[tokio::test]
async fn dropping_the_manager_stops_polling() {
    let env = TestEnv::new();
    let http = Arc::new(ScriptedHttpClient::new());
    http.bootstrap(TEST_ENDPOINT, &["s1:80"]);
    http.config("s1:80", [Scripted::ok("v1")]);

    let manager = env.start(&http, vec![]).await.unwrap();
    assert!(eventually(WAIT, || http.config_calls("s1:80") >= 1).await);
    drop(manager);

    // Let in-flight ticks observe cancellation.
    tokio::time::sleep(TEST_POLL_INTERVAL * 2).await;
    let calls = http.total_calls();
    tokio::time::sleep(TEST_POLL_INTERVAL * 5).await;
    assert_eq!(http.total_calls(), calls);
}
