//! Tests for the HTTP executor module

use super::*;
use crate::auth::{RefreshController, RefreshOutcome};
use crate::config::{HttpConfig, RefreshConfig, ResolverConfig};
use crate::credentials::{CredentialRecord, CredentialStore};
use crate::error::Error;
use crate::kv::MemoryKeyValueStore;
use crate::resolver::{AddressResolver, ResolutionContext};
use crate::types::{BackoffType, Environment, Method};
use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::TryRecvError;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const REFRESH_PATH: &str = "/api/auth/token/refresh/";

struct Harness {
    store: CredentialStore,
    executor: RequestExecutor,
}

fn fast_config() -> HttpConfig {
    HttpConfig {
        reauth_settle_ms: 0,
        initial_backoff_ms: 1,
        ..HttpConfig::default()
    }
}

fn harness(server: &MockServer, config: HttpConfig) -> Harness {
    let env: HashMap<String, String> =
        HashMap::from([("BACKEND_URL".to_string(), server.uri())]);
    let resolver = Arc::new(
        AddressResolver::new(
            ResolverConfig::default(),
            ResolutionContext::server(Environment::Local),
        )
        .with_env(Arc::new(env)),
    );
    let store = CredentialStore::new(Arc::new(MemoryKeyValueStore::new()));
    let refresher = Arc::new(RefreshController::new(
        store.clone(),
        resolver.clone(),
        RefreshConfig::default(),
    ));
    let executor = RequestExecutor::new(resolver, store.clone(), refresher, config);
    Harness { store, executor }
}

async fn logged_in(server: &MockServer) -> Harness {
    let h = harness(server, fast_config());
    assert!(h.store.login("primary", "a1", "r1").await);
    h
}

async fn mount_refresh_ok(server: &MockServer, calls: u64) {
    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"access": "a2", "refresh": "r2"})),
        )
        .expect(calls)
        .mount(server)
        .await;
}

// ============================================================================
// Options and Policies
// ============================================================================

#[test]
fn test_request_options_builder() {
    let options = RequestOptions::method(Method::PATCH)
        .query("page", "1")
        .header("X-Request-Id", "abc123")
        .json(json!({"price": 12000}))
        .timeout(Duration::from_secs(3))
        .credential_key("secondary");

    assert_eq!(options.method, Method::PATCH);
    assert_eq!(options.query, vec![("page".to_string(), "1".to_string())]);
    assert_eq!(
        options.headers.get("X-Request-Id"),
        Some(&"abc123".to_string())
    );
    assert!(options.body.is_some());
    assert!(options.authenticated);
    assert_eq!(options.credential_key.as_deref(), Some("secondary"));
    assert!(!RequestOptions::new().unauthenticated().authenticated);
}

#[test]
fn test_refresh_retry_policy() {
    let once = RefreshRetryPolicy::default();
    assert_eq!(once.max_retries(), 1);
    assert!(once.allows(0));
    assert!(!once.allows(1));
    assert!(!RefreshRetryPolicy::disabled().allows(0));
}

#[test]
fn test_server_retry_backoff() {
    let policy = ServerRetryPolicy::default();
    assert_eq!(policy.max_retries, 2);
    assert_eq!(policy.calculate_backoff(0), Duration::from_millis(200));
    assert_eq!(policy.calculate_backoff(1), Duration::from_millis(400));
    assert_eq!(policy.calculate_backoff(10), Duration::from_secs(5));

    let linear = ServerRetryPolicy::default().backoff(
        BackoffType::Linear,
        Duration::from_millis(100),
        Duration::from_secs(1),
    );
    assert_eq!(linear.calculate_backoff(2), Duration::from_millis(300));

    let constant = ServerRetryPolicy::default().backoff(
        BackoffType::Constant,
        Duration::from_millis(50),
        Duration::from_secs(1),
    );
    assert_eq!(constant.calculate_backoff(5), Duration::from_millis(50));
}

#[test]
fn test_reauth_signal_into_error() {
    let signal = |reason| ReauthSignal {
        credential_key: "primary".to_string(),
        reason,
    };
    assert!(matches!(
        signal(ReauthReason::SessionExpired).into_error(),
        Error::AuthExpired { .. }
    ));
    assert!(matches!(
        signal(ReauthReason::Forbidden).into_error(),
        Error::AuthForbidden { .. }
    ));
    assert!(matches!(
        signal(ReauthReason::RefreshUnavailable(RefreshOutcome::Throttled)).into_error(),
        Error::ThrottledRefresh { .. }
    ));
    assert!(matches!(
        signal(ReauthReason::RefreshUnavailable(RefreshOutcome::Failed)).into_error(),
        Error::AuthExpired { .. }
    ));
}

// ============================================================================
// Success Paths
// ============================================================================

#[tokio::test]
async fn test_get_attaches_bearer_and_parses_payload() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/ads/"))
        .and(header("Authorization", "Bearer a1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"id": 1, "make": "Skoda"}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    let h = logged_in(&server).await;

    let response = h
        .executor
        .get("backend", "/api/ads/")
        .await
        .unwrap()
        .success()
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.body["results"][0]["make"], "Skoda");
}

#[tokio::test]
async fn test_unauthenticated_request_has_no_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login/"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    let h = logged_in(&server).await;

    let options = RequestOptions::method(Method::POST)
        .json(json!({"email": "a@b.c"}))
        .unauthenticated();
    let response = h
        .executor
        .execute("backend", "/api/auth/login/", options)
        .await
        .unwrap()
        .into_result()
        .unwrap();

    assert_eq!(response.body, serde_json::Value::Null);
    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].headers.get("authorization").is_none());
}

#[tokio::test]
async fn test_non_json_body_is_kept_as_string() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;
    let h = logged_in(&server).await;

    let response = h.executor.get("backend", "health").await.unwrap();
    assert_eq!(response.success().unwrap().body, json!("ok"));
}

// ============================================================================
// Failure Classification
// ============================================================================

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    let h = logged_in(&server).await;

    let err = h.executor.get("backend", "/api/ads/999/").await.unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}

#[tokio::test]
async fn test_server_error_is_not_retried_by_execute() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .expect(1)
        .mount(&server)
        .await;
    let h = logged_in(&server).await;

    let err = h.executor.get("backend", "/api/ads/").await.unwrap_err();
    assert!(matches!(err, Error::ServerError { status: 502, .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_other_client_errors_surface_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"price": ["required"]})))
        .expect(1)
        .mount(&server)
        .await;
    let h = logged_in(&server).await;

    let err = h
        .executor
        .post("backend", "/api/ads/", json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::HttpStatus { status: 400, .. }));
}

#[tokio::test]
async fn test_timeout_is_network_error_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .expect(1)
        .mount(&server)
        .await;
    let h = logged_in(&server).await;

    let options = RequestOptions::new().timeout(Duration::from_millis(50));
    let err = h
        .executor
        .execute("backend", "/slow", options)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout { timeout_ms: 50 }));
    assert!(err.is_network());
}

#[tokio::test]
async fn test_writes_use_write_budget() {
    let server = MockServer::start().await;
    Mock::given(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(300)))
        .mount(&server)
        .await;
    let config = HttpConfig {
        read_timeout_ms: 2_000,
        write_timeout_ms: 100,
        ..fast_config()
    };
    let h = harness(&server, config);

    assert!(h.executor.get("backend", "/slow").await.is_ok());
    let err = h
        .executor
        .post("backend", "/slow", json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout { timeout_ms: 100 }));
}

#[tokio::test]
async fn test_unauthenticated_401_is_plain_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    mount_refresh_ok(&server, 0).await;
    let h = logged_in(&server).await;

    let err = h
        .executor
        .execute("backend", "/api/me/", RequestOptions::new().unauthenticated())
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(401));
}

// ============================================================================
// Refresh and Retry
// ============================================================================

#[tokio::test]
async fn test_401_refreshes_and_replays_with_new_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/me/"))
        .and(header("Authorization", "Bearer a1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/me/"))
        .and(header("Authorization", "Bearer a2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 7})))
        .expect(1)
        .mount(&server)
        .await;
    mount_refresh_ok(&server, 1).await;
    let h = logged_in(&server).await;

    let outcome = h.executor.get("backend", "/api/me/").await.unwrap();
    assert_eq!(outcome.success().unwrap().body["id"], 7);

    let stored = h.store.get("primary").await.unwrap();
    assert_eq!(stored.access_token.as_deref(), Some("a2"));
    assert_eq!(stored.refresh_attempts, 0);
}

#[tokio::test]
async fn test_second_401_escalates_without_third_call() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/me/"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;
    mount_refresh_ok(&server, 1).await;
    let h = logged_in(&server).await;
    let mut signals = h.executor.subscribe_reauth();

    let outcome = h.executor.get("backend", "/api/me/").await.unwrap();

    let signal = outcome.reauth().unwrap();
    assert_eq!(signal.reason, ReauthReason::SessionExpired);
    assert_eq!(signal.credential_key, "primary");
    assert_eq!(signals.try_recv().unwrap().reason, ReauthReason::SessionExpired);
    assert!(matches!(signals.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn test_retry_forbidden_after_refresh_escalates() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("Authorization", "Bearer a1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(header("Authorization", "Bearer a2"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;
    mount_refresh_ok(&server, 1).await;
    let h = logged_in(&server).await;

    let outcome = h.executor.get("backend", "/api/admin/").await.unwrap();
    assert_eq!(outcome.reauth().unwrap().reason, ReauthReason::Forbidden);
}

#[tokio::test]
async fn test_403_clears_bookkeeping_without_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;
    mount_refresh_ok(&server, 0).await;
    let h = harness(&server, fast_config());
    let record = CredentialRecord {
        access_token: Some("a1".to_string()),
        refresh_token: Some("r1".to_string()),
        refresh_attempts: 2,
        last_refresh_failed: true,
        last_refresh_time: Utc::now(),
    };
    h.store.set("primary", &record).await;

    let outcome = h
        .executor
        .execute(
            "backend",
            "/api/ads/5/",
            RequestOptions::method(Method::DELETE),
        )
        .await
        .unwrap();

    assert!(matches!(
        outcome.clone().into_result(),
        Err(Error::AuthForbidden { .. })
    ));
    let stored = h.store.get("primary").await.unwrap();
    assert_eq!(stored.refresh_attempts, 0);
    assert!(!stored.last_refresh_failed);
}

#[tokio::test]
async fn test_throttled_refresh_escalates_and_keeps_counters() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    mount_refresh_ok(&server, 0).await;
    let h = harness(&server, fast_config());
    let record = CredentialRecord {
        access_token: Some("a1".to_string()),
        refresh_token: Some("r1".to_string()),
        refresh_attempts: 1,
        last_refresh_failed: true,
        last_refresh_time: Utc::now(),
    };
    h.store.set("primary", &record).await;

    let outcome = h.executor.get("backend", "/api/me/").await.unwrap();

    assert_eq!(
        outcome.reauth().unwrap().reason,
        ReauthReason::RefreshUnavailable(RefreshOutcome::Throttled)
    );
    let stored = h.store.get("primary").await.unwrap();
    assert_eq!(stored.refresh_attempts, 1);
    assert!(stored.last_refresh_failed);
}

#[tokio::test]
async fn test_disabled_policy_escalates_on_first_401() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    mount_refresh_ok(&server, 0).await;
    let h = logged_in(&server).await;
    let executor = h
        .executor
        .with_retry_policy(RefreshRetryPolicy::disabled());

    let outcome = executor.get("backend", "/api/me/").await.unwrap();
    assert_eq!(outcome.reauth().unwrap().reason, ReauthReason::SessionExpired);
}

#[tokio::test]
async fn test_credential_keys_are_independent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("Authorization", "Bearer b1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"who": "secondary"})))
        .expect(1)
        .mount(&server)
        .await;
    let h = logged_in(&server).await;
    h.store.login("secondary", "b1", "s1").await;

    let options = RequestOptions::new().credential_key("secondary");
    let outcome = h
        .executor
        .execute("backend", "/api/me/", options)
        .await
        .unwrap();
    assert_eq!(outcome.success().unwrap().body["who"], "secondary");
}

// ============================================================================
// Caller-side Server Retry
// ============================================================================

#[tokio::test]
async fn test_server_retry_recovers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;
    let h = logged_in(&server).await;
    let policy = ServerRetryPolicy::from(h.executor.config());

    let outcome = h
        .executor
        .execute_with_server_retry("backend", "/api/ads/", RequestOptions::new(), &policy)
        .await
        .unwrap();
    assert!(outcome.is_success());
}

#[tokio::test]
async fn test_server_retry_is_bounded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;
    let h = logged_in(&server).await;
    let policy = ServerRetryPolicy::from(h.executor.config());

    let err = h
        .executor
        .execute_with_server_retry("backend", "/api/ads/", RequestOptions::new(), &policy)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ServerError { status: 500, .. }));
}

#[tokio::test]
async fn test_server_retry_ignores_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    let h = logged_in(&server).await;

    let err = h
        .executor
        .execute_with_server_retry(
            "backend",
            "/api/ads/1/",
            RequestOptions::new(),
            &ServerRetryPolicy::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}
