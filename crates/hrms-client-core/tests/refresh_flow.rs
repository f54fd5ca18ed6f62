//! End-to-end expiry handling against a mock HRMS server.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde_json::{json, Value};
use tokio::sync::broadcast::error::TryRecvError;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use hrms_client_core::api::RequestExecutor;
use hrms_client_core::auth::{HttpTokenRefresher, SessionFileBackend};
use hrms_client_core::{ApiClient, ApiError, Config, CredentialStore, Credentials, SessionEvent};

const CONCURRENT_REQUESTS: u64 = 20;

fn config_for(server: &MockServer) -> Config {
    Config {
        base_url: server.uri(),
        refresh_timeout_secs: 5,
        ..Config::default()
    }
}

fn client_with(server: &MockServer, store: Arc<CredentialStore>) -> ApiClient {
    ApiClient::new(&config_for(server), store).unwrap()
}

fn expired_session(server: &MockServer) -> ApiClient {
    let store = Arc::new(CredentialStore::in_memory());
    store.set(Credentials::new("old", "refresh-1"));
    client_with(server, store)
}

/// `/employees` rejects the old token and accepts the new one.
async fn mount_employees(server: &MockServer, old_hits: u64, new_hits: u64) {
    Mock::given(method("GET"))
        .and(path("/employees"))
        .and(header("Authorization", "Bearer old"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "jwt expired"})))
        .expect(old_hits)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/employees"))
        .and(header("Authorization", "Bearer new"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": "E1"}])))
        .expect(new_hits)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_concurrent_expired_requests_share_one_refresh() {
    let server = MockServer::start().await;
    mount_employees(&server, CONCURRENT_REQUESTS, CONCURRENT_REQUESTS).await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"accessToken": "new", "refreshToken": "refresh-2"}))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = expired_session(&server);
    let mut events = client.subscribe();

    let results = join_all((0..CONCURRENT_REQUESTS).map(|_| client.get::<Value>("/employees"))).await;

    for result in results {
        let response = result.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.data, json!([{"id": "E1"}]));
    }
    assert_eq!(client.refresh_count(), 1);
    assert_eq!(client.credentials(), Some(Credentials::new("new", "refresh-2")));
    assert_eq!(events.try_recv().unwrap(), SessionEvent::Refreshed);
    assert_eq!(events.try_recv().unwrap_err(), TryRecvError::Empty);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_tasks_share_one_refresh() {
    let server = MockServer::start().await;
    mount_employees(&server, CONCURRENT_REQUESTS, CONCURRENT_REQUESTS).await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"accessToken": "new"}))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = expired_session(&server);
    let handles: Vec<_> = (0..CONCURRENT_REQUESTS)
        .map(|_| {
            let client = client.clone();
            tokio::spawn(async move { client.get::<Value>("/employees").await })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap().status, 200);
    }
    // No rotation in the response: the old refresh token is kept
    assert_eq!(client.credentials(), Some(Credentials::new("new", "refresh-1")));
}

#[tokio::test]
async fn test_concurrent_requests_all_expire_when_refresh_fails() {
    let server = MockServer::start().await;
    mount_employees(&server, CONCURRENT_REQUESTS, 0).await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(json!({"message": "Refresh token revoked"}))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = expired_session(&server);
    let mut events = client.subscribe();

    let results = join_all((0..CONCURRENT_REQUESTS).map(|_| client.get::<Value>("/employees"))).await;

    for result in results {
        let err = result.unwrap_err();
        assert!(err.is_session_expired());
        assert_eq!(
            err.to_envelope(),
            hrms_client_core::ErrorEnvelope {
                message: "Refresh token revoked".to_string(),
                status: 400,
                data: Some(json!({"message": "Refresh token revoked"})),
            }
        );
    }
    assert!(!client.is_authenticated());
    assert_eq!(
        events.try_recv().unwrap(),
        SessionEvent::Expired {
            message: "Refresh token revoked".to_string()
        }
    );
    assert_eq!(events.try_recv().unwrap_err(), TryRecvError::Empty);
}

#[tokio::test]
async fn test_hanging_refresh_endpoint_times_out() {
    let server = MockServer::start().await;
    mount_employees(&server, 1, 0).await;

    // The refresh endpoint hangs past the refresh timeout
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
        .mount(&server)
        .await;

    let config = Config {
        base_url: server.uri(),
        refresh_timeout_secs: 1,
        ..Config::default()
    };
    let store = Arc::new(CredentialStore::in_memory());
    store.set(Credentials::new("old", "refresh-1"));
    let client = ApiClient::new(&config, store.clone()).unwrap();

    let err = client.get::<Value>("/employees").await.unwrap_err();
    assert!(matches!(err, ApiError::AuthExpired { .. }));
    assert_eq!(err.message(), "Token refresh timed out");
    assert!(store.get().is_none());
}

#[tokio::test]
async fn test_refresh_endpoint_unreachable_expires_session() {
    let server = MockServer::start().await;
    mount_employees(&server, 1, 0).await;

    let store = Arc::new(CredentialStore::in_memory());
    store.set(Credentials::new("old", "refresh-1"));

    // Refresh calls go to a port nothing listens on
    let auth_config = Config {
        base_url: "http://127.0.0.1:9".to_string(),
        ..Config::default()
    };
    let auth_executor = Arc::new(RequestExecutor::new(&auth_config, store.clone()).unwrap());
    let client = ApiClient::with_refresher(
        &config_for(&server),
        store.clone(),
        Arc::new(HttpTokenRefresher::new(auth_executor)),
    )
    .unwrap();
    let mut events = client.subscribe();

    let err = client.get::<Value>("/employees").await.unwrap_err();
    assert!(err.is_session_expired());
    assert_eq!(err.status(), 500);
    assert!(store.get().is_none());
    assert!(matches!(events.try_recv().unwrap(), SessionEvent::Expired { .. }));
    assert_eq!(client.refresh_count(), 1);
}

#[tokio::test]
async fn test_refresh_endpoint_401_expires_session() {
    let server = MockServer::start().await;
    mount_employees(&server, 1, 0).await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"message": "Refresh token expired"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = expired_session(&server);
    let mut events = client.subscribe();

    let err = client.get::<Value>("/employees").await.unwrap_err();
    assert_eq!(
        err,
        ApiError::AuthExpired {
            status: 401,
            message: "Refresh token expired".to_string(),
            data: Some(json!({"message": "Refresh token expired"})),
        }
    );
    assert!(!client.is_authenticated());
    assert_eq!(
        events.try_recv().unwrap(),
        SessionEvent::Expired {
            message: "Refresh token expired".to_string()
        }
    );
}

#[tokio::test]
async fn test_missing_refresh_endpoint_expires_session() {
    let server = MockServer::start().await;
    mount_employees(&server, 1, 0).await;

    let client = expired_session(&server);
    let err = client.get::<Value>("/employees").await.unwrap_err();
    assert!(err.is_session_expired());
    assert_eq!(err.status(), 404);
    assert_eq!(err.message(), "Not Found");
    assert!(!client.is_authenticated());
}

#[tokio::test]
async fn test_refreshed_credentials_survive_restart() {
    let server = MockServer::start().await;
    mount_employees(&server, 1, 2).await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"accessToken": "new"})))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(SessionFileBackend::new(dir.path().to_path_buf()));
    let store = Arc::new(CredentialStore::load(backend.clone()).unwrap());
    store.set(Credentials::new("old", "refresh-1"));

    let client = client_with(&server, store);
    client.get::<Value>("/employees").await.unwrap();
    drop(client);

    // A new process picks up the refreshed pair without refreshing again
    let restored = Arc::new(CredentialStore::load(backend).unwrap());
    let client = client_with(&server, restored);
    let response = client.get::<Value>("/employees").await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(client.refresh_count(), 0);
}
