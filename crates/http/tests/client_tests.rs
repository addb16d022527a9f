//! Integration tests for the Tessera HTTP client

use futures::future::join_all;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tessera_core::tests::token_for;
use tessera_core::{Session, Token};
use tessera_http::{AuthClient, BackendConfig, ClientError, SessionClient};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn session_for(server: &MockServer) -> (Arc<AuthClient>, Session) {
    let auth = Arc::new(AuthClient::new(server.uri()).unwrap());
    let session = Session::new(auth.clone());
    (auth, session)
}

async fn mount_login(server: &MockServer, token: &str) {
    Mock::given(method("POST"))
        .and(path("/user/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": token })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_client_builder() {
    let client = AuthClient::builder()
        .base_url("http://localhost:8080/")
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap();

    assert_eq!(client.base_url(), "http://localhost:8080");
    assert_eq!(client.config().timeout_secs, 5);
}

#[tokio::test]
async fn test_client_builder_requires_base_url() {
    let result = AuthClient::builder().build();
    assert!(matches!(result, Err(ClientError::Configuration(_))));

    let result = AuthClient::from_config(BackendConfig::with_base_url("::nope::"));
    assert!(matches!(result, Err(ClientError::Configuration(_))));
}

#[tokio::test]
async fn test_login_posts_credentials_and_stores_token() {
    let server = MockServer::start().await;
    let token = token_for("user-1", &["ROLE_USER"], 4_000_000_000);

    Mock::given(method("POST"))
        .and(path("/user/login"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({ "email": "a@example.com", "password": "hunter2" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": token })))
        .expect(1)
        .mount(&server)
        .await;

    let (_auth, session) = session_for(&server);
    session.login("a@example.com", "hunter2").await.unwrap();

    assert_eq!(session.token(), Some(token));
    assert!(session.has_any_role(&["ROLE_USER"]));
}

#[tokio::test]
async fn test_rejected_login_reports_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/user/login"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Bad credentials"))
        .mount(&server)
        .await;

    let (_auth, session) = session_for(&server);
    let err = session.login("a@example.com", "wrong").await.unwrap_err();

    assert_eq!(
        err,
        tessera_core::SessionError::AuthenticationFailed(tessera_core::BackendError::Rejected {
            status: 401,
            message: "Bad credentials".to_string(),
        })
    );
    assert!(!session.is_authenticated());
}

#[tokio::test]
async fn test_requests_carry_bearer_token() {
    let server = MockServer::start().await;
    mount_login(&server, "token-a").await;
    Mock::given(method("GET"))
        .and(path("/api/profile"))
        .and(header("authorization", "Bearer token-a"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": "Ada" })))
        .expect(1)
        .mount(&server)
        .await;

    let (auth, session) = session_for(&server);
    session.login("a@example.com", "hunter2").await.unwrap();

    let client = SessionClient::new(&auth, session);
    let profile: Value = client.get("/api/profile").await.unwrap();
    assert_eq!(profile["name"], "Ada");
}

#[tokio::test]
async fn test_concurrent_unauthorized_requests_share_one_refresh() {
    let server = MockServer::start().await;
    mount_login(&server, "stale").await;

    Mock::given(method("GET"))
        .and(path("/api/data"))
        .and(header("authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/data"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(3)
        .mount(&server)
        .await;
    // Slow enough that every 401 arrives while the refresh is in flight
    Mock::given(method("POST"))
        .and(path("/user/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "token": "fresh" }))
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (auth, session) = session_for(&server);
    session.login("a@example.com", "hunter2").await.unwrap();
    let client = SessionClient::new(&auth, session.clone());

    let results = join_all((0..3).map(|_| client.get::<Value>("/api/data"))).await;

    for result in results {
        assert_eq!(result.unwrap()["ok"], true);
    }
    assert_eq!(session.token(), Some(Token::from("fresh")));
    assert_eq!(session.renewal_calls(), 1);
}

#[tokio::test]
async fn test_replayed_request_is_never_renewed_again() {
    let server = MockServer::start().await;
    mount_login(&server, "stale").await;

    Mock::given(method("GET"))
        .and(path("/api/admin"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/user/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "fresh" })))
        .expect(1)
        .mount(&server)
        .await;

    let (auth, session) = session_for(&server);
    session.login("a@example.com", "hunter2").await.unwrap();
    let client = SessionClient::new(&auth, session.clone());

    let result = client.get::<Value>("/api/admin").await;

    assert!(matches!(result, Err(ClientError::AuthenticationFailed(ref m)) if m == "Unauthorized"));
    // The renewal itself succeeded, so the session survives
    assert_eq!(session.token(), Some(Token::from("fresh")));
}

#[tokio::test]
async fn test_failed_refresh_ends_session_and_surfaces_original_failure() {
    let server = MockServer::start().await;
    mount_login(&server, "stale").await;

    Mock::given(method("GET"))
        .and(path("/api/data"))
        .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/user/refresh"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/user/logout"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let (auth, session) = session_for(&server);
    session.login("a@example.com", "hunter2").await.unwrap();
    let client = SessionClient::new(&auth, session.clone());

    let result = client.get::<Value>("/api/data").await;

    assert!(matches!(result, Err(ClientError::AuthenticationFailed(ref m)) if m == "token expired"));
    assert!(!session.is_authenticated());
}

#[tokio::test]
async fn test_other_errors_are_not_retried() {
    let server = MockServer::start().await;
    mount_login(&server, "token-a").await;

    Mock::given(method("GET"))
        .and(path("/api/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such thing"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/user/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "fresh" })))
        .expect(0)
        .mount(&server)
        .await;

    let (auth, session) = session_for(&server);
    session.login("a@example.com", "hunter2").await.unwrap();
    let client = SessionClient::new(&auth, session);

    let result = client.get::<Value>("/api/missing").await;
    assert!(matches!(result, Err(ClientError::NotFound(_))));
}

#[tokio::test]
async fn test_logout_clears_even_when_server_fails() {
    let server = MockServer::start().await;
    mount_login(&server, "token-a").await;
    Mock::given(method("POST"))
        .and(path("/user/logout"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let (_auth, session) = session_for(&server);
    session.login("a@example.com", "hunter2").await.unwrap();
    session.logout().await;

    assert!(!session.is_authenticated());
}

#[tokio::test]
async fn test_restore_uses_refresh_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/user/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "restored" })))
        .expect(1)
        .mount(&server)
        .await;

    let (_auth, session) = session_for(&server);

    assert!(session.restore().await);
    assert_eq!(session.token(), Some(Token::from("restored")));
}

#[tokio::test]
async fn test_register_accepts_empty_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/user/register"))
        .and(body_json(json!({ "email": "new@example.com", "password": "pw" })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let (_auth, session) = session_for(&server);
    session.register("new@example.com", "pw").await.unwrap();

    assert!(!session.is_authenticated());
}
