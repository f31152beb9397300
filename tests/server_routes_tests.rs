use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use serde_json::Value;
use tower::ServiceExt;

use museo_ops::config::DatabaseConfig;
use museo_ops::server::{OpsState, ops_router};

async fn get(app: axum::Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let resp = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(uri)
                .body(Body::empty())
                .expect("failed to build request"),
        )
        .await
        .expect("request failed");
    let status = resp.status();
    let body = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("failed to read response body");
    (status, body.to_vec())
}

#[tokio::test]
async fn healthz_reports_ok_without_touching_the_database() {
    let app = ops_router(OpsState::new(DatabaseConfig::default()));

    let (status, body) = get(app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).expect("body was not json");
    assert_eq!(json["status"], "ok");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn db_health_without_credentials_is_service_unavailable() {
    // no user/password configured: must fail before any network I/O
    let app = ops_router(OpsState::new(DatabaseConfig::default()));

    let (status, body) = get(app, "/healthz/db").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let json: Value = serde_json::from_slice(&body).expect("body was not json");
    assert_eq!(json["error"]["code"], "MISSING_CREDENTIALS");
    assert_eq!(json["error"]["kind"], "connection");
}

#[tokio::test]
async fn db_health_against_closed_port_reports_connection_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let cfg = DatabaseConfig {
        host: "127.0.0.1".into(),
        port,
        user: Some("museo".into()),
        password: Some("not-a-real-secret".into()),
        connect_timeout_secs: 3,
        ..DatabaseConfig::default()
    };
    let (status, body) = get(ops_router(OpsState::new(cfg)), "/healthz/db").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("127.0.0.1"), "{text}");
    assert!(!text.contains("not-a-real-secret"));
}

#[tokio::test]
async fn banner_names_the_tool() {
    let app = ops_router(OpsState::new(DatabaseConfig::default()));
    let (status, body) = get(app, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(body).unwrap().starts_with("museo-ops "));
}
