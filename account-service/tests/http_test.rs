mod common;

use account_service::{build_router, config::ClientSeed};
use common::{test_config, TestApp};
use serde_json::{json, Value};
use std::net::SocketAddr;
use tokio::net::TcpListener;

async fn serve(app: &TestApp) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("No local address");
    let router = build_router(app.state.clone());

    tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .expect("Server failed");
    });

    format!("http://{}", addr)
}

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new().await;
    let address = serve(&app).await;

    let response = reqwest::get(format!("{}/health", address))
        .await
        .expect("Failed to execute request");
    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_seeded_client_signs_in_over_http() {
    let mut config = test_config();
    config.tokens.seed_client = Some(ClientSeed {
        client_id: "mobile".to_string(),
        client_secret: "mobile-secret".to_string(),
        name: "Mobile".to_string(),
    });
    let app = TestApp::with_config(config).await;
    app.state.bootstrap().await.expect("Bootstrap failed");
    // Running startup twice keeps the seeded client as is
    app.state.bootstrap().await.expect("Bootstrap failed");

    let address = serve(&app).await;
    let client = reqwest::Client::new();

    let started: Value = client
        .post(format!("{}/account/login", address))
        .json(&json!({ "email": "alice@example.com" }))
        .send()
        .await
        .expect("Failed to execute request")
        .json()
        .await
        .expect("Failed to parse response");
    let device_uuid = started["device_uuid"].as_str().expect("No device uuid");

    let alice = app.principal("alice@example.com").await;
    let code = app.cached_code(&alice).await.expect("No cached code");

    let response = client
        .post(format!("{}/account/token", address))
        .json(&json!({
            "email": "alice@example.com",
            "code": code,
            "client_id": "mobile",
            "client_secret": "wrong",
            "device_uuid": device_uuid,
        }))
        .send()
        .await
        .expect("Failed to execute request");
    assert!(response.status().is_client_error());

    let response = client
        .post(format!("{}/account/token", address))
        .json(&json!({
            "email": "alice@example.com",
            "code": code,
            "client_id": "mobile",
            "client_secret": "mobile-secret",
            "device_uuid": device_uuid,
        }))
        .send()
        .await
        .expect("Failed to execute request");
    assert!(response.status().is_success());
    let tokens: Value = response.json().await.expect("Failed to parse response");
    let token = tokens["access_token"].as_str().expect("No access token");

    let profile: Value = client
        .get(format!("{}/account/profile", address))
        .bearer_auth(token)
        .send()
        .await
        .expect("Failed to execute request")
        .json()
        .await
        .expect("Failed to parse response");
    assert_eq!(profile["email"], "alice@example.com");
}
