mod common;

use account_service::{
    handlers::{self, RawRequest},
    services::{AccountError, AccountStore},
};
use common::TestApp;
use serde_json::json;

#[tokio::test]
async fn test_profile_requires_authentication() {
    let app = TestApp::new().await;

    let err = handlers::profile(&app.state, &RawRequest::get(""))
        .await
        .unwrap_err();
    assert!(matches!(err, AccountError::Unauthenticated));

    let err = handlers::profile(&app.state, &RawRequest::get("").with_bearer("bogus"))
        .await
        .unwrap_err();
    assert!(matches!(err, AccountError::Unauthenticated));
}

#[tokio::test]
async fn test_profile_fields_filter() {
    let app = TestApp::new().await;
    let (token, _) = app.sign_in("alice@example.com").await;

    let full = handlers::profile(&app.state, &RawRequest::get("").with_bearer(&token))
        .await
        .unwrap();
    assert_eq!(full["email"], "alice@example.com");
    assert!(full["last_login"].is_string());

    let req = RawRequest::get("fields=email,username").with_bearer(&token);
    let limited = handlers::profile(&app.state, &req).await.unwrap();
    let keys: Vec<&String> = limited.as_object().unwrap().keys().collect();
    assert_eq!(keys.len(), 2);
    assert_eq!(limited["username"], "alice@example.com");
}

#[tokio::test]
async fn test_update_profile_skips_prohibited_and_journals() {
    let app = TestApp::new().await;
    let (token, _) = app.sign_in("alice@example.com").await;
    let alice = app.principal("alice@example.com").await;
    assert_eq!(alice.email_verified, Some(true));

    let req = RawRequest::json(&json!({
        "first_name": "Alice",
        "email": "Alice@New.io",
        "is_superuser": true,
        "doc_secret": "x",
        "favourite_colour": "green",
    }))
    .with_bearer(&token);
    let profile = handlers::update_profile(&app.state, &req).await.unwrap();
    assert_eq!(profile["first_name"], "Alice");
    assert_eq!(profile["email"], "alice@new.io");
    assert!(profile.get("doc_secret").is_none());
    assert!(profile.get("favourite_colour").is_none());

    // The email is the login key, so the username follows it
    let alice = app.principal("alice@new.io").await;
    assert!(!alice.is_superuser);
    assert_eq!(alice.email, "alice@new.io");
    assert_eq!(alice.email_verified, Some(false));
    assert!(app
        .store
        .find_principal_by_username("alice@example.com")
        .await
        .unwrap()
        .is_none());

    let changes = app.store.field_changes("principal", alice.id).await.unwrap();
    let email_change = changes.iter().find(|c| c.field == "email").unwrap();
    assert_eq!(email_change.old_value.as_deref(), Some("alice@example.com"));
    assert_eq!(email_change.new_value.as_deref(), Some("alice@new.io"));
    let username_change = changes.iter().find(|c| c.field == "username").unwrap();
    assert_eq!(username_change.old_value.as_deref(), Some("alice@example.com"));
    assert_eq!(username_change.new_value.as_deref(), Some("alice@new.io"));
    let name_change = changes.iter().find(|c| c.field == "first_name").unwrap();
    assert_eq!(name_change.old_value, None);
    assert_eq!(name_change.new_value.as_deref(), Some("Alice"));
    assert_eq!(changes.len(), 3);
}

#[tokio::test]
async fn test_update_profile_rejects_taken_email() {
    let app = TestApp::new().await;
    app.sign_in("bob@example.com").await;
    let (token, _) = app.sign_in("alice@example.com").await;

    let req = RawRequest::json(&json!({ "email": "BOB@example.com" })).with_bearer(&token);
    let err = handlers::update_profile(&app.state, &req).await.unwrap_err();
    assert!(matches!(err, AccountError::BadRequest(_)));

    let alice = app.principal("alice@example.com").await;
    assert_eq!(alice.email, "alice@example.com");
    assert_eq!(alice.email_verified, Some(true));
    assert!(app
        .store
        .field_changes("principal", alice.id)
        .await
        .unwrap()
        .is_empty());

    // A username write cannot split the login key from the email
    let req = RawRequest::json(&json!({ "username": "alice2" })).with_bearer(&token);
    handlers::update_profile(&app.state, &req).await.unwrap();
    assert_eq!(app.principal("alice@example.com").await.username, "alice@example.com");
}

#[tokio::test]
async fn test_logout_revokes_token_and_removes_device() {
    let app = TestApp::new().await;
    let (token, device_uuid) = app.sign_in("alice@example.com").await;
    let alice = app.principal("alice@example.com").await;

    let req = RawRequest::json(&json!({ "device_uuid": device_uuid })).with_bearer(&token);
    let out = handlers::logout(&app.state, &req).await.unwrap();
    assert_eq!(out["message"], "LOGGED OUT");

    assert!(app.store.list_devices(alice.id).await.unwrap().is_empty());
    assert!(app.state.tokens.resolve_bearer(&token).await.unwrap().is_none());

    // Logging out again still succeeds
    handlers::logout(&app.state, &req).await.unwrap();
}

#[tokio::test]
async fn test_logout_drops_pending_code_of_device() {
    let app = TestApp::new().await;
    let (token, device_uuid) = app.sign_in("alice@example.com").await;
    app.login("alice@example.com", json!({ "uuid": device_uuid }))
        .await
        .unwrap();

    let req = RawRequest::json(&json!({ "device_uuid": device_uuid })).with_bearer(&token);
    handlers::logout(&app.state, &req).await.unwrap();

    let err = app
        .exchange("alice@example.com", "123456", None)
        .await
        .unwrap_err();
    assert!(matches!(err, AccountError::NoCodeRequested));
}

#[tokio::test]
async fn test_delete_account_with_fresh_code() {
    let app = TestApp::new().await;
    let (token, device_uuid) = app.sign_in("alice@example.com").await;
    let alice = app.principal("alice@example.com").await;

    let req = RawRequest::json(&json!({ "code": "123456", "device_uuid": device_uuid }))
        .with_bearer(&token);
    let err = handlers::delete_account(&app.state, &req).await.unwrap_err();
    assert!(matches!(err, AccountError::BadRequest(_)));

    let req = RawRequest::json(&json!({ "sure": true, "code": "123456", "device_uuid": device_uuid }))
        .with_bearer(&token);
    let err = handlers::delete_account(&app.state, &req).await.unwrap_err();
    assert!(matches!(err, AccountError::NoCodeRequested));

    app.login("alice@example.com", json!({ "uuid": device_uuid }))
        .await
        .unwrap();

    let req = RawRequest::json(&json!({ "sure": true, "code": "000000", "device_uuid": device_uuid }))
        .with_bearer(&token);
    let err = handlers::delete_account(&app.state, &req).await.unwrap_err();
    assert!(matches!(err, AccountError::InvalidCode));

    let req = RawRequest::json(&json!({ "sure": true, "code": "123456", "device_uuid": device_uuid }))
        .with_bearer(&token);
    let out = handlers::delete_account(&app.state, &req).await.unwrap();
    assert_eq!(out["message"], "ACCOUNT DELETED");

    assert!(app.store.find_principal(alice.id).await.unwrap().is_none());
    assert!(app.state.tokens.resolve_bearer(&token).await.unwrap().is_none());
}

#[tokio::test]
async fn test_missing_parameters_are_aggregated() {
    let app = TestApp::new().await;

    let err = handlers::exchange_code(&app.state, &RawRequest::json(&json!({})))
        .await
        .unwrap_err();
    match err {
        AccountError::Param(e) => assert_eq!(
            e.to_string(),
            "RP_MISSING_PARAMETERS: email, code, client_id, client_secret"
        ),
        other => panic!("unexpected error: {:?}", other),
    }
}
