mod test_support;

use axum::http::{header::AUTHORIZATION, HeaderValue, StatusCode};
use munayd::api::types::{EXPIRED_TOKEN, INVALID_TOKEN, NO_TOKEN, UNKNOWN_USER};
use munayd::models::Role;
use serde_json::{json, Value};
use test_support::{assert_status, bearer, data, get, put, spawn_app, student, teacher, PASSWORD};

fn message(response: &axum_test::TestResponse) -> String {
    let body: Value = response.json();
    assert_eq!(body["success"], false);
    body["message"].as_str().unwrap_or_default().to_string()
}

#[tokio::test]
async fn missing_and_malformed_headers_report_no_token() {
    let app = spawn_app();

    let response = app.server.get("/api/auth/me").await;
    assert_status(&response, StatusCode::UNAUTHORIZED);
    assert_eq!(message(&response), NO_TOKEN);

    let response = app
        .server
        .get("/api/auth/me")
        .add_header(AUTHORIZATION, HeaderValue::from_static("Token abc"))
        .await;
    assert_status(&response, StatusCode::UNAUTHORIZED);
    assert_eq!(message(&response), NO_TOKEN);
}

#[tokio::test]
async fn expired_token_message_differs_from_invalid_token() {
    let app = spawn_app();
    let ana = student(&app.server, "Ana", "ana@colegio.pe", None).await;

    let garbage = get(&app.server, "/api/auth/me", "not.a.jwt").await;
    assert_status(&garbage, StatusCode::UNAUTHORIZED);
    assert_eq!(message(&garbage), INVALID_TOKEN);

    let expired = app
        .state
        .tokens
        .issue_with_ttl(&ana.id, Role::Student, -120)
        .expect("token");
    let response = get(&app.server, "/api/auth/me", &expired).await;
    assert_status(&response, StatusCode::UNAUTHORIZED);
    assert_eq!(message(&response), EXPIRED_TOKEN);
    assert_ne!(EXPIRED_TOKEN, INVALID_TOKEN);
}

#[tokio::test]
async fn token_signed_with_another_secret_is_invalid() {
    let app = spawn_app();
    let ana = student(&app.server, "Ana", "ana@colegio.pe", None).await;
    let other = munayd::auth::TokenSigner::new("another-secret-that-is-long-enough-000", 3600);
    let forged = other.issue(&ana.id, Role::Teacher).expect("token");

    let response = get(&app.server, "/api/auth/me", &forged).await;
    assert_status(&response, StatusCode::UNAUTHORIZED);
    assert_eq!(message(&response), INVALID_TOKEN);
}

#[tokio::test]
async fn token_for_deleted_user_reports_unknown_user() {
    let app = spawn_app();
    let ghost = app
        .state
        .tokens
        .issue("does-not-exist", Role::Teacher)
        .expect("token");

    let response = get(&app.server, "/api/classes", &ghost).await;
    assert_status(&response, StatusCode::UNAUTHORIZED);
    assert_eq!(message(&response), UNKNOWN_USER);
}

#[tokio::test]
async fn register_login_and_me_share_the_user() {
    let app = spawn_app();
    let registered = teacher(&app.server, "Rosa", "Rosa@Colegio.pe").await;
    assert_eq!(registered.user["email"], "rosa@colegio.pe");
    assert!(registered.user.get("passwordHash").is_none());

    let response = app
        .server
        .post("/api/auth/login")
        .json(&json!({ "email": "rosa@colegio.pe", "password": PASSWORD }))
        .await;
    assert_status(&response, StatusCode::OK);
    let login = data(&response);
    assert!(login["user"]["lastLogin"].is_string());

    let token = login["token"].as_str().expect("token");
    let me = data(&get(&app.server, "/api/auth/me", token).await);
    assert_eq!(me["id"], registered.id);
    assert_eq!(me["role"], "teacher");
}

#[tokio::test]
async fn duplicate_email_conflicts_and_bad_login_is_401() {
    let app = spawn_app();
    teacher(&app.server, "Rosa", "rosa@colegio.pe").await;

    let response = app
        .server
        .post("/api/auth/register")
        .json(&json!({ "name": "Rosa 2", "email": "rosa@colegio.pe", "password": PASSWORD }))
        .await;
    assert_status(&response, StatusCode::CONFLICT);

    let response = app
        .server
        .post("/api/auth/login")
        .json(&json!({ "email": "rosa@colegio.pe", "password": "wrong-password" }))
        .await;
    assert_status(&response, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn registration_validation_lists_every_problem() {
    let app = spawn_app();
    let response = app
        .server
        .post("/api/auth/register")
        .json(&json!({ "email": "nope", "password": "123", "role": "admin" }))
        .await;
    assert_status(&response, StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    let errors = body["errors"].as_array().expect("errors");
    assert_eq!(errors.len(), 4, "{body}");
}

#[tokio::test]
async fn password_change_requires_current_password() {
    let app = spawn_app();
    let ana = student(&app.server, "Ana", "ana@colegio.pe", None).await;

    let response = put(
        &app.server,
        "/api/auth/password",
        &ana.token,
        json!({ "currentPassword": "wrong", "newPassword": "brand-new" }),
    )
    .await;
    assert_status(&response, StatusCode::BAD_REQUEST);

    let response = put(
        &app.server,
        "/api/auth/password",
        &ana.token,
        json!({ "currentPassword": PASSWORD, "newPassword": "brand-new" }),
    )
    .await;
    assert_status(&response, StatusCode::OK);

    let response = app
        .server
        .post("/api/auth/login")
        .json(&json!({ "email": "ana@colegio.pe", "password": "brand-new" }))
        .await;
    assert_status(&response, StatusCode::OK);
    // The old token keeps working until it expires.
    let response = app
        .server
        .get("/api/auth/me")
        .add_header(AUTHORIZATION, bearer(&ana.token))
        .await;
    assert_status(&response, StatusCode::OK);
}
