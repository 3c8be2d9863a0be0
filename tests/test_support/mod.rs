#![allow(dead_code)]

use async_trait::async_trait;
use axum::http::{header::AUTHORIZATION, HeaderValue, StatusCode};
use axum_test::{TestResponse, TestServer};
use munayd::api::{self, AppState};
use munayd::config::Config;
use munayd::db::Db;
use munayd::models::DemoRequest;
use munayd::notify::Notifier;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;

pub const PASSWORD: &str = "secret123";

/// Records demo requests instead of sending mail.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<DemoRequest>>,
    pub fail: bool,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn demo_requested(&self, request: &DemoRequest) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("smtp relay unavailable");
        }
        self.sent.lock().push(request.clone());
        Ok(())
    }
}

pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
    pub notifier: Arc<RecordingNotifier>,
}

pub fn spawn_app() -> TestApp {
    spawn_app_with(RecordingNotifier::default())
}

pub fn spawn_app_with(notifier: RecordingNotifier) -> TestApp {
    spawn_app_with_config(Config::in_memory(), notifier)
}

pub fn spawn_app_with_config(config: Config, notifier: RecordingNotifier) -> TestApp {
    let notifier = Arc::new(notifier);
    let db = Db::open_in_memory().expect("open db");
    let state = AppState::new(config, db, notifier.clone()).expect("state");
    let server = TestServer::new(api::app(state.clone())).expect("server");
    TestApp {
        server,
        state,
        notifier,
    }
}

pub fn bearer(token: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("Bearer {token}")).expect("header")
}

pub fn assert_status(response: &TestResponse, expected: StatusCode) {
    assert_eq!(
        response.status_code(),
        expected,
        "unexpected status, body: {}",
        response.text()
    );
}

pub struct Account {
    pub token: String,
    pub id: String,
    pub user: Value,
}

pub async fn register(
    server: &TestServer,
    name: &str,
    email: &str,
    role: &str,
    class_code: Option<&str>,
) -> Account {
    let response = server
        .post("/api/auth/register")
        .json(&json!({
            "name": name,
            "email": email,
            "password": PASSWORD,
            "role": role,
            "classCode": class_code,
        }))
        .await;
    assert_status(&response, StatusCode::CREATED);
    let body: Value = response.json();
    Account {
        token: body["data"]["token"].as_str().expect("token").to_string(),
        id: body["data"]["user"]["id"].as_str().expect("id").to_string(),
        user: body["data"]["user"].clone(),
    }
}

pub async fn teacher(server: &TestServer, name: &str, email: &str) -> Account {
    register(server, name, email, "teacher", None).await
}

pub async fn student(server: &TestServer, name: &str, email: &str, class_code: Option<&str>) -> Account {
    register(server, name, email, "student", class_code).await
}

pub async fn create_class(server: &TestServer, teacher: &Account, name: &str) -> String {
    let response = server
        .post("/api/classes")
        .add_header(AUTHORIZATION, bearer(&teacher.token))
        .json(&json!({ "name": name }))
        .await;
    assert_status(&response, StatusCode::CREATED);
    let body: Value = response.json();
    body["data"]["code"].as_str().expect("code").to_string()
}

pub async fn get(server: &TestServer, path: &str, token: &str) -> TestResponse {
    server
        .get(path)
        .add_header(AUTHORIZATION, bearer(token))
        .await
}

pub async fn post(server: &TestServer, path: &str, token: &str, body: Value) -> TestResponse {
    server
        .post(path)
        .add_header(AUTHORIZATION, bearer(token))
        .json(&body)
        .await
}

pub async fn put(server: &TestServer, path: &str, token: &str, body: Value) -> TestResponse {
    server
        .put(path)
        .add_header(AUTHORIZATION, bearer(token))
        .json(&body)
        .await
}

pub async fn delete(server: &TestServer, path: &str, token: &str) -> TestResponse {
    server
        .delete(path)
        .add_header(AUTHORIZATION, bearer(token))
        .await
}

pub fn data(response: &TestResponse) -> Value {
    let body: Value = response.json();
    assert_eq!(body["success"], true, "envelope: {body}");
    body["data"].clone()
}
