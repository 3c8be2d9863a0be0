mod test_support;

use axum::http::StatusCode;
use munayd::config::{Config, Environment};
use serde_json::{json, Value};
use test_support::{
    assert_status, create_class, data, get, spawn_app, spawn_app_with_config, student, teacher,
    RecordingNotifier,
};

#[tokio::test]
async fn health_reports_version_without_auth() {
    let app = spawn_app();
    let response = app.server.get("/health").await;
    assert_status(&response, StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn unknown_routes_are_404_and_wrong_methods_405() {
    let app = spawn_app();
    let rosa = teacher(&app.server, "Rosa", "rosa@colegio.pe").await;

    let response = get(&app.server, "/api/nothing-here", &rosa.token).await;
    assert_status(&response, StatusCode::NOT_FOUND);
    let response = app.server.patch("/api/auth/login").json(&json!({})).await;
    assert_status(&response, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn static_segments_win_over_ids() {
    let app = spawn_app();
    let rosa = teacher(&app.server, "Rosa", "rosa@colegio.pe").await;
    let code = create_class(&app.server, &rosa, "5A").await;
    let ana = student(&app.server, "Ana", "ana@colegio.pe", Some(&code)).await;

    assert_status(&get(&app.server, "/api/surveys/mine", &ana.token).await, StatusCode::OK);
    assert_status(&get(&app.server, "/api/growth-spaces/mine", &ana.token).await, StatusCode::OK);
    assert_status(&get(&app.server, "/api/rewards/mine", &ana.token).await, StatusCode::OK);
    assert_status(&get(&app.server, "/api/notifications/unread-count", &rosa.token).await, StatusCode::OK);
    assert_status(&get(&app.server, "/api/surveys/unknown-id", &ana.token).await, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn users_listing_filters_by_role_and_class() {
    let app = spawn_app();
    let rosa = teacher(&app.server, "Rosa", "rosa@colegio.pe").await;
    let code = create_class(&app.server, &rosa, "5A").await;
    student(&app.server, "Ana", "ana@colegio.pe", Some(&code)).await;
    student(&app.server, "Bo", "bo@colegio.pe", None).await;

    let all = data(&get(&app.server, "/api/users", &rosa.token).await);
    assert_eq!(all["count"], 3);
    let students = data(&get(&app.server, "/api/users?role=student", &rosa.token).await);
    assert_eq!(students["count"], 2);
    let in_class = data(&get(&app.server, &format!("/api/users?classCode={}", code.to_lowercase()), &rosa.token).await);
    assert_eq!(in_class["count"], 1);
    assert_eq!(in_class["users"][0]["name"], "Ana");

    let bad = get(&app.server, "/api/users?role=admin", &rosa.token).await;
    assert_status(&bad, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn deleting_a_student_removes_their_records() {
    let app = spawn_app();
    let rosa = teacher(&app.server, "Rosa", "rosa@colegio.pe").await;
    let code = create_class(&app.server, &rosa, "5A").await;
    let ana = student(&app.server, "Ana", "ana@colegio.pe", Some(&code)).await;
    test_support::post(&app.server, "/api/surveys", &ana.token, json!({ "surveyType": "daily", "moodScore": 2 })).await;
    test_support::post(&app.server, "/api/messages", &ana.token, json!({ "content": "help" })).await;

    let response = test_support::delete(&app.server, &format!("/api/users/{}", ana.id), &rosa.token).await;
    assert_status(&response, StatusCode::OK);

    let conn = app.state.db.lock();
    for table in ["survey_responses", "anonymous_messages"] {
        let n: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
            .expect("count");
        assert_eq!(n, 0, "{table}");
    }
    let alerts: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM teacher_notifications WHERE student_id IS NOT NULL",
            [],
            |r| r.get(0),
        )
        .expect("count");
    assert_eq!(alerts, 0);
}

#[tokio::test]
async fn teacher_deleting_themself_releases_their_class() {
    let app = spawn_app();
    let rosa = teacher(&app.server, "Rosa", "rosa@colegio.pe").await;
    let code = create_class(&app.server, &rosa, "5A").await;
    let ana = student(&app.server, "Ana", "ana@colegio.pe", Some(&code)).await;
    test_support::post(&app.server, "/api/messages", &ana.token, json!({ "content": "hola" })).await;
    test_support::post(
        &app.server,
        "/api/rewards",
        &rosa.token,
        json!({ "studentId": ana.id, "title": "Helper", "points": 3 }),
    )
    .await;

    let response = test_support::delete(&app.server, &format!("/api/users/{}", rosa.id), &rosa.token).await;
    assert_status(&response, StatusCode::OK);

    let me = data(&get(&app.server, "/api/auth/me", &ana.token).await);
    assert_eq!(me["classCode"], Value::Null);
    let gone = get(&app.server, "/api/auth/me", &rosa.token).await;
    assert_status(&gone, StatusCode::UNAUTHORIZED);

    let conn = app.state.db.lock();
    for table in ["classes", "anonymous_messages", "student_rewards"] {
        let n: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
            .expect("count");
        assert_eq!(n, 0, "{table}");
    }
}

async fn broken_rewards_response(app: &test_support::TestApp) -> Value {
    let ana = student(&app.server, "Ana", "ana@colegio.pe", None).await;
    app.state
        .db
        .lock()
        .execute("DROP TABLE student_rewards", [])
        .expect("drop");
    let response = get(&app.server, "/api/rewards/mine", &ana.token).await;
    assert_status(&response, StatusCode::INTERNAL_SERVER_ERROR);
    response.json()
}

#[tokio::test]
async fn server_errors_show_detail_only_in_development() {
    let app = spawn_app();
    let body = broken_rewards_response(&app).await;
    assert_eq!(body["message"], "Server error");
    let detail = body["error"].as_str().expect("detail");
    assert!(detail.contains("student_rewards"), "{detail}");
}

#[tokio::test]
async fn production_router_hides_server_error_detail() {
    let config = Config {
        environment: Environment::Production,
        jwt_secret: "a-production-secret-that-is-long-enough".into(),
        ..Config::in_memory()
    };
    let app = spawn_app_with_config(config, RecordingNotifier::default());
    let body = broken_rewards_response(&app).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Server error");
    assert_eq!(body["error"], Value::Null);

    // Building the router directly must not expose detail either.
    let direct = axum_test::TestServer::new(munayd::api::router::create_router(app.state.clone()))
        .expect("server");
    let ana = data(
        &direct
            .post("/api/auth/login")
            .json(&json!({ "email": "ana@colegio.pe", "password": test_support::PASSWORD }))
            .await,
    );
    let token = ana["token"].as_str().expect("token");
    let response = get(&direct, "/api/rewards/mine", token).await;
    assert_status(&response, StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json();
    assert_eq!(body["error"], Value::Null);
}
