mod test_support;

use axum::http::StatusCode;
use serde_json::{json, Value};
use test_support::{assert_status, create_class, delete, get, post, put, spawn_app, student, teacher};

const TEACHER_GETS: &[&str] = &[
    "/api/users",
    "/api/classes/ABC123/students",
    "/api/surveys/class/ABC123",
    "/api/activities/student/x",
    "/api/notifications",
    "/api/notifications/unread-count",
    "/api/rewards/student/x",
    "/api/growth-spaces/student/x",
    "/api/admin/dashboard",
    "/api/admin/clients",
    "/api/admin/wellbeing",
    "/api/admin/demo-requests",
    "/api/clients",
    "/api/clients/x",
    "/api/demo-requests",
    "/api/messages",
];

#[tokio::test]
async fn students_get_403_on_every_teacher_route() {
    let app = spawn_app();
    let ana = student(&app.server, "Ana", "ana@colegio.pe", None).await;

    for path in TEACHER_GETS {
        let response = get(&app.server, path, &ana.token).await;
        assert_status(&response, StatusCode::FORBIDDEN);
        let body: Value = response.json();
        assert_eq!(
            body["message"], "Role 'student' is not authorized to access this route",
            "{path}"
        );
    }

    let writes = [
        post(&app.server, "/api/classes", &ana.token, json!({ "name": "x" })).await,
        post(&app.server, "/api/notifications", &ana.token, json!({})).await,
        post(&app.server, "/api/rewards", &ana.token, json!({})).await,
        post(&app.server, "/api/clients", &ana.token, json!({ "name": "x" })).await,
        post(&app.server, "/api/clients/x/import", &ana.token, json!({})).await,
        put(&app.server, "/api/messages/x/read", &ana.token, json!({})).await,
        put(&app.server, "/api/messages/x/reply", &ana.token, json!({ "reply": "hi" })).await,
        put(&app.server, "/api/notifications/read-all", &ana.token, json!({})).await,
        put(&app.server, "/api/demo-requests/x/status", &ana.token, json!({ "status": "closed" })).await,
        delete(&app.server, "/api/rewards/x", &ana.token).await,
        delete(&app.server, "/api/users/x", &ana.token).await,
        delete(&app.server, "/api/clients/x", &ana.token).await,
    ];
    for response in writes {
        assert_status(&response, StatusCode::FORBIDDEN);
    }
}

#[tokio::test]
async fn teachers_get_403_on_student_routes() {
    let app = spawn_app();
    let rosa = teacher(&app.server, "Rosa", "rosa@colegio.pe").await;

    for path in [
        "/api/surveys/mine",
        "/api/activities/mine",
        "/api/messages/mine",
        "/api/rewards/mine",
        "/api/growth-spaces/mine",
    ] {
        let response = get(&app.server, path, &rosa.token).await;
        assert_status(&response, StatusCode::FORBIDDEN);
    }
    let response = post(&app.server, "/api/messages", &rosa.token, json!({ "content": "hi" })).await;
    assert_status(&response, StatusCode::FORBIDDEN);
    let response = post(&app.server, "/api/surveys", &rosa.token, json!({ "surveyType": "daily", "moodScore": 5 })).await;
    assert_status(&response, StatusCode::FORBIDDEN);

    for (path, body) in [
        ("/api/classes/join", json!({ "classCode": "ABC123" })),
        ("/api/classes/leave", json!({})),
        ("/api/activities", json!({ "activityType": "quiz", "title": "Quiz", "score": 50 })),
        ("/api/growth-spaces", json!({ "title": "Notes", "content": "x" })),
    ] {
        let response = post(&app.server, path, &rosa.token, body).await;
        assert_status(&response, StatusCode::FORBIDDEN);
    }
}

#[tokio::test]
async fn auth_is_checked_before_role() {
    let app = spawn_app();
    let response = app.server.get("/api/admin/dashboard").await;
    assert_status(&response, StatusCode::UNAUTHORIZED);
    let response = app.server.post("/api/surveys").json(&json!({})).await;
    assert_status(&response, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn teachers_only_reach_their_own_students() {
    let app = spawn_app();
    let rosa = teacher(&app.server, "Rosa", "rosa@colegio.pe").await;
    let luis = teacher(&app.server, "Luis", "luis@colegio.pe").await;
    let code = create_class(&app.server, &rosa, "5A").await;
    let ana = student(&app.server, "Ana", "ana@colegio.pe", Some(&code)).await;

    let own = get(&app.server, &format!("/api/activities/student/{}", ana.id), &rosa.token).await;
    assert_status(&own, StatusCode::OK);

    let other = get(&app.server, &format!("/api/activities/student/{}", ana.id), &luis.token).await;
    assert_status(&other, StatusCode::FORBIDDEN);
    let other = get(&app.server, &format!("/api/classes/{code}/students"), &luis.token).await;
    assert_status(&other, StatusCode::FORBIDDEN);
    let other = delete(&app.server, &format!("/api/users/{}", ana.id), &luis.token).await;
    assert_status(&other, StatusCode::FORBIDDEN);
    let teacher_target = delete(&app.server, &format!("/api/users/{}", luis.id), &rosa.token).await;
    assert_status(&teacher_target, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn students_only_see_themselves_and_their_teacher() {
    let app = spawn_app();
    let rosa = teacher(&app.server, "Rosa", "rosa@colegio.pe").await;
    let code = create_class(&app.server, &rosa, "5A").await;
    let ana = student(&app.server, "Ana", "ana@colegio.pe", Some(&code)).await;
    let bo = student(&app.server, "Bo", "bo@colegio.pe", Some(&code)).await;

    assert_status(&get(&app.server, &format!("/api/users/{}", ana.id), &ana.token).await, StatusCode::OK);
    assert_status(&get(&app.server, &format!("/api/users/{}", rosa.id), &ana.token).await, StatusCode::OK);
    assert_status(
        &get(&app.server, &format!("/api/users/{}", bo.id), &ana.token).await,
        StatusCode::FORBIDDEN,
    );
    assert_status(
        &put(&app.server, &format!("/api/users/{}", bo.id), &ana.token, json!({ "name": "B" })).await,
        StatusCode::FORBIDDEN,
    );
}
