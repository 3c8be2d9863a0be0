use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use rusqlite::Row;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{
    check_range, json_text, parse_json_text, require_taught_student, required_text, validated,
};
use crate::api::error::{ok, ApiResult, JsonBody};
use crate::api::types::{AppState, AuthUser};
use crate::ids::{generate_id, now_rfc3339};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityBody {
    pub activity_type: Option<String>,
    pub title: Option<String>,
    pub score: Option<f64>,
    pub duration_minutes: Option<i64>,
    #[serde(default)]
    pub data: Value,
}

const ACTIVITY_COLUMNS: &str =
    "id, user_id, activity_type, title, score, duration_minutes, data, completed_at";

fn activity_json(row: &Row<'_>) -> rusqlite::Result<Value> {
    Ok(json!({
        "id": row.get::<_, String>(0)?,
        "userId": row.get::<_, String>(1)?,
        "activityType": row.get::<_, String>(2)?,
        "title": row.get::<_, String>(3)?,
        "score": row.get::<_, Option<f64>>(4)?,
        "durationMinutes": row.get::<_, Option<i64>>(5)?,
        "data": parse_json_text(&row.get::<_, String>(6)?),
        "completedAt": row.get::<_, String>(7)?,
    }))
}

pub async fn create_activity(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    JsonBody(body): JsonBody<ActivityBody>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let mut errors = Vec::new();
    let activity_type = required_text(&mut errors, "activityType", body.activity_type.as_deref());
    let title = required_text(&mut errors, "title", body.title.as_deref());
    check_range(&mut errors, "score", body.score, 0.0, 100.0);
    if body.duration_minutes.is_some_and(|d| d < 0) {
        errors.push("durationMinutes must not be negative".to_string());
    }
    validated(errors)?;
    let data = if body.data.is_null() { json!({}) } else { body.data };

    let conn = state.db.lock();
    let id = generate_id();
    conn.execute(
        "INSERT INTO student_activities(id, user_id, activity_type, title, score, duration_minutes, data, completed_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &user.id,
            &activity_type,
            &title,
            body.score,
            body.duration_minutes,
            json_text(&data),
            now_rfc3339(),
        ),
    )?;
    let created = conn.query_row(
        &format!("SELECT {ACTIVITY_COLUMNS} FROM student_activities WHERE id = ?"),
        [&id],
        activity_json,
    )?;
    Ok((StatusCode::CREATED, ok(created)))
}

fn activities_for(conn: &rusqlite::Connection, user_id: &str) -> rusqlite::Result<Value> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ACTIVITY_COLUMNS} FROM student_activities
         WHERE user_id = ?
         ORDER BY completed_at DESC"
    ))?;
    let rows = stmt
        .query_map([user_id], activity_json)?
        .collect::<Result<Vec<_>, _>>()?;
    let average: Option<f64> = conn.query_row(
        "SELECT AVG(score) FROM student_activities WHERE user_id = ?",
        [user_id],
        |r| r.get(0),
    )?;
    Ok(json!({
        "count": rows.len(),
        "averageScore": average.map(crate::stats::round_off_1_decimal),
        "activities": rows,
    }))
}

pub async fn my_activities(State(state): State<AppState>, AuthUser(user): AuthUser) -> ApiResult {
    let conn = state.db.lock();
    Ok(ok(activities_for(&conn, &user.id)?))
}

pub async fn student_activities(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(student_id): Path<String>,
) -> ApiResult {
    let conn = state.db.lock();
    let student = require_taught_student(&conn, &user, &student_id)?;
    let mut body = activities_for(&conn, &student.id)?;
    body["studentName"] = json!(student.name);
    Ok(ok(body))
}
