use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{optional_text, require_taught_student, required_text, validated};
use crate::api::error::{ok, ok_message, ApiError, ApiResult, JsonBody};
use crate::api::types::{AppState, AuthUser};
use crate::ids::{generate_id, now_rfc3339};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardBody {
    pub student_id: Option<String>,
    pub reward_type: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub points: Option<i64>,
}

const REWARD_SELECT: &str = "SELECT
       w.id, w.user_id, w.awarded_by, t.name, w.reward_type, w.title, w.description, w.points, w.created_at
     FROM student_rewards w
     JOIN users t ON t.id = w.awarded_by";

fn reward_json(row: &Row<'_>) -> rusqlite::Result<Value> {
    Ok(json!({
        "id": row.get::<_, String>(0)?,
        "userId": row.get::<_, String>(1)?,
        "awardedBy": row.get::<_, String>(2)?,
        "awardedByName": row.get::<_, String>(3)?,
        "rewardType": row.get::<_, String>(4)?,
        "title": row.get::<_, String>(5)?,
        "description": row.get::<_, Option<String>>(6)?,
        "points": row.get::<_, i64>(7)?,
        "createdAt": row.get::<_, String>(8)?,
    }))
}

fn rewards_for(conn: &Connection, user_id: &str) -> rusqlite::Result<Value> {
    let mut stmt = conn.prepare(&format!(
        "{REWARD_SELECT} WHERE w.user_id = ? ORDER BY w.created_at DESC"
    ))?;
    let rows = stmt
        .query_map([user_id], reward_json)?
        .collect::<Result<Vec<_>, _>>()?;
    let total: i64 = conn.query_row(
        "SELECT COALESCE(SUM(points), 0) FROM student_rewards WHERE user_id = ?",
        [user_id],
        |r| r.get(0),
    )?;
    Ok(json!({ "totalPoints": total, "rewards": rows }))
}

pub async fn award_reward(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    JsonBody(body): JsonBody<RewardBody>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let mut errors = Vec::new();
    let student_id = required_text(&mut errors, "studentId", body.student_id.as_deref());
    let title = required_text(&mut errors, "title", body.title.as_deref());
    let points = body.points.unwrap_or(0);
    if points < 0 {
        errors.push("points must not be negative".to_string());
    }
    validated(errors)?;
    let reward_type = optional_text(body.reward_type.as_deref()).unwrap_or_else(|| "badge".to_string());

    let conn = state.db.lock();
    let student = require_taught_student(&conn, &user, &student_id)?;
    let id = generate_id();
    conn.execute(
        "INSERT INTO student_rewards(id, user_id, awarded_by, reward_type, title, description, points, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &student.id,
            &user.id,
            &reward_type,
            &title,
            optional_text(body.description.as_deref()),
            points,
            now_rfc3339(),
        ),
    )?;
    tracing::info!(student_id = %student.id, teacher_id = %user.id, points, "reward awarded");
    let created = conn.query_row(&format!("{REWARD_SELECT} WHERE w.id = ?"), [&id], reward_json)?;
    Ok((StatusCode::CREATED, ok(created)))
}

pub async fn my_rewards(State(state): State<AppState>, AuthUser(user): AuthUser) -> ApiResult {
    let conn = state.db.lock();
    Ok(ok(rewards_for(&conn, &user.id)?))
}

pub async fn student_rewards(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(student_id): Path<String>,
) -> ApiResult {
    let conn = state.db.lock();
    let student = require_taught_student(&conn, &user, &student_id)?;
    Ok(ok(rewards_for(&conn, &student.id)?))
}

pub async fn delete_reward(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult {
    let conn = state.db.lock();
    let awarded_by: Option<String> = conn
        .query_row(
            "SELECT awarded_by FROM student_rewards WHERE id = ?",
            [&id],
            |r| r.get(0),
        )
        .optional()?;
    match awarded_by {
        None => return Err(ApiError::not_found("Reward")),
        Some(t) if t != user.id => {
            return Err(ApiError::Forbidden(
                "Only the awarding teacher can remove a reward".into(),
            ))
        }
        Some(_) => {}
    }
    conn.execute("DELETE FROM student_rewards WHERE id = ?", [&id])?;
    Ok(ok_message("Reward removed", Value::Null))
}
