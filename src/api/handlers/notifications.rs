use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{optional_text, required_text, validated};
use crate::api::error::{ok, ok_message, ApiError, ApiResult, JsonBody};
use crate::api::types::{AppState, AuthUser};
use crate::ids::{generate_id, now_rfc3339};

pub const PRIORITIES: [&str; 3] = ["low", "normal", "high"];

#[derive(Debug, Default, Deserialize)]
pub struct NotificationFilter {
    pub unread: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNotificationBody {
    pub title: Option<String>,
    pub message: Option<String>,
    pub kind: Option<String>,
    pub priority: Option<String>,
    pub student_id: Option<String>,
}

pub struct NewNotification<'a> {
    pub teacher_id: &'a str,
    pub student_id: Option<&'a str>,
    pub kind: &'a str,
    pub title: &'a str,
    pub message: &'a str,
    pub priority: &'a str,
}

pub fn insert_notification(conn: &Connection, n: &NewNotification<'_>) -> rusqlite::Result<String> {
    let id = generate_id();
    conn.execute(
        "INSERT INTO teacher_notifications(id, teacher_id, student_id, kind, title, message, priority, is_read, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, 0, ?)",
        (
            &id,
            n.teacher_id,
            n.student_id,
            n.kind,
            n.title,
            n.message,
            n.priority,
            now_rfc3339(),
        ),
    )?;
    Ok(id)
}

const NOTIFICATION_SELECT: &str = "SELECT
       n.id, n.student_id, s.name, n.kind, n.title, n.message, n.priority, n.is_read, n.created_at
     FROM teacher_notifications n
     LEFT JOIN users s ON s.id = n.student_id";

fn notification_json(row: &Row<'_>) -> rusqlite::Result<Value> {
    Ok(json!({
        "id": row.get::<_, String>(0)?,
        "studentId": row.get::<_, Option<String>>(1)?,
        "studentName": row.get::<_, Option<String>>(2)?,
        "kind": row.get::<_, String>(3)?,
        "title": row.get::<_, String>(4)?,
        "message": row.get::<_, String>(5)?,
        "priority": row.get::<_, String>(6)?,
        "isRead": row.get::<_, bool>(7)?,
        "createdAt": row.get::<_, String>(8)?,
    }))
}

pub async fn list_notifications(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(filter): Query<NotificationFilter>,
) -> ApiResult {
    let only_unread = filter.unread.unwrap_or(false);
    let conn = state.db.lock();
    let mut stmt = conn.prepare(&format!(
        "{NOTIFICATION_SELECT}
         WHERE n.teacher_id = ? AND (? = 0 OR n.is_read = 0)
         ORDER BY n.created_at DESC"
    ))?;
    let rows = stmt
        .query_map((&user.id, only_unread), notification_json)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ok(rows))
}

pub async fn unread_count(State(state): State<AppState>, AuthUser(user): AuthUser) -> ApiResult {
    let conn = state.db.lock();
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM teacher_notifications WHERE teacher_id = ? AND is_read = 0",
        [&user.id],
        |r| r.get(0),
    )?;
    Ok(ok(json!({ "count": count })))
}

/// Teachers can leave themselves reminders, optionally about a student.
pub async fn create_notification(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    JsonBody(body): JsonBody<CreateNotificationBody>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let mut errors = Vec::new();
    let title = required_text(&mut errors, "title", body.title.as_deref());
    let message = required_text(&mut errors, "message", body.message.as_deref());
    let priority = optional_text(body.priority.as_deref()).unwrap_or_else(|| "normal".to_string());
    if !PRIORITIES.contains(&priority.as_str()) {
        errors.push("priority must be low, normal or high".to_string());
    }
    validated(errors)?;
    let kind = optional_text(body.kind.as_deref()).unwrap_or_else(|| "reminder".to_string());
    let student_id = optional_text(body.student_id.as_deref());

    let conn = state.db.lock();
    if let Some(sid) = student_id.as_deref() {
        super::require_taught_student(&conn, &user, sid)?;
    }
    let id = insert_notification(
        &conn,
        &NewNotification {
            teacher_id: &user.id,
            student_id: student_id.as_deref(),
            kind: &kind,
            title: &title,
            message: &message,
            priority: &priority,
        },
    )?;
    let created = conn.query_row(
        &format!("{NOTIFICATION_SELECT} WHERE n.id = ?"),
        [&id],
        notification_json,
    )?;
    Ok((StatusCode::CREATED, ok(created)))
}

fn owned_notification(conn: &Connection, teacher_id: &str, id: &str) -> Result<(), ApiError> {
    let owner: Option<String> = conn
        .query_row(
            "SELECT teacher_id FROM teacher_notifications WHERE id = ?",
            [id],
            |r| r.get(0),
        )
        .optional()?;
    match owner {
        Some(owner) if owner == teacher_id => Ok(()),
        _ => Err(ApiError::not_found("Notification")),
    }
}

pub async fn mark_read(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult {
    let conn = state.db.lock();
    owned_notification(&conn, &user.id, &id)?;
    conn.execute(
        "UPDATE teacher_notifications SET is_read = 1 WHERE id = ?",
        [&id],
    )?;
    let updated = conn.query_row(
        &format!("{NOTIFICATION_SELECT} WHERE n.id = ?"),
        [&id],
        notification_json,
    )?;
    Ok(ok(updated))
}

pub async fn mark_all_read(State(state): State<AppState>, AuthUser(user): AuthUser) -> ApiResult {
    let conn = state.db.lock();
    let updated = conn.execute(
        "UPDATE teacher_notifications SET is_read = 1 WHERE teacher_id = ? AND is_read = 0",
        [&user.id],
    )?;
    Ok(ok_message(
        "All notifications marked as read",
        json!({ "updated": updated }),
    ))
}

pub async fn delete_notification(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult {
    let conn = state.db.lock();
    owned_notification(&conn, &user.id, &id)?;
    conn.execute("DELETE FROM teacher_notifications WHERE id = ?", [&id])?;
    Ok(ok_message("Notification deleted", Value::Null))
}
