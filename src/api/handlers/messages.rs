//! Anonymous student-to-teacher messages. The sender id is stored for
//! ownership checks but never returned to teachers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Deserialize;
use serde_json::{json, Value};

use super::notifications::{insert_notification, NewNotification};
use super::{class_teacher, optional_text, required_text, validated};
use crate::api::error::{ok, ApiError, ApiResult, JsonBody};
use crate::api::types::{authorize, AppState, AuthUser};
use crate::ids::{generate_id, now_rfc3339};
use crate::models::Role;

const MAX_MESSAGE_LEN: usize = 2000;
const PREVIEW_LEN: usize = 80;

#[derive(Debug, Deserialize)]
pub struct MessageBody {
    pub content: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReplyBody {
    pub reply: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxFilter {
    pub unread: Option<bool>,
    pub class_code: Option<String>,
}

const MESSAGE_COLUMNS: &str =
    "id, class_code, content, category, is_read, reply, replied_at, created_at";

fn message_json(row: &Row<'_>) -> rusqlite::Result<Value> {
    Ok(json!({
        "id": row.get::<_, String>(0)?,
        "classCode": row.get::<_, String>(1)?,
        "content": row.get::<_, String>(2)?,
        "category": row.get::<_, String>(3)?,
        "isRead": row.get::<_, bool>(4)?,
        "reply": row.get::<_, Option<String>>(5)?,
        "repliedAt": row.get::<_, Option<String>>(6)?,
        "createdAt": row.get::<_, String>(7)?,
    }))
}

fn load_message(conn: &Connection, id: &str) -> rusqlite::Result<Option<Value>> {
    conn.query_row(
        &format!("SELECT {MESSAGE_COLUMNS} FROM anonymous_messages WHERE id = ?"),
        [id],
        message_json,
    )
    .optional()
}

fn preview(content: &str) -> String {
    if content.chars().count() <= PREVIEW_LEN {
        content.to_string()
    } else {
        let cut: String = content.chars().take(PREVIEW_LEN).collect();
        format!("{cut}…")
    }
}

pub async fn send_message(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    JsonBody(body): JsonBody<MessageBody>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    authorize(&user, &[Role::Student])?;
    let mut errors = Vec::new();
    let content = required_text(&mut errors, "content", body.content.as_deref());
    if content.chars().count() > MAX_MESSAGE_LEN {
        errors.push(format!("content must be at most {MAX_MESSAGE_LEN} characters"));
    }
    validated(errors)?;
    let category = optional_text(body.category.as_deref()).unwrap_or_else(|| "general".to_string());

    let Some(code) = user.class_code.as_deref() else {
        return Err(ApiError::BadRequest(
            "Join a class before sending messages".into(),
        ));
    };

    let conn = state.db.lock();
    let teacher_id = class_teacher(&conn, code)?.ok_or_else(|| ApiError::not_found("Class"))?;
    let id = generate_id();
    conn.execute(
        "INSERT INTO anonymous_messages(id, sender_id, teacher_id, class_code, content, category, is_read, created_at)
         VALUES(?, ?, ?, ?, ?, ?, 0, ?)",
        (&id, &user.id, &teacher_id, code, &content, &category, now_rfc3339()),
    )?;
    insert_notification(
        &conn,
        &NewNotification {
            teacher_id: &teacher_id,
            student_id: None,
            kind: "message",
            title: "New anonymous message",
            message: &preview(&content),
            priority: "normal",
        },
    )?;

    let created = load_message(&conn, &id)?.ok_or_else(|| ApiError::not_found("Message"))?;
    Ok((StatusCode::CREATED, ok(created)))
}

pub async fn inbox(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(filter): Query<InboxFilter>,
) -> ApiResult {
    authorize(&user, &[Role::Teacher])?;
    let only_unread = filter.unread.unwrap_or(false);
    let class_code = optional_text(filter.class_code.as_deref()).map(|c| c.to_ascii_uppercase());

    let conn = state.db.lock();
    let mut stmt = conn.prepare(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM anonymous_messages
         WHERE teacher_id = ?1
           AND (?2 = 0 OR is_read = 0)
           AND (?3 IS NULL OR class_code = ?3)
         ORDER BY created_at DESC"
    ))?;
    let rows = stmt
        .query_map((&user.id, only_unread, class_code), message_json)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ok(rows))
}

pub async fn my_messages(State(state): State<AppState>, AuthUser(user): AuthUser) -> ApiResult {
    let conn = state.db.lock();
    let mut stmt = conn.prepare(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM anonymous_messages
         WHERE sender_id = ?
         ORDER BY created_at DESC"
    ))?;
    let rows = stmt
        .query_map([&user.id], message_json)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ok(rows))
}

fn require_recipient(conn: &Connection, teacher_id: &str, id: &str) -> Result<(), ApiError> {
    let recipient: Option<String> = conn
        .query_row(
            "SELECT teacher_id FROM anonymous_messages WHERE id = ?",
            [id],
            |r| r.get(0),
        )
        .optional()?;
    match recipient {
        None => Err(ApiError::not_found("Message")),
        Some(t) if t == teacher_id => Ok(()),
        Some(_) => Err(ApiError::Forbidden(
            "Not authorized to access this message".into(),
        )),
    }
}

pub async fn mark_read(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult {
    let conn = state.db.lock();
    require_recipient(&conn, &user.id, &id)?;
    conn.execute("UPDATE anonymous_messages SET is_read = 1 WHERE id = ?", [&id])?;
    let updated = load_message(&conn, &id)?.ok_or_else(|| ApiError::not_found("Message"))?;
    Ok(ok(updated))
}

pub async fn reply(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<ReplyBody>,
) -> ApiResult {
    let mut errors = Vec::new();
    let reply = required_text(&mut errors, "reply", body.reply.as_deref());
    validated(errors)?;

    let conn = state.db.lock();
    require_recipient(&conn, &user.id, &id)?;
    conn.execute(
        "UPDATE anonymous_messages SET reply = ?, replied_at = ?, is_read = 1 WHERE id = ?",
        (&reply, now_rfc3339(), &id),
    )?;
    let updated = load_message(&conn, &id)?.ok_or_else(|| ApiError::not_found("Message"))?;
    Ok(ok(updated))
}
