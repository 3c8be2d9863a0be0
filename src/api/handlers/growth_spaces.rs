use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{
    check_range, json_text, optional_text, parse_json_text, require_taught_student, required_text,
    teaches, validated,
};
use crate::api::error::{ok, ok_message, ApiError, ApiResult, JsonBody};
use crate::api::types::{AppState, AuthUser};
use crate::ids::{generate_id, now_rfc3339};
use crate::models::{Role, User};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrowthSpaceBody {
    pub title: Option<String>,
    pub content: Option<String>,
    pub mood: Option<String>,
    pub is_private: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisBody {
    pub sentiment_score: Option<f64>,
    pub summary: Option<String>,
    #[serde(default)]
    pub themes: Vec<String>,
}

const SPACE_COLUMNS: &str = "id, user_id, title, content, mood, is_private, created_at, updated_at";

fn space_json(row: &Row<'_>) -> rusqlite::Result<Value> {
    Ok(json!({
        "id": row.get::<_, String>(0)?,
        "userId": row.get::<_, String>(1)?,
        "title": row.get::<_, String>(2)?,
        "content": row.get::<_, String>(3)?,
        "mood": row.get::<_, Option<String>>(4)?,
        "isPrivate": row.get::<_, bool>(5)?,
        "createdAt": row.get::<_, String>(6)?,
        "updatedAt": row.get::<_, String>(7)?,
    }))
}

fn analysis_json(row: &Row<'_>) -> rusqlite::Result<Value> {
    Ok(json!({
        "id": row.get::<_, String>(0)?,
        "growthSpaceId": row.get::<_, String>(1)?,
        "sentimentScore": row.get::<_, f64>(2)?,
        "summary": row.get::<_, Option<String>>(3)?,
        "themes": parse_json_text(&row.get::<_, String>(4)?),
        "createdAt": row.get::<_, String>(5)?,
    }))
}

fn load_space(conn: &Connection, id: &str) -> rusqlite::Result<Option<Value>> {
    conn.query_row(
        &format!("SELECT {SPACE_COLUMNS} FROM growth_spaces WHERE id = ?"),
        [id],
        space_json,
    )
    .optional()
}

enum Access {
    Author,
    Reader,
}

/// Authors have full access; a teacher of the author may read entries that
/// are not private.
fn access(conn: &Connection, user: &User, space: &Value) -> Result<Access, ApiError> {
    let author_id = space["userId"].as_str().unwrap_or_default();
    if author_id == user.id {
        return Ok(Access::Author);
    }
    let is_private = space["isPrivate"].as_bool().unwrap_or(true);
    if user.role == Role::Teacher && !is_private {
        if let Some(author) = User::find_by_id(conn, author_id)? {
            if teaches(conn, &user.id, &author)? {
                return Ok(Access::Reader);
            }
        }
    }
    Err(ApiError::Forbidden(
        "Not authorized to access this growth space".into(),
    ))
}

fn require_author(conn: &Connection, user: &User, id: &str) -> Result<Value, ApiError> {
    let space = load_space(conn, id)?.ok_or_else(|| ApiError::not_found("Growth space"))?;
    match access(conn, user, &space)? {
        Access::Author => Ok(space),
        Access::Reader => Err(ApiError::Forbidden(
            "Only the author can change this growth space".into(),
        )),
    }
}

pub async fn create_space(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    JsonBody(body): JsonBody<GrowthSpaceBody>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let mut errors = Vec::new();
    let title = required_text(&mut errors, "title", body.title.as_deref());
    let content = required_text(&mut errors, "content", body.content.as_deref());
    validated(errors)?;

    let conn = state.db.lock();
    let id = generate_id();
    let now = now_rfc3339();
    conn.execute(
        "INSERT INTO growth_spaces(id, user_id, title, content, mood, is_private, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &user.id,
            &title,
            &content,
            optional_text(body.mood.as_deref()),
            body.is_private.unwrap_or(true),
            &now,
            &now,
        ),
    )?;
    let created = load_space(&conn, &id)?.ok_or_else(|| ApiError::not_found("Growth space"))?;
    Ok((StatusCode::CREATED, ok(created)))
}

pub async fn my_spaces(State(state): State<AppState>, AuthUser(user): AuthUser) -> ApiResult {
    let conn = state.db.lock();
    let mut stmt = conn.prepare(&format!(
        "SELECT {SPACE_COLUMNS} FROM growth_spaces WHERE user_id = ? ORDER BY created_at DESC"
    ))?;
    let rows = stmt
        .query_map([&user.id], space_json)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ok(rows))
}

pub async fn student_spaces(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(student_id): Path<String>,
) -> ApiResult {
    let conn = state.db.lock();
    let student = require_taught_student(&conn, &user, &student_id)?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {SPACE_COLUMNS} FROM growth_spaces
         WHERE user_id = ? AND is_private = 0
         ORDER BY created_at DESC"
    ))?;
    let rows = stmt
        .query_map([&student.id], space_json)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ok(rows))
}

pub async fn get_space(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult {
    let conn = state.db.lock();
    let space = load_space(&conn, &id)?.ok_or_else(|| ApiError::not_found("Growth space"))?;
    access(&conn, &user, &space)?;
    Ok(ok(space))
}

pub async fn update_space(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<GrowthSpaceBody>,
) -> ApiResult {
    let conn = state.db.lock();
    require_author(&conn, &user, &id)?;
    for (field, value) in [("title", &body.title), ("content", &body.content)] {
        if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
            return Err(ApiError::Validation(vec![format!("{field} must not be empty")]));
        }
    }
    conn.execute(
        "UPDATE growth_spaces
         SET title = COALESCE(?, title),
             content = COALESCE(?, content),
             mood = COALESCE(?, mood),
             is_private = COALESCE(?, is_private),
             updated_at = ?
         WHERE id = ?",
        (
            optional_text(body.title.as_deref()),
            optional_text(body.content.as_deref()),
            optional_text(body.mood.as_deref()),
            body.is_private,
            now_rfc3339(),
            &id,
        ),
    )?;
    let updated = load_space(&conn, &id)?.ok_or_else(|| ApiError::not_found("Growth space"))?;
    Ok(ok(updated))
}

pub async fn delete_space(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult {
    let conn = state.db.lock();
    require_author(&conn, &user, &id)?;
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM reflection_analyses WHERE growth_space_id = ?",
        [&id],
    )?;
    tx.execute("DELETE FROM growth_spaces WHERE id = ?", [&id])?;
    tx.commit()?;
    Ok(ok_message("Growth space deleted", Value::Null))
}

pub async fn add_analysis(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<AnalysisBody>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let mut errors = Vec::new();
    match body.sentiment_score {
        None => errors.push("sentimentScore is required".to_string()),
        s => check_range(&mut errors, "sentimentScore", s, 0.0, 10.0),
    }
    validated(errors)?;

    let conn = state.db.lock();
    require_author(&conn, &user, &id)?;
    let analysis_id = generate_id();
    let themes: Vec<String> = body
        .themes
        .iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    conn.execute(
        "INSERT INTO reflection_analyses(id, user_id, growth_space_id, sentiment_score, summary, themes, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &analysis_id,
            &user.id,
            &id,
            body.sentiment_score.unwrap_or_default(),
            optional_text(body.summary.as_deref()),
            json_text(&json!(themes)),
            now_rfc3339(),
        ),
    )?;
    let created = conn.query_row(
        "SELECT id, growth_space_id, sentiment_score, summary, themes, created_at
         FROM reflection_analyses WHERE id = ?",
        [&analysis_id],
        analysis_json,
    )?;
    Ok((StatusCode::CREATED, ok(created)))
}

pub async fn list_analyses(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult {
    let conn = state.db.lock();
    let space = load_space(&conn, &id)?.ok_or_else(|| ApiError::not_found("Growth space"))?;
    access(&conn, &user, &space)?;
    let mut stmt = conn.prepare(
        "SELECT id, growth_space_id, sentiment_score, summary, themes, created_at
         FROM reflection_analyses
         WHERE growth_space_id = ?
         ORDER BY created_at DESC",
    )?;
    let rows = stmt
        .query_map([&id], analysis_json)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ok(rows))
}
