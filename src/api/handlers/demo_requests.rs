use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use rusqlite::OptionalExtension;
use serde::Deserialize;
use serde_json::Value;

use super::{optional_text, required_text, validated};
use crate::api::error::{ok, ok_message, ApiError, ApiResult, JsonBody};
use crate::api::types::{authorize, AppState, AuthUser};
use crate::ids::{generate_id, now_rfc3339};
use crate::import::is_valid_email;
use crate::models::{DemoRequest, Role, DEMO_REQUEST_COLUMNS};

pub const STATUSES: [&str; 3] = ["pending", "contacted", "closed"];

#[derive(Debug, Deserialize)]
pub struct DemoRequestBody {
    pub name: Option<String>,
    pub email: Option<String>,
    pub school: Option<String>,
    pub role: Option<String>,
    pub phone: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusFilter {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusBody {
    pub status: Option<String>,
}

pub(crate) fn load_demo_request(
    conn: &rusqlite::Connection,
    id: &str,
) -> rusqlite::Result<Option<DemoRequest>> {
    conn.query_row(
        &format!("SELECT {DEMO_REQUEST_COLUMNS} FROM demo_requests WHERE id = ?"),
        [id],
        DemoRequest::from_row,
    )
    .optional()
}

fn parse_status(errors: &mut Vec<String>, value: Option<&str>) -> String {
    let status = value.map(|s| s.trim().to_ascii_lowercase()).unwrap_or_default();
    if !STATUSES.contains(&status.as_str()) {
        errors.push(format!("status must be one of {}", STATUSES.join(", ")));
    }
    status
}

/// Public form submission. The notification email is sent after the row is
/// stored; a delivery failure is logged and the request still succeeds.
pub async fn create_demo_request(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<DemoRequestBody>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let mut errors = Vec::new();
    let name = required_text(&mut errors, "name", body.name.as_deref());
    let email = required_text(&mut errors, "email", body.email.as_deref()).to_ascii_lowercase();
    if !email.is_empty() && !is_valid_email(&email) {
        errors.push("email must be a valid email address".to_string());
    }
    let school = required_text(&mut errors, "school", body.school.as_deref());
    validated(errors)?;

    let request = {
        let conn = state.db.lock();
        let id = generate_id();
        conn.execute(
            "INSERT INTO demo_requests(id, name, email, school, role, phone, message, status, created_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, 'pending', ?)",
            (
                &id,
                &name,
                &email,
                &school,
                optional_text(body.role.as_deref()),
                optional_text(body.phone.as_deref()),
                optional_text(body.message.as_deref()),
                now_rfc3339(),
            ),
        )?;
        load_demo_request(&conn, &id)?.ok_or_else(|| ApiError::not_found("Demo request"))?
    };
    tracing::info!(demo_request_id = %request.id, school = %request.school, "demo request stored");

    if let Err(e) = state.notifier.demo_requested(&request).await {
        tracing::warn!(demo_request_id = %request.id, error = %format!("{e:#}"), "demo request email failed");
    }

    Ok((
        StatusCode::CREATED,
        ok_message("Demo request received", request),
    ))
}

pub async fn list_demo_requests(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(filter): Query<StatusFilter>,
) -> ApiResult {
    authorize(&user, &[Role::Teacher])?;
    let status = optional_text(filter.status.as_deref()).map(|s| s.to_ascii_lowercase());

    let conn = state.db.lock();
    let mut stmt = conn.prepare(&format!(
        "SELECT {DEMO_REQUEST_COLUMNS} FROM demo_requests
         WHERE (?1 IS NULL OR status = ?1)
         ORDER BY created_at DESC"
    ))?;
    let rows = stmt
        .query_map([status], DemoRequest::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ok(rows))
}

pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<StatusBody>,
) -> ApiResult {
    let mut errors = Vec::new();
    let status = parse_status(&mut errors, body.status.as_deref());
    validated(errors)?;

    let conn = state.db.lock();
    let changed = conn.execute(
        "UPDATE demo_requests SET status = ? WHERE id = ?",
        (&status, &id),
    )?;
    if changed == 0 {
        return Err(ApiError::not_found("Demo request"));
    }
    let updated = load_demo_request(&conn, &id)?.ok_or_else(|| ApiError::not_found("Demo request"))?;
    Ok(ok(updated))
}
