//! Explicitly registered clients (institutions) and roster import.
//!
//! `total_users`, `total_students` and `total_teachers` are running counters
//! bumped by import only. Deleting a user does not decrement them, so they
//! can drift from the live count reported as `actualUsers`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{optional_text, required_text, validated};
use crate::api::error::{ok, ok_message, ApiError, ApiResult, JsonBody};
use crate::api::types::{AppState, AuthUser};
use crate::ids::{generate_id, now_rfc3339};
use crate::import::{apply_import, is_valid_email, parse_roster_csv, ImportRow};
use crate::models::{Client, CLIENT_COLUMNS};

const CLIENT_STATUSES: [&str; 3] = ["active", "trial", "inactive"];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientBody {
    pub name: Option<String>,
    pub domain: Option<String>,
    pub contact_name: Option<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ImportBody {
    pub csv: Option<String>,
    pub users: Option<Vec<ImportRow>>,
}

fn check_fields(errors: &mut Vec<String>, body: &ClientBody) {
    if let Some(email) = optional_text(body.contact_email.as_deref()) {
        if !is_valid_email(&email) {
            errors.push("contactEmail must be a valid email address".to_string());
        }
    }
    if let Some(status) = optional_text(body.status.as_deref()) {
        if !CLIENT_STATUSES.contains(&status.as_str()) {
            errors.push(format!("status must be one of {}", CLIENT_STATUSES.join(", ")));
        }
    }
}

fn normalized_domain(domain: Option<&str>) -> Option<String> {
    optional_text(domain).map(|d| d.trim_start_matches('@').to_ascii_lowercase())
}

fn actual_users(conn: &Connection, client_id: &str) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM users WHERE client_id = ?",
        [client_id],
        |r| r.get(0),
    )
}

fn client_detail(conn: &Connection, client: Client) -> rusqlite::Result<Value> {
    let actual = actual_users(conn, &client.id)?;
    let mut value = json!(client);
    value["actualUsers"] = json!(actual);
    Ok(value)
}

pub async fn list_clients(State(state): State<AppState>) -> ApiResult {
    let conn = state.db.lock();
    let mut stmt = conn.prepare(&format!("SELECT {CLIENT_COLUMNS} FROM clients ORDER BY name"))?;
    let rows = stmt
        .query_map([], Client::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ok(rows))
}

pub async fn create_client(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    JsonBody(body): JsonBody<ClientBody>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let mut errors = Vec::new();
    let name = required_text(&mut errors, "name", body.name.as_deref());
    check_fields(&mut errors, &body);
    validated(errors)?;

    let conn = state.db.lock();
    let id = generate_id();
    let now = now_rfc3339();
    conn.execute(
        "INSERT INTO clients(id, name, domain, contact_name, contact_email, contact_phone, status, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &name,
            normalized_domain(body.domain.as_deref()),
            optional_text(body.contact_name.as_deref()),
            optional_text(body.contact_email.as_deref()),
            optional_text(body.contact_phone.as_deref()),
            optional_text(body.status.as_deref()).unwrap_or_else(|| "active".to_string()),
            &now,
            &now,
        ),
    )?;
    tracing::info!(client_id = %id, created_by = %user.id, "client created");
    let client = Client::find_by_id(&conn, &id)?.ok_or_else(|| ApiError::not_found("Client"))?;
    Ok((StatusCode::CREATED, ok(client)))
}

pub async fn get_client(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let conn = state.db.lock();
    let client = Client::find_by_id(&conn, &id)?.ok_or_else(|| ApiError::not_found("Client"))?;
    Ok(ok(client_detail(&conn, client)?))
}

pub async fn update_client(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<ClientBody>,
) -> ApiResult {
    let mut errors = Vec::new();
    if body.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        errors.push("name must not be empty".to_string());
    }
    check_fields(&mut errors, &body);
    validated(errors)?;

    let conn = state.db.lock();
    let changed = conn.execute(
        "UPDATE clients
         SET name = COALESCE(?, name),
             domain = COALESCE(?, domain),
             contact_name = COALESCE(?, contact_name),
             contact_email = COALESCE(?, contact_email),
             contact_phone = COALESCE(?, contact_phone),
             status = COALESCE(?, status),
             updated_at = ?
         WHERE id = ?",
        (
            optional_text(body.name.as_deref()),
            normalized_domain(body.domain.as_deref()),
            optional_text(body.contact_name.as_deref()),
            optional_text(body.contact_email.as_deref()),
            optional_text(body.contact_phone.as_deref()),
            optional_text(body.status.as_deref()),
            now_rfc3339(),
            &id,
        ),
    )?;
    if changed == 0 {
        return Err(ApiError::not_found("Client"));
    }
    let client = Client::find_by_id(&conn, &id)?.ok_or_else(|| ApiError::not_found("Client"))?;
    Ok(ok(client_detail(&conn, client)?))
}

/// Users keep their accounts; only the link to the client is cleared.
pub async fn delete_client(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let conn = state.db.lock();
    if Client::find_by_id(&conn, &id)?.is_none() {
        return Err(ApiError::not_found("Client"));
    }
    let tx = conn.unchecked_transaction()?;
    let released = tx.execute("UPDATE users SET client_id = NULL WHERE client_id = ?", [&id])?;
    tx.execute("DELETE FROM clients WHERE id = ?", [&id])?;
    tx.commit()?;
    tracing::info!(client_id = %id, released, "client deleted");
    Ok(ok_message("Client deleted", json!({ "releasedUsers": released })))
}

/// Accepts either CSV text or a JSON `users` array. Password hashing makes
/// this slow, so it runs on the blocking pool and only holds the connection
/// for each row's SQL.
pub async fn import_users(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<ImportBody>,
) -> ApiResult {
    let rows = match (body.csv.as_deref(), body.users) {
        (Some(csv), _) if !csv.trim().is_empty() => parse_roster_csv(csv),
        (_, Some(users)) => users,
        _ => {
            return Err(ApiError::BadRequest(
                "Provide either csv text or a users array".into(),
            ))
        }
    };
    if rows.is_empty() {
        return Err(ApiError::BadRequest("No rows to import".into()));
    }

    {
        let conn = state.db.lock();
        if Client::find_by_id(&conn, &id)?.is_none() {
            return Err(ApiError::not_found("Client"));
        }
    }

    let db = state.db.clone();
    let passwords = state.passwords.clone();
    let client_id = id.clone();
    let summary = tokio::task::spawn_blocking(move || apply_import(&db, &passwords, &client_id, &rows))
    .await
    .map_err(|e| ApiError::Internal(format!("import task failed: {e}")))??;

    tracing::info!(
        client_id = %id,
        imported_by = %user.id,
        total = summary.total,
        created = summary.created.len(),
        skipped = summary.skipped.len(),
        errors = summary.errors.len(),
        "roster import finished"
    );
    Ok(ok(summary))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_is_stored_without_at_sign() {
        assert_eq!(normalized_domain(Some(" @School.EDU ")), Some("school.edu".into()));
        assert_eq!(normalized_domain(Some("  ")), None);
        assert_eq!(normalized_domain(None), None);
    }

    #[test]
    fn contact_email_and_status_are_checked() {
        let body = ClientBody {
            name: Some("Colegio".into()),
            domain: None,
            contact_name: None,
            contact_email: Some("nope".into()),
            contact_phone: None,
            status: Some("paused".into()),
        };
        let mut errors = Vec::new();
        check_fields(&mut errors, &body);
        assert_eq!(errors.len(), 2);
    }
}
