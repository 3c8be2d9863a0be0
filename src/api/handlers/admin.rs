//! Admin dashboard. The configured owner account sees every domain; any
//! other teacher sees only the domain of their own email.

use axum::extract::State;
use rusqlite::Connection;
use serde_json::{json, Value};

use crate::api::error::{ok, ApiError, ApiResult};
use crate::api::types::{AppState, AuthUser};
use crate::models::{DemoRequest, User, DEMO_REQUEST_COLUMNS};
use crate::stats::{self, Scope};

const RECENT_DEMO_REQUESTS: i64 = 10;

/// Domains visible to the caller.
fn visible_domains(state: &AppState, conn: &Connection, user: &User) -> Result<Vec<String>, ApiError> {
    if state.is_owner(user) {
        return Ok(stats::teacher_domains(conn)?);
    }
    Ok(user.email_domain().into_iter().collect())
}

pub async fn dashboard(State(state): State<AppState>, AuthUser(user): AuthUser) -> ApiResult {
    let is_owner = state.is_owner(&user);
    let conn = state.db.lock();
    let domains = visible_domains(&state, &conn, &user)?
        .iter()
        .map(|d| stats::domain_stats(&conn, d))
        .collect::<Result<Vec<_>, _>>()?;

    let (totals, wellbeing) = if is_owner {
        let inputs = stats::wellbeing_inputs(&conn, Scope::All)?;
        (Some(stats::totals(&conn)?), inputs)
    } else {
        let domain = user.email_domain().unwrap_or_default();
        (None, stats::wellbeing_inputs(&conn, Scope::Domain(&domain))?)
    };
    tracing::debug!(user_id = %user.id, is_owner, domains = domains.len(), "dashboard built");

    Ok(ok(json!({
        "isOwner": is_owner,
        "totals": totals,
        "domains": domains,
        "wellbeing": {
            "inputs": wellbeing,
            "score": wellbeing.score(),
        },
    })))
}

/// Tenants inferred from teacher email domains, with their teachers.
pub async fn clients(State(state): State<AppState>, AuthUser(user): AuthUser) -> ApiResult {
    let conn = state.db.lock();
    let mut out = Vec::new();
    for domain in visible_domains(&state, &conn, &user)? {
        let mut stmt = conn.prepare(
            "SELECT id, name, email, last_login FROM users
             WHERE role = 'teacher' AND email LIKE '%@' || ?
             ORDER BY name",
        )?;
        let teachers = stmt
            .query_map([&domain], |r| {
                Ok(json!({
                    "id": r.get::<_, String>(0)?,
                    "name": r.get::<_, String>(1)?,
                    "email": r.get::<_, String>(2)?,
                    "lastLogin": r.get::<_, Option<String>>(3)?,
                }))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        let stats = stats::domain_stats(&conn, &domain)?;
        out.push(json!({
            "domain": domain,
            "stats": stats,
            "teachers": teachers,
        }));
    }
    Ok(ok(out))
}

pub async fn wellbeing(State(state): State<AppState>, AuthUser(user): AuthUser) -> ApiResult {
    let is_owner = state.is_owner(&user);
    let domain = user.email_domain().unwrap_or_default();
    let conn = state.db.lock();

    let overall = if is_owner {
        stats::wellbeing_inputs(&conn, Scope::All)?
    } else {
        stats::wellbeing_inputs(&conn, Scope::Domain(&domain))?
    };

    let mut stmt = conn.prepare(
        "SELECT c.code, c.name, t.name
         FROM classes c
         JOIN users t ON t.id = c.teacher_id
         WHERE ?1 = 1 OR t.email LIKE '%@' || ?2
         ORDER BY c.name",
    )?;
    let classes = stmt
        .query_map((is_owner, &domain), |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut per_class = Vec::with_capacity(classes.len());
    for (code, name, teacher_name) in classes {
        let inputs = stats::wellbeing_inputs(&conn, Scope::Class(&code))?;
        per_class.push(json!({
            "classCode": code,
            "name": name,
            "teacherName": teacher_name,
            "inputs": inputs,
            "score": inputs.score(),
        }));
    }

    Ok(ok(json!({
        "scope": if is_owner { "all".to_string() } else { domain },
        "overall": {
            "inputs": overall,
            "score": overall.score(),
        },
        "classes": per_class,
    })))
}

pub async fn demo_requests_overview(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> ApiResult {
    if !state.is_owner(&user) {
        return Err(ApiError::Forbidden(
            "Only the platform owner can view demo requests here".into(),
        ));
    }
    let conn = state.db.lock();
    let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM demo_requests GROUP BY status")?;
    let mut by_status = serde_json::Map::new();
    for status in super::demo_requests::STATUSES {
        by_status.insert(status.to_string(), json!(0));
    }
    let counts = stmt
        .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    let mut total = 0;
    for (status, n) in counts {
        total += n;
        by_status.insert(status, json!(n));
    }

    let mut stmt = conn.prepare(&format!(
        "SELECT {DEMO_REQUEST_COLUMNS} FROM demo_requests ORDER BY created_at DESC LIMIT ?"
    ))?;
    let recent = stmt
        .query_map([RECENT_DEMO_REQUESTS], DemoRequest::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ok(json!({
        "total": total,
        "byStatus": Value::Object(by_status),
        "recent": recent,
    })))
}
