use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{optional_text, required_text, validated};
use crate::api::error::{ok, ok_message, ApiError, ApiResult, JsonBody};
use crate::api::types::{AppState, AuthUser};
use crate::ids::{generate_id, now_rfc3339};
use crate::import::is_valid_email;
use crate::models::{Role, User};

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterBody {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
    pub class_code: Option<String>,
    pub grade: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginBody {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordBody {
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

pub async fn register(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<RegisterBody>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let mut errors = Vec::new();
    let name = required_text(&mut errors, "name", body.name.as_deref());
    let email = required_text(&mut errors, "email", body.email.as_deref()).to_ascii_lowercase();
    if !email.is_empty() && !is_valid_email(&email) {
        errors.push("email must be a valid email address".to_string());
    }
    let password = body.password.unwrap_or_default();
    if password.len() < MIN_PASSWORD_LEN {
        errors.push(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        ));
    }
    let role = match body.role.as_deref() {
        None => Role::Student,
        Some(r) => match Role::parse(r) {
            Some(role) => role,
            None => {
                errors.push("role must be student or teacher".to_string());
                Role::Student
            }
        },
    };
    validated(errors)?;

    let class_code = optional_text(body.class_code.as_deref())
        .filter(|_| role == Role::Student)
        .map(|c| c.to_ascii_uppercase());

    {
        let conn = state.db.lock();
        if User::find_by_email(&conn, &email)?.is_some() {
            return Err(ApiError::Conflict("User already exists".into()));
        }
        if let Some(code) = class_code.as_deref() {
            if super::class_teacher(&conn, code)?.is_none() {
                return Err(ApiError::BadRequest("Invalid class code".into()));
            }
        }
    }

    let hash = state.passwords.hash(&password)?;
    let id = generate_id();
    let now = now_rfc3339();

    let user = {
        let conn = state.db.lock();
        let inserted = conn.execute(
            "INSERT INTO users(id, name, email, password_hash, role, class_code, grade, created_at, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
            (
                &id,
                &name,
                &email,
                &hash,
                role,
                class_code.as_deref(),
                optional_text(body.grade.as_deref()),
                &now,
                &now,
            ),
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(ApiError::Conflict("User already exists".into()));
            }
            Err(e) => return Err(e.into()),
        }
        User::find_by_id(&conn, &id)?.ok_or_else(|| ApiError::not_found("User"))?
    };

    let token = state.tokens.issue(&user.id, user.role)?;
    tracing::info!(user_id = %user.id, role = %user.role, "user registered");

    Ok((
        StatusCode::CREATED,
        ok(json!({ "token": token, "user": user })),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<LoginBody>,
) -> ApiResult {
    let mut errors = Vec::new();
    let email = required_text(&mut errors, "email", body.email.as_deref()).to_ascii_lowercase();
    let password = required_text(&mut errors, "password", body.password.as_deref());
    validated(errors)?;

    let found = {
        let conn = state.db.lock();
        User::find_with_hash(&conn, &email)?
    };
    let Some((mut user, hash)) = found else {
        return Err(ApiError::Unauthorized("Invalid email or password".into()));
    };
    if !state.passwords.verify(&password, &hash) {
        return Err(ApiError::Unauthorized("Invalid email or password".into()));
    }

    let now = now_rfc3339();
    {
        let conn = state.db.lock();
        conn.execute(
            "UPDATE users SET last_login = ? WHERE id = ?",
            (&now, &user.id),
        )?;
    }
    user.last_login = Some(now);

    let token = state.tokens.issue(&user.id, user.role)?;
    tracing::info!(user_id = %user.id, "user logged in");
    Ok(ok(json!({ "token": token, "user": user })))
}

pub async fn me(AuthUser(user): AuthUser) -> ApiResult {
    Ok(ok(user))
}

/// Tokens are stateless; the client drops its cached session.
pub async fn logout(AuthUser(user): AuthUser) -> ApiResult {
    tracing::info!(user_id = %user.id, "user logged out");
    Ok(ok_message("Logged out", Value::Null))
}

pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    JsonBody(body): JsonBody<ChangePasswordBody>,
) -> ApiResult {
    let mut errors = Vec::new();
    let current = required_text(&mut errors, "currentPassword", body.current_password.as_deref());
    let new_password = body.new_password.unwrap_or_default();
    if new_password.len() < MIN_PASSWORD_LEN {
        errors.push(format!(
            "newPassword must be at least {MIN_PASSWORD_LEN} characters"
        ));
    }
    validated(errors)?;

    let stored: String = {
        let conn = state.db.lock();
        conn.query_row(
            "SELECT password_hash FROM users WHERE id = ?",
            [&user.id],
            |r| r.get(0),
        )?
    };
    if !state.passwords.verify(&current, &stored) {
        return Err(ApiError::BadRequest("Current password is incorrect".into()));
    }

    let hash = state.passwords.hash(&new_password)?;
    {
        let conn = state.db.lock();
        conn.execute(
            "UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?",
            (&hash, now_rfc3339(), &user.id),
        )?;
    }
    Ok(ok_message("Password updated", Value::Null))
}
