use axum::extract::{Path, Query, State};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{class_teacher, optional_text, teaches};
use crate::api::error::{ok, ok_message, ApiError, ApiResult, JsonBody};
use crate::api::types::{authorize, AppState, AuthUser};
use crate::ids::now_rfc3339;
use crate::models::{Role, User, USER_COLUMNS};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserFilter {
    pub role: Option<String>,
    pub class_code: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserBody {
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub grade: Option<String>,
    pub class_code: Option<String>,
}

pub async fn list_users(
    State(state): State<AppState>,
    Query(filter): Query<UserFilter>,
) -> ApiResult {
    let role = match filter.role.as_deref() {
        None => None,
        Some(r) => Some(
            Role::parse(r)
                .ok_or_else(|| ApiError::BadRequest("role must be student or teacher".into()))?,
        ),
    };
    let class_code = optional_text(filter.class_code.as_deref()).map(|c| c.to_ascii_uppercase());

    let conn = state.db.lock();
    let mut stmt = conn.prepare(&format!(
        "SELECT {USER_COLUMNS}
         FROM users
         WHERE (?1 IS NULL OR role = ?1)
           AND (?2 IS NULL OR class_code = ?2)
         ORDER BY name"
    ))?;
    let users = stmt
        .query_map((role, class_code), User::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ok(json!({ "count": users.len(), "users": users })))
}

fn can_view(conn: &rusqlite::Connection, caller: &User, target: &User) -> rusqlite::Result<bool> {
    if caller.id == target.id || caller.role == Role::Teacher {
        return Ok(true);
    }
    // Students may see their own class teacher.
    match (target.role, caller.class_code.as_deref()) {
        (Role::Teacher, Some(code)) => {
            Ok(class_teacher(conn, code)?.as_deref() == Some(target.id.as_str()))
        }
        _ => Ok(false),
    }
}

pub async fn get_user(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(id): Path<String>,
) -> ApiResult {
    let conn = state.db.lock();
    let target = User::find_by_id(&conn, &id)?.ok_or_else(|| ApiError::not_found("User"))?;
    if !can_view(&conn, &caller, &target)? {
        return Err(ApiError::Forbidden(
            "Not authorized to view this user".into(),
        ));
    }
    Ok(ok(target))
}

pub async fn update_user(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<UpdateUserBody>,
) -> ApiResult {
    let conn = state.db.lock();
    let target = User::find_by_id(&conn, &id)?.ok_or_else(|| ApiError::not_found("User"))?;
    let is_self = caller.id == target.id;
    let is_teacher = caller.role == Role::Teacher;
    if !is_self && !is_teacher {
        return Err(ApiError::Forbidden(
            "Not authorized to update this user".into(),
        ));
    }

    if let Some(name) = body.name.as_deref() {
        if name.trim().is_empty() {
            return Err(ApiError::Validation(vec!["name must not be empty".into()]));
        }
    }

    // Moving a student between classes is a teacher action; students use
    // the join/leave endpoints.
    let class_code = match body.class_code.as_deref() {
        Some(_) if !is_teacher => {
            return Err(ApiError::Forbidden(
                "Only teachers can change class membership here".into(),
            ))
        }
        Some(code) => {
            let code = code.trim().to_ascii_uppercase();
            if class_teacher(&conn, &code)?.is_none() {
                return Err(ApiError::BadRequest("Invalid class code".into()));
            }
            Some(code)
        }
        None => None,
    };

    conn.execute(
        "UPDATE users
         SET name = COALESCE(?, name),
             avatar = COALESCE(?, avatar),
             grade = COALESCE(?, grade),
             class_code = COALESCE(?, class_code),
             updated_at = ?
         WHERE id = ?",
        (
            optional_text(body.name.as_deref()),
            optional_text(body.avatar.as_deref()),
            optional_text(body.grade.as_deref()),
            class_code,
            now_rfc3339(),
            &id,
        ),
    )?;
    let updated = User::find_by_id(&conn, &id)?.ok_or_else(|| ApiError::not_found("User"))?;
    Ok(ok(updated))
}

pub async fn delete_user(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(id): Path<String>,
) -> ApiResult {
    authorize(&caller, &[Role::Teacher])?;

    let conn = state.db.lock();
    let target = User::find_by_id(&conn, &id)?.ok_or_else(|| ApiError::not_found("User"))?;
    if target.role == Role::Student && !teaches(&conn, &caller.id, &target)? {
        return Err(ApiError::Forbidden(
            "Student is not in one of your classes".into(),
        ));
    }
    if target.role == Role::Teacher && target.id != caller.id {
        return Err(ApiError::Forbidden("Teachers cannot delete other teachers".into()));
    }

    let tx = conn.unchecked_transaction()?;

    // Explicitly delete in dependency order (no ON DELETE CASCADE).
    // Client counters are running totals and are left untouched.
    let steps: [(&str, &str); 10] = [
        (
            "reflection_analyses",
            "DELETE FROM reflection_analyses
             WHERE user_id = ?1
                OR growth_space_id IN (SELECT id FROM growth_spaces WHERE user_id = ?1)",
        ),
        ("growth_spaces", "DELETE FROM growth_spaces WHERE user_id = ?1"),
        ("survey_responses", "DELETE FROM survey_responses WHERE user_id = ?1"),
        ("student_activities", "DELETE FROM student_activities WHERE user_id = ?1"),
        (
            "student_rewards",
            "DELETE FROM student_rewards WHERE user_id = ?1 OR awarded_by = ?1",
        ),
        (
            "teacher_notifications",
            "DELETE FROM teacher_notifications WHERE teacher_id = ?1 OR student_id = ?1",
        ),
        (
            "anonymous_messages",
            "DELETE FROM anonymous_messages
             WHERE sender_id = ?1
                OR teacher_id = ?1
                OR class_code IN (SELECT code FROM classes WHERE teacher_id = ?1)",
        ),
        (
            "users",
            "UPDATE users SET class_code = NULL
             WHERE class_code IN (SELECT code FROM classes WHERE teacher_id = ?1)",
        ),
        ("classes", "DELETE FROM classes WHERE teacher_id = ?1"),
        ("users", "DELETE FROM users WHERE id = ?1"),
    ];
    for (table, sql) in steps {
        if let Err(e) = tx.execute(sql, [&id]) {
            let _ = tx.rollback();
            return Err(ApiError::Internal(format!("delete from {table} failed: {e}")));
        }
    }
    tx.commit()?;

    tracing::info!(user_id = %id, deleted_by = %caller.id, "user deleted");
    Ok(ok_message("User deleted", Value::Null))
}
