use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{optional_text, require_class_owner, required_text, validated};
use crate::api::error::{ok, ok_message, ApiError, ApiResult, JsonBody};
use crate::api::types::{authorize, AppState, AuthUser};
use crate::ids::{generate_class_code, now_rfc3339};
use crate::models::{Role, User, USER_COLUMNS};

const MAX_CODE_ATTEMPTS: usize = 10;

#[derive(Debug, Deserialize)]
pub struct ClassBody {
    pub name: Option<String>,
    pub description: Option<String>,
    pub grade: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinBody {
    pub class_code: Option<String>,
}

const CLASS_SELECT: &str = "SELECT
       c.code,
       c.name,
       c.description,
       c.grade,
       c.teacher_id,
       t.name,
       c.created_at,
       c.updated_at,
       (SELECT COUNT(*) FROM users s WHERE s.class_code = c.code AND s.role = 'student') AS student_count,
       (SELECT COUNT(*) FROM anonymous_messages m WHERE m.class_code = c.code AND m.is_read = 0) AS unread_messages
     FROM classes c
     JOIN users t ON t.id = c.teacher_id";

fn class_json(row: &Row<'_>) -> rusqlite::Result<Value> {
    Ok(json!({
        "code": row.get::<_, String>(0)?,
        "name": row.get::<_, String>(1)?,
        "description": row.get::<_, Option<String>>(2)?,
        "grade": row.get::<_, Option<String>>(3)?,
        "teacherId": row.get::<_, String>(4)?,
        "teacherName": row.get::<_, String>(5)?,
        "createdAt": row.get::<_, String>(6)?,
        "updatedAt": row.get::<_, String>(7)?,
        "studentCount": row.get::<_, i64>(8)?,
        "unreadMessages": row.get::<_, i64>(9)?,
    }))
}

fn load_class(conn: &Connection, code: &str) -> rusqlite::Result<Option<Value>> {
    conn.query_row(&format!("{CLASS_SELECT} WHERE c.code = ?"), [code], class_json)
        .optional()
}

pub async fn list_classes(State(state): State<AppState>, AuthUser(user): AuthUser) -> ApiResult {
    let conn = state.db.lock();
    let classes = match user.role {
        Role::Teacher => {
            // Correlated subqueries keep counts from double-counting via joins.
            let mut stmt = conn.prepare(&format!(
                "{CLASS_SELECT} WHERE c.teacher_id = ? ORDER BY c.name"
            ))?;
            let rows = stmt
                .query_map([&user.id], class_json)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
        Role::Student => match user.class_code.as_deref() {
            Some(code) => load_class(&conn, code)?.into_iter().collect(),
            None => Vec::new(),
        },
    };
    Ok(ok(classes))
}

pub async fn create_class(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    JsonBody(body): JsonBody<ClassBody>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    authorize(&user, &[Role::Teacher])?;
    let mut errors = Vec::new();
    let name = required_text(&mut errors, "name", body.name.as_deref());
    validated(errors)?;

    let conn = state.db.lock();

    // Existence check before insert; a concurrent creator can still race
    // between the check and the insert.
    let mut code = None;
    for _ in 0..MAX_CODE_ATTEMPTS {
        let candidate = generate_class_code();
        let taken: Option<i64> = conn
            .query_row("SELECT 1 FROM classes WHERE code = ?", [&candidate], |r| r.get(0))
            .optional()?;
        if taken.is_none() {
            code = Some(candidate);
            break;
        }
    }
    let Some(code) = code else {
        return Err(ApiError::Conflict(
            "Could not generate a unique class code".into(),
        ));
    };

    let now = now_rfc3339();
    conn.execute(
        "INSERT INTO classes(code, name, description, grade, teacher_id, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &code,
            &name,
            optional_text(body.description.as_deref()),
            optional_text(body.grade.as_deref()),
            &user.id,
            &now,
            &now,
        ),
    )?;
    let class = load_class(&conn, &code)?.ok_or_else(|| ApiError::not_found("Class"))?;
    tracing::info!(class_code = %code, teacher_id = %user.id, "class created");
    Ok((StatusCode::CREATED, ok(class)))
}

pub async fn get_class(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(code): Path<String>,
) -> ApiResult {
    let code = code.to_ascii_uppercase();
    let conn = state.db.lock();
    let class = load_class(&conn, &code)?.ok_or_else(|| ApiError::not_found("Class"))?;
    let allowed = match user.role {
        Role::Teacher => class["teacherId"] == user.id.as_str(),
        Role::Student => user.class_code.as_deref() == Some(code.as_str()),
    };
    if !allowed {
        return Err(ApiError::Forbidden(
            "Not authorized to access this class".into(),
        ));
    }
    Ok(ok(class))
}

pub async fn update_class(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(code): Path<String>,
    JsonBody(body): JsonBody<ClassBody>,
) -> ApiResult {
    authorize(&user, &[Role::Teacher])?;
    let code = code.to_ascii_uppercase();
    if let Some(name) = body.name.as_deref() {
        if name.trim().is_empty() {
            return Err(ApiError::Validation(vec!["name must not be empty".into()]));
        }
    }
    let conn = state.db.lock();
    require_class_owner(&conn, &user, &code)?;
    conn.execute(
        "UPDATE classes
         SET name = COALESCE(?, name),
             description = COALESCE(?, description),
             grade = COALESCE(?, grade),
             updated_at = ?
         WHERE code = ?",
        (
            optional_text(body.name.as_deref()),
            optional_text(body.description.as_deref()),
            optional_text(body.grade.as_deref()),
            now_rfc3339(),
            &code,
        ),
    )?;
    let class = load_class(&conn, &code)?.ok_or_else(|| ApiError::not_found("Class"))?;
    Ok(ok(class))
}

pub async fn delete_class(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(code): Path<String>,
) -> ApiResult {
    authorize(&user, &[Role::Teacher])?;
    let code = code.to_ascii_uppercase();
    let conn = state.db.lock();
    require_class_owner(&conn, &user, &code)?;

    let tx = conn.unchecked_transaction()?;
    let released = tx.execute(
        "UPDATE users SET class_code = NULL WHERE class_code = ?",
        [&code],
    )?;
    tx.execute("DELETE FROM anonymous_messages WHERE class_code = ?", [&code])?;
    tx.execute("DELETE FROM classes WHERE code = ?", [&code])?;
    tx.commit()?;

    tracing::info!(class_code = %code, students_released = released, "class deleted");
    Ok(ok_message(
        "Class deleted",
        json!({ "code": code, "studentsReleased": released }),
    ))
}

pub async fn class_students(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(code): Path<String>,
) -> ApiResult {
    let code = code.to_ascii_uppercase();
    let conn = state.db.lock();
    require_class_owner(&conn, &user, &code)?;

    let mut stmt = conn.prepare(&format!(
        "SELECT {USER_COLUMNS},
           (SELECT mood_score FROM survey_responses r
            WHERE r.user_id = users.id
            ORDER BY r.created_at DESC LIMIT 1) AS last_mood,
           (SELECT COALESCE(SUM(points), 0) FROM student_rewards w
            WHERE w.user_id = users.id) AS points
         FROM users
         WHERE class_code = ? AND role = 'student'
         ORDER BY name"
    ))?;
    let students = stmt
        .query_map([&code], |row| {
            let user = User::from_row(row)?;
            let last_mood: Option<i64> = row.get(11)?;
            let points: i64 = row.get(12)?;
            let mut v = serde_json::to_value(&user).unwrap_or(Value::Null);
            v["lastMoodScore"] = json!(last_mood);
            v["totalPoints"] = json!(points);
            Ok(v)
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ok(json!({ "classCode": code, "count": students.len(), "students": students })))
}

pub async fn join_class(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    JsonBody(body): JsonBody<JoinBody>,
) -> ApiResult {
    let mut errors = Vec::new();
    let code = required_text(&mut errors, "classCode", body.class_code.as_deref()).to_ascii_uppercase();
    validated(errors)?;

    let conn = state.db.lock();
    let class = load_class(&conn, &code)?.ok_or_else(|| ApiError::not_found("Class"))?;
    conn.execute(
        "UPDATE users SET class_code = ?, updated_at = ? WHERE id = ?",
        (&code, now_rfc3339(), &user.id),
    )?;
    tracing::info!(user_id = %user.id, class_code = %code, "student joined class");
    Ok(ok_message("Joined class", class))
}

pub async fn leave_class(State(state): State<AppState>, AuthUser(user): AuthUser) -> ApiResult {
    if user.class_code.is_none() {
        return Err(ApiError::BadRequest("You are not in a class".into()));
    }
    let conn = state.db.lock();
    conn.execute(
        "UPDATE users SET class_code = NULL, updated_at = ? WHERE id = ?",
        (now_rfc3339(), &user.id),
    )?;
    Ok(ok_message("Left class", Value::Null))
}
