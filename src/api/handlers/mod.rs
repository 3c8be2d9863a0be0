pub mod activities;
pub mod admin;
pub mod auth;
pub mod classes;
pub mod clients;
pub mod demo_requests;
pub mod growth_spaces;
pub mod health;
pub mod messages;
pub mod notifications;
pub mod rewards;
pub mod surveys;
pub mod users;

use rusqlite::{Connection, OptionalExtension};

use crate::api::error::ApiError;
use crate::models::{Role, User};

/// Trimmed, non-empty text or a validation message pushed to `errors`.
pub(crate) fn required_text(
    errors: &mut Vec<String>,
    field: &str,
    value: Option<&str>,
) -> String {
    let v = value.map(str::trim).unwrap_or_default();
    if v.is_empty() {
        errors.push(format!("{field} is required"));
    }
    v.to_string()
}

pub(crate) fn optional_text(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

pub(crate) fn check_range(
    errors: &mut Vec<String>,
    field: &str,
    value: Option<f64>,
    min: f64,
    max: f64,
) {
    if let Some(v) = value {
        if !(min..=max).contains(&v) {
            errors.push(format!("{field} must be between {min} and {max}"));
        }
    }
}

pub(crate) fn validated(errors: Vec<String>) -> Result<(), ApiError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation(errors))
    }
}

/// Teacher id owning the class, if the class exists.
pub(crate) fn class_teacher(conn: &Connection, code: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT teacher_id FROM classes WHERE code = ?",
        [code],
        |r| r.get(0),
    )
    .optional()
}

pub(crate) fn require_class_owner(
    conn: &Connection,
    teacher: &User,
    code: &str,
) -> Result<(), ApiError> {
    match class_teacher(conn, code)? {
        None => Err(ApiError::not_found("Class")),
        Some(owner) if owner == teacher.id => Ok(()),
        Some(_) => Err(ApiError::Forbidden(
            "Not authorized to access this class".into(),
        )),
    }
}

/// Loads a student taught by `teacher` (enrolled in one of their classes).
pub(crate) fn require_taught_student(
    conn: &Connection,
    teacher: &User,
    student_id: &str,
) -> Result<User, ApiError> {
    let student = User::find_by_id(conn, student_id)?
        .filter(|u| u.role == Role::Student)
        .ok_or_else(|| ApiError::not_found("Student"))?;
    if !teaches(conn, &teacher.id, &student)? {
        return Err(ApiError::Forbidden(
            "Student is not in one of your classes".into(),
        ));
    }
    Ok(student)
}

pub(crate) fn teaches(conn: &Connection, teacher_id: &str, student: &User) -> rusqlite::Result<bool> {
    let Some(code) = student.class_code.as_deref() else {
        return Ok(false);
    };
    Ok(class_teacher(conn, code)?.as_deref() == Some(teacher_id))
}

pub(crate) fn json_text(value: &serde_json::Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

pub(crate) fn parse_json_text(text: &str) -> serde_json::Value {
    serde_json::from_str(text).unwrap_or(serde_json::Value::Null)
}
