use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use rusqlite::{OptionalExtension, Row};
use serde::Deserialize;
use serde_json::{json, Value};

use super::notifications::{insert_notification, NewNotification};
use super::{
    check_range, class_teacher, json_text, optional_text, parse_json_text, require_class_owner,
    required_text, teaches, validated,
};
use crate::api::error::{ok, ApiError, ApiResult, JsonBody};
use crate::api::types::{AppState, AuthUser};
use crate::ids::{generate_id, now_rfc3339};
use crate::models::{Role, User};

/// Mood scores at or below this raise a wellbeing alert for the teacher.
pub const LOW_MOOD_THRESHOLD: i64 = 3;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyBody {
    pub survey_type: Option<String>,
    #[serde(default)]
    pub answers: Value,
    pub mood_score: Option<i64>,
    pub stress_level: Option<i64>,
    pub notes: Option<String>,
}

const SURVEY_SELECT: &str = "SELECT
       r.id, r.user_id, u.name, r.survey_type, r.answers, r.mood_score, r.stress_level, r.notes, r.created_at
     FROM survey_responses r
     JOIN users u ON u.id = r.user_id";

fn survey_json(row: &Row<'_>) -> rusqlite::Result<Value> {
    Ok(json!({
        "id": row.get::<_, String>(0)?,
        "userId": row.get::<_, String>(1)?,
        "studentName": row.get::<_, String>(2)?,
        "surveyType": row.get::<_, String>(3)?,
        "answers": parse_json_text(&row.get::<_, String>(4)?),
        "moodScore": row.get::<_, i64>(5)?,
        "stressLevel": row.get::<_, Option<i64>>(6)?,
        "notes": row.get::<_, Option<String>>(7)?,
        "createdAt": row.get::<_, String>(8)?,
    }))
}

pub async fn create_survey(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    JsonBody(body): JsonBody<SurveyBody>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let mut errors = Vec::new();
    let survey_type = required_text(&mut errors, "surveyType", body.survey_type.as_deref());
    match body.mood_score {
        None => errors.push("moodScore is required".to_string()),
        Some(m) => check_range(&mut errors, "moodScore", Some(m as f64), 1.0, 10.0),
    }
    check_range(
        &mut errors,
        "stressLevel",
        body.stress_level.map(|v| v as f64),
        1.0,
        10.0,
    );
    validated(errors)?;
    let mood_score = body.mood_score.unwrap_or_default();
    let answers = if body.answers.is_null() {
        json!({})
    } else {
        body.answers
    };

    let conn = state.db.lock();
    let id = generate_id();
    conn.execute(
        "INSERT INTO survey_responses(id, user_id, survey_type, answers, mood_score, stress_level, notes, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &user.id,
            &survey_type,
            json_text(&answers),
            mood_score,
            body.stress_level,
            optional_text(body.notes.as_deref()),
            now_rfc3339(),
        ),
    )?;

    if mood_score <= LOW_MOOD_THRESHOLD {
        if let Some(code) = user.class_code.as_deref() {
            if let Some(teacher_id) = class_teacher(&conn, code)? {
                let message = format!(
                    "{} reported a mood score of {} in a {} survey.",
                    user.name, mood_score, survey_type
                );
                insert_notification(
                    &conn,
                    &NewNotification {
                        teacher_id: &teacher_id,
                        student_id: Some(&user.id),
                        kind: "wellbeing_alert",
                        title: "Low mood reported",
                        message: &message,
                        priority: "high",
                    },
                )?;
                tracing::info!(student_id = %user.id, mood_score, "wellbeing alert raised");
            }
        }
    }

    let created = conn.query_row(&format!("{SURVEY_SELECT} WHERE r.id = ?"), [&id], survey_json)?;
    Ok((StatusCode::CREATED, ok(created)))
}

pub async fn my_surveys(State(state): State<AppState>, AuthUser(user): AuthUser) -> ApiResult {
    let conn = state.db.lock();
    let mut stmt = conn.prepare(&format!(
        "{SURVEY_SELECT} WHERE r.user_id = ? ORDER BY r.created_at DESC"
    ))?;
    let rows = stmt
        .query_map([&user.id], survey_json)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ok(rows))
}

pub async fn class_surveys(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(code): Path<String>,
) -> ApiResult {
    let code = code.to_ascii_uppercase();
    let conn = state.db.lock();
    require_class_owner(&conn, &user, &code)?;
    let mut stmt = conn.prepare(&format!(
        "{SURVEY_SELECT} WHERE u.class_code = ? ORDER BY r.created_at DESC"
    ))?;
    let rows = stmt
        .query_map([&code], survey_json)?
        .collect::<Result<Vec<_>, _>>()?;
    let average_mood: Option<f64> = conn.query_row(
        "SELECT AVG(r.mood_score)
         FROM survey_responses r
         JOIN users u ON u.id = r.user_id
         WHERE u.class_code = ?",
        [&code],
        |r| r.get(0),
    )?;
    Ok(ok(json!({
        "classCode": code,
        "count": rows.len(),
        "averageMood": average_mood.map(crate::stats::round_off_1_decimal),
        "responses": rows,
    })))
}

pub async fn get_survey(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult {
    let conn = state.db.lock();
    let survey = conn
        .query_row(&format!("{SURVEY_SELECT} WHERE r.id = ?"), [&id], survey_json)
        .optional()?
        .ok_or_else(|| ApiError::not_found("Survey"))?;
    let author_id = survey["userId"].as_str().unwrap_or_default();
    let allowed = if author_id == user.id {
        true
    } else if user.role == Role::Teacher {
        match User::find_by_id(&conn, author_id)? {
            Some(author) => teaches(&conn, &user.id, &author)?,
            None => false,
        }
    } else {
        false
    };
    if !allowed {
        return Err(ApiError::Forbidden(
            "Not authorized to view this survey".into(),
        ));
    }
    Ok(ok(survey))
}
