//! Dashboard aggregation: table totals, email-domain grouping and the
//! wellbeing score.
//!
//! Domain figures are recomputed per domain with `LIKE '%@domain'` scans.
//! Student counts per domain add the students whose own email matches to
//! the students enrolled in a class taught by a matching teacher, without
//! de-duplication, so one student can be counted twice in a domain and
//! once more in another domain.

use rusqlite::{Connection, ToSql};
use serde::Serialize;
use std::collections::BTreeSet;

/// One-decimal rounding used for every reported average.
pub fn round_off_1_decimal(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}

/// Lowercased substring after the `@` of an email, if any.
pub fn email_domain(email: &str) -> Option<String> {
    let (_, domain) = email.trim().split_once('@')?;
    let domain = domain.trim().to_ascii_lowercase();
    if domain.is_empty() {
        None
    } else {
        Some(domain)
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Scope<'a> {
    All,
    /// Students whose email ends with `@domain`.
    Domain(&'a str),
    /// Students enrolled in the class.
    Class(&'a str),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WellbeingInputs {
    pub survey_mood: Option<f64>,
    pub activity_score: Option<f64>,
    pub reflection_sentiment: Option<f64>,
}

impl WellbeingInputs {
    /// Unweighted mean of whichever averages exist. The three sources use
    /// different scales and are not normalized.
    pub fn score(&self) -> Option<f64> {
        let present: Vec<f64> = [
            self.survey_mood,
            self.activity_score,
            self.reflection_sentiment,
        ]
        .into_iter()
        .flatten()
        .collect();
        if present.is_empty() {
            return None;
        }
        let mean = present.iter().sum::<f64>() / present.len() as f64;
        Some(round_off_1_decimal(mean))
    }
}

fn scoped_avg(
    conn: &Connection,
    table: &str,
    column: &str,
    scope: Scope<'_>,
) -> rusqlite::Result<Option<f64>> {
    match scope {
        Scope::All => conn.query_row(&format!("SELECT AVG({column}) FROM {table}"), [], |r| {
            r.get(0)
        }),
        Scope::Domain(domain) => conn.query_row(
            &format!(
                "SELECT AVG(t.{column})
                 FROM {table} t
                 JOIN users u ON u.id = t.user_id
                 WHERE u.role = 'student' AND u.email LIKE '%@' || ?"
            ),
            [domain],
            |r| r.get(0),
        ),
        Scope::Class(code) => conn.query_row(
            &format!(
                "SELECT AVG(t.{column})
                 FROM {table} t
                 JOIN users u ON u.id = t.user_id
                 WHERE u.class_code = ?"
            ),
            [code],
            |r| r.get(0),
        ),
    }
}

pub fn wellbeing_inputs(conn: &Connection, scope: Scope<'_>) -> rusqlite::Result<WellbeingInputs> {
    Ok(WellbeingInputs {
        survey_mood: scoped_avg(conn, "survey_responses", "mood_score", scope)?,
        activity_score: scoped_avg(conn, "student_activities", "score", scope)?,
        reflection_sentiment: scoped_avg(conn, "reflection_analyses", "sentiment_score", scope)?,
    })
}

fn count(conn: &Connection, sql: &str, params: &[&dyn ToSql]) -> rusqlite::Result<i64> {
    conn.query_row(sql, params, |r| r.get(0))
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub users: i64,
    pub students: i64,
    pub teachers: i64,
    pub classes: i64,
    pub surveys: i64,
    pub activities: i64,
    pub messages: i64,
    pub unread_messages: i64,
    pub notifications: i64,
    pub growth_spaces: i64,
    pub rewards: i64,
    pub reflections: i64,
    pub demo_requests: i64,
    pub clients: i64,
}

pub fn totals(conn: &Connection) -> rusqlite::Result<Totals> {
    Ok(Totals {
        users: count(conn, "SELECT COUNT(*) FROM users", &[])?,
        students: count(conn, "SELECT COUNT(*) FROM users WHERE role = 'student'", &[])?,
        teachers: count(conn, "SELECT COUNT(*) FROM users WHERE role = 'teacher'", &[])?,
        classes: count(conn, "SELECT COUNT(*) FROM classes", &[])?,
        surveys: count(conn, "SELECT COUNT(*) FROM survey_responses", &[])?,
        activities: count(conn, "SELECT COUNT(*) FROM student_activities", &[])?,
        messages: count(conn, "SELECT COUNT(*) FROM anonymous_messages", &[])?,
        unread_messages: count(
            conn,
            "SELECT COUNT(*) FROM anonymous_messages WHERE is_read = 0",
            &[],
        )?,
        notifications: count(conn, "SELECT COUNT(*) FROM teacher_notifications", &[])?,
        growth_spaces: count(conn, "SELECT COUNT(*) FROM growth_spaces", &[])?,
        rewards: count(conn, "SELECT COUNT(*) FROM student_rewards", &[])?,
        reflections: count(conn, "SELECT COUNT(*) FROM reflection_analyses", &[])?,
        demo_requests: count(conn, "SELECT COUNT(*) FROM demo_requests", &[])?,
        clients: count(conn, "SELECT COUNT(*) FROM clients", &[])?,
    })
}

/// Distinct email domains of all teachers, sorted.
pub fn teacher_domains(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT email FROM users WHERE role = 'teacher'")?;
    let emails = stmt
        .query_map([], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    let domains: BTreeSet<String> = emails.iter().filter_map(|e| email_domain(e)).collect();
    Ok(domains.into_iter().collect())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainStats {
    pub domain: String,
    pub teachers: i64,
    pub students: i64,
    pub classes: i64,
    pub messages: i64,
    pub wellbeing_score: Option<f64>,
}

pub fn domain_stats(conn: &Connection, domain: &str) -> rusqlite::Result<DomainStats> {
    let teachers = count(
        conn,
        "SELECT COUNT(*) FROM users WHERE role = 'teacher' AND email LIKE '%@' || ?",
        &[&domain],
    )?;
    let students_by_email = count(
        conn,
        "SELECT COUNT(*) FROM users WHERE role = 'student' AND email LIKE '%@' || ?",
        &[&domain],
    )?;
    let students_by_class = count(
        conn,
        "SELECT COUNT(*)
         FROM users s
         WHERE s.role = 'student'
           AND s.class_code IN (
             SELECT c.code
             FROM classes c
             JOIN users t ON t.id = c.teacher_id
             WHERE t.email LIKE '%@' || ?
           )",
        &[&domain],
    )?;
    let classes = count(
        conn,
        "SELECT COUNT(*)
         FROM classes c
         JOIN users t ON t.id = c.teacher_id
         WHERE t.email LIKE '%@' || ?",
        &[&domain],
    )?;
    let messages = count(
        conn,
        "SELECT COUNT(*)
         FROM anonymous_messages m
         JOIN users t ON t.id = m.teacher_id
         WHERE t.email LIKE '%@' || ?",
        &[&domain],
    )?;
    let wellbeing_score = wellbeing_inputs(conn, Scope::Domain(domain))?.score();

    Ok(DomainStats {
        domain: domain.to_string(),
        teachers,
        students: students_by_email + students_by_class,
        classes,
        messages,
        wellbeing_score,
    })
}
