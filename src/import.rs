//! Bulk roster import into a client.
//!
//! Rows are processed one at a time and a failure on one row never stops
//! the rest. The summary reports invalid emails as errors, existing or
//! repeated emails as skipped, and everything else as created.

use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;

use crate::auth::PasswordPolicy;
use crate::db::Db;
use crate::ids::{generate_id, generate_temporary_password, now_rfc3339};
use crate::models::Role;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRow {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub class_code: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportedUser {
    pub id: String,
    pub email: String,
    pub role: Role,
    pub temporary_password: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub total: usize,
    pub attempted: usize,
    pub created: Vec<ImportedUser>,
    pub skipped: Vec<Value>,
    pub errors: Vec<Value>,
    pub warnings: Vec<Value>,
}

pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    if email.is_empty() || email.chars().any(|c| c.is_whitespace()) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    let Some((host, tld)) = domain.rsplit_once('.') else {
        return false;
    };
    !host.is_empty() && tld.len() >= 2
}

fn parse_csv_record(line: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut buf = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                buf.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => out.push(std::mem::take(&mut buf)),
            _ => buf.push(ch),
        }
    }
    out.push(buf);
    out.into_iter().map(|s| s.trim().to_string()).collect()
}

/// Parses roster CSV. A first line naming an `email` column is treated as a
/// header; otherwise columns are positional: name, email, role, classCode.
pub fn parse_roster_csv(text: &str) -> Vec<ImportRow> {
    let mut lines = text
        .lines()
        .map(|l| l.trim_end_matches('\r'))
        .filter(|l| !l.trim().is_empty())
        .peekable();

    let mut name_idx = Some(0);
    let mut email_idx = 1;
    let mut role_idx = Some(2);
    let mut class_idx = Some(3);

    if let Some(first) = lines.peek() {
        let header: Vec<String> = parse_csv_record(first)
            .into_iter()
            .map(|h| h.to_ascii_lowercase().replace([' ', '_'], ""))
            .collect();
        if let Some(e) = header.iter().position(|h| h == "email") {
            email_idx = e;
            name_idx = header.iter().position(|h| h == "name" || h == "fullname");
            role_idx = header.iter().position(|h| h == "role");
            class_idx = header.iter().position(|h| h == "classcode" || h == "class");
            lines.next();
        }
    }

    let cell = |fields: &[String], idx: Option<usize>| -> Option<String> {
        idx.and_then(|i| fields.get(i))
            .map(|s| s.to_string())
            .filter(|s| !s.is_empty())
    };

    lines
        .map(|line| {
            let fields = parse_csv_record(line);
            ImportRow {
                name: cell(&fields, name_idx),
                email: cell(&fields, Some(email_idx)).unwrap_or_default(),
                role: cell(&fields, role_idx),
                class_code: cell(&fields, class_idx),
            }
        })
        .collect()
}

/// Creates users for `rows` under `client_id` and bumps the client's running
/// counters once per created user. Counters are never recomputed.
///
/// The connection is locked per row for the lookups and again for the
/// insert. Password hashing runs in between with the lock released.
pub fn apply_import(
    db: &Db,
    passwords: &PasswordPolicy,
    client_id: &str,
    rows: &[ImportRow],
) -> anyhow::Result<ImportSummary> {
    import_rows(db, client_id, rows, |password| passwords.hash(password))
}

fn import_rows<H>(db: &Db, client_id: &str, rows: &[ImportRow], mut hash: H) -> anyhow::Result<ImportSummary>
where
    H: FnMut(&str) -> anyhow::Result<String>,
{
    let mut summary = ImportSummary {
        total: rows.len(),
        ..Default::default()
    };
    let mut seen: HashSet<String> = HashSet::new();

    for (i, row) in rows.iter().enumerate() {
        let row_no = i + 1;
        let email = row.email.trim().to_ascii_lowercase();
        if !is_valid_email(&email) {
            summary.errors.push(json!({
                "row": row_no,
                "email": row.email,
                "message": "invalid email address",
            }));
            continue;
        }
        summary.attempted += 1;

        let role = row
            .role
            .as_deref()
            .and_then(Role::parse)
            .unwrap_or(Role::Student);
        let requested_class = match row.class_code.as_deref().map(|c| c.trim().to_ascii_uppercase()) {
            Some(code) if role == Role::Student && !code.is_empty() => Some(code),
            _ => None,
        };

        let (exists, class_found) = {
            let conn = db.lock();
            let exists: Option<i64> = conn
                .query_row("SELECT 1 FROM users WHERE email = ?", [&email], |r| r.get(0))
                .optional()?;
            let class_found = match &requested_class {
                Some(code) => conn
                    .query_row("SELECT 1 FROM classes WHERE code = ?", [code], |r| r.get::<_, i64>(0))
                    .optional()?
                    .is_some(),
                None => false,
            };
            (exists.is_some(), class_found)
        };
        if exists || !seen.insert(email.clone()) {
            summary.skipped.push(json!({
                "row": row_no,
                "email": email,
                "reason": "email already exists",
            }));
            continue;
        }

        let class_code = match requested_class {
            Some(code) if class_found => Some(code),
            Some(code) => {
                summary.warnings.push(json!({
                    "row": row_no,
                    "email": email,
                    "message": format!("class {code} not found; user created without a class"),
                }));
                None
            }
            None => None,
        };
        let name = row
            .name
            .clone()
            .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());

        let temporary_password = generate_temporary_password();
        let created = hash(&temporary_password).and_then(|password_hash| {
            let new_user = NewUser {
                client_id,
                name: &name,
                email: &email,
                role,
                class_code: class_code.as_deref(),
                password_hash: &password_hash,
            };
            insert_imported_user(&db.lock(), &new_user)
        });
        match created {
            Ok(id) => summary.created.push(ImportedUser {
                id,
                email,
                role,
                temporary_password,
            }),
            Err(e) => {
                tracing::warn!(row = row_no, email = %email, error = %e, "import row failed");
                summary.errors.push(json!({
                    "row": row_no,
                    "email": email,
                    "message": e.to_string(),
                }));
            }
        }
    }

    Ok(summary)
}

struct NewUser<'a> {
    client_id: &'a str,
    name: &'a str,
    email: &'a str,
    role: Role,
    class_code: Option<&'a str>,
    password_hash: &'a str,
}

fn insert_imported_user(conn: &Connection, user: &NewUser<'_>) -> anyhow::Result<String> {
    let id = generate_id();
    let now = now_rfc3339();

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO users(id, name, email, password_hash, role, class_code, client_id, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            user.name,
            user.email,
            user.password_hash,
            user.role,
            user.class_code,
            user.client_id,
            &now,
            &now,
        ),
    )?;
    let (students, teachers) = match user.role {
        Role::Student => (1, 0),
        Role::Teacher => (0, 1),
    };
    tx.execute(
        "UPDATE clients
         SET total_users = total_users + 1,
             total_students = total_students + ?,
             total_teachers = total_teachers + ?,
             updated_at = ?
         WHERE id = ?",
        (students, teachers, &now, user.client_id),
    )?;
    tx.commit()?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation() {
        assert!(is_valid_email("ana@school.edu"));
        assert!(is_valid_email(" ana.q@colegio.edu.pe "));
        assert!(!is_valid_email("ana"));
        assert!(!is_valid_email("@school.edu"));
        assert!(!is_valid_email("ana@school"));
        assert!(!is_valid_email("ana@@school.edu"));
        assert!(!is_valid_email("an a@school.edu"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn csv_with_header_maps_columns_by_name() {
        let rows = parse_roster_csv(
            "Email,Full Name,Role,Class Code\r\nana@school.edu,\"Quispe, Ana\",student,abc123\r\n\r\nbo@school.edu,Bo,teacher,\n",
        );
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].email, "ana@school.edu");
        assert_eq!(rows[0].name.as_deref(), Some("Quispe, Ana"));
        assert_eq!(rows[0].class_code.as_deref(), Some("abc123"));
        assert_eq!(rows[1].role.as_deref(), Some("teacher"));
        assert_eq!(rows[1].class_code, None);
    }

    #[test]
    fn csv_without_header_is_positional() {
        let rows = parse_roster_csv("Ana,ana@school.edu\nBo,bo@school.edu,teacher");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name.as_deref(), Some("Ana"));
        assert_eq!(rows[0].role, None);
        assert_eq!(rows[1].email, "bo@school.edu");
    }

    #[test]
    fn hashing_runs_without_holding_the_connection() {
        let db = Db::open_in_memory().expect("db");
        db.lock()
            .execute(
                "INSERT INTO clients(id, name, created_at, updated_at) VALUES('c1', 'Andino', 'now', 'now')",
                [],
            )
            .expect("client");
        let rows = parse_roster_csv("Ana,ana@school.edu\nBo,bo@school.edu\nbad-email");

        let mut hashed = 0;
        let summary = import_rows(&db, "c1", &rows, |password| {
            assert!(db.try_lock().is_some(), "connection locked during hashing");
            hashed += 1;
            Ok(format!("hashed:{password}"))
        })
        .expect("import");

        assert_eq!(hashed, 2);
        assert_eq!(summary.created.len(), 2);
        assert_eq!(summary.errors.len(), 1);
        let total: i64 = db
            .lock()
            .query_row("SELECT total_users FROM clients WHERE id = 'c1'", [], |r| r.get(0))
            .expect("total");
        assert_eq!(total, 2);
    }

    #[test]
    fn failed_hash_is_reported_per_row() {
        let db = Db::open_in_memory().expect("db");
        db.lock()
            .execute(
                "INSERT INTO clients(id, name, created_at, updated_at) VALUES('c1', 'Andino', 'now', 'now')",
                [],
            )
            .expect("client");
        let rows = parse_roster_csv("Ana,ana@school.edu\nBo,bo@school.edu");

        let summary = import_rows(&db, "c1", &rows, |_| anyhow::bail!("hasher unavailable"))
            .expect("import");

        assert_eq!(summary.created.len(), 0);
        assert_eq!(summary.errors.len(), 2);
        assert_eq!(summary.errors[0]["message"], "hasher unavailable");
    }

    #[test]
    fn quoted_quotes_are_unescaped() {
        assert_eq!(
            parse_csv_record("\"say \"\"hi\"\"\",x"),
            vec!["say \"hi\"".to_string(), "x".to_string()]
        );
    }
}
