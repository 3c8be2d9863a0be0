use parking_lot::{Mutex, MutexGuard};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared handle to the single SQLite connection.
///
/// Handlers lock, run their statements synchronously and drop the guard
/// before awaiting anything.
#[derive(Clone)]
pub struct Db {
    conn: Arc<Mutex<Connection>>,
}

impl Db {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = open_db(path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }

    #[cfg(test)]
    pub fn try_lock(&self) -> Option<MutexGuard<'_, Connection>> {
        self.conn.try_lock()
    }
}

pub fn open_db(db_path: &Path) -> anyhow::Result<Connection> {
    if db_path.as_os_str() == ":memory:" {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        return Ok(conn);
    }
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open(db_path)?;
    let mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        tracing::warn!(journal_mode = %mode, "database did not switch to WAL");
    }
    conn.busy_timeout(BUSY_TIMEOUT)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS clients(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            domain TEXT,
            contact_name TEXT,
            contact_email TEXT,
            contact_phone TEXT,
            status TEXT NOT NULL DEFAULT 'active',
            total_users INTEGER NOT NULL DEFAULT 0,
            total_students INTEGER NOT NULL DEFAULT 0,
            total_teachers INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    // users.class_code references classes.code, and classes.teacher_id
    // references users.id. SQLite resolves the cycle lazily so creation
    // order only matters for readability.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL CHECK(role IN ('student', 'teacher')),
            class_code TEXT,
            client_id TEXT,
            avatar TEXT,
            grade TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(class_code) REFERENCES classes(code),
            FOREIGN KEY(client_id) REFERENCES clients(id)
        )",
        [],
    )?;
    ensure_users_last_login(conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_users_class_code ON users(class_code)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_users_client ON users(client_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            code TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT,
            grade TEXT,
            teacher_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(teacher_id) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_classes_teacher ON classes(teacher_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS survey_responses(
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            survey_type TEXT NOT NULL,
            answers TEXT NOT NULL,
            mood_score INTEGER NOT NULL,
            stress_level INTEGER,
            notes TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_survey_responses_user ON survey_responses(user_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_activities(
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            activity_type TEXT NOT NULL,
            title TEXT NOT NULL,
            score REAL,
            duration_minutes INTEGER,
            data TEXT NOT NULL,
            completed_at TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_student_activities_user ON student_activities(user_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS anonymous_messages(
            id TEXT PRIMARY KEY,
            sender_id TEXT NOT NULL,
            teacher_id TEXT NOT NULL,
            class_code TEXT NOT NULL,
            content TEXT NOT NULL,
            category TEXT NOT NULL DEFAULT 'general',
            is_read INTEGER NOT NULL DEFAULT 0,
            reply TEXT,
            replied_at TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY(sender_id) REFERENCES users(id),
            FOREIGN KEY(teacher_id) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_anonymous_messages_teacher ON anonymous_messages(teacher_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_anonymous_messages_sender ON anonymous_messages(sender_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teacher_notifications(
            id TEXT PRIMARY KEY,
            teacher_id TEXT NOT NULL,
            student_id TEXT,
            kind TEXT NOT NULL,
            title TEXT NOT NULL,
            message TEXT NOT NULL,
            priority TEXT NOT NULL DEFAULT 'normal',
            is_read INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            FOREIGN KEY(teacher_id) REFERENCES users(id),
            FOREIGN KEY(student_id) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_teacher_notifications_teacher ON teacher_notifications(teacher_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS growth_spaces(
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            title TEXT NOT NULL,
            content TEXT NOT NULL,
            mood TEXT,
            is_private INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_growth_spaces_user ON growth_spaces(user_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_rewards(
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            awarded_by TEXT NOT NULL,
            reward_type TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT,
            points INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES users(id),
            FOREIGN KEY(awarded_by) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_student_rewards_user ON student_rewards(user_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS reflection_analyses(
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            growth_space_id TEXT NOT NULL,
            sentiment_score REAL NOT NULL,
            summary TEXT,
            themes TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES users(id),
            FOREIGN KEY(growth_space_id) REFERENCES growth_spaces(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_reflection_analyses_space ON reflection_analyses(growth_space_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS demo_requests(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            school TEXT NOT NULL,
            role TEXT,
            phone TEXT,
            message TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}

fn ensure_users_last_login(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "users", "last_login")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE users ADD COLUMN last_login TEXT", [])?;
    Ok(())
}

pub fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_is_idempotent() {
        let conn = Connection::open_in_memory().expect("open");
        init_schema(&conn).expect("first init");
        init_schema(&conn).expect("second init");
        assert!(table_has_column(&conn, "users", "last_login").expect("pragma"));
    }

    #[test]
    fn last_login_is_added_to_older_users_tables() {
        let conn = Connection::open_in_memory().expect("open");
        conn.execute(
            "CREATE TABLE users(
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL,
                class_code TEXT,
                client_id TEXT,
                avatar TEXT,
                grade TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )
        .expect("legacy users table");
        assert!(!table_has_column(&conn, "users", "last_login").expect("pragma"));
        init_schema(&conn).expect("migrate");
        assert!(table_has_column(&conn, "users", "last_login").expect("pragma"));
    }

    #[test]
    fn file_databases_use_wal_and_a_busy_timeout() {
        let dir = std::env::temp_dir().join(format!("munayd-db-{}", uuid::Uuid::new_v4()));
        let conn = open_db(&dir.join("nested").join("munay.sqlite3")).expect("open");
        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |r| r.get(0))
            .expect("journal_mode");
        assert_eq!(mode.to_ascii_lowercase(), "wal");
        let timeout: i64 = conn
            .query_row("PRAGMA busy_timeout", [], |r| r.get(0))
            .expect("busy_timeout");
        assert_eq!(timeout, 5000);
        drop(conn);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
