use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Some(Role::Student),
            "teacher" => Some(Role::Teacher),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromSql for Role {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        Role::parse(s).ok_or_else(|| FromSqlError::Other(format!("unknown role: {s}").into()))
    }
}

impl ToSql for Role {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

/// A user row without its password hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub class_code: Option<String>,
    pub client_id: Option<String>,
    pub avatar: Option<String>,
    pub grade: Option<String>,
    pub last_login: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

pub const USER_COLUMNS: &str =
    "id, name, email, role, class_code, client_id, avatar, grade, last_login, created_at, updated_at";

impl User {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            email: row.get(2)?,
            role: row.get(3)?,
            class_code: row.get(4)?,
            client_id: row.get(5)?,
            avatar: row.get(6)?,
            grade: row.get(7)?,
            last_login: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    pub fn find_by_id(conn: &Connection, id: &str) -> rusqlite::Result<Option<User>> {
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"),
            [id],
            User::from_row,
        )
        .optional()
    }

    pub fn find_by_email(conn: &Connection, email: &str) -> rusqlite::Result<Option<User>> {
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?"),
            [email],
            User::from_row,
        )
        .optional()
    }

    /// Returns the stored hash alongside the user for login checks.
    pub fn find_with_hash(
        conn: &Connection,
        email: &str,
    ) -> rusqlite::Result<Option<(User, String)>> {
        conn.query_row(
            &format!("SELECT {USER_COLUMNS}, password_hash FROM users WHERE email = ?"),
            [email],
            |row| Ok((User::from_row(row)?, row.get::<_, String>(11)?)),
        )
        .optional()
    }

    pub fn email_domain(&self) -> Option<String> {
        crate::stats::email_domain(&self.email)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DemoRequest {
    pub id: String,
    pub name: String,
    pub email: String,
    pub school: String,
    pub role: Option<String>,
    pub phone: Option<String>,
    pub message: Option<String>,
    pub status: String,
    pub created_at: String,
}

pub const DEMO_REQUEST_COLUMNS: &str =
    "id, name, email, school, role, phone, message, status, created_at";

impl DemoRequest {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            email: row.get(2)?,
            school: row.get(3)?,
            role: row.get(4)?,
            phone: row.get(5)?,
            message: row.get(6)?,
            status: row.get(7)?,
            created_at: row.get(8)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: String,
    pub name: String,
    pub domain: Option<String>,
    pub contact_name: Option<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub status: String,
    pub total_users: i64,
    pub total_students: i64,
    pub total_teachers: i64,
    pub created_at: String,
    pub updated_at: String,
}

pub const CLIENT_COLUMNS: &str = "id, name, domain, contact_name, contact_email, contact_phone, status, total_users, total_students, total_teachers, created_at, updated_at";

impl Client {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            domain: row.get(2)?,
            contact_name: row.get(3)?,
            contact_email: row.get(4)?,
            contact_phone: row.get(5)?,
            status: row.get(6)?,
            total_users: row.get(7)?,
            total_students: row.get(8)?,
            total_teachers: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }

    pub fn find_by_id(conn: &Connection, id: &str) -> rusqlite::Result<Option<Client>> {
        conn.query_row(
            &format!("SELECT {CLIENT_COLUMNS} FROM clients WHERE id = ?"),
            [id],
            Client::from_row,
        )
        .optional()
    }
}
