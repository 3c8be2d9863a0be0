//! Service configuration read from the environment.
//!
//! Variables:
//! - `MUNAY_HOST` / `MUNAY_PORT`: bind address (default `0.0.0.0:5000`)
//! - `MUNAY_DB_PATH`: SQLite file (default `data/munay.sqlite3`, `:memory:` allowed)
//! - `MUNAY_ENV`: `development` (default) or `production`
//! - `MUNAY_JWT_SECRET`: token signing secret, required in production
//! - `MUNAY_TOKEN_TTL_SECS`: token lifetime (default 7 days)
//! - `MUNAY_OWNER_EMAIL`: owner account for the admin dashboard
//! - `MUNAY_CORS`: enable permissive CORS (default true)
//! - `MUNAY_ARGON2_MEMORY_KIB`, `MUNAY_ARGON2_ITERATIONS`: password hashing cost
//! - `SMTP_HOST`, `SMTP_PORT`, `SMTP_USERNAME`, `SMTP_PASSWORD`,
//!   `MUNAY_MAIL_FROM`, `MUNAY_NOTIFY_TO`: demo request emails

use anyhow::{anyhow, bail, Context};
use std::path::PathBuf;

pub const DEFAULT_OWNER_EMAIL: &str = "munay@munay.com";
const DEV_JWT_SECRET: &str = "munay-development-secret-change-me-0000";
const MIN_SECRET_LENGTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    fn parse(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(anyhow!("unknown MUNAY_ENV: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
    pub notify_to: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub environment: Environment,
    pub jwt_secret: String,
    pub token_ttl_secs: i64,
    pub owner_email: String,
    pub enable_cors: bool,
    pub argon2_memory_kib: u32,
    pub argon2_iterations: u32,
    pub smtp: Option<SmtpConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            db_path: PathBuf::from("data/munay.sqlite3"),
            environment: Environment::Development,
            jwt_secret: DEV_JWT_SECRET.to_string(),
            token_ttl_secs: 7 * 24 * 60 * 60,
            owner_email: DEFAULT_OWNER_EMAIL.to_string(),
            enable_cors: true,
            argon2_memory_kib: 19 * 1024,
            argon2_iterations: 2,
            smtp: None,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let mut cfg = Config::default();

        if let Ok(v) = std::env::var("MUNAY_HOST") {
            cfg.host = v;
        }
        if let Ok(v) = std::env::var("MUNAY_PORT") {
            cfg.port = v.parse().context("MUNAY_PORT must be a port number")?;
        }
        if let Ok(v) = std::env::var("MUNAY_DB_PATH") {
            cfg.db_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("MUNAY_ENV") {
            cfg.environment = Environment::parse(&v)?;
        }
        match std::env::var("MUNAY_JWT_SECRET") {
            Ok(v) => cfg.jwt_secret = v,
            Err(_) if cfg.environment == Environment::Production => {
                bail!("MUNAY_JWT_SECRET must be set in production")
            }
            Err(_) => {}
        }
        if let Ok(v) = std::env::var("MUNAY_TOKEN_TTL_SECS") {
            cfg.token_ttl_secs = v.parse().context("MUNAY_TOKEN_TTL_SECS must be an integer")?;
        }
        if let Ok(v) = std::env::var("MUNAY_OWNER_EMAIL") {
            cfg.owner_email = v.trim().to_ascii_lowercase();
        }
        if let Ok(v) = std::env::var("MUNAY_CORS") {
            cfg.enable_cors = v.to_lowercase() == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("MUNAY_ARGON2_MEMORY_KIB") {
            cfg.argon2_memory_kib = v.parse().context("MUNAY_ARGON2_MEMORY_KIB must be an integer")?;
        }
        if let Ok(v) = std::env::var("MUNAY_ARGON2_ITERATIONS") {
            cfg.argon2_iterations = v.parse().context("MUNAY_ARGON2_ITERATIONS must be an integer")?;
        }

        if let Ok(host) = std::env::var("SMTP_HOST") {
            let port = match std::env::var("SMTP_PORT") {
                Ok(v) => v.parse().context("SMTP_PORT must be a port number")?,
                Err(_) => 587,
            };
            let from = std::env::var("MUNAY_MAIL_FROM")
                .unwrap_or_else(|_| "Munay <no-reply@munay.com>".to_string());
            let notify_to =
                std::env::var("MUNAY_NOTIFY_TO").unwrap_or_else(|_| cfg.owner_email.clone());
            cfg.smtp = Some(SmtpConfig {
                host,
                port,
                username: std::env::var("SMTP_USERNAME").ok(),
                password: std::env::var("SMTP_PASSWORD").ok(),
                from,
                notify_to,
            });
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Development settings over an in-memory database with cheap password
    /// hashing, for tests and throwaway local runs.
    pub fn in_memory() -> Self {
        Self {
            db_path: PathBuf::from(":memory:"),
            argon2_memory_kib: 256,
            argon2_iterations: 1,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.jwt_secret.len() < MIN_SECRET_LENGTH {
            bail!(
                "MUNAY_JWT_SECRET must be at least {} bytes, got {}",
                MIN_SECRET_LENGTH,
                self.jwt_secret.len()
            );
        }
        if self.token_ttl_secs <= 0 {
            bail!("MUNAY_TOKEN_TTL_SECS must be positive");
        }
        Ok(())
    }

    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }

    pub fn is_owner_email(&self, email: &str) -> bool {
        email.trim().eq_ignore_ascii_case(&self.owner_email)
    }
}
