//! API client used by the CLI subcommands.
//!
//! The session (token plus the user returned at login) is kept in a JSON
//! file. Any 401 from the server clears it, so a stale token never outlives
//! its first rejected request.

use anyhow::{anyhow, bail, Context};
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user: Value,
}

pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> anyhow::Result<Option<Session>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.to_string_lossy()))?;
        match serde_json::from_str(&text) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                tracing::warn!(path = %self.path.to_string_lossy(), error = %e, "ignoring corrupt session file");
                Ok(None)
            }
        }
    }

    pub fn save(&self, session: &Session) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let text = serde_json::to_string_pretty(session)?;
        std::fs::write(&self.path, text)
            .with_context(|| format!("failed to write {}", self.path.to_string_lossy()))?;
        Ok(())
    }

    pub fn clear(&self) -> anyhow::Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

pub struct ApiClient {
    client: Client,
    base_url: String,
    store: SessionStore,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, store: SessionStore) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            store,
        })
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    fn url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        let path = path.strip_prefix("api/").unwrap_or(path);
        format!("{}/api/{}", self.base_url, path)
    }

    /// Sends a request and returns the envelope's `data`.
    pub async fn request(&self, method: Method, path: &str, body: Option<&Value>) -> anyhow::Result<Value> {
        let mut req = self.client.request(method, self.url(path));
        if let Some(session) = self.store.load()? {
            req = req.bearer_auth(session.token);
        }
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().await?;
        let status = resp.status();
        let envelope: Value = resp.json().await.unwrap_or(Value::Null);

        if status == StatusCode::UNAUTHORIZED {
            self.store.clear()?;
        }
        unwrap_envelope(status, envelope)
    }

    pub async fn get(&self, path: &str) -> anyhow::Result<Value> {
        self.request(Method::GET, path, None).await
    }

    pub async fn login(&self, email: &str, password: &str) -> anyhow::Result<Session> {
        let data = self
            .request(
                Method::POST,
                "/auth/login",
                Some(&json!({ "email": email, "password": password })),
            )
            .await?;
        let session: Session =
            serde_json::from_value(data).context("login response missing token or user")?;
        self.store.save(&session)?;
        Ok(session)
    }

    pub async fn logout(&self) -> anyhow::Result<()> {
        if self.store.load()?.is_some() {
            if let Err(e) = self.request(Method::POST, "/auth/logout", None).await {
                tracing::debug!(error = %e, "server logout failed");
            }
        }
        self.store.clear()
    }
}

fn unwrap_envelope(status: StatusCode, envelope: Value) -> anyhow::Result<Value> {
    if status.is_success() && envelope["success"].as_bool().unwrap_or(false) {
        return Ok(envelope.get("data").cloned().unwrap_or(Value::Null));
    }
    let message = envelope["message"]
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| status.to_string());
    if let Some(errors) = envelope["errors"].as_array() {
        let details: Vec<&str> = errors.iter().filter_map(Value::as_str).collect();
        bail!("{} ({}): {}", message, status.as_u16(), details.join("; "));
    }
    Err(anyhow!("{} ({})", message, status.as_u16()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("munayd-client-{}", uuid::Uuid::new_v4()))
            .join(name)
    }

    #[test]
    fn session_round_trips_through_file() {
        let store = SessionStore::new(temp_path("session.json"));
        assert_eq!(store.load().expect("load"), None);

        let session = Session {
            token: "abc".into(),
            user: json!({ "id": "u1", "role": "teacher" }),
        };
        store.save(&session).expect("save");
        assert_eq!(store.load().expect("load"), Some(session));

        store.clear().expect("clear");
        assert_eq!(store.load().expect("load"), None);
        store.clear().expect("clear twice");
    }

    #[test]
    fn corrupt_session_is_treated_as_logged_out() {
        let path = temp_path("session.json");
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(&path, "{not json").expect("write");
        assert_eq!(SessionStore::new(path).load().expect("load"), None);
    }

    #[test]
    fn envelope_errors_carry_message_and_details() {
        let data = unwrap_envelope(StatusCode::OK, json!({ "success": true, "data": [1] }))
            .expect("ok");
        assert_eq!(data, json!([1]));

        let err = unwrap_envelope(
            StatusCode::BAD_REQUEST,
            json!({ "success": false, "message": "Validation failed", "errors": ["name is required"] }),
        )
        .expect_err("validation");
        assert_eq!(err.to_string(), "Validation failed (400): name is required");

        let err = unwrap_envelope(StatusCode::BAD_GATEWAY, Value::Null).expect_err("no body");
        assert!(err.to_string().contains("502"));
    }

    #[test]
    fn urls_accept_paths_with_or_without_api_prefix() {
        let client = ApiClient::new("http://localhost:5000/", SessionStore::new(temp_path("s.json")))
            .expect("client");
        assert_eq!(client.url("/classes"), "http://localhost:5000/api/classes");
        assert_eq!(client.url("api/classes"), "http://localhost:5000/api/classes");
    }
}
