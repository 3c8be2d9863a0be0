use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use std::sync::Arc;

use crate::api::error::ApiError;
use crate::auth::{PasswordPolicy, TokenError, TokenSigner};
use crate::config::Config;
use crate::db::Db;
use crate::models::{Role, User};
use crate::notify::Notifier;

pub const NO_TOKEN: &str = "Not authorized, no token";
pub const INVALID_TOKEN: &str = "Not authorized, invalid token";
pub const EXPIRED_TOKEN: &str = "Not authorized, token expired";
pub const UNKNOWN_USER: &str = "Not authorized, user not found";

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub config: Arc<Config>,
    pub tokens: Arc<TokenSigner>,
    pub passwords: Arc<PasswordPolicy>,
    pub notifier: Arc<dyn Notifier>,
}

impl AppState {
    pub fn new(config: Config, db: Db, notifier: Arc<dyn Notifier>) -> anyhow::Result<Self> {
        config.validate()?;
        let tokens = TokenSigner::new(&config.jwt_secret, config.token_ttl_secs);
        let passwords = PasswordPolicy::new(config.argon2_memory_kib, config.argon2_iterations)?;
        Ok(Self {
            db,
            config: Arc::new(config),
            tokens: Arc::new(tokens),
            passwords: Arc::new(passwords),
            notifier,
        })
    }

    /// The hardcoded owner account gets the cross-tenant admin view.
    pub fn is_owner(&self, user: &User) -> bool {
        self.config.is_owner_email(&user.email)
    }
}

/// The authenticated caller, resolved from the bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

pub fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<User, ApiError> {
    let token = bearer_token(headers).ok_or_else(|| ApiError::Unauthorized(NO_TOKEN.into()))?;
    let claims = state.tokens.verify(&token).map_err(|e| match e {
        TokenError::Expired => ApiError::Unauthorized(EXPIRED_TOKEN.into()),
        TokenError::Invalid => ApiError::Unauthorized(INVALID_TOKEN.into()),
    })?;
    let conn = state.db.lock();
    User::find_by_id(&conn, &claims.sub)?.ok_or_else(|| ApiError::Unauthorized(UNKNOWN_USER.into()))
}

pub fn authorize(user: &User, allowed: &[Role]) -> Result<(), ApiError> {
    if allowed.contains(&user.role) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(format!(
            "Role '{}' is not authorized to access this route",
            user.role
        )))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(user.clone());
        }
        authenticate(state, &parts.headers).map(AuthUser)
    }
}
