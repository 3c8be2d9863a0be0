//! HTTP API: axum router, auth extractors and handlers.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod types;

pub use error::{ApiError, ApiResult};
pub use types::{AppState, AuthUser};

use axum::Router;

/// Router for `state`. 500 detail is exposed only in development.
pub fn app(state: AppState) -> Router {
    router::create_router(state)
}
