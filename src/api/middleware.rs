//! Token gate and role gates applied as route layers.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::api::error::{ApiError, InternalErrorDetail};
use crate::api::types::{authenticate, authorize, AppState, AuthUser, NO_TOKEN};
use crate::models::Role;

pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = authenticate(&state, request.headers())?;
    tracing::debug!(user_id = %user.id, role = %user.role, path = %request.uri().path(), "authenticated");
    request.extensions_mut().insert(AuthUser(user));
    Ok(next.run(request).await)
}

fn require_roles(request: &Request, allowed: &[Role]) -> Result<(), ApiError> {
    let user = request
        .extensions()
        .get::<AuthUser>()
        .ok_or_else(|| ApiError::Unauthorized(NO_TOKEN.into()))?;
    authorize(&user.0, allowed)
}

pub async fn require_teacher(request: Request, next: Next) -> Result<Response, ApiError> {
    require_roles(&request, &[Role::Teacher])?;
    Ok(next.run(request).await)
}

pub async fn require_student(request: Request, next: Next) -> Result<Response, ApiError> {
    require_roles(&request, &[Role::Student])?;
    Ok(next.run(request).await)
}

/// Development only: puts the underlying error text back into 500 bodies.
pub async fn expose_internal_errors(response: Response) -> Response {
    match response.extensions().get::<InternalErrorDetail>().cloned() {
        Some(InternalErrorDetail(detail)) => {
            let body = ApiError::Internal(detail).body(true);
            (response.status(), Json(body)).into_response()
        }
        None => response,
    }
}
