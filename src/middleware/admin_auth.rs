use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

use crate::db::AppState;
use crate::util::extract_bearer_token;

/// Require `Authorization: Bearer <ADMIN_API_KEY>` on admin routes.
///
/// With no key configured every request is rejected.
pub async fn admin_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(expected) = state.admin_api_key.as_deref() else {
        tracing::warn!("Admin request rejected: ADMIN_API_KEY not configured");
        return Err(StatusCode::UNAUTHORIZED);
    };

    let presented = extract_bearer_token(request.headers()).ok_or(StatusCode::UNAUTHORIZED)?;

    if !bool::from(presented.as_bytes().ct_eq(expected.as_bytes())) {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(request).await)
}
