//! Authentication middleware
//!
//! `require_auth` validates the bearer access token and inserts the
//! [`AuthContext`] together with a fresh [`RequestCache`] into the request
//! extensions. Handlers read both through the [`Dal`] extractor.

use crate::{
    app::AppState,
    dal::{Dal, RequestCache},
    error::ApiError,
};
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use keystone_shared::auth::middleware::{authenticate_bearer, AuthContext};

fn authorization_header(req: &Request) -> Option<&str> {
    req.headers().get(AUTHORIZATION).and_then(|v| v.to_str().ok())
}

/// Rejects requests without a valid access token.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth = authenticate_bearer(authorization_header(&req), state.jwt_secret())?;

    req.extensions_mut().insert(auth);
    req.extensions_mut().insert(RequestCache::new());

    Ok(next.run(req).await)
}

/// Authenticates when credentials are present and lets anonymous requests
/// through. A token that is present but invalid is still rejected.
pub async fn optional_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(header) = authorization_header(&req) {
        let auth = authenticate_bearer(Some(header), state.jwt_secret())?;
        req.extensions_mut().insert(auth);
        req.extensions_mut().insert(RequestCache::new());
    }

    Ok(next.run(req).await)
}

/// Lets only platform admins through, judged by the stored role rather than
/// the one in the token. Must run after [`require_auth`].
pub async fn admin_guard(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth = req
        .extensions()
        .get::<AuthContext>()
        .cloned()
        .ok_or_else(|| ApiError::Unauthorized("Missing credentials".to_string()))?;
    let cache = req.extensions().get::<RequestCache>().cloned().unwrap_or_default();

    // Shares the request cache, so handlers reuse the loaded user
    Dal::new(state.services.clone(), auth, cache).admin().await?;

    Ok(next.run(req).await)
}
