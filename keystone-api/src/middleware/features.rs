//! Feature flag guards
//!
//! Routes of a disabled feature answer 404, as if they did not exist.

use crate::{app::AppState, error::ApiError};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use keystone_shared::config::Feature;

async fn guard(state: &AppState, feature: Feature, req: Request, next: Next) -> Result<Response, ApiError> {
    if !state.config.features.is_enabled(feature) {
        tracing::debug!(feature = feature.as_str(), path = %req.uri().path(), "Feature disabled");
        return Err(ApiError::NotFound("Not found".to_string()));
    }

    Ok(next.run(req).await)
}

pub async fn require_registration(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    guard(&state, Feature::Registration, req, next).await
}

pub async fn require_blog(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    guard(&state, Feature::Blog, req, next).await
}

pub async fn require_billing(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    guard(&state, Feature::Billing, req, next).await
}
