/// Authentication endpoints
///
/// # Endpoints
///
/// - `POST /v1/auth/register` - Create an account and its first organization
/// - `POST /v1/auth/login` - Exchange credentials for tokens
/// - `POST /v1/auth/refresh` - Exchange a refresh token for a new pair
/// - `GET /v1/auth/me` - Current user and their organizations
/// - `PATCH /v1/auth/me` - Update name and avatar
/// - `POST /v1/auth/password` - Change password
/// - `POST /v1/auth/switch-organization` - Tokens scoped to another organization
///
/// Registration is only routed while the `registration` feature is enabled.

use crate::{
    app::AppState,
    dal::Dal,
    error::ApiResult,
    extract::Json,
    response::ApiResponse,
};
use axum::extract::State;
use keystone_shared::{
    models::user::User,
    services::accounts::{
        self, ChangePasswordInput, LoginInput, Profile, RegisterInput, Session,
        UpdateProfileInput,
    },
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Refresh token request
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct SwitchOrganizationRequest {
    pub organization_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct PasswordChanged {
    pub changed: bool,
}

/// Register a new user
///
/// Creates the account plus an organization owned by it, and queues the
/// welcome and follow-up emails.
///
/// ```text
/// POST /v1/auth/register
///
/// { "email": "user@example.com", "password": "SecureP@ss123", "name": "Ada" }
/// ```
///
/// Errors: 409 when the email is taken, 422 for invalid input.
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterInput>,
) -> ApiResult<ApiResponse<Session>> {
    let session = accounts::register(&state, req).await?;

    tracing::info!(user_id = %session.user.id, "User registered");

    Ok(ApiResponse::created(session))
}

/// Login with email and password
///
/// Banned accounts and wrong credentials both answer 401.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginInput>,
) -> ApiResult<ApiResponse<Session>> {
    let session = accounts::authenticate(&state, req).await?;
    Ok(ApiResponse::ok(session))
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<ApiResponse<Session>> {
    let session = accounts::refresh(&state, &req.refresh_token).await?;
    Ok(ApiResponse::ok(session))
}

pub async fn me(dal: Dal) -> ApiResult<ApiResponse<Profile>> {
    dal.current_user().await?;
    let profile = accounts::profile(dal.services(), dal.user_id()).await?;
    Ok(ApiResponse::ok(profile))
}

pub async fn update_me(dal: Dal, Json(req): Json<UpdateProfileInput>) -> ApiResult<ApiResponse<User>> {
    dal.current_user().await?;
    let user = accounts::update_profile(dal.services(), dal.user_id(), req).await?;
    Ok(ApiResponse::ok(user))
}

/// Change password
///
/// Requires the current password. Tokens issued before the change stay
/// valid until they expire.
pub async fn change_password(
    dal: Dal,
    Json(req): Json<ChangePasswordInput>,
) -> ApiResult<ApiResponse<PasswordChanged>> {
    dal.current_user().await?;
    accounts::change_password(dal.services(), dal.user_id(), req).await?;
    Ok(ApiResponse::ok(PasswordChanged { changed: true }))
}

pub async fn switch_organization(
    dal: Dal,
    Json(req): Json<SwitchOrganizationRequest>,
) -> ApiResult<ApiResponse<Session>> {
    let auth = dal.auth().await?;
    let session = accounts::switch_organization(dal.services(), &auth, req.organization_id).await?;
    Ok(ApiResponse::ok(session))
}
