/// Billing endpoints
///
/// # Endpoints
///
/// - `GET /v1/billing/plans` - Public plan catalog
/// - `GET /v1/organizations/:org_id/subscription` - Plan, subscription and usage
/// - `POST /v1/organizations/:org_id/billing/checkout` - Start a hosted checkout
/// - `POST /v1/organizations/:org_id/billing/cancel` - Cancel at period end
/// - `POST /v1/billing/webhook` - Payment provider events
///
/// Checkout and cancel only talk to the provider; the local subscription
/// changes when the provider's webhook arrives. Routed only while the
/// `billing` feature is enabled.

use crate::{
    app::AppState,
    dal::Dal,
    error::ApiResult,
    extract::{Json, Path},
    response::ApiResponse,
};
use axum::{body::Bytes, extract::State, http::HeaderMap};
use keystone_shared::{
    billing::{gateway::CheckoutSession, signature::SIGNATURE_HEADER},
    models::{plan::Plan, subscription::Subscription},
    services::billing::{self, CheckoutInput, SubscriptionOverview, WebhookOutcome},
};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct WebhookReceipt {
    pub received: bool,
    pub outcome: WebhookOutcome,
}

pub async fn plans(State(state): State<AppState>) -> ApiResult<ApiResponse<Vec<Plan>>> {
    let plans = billing::plans(&state).await?;
    Ok(ApiResponse::ok(plans))
}

pub async fn subscription(dal: Dal, Path(org_id): Path<Uuid>) -> ApiResult<ApiResponse<SubscriptionOverview>> {
    let actor = dal.actor(org_id).await?;
    let overview = billing::subscription(dal.services(), &actor).await?;
    Ok(ApiResponse::ok(overview))
}

/// Start checkout for a paid plan (owners only)
///
/// Returns the provider's hosted checkout URL. Errors: 422 for unknown or
/// free plans, 502 when the provider call fails.
pub async fn checkout(
    dal: Dal,
    Path(org_id): Path<Uuid>,
    Json(req): Json<CheckoutInput>,
) -> ApiResult<ApiResponse<CheckoutSession>> {
    let actor = dal.actor(org_id).await?;
    let session = billing::checkout(dal.services(), &actor, req).await?;
    Ok(ApiResponse::ok(session))
}

pub async fn cancel(dal: Dal, Path(org_id): Path<Uuid>) -> ApiResult<ApiResponse<Subscription>> {
    let actor = dal.actor(org_id).await?;
    let subscription = billing::cancel(dal.services(), &actor).await?;
    Ok(ApiResponse::ok(subscription))
}

/// Receive a provider event
///
/// The raw body is verified against the signature header before parsing.
/// Replayed event ids answer 200 without reprocessing.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<ApiResponse<WebhookReceipt>> {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());

    let outcome = billing::handle_webhook(&state, &body, signature).await?;

    Ok(ApiResponse::ok(WebhookReceipt {
        received: true,
        outcome,
    }))
}
