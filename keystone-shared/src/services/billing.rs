//! Plans, subscriptions and payment webhooks
//!
//! Owners start checkout and request cancellation; neither touches the
//! `subscriptions` table. The provider reports the outcome through a signed
//! webhook, and [`handle_webhook`] mirrors it locally.
//!
//! Webhooks are processed at most once per event id. When applying an event
//! fails, its id is forgotten again so the provider's retry is handled.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{
    intercept,
    notifications::{kinds, notify},
    ServiceContext, ServiceError, ServiceResult,
};
use crate::{
    auth::authorization::{require_org_role, require_permission, OrgActor, ResourcePermission},
    billing::{
        verify_signature, BillingError, BillingEvent, CheckoutRequest, CheckoutSession,
        SignatureError, SubscriptionSnapshot, WebhookEnvelope,
    },
    email::templates,
    models::{
        billing_event::BillingEventLog,
        file::StoredFile,
        membership::{Membership, MembershipRole},
        notification::CreateNotification,
        organization::Organization,
        plan::Plan,
        project::Project,
        subscription::{Subscription, SubscriptionStatus, UpsertSubscription},
        user::User,
    },
};

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutInput {
    pub plan: String,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Usage {
    pub projects: i64,
    pub members: i64,
    pub storage_bytes: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionOverview {
    pub plan: Plan,
    pub subscription: Option<Subscription>,
    pub usage: Usage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookOutcome {
    Processed,
    Duplicate,
    Ignored,
}

pub async fn plans(ctx: &ServiceContext) -> ServiceResult<Vec<Plan>> {
    intercept("billing.plans", async move { Ok(Plan::list_active(&ctx.db).await?) }).await
}

pub async fn subscription(ctx: &ServiceContext, actor: &OrgActor) -> ServiceResult<SubscriptionOverview> {
    intercept("billing.subscription", async move {
        require_permission(actor, ResourcePermission::Read)?;
        let org = actor.organization_id;

        let plan = Plan::for_organization(&ctx.db, org).await?;
        let subscription = Subscription::find_by_organization(&ctx.db, org).await?;
        let usage = Usage {
            projects: Project::count_by_organization(&ctx.db, org).await?,
            members: Membership::count_by_organization(&ctx.db, org).await?,
            storage_bytes: StoredFile::total_bytes_by_organization(&ctx.db, org).await?,
        };

        Ok(SubscriptionOverview {
            plan,
            subscription,
            usage,
        })
    })
    .await
}

pub async fn checkout(
    ctx: &ServiceContext,
    actor: &OrgActor,
    input: CheckoutInput,
) -> ServiceResult<CheckoutSession> {
    intercept("billing.checkout", async move {
        require_org_role(actor, MembershipRole::Owner)?;

        let plan = Plan::find_by_slug(&ctx.db, input.plan.trim())
            .await?
            .filter(|p| p.active)
            .ok_or(ServiceError::NotFound("Plan"))?;
        let price_id = match (&plan.provider_price_id, plan.is_free()) {
            (Some(price), false) => price.clone(),
            _ => return Err(ServiceError::invalid("plan", "This plan cannot be purchased")),
        };

        let owner = User::find_by_id(&ctx.db, actor.user_id)
            .await?
            .ok_or(ServiceError::NotFound("User"))?;
        let existing = Subscription::find_by_organization(&ctx.db, actor.organization_id).await?;

        let billing_url = format!(
            "{}/organizations/{}/billing",
            ctx.settings.app_url, actor.organization_id
        );
        let request = CheckoutRequest {
            organization_id: actor.organization_id,
            price_id,
            customer_email: owner.email,
            customer_id: existing.and_then(|s| s.provider_customer_id),
            success_url: format!("{}?checkout=success", billing_url),
            cancel_url: format!("{}?checkout=canceled", billing_url),
        };

        let session = ctx.payments.create_checkout_session(&request).await?;
        tracing::info!(
            organization_id = %actor.organization_id,
            plan = %plan.slug,
            session_id = %session.id,
            "Checkout session created"
        );
        Ok(session)
    })
    .await
}

/// Asks the provider to cancel at the end of the paid period.
pub async fn cancel(ctx: &ServiceContext, actor: &OrgActor) -> ServiceResult<Subscription> {
    intercept("billing.cancel", async move {
        require_org_role(actor, MembershipRole::Owner)?;

        let subscription = Subscription::find_by_organization(&ctx.db, actor.organization_id)
            .await?
            .filter(|s| s.status.is_live())
            .ok_or(ServiceError::NotFound("Subscription"))?;
        let provider_id = subscription
            .provider_subscription_id
            .as_deref()
            .ok_or(ServiceError::NotFound("Subscription"))?;

        ctx.payments.cancel_subscription(provider_id, true).await?;
        tracing::info!(
            organization_id = %actor.organization_id,
            subscription_id = %subscription.id,
            "Cancellation requested"
        );
        Ok(subscription)
    })
    .await
}

/// Verifies, deduplicates and applies a webhook delivery.
pub async fn handle_webhook(
    ctx: &ServiceContext,
    payload: &[u8],
    signature_header: Option<&str>,
) -> ServiceResult<WebhookOutcome> {
    intercept("billing.handle_webhook", async move {
        let secret = ctx
            .settings
            .webhook_secret
            .as_deref()
            .ok_or(BillingError::Disabled)?;
        let header = signature_header.ok_or(SignatureError::Malformed)?;
        verify_signature(
            payload,
            header,
            secret,
            ctx.settings.webhook_tolerance_secs,
            Utc::now().timestamp(),
        )?;

        let envelope = WebhookEnvelope::parse(payload)?;
        let event = envelope.to_event()?;
        if let BillingEvent::Ignored(kind) = &event {
            tracing::debug!(event_id = %envelope.id, kind = %kind, "Ignoring webhook event");
            return Ok(WebhookOutcome::Ignored);
        }

        if !BillingEventLog::record(&ctx.db, &envelope.id, &envelope.event_type).await? {
            tracing::info!(event_id = %envelope.id, "Duplicate webhook delivery");
            return Ok(WebhookOutcome::Duplicate);
        }

        if let Err(e) = apply(ctx, event).await {
            if let Err(forget) = BillingEventLog::forget(&ctx.db, &envelope.id).await {
                tracing::error!(event_id = %envelope.id, error = %forget, "Failed to release webhook event");
            }
            return Err(e);
        }

        tracing::info!(event_id = %envelope.id, event_type = %envelope.event_type, "Webhook processed");
        Ok(WebhookOutcome::Processed)
    })
    .await
}

async fn apply(ctx: &ServiceContext, event: BillingEvent) -> ServiceResult<()> {
    match event {
        BillingEvent::CheckoutCompleted {
            organization_id,
            subscription_id,
            ..
        } => {
            // The subscription event that follows carries the plan
            tracing::info!(
                organization_id = %organization_id,
                subscription_id = ?subscription_id,
                "Checkout completed"
            );
            Ok(())
        }
        BillingEvent::SubscriptionUpdated(snapshot) => apply_snapshot(ctx, snapshot).await,
        BillingEvent::SubscriptionDeleted { subscription_id } => {
            let Some(existing) =
                Subscription::find_by_provider_subscription(&ctx.db, &subscription_id).await?
            else {
                tracing::warn!(subscription_id = %subscription_id, "Deleted subscription is unknown");
                return Ok(());
            };

            let updated = Subscription::update_status(
                &ctx.db,
                existing.id,
                SubscriptionStatus::Canceled,
                false,
            )
            .await?
            .ok_or(ServiceError::NotFound("Subscription"))?;

            let plan = Plan::find_by_id(&ctx.db, updated.plan_id).await?;
            announce(ctx, &updated, plan.as_ref()).await;
            Ok(())
        }
        BillingEvent::Ignored(_) => Ok(()),
    }
}

async fn apply_snapshot(ctx: &ServiceContext, snapshot: SubscriptionSnapshot) -> ServiceResult<()> {
    let existing = Subscription::find_by_provider_subscription(&ctx.db, &snapshot.subscription_id).await?;

    let organization_id = snapshot
        .organization_id
        .or_else(|| existing.as_ref().map(|s| s.organization_id))
        .ok_or_else(|| {
            BillingError::InvalidPayload("subscription has no organization".to_string())
        })?;

    if Organization::find_by_id(&ctx.db, organization_id).await?.is_none() {
        tracing::warn!(organization_id = %organization_id, "Subscription for unknown organization");
        return Ok(());
    }

    let price_id = snapshot
        .price_id
        .as_deref()
        .ok_or_else(|| BillingError::InvalidPayload("subscription has no price".to_string()))?;
    let plan = Plan::find_by_provider_price(&ctx.db, price_id)
        .await?
        .ok_or_else(|| BillingError::InvalidPayload(format!("unknown price '{}'", price_id)))?;

    let status = SubscriptionStatus::from_provider(&snapshot.status);
    let changed = existing.as_ref().map_or(true, |s| {
        s.status != status || s.plan_id != plan.id || s.cancel_at_period_end != snapshot.cancel_at_period_end
    });

    let subscription = Subscription::upsert_for_organization(
        &ctx.db,
        UpsertSubscription {
            organization_id,
            plan_id: plan.id,
            status,
            provider_customer_id: snapshot.customer_id,
            provider_subscription_id: Some(snapshot.subscription_id),
            current_period_end: snapshot.current_period_end,
            cancel_at_period_end: snapshot.cancel_at_period_end,
        },
    )
    .await?;

    if changed {
        announce(ctx, &subscription, Some(&plan)).await;
    }
    Ok(())
}

/// Tells the organization's owner about a subscription change, in-app and
/// by email. Failures are logged only.
async fn announce(ctx: &ServiceContext, subscription: &Subscription, plan: Option<&Plan>) {
    let organization_id = subscription.organization_id;
    let owner = match Membership::find_owner(&ctx.db, organization_id).await {
        Ok(Some(owner)) => owner,
        Ok(None) => return,
        Err(e) => {
            tracing::warn!(organization_id = %organization_id, error = %e, "Failed to look up owner");
            return;
        }
    };

    let plan_name = plan.map(|p| p.name.as_str()).unwrap_or("current");
    let status = if subscription.cancel_at_period_end && subscription.status.is_live() {
        "set to cancel"
    } else {
        subscription.status.as_str()
    };

    notify(
        ctx,
        CreateNotification {
            user_id: owner,
            organization_id: Some(organization_id),
            kind: kinds::SUBSCRIPTION_CHANGED.to_string(),
            title: format!("Subscription {}", status),
            body: Some(format!("Plan: {}", plan_name)),
            link: Some(format!("/organizations/{}/billing", organization_id)),
        },
    )
    .await;

    let recipient = User::find_by_id(&ctx.db, owner).await;
    let organization = Organization::find_by_id(&ctx.db, organization_id).await;
    if let (Ok(Some(user)), Ok(Some(org))) = (recipient, organization) {
        let message = templates::subscription_changed(&user.email, &org.name, plan_name, status);
        if let Err(e) = ctx.mailer.send(&message).await {
            tracing::warn!(organization_id = %organization_id, error = %e, "Failed to send subscription email");
        }
    }
}
