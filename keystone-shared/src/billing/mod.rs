//! Payment provider integration
//!
//! - [`gateway`]: outbound calls (checkout sessions, cancellation)
//! - [`signature`]: webhook signature scheme
//! - [`events`]: webhook payload parsing into [`events::BillingEvent`]
//!
//! Subscription state is only changed by verified webhooks. Checkout and
//! cancel requests ask the provider to act and wait for its event.

pub mod events;
pub mod gateway;
pub mod signature;

use std::sync::Arc;

pub use events::{BillingEvent, SubscriptionSnapshot, WebhookEnvelope};
pub use gateway::{
    CheckoutRequest, CheckoutSession, DisabledPaymentGateway, HttpPaymentGateway, PaymentGateway,
};
pub use signature::{sign_payload, verify_signature, SignatureError};

use crate::config::BillingConfig;

#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("Billing is not configured")]
    Disabled,

    #[error("Payment provider request failed: {0}")]
    Request(String),

    #[error("Payment provider returned {status}: {message}")]
    Provider { status: u16, message: String },

    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),

    #[error("Invalid billing configuration: {0}")]
    Config(String),
}

pub fn from_config(config: &BillingConfig) -> Result<Arc<dyn PaymentGateway>, BillingError> {
    match (&config.api_url, &config.api_key) {
        (Some(url), Some(key)) => {
            tracing::info!(url = %url, "Using HTTP payment gateway");
            Ok(Arc::new(HttpPaymentGateway::new(url, key)?))
        }
        _ => {
            tracing::warn!("BILLING_API_URL not set, checkout is disabled");
            Ok(Arc::new(DisabledPaymentGateway))
        }
    }
}
