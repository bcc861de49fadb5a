//! Webhook payloads
//!
//! Only the event types that change subscription state are understood;
//! everything else parses to [`BillingEvent::Ignored`] and is acknowledged.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::BillingError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEnvelope {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub created: Option<i64>,
    pub data: WebhookData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookData {
    pub object: JsonValue,
}

/// Provider view of a subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionSnapshot {
    pub subscription_id: String,
    pub customer_id: Option<String>,
    pub status: String,
    pub price_id: Option<String>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    /// From subscription metadata, set at checkout
    pub organization_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum BillingEvent {
    CheckoutCompleted {
        organization_id: Uuid,
        customer_id: Option<String>,
        subscription_id: Option<String>,
    },
    SubscriptionUpdated(SubscriptionSnapshot),
    SubscriptionDeleted {
        subscription_id: String,
    },
    Ignored(String),
}

fn str_field(object: &JsonValue, name: &str) -> Option<String> {
    object[name]
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn metadata_org(object: &JsonValue) -> Option<Uuid> {
    object["metadata"]["organization_id"]
        .as_str()
        .and_then(|s| Uuid::parse_str(s).ok())
}

fn required(object: &JsonValue, name: &str) -> Result<String, BillingError> {
    str_field(object, name)
        .ok_or_else(|| BillingError::InvalidPayload(format!("missing field '{}'", name)))
}

impl WebhookEnvelope {
    pub fn parse(payload: &[u8]) -> Result<Self, BillingError> {
        serde_json::from_slice(payload).map_err(|e| BillingError::InvalidPayload(e.to_string()))
    }

    pub fn to_event(&self) -> Result<BillingEvent, BillingError> {
        let object = &self.data.object;

        match self.event_type.as_str() {
            "checkout.session.completed" => {
                let organization_id = str_field(object, "client_reference_id")
                    .and_then(|s| Uuid::parse_str(&s).ok())
                    .or_else(|| metadata_org(object))
                    .ok_or_else(|| {
                        BillingError::InvalidPayload("checkout without organization".to_string())
                    })?;

                Ok(BillingEvent::CheckoutCompleted {
                    organization_id,
                    customer_id: str_field(object, "customer"),
                    subscription_id: str_field(object, "subscription"),
                })
            }
            "customer.subscription.created" | "customer.subscription.updated" => {
                let current_period_end = object["current_period_end"]
                    .as_i64()
                    .and_then(|ts| Utc.timestamp_opt(ts, 0).single());

                Ok(BillingEvent::SubscriptionUpdated(SubscriptionSnapshot {
                    subscription_id: required(object, "id")?,
                    customer_id: str_field(object, "customer"),
                    status: required(object, "status")?,
                    price_id: object["items"]["data"][0]["price"]["id"]
                        .as_str()
                        .map(str::to_string),
                    current_period_end,
                    cancel_at_period_end: object["cancel_at_period_end"]
                        .as_bool()
                        .unwrap_or(false),
                    organization_id: metadata_org(object),
                }))
            }
            "customer.subscription.deleted" => Ok(BillingEvent::SubscriptionDeleted {
                subscription_id: required(object, "id")?,
            }),
            other => Ok(BillingEvent::Ignored(other.to_string())),
        }
    }
}
