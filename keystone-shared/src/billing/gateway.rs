//! Outbound payment provider calls
//!
//! The provider speaks form-encoded requests and JSON responses:
//!
//! - `POST {base}/v1/checkout/sessions` creates a hosted checkout page
//! - `POST {base}/v1/subscriptions/{id}` with `cancel_at_period_end=true`
//!   schedules cancellation
//! - `DELETE {base}/v1/subscriptions/{id}` cancels immediately

use async_trait::async_trait;
use reqwest::header;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use super::BillingError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    pub organization_id: Uuid,
    pub price_id: String,
    pub customer_email: String,
    /// Existing provider customer, reused on plan changes
    pub customer_id: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
}

impl CheckoutRequest {
    pub(crate) fn form(&self) -> Vec<(String, String)> {
        let mut form = vec![
            ("mode".to_string(), "subscription".to_string()),
            ("line_items[0][price]".to_string(), self.price_id.clone()),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            ("success_url".to_string(), self.success_url.clone()),
            ("cancel_url".to_string(), self.cancel_url.clone()),
            (
                "client_reference_id".to_string(),
                self.organization_id.to_string(),
            ),
            (
                "metadata[organization_id]".to_string(),
                self.organization_id.to_string(),
            ),
            (
                "subscription_data[metadata][organization_id]".to_string(),
                self.organization_id.to_string(),
            ),
        ];

        match &self.customer_id {
            Some(customer) => form.push(("customer".to_string(), customer.clone())),
            None => form.push(("customer_email".to_string(), self.customer_email.clone())),
        }

        form
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn name(&self) -> &'static str;

    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, BillingError>;

    async fn cancel_subscription(
        &self,
        provider_subscription_id: &str,
        at_period_end: bool,
    ) -> Result<(), BillingError>;
}

pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPaymentGateway {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, BillingError> {
        let mut auth = header::HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|e| BillingError::Config(format!("invalid API key: {}", e)))?;
        auth.set_sensitive(true);

        let mut headers = header::HeaderMap::new();
        headers.insert(header::AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(20))
            .build()
            .map_err(|e| BillingError::Config(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, BillingError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
            .unwrap_or_else(|| body.chars().take(200).collect());

        Err(BillingError::Provider {
            status: status.as_u16(),
            message,
        })
    }
}

fn request_error(e: reqwest::Error) -> BillingError {
    BillingError::Request(e.to_string())
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, BillingError> {
        let response = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.base_url))
            .form(&request.form())
            .send()
            .await
            .map_err(request_error)?;

        let session: CheckoutSession = Self::check(response)
            .await?
            .json()
            .await
            .map_err(request_error)?;

        tracing::info!(
            organization_id = %request.organization_id,
            session_id = %session.id,
            "Checkout session created"
        );
        Ok(session)
    }

    async fn cancel_subscription(
        &self,
        provider_subscription_id: &str,
        at_period_end: bool,
    ) -> Result<(), BillingError> {
        let url = format!("{}/v1/subscriptions/{}", self.base_url, provider_subscription_id);

        let request = if at_period_end {
            self.client
                .post(url)
                .form(&[("cancel_at_period_end", "true")])
        } else {
            self.client.delete(url)
        };

        let response = request.send().await.map_err(request_error)?;
        Self::check(response).await?;

        tracing::info!(
            subscription_id = %provider_subscription_id,
            at_period_end,
            "Subscription cancellation requested"
        );
        Ok(())
    }
}

/// Gateway used when no provider is configured
#[derive(Debug, Default)]
pub struct DisabledPaymentGateway;

#[async_trait]
impl PaymentGateway for DisabledPaymentGateway {
    fn name(&self) -> &'static str {
        "disabled"
    }

    async fn create_checkout_session(
        &self,
        _request: &CheckoutRequest,
    ) -> Result<CheckoutSession, BillingError> {
        Err(BillingError::Disabled)
    }

    async fn cancel_subscription(
        &self,
        _provider_subscription_id: &str,
        _at_period_end: bool,
    ) -> Result<(), BillingError> {
        Err(BillingError::Disabled)
    }
}
