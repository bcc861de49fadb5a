//! Transactional email provider client
//!
//! Sends `POST {api_url}` with a JSON body
//! `{ "from", "to": [..], "subject", "html", "text" }` and a bearer key.

use async_trait::async_trait;
use reqwest::header;
use serde::Serialize;
use std::time::Duration;

use super::{EmailError, EmailMessage, EmailSender};

pub struct HttpEmailSender {
    client: reqwest::Client,
    api_url: String,
    from: String,
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
    text: &'a str,
}

impl HttpEmailSender {
    pub fn new(api_url: &str, api_key: &str, from: &str) -> Result<Self, EmailError> {
        let mut auth = header::HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|e| EmailError::Config(format!("invalid API key: {}", e)))?;
        auth.set_sensitive(true);

        let mut headers = header::HeaderMap::new();
        headers.insert(header::AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| EmailError::Config(e.to_string()))?;

        Ok(Self {
            client,
            api_url: api_url.to_string(),
            from: from.to_string(),
        })
    }
}

#[async_trait]
impl EmailSender for HttpEmailSender {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        let body = SendRequest {
            from: &self.from,
            to: [&message.to],
            subject: &message.subject,
            html: &message.html,
            text: &message.text,
        };

        let response = self
            .client
            .post(&self.api_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| EmailError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(EmailError::Provider {
                status: status.as_u16(),
                message: message.chars().take(200).collect(),
            });
        }

        tracing::debug!(to = %message.to, subject = %message.subject, "Email sent");
        Ok(())
    }
}
