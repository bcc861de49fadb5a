//! Outgoing email
//!
//! Services and the worker talk to an [`EmailSender`]. Which one is used
//! depends on configuration: [`HttpEmailSender`] posts to a transactional
//! email provider, [`LogEmailSender`] only logs, and [`MemoryEmailSender`]
//! records messages for tests.

pub mod http;
pub mod templates;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

pub use http::HttpEmailSender;

use crate::config::EmailConfig;

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("Email request failed: {0}")]
    Request(String),

    #[error("Email provider returned {status}: {message}")]
    Provider { status: u16, message: String },

    #[error("Invalid email configuration: {0}")]
    Config(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError>;
}

/// Writes messages to the log instead of delivering them
#[derive(Debug, Default)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        tracing::info!(
            to = %message.to,
            subject = %message.subject,
            "Email not delivered (no provider configured)"
        );
        Ok(())
    }
}

/// Keeps every sent message; can be told to fail
#[derive(Debug, Default)]
pub struct MemoryEmailSender {
    sent: Mutex<Vec<EmailMessage>>,
    fail: Mutex<bool>,
}

impl MemoryEmailSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn sent_to(&self, address: &str) -> Vec<EmailMessage> {
        self.sent()
            .into_iter()
            .filter(|m| m.to.eq_ignore_ascii_case(address))
            .collect()
    }

    pub fn set_failing(&self, fail: bool) {
        if let Ok(mut flag) = self.fail.lock() {
            *flag = fail;
        }
    }
}

#[async_trait]
impl EmailSender for MemoryEmailSender {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        if self.fail.lock().map(|f| *f).unwrap_or(false) {
            return Err(EmailError::Provider {
                status: 503,
                message: "simulated outage".to_string(),
            });
        }

        if let Ok(mut sent) = self.sent.lock() {
            sent.push(message.clone());
        }
        Ok(())
    }
}

pub fn from_config(config: &EmailConfig) -> Result<Arc<dyn EmailSender>, EmailError> {
    match (&config.api_url, &config.api_key) {
        (Some(url), Some(key)) => {
            tracing::info!(url = %url, "Using HTTP email provider");
            Ok(Arc::new(HttpEmailSender::new(url, key, &config.from)?))
        }
        (Some(_), None) => Err(EmailError::Config(
            "EMAIL_API_KEY is required with EMAIL_API_URL".to_string(),
        )),
        (None, _) => {
            tracing::warn!("EMAIL_API_URL not set, emails are logged only");
            Ok(Arc::new(LogEmailSender))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(to: &str) -> EmailMessage {
        EmailMessage {
            to: to.to_string(),
            subject: "Hi".to_string(),
            html: "<p>Hi</p>".to_string(),
            text: "Hi".to_string(),
        }
    }

    #[tokio::test]
    async fn test_memory_sender_records() {
        let sender = MemoryEmailSender::new();
        sender.send(&message("a@example.com")).await.unwrap();
        sender.send(&message("b@example.com")).await.unwrap();

        assert_eq!(sender.sent().len(), 2);
        assert_eq!(sender.sent_to("A@example.com").len(), 1);
    }

    #[tokio::test]
    async fn test_memory_sender_failure_mode() {
        let sender = MemoryEmailSender::new();
        sender.set_failing(true);
        assert!(sender.send(&message("a@example.com")).await.is_err());
        assert!(sender.sent().is_empty());

        sender.set_failing(false);
        assert!(sender.send(&message("a@example.com")).await.is_ok());
    }

    #[tokio::test]
    async fn test_log_sender_is_default() {
        let sender = from_config(&EmailConfig::default()).unwrap();
        assert_eq!(sender.name(), "log");
        assert!(sender.send(&message("a@example.com")).await.is_ok());
    }
}
