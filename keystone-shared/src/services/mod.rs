//! Service facades
//!
//! Each submodule groups the operations of one area. Handlers and the
//! worker call these functions instead of touching models directly, so
//! authorization, plan limits and side effects (notifications, emails, jobs)
//! happen in one place.
//!
//! Every public operation runs through [`intercept`], which opens a
//! `service` span named after the operation and logs how it ended.

pub mod accounts;
pub mod admin;
pub mod billing;
pub mod files;
pub mod notifications;
pub mod organizations;
pub mod posts;
pub mod projects;
pub mod tasks;

use serde::Serialize;
use sqlx::PgPool;
use std::{future::Future, sync::Arc, time::Instant};
use tracing::Instrument;
use validator::{Validate, ValidationErrors};

use crate::{
    auth::{authorization::AuthzError, jwt::JwtError, password::PasswordError},
    billing::{BillingError, PaymentGateway, SignatureError},
    config::UploadConfig,
    email::{EmailError, EmailSender},
    limits::LimitError,
    rate_limit::{RateLimited, RateLimiters},
    storage::{StorageAdapter, StorageError},
};

/// Settings the services need beyond their collaborators
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Public frontend URL used in emails and checkout redirects
    pub app_url: String,
    pub jwt_secret: String,
    pub upload: UploadConfig,
    pub webhook_secret: Option<String>,
    pub webhook_tolerance_secs: i64,
    pub follow_up_delay: chrono::Duration,
}

impl ServiceSettings {
    pub fn new(app_url: impl Into<String>, jwt_secret: impl Into<String>) -> Self {
        Self {
            app_url: app_url.into().trim_end_matches('/').to_string(),
            jwt_secret: jwt_secret.into(),
            upload: UploadConfig::default(),
            webhook_secret: None,
            webhook_tolerance_secs: crate::billing::signature::DEFAULT_TOLERANCE_SECS,
            follow_up_delay: chrono::Duration::hours(72),
        }
    }
}

/// Collaborators shared by every service call
#[derive(Clone)]
pub struct ServiceContext {
    pub db: PgPool,
    pub storage: Arc<dyn StorageAdapter>,
    pub mailer: Arc<dyn EmailSender>,
    pub payments: Arc<dyn PaymentGateway>,
    pub limiters: RateLimiters,
    pub settings: Arc<ServiceSettings>,
}

impl std::fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContext")
            .field("storage", &self.storage.name())
            .field("mailer", &self.mailer.name())
            .field("payments", &self.payments.name())
            .field("settings", &self.settings)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Unauthorized(String),

    #[error(transparent)]
    Forbidden(AuthzError),

    #[error("{0}")]
    Conflict(String),

    #[error("Validation failed")]
    Validation(Vec<FieldError>),

    #[error(transparent)]
    LimitExceeded(LimitError),

    #[error(transparent)]
    RateLimited(#[from] RateLimited),

    #[error("Feature disabled: {0}")]
    FeatureDisabled(&'static str),

    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Email(#[from] EmailError),

    #[error(transparent)]
    Billing(#[from] BillingError),

    #[error(transparent)]
    Token(#[from] JwtError),

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        ServiceError::Validation(vec![FieldError {
            field: field.into(),
            message: message.into(),
        }])
    }

    /// Errors caused by the request rather than the server
    pub fn is_client_error(&self) -> bool {
        match self {
            ServiceError::NotFound(_)
            | ServiceError::Unauthorized(_)
            | ServiceError::Forbidden(_)
            | ServiceError::Conflict(_)
            | ServiceError::Validation(_)
            | ServiceError::LimitExceeded(_)
            | ServiceError::RateLimited(_)
            | ServiceError::FeatureDisabled(_)
            | ServiceError::Signature(_) => true,
            ServiceError::Storage(StorageError::NotFound(_)) => true,
            ServiceError::Billing(BillingError::Disabled | BillingError::InvalidPayload(_)) => true,
            _ => false,
        }
    }
}

/// Unique violations become `Conflict` carrying the constraint name.
impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            if db_err.is_unique_violation() {
                let constraint = db_err.constraint().unwrap_or("unique").to_string();
                return ServiceError::Conflict(conflict_message(&constraint));
            }
        }
        ServiceError::Database(err)
    }
}

fn conflict_message(constraint: &str) -> String {
    match constraint {
        "users_email_key" => "Email is already registered".to_string(),
        "organizations_slug_key" => "Organization slug is taken".to_string(),
        "projects_organization_slug_key" => "A project with this slug already exists".to_string(),
        "posts_slug_key" => "A post with this slug already exists".to_string(),
        "categories_slug_key" => "A category with this slug already exists".to_string(),
        "invitations_pending_email_key" => {
            "An invitation for this email is already pending".to_string()
        }
        "memberships_pkey" => "User is already a member".to_string(),
        other => format!("Duplicate value ({})", other),
    }
}

impl From<AuthzError> for ServiceError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::DatabaseError(e) => ServiceError::Database(e),
            other => ServiceError::Forbidden(other),
        }
    }
}

impl From<LimitError> for ServiceError {
    fn from(err: LimitError) -> Self {
        match err {
            LimitError::DatabaseError(e) => ServiceError::Database(e),
            other => ServiceError::LimitExceeded(other),
        }
    }
}

pub fn field_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    let mut out: Vec<FieldError> = errors
        .field_errors()
        .iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| FieldError {
                field: field.to_string(),
                message: e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "Validation failed".to_string()),
            })
        })
        .collect();
    out.sort_by(|a, b| a.field.cmp(&b.field));
    out
}

pub fn validate<T: Validate>(input: &T) -> ServiceResult<()> {
    input
        .validate()
        .map_err(|e| ServiceError::Validation(field_errors(&e)))
}

/// Runs a service operation inside a `service` span and logs the outcome:
/// `debug` on success, `warn` for client errors, `error` otherwise.
pub async fn intercept<T, F>(operation: &'static str, fut: F) -> ServiceResult<T>
where
    F: Future<Output = ServiceResult<T>>,
{
    let span = tracing::info_span!("service", operation);
    let started = Instant::now();
    let result = fut.instrument(span.clone()).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    span.in_scope(|| match &result {
        Ok(_) => tracing::debug!(elapsed_ms, "Service call completed"),
        Err(e) if e.is_client_error() => {
            tracing::warn!(elapsed_ms, error = %e, "Service call rejected")
        }
        Err(e) => tracing::error!(elapsed_ms, error = %e, "Service call failed"),
    });

    result
}

/// Deserializer for `Option<Option<T>>` fields: absent stays `None`,
/// explicit `null` becomes `Some(None)`. Use with `#[serde(default)]`.
pub fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: serde::Deserialize<'de>,
{
    <Option<T> as serde::Deserialize>::deserialize(deserializer).map(Some)
}

/// Trims a string and turns blanks into `None`.
pub(crate) fn clean_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
