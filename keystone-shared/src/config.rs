//! Provider and feature configuration shared by the API and the worker
//!
//! Every section loads from environment variables with `from_env()`. The
//! parsing itself goes through `from_source`, which takes a lookup function,
//! so tests can feed a map instead of mutating the process environment.
//!
//! Providers are optional: when their URL is unset, storage falls back to an
//! in-memory store, email to a log-only sender, and billing is disabled.

use serde::{Deserialize, Serialize};
use std::env;

/// Environment lookup used by the `from_source` constructors
pub type Source<'a> = &'a dyn Fn(&str) -> Option<String>;

fn process_env(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn non_empty(source: Source<'_>, key: &str) -> Option<String> {
    source(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or<T>(source: Source<'_>, key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match non_empty(source, key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{} has an invalid value '{}': {}", key, raw, e)),
        None => Ok(default),
    }
}

/// Accepts `true/false`, `1/0`, `yes/no` and `on/off`.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn bool_or(source: Source<'_>, key: &str, default: bool) -> anyhow::Result<bool> {
    match non_empty(source, key) {
        Some(raw) => parse_bool(&raw)
            .ok_or_else(|| anyhow::anyhow!("{} must be a boolean, got '{}'", key, raw)),
        None => Ok(default),
    }
}

/// Splits a comma separated list, dropping blanks.
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Hosted object storage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Base URL of the storage REST API; `None` selects in-memory storage
    pub url: Option<String>,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub bucket: String,
}

impl StorageConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_source(&process_env)
    }

    pub fn from_source(source: Source<'_>) -> anyhow::Result<Self> {
        let url = non_empty(source, "STORAGE_URL");
        let api_key = non_empty(source, "STORAGE_API_KEY");

        if url.is_some() && api_key.is_none() {
            anyhow::bail!("STORAGE_API_KEY is required when STORAGE_URL is set");
        }

        Ok(Self {
            url: url.map(|u| u.trim_end_matches('/').to_string()),
            api_key,
            bucket: non_empty(source, "STORAGE_BUCKET").unwrap_or_else(|| "uploads".to_string()),
        })
    }
}

/// Transactional email provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    /// Provider endpoint; `None` logs emails instead of sending them
    pub api_url: Option<String>,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub from: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            api_key: None,
            from: "Keystone <no-reply@keystone.local>".to_string(),
        }
    }
}

impl EmailConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_source(&process_env)
    }

    pub fn from_source(source: Source<'_>) -> anyhow::Result<Self> {
        let api_url = non_empty(source, "EMAIL_API_URL");
        let api_key = non_empty(source, "EMAIL_API_KEY");

        if api_url.is_some() && api_key.is_none() {
            anyhow::bail!("EMAIL_API_KEY is required when EMAIL_API_URL is set");
        }

        Ok(Self {
            api_url,
            api_key,
            from: non_empty(source, "EMAIL_FROM").unwrap_or_else(|| Self::default().from),
        })
    }
}

/// Payment provider
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BillingConfig {
    pub api_url: Option<String>,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    #[serde(skip_serializing)]
    pub webhook_secret: Option<String>,
}

impl BillingConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_source(&process_env)
    }

    pub fn from_source(source: Source<'_>) -> anyhow::Result<Self> {
        let api_url = non_empty(source, "BILLING_API_URL");
        let api_key = non_empty(source, "BILLING_API_KEY");

        if api_url.is_some() && api_key.is_none() {
            anyhow::bail!("BILLING_API_KEY is required when BILLING_API_URL is set");
        }

        Ok(Self {
            api_url: api_url.map(|u| u.trim_end_matches('/').to_string()),
            api_key,
            webhook_secret: non_empty(source, "BILLING_WEBHOOK_SECRET"),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.api_url.is_some() && self.api_key.is_some()
    }
}

/// Per-minute allowances for the in-memory action limiters
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub likes_per_minute: u32,
    pub views_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            likes_per_minute: 10,
            views_per_minute: 30,
        }
    }
}

impl RateLimitConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_source(&process_env)
    }

    pub fn from_source(source: Source<'_>) -> anyhow::Result<Self> {
        let defaults = Self::default();
        let config = Self {
            likes_per_minute: parse_or(source, "RATE_LIMIT_LIKES_PER_MINUTE", defaults.likes_per_minute)?,
            views_per_minute: parse_or(source, "RATE_LIMIT_VIEWS_PER_MINUTE", defaults.views_per_minute)?,
        };

        if config.likes_per_minute == 0 || config.views_per_minute == 0 {
            anyhow::bail!("Rate limits must be greater than zero");
        }

        Ok(config)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Feature {
    Registration,
    Blog,
    Billing,
}

impl Feature {
    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::Registration => "registration",
            Feature::Blog => "blog",
            Feature::Billing => "billing",
        }
    }
}

/// Feature flags; all enabled unless switched off
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FeatureFlags {
    pub registration: bool,
    pub blog: bool,
    pub billing: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            registration: true,
            blog: true,
            billing: true,
        }
    }
}

impl FeatureFlags {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_source(&process_env)
    }

    pub fn from_source(source: Source<'_>) -> anyhow::Result<Self> {
        Ok(Self {
            registration: bool_or(source, "FEATURE_REGISTRATION", true)?,
            blog: bool_or(source, "FEATURE_BLOG", true)?,
            billing: bool_or(source, "FEATURE_BILLING", true)?,
        })
    }

    pub fn is_enabled(&self, feature: Feature) -> bool {
        match feature {
            Feature::Registration => self.registration,
            Feature::Blog => self.blog,
            Feature::Billing => self.billing,
        }
    }
}

/// Upload size cap and content-type allowlist
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    pub max_bytes: usize,
    pub allowed_types: Vec<String>,
}

pub const DEFAULT_ALLOWED_TYPES: &str =
    "image/png,image/jpeg,image/gif,image/webp,application/pdf,text/plain";

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
            allowed_types: parse_list(DEFAULT_ALLOWED_TYPES),
        }
    }
}

impl UploadConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_source(&process_env)
    }

    pub fn from_source(source: Source<'_>) -> anyhow::Result<Self> {
        let defaults = Self::default();
        let max_bytes = parse_or(source, "UPLOAD_MAX_BYTES", defaults.max_bytes)?;
        if max_bytes == 0 {
            anyhow::bail!("UPLOAD_MAX_BYTES must be greater than zero");
        }

        let allowed_types = match non_empty(source, "UPLOAD_ALLOWED_TYPES") {
            Some(raw) => parse_list(&raw.to_ascii_lowercase()),
            None => defaults.allowed_types,
        };

        Ok(Self {
            max_bytes,
            allowed_types,
        })
    }

    /// Compares the media type only, ignoring parameters such as `charset`.
    pub fn is_allowed(&self, content_type: &str) -> bool {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        self.allowed_types.iter().any(|t| *t == essence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn source(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool(" off "), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(parse_list("a, b,,c "), vec!["a", "b", "c"]);
        assert!(parse_list("").is_empty());
    }

    #[test]
    fn test_storage_defaults_to_memory() {
        let config = StorageConfig::from_source(&source(&[])).unwrap();
        assert!(config.url.is_none());
        assert_eq!(config.bucket, "uploads");
    }

    #[test]
    fn test_storage_requires_key_with_url() {
        let result = StorageConfig::from_source(&source(&[("STORAGE_URL", "https://s.example")]));
        assert!(result.is_err());

        let config = StorageConfig::from_source(&source(&[
            ("STORAGE_URL", "https://s.example/storage/v1/"),
            ("STORAGE_API_KEY", "k"),
            ("STORAGE_BUCKET", "files"),
        ]))
        .unwrap();
        assert_eq!(config.url.as_deref(), Some("https://s.example/storage/v1"));
        assert_eq!(config.bucket, "files");
    }

    #[test]
    fn test_billing_enabled_only_when_configured() {
        assert!(!BillingConfig::from_source(&source(&[])).unwrap().is_enabled());

        let config = BillingConfig::from_source(&source(&[
            ("BILLING_API_URL", "https://pay.example"),
            ("BILLING_API_KEY", "sk_test"),
        ]))
        .unwrap();
        assert!(config.is_enabled());
        assert!(config.webhook_secret.is_none());
    }

    #[test]
    fn test_secrets_not_serialized() {
        let config = BillingConfig {
            api_url: Some("https://pay.example".into()),
            api_key: Some("sk_live_secret".into()),
            webhook_secret: Some("whsec".into()),
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("sk_live_secret"));
        assert!(!json.contains("whsec"));
    }

    #[test]
    fn test_rate_limit_config() {
        let defaults = RateLimitConfig::from_source(&source(&[])).unwrap();
        assert_eq!(defaults.likes_per_minute, 10);
        assert_eq!(defaults.views_per_minute, 30);

        let custom =
            RateLimitConfig::from_source(&source(&[("RATE_LIMIT_LIKES_PER_MINUTE", "3")])).unwrap();
        assert_eq!(custom.likes_per_minute, 3);

        assert!(RateLimitConfig::from_source(&source(&[("RATE_LIMIT_VIEWS_PER_MINUTE", "0")])).is_err());
        assert!(RateLimitConfig::from_source(&source(&[("RATE_LIMIT_VIEWS_PER_MINUTE", "x")])).is_err());
    }

    #[test]
    fn test_feature_flags() {
        let flags = FeatureFlags::from_source(&source(&[("FEATURE_BLOG", "false")])).unwrap();
        assert!(flags.is_enabled(Feature::Registration));
        assert!(!flags.is_enabled(Feature::Blog));
        assert!(flags.is_enabled(Feature::Billing));

        assert!(FeatureFlags::from_source(&source(&[("FEATURE_BILLING", "sometimes")])).is_err());
    }

    #[test]
    fn test_upload_allowlist() {
        let config = UploadConfig::from_source(&source(&[])).unwrap();
        assert_eq!(config.max_bytes, 10_485_760);
        assert!(config.is_allowed("image/png"));
        assert!(config.is_allowed("text/plain; charset=utf-8"));
        assert!(config.is_allowed("IMAGE/JPEG"));
        assert!(!config.is_allowed("application/x-msdownload"));

        let custom = UploadConfig::from_source(&source(&[
            ("UPLOAD_MAX_BYTES", "1024"),
            ("UPLOAD_ALLOWED_TYPES", "Application/Zip"),
        ]))
        .unwrap();
        assert_eq!(custom.max_bytes, 1024);
        assert!(custom.is_allowed("application/zip"));
        assert!(!custom.is_allowed("image/png"));
    }
}
