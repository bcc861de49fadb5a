//! Object storage for uploaded files
//!
//! [`StorageAdapter`] is the seam between the files service and wherever the
//! bytes live. Two backends ship:
//!
//! - [`HttpStorage`]: a hosted object-storage REST API
//! - [`MemoryStorage`]: a process-local map for development and tests
//!
//! Keys are laid out as `{organization_id}/{file_id}/{sanitized name}` so an
//! organization's objects share a prefix.

pub mod http;
pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

pub use http::HttpStorage;
pub use memory::MemoryStorage;

use crate::config::StorageConfig;

const MAX_FILE_NAME_LEN: usize = 120;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Storage request failed: {0}")]
    Request(String),

    #[error("Storage backend returned {status}: {message}")]
    Backend { status: u16, message: String },

    #[error("Invalid storage configuration: {0}")]
    Config(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub key: String,
    pub size: Option<u64>,
}

#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &'static str;

    async fn upload(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<()>;

    async fn download(&self, key: &str) -> StorageResult<Bytes>;

    /// Deleting a missing object is not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    async fn list(&self, prefix: &str) -> StorageResult<Vec<ObjectInfo>>;
}

/// Reduces a client-supplied file name to `[A-Za-z0-9._-]`, keeping the
/// extension and dropping any directory components.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    let mut cleaned = String::with_capacity(base.len());
    let mut last_was_dash = false;
    for c in base.chars() {
        if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
            cleaned.push(c);
            last_was_dash = false;
        } else if !last_was_dash {
            cleaned.push('-');
            last_was_dash = true;
        }
    }

    let cleaned = cleaned.trim_matches(|c| c == '.' || c == '-').to_string();
    if cleaned.is_empty() {
        return "file".to_string();
    }

    if cleaned.len() <= MAX_FILE_NAME_LEN {
        return cleaned;
    }

    // Keep the extension when truncating
    match cleaned.rfind('.') {
        Some(dot) if cleaned.len() - dot <= 16 => {
            let ext = &cleaned[dot..];
            format!("{}{}", &cleaned[..MAX_FILE_NAME_LEN - ext.len()], ext)
        }
        _ => cleaned[..MAX_FILE_NAME_LEN].to_string(),
    }
}

pub fn object_key(organization_id: Uuid, file_id: Uuid, file_name: &str) -> String {
    format!(
        "{}/{}/{}",
        organization_id,
        file_id,
        sanitize_file_name(file_name)
    )
}

pub fn organization_prefix(organization_id: Uuid) -> String {
    format!("{}/", organization_id)
}

/// Picks the backend: hosted storage when `STORAGE_URL` is configured,
/// otherwise memory.
pub fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn StorageAdapter>> {
    match (&config.url, &config.api_key) {
        (Some(url), Some(key)) => {
            let storage = HttpStorage::new(url, key, &config.bucket)?;
            tracing::info!(url = %url, bucket = %config.bucket, "Using hosted object storage");
            Ok(Arc::new(storage))
        }
        (Some(_), None) => Err(StorageError::Config(
            "STORAGE_API_KEY is required with STORAGE_URL".to_string(),
        )),
        (None, _) => {
            tracing::warn!("STORAGE_URL not set, uploads are kept in memory");
            Ok(Arc::new(MemoryStorage::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("report.pdf"), "report.pdf");
        assert_eq!(sanitize_file_name("My Report (final).pdf"), "My-Report-final-.pdf");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\Users\\me\\photo.jpg"), "photo.jpg");
        assert_eq!(sanitize_file_name("..."), "file");
        assert_eq!(sanitize_file_name(""), "file");
        assert_eq!(sanitize_file_name("ünïcødé.txt"), "n-c-d-.txt");
    }

    #[test]
    fn test_long_names_keep_extension() {
        let long = format!("{}.png", "a".repeat(300));
        let cleaned = sanitize_file_name(&long);
        assert_eq!(cleaned.len(), MAX_FILE_NAME_LEN);
        assert!(cleaned.ends_with(".png"));
    }

    #[test]
    fn test_object_key_layout() {
        let org = Uuid::new_v4();
        let file = Uuid::new_v4();
        let key = object_key(org, file, "a b.txt");

        assert_eq!(key, format!("{}/{}/a-b.txt", org, file));
        assert!(key.starts_with(&organization_prefix(org)));
    }

    #[test]
    fn test_from_config_defaults_to_memory() {
        let storage = from_config(&StorageConfig::default()).unwrap();
        assert_eq!(storage.name(), "memory");
    }

    #[test]
    fn test_from_config_http() {
        let config = StorageConfig {
            url: Some("https://storage.example.com".into()),
            api_key: Some("key".into()),
            bucket: "uploads".into(),
        };
        assert_eq!(from_config(&config).unwrap().name(), "http");
    }
}
