//! Hosted object storage over REST
//!
//! | Operation | Request |
//! |-----------|---------|
//! | upload    | `PUT {base}/object/{bucket}/{key}` (body = bytes) |
//! | download  | `GET {base}/object/{bucket}/{key}` |
//! | delete    | `DELETE {base}/object/{bucket}/{key}` |
//! | list      | `POST {base}/object/list/{bucket}` with `{"prefix": ..}` |
//!
//! Requests carry `Authorization: Bearer {api_key}`.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header, StatusCode};
use serde::Deserialize;
use std::time::Duration;

use super::{ObjectInfo, StorageAdapter, StorageError, StorageResult};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const LIST_LIMIT: u32 = 1000;

pub struct HttpStorage {
    client: reqwest::Client,
    base_url: String,
    bucket: String,
}

#[derive(Debug, Deserialize)]
struct ListEntry {
    name: String,
    #[serde(default)]
    metadata: Option<ListMetadata>,
}

#[derive(Debug, Deserialize)]
struct ListMetadata {
    #[serde(default)]
    size: Option<u64>,
}

impl HttpStorage {
    pub fn new(base_url: &str, api_key: &str, bucket: &str) -> StorageResult<Self> {
        let mut headers = header::HeaderMap::new();
        let mut auth = header::HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|e| StorageError::Config(format!("invalid API key: {}", e)))?;
        auth.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StorageError::Config(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
        })
    }

    pub(crate) fn object_url(&self, key: &str) -> String {
        format!(
            "{}/object/{}/{}",
            self.base_url,
            self.bucket,
            key.trim_start_matches('/')
        )
    }

    pub(crate) fn list_url(&self) -> String {
        format!("{}/object/list/{}", self.base_url, self.bucket)
    }

    async fn error_for(key: &str, response: reqwest::Response) -> StorageError {
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return StorageError::NotFound(key.to_string());
        }

        let message = response.text().await.unwrap_or_default();
        StorageError::Backend {
            status: status.as_u16(),
            message: message.chars().take(200).collect(),
        }
    }
}

fn request_error(e: reqwest::Error) -> StorageError {
    StorageError::Request(e.to_string())
}

#[async_trait]
impl StorageAdapter for HttpStorage {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn upload(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<()> {
        let size = data.len();
        let response = self
            .client
            .put(self.object_url(key))
            .header(header::CONTENT_TYPE, content_type)
            .header("x-upsert", "true")
            .body(data)
            .send()
            .await
            .map_err(request_error)?;

        if !response.status().is_success() {
            return Err(Self::error_for(key, response).await);
        }

        tracing::debug!(key = %key, size, "Uploaded object");
        Ok(())
    }

    async fn download(&self, key: &str) -> StorageResult<Bytes> {
        let response = self
            .client
            .get(self.object_url(key))
            .send()
            .await
            .map_err(request_error)?;

        if !response.status().is_success() {
            return Err(Self::error_for(key, response).await);
        }

        response.bytes().await.map_err(request_error)
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let response = self
            .client
            .delete(self.object_url(key))
            .send()
            .await
            .map_err(request_error)?;

        match response.status() {
            s if s.is_success() || s == StatusCode::NOT_FOUND => Ok(()),
            _ => Err(Self::error_for(key, response).await),
        }
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<ObjectInfo>> {
        let folder = prefix.trim_end_matches('/');
        let response = self
            .client
            .post(self.list_url())
            .json(&serde_json::json!({ "prefix": folder, "limit": LIST_LIMIT }))
            .send()
            .await
            .map_err(request_error)?;

        if !response.status().is_success() {
            return Err(Self::error_for(prefix, response).await);
        }

        let entries: Vec<ListEntry> = response.json().await.map_err(request_error)?;

        Ok(entries
            .into_iter()
            .map(|entry| ObjectInfo {
                key: if folder.is_empty() {
                    entry.name
                } else {
                    format!("{}/{}", folder, entry.name)
                },
                size: entry.metadata.and_then(|m| m.size),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let storage = HttpStorage::new("https://files.example.com/storage/v1/", "k", "uploads").unwrap();
        assert_eq!(
            storage.object_url("org/file/a.txt"),
            "https://files.example.com/storage/v1/object/uploads/org/file/a.txt"
        );
        assert_eq!(
            storage.list_url(),
            "https://files.example.com/storage/v1/object/list/uploads"
        );
    }

    #[test]
    fn test_rejects_unprintable_key() {
        assert!(matches!(
            HttpStorage::new("https://files.example.com", "bad\nkey", "b"),
            Err(StorageError::Config(_))
        ));
    }

    #[test]
    fn test_list_entry_parsing() {
        let entries: Vec<ListEntry> = serde_json::from_str(
            r#"[{"name": "a.txt", "metadata": {"size": 12}}, {"name": "b.txt", "metadata": null}]"#,
        )
        .unwrap();
        assert_eq!(entries[0].metadata.as_ref().and_then(|m| m.size), Some(12));
        assert!(entries[1].metadata.is_none());
    }
}
