//! Process-local storage backend

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::{ObjectInfo, StorageAdapter, StorageError, StorageResult};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    content_type: String,
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    objects: RwLock<BTreeMap<String, StoredObject>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    pub async fn content_type(&self, key: &str) -> Option<String> {
        self.objects
            .read()
            .await
            .get(key)
            .map(|o| o.content_type.clone())
    }
}

#[async_trait]
impl StorageAdapter for MemoryStorage {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn upload(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<()> {
        self.objects.write().await.insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn download(&self, key: &str) -> StorageResult<Bytes> {
        self.objects
            .read()
            .await
            .get(key)
            .map(|o| o.data.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.objects.write().await.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<ObjectInfo>> {
        Ok(self
            .objects
            .read()
            .await
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, object)| ObjectInfo {
                key: key.clone(),
                size: Some(object.data.len() as u64),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_download_delete() {
        let storage = MemoryStorage::new();
        storage
            .upload("org/1/a.txt", Bytes::from_static(b"hello"), "text/plain")
            .await
            .unwrap();

        assert_eq!(storage.download("org/1/a.txt").await.unwrap(), "hello");
        assert_eq!(
            storage.content_type("org/1/a.txt").await.as_deref(),
            Some("text/plain")
        );

        storage.delete("org/1/a.txt").await.unwrap();
        assert!(matches!(
            storage.download("org/1/a.txt").await,
            Err(StorageError::NotFound(_))
        ));

        // Deleting twice is fine
        storage.delete("org/1/a.txt").await.unwrap();
    }

    #[tokio::test]
    async fn test_list_by_prefix() {
        let storage = MemoryStorage::new();
        for key in ["a/1/x", "a/2/y", "b/1/z"] {
            storage.upload(key, Bytes::from_static(b"12"), "text/plain").await.unwrap();
        }

        let listed = storage.list("a/").await.unwrap();
        let keys: Vec<_> = listed.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["a/1/x", "a/2/y"]);
        assert_eq!(listed[0].size, Some(2));

        assert_eq!(storage.list("").await.unwrap().len(), 3);
        assert!(storage.list("c/").await.unwrap().is_empty());
    }
}
