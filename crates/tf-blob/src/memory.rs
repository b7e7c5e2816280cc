//! Process-local blob store.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

use tf_core::{Error, Result};

use crate::{check_container, check_name, BlobStore};

/// Blob store holding every container in a [`DashMap`].
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    containers: DashMap<String, DashMap<String, Bytes>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Object names stored in `container`, sorted.
    pub fn objects(&self, container: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .containers
            .get(container)
            .map(|c| c.iter().map(|e| e.key().clone()).collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn ensure_container(&self, container: &str) -> Result<()> {
        check_container(container)?;
        self.containers.entry(container.to_string()).or_default();
        Ok(())
    }

    async fn put(&self, container: &str, object: &str, data: Bytes) -> Result<()> {
        check_name(container, object)?;
        let objects = self
            .containers
            .get(container)
            .ok_or_else(|| Error::storage(container, object, "container does not exist"))?;
        objects.insert(object.to_string(), data);
        Ok(())
    }

    async fn get(&self, container: &str, object: &str) -> Result<Bytes> {
        let found = self
            .containers
            .get(container)
            .and_then(|c| c.get(object).map(|d| d.value().clone()));
        found.ok_or_else(|| Error::not_found("object", format!("{container}/{object}")))
    }

    fn url_for(&self, container: &str, object: &str) -> String {
        format!("memory://{container}/{object}")
    }
}
