//! Filesystem-backed blob store.
//!
//! Layout: `<root>/<container>/<object>`. Writes go to a sibling `.partial`
//! file first and are renamed into place, so readers never observe a
//! half-written object.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;

use tf_core::{Error, Result};

use crate::{check_container, check_name, BlobStore};

/// Blob store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
    public_base_url: Option<String>,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            public_base_url: None,
        }
    }

    /// Render [`url_for`](BlobStore::url_for) as `<base>/<container>/<object>`
    /// instead of a `file://` URL.
    pub fn with_public_base_url(mut self, base: impl Into<String>) -> Self {
        self.public_base_url = Some(base.into());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn container_dir(&self, container: &str) -> PathBuf {
        self.root.join(container)
    }

    fn object_path(&self, container: &str, object: &str) -> PathBuf {
        object
            .split('/')
            .fold(self.container_dir(container), |path, seg| path.join(seg))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn ensure_container(&self, container: &str) -> Result<()> {
        check_container(container)?;
        let dir = self.container_dir(container);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::storage(container, "", e))?;
        tracing::debug!(container = %container, path = %dir.display(), "Container ready");
        Ok(())
    }

    async fn put(&self, container: &str, object: &str, data: Bytes) -> Result<()> {
        check_name(container, object)?;

        if !tokio::fs::try_exists(self.container_dir(container))
            .await
            .unwrap_or(false)
        {
            return Err(Error::storage(container, object, "container does not exist"));
        }

        let path = self.object_path(container, object);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::storage(container, object, e))?;
        }

        let mut partial = path.clone().into_os_string();
        partial.push(".partial");
        let partial = PathBuf::from(partial);

        tokio::fs::write(&partial, &data)
            .await
            .map_err(|e| Error::storage(container, object, e))?;
        tokio::fs::rename(&partial, &path)
            .await
            .map_err(|e| Error::storage(container, object, e))?;

        tracing::debug!(
            container = %container,
            object = %object,
            bytes = data.len(),
            "Stored object"
        );
        Ok(())
    }

    async fn get(&self, container: &str, object: &str) -> Result<Bytes> {
        check_name(container, object)?;
        let path = self.object_path(container, object);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::not_found("object", format!("{container}/{object}")))
            }
            Err(e) => Err(Error::storage(container, object, e)),
        }
    }

    fn url_for(&self, container: &str, object: &str) -> String {
        match self.public_base_url {
            Some(ref base) => format!("{}/{container}/{object}", base.trim_end_matches('/')),
            None => format!("file://{}", self.object_path(container, object).display()),
        }
    }
}
