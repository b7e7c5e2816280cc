//! # tf-blob
//!
//! Opaque object storage addressed by container and object name.
//!
//! - **[`BlobStore`]** -- the four operations the pipeline relies on.
//! - **[`LocalBlobStore`]** -- containers as directories under a root.
//! - **[`MemoryBlobStore`]** -- process-local store for tests and demos.

pub mod local;
pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;

use tf_core::{Error, Result};

pub use local::LocalBlobStore;
pub use memory::MemoryBlobStore;

/// Object storage used for uploads and generated artifacts.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Create `container` if it does not exist. Must succeed before the
    /// first [`put`](BlobStore::put) into it.
    async fn ensure_container(&self, container: &str) -> Result<()>;

    /// Store `data` as `object`, replacing any previous content.
    async fn put(&self, container: &str, object: &str, data: Bytes) -> Result<()>;

    async fn get(&self, container: &str, object: &str) -> Result<Bytes>;

    /// Addressable location of an object; does not check existence.
    fn url_for(&self, container: &str, object: &str) -> String;
}

/// Reject names that could escape their container.
///
/// Object names may contain `/` separators but no empty, `.` or `..`
/// segments and no leading slash.
pub(crate) fn check_container(container: &str) -> Result<()> {
    if container.is_empty() || container.contains(['/', '\\']) || container.starts_with('.') {
        return Err(Error::storage(container, "", "invalid container name"));
    }
    Ok(())
}

pub(crate) fn check_name(container: &str, object: &str) -> Result<()> {
    check_container(container)?;
    let bad_segment = object
        .split('/')
        .any(|seg| seg.is_empty() || seg == "." || seg == ".." || seg.contains('\\'));
    if object.is_empty() || bad_segment {
        return Err(Error::storage(container, object, "invalid object name"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_job_scoped_names() {
        assert!(check_name("media", "0b7e/photo.jpg").is_ok());
        assert!(check_name("media", "photo.jpg").is_ok());
    }

    #[test]
    fn rejects_traversal() {
        assert!(check_name("media", "../etc/passwd").is_err());
        assert!(check_name("media", "/abs").is_err());
        assert!(check_name("media", "a//b").is_err());
        assert!(check_name("media", "").is_err());
        assert!(check_name("", "x").is_err());
        assert!(check_name("a/b", "x").is_err());
        assert!(check_name("..", "x").is_err());
    }
}
