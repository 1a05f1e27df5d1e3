//! Object store seam.
//!
//! Everything the service knows about the bucket goes through [`ObjectStore`]:
//! delimiter listing for session discovery, recursive listing for a session's
//! members, reads of `metadata.json`, signed read URLs, and the copy/delete
//! pair used to emulate a move between prefixes.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by an object store backend
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Store {operation} failed for {key}: {message}")]
    Backend {
        operation: &'static str,
        key: String,
        message: String,
    },

    #[error("Failed to presign {key}: {message}")]
    Presign { key: String, message: String },
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// One object returned by a recursive listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    /// Full object key
    pub key: String,
    /// Object size in bytes
    pub size: u64,
}

impl ObjectSummary {
    /// Last path segment of the key
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Bucket (or namespace) name, reported by the health endpoint
    fn bucket(&self) -> &str;

    /// List the immediate child "folders" under `prefix` (delimiter `/`)
    async fn list_prefixes(&self, prefix: &str) -> StoreResult<Vec<String>>;

    /// List objects whose key starts with `prefix`, in key order.
    /// `max_keys` caps the result; `None` follows every page.
    async fn list_objects(
        &self,
        prefix: &str,
        max_keys: Option<i32>,
    ) -> StoreResult<Vec<ObjectSummary>>;

    /// Read a whole object
    async fn get_object(&self, key: &str) -> StoreResult<Vec<u8>>;

    /// Produce a time-limited signed GET URL for `key`
    async fn presign_get(&self, key: &str, expires_in: Duration) -> StoreResult<String>;

    /// Server-side copy from `source_key` to `target_key`
    async fn copy_object(&self, source_key: &str, target_key: &str) -> StoreResult<()>;

    async fn delete_object(&self, key: &str) -> StoreResult<()>;
}
