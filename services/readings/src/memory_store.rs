//! In-process object store.
//!
//! Keeps objects in a sorted map so listings come back in key order, the same
//! way S3 returns them. Failures can be injected per operation and key prefix
//! to exercise the degraded paths of the scanner and the mover.

use crate::store::{ObjectStore, ObjectSummary, StoreError, StoreResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::time::Duration;

/// Store operation a failure rule applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOperation {
    ListPrefixes,
    ListObjects,
    GetObject,
    Presign,
    Copy,
    Delete,
}

impl StoreOperation {
    fn as_str(&self) -> &'static str {
        match self {
            StoreOperation::ListPrefixes => "list_prefixes",
            StoreOperation::ListObjects => "list_objects",
            StoreOperation::GetObject => "get_object",
            StoreOperation::Presign => "presign",
            StoreOperation::Copy => "copy_object",
            StoreOperation::Delete => "delete_object",
        }
    }
}

#[derive(Debug, Clone)]
struct FailureRule {
    operation: StoreOperation,
    key_prefix: String,
}

pub struct InMemoryObjectStore {
    bucket: String,
    objects: RwLock<BTreeMap<String, Vec<u8>>>,
    failures: RwLock<Vec<FailureRule>>,
}

impl InMemoryObjectStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: RwLock::new(BTreeMap::new()),
            failures: RwLock::new(Vec::new()),
        }
    }

    /// Insert or overwrite an object
    pub fn put(&self, key: impl Into<String>, body: impl Into<Vec<u8>>) {
        self.objects.write().insert(key.into(), body.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.read().contains_key(key)
    }

    /// All keys under `prefix`, in order
    pub fn keys_under(&self, prefix: &str) -> Vec<String> {
        self.objects
            .read()
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// Make `operation` fail for every key (or listing prefix) starting with `key_prefix`
    pub fn fail_on(&self, operation: StoreOperation, key_prefix: impl Into<String>) {
        self.failures.write().push(FailureRule {
            operation,
            key_prefix: key_prefix.into(),
        });
    }

    pub fn clear_failures(&self) {
        self.failures.write().clear();
    }

    fn check(&self, operation: StoreOperation, key: &str) -> StoreResult<()> {
        let failing = self
            .failures
            .read()
            .iter()
            .any(|rule| rule.operation == operation && key.starts_with(&rule.key_prefix));

        if failing {
            return Err(StoreError::Backend {
                operation: operation.as_str(),
                key: key.to_string(),
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list_prefixes(&self, prefix: &str) -> StoreResult<Vec<String>> {
        self.check(StoreOperation::ListPrefixes, prefix)?;

        let mut prefixes: Vec<String> = Vec::new();
        for key in self.keys_under(prefix) {
            let rest = &key[prefix.len()..];
            if let Some(idx) = rest.find('/') {
                let child = format!("{}{}", prefix, &rest[..=idx]);
                // Keys are sorted, so equal children are adjacent
                if prefixes.last() != Some(&child) {
                    prefixes.push(child);
                }
            }
        }

        Ok(prefixes)
    }

    async fn list_objects(
        &self,
        prefix: &str,
        max_keys: Option<i32>,
    ) -> StoreResult<Vec<ObjectSummary>> {
        self.check(StoreOperation::ListObjects, prefix)?;

        let limit = max_keys.map(|n| n.max(0) as usize).unwrap_or(usize::MAX);
        let objects = self.objects.read();

        Ok(objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .take(limit)
            .map(|(key, body)| ObjectSummary {
                key: key.clone(),
                size: body.len() as u64,
            })
            .collect())
    }

    async fn get_object(&self, key: &str) -> StoreResult<Vec<u8>> {
        self.check(StoreOperation::GetObject, key)?;

        self.objects
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn presign_get(&self, key: &str, expires_in: Duration) -> StoreResult<String> {
        self.check(StoreOperation::Presign, key)?;

        Ok(format!(
            "memory://{}/{}?expires={}",
            self.bucket,
            key,
            expires_in.as_secs()
        ))
    }

    async fn copy_object(&self, source_key: &str, target_key: &str) -> StoreResult<()> {
        self.check(StoreOperation::Copy, source_key)?;

        let mut objects = self.objects.write();
        let body = objects
            .get(source_key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(source_key.to_string()))?;
        objects.insert(target_key.to_string(), body);
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> StoreResult<()> {
        self.check(StoreOperation::Delete, key)?;

        // S3 deletes are idempotent
        self.objects.write().remove(key);
        Ok(())
    }
}
