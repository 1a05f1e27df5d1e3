use crate::config::S3Config;
use crate::store::{ObjectStore, ObjectSummary, StoreError, StoreResult};
use anyhow::Result;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::Client as S3Client;
use aws_types::region::Region;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// S3-backed object store for the session folders
pub struct S3ObjectStore {
    client: S3Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Create a new S3 store
    pub async fn new(config: &S3Config) -> Result<Self> {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        // Configure custom endpoint for MinIO/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        // Force path-style access for MinIO compatibility
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        info!(
            bucket = %config.bucket,
            region = %config.region,
            "S3 object store initialized"
        );

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
        })
    }
}

fn backend_error<E>(operation: &'static str, key: &str, err: E) -> StoreError
where
    E: std::error::Error,
{
    StoreError::Backend {
        operation,
        key: key.to_string(),
        message: DisplayErrorContext(err).to_string(),
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    #[instrument(skip(self))]
    async fn list_prefixes(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let mut prefixes = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .delimiter("/")
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| backend_error("list_prefixes", prefix, e))?;

            prefixes.extend(
                response
                    .common_prefixes()
                    .iter()
                    .filter_map(|p| p.prefix().map(String::from)),
            );

            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        debug!(prefix = %prefix, count = prefixes.len(), "Listed session prefixes");
        Ok(prefixes)
    }

    #[instrument(skip(self))]
    async fn list_objects(
        &self,
        prefix: &str,
        max_keys: Option<i32>,
    ) -> StoreResult<Vec<ObjectSummary>> {
        let mut objects = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_max_keys(max_keys)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| backend_error("list_objects", prefix, e))?;

            objects.extend(response.contents().iter().filter_map(|obj| {
                obj.key().map(|key| ObjectSummary {
                    key: key.to_string(),
                    size: obj.size().unwrap_or(0).max(0) as u64,
                })
            }));

            // A capped listing is a probe; never follow further pages.
            if max_keys.is_some() {
                break;
            }

            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        Ok(objects)
    }

    #[instrument(skip(self))]
    async fn get_object(&self, key: &str) -> StoreResult<Vec<u8>> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error()
                    .map(|e| e.is_no_such_key())
                    .unwrap_or(false)
                {
                    StoreError::NotFound(key.to_string())
                } else {
                    backend_error("get_object", key, e)
                }
            })?;

        let body = response
            .body
            .collect()
            .await
            .map_err(|e| backend_error("get_object", key, e))?;

        Ok(body.into_bytes().to_vec())
    }

    async fn presign_get(&self, key: &str, expires_in: Duration) -> StoreResult<String> {
        let presigning_config =
            PresigningConfig::expires_in(expires_in).map_err(|e| StoreError::Presign {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning_config)
            .await
            .map_err(|e| StoreError::Presign {
                key: key.to_string(),
                message: DisplayErrorContext(e).to_string(),
            })?;

        Ok(presigned.uri().to_string())
    }

    #[instrument(skip(self))]
    async fn copy_object(&self, source_key: &str, target_key: &str) -> StoreResult<()> {
        self.client
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(copy_source(&self.bucket, source_key))
            .key(target_key)
            .send()
            .await
            .map_err(|e| backend_error("copy_object", source_key, e))?;

        debug!(source_key = %source_key, target_key = %target_key, "Object copied");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_object(&self, key: &str) -> StoreResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| backend_error("delete_object", key, e))?;

        debug!(key = %key, "Object deleted");
        Ok(())
    }
}

/// `x-amz-copy-source` value: bucket and URL-encoded key
fn copy_source(bucket: &str, key: &str) -> String {
    let mut encoded = String::with_capacity(bucket.len() + key.len() + 1);
    encoded.push_str(bucket);
    encoded.push('/');

    for byte in key.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }

    encoded
}
