//! S3-compatible object store backend.
//!
//! Credentials come from the ambient AWS provider chain (`AWS_ACCESS_KEY_ID`,
//! `AWS_SECRET_ACCESS_KEY`, `AWS_SESSION_TOKEN`, profiles, instance roles);
//! they are never part of the storage descriptor.

use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::location::S3Options;
use crate::traits::PersistenceBackend;

/// Region used when neither configuration nor environment names one.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Configured region first, then the ambient AWS chain (`AWS_REGION`,
/// profiles, instance metadata), then [`DEFAULT_REGION`].
fn region_provider(options: &S3Options) -> RegionProviderChain {
    RegionProviderChain::first_try(options.region.clone().map(Region::new))
        .or_default_provider()
        .or_else(Region::new(DEFAULT_REGION))
}

/// A missing object means nothing has been saved yet.
fn missing_or_error(err: GetObjectError, location: &str) -> StoreResult<Option<Vec<u8>>> {
    if err.is_no_such_key() {
        return Ok(None);
    }
    Err(StoreError::Backend(format!("get {location}: {}", DisplayErrorContext(&err))))
}

/// Persists the document as a single object in an S3-compatible bucket.
#[derive(Clone, Debug)]
pub struct S3Backend {
    client: Client,
    bucket: String,
    key: String,
}

impl S3Backend {
    /// Build a client for `bucket`/`key`.
    ///
    /// A custom endpoint (MinIO, R2, ...) switches the client to path-style
    /// addressing, which those services expect.
    pub async fn connect(
        bucket: impl Into<String>,
        key: impl Into<String>,
        options: &S3Options,
    ) -> StoreResult<Self> {
        let shared = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(region_provider(options))
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = &options.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: bucket.into(),
            key: key.into(),
        })
    }
}

#[async_trait]
impl PersistenceBackend for S3Backend {
    async fn load(&self) -> StoreResult<Option<Vec<u8>>> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&self.key)
            .send()
            .await;

        let output = match result {
            Ok(output) => output,
            Err(err) => return missing_or_error(err.into_service_error(), &self.describe()),
        };

        let data = output.body.collect().await.map_err(|e| {
            StoreError::Backend(format!("read s3://{}/{}: {e}", self.bucket, self.key))
        })?;
        let bytes = data.into_bytes().to_vec();
        debug!(bucket = %self.bucket, key = %self.key, bytes = bytes.len(), "read state object");
        Ok(Some(bytes))
    }

    async fn save(&self, bytes: &[u8]) -> StoreResult<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&self.key)
            .content_type("application/json")
            .body(ByteStream::from(bytes.to_vec()))
            .send()
            .await
            .map_err(|e| {
                StoreError::Backend(format!(
                    "put s3://{}/{}: {}",
                    self.bucket,
                    self.key,
                    DisplayErrorContext(&e)
                ))
            })?;
        debug!(bucket = %self.bucket, key = %self.key, "uploaded state object");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }
}
