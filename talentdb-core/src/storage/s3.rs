/*!
Amazon S3 object store adapter.

Buckets play the role of containers: one holds the canonical database blob,
another the backup artifacts. The adapter owns a dedicated Tokio runtime and
exposes a blocking interface, matching the synchronous request model of the
engines above it.
*/

use std::sync::Arc;
use std::time::Duration;

use aws_config::timeout::TimeoutConfig;
use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use chrono::{DateTime, Utc};
use tokio::runtime::Runtime;
use tracing::{debug, error, info};

use super::{ObjectInfo, ObjectStore};
use crate::{Result, TalentError};

/// Amazon S3 object store
///
/// # Authentication
/// The adapter uses the standard AWS credential provider chain:
/// 1. Environment variables (AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY, AWS_SESSION_TOKEN)
/// 2. AWS credentials file (~/.aws/credentials)
/// 3. IAM roles for EC2 instances
/// 4. ECS task roles
#[derive(Debug)]
pub struct S3ObjectStore {
    client: S3Client,
    bucket: String,
    runtime: Arc<Runtime>,
}

impl S3ObjectStore {
    /// Create a new adapter for the given bucket.
    ///
    /// `operation_timeout` bounds every remote call; the engines have no
    /// cancellation of their own, so the timeout is the only thing standing
    /// between a hung request and a stuck caller.
    pub fn new(bucket: String, region: Option<String>, operation_timeout: Duration) -> Result<Self> {
        let runtime = Runtime::new().map_err(|e| {
            TalentError::storage(format!("Failed to create async runtime for S3 client: {e}"))
        })?;

        let sdk_config = runtime.block_on(async {
            let timeouts = TimeoutConfig::builder()
                .operation_timeout(operation_timeout)
                .build();
            let mut loader =
                aws_config::defaults(aws_config::BehaviorVersion::latest()).timeout_config(timeouts);
            if let Some(region) = region {
                loader = loader.region(aws_config::Region::new(region));
            }
            loader.load().await
        });

        if sdk_config.credentials_provider().is_none() {
            return Err(TalentError::storage(
                "AWS credentials not found. Please set AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY, and AWS_REGION environment variables".to_string(),
            ));
        }

        let client = S3Client::new(&sdk_config);

        info!(bucket = %bucket, "Initialized S3 object store");

        Ok(S3ObjectStore {
            client,
            bucket,
            runtime: Arc::new(runtime),
        })
    }

    /// Get the bucket name
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

impl ObjectStore for S3ObjectStore {
    fn get(&self, key: &str) -> Result<Vec<u8>> {
        debug!(bucket = %self.bucket, key = %key, "Starting S3 get_object operation");

        let result = self.runtime.block_on(async {
            self.client
                .get_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
        });

        match result {
            Ok(output) => {
                let collected = self.runtime.block_on(async { output.body.collect().await });
                match collected {
                    Ok(data) => {
                        let bytes = data.into_bytes().to_vec();
                        debug!(
                            bucket = %self.bucket,
                            key = %key,
                            size = bytes.len(),
                            "Successfully loaded object from S3"
                        );
                        Ok(bytes)
                    }
                    Err(e) => {
                        let msg = format!("Failed to read S3 object stream: {e}");
                        error!(bucket = %self.bucket, key = %key, error = %msg);
                        Err(TalentError::storage(msg))
                    }
                }
            }
            Err(e) => {
                let mapped = map_s3_error("get_object", e, key);
                if !matches!(mapped, TalentError::NotFound(_)) {
                    error!(
                        bucket = %self.bucket,
                        key = %key,
                        error = ?mapped,
                        "Failed to load object from S3"
                    );
                }
                Err(mapped)
            }
        }
    }

    fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        debug!(
            bucket = %self.bucket,
            key = %key,
            size = data.len(),
            "Starting S3 put_object operation"
        );

        let result = self.runtime.block_on(async {
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(key)
                .body(ByteStream::from(data.to_vec()))
                .send()
                .await
        });

        match result {
            Ok(_) => {
                debug!(
                    bucket = %self.bucket,
                    key = %key,
                    size = data.len(),
                    "Successfully saved object to S3"
                );
                Ok(())
            }
            Err(e) => {
                let mapped = map_s3_error("put_object", e, key);
                error!(
                    bucket = %self.bucket,
                    key = %key,
                    error = ?mapped,
                    "Failed to save object to S3"
                );
                Err(mapped)
            }
        }
    }

    fn exists(&self, key: &str) -> bool {
        let result = self.runtime.block_on(async {
            self.client
                .head_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
        });

        let exists = result.is_ok();
        debug!(
            bucket = %self.bucket,
            key = %key,
            exists = exists,
            "S3 object existence check completed"
        );
        exists
    }

    fn delete(&self, key: &str) -> Result<()> {
        debug!(bucket = %self.bucket, key = %key, "Deleting object from S3");

        let result = self.runtime.block_on(async {
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
        });

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                let mapped = map_s3_error("delete_object", e, key);
                error!(
                    bucket = %self.bucket,
                    key = %key,
                    error = ?mapped,
                    "Failed to delete object from S3"
                );
                Err(mapped)
            }
        }
    }

    fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>> {
        debug!(bucket = %self.bucket, prefix = %prefix, "Listing S3 objects");

        let mut objects = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let result = self.runtime.block_on(async {
                let mut request = self
                    .client
                    .list_objects_v2()
                    .bucket(&self.bucket)
                    .prefix(prefix);
                if let Some(token) = &continuation {
                    request = request.continuation_token(token);
                }
                request.send().await
            });

            let output = result.map_err(|e| map_s3_error("list_objects", e, prefix))?;

            for object in output.contents() {
                let Some(key) = object.key() else { continue };
                objects.push(ObjectInfo {
                    key: key.to_string(),
                    size: object.size().unwrap_or(0).max(0) as u64,
                    last_modified: object
                        .last_modified()
                        .and_then(|t| DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos())),
                });
            }

            match output.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }

        Ok(objects)
    }
}

/// Map AWS SDK errors to TalentError with appropriate context
fn map_s3_error<E: ProvideErrorMetadata + std::fmt::Debug>(
    op: &str,
    error: aws_sdk_s3::error::SdkError<E>,
    key: &str,
) -> TalentError {
    use aws_sdk_s3::error::SdkError;

    match &error {
        SdkError::DispatchFailure(dispatch_err) => {
            TalentError::storage(format!("S3 {op} request failed to dispatch: {dispatch_err:?}"))
        }
        SdkError::TimeoutError(_) => {
            TalentError::storage(format!("S3 {op} request timed out (key: {key})"))
        }
        SdkError::ResponseError(response_err) => {
            TalentError::storage(format!("S3 {op} response error: {response_err:?}"))
        }
        SdkError::ServiceError(service_err) => {
            if let Some(code) = service_err.err().code() {
                match code {
                    "NoSuchBucket" => TalentError::storage("S3 bucket not found".to_string()),
                    "NoSuchKey" => TalentError::NotFound(format!("S3 object '{key}' not found")),
                    "AccessDenied" | "Forbidden" => TalentError::storage(
                        "Access denied to S3 (check credentials and permissions)".to_string(),
                    ),
                    "InvalidBucketName" => {
                        TalentError::storage("Invalid S3 bucket name".to_string())
                    }
                    _ => TalentError::storage(format!(
                        "S3 service error ({}): {}",
                        code,
                        service_err.err().message().unwrap_or("Unknown error")
                    )),
                }
            } else {
                TalentError::storage(format!("S3 {op} service error: {service_err:?}"))
            }
        }
        _ => TalentError::storage(format!("S3 {op} error: {error}")),
    }
}
