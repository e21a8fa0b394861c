use async_trait::async_trait;
use aws_sdk_s3::{
    config::BehaviorVersion,
    error::SdkError,
    operation::{
        delete_object::DeleteObjectError, get_object::GetObjectError,
        list_objects_v2::ListObjectsV2Error, put_object::PutObjectError,
    },
    primitives::ByteStream,
    Client,
};

use super::error::StorageError;
use super::store::{ObjectStore, StoreCapabilities, VersionedObject};

/// Maximum keys S3 returns from a single `ListObjectsV2` page.
const MAX_KEYS_PER_PAGE: i32 = 1000;

/// Condition for conditional writes to S3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutCondition {
    /// No condition - unconditional write
    None,
    /// `If-None-Match: *` - Create only if object doesn't exist
    IfNoneMatch,
}

/// Configuration for connecting to an S3-compatible storage service.
#[derive(Debug, Clone)]
pub struct S3Config {
    /// Optional custom endpoint URL (e.g., for local development with LocalStack/MinIO).
    pub endpoint: Option<String>,
    /// The S3 bucket name.
    pub bucket: String,
    /// The AWS region.
    pub region: String,
    /// Whether the service honors `If-None-Match: *` on `PutObject` and
    /// `If-Match` on `DeleteObject`. AWS S3 does; several S3-compatible
    /// servers silently ignore them.
    pub conditional_writes: bool,
}

impl S3Config {
    /// Creates a new `S3Config` with explicit values and conditional writes disabled.
    #[must_use]
    pub const fn new(endpoint: Option<String>, bucket: String, region: String) -> Self {
        Self {
            endpoint,
            bucket,
            region,
            conditional_writes: false,
        }
    }

    /// Advertises (or not) `If-None-Match` support.
    #[must_use]
    pub const fn with_conditional_writes(mut self, enabled: bool) -> Self {
        self.conditional_writes = enabled;
        self
    }
}

/// A wrapper around the AWS S3 client exposing the primitives the queue needs.
#[derive(Debug, Clone)]
pub struct S3Client {
    client: Client,
    config: S3Config,
}

impl S3Client {
    /// Creates a new `S3Client` with the given configuration.
    ///
    /// Custom endpoints (`LocalStack`, `MinIO`, `RustFS`, R2, ...) are addressed
    /// path-style.
    pub async fn new(config: S3Config) -> Result<Self, StorageError> {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&sdk_config);

        if let Some(ref endpoint) = config.endpoint {
            s3_config_builder = s3_config_builder
                .endpoint_url(endpoint)
                .force_path_style(true); // Required for most S3-compatible services
        }

        let client = Client::from_conf(s3_config_builder.build());

        Ok(Self { client, config })
    }

    /// Returns the bucket name.
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.config.bucket
    }

    /// Uploads an object to S3.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::AlreadyExists` if `condition` is
    /// `PutCondition::IfNoneMatch` and the object exists.
    pub async fn put_object(
        &self,
        key: &str,
        body: Vec<u8>,
        condition: PutCondition,
    ) -> Result<(), StorageError> {
        let mut request = self
            .client
            .put_object()
            .bucket(&self.config.bucket)
            .key(key)
            .content_type("application/json")
            .body(ByteStream::from(body));

        if condition == PutCondition::IfNoneMatch {
            request = request.if_none_match("*");
        }

        request
            .send()
            .await
            .map_err(|ref err| map_put_error(err, key, &self.config.bucket))?;

        Ok(())
    }

    /// Retrieves an object body from S3.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the object doesn't exist.
    pub async fn get_object(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        Ok(self.get_object_versioned(key).await?.body)
    }

    /// Retrieves an object body and its `ETag` from S3.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the object doesn't exist.
    pub async fn get_object_versioned(&self, key: &str) -> Result<VersionedObject, StorageError> {
        let response = self
            .client
            .get_object()
            .bucket(&self.config.bucket)
            .key(key)
            .send()
            .await
            .map_err(|ref err| map_get_error(err, key, &self.config.bucket))?;

        let etag = response.e_tag().map(ToString::to_string);
        let body = response
            .body
            .collect()
            .await
            .map_err(|err| StorageError::S3Error(format!("Failed to read body: {err}")))?
            .into_bytes()
            .to_vec();

        Ok(VersionedObject { body, etag })
    }

    /// Deletes an object from S3.
    ///
    /// S3's `DeleteObject` returns success even if the object doesn't exist.
    pub async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.config.bucket)
            .key(key)
            .send()
            .await
            .map_err(|ref err| map_delete_error(err, &self.config.bucket))?;

        Ok(())
    }

    /// Deletes an object only if its `ETag` still matches.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::PreconditionFailed` if the object was rewritten
    /// and `StorageError::NotFound` if it no longer exists.
    pub async fn delete_object_if_match(&self, key: &str, etag: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.config.bucket)
            .key(key)
            .if_match(etag)
            .send()
            .await
            .map_err(|ref err| map_conditional_delete_error(err, key, &self.config.bucket))?;

        Ok(())
    }

    /// Lists one page of objects with a given prefix.
    ///
    /// # Returns
    ///
    /// A tuple containing:
    /// - A vector of object keys matching the prefix
    /// - An optional continuation token for fetching the next page
    pub async fn list_objects(
        &self,
        prefix: &str,
        limit: i32,
        continuation_token: Option<&str>,
    ) -> Result<(Vec<String>, Option<String>), StorageError> {
        let mut request = self
            .client
            .list_objects_v2()
            .bucket(&self.config.bucket)
            .prefix(prefix)
            .max_keys(limit);

        if let Some(token) = continuation_token {
            request = request.continuation_token(token);
        }

        let response = request
            .send()
            .await
            .map_err(|ref err| map_list_error(err, &self.config.bucket))?;

        let keys = response
            .contents()
            .iter()
            .filter_map(|obj| obj.key().map(ToString::to_string))
            .collect();

        let next_token = response.next_continuation_token().map(ToString::to_string);

        Ok((keys, next_token))
    }

    /// Lists every object with a given prefix, following pagination to the end.
    pub async fn list_objects_paginated(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut keys: Vec<String> = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let (mut page_keys, next_token) = self
                .list_objects(prefix, MAX_KEYS_PER_PAGE, continuation_token.as_deref())
                .await?;

            keys.append(&mut page_keys);

            match next_token {
                Some(token) => continuation_token = Some(token),
                None => break,
            }
        }

        Ok(keys)
    }
}

#[async_trait]
impl ObjectStore for S3Client {
    async fn put(&self, key: &str, body: Vec<u8>) -> Result<(), StorageError> {
        self.put_object(key, body, PutCondition::None).await
    }

    async fn put_if_absent(&self, key: &str, body: Vec<u8>) -> Result<(), StorageError> {
        if !self.config.conditional_writes {
            return Err(StorageError::ConfigurationError(format!(
                "conditional writes are not enabled for bucket '{}'",
                self.config.bucket
            )));
        }
        self.put_object(key, body, PutCondition::IfNoneMatch).await
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.get_object(key).await
    }

    async fn get_versioned(&self, key: &str) -> Result<VersionedObject, StorageError> {
        self.get_object_versioned(key).await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.delete_object(key).await
    }

    async fn delete_if_match(&self, key: &str, etag: &str) -> Result<(), StorageError> {
        if !self.config.conditional_writes {
            return Err(StorageError::ConfigurationError(format!(
                "conditional deletes are not enabled for bucket '{}'",
                self.config.bucket
            )));
        }
        self.delete_object_if_match(key, etag).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        self.list_objects_paginated(prefix).await
    }

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities {
            conditional_writes: self.config.conditional_writes,
        }
    }
}

/// Maps errors shared by every operation: 403 and transport failures.
fn map_common_error<E>(err: &SdkError<E>, bucket: &str) -> Option<StorageError>
where
    E: std::error::Error + 'static,
{
    match err {
        SdkError::ServiceError(service_err) if service_err.raw().status().as_u16() == 403 => {
            Some(StorageError::AccessDenied {
                bucket: bucket.to_string(),
            })
        }
        SdkError::DispatchFailure(dispatch_err)
            if dispatch_err.is_io() || dispatch_err.is_timeout() =>
        {
            Some(StorageError::ConnectionError(err.to_string()))
        }
        SdkError::TimeoutError(_) => Some(StorageError::ConnectionError(err.to_string())),
        _ => None,
    }
}

/// Maps `PutObject` errors to `StorageError`.
fn map_put_error(err: &SdkError<PutObjectError>, key: &str, bucket: &str) -> StorageError {
    if let SdkError::ServiceError(service_err) = err {
        if service_err.raw().status().as_u16() == 412 {
            return StorageError::AlreadyExists {
                key: key.to_string(),
            };
        }
    }
    map_common_error(err, bucket).unwrap_or_else(|| StorageError::S3Error(err.to_string()))
}

/// Maps `GetObject` errors to `StorageError`.
fn map_get_error(err: &SdkError<GetObjectError>, key: &str, bucket: &str) -> StorageError {
    if let SdkError::ServiceError(service_err) = err {
        if matches!(service_err.err(), GetObjectError::NoSuchKey(_))
            || service_err.raw().status().as_u16() == 404
        {
            return StorageError::NotFound {
                key: key.to_string(),
            };
        }
    }
    map_common_error(err, bucket).unwrap_or_else(|| StorageError::S3Error(err.to_string()))
}

/// Maps `DeleteObject` errors to `StorageError`.
fn map_delete_error(err: &SdkError<DeleteObjectError>, bucket: &str) -> StorageError {
    map_common_error(err, bucket).unwrap_or_else(|| StorageError::S3Error(err.to_string()))
}

/// Maps errors from an `If-Match` `DeleteObject` to `StorageError`.
fn map_conditional_delete_error(
    err: &SdkError<DeleteObjectError>,
    key: &str,
    bucket: &str,
) -> StorageError {
    if let SdkError::ServiceError(service_err) = err {
        match service_err.raw().status().as_u16() {
            412 => {
                return StorageError::PreconditionFailed {
                    key: key.to_string(),
                }
            }
            404 => {
                return StorageError::NotFound {
                    key: key.to_string(),
                }
            }
            _ => {}
        }
    }
    map_common_error(err, bucket).unwrap_or_else(|| StorageError::S3Error(err.to_string()))
}

/// Maps `ListObjectsV2` errors to `StorageError`.
fn map_list_error(err: &SdkError<ListObjectsV2Error>, bucket: &str) -> StorageError {
    map_common_error(err, bucket).unwrap_or_else(|| StorageError::S3Error(err.to_string()))
}
