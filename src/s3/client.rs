//! AWS SDK backed implementation of [`MultipartApi`]
//!
//! # Example
//!
//! ```no_run
//! use resumable_uploadr::config::S3Config;
//! use resumable_uploadr::s3::S3Client;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = S3Config {
//!     region: "us-east-1".into(),
//!     endpoint: Some("http://localhost:9000".into()),
//!     access_key: Some("minioadmin".into()),
//!     secret_key: Some("minioadmin".into()),
//!     force_path_style: true,
//!     ..Default::default()
//! };
//! let client = S3Client::from_config(&config).await?;
//! assert_eq!(client.region(), "us-east-1");
//! # Ok(())
//! # }
//! ```

use super::{CompletionResult, MultipartApi, ObjectMetadata, S3ClientError, UploadPartRequest};
use crate::config::S3Config;
use crate::upload::PartTag;
use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::retry::RetryConfig;
use aws_sdk_s3::config::timeout::TimeoutConfig;
use aws_sdk_s3::config::{BehaviorVersion, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{ChecksumAlgorithm, CompletedMultipartUpload, CompletedPart};
use std::time::Duration;

/// S3 Client
///
/// Thin adapter over [`aws_sdk_s3::Client`]; cheap to share behind an `Arc`.
pub struct S3Client {
    inner: aws_sdk_s3::Client,
    region: String,
    endpoint: Option<String>,
}

impl S3Client {
    /// Build a client from configuration
    ///
    /// Static credentials are used when both `access_key` and `secret_key`
    /// are set; otherwise the default AWS credential chain is loaded.
    pub async fn from_config(config: &S3Config) -> Result<Self, S3ClientError> {
        let region = Region::new(config.region.clone());

        let mut builder = match (&config.access_key, &config.secret_key) {
            (Some(access_key), Some(secret_key)) => {
                let credentials = Credentials::new(
                    access_key,
                    secret_key,
                    config.session_token.clone(),
                    None,
                    "uploadr-config",
                );
                aws_sdk_s3::config::Builder::new()
                    .behavior_version(BehaviorVersion::latest())
                    .region(region)
                    .credentials_provider(credentials)
            }
            (None, None) => {
                let shared = aws_config::defaults(BehaviorVersion::latest())
                    .region(region)
                    .load()
                    .await;
                aws_sdk_s3::config::Builder::from(&shared)
            }
            _ => {
                return Err(S3ClientError::ConfigError(
                    "access_key and secret_key must be set together".into(),
                ))
            }
        };

        if let Some(ref endpoint) = config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        builder = builder
            .force_path_style(config.force_path_style)
            .retry_config(RetryConfig::standard().with_max_attempts(config.max_attempts.max(1)));

        if let Some(seconds) = config.timeout_seconds {
            builder = builder.timeout_config(
                TimeoutConfig::builder()
                    .operation_attempt_timeout(Duration::from_secs(seconds))
                    .build(),
            );
        }

        Ok(Self {
            inner: aws_sdk_s3::Client::from_conf(builder.build()),
            region: config.region.clone(),
            endpoint: config.endpoint.clone(),
        })
    }

    /// Get the region
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Get the endpoint URL
    pub fn endpoint(&self) -> String {
        self.endpoint
            .clone()
            .unwrap_or_else(|| format!("https://s3.{}.amazonaws.com", self.region))
    }
}

fn request_error<E: std::error::Error>(err: E) -> S3ClientError {
    S3ClientError::RequestError(DisplayErrorContext(&err).to_string())
}

fn part_number_i32(part_number: u32) -> Result<i32, S3ClientError> {
    i32::try_from(part_number).map_err(|_| {
        S3ClientError::RequestError(format!("part number {} out of range", part_number))
    })
}

#[async_trait]
impl MultipartApi for S3Client {
    #[tracing::instrument(
        name = "s3.create_multipart_upload",
        skip(self, metadata),
        fields(
            s3.bucket = %bucket,
            s3.key = %key,
            http.method = "POST",
            s3.upload_id = tracing::field::Empty
        ),
        err
    )]
    async fn initiate_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        metadata: &ObjectMetadata,
    ) -> Result<String, S3ClientError> {
        let mut call = self
            .inner
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .checksum_algorithm(ChecksumAlgorithm::Sha256)
            .set_content_type(metadata.content_type.clone());

        if !metadata.user_metadata.is_empty() {
            call = call.set_metadata(Some(metadata.user_metadata.clone()));
        }

        let output = call.send().await.map_err(request_error)?;
        let upload_id = output
            .upload_id()
            .ok_or_else(|| {
                S3ClientError::ResponseError(
                    "CreateMultipartUpload response missing UploadId".into(),
                )
            })?
            .to_string();

        tracing::Span::current().record("s3.upload_id", upload_id.as_str());
        tracing::debug!(upload_id = %upload_id, "CreateMultipartUpload completed");

        Ok(upload_id)
    }

    #[tracing::instrument(
        name = "s3.upload_part",
        skip(self, request),
        fields(
            s3.bucket = %request.bucket,
            s3.upload_id = %request.upload_id,
            s3.part_number = request.part_number,
            http.method = "PUT",
            upload.bytes = request.content_length(),
            s3.etag = tracing::field::Empty
        ),
        err
    )]
    async fn upload_part(&self, request: UploadPartRequest) -> Result<String, S3ClientError> {
        let part_number = part_number_i32(request.part_number)?;
        let content_length = i64::try_from(request.content_length())
            .map_err(|_| S3ClientError::RequestError("part body too large".into()))?;

        let output = self
            .inner
            .upload_part()
            .bucket(request.bucket)
            .key(request.key)
            .upload_id(request.upload_id)
            .part_number(part_number)
            .content_length(content_length)
            .set_checksum_sha256(request.checksum_sha256)
            .body(ByteStream::from(request.body))
            .send()
            .await
            .map_err(request_error)?;

        let etag = output
            .e_tag()
            .ok_or_else(|| S3ClientError::ResponseError("UploadPart response missing ETag".into()))?
            .to_string();

        tracing::Span::current().record("s3.etag", etag.as_str());

        Ok(etag)
    }

    #[tracing::instrument(
        name = "s3.complete_multipart_upload",
        skip(self, parts),
        fields(
            s3.bucket = %bucket,
            s3.upload_id = %upload_id,
            http.method = "POST",
            parts_count = parts.len(),
            s3.etag = tracing::field::Empty
        ),
        err
    )]
    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[PartTag],
    ) -> Result<CompletionResult, S3ClientError> {
        let completed = parts
            .iter()
            .map(|tag| {
                Ok(CompletedPart::builder()
                    .part_number(part_number_i32(tag.part_number)?)
                    .e_tag(&tag.etag)
                    .set_checksum_sha256(tag.checksum_sha256.clone())
                    .build())
            })
            .collect::<Result<Vec<_>, S3ClientError>>()?;

        let output = self
            .inner
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed))
                    .build(),
            )
            .send()
            .await
            .map_err(request_error)?;

        let etag = output.e_tag().unwrap_or_default().to_string();
        tracing::Span::current().record("s3.etag", etag.as_str());

        Ok(CompletionResult {
            bucket: output.bucket().unwrap_or(bucket).to_string(),
            key: output.key().unwrap_or(key).to_string(),
            etag,
            location: output.location().map(str::to_string),
            version_id: output.version_id().map(str::to_string),
        })
    }
}
