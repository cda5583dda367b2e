//! S3 multipart API module
//!
//! Defines the three multipart calls the upload engine consumes and provides
//! [`S3Client`], an implementation backed by the AWS SDK for Rust.
//!
//! # Design
//!
//! The engine only talks to [`MultipartApi`]. Signing, retries, timeouts and
//! connection pooling are the transport's concern; a timeout surfaces as an
//! ordinary [`S3ClientError`] like any other failed request.
//!
//! # Tracing
//!
//! | Operation | Span Name | Attributes |
//! |-----------|-----------|------------|
//! | CreateMultipartUpload | `s3.create_multipart_upload` | bucket, key, upload_id |
//! | UploadPart | `s3.upload_part` | bucket, upload_id, part_number, bytes, etag |
//! | CompleteMultipartUpload | `s3.complete_multipart_upload` | bucket, upload_id, parts_count, etag |

use crate::upload::PartTag;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use thiserror::Error;

mod client;

pub use client::S3Client;

/// S3 client errors
#[derive(Error, Debug)]
pub enum S3ClientError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Request error: {0}")]
    RequestError(String),

    #[error("Response error: {0}")]
    ResponseError(String),
}

/// Object metadata sent with CreateMultipartUpload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub content_type: Option<String>,
    pub user_metadata: HashMap<String, String>,
}

impl ObjectMetadata {
    /// Metadata carrying only a content type
    pub fn with_content_type(content_type: impl Into<String>) -> Self {
        Self {
            content_type: Some(content_type.into()),
            user_metadata: HashMap::new(),
        }
    }
}

/// A single UploadPart call
#[derive(Debug, Clone)]
pub struct UploadPartRequest {
    pub bucket: String,
    pub key: String,
    pub upload_id: String,
    pub part_number: u32,
    pub body: Bytes,
    /// Base64 SHA-256 of `body`, verified by the service when present
    pub checksum_sha256: Option<String>,
}

impl UploadPartRequest {
    /// Length of the part body in bytes
    pub fn content_length(&self) -> u64 {
        self.body.len() as u64
    }
}

/// CompleteMultipartUpload result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionResult {
    pub bucket: String,
    pub key: String,
    pub etag: String,
    pub location: Option<String>,
    pub version_id: Option<String>,
}

/// The multipart calls consumed by the upload engine
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MultipartApi: Send + Sync {
    /// Start a multipart upload whose parts carry SHA-256 checksums and
    /// return its upload id
    async fn initiate_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        metadata: &ObjectMetadata,
    ) -> Result<String, S3ClientError>;

    /// Upload one part and return its ETag
    async fn upload_part(&self, request: UploadPartRequest) -> Result<String, S3ClientError>;

    /// Commit the object from parts sorted ascending by part number
    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[PartTag],
    ) -> Result<CompletionResult, S3ClientError>;
}
