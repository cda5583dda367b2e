//! Part uploader
//!
//! Reads one part's byte range from the source file and sends it through
//! [`MultipartApi::upload_part`]. Failures are captured in the returned
//! [`PartOutcome`]; deciding what a failed part means for the whole upload is
//! left to the coordinator.

use super::{Part, PartTag};
use crate::s3::{MultipartApi, S3ClientError, UploadPartRequest};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::io::{self, SeekFrom};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Failure of a single part upload
#[derive(Error, Debug)]
pub enum PartError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("seek to offset {expected} landed at {actual}")]
    ShortSeek { expected: u64, actual: u64 },

    #[error("expected {expected} bytes, read {actual}")]
    ShortRead { expected: u64, actual: u64 },

    #[error("upload part failed: {0}")]
    Api(#[from] S3ClientError),
}

/// Result of one part upload attempt
#[derive(Debug)]
pub struct PartOutcome {
    pub part_number: u32,
    pub offset: u64,
    pub size: u64,
    pub result: Result<PartTag, PartError>,
}

impl PartOutcome {
    pub fn is_failed(&self) -> bool {
        self.result.is_err()
    }
}

/// Identifies the multipart upload parts belong to
#[derive(Debug, Clone)]
pub struct UploadTarget {
    pub source: PathBuf,
    pub bucket: String,
    pub key: String,
    pub upload_id: String,
}

/// Uploads part byte ranges of one source file
#[derive(Clone)]
pub struct PartUploader {
    api: Arc<dyn MultipartApi>,
    target: Arc<UploadTarget>,
}

impl PartUploader {
    pub fn new(api: Arc<dyn MultipartApi>, target: UploadTarget) -> Self {
        Self {
            api,
            target: Arc::new(target),
        }
    }

    /// Upload `part`, capturing any failure in the outcome
    pub async fn upload(&self, part: &Part) -> PartOutcome {
        let result = self.try_upload(part).await;

        if let Err(ref e) = result {
            tracing::warn!(
                upload_id = %self.target.upload_id,
                part_number = part.number,
                offset = part.offset,
                error = %e,
                "Part upload failed"
            );
        }

        PartOutcome {
            part_number: part.number,
            offset: part.offset,
            size: part.size,
            result,
        }
    }

    async fn try_upload(&self, part: &Part) -> Result<PartTag, PartError> {
        let body = self.read_range(part).await?;
        let checksum = BASE64.encode(Sha256::digest(&body));

        let etag = self
            .api
            .upload_part(UploadPartRequest {
                bucket: self.target.bucket.clone(),
                key: self.target.key.clone(),
                upload_id: self.target.upload_id.clone(),
                part_number: part.number,
                body,
                checksum_sha256: Some(checksum.clone()),
            })
            .await?;

        tracing::debug!(
            upload_id = %self.target.upload_id,
            part_number = part.number,
            bytes = part.size,
            etag = %etag,
            "Uploaded part"
        );

        Ok(PartTag::new(part.number, etag).with_checksum(checksum))
    }

    /// Read exactly `part.size` bytes starting at `part.offset`
    async fn read_range(&self, part: &Part) -> Result<Bytes, PartError> {
        let mut file = tokio::fs::File::open(&self.target.source).await?;

        let position = file.seek(SeekFrom::Start(part.offset)).await?;
        if position != part.offset {
            return Err(PartError::ShortSeek {
                expected: part.offset,
                actual: position,
            });
        }

        let capacity = usize::try_from(part.size)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "part too large"))?;
        let mut buffer = Vec::with_capacity(capacity);
        let read = (&mut file).take(part.size).read_to_end(&mut buffer).await?;

        if read as u64 != part.size {
            return Err(PartError::ShortRead {
                expected: part.size,
                actual: read as u64,
            });
        }

        Ok(Bytes::from(buffer))
    }
}
