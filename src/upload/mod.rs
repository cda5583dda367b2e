//! Upload module
//!
//! Resumable multipart upload of local files.
//!
//! - [`planner`] splits a file into parts
//! - [`checkpoint`] persists upload progress between runs
//! - [`part`] uploads a single part
//! - [`complete`] commits the uploaded parts
//! - [`coordinator`] ties them together

use crate::s3::S3ClientError;
use thiserror::Error;

pub mod checkpoint;
pub mod complete;
pub mod coordinator;
pub mod part;
pub mod planner;
pub mod progress;
pub mod request;

pub use checkpoint::{CheckpointStore, Part, PartTag, UploadSession};
pub use coordinator::{UploadCoordinator, UploadState};
pub use part::{PartError, PartOutcome};
pub use progress::{ProgressEvent, ProgressListener};
pub use request::UploadRequest;

/// Upload errors
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Invalid upload request: {0}")]
    InvalidRequest(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("S3 error: {0}")]
    S3Error(#[from] S3ClientError),

    #[error("Checkpoint error: {0}")]
    CheckpointError(#[from] checkpoint::CheckpointError),

    #[error("Part {part_number} failed: {source}")]
    PartFailed {
        part_number: u32,
        #[source]
        source: PartError,
    },

    #[error("Part upload task failed: {0}")]
    WorkerError(String),
}

/// Upload result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub bucket: String,
    pub key: String,
    pub etag: String,
    pub location: Option<String>,
    pub version_id: Option<String>,
    pub upload_id: String,
    pub parts_count: usize,
    /// Bytes sent by this call; excludes parts finished by an earlier run
    pub bytes_uploaded: u64,
    /// Whether this call continued a checkpointed upload
    pub resumed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_failed_display() {
        let err = UploadError::PartFailed {
            part_number: 3,
            source: PartError::ShortRead {
                expected: 10,
                actual: 4,
            },
        };
        assert_eq!(err.to_string(), "Part 3 failed: expected 10 bytes, read 4");
    }
}
