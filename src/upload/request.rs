//! Upload request
//!
//! # Example
//!
//! ```
//! use resumable_uploadr::upload::UploadRequest;
//!
//! let request = UploadRequest::new("/data/video.mp4", "uploads", "videos/video.mp4")
//!     .part_size(8 * 1024 * 1024)
//!     .concurrency(4);
//!
//! assert!(request.validate().is_ok());
//! assert_eq!(
//!     request.checkpoint_path().unwrap().to_str(),
//!     Some("/data/video.mp4.ucp")
//! );
//! ```

use super::UploadError;
use crate::s3::ObjectMetadata;
use std::path::{Path, PathBuf};

/// Default part size (100MB)
pub const DEFAULT_PART_SIZE: u64 = 100 * 1024 * 1024;

/// Default number of parts uploaded at once
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Extension appended to the source path for the default checkpoint file
pub const CHECKPOINT_EXTENSION: &str = "ucp";

/// Maximum object key length in bytes
const MAX_KEY_LEN: usize = 1023;

/// Parameters of one file upload
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub source: PathBuf,
    pub bucket: String,
    pub key: String,
    pub part_size: u64,
    pub concurrency: usize,
    pub enable_checkpoint: bool,
    pub checkpoint_file: Option<PathBuf>,
    pub metadata: ObjectMetadata,
}

impl UploadRequest {
    /// Request with default part size, concurrency and checkpointing enabled
    pub fn new(
        source: impl Into<PathBuf>,
        bucket: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            bucket: bucket.into(),
            key: key.into(),
            part_size: DEFAULT_PART_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            enable_checkpoint: true,
            checkpoint_file: None,
            metadata: ObjectMetadata::default(),
        }
    }

    pub fn part_size(mut self, part_size: u64) -> Self {
        self.part_size = part_size;
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn enable_checkpoint(mut self, enabled: bool) -> Self {
        self.enable_checkpoint = enabled;
        self
    }

    pub fn checkpoint_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.checkpoint_file = Some(path.into());
        self
    }

    pub fn metadata(mut self, metadata: ObjectMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Where the checkpoint lives, or `None` when checkpointing is off.
    ///
    /// Defaults to `<source>.ucp`.
    pub fn checkpoint_path(&self) -> Option<PathBuf> {
        if !self.enable_checkpoint {
            return None;
        }
        Some(match self.checkpoint_file {
            Some(ref path) => path.clone(),
            None => default_checkpoint_path(&self.source),
        })
    }

    /// Content type to announce: the caller's, else guessed from the key,
    /// else from the source file name.
    pub fn content_type(&self) -> String {
        if let Some(ref content_type) = self.metadata.content_type {
            return content_type.clone();
        }
        mime_guess::from_path(&self.key)
            .first()
            .or_else(|| mime_guess::from_path(&self.source).first())
            .map(|mime| mime.essence_str().to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string())
    }

    /// Reject requests the service or the planner cannot accept
    pub fn validate(&self) -> Result<(), UploadError> {
        validate_bucket_name(&self.bucket)?;
        validate_object_key(&self.key)?;

        if self.source.as_os_str().is_empty() {
            return Err(UploadError::InvalidRequest("source path is empty".into()));
        }
        // Sessions record the source path as JSON text
        if self.source.to_str().is_none() {
            return Err(UploadError::InvalidRequest(format!(
                "source path {} is not valid UTF-8",
                self.source.display()
            )));
        }
        if self.part_size == 0 {
            return Err(UploadError::InvalidRequest(
                "part size must be greater than zero".into(),
            ));
        }
        if self.concurrency == 0 {
            return Err(UploadError::InvalidRequest(
                "concurrency must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// `<source>.ucp`
pub fn default_checkpoint_path(source: &Path) -> PathBuf {
    let mut name = source.as_os_str().to_os_string();
    name.push(".");
    name.push(CHECKPOINT_EXTENSION);
    PathBuf::from(name)
}

/// Checkpoint path for `source` inside `directory`
pub fn checkpoint_path_in(directory: &Path, source: &Path) -> PathBuf {
    let file_name = source
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    directory.join(default_checkpoint_path(Path::new(&file_name)))
}

/// Bucket names: 3-63 characters of lowercase letters, digits, `-` and `.`,
/// starting and ending with a letter or digit.
pub fn validate_bucket_name(bucket: &str) -> Result<(), UploadError> {
    let valid_len = (3..=63).contains(&bucket.len());
    let valid_chars = bucket
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'.');
    let valid_ends = bucket
        .bytes()
        .next()
        .zip(bucket.bytes().last())
        .is_some_and(|(first, last)| first.is_ascii_alphanumeric() && last.is_ascii_alphanumeric());

    if valid_len && valid_chars && valid_ends {
        Ok(())
    } else {
        Err(UploadError::InvalidRequest(format!(
            "invalid bucket name '{}'",
            bucket
        )))
    }
}

/// Object keys: non-empty, at most 1023 bytes, not starting with `/` or `\`.
pub fn validate_object_key(key: &str) -> Result<(), UploadError> {
    if key.is_empty() || key.len() > MAX_KEY_LEN || key.starts_with('/') || key.starts_with('\\')
    {
        return Err(UploadError::InvalidRequest(format!(
            "invalid object key '{}'",
            key
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let request = UploadRequest::new("/tmp/a.bin", "bucket", "a.bin");
        assert_eq!(request.part_size, DEFAULT_PART_SIZE);
        assert_eq!(request.concurrency, DEFAULT_CONCURRENCY);
        assert!(request.enable_checkpoint);
    }

    #[test]
    fn test_checkpoint_path_disabled() {
        let request = UploadRequest::new("/tmp/a.bin", "bucket", "a.bin").enable_checkpoint(false);
        assert!(request.checkpoint_path().is_none());
    }

    #[test]
    fn test_checkpoint_path_explicit() {
        let request =
            UploadRequest::new("/tmp/a.bin", "bucket", "a.bin").checkpoint_file("/var/cp/a.json");
        assert_eq!(request.checkpoint_path(), Some(PathBuf::from("/var/cp/a.json")));
    }

    #[test]
    fn test_checkpoint_path_in_directory() {
        assert_eq!(
            checkpoint_path_in(Path::new("/var/lib/uploadr"), Path::new("/data/movie.mkv")),
            PathBuf::from("/var/lib/uploadr/movie.mkv.ucp")
        );
    }

    #[test]
    fn test_content_type_guessing() {
        let request = UploadRequest::new("/tmp/a.bin", "bucket", "photos/cat.png");
        assert_eq!(request.content_type(), "image/png");

        let request = UploadRequest::new("/tmp/notes.txt", "bucket", "notes");
        assert_eq!(request.content_type(), "text/plain");

        let request = UploadRequest::new("/tmp/blob", "bucket", "blob");
        assert_eq!(request.content_type(), "application/octet-stream");

        let request = UploadRequest::new("/tmp/a.png", "bucket", "a.png")
            .metadata(ObjectMetadata::with_content_type("application/x-custom"));
        assert_eq!(request.content_type(), "application/x-custom");
    }

    #[test]
    fn test_bucket_validation() {
        assert!(validate_bucket_name("my-bucket.v2").is_ok());
        assert!(validate_bucket_name("ab").is_err());
        assert!(validate_bucket_name("My-Bucket").is_err());
        assert!(validate_bucket_name("-bucket").is_err());
        assert!(validate_bucket_name("bucket-").is_err());
        assert!(validate_bucket_name(&"a".repeat(64)).is_err());
        assert!(validate_bucket_name("bucket_name").is_err());
    }

    #[test]
    fn test_key_validation() {
        assert!(validate_object_key("dir/file.bin").is_ok());
        assert!(validate_object_key("").is_err());
        assert!(validate_object_key("/leading").is_err());
        assert!(validate_object_key("\\leading").is_err());
        assert!(validate_object_key(&"k".repeat(1024)).is_err());
        assert!(validate_object_key(&"k".repeat(1023)).is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let request = UploadRequest::new("/tmp/a.bin", "bucket", "a.bin").part_size(0);
        assert!(matches!(request.validate(), Err(UploadError::InvalidRequest(_))));

        let request = UploadRequest::new("/tmp/a.bin", "bucket", "a.bin").concurrency(0);
        assert!(matches!(request.validate(), Err(UploadError::InvalidRequest(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_validate_rejects_non_utf8_source() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let source = PathBuf::from(OsStr::from_bytes(b"/tmp/data\xff.bin"));
        let request = UploadRequest::new(source, "bucket", "data.bin");
        assert!(matches!(request.validate(), Err(UploadError::InvalidRequest(_))));
    }
}
