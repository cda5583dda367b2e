//! Upload checkpoint
//!
//! An [`UploadSession`] records the progress of one multipart upload so a
//! later run can resume it. Sessions are stored as compact JSON:
//!
//! ```text
//! {
//!   "magic": "uploadr-checkpoint/v1",
//!   "checksum": "<hex sha256 over every other field>",
//!   "source": "/data/video.mp4",
//!   "source_stat": { "size": 26214400, "modified": "2024-05-01T10:00:00.123456789Z" },
//!   "bucket": "uploads",
//!   "key": "videos/video.mp4",
//!   "upload_id": "...",
//!   "parts": [ { "number": 1, "offset": 0, "size": 10485760, "completed": true }, ... ],
//!   "part_tags": [ { "part_number": 1, "etag": "\"...\"" }, ... ]
//! }
//! ```
//!
//! Writes go to a sibling `.tmp` file which is synced and renamed over the
//! checkpoint, so a crash never leaves a half-written record behind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

/// Format marker of the current checkpoint schema
pub const CHECKPOINT_MAGIC: &str = "uploadr-checkpoint/v1";

/// Checkpoint file errors
#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("Checkpoint not found: {0}")]
    NotFound(PathBuf),

    #[error("Checkpoint IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Corrupt checkpoint: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Cannot encode checkpoint: {0}")]
    Encode(serde_json::Error),
}

/// Reasons a loaded checkpoint cannot be resumed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckpointInvalid {
    #[error("unknown checkpoint format '{0}'")]
    MagicMismatch(String),

    #[error("checksum mismatch")]
    ChecksumMismatch,

    #[error("checkpoint belongs to another upload target")]
    TargetMismatch,

    #[error("source file is missing")]
    SourceMissing,

    #[error("source file changed since the upload started")]
    SourceChanged,
}

/// One byte range of the source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    /// 1-based part number
    pub number: u32,
    pub offset: u64,
    pub size: u64,
    pub completed: bool,
}

impl Part {
    pub fn new(number: u32, offset: u64, size: u64) -> Self {
        Self {
            number,
            offset,
            size,
            completed: false,
        }
    }
}

/// Acknowledgment of one uploaded part
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartTag {
    pub part_number: u32,
    pub etag: String,
    /// Base64 SHA-256 of the part body, repeated in the completion request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum_sha256: Option<String>,
}

impl PartTag {
    pub fn new(part_number: u32, etag: impl Into<String>) -> Self {
        Self {
            part_number,
            etag: etag.into(),
            checksum_sha256: None,
        }
    }

    pub fn with_checksum(mut self, checksum_sha256: impl Into<String>) -> Self {
        self.checksum_sha256 = Some(checksum_sha256.into());
        self
    }
}

/// Size and modification time of the source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStat {
    pub size: u64,
    pub modified: DateTime<Utc>,
}

impl FileStat {
    /// Snapshot the current size and mtime of `path`
    pub async fn of(path: &Path) -> io::Result<Self> {
        let metadata = tokio::fs::metadata(path).await?;
        Ok(Self {
            size: metadata.len(),
            modified: DateTime::<Utc>::from(metadata.modified()?),
        })
    }
}

/// Persistent state of one resumable multipart upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSession {
    pub magic: String,
    pub checksum: String,
    pub source: PathBuf,
    pub source_stat: FileStat,
    pub bucket: String,
    pub key: String,
    pub upload_id: String,
    pub parts: Vec<Part>,
    pub part_tags: Vec<PartTag>,
}

/// Every session field except the checksum, in serialization order
#[derive(Serialize)]
struct ChecksumView<'a> {
    magic: &'a str,
    source: &'a Path,
    source_stat: &'a FileStat,
    bucket: &'a str,
    key: &'a str,
    upload_id: &'a str,
    parts: &'a [Part],
    part_tags: &'a [PartTag],
}

impl UploadSession {
    /// Start a session with no completed parts.
    ///
    /// Fails with [`CheckpointError::Encode`] if the session cannot be
    /// serialized, e.g. when `source` is not valid UTF-8.
    pub fn new(
        source: PathBuf,
        source_stat: FileStat,
        bucket: impl Into<String>,
        key: impl Into<String>,
        upload_id: impl Into<String>,
        parts: Vec<Part>,
    ) -> Result<Self, CheckpointError> {
        let mut session = Self {
            magic: CHECKPOINT_MAGIC.to_string(),
            checksum: String::new(),
            source,
            source_stat,
            bucket: bucket.into(),
            key: key.into(),
            upload_id: upload_id.into(),
            parts,
            part_tags: Vec::new(),
        };
        session.checksum = session.compute_checksum()?;
        Ok(session)
    }

    /// Hex SHA-256 over the canonical JSON of every field but `checksum`
    pub fn compute_checksum(&self) -> Result<String, CheckpointError> {
        let view = ChecksumView {
            magic: &self.magic,
            source: &self.source,
            source_stat: &self.source_stat,
            bucket: &self.bucket,
            key: &self.key,
            upload_id: &self.upload_id,
            parts: &self.parts,
            part_tags: &self.part_tags,
        };
        let bytes = serde_json::to_vec(&view).map_err(CheckpointError::Encode)?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }

    /// Record a part acknowledgment and mark the part completed.
    ///
    /// A tag for a part number that already has one replaces it.
    /// Returns `false` if the session has no part with that number.
    pub fn record_completion(&mut self, tag: PartTag) -> bool {
        let Some(part) = self.parts.iter_mut().find(|p| p.number == tag.part_number) else {
            return false;
        };
        part.completed = true;

        match self
            .part_tags
            .iter_mut()
            .find(|t| t.part_number == tag.part_number)
        {
            Some(existing) => *existing = tag,
            None => self.part_tags.push(tag),
        }
        true
    }

    /// Parts still waiting to be uploaded
    pub fn pending_parts(&self) -> impl Iterator<Item = &Part> {
        self.parts.iter().filter(|p| !p.completed)
    }

    pub fn completed_count(&self) -> usize {
        self.parts.iter().filter(|p| p.completed).count()
    }

    pub fn is_complete(&self) -> bool {
        self.parts.iter().all(|p| p.completed)
    }

    pub fn total_bytes(&self) -> u64 {
        self.parts.iter().map(|p| p.size).sum()
    }

    pub fn pending_bytes(&self) -> u64 {
        self.pending_parts().map(|p| p.size).sum()
    }

    /// Part tags sorted ascending by part number
    pub fn ordered_tags(&self) -> Vec<PartTag> {
        let mut tags = self.part_tags.clone();
        tags.sort_by_key(|t| t.part_number);
        tags
    }
}

/// Loads, validates and persists an [`UploadSession`] at a fixed path
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// Read and deserialize the checkpoint
    pub async fn load(&self) -> Result<UploadSession, CheckpointError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CheckpointError::NotFound(self.path.clone()))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Check that `session` is intact and still describes the live source
    /// file and the requested target.
    pub async fn validate(
        &self,
        session: &UploadSession,
        source: &Path,
        bucket: &str,
        key: &str,
    ) -> Result<(), CheckpointInvalid> {
        if session.magic != CHECKPOINT_MAGIC {
            return Err(CheckpointInvalid::MagicMismatch(session.magic.clone()));
        }

        match session.compute_checksum() {
            Ok(checksum) if checksum == session.checksum => {}
            _ => return Err(CheckpointInvalid::ChecksumMismatch),
        }

        if session.source != source || session.bucket != bucket || session.key != key {
            return Err(CheckpointInvalid::TargetMismatch);
        }

        let stat = match FileStat::of(source).await {
            Ok(stat) => stat,
            Err(_) => return Err(CheckpointInvalid::SourceMissing),
        };

        if stat != session.source_stat {
            return Err(CheckpointInvalid::SourceChanged);
        }

        Ok(())
    }

    /// Refresh the checksum and atomically write the session
    pub async fn dump(&self, session: &mut UploadSession) -> Result<(), CheckpointError> {
        session.checksum = session.compute_checksum()?;
        let bytes = serde_json::to_vec(session).map_err(CheckpointError::Encode)?;

        let temp_path = self.temp_path();
        let mut file = tokio::fs::File::create(&temp_path).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&temp_path, &self.path).await?;

        tracing::trace!(
            path = %self.path.display(),
            completed = session.completed_count(),
            total = session.parts.len(),
            "Checkpoint written"
        );
        Ok(())
    }

    /// Delete the checkpoint; succeeds if it is already gone
    pub async fn remove(&self) -> Result<(), CheckpointError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
