//! Shared test helpers
//!
//! `FakeS3` is an in-memory [`MultipartApi`] that records every call and can
//! be told to fail or delay specific parts.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use resumable_uploadr::s3::{
    CompletionResult, MultipartApi, ObjectMetadata, S3ClientError, UploadPartRequest,
};
use resumable_uploadr::upload::PartTag;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Initiated {
    pub bucket: String,
    pub key: String,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completed {
    pub upload_id: String,
    pub parts: Vec<PartTag>,
}

#[derive(Default)]
pub struct FakeS3 {
    initiated: Mutex<Vec<Initiated>>,
    part_attempts: Mutex<Vec<u32>>,
    bodies: Mutex<HashMap<u32, Bytes>>,
    checksums: Mutex<HashMap<u32, String>>,
    completed: Mutex<Vec<Completed>>,
    failing_parts: Mutex<HashSet<u32>>,
    delays: Mutex<HashMap<u32, Duration>>,
    fail_completion: AtomicBool,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    checkpoint_watch: Mutex<Option<PathBuf>>,
    checkpoint_seen: AtomicBool,
}

impl FakeS3 {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_part(&self, part_number: u32) {
        self.failing_parts.lock().insert(part_number);
    }

    pub fn fail_completion(&self, fail: bool) {
        self.fail_completion.store(fail, Ordering::SeqCst);
    }

    /// Clear all injected failures and forget previous calls
    pub fn heal(&self) {
        self.failing_parts.lock().clear();
        self.fail_completion(false);
        self.part_attempts.lock().clear();
        self.bodies.lock().clear();
    }

    pub fn delay_part(&self, part_number: u32, delay: Duration) {
        self.delays.lock().insert(part_number, delay);
    }

    /// Remember whether `path` exists whenever a part is uploaded
    pub fn watch_checkpoint(&self, path: impl Into<PathBuf>) {
        *self.checkpoint_watch.lock() = Some(path.into());
    }

    pub fn checkpoint_seen(&self) -> bool {
        self.checkpoint_seen.load(Ordering::SeqCst)
    }

    pub fn initiated(&self) -> Vec<Initiated> {
        self.initiated.lock().clone()
    }

    /// Part numbers sent since the last heal, sorted
    pub fn uploaded_parts(&self) -> Vec<u32> {
        let mut parts = self.part_attempts.lock().clone();
        parts.sort_unstable();
        parts
    }

    /// Checksum sent with the last successful upload of `part_number`
    pub fn checksum_of(&self, part_number: u32) -> Option<String> {
        self.checksums.lock().get(&part_number).cloned()
    }

    pub fn completions(&self) -> Vec<Completed> {
        self.completed.lock().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Concatenation of the successfully uploaded bodies in part order
    pub fn assembled(&self) -> Vec<u8> {
        let bodies = self.bodies.lock();
        let mut numbers: Vec<_> = bodies.keys().copied().collect();
        numbers.sort_unstable();
        numbers
            .iter()
            .flat_map(|n| bodies[n].iter().copied())
            .collect()
    }
}

pub fn etag_for(part_number: u32) -> String {
    format!("\"etag-{}\"", part_number)
}

#[async_trait]
impl MultipartApi for FakeS3 {
    async fn initiate_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        metadata: &ObjectMetadata,
    ) -> Result<String, S3ClientError> {
        let mut initiated = self.initiated.lock();
        initiated.push(Initiated {
            bucket: bucket.to_string(),
            key: key.to_string(),
            content_type: metadata.content_type.clone(),
        });
        Ok(format!("upload-{}", initiated.len()))
    }

    async fn upload_part(&self, request: UploadPartRequest) -> Result<String, S3ClientError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.part_attempts.lock().push(request.part_number);

        if let Some(ref path) = *self.checkpoint_watch.lock() {
            if path.exists() {
                self.checkpoint_seen.store(true, Ordering::SeqCst);
            }
        }

        let delay = self.delays.lock().get(&request.part_number).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        // Give other tasks a chance to overlap
        tokio::task::yield_now().await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing_parts.lock().contains(&request.part_number) {
            return Err(S3ClientError::RequestError(format!(
                "injected failure for part {}",
                request.part_number
            )));
        }

        if let Some(checksum) = request.checksum_sha256 {
            self.checksums.lock().insert(request.part_number, checksum);
        }
        self.bodies.lock().insert(request.part_number, request.body);
        Ok(etag_for(request.part_number))
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[PartTag],
    ) -> Result<CompletionResult, S3ClientError> {
        if self.fail_completion.load(Ordering::SeqCst) {
            return Err(S3ClientError::ResponseError("InternalError".into()));
        }

        self.completed.lock().push(Completed {
            upload_id: upload_id.to_string(),
            parts: parts.to_vec(),
        });

        Ok(CompletionResult {
            bucket: bucket.to_string(),
            key: key.to_string(),
            etag: "\"final-etag\"".to_string(),
            location: Some(format!("http://localhost/{}/{}", bucket, key)),
            version_id: None,
        })
    }
}

/// Write `size` bytes of a repeating pattern to `dir/name`
pub fn write_source(dir: &TempDir, name: &str, size: usize) -> PathBuf {
    let path = dir.path().join(name);
    let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
    std::fs::write(&path, data).unwrap();
    path
}

/// Write `size` random bytes to `dir/name`
pub fn write_random_source(dir: &TempDir, name: &str, size: usize) -> PathBuf {
    use rand::Rng;
    let mut rng = rand::rng();
    let data: Vec<u8> = (0..size).map(|_| rng.random()).collect();
    let path = dir.path().join(name);
    std::fs::write(&path, data).unwrap();
    path
}

pub fn checkpoint_of(source: &Path) -> PathBuf {
    let mut name = source.as_os_str().to_owned();
    name.push(".ucp");
    PathBuf::from(name)
}
