//! Upload coordinator
//!
//! Drives one file upload through its states:
//!
//! ```text
//! Fresh ──► Preparing ──► Uploading ──► Completing ──► Done
//!   │                       ▲    │            │
//!   └── valid checkpoint ───┘    └──► Failed ◄┘
//! ```
//!
//! Part uploads run as tokio tasks gated by a semaphore, so at most
//! `concurrency` parts are in flight. The coordinator always drains every
//! task before deciding the outcome and is the only writer of the
//! [`UploadSession`]; the checkpoint is rewritten after each acknowledged part.

use super::checkpoint::{CheckpointError, CheckpointStore, FileStat, UploadSession};
use super::complete::CompletionAssembler;
use super::part::{PartUploader, UploadTarget};
use super::planner::plan_parts;
use super::progress::{ProgressEvent, ProgressListener};
use super::{UploadError, UploadRequest, UploadResult};
use crate::metrics;
use crate::s3::MultipartApi;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Coordinator states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Fresh,
    Preparing,
    Uploading,
    Completing,
    Done,
    Failed,
}

impl UploadState {
    fn can_advance_to(self, next: UploadState) -> bool {
        use UploadState::*;
        matches!(
            (self, next),
            (Fresh, Preparing)
                | (Fresh, Uploading)
                | (Preparing, Uploading)
                | (Preparing, Failed)
                | (Uploading, Completing)
                | (Uploading, Failed)
                | (Completing, Done)
                | (Completing, Failed)
        )
    }
}

struct StateTracker {
    state: UploadState,
}

impl StateTracker {
    fn new() -> Self {
        Self {
            state: UploadState::Fresh,
        }
    }

    fn advance(&mut self, next: UploadState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "invalid transition {:?} -> {:?}",
            self.state,
            next
        );
        tracing::debug!(from = ?self.state, to = ?next, "Upload state changed");
        self.state = next;
    }
}

/// Resumable multipart file uploader
///
/// # Example
///
/// ```no_run
/// use resumable_uploadr::config::S3Config;
/// use resumable_uploadr::s3::S3Client;
/// use resumable_uploadr::upload::{UploadCoordinator, UploadRequest};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = S3Client::from_config(&S3Config::default()).await?;
/// let coordinator = UploadCoordinator::new(Arc::new(client));
///
/// let request = UploadRequest::new("/data/backup.tar", "backups", "2024/backup.tar")
///     .part_size(16 * 1024 * 1024)
///     .concurrency(8);
/// let result = coordinator.upload_file(request).await?;
/// println!("ETag: {}", result.etag);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct UploadCoordinator {
    api: Arc<dyn MultipartApi>,
    listener: Option<Arc<dyn ProgressListener>>,
}

impl UploadCoordinator {
    pub fn new(api: Arc<dyn MultipartApi>) -> Self {
        Self {
            api,
            listener: None,
        }
    }

    /// Publish progress events to `listener`
    pub fn with_progress_listener(mut self, listener: Arc<dyn ProgressListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Upload `request.source` as `request.bucket/request.key`.
    ///
    /// Resumes from the request's checkpoint when it is intact and still
    /// matches the source file; otherwise starts a new multipart upload. On
    /// failure the checkpoint is kept so the next call can resume.
    #[tracing::instrument(
        name = "upload.file",
        skip(self, request),
        fields(
            source = %request.source.display(),
            s3.bucket = %request.bucket,
            s3.key = %request.key
        ),
        err
    )]
    pub async fn upload_file(&self, request: UploadRequest) -> Result<UploadResult, UploadError> {
        request.validate()?;

        let started = Instant::now();
        let mut tracker = StateTracker::new();

        match self.run(&request, &mut tracker).await {
            Ok(result) => {
                metrics::record_upload_success(
                    &request.bucket,
                    result.bytes_uploaded,
                    result.parts_count,
                );
                metrics::record_upload_duration(&request.bucket, started.elapsed().as_secs_f64());
                Ok(result)
            }
            Err(e) => {
                if tracker.state.can_advance_to(UploadState::Failed) {
                    tracker.advance(UploadState::Failed);
                }
                self.publish(ProgressEvent::TransferFailed);
                metrics::record_upload_failure(&request.bucket);
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        request: &UploadRequest,
        tracker: &mut StateTracker,
    ) -> Result<UploadResult, UploadError> {
        let store = request.checkpoint_path().map(CheckpointStore::new);

        let (mut session, resumed) = match self.resume(request, store.as_ref()).await {
            Some(session) => (session, true),
            None => {
                tracker.advance(UploadState::Preparing);
                (self.prepare(request, store.as_ref()).await?, false)
            }
        };

        tracker.advance(UploadState::Uploading);
        let bytes_uploaded = self
            .upload_parts(request.concurrency, &mut session, store.as_ref())
            .await?;

        tracker.advance(UploadState::Completing);
        let completion = CompletionAssembler::new(self.api.as_ref())
            .complete(&session)
            .await?;

        if let Some(ref store) = store {
            if let Err(e) = store.remove().await {
                tracing::warn!(
                    path = %store.path().display(),
                    error = %e,
                    "Failed to remove checkpoint after completion"
                );
            }
        }
        tracker.advance(UploadState::Done);

        tracing::info!(
            upload_id = %session.upload_id,
            etag = %completion.etag,
            parts = session.parts.len(),
            bytes_uploaded,
            resumed,
            "Completed multipart upload"
        );

        Ok(UploadResult {
            bucket: completion.bucket,
            key: completion.key,
            etag: completion.etag,
            location: completion.location,
            version_id: completion.version_id,
            upload_id: session.upload_id,
            parts_count: session.parts.len(),
            bytes_uploaded,
            resumed,
        })
    }

    /// Load the checkpoint if it can be resumed. Unreadable or stale
    /// checkpoints are ignored; the fresh session overwrites them.
    async fn resume(
        &self,
        request: &UploadRequest,
        store: Option<&CheckpointStore>,
    ) -> Option<UploadSession> {
        let store = store?;

        let session = match store.load().await {
            Ok(session) => session,
            Err(CheckpointError::NotFound(_)) => return None,
            Err(e) => {
                tracing::warn!(
                    path = %store.path().display(),
                    error = %e,
                    "Ignoring unreadable checkpoint"
                );
                metrics::record_checkpoint_event("corrupt");
                return None;
            }
        };

        match store
            .validate(&session, &request.source, &request.bucket, &request.key)
            .await
        {
            Ok(()) => {
                tracing::info!(
                    upload_id = %session.upload_id,
                    completed = session.completed_count(),
                    total = session.parts.len(),
                    "Resuming upload from checkpoint"
                );
                metrics::record_checkpoint_event("resumed");
                Some(session)
            }
            Err(reason) => {
                tracing::info!(
                    path = %store.path().display(),
                    reason = %reason,
                    "Discarding stale checkpoint"
                );
                metrics::record_checkpoint_event("discarded");
                None
            }
        }
    }

    /// Plan parts, initiate the multipart upload and persist the new session
    async fn prepare(
        &self,
        request: &UploadRequest,
        store: Option<&CheckpointStore>,
    ) -> Result<UploadSession, UploadError> {
        let source_stat = FileStat::of(&request.source).await?;
        let parts = plan_parts(source_stat.size, request.part_size);

        let mut metadata = request.metadata.clone();
        metadata.content_type = Some(request.content_type());

        let upload_id = self
            .api
            .initiate_multipart_upload(&request.bucket, &request.key, &metadata)
            .await?;

        tracing::info!(
            upload_id = %upload_id,
            size = source_stat.size,
            parts = parts.len(),
            "Initiated multipart upload"
        );

        let mut session = UploadSession::new(
            request.source.clone(),
            source_stat,
            request.bucket.clone(),
            request.key.clone(),
            upload_id,
            parts,
        )?;

        if let Some(store) = store {
            store.dump(&mut session).await?;
        }

        Ok(session)
    }

    /// Upload every pending part and wait for all of them.
    ///
    /// Returns the number of bytes uploaded, or the error of the
    /// lowest-numbered part that failed.
    async fn upload_parts(
        &self,
        concurrency: usize,
        session: &mut UploadSession,
        store: Option<&CheckpointStore>,
    ) -> Result<u64, UploadError> {
        self.publish(ProgressEvent::TransferStarted {
            total_bytes: session.total_bytes(),
            pending_bytes: session.pending_bytes(),
        });

        let uploader = PartUploader::new(
            self.api.clone(),
            UploadTarget {
                source: session.source.clone(),
                bucket: session.bucket.clone(),
                key: session.key.clone(),
                upload_id: session.upload_id.clone(),
            },
        );
        let permits = Arc::new(Semaphore::new(concurrency));
        let mut tasks = JoinSet::new();

        for part in session.pending_parts().cloned().collect::<Vec<_>>() {
            let uploader = uploader.clone();
            let permits = permits.clone();
            tasks.spawn(async move {
                // Held until the part finishes; the semaphore is never closed.
                let _permit = permits.acquire_owned().await;
                uploader.upload(&part).await
            });
        }

        let mut failures: Vec<(u32, UploadError)> = Vec::new();
        let mut bytes_uploaded = 0;

        while let Some(joined) = tasks.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(error = %e, "Part upload task aborted");
                    failures.push((u32::MAX, UploadError::WorkerError(e.to_string())));
                    continue;
                }
            };

            let part_number = outcome.part_number;
            match outcome.result {
                Ok(tag) => {
                    session.record_completion(tag);
                    bytes_uploaded += outcome.size;
                    metrics::record_part(true);
                    self.publish(ProgressEvent::PartCompleted {
                        part_number,
                        bytes: outcome.size,
                    });

                    if let Some(store) = store {
                        if let Err(e) = store.dump(session).await {
                            tracing::warn!(
                                part_number,
                                error = %e,
                                "Failed to persist checkpoint"
                            );
                            failures.push((part_number, e.into()));
                        }
                    }
                }
                Err(source) => {
                    metrics::record_part(false);
                    self.publish(ProgressEvent::PartFailed { part_number });
                    failures.push((part_number, UploadError::PartFailed { part_number, source }));
                }
            }
        }

        if let Some((_, first)) = failures.into_iter().min_by_key(|(number, _)| *number) {
            return Err(first);
        }

        self.publish(ProgressEvent::TransferCompleted);
        Ok(bytes_uploaded)
    }

    fn publish(&self, event: ProgressEvent) {
        if let Some(ref listener) = self.listener {
            listener.progress_changed(event);
        }
    }
}
