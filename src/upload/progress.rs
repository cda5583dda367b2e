//! Upload progress events

/// Progress notifications published during [`upload_file`](super::UploadCoordinator::upload_file)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Part uploads are about to start
    TransferStarted {
        total_bytes: u64,
        /// Bytes left to upload; less than `total_bytes` when resuming
        pending_bytes: u64,
    },
    PartCompleted { part_number: u32, bytes: u64 },
    PartFailed { part_number: u32 },
    /// All parts uploaded, completion is next
    TransferCompleted,
    TransferFailed,
}

/// Receives progress events
///
/// Called from the coordinating task only, never concurrently.
pub trait ProgressListener: Send + Sync {
    fn progress_changed(&self, event: ProgressEvent);
}

impl<F> ProgressListener for F
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn progress_changed(&self, event: ProgressEvent) {
        self(event)
    }
}
