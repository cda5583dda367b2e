//! Completion of a multipart upload

use super::UploadSession;
use crate::s3::{CompletionResult, MultipartApi, S3ClientError};

/// Commits a multipart upload from its acknowledged parts
pub struct CompletionAssembler<'a> {
    api: &'a dyn MultipartApi,
}

impl<'a> CompletionAssembler<'a> {
    pub fn new(api: &'a dyn MultipartApi) -> Self {
        Self { api }
    }

    /// Send the session's part tags, ascending by part number, to
    /// CompleteMultipartUpload. Errors are returned as-is; retrying is the
    /// transport's job.
    #[tracing::instrument(
        name = "upload.complete",
        skip(self, session),
        fields(
            upload_id = %session.upload_id,
            parts_count = session.part_tags.len()
        ),
        err
    )]
    pub async fn complete(
        &self,
        session: &UploadSession,
    ) -> Result<CompletionResult, S3ClientError> {
        let tags = session.ordered_tags();
        self.api
            .complete_multipart_upload(&session.bucket, &session.key, &session.upload_id, &tags)
            .await
    }
}
