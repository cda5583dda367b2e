//! Resumable Uploadr Library
//!
//! Resumable multipart uploads of large files to S3-compatible storage.
//!
//! # Features
//!
//! - **Concurrent Parts**: Bounded pool of part uploads
//! - **Crash Safe**: Progress checkpointed after every acknowledged part
//! - **Tamper Evident**: Checkpoints carry a SHA-256 self-check and are
//!   discarded when the source file changes
//! - **S3 Compatible**: Works with AWS S3, MinIO, RustFS and friends
//!
//! # Example
//!
//! ```no_run
//! use resumable_uploadr::config::Config;
//! use resumable_uploadr::s3::S3Client;
//! use resumable_uploadr::upload::{UploadCoordinator, UploadRequest};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let client = S3Client::from_config(&config.s3).await?;
//!     let coordinator = UploadCoordinator::new(Arc::new(client));
//!
//!     let request = UploadRequest::new("disk.img", "backups", "images/disk.img");
//!     let result = coordinator.upload_file(request).await?;
//!     println!("{} ({} parts)", result.etag, result.parts_count);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod metrics;
pub mod s3;
pub mod telemetry;
pub mod upload;

// Re-export commonly used types
pub use config::Config;
pub use upload::{UploadCoordinator, UploadError, UploadRequest, UploadResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
