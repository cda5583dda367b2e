//! Uploadr - resumable multipart uploads to S3-compatible storage

use anyhow::Context;
use clap::{Parser, Subcommand};
use resumable_uploadr::config::Config;
use resumable_uploadr::s3::{ObjectMetadata, S3Client};
use resumable_uploadr::telemetry::init_subscriber;
use resumable_uploadr::upload::planner::plan_parts;
use resumable_uploadr::upload::request::checkpoint_path_in;
use resumable_uploadr::upload::{
    CheckpointStore, ProgressEvent, ProgressListener, UploadCoordinator, UploadRequest,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

/// Uploadr - resumable multipart uploads to S3-compatible storage
#[derive(Parser, Debug)]
#[command(name = "uploadr")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a file, resuming from its checkpoint when possible
    Upload(UploadArgs),

    /// Print how a file would be split into parts
    Plan {
        source: PathBuf,

        /// Part size in bytes
        #[arg(long)]
        part_size: Option<u64>,
    },

    /// Show the progress recorded in a checkpoint file
    Inspect { checkpoint: PathBuf },
}

#[derive(clap::Args, Debug)]
struct UploadArgs {
    /// File to upload
    source: PathBuf,

    /// Object key
    #[arg(short, long)]
    key: String,

    /// Target bucket (defaults to s3.bucket from the config)
    #[arg(short, long)]
    bucket: Option<String>,

    /// Part size in bytes
    #[arg(long)]
    part_size: Option<u64>,

    /// Parts uploaded at once
    #[arg(long)]
    concurrency: Option<usize>,

    /// Checkpoint file (defaults to <SOURCE>.ucp)
    #[arg(long, conflicts_with = "no_checkpoint")]
    checkpoint: Option<PathBuf>,

    /// Do not record or resume progress
    #[arg(long)]
    no_checkpoint: bool,

    /// Content type (guessed from the key when omitted)
    #[arg(long)]
    content_type: Option<String>,
}

/// Logs a line per finished part
#[derive(Default)]
struct LogProgress {
    total: AtomicU64,
    done: AtomicU64,
}

impl ProgressListener for LogProgress {
    fn progress_changed(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::TransferStarted {
                total_bytes,
                pending_bytes,
            } => {
                self.total.store(total_bytes, Ordering::Relaxed);
                self.done.store(total_bytes - pending_bytes, Ordering::Relaxed);
                info!(total_bytes, pending_bytes, "Transfer started");
            }
            ProgressEvent::PartCompleted { part_number, bytes } => {
                let done = self.done.fetch_add(bytes, Ordering::Relaxed) + bytes;
                let total = self.total.load(Ordering::Relaxed).max(1);
                info!(part_number, percent = done * 100 / total, "Part uploaded");
            }
            ProgressEvent::PartFailed { part_number } => {
                info!(part_number, "Part failed");
            }
            ProgressEvent::TransferCompleted | ProgressEvent::TransferFailed => {}
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match args.config {
        Some(ref path) => Config::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Config::default(),
    };

    init_subscriber(&config.logging, args.log_level.as_deref())?;

    match args.command {
        Command::Upload(upload) => run_upload(&config, upload).await,
        Command::Plan { source, part_size } => {
            run_plan(source, part_size.unwrap_or(config.upload.part_size))
        }
        Command::Inspect { checkpoint } => run_inspect(checkpoint).await,
    }
}

async fn run_upload(config: &Config, args: UploadArgs) -> anyhow::Result<()> {
    let bucket = args
        .bucket
        .or_else(|| config.s3.bucket.clone())
        .context("no bucket given: pass --bucket or set s3.bucket")?;

    let source = std::fs::canonicalize(&args.source)
        .with_context(|| format!("cannot access {}", args.source.display()))?;

    let mut request = UploadRequest::new(&source, bucket, args.key)
        .part_size(args.part_size.unwrap_or(config.upload.part_size))
        .concurrency(args.concurrency.unwrap_or(config.upload.concurrent_parts))
        .enable_checkpoint(config.upload.checkpoint.enabled && !args.no_checkpoint);

    if let Some(checkpoint) = args.checkpoint {
        request = request.checkpoint_file(checkpoint).enable_checkpoint(true);
    } else if let Some(ref directory) = config.upload.checkpoint.directory {
        request = request.checkpoint_file(checkpoint_path_in(directory, &source));
    }

    if let Some(content_type) = args.content_type {
        request = request.metadata(ObjectMetadata::with_content_type(content_type));
    }

    info!("Starting Uploadr v{}", resumable_uploadr::VERSION);

    let client = S3Client::from_config(&config.s3).await?;
    let coordinator = UploadCoordinator::new(Arc::new(client))
        .with_progress_listener(Arc::new(LogProgress::default()));

    let result = coordinator.upload_file(request).await?;

    println!("bucket:   {}", result.bucket);
    println!("key:      {}", result.key);
    println!("etag:     {}", result.etag);
    if let Some(ref version_id) = result.version_id {
        println!("version:  {}", version_id);
    }
    println!("parts:    {}", result.parts_count);
    println!("uploaded: {} bytes", result.bytes_uploaded);
    println!("resumed:  {}", result.resumed);

    Ok(())
}

fn run_plan(source: PathBuf, part_size: u64) -> anyhow::Result<()> {
    anyhow::ensure!(part_size > 0, "part size must be greater than zero");

    let size = std::fs::metadata(&source)
        .with_context(|| format!("cannot access {}", source.display()))?
        .len();
    let parts = plan_parts(size, part_size);

    println!("{:>6}  {:>16}  {:>16}", "part", "offset", "size");
    for part in &parts {
        println!("{:>6}  {:>16}  {:>16}", part.number, part.offset, part.size);
    }
    println!("{} parts, {} bytes", parts.len(), size);

    Ok(())
}

async fn run_inspect(checkpoint: PathBuf) -> anyhow::Result<()> {
    let store = CheckpointStore::new(&checkpoint);
    let session = store
        .load()
        .await
        .with_context(|| format!("reading checkpoint {}", checkpoint.display()))?;

    let validity = match store
        .validate(&session, &session.source, &session.bucket, &session.key)
        .await
    {
        Ok(()) => "resumable".to_string(),
        Err(reason) => format!("stale ({})", reason),
    };

    println!("source:    {}", session.source.display());
    println!("target:    {}/{}", session.bucket, session.key);
    println!("upload id: {}", session.upload_id);
    println!(
        "progress:  {}/{} parts, {} of {} bytes",
        session.completed_count(),
        session.parts.len(),
        session.total_bytes() - session.pending_bytes(),
        session.total_bytes()
    );
    println!("status:    {}", validity);

    Ok(())
}
