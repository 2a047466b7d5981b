//! Validation pipeline around the external GTFS validator.
//!
//! # Stages
//!
//! `Received → InputResolved → Validated → ReportReady`, or a terminal
//! failure at any stage.
//!
//! 1. **Received**: the submission is checked without touching disk or network
//! 2. **InputResolved**: the feed is written into a fresh per-request workspace
//! 3. **Validated**: the validator process exited 0
//! 4. **ReportReady**: the requested report was read into memory
//!
//! The workspace is a temporary directory owned by the request and removed
//! when it goes out of scope, on success and on every error path.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::{
    error::AppError,
    models::{
        feed::{FeedSubmission, UploadedFeed},
        report::{HTML_REPORT_FILE, JSON_REPORT_FILE, ReportFormat, ValidationReport},
    },
};

pub const MSG_NO_INPUT: &str = "You must provide either a file or a URL.";
pub const MSG_BOTH_INPUTS: &str = "Provide only one of file or URL, not both.";
pub const MSG_NOT_ZIP: &str = "GTFS feed must be a .zip";
pub const MSG_BAD_URL: &str = "A valid GTFS .zip URL must be provided.";

const FEED_FILE: &str = "feed.zip";
const OUTPUT_DIR: &str = "output";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationStage {
    Received,
    InputResolved,
    Validated,
    ReportReady,
}

impl fmt::Display for ValidationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Received => "received",
            Self::InputResolved => "input_resolved",
            Self::Validated => "validated",
            Self::ReportReady => "report_ready",
        };
        f.write_str(name)
    }
}

/// Where the feed comes from, after the submission passed its checks.
#[derive(Debug, Clone)]
pub enum FeedSource {
    Upload(UploadedFeed),
    Remote(Url),
}

impl FeedSource {
    /// Check a submission before any I/O.
    ///
    /// # Errors
    ///
    /// `InvalidInput` when neither or both inputs are present, the upload is
    /// not declared as zip, or the URL is not an http(s) URL whose path ends in `.zip`.
    pub fn resolve(submission: FeedSubmission) -> Result<Self, AppError> {
        match (submission.upload, submission.url) {
            (None, None) => Err(AppError::InvalidInput(MSG_NO_INPUT.to_string())),
            (Some(_), Some(_)) => Err(AppError::InvalidInput(MSG_BOTH_INPUTS.to_string())),
            (Some(upload), None) => {
                if !upload.is_zip() {
                    return Err(AppError::InvalidInput(MSG_NOT_ZIP.to_string()));
                }
                Ok(Self::Upload(upload))
            }
            (None, Some(url)) => parse_feed_url(&url).map(Self::Remote),
        }
    }
}

fn parse_feed_url(raw: &str) -> Result<Url, AppError> {
    let invalid = || AppError::InvalidInput(MSG_BAD_URL.to_string());

    let url = Url::parse(raw.trim()).map_err(|_| invalid())?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(invalid());
    }
    if !url.path().to_ascii_lowercase().ends_with(".zip") {
        return Err(invalid());
    }

    Ok(url)
}

/// Per-request working directory: `feed.zip` plus an empty `output/`.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn create(root: Option<&Path>) -> Result<Self, AppError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("gtfs-validate-");
        let dir = match root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };
        std::fs::create_dir(dir.path().join(OUTPUT_DIR))?;

        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn feed_path(&self) -> PathBuf {
        self.dir.path().join(FEED_FILE)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.dir.path().join(OUTPUT_DIR)
    }
}

/// Process boundary to the external validator.
///
/// Implementations must write `report.json` (and optionally `report.html`)
/// into `output_dir` and fail with `ValidatorFailed` on a non-zero exit.
#[async_trait]
pub trait FeedValidator: Send + Sync {
    async fn run(&self, input: &Path, output_dir: &Path) -> Result<(), AppError>;
}

/// Runs `<program> <args…> -i <input> -o <output_dir>` on the blocking pool.
#[derive(Debug, Clone)]
pub struct CommandValidator {
    program: String,
    args: Vec<String>,
}

impl CommandValidator {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl FeedValidator for CommandValidator {
    async fn run(&self, input: &Path, output_dir: &Path) -> Result<(), AppError> {
        let mut command = std::process::Command::new(&self.program);
        command
            .args(&self.args)
            .arg("-i")
            .arg(input)
            .arg("-o")
            .arg(output_dir)
            .current_dir(output_dir);

        let started = std::time::Instant::now();
        let output = tokio::task::spawn_blocking(move || command.output())
            .await
            .map_err(|e| AppError::Internal(format!("validator task failed: {e}")))?
            .map_err(|e| AppError::ValidatorFailed(format!("Failed to launch validator: {e}")))?;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            tracing::error!(code = ?output.status.code(), elapsed_ms, %stderr, "validator exited with failure");

            return Err(AppError::ValidatorFailed(if stderr.is_empty() {
                format!("Validator exited with {}", output.status)
            } else {
                stderr
            }));
        }

        tracing::debug!(
            elapsed_ms,
            stdout = %String::from_utf8_lossy(&output.stdout).trim(),
            "validator finished"
        );
        Ok(())
    }
}

pub struct ValidationOrchestrator {
    validator: Arc<dyn FeedValidator>,
    http: reqwest::Client,
    max_feed_bytes: usize,
    workspace_root: Option<PathBuf>,
}

/// Upper bound for establishing the connection to a remote feed host.
const DOWNLOAD_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

impl ValidationOrchestrator {
    /// `download_timeout` bounds a whole remote download, body included.
    pub fn new(
        validator: Arc<dyn FeedValidator>,
        max_feed_bytes: usize,
        download_timeout: Duration,
    ) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .connect_timeout(DOWNLOAD_CONNECT_TIMEOUT.min(download_timeout))
            .timeout(download_timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("HTTP client error: {e}")))?;

        Ok(Self {
            validator,
            http,
            max_feed_bytes,
            workspace_root: None,
        })
    }

    /// Create workspaces under `root` instead of the system temp directory.
    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = Some(root.into());
        self
    }

    /// Run the whole pipeline for one request.
    pub async fn run(
        &self,
        submission: FeedSubmission,
        format: ReportFormat,
    ) -> Result<ValidationReport, AppError> {
        let mut stage = ValidationStage::Received;

        let result = self.run_stages(submission, format, &mut stage).await;
        match &result {
            Ok(_) => tracing::info!(%stage, ?format, "validation completed"),
            Err(e) => tracing::warn!(%stage, error = %e, "validation failed"),
        }
        result
    }

    async fn run_stages(
        &self,
        submission: FeedSubmission,
        format: ReportFormat,
        stage: &mut ValidationStage,
    ) -> Result<ValidationReport, AppError> {
        let source = FeedSource::resolve(submission)?;

        let workspace = Workspace::create(self.workspace_root.as_deref())?;
        tracing::debug!(workspace = %workspace.path().display(), "workspace created");
        let feed_path = workspace.feed_path();
        match source {
            FeedSource::Upload(upload) => self.store_upload(upload, &feed_path).await?,
            FeedSource::Remote(url) => self.download(&url, &feed_path).await?,
        }
        *stage = ValidationStage::InputResolved;

        let output_dir = workspace.output_dir();
        self.validator.run(&feed_path, &output_dir).await?;
        *stage = ValidationStage::Validated;

        let report = read_report(&output_dir, format).await?;
        *stage = ValidationStage::ReportReady;

        Ok(report)
    }

    async fn store_upload(&self, upload: UploadedFeed, dest: &Path) -> Result<(), AppError> {
        if upload.bytes.len() > self.max_feed_bytes {
            return Err(self.too_large());
        }

        tokio::fs::write(dest, &upload.bytes).await?;
        tracing::info!(
            file_name = upload.file_name.as_deref().unwrap_or("<unnamed>"),
            bytes = upload.bytes.len(),
            "uploaded feed saved"
        );
        Ok(())
    }

    /// Stream a remote feed to disk chunk by chunk.
    async fn download(&self, url: &Url, dest: &Path) -> Result<(), AppError> {
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| AppError::InvalidInput(format!("Failed to download file: {e}")))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(AppError::InvalidInput(format!(
                "Failed to download file: {}",
                status.as_u16()
            )));
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0usize;

        while let Some(chunk) = stream.next().await {
            let chunk =
                chunk.map_err(|e| AppError::InvalidInput(format!("Failed to download file: {e}")))?;

            written += chunk.len();
            if written > self.max_feed_bytes {
                return Err(self.too_large());
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        tracing::info!(%url, bytes = written, "remote feed downloaded");
        Ok(())
    }

    fn too_large(&self) -> AppError {
        AppError::InvalidInput(format!(
            "GTFS feed exceeds the maximum size of {} bytes.",
            self.max_feed_bytes
        ))
    }
}

async fn read_report(output_dir: &Path, format: ReportFormat) -> Result<ValidationReport, AppError> {
    match format {
        ReportFormat::Json => read_json_report(output_dir).await.map(ValidationReport::Json),
        ReportFormat::Errors => read_json_report(output_dir)
            .await
            .map(|report| ValidationReport::errors_from(&report)),
        ReportFormat::Html => match tokio::fs::read_to_string(output_dir.join(HTML_REPORT_FILE)).await {
            Ok(page) => Ok(ValidationReport::Html(page)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AppError::ReportMissing("HTML report not found."))
            }
            Err(e) => Err(e.into()),
        },
    }
}

async fn read_json_report(output_dir: &Path) -> Result<Value, AppError> {
    let raw = match tokio::fs::read_to_string(output_dir.join(JSON_REPORT_FILE)).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::ReportMissing("JSON report not found."));
        }
        Err(e) => return Err(e.into()),
    };

    serde_json::from_str(&raw)
        .map_err(|e| AppError::Internal(format!("{JSON_REPORT_FILE} is not valid JSON: {e}")))
}
