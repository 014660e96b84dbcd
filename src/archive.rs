//! Bulk "download all" into a single zip archive.
//!
//! One fetch per image is issued concurrently, the job waits for every
//! fetch to settle, and the payloads are packed in request order as
//! `wallpaper-<position>.jpg` entries of `<category>-wallpapers.zip`.

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::auth::{AuthGate, Gated};
use crate::catalog::{CatalogClient, ImageRecord};
use crate::config::DownloadConfig;
use crate::error::{Error, Result};
use crate::fanout::{settle_all, settle_all_cancellable};
use crate::fs::{FileSystem, TokioFileSystem, save_atomic};
use crate::storage::KeyValueStore;

/// What a bulk download does when one of its fetches fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Fail the whole job; no archive is written.
    #[default]
    Abort,
    /// Leave failed images out and archive the rest.
    Skip,
}

/// Whether a bulk download is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Ready for a new job.
    Idle,
    /// A job is fetching or assembling.
    InProgress,
}

/// Shared, cloneable view of a downloader's [`JobState`], e.g. for driving a
/// disabled "Downloading..." control.
#[derive(Debug, Clone, Default)]
pub struct JobStatus(Arc<AtomicBool>);

impl JobStatus {
    /// Current state.
    #[must_use]
    pub fn state(&self) -> JobState {
        if self.0.load(Ordering::Acquire) {
            JobState::InProgress
        } else {
            JobState::Idle
        }
    }

    /// Returns `true` while a job runs.
    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        self.state() == JobState::InProgress
    }

    fn begin(&self) -> Result<InProgressGuard> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::JobInProgress)?;
        Ok(InProgressGuard(self.clone()))
    }
}

/// Resets the job to idle on every exit path, including drops mid-await.
struct InProgressGuard(JobStatus);

impl Drop for InProgressGuard {
    fn drop(&mut self) {
        self.0.0.store(false, Ordering::Release);
    }
}

/// Fetch outcome of one archive entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Not settled yet.
    Pending,
    /// Payload retrieved.
    Succeeded(Bytes),
    /// Fetch failed with the given reason.
    Failed(String),
}

/// One image of an [`ArchiveJob`].
#[derive(Debug, Clone)]
pub struct ArchiveItem {
    /// 1-based position in the request.
    pub position: usize,
    /// URL the payload is fetched from.
    pub url: String,
    /// Fetch outcome.
    pub outcome: FetchOutcome,
}

/// Transient state of one "download all" invocation.
#[derive(Debug, Clone)]
pub struct ArchiveJob {
    category: String,
    items: Vec<ArchiveItem>,
}

impl ArchiveJob {
    /// Creates a job with every item pending.
    #[must_use]
    pub fn new(category: &str, images: &[ImageRecord]) -> Self {
        Self {
            category: category.to_string(),
            items: images
                .iter()
                .enumerate()
                .map(|(i, image)| ArchiveItem {
                    position: i + 1,
                    url: image.download_url.clone(),
                    outcome: FetchOutcome::Pending,
                })
                .collect(),
        }
    }

    /// Entry name for the image at 1-based `position`.
    #[must_use]
    pub fn entry_name(position: usize) -> String {
        format!("wallpaper-{position}.jpg")
    }

    /// File name of the archive. Path separators in the category are
    /// replaced so the archive always lands in the target directory.
    #[must_use]
    pub fn archive_name(&self) -> String {
        let safe: String = self
            .category
            .chars()
            .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
            .collect();
        format!("{safe}-wallpapers.zip")
    }

    /// Positions and reasons of failed fetches.
    #[must_use]
    pub fn failures(&self) -> Vec<(usize, String)> {
        self.items
            .iter()
            .filter_map(|item| match &item.outcome {
                FetchOutcome::Failed(reason) => Some((item.position, reason.clone())),
                _ => None,
            })
            .collect()
    }

    /// Number of retrieved payloads.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.items
            .iter()
            .filter(|item| matches!(item.outcome, FetchOutcome::Succeeded(_)))
            .count()
    }

    /// Packs every retrieved payload into an in-memory deflate zip.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Archive`] or [`Error::Io`] if the writer fails.
    pub fn assemble(&self) -> Result<Vec<u8>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        for item in &self.items {
            if let FetchOutcome::Succeeded(bytes) = &item.outcome {
                writer.start_file(Self::entry_name(item.position), options)?;
                writer.write_all(bytes)?;
            }
        }
        Ok(writer.finish()?.into_inner())
    }
}

/// Trait for receiving bulk download progress updates.
///
/// All methods have default no-op implementations for convenience.
pub trait ArchiveProgress: Send + Sync {
    /// Called once the fetches are about to be issued.
    fn on_job_start(&self, _category: &str, _images: usize) {}

    /// Called as each fetch succeeds, in completion order.
    fn on_fetch_complete(&self, _position: usize, _bytes: u64) {}

    /// Called as each fetch fails, in completion order.
    fn on_fetch_failed(&self, _position: usize, _error: &str) {}

    /// Called after the archive has been saved.
    fn on_archive_written(&self, _report: &ArchiveReport) {}
}

/// A null progress implementation that ignores all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ArchiveProgress for NoProgress {}

/// Summary of a finished bulk download.
#[derive(Debug, Clone)]
pub struct ArchiveReport {
    /// Where the archive was saved.
    pub path: PathBuf,
    /// Number of entries in the archive.
    pub entries: usize,
    /// Failed fetches left out under [`FailurePolicy::Skip`].
    pub failed: Vec<(usize, String)>,
    /// Size of the archive in bytes.
    pub archive_size: u64,
    /// Wall time from first fetch to saved archive.
    pub elapsed: Duration,
}

/// Downloads a whole category into one archive.
pub struct ArchiveDownloader<'a, C: ?Sized, F: FileSystem = TokioFileSystem> {
    client: &'a C,
    config: DownloadConfig,
    fs: F,
    status: JobStatus,
}

impl<'a, C: CatalogClient + ?Sized> ArchiveDownloader<'a, C, TokioFileSystem> {
    /// Creates a downloader with the default file system.
    #[must_use]
    pub fn new(client: &'a C, config: DownloadConfig) -> Self {
        Self::with_fs(client, config, TokioFileSystem)
    }
}

impl<'a, C: CatalogClient + ?Sized, F: FileSystem> ArchiveDownloader<'a, C, F> {
    /// Creates a downloader with a custom file system implementation.
    #[must_use]
    pub fn with_fs(client: &'a C, config: DownloadConfig, fs: F) -> Self {
        Self {
            client,
            config,
            fs,
            status: JobStatus::default(),
        }
    }

    /// Handle to this downloader's job state.
    #[must_use]
    pub fn status(&self) -> JobStatus {
        self.status.clone()
    }

    /// Returns a reference to the download configuration.
    #[must_use]
    pub const fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Fetches every image of `category` and saves them as one archive in `dir`.
    ///
    /// Anonymous callers get [`Gated::PromptAuth`] and nothing is fetched.
    /// The job state is [`JobState::InProgress`] for the duration of the call
    /// and always returns to idle.
    ///
    /// # Errors
    ///
    /// - [`Error::JobInProgress`] if another job is running on this downloader
    /// - [`Error::Fetch`] on the first failed fetch (by position) under
    ///   [`FailurePolicy::Abort`]
    /// - [`Error::NothingToArchive`] if no payload was retrieved
    /// - [`Error::Cancelled`] if `cancel` fires mid-fetch
    /// - archive assembly and file system errors
    pub async fn download_all<S: KeyValueStore>(
        &self,
        gate: &AuthGate<S>,
        category: &str,
        images: &[ImageRecord],
        dir: &Path,
        progress: &dyn ArchiveProgress,
        cancel: Option<&CancellationToken>,
    ) -> Result<Gated<ArchiveReport>> {
        gate.require_async(|| self.run(category, images, dir, progress, cancel))
            .await
            .transpose()
    }

    async fn run(
        &self,
        category: &str,
        images: &[ImageRecord],
        dir: &Path,
        progress: &dyn ArchiveProgress,
        cancel: Option<&CancellationToken>,
    ) -> Result<ArchiveReport> {
        let _guard = self.status.begin()?;
        let started = Instant::now();
        let mut job = ArchiveJob::new(category, images);
        if job.items.is_empty() {
            return Err(Error::NothingToArchive {
                category: category.to_string(),
            });
        }

        log::info!(
            "Archiving {} wallpapers from {category}",
            job.items.len()
        );
        progress.on_job_start(category, job.items.len());

        let fetches = job.items.iter().map(|item| {
            let position = item.position;
            let url = item.url.as_str();
            async move {
                match self.client.fetch_bytes(url).await {
                    Ok(bytes) => {
                        progress.on_fetch_complete(position, bytes.len() as u64);
                        Ok(bytes)
                    }
                    Err(e) => {
                        log::warn!("Fetch {position} ({url}) failed: {e}");
                        progress.on_fetch_failed(position, &e.to_string());
                        Err(e)
                    }
                }
            }
        });
        let results = match cancel {
            Some(token) => settle_all_cancellable(fetches, token).await?,
            None => settle_all(fetches).await,
        };

        for (item, result) in job.items.iter_mut().zip(results) {
            item.outcome = match result {
                Ok(bytes) => FetchOutcome::Succeeded(bytes),
                Err(e) => FetchOutcome::Failed(e.to_string()),
            };
        }

        let failed = job.failures();
        if self.config.failure_policy == FailurePolicy::Abort
            && let Some((position, reason)) = failed.first()
        {
            return Err(Error::Fetch {
                position: *position,
                url: job.items[position - 1].url.clone(),
                reason: reason.clone(),
            });
        }
        if job.succeeded() == 0 {
            return Err(Error::NothingToArchive {
                category: category.to_string(),
            });
        }

        let bytes = job.assemble().inspect_err(|e| {
            log::error!("Assembling archive for {category} failed: {e}");
        })?;
        let path = dir.join(job.archive_name());
        save_atomic(&self.fs, &path, &bytes, self.config.force_overwrite).await?;

        let report = ArchiveReport {
            path,
            entries: job.succeeded(),
            failed,
            archive_size: bytes.len() as u64,
            elapsed: started.elapsed(),
        };
        log::info!(
            "Saved {} ({} entries, {} skipped)",
            report.path.display(),
            report.entries,
            report.failed.len()
        );
        progress.on_archive_written(&report);
        Ok(report)
    }
}
