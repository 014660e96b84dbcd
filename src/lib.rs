//! wallpaper-dl - A library for browsing and downloading wallpapers.
//!
//! This library provides the catalogue client, category browser, pagination,
//! authentication gate and download jobs of the wallpaper gallery,
//! abstracted from any specific UI or display framework.
//!
//! # Example
//!
//! ```no_run
//! use wallpaper_dl::{
//!     ArchiveDownloader, AuthGate, CatalogClient, DownloadConfig, HttpCatalog, MemoryStore,
//!     NoProgress,
//! };
//!
//! # async fn example() -> wallpaper_dl::Result<()> {
//! let client = HttpCatalog::new(reqwest::Client::new(), "https://ai-wallpapers-backend.vercel.app")?;
//! let gate = AuthGate::new(MemoryStore::new());
//! gate.sign_in("token")?;
//!
//! // List a category and save it as one archive
//! let images = client.images_in_category("Nature").await?;
//! let downloader = ArchiveDownloader::new(&client, DownloadConfig::default());
//! let outcome = downloader
//!     .download_all(&gate, "Nature", &images, std::path::Path::new("."), &NoProgress, None)
//!     .await?;
//! if let Some(report) = outcome.proceeded() {
//!     println!("Saved {} wallpapers to {}", report.entries, report.path.display());
//! }
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod account;
pub mod archive;
pub mod auth;
pub mod catalog;
pub mod categories;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod fanout;
pub mod fs;
pub mod gallery;
pub mod pagination;
pub mod storage;

// Re-export main types for convenience
pub use account::SignUpForm;
pub use archive::{
    ArchiveDownloader, ArchiveJob, ArchiveProgress, ArchiveReport, FailurePolicy, JobState,
    JobStatus, NoProgress,
};
pub use auth::{AuthGate, AuthState, Gated};
pub use catalog::{CatalogClient, HttpCatalog, ImageRecord, NewImage};
pub use categories::{CategoryBrowser, CategoryListing, CategoryThumbnailMap, ListingSource};
pub use config::{AppConfig, DownloadConfig};
pub use error::{Error, Result};
pub use fanout::{settle_all, settle_all_cancellable};
pub use fs::{FileSystem, TokioFileSystem};
#[cfg(feature = "clipboard")]
pub use gallery::SystemClipboard;
pub use gallery::{Clipboard, ModalState, PreviewModal, TileGrid, TileState, download_single};
pub use pagination::{GALLERY_PAGE_SIZE, Paginator, WALLPAPERS_PAGE_SIZE};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
