//! Image grid and preview modal state, plus single-image download.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::auth::{AuthGate, Gated};
use crate::catalog::{CatalogClient, ImageRecord, parse_absolute};
use crate::error::Result;
use crate::fs::{FileSystem, save_atomic};
use crate::storage::KeyValueStore;

/// How long the "link copied" confirmation stays visible after a share.
pub const SHARE_CONFIRMATION: Duration = Duration::from_secs(2);

/// Filename used when a URL has no usable trailing segment.
const FALLBACK_FILENAME: &str = "wallpaper.jpg";

/// Load state of one grid tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileState {
    /// Placeholder shown; image not decoded yet.
    Loading,
    /// Image decoded; placeholder swapped out.
    Loaded,
}

/// Per-image load tracking for the visible page of the grid.
#[derive(Debug, Clone, Default)]
pub struct TileGrid {
    order: Vec<ImageRecord>,
    tiles: HashMap<String, TileState>,
}

impl TileGrid {
    /// Creates a grid whose tiles all start as [`TileState::Loading`].
    #[must_use]
    pub fn new(images: &[ImageRecord]) -> Self {
        Self {
            order: images.to_vec(),
            tiles: images
                .iter()
                .map(|image| (image.id.clone(), TileState::Loading))
                .collect(),
        }
    }

    /// Images in display order.
    #[must_use]
    pub fn images(&self) -> &[ImageRecord] {
        &self.order
    }

    /// Returns the state of tile `id`, if it is on the grid.
    #[must_use]
    pub fn state(&self, id: &str) -> Option<TileState> {
        self.tiles.get(id).copied()
    }

    /// Returns `true` once tile `id` has loaded.
    #[must_use]
    pub fn is_loaded(&self, id: &str) -> bool {
        self.state(id) == Some(TileState::Loaded)
    }

    /// Marks tile `id` as loaded. Unknown ids are ignored.
    pub fn mark_loaded(&mut self, id: &str) {
        if let Some(state) = self.tiles.get_mut(id) {
            *state = TileState::Loaded;
        }
    }

    /// Number of tiles still showing a placeholder.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.tiles
            .values()
            .filter(|state| **state == TileState::Loading)
            .count()
    }
}

/// Destination for shared links.
pub trait Clipboard {
    /// Replaces the clipboard contents with `text`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Clipboard`](crate::Error::Clipboard) if the system
    /// clipboard is unavailable.
    fn copy_text(&mut self, text: &str) -> Result<()>;
}

/// System clipboard via `arboard`.
#[cfg(feature = "clipboard")]
pub struct SystemClipboard {
    inner: arboard::Clipboard,
}

#[cfg(feature = "clipboard")]
impl SystemClipboard {
    /// Connects to the system clipboard.
    ///
    /// # Errors
    ///
    /// Returns an error if no clipboard is available (e.g. headless session).
    pub fn new() -> Result<Self> {
        let inner =
            arboard::Clipboard::new().map_err(|e| crate::Error::Clipboard(e.to_string()))?;
        Ok(Self { inner })
    }
}

#[cfg(feature = "clipboard")]
impl Clipboard for SystemClipboard {
    fn copy_text(&mut self, text: &str) -> Result<()> {
        self.inner
            .set_text(text)
            .map_err(|e| crate::Error::Clipboard(e.to_string()))
    }
}

/// Preview modal state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ModalState {
    /// Nothing previewed.
    #[default]
    Closed,
    /// Previewing `image_url`.
    Open {
        /// URL being previewed.
        image_url: String,
        /// When the link was last copied, if it was.
        share_confirmed_at: Option<Instant>,
    },
}

/// Full-screen preview with share, download and close actions.
///
/// Only [`close`](Self::close) leaves the `Open` state; sharing and
/// downloading keep the modal open.
#[derive(Debug, Clone, Default)]
pub struct PreviewModal {
    state: ModalState,
}

impl PreviewModal {
    /// Creates a closed modal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> &ModalState {
        &self.state
    }

    /// Returns `true` while open.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self.state, ModalState::Open { .. })
    }

    /// URL being previewed, if open.
    #[must_use]
    pub fn image_url(&self) -> Option<&str> {
        match &self.state {
            ModalState::Open { image_url, .. } => Some(image_url),
            ModalState::Closed => None,
        }
    }

    /// Opens the preview for `record` if authenticated; otherwise raises the
    /// sign-in prompt and stays closed.
    pub fn open<S: KeyValueStore>(&mut self, gate: &AuthGate<S>, record: &ImageRecord) -> Gated<()> {
        gate.require(|| {
            self.state = ModalState::Open {
                image_url: record.image_url.clone(),
                share_confirmed_at: None,
            };
        })
    }

    /// Copies the previewed URL to `clipboard` and starts the confirmation
    /// window. Returns `false` if the modal is closed.
    ///
    /// # Errors
    ///
    /// Returns the clipboard error; the confirmation is not shown then.
    pub fn share(&mut self, clipboard: &mut dyn Clipboard, now: Instant) -> Result<bool> {
        let ModalState::Open {
            image_url,
            share_confirmed_at,
        } = &mut self.state
        else {
            return Ok(false);
        };
        clipboard.copy_text(image_url)?;
        *share_confirmed_at = Some(now);
        Ok(true)
    }

    /// Returns `true` while the share confirmation should be visible.
    #[must_use]
    pub fn share_confirmed(&self, now: Instant) -> bool {
        match &self.state {
            ModalState::Open {
                share_confirmed_at: Some(at),
                ..
            } => now.saturating_duration_since(*at) < SHARE_CONFIRMATION,
            _ => false,
        }
    }

    /// Closes the modal and clears the share confirmation.
    pub fn close(&mut self) {
        self.state = ModalState::Closed;
    }
}

/// Suggested filename for a download: the URL's trailing path segment.
#[must_use]
pub fn suggested_filename(url: &str) -> String {
    parse_absolute(url)
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(ToString::to_string))
        })
        .filter(|name| !name.is_empty() && name != "." && name != "..")
        .unwrap_or_else(|| FALLBACK_FILENAME.to_string())
}

/// Downloads one wallpaper into `dir` if authenticated.
///
/// Anonymous callers get [`Gated::PromptAuth`] and nothing is fetched.
/// Preview modal state is never touched.
///
/// # Errors
///
/// Returns the fetch or file system error.
pub async fn download_single<S, C, F>(
    gate: &AuthGate<S>,
    client: &C,
    fs: &F,
    url: &str,
    dir: &Path,
    overwrite: bool,
) -> Result<Gated<PathBuf>>
where
    S: KeyValueStore,
    C: CatalogClient + ?Sized,
    F: FileSystem + ?Sized,
{
    gate.require_async(|| async {
        let path = dir.join(suggested_filename(url));
        let bytes = client.fetch_bytes(url).await?;
        save_atomic(fs, &path, &bytes, overwrite).await?;
        log::info!("Downloaded {url} to {}", path.display());
        Ok::<_, crate::Error>(path)
    })
    .await
    .transpose()
}
