//! File system abstraction for testability.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Abstraction over file system operations for testability.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Checks if a file exists at the given path.
    async fn file_exists(&self, path: &Path) -> bool;

    /// Creates all directories in the given path.
    async fn create_dir_all(&self, path: &Path) -> std::io::Result<()>;

    /// Creates or truncates a file and writes `contents` to it.
    async fn write_file(&self, path: &Path, contents: &[u8]) -> std::io::Result<()>;

    /// Renames a file, replacing the destination.
    async fn rename_file(&self, from: &Path, to: &Path) -> std::io::Result<()>;

    /// Removes a file.
    async fn remove_file(&self, path: &Path) -> std::io::Result<()>;
}

/// Default file system implementation using `tokio::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioFileSystem;

impl TokioFileSystem {
    /// Creates a new `TokioFileSystem` instance.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FileSystem for TokioFileSystem {
    async fn file_exists(&self, path: &Path) -> bool {
        tokio::fs::metadata(path).await.is_ok()
    }

    async fn create_dir_all(&self, path: &Path) -> std::io::Result<()> {
        tokio::fs::create_dir_all(path).await
    }

    async fn write_file(&self, path: &Path, contents: &[u8]) -> std::io::Result<()> {
        tokio::fs::write(path, contents).await
    }

    async fn rename_file(&self, from: &Path, to: &Path) -> std::io::Result<()> {
        tokio::fs::rename(from, to).await
    }

    async fn remove_file(&self, path: &Path) -> std::io::Result<()> {
        tokio::fs::remove_file(path).await
    }
}

/// Returns the `.part` file path for a given final path.
fn part_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Writes `contents` to `path` through a `.part` file renamed on success.
///
/// Refuses to replace an existing file unless `overwrite` is set. The parent
/// directory is created if needed.
///
/// # Errors
///
/// Returns [`Error::FileExists`](crate::Error::FileExists) or the underlying
/// I/O error. A failed write leaves no `.part` file behind.
pub async fn save_atomic<F: FileSystem + ?Sized>(
    fs: &F,
    path: &Path,
    contents: &[u8],
    overwrite: bool,
) -> crate::Result<()> {
    if !overwrite && fs.file_exists(path).await {
        return Err(crate::Error::FileExists {
            path: path.display().to_string(),
        });
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs.create_dir_all(parent).await?;
    }

    let pp = part_path(path);
    let written = match fs.write_file(&pp, contents).await {
        Ok(()) => fs.rename_file(&pp, path).await,
        Err(e) => Err(e),
    };
    if let Err(e) = written {
        let _ = fs.remove_file(&pp).await;
        return Err(e.into());
    }
    log::debug!("Saved {} ({} bytes)", path.display(), contents.len());
    Ok(())
}
