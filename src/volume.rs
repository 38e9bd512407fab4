//! Storage volume facade.
//!
//! Handlers never touch the filesystem directly: they go through [`Volume`],
//! and the server holds an `Arc<dyn Volume>`. Paths crossing this seam are
//! volume-absolute (`/sub/file.txt`); [`LocalVolume`] maps them under its
//! mount directory and refuses anything that would escape it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWrite, ErrorKind};

/// One row of a directory listing, produced fresh on every call.
#[derive(Debug, Clone, Serialize)]
pub struct FileEntry {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
    pub modified: Option<String>,
}

#[derive(Debug)]
pub enum VolumeError {
    InvalidPath,
    Io(io::Error),
}

impl From<io::Error> for VolumeError {
    fn from(err: io::Error) -> Self {
        VolumeError::Io(err)
    }
}

pub type ReadHandle = Box<dyn AsyncRead + Send + Unpin>;
pub type WriteHandle = Box<dyn AsyncWrite + Send + Unpin>;

/// Access to the mounted storage volume.
#[async_trait]
pub trait Volume: Send + Sync {
    async fn is_directory(&self, path: &str) -> bool;
    async fn list(&self, path: &str) -> Result<Vec<FileEntry>, VolumeError>;
    async fn open_for_read(&self, path: &str) -> Result<ReadHandle, VolumeError>;
    async fn open_for_write(&self, path: &str) -> Result<WriteHandle, VolumeError>;
    /// Removes a file (or empty directory). Reports plain success/failure;
    /// callers map `false` to a status.
    async fn remove(&self, path: &str) -> bool;
}

/// [`Volume`] backed by a directory on the local filesystem.
#[derive(Clone, Debug)]
pub struct LocalVolume {
    mount: PathBuf,
}

impl LocalVolume {
    pub fn new(mount: PathBuf) -> Self {
        Self { mount }
    }

    pub async fn ensure_mount(&self) -> io::Result<()> {
        fs::create_dir_all(&self.mount).await
    }

    pub fn mount_path(&self) -> &Path {
        &self.mount
    }

    /// Maps a volume-absolute path onto the mount directory. Walks the
    /// components so `..`, a fresh root, or a drive prefix cannot step
    /// outside the mount.
    fn full_path(&self, path: &str) -> Result<PathBuf, VolumeError> {
        let trimmed = path.trim_start_matches(['/', '\\']);
        let mut resolved = self.mount.clone();
        for component in Path::new(trimmed).components() {
            match component {
                Component::Normal(segment) => resolved.push(segment),
                Component::CurDir => continue,
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(VolumeError::InvalidPath);
                }
            }
        }
        Ok(resolved)
    }
}

#[async_trait]
impl Volume for LocalVolume {
    async fn is_directory(&self, path: &str) -> bool {
        match self.full_path(path) {
            Ok(target) => fs::metadata(target)
                .await
                .map(|meta| meta.is_dir())
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn list(&self, path: &str) -> Result<Vec<FileEntry>, VolumeError> {
        let target = self.full_path(path)?;
        let mut dir = fs::read_dir(&target).await?;
        let mut entries = Vec::new();

        while let Some(entry) = dir.next_entry().await? {
            let metadata = entry.metadata().await?;
            let name = entry.file_name().to_string_lossy().to_string();
            let modified = metadata
                .modified()
                .ok()
                .and_then(|ts| ts.duration_since(UNIX_EPOCH).ok())
                .map(format_timestamp);

            entries.push(FileEntry {
                name,
                is_dir: metadata.is_dir(),
                size: metadata.len(),
                modified,
            });
        }

        entries.sort_by(|a, b| match (a.is_dir, b.is_dir) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        });

        Ok(entries)
    }

    async fn open_for_read(&self, path: &str) -> Result<ReadHandle, VolumeError> {
        let target = self.full_path(path)?;
        let metadata = fs::metadata(&target).await?;
        if metadata.is_dir() {
            return Err(VolumeError::Io(io::Error::new(
                ErrorKind::NotFound,
                "is a directory",
            )));
        }
        let file = fs::File::open(target).await?;
        Ok(Box::new(file))
    }

    async fn open_for_write(&self, path: &str) -> Result<WriteHandle, VolumeError> {
        let target = self.full_path(path)?;
        let file = fs::File::create(target).await?;
        Ok(Box::new(file))
    }

    async fn remove(&self, path: &str) -> bool {
        let Ok(target) = self.full_path(path) else {
            return false;
        };
        let Ok(metadata) = fs::metadata(&target).await else {
            return false;
        };
        let result = if metadata.is_dir() {
            fs::remove_dir(target).await
        } else {
            fs::remove_file(target).await
        };
        result.is_ok()
    }
}

fn format_timestamp(duration: Duration) -> String {
    let timestamp = UNIX_EPOCH + duration;
    let datetime: DateTime<Utc> = timestamp.into();
    datetime.format("%Y-%m-%d %H:%M:%S").to_string()
}
