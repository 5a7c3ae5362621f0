//! Storage seam for file-backed tables.

use std::fmt;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use tokio::fs::{self, File, OpenOptions};

use crate::error::DatastoreError;

/// Object access used by the file engine. Paths are absolute or relative to the
/// process working directory.
#[async_trait]
pub trait Storage: Send + Sync + fmt::Debug {
    async fn exists(&self, path: &Path) -> Result<bool, DatastoreError>;

    async fn download(&self, path: &Path) -> Result<Vec<u8>, DatastoreError>;

    /// Replace the whole object.
    async fn upload(&self, path: &Path, data: &[u8]) -> Result<(), DatastoreError>;

    /// Handle positioned at the end of the object, created if missing.
    async fn open_append(&self, path: &Path) -> Result<File, DatastoreError>;

    /// Entries directly under `dir`.
    async fn list(&self, dir: &Path) -> Result<Vec<PathBuf>, DatastoreError>;

    async fn delete(&self, path: &Path) -> Result<(), DatastoreError>;

    async fn create_dir(&self, path: &Path) -> Result<(), DatastoreError>;

    async fn delete_dir(&self, path: &Path) -> Result<(), DatastoreError>;
}

/// Local filesystem over `tokio::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalStorage;

#[async_trait]
impl Storage for LocalStorage {
    async fn exists(&self, path: &Path) -> Result<bool, DatastoreError> {
        Ok(fs::try_exists(path).await?)
    }

    async fn download(&self, path: &Path) -> Result<Vec<u8>, DatastoreError> {
        Ok(fs::read(path).await?)
    }

    async fn upload(&self, path: &Path, data: &[u8]) -> Result<(), DatastoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }
        Ok(fs::write(path, data).await?)
    }

    async fn open_append(&self, path: &Path) -> Result<File, DatastoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }
        Ok(OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?)
    }

    async fn list(&self, dir: &Path) -> Result<Vec<PathBuf>, DatastoreError> {
        let mut entries = fs::read_dir(dir).await?;
        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            paths.push(entry.path());
        }
        paths.sort();
        Ok(paths)
    }

    async fn delete(&self, path: &Path) -> Result<(), DatastoreError> {
        Ok(fs::remove_file(path).await?)
    }

    async fn create_dir(&self, path: &Path) -> Result<(), DatastoreError> {
        Ok(fs::create_dir_all(path).await?)
    }

    async fn delete_dir(&self, path: &Path) -> Result<(), DatastoreError> {
        Ok(fs::remove_dir_all(path).await?)
    }
}

/// Gzip `data` as a single member.
///
/// # Errors
/// Returns `IoError` if the encoder fails.
pub fn compress(data: &[u8]) -> Result<Vec<u8>, DatastoreError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Inflate every gzip member in `data` (appends write one member each).
///
/// # Errors
/// Returns `IoError` for corrupt input.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, DatastoreError> {
    let mut decoder = MultiGzDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}
