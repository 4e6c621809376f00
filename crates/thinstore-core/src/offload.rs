//! Remote offload
//!
//! Frozen files can be uploaded to an [`OffloadTarget`] so their local bytes
//! may be released. Every call the manager makes is bounded by a timeout
//! (see [`with_timeout`]).
//!
//! [`LocalDirOffload`] is the bundled target: it keeps offloaded bytes in a
//! directory (typically another mount) under random keys, each prefixed with
//! a CRC32C of the payload that is verified on download.

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

/// Error from an offload target
#[derive(Debug, Error)]
pub enum OffloadError {
    #[error("offload target unavailable: {0}")]
    Unavailable(String),
    #[error("offload call timed out after {0:?}")]
    Timeout(Duration),
    #[error("remote object not found: {0}")]
    NotFound(String),
    #[error("remote object corrupt: {0}")]
    Corrupt(String),
    #[error("offload I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Remote offload collaborator
#[async_trait]
pub trait OffloadTarget: Send + Sync {
    /// Target name for logging/metrics
    fn name(&self) -> &str;

    /// Store `data` for `path`, returning its remote location
    async fn upload(&self, path: &str, data: Bytes) -> Result<String, OffloadError>;

    /// Fetch the bytes stored at `location`
    async fn download(&self, location: &str) -> Result<Bytes, OffloadError>;

    /// Remove the bytes stored at `location`
    async fn delete(&self, location: &str) -> Result<(), OffloadError>;

    /// Check whether `location` holds bytes
    async fn exists(&self, location: &str) -> Result<bool, OffloadError>;
}

/// Run an offload call, failing with [`OffloadError::Timeout`] after `timeout`
pub async fn with_timeout<T, F>(timeout: Duration, call: F) -> Result<T, OffloadError>
where
    F: Future<Output = Result<T, OffloadError>>,
{
    tokio::time::timeout(timeout, call)
        .await
        .unwrap_or(Err(OffloadError::Timeout(timeout)))
}

/// Size of the checksum header in front of every stored object
const HEADER_LEN: usize = 4;

/// Extension of objects still being written
const STAGING_EXT: &str = "partial";

/// Offload target backed by a local directory
#[derive(Debug, Clone)]
pub struct LocalDirOffload {
    dir: PathBuf,
}

impl LocalDirOffload {
    /// Open (creating if needed) an offload directory
    ///
    /// Staging files left by interrupted uploads are removed.
    pub async fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        let swept = sweep_staging(&dir).await?;
        if swept > 0 {
            warn!("Removed {} interrupted uploads from {}", swept, dir.display());
        }
        Ok(Self { dir })
    }

    fn object_path(&self, location: &str) -> Result<PathBuf, OffloadError> {
        // Locations are generated UUIDs; anything else cannot name an object.
        let id = Uuid::parse_str(location)
            .map_err(|_| OffloadError::NotFound(location.to_string()))?;
        Ok(self.dir.join(id.simple().to_string()))
    }
}

#[async_trait]
impl OffloadTarget for LocalDirOffload {
    fn name(&self) -> &str {
        "local-dir"
    }

    async fn upload(&self, path: &str, data: Bytes) -> Result<String, OffloadError> {
        let location = Uuid::new_v4().simple().to_string();
        let mut object = BytesMut::with_capacity(HEADER_LEN + data.len());
        object.put_u32_le(crc32c::crc32c(&data));
        object.put_slice(&data);

        let target = self.object_path(&location)?;
        let staging = target.with_extension(STAGING_EXT);
        if let Err(e) = stage(&staging, &target, &object).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(e.into());
        }

        debug!("Offloaded {} ({} bytes) to {}", path, data.len(), location);
        Ok(location)
    }

    async fn download(&self, location: &str) -> Result<Bytes, OffloadError> {
        let object = match tokio::fs::read(self.object_path(location)?).await {
            Ok(object) => object,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(OffloadError::NotFound(location.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        if object.len() < HEADER_LEN {
            return Err(OffloadError::Corrupt(format!("{location}: truncated header")));
        }

        let (header, payload) = object.split_at(HEADER_LEN);
        let expected = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let actual = crc32c::crc32c(payload);
        if expected != actual {
            return Err(OffloadError::Corrupt(format!(
                "{location}: checksum mismatch, expected {expected:08x}, got {actual:08x}"
            )));
        }
        Ok(Bytes::copy_from_slice(payload))
    }

    async fn delete(&self, location: &str) -> Result<(), OffloadError> {
        match tokio::fs::remove_file(self.object_path(location)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(OffloadError::NotFound(location.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, location: &str) -> Result<bool, OffloadError> {
        let Ok(path) = self.object_path(location) else {
            return Ok(false);
        };
        Ok(tokio::fs::try_exists(path).await?)
    }
}

async fn stage(staging: &Path, target: &Path, object: &[u8]) -> io::Result<()> {
    tokio::fs::write(staging, object).await?;
    tokio::fs::rename(staging, target).await
}

async fn sweep_staging(dir: &Path) -> io::Result<usize> {
    let mut swept = 0;
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == STAGING_EXT) {
            tokio::fs::remove_file(&path).await?;
            swept += 1;
        }
    }
    Ok(swept)
}
