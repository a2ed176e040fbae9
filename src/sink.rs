//! Atomic persistence of validated content.
//!
//! Content is written to a temporary file next to the destination, synced,
//! then renamed over it. Readers see either the previous file or the new one.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

/// Errors from persisting content.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl SinkError {
    fn io(path: &Path, source: io::Error) -> Self {
        SinkError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Summary of a completed persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistReport {
    pub path: PathBuf,
    pub bytes_written: u64,
    /// Hex SHA-256 of the written content.
    pub sha256: String,
}

/// Atomically replace `destination` with `bytes`.
pub fn persist(bytes: &[u8], destination: &Path) -> Result<PersistReport, SinkError> {
    write_then_rename(destination, |file| file.write_all(bytes))?;

    let report = PersistReport {
        path: destination.to_path_buf(),
        bytes_written: bytes.len() as u64,
        sha256: hex::encode(Sha256::digest(bytes)),
    };
    debug!(
        "Persisted {} bytes to {} (sha256 {})",
        report.bytes_written,
        destination.display(),
        &report.sha256[..16]
    );
    Ok(report)
}

/// Run `write` against a temp file in the destination directory and rename it
/// into place. The temp file is removed on any failure.
fn write_then_rename<F>(destination: &Path, write: F) -> Result<(), SinkError>
where
    F: FnOnce(&mut fs::File) -> io::Result<()>,
{
    let dir = match destination.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(|e| SinkError::io(&dir, e))?;

    // NamedTempFile deletes itself when dropped without being persisted
    let mut tmp = tempfile::Builder::new()
        .prefix(".plfetch-")
        .suffix(".tmp")
        .tempfile_in(&dir)
        .map_err(|e| SinkError::io(&dir, e))?;

    write(tmp.as_file_mut()).map_err(|e| SinkError::io(tmp.path(), e))?;
    tmp.as_file_mut()
        .flush()
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| SinkError::io(tmp.path(), e))?;

    tmp.persist(destination)
        .map_err(|e| SinkError::io(destination, e.error))?;

    // Make the rename itself durable
    #[cfg(unix)]
    {
        if let Err(e) = fs::File::open(&dir).and_then(|d| d.sync_all()) {
            debug!("Directory sync failed for {}: {}", dir.display(), e);
        }
    }

    Ok(())
}
