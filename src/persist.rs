//! Store document persistence.
//!
//! The document lives in a single JSON file. Saves are atomic: the new
//! content is written to `<path>.tmp` in the same directory, flushed to
//! disk, then renamed over `<path>`. A crash mid-save leaves either the old
//! or the new document, never a truncated one.

use anyhow::{Context, Result};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use watchlist_sync_core::document::StoreDocument;

use crate::error::SyncError;

/// Load the document at `path`. A missing file is an empty store.
pub fn load_document(path: &Path) -> Result<StoreDocument> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no store yet, starting empty");
            return Ok(StoreDocument::default());
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read store: {}", path.display()))
        }
    };
    StoreDocument::from_json(&text)
        .with_context(|| format!("Malformed store document: {}", path.display()))
}

/// Atomically replace the document at `path`.
pub fn save_document(path: &Path, doc: &StoreDocument) -> Result<(), SyncError> {
    let fail = |source: io::Error| SyncError::PersistenceWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let json = doc
        .to_json()
        .map_err(|e| fail(io::Error::new(io::ErrorKind::InvalidData, format!("{:#}", e))))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(fail)?;
    }

    let tmp = tmp_path(path);
    let write = || -> io::Result<()> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(json.as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    };
    if let Err(e) = write() {
        let _ = fs::remove_file(&tmp);
        return Err(fail(e));
    }

    debug!(path = %path.display(), entries = doc.entries.len(), "store saved");
    Ok(())
}

/// Write an empty document at `path` unless one already exists.
///
/// Returns `true` when a new store was created.
pub fn init_store(path: &Path) -> Result<bool> {
    if path.exists() {
        load_document(path)?;
        return Ok(false);
    }
    save_document(path, &StoreDocument::default())?;
    Ok(true)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}
