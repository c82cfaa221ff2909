use crate::{Error, Result};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

static PURGED: Lazy<Mutex<HashSet<PathBuf>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// Create `path` and all of its parents if they do not exist yet.
pub fn ensure_dir(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if path.is_dir() {
        return Ok(());
    }
    std::fs::create_dir_all(path).map_err(|e| Error::Write {
        path:   path.to_path_buf(),
        source: e,
    })
}

/// Remove a directory tree. A directory that does not exist is not an error.
pub fn purge_dir(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    match std::fs::remove_dir_all(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "purged directory");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::Write {
            path:   path.to_path_buf(),
            source: e,
        }),
    }
}

/// Purge `path` the first time it is asked for in this process.
///
/// Later calls for the same directory leave it alone and return
/// `Ok(false)`, so files already handed out from it survive. A failed
/// purge is not remembered and may be retried.
pub fn purge_dir_once(path: impl AsRef<Path>) -> Result<bool> {
    let path = path.as_ref();
    let key = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());

    let mut purged = PURGED.lock();
    if purged.contains(&key) {
        tracing::trace!(path = %path.display(), "directory already purged in this process");
        return Ok(false);
    }
    purge_dir(path)?;
    purged.insert(key);
    Ok(true)
}
