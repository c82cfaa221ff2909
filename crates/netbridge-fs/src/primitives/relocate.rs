use crate::error::is_cross_device;
use crate::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::Path;

/// What [`move_file`] does when a plain rename cannot cross filesystems.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FallbackStrategy {
    /// Copy the bytes to the destination, then remove the source.
    #[default]
    Copy,
    /// Fail with [`Error::CrossDevice`].
    Error,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct MoveOptions {
    fallback:   FallbackStrategy,
    no_clobber: bool,
}

impl MoveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fallback(mut self, fallback: FallbackStrategy) -> Self {
        self.fallback = fallback;
        self
    }

    /// Fail with [`Error::AlreadyExists`] instead of replacing `dest`.
    pub fn no_clobber(mut self, no_clobber: bool) -> Self {
        self.no_clobber = no_clobber;
        self
    }

    pub fn get_fallback(&self) -> FallbackStrategy {
        self.fallback
    }

    pub fn get_no_clobber(&self) -> bool {
        self.no_clobber
    }
}

/// Move a single file from `src` to `dest`.
///
/// The destination's parent must already exist. An existing file at
/// `dest` is replaced unless [`MoveOptions::no_clobber`] is set. When `src`
/// and `dest` live on different devices the behavior is selected by
/// [`MoveOptions::fallback`]; with the copy fallback the destination is
/// fully written before the source is removed.
pub fn move_file(src: impl AsRef<Path>, dest: impl AsRef<Path>, options: MoveOptions) -> Result<()> {
    let src = src.as_ref();
    let dest = dest.as_ref();

    if !src.exists() {
        return Err(Error::NotFound(src.to_path_buf()));
    }

    if options.get_no_clobber() {
        return link_then_unlink(src, dest, options);
    }

    match std::fs::rename(src, dest) {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device(&e) => copy_across(src, dest, options, false),
        Err(e) => Err(Error::Move {
            from:   src.to_path_buf(),
            to:     dest.to_path_buf(),
            source: e,
        }),
    }
}

// `hard_link` refuses an existing destination atomically, unlike `rename`.
fn link_then_unlink(src: &Path, dest: &Path, options: MoveOptions) -> Result<()> {
    match std::fs::hard_link(src, dest) {
        Ok(()) => remove_source(src),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(Error::AlreadyExists(dest.to_path_buf())),
        Err(e) if is_cross_device(&e) => copy_across(src, dest, options, true),
        Err(e) => Err(Error::Move {
            from:   src.to_path_buf(),
            to:     dest.to_path_buf(),
            source: e,
        }),
    }
}

fn copy_across(src: &Path, dest: &Path, options: MoveOptions, create_new: bool) -> Result<()> {
    if options.get_fallback() == FallbackStrategy::Error {
        return Err(Error::CrossDevice {
            from: src.to_path_buf(),
            to:   dest.to_path_buf(),
        });
    }
    tracing::debug!(
        from = %src.display(),
        to = %dest.display(),
        "move crossed devices, copying instead"
    );

    let write_error = |e: std::io::Error| Error::Write {
        path:   dest.to_path_buf(),
        source: e,
    };
    if create_new {
        let mut reader = File::open(src).map_err(|e| Error::Read {
            path:   src.to_path_buf(),
            source: e,
        })?;
        let mut writer = match OpenOptions::new().write(true).create_new(true).open(dest) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(Error::AlreadyExists(dest.to_path_buf()));
            }
            Err(e) => return Err(write_error(e)),
        };
        if let Err(e) = std::io::copy(&mut reader, &mut writer) {
            drop(writer);
            let _ = std::fs::remove_file(dest);
            return Err(write_error(e));
        }
    } else {
        std::fs::copy(src, dest).map_err(write_error)?;
    }
    remove_source(src)
}

fn remove_source(src: &Path) -> Result<()> {
    std::fs::remove_file(src).map_err(|e| Error::Write {
        path:   src.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_move_file() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("CFNetworkDownload_1.tmp");
        let dest = dir.path().join("stable.tmp");
        std::fs::write(&src, "payload").unwrap();

        move_file(&src, &dest, MoveOptions::new()).unwrap();

        assert!(!src.exists());
        assert_eq!(std::fs::read(&dest).unwrap(), b"payload");
    }

    #[test]
    fn test_move_file_replaces_existing() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let dest = dir.path().join("dest");
        std::fs::write(&src, "new").unwrap();
        std::fs::write(&dest, "old").unwrap();

        move_file(&src, &dest, MoveOptions::new()).unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"new");
    }

    #[test]
    fn test_no_clobber_keeps_existing_destination() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let dest = dir.path().join("dest");
        std::fs::write(&src, "new").unwrap();
        std::fs::write(&dest, "delivered").unwrap();

        let err = move_file(&src, &dest, MoveOptions::new().no_clobber(true)).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(ref path) if *path == dest));
        assert_eq!(std::fs::read(&dest).unwrap(), b"delivered");
        assert!(src.exists());
    }

    #[test]
    fn test_no_clobber_moves_into_free_slot() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let dest = dir.path().join("dest");
        std::fs::write(&src, "payload").unwrap();

        move_file(&src, &dest, MoveOptions::new().no_clobber(true)).unwrap();
        assert!(!src.exists());
        assert_eq!(std::fs::read(&dest).unwrap(), b"payload");
    }

    #[test]
    fn test_move_missing_source() {
        let dir = tempdir().unwrap();
        let err = move_file(
            dir.path().join("gone"),
            dir.path().join("dest"),
            MoveOptions::new(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_move_into_missing_parent_fails() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::write(&src, "data").unwrap();

        let err = move_file(&src, dir.path().join("no").join("dest"), MoveOptions::new())
            .unwrap_err();
        assert!(matches!(err, Error::Move { .. }));
        assert!(src.exists());
    }

    #[test]
    fn test_fallback_option() {
        let options = MoveOptions::new().fallback(FallbackStrategy::Error);
        assert_eq!(options.get_fallback(), FallbackStrategy::Error);
        assert_eq!(MoveOptions::new().get_fallback(), FallbackStrategy::Copy);
        assert!(!MoveOptions::new().get_no_clobber());
    }
}
