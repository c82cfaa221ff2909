use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read {path}")]
    Read {
        path:   PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}")]
    Write {
        path:   PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to move {from} to {to}")]
    Move {
        from:   PathBuf,
        to:     PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("destination already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("source path not found: {0}")]
    NotFound(PathBuf),

    #[error("cross-device move not allowed: {from} -> {to}")]
    CrossDevice { from: PathBuf, to: PathBuf },
}

pub type Result<T> = std::result::Result<T, Error>;

pub(crate) fn is_cross_device(err: &std::io::Error) -> bool {
    // EXDEV on unix, ERROR_NOT_SAME_DEVICE on windows
    err.kind() == std::io::ErrorKind::CrossesDevices
        || (cfg!(unix) && err.raw_os_error() == Some(18))
        || (cfg!(windows) && err.raw_os_error() == Some(17))
}
