//! Filesystem primitives for relocating transient download artifacts.
//!
//! Everything here is synchronous and short-lived: creating a directory,
//! moving one file, clearing one directory. Callers on an async runtime
//! invoke these directly from their event loop.

mod error;
mod primitives;

pub use error::{Error, Result};
pub use primitives::{FallbackStrategy, MoveOptions, ensure_dir, move_file, purge_dir, purge_dir_once};
