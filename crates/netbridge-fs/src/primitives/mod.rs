pub mod dir;
pub mod relocate;

pub use dir::{ensure_dir, purge_dir, purge_dir_once};
pub use relocate::{FallbackStrategy, MoveOptions, move_file};
