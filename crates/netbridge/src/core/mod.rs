//! Pure transformations used by the client and the loader.
//!
//! Nothing in here touches the network, the filesystem or a channel:
//! URL resolution, status and redirect rules, default header policy and
//! the naming of relocated downloads.

mod placement;
mod url;
mod validation;

pub use placement::{default_download_dir, stable_file_name};
pub use self::url::make_url;
pub use validation::{apply_default_headers, is_acceptable_status, is_redirect, redirect_method};
