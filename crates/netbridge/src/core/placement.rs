use std::path::{Path, PathBuf};

use crate::data::TaskHandle;

/// Default directory finished downloads are moved into.
pub fn default_download_dir() -> PathBuf {
    std::env::temp_dir().join("netbridge").join("Downloads")
}

/// File name a transient download is given once it is relocated.
///
/// Task ids are only unique within one transport, so the name leads with
/// the owning process and a serial the caller draws from a process-wide
/// counter. The transport's own file name is kept at the end so the
/// origin stays recognisable.
pub fn stable_file_name(process: u32, serial: u64, task: TaskHandle, transient: &Path) -> String {
    let name = transient
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".to_string());
    format!("{process}-{serial}-{}-{name}", task.id())
}
