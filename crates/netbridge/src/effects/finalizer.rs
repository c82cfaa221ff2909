//! Turns what a task accumulated into its terminal result.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use netbridge_fs::{MoveOptions, ensure_dir, move_file};
use tracing::{debug, warn};

use crate::core::stable_file_name;
use crate::data::{HttpResponse, Response, TaskHandle};
use crate::effects::registry::{HandlerKind, TaskHandler};
use crate::error::{Error, TransportError, TransportErrorKind};

impl TaskHandler {
    /// Append a chunk to an in-memory body. Chunks for download tasks are ignored.
    pub(crate) fn accumulate(&mut self, chunk: &Bytes) {
        let task = self.task();
        match &mut self.kind {
            HandlerKind::Data { buffer, .. } => buffer.extend_from_slice(chunk),
            HandlerKind::Download { .. } => {
                debug!(task = %task, "ignoring data chunk for a download task");
            }
        }
    }

    /// Move a finished download out of the transport's transient location.
    ///
    /// Returns the stable location, or `None` if the move failed; the
    /// failure is kept and reported when the task completes.
    pub(crate) fn relocate(&mut self, transient: &Path, download_dir: &Path) -> Option<PathBuf> {
        let task = self.task();
        let HandlerKind::Download {
            location,
            relocation_error,
            ..
        } = &mut self.kind
        else {
            warn!(task = %task, "finished-downloading event for a data task");
            return None;
        };

        match move_into(task, transient, download_dir) {
            Ok(stable) => {
                debug!(task = %task, location = %stable.display(), "relocated download");
                *location = Some(stable.clone());
                Some(stable)
            }
            Err(e) => {
                warn!(task = %task, error = %e, "failed to relocate download");
                *relocation_error = Some(e);
                None
            }
        }
    }

    /// Resolve the task's completion slot from its terminal event.
    pub(crate) fn finish(self, response: Option<HttpResponse>, error: Option<TransportError>) {
        let task = self.task();
        let metrics = self.metrics;

        match self.kind {
            HandlerKind::Data { buffer, completion } => {
                let outcome = terminal_response(error, response).map(|response| {
                    let data = buffer.freeze();
                    Response::new(data.clone(), data, response, task, metrics)
                });
                completion.resolve(outcome);
            }
            HandlerKind::Download {
                location,
                relocation_error,
                completion,
            } => {
                let outcome = match (terminal_response(error, response), relocation_error, location) {
                    (Err(e), _, location) => {
                        discard(task, location);
                        Err(e)
                    }
                    (Ok(_), Some(e), _) => Err(Error::Fs(e)),
                    (Ok(_), None, None) => Err(Error::Transport(TransportError::new(
                        TransportErrorKind::BadServerResponse,
                        "download completed without a file",
                    ))),
                    (Ok(response), None, Some(location)) => {
                        Ok(Response::new(location, Bytes::new(), response, task, metrics))
                    }
                };
                completion.resolve(outcome);
            }
        }
    }
}

impl TaskHandler {
    /// Resolve the completion slot with `error` without a terminal event.
    pub(crate) fn fail(self, error: Error) {
        let task = self.task();
        match self.kind {
            HandlerKind::Data { completion, .. } => completion.resolve(Err(error)),
            HandlerKind::Download {
                completion, location, ..
            } => {
                discard(task, location);
                completion.resolve(Err(error));
            }
        }
    }
}

fn terminal_response(
    error: Option<TransportError>,
    response: Option<HttpResponse>,
) -> Result<HttpResponse, Error> {
    if let Some(e) = error {
        return Err(Error::Transport(e));
    }
    response.ok_or_else(|| {
        Error::Transport(TransportError::new(
            TransportErrorKind::BadServerResponse,
            "task completed without a response",
        ))
    })
}

/// Serial for stable names, shared by every loader in the process.
static NEXT_SERIAL: AtomicU64 = AtomicU64::new(0);

/// Stale files from an earlier process can still hold a name.
const PLACEMENT_ATTEMPTS: usize = 8;

fn move_into(task: TaskHandle, transient: &Path, download_dir: &Path) -> netbridge_fs::Result<PathBuf> {
    ensure_dir(download_dir)?;
    let options = MoveOptions::new().no_clobber(true);
    let mut attempt = 1;
    loop {
        let serial = NEXT_SERIAL.fetch_add(1, Ordering::Relaxed);
        let stable = download_dir.join(stable_file_name(std::process::id(), serial, task, transient));
        match move_file(transient, &stable, options) {
            Ok(()) => return Ok(stable),
            Err(netbridge_fs::Error::AlreadyExists(taken)) if attempt < PLACEMENT_ATTEMPTS => {
                debug!(task = %task, taken = %taken.display(), "stable name taken, drawing another");
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Remove a relocated file whose task did not succeed.
fn discard(task: TaskHandle, location: Option<PathBuf>) {
    let Some(path) = location else { return };
    match std::fs::remove_file(&path) {
        Ok(()) => debug!(task = %task, location = %path.display(), "removed download of failed task"),
        Err(e) => warn!(task = %task, location = %path.display(), error = %e, "failed to remove download of failed task"),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::Arc;

    use tempfile::tempdir;
    use url::Url;

    use super::*;
    use crate::effects::bridge::{PendingTask, completion_pair};
    use crate::effects::test_support::Inert;

    fn ok_response() -> HttpResponse {
        HttpResponse::new(Url::parse("https://example.com/file").unwrap(), 200)
    }

    fn data_handler(id: u64) -> (TaskHandler, PendingTask<Bytes>) {
        let (slot, pending) = completion_pair(TaskHandle::new(id), Arc::new(Inert));
        (TaskHandler::data(None, slot), pending)
    }

    fn download_handler(id: u64) -> (TaskHandler, PendingTask<PathBuf>) {
        let (slot, pending) = completion_pair(TaskHandle::new(id), Arc::new(Inert));
        (TaskHandler::download(None, slot), pending)
    }

    #[tokio::test]
    async fn test_chunks_join_in_order() {
        let (mut handler, pending) = data_handler(1);
        for chunk in ["c1", "c2", "c3"] {
            handler.accumulate(&Bytes::from(chunk));
        }
        handler.finish(Some(ok_response()), None);

        let response = pending.wait(None).await.unwrap();
        assert_eq!(response.data, Bytes::from("c1c2c3"));
        assert_eq!(response.value, response.data);
    }

    #[tokio::test]
    async fn test_no_chunks_yields_empty_body() {
        let (handler, pending) = data_handler(2);
        handler.finish(Some(ok_response()), None);
        let response = pending.wait(None).await.unwrap();
        assert!(response.data.is_empty());
    }

    #[tokio::test]
    async fn test_missing_response_is_bad_server_response() {
        let (handler, pending) = data_handler(3);
        handler.finish(None, None);
        let err = pending.wait(None).await.unwrap_err();
        assert_eq!(
            err.transport_error().map(TransportError::kind),
            Some(TransportErrorKind::BadServerResponse)
        );
    }

    #[tokio::test]
    async fn test_transport_error_wins() {
        let (handler, pending) = data_handler(4);
        let error = TransportError::new(TransportErrorKind::TimedOut, "slow");
        handler.finish(Some(ok_response()), Some(error.clone()));
        assert_eq!(pending.wait(None).await.unwrap_err().transport_error(), Some(&error));
    }

    #[tokio::test]
    async fn test_download_relocated_before_completion() {
        let scratch = tempdir().unwrap();
        let downloads = scratch.path().join("Downloads");
        let transient = scratch.path().join("dl-1.tmp");
        fs::write(&transient, b"payload").unwrap();

        let (mut handler, pending) = download_handler(8);
        let stable = handler.relocate(&transient, &downloads).unwrap();
        assert!(!transient.exists());
        assert_eq!(stable.parent(), Some(downloads.as_path()));
        let name = stable.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(&format!("{}-", std::process::id())), "{name}");
        assert!(name.ends_with("-8-dl-1.tmp"), "{name}");

        handler.finish(Some(ok_response()), None);
        let response = pending.wait(None).await.unwrap();
        assert_eq!(response.value, stable);
        assert!(response.data.is_empty());
        assert_eq!(fs::read(&response.value).unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_failed_relocation_surfaces_fs_error() {
        let scratch = tempdir().unwrap();
        let (mut handler, pending) = download_handler(9);
        assert!(handler.relocate(&scratch.path().join("gone.tmp"), scratch.path()).is_none());

        handler.finish(Some(ok_response()), None);
        assert!(matches!(pending.wait(None).await, Err(Error::Fs(_))));
    }

    #[tokio::test]
    async fn test_same_task_id_relocates_to_distinct_files() {
        let scratch = tempdir().unwrap();
        let downloads = scratch.path().join("Downloads");
        let mut locations = Vec::new();
        for contents in ["first", "second"] {
            let transient = scratch.path().join("1.download");
            fs::write(&transient, contents).unwrap();
            let (mut handler, _pending) = download_handler(1);
            locations.push(handler.relocate(&transient, &downloads).unwrap());
        }

        assert_ne!(locations[0], locations[1]);
        assert_eq!(fs::read(&locations[0]).unwrap(), b"first");
        assert_eq!(fs::read(&locations[1]).unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_failed_download_removes_relocated_file() {
        let scratch = tempdir().unwrap();
        let transient = scratch.path().join("dl-11.tmp");
        fs::write(&transient, b"partial").unwrap();

        let (mut handler, pending) = download_handler(11);
        let stable = handler.relocate(&transient, scratch.path()).unwrap();
        assert!(stable.exists());

        handler.finish(None, Some(TransportError::cancelled()));
        assert!(pending.wait(None).await.unwrap_err().is_cancelled());
        assert!(!stable.exists());
    }

    #[tokio::test]
    async fn test_abandoned_download_removes_relocated_file() {
        let scratch = tempdir().unwrap();
        let transient = scratch.path().join("dl-12.tmp");
        fs::write(&transient, b"payload").unwrap();

        let (mut handler, pending) = download_handler(12);
        let stable = handler.relocate(&transient, scratch.path()).unwrap();

        handler.fail(Error::Abandoned);
        assert!(matches!(pending.wait(None).await, Err(Error::Abandoned)));
        assert!(!stable.exists());
    }

    #[tokio::test]
    async fn test_download_without_location() {
        let (handler, pending) = download_handler(10);
        handler.finish(Some(ok_response()), None);
        let err = pending.wait(None).await.unwrap_err();
        assert_eq!(
            err.transport_error().map(TransportError::kind),
            Some(TransportErrorKind::BadServerResponse)
        );
    }
}
