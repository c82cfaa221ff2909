use std::fmt;
use std::path::PathBuf;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::data::request::TransportRequest;

/// Opaque identity of one transport task.
///
/// Issued by the [`Transport`](crate::Transport) when a task is created and
/// never reused for the lifetime of that transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskHandle(u64);

impl TaskHandle {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Data,
    Upload,
    Download,
}

/// What a transport is asked to perform when a task is created.
#[derive(Debug, Clone)]
pub enum TaskSpec {
    /// Send the request and buffer the response body in memory.
    Data(TransportRequest),
    /// Send the request with the file's contents as body.
    Upload {
        request: TransportRequest,
        file:    PathBuf,
    },
    /// Send the request and stream the response body to a transient file.
    Download(TransportRequest),
    /// Continue a download from resume data previously attached to a
    /// [`TransportError`](crate::TransportError).
    ResumeDownload(Bytes),
}

impl TaskSpec {
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskSpec::Data(_) => TaskKind::Data,
            TaskSpec::Upload { .. } => TaskKind::Upload,
            TaskSpec::Download(_) | TaskSpec::ResumeDownload(_) => TaskKind::Download,
        }
    }

    /// The protocol request, when the spec carries one.
    pub fn request(&self) -> Option<&TransportRequest> {
        match self {
            TaskSpec::Data(request)
            | TaskSpec::Upload { request, .. }
            | TaskSpec::Download(request) => Some(request),
            TaskSpec::ResumeDownload(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::request::Method;

    #[test]
    fn test_handle_display_and_order() {
        let a = TaskHandle::new(3);
        let b = TaskHandle::new(11);
        assert_eq!(a.to_string(), "task-3");
        assert!(a < b);
        assert_eq!(b.id(), 11);
    }

    #[test]
    fn test_spec_kind() {
        let url = url::Url::parse("https://example.com/a").unwrap();
        let request = TransportRequest::new(Method::Get, url);
        assert_eq!(TaskSpec::Data(request.clone()).kind(), TaskKind::Data);
        assert_eq!(TaskSpec::Download(request.clone()).kind(), TaskKind::Download);
        assert_eq!(
            TaskSpec::Upload {
                request,
                file: PathBuf::from("/tmp/body"),
            }
            .kind(),
            TaskKind::Upload
        );
        let resume = TaskSpec::ResumeDownload(Bytes::new());
        assert_eq!(resume.kind(), TaskKind::Download);
        assert!(resume.request().is_none());
    }
}
