use std::path::{Path, PathBuf};

use bytes::Bytes;
use url::Url;

use crate::data::metrics::TaskMetrics;
use crate::data::request::Headers;
use crate::data::task::TaskHandle;

/// The protocol response head as reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Final URL of the response, after any followed redirects.
    pub url:     Url,
    pub status:  u16,
    pub headers: Headers,
}

impl HttpResponse {
    pub fn new(url: Url, status: u16) -> Self {
        Self {
            url,
            status,
            headers: Headers::new(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Value of `Content-Length`, if present and numeric.
    pub fn content_length(&self) -> Option<u64> {
        self.headers.get("content-length").and_then(|v| v.trim().parse().ok())
    }
}

/// A response proposed for caching, as offered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub response: HttpResponse,
    pub data:     Bytes,
}

/// The result envelope of a completed task.
///
/// `data` and `response` always come from the same transfer. For
/// in-memory transfers `value` starts out equal to `data`; for downloads
/// it is the stable file location and `data` is empty. [`Response::map`]
/// projects the value while keeping every other field.
#[derive(Debug, Clone, PartialEq)]
pub struct Response<T> {
    pub value:    T,
    pub data:     Bytes,
    pub response: HttpResponse,
    pub task:     TaskHandle,
    pub metrics:  Option<TaskMetrics>,
}

impl<T> Response<T> {
    pub fn new(
        value: T,
        data: Bytes,
        response: HttpResponse,
        task: TaskHandle,
        metrics: Option<TaskMetrics>,
    ) -> Self {
        Self {
            value,
            data,
            response,
            task,
            metrics,
        }
    }

    pub fn status_code(&self) -> u16 {
        self.response.status
    }

    /// Replace the value, keeping bytes, response, task and metrics.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Response<U> {
        Response {
            value:    f(self.value),
            data:     self.data,
            response: self.response,
            task:     self.task,
            metrics:  self.metrics,
        }
    }

    pub fn try_map<U, E>(self, f: impl FnOnce(T) -> Result<U, E>) -> Result<Response<U>, E> {
        Ok(Response {
            value:    f(self.value)?,
            data:     self.data,
            response: self.response,
            task:     self.task,
            metrics:  self.metrics,
        })
    }
}

impl Response<PathBuf> {
    /// Where the downloaded file was placed.
    pub fn location(&self) -> &Path {
        &self.value
    }
}
