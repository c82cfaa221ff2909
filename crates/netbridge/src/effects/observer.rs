//! Observer capability sets.
//!
//! [`TaskObserver`] is the base capability every observer has. The narrower
//! sets are exposed through the `as_*` accessors instead of downcasting; an
//! observer that overrides `as_data` to return `Some(self)` receives data
//! task events, and so on.
//!
//! Methods returning `Option<_>` are disposition requests: `None` means the
//! observer has no opinion and the next tier is asked.

use std::path::Path;

use bytes::Bytes;

use crate::data::{
    AuthChallenge, CacheDisposition, CachedResponse, ChallengeDisposition,
    DelayedRequestDisposition, HttpResponse, RedirectDisposition, ResponseDisposition, TaskHandle,
    TaskMetrics, TransportRequest,
};
use crate::error::TransportError;

/// Events common to every task.
///
/// All methods run on the loader's dispatch task and must not block.
pub trait TaskObserver: Send + Sync {
    fn as_data(&self) -> Option<&dyn DataObserver> {
        None
    }

    fn as_download(&self) -> Option<&dyn DownloadObserver> {
        None
    }

    fn as_session(&self) -> Option<&dyn SessionObserver> {
        None
    }

    fn task_created(&self, _task: TaskHandle) {}

    fn will_perform_redirection(
        &self,
        _task: TaskHandle,
        _response: &HttpResponse,
        _request: &TransportRequest,
    ) -> Option<RedirectDisposition> {
        None
    }

    fn received_challenge(
        &self,
        _task: TaskHandle,
        _challenge: &AuthChallenge,
    ) -> Option<ChallengeDisposition> {
        None
    }

    fn will_begin_delayed_request(
        &self,
        _task: TaskHandle,
        _request: &TransportRequest,
    ) -> Option<DelayedRequestDisposition> {
        None
    }

    fn waiting_for_connectivity(&self, _task: TaskHandle) {}

    fn sent_body_data(
        &self,
        _task: TaskHandle,
        _bytes_sent: u64,
        _total_sent: u64,
        _total_expected: Option<u64>,
    ) {
    }

    fn collected_metrics(&self, _task: TaskHandle, _metrics: &TaskMetrics) {}

    fn completed(&self, _task: TaskHandle, _error: Option<&TransportError>) {}
}

/// Events of tasks that deliver their body in memory.
pub trait DataObserver: Send + Sync {
    fn received_response(
        &self,
        _task: TaskHandle,
        _response: &HttpResponse,
    ) -> Option<ResponseDisposition> {
        None
    }

    fn received_data(&self, _task: TaskHandle, _data: &Bytes) {}

    fn will_cache_response(
        &self,
        _task: TaskHandle,
        _proposed: &CachedResponse,
    ) -> Option<CacheDisposition> {
        None
    }
}

/// Events of tasks that deliver their body as a file.
pub trait DownloadObserver: Send + Sync {
    /// `location` is the relocated file, valid after the task completes.
    fn finished_downloading(&self, _task: TaskHandle, _location: &Path) {}

    fn wrote_data(
        &self,
        _task: TaskHandle,
        _bytes_written: u64,
        _total_written: u64,
        _total_expected: Option<u64>,
    ) {
    }

    fn resumed_at_offset(&self, _task: TaskHandle, _offset: u64, _total_expected: Option<u64>) {}
}

/// Transport-wide events. Only the session observer receives these.
pub trait SessionObserver: Send + Sync {
    fn became_invalid(&self, _error: Option<&TransportError>) {}
}
