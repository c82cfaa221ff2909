use std::fmt;
use std::path::PathBuf;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tracing::trace;

use crate::data::{
    AuthChallenge, CacheDisposition, CachedResponse, ChallengeDisposition,
    DelayedRequestDisposition, HttpResponse, RedirectDisposition, ResponseDisposition, TaskHandle,
    TaskMetrics, TaskSpec, TransportRequest,
};
use crate::effects::loader::LoaderMessage;
use crate::error::TransportError;

/// Event-driven network transport.
///
/// A transport creates suspended tasks, runs them once resumed, and
/// reports everything that happens to a task through the [`EventSink`]
/// it was attached to. Events for one task must be emitted in order;
/// events for different tasks may interleave freely.
///
/// Nothing may be emitted for a task before [`Transport::resume`] is
/// called for it, and every resumed task ends with exactly one
/// [`TransportEvent::Completed`].
///
/// # Implementations
///
/// - [`ReqwestTransport`](crate::ReqwestTransport): production transport over `reqwest`
/// - Scripted transports in tests
pub trait Transport: Send + Sync {
    /// Hand the transport the sink all subsequent events go to.
    fn attach(&self, sink: EventSink);

    /// Create a suspended task. Handles are never reused.
    fn create_task(&self, spec: TaskSpec) -> TaskHandle;

    /// Start a task previously returned by [`Transport::create_task`].
    fn resume(&self, task: TaskHandle);

    /// Cancel a task. The task still completes, with a cancelled error.
    fn cancel(&self, task: TaskHandle);

    /// Cancel every task and invalidate the transport.
    fn invalidate_and_cancel(&self);
}

/// One-shot answer channel for events that need a disposition.
///
/// Dropping a `Reply` without answering lets the transport fall back to
/// its own default.
pub struct Reply<T> {
    tx: oneshot::Sender<T>,
}

impl<T> Reply<T> {
    /// Create a reply and the receiver the transport awaits.
    pub fn channel() -> (Self, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    pub fn send(self, value: T) {
        if self.tx.send(value).is_err() {
            trace!("transport stopped waiting for a disposition");
        }
    }
}

impl<T> fmt::Debug for Reply<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reply").finish_non_exhaustive()
    }
}

/// Everything a transport can report.
#[derive(Debug)]
pub enum TransportEvent {
    TaskCreated {
        task: TaskHandle,
    },
    WillPerformRedirection {
        task:     TaskHandle,
        response: HttpResponse,
        request:  TransportRequest,
        reply:    Reply<RedirectDisposition>,
    },
    ReceivedChallenge {
        task:      TaskHandle,
        challenge: AuthChallenge,
        reply:     Reply<ChallengeDisposition>,
    },
    WillBeginDelayedRequest {
        task:    TaskHandle,
        request: TransportRequest,
        reply:   Reply<DelayedRequestDisposition>,
    },
    WaitingForConnectivity {
        task: TaskHandle,
    },
    SentBodyData {
        task:           TaskHandle,
        bytes_sent:     u64,
        total_sent:     u64,
        total_expected: Option<u64>,
    },
    CollectedMetrics {
        task:    TaskHandle,
        metrics: TaskMetrics,
    },
    ReceivedResponse {
        task:     TaskHandle,
        response: HttpResponse,
        reply:    Reply<ResponseDisposition>,
    },
    ReceivedData {
        task: TaskHandle,
        data: Bytes,
    },
    WillCacheResponse {
        task:     TaskHandle,
        proposed: CachedResponse,
        reply:    Reply<CacheDisposition>,
    },
    /// The transient file at `location` is removed once `reply` is
    /// answered or dropped.
    FinishedDownloading {
        task:     TaskHandle,
        location: PathBuf,
        reply:    Reply<()>,
    },
    WroteData {
        task:           TaskHandle,
        bytes_written:  u64,
        total_written:  u64,
        total_expected: Option<u64>,
    },
    ResumedAtOffset {
        task:           TaskHandle,
        offset:         u64,
        total_expected: Option<u64>,
    },
    /// Terminal event. `response` is the last protocol response, if any.
    Completed {
        task:     TaskHandle,
        response: Option<HttpResponse>,
        error:    Option<TransportError>,
    },
    SessionInvalidated {
        error: Option<TransportError>,
    },
}

impl TransportEvent {
    /// The task this event belongs to, `None` for session-wide events.
    pub fn task(&self) -> Option<TaskHandle> {
        use TransportEvent::*;

        match self {
            TaskCreated { task }
            | WillPerformRedirection { task, .. }
            | ReceivedChallenge { task, .. }
            | WillBeginDelayedRequest { task, .. }
            | WaitingForConnectivity { task }
            | SentBodyData { task, .. }
            | CollectedMetrics { task, .. }
            | ReceivedResponse { task, .. }
            | ReceivedData { task, .. }
            | WillCacheResponse { task, .. }
            | FinishedDownloading { task, .. }
            | WroteData { task, .. }
            | ResumedAtOffset { task, .. }
            | Completed { task, .. } => Some(*task),
            SessionInvalidated { .. } => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TransportEvent::Completed { .. })
    }
}

/// Where a transport delivers its events.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<LoaderMessage>,
}

impl EventSink {
    pub(crate) fn new(tx: mpsc::UnboundedSender<LoaderMessage>) -> Self {
        Self { tx }
    }

    pub fn emit(&self, event: TransportEvent) {
        if self.tx.send(LoaderMessage::Event(event)).is_err() {
            trace!("event dropped, loader has shut down");
        }
    }

    /// Emit an event carrying a [`Reply`] and wait for the answer.
    ///
    /// Returns `None` if the answer was never given.
    pub async fn ask<T>(&self, event: impl FnOnce(Reply<T>) -> TransportEvent) -> Option<T> {
        let (reply, rx) = Reply::channel();
        self.emit(event(reply));
        rx.await.ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reply_roundtrip() {
        let (reply, rx) = Reply::channel();
        reply.send(ResponseDisposition::Cancel);
        assert_eq!(rx.await.unwrap(), ResponseDisposition::Cancel);
    }

    #[tokio::test]
    async fn test_dropped_reply_closes_receiver() {
        let (reply, rx) = Reply::<()>::channel();
        drop(reply);
        assert!(rx.await.is_err());
    }

    #[test]
    fn test_event_task() {
        let task = TaskHandle::new(5);
        let event = TransportEvent::Completed {
            task,
            response: None,
            error: None,
        };
        assert_eq!(event.task(), Some(task));
        assert!(event.is_terminal());

        let event = TransportEvent::SessionInvalidated { error: None };
        assert_eq!(event.task(), None);
        assert!(!event.is_terminal());
    }

    #[tokio::test]
    async fn test_sink_delivers_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(tx);
        for id in 1..=3 {
            sink.emit(TransportEvent::TaskCreated { task: TaskHandle::new(id) });
        }
        for id in 1..=3 {
            match rx.recv().await {
                Some(LoaderMessage::Event(event)) => assert_eq!(event.task(), Some(TaskHandle::new(id))),
                _ => panic!("expected an event"),
            }
        }
    }

    #[tokio::test]
    async fn test_ask_without_loader() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let sink = EventSink::new(tx);
        assert!(sink.is_closed());
        let answer = sink
            .ask(|reply| TransportEvent::FinishedDownloading {
                task: TaskHandle::new(1),
                location: PathBuf::from("/tmp/x"),
                reply,
            })
            .await;
        assert!(answer.is_none());
    }
}
