use std::fmt;
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::data::{Response, TaskHandle};
use crate::effects::transport::Transport;
use crate::error::{Error, Result};

type Outcome<T> = Result<Response<T>>;

/// Resolving half of the completion bridge, owned by the task's handler.
///
/// `resolve` consumes the slot, so a task resolves at most once. A slot
/// dropped unresolved is logged and its waiter sees [`Error::Abandoned`].
pub(crate) struct CompletionSlot<T> {
    task: TaskHandle,
    tx:   Option<oneshot::Sender<Outcome<T>>>,
}

/// Waiting half of the completion bridge.
pub struct PendingTask<T> {
    task:      TaskHandle,
    rx:        oneshot::Receiver<Outcome<T>>,
    transport: Arc<dyn Transport>,
}

pub(crate) fn completion_pair<T>(
    task: TaskHandle,
    transport: Arc<dyn Transport>,
) -> (CompletionSlot<T>, PendingTask<T>) {
    let (tx, rx) = oneshot::channel();
    (
        CompletionSlot { task, tx: Some(tx) },
        PendingTask { task, rx, transport },
    )
}

impl<T> CompletionSlot<T> {
    pub(crate) fn task(&self) -> TaskHandle {
        self.task
    }

    pub(crate) fn resolve(mut self, outcome: Outcome<T>) {
        if let Some(tx) = self.tx.take() {
            if tx.send(outcome).is_err() {
                debug!(task = %self.task, "waiter went away before completion");
            }
        }
    }
}

impl<T> Drop for CompletionSlot<T> {
    fn drop(&mut self) {
        if self.tx.is_some() {
            error!(task = %self.task, "completion slot dropped without being resolved");
        }
    }
}

impl<T> fmt::Debug for CompletionSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionSlot")
            .field("task", &self.task)
            .field("resolved", &self.tx.is_none())
            .finish()
    }
}

impl<T> PendingTask<T> {
    pub fn task(&self) -> TaskHandle {
        self.task
    }

    /// Suspend until the task reaches its terminal event.
    ///
    /// When `cancel` fires, or the returned future is dropped, the transport
    /// is told to cancel the task. The wait then still ends through the
    /// task's own terminal event, which reports the cancellation.
    pub async fn wait(self, cancel: Option<&CancellationToken>) -> Outcome<T> {
        let mut guard = CancelOnDrop::new(self.task, self.transport);
        let mut rx = self.rx;

        let received = match cancel {
            Some(token) => tokio::select! {
                biased;
                outcome = &mut rx => outcome,
                _ = token.cancelled() => {
                    debug!(task = %self.task, "caller cancelled, cancelling task");
                    guard.fire();
                    rx.await
                }
            },
            None => (&mut rx).await,
        };

        guard.disarm();
        received.unwrap_or(Err(Error::Abandoned))
    }
}

impl<T> fmt::Debug for PendingTask<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingTask").field("task", &self.task).finish()
    }
}

/// Cancels the task at most once: explicitly, or when dropped armed.
struct CancelOnDrop {
    task:      TaskHandle,
    transport: Arc<dyn Transport>,
    armed:     bool,
}

impl CancelOnDrop {
    fn new(task: TaskHandle, transport: Arc<dyn Transport>) -> Self {
        Self {
            task,
            transport,
            armed: true,
        }
    }

    fn fire(&mut self) {
        if std::mem::replace(&mut self.armed, false) {
            self.transport.cancel(self.task);
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.fire();
    }
}
