//! The loader: owns the task registry on a single dispatch task and routes
//! every transport event through the delegate chain and the finalizer.
//!
//! Registrations and transport events share one unbounded channel. A task is
//! registered by enqueueing [`LoaderMessage::Register`] before the transport
//! is asked to resume it, so the registration is always processed before
//! the first event of that task.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, trace, warn};

use crate::data::{TaskHandle, TaskSpec};
use crate::effects::bridge::{PendingTask, completion_pair};
use crate::effects::observer::TaskObserver;
use crate::effects::registry::{TaskHandler, TaskRegistry};
use crate::effects::resolver::DelegateChain;
use crate::effects::transport::{EventSink, Transport, TransportEvent};
use crate::error::Error;

pub(crate) enum LoaderMessage {
    Register {
        task:    TaskHandle,
        handler: TaskHandler,
    },
    Event(TransportEvent),
    Inspect(oneshot::Sender<Vec<TaskHandle>>),
}

/// Submission side of the loader.
pub(crate) struct Loader {
    tx:        mpsc::UnboundedSender<LoaderMessage>,
    transport: Arc<dyn Transport>,
}

impl Loader {
    /// Attach `transport` and spawn the dispatch task. Requires a Tokio runtime.
    pub(crate) fn spawn(
        transport: Arc<dyn Transport>,
        session: Option<Arc<dyn TaskObserver>>,
        download_dir: PathBuf,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        transport.attach(EventSink::new(tx.clone()));

        let dispatcher = Dispatcher {
            registry: TaskRegistry::new(),
            session,
            download_dir,
        };
        tokio::spawn(dispatcher.run(rx));

        Self { tx, transport }
    }

    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Start a task whose body is collected in memory.
    pub(crate) fn start_data_task(
        &self,
        spec: TaskSpec,
        observer: Option<Arc<dyn TaskObserver>>,
    ) -> PendingTask<Bytes> {
        let task = self.transport.create_task(spec);
        let (slot, pending) = completion_pair(task, self.transport.clone());
        self.start(task, TaskHandler::data(observer, slot));
        pending
    }

    /// Start a task whose body is written to a file.
    pub(crate) fn start_download_task(
        &self,
        spec: TaskSpec,
        observer: Option<Arc<dyn TaskObserver>>,
    ) -> PendingTask<PathBuf> {
        let task = self.transport.create_task(spec);
        let (slot, pending) = completion_pair(task, self.transport.clone());
        self.start(task, TaskHandler::download(observer, slot));
        pending
    }

    fn start(&self, task: TaskHandle, handler: TaskHandler) {
        // A refused message drops the handler, which abandons the wait.
        if self.tx.send(LoaderMessage::Register { task, handler }).is_err() {
            error!(task = %task, "loader is not running, task not started");
            self.transport.cancel(task);
            return;
        }
        trace!(task = %task, "resuming task");
        self.transport.resume(task);
    }

    /// Handles of the tasks currently registered.
    pub(crate) async fn pending_tasks(&self) -> Vec<TaskHandle> {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(LoaderMessage::Inspect(tx)).is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }
}

struct Dispatcher {
    registry:     TaskRegistry,
    session:      Option<Arc<dyn TaskObserver>>,
    download_dir: PathBuf,
}

impl Dispatcher {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<LoaderMessage>) {
        debug!("loader started");
        while let Some(message) = rx.recv().await {
            match message {
                LoaderMessage::Register { task, handler } => self.register(task, handler),
                LoaderMessage::Event(event) => self.dispatch(event),
                LoaderMessage::Inspect(reply) => {
                    let _ = reply.send(self.registry.handles());
                }
            }
        }
        if !self.registry.is_empty() {
            warn!(pending = self.registry.len(), "loader stopped with tasks in flight");
        }
        debug!("loader stopped");
    }

    fn register(&mut self, task: TaskHandle, handler: TaskHandler) {
        if let Err(rejected) = self.registry.register(task, handler) {
            error!(task = %task, "task registered twice");
            debug_assert!(false, "task {task} registered twice");
            rejected.fail(Error::Abandoned);
            return;
        }
        trace!(task = %task, pending = self.registry.len(), "registered task");
    }

    fn dispatch(&mut self, event: TransportEvent) {
        use TransportEvent::*;

        let observer = event.task().and_then(|task| self.registry.observer(task));
        let chain = DelegateChain::new(observer.as_deref(), self.session.as_deref());

        match event {
            TaskCreated { task } => chain.forward(|tier| tier.task_created(task)),
            WillPerformRedirection {
                task,
                response,
                request,
                reply,
            } => reply.send(chain.redirection(task, &response, request)),
            ReceivedChallenge {
                task,
                challenge,
                reply,
            } => reply.send(chain.challenge(task, &challenge)),
            WillBeginDelayedRequest { task, request, reply } => {
                reply.send(chain.delayed_request(task, &request))
            }
            WaitingForConnectivity { task } => chain.forward(|tier| tier.waiting_for_connectivity(task)),
            SentBodyData {
                task,
                bytes_sent,
                total_sent,
                total_expected,
            } => chain.forward(|tier| tier.sent_body_data(task, bytes_sent, total_sent, total_expected)),
            CollectedMetrics { task, metrics } => {
                chain.forward(|tier| tier.collected_metrics(task, &metrics));
                if let Some(handler) = self.registry.lookup(task) {
                    handler.metrics = Some(metrics);
                }
            }
            ReceivedResponse {
                task,
                response,
                reply,
            } => reply.send(chain.response(task, &response)),
            ReceivedData { task, data } => match self.registry.lookup(task) {
                Some(handler) => {
                    chain.received_data(task, &data);
                    handler.accumulate(&data);
                }
                None => trace!(task = %task, "dropping data for unknown task"),
            },
            WillCacheResponse {
                task,
                proposed,
                reply,
            } => reply.send(chain.cache(task, proposed)),
            FinishedDownloading {
                task,
                location,
                reply,
            } => {
                match self.registry.lookup(task) {
                    Some(handler) => {
                        if let Some(stable) = handler.relocate(&location, &self.download_dir) {
                            chain.finished_downloading(task, &stable);
                        }
                    }
                    None => {
                        warn!(task = %task, "finished downloading for unknown task");
                        chain.finished_downloading(task, &location);
                    }
                }
                // Acknowledging lets the transport delete the transient file.
                reply.send(());
            }
            WroteData {
                task,
                bytes_written,
                total_written,
                total_expected,
            } => chain.forward_download(|tier| {
                tier.wrote_data(task, bytes_written, total_written, total_expected)
            }),
            ResumedAtOffset {
                task,
                offset,
                total_expected,
            } => chain.forward_download(|tier| tier.resumed_at_offset(task, offset, total_expected)),
            Completed {
                task,
                response,
                error,
            } => {
                chain.forward(|tier| tier.completed(task, error.as_ref()));
                match self.registry.remove(task) {
                    Some(handler) => {
                        debug!(
                            task = %task,
                            status = response.as_ref().map(|r| r.status),
                            error = error.as_ref().map(tracing::field::display),
                            "task completed"
                        );
                        handler.finish(response, error);
                    }
                    None => {
                        error!(task = %task, "completion for a task that is not registered");
                        debug_assert!(false, "completion for unregistered task {task}");
                    }
                }
            }
            SessionInvalidated { error } => {
                debug!("transport invalidated");
                if let Some(session) = self.session.as_deref().and_then(|s| s.as_session()) {
                    session.became_invalid(error.as_ref());
                }
            }
        }
    }
}
