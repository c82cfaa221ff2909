//! Scripted transport shared by the integration suites.
//!
//! A [`MockTransport`] records every create, resume and cancel. Tests either
//! give it a script that runs when a task is resumed, or drive the events
//! by hand through [`MockTransport::emit`].

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use netbridge::{
    EventSink, HttpResponse, Reply, TaskHandle, TaskSpec, Transport, TransportError,
    TransportErrorKind, TransportEvent,
};
use parking_lot::Mutex;
use url::Url;

type Script = Arc<dyn Fn(&MockTransport, TaskHandle, &TaskSpec) + Send + Sync>;

#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<State>>,
}

#[derive(Default)]
struct State {
    sink:        Option<EventSink>,
    next_id:     u64,
    specs:       HashMap<TaskHandle, TaskSpec>,
    created:     Vec<TaskHandle>,
    resumed:     Vec<TaskHandle>,
    cancelled:   Vec<TaskHandle>,
    completed:   HashSet<TaskHandle>,
    invalidated: bool,
    script:      Option<Script>,
}

impl MockTransport {
    /// A transport whose tasks only do what the test emits by hand.
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport that runs `script` whenever a task is resumed.
    pub fn responding(script: impl Fn(&MockTransport, TaskHandle, &TaskSpec) + Send + Sync + 'static) -> Self {
        let transport = Self::default();
        transport.state.lock().script = Some(Arc::new(script));
        transport
    }

    pub fn emit(&self, event: TransportEvent) {
        let sink = {
            let mut state = self.state.lock();
            if let TransportEvent::Completed { task, .. } = &event {
                if !state.completed.insert(*task) {
                    return;
                }
            }
            state.sink.clone()
        };
        sink.expect("transport not attached").emit(event);
    }

    /// Emit an event that carries a reply and wait for the answer.
    pub async fn ask<T>(&self, event: impl FnOnce(Reply<T>) -> TransportEvent) -> Option<T> {
        let (reply, rx) = Reply::channel();
        self.emit(event(reply));
        rx.await.ok()
    }

    pub fn data(&self, task: TaskHandle, chunk: impl Into<Bytes>) {
        self.emit(TransportEvent::ReceivedData {
            task,
            data: chunk.into(),
        });
    }

    pub fn complete(&self, task: TaskHandle, status: u16) {
        self.emit(TransportEvent::Completed {
            task,
            response: Some(response(status)),
            error: None,
        });
    }

    pub fn fail(&self, task: TaskHandle, error: TransportError) {
        self.emit(TransportEvent::Completed {
            task,
            response: None,
            error: Some(error),
        });
    }

    pub fn created(&self) -> Vec<TaskHandle> {
        self.state.lock().created.clone()
    }

    pub fn resumed(&self) -> Vec<TaskHandle> {
        self.state.lock().resumed.clone()
    }

    pub fn cancelled(&self) -> Vec<TaskHandle> {
        self.state.lock().cancelled.clone()
    }

    pub fn invalidated(&self) -> bool {
        self.state.lock().invalidated
    }

    pub fn spec(&self, task: TaskHandle) -> TaskSpec {
        self.state.lock().specs.get(&task).cloned().expect("unknown task")
    }

    /// Wait until at least `count` tasks have been resumed.
    pub async fn wait_for_resumed(&self, count: usize) -> Vec<TaskHandle> {
        self.wait_until(|state| state.resumed.len() >= count).await;
        self.resumed()
    }

    pub async fn wait_for_cancelled(&self, count: usize) -> Vec<TaskHandle> {
        self.wait_until(|state| state.cancelled.len() >= count).await;
        self.cancelled()
    }

    async fn wait_until(&self, done: impl Fn(&State) -> bool) {
        let poll = async {
            while !done(&self.state.lock()) {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), poll)
            .await
            .expect("timed out waiting for the transport");
    }
}

impl Transport for MockTransport {
    fn attach(&self, sink: EventSink) {
        self.state.lock().sink = Some(sink);
    }

    fn create_task(&self, spec: TaskSpec) -> TaskHandle {
        let mut state = self.state.lock();
        state.next_id += 1;
        let task = TaskHandle::new(state.next_id);
        state.specs.insert(task, spec);
        state.created.push(task);
        task
    }

    fn resume(&self, task: TaskHandle) {
        let (script, spec) = {
            let mut state = self.state.lock();
            state.resumed.push(task);
            (state.script.clone(), state.specs.get(&task).cloned())
        };
        if let (Some(script), Some(spec)) = (script, spec) {
            script(self, task, &spec);
        }
    }

    fn cancel(&self, task: TaskHandle) {
        self.state.lock().cancelled.push(task);
        self.fail(task, TransportError::cancelled());
    }

    fn invalidate_and_cancel(&self) {
        let pending: Vec<TaskHandle> = {
            let mut state = self.state.lock();
            state.invalidated = true;
            state
                .resumed
                .iter()
                .filter(|task| !state.completed.contains(*task))
                .copied()
                .collect()
        };
        for task in pending {
            self.fail(task, TransportError::cancelled());
        }
        self.emit(TransportEvent::SessionInvalidated { error: None });
    }
}

pub fn url(path: &str) -> Url {
    Url::parse("https://api.example.com")
        .and_then(|base| base.join(path))
        .expect("valid test url")
}

pub fn response(status: u16) -> HttpResponse {
    HttpResponse::new(url("/"), status).with_header("Content-Type", "application/json")
}

pub fn connection_lost() -> TransportError {
    TransportError::new(TransportErrorKind::NetworkConnectionLost, "connection reset by peer")
}

/// A script answering every data task with `body` and `status`.
pub fn reply_with(status: u16, body: &'static str) -> impl Fn(&MockTransport, TaskHandle, &TaskSpec) + Send + Sync {
    move |transport, task, _spec| {
        transport.data(task, Bytes::from_static(body.as_bytes()));
        transport.complete(task, status);
    }
}
