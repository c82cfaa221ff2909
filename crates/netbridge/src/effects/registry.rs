use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};

use crate::data::{TaskHandle, TaskMetrics};
use crate::effects::bridge::CompletionSlot;
use crate::effects::observer::TaskObserver;

/// Core-owned state of one in-flight task.
pub(crate) struct TaskHandler {
    pub(crate) observer: Option<Arc<dyn TaskObserver>>,
    pub(crate) kind:     HandlerKind,
    pub(crate) metrics:  Option<TaskMetrics>,
}

/// What a task accumulates and how it completes.
pub(crate) enum HandlerKind {
    /// In-memory body; used by data and upload tasks.
    Data {
        buffer:     BytesMut,
        completion: CompletionSlot<Bytes>,
    },
    Download {
        location:         Option<PathBuf>,
        relocation_error: Option<netbridge_fs::Error>,
        completion:       CompletionSlot<PathBuf>,
    },
}

impl TaskHandler {
    pub(crate) fn data(observer: Option<Arc<dyn TaskObserver>>, completion: CompletionSlot<Bytes>) -> Self {
        Self {
            observer,
            kind: HandlerKind::Data {
                buffer: BytesMut::new(),
                completion,
            },
            metrics: None,
        }
    }

    pub(crate) fn download(
        observer: Option<Arc<dyn TaskObserver>>,
        completion: CompletionSlot<PathBuf>,
    ) -> Self {
        Self {
            observer,
            kind: HandlerKind::Download {
                location: None,
                relocation_error: None,
                completion,
            },
            metrics: None,
        }
    }

    /// Task the handler's completion slot belongs to.
    pub(crate) fn task(&self) -> TaskHandle {
        match &self.kind {
            HandlerKind::Data { completion, .. } => completion.task(),
            HandlerKind::Download { completion, .. } => completion.task(),
        }
    }
}

/// Map from in-flight task to its handler.
///
/// Only the loader's dispatch task owns and touches the registry.
#[derive(Default)]
pub(crate) struct TaskRegistry {
    tasks: HashMap<TaskHandle, TaskHandler>,
}

impl TaskRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Add a handler. A handle that is already registered is refused and
    /// the new handler is handed back.
    pub(crate) fn register(&mut self, task: TaskHandle, handler: TaskHandler) -> Result<(), TaskHandler> {
        if self.tasks.contains_key(&task) {
            return Err(handler);
        }
        self.tasks.insert(task, handler);
        Ok(())
    }

    pub(crate) fn lookup(&mut self, task: TaskHandle) -> Option<&mut TaskHandler> {
        self.tasks.get_mut(&task)
    }

    pub(crate) fn observer(&self, task: TaskHandle) -> Option<Arc<dyn TaskObserver>> {
        self.tasks.get(&task).and_then(|handler| handler.observer.clone())
    }

    pub(crate) fn remove(&mut self, task: TaskHandle) -> Option<TaskHandler> {
        self.tasks.remove(&task)
    }

    /// Registered handles in ascending order.
    pub(crate) fn handles(&self) -> Vec<TaskHandle> {
        let mut handles: Vec<_> = self.tasks.keys().copied().collect();
        handles.sort_unstable();
        handles
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
