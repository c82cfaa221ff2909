//! I/O, tasks, channels and the trait seams.
//!
//! Everything that suspends, spawns or talks to a transport lives here:
//! the loader and its registry, the completion bridge, the delegate chain,
//! the retry loop and the client built on top of them.

mod bridge;
mod client;
mod delegate;
mod finalizer;
#[cfg(feature = "reqwest")]
mod http;
mod loader;
mod observer;
mod registry;
mod resolver;
mod retry;
mod transport;

pub use client::ApiClient;
pub use delegate::{ClientDelegate, DefaultDelegate};
#[cfg(feature = "reqwest")]
pub use http::{ReqwestOptions, ReqwestTransport};
pub use observer::{DataObserver, DownloadObserver, SessionObserver, TaskObserver};
pub use retry::{Attempt, RetryContext, TaskFailure, perform_with_retries};
pub use transport::{EventSink, Reply, Transport, TransportEvent};

#[cfg(test)]
pub(crate) mod test_support {
    use crate::data::{TaskHandle, TaskSpec};
    use crate::effects::transport::{EventSink, Transport};

    /// Transport that never runs anything.
    pub(crate) struct Inert;

    impl Transport for Inert {
        fn attach(&self, _sink: EventSink) {}

        fn create_task(&self, _spec: TaskSpec) -> TaskHandle {
            TaskHandle::new(0)
        }

        fn resume(&self, _task: TaskHandle) {}

        fn cancel(&self, _task: TaskHandle) {}

        fn invalidate_and_cancel(&self) {}
    }
}
