//! Bridges an event-driven HTTP transport into single-result async operations.
//!
//! # Architecture
//!
//! This crate follows the three-layer pattern:
//! - `data` - Immutable requests, responses, dispositions and configuration
//! - [`core`] - Pure transformations (URL resolution, status rules, naming)
//! - `effects` - The loader, completion bridge, delegate chain, retry loop,
//!   client and transports
//!
//! # Key Features
//!
//! - **One Result Per Task**: every transport task resolves its caller exactly once
//! - **Layered Observers**: per-call observer, then session observer, then a safe default
//! - **Stable Downloads**: transient files are relocated before anyone sees them
//! - **Mechanism-Only Retry**: a [`ClientDelegate`] decides, attempt by attempt

pub mod core;
mod data;
mod effects;
mod error;

pub use data::{
    AuthChallenge, Body, CacheDisposition, CachedResponse, ChallengeDisposition, Configuration,
    Credential, DelayedRequestDisposition, Headers, HttpResponse, Method, RedirectDisposition,
    Request, Response, ResponseDisposition, TaskHandle, TaskKind, TaskMetrics, TaskOptions,
    TaskSpec, TransportRequest,
};
pub use effects::{
    ApiClient, Attempt, ClientDelegate, DataObserver, DefaultDelegate, DownloadObserver,
    EventSink, Reply, RetryContext, SessionObserver, TaskFailure, TaskObserver,
    Transport, TransportEvent, perform_with_retries,
};
#[cfg(feature = "reqwest")]
pub use effects::{ReqwestOptions, ReqwestTransport};

pub use error::{Error, Result, TransportError, TransportErrorKind};
