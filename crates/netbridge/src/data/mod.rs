//! Immutable data types shared by every layer.
//!
//! Requests going in, envelopes coming out, the handle that ties a
//! transport task to its caller, and the option structs that configure
//! a client and an individual call.

pub mod disposition;
pub mod metrics;
pub mod options;
pub mod request;
pub mod response;
pub mod task;

pub use disposition::{
    AuthChallenge, CacheDisposition, ChallengeDisposition, Credential, DelayedRequestDisposition,
    RedirectDisposition, ResponseDisposition,
};
pub use metrics::TaskMetrics;
pub use options::{Configuration, TaskOptions};
pub use request::{Body, Headers, Method, Request, TransportRequest};
pub use response::{CachedResponse, HttpResponse, Response};
pub use task::{TaskHandle, TaskKind, TaskSpec};
