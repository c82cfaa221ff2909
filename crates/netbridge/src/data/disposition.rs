//! Answers the transport waits for before it can proceed with a task.
//!
//! Each disposition has a safe default that is used when no observer
//! answers the corresponding event.

use crate::data::request::TransportRequest;
use crate::data::response::{CachedResponse, HttpResponse};

/// Whether a redirect should be followed.
#[derive(Debug, Clone, PartialEq)]
pub enum RedirectDisposition {
    /// Follow, sending this request (usually the one the transport proposed).
    Follow(TransportRequest),
    /// Stop here; the redirect response becomes the task's final response.
    Refuse,
}

/// An authentication challenge raised by the server or a proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    /// Authentication scheme, e.g. `Basic`.
    pub scheme: String,
    pub realm: Option<String>,
    pub host: String,
    pub previous_failure_count: u32,
    /// The response that carried the challenge, when there was one.
    pub failure_response: Option<HttpResponse>,
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub user: String,
    pub password: String,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ChallengeDisposition {
    UseCredential(Credential),
    /// Let the transport handle the challenge as if nobody was asked.
    #[default]
    PerformDefaultHandling,
    CancelChallenge,
    RejectProtectionSpace,
}

/// What to do with a request whose start the transport had deferred.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum DelayedRequestDisposition {
    #[default]
    ContinueLoading,
    UseNewRequest(TransportRequest),
    Cancel,
}

/// Whether a data task should keep receiving the body after the head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseDisposition {
    #[default]
    Allow,
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheDisposition {
    Store(CachedResponse),
    DoNotStore,
}
