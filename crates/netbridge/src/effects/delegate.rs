use async_trait::async_trait;
use bytes::Bytes;

use crate::core::is_acceptable_status;
use crate::data::{HttpResponse, TransportRequest};
use crate::effects::retry::RetryContext;
use crate::error::{Error, Result};

/// Client-wide hooks around every attempt.
///
/// All methods have defaults, so an implementation only overrides what it
/// needs. Errors returned from `will_send_request` end the send without a
/// retry; errors from `validate_response` are treated like transport
/// failures and go through [`ClientDelegate::should_retry`].
#[async_trait]
pub trait ClientDelegate: Send + Sync {
    /// Adjust the request right before a task is created for it.
    async fn will_send_request(&self, _request: &mut TransportRequest) -> Result<()> {
        Ok(())
    }

    /// Accept or reject a completed response. The default accepts 2xx.
    async fn validate_response(&self, response: &HttpResponse, _data: &Bytes) -> Result<()> {
        if is_acceptable_status(response.status) {
            Ok(())
        } else {
            Err(Error::UnacceptableStatusCode(response.status))
        }
    }

    /// Decide whether a failed attempt is submitted again. The default never retries.
    async fn should_retry(&self, _context: &RetryContext) -> Result<bool> {
        Ok(false)
    }
}

/// Delegate used when the configuration has none.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultDelegate;

impl ClientDelegate for DefaultDelegate {}
