use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use url::Url;

use crate::core::default_download_dir;
use crate::data::request::Headers;
use crate::effects::{ClientDelegate, TaskObserver};
use crate::error::{Error, Result};

/// Client-wide configuration.
///
/// # Examples
///
/// ```
/// use netbridge::Configuration;
///
/// let config = Configuration::with_base_url("https://api.github.com")
///     .unwrap()
///     .header("User-Agent", "netbridge-demo/1.0");
/// assert_eq!(config.base_url.as_ref().unwrap().host_str(), Some("api.github.com"));
/// ```
#[derive(Clone)]
pub struct Configuration {
    /// Base for relative request URLs.
    pub base_url: Option<Url>,

    /// Request rewriting, response validation and retry policy.
    ///
    /// Default: [`DefaultDelegate`](crate::DefaultDelegate)
    pub delegate: Option<Arc<dyn ClientDelegate>>,

    /// Transport-wide observer, consulted after each per-call observer.
    ///
    /// Default: None
    pub session_observer: Option<Arc<dyn TaskObserver>>,

    /// Headers applied to every request underneath the request's own.
    ///
    /// Default: empty
    pub additional_headers: Headers,

    /// Where finished downloads are moved before they are reported.
    ///
    /// Default: `<temp dir>/netbridge/Downloads`
    pub download_dir: PathBuf,

    /// Clear `download_dir` when the client is created.
    ///
    /// Files left there by an earlier process are not referenced by
    /// anything and would otherwise accumulate.
    ///
    /// Default: true
    pub purge_download_dir: bool,
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("base_url", &self.base_url)
            .field("delegate", &self.delegate.as_ref().map(|_| "{ ... }"))
            .field("session_observer", &self.session_observer.as_ref().map(|_| "{ ... }"))
            .field("additional_headers", &self.additional_headers)
            .field("download_dir", &self.download_dir)
            .field("purge_download_dir", &self.purge_download_dir)
            .finish()
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            base_url: None,
            delegate: None,
            session_observer: None,
            additional_headers: Headers::new(),
            download_dir: default_download_dir(),
            purge_download_dir: true,
        }
    }
}

impl Configuration {
    pub fn new(base_url: Option<Url>) -> Self {
        Self {
            base_url,
            ..Self::default()
        }
    }

    /// Parse `base_url` and use it as the base for relative requests.
    pub fn with_base_url(base_url: &str) -> Result<Self> {
        let url = Url::parse(base_url).map_err(|e| Error::InvalidUrl(format!("{base_url}: {e}")))?;
        Ok(Self::new(Some(url)))
    }

    #[must_use]
    pub fn delegate(mut self, delegate: Arc<dyn ClientDelegate>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    #[must_use]
    pub fn session_observer(mut self, observer: Arc<dyn TaskObserver>) -> Self {
        self.session_observer = Some(observer);
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.additional_headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self
    }

    #[must_use]
    pub fn purge_download_dir(mut self, purge: bool) -> Self {
        self.purge_download_dir = purge;
        self
    }
}

/// Per-call options.
#[derive(Clone, Default)]
pub struct TaskOptions {
    /// Observer that sees this call's events before the session observer.
    pub observer: Option<Arc<dyn TaskObserver>>,

    /// Cancelling this token cancels the call's in-flight transport task.
    pub cancellation: Option<CancellationToken>,
}

impl fmt::Debug for TaskOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskOptions")
            .field("observer", &self.observer.as_ref().map(|_| "{ ... }"))
            .field("cancellation", &self.cancellation)
            .finish()
    }
}

impl TaskOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn observer(mut self, observer: Arc<dyn TaskObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    #[must_use]
    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Configuration::default();
        assert!(config.base_url.is_none());
        assert!(config.delegate.is_none());
        assert!(config.purge_download_dir);
        assert!(config.download_dir.ends_with("netbridge/Downloads"));
    }

    #[test]
    fn test_invalid_base_url() {
        let err = Configuration::with_base_url("not a url").unwrap_err();
        assert!(matches!(err, Error::InvalidUrl(_)));
    }

    #[test]
    fn test_builder() {
        let config = Configuration::default()
            .header("Accept", "text/plain")
            .download_dir("/var/tmp/dl")
            .purge_download_dir(false);
        assert_eq!(config.additional_headers.get("accept"), Some("text/plain"));
        assert_eq!(config.download_dir, PathBuf::from("/var/tmp/dl"));
        assert!(!config.purge_download_dir);
        assert!(format!("{config:?}").contains("download_dir"));
    }

    #[test]
    fn test_task_options_cancellation() {
        let token = CancellationToken::new();
        let options = TaskOptions::new().cancel_on(token.clone());
        token.cancel();
        assert!(options.cancellation.unwrap().is_cancelled());
    }
}
