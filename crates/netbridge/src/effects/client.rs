use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use netbridge_fs::purge_dir_once;
use serde::de::DeserializeOwned;
use tracing::{debug, trace, warn};

use crate::core::{apply_default_headers, make_url};
use crate::data::{Configuration, Request, Response, TaskHandle, TaskOptions, TaskSpec, TransportRequest};
use crate::effects::bridge::PendingTask;
use crate::effects::delegate::{ClientDelegate, DefaultDelegate};
use crate::effects::loader::Loader;
use crate::effects::observer::TaskObserver;
use crate::effects::retry::{Attempt, perform_with_retries};
use crate::effects::transport::Transport;
use crate::error::{Error, Result};

/// Typed requests in, single results out.
///
/// Every operation except [`ApiClient::download_resuming`] goes through
/// the retry loop: each attempt lets the delegate adjust the request,
/// runs one transport task, and validates the response.
///
/// # Examples
///
/// ```no_run
/// use netbridge::{ApiClient, Configuration, Request, ReqwestTransport, TaskOptions};
///
/// #[derive(serde::Deserialize)]
/// struct User {
///     login: String,
/// }
///
/// # async fn run() -> netbridge::Result<()> {
/// let config = Configuration::with_base_url("https://api.github.com")?;
/// let client = ApiClient::new(config, ReqwestTransport::new(Default::default())?);
///
/// let request = Request::<User>::get("/users/octocat");
/// let response = client.send(&request, TaskOptions::new()).await?;
/// println!("{} ({})", response.value.login, response.status_code());
/// # Ok(())
/// # }
/// ```
pub struct ApiClient {
    config:   Configuration,
    delegate: Arc<dyn ClientDelegate>,
    loader:   Loader,
}

impl ApiClient {
    /// Create a client over `transport`. Must be called within a Tokio runtime.
    pub fn new(config: Configuration, transport: impl Transport + 'static) -> Self {
        // Once per directory per process; other clients may share it.
        if config.purge_download_dir {
            if let Err(e) = purge_dir_once(&config.download_dir) {
                warn!(dir = %config.download_dir.display(), error = %e, "failed to purge download directory");
            }
        }

        let delegate = config
            .delegate
            .clone()
            .unwrap_or_else(|| Arc::new(DefaultDelegate));
        let loader = Loader::spawn(
            Arc::new(transport),
            config.session_observer.clone(),
            config.download_dir.clone(),
        );
        debug!(base_url = ?config.base_url.as_ref().map(|u| u.as_str()), "client created");

        Self {
            config,
            delegate,
            loader,
        }
    }

    pub fn configuration(&self) -> &Configuration {
        &self.config
    }

    /// Send a request and decode the JSON response body into `T`.
    ///
    /// A `String` target expects a JSON string; use [`ApiClient::text`]
    /// for plain text and [`ApiClient::data`] for raw bytes.
    pub async fn send<T: DeserializeOwned>(
        &self,
        request: &Request<T>,
        options: TaskOptions,
    ) -> Result<Response<T>> {
        self.data(request, options).await?.try_map(|data| decode(&data))
    }

    /// Send a request whose response body is of no interest.
    pub async fn send_empty(&self, request: &Request<()>, options: TaskOptions) -> Result<Response<()>> {
        Ok(self.data(request, options).await?.map(|_| ()))
    }

    /// Send a request and return the response body as UTF-8 text, undecoded.
    pub async fn text<T>(&self, request: &Request<T>, options: TaskOptions) -> Result<Response<String>> {
        self.data(request, options).await?.try_map(|data| text(&data))
    }

    /// Send a request and return the raw response body.
    pub async fn data<T>(&self, request: &Request<T>, options: TaskOptions) -> Result<Response<Bytes>> {
        let request = self.prepare(request)?;
        self.perform(request, &options, |loader, request, observer| {
            loader.start_data_task(TaskSpec::Data(request), observer)
        })
        .await
    }

    /// Download the response body to a file in the download directory.
    pub async fn download<T>(&self, request: &Request<T>, options: TaskOptions) -> Result<Response<PathBuf>> {
        let request = self.prepare(request)?;
        self.perform(request, &options, |loader, request, observer| {
            loader.start_download_task(TaskSpec::Download(request), observer)
        })
        .await
    }

    /// Continue a download from the resume data of an earlier failure.
    ///
    /// Resume data can only be used once, so this is never retried.
    pub async fn download_resuming(&self, resume_data: Bytes, options: TaskOptions) -> Result<Response<PathBuf>> {
        let pending = self
            .loader
            .start_download_task(TaskSpec::ResumeDownload(resume_data), options.observer.clone());
        let response = pending.wait(options.cancellation.as_ref()).await?;
        self.delegate
            .validate_response(&response.response, &response.data)
            .await?;
        Ok(response)
    }

    /// Upload `file` as the request body and decode the JSON response.
    pub async fn upload<T: DeserializeOwned>(
        &self,
        request: &Request<T>,
        file: &Path,
        options: TaskOptions,
    ) -> Result<Response<T>> {
        self.upload_data(request, file, options)
            .await?
            .try_map(|data| decode(&data))
    }

    /// Upload `file` as the request body, ignoring the response body.
    pub async fn upload_empty(
        &self,
        request: &Request<()>,
        file: &Path,
        options: TaskOptions,
    ) -> Result<Response<()>> {
        Ok(self.upload_data(request, file, options).await?.map(|_| ()))
    }

    async fn upload_data<T>(&self, request: &Request<T>, file: &Path, options: TaskOptions) -> Result<Response<Bytes>> {
        let mut request = self.prepare(request)?;
        if request.body.take().is_some() {
            debug!("request body replaced by upload file");
        }
        self.perform(request, &options, |loader, request, observer| {
            let file = file.to_path_buf();
            loader.start_data_task(TaskSpec::Upload { request, file }, observer)
        })
        .await
    }

    /// Handles of the tasks currently in flight.
    pub async fn pending_tasks(&self) -> Vec<TaskHandle> {
        self.loader.pending_tasks().await
    }

    /// Cancel everything in flight and invalidate the transport.
    pub fn invalidate_and_cancel(&self) {
        debug!("invalidating transport");
        self.loader.transport().invalidate_and_cancel();
    }

    fn prepare<T>(&self, request: &Request<T>) -> Result<TransportRequest> {
        let url = make_url(self.config.base_url.as_ref(), request.url(), request.query_items())?;
        let body = request.get_body().map(|body| body.encode()).transpose()?;

        let mut headers = request.headers().clone();
        apply_default_headers(&mut headers, &self.config.additional_headers, body.is_some());

        Ok(TransportRequest {
            method: request.get_method(),
            url,
            headers,
            body,
        })
    }

    async fn perform<V, F>(&self, request: TransportRequest, options: &TaskOptions, start: F) -> Result<Response<V>>
    where
        F: Fn(&Loader, TransportRequest, Option<Arc<dyn TaskObserver>>) -> PendingTask<V> + Sync,
    {
        perform_with_retries(self.delegate.as_ref(), |attempt| {
            self.attempt(attempt, &request, options, &start)
        })
        .await
    }

    async fn attempt<V, F>(
        &self,
        attempt: u32,
        request: &TransportRequest,
        options: &TaskOptions,
        start: &F,
    ) -> std::result::Result<Response<V>, Attempt>
    where
        F: Fn(&Loader, TransportRequest, Option<Arc<dyn TaskObserver>>) -> PendingTask<V> + Sync,
    {
        let mut request = request.clone();
        self.delegate
            .will_send_request(&mut request)
            .await
            .map_err(Attempt::Other)?;

        let pending = start(&self.loader, request, options.observer.clone());
        let task = pending.task();
        trace!(task = %task, attempt, "attempt started");

        let cancel = options.cancellation.as_ref();
        let response = pending.wait(cancel).await.map_err(|error| {
            // The caller asked to stop; a policy does not get to restart it.
            if cancel.is_some_and(|token| token.is_cancelled()) {
                Attempt::Other(error)
            } else {
                Attempt::task(task, error)
            }
        })?;

        self.delegate
            .validate_response(&response.response, &response.data)
            .await
            .map_err(|error| Attempt::task(task, error))?;
        Ok(response)
    }
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn decode<T: DeserializeOwned>(data: &Bytes) -> Result<T> {
    serde_json::from_slice(data).map_err(Error::Decode)
}

fn text(data: &Bytes) -> Result<String> {
    std::str::from_utf8(data).map(str::to_owned).map_err(Error::Text)
}
