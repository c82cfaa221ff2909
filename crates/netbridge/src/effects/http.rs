use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bytes::Bytes;
use chrono::Utc;
use futures_util::StreamExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use url::Url;

use crate::core::{is_redirect, redirect_method};
use crate::data::{
    AuthChallenge, ChallengeDisposition, Credential, Headers, HttpResponse, Method,
    RedirectDisposition, ResponseDisposition, TaskHandle, TaskMetrics, TaskSpec, TransportRequest,
};
use crate::effects::transport::{EventSink, Transport, TransportEvent};
use crate::error::{Result, TransportError, TransportErrorKind};

/// Static configuration of a [`ReqwestTransport`].
#[derive(Debug, Clone)]
pub struct ReqwestOptions {
    /// Where in-progress downloads are written. Each transport works in
    /// its own subdirectory of it.
    pub scratch_dir:   PathBuf,
    pub max_redirects: u32,
    pub user_agent:    Option<String>,
}

impl Default for ReqwestOptions {
    fn default() -> Self {
        Self {
            scratch_dir:   std::env::temp_dir().join("netbridge").join("Transfers"),
            max_redirects: 10,
            user_agent:    Some(concat!("netbridge/", env!("CARGO_PKG_VERSION")).to_string()),
        }
    }
}

impl ReqwestOptions {
    #[must_use]
    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    #[must_use]
    pub fn max_redirects(mut self, max: u32) -> Self {
        self.max_redirects = max;
        self
    }

    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

/// [`Transport`] over `reqwest`.
///
/// Each resumed task runs on its own Tokio task. Redirects are followed
/// here rather than by `reqwest`, one hop at a time, so that every hop is
/// offered to the redirection disposition.
#[derive(Clone)]
pub struct ReqwestTransport {
    shared: Arc<Shared>,
}

/// Tells apart the scratch subdirectories of transports in one process.
static NEXT_TRANSPORT: AtomicU64 = AtomicU64::new(0);

struct Shared {
    client:      reqwest::Client,
    options:     ReqwestOptions,
    scratch_dir: PathBuf,
    sink:        Mutex<Option<EventSink>>,
    next_id:     AtomicU64,
    tasks:       Mutex<HashMap<TaskHandle, TaskEntry>>,
    invalidated: AtomicBool,
}

struct TaskEntry {
    /// `Some` until the task is resumed.
    spec:   Option<TaskSpec>,
    cancel: CancellationToken,
}

impl ReqwestTransport {
    pub fn new(options: ReqwestOptions) -> Result<Self> {
        let mut builder = reqwest::Client::builder().redirect(reqwest::redirect::Policy::none());
        if let Some(user_agent) = &options.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        let client = builder.build().map_err(|e| {
            TransportError::new(TransportErrorKind::Unsupported, format!("failed to build HTTP client: {e}"))
        })?;
        Ok(Self::with_client(client, options))
    }

    /// Use a preconfigured client. It must not follow redirects on its own.
    pub fn with_client(client: reqwest::Client, options: ReqwestOptions) -> Self {
        let serial = NEXT_TRANSPORT.fetch_add(1, Ordering::Relaxed);
        let scratch_dir = options
            .scratch_dir
            .join(format!("{}-{serial}", std::process::id()));
        Self {
            shared: Arc::new(Shared {
                client,
                options,
                scratch_dir,
                sink: Mutex::new(None),
                next_id: AtomicU64::new(0),
                tasks: Mutex::new(HashMap::new()),
                invalidated: AtomicBool::new(false),
            }),
        }
    }

    /// Directory this transport writes in-progress downloads to.
    pub fn scratch_dir(&self) -> &Path {
        &self.shared.scratch_dir
    }

    fn sink(&self) -> Option<EventSink> {
        self.shared.sink.lock().clone()
    }
}

impl Transport for ReqwestTransport {
    fn attach(&self, sink: EventSink) {
        *self.shared.sink.lock() = Some(sink);
    }

    fn create_task(&self, spec: TaskSpec) -> TaskHandle {
        let task = TaskHandle::new(self.shared.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.shared.tasks.lock().insert(task, TaskEntry {
            spec:   Some(spec),
            cancel: CancellationToken::new(),
        });
        trace!(task = %task, "created task");
        task
    }

    fn resume(&self, task: TaskHandle) {
        let Some(sink) = self.sink() else {
            warn!(task = %task, "resume before the transport was attached");
            return;
        };

        let started = {
            let mut tasks = self.shared.tasks.lock();
            tasks
                .get_mut(&task)
                .and_then(|entry| entry.spec.take().map(|spec| (spec, entry.cancel.clone())))
        };
        let Some((spec, cancel)) = started else {
            trace!(task = %task, "resume of a task that is unknown or already running");
            return;
        };

        if self.shared.invalidated.load(Ordering::Acquire) {
            self.shared.tasks.lock().remove(&task);
            sink.emit(TransportEvent::Completed {
                task,
                response: None,
                error: Some(TransportError::cancelled()),
            });
            return;
        }

        let run = TaskRun::new(task, &self.shared, sink);
        let shared = self.shared.clone();
        tokio::spawn(async move {
            run.run(spec, cancel).await;
            shared.tasks.lock().remove(&task);
        });
    }

    fn cancel(&self, task: TaskHandle) {
        let suspended = {
            let mut tasks = self.shared.tasks.lock();
            let Some(entry) = tasks.get(&task) else {
                trace!(task = %task, "cancel of a finished task");
                return;
            };
            entry.cancel.cancel();
            let suspended = entry.spec.is_some();
            if suspended {
                tasks.remove(&task);
            }
            suspended
        };

        debug!(task = %task, suspended, "cancelled task");
        if suspended {
            if let Some(sink) = self.sink() {
                sink.emit(TransportEvent::Completed {
                    task,
                    response: None,
                    error: Some(TransportError::cancelled()),
                });
            }
        }
    }

    fn invalidate_and_cancel(&self) {
        self.shared.invalidated.store(true, Ordering::Release);
        let suspended: Vec<TaskHandle> = {
            let mut tasks = self.shared.tasks.lock();
            tasks.values().for_each(|entry| entry.cancel.cancel());
            let suspended: Vec<_> = tasks
                .iter()
                .filter(|(_, entry)| entry.spec.is_some())
                .map(|(task, _)| *task)
                .collect();
            for task in &suspended {
                tasks.remove(task);
            }
            suspended
        };

        let Some(sink) = self.sink() else {
            return;
        };
        for task in suspended {
            sink.emit(TransportEvent::Completed {
                task,
                response: None,
                error: Some(TransportError::cancelled()),
            });
        }
        sink.emit(TransportEvent::SessionInvalidated { error: None });
    }
}

/// What a failed download leaves behind to continue from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Checkpoint {
    method:  Method,
    url:     Url,
    headers: Headers,
    partial: PathBuf,
    offset:  u64,
}

impl Checkpoint {
    fn decode(data: &[u8]) -> std::result::Result<Self, TransportError> {
        serde_json::from_slice(data).map_err(|e| {
            TransportError::new(TransportErrorKind::Unsupported, format!("unreadable resume data: {e}"))
        })
    }

    fn encode(&self) -> Option<Bytes> {
        serde_json::to_vec(self).ok().map(Bytes::from)
    }

    fn request(&self) -> TransportRequest {
        TransportRequest {
            method:  self.method,
            url:     self.url.clone(),
            headers: self.headers.clone(),
            body:    None,
        }
    }
}

/// One running task.
struct TaskRun {
    task:          TaskHandle,
    client:        reqwest::Client,
    sink:          EventSink,
    scratch_dir:   PathBuf,
    transient:     PathBuf,
    max_redirects: u32,
    metrics:       TaskMetrics,
}

type Step<T> = std::result::Result<T, TransportError>;

impl TaskRun {
    fn new(task: TaskHandle, shared: &Shared, sink: EventSink) -> Self {
        let scratch_dir = shared.scratch_dir.clone();
        Self {
            task,
            client: shared.client.clone(),
            sink,
            transient: scratch_dir.join(format!("{}.download", task.id())),
            scratch_dir,
            max_redirects: shared.options.max_redirects,
            metrics: TaskMetrics::new(Utc::now()),
        }
    }

    async fn run(mut self, spec: TaskSpec, cancel: CancellationToken) {
        let task = self.task;
        self.sink.emit(TransportEvent::TaskCreated { task });

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransportError::cancelled()),
            outcome = self.execute(spec) => outcome,
        };

        if outcome.as_ref().is_err_and(TransportError::is_cancelled) {
            self.discard_transient().await;
        }

        self.metrics.finished_at = Utc::now();
        self.sink.emit(TransportEvent::CollectedMetrics {
            task,
            metrics: self.metrics.clone(),
        });

        let (response, error) = match outcome {
            Ok(response) => (Some(response), None),
            Err(error) => (None, Some(error)),
        };
        debug!(
            task = %task,
            status = response.as_ref().map(|r| r.status),
            error = error.as_ref().map(tracing::field::display),
            "task finished"
        );
        self.sink.emit(TransportEvent::Completed { task, response, error });
    }

    async fn execute(&mut self, spec: TaskSpec) -> Step<HttpResponse> {
        match spec {
            TaskSpec::Data(request) => {
                let response = self.send(request).await?;
                self.receive_data(response).await
            }
            TaskSpec::Upload { mut request, file } => {
                let body = tokio::fs::read(&file)
                    .await
                    .map_err(|e| io_error(&file, "failed to read upload file", e))?;
                let total = body.len() as u64;
                request.body = Some(Bytes::from(body));

                let response = self.send(request).await?;
                self.sink.emit(TransportEvent::SentBodyData {
                    task:           self.task,
                    bytes_sent:     total,
                    total_sent:     total,
                    total_expected: Some(total),
                });
                self.receive_data(response).await
            }
            TaskSpec::Download(request) => {
                let response = self.send(request.clone()).await?;
                self.receive_file(request, response, None).await
            }
            TaskSpec::ResumeDownload(data) => {
                let checkpoint = Checkpoint::decode(&data)?;
                self.prepare_scratch().await?;
                tokio::fs::rename(&checkpoint.partial, &self.transient)
                    .await
                    .map_err(|e| io_error(&checkpoint.partial, "partial download is gone", e))?;

                let request = checkpoint.request();
                let ranged = request
                    .clone()
                    .with_header("Range", format!("bytes={}-", checkpoint.offset));
                let response = self.send(ranged).await?;

                // A server that ignores the range sends the whole body again.
                let offset = if response.status() == reqwest::StatusCode::PARTIAL_CONTENT {
                    checkpoint.offset
                } else {
                    0
                };
                self.receive_file(request, response, Some(offset)).await
            }
        }
    }

    /// Send `request`, taking redirects and authentication challenges
    /// through the event sink.
    async fn send(&mut self, request: TransportRequest) -> Step<reqwest::Response> {
        let mut request = request;
        let mut credential: Option<Credential> = None;
        let mut failures = 0;

        loop {
            self.metrics.bytes_sent += request.body.as_ref().map_or(0, |b| b.len() as u64);
            let built = build_request(&self.client, &request, credential.as_ref())?;
            let response = self.client.execute(built).await.map_err(map_error)?;
            if self.metrics.time_to_first_byte_ms.is_none() {
                let elapsed = Utc::now() - self.metrics.started_at;
                self.metrics.time_to_first_byte_ms = u64::try_from(elapsed.num_milliseconds()).ok();
            }

            let status = response.status().as_u16();
            if is_redirect(status) {
                match self.redirect(&request, &response).await? {
                    Some(next) => {
                        request = next;
                        continue;
                    }
                    None => return Ok(response),
                }
            }

            if status == 401 {
                if let Some(challenge) = challenge_for(&request, &response, failures) {
                    let task = self.task;
                    let disposition = self
                        .sink
                        .ask(|reply| TransportEvent::ReceivedChallenge {
                            task,
                            challenge,
                            reply,
                        })
                        .await
                        .unwrap_or_default();
                    match disposition {
                        ChallengeDisposition::UseCredential(next) => {
                            credential = Some(next);
                            failures += 1;
                            continue;
                        }
                        ChallengeDisposition::CancelChallenge => return Err(TransportError::cancelled()),
                        ChallengeDisposition::PerformDefaultHandling
                        | ChallengeDisposition::RejectProtectionSpace => {}
                    }
                }
            }
            return Ok(response);
        }
    }

    /// Offer a redirect to the observers. `None` stops at this response.
    async fn redirect(
        &mut self,
        request: &TransportRequest,
        response: &reqwest::Response,
    ) -> Step<Option<TransportRequest>> {
        let Some(location) = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|value| value.to_str().ok())
        else {
            return Ok(None);
        };
        if self.metrics.redirect_count >= self.max_redirects {
            return Err(TransportError::new(
                TransportErrorKind::BadServerResponse,
                format!("more than {} redirects", self.max_redirects),
            ));
        }

        let url = request.url.join(location).map_err(|e| {
            TransportError::new(
                TransportErrorKind::BadServerResponse,
                format!("invalid redirect location {location}: {e}"),
            )
        })?;
        let (method, keep_body) = redirect_method(response.status().as_u16(), request.method);
        let mut proposed = TransportRequest {
            method,
            url,
            headers: request.headers.clone(),
            body: if keep_body { request.body.clone() } else { None },
        };
        if !keep_body {
            proposed.headers.remove("Content-Type");
            proposed.headers.remove("Content-Length");
        }
        if proposed.url.origin() != request.url.origin() {
            proposed.headers.remove("Authorization");
        }

        let task = self.task;
        let http = http_response(response);
        let disposition = self
            .sink
            .ask(|reply| TransportEvent::WillPerformRedirection {
                task,
                response: http,
                request: proposed,
                reply,
            })
            .await;
        match disposition {
            Some(RedirectDisposition::Follow(next)) => {
                self.metrics.redirect_count += 1;
                trace!(task = %task, url = %next.url, "following redirect");
                Ok(Some(next))
            }
            Some(RedirectDisposition::Refuse) | None => Ok(None),
        }
    }

    async fn receive_data(&mut self, response: reqwest::Response) -> Step<HttpResponse> {
        let task = self.task;
        let http = http_response(&response);
        let disposition = self
            .sink
            .ask(|reply| TransportEvent::ReceivedResponse {
                task,
                response: http.clone(),
                reply,
            })
            .await
            .unwrap_or_default();
        if disposition == ResponseDisposition::Cancel {
            return Err(TransportError::cancelled());
        }

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_error)?;
            self.metrics.bytes_received += chunk.len() as u64;
            self.sink.emit(TransportEvent::ReceivedData { task, data: chunk });
        }
        Ok(http)
    }

    /// Stream a download into the transient file. `resume_from` is set when
    /// continuing a checkpoint; the file then already holds that many bytes.
    async fn receive_file(
        &mut self,
        request: TransportRequest,
        response: reqwest::Response,
        resume_from: Option<u64>,
    ) -> Step<HttpResponse> {
        let task = self.task;
        let http = http_response(&response);
        let offset = resume_from.unwrap_or(0);
        let total_expected = response.content_length().map(|len| len + offset);

        self.prepare_scratch().await?;
        let opened = if offset > 0 {
            OpenOptions::new().append(true).open(&self.transient).await
        } else {
            File::create(&self.transient).await
        };
        let mut file = opened.map_err(|e| io_error(&self.transient, "failed to open transient file", e))?;

        if resume_from.is_some() {
            self.sink.emit(TransportEvent::ResumedAtOffset {
                task,
                offset,
                total_expected,
            });
        }

        let mut written = offset;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    let _ = file.flush().await;
                    return Err(self.interrupted(map_error(e), &request, written));
                }
            };
            file.write_all(&chunk)
                .await
                .map_err(|e| io_error(&self.transient, "failed to write transient file", e))?;

            let len = chunk.len() as u64;
            written += len;
            self.metrics.bytes_received += len;
            self.sink.emit(TransportEvent::WroteData {
                task,
                bytes_written: len,
                total_written: written,
                total_expected,
            });
        }
        file.flush()
            .await
            .map_err(|e| io_error(&self.transient, "failed to write transient file", e))?;
        drop(file);

        let location = self.transient.clone();
        let _ = self
            .sink
            .ask(|reply| TransportEvent::FinishedDownloading { task, location, reply })
            .await;
        self.discard_transient().await;
        Ok(http)
    }

    /// Attach resume data to a download that failed midway.
    fn interrupted(&self, error: TransportError, request: &TransportRequest, written: u64) -> TransportError {
        if written == 0 {
            return error;
        }
        let checkpoint = Checkpoint {
            method:  request.method,
            url:     request.url.clone(),
            headers: request.headers.clone(),
            partial: self.transient.clone(),
            offset:  written,
        };
        match checkpoint.encode() {
            Some(data) => error.with_resume_data(data),
            None => error,
        }
    }

    async fn prepare_scratch(&self) -> Step<()> {
        tokio::fs::create_dir_all(&self.scratch_dir)
            .await
            .map_err(|e| io_error(&self.scratch_dir, "failed to create scratch directory", e))
    }

    async fn discard_transient(&self) {
        match tokio::fs::remove_file(&self.transient).await {
            Ok(()) => trace!(task = %self.task, "removed transient file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(task = %self.task, error = %e, "failed to remove transient file"),
        }
    }
}

fn build_request(
    client: &reqwest::Client,
    request: &TransportRequest,
    credential: Option<&Credential>,
) -> Step<reqwest::Request> {
    let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
        .map_err(|e| TransportError::new(TransportErrorKind::Unsupported, e.to_string()))?;
    let mut builder = client.request(method, request.url.clone());
    for (name, value) in request.headers.iter() {
        builder = builder.header(name, value);
    }
    if let Some(credential) = credential {
        builder = builder.basic_auth(&credential.user, Some(&credential.password));
    }
    if let Some(body) = &request.body {
        builder = builder.body(body.clone());
    }
    builder.build().map_err(map_error)
}

fn http_response(response: &reqwest::Response) -> HttpResponse {
    let mut http = HttpResponse::new(response.url().clone(), response.status().as_u16());
    for (name, value) in response.headers() {
        if let Ok(value) = value.to_str() {
            http.headers.insert(name.as_str(), value);
        }
    }
    http
}

fn challenge_for(
    request: &TransportRequest,
    response: &reqwest::Response,
    previous_failure_count: u32,
) -> Option<AuthChallenge> {
    let header = response
        .headers()
        .get(reqwest::header::WWW_AUTHENTICATE)?
        .to_str()
        .ok()?;
    let (scheme, realm) = parse_challenge(header);
    Some(AuthChallenge {
        scheme,
        realm,
        host: request.url.host_str().unwrap_or_default().to_string(),
        previous_failure_count,
        failure_response: (previous_failure_count > 0).then(|| http_response(response)),
    })
}

/// Split a `WWW-Authenticate` value into its scheme and realm.
fn parse_challenge(header: &str) -> (String, Option<String>) {
    let header = header.trim();
    let (scheme, params) = header.split_once(' ').unwrap_or((header, ""));
    let realm = params
        .split(',')
        .filter_map(|param| param.trim().strip_prefix("realm="))
        .map(|realm| realm.trim_matches('"').to_string())
        .next();
    (scheme.to_string(), realm)
}

fn map_error(e: reqwest::Error) -> TransportError {
    let kind = if e.is_timeout() {
        TransportErrorKind::TimedOut
    } else if e.is_connect() {
        TransportErrorKind::CannotConnect
    } else if e.is_body() || e.is_decode() {
        TransportErrorKind::NetworkConnectionLost
    } else if e.is_builder() {
        TransportErrorKind::Unsupported
    } else if e.is_redirect() {
        TransportErrorKind::BadServerResponse
    } else {
        TransportErrorKind::Unknown
    };
    TransportError::new(kind, e.to_string())
}

fn io_error(path: &Path, context: &str, e: io::Error) -> TransportError {
    TransportError::unknown(format!("{context} {}: {e}", path.display()))
}
