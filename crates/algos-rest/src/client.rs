//! Blocking HTTP client for an `algos-rest` server.
//!
//! Uses libcurl through the `curl` crate. Every call blocks the current
//! thread; call from `spawn_blocking` if used from async code.

use std::time::{Duration, Instant};

use algos_core::algorithm::AlgorithmDescriptor;
use algos_core::ledger::JobId;
use algos_core::spec::RawJobRequest;
use algos_core::ErrorKind;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::api::{HealthResponse, JobView, CALLER_HEADER};
use crate::error::ErrorBody;

const USER_AGENT: &str = concat!("algos-rest-client/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid base url {0:?} (expected http://host[:port])")]
    BaseUrl(String),
    #[error("encode request: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("transport: {0}")]
    Transport(#[from] curl::Error),
    #[error("HTTP {status} ({}): {message}", .kind.as_str())]
    Api {
        status: u32,
        kind: ErrorKind,
        message: String,
    },
    #[error("HTTP {status}: unreadable body: {source}")]
    Decode {
        status: u32,
        #[source]
        source: serde_json::Error,
    },
}

impl ClientError {
    /// Server-reported kind; transport and decode failures are `Internal`.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Api { kind, .. } => *kind,
            _ => ErrorKind::Internal,
        }
    }
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Client bound to one server base url, e.g. `http://127.0.0.1:8080`.
#[derive(Debug, Clone)]
pub struct RestClient {
    base: String,
    caller: Option<String>,
    timeout: Duration,
    poll_interval: Duration,
}

impl RestClient {
    pub fn new(base: impl Into<String>) -> ClientResult<Self> {
        let base = base.into().trim().trim_end_matches('/').to_string();
        let host = base
            .strip_prefix("http://")
            .or_else(|| base.strip_prefix("https://"));
        if host.map_or(true, |h| h.is_empty() || h.contains('/')) {
            return Err(ClientError::BaseUrl(base));
        }
        Ok(Self {
            base,
            caller: None,
            timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(100),
        })
    }

    /// Sent as the caller header on every request.
    pub fn with_caller(mut self, caller: impl Into<String>) -> Self {
        self.caller = Some(caller.into());
        self
    }

    /// Per-request transfer timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Delay between status requests in [`RestClient::wait`].
    pub fn with_poll_interval(mut self, every: Duration) -> Self {
        self.poll_interval = every;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    pub fn health(&self) -> ClientResult<HealthResponse> {
        self.call("GET", "/health", None)
    }

    pub fn algorithms(&self) -> ClientResult<Vec<AlgorithmDescriptor>> {
        self.call("GET", "/algorithms", None)
    }

    /// Submit a job. An idempotency key set on `request` travels in the body.
    pub fn submit(&self, request: &RawJobRequest) -> ClientResult<JobView> {
        let body = serde_json::to_vec(request).map_err(ClientError::Encode)?;
        self.call("POST", "/jobs", Some(&body))
    }

    pub fn status(&self, id: JobId) -> ClientResult<JobView> {
        self.call("GET", &format!("/jobs/{id}"), None)
    }

    pub fn cancel(&self, id: JobId) -> ClientResult<JobView> {
        self.call("DELETE", &format!("/jobs/{id}"), None)
    }

    pub fn list(&self, limit: usize) -> ClientResult<Vec<JobView>> {
        self.call("GET", &format!("/jobs?limit={limit}"), None)
    }

    /// Poll until the job is terminal or `deadline` passes; then the latest
    /// snapshot is returned as is.
    pub fn wait(&self, id: JobId, deadline: Option<Duration>) -> ClientResult<JobView> {
        let until = deadline.map(|d| Instant::now() + d);
        loop {
            let view = self.status(id)?;
            if view.state.is_terminal() || until.is_some_and(|t| Instant::now() >= t) {
                return Ok(view);
            }
            std::thread::sleep(self.poll_interval);
        }
    }

    /// Submit and wait for the outcome.
    pub fn run(&self, request: &RawJobRequest) -> ClientResult<JobView> {
        let job = self.submit(request)?;
        self.wait(job.id, None)
    }

    /// Run `requests` over up to `workers` threads, each taking one contiguous
    /// chunk in turn. Results come back in input order.
    pub fn run_batch(
        &self,
        requests: &[RawJobRequest],
        workers: usize,
    ) -> Vec<ClientResult<JobView>> {
        if requests.is_empty() {
            return Vec::new();
        }
        let chunk = requests.len().div_ceil(workers.max(1));
        tracing::debug!(jobs = requests.len(), chunk, "running batch");
        std::thread::scope(|s| {
            let handles: Vec<_> = requests
                .chunks(chunk)
                .map(|part| s.spawn(move || part.iter().map(|r| self.run(r)).collect::<Vec<_>>()))
                .collect();
            handles
                .into_iter()
                .flat_map(|h| match h.join() {
                    Ok(results) => results,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        })
    }

    fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        path: &str,
        body: Option<&[u8]>,
    ) -> ClientResult<T> {
        let (status, bytes) = self.send(method, path, body)?;
        decode(status, &bytes)
    }

    fn send(&self, method: &str, path: &str, body: Option<&[u8]>) -> ClientResult<(u32, Vec<u8>)> {
        let mut easy = curl::easy::Easy::new();
        easy.url(&format!("{}{}", self.base, path))?;
        easy.useragent(USER_AGENT)?;
        easy.connect_timeout(CONNECT_TIMEOUT)?;
        easy.timeout(self.timeout)?;

        let mut list = curl::easy::List::new();
        list.append("Accept: application/json")?;
        if let Some(caller) = &self.caller {
            list.append(&format!("{CALLER_HEADER}: {}", caller.trim()))?;
        }
        if let Some(body) = body {
            list.append("Content-Type: application/json")?;
            easy.post(true)?;
            easy.post_fields_copy(body)?;
        }
        easy.custom_request(method)?;
        easy.http_headers(list)?;

        let mut out = Vec::new();
        {
            let mut transfer = easy.transfer();
            transfer.write_function(|data| {
                out.extend_from_slice(data);
                Ok(data.len())
            })?;
            transfer.perform()?;
        }
        let status = easy.response_code()?;
        tracing::trace!(method, path, status, "request done");
        Ok((status, out))
    }
}

fn decode<T: DeserializeOwned>(status: u32, body: &[u8]) -> ClientResult<T> {
    if (200..300).contains(&status) {
        return serde_json::from_slice(body).map_err(|source| ClientError::Decode { status, source });
    }
    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(err) => Err(ClientError::Api {
            status,
            kind: err.error.kind,
            message: err.error.message,
        }),
        Err(source) => Err(ClientError::Decode { status, source }),
    }
}
