use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::{header, Client, Response, StatusCode};
use serde::{Deserialize, Serialize};

use super::{BackendStatus, ExecutionBackend, ExecutionRequest, JobToken, PollResponse};
use crate::error::BackendError;

const POLL_FIELDS: &str = "token,stdout,stderr,compile_output,message,status,time,memory";

/// Connection settings for a Judge0-compatible service
#[derive(Debug, Clone)]
pub struct Judge0Config {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Set when going through RapidAPI; selects the `X-RapidAPI-*` header pair.
    pub api_host: Option<String>,
    pub timeout: Duration,
}

impl From<&arbiter_common::Config> for Judge0Config {
    fn from(config: &arbiter_common::Config) -> Self {
        Self {
            base_url: config.execution_api_url.clone(),
            api_key: config.execution_api_key.clone(),
            api_host: config.execution_api_host.clone(),
            timeout: Duration::from_millis(config.execution_http_timeout_ms),
        }
    }
}

/// HTTP client for Judge0 (`/submissions` create + poll API)
///
/// Source, stdin and stdout travel base64-encoded so arbitrary bytes survive
/// the JSON round trip.
#[derive(Debug, Clone)]
pub struct Judge0Backend {
    client: Client,
    base_url: String,
}

#[derive(Serialize)]
struct CreateSubmission {
    source_code: String,
    language_id: u32,
    stdin: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    cpu_time_limit: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    memory_limit: Option<u64>,
}

#[derive(Deserialize)]
struct CreatedSubmission {
    token: String,
}

#[derive(Deserialize)]
struct Judge0Status {
    id: u32,
    #[serde(default)]
    description: String,
}

#[derive(Deserialize)]
struct SubmissionSnapshot {
    stdout: Option<String>,
    stderr: Option<String>,
    compile_output: Option<String>,
    status: Judge0Status,
    time: Option<String>,
    memory: Option<u64>,
}

fn default_headers(config: &Judge0Config) -> Result<header::HeaderMap, BackendError> {
    let mut headers = header::HeaderMap::new();
    headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));

    let value = |v: &str| {
        header::HeaderValue::from_str(v)
            .map_err(|e| BackendError::Malformed(format!("invalid credential header: {}", e)))
    };

    match (&config.api_key, &config.api_host) {
        (Some(key), Some(host)) => {
            headers.insert("x-rapidapi-key", value(key)?);
            headers.insert("x-rapidapi-host", value(host)?);
        }
        (Some(key), None) => {
            headers.insert("x-auth-token", value(key)?);
        }
        _ => {}
    }
    Ok(headers)
}

impl Judge0Backend {
    pub fn new(config: Judge0Config) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(default_headers(&config)?)
            .build()
            .map_err(|e| BackendError::Unavailable(format!("failed to build http client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url,
        })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Split non-2xx answers into final refusals and transient failures
async fn check_status(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_default();
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Err(BackendError::Unavailable(format!("{}: {}", status, message)))
    } else {
        Err(BackendError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

fn encode(text: &str) -> String {
    general_purpose::STANDARD.encode(text.as_bytes())
}

/// Judge0 wraps its base64 output at 60 columns
fn decode(field: Option<String>) -> Result<Option<String>, BackendError> {
    let Some(raw) = field else {
        return Ok(None);
    };
    let compact: String = raw.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| BackendError::Malformed(format!("invalid base64 field: {}", e)))?;
    Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
}

/// Judge0 status ids
/// 1 In Queue, 2 Processing, 3 Accepted, 4 Wrong Answer, 5 Time Limit Exceeded,
/// 6 Compilation Error, 7-12 Runtime Error (SIGSEGV, SIGXFSZ, SIGFPE, SIGABRT, NZEC, Other),
/// 13 Internal Error, 14 Exec Format Error
pub fn map_status(id: u32, description: &str) -> BackendStatus {
    match id {
        1 => BackendStatus::Queued,
        2 => BackendStatus::Processing,
        3 => BackendStatus::Accepted,
        4 => BackendStatus::WrongAnswer,
        5 => BackendStatus::TimeLimitExceeded,
        6 => BackendStatus::CompilationError,
        7..=12 if description.to_ascii_lowercase().contains("memory") => {
            BackendStatus::MemoryLimitExceeded
        }
        7..=12 | 14 => BackendStatus::RuntimeError,
        _ => BackendStatus::InternalError,
    }
}

#[async_trait]
impl ExecutionBackend for Judge0Backend {
    async fn submit(&self, request: &ExecutionRequest) -> Result<JobToken, BackendError> {
        let body = CreateSubmission {
            source_code: encode(&request.source_code),
            language_id: request.runtime_id,
            stdin: encode(&request.stdin),
            cpu_time_limit: request.time_limit_secs,
            memory_limit: request.memory_limit_kb,
        };

        let response = self
            .client
            .post(self.url("/submissions"))
            .query(&[("base64_encoded", "true"), ("wait", "false")])
            .json(&body)
            .send()
            .await?;

        let created: CreatedSubmission = check_status(response).await?.json().await?;
        Ok(JobToken(created.token))
    }

    async fn poll(&self, token: &JobToken) -> Result<PollResponse, BackendError> {
        let response = self
            .client
            .get(self.url(&format!("/submissions/{}", token.0)))
            .query(&[("base64_encoded", "true"), ("fields", POLL_FIELDS)])
            .send()
            .await?;

        let snapshot: SubmissionSnapshot = check_status(response).await?.json().await?;

        let runtime_secs = snapshot
            .time
            .as_deref()
            .and_then(|t| t.parse::<f64>().ok())
            .unwrap_or(0.0);

        Ok(PollResponse {
            status: map_status(snapshot.status.id, &snapshot.status.description),
            stdout: decode(snapshot.stdout)?,
            stderr: decode(snapshot.stderr)?,
            compile_output: decode(snapshot.compile_output)?,
            runtime_secs,
            memory_kb: snapshot.memory.unwrap_or(0),
        })
    }
}
