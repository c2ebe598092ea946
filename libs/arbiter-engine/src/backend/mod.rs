//! Execution Backend - Abstraction over the external sandbox
//!
//! **Core Responsibility:**
//! Hand source code and stdin to a sandboxed execution service and report
//! what it observed.
//!
//! **Architectural Boundary:**
//! - Backend knows HOW to talk to a sandbox (Judge0 HTTP, local echo, ...)
//! - Backend does NOT compare outputs
//! - Backend does NOT decide verdicts
//! - Backend returns raw status and output for the Poller to classify

pub mod echo;
pub mod judge0;

use async_trait::async_trait;

use crate::error::BackendError;

pub use echo::EchoBackend;
pub use judge0::Judge0Backend;

/// One execution as sent to the sandbox
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRequest {
    pub source_code: String,
    pub runtime_id: u32,
    pub stdin: String,
    pub time_limit_secs: Option<f64>,
    pub memory_limit_kb: Option<u64>,
}

/// Backend-assigned handle used for polling
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobToken(pub String);

impl std::fmt::Display for JobToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Backend-neutral execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendStatus {
    Queued,
    Processing,
    /// The program ran to completion (the sandbox may or may not have compared output).
    Accepted,
    WrongAnswer,
    TimeLimitExceeded,
    MemoryLimitExceeded,
    CompilationError,
    RuntimeError,
    InternalError,
}

impl BackendStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, BackendStatus::Queued | BackendStatus::Processing)
    }
}

/// Snapshot returned by one status poll
#[derive(Debug, Clone, PartialEq)]
pub struct PollResponse {
    pub status: BackendStatus,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub compile_output: Option<String>,
    pub runtime_secs: f64,
    pub memory_kb: u64,
}

impl PollResponse {
    /// A not-yet-finished snapshot with no output
    pub fn pending(status: BackendStatus) -> Self {
        Self {
            status,
            stdout: None,
            stderr: None,
            compile_output: None,
            runtime_secs: 0.0,
            memory_kb: 0,
        }
    }
}

/// External execution service
///
/// Any implementation must guarantee:
/// 1. `submit` returns quickly with a token, without waiting for execution
/// 2. `poll` is side-effect free and may be called any number of times
/// 3. 4xx-style refusals surface as `BackendError::Rejected`
/// 4. Network and 5xx failures surface as transient errors
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    async fn submit(&self, request: &ExecutionRequest) -> Result<JobToken, BackendError>;

    async fn poll(&self, token: &JobToken) -> Result<PollResponse, BackendError>;
}
