use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use super::{BackendStatus, ExecutionBackend, ExecutionRequest, JobToken, PollResponse};
use crate::error::BackendError;

/// Echo execution backend for local development
///
/// **Echo Rules:**
/// 1. Source code is ignored
/// 2. stdout = stdin
/// 3. Every job is finished by the first poll
/// 4. Fixed runtime (5ms) and memory (1024 KB)
///
/// Lets the whole pipeline run without a sandbox: a problem whose expected
/// output equals its input is accepted, anything else is a wrong answer.
#[derive(Debug, Default)]
pub struct EchoBackend {
    jobs: Mutex<HashMap<String, String>>,
}

impl EchoBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExecutionBackend for EchoBackend {
    async fn submit(&self, request: &ExecutionRequest) -> Result<JobToken, BackendError> {
        let token = Uuid::new_v4().to_string();
        self.jobs
            .lock()
            .map_err(|_| BackendError::Unavailable("echo backend poisoned".to_string()))?
            .insert(token.clone(), request.stdin.clone());
        Ok(JobToken(token))
    }

    async fn poll(&self, token: &JobToken) -> Result<PollResponse, BackendError> {
        let stdin = self
            .jobs
            .lock()
            .map_err(|_| BackendError::Unavailable("echo backend poisoned".to_string()))?
            .remove(&token.0)
            .ok_or_else(|| BackendError::Rejected {
                status: 404,
                message: format!("unknown token {}", token),
            })?;

        Ok(PollResponse {
            status: BackendStatus::Accepted,
            stdout: Some(stdin),
            stderr: None,
            compile_output: None,
            runtime_secs: 0.005,
            memory_kb: 1024,
        })
    }
}
