//! Batch Dispatcher
//!
//! Turns (code, runtime, cases) into one backend job per test case. One job
//! per case keeps failures isolated: a crash in case 3 never has to be
//! untangled from a combined batch response.
//!
//! A refusal from the backend fails the whole dispatch. What a job does once
//! it runs is not the dispatcher's concern.

use std::sync::Arc;

use arbiter_common::{Mode, Problem, Visibility};
use futures_util::future::try_join_all;
use tracing::{debug, warn};

use crate::backend::{ExecutionBackend, ExecutionRequest, JobToken};
use crate::error::{BackendError, EngineError};
use crate::retry::Backoff;
use crate::submission::CaseSpec;

/// Sandbox resource limits forwarded with every job
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Limits {
    pub time_limit_secs: Option<f64>,
    pub memory_limit_kb: Option<u64>,
}

impl From<&Problem> for Limits {
    fn from(problem: &Problem) -> Self {
        Self {
            time_limit_secs: problem.time_limit_secs,
            memory_limit_kb: problem.memory_limit_kb,
        }
    }
}

/// Correlates one case with the backend token used to poll it
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionJob {
    pub case: CaseSpec,
    pub token: JobToken,
}

/// Select the cases a mode executes
///
/// `Run` only ever sees visible cases, so hidden content never enters that
/// path. Indices are assigned visible-first.
pub fn select_cases(problem: &Problem, mode: Mode) -> Vec<CaseSpec> {
    let visible = problem
        .visible_test_cases
        .iter()
        .map(|tc| (Visibility::Visible, tc));
    let hidden = problem
        .hidden_test_cases
        .iter()
        .map(|tc| (Visibility::Hidden, tc));

    let hidden_taken = match mode {
        Mode::Run => 0,
        Mode::Submit => problem.hidden_test_cases.len(),
    };

    visible
        .chain(hidden.take(hidden_taken))
        .enumerate()
        .map(|(index, (visibility, tc))| CaseSpec {
            index,
            visibility,
            input: tc.input.clone(),
            expected_output: tc.output.clone(),
        })
        .collect()
}

#[derive(Clone)]
pub struct Dispatcher {
    backend: Arc<dyn ExecutionBackend>,
    max_attempts: u32,
    backoff: Backoff,
}

impl Dispatcher {
    pub fn new(backend: Arc<dyn ExecutionBackend>, max_attempts: u8, backoff: Backoff) -> Self {
        Self {
            backend,
            max_attempts: u32::from(max_attempts.max(1)),
            backoff,
        }
    }

    /// Submit every case concurrently
    ///
    /// Fails with `EngineError::Dispatch` if any case cannot be submitted.
    /// Jobs that were already accepted by then are abandoned, not cancelled.
    pub async fn dispatch(
        &self,
        code: &str,
        runtime_id: u32,
        cases: &[CaseSpec],
        limits: Limits,
    ) -> Result<Vec<ExecutionJob>, EngineError> {
        if cases.is_empty() {
            return Err(EngineError::Dispatch("no test cases to execute".to_string()));
        }

        let submissions = cases.iter().map(|case| {
            let request = ExecutionRequest {
                source_code: code.to_string(),
                runtime_id,
                stdin: case.input.clone(),
                time_limit_secs: limits.time_limit_secs,
                memory_limit_kb: limits.memory_limit_kb,
            };
            async move {
                let token = self.submit_with_retry(&request, case.index).await?;
                Ok::<_, BackendError>(ExecutionJob {
                    case: case.clone(),
                    token,
                })
            }
        });

        try_join_all(submissions)
            .await
            .map_err(|e| EngineError::Dispatch(e.to_string()))
    }

    async fn submit_with_retry(
        &self,
        request: &ExecutionRequest,
        case_index: usize,
    ) -> Result<JobToken, BackendError> {
        let mut attempt = 1;
        loop {
            match self.backend.submit(request).await {
                Ok(token) => {
                    debug!(case = case_index, token = %token, "Job dispatched");
                    return Ok(token);
                }
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    let delay = self.backoff.delay(attempt);
                    warn!(
                        case = case_index,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Dispatch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
