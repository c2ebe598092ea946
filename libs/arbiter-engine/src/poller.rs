//! Result Poller - Drives dispatched jobs to a terminal status
//!
//! **Per-job state machine:**
//! `Submitted → Polling → {Completed | TimedOut | PollError}`
//!
//! **Guarantees:**
//! - Every job ends in a terminal `TestCaseResult`, never an error
//! - A hanging backend is cut off by the engine-side watchdog, independent of
//!   any time limit the sandbox enforces itself
//! - Transient poll failures are retried with backoff; only exhaustion
//!   escalates to `InternalError`
//! - Infrastructure failures surface as `InternalError`, never as `WrongAnswer`
//!
//! **Output comparison:**
//! The engine makes its own pass/fail decision whenever the sandbox reports a
//! clean run. Outputs are compared after normalizing line endings, trailing
//! whitespace on each line and trailing blank lines.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use arbiter_common::{CaseStatus, Config};
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::backend::{BackendStatus, ExecutionBackend, PollResponse};
use crate::dispatcher::ExecutionJob;
use crate::error::BackendError;
use crate::retry::Backoff;
use crate::submission::{CaseSpec, TestCaseResult};

/// Polling schedule and ceilings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Hard per-case ceiling on waiting for a terminal status
    pub watchdog: Duration,
    pub backoff: Backoff,
    /// Consecutive transient poll failures tolerated before giving up
    pub max_poll_errors: u32,
}

impl From<&Config> for PollPolicy {
    fn from(config: &Config) -> Self {
        Self {
            watchdog: Duration::from_millis(config.watchdog_timeout_ms),
            backoff: Backoff::new(
                Duration::from_millis(config.poll_base_delay_ms),
                Duration::from_millis(config.poll_max_delay_ms),
            ),
            max_poll_errors: u32::from(config.max_poll_errors),
        }
    }
}

/// Where a job is in its polling life
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Submitted,
    Polling,
    Completed,
    TimedOut,
    PollError,
}

impl JobPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobPhase::Completed | JobPhase::TimedOut | JobPhase::PollError
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobPhase::Submitted => "submitted",
            JobPhase::Polling => "polling",
            JobPhase::Completed => "completed",
            JobPhase::TimedOut => "timed_out",
            JobPhase::PollError => "poll_error",
        }
    }
}

#[derive(Clone)]
pub struct Poller {
    backend: Arc<dyn ExecutionBackend>,
    policy: PollPolicy,
}

impl Poller {
    pub fn new(backend: Arc<dyn ExecutionBackend>, policy: PollPolicy) -> Self {
        Self { backend, policy }
    }

    /// Poll every job concurrently and return results ordered by case index
    ///
    /// Returns only once every job is terminal.
    pub async fn await_all(&self, jobs: Vec<ExecutionJob>) -> Vec<TestCaseResult> {
        let cases: BTreeMap<usize, CaseSpec> = jobs
            .iter()
            .map(|job| (job.case.index, job.case.clone()))
            .collect();

        let mut set = JoinSet::new();
        for job in jobs {
            let poller = self.clone();
            set.spawn(async move { poller.await_job(&job).await });
        }

        let mut finished: BTreeMap<usize, TestCaseResult> = BTreeMap::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(result) => {
                    finished.insert(result.index, result);
                }
                Err(e) => error!(error = %e, "Polling task died"),
            }
        }

        // A task that died leaves a hole; it still has to end terminal
        cases
            .into_iter()
            .map(|(index, case)| {
                finished.remove(&index).unwrap_or_else(|| {
                    TestCaseResult::internal_error(&case, "polling task aborted", true)
                })
            })
            .collect()
    }

    /// Drive one job to a terminal result
    pub async fn await_job(&self, job: &ExecutionJob) -> TestCaseResult {
        let polled = tokio::time::timeout(self.policy.watchdog, self.poll_until_finished(job)).await;

        let (phase, result) = match polled {
            Ok(Ok(response)) => (JobPhase::Completed, classify(&job.case, response)),
            Ok(Err(err)) => {
                let retryable = err.is_transient();
                (
                    JobPhase::PollError,
                    TestCaseResult::internal_error(
                        &job.case,
                        format!("status polling failed: {}", err),
                        retryable,
                    ),
                )
            }
            Err(_) => (
                JobPhase::TimedOut,
                TestCaseResult::internal_error(
                    &job.case,
                    format!(
                        "no terminal status within {}ms",
                        self.policy.watchdog.as_millis()
                    ),
                    true,
                ),
            ),
        };

        debug!(
            case = job.case.index,
            token = %job.token,
            phase = phase.as_str(),
            status = %result.status,
            "Job finished"
        );
        result
    }

    async fn poll_until_finished(&self, job: &ExecutionJob) -> Result<PollResponse, BackendError> {
        let mut phase = JobPhase::Submitted;
        let mut attempt: u32 = 0;
        let mut errors: u32 = 0;

        loop {
            attempt += 1;
            match self.backend.poll(&job.token).await {
                Ok(response) if response.status.is_finished() => return Ok(response),
                Ok(_) => {
                    errors = 0;
                    if phase == JobPhase::Submitted {
                        phase = JobPhase::Polling;
                        debug!(case = job.case.index, phase = phase.as_str(), "Job accepted by backend");
                    }
                }
                Err(err) => {
                    errors += 1;
                    if !err.is_transient() || errors > self.policy.max_poll_errors {
                        return Err(err);
                    }
                    warn!(
                        case = job.case.index,
                        attempt,
                        errors,
                        error = %err,
                        "Status poll failed, retrying"
                    );
                }
            }
            tokio::time::sleep(self.policy.backoff.delay(attempt)).await;
        }
    }
}

/// Map a backend snapshot to a case result
pub fn classify(case: &CaseSpec, response: PollResponse) -> TestCaseResult {
    let mut result = TestCaseResult::pending(case);
    result.runtime_secs = response.runtime_secs;
    result.memory_kb = response.memory_kb;

    let status = match response.status {
        BackendStatus::Queued => CaseStatus::Pending,
        BackendStatus::Processing => CaseStatus::Running,
        BackendStatus::Accepted | BackendStatus::WrongAnswer => {
            let stdout = response.stdout.as_deref().unwrap_or_default();
            if outputs_match(stdout, &case.expected_output) {
                CaseStatus::Passed
            } else {
                CaseStatus::WrongAnswer
            }
        }
        BackendStatus::TimeLimitExceeded => CaseStatus::TimeLimitExceeded,
        BackendStatus::MemoryLimitExceeded => CaseStatus::MemoryLimitExceeded,
        BackendStatus::CompilationError => CaseStatus::CompileError,
        BackendStatus::RuntimeError => CaseStatus::RuntimeError,
        BackendStatus::InternalError => {
            result.retryable = true;
            CaseStatus::InternalError
        }
    };

    result.status = status;
    if status.is_terminal() {
        result.actual_output = Some(response.stdout.unwrap_or_default());
        result.diagnostics = match status {
            CaseStatus::CompileError => response.compile_output.or(response.stderr),
            _ => response.stderr.filter(|s| !s.is_empty()),
        };
    }
    result
}

/// Canonical form used for comparison
pub fn normalize_output(output: &str) -> String {
    let unified = output.replace("\r\n", "\n");
    let mut lines: Vec<&str> = unified.lines().map(str::trim_end).collect();
    while lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

pub fn outputs_match(actual: &str, expected: &str) -> bool {
    normalize_output(actual) == normalize_output(expected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ExecutionRequest, JobToken};
    use arbiter_common::Visibility;
    use async_trait::async_trait;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replays a fixed script of poll answers per token; the last entry repeats
    struct ScriptedBackend {
        scripts: Mutex<HashMap<String, VecDeque<Result<PollResponse, BackendError>>>>,
        polls: AtomicUsize,
    }

    impl ScriptedBackend {
        fn new() -> Self {
            Self {
                scripts: Mutex::new(HashMap::new()),
                polls: AtomicUsize::new(0),
            }
        }

        fn script(self, token: &str, steps: Vec<Result<PollResponse, BackendError>>) -> Self {
            self.scripts
                .lock()
                .unwrap()
                .insert(token.to_string(), steps.into());
            self
        }
    }

    fn clone_step(step: &Result<PollResponse, BackendError>) -> Result<PollResponse, BackendError> {
        match step {
            Ok(r) => Ok(r.clone()),
            Err(BackendError::Rejected { status, message }) => Err(BackendError::Rejected {
                status: *status,
                message: message.clone(),
            }),
            Err(BackendError::Unavailable(m)) => Err(BackendError::Unavailable(m.clone())),
            Err(BackendError::Malformed(m)) => Err(BackendError::Malformed(m.clone())),
        }
    }

    #[async_trait]
    impl ExecutionBackend for ScriptedBackend {
        async fn submit(&self, _request: &ExecutionRequest) -> Result<JobToken, BackendError> {
            unreachable!("poller never submits")
        }

        async fn poll(&self, token: &JobToken) -> Result<PollResponse, BackendError> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            let mut scripts = self.scripts.lock().unwrap();
            let steps = scripts.get_mut(&token.0).expect("unscripted token");
            if steps.len() > 1 {
                steps.pop_front().unwrap()
            } else {
                clone_step(steps.front().unwrap())
            }
        }
    }

    fn finished(status: BackendStatus, stdout: &str) -> PollResponse {
        PollResponse {
            status,
            stdout: Some(stdout.to_string()),
            stderr: None,
            compile_output: None,
            runtime_secs: 0.25,
            memory_kb: 2048,
        }
    }

    fn case(index: usize, expected: &str) -> CaseSpec {
        CaseSpec {
            index,
            visibility: Visibility::Visible,
            input: format!("in{}", index),
            expected_output: expected.to_string(),
        }
    }

    fn job(index: usize, expected: &str, token: &str) -> ExecutionJob {
        ExecutionJob {
            case: case(index, expected),
            token: JobToken(token.to_string()),
        }
    }

    fn policy() -> PollPolicy {
        PollPolicy {
            watchdog: Duration::from_secs(5),
            backoff: Backoff::new(Duration::from_millis(100), Duration::from_millis(500)),
            max_poll_errors: 3,
        }
    }

    #[test]
    fn test_normalize_output() {
        assert_eq!(normalize_output("1 2 \r\n3\t\n\n\n"), "1 2\n3");
        assert_eq!(normalize_output(""), "");
        assert!(outputs_match("42\n", "42"));
        assert!(!outputs_match(" 42", "42"));
        assert!(!outputs_match("4 2", "42"));
    }

    #[test]
    fn test_classify_compares_output_itself() {
        let c = case(0, "3");

        let passed = classify(&c, finished(BackendStatus::Accepted, "3\n"));
        assert_eq!(passed.status, CaseStatus::Passed);
        assert_eq!(passed.actual_output.as_deref(), Some("3\n"));
        assert_eq!(passed.memory_kb, 2048);

        let wrong = classify(&c, finished(BackendStatus::Accepted, "4"));
        assert_eq!(wrong.status, CaseStatus::WrongAnswer);

        // Trust our comparison over the sandbox's when it ran cleanly
        let rescued = classify(&c, finished(BackendStatus::WrongAnswer, "3   \n"));
        assert_eq!(rescued.status, CaseStatus::Passed);
    }

    #[test]
    fn test_classify_maps_failures_directly() {
        let c = case(0, "3");

        let mut compile = finished(BackendStatus::CompilationError, "");
        compile.compile_output = Some("error: expected ';'".to_string());
        let result = classify(&c, compile);
        assert_eq!(result.status, CaseStatus::CompileError);
        assert_eq!(result.diagnostics.as_deref(), Some("error: expected ';'"));

        assert_eq!(
            classify(&c, finished(BackendStatus::TimeLimitExceeded, "3")).status,
            CaseStatus::TimeLimitExceeded
        );
        assert_eq!(
            classify(&c, finished(BackendStatus::MemoryLimitExceeded, "3")).status,
            CaseStatus::MemoryLimitExceeded
        );
        assert_eq!(
            classify(&c, finished(BackendStatus::RuntimeError, "3")).status,
            CaseStatus::RuntimeError
        );

        let internal = classify(&c, finished(BackendStatus::InternalError, ""));
        assert_eq!(internal.status, CaseStatus::InternalError);
        assert!(internal.retryable);
    }

    #[test]
    fn test_unfinished_snapshot_has_no_output() {
        let result = classify(&case(0, "3"), PollResponse::pending(BackendStatus::Processing));
        assert_eq!(result.status, CaseStatus::Running);
        assert!(result.actual_output.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_until_finished() {
        let backend = Arc::new(ScriptedBackend::new().script(
            "t0",
            vec![
                Ok(PollResponse::pending(BackendStatus::Queued)),
                Ok(PollResponse::pending(BackendStatus::Processing)),
                Ok(finished(BackendStatus::Accepted, "3")),
            ],
        ));
        let poller = Poller::new(backend.clone(), policy());

        let result = poller.await_job(&job(0, "3", "t0")).await;

        assert_eq!(result.status, CaseStatus::Passed);
        assert_eq!(backend.polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_turns_hang_into_internal_error() {
        let backend = Arc::new(
            ScriptedBackend::new().script("t0", vec![Ok(PollResponse::pending(BackendStatus::Processing))]),
        );
        let poller = Poller::new(backend, policy());

        let started = tokio::time::Instant::now();
        let result = poller.await_job(&job(0, "3", "t0")).await;

        assert_eq!(result.status, CaseStatus::InternalError);
        assert!(result.retryable);
        assert_ne!(result.status, CaseStatus::WrongAnswer);
        assert!(started.elapsed() <= Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_poll_errors_are_retried() {
        let backend = Arc::new(ScriptedBackend::new().script(
            "t0",
            vec![
                Err(BackendError::Unavailable("502".to_string())),
                Err(BackendError::Unavailable("502".to_string())),
                Ok(finished(BackendStatus::Accepted, "3")),
            ],
        ));
        let poller = Poller::new(backend, policy());

        let result = poller.await_job(&job(0, "3", "t0")).await;

        assert_eq!(result.status, CaseStatus::Passed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_poll_errors_escalate() {
        let backend = Arc::new(
            ScriptedBackend::new().script("t0", vec![Err(BackendError::Unavailable("503".to_string()))]),
        );
        let poller = Poller::new(backend.clone(), policy());

        let result = poller.await_job(&job(0, "3", "t0")).await;

        assert_eq!(result.status, CaseStatus::InternalError);
        assert!(result.retryable);
        // first attempt plus three retries
        assert_eq!(backend.polls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_poll_is_not_retried() {
        let backend = Arc::new(ScriptedBackend::new().script(
            "t0",
            vec![Err(BackendError::Rejected {
                status: 404,
                message: "unknown token".to_string(),
            })],
        ));
        let poller = Poller::new(backend.clone(), policy());

        let result = poller.await_job(&job(0, "3", "t0")).await;

        assert_eq!(result.status, CaseStatus::InternalError);
        assert!(!result.retryable);
        assert_eq!(backend.polls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_all_orders_by_index() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .script(
                    "slow",
                    vec![
                        Ok(PollResponse::pending(BackendStatus::Processing)),
                        Ok(PollResponse::pending(BackendStatus::Processing)),
                        Ok(finished(BackendStatus::Accepted, "a")),
                    ],
                )
                .script("fast", vec![Ok(finished(BackendStatus::Accepted, "x"))]),
        );
        let poller = Poller::new(backend, policy());

        let results = poller
            .await_all(vec![job(1, "b", "fast"), job(0, "a", "slow")])
            .await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].index, 0);
        assert_eq!(results[0].status, CaseStatus::Passed);
        assert_eq!(results[1].index, 1);
        assert_eq!(results[1].status, CaseStatus::WrongAnswer);
        assert!(results.iter().all(|r| r.status.is_terminal()));
    }
}
