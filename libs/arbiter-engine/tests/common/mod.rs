#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use arbiter_common::types::StartCode;
use arbiter_common::{Config, Problem, TestCase};
use arbiter_engine::backend::{BackendStatus, ExecutionRequest, JobToken, PollResponse};
use arbiter_engine::{BackendError, ExecutionBackend, LanguageRegistry, MemoryStore, Stores, SubmissionManager};
use async_trait::async_trait;

/// How the fake sandbox treats every job whose stdin matches
#[derive(Debug, Clone)]
pub enum Plan {
    /// Finish with `status` and `stdout` once polled `after_polls` times
    Finish {
        status: BackendStatus,
        stdout: String,
        after_polls: usize,
    },
    /// Stay in Processing forever
    Hang,
    /// Refuse the submit call outright
    RejectSubmit,
    /// Report a sandbox internal error on the first dispatch, then answer `stdout`
    InternalThen(String),
}

impl Plan {
    pub fn answer(stdout: &str) -> Self {
        Plan::Finish {
            status: BackendStatus::Accepted,
            stdout: stdout.to_string(),
            after_polls: 0,
        }
    }

    pub fn status(status: BackendStatus, after_polls: usize) -> Self {
        Plan::Finish {
            status,
            stdout: String::new(),
            after_polls,
        }
    }
}

struct Job {
    stdin: String,
    attempt: usize,
    polls: usize,
}

/// Scripted in-process execution service; unscripted stdin is echoed back
#[derive(Default)]
pub struct FakeBackend {
    plans: Mutex<HashMap<String, Plan>>,
    jobs: Mutex<HashMap<String, Job>>,
    attempts: Mutex<HashMap<String, usize>>,
    pub submit_calls: AtomicUsize,
    next_token: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plan(self, stdin: &str, plan: Plan) -> Self {
        self.plans.lock().unwrap().insert(stdin.to_string(), plan);
        self
    }

    pub fn submits(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExecutionBackend for FakeBackend {
    async fn submit(&self, request: &ExecutionRequest) -> Result<JobToken, BackendError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(Plan::RejectSubmit) = self.plans.lock().unwrap().get(&request.stdin) {
            return Err(BackendError::Rejected {
                status: 422,
                message: "source_code is invalid".to_string(),
            });
        }

        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let counter = attempts.entry(request.stdin.clone()).or_insert(0);
            *counter += 1;
            *counter - 1
        };

        let token = format!("job-{}", self.next_token.fetch_add(1, Ordering::SeqCst));
        self.jobs.lock().unwrap().insert(
            token.clone(),
            Job {
                stdin: request.stdin.clone(),
                attempt,
                polls: 0,
            },
        );
        Ok(JobToken(token))
    }

    async fn poll(&self, token: &JobToken) -> Result<PollResponse, BackendError> {
        let (stdin, attempt, polls) = {
            let mut jobs = self.jobs.lock().unwrap();
            let job = jobs.get_mut(&token.0).ok_or_else(|| BackendError::Rejected {
                status: 404,
                message: "unknown token".to_string(),
            })?;
            job.polls += 1;
            (job.stdin.clone(), job.attempt, job.polls)
        };

        let plan = self
            .plans
            .lock()
            .unwrap()
            .get(&stdin)
            .cloned()
            .unwrap_or_else(|| Plan::answer(&stdin));

        let response = match plan {
            Plan::Finish {
                status,
                stdout,
                after_polls,
            } => {
                if polls <= after_polls {
                    PollResponse::pending(BackendStatus::Processing)
                } else {
                    finished(status, stdout)
                }
            }
            Plan::Hang => PollResponse::pending(BackendStatus::Processing),
            Plan::RejectSubmit => unreachable!("rejected jobs are never polled"),
            Plan::InternalThen(stdout) => {
                if attempt == 0 {
                    finished(BackendStatus::InternalError, String::new())
                } else {
                    finished(BackendStatus::Accepted, stdout)
                }
            }
        };
        Ok(response)
    }
}

fn finished(status: BackendStatus, stdout: String) -> PollResponse {
    PollResponse {
        status,
        stdout: Some(stdout),
        stderr: None,
        compile_output: None,
        runtime_secs: 0.01,
        memory_kb: 1024,
    }
}

fn case(input: &str, output: &str) -> TestCase {
    TestCase {
        input: input.to_string(),
        output: output.to_string(),
        explanation: None,
    }
}

pub fn problem(id: &str, visible: &[(&str, &str)], hidden: &[(&str, &str)]) -> Problem {
    Problem {
        id: id.to_string(),
        title: id.to_string(),
        visible_test_cases: visible.iter().map(|(i, o)| case(i, o)).collect(),
        hidden_test_cases: hidden.iter().map(|(i, o)| case(i, o)).collect(),
        start_code: ["C++", "Java", "JavaScript"]
            .iter()
            .map(|language| StartCode {
                language: language.to_string(),
                initial_code: String::new(),
            })
            .collect(),
        time_limit_secs: None,
        memory_limit_kb: None,
    }
}

/// Fast polling, generous admission
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.watchdog_timeout_ms = 2_000;
    config.poll_base_delay_ms = 10;
    config.poll_max_delay_ms = 100;
    config.max_poll_errors = 3;
    config.max_dispatch_attempts = 3;
    config.submission_retries = 0;
    config.rate_limit_per_window = 100;
    config.rate_limit_window_secs = 60;
    config.max_in_flight = 64;
    config
}

pub fn manager(
    problems: Vec<Problem>,
    backend: Arc<FakeBackend>,
    config: &Config,
) -> (SubmissionManager, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::with_problems(problems));
    let manager = SubmissionManager::new(
        LanguageRegistry::builtin(),
        Stores::memory(store.clone()),
        backend,
        config,
    );
    (manager, store)
}
