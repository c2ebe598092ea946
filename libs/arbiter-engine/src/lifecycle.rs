//! Submission Lifecycle Manager
//!
//! **State machine:**
//! ```text
//! Created → Admitted → Dispatching → Polling → Aggregating → Persisted
//!              │            │           │  ↑
//!              └──── Aborted┘           │  └ Retry → Dispatching
//!                                       └→ Failed
//! ```
//! Transitions are an exhaustive match; anything not listed is an
//! `IllegalTransition` error, so no state is ever re-entered after a terminal one.
//!
//! **Responsibilities:**
//! - Admission, language resolution and case selection for one evaluation;
//!   an admission whose problem or language fails to resolve is refunded
//! - Whole-submission retry when polling ends in retryable infrastructure errors
//! - Persisting submit-mode records exactly once
//! - The "first accepted solve" side effect, idempotent under concurrency
//!
//! Each evaluation owns its record; nothing here is shared between submissions
//! except the stores, the gate and the backend clients.

use std::sync::Arc;

use arbiter_common::types::{RunResponse, SubmissionSummary, SubmitResponse};
use arbiter_common::{CaseStatus, Config, Mode, Problem, Verdict, Visibility};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::admission::{Admission, AdmissionGate, AdmissionPermit};
use crate::aggregator::{aggregate, Aggregate};
use crate::backend::ExecutionBackend;
use crate::dispatcher::{select_cases, Dispatcher, Limits};
use crate::error::EngineError;
use crate::language::{LanguageRegistry, ResolvedLanguage};
use crate::poller::{PollPolicy, Poller};
use crate::store::{MemoryStore, ProblemStore, RedisStore, SolvedStore, SubmissionStore};
use crate::submission::{CaseSpec, SubmissionRecord, TestCaseResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionState {
    Created,
    Admitted,
    Dispatching,
    Polling,
    Aggregating,
    Persisted,
    Aborted,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Admit,
    StartDispatch,
    Dispatched,
    /// Polling ended in retryable infrastructure errors; dispatch again
    Retry,
    JobsTerminal,
    Persist,
    DispatchFailed,
    PollFailed,
}

impl LifecycleEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleEvent::Admit => "admit",
            LifecycleEvent::StartDispatch => "start_dispatch",
            LifecycleEvent::Dispatched => "dispatched",
            LifecycleEvent::Retry => "retry",
            LifecycleEvent::JobsTerminal => "jobs_terminal",
            LifecycleEvent::Persist => "persist",
            LifecycleEvent::DispatchFailed => "dispatch_failed",
            LifecycleEvent::PollFailed => "poll_failed",
        }
    }
}

impl SubmissionState {
    pub fn next(self, event: LifecycleEvent) -> Result<SubmissionState, EngineError> {
        use LifecycleEvent as E;
        use SubmissionState as S;

        match (self, event) {
            (S::Created, E::Admit) => Ok(S::Admitted),
            (S::Admitted, E::StartDispatch) => Ok(S::Dispatching),
            (S::Admitted, E::DispatchFailed) => Ok(S::Aborted),
            (S::Dispatching, E::Dispatched) => Ok(S::Polling),
            (S::Dispatching, E::DispatchFailed) => Ok(S::Aborted),
            (S::Polling, E::JobsTerminal) => Ok(S::Aggregating),
            (S::Polling, E::Retry) => Ok(S::Dispatching),
            (S::Polling, E::PollFailed) => Ok(S::Failed),
            (S::Aggregating, E::Persist) => Ok(S::Persisted),
            (from, event) => Err(EngineError::IllegalTransition {
                from: from.as_str(),
                event: event.as_str(),
            }),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SubmissionState::Persisted | SubmissionState::Aborted | SubmissionState::Failed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionState::Created => "created",
            SubmissionState::Admitted => "admitted",
            SubmissionState::Dispatching => "dispatching",
            SubmissionState::Polling => "polling",
            SubmissionState::Aggregating => "aggregating",
            SubmissionState::Persisted => "persisted",
            SubmissionState::Aborted => "aborted",
            SubmissionState::Failed => "failed",
        }
    }
}

/// The three collaborator stores the manager talks to
#[derive(Clone)]
pub struct Stores {
    pub problems: Arc<dyn ProblemStore>,
    pub submissions: Arc<dyn SubmissionStore>,
    pub solved: Arc<dyn SolvedStore>,
}

impl Stores {
    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            problems: store.clone(),
            submissions: store.clone(),
            solved: store,
        }
    }

    pub fn redis(store: RedisStore) -> Self {
        let store = Arc::new(store);
        Self {
            problems: store.clone(),
            submissions: store.clone(),
            solved: store,
        }
    }
}

/// Result of a `run`: every case here is visible
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub aggregate: Aggregate,
    pub results: Vec<TestCaseResult>,
}

impl RunOutcome {
    pub fn to_response(&self) -> RunResponse {
        RunResponse {
            success: self.aggregate.is_accepted(),
            test_cases: self
                .results
                .iter()
                .filter(|r| r.visibility == Visibility::Visible)
                .map(TestCaseResult::to_run_view)
                .collect(),
            runtime: self.aggregate.runtime_secs,
            memory: self.aggregate.memory_kb,
            error: self.aggregate.verdict.error_class(),
        }
    }
}

/// Result of a `submit`: counts and metrics only
#[derive(Debug, Clone, Copy)]
pub struct SubmitOutcome {
    pub submission_id: Uuid,
    pub aggregate: Aggregate,
    pub first_solve: bool,
}

impl SubmitOutcome {
    pub fn to_response(&self) -> SubmitResponse {
        SubmitResponse {
            submission_id: self.submission_id,
            accepted: self.aggregate.is_accepted(),
            passed_test_cases: self.aggregate.passed,
            total_test_cases: self.aggregate.total,
            runtime: self.aggregate.runtime_secs,
            memory: self.aggregate.memory_kb,
            error: self.aggregate.verdict.error_class(),
            first_solve: self.first_solve,
        }
    }
}

pub struct SubmissionManager {
    languages: LanguageRegistry,
    stores: Stores,
    gate: Arc<AdmissionGate>,
    dispatcher: Dispatcher,
    poller: Poller,
    submission_retries: u8,
}

impl SubmissionManager {
    pub fn new(
        languages: LanguageRegistry,
        stores: Stores,
        backend: Arc<dyn ExecutionBackend>,
        config: &Config,
    ) -> Self {
        let policy = PollPolicy::from(config);
        Self {
            languages,
            stores,
            gate: Arc::new(AdmissionGate::from_config(config)),
            dispatcher: Dispatcher::new(backend.clone(), config.max_dispatch_attempts, policy.backoff),
            poller: Poller::new(backend, policy),
            submission_retries: config.submission_retries,
        }
    }

    pub fn gate(&self) -> &Arc<AdmissionGate> {
        &self.gate
    }

    pub fn languages(&self) -> &LanguageRegistry {
        &self.languages
    }

    /// Evaluate `code` against the visible cases only; nothing is persisted
    pub async fn run(
        &self,
        user_id: &str,
        problem_id: &str,
        language: &str,
        code: &str,
    ) -> Result<RunOutcome, EngineError> {
        let permit = self.admit(user_id).await?;
        let (problem, resolved, _permit) = self.prepare(user_id, problem_id, language, permit).await?;

        let mut record = SubmissionRecord::new(user_id, problem_id, &resolved.language, code, Mode::Run);
        record.apply(LifecycleEvent::Admit)?;

        let cases = select_cases(&problem, Mode::Run);
        let results = self.execute(&mut record, &problem, &resolved, code, cases).await?;
        let aggregate = aggregate(&results);
        record.record_aggregate(&aggregate);
        record.apply(LifecycleEvent::Persist)?;

        info!(
            audit = true,
            mode = "run",
            user_id,
            problem_id,
            language = %resolved.language,
            verdict = aggregate.verdict.label(),
            passed = aggregate.passed,
            total = aggregate.total,
            "Run evaluated"
        );

        Ok(RunOutcome { aggregate, results })
    }

    /// Evaluate `code` against visible and hidden cases and persist the outcome
    pub async fn submit(
        &self,
        user_id: &str,
        problem_id: &str,
        language: &str,
        code: &str,
    ) -> Result<SubmitOutcome, EngineError> {
        let permit = self.admit(user_id).await?;
        let (problem, resolved, _permit) = self.prepare(user_id, problem_id, language, permit).await?;

        let mut record = SubmissionRecord::new(user_id, problem_id, &resolved.language, code, Mode::Submit);
        record.apply(LifecycleEvent::Admit)?;
        self.stores.submissions.create(&record).await?;
        info!(submission_id = %record.id, user_id, problem_id, language = %resolved.language, "Submission admitted");

        let cases = select_cases(&problem, Mode::Submit);
        let results = match self.execute(&mut record, &problem, &resolved, code, cases).await {
            Ok(results) => results,
            Err(err) => {
                if record.is_terminal() {
                    self.finalize(&record).await?;
                }
                return Err(err);
            }
        };

        let aggregate = aggregate(&results);
        record.record_aggregate(&aggregate);
        record.apply(LifecycleEvent::Persist)?;
        self.finalize(&record).await?;

        let first_solve = if aggregate.is_accepted() {
            self.stores.solved.mark_solved(user_id, problem_id).await?
        } else {
            false
        };

        info!(
            submission_id = %record.id,
            verdict = aggregate.verdict.label(),
            passed = aggregate.passed,
            total = aggregate.total,
            first_solve,
            "Submission persisted"
        );

        Ok(SubmitOutcome {
            submission_id: record.id,
            aggregate,
            first_solve,
        })
    }

    /// The caller's submit-mode records for one problem, newest first
    pub async fn history(&self, user_id: &str, problem_id: &str) -> Result<Vec<SubmissionSummary>, EngineError> {
        let records = self.stores.submissions.history(user_id, problem_id).await?;
        Ok(records.iter().map(SubmissionRecord::summary).collect())
    }

    pub async fn solved(&self, user_id: &str) -> Result<Vec<String>, EngineError> {
        Ok(self.stores.solved.solved(user_id).await?)
    }

    async fn admit(&self, user_id: &str) -> Result<AdmissionPermit, EngineError> {
        match self.gate.admit(user_id).await {
            Admission::Allow(permit) => Ok(permit),
            Admission::Reject { retry_after, reason } => {
                info!(user_id, reason = reason.as_str(), "Evaluation rejected at admission");
                Err(EngineError::RateLimited { retry_after, reason })
            }
        }
    }

    /// Load the problem and resolve the language
    ///
    /// A request that fails here never reaches the backend, so its admission
    /// is refunded and does not count against the user's window.
    async fn prepare(
        &self,
        user_id: &str,
        problem_id: &str,
        language: &str,
        permit: AdmissionPermit,
    ) -> Result<(Problem, ResolvedLanguage, AdmissionPermit), EngineError> {
        let resolved = async {
            let problem = self
                .stores
                .problems
                .get_problem(problem_id)
                .await?
                .ok_or_else(|| EngineError::ProblemNotFound(problem_id.to_string()))?;
            let resolved = self.languages.resolve(language, &problem)?;
            Ok::<_, EngineError>((problem, resolved))
        }
        .await;

        match resolved {
            Ok((problem, resolved)) => Ok((problem, resolved, permit)),
            Err(err) => {
                self.gate.refund(user_id, permit).await;
                Err(err)
            }
        }
    }

    /// Dispatch, poll and retry until every case is terminal
    ///
    /// On error `record` has already been moved to `Aborted` or `Failed`.
    async fn execute(
        &self,
        record: &mut SubmissionRecord,
        problem: &Problem,
        resolved: &ResolvedLanguage,
        code: &str,
        cases: Vec<CaseSpec>,
    ) -> Result<Vec<TestCaseResult>, EngineError> {
        let limits = Limits::from(problem);
        let mut retries_left = self.submission_retries;
        record.apply(LifecycleEvent::StartDispatch)?;

        loop {
            let jobs = match self
                .dispatcher
                .dispatch(code, resolved.runtime_id, &cases, limits)
                .await
            {
                Ok(jobs) => jobs,
                Err(err) => {
                    warn!(submission_id = %record.id, error = %err, "Dispatch failed, aborting");
                    record.error = Some(err.to_string());
                    record.apply(LifecycleEvent::DispatchFailed)?;
                    return Err(err);
                }
            };
            record.apply(LifecycleEvent::Dispatched)?;

            let results = self.poller.await_all(jobs).await;
            let infra: Vec<&TestCaseResult> = results
                .iter()
                .filter(|r| r.status == CaseStatus::InternalError)
                .collect();

            let Some(first) = infra.first() else {
                record.apply(LifecycleEvent::JobsTerminal)?;
                return Ok(results);
            };

            let retryable = infra.iter().all(|r| r.retryable);
            let message = first
                .diagnostics
                .clone()
                .unwrap_or_else(|| "execution backend failure".to_string());

            if retryable && retries_left > 0 {
                retries_left -= 1;
                warn!(
                    submission_id = %record.id,
                    failed_cases = infra.len(),
                    retries_left,
                    "Retrying submission after infrastructure failure"
                );
                record.apply(LifecycleEvent::Retry)?;
                continue;
            }

            // Never let an infrastructure failure read as a code verdict
            record.record_aggregate(&aggregate(&results));
            record.verdict = Some(Verdict::Failed(CaseStatus::InternalError));
            record.error = Some(message.clone());
            record.apply(LifecycleEvent::PollFailed)?;
            warn!(submission_id = %record.id, error = %message, "Submission failed");
            return Err(EngineError::Internal { message, retryable });
        }
    }

    async fn finalize(&self, record: &SubmissionRecord) -> Result<(), EngineError> {
        if !self.stores.submissions.finalize(record).await? {
            warn!(submission_id = %record.id, "Submission already terminal, finalize skipped");
        }
        Ok(())
    }
}
