use arbiter_common::types::{RunCaseView, SubmissionSummary};
use arbiter_common::{CaseStatus, Mode, Verdict, Visibility};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregator::Aggregate;
use crate::error::EngineError;
use crate::lifecycle::{LifecycleEvent, SubmissionState};

/// A test case selected for execution, tagged with its position and visibility
///
/// Indices are assigned visible-first, so hidden cases always sort after
/// every visible case.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseSpec {
    pub index: usize,
    pub visibility: Visibility,
    pub input: String,
    pub expected_output: String,
}

/// Outcome of one executed case
#[derive(Debug, Clone, PartialEq)]
pub struct TestCaseResult {
    pub index: usize,
    pub visibility: Visibility,
    pub input: String,
    pub expected_output: String,
    /// Absent while the case is pending or running
    pub actual_output: Option<String>,
    /// Compiler or runtime diagnostics reported by the sandbox
    pub diagnostics: Option<String>,
    pub status: CaseStatus,
    pub runtime_secs: f64,
    pub memory_kb: u64,
    /// Set on infrastructure failures that a fresh dispatch may cure
    pub retryable: bool,
}

impl TestCaseResult {
    pub fn pending(case: &CaseSpec) -> Self {
        Self {
            index: case.index,
            visibility: case.visibility,
            input: case.input.clone(),
            expected_output: case.expected_output.clone(),
            actual_output: None,
            diagnostics: None,
            status: CaseStatus::Pending,
            runtime_secs: 0.0,
            memory_kb: 0,
            retryable: false,
        }
    }

    pub fn internal_error(case: &CaseSpec, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            status: CaseStatus::InternalError,
            diagnostics: Some(message.into()),
            retryable,
            ..Self::pending(case)
        }
    }

    /// Full view for run responses; callers must only use it on visible cases
    pub fn to_run_view(&self) -> RunCaseView {
        RunCaseView {
            index: self.index,
            stdin: self.input.clone(),
            expected_output: self.expected_output.clone(),
            stdout: self.actual_output.clone(),
            diagnostics: self.diagnostics.clone(),
            status: self.status,
            runtime: self.runtime_secs,
            memory: self.memory_kb,
        }
    }
}

/// Durable record of one submit-mode evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub id: Uuid,
    pub user_id: String,
    pub problem_id: String,
    pub language: String,
    pub source_code: String,
    pub mode: Mode,
    pub state: SubmissionState,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub verdict: Option<Verdict>,
    pub runtime_secs: f64,
    pub memory_kb: u64,
    pub passed_test_cases: usize,
    pub total_test_cases: usize,
    /// Infrastructure failure detail for aborted/failed submissions
    pub error: Option<String>,
}

impl SubmissionRecord {
    pub fn new(user_id: &str, problem_id: &str, language: &str, source_code: &str, mode: Mode) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            problem_id: problem_id.to_string(),
            language: language.to_string(),
            source_code: source_code.to_string(),
            mode,
            state: SubmissionState::Created,
            created_at: Utc::now(),
            finished_at: None,
            verdict: None,
            runtime_secs: 0.0,
            memory_kb: 0,
            passed_test_cases: 0,
            total_test_cases: 0,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Advance the state machine; stamps `finished_at` on entering a terminal state
    pub fn apply(&mut self, event: LifecycleEvent) -> Result<(), EngineError> {
        self.state = self.state.next(event)?;
        if self.state.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    pub fn record_aggregate(&mut self, aggregate: &Aggregate) {
        self.verdict = Some(aggregate.verdict);
        self.runtime_secs = aggregate.runtime_secs;
        self.memory_kb = aggregate.memory_kb;
        self.passed_test_cases = aggregate.passed;
        self.total_test_cases = aggregate.total;
    }

    pub fn summary(&self) -> SubmissionSummary {
        SubmissionSummary {
            id: self.id,
            problem_id: self.problem_id.clone(),
            language: self.language.clone(),
            state: self.state.as_str().to_string(),
            verdict: self.verdict,
            passed_test_cases: self.passed_test_cases,
            total_test_cases: self.total_test_cases,
            runtime: self.runtime_secs,
            memory: self.memory_kb,
            created_at: self.created_at,
            finished_at: self.finished_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbiter_common::{Problem, TestCase};

    fn case(input: &str, output: &str) -> TestCase {
        TestCase {
            input: input.to_string(),
            output: output.to_string(),
            explanation: None,
        }
    }

    fn problem() -> Problem {
        Problem {
            id: "sum".to_string(),
            title: "Sum".to_string(),
            visible_test_cases: vec![case("1 2", "3"), case("2 2", "4")],
            hidden_test_cases: vec![case("40 2", "42")],
            start_code: vec![],
            time_limit_secs: None,
            memory_limit_kb: None,
        }
    }

    #[test]
    fn test_pending_result_has_no_output() {
        let tc = &problem().visible_test_cases[0];
        let spec = CaseSpec {
            index: 0,
            visibility: Visibility::Visible,
            input: tc.input.clone(),
            expected_output: tc.output.clone(),
        };
        let result = TestCaseResult::pending(&spec);

        assert_eq!(result.status, CaseStatus::Pending);
        assert!(result.actual_output.is_none());
    }

    #[test]
    fn test_record_stamps_finish_time_on_terminal_state() {
        let mut record = SubmissionRecord::new("u1", "sum", "cpp", "int main(){}", Mode::Submit);
        record.apply(LifecycleEvent::Admit).unwrap();
        assert!(record.finished_at.is_none());

        record.apply(LifecycleEvent::DispatchFailed).unwrap();

        assert_eq!(record.state, SubmissionState::Aborted);
        assert!(record.finished_at.is_some());
        assert!(record.is_terminal());
    }

    #[test]
    fn test_summary_has_no_source() {
        let record = SubmissionRecord::new("u1", "sum", "cpp", "secret source", Mode::Submit);
        let json = serde_json::to_string(&record.summary()).unwrap();

        assert!(!json.contains("secret source"));
        assert!(json.contains("\"state\":\"created\""));
    }
}
