use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Evaluation mode
/// `run` executes visible cases only and is never stored as history.
/// `submit` executes visible + hidden cases and is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Run,
    Submit,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Run => write!(f, "run"),
            Mode::Submit => write!(f, "submit"),
        }
    }
}

/// Whether a test case's content may be shown to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Test Case Definition (Immutable Input)
/// Owned by the problem store; the engine only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub input: String,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// Starter code for one language, keyed by the language's display name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartCode {
    pub language: String,
    pub initial_code: String,
}

/// Problem as served by the problem store
///
/// Exactly three languages are normally configured through `start_code`,
/// but nothing here depends on which three.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub visible_test_cases: Vec<TestCase>,
    #[serde(default)]
    pub hidden_test_cases: Vec<TestCase>,
    #[serde(default)]
    pub start_code: Vec<StartCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_limit_secs: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_limit_kb: Option<u64>,
}

impl Problem {
    /// Template slot for a language display name (case-insensitive)
    pub fn template_for(&self, display_name: &str) -> Option<&StartCode> {
        self.start_code
            .iter()
            .find(|sc| sc.language.eq_ignore_ascii_case(display_name))
    }
}

/// Per-case execution status
///
/// `Pending` and `Running` are the only non-terminal values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Pending,
    Running,
    Passed,
    WrongAnswer,
    CompileError,
    RuntimeError,
    TimeLimitExceeded,
    MemoryLimitExceeded,
    InternalError,
}

impl CaseStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CaseStatus::Pending | CaseStatus::Running)
    }

    /// Failures that come from the code itself rather than from the infrastructure
    pub fn is_code_failure(&self) -> bool {
        matches!(
            self,
            CaseStatus::WrongAnswer
                | CaseStatus::CompileError
                | CaseStatus::RuntimeError
                | CaseStatus::TimeLimitExceeded
                | CaseStatus::MemoryLimitExceeded
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CaseStatus::Pending => "pending",
            CaseStatus::Running => "running",
            CaseStatus::Passed => "passed",
            CaseStatus::WrongAnswer => "wrong_answer",
            CaseStatus::CompileError => "compile_error",
            CaseStatus::RuntimeError => "runtime_error",
            CaseStatus::TimeLimitExceeded => "time_limit_exceeded",
            CaseStatus::MemoryLimitExceeded => "memory_limit_exceeded",
            CaseStatus::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Submission-level outcome
///
/// `Failed` carries the status of the lowest-index case that did not pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Accepted,
    Failed(CaseStatus),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }

    pub fn error_class(&self) -> Option<CaseStatus> {
        match self {
            Verdict::Accepted => None,
            Verdict::Failed(status) => Some(*status),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Accepted => "accepted",
            Verdict::Failed(status) => status.as_str(),
        }
    }
}

/// Body of `POST /submission/run/:problem_id` and `POST /submission/submit/:problem_id`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluateRequest {
    pub language: String,
    pub code: String,
}

/// One visible case as reported by `run`
///
/// Case fields keep snake_case keys (`expected_output`), which is what run-page
/// clients read, while the envelope around them is camelCase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunCaseView {
    pub index: usize,
    pub stdin: String,
    pub expected_output: String,
    pub stdout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<String>,
    pub status: CaseStatus,
    pub runtime: f64,
    pub memory: u64,
}

/// Response of `run`
///
/// Only visible cases are ever executed in run mode, so every entry here is
/// safe to show in full.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResponse {
    pub success: bool,
    pub test_cases: Vec<RunCaseView>,
    pub runtime: f64,
    pub memory: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<CaseStatus>,
}

/// Response of `submit`
///
/// Deliberately carries no per-case content: hidden cases only surface as counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub submission_id: Uuid,
    pub accepted: bool,
    pub passed_test_cases: usize,
    pub total_test_cases: usize,
    pub runtime: f64,
    pub memory: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<CaseStatus>,
    #[serde(default)]
    pub first_solve: bool,
}

/// One entry of the submission history listing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionSummary {
    pub id: Uuid,
    pub problem_id: String,
    pub language: String,
    pub state: String,
    pub verdict: Option<Verdict>,
    pub passed_test_cases: usize,
    pub total_test_cases: usize,
    pub runtime: f64,
    pub memory: u64,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}
