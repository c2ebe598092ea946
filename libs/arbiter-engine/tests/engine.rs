mod common;

use std::sync::Arc;
use std::time::Duration;

use arbiter_common::{CaseStatus, Verdict};
use arbiter_engine::backend::BackendStatus;
use arbiter_engine::store::{SolvedStore, SubmissionStore};
use arbiter_engine::{EngineError, RejectReason};

use common::{manager, problem, test_config, FakeBackend, Plan};

const HIDDEN_INPUT: &str = "hidden-input-quartz";
const HIDDEN_OUTPUT: &str = "HIDDEN-INPUT-QUARTZ";

fn upper_problem() -> arbiter_common::Problem {
    problem(
        "upper",
        &[("abc", "ABC"), ("xyz", "XYZ")],
        &[(HIDDEN_INPUT, HIDDEN_OUTPUT)],
    )
}

fn correct_backend() -> FakeBackend {
    FakeBackend::new()
        .plan("abc", Plan::answer("ABC\n"))
        .plan("xyz", Plan::answer("XYZ"))
        .plan(HIDDEN_INPUT, Plan::answer(HIDDEN_OUTPUT))
}

#[tokio::test]
async fn test_submit_all_cases_pass() {
    let backend = Arc::new(correct_backend());
    let (manager, _store) = manager(vec![upper_problem()], backend.clone(), &test_config());

    let outcome = manager.submit("alice", "upper", "cpp", "code").await.unwrap();
    let response = outcome.to_response();

    assert!(response.accepted);
    assert_eq!(response.passed_test_cases, 3);
    assert_eq!(response.total_test_cases, 3);
    assert!(response.error.is_none());
    assert_eq!(backend.submits(), 3);
}

#[tokio::test]
async fn test_submit_hidden_failure_reveals_nothing() {
    let backend = Arc::new(correct_backend().plan(HIDDEN_INPUT, Plan::answer("wrong")));
    let (manager, _store) = manager(vec![upper_problem()], backend, &test_config());

    let outcome = manager.submit("alice", "upper", "java", "code").await.unwrap();
    let response = outcome.to_response();

    assert!(!response.accepted);
    assert_eq!(response.passed_test_cases, 2);
    assert_eq!(response.total_test_cases, 3);
    assert_eq!(response.error, Some(CaseStatus::WrongAnswer));

    let json = serde_json::to_string(&response).unwrap();
    assert!(!json.contains(HIDDEN_INPUT));
    assert!(!json.contains(HIDDEN_OUTPUT));
}

#[tokio::test]
async fn test_run_never_executes_hidden_cases() {
    let backend = Arc::new(correct_backend());
    let (manager, store) = manager(vec![upper_problem()], backend.clone(), &test_config());

    let outcome = manager.run("alice", "upper", "javascript", "code").await.unwrap();
    let response = outcome.to_response();

    assert!(response.success);
    assert_eq!(response.test_cases.len(), 2);
    assert_eq!(response.test_cases[0].stdin, "abc");
    assert_eq!(response.test_cases[0].stdout.as_deref(), Some("ABC\n"));
    assert_eq!(backend.submits(), 2);

    let json = serde_json::to_string(&response).unwrap();
    assert!(!json.contains(HIDDEN_INPUT));
    assert!(!json.contains(HIDDEN_OUTPUT));

    // Run is disposable: no history, no solved record
    assert!(store.history("alice", "upper").await.unwrap().is_empty());
    assert!(store.solved("alice").await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_backend_hang_fails_as_internal_error() {
    let backend = Arc::new(correct_backend().plan(HIDDEN_INPUT, Plan::Hang));
    let config = test_config();
    let (manager, store) = manager(vec![upper_problem()], backend, &config);

    let started = tokio::time::Instant::now();
    let err = manager.submit("alice", "upper", "cpp", "code").await.unwrap_err();

    assert!(matches!(err, EngineError::Internal { retryable: true, .. }));
    assert!(started.elapsed() <= Duration::from_millis(config.watchdog_timeout_ms + 500));

    let history = store.history("alice", "upper").await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].state.as_str(), "failed");
    assert_eq!(history[0].verdict, Some(Verdict::Failed(CaseStatus::InternalError)));
    assert!(store.solved("alice").await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_infrastructure_failure_never_reads_as_wrong_answer() {
    // Case 0 is wrong, case 2 hangs: the submission still fails as infrastructure
    let backend = Arc::new(
        correct_backend()
            .plan("abc", Plan::answer("nope"))
            .plan(HIDDEN_INPUT, Plan::Hang),
    );
    let (manager, store) = manager(vec![upper_problem()], backend, &test_config());

    let err = manager.submit("alice", "upper", "cpp", "code").await.unwrap_err();

    assert!(matches!(err, EngineError::Internal { .. }));
    let history = store.history("alice", "upper").await.unwrap();
    assert_eq!(history[0].verdict, Some(Verdict::Failed(CaseStatus::InternalError)));
}

#[tokio::test(start_paused = true)]
async fn test_whole_submission_retry_recovers() {
    let backend = Arc::new(correct_backend().plan(HIDDEN_INPUT, Plan::InternalThen(HIDDEN_OUTPUT.to_string())));
    let mut config = test_config();
    config.submission_retries = 1;
    let (manager, store) = manager(vec![upper_problem()], backend.clone(), &config);

    let outcome = manager.submit("alice", "upper", "cpp", "code").await.unwrap();

    assert!(outcome.aggregate.is_accepted());
    assert_eq!(backend.submits(), 6);
    let record = store.get(&outcome.submission_id).await.unwrap().unwrap();
    assert_eq!(record.state.as_str(), "persisted");
}

#[tokio::test(start_paused = true)]
async fn test_without_retries_sandbox_internal_error_fails() {
    let backend = Arc::new(correct_backend().plan(HIDDEN_INPUT, Plan::InternalThen(HIDDEN_OUTPUT.to_string())));
    let (manager, _store) = manager(vec![upper_problem()], backend.clone(), &test_config());

    let err = manager.submit("alice", "upper", "cpp", "code").await.unwrap_err();

    assert!(matches!(err, EngineError::Internal { .. }));
    assert_eq!(backend.submits(), 3);
}

#[tokio::test]
async fn test_dispatch_rejection_aborts_submission() {
    let backend = Arc::new(correct_backend().plan("xyz", Plan::RejectSubmit));
    let (manager, store) = manager(vec![upper_problem()], backend, &test_config());

    let err = manager.submit("alice", "upper", "cpp", "code").await.unwrap_err();

    assert!(matches!(err, EngineError::Dispatch(_)));
    let history = store.history("alice", "upper").await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].state.as_str(), "aborted");
    assert!(history[0].verdict.is_none());
}

#[tokio::test]
async fn test_rate_limit_boundary() {
    let backend = Arc::new(correct_backend());
    let mut config = test_config();
    config.rate_limit_per_window = 3;
    let (manager, store) = manager(vec![upper_problem()], backend.clone(), &config);

    for _ in 0..3 {
        manager.submit("alice", "upper", "cpp", "code").await.unwrap();
    }
    let calls_before = backend.submits();

    let err = manager.submit("alice", "upper", "cpp", "code").await.unwrap_err();

    assert!(matches!(
        err,
        EngineError::RateLimited { reason: RejectReason::UserRateLimited, .. }
    ));
    assert_eq!(backend.submits(), calls_before);
    assert_eq!(store.history("alice", "upper").await.unwrap().len(), 3);

    // Someone else still gets in
    assert!(manager.run("bob", "upper", "cpp", "code").await.is_ok());
}

#[tokio::test]
async fn test_unresolvable_requests_do_not_use_up_the_window() {
    let backend = Arc::new(correct_backend());
    let mut config = test_config();
    config.rate_limit_per_window = 2;
    let (manager, store) = manager(vec![upper_problem()], backend.clone(), &config);

    for _ in 0..5 {
        let err = manager.submit("alice", "upper", "python", "code").await.unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedLanguage { .. }));
        let err = manager.run("alice", "missing", "cpp", "code").await.unwrap_err();
        assert!(matches!(err, EngineError::ProblemNotFound(_)));
    }
    assert_eq!(manager.gate().in_flight(), 0);

    for _ in 0..2 {
        manager.submit("alice", "upper", "cpp", "code").await.unwrap();
    }
    let err = manager.submit("alice", "upper", "cpp", "code").await.unwrap_err();

    assert!(matches!(
        err,
        EngineError::RateLimited { reason: RejectReason::UserRateLimited, .. }
    ));
    assert_eq!(store.history("alice", "upper").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_concurrent_accepted_duplicates_solve_once() {
    let backend = Arc::new(correct_backend());
    let (manager, store) = manager(vec![upper_problem()], backend, &test_config());
    let manager = Arc::new(manager);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move {
            manager.submit("alice", "upper", "cpp", "code").await.unwrap()
        }));
    }

    let mut first_solves = 0;
    for handle in handles {
        let outcome = handle.await.unwrap();
        assert!(outcome.aggregate.is_accepted());
        if outcome.first_solve {
            first_solves += 1;
        }
    }

    assert_eq!(first_solves, 1);
    assert_eq!(store.solved("alice").await.unwrap(), vec!["upper".to_string()]);
    assert_eq!(store.history("alice", "upper").await.unwrap().len(), 8);
}

#[tokio::test(start_paused = true)]
async fn test_reported_error_ignores_completion_order() {
    let cases = [("c0", "C0"), ("c1", "C1"), ("c2", "C2"), ("c3", "C3")];
    let orders: [[usize; 4]; 4] = [[0, 1, 2, 3], [3, 2, 1, 0], [1, 3, 0, 2], [2, 0, 3, 1]];

    for delays in orders {
        let backend = Arc::new(
            FakeBackend::new()
                .plan("c0", Plan::Finish {
                    status: BackendStatus::Accepted,
                    stdout: "C0".to_string(),
                    after_polls: delays[0],
                })
                .plan("c1", Plan::status(BackendStatus::RuntimeError, delays[1]))
                .plan("c2", Plan::status(BackendStatus::TimeLimitExceeded, delays[2]))
                .plan("c3", Plan::status(BackendStatus::CompilationError, delays[3])),
        );
        let (manager, _store) = manager(vec![problem("p", &cases, &[])], backend, &test_config());

        let outcome = manager.run("alice", "p", "cpp", "code").await.unwrap();

        assert_eq!(outcome.aggregate.verdict, Verdict::Failed(CaseStatus::RuntimeError));
        assert_eq!(outcome.aggregate.passed, 1);
        assert_eq!(outcome.aggregate.total, 4);
    }
}

#[tokio::test]
async fn test_unsupported_language_makes_no_backend_call() {
    let backend = Arc::new(correct_backend());
    let (manager, _store) = manager(vec![upper_problem()], backend.clone(), &test_config());

    let err = manager.submit("alice", "upper", "python", "code").await.unwrap_err();

    assert!(matches!(err, EngineError::UnsupportedLanguage { .. }));
    assert_eq!(backend.submits(), 0);
}
