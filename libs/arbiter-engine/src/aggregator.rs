//! Verdict Aggregator
//!
//! Pure function: terminal case results → one submission verdict plus metrics.
//! The result depends only on the set of results, never on the order in which
//! they completed.

use arbiter_common::{CaseStatus, Verdict};

use crate::submission::TestCaseResult;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aggregate {
    pub verdict: Verdict,
    /// Slowest case, seconds
    pub runtime_secs: f64,
    /// Hungriest case, KB
    pub memory_kb: u64,
    pub passed: usize,
    pub total: usize,
}

impl Aggregate {
    pub fn is_accepted(&self) -> bool {
        self.verdict.is_accepted()
    }
}

/// Combine per-case results
///
/// `Accepted` iff every case passed. Otherwise the verdict carries the status
/// of the lowest-index case that did not pass. A case still pending or running
/// counts as an internal error.
pub fn aggregate(results: &[TestCaseResult]) -> Aggregate {
    let runtime_secs = results
        .iter()
        .map(|r| r.runtime_secs)
        .fold(0.0_f64, f64::max);
    let memory_kb = results.iter().map(|r| r.memory_kb).max().unwrap_or(0);
    let passed = results
        .iter()
        .filter(|r| r.status == CaseStatus::Passed)
        .count();

    let first_failure = results
        .iter()
        .filter(|r| r.status != CaseStatus::Passed)
        .min_by_key(|r| r.index);

    let verdict = match first_failure {
        None if !results.is_empty() => Verdict::Accepted,
        None => Verdict::Failed(CaseStatus::InternalError),
        Some(r) if r.status.is_terminal() => Verdict::Failed(r.status),
        Some(_) => Verdict::Failed(CaseStatus::InternalError),
    };

    Aggregate {
        verdict,
        runtime_secs,
        memory_kb,
        passed,
        total: results.len(),
    }
}
