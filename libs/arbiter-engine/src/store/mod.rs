//! Collaborator stores
//!
//! **Boundary:**
//! - `ProblemStore` is read-only from the engine's point of view; `put_problem`
//!   only exists for seeding
//! - `SubmissionStore::finalize` is a conditional write: a record that is
//!   already terminal is never overwritten
//! - `SolvedStore::mark_solved` is an atomic insert-if-absent, so concurrent
//!   accepted submissions from one user leave exactly one solved entry
//!
//! Two implementations: `MemoryStore` (tests, local development) and
//! `RedisStore` (deployments).

pub mod memory;
pub mod redis;

use arbiter_common::Problem;
use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreError;
use crate::submission::SubmissionRecord;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

#[async_trait]
pub trait ProblemStore: Send + Sync {
    async fn get_problem(&self, problem_id: &str) -> Result<Option<Problem>, StoreError>;

    async fn put_problem(&self, problem: &Problem) -> Result<(), StoreError>;
}

#[async_trait]
pub trait SubmissionStore: Send + Sync {
    /// Persist a freshly admitted record
    async fn create(&self, record: &SubmissionRecord) -> Result<(), StoreError>;

    /// Write the terminal record; returns `false` if a terminal record was already stored
    async fn finalize(&self, record: &SubmissionRecord) -> Result<bool, StoreError>;

    async fn get(&self, submission_id: &Uuid) -> Result<Option<SubmissionRecord>, StoreError>;

    /// A user's records for one problem, newest first
    async fn history(&self, user_id: &str, problem_id: &str) -> Result<Vec<SubmissionRecord>, StoreError>;
}

#[async_trait]
pub trait SolvedStore: Send + Sync {
    /// Returns `true` only for the call that actually inserted the pair
    async fn mark_solved(&self, user_id: &str, problem_id: &str) -> Result<bool, StoreError>;

    async fn solved(&self, user_id: &str) -> Result<Vec<String>, StoreError>;
}
