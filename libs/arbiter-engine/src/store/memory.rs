use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use arbiter_common::Problem;
use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ProblemStore, SolvedStore, SubmissionStore};
use crate::error::StoreError;
use crate::submission::SubmissionRecord;

/// In-process implementation of every collaborator store
#[derive(Debug, Default)]
pub struct MemoryStore {
    problems: RwLock<HashMap<String, Problem>>,
    submissions: RwLock<HashMap<Uuid, SubmissionRecord>>,
    solved: RwLock<HashMap<String, BTreeSet<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_problems(problems: impl IntoIterator<Item = Problem>) -> Self {
        let problems = problems
            .into_iter()
            .map(|problem| (problem.id.clone(), problem))
            .collect();
        Self {
            problems: RwLock::new(problems),
            ..Self::default()
        }
    }

    /// Load a JSON array of problems
    pub fn load_problems(path: impl AsRef<Path>) -> std::io::Result<Vec<Problem>> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

#[async_trait]
impl ProblemStore for MemoryStore {
    async fn get_problem(&self, problem_id: &str) -> Result<Option<Problem>, StoreError> {
        Ok(self.problems.read().await.get(problem_id).cloned())
    }

    async fn put_problem(&self, problem: &Problem) -> Result<(), StoreError> {
        self.problems
            .write()
            .await
            .insert(problem.id.clone(), problem.clone());
        Ok(())
    }
}

#[async_trait]
impl SubmissionStore for MemoryStore {
    async fn create(&self, record: &SubmissionRecord) -> Result<(), StoreError> {
        self.submissions
            .write()
            .await
            .entry(record.id)
            .or_insert_with(|| record.clone());
        Ok(())
    }

    async fn finalize(&self, record: &SubmissionRecord) -> Result<bool, StoreError> {
        let mut submissions = self.submissions.write().await;
        if submissions.get(&record.id).is_some_and(|r| r.is_terminal()) {
            return Ok(false);
        }
        submissions.insert(record.id, record.clone());
        Ok(true)
    }

    async fn get(&self, submission_id: &Uuid) -> Result<Option<SubmissionRecord>, StoreError> {
        Ok(self.submissions.read().await.get(submission_id).cloned())
    }

    async fn history(&self, user_id: &str, problem_id: &str) -> Result<Vec<SubmissionRecord>, StoreError> {
        let submissions = self.submissions.read().await;
        let mut records: Vec<SubmissionRecord> = submissions
            .values()
            .filter(|r| r.user_id == user_id && r.problem_id == problem_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }
}

#[async_trait]
impl SolvedStore for MemoryStore {
    async fn mark_solved(&self, user_id: &str, problem_id: &str) -> Result<bool, StoreError> {
        Ok(self
            .solved
            .write()
            .await
            .entry(user_id.to_string())
            .or_default()
            .insert(problem_id.to_string()))
    }

    async fn solved(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .solved
            .read()
            .await
            .get(user_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }
}
