use arbiter_common::redis::{history_key, problem_key, solved_key, submission_key};
use arbiter_common::Problem;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use uuid::Uuid;

use super::{ProblemStore, SolvedStore, SubmissionStore};
use crate::error::StoreError;
use crate::submission::SubmissionRecord;

/// Overwrite the record unless the stored copy is already terminal.
/// Returns 1 when written, 0 when refused.
const FINALIZE_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if current then
    local state = cjson.decode(current)['state']
    if state == 'persisted' or state == 'aborted' or state == 'failed' then
        return 0
    end
end
redis.call('SET', KEYS[1], ARGV[1])
return 1
"#;

/// Redis-backed stores sharing one multiplexed connection
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl ProblemStore for RedisStore {
    async fn get_problem(&self, problem_id: &str) -> Result<Option<Problem>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(problem_key(problem_id)).await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn put_problem(&self, problem: &Problem) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(problem)?;
        conn.set::<_, _, ()>(problem_key(&problem.id), json).await?;
        Ok(())
    }
}

#[async_trait]
impl SubmissionStore for RedisStore {
    async fn create(&self, record: &SubmissionRecord) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(record)?;

        redis::pipe()
            .atomic()
            .set_nx(submission_key(&record.id), json)
            .ignore()
            .lpush(
                history_key(&record.user_id, &record.problem_id),
                record.id.to_string(),
            )
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn finalize(&self, record: &SubmissionRecord) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(record)?;

        let written: i64 = Script::new(FINALIZE_SCRIPT)
            .key(submission_key(&record.id))
            .arg(json)
            .invoke_async(&mut conn)
            .await?;
        Ok(written == 1)
    }

    async fn get(&self, submission_id: &Uuid) -> Result<Option<SubmissionRecord>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(submission_key(submission_id)).await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn history(&self, user_id: &str, problem_id: &str) -> Result<Vec<SubmissionRecord>, StoreError> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn.lrange(history_key(user_id, problem_id), 0, -1).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = ids
            .iter()
            .filter_map(|id| Uuid::parse_str(id).ok())
            .map(|id| submission_key(&id))
            .collect();
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        // MGET keeps list order, which is newest first
        let raw: Vec<Option<String>> = redis::cmd("MGET").arg(&keys).query_async(&mut conn).await?;
        raw.into_iter()
            .flatten()
            .map(|json| serde_json::from_str(&json).map_err(StoreError::from))
            .collect()
    }
}

#[async_trait]
impl SolvedStore for RedisStore {
    async fn mark_solved(&self, user_id: &str, problem_id: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let added: i64 = conn.sadd(solved_key(user_id), problem_id).await?;
        Ok(added == 1)
    }

    async fn solved(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        let mut problems: Vec<String> = conn.smembers(solved_key(user_id)).await?;
        problems.sort();
        Ok(problems)
    }
}
