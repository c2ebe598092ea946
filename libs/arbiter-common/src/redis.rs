use uuid::Uuid;

/// Redis key semantics - defines only naming, not runtime logic
/// Keeps the API, the CLI seeder and the stores from drifting apart.

pub const PROBLEM_PREFIX: &str = "arbiter:problem";
pub const SUBMISSION_PREFIX: &str = "arbiter:submission";
pub const HISTORY_PREFIX: &str = "arbiter:history";
pub const SOLVED_PREFIX: &str = "arbiter:solved";

/// Problem document (JSON)
pub fn problem_key(problem_id: &str) -> String {
    format!("{}:{}", PROBLEM_PREFIX, problem_id)
}

/// Submission record (JSON)
pub fn submission_key(submission_id: &Uuid) -> String {
    format!("{}:{}", SUBMISSION_PREFIX, submission_id)
}

/// List of submission ids for one user on one problem, newest first
pub fn history_key(user_id: &str, problem_id: &str) -> String {
    format!("{}:{}:{}", HISTORY_PREFIX, user_id, problem_id)
}

/// Set of problem ids a user has solved
pub fn solved_key(user_id: &str) -> String {
    format!("{}:{}", SOLVED_PREFIX, user_id)
}
