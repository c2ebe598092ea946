pub mod types;
pub mod redis;
pub mod config;

// Re-export commonly used types for convenience
pub use types::{CaseStatus, Mode, Problem, TestCase, Verdict, Visibility};
pub use config::Config;
