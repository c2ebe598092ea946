pub mod admission;
pub mod aggregator;
pub mod backend;
pub mod dispatcher;
pub mod error;
pub mod language;
pub mod lifecycle;
pub mod poller;
pub mod retry;
pub mod store;
pub mod submission;

// Re-export the engine's entry points
pub use admission::{spawn_prune_task, AdmissionGate, RejectReason};
pub use backend::{EchoBackend, ExecutionBackend, Judge0Backend};
pub use error::{BackendError, EngineError, StoreError};
pub use language::LanguageRegistry;
pub use lifecycle::{RunOutcome, Stores, SubmissionManager, SubmitOutcome};
pub use store::{MemoryStore, RedisStore};
