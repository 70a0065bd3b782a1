//! Client-side document-session engine.
//!
//! Sits between application code and a document store behind the
//! `DocumentRepository` port. A `DocumentSession` is one unit of work:
//! reads observe committed state merged with the session's own pending
//! writes, writes are queued and applied in order at commit time, every
//! operation is recorded for auditing, and transient store failures are
//! absorbed by a bounded retry policy.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod session;

pub use logging::{init_logging, logging_status};
pub use model::aggregate::{
    now_epoch_ms, stamp_aggregate, AggregateId, AggregateMeta, AggregateRoot, ChildEntity,
    ChildMeta, EntityGraph,
};
pub use repo::document_repo::{
    ChangeScan, DocumentRecord, DocumentRepository, QueryBatch, RepoError, RepoResult,
    WriteReceipt,
};
pub use repo::memory_repo::InMemoryRepository;
pub use repo::sqlite_repo::SqliteRepository;
pub use session::changes::{ChangeSet, ChangeToken};
pub use session::operation_log::{OperationKind, OperationRecord};
pub use session::queue::{QueuedWrite, WriteKind};
pub use session::retry::{RetryExecutor, RetryPolicy, Sleeper, ThreadSleeper};
pub use session::{Advanced, DocumentSession, SessionError, SessionResult, SessionState};

/// Returns the engine crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
