//! Unit-of-work session engine.
//!
//! # Responsibility
//! - Aggregate every read/write into an auditable operation log.
//! - Queue mutation intents and apply them in order at commit time.
//! - Overlay queued intents on remote reads (read-your-writes).
//! - Absorb transient store failures behind a bounded retry policy.
//!
//! # Invariants
//! - A session is single-writer; mutating paths take `&mut self`.
//! - Queued intents are immutable once enqueued and replay in
//!   insertion order.
//! - Transient failures never reach the caller unless retries exhaust.

use crate::repo::document_repo::RepoError;
use crate::session::queue::WriteKind;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub mod changes;
pub mod document_session;
pub mod operation_log;
pub mod queue;
pub mod replay;
pub mod retry;

pub use document_session::{Advanced, DocumentSession};

pub type SessionResult<T> = Result<T, SessionError>;

/// Lifecycle of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepting reads and staged writes.
    Open,
    /// A commit failed; write staging is rejected until a retried
    /// commit succeeds.
    Faulted,
}

/// Caller-visible failure taxonomy of the session engine.
#[derive(Debug)]
pub enum SessionError {
    /// Missing identifier or malformed caller input.
    InvalidArgument(String),
    /// Mutation attempted on a read-only aggregate without override.
    ReadOnlyViolation(Uuid),
    /// Retries exhausted on a transient store condition.
    StoreUnavailable { attempts: u32, source: RepoError },
    /// One queued intent failed during commit; the failed intent and
    /// everything after it remain queued. Intents before it are durable.
    CommitFailed {
        kind: WriteKind,
        schema: String,
        id: Uuid,
        source: Box<SessionError>,
    },
    /// Write staged on a faulted session.
    SessionFaulted,
    /// Permanent or corrupt-record store failure.
    Repo(RepoError),
    /// Aggregate body failed to encode or decode.
    Encoding(serde_json::Error),
}

impl Display for SessionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArgument(message) => write!(f, "invalid argument: {message}"),
            Self::ReadOnlyViolation(id) => {
                write!(f, "aggregate {id} is read-only; pass overwrite_read_only to update it")
            }
            Self::StoreUnavailable { attempts, source } => {
                write!(f, "store unavailable after {attempts} attempts: {source}")
            }
            Self::CommitFailed {
                kind, schema, id, ..
            } => write!(f, "commit failed on {kind} intent for {schema}/{id}"),
            Self::SessionFaulted => {
                write!(f, "session is faulted; retry commit_changes before staging writes")
            }
            Self::Repo(err) => write!(f, "{err}"),
            Self::Encoding(err) => write!(f, "document encoding failed: {err}"),
        }
    }
}

impl Error for SessionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::StoreUnavailable { source, .. } => Some(source),
            Self::CommitFailed { source, .. } => Some(source.as_ref()),
            Self::Repo(err) => Some(err),
            Self::Encoding(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(value: serde_json::Error) -> Self {
        Self::Encoding(value)
    }
}
