//! Document repository port: the contract every storage adapter implements.
//!
//! # Responsibility
//! - Define the wire shape (`DocumentRecord`) exchanged with adapters.
//! - Classify adapter failures so the retry executor can tell transient
//!   conditions from permanent ones.
//!
//! # Invariants
//! - Adapters assign `version` on every write; callers never do.
//! - `delete_soft` persists the tombstoned snapshot it is handed and
//!   forces the stored `active` flag false.
//! - Predicate translation is out of scope: `query` returns the whole
//!   schema and the session evaluates typed predicates locally.

use crate::model::aggregate::AggregateRoot;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use uuid::Uuid;

pub type RepoResult<T> = Result<T, RepoError>;

/// Failure classification surfaced across the port boundary.
#[derive(Debug)]
pub enum RepoError {
    /// Rate-limited or temporarily unavailable; safe to retry after a delay.
    Transient {
        retry_after: Option<Duration>,
        message: String,
    },
    /// Malformed request or constraint violation; never retried.
    Permanent(String),
    /// Update/delete target missing from the store.
    NotFound { schema: String, id: Uuid },
    /// Persisted body cannot be decoded; surfaced, never masked.
    InvalidRecord(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transient { message, .. } => write!(f, "transient store failure: {message}"),
            Self::Permanent(message) => write!(f, "permanent store failure: {message}"),
            Self::NotFound { schema, id } => write!(f, "document not found: {schema}/{id}"),
            Self::InvalidRecord(message) => write!(f, "invalid persisted document: {message}"),
        }
    }
}

impl Error for RepoError {}

impl RepoError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// One stored document as adapters see it.
///
/// The `id`/`schema`/`active`/`version` columns mirror the metadata
/// inside `body` and are authoritative on the read path.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentRecord {
    pub id: Uuid,
    pub schema: String,
    pub active: bool,
    pub version: i64,
    pub body: serde_json::Value,
}

impl DocumentRecord {
    /// Serializes an aggregate into its stored form.
    pub fn from_aggregate<T: AggregateRoot>(aggregate: &T) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_value(aggregate)?;
        let meta = aggregate.aggregate_meta();
        Ok(Self {
            id: meta.id,
            schema: T::SCHEMA.to_string(),
            active: meta.active,
            version: meta.version,
            body,
        })
    }

    /// Decodes the stored body back into an aggregate.
    ///
    /// The record columns win over whatever the body carries for
    /// `id`, `active` and `version`.
    pub fn to_aggregate<T: AggregateRoot>(&self) -> Result<T, serde_json::Error> {
        let mut aggregate: T = serde_json::from_value(self.body.clone())?;
        let meta = aggregate.aggregate_meta_mut();
        meta.id = self.id;
        meta.active = self.active;
        meta.version = self.version;
        Ok(aggregate)
    }
}

/// Measured cost of one completed write.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WriteReceipt {
    pub cost: f64,
}

/// Result of a schema-wide query scan.
#[derive(Debug, Clone)]
pub struct QueryBatch {
    pub records: Vec<DocumentRecord>,
    pub cost: f64,
}

/// Result of a change scan above a version watermark.
#[derive(Debug, Clone)]
pub struct ChangeScan {
    pub records: Vec<DocumentRecord>,
    pub cost: f64,
}

/// The single narrow interface the session talks to.
///
/// Implementations must be usable from independent sessions sharing one
/// store connection; any shared mutable state is the adapter's to guard.
pub trait DocumentRepository {
    fn add(&self, record: &DocumentRecord) -> RepoResult<WriteReceipt>;
    fn update(&self, record: &DocumentRecord) -> RepoResult<WriteReceipt>;
    fn delete_soft(&self, record: &DocumentRecord) -> RepoResult<WriteReceipt>;
    fn delete_hard(&self, schema: &str, id: Uuid) -> RepoResult<WriteReceipt>;
    fn query(&self, schema: &str) -> RepoResult<QueryBatch>;
    fn get_by_id(&self, schema: &str, id: Uuid) -> RepoResult<Option<DocumentRecord>>;
    fn exists(&self, id: Uuid) -> RepoResult<bool>;
    /// Returns records with `version > watermark` for one schema.
    fn changed_since(&self, schema: &str, watermark: i64) -> RepoResult<ChangeScan>;
}

// Sessions own their repository generically; this lets independent
// sessions borrow one shared adapter instance.
impl<R: DocumentRepository + ?Sized> DocumentRepository for &R {
    fn add(&self, record: &DocumentRecord) -> RepoResult<WriteReceipt> {
        (**self).add(record)
    }

    fn update(&self, record: &DocumentRecord) -> RepoResult<WriteReceipt> {
        (**self).update(record)
    }

    fn delete_soft(&self, record: &DocumentRecord) -> RepoResult<WriteReceipt> {
        (**self).delete_soft(record)
    }

    fn delete_hard(&self, schema: &str, id: Uuid) -> RepoResult<WriteReceipt> {
        (**self).delete_hard(schema, id)
    }

    fn query(&self, schema: &str) -> RepoResult<QueryBatch> {
        (**self).query(schema)
    }

    fn get_by_id(&self, schema: &str, id: Uuid) -> RepoResult<Option<DocumentRecord>> {
        (**self).get_by_id(schema, id)
    }

    fn exists(&self, id: Uuid) -> RepoResult<bool> {
        (**self).exists(id)
    }

    fn changed_since(&self, schema: &str, watermark: i64) -> RepoResult<ChangeScan> {
        (**self).changed_since(schema, watermark)
    }
}
