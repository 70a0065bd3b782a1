#![allow(dead_code)]

//! Shared fixtures: a sample aggregate, a zero-backoff retry executor
//! and a fault-injecting repository wrapper.

use docsession_core::{
    AggregateMeta, AggregateRoot, ChangeScan, ChildEntity, ChildMeta, DocumentRecord,
    DocumentRepository, EntityGraph, InMemoryRepository, QueryBatch, RepoError, RepoResult,
    RetryExecutor, RetryPolicy, Sleeper, WriteReceipt,
};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParcelLine {
    #[serde(flatten)]
    pub meta: ChildMeta,
    pub sku: String,
}

impl EntityGraph for ParcelLine {}

impl ChildEntity for ParcelLine {
    fn child_meta_mut(&mut self) -> &mut ChildMeta {
        &mut self.meta
    }
}

/// Sample aggregate used across the integration tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shipment {
    #[serde(flatten)]
    pub meta: AggregateMeta,
    pub reference: String,
    pub carrier: String,
    pub lines: Vec<ParcelLine>,
}

impl Shipment {
    pub fn new(reference: &str, carrier: &str) -> Self {
        Self {
            meta: AggregateMeta::default(),
            reference: reference.to_string(),
            carrier: carrier.to_string(),
            lines: Vec::new(),
        }
    }
}

impl EntityGraph for Shipment {
    fn visit_children(&mut self, visit: &mut dyn FnMut(&mut dyn ChildEntity)) {
        for line in &mut self.lines {
            visit(line);
        }
    }
}

impl AggregateRoot for Shipment {
    const SCHEMA: &'static str = "logistics.shipping.Shipment";

    fn aggregate_meta(&self) -> &AggregateMeta {
        &self.meta
    }

    fn aggregate_meta_mut(&mut self) -> &mut AggregateMeta {
        &mut self.meta
    }
}

/// Sleeper that returns immediately so retry tests never block.
pub struct NoopSleeper;

impl Sleeper for NoopSleeper {
    fn sleep(&self, _duration: Duration) {}
}

/// Retry executor with the production attempt cap but no real waiting.
pub fn fast_retry() -> RetryExecutor {
    RetryExecutor::new(
        RetryPolicy {
            max_attempts: 10,
            default_backoff: Duration::ZERO,
        },
        Arc::new(NoopSleeper),
    )
}

/// Seeds one stamped shipment straight into the store, bypassing any
/// session (the committed-state fixture path).
pub fn seed_shipment(repo: &InMemoryRepository, shipment: &mut Shipment) {
    docsession_core::stamp_aggregate(shipment, docsession_core::now_epoch_ms());
    repo.seed(DocumentRecord::from_aggregate(shipment).unwrap())
        .unwrap();
}

/// In-memory repository wrapper that fails scripted write calls.
///
/// Each write (add/update/delete) consumes one script entry: `Some(err)`
/// fails the call, `None` lets it through. An exhausted script passes
/// everything through. Reads always pass through.
pub struct FlakyRepository {
    pub inner: InMemoryRepository,
    script: Mutex<VecDeque<Option<RepoError>>>,
}

impl FlakyRepository {
    pub fn new() -> Self {
        Self {
            inner: InMemoryRepository::new(),
            script: Mutex::new(VecDeque::new()),
        }
    }

    pub fn script_writes(&self, entries: Vec<Option<RepoError>>) {
        *self.script.lock().unwrap() = entries.into();
    }

    fn next_scripted_failure(&self) -> Option<RepoError> {
        self.script.lock().unwrap().pop_front().flatten()
    }
}

pub fn transient_error() -> RepoError {
    RepoError::Transient {
        retry_after: None,
        message: "rate limited".to_string(),
    }
}

pub fn permanent_error() -> RepoError {
    RepoError::Permanent("constraint violation".to_string())
}

impl DocumentRepository for FlakyRepository {
    fn add(&self, record: &DocumentRecord) -> RepoResult<WriteReceipt> {
        match self.next_scripted_failure() {
            Some(err) => Err(err),
            None => self.inner.add(record),
        }
    }

    fn update(&self, record: &DocumentRecord) -> RepoResult<WriteReceipt> {
        match self.next_scripted_failure() {
            Some(err) => Err(err),
            None => self.inner.update(record),
        }
    }

    fn delete_soft(&self, record: &DocumentRecord) -> RepoResult<WriteReceipt> {
        match self.next_scripted_failure() {
            Some(err) => Err(err),
            None => self.inner.delete_soft(record),
        }
    }

    fn delete_hard(&self, schema: &str, id: Uuid) -> RepoResult<WriteReceipt> {
        match self.next_scripted_failure() {
            Some(err) => Err(err),
            None => self.inner.delete_hard(schema, id),
        }
    }

    fn query(&self, schema: &str) -> RepoResult<QueryBatch> {
        self.inner.query(schema)
    }

    fn get_by_id(&self, schema: &str, id: Uuid) -> RepoResult<Option<DocumentRecord>> {
        self.inner.get_by_id(schema, id)
    }

    fn exists(&self, id: Uuid) -> RepoResult<bool> {
        self.inner.exists(id)
    }

    fn changed_since(&self, schema: &str, watermark: i64) -> RepoResult<ChangeScan> {
        self.inner.changed_since(schema, watermark)
    }
}
