//! Aggregate root contracts and metadata stamping.
//!
//! # Responsibility
//! - Define `AggregateMeta`, the per-root bookkeeping every stored
//!   document carries alongside its domain fields.
//! - Define the `AggregateRoot`/`ChildEntity` traits and the explicit
//!   child-visiting walk that stamps ids and creation timestamps onto
//!   nested entities (no runtime reflection).
//!
//! # Invariants
//! - `id` is assigned at most once; a nil id means "not yet assigned".
//! - `created_ms` is set once and never refreshed afterwards.
//! - `modified_ms` is refreshed on the root only, never on children.
//! - `version` is owned by the store; application code never sets it.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Stable identifier for aggregates and nested entities.
pub type AggregateId = Uuid;

/// Bookkeeping fields shared by every aggregate root.
///
/// Embed with `#[serde(flatten)]` so the stored document carries these
/// fields at the top level next to the domain payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateMeta {
    /// Stable global ID; `Uuid::nil()` until first staged insert.
    pub id: AggregateId,
    /// Soft-delete flag. `false` means logically deleted but retained.
    pub active: bool,
    /// When true, updates are rejected unless explicitly overridden.
    pub read_only: bool,
    /// Ordered security/tenant scope identifiers.
    pub scope_ids: Vec<Uuid>,
    /// Unix epoch milliseconds, set once at first stamping.
    pub created_ms: Option<i64>,
    /// Unix epoch milliseconds, refreshed on every staged root mutation.
    pub modified_ms: Option<i64>,
    /// Store-assigned strictly increasing watermark; 0 before first commit.
    #[serde(default)]
    pub version: i64,
}

impl Default for AggregateMeta {
    fn default() -> Self {
        Self {
            id: Uuid::nil(),
            active: true,
            read_only: false,
            scope_ids: Vec::new(),
            created_ms: None,
            modified_ms: None,
            version: 0,
        }
    }
}

impl AggregateMeta {
    /// Replaces the scope set, preserving call order and dropping duplicates.
    pub fn set_scope(&mut self, scope_ids: &[Uuid]) {
        let mut deduped = Vec::with_capacity(scope_ids.len());
        for id in scope_ids {
            if !deduped.contains(id) {
                deduped.push(*id);
            }
        }
        self.scope_ids = deduped;
    }

    /// Marks this aggregate as softly deleted (tombstoned).
    pub fn soft_delete(&mut self, now_ms: i64) {
        self.active = false;
        self.modified_ms = Some(now_ms);
    }
}

/// Bookkeeping fields for nested (non-root) entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildMeta {
    /// Stable ID; `Uuid::nil()` until the stamping walk assigns one.
    pub id: Uuid,
    /// Unix epoch milliseconds, set once by the stamping walk.
    pub created_ms: Option<i64>,
}

impl Default for ChildMeta {
    fn default() -> Self {
        Self {
            id: Uuid::nil(),
            created_ms: None,
        }
    }
}

/// Child-visiting hook implemented by every node of an aggregate tree.
///
/// The default implementation is a leaf. Types owning nested entities
/// override `visit_children` and hand each direct child to `visit`;
/// recursion into grandchildren is driven by the walk, not the impl.
pub trait EntityGraph {
    fn visit_children(&mut self, _visit: &mut dyn FnMut(&mut dyn ChildEntity)) {}
}

/// A nested entity reachable from an aggregate root.
pub trait ChildEntity: EntityGraph {
    fn child_meta_mut(&mut self) -> &mut ChildMeta;
}

/// The versioned root entity persisted as one store record.
///
/// # Contract
/// - `SCHEMA` is the fully-qualified logical type name and discriminates
///   aggregates of different kinds sharing one physical collection.
/// - The implementing type serializes its `AggregateMeta` fields at the
///   document top level (`#[serde(flatten)]` on the meta field).
pub trait AggregateRoot: EntityGraph + Clone + Serialize + DeserializeOwned + 'static {
    const SCHEMA: &'static str;

    fn aggregate_meta(&self) -> &AggregateMeta;
    fn aggregate_meta_mut(&mut self) -> &mut AggregateMeta;
}

/// Stamps identity and timestamp metadata onto a root and every nested
/// entity reachable through `visit_children`.
///
/// # Contract
/// - Missing ids are assigned; existing ids are left untouched.
/// - `created_ms` is set only where still unset.
/// - `modified_ms` is refreshed on the root, never on children.
pub fn stamp_aggregate<T: AggregateRoot>(root: &mut T, now_ms: i64) {
    let meta = root.aggregate_meta_mut();
    if meta.id.is_nil() {
        meta.id = Uuid::new_v4();
    }
    if meta.created_ms.is_none() {
        meta.created_ms = Some(now_ms);
    }
    meta.modified_ms = Some(now_ms);

    root.visit_children(&mut |child| stamp_child_tree(child, now_ms));
}

fn stamp_child_tree(child: &mut dyn ChildEntity, now_ms: i64) {
    let meta = child.child_meta_mut();
    if meta.id.is_nil() {
        meta.id = Uuid::new_v4();
    }
    if meta.created_ms.is_none() {
        meta.created_ms = Some(now_ms);
    }
    child.visit_children(&mut |nested| stamp_child_tree(nested, now_ms));
}

/// Current wall-clock time as Unix epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}
