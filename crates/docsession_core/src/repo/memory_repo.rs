//! In-memory repository adapter for tests and local composition.
//!
//! # Responsibility
//! - Implement the full port contract against a plain vector of rows.
//! - Keep the version watermark as instance state, reset per instance.
//!
//! # Invariants
//! - Reads hand out clones so callers cannot mutate stored state.
//! - `(schema, id)` stays unique; duplicate adds are permanent failures.

use crate::repo::document_repo::{
    ChangeScan, DocumentRecord, DocumentRepository, QueryBatch, RepoError, RepoResult,
    WriteReceipt,
};
use std::sync::Mutex;
use uuid::Uuid;

const WRITE_COST: f64 = 1.0;

#[derive(Default)]
struct MemoryState {
    rows: Vec<DocumentRecord>,
    next_version: i64,
}

impl MemoryState {
    fn assign_version(&mut self) -> i64 {
        self.next_version += 1;
        self.next_version
    }

    fn position(&self, schema: &str, id: Uuid) -> Option<usize> {
        self.rows
            .iter()
            .position(|row| row.schema == schema && row.id == id)
    }
}

/// Store double holding documents in process memory behind a mutex, so
/// independent sessions may share one instance.
#[derive(Default)]
pub struct InMemoryRepository {
    state: Mutex<MemoryState>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a record directly, bypassing any session. Test harness use.
    pub fn seed(&self, record: DocumentRecord) -> RepoResult<WriteReceipt> {
        self.add(&record)
    }

    /// Snapshot of every stored record, in insertion order.
    pub fn dump(&self) -> Vec<DocumentRecord> {
        self.lock_state().rows.clone()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        // A poisoned mutex means a panic mid-write; tests should see it.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl DocumentRepository for InMemoryRepository {
    fn add(&self, record: &DocumentRecord) -> RepoResult<WriteReceipt> {
        let mut state = self.lock_state();
        if state.position(&record.schema, record.id).is_some() {
            return Err(RepoError::Permanent(format!(
                "duplicate document {}/{}",
                record.schema, record.id
            )));
        }
        let version = state.assign_version();
        let mut stored = record.clone();
        stored.version = version;
        state.rows.push(stored);
        Ok(WriteReceipt { cost: WRITE_COST })
    }

    fn update(&self, record: &DocumentRecord) -> RepoResult<WriteReceipt> {
        let mut state = self.lock_state();
        let position =
            state
                .position(&record.schema, record.id)
                .ok_or_else(|| RepoError::NotFound {
                    schema: record.schema.clone(),
                    id: record.id,
                })?;
        let version = state.assign_version();
        let mut stored = record.clone();
        stored.version = version;
        state.rows[position] = stored;
        Ok(WriteReceipt { cost: WRITE_COST })
    }

    fn delete_soft(&self, record: &DocumentRecord) -> RepoResult<WriteReceipt> {
        let mut state = self.lock_state();
        let position =
            state
                .position(&record.schema, record.id)
                .ok_or_else(|| RepoError::NotFound {
                    schema: record.schema.clone(),
                    id: record.id,
                })?;
        let version = state.assign_version();
        let mut stored = record.clone();
        stored.active = false;
        stored.version = version;
        state.rows[position] = stored;
        Ok(WriteReceipt { cost: WRITE_COST })
    }

    fn delete_hard(&self, schema: &str, id: Uuid) -> RepoResult<WriteReceipt> {
        let mut state = self.lock_state();
        let position = state.position(schema, id).ok_or_else(|| RepoError::NotFound {
            schema: schema.to_string(),
            id,
        })?;
        state.rows.remove(position);
        Ok(WriteReceipt { cost: WRITE_COST })
    }

    fn query(&self, schema: &str) -> RepoResult<QueryBatch> {
        let state = self.lock_state();
        let records: Vec<DocumentRecord> = state
            .rows
            .iter()
            .filter(|row| row.schema == schema)
            .cloned()
            .collect();
        let cost = records.len() as f64;
        Ok(QueryBatch { records, cost })
    }

    fn get_by_id(&self, schema: &str, id: Uuid) -> RepoResult<Option<DocumentRecord>> {
        let state = self.lock_state();
        Ok(state
            .rows
            .iter()
            .find(|row| row.schema == schema && row.id == id)
            .cloned())
    }

    fn exists(&self, id: Uuid) -> RepoResult<bool> {
        let state = self.lock_state();
        Ok(state.rows.iter().any(|row| row.id == id))
    }

    fn changed_since(&self, schema: &str, watermark: i64) -> RepoResult<ChangeScan> {
        let state = self.lock_state();
        let mut records: Vec<DocumentRecord> = state
            .rows
            .iter()
            .filter(|row| row.schema == schema && row.version > watermark)
            .cloned()
            .collect();
        records.sort_by_key(|row| row.version);
        let cost = records.len() as f64;
        Ok(ChangeScan { records, cost })
    }
}

#[cfg(test)]
mod tests {
    use super::InMemoryRepository;
    use crate::repo::document_repo::{DocumentRecord, DocumentRepository, RepoError};
    use uuid::Uuid;

    fn record(schema: &str) -> DocumentRecord {
        DocumentRecord {
            id: Uuid::new_v4(),
            schema: schema.to_string(),
            active: true,
            version: 0,
            body: serde_json::json!({ "name": "x" }),
        }
    }

    #[test]
    fn versions_increase_per_instance_and_reset_across_instances() {
        let repo = InMemoryRepository::new();
        repo.add(&record("s")).unwrap();
        repo.add(&record("s")).unwrap();
        let versions: Vec<i64> = repo.dump().iter().map(|r| r.version).collect();
        assert_eq!(versions, vec![1, 2]);

        let fresh = InMemoryRepository::new();
        fresh.add(&record("s")).unwrap();
        assert_eq!(fresh.dump()[0].version, 1);
    }

    #[test]
    fn duplicate_add_is_a_permanent_failure() {
        let repo = InMemoryRepository::new();
        let row = record("s");
        repo.add(&row).unwrap();
        let err = repo.add(&row).unwrap_err();
        assert!(matches!(err, RepoError::Permanent(_)));
    }

    #[test]
    fn soft_delete_forces_active_false_and_bumps_version() {
        let repo = InMemoryRepository::new();
        let mut row = record("s");
        repo.add(&row).unwrap();
        row.active = true;
        repo.delete_soft(&row).unwrap();

        let stored = repo.get_by_id("s", row.id).unwrap().unwrap();
        assert!(!stored.active);
        assert_eq!(stored.version, 2);
    }

    #[test]
    fn changed_since_filters_strictly_above_watermark() {
        let repo = InMemoryRepository::new();
        let first = record("s");
        let second = record("s");
        repo.add(&first).unwrap();
        repo.add(&second).unwrap();

        let scan = repo.changed_since("s", 1).unwrap();
        assert_eq!(scan.records.len(), 1);
        assert_eq!(scan.records[0].id, second.id);
    }
}
