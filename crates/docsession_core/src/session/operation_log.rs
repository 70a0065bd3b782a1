//! Session-scoped operation log.
//!
//! # Responsibility
//! - Record every read/write the session issues, in emission order.
//! - Attach measured cost/duration once the underlying call completes.
//!
//! # Invariants
//! - Append-only; records are never removed within a session lifetime.
//! - Recording must not alter control flow or results.

use crate::model::aggregate::now_epoch_ms;
use std::time::Duration;

/// What kind of store interaction an operation performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    ReadById,
    ReadQuery,
    ReadQueryWithProjection,
    ReadChanges,
    Write,
}

/// One recorded session operation.
///
/// Identity fields are fixed at creation; `cost`/`duration` are filled
/// in post hoc when the underlying call completes (for queued writes,
/// at commit time).
#[derive(Debug, Clone)]
pub struct OperationRecord {
    pub kind: OperationKind,
    /// Session method that produced the operation.
    pub method: &'static str,
    pub schema: String,
    pub created_ms: i64,
    pub cost: Option<f64>,
    pub duration: Option<Duration>,
}

/// Handle to a recorded operation, used to attach measurements later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationId(usize);

/// Append-only audit trail owned by one session.
#[derive(Debug, Default)]
pub struct OperationLog {
    records: Vec<OperationRecord>,
}

impl OperationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        kind: OperationKind,
        method: &'static str,
        schema: &str,
    ) -> OperationId {
        self.records.push(OperationRecord {
            kind,
            method,
            schema: schema.to_string(),
            created_ms: now_epoch_ms(),
            cost: None,
            duration: None,
        });
        OperationId(self.records.len() - 1)
    }

    /// Attaches the measured cost/duration of the completed call.
    pub fn finish(&mut self, id: OperationId, cost: f64, duration: Duration) {
        if let Some(record) = self.records.get_mut(id.0) {
            record.cost = Some(cost);
            record.duration = Some(duration);
        }
    }

    /// All operations recorded so far, in emission order.
    pub fn operations(&self) -> &[OperationRecord] {
        &self.records
    }
}

#[cfg(test)]
mod tests {
    use super::{OperationKind, OperationLog};
    use std::time::Duration;

    #[test]
    fn records_keep_emission_order() {
        let mut log = OperationLog::new();
        log.record(OperationKind::Write, "add", "s");
        log.record(OperationKind::ReadById, "read_by_id", "s");

        let methods: Vec<&str> = log.operations().iter().map(|op| op.method).collect();
        assert_eq!(methods, vec!["add", "read_by_id"]);
    }

    #[test]
    fn finish_attaches_measurements_to_the_right_record() {
        let mut log = OperationLog::new();
        let first = log.record(OperationKind::Write, "add", "s");
        log.record(OperationKind::Write, "update", "s");

        log.finish(first, 2.5, Duration::from_millis(7));

        let ops = log.operations();
        assert_eq!(ops[0].cost, Some(2.5));
        assert_eq!(ops[0].duration, Some(Duration::from_millis(7)));
        assert_eq!(ops[1].cost, None);
    }
}
