//! Session read overlay: merge queued intents over remote results.
//!
//! # Responsibility
//! - Produce the record set a caller should observe inside an open
//!   session, without a commit round trip.
//!
//! # Invariants
//! - Intents apply strictly in enqueue order (last intent wins).
//! - Pure function of its inputs; no store access, no session state.

use crate::repo::document_repo::DocumentRecord;
use crate::session::queue::QueuedWrite;

/// Replays queued intents for one schema over freshly fetched records.
///
/// Create/Update/SoftDelete snapshots upsert by id (injecting when the
/// remote fetch missed the target); HardDelete removes. Callers filter
/// the effective set afterwards (predicate, active-only).
pub fn replay_queued_writes(
    schema: &str,
    fetched: Vec<DocumentRecord>,
    queued: &[QueuedWrite],
) -> Vec<DocumentRecord> {
    let mut effective = fetched;

    for intent in queued {
        match intent {
            QueuedWrite::Create { record, .. }
            | QueuedWrite::Update { record, .. }
            | QueuedWrite::SoftDelete { record, .. } => {
                if record.schema != schema {
                    continue;
                }
                match effective.iter_mut().find(|row| row.id == record.id) {
                    Some(row) => *row = record.clone(),
                    None => effective.push(record.clone()),
                }
            }
            QueuedWrite::HardDelete {
                schema: intent_schema,
                id,
                ..
            } => {
                if intent_schema == schema {
                    effective.retain(|row| row.id != *id);
                }
            }
        }
    }

    effective
}
