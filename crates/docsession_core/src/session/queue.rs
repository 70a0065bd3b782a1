//! Queued write intents awaiting commit.
//!
//! # Invariants
//! - Intents are immutable after enqueue; a second staged write to the
//!   same id appends a new intent rather than editing the old one.
//! - Enqueue order is commit order.

use crate::repo::document_repo::DocumentRecord;
use crate::session::operation_log::OperationId;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Discriminant of a queued mutation intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Create,
    Update,
    SoftDelete,
    HardDelete,
}

impl Display for WriteKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::SoftDelete => "soft-delete",
            Self::HardDelete => "hard-delete",
        };
        write!(f, "{name}")
    }
}

/// One captured, not-yet-applied mutation.
#[derive(Debug, Clone)]
pub enum QueuedWrite {
    Create {
        record: DocumentRecord,
        op: OperationId,
    },
    Update {
        record: DocumentRecord,
        op: OperationId,
    },
    SoftDelete {
        record: DocumentRecord,
        op: OperationId,
    },
    HardDelete {
        schema: String,
        id: Uuid,
        op: OperationId,
    },
}

impl QueuedWrite {
    pub fn kind(&self) -> WriteKind {
        match self {
            Self::Create { .. } => WriteKind::Create,
            Self::Update { .. } => WriteKind::Update,
            Self::SoftDelete { .. } => WriteKind::SoftDelete,
            Self::HardDelete { .. } => WriteKind::HardDelete,
        }
    }

    pub fn schema(&self) -> &str {
        match self {
            Self::Create { record, .. }
            | Self::Update { record, .. }
            | Self::SoftDelete { record, .. } => &record.schema,
            Self::HardDelete { schema, .. } => schema,
        }
    }

    pub fn target_id(&self) -> Uuid {
        match self {
            Self::Create { record, .. }
            | Self::Update { record, .. }
            | Self::SoftDelete { record, .. } => record.id,
            Self::HardDelete { id, .. } => *id,
        }
    }

    pub fn operation(&self) -> OperationId {
        match self {
            Self::Create { op, .. }
            | Self::Update { op, .. }
            | Self::SoftDelete { op, .. }
            | Self::HardDelete { op, .. } => *op,
        }
    }
}
