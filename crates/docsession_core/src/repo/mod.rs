//! Repository port and storage adapters.
//!
//! # Responsibility
//! - Define the single narrow interface the session talks to.
//! - Keep store-specific persistence details behind that boundary.
//!
//! # Invariants
//! - `(schema, id)` is unique within one store.
//! - Every successful write assigns a strictly increasing, store-scoped
//!   version watermark.
//! - Absence on get-by-id is `Ok(None)`, never an error.

pub mod document_repo;
pub mod memory_repo;
pub mod sqlite_repo;
