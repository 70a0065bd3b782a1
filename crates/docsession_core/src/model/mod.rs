//! Domain model contracts for session-managed aggregates.
//!
//! # Responsibility
//! - Define the metadata every stored aggregate root carries.
//! - Provide the explicit child-visiting walk used to stamp identity
//!   and timestamps onto nested entities before they enter a session.
//!
//! # Invariants
//! - An assigned aggregate `id` is never reassigned.
//! - Soft deletion is a tombstone (`active = false`), not a removal.

pub mod aggregate;
