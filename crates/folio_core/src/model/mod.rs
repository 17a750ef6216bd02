//! Generic entity model shared by every content kind.
//!
//! # Responsibility
//! - Define the record shape persisted for pages, posts, settings and the
//!   other kinds.
//! - Define typed filter conditions used instead of a query language.
//!
//! # Invariants
//! - An entity belongs to exactly one kind and is identified by its id.
//! - Soft deletion is a marker (`deleted_at`), not removal.

pub mod condition;
pub mod entity;
pub mod field;
pub mod kind;
