//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the generic CRUD contract every content kind is accessed through.
//! - Isolate SQLite query details from services and from the cache layer.
//!
//! # Invariants
//! - Repository writes enforce storage-level constraints only; business
//!   validation belongs to services.
//! - Repository APIs return semantic errors (`NotFound`, `Validation`) in
//!   addition to storage transport errors.

mod query;
pub mod repository;
pub mod sqlite_repo;
