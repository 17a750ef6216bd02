//! Read-through caching for repositories.
//!
//! # Responsibility
//! - Define the generic key/value store contract and bundled stores.
//! - Derive deterministic cache keys from operations and their arguments.
//! - Wrap any repository with transparent caching and invalidation.
//!
//! # Invariants
//! - A cached entry equals what the wrapped repository would currently return
//!   for the same operation and arguments.
//! - The cache is an optimization only: store failures degrade to direct
//!   repository access and never fail an operation.

pub mod decorator;
pub mod gate;
pub mod keys;
mod lock;
pub mod sqlite_store;
pub mod store;
