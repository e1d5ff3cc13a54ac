//! Persistent cache index.
//!
//! The index is the durable record of every content-addressed file the
//! cache knows about, keyed by content hash. It survives process restarts
//! and is the single shared mutable resource between parallel
//! reconciliation workers.
//!
//! # Architecture
//!
//! * [`database`]: SQLite-based persistence, schema management, and the
//!   `list`/`upsert`/`remove` operations.
//! * [`entry`]: the [`CacheEntry`] record stored per known file.
//!
//! # Consistency
//!
//! Writes go through a single connection behind a mutex, so concurrent
//! workers never interleave partial updates. Reads take a full snapshot
//! (`list`) without holding the lock across reconciliation; a snapshot may
//! be stale relative to concurrent mutation, which is acceptable because
//! every entry is re-validated against live disk state anyway.

pub mod database;
pub mod entry;

pub use database::{CacheIndex, IndexError, IndexResult};
pub use entry::CacheEntry;
