//! rescache - Content-Addressed Resource Cache Maintenance
//!
//! Maintains a local, content-addressable cache of binary resource files
//! keyed by BLAKE3 content hash, periodically reconciling a persistent
//! index against both a source resource tree and a content-addressed
//! cache-storage directory, with LRU eviction under a size budget and a
//! cooperatively cancellable background scan loop.

pub mod app;
pub mod cli;
pub mod error;
pub mod evictor;
pub mod hasher;
pub mod index;
pub mod logging;
pub mod progress;
pub mod provider;
pub mod reconciler;
pub mod scheduler;
pub mod settings;
pub mod signal;

pub use app::run_app;
