//! Cache of serialized language exports.
//!
//! - [`memory`]: [`InMemoryExportCache`], a TTL map with a per-language
//!   fingerprint index
//! - [`invalidation`]: [`ExportInvalidationObserver`], the write-path hook
//!   that drops a language's entries after every committed write

pub mod invalidation;
pub mod memory;

use serde::Serialize;

pub use invalidation::ExportInvalidationObserver;
pub use memory::InMemoryExportCache;

/// Failure of a cache backend. Callers degrade instead of failing requests.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("export cache unavailable: {0}")]
    Unavailable(String),
}

/// Point-in-time cache counters, reported by the health endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
    /// Entries removed by `invalidate_all`.
    pub invalidations: u64,
    /// Entries removed because their TTL elapsed.
    pub expired: u64,
    /// Entries currently held, including expired ones not yet purged.
    pub entries: usize,
}
