use std::time::Duration;

/// Application-level configuration for the export and translation services.
///
/// Controls export caching, store paging, and background task intervals.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// How long a cached export stays valid.
    pub cache_ttl: Duration,
    /// Largest export payload that is buffered and cached. Bigger exports
    /// are streamed to the client without caching.
    pub max_cached_export_bytes: u64,
    /// Rows fetched from the store per export page.
    pub export_page_size: usize,
    /// Search page size when the request does not set one.
    pub default_per_page: u32,
    /// Upper bound on a requested search page size.
    pub max_per_page: u32,
    /// Interval between sweeps of expired cache entries. Must be non-zero.
    pub cache_purge_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(60),
            max_cached_export_bytes: 8 * 1024 * 1024,
            export_page_size: 500,
            default_per_page: 50,
            max_per_page: 500,
            cache_purge_interval: Duration::from_secs(30),
        }
    }
}
