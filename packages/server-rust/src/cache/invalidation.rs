//! Drops cached exports of a language whenever one of its translations changes.

use std::sync::Arc;

use async_trait::async_trait;
use polyglot_core::{Language, Translation};
use tracing::{debug, warn};

use crate::storage::MutationObserver;
use crate::traits::ExportCache;

/// [`MutationObserver`] that calls [`ExportCache::invalidate_all`] for the
/// written language.
///
/// Invalidation is best-effort: a cache failure is logged at `warn` and
/// never reaches the write path. Correctness does not depend on it, because
/// a write always changes the language's fingerprint and stale entries can
/// no longer be looked up.
pub struct ExportInvalidationObserver {
    cache: Arc<dyn ExportCache>,
}

impl ExportInvalidationObserver {
    #[must_use]
    pub fn new(cache: Arc<dyn ExportCache>) -> Self {
        Self { cache }
    }

    async fn invalidate(&self, language: &Language) {
        match self.cache.invalidate_all(&language.code).await {
            Ok(removed) => debug!(language = %language.code, removed, "export cache invalidated"),
            Err(e) => warn!(language = %language.code, error = %e, "export cache invalidation failed"),
        }
    }
}

#[async_trait]
impl MutationObserver for ExportInvalidationObserver {
    async fn on_created(&self, _translation: &Translation, language: &Language) {
        self.invalidate(language).await;
    }

    async fn on_updated(&self, _before: &Translation, _after: &Translation, language: &Language) {
        self.invalidate(language).await;
    }

    async fn on_deleted(&self, _translation: &Translation, language: &Language) {
        self.invalidate(language).await;
    }

    async fn on_imported(&self, language: &Language, _count: usize) {
        self.invalidate(language).await;
    }
}
