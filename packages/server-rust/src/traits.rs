use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use polyglot_core::{
    ExportEntry, Fingerprint, Language, LanguageId, Millis, NewLanguage, NewTag, NewTranslation,
    Page, PageRequest, Tag, Translation, TranslationFilter, TranslationId, TranslationPatch,
};

use crate::cache::{CacheError, CacheStats};
use crate::storage::{FetchResult, IterationCursor, StoreError};

/// Result of an in-place translation update.
#[derive(Debug, Clone)]
pub struct TranslationChange {
    pub before: Translation,
    pub after: Translation,
}

/// Pluggable persistence backend for languages, tags, and translations.
/// Implementations: in-memory (default, tests), `redb` (file-backed).
///
/// Every write is atomic: a translation and its tag associations are
/// committed together, and every translation write advances the language's
/// mutation watermark (see [`latest_mutation`](Self::latest_mutation)).
#[async_trait]
pub trait TranslationStore: Send + Sync {
    /// Create a language. Codes are unique.
    async fn create_language(&self, input: NewLanguage) -> Result<Language, StoreError>;

    /// All languages, ordered by code.
    async fn list_languages(&self) -> Result<Vec<Language>, StoreError>;

    async fn language_by_code(&self, code: &str) -> Result<Option<Language>, StoreError>;

    async fn language_by_id(&self, id: LanguageId) -> Result<Option<Language>, StoreError>;

    /// Create a tag. Names are unique.
    async fn create_tag(&self, input: NewTag) -> Result<Tag, StoreError>;

    /// All tags, ordered by name.
    async fn list_tags(&self) -> Result<Vec<Tag>, StoreError>;

    /// Insert a translation, creating any referenced tags that do not exist.
    ///
    /// `input.tags` must already be normalized.
    async fn create_translation(&self, input: NewTranslation) -> Result<Translation, StoreError>;

    /// Insert many translations in one transaction, creating referenced tags.
    ///
    /// Fails as a whole on the first conflict or unknown language.
    async fn create_translations(
        &self,
        inputs: Vec<NewTranslation>,
    ) -> Result<Vec<Translation>, StoreError>;

    /// Apply a patch. A present `tags` list replaces the whole tag set.
    async fn update_translation(
        &self,
        id: TranslationId,
        patch: TranslationPatch,
    ) -> Result<TranslationChange, StoreError>;

    /// Remove a translation, returning it as it was.
    async fn delete_translation(&self, id: TranslationId) -> Result<Translation, StoreError>;

    async fn get_translation(&self, id: TranslationId) -> Result<Option<Translation>, StoreError>;

    /// Filtered listing ordered by key, then language.
    async fn search_translations(
        &self,
        filter: &TranslationFilter,
        page: PageRequest,
    ) -> Result<Page<Translation>, StoreError>;

    /// Latest mutation stamp for the language: the greatest `updated_at` of
    /// its translations, or the stamp of a later delete. `None` while the
    /// language has no translations, including after all were deleted.
    async fn latest_mutation(&self, language: LanguageId) -> Result<Option<Millis>, StoreError>;

    /// Next `limit` `(key, content)` rows of the language after `cursor`,
    /// in ascending key order.
    async fn fetch_export_page(
        &self,
        language: LanguageId,
        cursor: &IterationCursor,
        limit: usize,
    ) -> Result<FetchResult<ExportEntry>, StoreError>;
}

/// Cache of serialized language exports keyed by `(language code, fingerprint)`.
///
/// Entries are immutable once written: a payload is only ever stored under
/// the fingerprint it was computed for, so concurrent puts for the same key
/// carry identical bytes and last-writer-wins is safe.
///
/// Errors mean the backend is unreachable. Callers treat them as a miss
/// (reads) or log and continue (writes, invalidation); they never fail a
/// request.
#[async_trait]
pub trait ExportCache: Send + Sync {
    /// Cached payload for the exact fingerprint, if present and unexpired.
    async fn get(&self, language: &str, fingerprint: Fingerprint)
        -> Result<Option<Bytes>, CacheError>;

    /// Store a payload that expires after `ttl`.
    async fn put(
        &self,
        language: &str,
        fingerprint: Fingerprint,
        payload: Bytes,
        ttl: Duration,
    ) -> Result<(), CacheError>;

    /// Drop every entry cached for the language, whatever its fingerprint.
    /// Returns how many entries were removed.
    async fn invalidate_all(&self, language: &str) -> Result<usize, CacheError>;

    /// Drop expired entries. Returns how many were removed.
    async fn purge_expired(&self) -> Result<usize, CacheError>;

    /// Point-in-time counters.
    fn stats(&self) -> CacheStats;
}
