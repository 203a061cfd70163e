//! Language export: fingerprint resolution, cache lookup, and serialization.
//!
//! An export is served from the cache when an entry exists for the
//! language's current fingerprint. Otherwise the translations are read from
//! the store page by page and serialized with [`ExportWriter`]. Payloads
//! within the size budget are cached before being returned; a payload that
//! outgrows the budget is handed to the client as a stream instead, starting
//! with the bytes already rendered.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::{self, BoxStream, StreamExt};
use polyglot_core::{ExportWriter, Fingerprint, Language, LanguageId};
use tracing::{debug, info, warn};

use super::config::ServerConfig;
use super::error::ServiceError;
use crate::storage::IterationCursor;
use crate::traits::{ExportCache, TranslationStore};

/// How an export response was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Served from the cache.
    Hit,
    /// Rendered from the store and cached.
    Miss,
    /// Rendered from the store and streamed without caching.
    Bypass,
}

impl CacheStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "HIT",
            Self::Miss => "MISS",
            Self::Bypass => "BYPASS",
        }
    }
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Chunked export body. An `Err` item means the document is incomplete and
/// the response must be aborted.
pub type ExportStream = BoxStream<'static, Result<Bytes, ServiceError>>;

/// Export payload, either complete or still being produced.
pub enum ExportBody {
    Complete(Bytes),
    Stream(ExportStream),
}

impl fmt::Debug for ExportBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Complete(bytes) => f.debug_tuple("Complete").field(&bytes.len()).finish(),
            Self::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// Result of [`ExportService::export`].
#[derive(Debug)]
pub struct Export {
    pub language: Language,
    pub fingerprint: Fingerprint,
    pub status: CacheStatus,
    pub body: ExportBody,
}

/// Produces language exports, consulting and filling the export cache.
pub struct ExportService {
    store: Arc<dyn TranslationStore>,
    cache: Arc<dyn ExportCache>,
    ttl: Duration,
    max_cached_bytes: u64,
    page_size: usize,
}

impl ExportService {
    #[must_use]
    pub fn new(
        store: Arc<dyn TranslationStore>,
        cache: Arc<dyn ExportCache>,
        config: &ServerConfig,
    ) -> Self {
        Self {
            store,
            cache,
            ttl: config.cache_ttl,
            max_cached_bytes: config.max_cached_export_bytes,
            page_size: config.export_page_size.max(1),
        }
    }

    /// Current fingerprint of a language's translation set.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] if the store cannot be read.
    pub async fn fingerprint(&self, language: LanguageId) -> Result<Fingerprint, ServiceError> {
        let latest = self.store.latest_mutation(language).await?;
        Ok(Fingerprint::from_latest_mutation(latest))
    }

    /// Exports every translation of the language with the given code.
    ///
    /// Cache failures never fail the export: a failed lookup is treated as a
    /// miss and a failed store is logged.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] for an unknown code, or a store or
    /// serialization error while rendering.
    pub async fn export(&self, code: &str) -> Result<Export, ServiceError> {
        let language = self
            .store
            .language_by_code(code)
            .await?
            .ok_or_else(|| ServiceError::language_code(code))?;
        let fingerprint = self.fingerprint(language.id).await?;

        match self.cache.get(&language.code, fingerprint).await {
            Ok(Some(payload)) => {
                debug!(language = %language.code, %fingerprint, bytes = payload.len(), "export cache hit");
                return Ok(Export {
                    language,
                    fingerprint,
                    status: CacheStatus::Hit,
                    body: ExportBody::Complete(payload),
                });
            }
            Ok(None) => {}
            Err(e) => {
                warn!(language = %language.code, error = %e, "export cache lookup failed, rendering fresh");
            }
        }

        self.render(language, fingerprint).await
    }

    async fn render(
        &self,
        language: Language,
        fingerprint: Fingerprint,
    ) -> Result<Export, ServiceError> {
        let mut writer = ExportWriter::new(Vec::new())?;
        let mut cursor = IterationCursor::start();

        while !cursor.finished {
            let page = self
                .store
                .fetch_export_page(language.id, &cursor, self.page_size)
                .await?;
            for entry in &page.items {
                writer.entry(&entry.key, &entry.content)?;
            }
            cursor = page.next_cursor;

            if writer.finished_len() > self.max_cached_bytes {
                info!(
                    language = %language.code,
                    %fingerprint,
                    bytes = writer.bytes_written(),
                    limit = self.max_cached_bytes,
                    "export exceeds cache budget, streaming uncached"
                );
                let stream = ExportStreamState {
                    store: Arc::clone(&self.store),
                    language: language.id,
                    cursor,
                    page_size: self.page_size,
                    writer: Some(writer),
                }
                .into_stream();
                return Ok(Export {
                    language,
                    fingerprint,
                    status: CacheStatus::Bypass,
                    body: ExportBody::Stream(stream),
                });
            }
        }

        let entries = writer.entries();
        let payload = Bytes::from(writer.finish()?);
        if let Err(e) = self
            .cache
            .put(&language.code, fingerprint, payload.clone(), self.ttl)
            .await
        {
            warn!(language = %language.code, error = %e, "export cache store failed");
        }
        debug!(
            language = %language.code,
            %fingerprint,
            entries,
            bytes = payload.len(),
            "export rendered and cached"
        );

        Ok(Export {
            language,
            fingerprint,
            status: CacheStatus::Miss,
            body: ExportBody::Complete(payload),
        })
    }
}

/// Resumable state of an uncached export stream.
struct ExportStreamState {
    store: Arc<dyn TranslationStore>,
    language: LanguageId,
    cursor: IterationCursor,
    page_size: usize,
    /// `None` once the closing braces have been emitted.
    writer: Option<ExportWriter<Vec<u8>>>,
}

impl ExportStreamState {
    fn into_stream(self) -> ExportStream {
        stream::try_unfold(self, Self::next_chunk).boxed()
    }

    async fn next_chunk(mut self) -> Result<Option<(Bytes, Self)>, ServiceError> {
        loop {
            let Some(writer) = self.writer.as_mut() else {
                return Ok(None);
            };
            if writer.buffered_len() > 0 {
                let chunk = Bytes::from(writer.take_buffered());
                return Ok(Some((chunk, self)));
            }
            if self.cursor.finished {
                let tail = match self.writer.take() {
                    Some(writer) => writer.finish()?,
                    None => return Ok(None),
                };
                return Ok(Some((Bytes::from(tail), self)));
            }

            let page = self
                .store
                .fetch_export_page(self.language, &self.cursor, self.page_size)
                .await?;
            for entry in &page.items {
                writer.entry(&entry.key, &entry.content)?;
            }
            self.cursor = page.next_cursor;
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use futures_util::TryStreamExt;
    use polyglot_core::{
        parse_export, ManualClock, MutationClock, NewLanguage, NewTranslation, TranslationPatch,
        EMPTY_EXPORT,
    };

    use super::*;
    use crate::cache::{CacheError, CacheStats, InMemoryExportCache};
    use crate::storage::engines::MemoryStore;

    struct Fixture {
        store: Arc<MemoryStore>,
        cache: Arc<InMemoryExportCache>,
        en: Language,
    }

    async fn fixture() -> Fixture {
        let clock = Arc::new(MutationClock::new(Box::new(ManualClock::new(1_000))));
        let store = Arc::new(MemoryStore::with_clock(clock));
        let en = store
            .create_language(NewLanguage {
                code: "en".into(),
                name: "English".into(),
            })
            .await
            .unwrap();
        Fixture {
            store,
            cache: Arc::new(InMemoryExportCache::new()),
            en,
        }
    }

    impl Fixture {
        fn service(&self, config: &ServerConfig) -> ExportService {
            ExportService::new(
                Arc::clone(&self.store) as Arc<dyn TranslationStore>,
                Arc::clone(&self.cache) as Arc<dyn ExportCache>,
                config,
            )
        }

        async fn add(&self, key: &str, content: &str) {
            self.store
                .create_translation(NewTranslation {
                    key: key.into(),
                    language_id: Some(self.en.id),
                    content: content.into(),
                    ..NewTranslation::default()
                })
                .await
                .unwrap();
        }
    }

    async fn body_bytes(body: ExportBody) -> Vec<u8> {
        match body {
            ExportBody::Complete(bytes) => bytes.to_vec(),
            ExportBody::Stream(stream) => {
                let chunks: Vec<Bytes> = stream.try_collect().await.unwrap();
                chunks.concat()
            }
        }
    }

    #[tokio::test]
    async fn unknown_language_is_not_found() {
        let f = fixture().await;
        let err = f.service(&ServerConfig::default()).export("xx").await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { resource: "language", .. }));
    }

    #[tokio::test]
    async fn empty_language_exports_empty_document_under_sentinel() {
        let f = fixture().await;
        let export = f.service(&ServerConfig::default()).export("en").await.unwrap();
        assert!(export.fingerprint.is_sentinel());
        assert_eq!(export.status, CacheStatus::Miss);
        assert_eq!(body_bytes(export.body).await, EMPTY_EXPORT);
    }

    #[tokio::test]
    async fn miss_then_hit_then_miss_after_write() {
        let f = fixture().await;
        f.add("greeting", "Hello").await;
        f.add("farewell", "Bye").await;
        let service = f.service(&ServerConfig::default());

        let first = service.export("en").await.unwrap();
        assert_eq!(first.status, CacheStatus::Miss);
        let first_body = body_bytes(first.body).await;
        assert_eq!(
            first_body,
            br#"{"translations":{"farewell":"Bye","greeting":"Hello"}}"#
        );

        let second = service.export("en").await.unwrap();
        assert_eq!(second.status, CacheStatus::Hit);
        assert_eq!(second.fingerprint, first.fingerprint);
        assert_eq!(body_bytes(second.body).await, first_body);

        // A write changes the fingerprint even without invalidation.
        let greeting = f
            .store
            .search_translations(&Default::default(), Default::default())
            .await
            .unwrap()
            .items
            .into_iter()
            .find(|t| t.key == "greeting")
            .unwrap();
        f.store
            .update_translation(
                greeting.id,
                TranslationPatch {
                    content: Some("Hi".into()),
                    ..TranslationPatch::default()
                },
            )
            .await
            .unwrap();

        let third = service.export("en").await.unwrap();
        assert_eq!(third.status, CacheStatus::Miss);
        assert_ne!(third.fingerprint, first.fingerprint);
        let parsed = parse_export(&body_bytes(third.body).await).unwrap();
        assert_eq!(parsed["greeting"], "Hi");
        assert_eq!(parsed["farewell"], "Bye");
    }

    #[tokio::test]
    async fn deleting_every_translation_returns_to_the_sentinel() {
        let f = fixture().await;
        f.add("greeting", "Hello").await;
        let service = f.service(&ServerConfig::default());

        let before = service.export("en").await.unwrap();
        assert!(!before.fingerprint.is_sentinel());

        let rows = f
            .store
            .search_translations(&Default::default(), Default::default())
            .await
            .unwrap()
            .items;
        for row in rows {
            f.store.delete_translation(row.id).await.unwrap();
        }

        let after = service.export("en").await.unwrap();
        assert!(after.fingerprint.is_sentinel());
        assert_eq!(after.status, CacheStatus::Miss);
        assert_eq!(body_bytes(after.body).await, EMPTY_EXPORT);
    }

    #[tokio::test]
    async fn oversized_export_streams_without_caching() {
        let f = fixture().await;
        for i in 0..50 {
            f.add(&format!("key.{i:03}"), &"x".repeat(40)).await;
        }
        let config = ServerConfig {
            max_cached_export_bytes: 256,
            export_page_size: 7,
            ..ServerConfig::default()
        };
        let service = f.service(&config);

        let export = service.export("en").await.unwrap();
        assert_eq!(export.status, CacheStatus::Bypass);
        let body = body_bytes(export.body).await;
        let parsed = parse_export(&body).unwrap();
        assert_eq!(parsed.len(), 50);
        assert_eq!(parsed.keys().next().map(String::as_str), Some("key.000"));
        assert_eq!(f.cache.stats().stores, 0);

        // Still bypassed on the next request.
        let again = service.export("en").await.unwrap();
        assert_eq!(again.status, CacheStatus::Bypass);
        assert_eq!(body_bytes(again.body).await, body);
    }

    #[tokio::test]
    async fn streamed_and_buffered_renderings_are_identical() {
        let f = fixture().await;
        for i in 0..20 {
            f.add(&format!("k{i:02}"), &format!("v\"{i}\"\n")).await;
        }
        let buffered = f.service(&ServerConfig::default()).export("en").await.unwrap();
        assert_eq!(buffered.status, CacheStatus::Miss);
        // A separate cache, so the payload stored above cannot answer it.
        let streamed = ExportService::new(
            Arc::clone(&f.store) as Arc<dyn TranslationStore>,
            Arc::new(InMemoryExportCache::new()),
            &ServerConfig {
                max_cached_export_bytes: 1,
                export_page_size: 3,
                ..ServerConfig::default()
            },
        )
        .export("en")
        .await
        .unwrap();
        assert_eq!(streamed.status, CacheStatus::Bypass);
        assert_eq!(body_bytes(buffered.body).await, body_bytes(streamed.body).await);
    }

    struct UnavailableCache;

    #[async_trait]
    impl ExportCache for UnavailableCache {
        async fn get(&self, _: &str, _: Fingerprint) -> Result<Option<Bytes>, CacheError> {
            Err(CacheError::Unavailable("offline".into()))
        }
        async fn put(&self, _: &str, _: Fingerprint, _: Bytes, _: Duration) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("offline".into()))
        }
        async fn invalidate_all(&self, _: &str) -> Result<usize, CacheError> {
            Err(CacheError::Unavailable("offline".into()))
        }
        async fn purge_expired(&self) -> Result<usize, CacheError> {
            Ok(0)
        }
        fn stats(&self) -> CacheStats {
            CacheStats::default()
        }
    }

    #[tokio::test]
    async fn unavailable_cache_degrades_to_fresh_rendering() {
        let f = fixture().await;
        f.add("greeting", "Hello").await;
        let service = ExportService::new(
            Arc::clone(&f.store) as Arc<dyn TranslationStore>,
            Arc::new(UnavailableCache),
            &ServerConfig::default(),
        );
        for _ in 0..2 {
            let export = service.export("en").await.unwrap();
            assert_eq!(export.status, CacheStatus::Miss);
            assert_eq!(
                body_bytes(export.body).await,
                br#"{"translations":{"greeting":"Hello"}}"#
            );
        }
    }
}
