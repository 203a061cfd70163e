//! In-memory [`TranslationStore`] implementation.
//!
//! All tables live behind a single [`RwLock`], so a translation and its tag
//! associations change in one critical section and readers never observe a
//! half-applied write. A `(language, key)`-ordered index serves export pages
//! and language-scoped searches without scanning other languages.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use polyglot_core::{
    ExportEntry, Language, LanguageId, Millis, MutationClock, NewLanguage, NewTag,
    NewTranslation, Page, PageRequest, Tag, TagId, Translation, TranslationFilter, TranslationId,
    TranslationPatch,
};

use crate::storage::engine::{FetchResult, IterationCursor};
use crate::storage::StoreError;
use crate::traits::{TranslationChange, TranslationStore};

#[derive(Default)]
struct Tables {
    next_language: u64,
    next_tag: u64,
    next_translation: u64,
    languages: BTreeMap<LanguageId, Language>,
    language_codes: HashMap<String, LanguageId>,
    tags: BTreeMap<TagId, Tag>,
    tag_names: HashMap<String, TagId>,
    translations: HashMap<TranslationId, Translation>,
    by_language_key: BTreeMap<(LanguageId, String), TranslationId>,
    watermarks: HashMap<LanguageId, Millis>,
}

impl Tables {
    /// Resolves tag names to tags, creating the missing ones. Result is
    /// sorted by name.
    fn resolve_tags(&mut self, names: &[String]) -> Vec<Tag> {
        let mut tags: Vec<Tag> = names
            .iter()
            .map(|name| match self.tag_names.get(name).copied() {
                Some(id) => self.tags[&id].clone(),
                None => self.insert_tag(name),
            })
            .collect();
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        tags.dedup_by(|a, b| a.id == b.id);
        tags
    }

    fn insert_tag(&mut self, name: &str) -> Tag {
        self.next_tag += 1;
        let tag = Tag {
            id: TagId(self.next_tag),
            name: name.to_string(),
        };
        self.tags.insert(tag.id, tag.clone());
        self.tag_names.insert(tag.name.clone(), tag.id);
        tag
    }

    fn check_insertable(&self, input: &NewTranslation) -> Result<LanguageId, StoreError> {
        let language_id = input
            .language_id
            .ok_or(StoreError::LanguageNotFound(LanguageId(0)))?;
        if !self.languages.contains_key(&language_id) {
            return Err(StoreError::LanguageNotFound(language_id));
        }
        if self
            .by_language_key
            .contains_key(&(language_id, input.key.clone()))
        {
            return Err(StoreError::duplicate_translation_key(&input.key));
        }
        Ok(language_id)
    }

    fn insert_translation(
        &mut self,
        input: NewTranslation,
        language_id: LanguageId,
        now: Millis,
    ) -> Translation {
        let tags = self.resolve_tags(&input.tags);
        self.next_translation += 1;
        let translation = Translation {
            id: TranslationId(self.next_translation),
            key: input.key,
            language_id,
            content: input.content,
            context: input.context,
            tags,
            created_at: now,
            updated_at: now,
        };
        self.by_language_key
            .insert((language_id, translation.key.clone()), translation.id);
        self.translations.insert(translation.id, translation.clone());
        self.bump_watermark(language_id, now);
        translation
    }

    fn bump_watermark(&mut self, language_id: LanguageId, stamp: Millis) {
        let mark = self.watermarks.entry(language_id).or_default();
        *mark = (*mark).max(stamp);
    }
}

/// In-memory translation store for development, tests, and single-node
/// deployments where all data fits in memory.
pub struct MemoryStore {
    tables: RwLock<Tables>,
    clock: Arc<MutationClock>,
}

impl MemoryStore {
    /// Creates an empty store stamping writes with the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(MutationClock::system()))
    }

    /// Creates an empty store stamping writes with the given clock.
    #[must_use]
    pub fn with_clock(clock: Arc<MutationClock>) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            clock,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TranslationStore for MemoryStore {
    async fn create_language(&self, input: NewLanguage) -> Result<Language, StoreError> {
        let mut tables = self.tables.write();
        if tables.language_codes.contains_key(&input.code) {
            return Err(StoreError::duplicate_language_code(&input.code));
        }
        tables.next_language += 1;
        let language = Language {
            id: LanguageId(tables.next_language),
            code: input.code,
            name: input.name,
            created_at: self.clock.tick(),
        };
        tables
            .language_codes
            .insert(language.code.clone(), language.id);
        tables.languages.insert(language.id, language.clone());
        Ok(language)
    }

    async fn list_languages(&self) -> Result<Vec<Language>, StoreError> {
        let tables = self.tables.read();
        let mut languages: Vec<Language> = tables.languages.values().cloned().collect();
        languages.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(languages)
    }

    async fn language_by_code(&self, code: &str) -> Result<Option<Language>, StoreError> {
        let tables = self.tables.read();
        Ok(tables
            .language_codes
            .get(code)
            .and_then(|id| tables.languages.get(id))
            .cloned())
    }

    async fn language_by_id(&self, id: LanguageId) -> Result<Option<Language>, StoreError> {
        Ok(self.tables.read().languages.get(&id).cloned())
    }

    async fn create_tag(&self, input: NewTag) -> Result<Tag, StoreError> {
        let mut tables = self.tables.write();
        if tables.tag_names.contains_key(&input.name) {
            return Err(StoreError::duplicate_tag_name(&input.name));
        }
        Ok(tables.insert_tag(&input.name))
    }

    async fn list_tags(&self) -> Result<Vec<Tag>, StoreError> {
        let tables = self.tables.read();
        let mut tags: Vec<Tag> = tables.tags.values().cloned().collect();
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tags)
    }

    async fn create_translation(&self, input: NewTranslation) -> Result<Translation, StoreError> {
        let mut tables = self.tables.write();
        let language_id = tables.check_insertable(&input)?;
        let now = self.clock.tick();
        Ok(tables.insert_translation(input, language_id, now))
    }

    async fn create_translations(
        &self,
        inputs: Vec<NewTranslation>,
    ) -> Result<Vec<Translation>, StoreError> {
        let mut tables = self.tables.write();

        // Validate the whole batch first so a failure leaves nothing behind.
        let mut seen = std::collections::HashSet::new();
        let mut language_ids = Vec::with_capacity(inputs.len());
        for input in &inputs {
            let language_id = tables.check_insertable(input)?;
            if !seen.insert((language_id, input.key.as_str())) {
                return Err(StoreError::duplicate_translation_key(&input.key));
            }
            language_ids.push(language_id);
        }

        let created = inputs
            .into_iter()
            .zip(language_ids)
            .map(|(input, language_id)| {
                let now = self.clock.tick();
                tables.insert_translation(input, language_id, now)
            })
            .collect();
        Ok(created)
    }

    async fn update_translation(
        &self,
        id: TranslationId,
        patch: TranslationPatch,
    ) -> Result<TranslationChange, StoreError> {
        let mut tables = self.tables.write();
        let before = tables
            .translations
            .get(&id)
            .cloned()
            .ok_or(StoreError::TranslationNotFound(id))?;

        let mut after = before.clone();
        if let Some(content) = patch.content {
            after.content = content;
        }
        if let Some(context) = patch.context {
            after.context = context;
        }
        if let Some(names) = patch.tags {
            after.tags = tables.resolve_tags(&names);
        }
        after.updated_at = self.clock.tick();

        tables.bump_watermark(after.language_id, after.updated_at);
        tables.translations.insert(id, after.clone());
        Ok(TranslationChange { before, after })
    }

    async fn delete_translation(&self, id: TranslationId) -> Result<Translation, StoreError> {
        let mut tables = self.tables.write();
        let removed = tables
            .translations
            .remove(&id)
            .ok_or(StoreError::TranslationNotFound(id))?;
        tables
            .by_language_key
            .remove(&(removed.language_id, removed.key.clone()));
        let now = self.clock.tick();
        tables.bump_watermark(removed.language_id, now);
        Ok(removed)
    }

    async fn get_translation(&self, id: TranslationId) -> Result<Option<Translation>, StoreError> {
        Ok(self.tables.read().translations.get(&id).cloned())
    }

    async fn search_translations(
        &self,
        filter: &TranslationFilter,
        page: PageRequest,
    ) -> Result<Page<Translation>, StoreError> {
        let tables = self.tables.read();

        let mut matches: Vec<&Translation> = match filter.language_id {
            // Language-scoped: walk that language's slice of the index, already in key order.
            Some(language_id) => tables
                .by_language_key
                .range((language_id, String::new())..)
                .take_while(|((lang, _), _)| *lang == language_id)
                .filter_map(|(_, id)| tables.translations.get(id))
                .filter(|t| filter.matches(t))
                .collect(),
            None => {
                let mut all: Vec<&Translation> = tables
                    .translations
                    .values()
                    .filter(|t| filter.matches(t))
                    .collect();
                all.sort_by(|a, b| a.key.cmp(&b.key).then(a.language_id.cmp(&b.language_id)));
                all
            }
        };

        let total = matches.len() as u64;
        let items = matches
            .drain(..)
            .skip(page.offset())
            .take(page.per_page as usize)
            .cloned()
            .collect();
        Ok(Page {
            items,
            total,
            request: page,
        })
    }

    async fn latest_mutation(&self, language: LanguageId) -> Result<Option<Millis>, StoreError> {
        let tables = self.tables.read();
        let has_rows = tables
            .by_language_key
            .range((language, String::new())..)
            .next()
            .is_some_and(|((lang, _), _)| *lang == language);
        if !has_rows {
            return Ok(None);
        }
        Ok(tables.watermarks.get(&language).copied())
    }

    async fn fetch_export_page(
        &self,
        language: LanguageId,
        cursor: &IterationCursor,
        limit: usize,
    ) -> Result<FetchResult<ExportEntry>, StoreError> {
        if cursor.finished {
            return Ok(FetchResult {
                items: Vec::new(),
                next_cursor: cursor.clone(),
            });
        }

        let tables = self.tables.read();
        let lower = match &cursor.after {
            Some(after) => Bound::Excluded((language, after.clone())),
            None => Bound::Included((language, String::new())),
        };

        let items: Vec<ExportEntry> = tables
            .by_language_key
            .range((lower, Bound::Unbounded))
            .take_while(|((lang, _), _)| *lang == language)
            .take(limit)
            .filter_map(|(_, id)| tables.translations.get(id))
            .map(|t| ExportEntry {
                key: t.key.clone(),
                content: t.content.clone(),
            })
            .collect();

        let last_key = items
            .last()
            .map(|e| e.key.clone())
            .or_else(|| cursor.after.clone());
        let fetched = items.len();
        Ok(FetchResult {
            items,
            next_cursor: IterationCursor::after_page(last_key, fetched, limit),
        })
    }
}

#[cfg(test)]
mod tests {
    use polyglot_core::ManualClock;

    use super::*;

    fn store_at(millis: Millis) -> MemoryStore {
        MemoryStore::with_clock(Arc::new(MutationClock::new(Box::new(ManualClock::new(
            millis,
        )))))
    }

    async fn language(store: &MemoryStore, code: &str) -> Language {
        store
            .create_language(NewLanguage {
                code: code.to_string(),
                name: code.to_uppercase(),
            })
            .await
            .unwrap()
    }

    fn new_translation(language: &Language, key: &str, content: &str) -> NewTranslation {
        NewTranslation {
            key: key.to_string(),
            language_id: Some(language.id),
            content: content.to_string(),
            context: None,
            tags: Vec::new(),
        }
    }

    async fn drain_export(store: &MemoryStore, language: LanguageId, limit: usize) -> Vec<String> {
        let mut cursor = IterationCursor::start();
        let mut keys = Vec::new();
        while !cursor.finished {
            let page = store.fetch_export_page(language, &cursor, limit).await.unwrap();
            assert!(page.items.len() <= limit);
            keys.extend(page.items.into_iter().map(|e| e.key));
            cursor = page.next_cursor;
        }
        keys
    }

    #[tokio::test]
    async fn duplicate_language_code_conflicts() {
        let store = store_at(1_000);
        language(&store, "en").await;
        let err = store
            .create_language(NewLanguage {
                code: "en".to_string(),
                name: "English again".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { field: "code", .. }));
    }

    #[tokio::test]
    async fn languages_and_tags_list_in_name_order() {
        let store = store_at(1_000);
        language(&store, "fr").await;
        language(&store, "de").await;
        language(&store, "en").await;
        store.create_tag(NewTag { name: "web".into() }).await.unwrap();
        store.create_tag(NewTag { name: "auth".into() }).await.unwrap();

        let codes: Vec<_> = store.list_languages().await.unwrap().into_iter().map(|l| l.code).collect();
        assert_eq!(codes, ["de", "en", "fr"]);
        let names: Vec<_> = store.list_tags().await.unwrap().into_iter().map(|t| t.name).collect();
        assert_eq!(names, ["auth", "web"]);
    }

    #[tokio::test]
    async fn key_is_unique_per_language_only() {
        let store = store_at(1_000);
        let en = language(&store, "en").await;
        let fr = language(&store, "fr").await;

        store.create_translation(new_translation(&en, "greeting", "Hello")).await.unwrap();
        store.create_translation(new_translation(&fr, "greeting", "Bonjour")).await.unwrap();

        let err = store
            .create_translation(new_translation(&en, "greeting", "Hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { field: "key", .. }));
    }

    #[tokio::test]
    async fn unknown_language_is_rejected() {
        let store = store_at(1_000);
        let mut input = NewTranslation {
            key: "k".into(),
            content: "c".into(),
            ..NewTranslation::default()
        };
        input.language_id = Some(LanguageId(99));
        let err = store.create_translation(input).await.unwrap_err();
        assert!(matches!(err, StoreError::LanguageNotFound(LanguageId(99))));
    }

    #[tokio::test]
    async fn tags_are_created_on_first_reference_and_replaced_on_update() {
        let store = store_at(1_000);
        let en = language(&store, "en").await;

        let mut input = new_translation(&en, "login", "Log in");
        input.tags = vec!["web".into(), "auth".into()];
        let created = store.create_translation(input).await.unwrap();
        let names: Vec<_> = created.tags.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["auth", "web"]);
        assert_eq!(store.list_tags().await.unwrap().len(), 2);

        let change = store
            .update_translation(
                created.id,
                TranslationPatch {
                    tags: Some(vec!["mobile".into()]),
                    ..TranslationPatch::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(change.before.tags.len(), 2);
        assert_eq!(change.after.tags.len(), 1);
        assert_eq!(change.after.tags[0].name, "mobile");
        assert!(change.after.updated_at > change.before.updated_at);
        assert_eq!(store.list_tags().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn patch_without_tags_keeps_tag_set() {
        let store = store_at(1_000);
        let en = language(&store, "en").await;
        let mut input = new_translation(&en, "login", "Log in");
        input.tags = vec!["web".into()];
        input.context = Some("header".into());
        let created = store.create_translation(input).await.unwrap();

        let change = store
            .update_translation(
                created.id,
                TranslationPatch {
                    content: Some("Sign in".into()),
                    context: Some(None),
                    tags: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(change.after.content, "Sign in");
        assert_eq!(change.after.context, None);
        assert_eq!(change.after.tags, created.tags);
    }

    #[tokio::test]
    async fn latest_mutation_tracks_every_write() {
        let store = store_at(5_000);
        let en = language(&store, "en").await;
        let fr = language(&store, "fr").await;
        assert_eq!(store.latest_mutation(en.id).await.unwrap(), None);

        let a = store.create_translation(new_translation(&en, "a", "1")).await.unwrap();
        let after_create = store.latest_mutation(en.id).await.unwrap().unwrap();
        assert_eq!(after_create, a.updated_at);

        let b = store.create_translation(new_translation(&en, "b", "2")).await.unwrap();
        let after_second = store.latest_mutation(en.id).await.unwrap().unwrap();
        assert!(after_second > after_create);
        assert_eq!(after_second, b.updated_at);

        // Deleting a row that is not the newest still moves the watermark.
        store.delete_translation(a.id).await.unwrap();
        let after_delete = store.latest_mutation(en.id).await.unwrap().unwrap();
        assert!(after_delete > after_second);

        // Other languages are unaffected.
        assert_eq!(store.latest_mutation(fr.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn emptied_language_has_no_latest_mutation() {
        let store = store_at(5_000);
        let en = language(&store, "en").await;
        let a = store.create_translation(new_translation(&en, "a", "1")).await.unwrap();
        let b = store.create_translation(new_translation(&en, "b", "2")).await.unwrap();

        store.delete_translation(a.id).await.unwrap();
        assert!(store.latest_mutation(en.id).await.unwrap().is_some());
        store.delete_translation(b.id).await.unwrap();
        assert_eq!(store.latest_mutation(en.id).await.unwrap(), None);

        // Writing again yields a stamp above everything seen before.
        let c = store.create_translation(new_translation(&en, "c", "3")).await.unwrap();
        let stamp = store.latest_mutation(en.id).await.unwrap().unwrap();
        assert_eq!(stamp, c.updated_at);
        assert!(stamp > b.updated_at);
    }

    #[tokio::test]
    async fn export_pages_are_key_ordered_and_language_scoped() {
        let store = store_at(1_000);
        let en = language(&store, "en").await;
        let fr = language(&store, "fr").await;
        for key in ["delta", "alpha", "echo", "charlie", "bravo"] {
            store.create_translation(new_translation(&en, key, key)).await.unwrap();
        }
        store.create_translation(new_translation(&fr, "aaa", "x")).await.unwrap();

        assert_eq!(
            drain_export(&store, en.id, 2).await,
            ["alpha", "bravo", "charlie", "delta", "echo"]
        );
        assert_eq!(drain_export(&store, fr.id, 2).await, ["aaa"]);
        assert!(drain_export(&store, LanguageId(42), 2).await.is_empty());
    }

    #[tokio::test]
    async fn export_cursor_survives_concurrent_deletes() {
        let store = store_at(1_000);
        let en = language(&store, "en").await;
        let mut ids = HashMap::new();
        for key in ["a", "b", "c", "d"] {
            let t = store.create_translation(new_translation(&en, key, key)).await.unwrap();
            ids.insert(key, t.id);
        }

        let first = store.fetch_export_page(en.id, &IterationCursor::start(), 2).await.unwrap();
        assert_eq!(first.items.len(), 2);
        store.delete_translation(ids["b"]).await.unwrap();
        store.delete_translation(ids["c"]).await.unwrap();

        let second = store.fetch_export_page(en.id, &first.next_cursor, 2).await.unwrap();
        let keys: Vec<_> = second.items.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, ["d"]);
        assert!(second.next_cursor.finished);
    }

    #[tokio::test]
    async fn search_filters_and_paginates() {
        let store = store_at(1_000);
        let en = language(&store, "en").await;
        let fr = language(&store, "fr").await;
        for i in 0..7 {
            let mut input = new_translation(&en, &format!("menu.item{i}"), &format!("Item {i}"));
            if i % 2 == 0 {
                input.tags = vec!["web".into()];
            }
            store.create_translation(input).await.unwrap();
        }
        store.create_translation(new_translation(&fr, "menu.item0", "Élément")).await.unwrap();
        store.create_translation(new_translation(&en, "title", "Title")).await.unwrap();

        let filter = TranslationFilter {
            key_prefix: Some("menu.".into()),
            ..TranslationFilter::default()
        };
        let page = store
            .search_translations(&filter, PageRequest { page: 1, per_page: 3 })
            .await
            .unwrap();
        assert_eq!(page.total, 8);
        assert_eq!(page.last_page(), 3);
        // Ordered by key, then language: both "menu.item0" rows come first.
        assert_eq!(page.items[0].key, "menu.item0");
        assert_eq!(page.items[0].language_id, en.id);
        assert_eq!(page.items[1].language_id, fr.id);

        let tagged = TranslationFilter {
            language_id: Some(en.id),
            tag: Some("web".into()),
            ..TranslationFilter::default()
        };
        let page = store
            .search_translations(&tagged, PageRequest { page: 2, per_page: 3 })
            .await
            .unwrap();
        assert_eq!(page.total, 4);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].key, "menu.item6");
    }

    #[tokio::test]
    async fn batch_insert_is_all_or_nothing() {
        let store = store_at(1_000);
        let en = language(&store, "en").await;
        store.create_translation(new_translation(&en, "taken", "x")).await.unwrap();

        let err = store
            .create_translations(vec![
                new_translation(&en, "fresh", "1"),
                new_translation(&en, "taken", "2"),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        assert_eq!(drain_export(&store, en.id, 10).await, ["taken"]);

        let created = store
            .create_translations(vec![
                new_translation(&en, "one", "1"),
                new_translation(&en, "two", "2"),
            ])
            .await
            .unwrap();
        assert_eq!(created.len(), 2);
        assert!(created[1].updated_at > created[0].updated_at);
    }

    #[tokio::test]
    async fn missing_rows_report_not_found() {
        let store = store_at(1_000);
        let err = store.delete_translation(TranslationId(5)).await.unwrap_err();
        assert!(matches!(err, StoreError::TranslationNotFound(TranslationId(5))));
        let err = store
            .update_translation(TranslationId(5), TranslationPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::TranslationNotFound(_)));
        assert!(store.get_translation(TranslationId(5)).await.unwrap().is_none());
    }

    proptest::proptest! {
        #[test]
        fn export_paging_yields_every_key_once_in_order(
            keys in proptest::collection::btree_set("[a-z.]{1,12}", 0..40),
            limit in 1usize..8,
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let exported = runtime.block_on(async {
                let store = store_at(1_000);
                let en = language(&store, "en").await;
                let other = language(&store, "fr").await;
                for key in keys.iter().rev() {
                    store.create_translation(new_translation(&en, key, "x")).await.unwrap();
                    store.create_translation(new_translation(&other, key, "y")).await.unwrap();
                }
                drain_export(&store, en.id, limit).await
            });
            let expected: Vec<String> = keys.into_iter().collect();
            proptest::prop_assert_eq!(exported, expected);
        }
    }
}
