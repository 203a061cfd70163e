//! File-backed [`TranslationStore`] on top of `redb`.
//!
//! Each store call runs one redb transaction on the blocking pool. Rows are
//! JSON-encoded; secondary tables keep the unique indexes (`language_codes`,
//! `tag_names`, `translation_keys`) and the per-language mutation watermark.
//! The last issued clock stamp is persisted in `meta` so stamps keep
//! increasing across restarts.

use std::ops::Bound;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use polyglot_core::{
    ExportEntry, Language, LanguageId, Millis, MutationClock, NewLanguage, NewTag,
    NewTranslation, Page, PageRequest, Tag, TagId, Translation, TranslationFilter, TranslationId,
    TranslationPatch,
};
use redb::{
    Database, ReadTransaction, ReadableTable, Table, TableDefinition, WriteTransaction,
};
use serde::de::DeserializeOwned;

use crate::storage::engine::{FetchResult, IterationCursor};
use crate::storage::StoreError;
use crate::traits::{TranslationChange, TranslationStore};

const META: TableDefinition<&str, u64> = TableDefinition::new("meta");
const LANGUAGES: TableDefinition<u64, &[u8]> = TableDefinition::new("languages");
const LANGUAGE_CODES: TableDefinition<&str, u64> = TableDefinition::new("language_codes");
const TAGS: TableDefinition<u64, &[u8]> = TableDefinition::new("tags");
const TAG_NAMES: TableDefinition<&str, u64> = TableDefinition::new("tag_names");
const TRANSLATIONS: TableDefinition<u64, &[u8]> = TableDefinition::new("translations");
const TRANSLATION_KEYS: TableDefinition<(u64, &str), u64> =
    TableDefinition::new("translation_keys");
const WATERMARKS: TableDefinition<u64, u64> = TableDefinition::new("watermarks");

const CLOCK: &str = "clock";
const NEXT_LANGUAGE: &str = "next_language";
const NEXT_TAG: &str = "next_tag";
const NEXT_TRANSLATION: &str = "next_translation";

macro_rules! backend_error {
    ($($ty:ty),* $(,)?) => {$(
        impl From<$ty> for StoreError {
            fn from(err: $ty) -> Self {
                Self::Backend(redb::Error::from(err).into())
            }
        }
    )*};
}

backend_error!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// All tables of one write transaction, opened once.
struct WriteTables<'txn> {
    meta: Table<'txn, &'static str, u64>,
    languages: Table<'txn, u64, &'static [u8]>,
    language_codes: Table<'txn, &'static str, u64>,
    tags: Table<'txn, u64, &'static [u8]>,
    tag_names: Table<'txn, &'static str, u64>,
    translations: Table<'txn, u64, &'static [u8]>,
    translation_keys: Table<'txn, (u64, &'static str), u64>,
    watermarks: Table<'txn, u64, u64>,
}

impl<'txn> WriteTables<'txn> {
    fn open(txn: &'txn WriteTransaction) -> Result<Self, StoreError> {
        Ok(Self {
            meta: txn.open_table(META)?,
            languages: txn.open_table(LANGUAGES)?,
            language_codes: txn.open_table(LANGUAGE_CODES)?,
            tags: txn.open_table(TAGS)?,
            tag_names: txn.open_table(TAG_NAMES)?,
            translations: txn.open_table(TRANSLATIONS)?,
            translation_keys: txn.open_table(TRANSLATION_KEYS)?,
            watermarks: txn.open_table(WATERMARKS)?,
        })
    }

    fn next_id(&mut self, counter: &str) -> Result<u64, StoreError> {
        let next = self.meta.get(counter)?.map_or(0, |v| v.value()) + 1;
        self.meta.insert(counter, next)?;
        Ok(next)
    }

    /// Issues a stamp from `clock` and persists it as the high-water mark.
    fn stamp(&mut self, clock: &MutationClock) -> Result<Millis, StoreError> {
        let now = clock.tick();
        self.meta.insert(CLOCK, now)?;
        Ok(now)
    }

    fn bump_watermark(&mut self, language: LanguageId, stamp: Millis) -> Result<(), StoreError> {
        let current = self.watermarks.get(language.0)?.map_or(0, |v| v.value());
        self.watermarks.insert(language.0, current.max(stamp))?;
        Ok(())
    }

    fn insert_tag(&mut self, name: &str) -> Result<Tag, StoreError> {
        let tag = Tag {
            id: TagId(self.next_id(NEXT_TAG)?),
            name: name.to_string(),
        };
        self.tags.insert(tag.id.0, serde_json::to_vec(&tag)?.as_slice())?;
        self.tag_names.insert(name, tag.id.0)?;
        Ok(tag)
    }

    fn resolve_tags(&mut self, names: &[String]) -> Result<Vec<Tag>, StoreError> {
        let mut tags = Vec::with_capacity(names.len());
        for name in names {
            let existing = self.tag_names.get(name.as_str())?.map(|v| v.value());
            let tag = match existing {
                Some(id) => match self.tags.get(id)? {
                    Some(row) => decode(row.value())?,
                    None => return Err(anyhow::anyhow!("tag index points at missing tag {id}").into()),
                },
                None => self.insert_tag(name)?,
            };
            tags.push(tag);
        }
        tags.sort_by(|a: &Tag, b: &Tag| a.name.cmp(&b.name));
        tags.dedup_by(|a, b| a.id == b.id);
        Ok(tags)
    }

    fn check_insertable(&self, input: &NewTranslation) -> Result<LanguageId, StoreError> {
        let language = input
            .language_id
            .ok_or(StoreError::LanguageNotFound(LanguageId(0)))?;
        if self.languages.get(language.0)?.is_none() {
            return Err(StoreError::LanguageNotFound(language));
        }
        if self
            .translation_keys
            .get((language.0, input.key.as_str()))?
            .is_some()
        {
            return Err(StoreError::duplicate_translation_key(&input.key));
        }
        Ok(language)
    }

    fn get_translation(&self, id: TranslationId) -> Result<Option<Translation>, StoreError> {
        self.translations
            .get(id.0)?
            .map(|row| decode(row.value()))
            .transpose()
    }

    fn write_translation(&mut self, translation: &Translation) -> Result<(), StoreError> {
        self.translations
            .insert(translation.id.0, serde_json::to_vec(translation)?.as_slice())?;
        Ok(())
    }

    fn insert_translation(
        &mut self,
        input: NewTranslation,
        language: LanguageId,
        clock: &MutationClock,
    ) -> Result<Translation, StoreError> {
        let tags = self.resolve_tags(&input.tags)?;
        let now = self.stamp(clock)?;
        let translation = Translation {
            id: TranslationId(self.next_id(NEXT_TRANSLATION)?),
            key: input.key,
            language_id: language,
            content: input.content,
            context: input.context,
            tags,
            created_at: now,
            updated_at: now,
        };
        self.write_translation(&translation)?;
        self.translation_keys
            .insert((language.0, translation.key.as_str()), translation.id.0)?;
        self.bump_watermark(language, now)?;
        Ok(translation)
    }
}

struct Inner {
    db: Database,
    clock: Arc<MutationClock>,
}

impl Inner {
    /// Runs `f` in a write transaction, committing only if it succeeds.
    fn write<T>(
        &self,
        f: impl FnOnce(&mut WriteTables<'_>, &MutationClock) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let txn = self.db.begin_write()?;
        let value = {
            let mut tables = WriteTables::open(&txn)?;
            f(&mut tables, &self.clock)?
        };
        txn.commit()?;
        Ok(value)
    }

    fn read(&self) -> Result<ReadTransaction, StoreError> {
        Ok(self.db.begin_read()?)
    }
}

/// Translation store persisted to a single redb file.
pub struct RedbStore {
    inner: Arc<Inner>,
}

impl RedbStore {
    /// Opens (or creates) the database file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the file cannot be opened or the
    /// tables cannot be created.
    pub fn open(path: impl AsRef<Path>, clock: Arc<MutationClock>) -> Result<Self, StoreError> {
        let db = Database::create(path.as_ref())?;

        let txn = db.begin_write()?;
        {
            txn.open_table(META)?;
            txn.open_table(LANGUAGES)?;
            txn.open_table(LANGUAGE_CODES)?;
            txn.open_table(TAGS)?;
            txn.open_table(TAG_NAMES)?;
            txn.open_table(TRANSLATIONS)?;
            txn.open_table(TRANSLATION_KEYS)?;
            txn.open_table(WATERMARKS)?;
        }
        txn.commit()?;

        {
            let read = db.begin_read()?;
            let meta = read.open_table(META)?;
            if let Some(stamp) = meta.get(CLOCK)? {
                clock.observe(stamp.value());
            }
        }

        Ok(Self {
            inner: Arc::new(Inner { db, clock }),
        })
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Inner) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || f(&*inner))
            .await
            .map_err(|e| StoreError::Backend(e.into()))?
    }
}

fn sorted<T, K: Ord>(mut rows: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
    rows.sort_by_key(key);
    rows
}

#[async_trait]
impl TranslationStore for RedbStore {
    async fn create_language(&self, input: NewLanguage) -> Result<Language, StoreError> {
        self.blocking(move |inner| {
            inner.write(|tables, clock| {
                if tables.language_codes.get(input.code.as_str())?.is_some() {
                    return Err(StoreError::duplicate_language_code(&input.code));
                }
                let language = Language {
                    id: LanguageId(tables.next_id(NEXT_LANGUAGE)?),
                    created_at: tables.stamp(clock)?,
                    code: input.code,
                    name: input.name,
                };
                tables
                    .languages
                    .insert(language.id.0, serde_json::to_vec(&language)?.as_slice())?;
                tables
                    .language_codes
                    .insert(language.code.as_str(), language.id.0)?;
                Ok(language)
            })
        })
        .await
    }

    async fn list_languages(&self) -> Result<Vec<Language>, StoreError> {
        self.blocking(|inner| {
            let txn = inner.read()?;
            let table = txn.open_table(LANGUAGES)?;
            let mut languages = Vec::new();
            for row in table.iter()? {
                let (_, value) = row?;
                languages.push(decode::<Language>(value.value())?);
            }
            Ok(sorted(languages, |l| l.code.clone()))
        })
        .await
    }

    async fn language_by_code(&self, code: &str) -> Result<Option<Language>, StoreError> {
        let code = code.to_string();
        self.blocking(move |inner| {
            let txn = inner.read()?;
            let codes = txn.open_table(LANGUAGE_CODES)?;
            let Some(id) = codes.get(code.as_str())?.map(|v| v.value()) else {
                return Ok(None);
            };
            let languages = txn.open_table(LANGUAGES)?;
            languages.get(id)?.map(|row| decode(row.value())).transpose()
        })
        .await
    }

    async fn language_by_id(&self, id: LanguageId) -> Result<Option<Language>, StoreError> {
        self.blocking(move |inner| {
            let txn = inner.read()?;
            let languages = txn.open_table(LANGUAGES)?;
            languages.get(id.0)?.map(|row| decode(row.value())).transpose()
        })
        .await
    }

    async fn create_tag(&self, input: NewTag) -> Result<Tag, StoreError> {
        self.blocking(move |inner| {
            inner.write(|tables, _| {
                if tables.tag_names.get(input.name.as_str())?.is_some() {
                    return Err(StoreError::duplicate_tag_name(&input.name));
                }
                tables.insert_tag(&input.name)
            })
        })
        .await
    }

    async fn list_tags(&self) -> Result<Vec<Tag>, StoreError> {
        self.blocking(|inner| {
            let txn = inner.read()?;
            let table = txn.open_table(TAGS)?;
            let mut tags = Vec::new();
            for row in table.iter()? {
                let (_, value) = row?;
                tags.push(decode::<Tag>(value.value())?);
            }
            Ok(sorted(tags, |t| t.name.clone()))
        })
        .await
    }

    async fn create_translation(&self, input: NewTranslation) -> Result<Translation, StoreError> {
        self.blocking(move |inner| {
            inner.write(|tables, clock| {
                let language = tables.check_insertable(&input)?;
                tables.insert_translation(input, language, clock)
            })
        })
        .await
    }

    async fn create_translations(
        &self,
        inputs: Vec<NewTranslation>,
    ) -> Result<Vec<Translation>, StoreError> {
        self.blocking(move |inner| {
            // Any error drops the transaction, so the batch lands whole or not at all.
            inner.write(|tables, clock| {
                let mut created = Vec::with_capacity(inputs.len());
                for input in inputs {
                    let language = tables.check_insertable(&input)?;
                    created.push(tables.insert_translation(input, language, clock)?);
                }
                Ok(created)
            })
        })
        .await
    }

    async fn update_translation(
        &self,
        id: TranslationId,
        patch: TranslationPatch,
    ) -> Result<TranslationChange, StoreError> {
        self.blocking(move |inner| {
            inner.write(|tables, clock| {
                let before = tables
                    .get_translation(id)?
                    .ok_or(StoreError::TranslationNotFound(id))?;
                let mut after = before.clone();
                if let Some(content) = patch.content {
                    after.content = content;
                }
                if let Some(context) = patch.context {
                    after.context = context;
                }
                if let Some(names) = patch.tags {
                    after.tags = tables.resolve_tags(&names)?;
                }
                after.updated_at = tables.stamp(clock)?;
                tables.write_translation(&after)?;
                tables.bump_watermark(after.language_id, after.updated_at)?;
                Ok(TranslationChange { before, after })
            })
        })
        .await
    }

    async fn delete_translation(&self, id: TranslationId) -> Result<Translation, StoreError> {
        self.blocking(move |inner| {
            inner.write(|tables, clock| {
                let removed = tables
                    .get_translation(id)?
                    .ok_or(StoreError::TranslationNotFound(id))?;
                tables.translations.remove(id.0)?;
                tables
                    .translation_keys
                    .remove((removed.language_id.0, removed.key.as_str()))?;
                let now = tables.stamp(clock)?;
                tables.bump_watermark(removed.language_id, now)?;
                Ok(removed)
            })
        })
        .await
    }

    async fn get_translation(&self, id: TranslationId) -> Result<Option<Translation>, StoreError> {
        self.blocking(move |inner| {
            let txn = inner.read()?;
            let table = txn.open_table(TRANSLATIONS)?;
            table.get(id.0)?.map(|row| decode(row.value())).transpose()
        })
        .await
    }

    async fn search_translations(
        &self,
        filter: &TranslationFilter,
        page: PageRequest,
    ) -> Result<Page<Translation>, StoreError> {
        let filter = filter.clone();
        self.blocking(move |inner| {
            let txn = inner.read()?;
            let translations = txn.open_table(TRANSLATIONS)?;

            let mut matches = Vec::new();
            if let Some(language) = filter.language_id {
                // Key index rows of one language are contiguous and key-ordered.
                let keys = txn.open_table(TRANSLATION_KEYS)?;
                for row in keys.range((language.0, "")..)? {
                    let (key, id) = row?;
                    if key.value().0 != language.0 {
                        break;
                    }
                    if let Some(value) = translations.get(id.value())? {
                        let translation: Translation = decode(value.value())?;
                        if filter.matches(&translation) {
                            matches.push(translation);
                        }
                    }
                }
            } else {
                for row in translations.iter()? {
                    let (_, value) = row?;
                    let translation: Translation = decode(value.value())?;
                    if filter.matches(&translation) {
                        matches.push(translation);
                    }
                }
                matches.sort_by(|a, b| {
                    a.key.cmp(&b.key).then(a.language_id.cmp(&b.language_id))
                });
            }

            let total = matches.len() as u64;
            let items = matches
                .into_iter()
                .skip(page.offset())
                .take(page.per_page as usize)
                .collect();
            Ok(Page {
                items,
                total,
                request: page,
            })
        })
        .await
    }

    async fn latest_mutation(&self, language: LanguageId) -> Result<Option<Millis>, StoreError> {
        self.blocking(move |inner| {
            let txn = inner.read()?;
            let keys = txn.open_table(TRANSLATION_KEYS)?;
            let has_rows = match keys.range((language.0, "")..)?.next() {
                Some(row) => row?.0.value().0 == language.0,
                None => false,
            };
            if !has_rows {
                return Ok(None);
            }
            let table = txn.open_table(WATERMARKS)?;
            Ok(table.get(language.0)?.map(|v| v.value()))
        })
        .await
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

        let after = cursor.after.clone();
        self.blocking(move |inner| {
            let txn = inner.read()?;
            let keys = txn.open_table(TRANSLATION_KEYS)?;
            let translations = txn.open_table(TRANSLATIONS)?;

            let lower = match after.as_deref() {
                Some(key) => Bound::Excluded((language.0, key)),
                None => Bound::Included((language.0, "")),
            };
            let mut items = Vec::with_capacity(limit);
            for row in keys.range((lower, Bound::Unbounded))? {
                if items.len() == limit {
                    break;
                }
                let (key, id) = row?;
                let (row_language, row_key) = key.value();
                if row_language != language.0 {
                    break;
                }
                if let Some(value) = translations.get(id.value())? {
                    let translation: Translation = decode(value.value())?;
                    items.push(ExportEntry {
                        key: row_key.to_string(),
                        content: translation.content,
                    });
                }
            }

            let last_key = items.last().map(|e: &ExportEntry| e.key.clone()).or(after);
            let fetched = items.len();
            Ok(FetchResult {
                items,
                next_cursor: IterationCursor::after_page(last_key, fetched, limit),
            })
        })
        .await
    }
}
