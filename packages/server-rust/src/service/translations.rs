//! Translation, language, and tag management.
//!
//! Every write is validated, applied to the store, and then announced to
//! the registered [`MutationObserver`]s (export cache invalidation among
//! them). Observers run after the store has committed, so they can never
//! undo or fail a write. Everything a notification needs is loaded before
//! the write: once the store has committed, the call returns `Ok`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use polyglot_core::validation::{
    validate_new_language, validate_new_tag, validate_new_translation, validate_patch,
};
use polyglot_core::{
    normalize_tags, Language, LanguageId, NewLanguage, NewTag, NewTranslation, Page, PageRequest,
    Tag, Translation, TranslationFilter, TranslationId, TranslationPatch,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::config::ServerConfig;
use super::error::ServiceError;
use crate::storage::{MutationObserver, StoreError};
use crate::traits::TranslationStore;

/// Search parameters as accepted from clients.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TranslationQuery {
    /// Key prefix.
    pub key: Option<String>,
    /// Content substring.
    pub content: Option<String>,
    /// Language code.
    pub language: Option<String>,
    /// Tag name.
    pub tag: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub updated_since: Option<u64>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// A translation together with the language it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranslationDetail {
    #[serde(flatten)]
    pub translation: Translation,
    pub language: Language,
}

/// Write and query operations over the translation store.
pub struct TranslationService {
    store: Arc<dyn TranslationStore>,
    observer: Arc<dyn MutationObserver>,
    default_per_page: u32,
    max_per_page: u32,
}

impl TranslationService {
    #[must_use]
    pub fn new(
        store: Arc<dyn TranslationStore>,
        observer: Arc<dyn MutationObserver>,
        config: &ServerConfig,
    ) -> Self {
        Self {
            store,
            observer,
            default_per_page: config.default_per_page.max(1),
            max_per_page: config.max_per_page.max(1),
        }
    }

    async fn language(&self, id: LanguageId) -> Result<Language, ServiceError> {
        self.store
            .language_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound {
                resource: "language",
                id: id.to_string(),
            })
    }

    /// The language a new translation targets. An unknown id fails the same
    /// way the store would reject it.
    async fn target_language(&self, id: Option<LanguageId>) -> Result<Language, ServiceError> {
        let id = id.unwrap_or(LanguageId(0));
        match self.store.language_by_id(id).await? {
            Some(language) => Ok(language),
            None => Err(StoreError::LanguageNotFound(id).into()),
        }
    }

    /// Loads an existing translation and its language ahead of a write to it.
    async fn existing(&self, id: TranslationId) -> Result<Language, ServiceError> {
        let current = self
            .store
            .get_translation(id)
            .await?
            .ok_or_else(|| ServiceError::translation(id))?;
        self.language(current.language_id).await
    }

    // -- languages and tags ---------------------------------------------------

    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] if the store cannot be read.
    pub async fn list_languages(&self) -> Result<Vec<Language>, ServiceError> {
        Ok(self.store.list_languages().await?)
    }

    /// Creates a language.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Validation`] for invalid input or a taken code.
    pub async fn create_language(&self, mut input: NewLanguage) -> Result<Language, ServiceError> {
        input.code = input.code.trim().to_string();
        input.name = input.name.trim().to_string();
        validate_new_language(&input)?;
        let language = self.store.create_language(input).await?;
        info!(code = %language.code, id = %language.id, "language created");
        Ok(language)
    }

    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] if the store cannot be read.
    pub async fn list_tags(&self) -> Result<Vec<Tag>, ServiceError> {
        Ok(self.store.list_tags().await?)
    }

    /// Creates a tag.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Validation`] for invalid input or a taken name.
    pub async fn create_tag(&self, mut input: NewTag) -> Result<Tag, ServiceError> {
        validate_new_tag(&input)?;
        input.name = input.name.trim().to_string();
        Ok(self.store.create_tag(input).await?)
    }

    // -- translations ---------------------------------------------------------

    /// Finds translations matching the query, ordered by key then language.
    ///
    /// An unknown language code matches nothing.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] if the store cannot be read.
    pub async fn search(&self, query: TranslationQuery) -> Result<Page<Translation>, ServiceError> {
        let request = PageRequest {
            page: query.page.unwrap_or(1).max(1),
            per_page: query
                .per_page
                .unwrap_or(self.default_per_page)
                .clamp(1, self.max_per_page),
        };

        let language_id = match query.language.as_deref() {
            Some(code) => match self.store.language_by_code(code).await? {
                Some(language) => Some(language.id),
                None => {
                    return Ok(Page {
                        items: Vec::new(),
                        total: 0,
                        request,
                    })
                }
            },
            None => None,
        };

        let filter = TranslationFilter {
            key_prefix: query.key.filter(|k| !k.is_empty()),
            content_contains: query.content.filter(|c| !c.is_empty()),
            language_id,
            tag: query.tag.filter(|t| !t.is_empty()),
            updated_since: query.updated_since,
        };
        Ok(self.store.search_translations(&filter, request).await?)
    }

    /// Loads one translation with its language.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] if the translation does not exist.
    pub async fn get(&self, id: TranslationId) -> Result<TranslationDetail, ServiceError> {
        let translation = self
            .store
            .get_translation(id)
            .await?
            .ok_or_else(|| ServiceError::translation(id))?;
        let language = self.language(translation.language_id).await?;
        Ok(TranslationDetail {
            translation,
            language,
        })
    }

    /// Creates a translation and notifies observers.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Validation`] for invalid input, an unknown
    /// language, or a key already used in that language.
    pub async fn create(&self, mut input: NewTranslation) -> Result<TranslationDetail, ServiceError> {
        validate_new_translation(&input)?;
        input.tags = normalize_tags(&input.tags);

        let language = self.target_language(input.language_id).await?;
        let translation = self.store.create_translation(input).await?;
        self.observer.on_created(&translation, &language).await;
        Ok(TranslationDetail {
            translation,
            language,
        })
    }

    /// Applies a partial update and notifies observers.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] for an unknown id or
    /// [`ServiceError::Validation`] for invalid input.
    pub async fn update(
        &self,
        id: TranslationId,
        mut patch: TranslationPatch,
    ) -> Result<TranslationDetail, ServiceError> {
        validate_patch(&patch)?;
        patch.tags = patch.tags.map(|tags| normalize_tags(&tags));

        let language = self.existing(id).await?;
        let change = self.store.update_translation(id, patch).await?;
        self.observer
            .on_updated(&change.before, &change.after, &language)
            .await;
        Ok(TranslationDetail {
            translation: change.after,
            language,
        })
    }

    /// Deletes a translation and notifies observers.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] for an unknown id.
    pub async fn delete(&self, id: TranslationId) -> Result<(), ServiceError> {
        let language = self.existing(id).await?;
        let removed = self.store.delete_translation(id).await?;
        self.observer.on_deleted(&removed, &language).await;
        Ok(())
    }

    /// Inserts a batch atomically, then notifies observers once per language.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Validation`] naming the first invalid row
    /// (`rows.N.field`), or any store rejection of the batch.
    pub async fn import(
        &self,
        mut inputs: Vec<NewTranslation>,
    ) -> Result<Vec<Translation>, ServiceError> {
        for (i, input) in inputs.iter_mut().enumerate() {
            if let Err(errors) = validate_new_translation(input) {
                return Err(errors.prefixed(&format!("rows.{i}")).into());
            }
            input.tags = normalize_tags(&input.tags);
        }

        // Unknown ids stay unresolved; the store rejects the whole batch.
        let ids: BTreeSet<LanguageId> = inputs.iter().filter_map(|i| i.language_id).collect();
        let mut languages = BTreeMap::new();
        for id in ids {
            if let Some(language) = self.store.language_by_id(id).await? {
                languages.insert(id, language);
            }
        }

        let created = self.store.create_translations(inputs).await?;

        let mut per_language: BTreeMap<LanguageId, usize> = BTreeMap::new();
        for translation in &created {
            *per_language.entry(translation.language_id).or_default() += 1;
        }
        for (language_id, count) in per_language {
            match languages.get(&language_id) {
                Some(language) => self.observer.on_imported(language, count).await,
                None => warn!(%language_id, count, "imported into an unresolved language, not notifying"),
            }
        }
        Ok(created)
    }
}
