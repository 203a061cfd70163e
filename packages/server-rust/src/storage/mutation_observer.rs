//! Mutation observer trait and composite implementation.
//!
//! Defines [`MutationObserver`] for reacting to committed translation writes,
//! and [`CompositeMutationObserver`] which fans out notifications to multiple
//! observers. The write path calls observers only after the store has
//! committed, and observers cannot fail the write: anything they do is
//! best-effort.

use std::sync::Arc;

use async_trait::async_trait;
use polyglot_core::{Language, Translation};
use tracing::debug;

/// Observer for committed translation writes.
///
/// Implementations invalidate caches, emit change logs, or perform other side
/// effects. Used as `Arc<dyn MutationObserver>`.
#[async_trait]
pub trait MutationObserver: Send + Sync {
    /// Called after a translation is inserted.
    async fn on_created(&self, translation: &Translation, language: &Language);

    /// Called after a translation's content, context, or tags changed.
    async fn on_updated(&self, before: &Translation, after: &Translation, language: &Language);

    /// Called after a translation is removed.
    async fn on_deleted(&self, translation: &Translation, language: &Language);

    /// Called after a bulk import inserted `count` translations into `language`.
    async fn on_imported(&self, language: &Language, count: usize);
}

/// Composite observer that fans out to multiple observers, in registration order.
#[derive(Default)]
pub struct CompositeMutationObserver {
    observers: Vec<Arc<dyn MutationObserver>>,
}

impl CompositeMutationObserver {
    /// Creates a composite observer with the given list of observers.
    #[must_use]
    pub fn new(observers: Vec<Arc<dyn MutationObserver>>) -> Self {
        Self { observers }
    }
}

#[async_trait]
impl MutationObserver for CompositeMutationObserver {
    async fn on_created(&self, translation: &Translation, language: &Language) {
        for observer in &self.observers {
            observer.on_created(translation, language).await;
        }
    }

    async fn on_updated(&self, before: &Translation, after: &Translation, language: &Language) {
        for observer in &self.observers {
            observer.on_updated(before, after, language).await;
        }
    }

    async fn on_deleted(&self, translation: &Translation, language: &Language) {
        for observer in &self.observers {
            observer.on_deleted(translation, language).await;
        }
    }

    async fn on_imported(&self, language: &Language, count: usize) {
        for observer in &self.observers {
            observer.on_imported(language, count).await;
        }
    }
}

/// Writes a `debug` event for every committed mutation.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMutationObserver;

#[async_trait]
impl MutationObserver for TracingMutationObserver {
    async fn on_created(&self, translation: &Translation, language: &Language) {
        debug!(
            id = %translation.id,
            key = %translation.key,
            language = %language.code,
            updated_at = translation.updated_at,
            "translation created"
        );
    }

    async fn on_updated(&self, before: &Translation, after: &Translation, language: &Language) {
        debug!(
            id = %after.id,
            key = %after.key,
            language = %language.code,
            content_changed = before.content != after.content,
            tags_changed = before.tags != after.tags,
            updated_at = after.updated_at,
            "translation updated"
        );
    }

    async fn on_deleted(&self, translation: &Translation, language: &Language) {
        debug!(
            id = %translation.id,
            key = %translation.key,
            language = %language.code,
            "translation deleted"
        );
    }

    async fn on_imported(&self, language: &Language, count: usize) {
        debug!(language = %language.code, count, "translations imported");
    }
}
