//! Errors reported by [`TranslationStore`](crate::traits::TranslationStore) backends.

use polyglot_core::{LanguageId, TranslationId};

/// Failure of a store operation.
///
/// Every variant except [`StoreError::Backend`] describes a rejected request
/// that left the store untouched. `Backend` covers I/O, transaction, and
/// codec failures; the write it belonged to was rolled back.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("language {0} does not exist")]
    LanguageNotFound(LanguageId),
    #[error("translation {0} does not exist")]
    TranslationNotFound(TranslationId),
    /// A uniqueness constraint rejected the write.
    #[error("{message}")]
    Conflict {
        field: &'static str,
        message: String,
    },
    #[error("storage backend failure: {0}")]
    Backend(#[from] anyhow::Error),
}

impl StoreError {
    pub(crate) fn duplicate_translation_key(key: &str) -> Self {
        Self::Conflict {
            field: "key",
            message: format!("The key '{key}' has already been taken for this language."),
        }
    }

    pub(crate) fn duplicate_language_code(code: &str) -> Self {
        Self::Conflict {
            field: "code",
            message: format!("The code '{code}' has already been taken."),
        }
    }

    pub(crate) fn duplicate_tag_name(name: &str) -> Self {
        Self::Conflict {
            field: "name",
            message: format!("The name '{name}' has already been taken."),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Backend(err.into())
    }
}
