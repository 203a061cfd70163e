//! Errors returned by the service layer.

use polyglot_core::ValidationErrors;

use crate::storage::StoreError;

/// Failure of a service operation, mapped to an HTTP status by the network layer.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The addressed language or translation does not exist.
    #[error("{resource} {id} not found")]
    NotFound { resource: &'static str, id: String },
    /// The request was rejected; nothing was written.
    #[error("{0}")]
    Validation(ValidationErrors),
    /// The store failed; the write, if any, was rolled back.
    #[error("store failure: {0}")]
    Store(#[source] anyhow::Error),
    /// Rendering an export failed.
    #[error("export serialization failed: {0}")]
    Serialization(#[from] std::io::Error),
}

impl ServiceError {
    pub(crate) fn language_code(code: &str) -> Self {
        Self::NotFound {
            resource: "language",
            id: code.to_string(),
        }
    }

    pub(crate) fn translation(id: impl ToString) -> Self {
        Self::NotFound {
            resource: "translation",
            id: id.to_string(),
        }
    }
}

impl From<ValidationErrors> for ServiceError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::TranslationNotFound(id) => Self::translation(id),
            // A write referencing a missing language is a bad request, not a missing resource.
            StoreError::LanguageNotFound(_) => Self::Validation(ValidationErrors::single(
                "language_id",
                "The selected language_id is invalid.",
            )),
            StoreError::Conflict { field, message } => {
                Self::Validation(ValidationErrors::single(field, message))
            }
            StoreError::Backend(e) => Self::Store(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use polyglot_core::{LanguageId, TranslationId};

    use super::*;

    #[test]
    fn store_errors_map_to_service_errors() {
        let err: ServiceError = StoreError::TranslationNotFound(TranslationId(4)).into();
        assert!(matches!(err, ServiceError::NotFound { resource: "translation", ref id } if id == "4"));

        let err: ServiceError = StoreError::LanguageNotFound(LanguageId(9)).into();
        match err {
            ServiceError::Validation(errors) => assert_eq!(errors.field("language_id").len(), 1),
            other => panic!("unexpected {other:?}"),
        }

        let err: ServiceError = StoreError::duplicate_translation_key("greeting").into();
        match err {
            ServiceError::Validation(errors) => {
                assert!(errors.field("key")[0].contains("greeting"));
            }
            other => panic!("unexpected {other:?}"),
        }

        let err: ServiceError = StoreError::Backend(anyhow::anyhow!("disk full")).into();
        assert!(matches!(err, ServiceError::Store(_)));
    }
}
