//! Persistence for languages, tags, and translations.
//!
//! - [`engine`]: keyset cursor types for paging through a language's keys
//! - [`engines`]: concrete [`TranslationStore`](crate::traits::TranslationStore)
//!   backends (in-memory, and `redb` behind the `redb` feature)
//! - [`mutation_observer`]: post-commit hooks on the translation write path

pub mod engine;
pub mod engines;
pub mod error;
pub mod mutation_observer;

pub use engine::*;
pub use error::StoreError;
pub use mutation_observer::*;
