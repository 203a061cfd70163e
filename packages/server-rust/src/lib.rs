//! Polyglot server: translation storage, cached per-language JSON exports, HTTP API.

pub mod cache;
pub mod network;
pub mod seed;
pub mod service;
pub mod storage;
pub mod traits;

pub use traits::{ExportCache, TranslationChange, TranslationStore};
