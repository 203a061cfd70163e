//! Application services sitting between the HTTP handlers and the store.
//!
//! 1. **Exports** (`export`): fingerprint → cache lookup → render, cache, or stream
//! 2. **Translations** (`translations`): validated writes with post-commit observers
//! 3. **Background workers** (`worker`): periodic cache maintenance

pub mod config;
pub mod error;
pub mod export;
pub mod translations;
pub mod worker;

pub use config::ServerConfig;
pub use error::ServiceError;
pub use export::{CacheStatus, Export, ExportBody, ExportService, ExportStream};
pub use translations::{TranslationDetail, TranslationQuery, TranslationService};
pub use worker::{BackgroundRunnable, BackgroundWorker, CacheMaintenance};
