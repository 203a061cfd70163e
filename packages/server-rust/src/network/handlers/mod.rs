//! HTTP handler definitions for the Polyglot server.
//!
//! This module defines `AppState` (the shared state carried through axum
//! extractors) and re-exports all handler functions for building the router.

pub mod export;
pub mod health;
pub mod languages;
pub mod tags;
pub mod translations;

pub use export::export_handler;
pub use health::{health_handler, liveness_handler, readiness_handler};
pub use languages::{create_language_handler, list_languages_handler};
pub use tags::{create_tag_handler, list_tags_handler};
pub use translations::{
    create_translation_handler, delete_translation_handler, list_translations_handler,
    show_translation_handler, update_translation_handler,
};

use std::sync::Arc;
use std::time::Instant;

use super::{NetworkConfig, ShutdownController};
use crate::service::{ExportService, TranslationService};
use crate::traits::ExportCache;

/// Application services the HTTP layer dispatches to.
#[derive(Clone)]
pub struct Services {
    pub exports: Arc<ExportService>,
    pub translations: Arc<TranslationService>,
    /// Read for statistics only; exports go through `exports`.
    pub cache: Arc<dyn ExportCache>,
}

/// Shared application state passed to all axum handlers via `State` extraction.
///
/// Holds `Arc` references to shared resources so cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    /// Graceful shutdown controller with health state and in-flight tracking.
    pub shutdown: Arc<ShutdownController>,
    /// Network configuration (bind address, TLS, limits).
    pub config: Arc<NetworkConfig>,
    /// Server process start time, used for uptime calculation.
    pub start_time: Instant,
}
