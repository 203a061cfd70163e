//! Polyglot core: the translation model, mutation clock, fingerprints, and export writer.

pub mod clock;
pub mod export;
pub mod fingerprint;
pub mod types;
pub mod validation;

pub use clock::{ClockSource, ManualClock, MutationClock, SystemClock};
pub use export::{parse_export, render_export, ExportWriter, EMPTY_EXPORT};
pub use fingerprint::Fingerprint;
pub use types::{
    ExportEntry, Language, LanguageId, Millis, NewLanguage, NewTag, NewTranslation, Page,
    PageRequest, Tag, TagId, Translation, TranslationFilter, TranslationId, TranslationPatch,
};
pub use validation::{normalize_tags, ValidationErrors};
