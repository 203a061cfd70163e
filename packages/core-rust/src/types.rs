//! Translation domain model shared by the store, the export pipeline, and the HTTP layer.
//!
//! Identifiers are newtypes over `u64` so a language id can never be passed
//! where a translation id is expected. Timestamps are milliseconds since the
//! Unix epoch as issued by [`MutationClock`](crate::clock::MutationClock).

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Milliseconds since the Unix epoch, as issued by the mutation clock.
pub type Millis = u64;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Store-assigned identifier of a [`Language`].
    LanguageId
);
id_type!(
    /// Store-assigned identifier of a [`Tag`].
    TagId
);
id_type!(
    /// Store-assigned identifier of a [`Translation`].
    TranslationId
);

/// A language translations can be written in, identified by its short code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Language {
    pub id: LanguageId,
    /// Unique short code such as `en` or `pt-BR`.
    pub code: String,
    /// Human-readable display name.
    pub name: String,
    pub created_at: Millis,
}

/// A label attached to translations. Created on first reference by a write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
}

/// A single translated string. `(key, language_id)` is unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Translation {
    pub id: TranslationId,
    pub key: String,
    pub language_id: LanguageId,
    pub content: String,
    pub context: Option<String>,
    /// Attached tags, sorted by name.
    pub tags: Vec<Tag>,
    pub created_at: Millis,
    pub updated_at: Millis,
}

impl Translation {
    /// Returns `true` if a tag with the given name is attached.
    #[must_use]
    pub fn has_tag(&self, name: &str) -> bool {
        self.tags.iter().any(|t| t.name == name)
    }
}

/// One `(key, content)` pair of a language export, in key order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportEntry {
    pub key: String,
    pub content: String,
}

/// Input for creating a translation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NewTranslation {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub language_id: Option<LanguageId>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Partial update of a translation. Absent fields are left untouched.
///
/// `context` distinguishes "absent" (`None`) from "explicitly null"
/// (`Some(None)`, clears the context). `tags`, when present, replaces the
/// whole tag set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TranslationPatch {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, deserialize_with = "present_or_null")]
    pub context: Option<Option<String>>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

impl TranslationPatch {
    /// Returns `true` if applying this patch would not change anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.context.is_none() && self.tags.is_none()
    }
}

fn present_or_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Input for creating a language.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NewLanguage {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub name: String,
}

/// Input for creating a tag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NewTag {
    #[serde(default)]
    pub name: String,
}

/// Search criteria for listing translations. All set criteria must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranslationFilter {
    /// Keys starting with this prefix.
    pub key_prefix: Option<String>,
    /// Content containing this substring (case-sensitive).
    pub content_contains: Option<String>,
    pub language_id: Option<LanguageId>,
    /// Translations carrying a tag with exactly this name.
    pub tag: Option<String>,
    /// Translations updated at or after this instant.
    pub updated_since: Option<Millis>,
}

impl TranslationFilter {
    /// Evaluates the filter against a translation.
    #[must_use]
    pub fn matches(&self, translation: &Translation) -> bool {
        if let Some(prefix) = &self.key_prefix {
            if !translation.key.starts_with(prefix.as_str()) {
                return false;
            }
        }
        if let Some(needle) = &self.content_contains {
            if !translation.content.contains(needle.as_str()) {
                return false;
            }
        }
        if let Some(language_id) = self.language_id {
            if translation.language_id != language_id {
                return false;
            }
        }
        if let Some(tag) = &self.tag {
            if !translation.has_tag(tag) {
                return false;
            }
        }
        if let Some(since) = self.updated_since {
            if translation.updated_at < since {
                return false;
            }
        }
        true
    }
}

/// 1-based page selection for list endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl PageRequest {
    /// Number of items to skip before this page starts.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1) as usize * self.per_page as usize
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 50,
        }
    }
}

/// One page of results plus the total match count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub request: PageRequest,
}

impl<T> Page<T> {
    /// Index of the last non-empty page (at least 1).
    #[must_use]
    pub fn last_page(&self) -> u64 {
        let per_page = u64::from(self.request.per_page.max(1));
        self.total.div_ceil(per_page).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translation(key: &str, content: &str, tags: &[&str], updated_at: Millis) -> Translation {
        Translation {
            id: TranslationId(1),
            key: key.to_string(),
            language_id: LanguageId(1),
            content: content.to_string(),
            context: None,
            tags: tags
                .iter()
                .enumerate()
                .map(|(i, name)| Tag {
                    id: TagId(i as u64 + 1),
                    name: (*name).to_string(),
                })
                .collect(),
            created_at: updated_at,
            updated_at,
        }
    }

    #[test]
    fn empty_filter_matches_everything() {
        let t = translation("greeting", "Hello", &[], 10);
        assert!(TranslationFilter::default().matches(&t));
    }

    #[test]
    fn filter_combines_all_criteria() {
        let t = translation("auth.login.title", "Sign in", &["auth", "web"], 100);

        let filter = TranslationFilter {
            key_prefix: Some("auth.".to_string()),
            content_contains: Some("Sign".to_string()),
            language_id: Some(LanguageId(1)),
            tag: Some("web".to_string()),
            updated_since: Some(100),
        };
        assert!(filter.matches(&t));

        let wrong_tag = TranslationFilter {
            tag: Some("mobile".to_string()),
            ..filter.clone()
        };
        assert!(!wrong_tag.matches(&t));

        let too_recent = TranslationFilter {
            updated_since: Some(101),
            ..filter.clone()
        };
        assert!(!too_recent.matches(&t));

        let other_language = TranslationFilter {
            language_id: Some(LanguageId(2)),
            ..filter
        };
        assert!(!other_language.matches(&t));
    }

    #[test]
    fn page_offset_and_last_page() {
        let request = PageRequest { page: 3, per_page: 20 };
        assert_eq!(request.offset(), 40);

        let page: Page<()> = Page { items: Vec::new(), total: 41, request };
        assert_eq!(page.last_page(), 3);

        let empty: Page<()> = Page { items: Vec::new(), total: 0, request };
        assert_eq!(empty.last_page(), 1);
    }

    #[test]
    fn patch_distinguishes_null_context_from_absent() {
        let absent: TranslationPatch = serde_json::from_str(r#"{"content":"Hi"}"#).unwrap();
        assert_eq!(absent.context, None);

        let cleared: TranslationPatch = serde_json::from_str(r#"{"context":null}"#).unwrap();
        assert_eq!(cleared.context, Some(None));

        let set: TranslationPatch = serde_json::from_str(r#"{"context":"menu"}"#).unwrap();
        assert_eq!(set.context, Some(Some("menu".to_string())));
    }

    #[test]
    fn ids_serialize_transparently() {
        let json = serde_json::to_string(&LanguageId(7)).unwrap();
        assert_eq!(json, "7");
        assert_eq!(TranslationId(12).to_string(), "12");
    }
}
