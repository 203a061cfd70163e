//! Write-input validation with field-level error reporting.
//!
//! Validators run before anything reaches the store. Uniqueness and
//! referential checks (duplicate key, unknown language) need store access and
//! are reported by the store in the same [`ValidationErrors`] shape.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::types::{NewLanguage, NewTag, NewTranslation, TranslationPatch};

pub const MAX_KEY_CHARS: usize = 191;
pub const MAX_CONTEXT_CHARS: usize = 255;
pub const MAX_TAG_CHARS: usize = 100;
pub const MAX_LANGUAGE_CODE_CHARS: usize = 10;
pub const MAX_LANGUAGE_NAME_CHARS: usize = 191;

/// Field name → list of human-readable failures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors {
    fields: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for a single failing field.
    #[must_use]
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Messages recorded for one field.
    #[must_use]
    pub fn field(&self, name: &str) -> &[String] {
        self.fields.get(name).map_or(&[], Vec::as_slice)
    }

    /// `Ok(())` when nothing was recorded.
    ///
    /// # Errors
    ///
    /// Returns `self` if at least one failure was recorded.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    /// Re-keys every field as `{prefix}.{field}`, for errors that belong to
    /// one element of a batch.
    #[must_use]
    pub fn prefixed(self, prefix: &str) -> Self {
        Self {
            fields: self
                .fields
                .into_iter()
                .map(|(field, messages)| (format!("{prefix}.{field}"), messages))
                .collect(),
        }
    }

    fn total(&self) -> usize {
        self.fields.values().map(Vec::len).sum()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(first) = self.fields.values().flatten().next() else {
            return f.write_str("the given data was invalid");
        };
        let rest = self.total() - 1;
        match rest {
            0 => f.write_str(first),
            1 => write!(f, "{first} (and 1 more error)"),
            n => write!(f, "{first} (and {n} more errors)"),
        }
    }
}

impl std::error::Error for ValidationErrors {}

fn check_required(errors: &mut ValidationErrors, field: &str, value: &str) {
    if value.trim().is_empty() {
        errors.add(field, format!("The {field} field is required."));
    }
}

fn check_max(errors: &mut ValidationErrors, field: &str, value: &str, max: usize) {
    if value.chars().count() > max {
        errors.add(
            field,
            format!("The {field} field must not be greater than {max} characters."),
        );
    }
}

fn check_tags(errors: &mut ValidationErrors, tags: &[String]) {
    for (i, tag) in tags.iter().enumerate() {
        if tag.trim().chars().count() > MAX_TAG_CHARS {
            errors.add(
                &format!("tags.{i}"),
                format!("The tags.{i} field must not be greater than {MAX_TAG_CHARS} characters."),
            );
        }
    }
}

/// Validates a create-translation request.
///
/// # Errors
///
/// Returns every failing field.
pub fn validate_new_translation(input: &NewTranslation) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    check_required(&mut errors, "key", &input.key);
    check_max(&mut errors, "key", &input.key, MAX_KEY_CHARS);
    if input.language_id.is_none() {
        errors.add("language_id", "The language_id field is required.");
    }
    check_required(&mut errors, "content", &input.content);
    if let Some(context) = &input.context {
        check_max(&mut errors, "context", context, MAX_CONTEXT_CHARS);
    }
    check_tags(&mut errors, &input.tags);
    errors.into_result()
}

/// Validates an update-translation request.
///
/// # Errors
///
/// Returns every failing field.
pub fn validate_patch(patch: &TranslationPatch) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    if let Some(content) = &patch.content {
        check_required(&mut errors, "content", content);
    }
    if let Some(Some(context)) = &patch.context {
        check_max(&mut errors, "context", context, MAX_CONTEXT_CHARS);
    }
    if let Some(tags) = &patch.tags {
        check_tags(&mut errors, tags);
    }
    errors.into_result()
}

/// Validates a create-language request.
///
/// # Errors
///
/// Returns every failing field.
pub fn validate_new_language(input: &NewLanguage) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    check_required(&mut errors, "code", &input.code);
    check_max(&mut errors, "code", &input.code, MAX_LANGUAGE_CODE_CHARS);
    if input.code.contains(['/', '.']) {
        errors.add("code", "The code field must not contain '/' or '.'.");
    }
    check_required(&mut errors, "name", &input.name);
    check_max(&mut errors, "name", &input.name, MAX_LANGUAGE_NAME_CHARS);
    errors.into_result()
}

/// Validates a create-tag request.
///
/// # Errors
///
/// Returns every failing field.
pub fn validate_new_tag(input: &NewTag) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    check_required(&mut errors, "name", &input.name);
    check_max(&mut errors, "name", input.name.trim(), MAX_TAG_CHARS);
    errors.into_result()
}

/// Trims tag names, drops blanks, and removes duplicates, keeping first
/// occurrence order.
#[must_use]
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let trimmed = tag.trim();
        if !trimmed.is_empty() && !out.iter().any(|t| t == trimmed) {
            out.push(trimmed.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LanguageId;

    fn valid_translation() -> NewTranslation {
        NewTranslation {
            key: "greeting".to_string(),
            language_id: Some(LanguageId(1)),
            content: "Hello".to_string(),
            context: Some("home screen".to_string()),
            tags: vec!["web".to_string()],
        }
    }

    #[test]
    fn accepts_valid_translation() {
        assert!(validate_new_translation(&valid_translation()).is_ok());
    }

    #[test]
    fn reports_missing_required_fields() {
        let errors = validate_new_translation(&NewTranslation::default()).unwrap_err();
        assert_eq!(errors.field("key"), ["The key field is required."]);
        assert_eq!(errors.field("language_id"), ["The language_id field is required."]);
        assert_eq!(errors.field("content"), ["The content field is required."]);
        assert_eq!(
            errors.to_string(),
            "The content field is required. (and 2 more errors)"
        );
    }

    #[test]
    fn enforces_length_limits_in_characters() {
        let mut input = valid_translation();
        input.key = "é".repeat(MAX_KEY_CHARS);
        assert!(validate_new_translation(&input).is_ok());

        input.key.push('x');
        input.context = Some("c".repeat(MAX_CONTEXT_CHARS + 1));
        input.tags = vec!["ok".to_string(), "t".repeat(MAX_TAG_CHARS + 1)];
        let errors = validate_new_translation(&input).unwrap_err();
        assert_eq!(errors.field("key").len(), 1);
        assert_eq!(errors.field("context").len(), 1);
        assert_eq!(errors.field("tags.1").len(), 1);
        assert!(errors.field("tags.0").is_empty());
    }

    #[test]
    fn patch_rejects_blank_content_but_allows_clearing_context() {
        let blank = TranslationPatch {
            content: Some("  ".to_string()),
            ..TranslationPatch::default()
        };
        assert!(validate_patch(&blank).is_err());

        let clear = TranslationPatch {
            context: Some(None),
            ..TranslationPatch::default()
        };
        assert!(validate_patch(&clear).is_ok());
    }

    #[test]
    fn language_code_must_be_path_safe() {
        let input = NewLanguage {
            code: "en.json".to_string(),
            name: "English".to_string(),
        };
        let errors = validate_new_language(&input).unwrap_err();
        assert_eq!(errors.field("code").len(), 1);
    }

    #[test]
    fn tag_name_required() {
        assert!(validate_new_tag(&NewTag { name: " ".to_string() }).is_err());
        assert!(validate_new_tag(&NewTag { name: "mobile".to_string() }).is_ok());
    }

    #[test]
    fn normalize_tags_trims_and_dedupes() {
        let tags = vec![
            " web ".to_string(),
            String::new(),
            "mobile".to_string(),
            "web".to_string(),
        ];
        assert_eq!(normalize_tags(&tags), vec!["web", "mobile"]);
    }

    #[test]
    fn serializes_as_field_map() {
        let errors = ValidationErrors::single("key", "taken");
        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(json, serde_json::json!({ "key": ["taken"] }));
    }

    #[test]
    fn prefixed_rekeys_fields() {
        let errors = ValidationErrors::single("key", "required").prefixed("rows.3");
        assert_eq!(errors.field("rows.3.key"), ["required"]);
        assert!(errors.field("key").is_empty());
    }
}
