//! Demo and synthetic data for local runs and load testing.

use polyglot_core::{Language, NewLanguage, NewTag, NewTranslation};
use rand::distr::{Alphanumeric, SampleString};
use rand::seq::IndexedRandom;
use rand::Rng;
use tracing::{info, warn};

use crate::service::{ServiceError, TranslationService};

const DEMO_LANGUAGES: [(&str, &str); 4] = [
    ("en", "English"),
    ("fr", "French"),
    ("es", "Spanish"),
    ("de", "German"),
];

const DEMO_TAGS: [&str; 5] = ["mobile", "web", "desktop", "onboarding", "auth"];

const CONTEXTS: [&str; 3] = ["mobile", "web", "desktop"];

/// Rows per import transaction during bulk seeding.
pub const SEED_BATCH_SIZE: usize = 5_000;

/// What a demo seed run created. Existing rows are left alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub languages: usize,
    pub tags: usize,
}

/// Creates the demo languages and tags that are not present yet.
///
/// # Errors
///
/// Returns the first store failure.
pub async fn seed_demo(service: &TranslationService) -> Result<SeedSummary, ServiceError> {
    let mut summary = SeedSummary::default();

    let existing = service.list_languages().await?;
    for (code, name) in DEMO_LANGUAGES {
        if existing.iter().any(|l| l.code == code) {
            continue;
        }
        service
            .create_language(NewLanguage {
                code: code.to_string(),
                name: name.to_string(),
            })
            .await?;
        summary.languages += 1;
    }

    let existing = service.list_tags().await?;
    for name in DEMO_TAGS {
        if existing.iter().any(|t| t.name == name) {
            continue;
        }
        service
            .create_tag(NewTag {
                name: name.to_string(),
            })
            .await?;
        summary.tags += 1;
    }

    info!(
        languages = summary.languages,
        tags = summary.tags,
        "demo data seeded"
    );
    Ok(summary)
}

/// Inserts `total` synthetic translations spread over the existing languages,
/// in batches of `batch_size`. Returns how many rows were written.
///
/// Keys look like `auto.key.{n}.{random}` where `n` advances every ten rows,
/// so neighbouring rows share a key prefix across languages.
///
/// # Errors
///
/// Returns the first failed batch. Earlier batches stay committed.
pub async fn seed_translations(
    service: &TranslationService,
    total: usize,
    batch_size: usize,
) -> Result<usize, ServiceError> {
    let languages = service.list_languages().await?;
    if languages.is_empty() {
        warn!("no languages found, skipping bulk seed");
        return Ok(0);
    }
    let tags: Vec<String> = service
        .list_tags()
        .await?
        .into_iter()
        .map(|t| t.name)
        .collect();

    let batch_size = batch_size.max(1);
    info!(total, batch_size, "seeding translations");

    let mut written = 0;
    while written < total {
        let limit = batch_size.min(total - written);
        let rows = synthetic_batch(written, limit, &languages, &tags);
        written += service.import(rows).await?.len();
        info!(written, total, "seed batch committed");
    }

    info!(written, "seeding complete");
    Ok(written)
}

/// Builds one batch of rows. Kept synchronous: the thread-local RNG must not
/// live across an await point.
fn synthetic_batch(
    offset: usize,
    limit: usize,
    languages: &[Language],
    tags: &[String],
) -> Vec<NewTranslation> {
    let mut rng = rand::rng();
    (0..limit)
        .filter_map(|j| {
            let index = offset + j + 1;
            let language = languages.choose(&mut rng)?;
            let tag_count = rng.random_range(0..=2).min(tags.len());
            Some(NewTranslation {
                key: format!(
                    "auto.key.{}.{}",
                    index / 10,
                    Alphanumeric.sample_string(&mut rng, 6)
                ),
                language_id: Some(language.id),
                content: format!(
                    "Generated content {}",
                    Alphanumeric.sample_string(&mut rng, 40)
                ),
                context: CONTEXTS.choose(&mut rng).map(|c| (*c).to_string()),
                tags: tags
                    .choose_multiple(&mut rng, tag_count)
                    .cloned()
                    .collect(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::service::{ServerConfig, TranslationQuery};
    use crate::storage::engines::MemoryStore;
    use crate::storage::TracingMutationObserver;

    fn service() -> TranslationService {
        TranslationService::new(
            Arc::new(MemoryStore::new()),
            Arc::new(TracingMutationObserver),
            &ServerConfig::default(),
        )
    }

    #[tokio::test]
    async fn demo_seed_is_idempotent() {
        let service = service();

        let first = seed_demo(&service).await.unwrap();
        assert_eq!(first, SeedSummary { languages: 4, tags: 5 });

        let second = seed_demo(&service).await.unwrap();
        assert_eq!(second, SeedSummary::default());

        let codes: Vec<String> = service
            .list_languages()
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.code)
            .collect();
        assert_eq!(codes, ["de", "en", "es", "fr"]);
    }

    #[tokio::test]
    async fn bulk_seed_writes_requested_rows() {
        let service = service();
        seed_demo(&service).await.unwrap();

        let written = seed_translations(&service, 25, 10).await.unwrap();
        assert_eq!(written, 25);

        let page = service
            .search(TranslationQuery {
                key: Some("auto.key.".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 25);
        assert!(page
            .items
            .iter()
            .all(|t| t.content.starts_with("Generated content ") && t.tags.len() <= 2));
    }

    #[tokio::test]
    async fn bulk_seed_without_languages_is_a_no_op() {
        let service = service();
        assert_eq!(seed_translations(&service, 10, 5).await.unwrap(), 0);
    }

    #[test]
    fn synthetic_keys_share_prefix_every_ten_rows() {
        let languages = vec![Language {
            id: polyglot_core::LanguageId(1),
            code: "en".to_string(),
            name: "English".to_string(),
            created_at: 0,
        }];
        let rows = synthetic_batch(0, 12, &languages, &[]);
        assert_eq!(rows.len(), 12);
        assert!(rows[0].key.starts_with("auto.key.0."));
        assert!(rows[9].key.starts_with("auto.key.1."));
        assert!(rows.iter().all(|r| r.tags.is_empty()));
    }
}
