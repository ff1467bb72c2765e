use crate::traits::Source;
use crate::types::{Article, FetchConfig, PipelineError};
use crate::utils;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Military and war coverage is never turned into posts. Terms are matched
/// as lower-cased substrings, so stems ("воен", "боев") cover their forms.
pub const DEFAULT_BLOCKLIST: &[&str] = &[
    "война", "воен", "боев", "оруж", "атака", "конфликт", "наступление",
    "оборона", "спецоперация", "ВСУ", "ВС РФ", "минобороны", "погиб",
    "ранен", "обстрел", "взрыв", "снаряд", "танк", "артиллерия",
    "авиация", "фронт", "пленных", "удар", "контрнаступление", "ЗСУ",
    "боеприпас", "мина", "ракета", "дрон", "БПЛА", "кадыров", "пригожин",
    "чвк", "мобилизация", "призыв", "окоп", "позиция", "штурм",
    "military", "warfare", "wartime", "war zone", "civil war", "invasion",
    "armed forces", "troops", "missile", "shelling", "airstrike", "air strike",
    "artillery", "ammunition", "frontline", "front line", "counteroffensive",
    "counter-offensive", "mobilization", "mobilisation", "conscription",
    "drone strike", "killed in action", "prisoners of war", "kadyrov",
    "prigozhin", "wagner group",
];

/// Hard exclusion filter applied to every fetched article
#[derive(Debug, Clone)]
pub struct ContentPolicy {
    blocked: Vec<String>,
}

impl ContentPolicy {
    pub fn new<I, S>(blocked: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            blocked: blocked
                .into_iter()
                .map(|term| term.as_ref().trim().to_lowercase())
                .filter(|term| !term.is_empty())
                .collect(),
        }
    }

    /// The first blocked term found in title + summary, if any
    pub fn violation(&self, article: &Article) -> Option<&str> {
        let text = article.searchable_text();
        self.blocked
            .iter()
            .find(|term| text.contains(term.as_str()))
            .map(|term| term.as_str())
    }

    pub fn allows(&self, article: &Article) -> bool {
        self.violation(article).is_none()
    }
}

impl Default for ContentPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCKLIST.iter().copied())
    }
}

/// Everything one aggregation pass produced
#[derive(Debug, Default)]
pub struct AggregateOutcome {
    /// Articles in source registration order, then feed order
    pub articles: Vec<Article>,
    /// Soft per-source failures
    pub errors: Vec<PipelineError>,
    pub blocked: usize,
    pub duplicates: usize,
}

pub struct Aggregator {
    sources: Vec<Arc<dyn Source>>,
    policy: ContentPolicy,
    source_timeout: Duration,
    dedupe: bool,
}

impl Aggregator {
    pub fn new(sources: Vec<Arc<dyn Source>>, config: &FetchConfig) -> Self {
        Self {
            sources,
            policy: ContentPolicy::default(),
            source_timeout: Duration::from_secs(config.source_timeout_seconds),
            dedupe: config.dedupe_across_sources,
        }
    }

    pub fn with_policy(mut self, policy: ContentPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_source_timeout(mut self, timeout: Duration) -> Self {
        self.source_timeout = timeout;
        self
    }

    /// Fetch every source concurrently and merge the results.
    ///
    /// Never fails: a source that errors or exceeds its timeout contributes
    /// nothing and is reported in `errors`.
    pub async fn fetch_all(&self) -> AggregateOutcome {
        info!("Aggregating from {} sources", self.sources.len());

        let fetches = self.sources.iter().map(|source| {
            let source = source.clone();
            let timeout = self.source_timeout;
            async move {
                let name = source.name();
                match tokio::time::timeout(timeout, source.fetch_articles()).await {
                    Ok(Ok(articles)) => Ok((name, articles)),
                    Ok(Err(e)) => Err(PipelineError::SourceFetch {
                        source_name: name,
                        message: e.to_string(),
                    }),
                    Err(_) => Err(PipelineError::SourceTimeout {
                        source_name: name,
                        seconds: timeout.as_secs(),
                    }),
                }
            }
        });

        let results = join_all(fetches).await;

        let mut outcome = AggregateOutcome::default();
        let mut seen_keys = HashSet::new();
        let mut succeeded = 0usize;

        for result in results {
            let (name, articles) = match result {
                Ok(batch) => batch,
                Err(e) => {
                    warn!("{}", e);
                    outcome.errors.push(e);
                    continue;
                }
            };
            succeeded += 1;
            debug!("Source {} returned {} articles", name, articles.len());

            for article in articles {
                if let Some(term) = self.policy.violation(&article) {
                    debug!("Blocked \"{}\" (matched {})", article.title, term);
                    outcome.blocked += 1;
                    continue;
                }

                if self.dedupe && !seen_keys.insert(dedupe_key(&article)) {
                    debug!("Dropping cross-source duplicate: {}", article.url);
                    outcome.duplicates += 1;
                    continue;
                }

                outcome.articles.push(article);
            }
        }

        info!(
            "Aggregated {} articles from {}/{} sources ({} blocked, {} duplicates)",
            outcome.articles.len(),
            succeeded,
            self.sources.len(),
            outcome.blocked,
            outcome.duplicates
        );

        outcome
    }
}

fn dedupe_key(article: &Article) -> String {
    utils::url::canonical_key(&article.url)
        .unwrap_or_else(|| utils::text::normalize_text(&article.title))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn article(title: &str, summary: &str) -> Article {
        Article {
            title: title.to_string(),
            summary: summary.to_string(),
            url: "https://example.com/a".to_string(),
            source: "test".to_string(),
            published_at: Utc::now(),
            image_url: None,
            tags: Vec::new(),
        }
    }

    #[test]
    fn test_policy_matches_substrings_case_insensitively() {
        let policy = ContentPolicy::default();
        assert!(!policy.allows(&article("MISSILE test announced", "")));
        assert!(!policy.allows(&article("Market update", "troops moved to the border")));
        assert!(policy.allows(&article("Robots in warehouses", "automation grows")));
        assert!(policy.allows(&article("New software award", "")));
    }

    #[test]
    fn test_policy_blocks_russian_military_terms() {
        let policy = ContentPolicy::default();
        let shelling = article("Обстрел и ракетный удар по городу", "Война продолжается");
        assert_eq!(policy.violation(&shelling), Some("война"));
        assert!(!policy.allows(&article("Новости ВСУ", "")));
        assert!(!policy.allows(&article("Итоги дня", "Объявлена мобилизация")));
        assert!(policy.allows(&article("Робот научился готовить", "Автоматизация кухни")));
    }

    #[test]
    fn test_dedupe_key_prefers_url() {
        let mut a = article("Same Story!", "");
        a.url = "https://www.example.com/story/".to_string();
        assert_eq!(dedupe_key(&a), "example.com/story");

        a.url = "not a url".to_string();
        assert_eq!(dedupe_key(&a), "same story");
    }
}
