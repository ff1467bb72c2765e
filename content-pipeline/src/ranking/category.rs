use super::keyword::keyword_signal;
use super::{RankerConfig, ScoringContext, ScoringStrategy};
use crate::types::{Article, PipelineError, Profile, Result, ScoreBreakdown};
use crate::utils;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryEntry {
    pub category: String,
    pub keywords: Vec<String>,
}

/// Keyword → category lookup. Loaded once at startup, read-only afterwards.
///
/// Terms match whole words (or whole phrases) of the normalised text. The
/// category with the most hits wins; ties go to the earlier entry.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryTable {
    entries: Vec<CategoryEntry>,
}

impl CategoryTable {
    pub fn new(entries: Vec<CategoryEntry>) -> Result<Self> {
        if entries.is_empty() {
            return Err(PipelineError::Config("category table is empty".to_string()));
        }

        let entries = entries
            .into_iter()
            .map(|entry| CategoryEntry {
                category: entry.category.trim().to_lowercase(),
                keywords: entry
                    .keywords
                    .iter()
                    .map(|k| utils::text::normalize_text(k))
                    .filter(|k| !k.is_empty())
                    .collect(),
            })
            .collect();

        Ok(Self { entries })
    }

    /// `[{"category": "...", "keywords": ["..."]}, ...]`
    pub fn from_json(json: &str) -> Result<Self> {
        let entries: Vec<CategoryEntry> = serde_json::from_str(json)?;
        Self::new(entries)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let table = Self::from_json(&std::fs::read_to_string(path)?)?;
        info!("Loaded {} categories from {}", table.entries.len(), path.display());
        Ok(table)
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.category.as_str())
    }

    pub fn detect(&self, text: &str) -> Option<String> {
        let padded = format!(" {} ", utils::text::normalize_text(text));

        let mut best: Option<(&str, usize)> = None;
        for entry in &self.entries {
            let hits = entry
                .keywords
                .iter()
                .filter(|term| padded.contains(&format!(" {} ", term)))
                .count();
            if hits > 0 && best.map_or(true, |(_, top)| hits > top) {
                best = Some((&entry.category, hits));
            }
        }

        best.map(|(category, _)| category.to_string())
    }

    pub fn categorize_article(&self, article: &Article) -> Option<String> {
        let text = format!(
            "{} {} {}",
            article.title,
            article.summary,
            article.tags.join(" ")
        );
        self.detect(&text)
    }

    /// Declared category if it is known, otherwise derived from topic and keywords
    pub fn profile_category(&self, profile: &Profile) -> Option<String> {
        if let Some(declared) = &profile.category {
            let declared = declared.trim().to_lowercase();
            if self.categories().any(|c| c == declared) {
                return Some(declared);
            }
        }

        let text = format!(
            "{} {} {}",
            profile.main_topic,
            profile.subtopics.join(" "),
            profile.keywords.join(" ")
        );
        self.detect(&text)
    }
}

fn entry(category: &str, keywords: &[&str]) -> CategoryEntry {
    CategoryEntry {
        category: category.to_string(),
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
    }
}

impl Default for CategoryTable {
    fn default() -> Self {
        Self {
            entries: vec![
                entry("technology", &[
                    "technology", "tech", "software", "ai", "artificial intelligence",
                    "machine learning", "robot", "robots", "robotics", "automation",
                    "startup", "gadget", "smartphone", "computer", "internet", "chip",
                ]),
                entry("business", &[
                    "business", "economy", "market", "markets", "stock", "stocks",
                    "finance", "bank", "investment", "investors", "company", "revenue",
                ]),
                entry("science", &[
                    "science", "research", "study", "scientists", "space", "physics",
                    "biology", "climate", "nasa", "discovery",
                ]),
                entry("politics", &[
                    "politics", "election", "government", "parliament", "president",
                    "minister", "policy", "senate", "vote",
                ]),
                entry("sports", &[
                    "sport", "sports", "football", "soccer", "basketball", "tennis",
                    "championship", "olympic", "league", "match",
                ]),
                entry("health", &[
                    "health", "medicine", "medical", "doctor", "hospital", "disease",
                    "vaccine", "nutrition", "fitness",
                ]),
                entry("entertainment", &[
                    "movie", "film", "music", "celebrity", "series", "gaming",
                    "festival", "album",
                ]),
            ],
        }
    }
}

/// The full four-signal scorer: keywords, topic/category, freshness, quality
#[derive(Debug, Default, Clone, Copy)]
pub struct CategoryStrategy;

impl ScoringStrategy for CategoryStrategy {
    fn name(&self) -> &'static str {
        "category"
    }

    fn score(&self, article: &Article, profile: &Profile, ctx: &ScoringContext<'_>) -> ScoreBreakdown {
        let text = article.searchable_text();

        ScoreBreakdown {
            keyword: keyword_signal(&text, profile, ctx),
            topic: topic_signal(article, &text, profile, ctx),
            freshness: freshness_signal(article, ctx),
            quality: quality_signal(article, &text, ctx.config),
        }
    }
}

fn topic_signal(article: &Article, text: &str, profile: &Profile, ctx: &ScoringContext<'_>) -> f64 {
    let config = ctx.config;
    let mut score = 0.0;

    if let Some(wanted) = &ctx.profile_category {
        if ctx.categories.categorize_article(article).as_ref() == Some(wanted) {
            score += config.category_bonus;
        }
    }

    let main_topic = profile.main_topic.trim().to_lowercase();
    if !main_topic.is_empty() && text.contains(&main_topic) {
        score += config.main_topic_bonus;
    }

    let subtopic_hits = profile
        .subtopics
        .iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty() && text.contains(s.as_str()))
        .count();
    score += (subtopic_hits as f64 * config.subtopic_bonus).min(config.subtopic_cap);

    score.min(config.topic_cap)
}

fn freshness_signal(article: &Article, ctx: &ScoringContext<'_>) -> f64 {
    let age_minutes = (ctx.now - article.published_at).num_minutes().max(0);
    let age_hours = age_minutes as f64 / 60.0;

    for band in &ctx.config.freshness_bands {
        if age_hours < band.max_age_hours as f64 {
            return band.bonus;
        }
    }

    if age_hours <= ctx.config.retention_hours as f64 {
        ctx.config.retention_bonus
    } else {
        0.0
    }
}

fn quality_signal(article: &Article, text: &str, config: &RankerConfig) -> f64 {
    let mut score = 0.0;

    let title_len = article.title.chars().count();
    if (config.title_length.0..=config.title_length.1).contains(&title_len) {
        score += config.length_bonus;
    }

    let summary_len = article.summary.chars().count();
    if (config.summary_length.0..=config.summary_length.1).contains(&summary_len) {
        score += config.length_bonus;
    }

    let indicators = config
        .indicator_words
        .iter()
        .filter(|word| text.contains(word.as_str()))
        .count()
        .min(config.max_indicators);
    score += indicators as f64 * config.indicator_bonus;

    score.min(config.quality_cap)
}
