pub mod assisted;
pub mod category;
pub mod keyword;

pub use assisted::AssistedStrategy;
pub use category::{CategoryEntry, CategoryStrategy, CategoryTable};
pub use keyword::KeywordStrategy;

use crate::profile::keyword_profile;
use crate::types::{Article, Profile, ScoreBreakdown, ScoredArticle};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct FreshnessBand {
    pub max_age_hours: i64,
    pub bonus: f64,
}

/// Weights and caps of the scoring signals. Defaults sum to a maximum of 100.
#[derive(Debug, Clone)]
pub struct RankerConfig {
    pub keyword_weight: f64,

    pub category_bonus: f64,
    pub main_topic_bonus: f64,
    pub subtopic_bonus: f64,
    pub subtopic_cap: f64,
    pub topic_cap: f64,

    /// Checked in order; the first band the age falls under wins.
    pub freshness_bands: Vec<FreshnessBand>,
    pub retention_hours: i64,
    pub retention_bonus: f64,

    pub title_length: (usize, usize),
    pub summary_length: (usize, usize),
    pub length_bonus: f64,
    pub indicator_words: Vec<String>,
    pub indicator_bonus: f64,
    pub max_indicators: usize,
    pub quality_cap: f64,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            keyword_weight: 50.0,
            category_bonus: 15.0,
            main_topic_bonus: 5.0,
            subtopic_bonus: 2.5,
            subtopic_cap: 5.0,
            topic_cap: 25.0,
            freshness_bands: vec![
                FreshnessBand { max_age_hours: 6, bonus: 15.0 },
                FreshnessBand { max_age_hours: 12, bonus: 10.0 },
                FreshnessBand { max_age_hours: 24, bonus: 6.0 },
                FreshnessBand { max_age_hours: 48, bonus: 3.0 },
            ],
            retention_hours: 72,
            retention_bonus: 1.0,
            title_length: (20, 120),
            summary_length: (60, 600),
            length_bonus: 3.0,
            indicator_words: ["expert", "data", "first time", "study", "exclusive", "record"]
                .iter()
                .map(|w| w.to_string())
                .collect(),
            indicator_bonus: 1.0,
            max_indicators: 4,
            quality_cap: 10.0,
        }
    }
}

/// Everything a strategy may read besides the article and the profile
pub struct ScoringContext<'a> {
    pub config: &'a RankerConfig,
    pub categories: &'a CategoryTable,
    pub profile_category: Option<String>,
    pub now: DateTime<Utc>,
}

/// One way of scoring an article against a profile. Must be pure.
pub trait ScoringStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn score(&self, article: &Article, profile: &Profile, ctx: &ScoringContext<'_>) -> ScoreBreakdown;
}

pub struct Ranker {
    strategy: Box<dyn ScoringStrategy>,
    config: RankerConfig,
    categories: Arc<CategoryTable>,
}

impl Ranker {
    pub fn new(config: RankerConfig, categories: Arc<CategoryTable>) -> Self {
        Self {
            strategy: Box::new(CategoryStrategy),
            config,
            categories,
        }
    }

    pub fn with_strategy(mut self, strategy: Box<dyn ScoringStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// The configured strategy, e.g. as the fallback of an assisted one
    pub fn strategy(&self) -> &dyn ScoringStrategy {
        self.strategy.as_ref()
    }

    pub fn rank(&self, articles: &[Article], profile: &Profile, limit: usize) -> Vec<ScoredArticle> {
        self.rank_at(articles, profile, limit, Utc::now())
    }

    /// Ranking against a fixed clock. Same inputs, same ordered output.
    pub fn rank_at(
        &self,
        articles: &[Article],
        profile: &Profile,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Vec<ScoredArticle> {
        self.rank_with(self.strategy.as_ref(), articles, profile, limit, now)
    }

    /// Free-text keywords instead of a profile
    pub fn rank_by_keywords(&self, articles: &[Article], keywords: &str, limit: usize) -> Vec<ScoredArticle> {
        self.rank(articles, &keyword_profile(keywords), limit)
    }

    pub fn rank_with(
        &self,
        strategy: &dyn ScoringStrategy,
        articles: &[Article],
        profile: &Profile,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Vec<ScoredArticle> {
        let ctx = ScoringContext {
            config: &self.config,
            categories: &self.categories,
            profile_category: self.categories.profile_category(profile),
            now,
        };

        let mut scored: Vec<ScoredArticle> = articles
            .iter()
            .filter_map(|article| {
                let breakdown = strategy.score(article, profile, &ctx);
                if breakdown.relevance() <= 0.0 {
                    return None;
                }
                Some(ScoredArticle {
                    article: article.clone(),
                    score: breakdown.total(),
                    breakdown,
                    category: self.categories.categorize_article(article),
                })
            })
            .collect();

        // Stable: equal scores keep fetch order
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));

        debug!(
            "{} strategy: {}/{} articles relevant to \"{}\"",
            strategy.name(),
            scored.len(),
            articles.len(),
            profile.main_topic
        );

        select_diverse(scored, limit)
    }
}

/// One article per source first, then backfill by score. URLs never repeat.
pub fn select_diverse(scored: Vec<ScoredArticle>, limit: usize) -> Vec<ScoredArticle> {
    let mut taken = vec![false; scored.len()];
    let mut sources = HashSet::new();
    let mut urls = HashSet::new();
    let mut order = Vec::with_capacity(limit.min(scored.len()));

    for (i, candidate) in scored.iter().enumerate() {
        if order.len() >= limit {
            break;
        }
        if urls.contains(&candidate.article.url) || !sources.insert(candidate.article.source.clone()) {
            continue;
        }
        urls.insert(candidate.article.url.clone());
        taken[i] = true;
        order.push(i);
    }

    for (i, candidate) in scored.iter().enumerate() {
        if order.len() >= limit {
            break;
        }
        if taken[i] || !urls.insert(candidate.article.url.clone()) {
            continue;
        }
        taken[i] = true;
        order.push(i);
    }

    let mut slots: Vec<Option<ScoredArticle>> = scored.into_iter().map(Some).collect();
    order.into_iter().filter_map(|i| slots[i].take()).collect()
}
