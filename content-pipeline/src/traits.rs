use crate::types::{
    Article, GenerationRecord, GeneratorError, Profile, QuotaBalance, Result,
};
use async_trait::async_trait;
use std::collections::HashMap;

/// A place articles come from (RSS feeds, APIs, etc.)
#[async_trait]
pub trait Source: Send + Sync {
    /// Human-readable name, also the diversity key used by the ranker
    fn name(&self) -> String;

    /// Fetch the current batch of articles.
    /// Sources drop items older than their retention window themselves.
    async fn fetch_articles(&self) -> Result<Vec<Article>>;
}

/// The text generation service
#[async_trait]
pub trait Generator: Send + Sync {
    fn generator_name(&self) -> String;

    /// Write a post about `article` for the audience described by `profile`
    async fn generate(
        &self,
        profile: &Profile,
        article: &Article,
    ) -> std::result::Result<String, GeneratorError>;

    /// Write a post from raw page content (link requests)
    async fn generate_from_content(
        &self,
        title: &str,
        body: &str,
    ) -> std::result::Result<String, GeneratorError>;
}

/// Per-user generation balance.
///
/// `debit` must be atomic per user: two concurrent calls against a balance of
/// one may not both return `true`.
#[async_trait]
pub trait QuotaLedger: Send + Sync {
    async fn balance(&self, user_id: &str) -> Result<QuotaBalance>;

    /// Take exactly one unit. `Ok(false)` when the balance is already zero.
    async fn debit(&self, user_id: &str) -> Result<bool>;

    /// Add `amount` units (purchases, compensation).
    async fn credit(&self, user_id: &str, amount: u32) -> Result<QuotaBalance>;
}

/// Append-only log of successful generations, used for analytics
#[async_trait]
pub trait GenerationHistory: Send + Sync {
    async fn record(&self, record: GenerationRecord) -> Result<()>;

    async fn recent_for_user(&self, user_id: &str, limit: usize) -> Result<Vec<GenerationRecord>>;
}

/// Builds an audience profile from a channel identifier
#[async_trait]
pub trait ProfileSource: Send + Sync {
    async fn build_profile(&self, identifier: &str) -> Result<Profile>;
}

/// Rates articles for a profile ahead of ranking (0.0 - 1.0, keyed by URL).
/// Articles missing from the map fall back to local scoring.
#[async_trait]
pub trait RelevanceAdvisor: Send + Sync {
    async fn advise(&self, profile: &Profile, articles: &[Article]) -> Result<HashMap<String, f64>>;
}
