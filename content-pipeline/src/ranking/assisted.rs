use super::{ScoringContext, ScoringStrategy};
use crate::traits::RelevanceAdvisor;
use crate::types::{Article, Profile, ScoreBreakdown};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Blends relevance hints (0.0 - 1.0, keyed by URL) into a local strategy's
/// keyword signal. Articles without a hint keep the fallback score unchanged.
pub struct AssistedStrategy<'a> {
    fallback: &'a dyn ScoringStrategy,
    hints: HashMap<String, f64>,
}

impl<'a> AssistedStrategy<'a> {
    pub fn new(fallback: &'a dyn ScoringStrategy, hints: HashMap<String, f64>) -> Self {
        let hints = hints
            .into_iter()
            .filter(|(_, hint)| hint.is_finite())
            .map(|(url, hint)| (url, hint.clamp(0.0, 1.0)))
            .collect();
        Self { fallback, hints }
    }

    /// Ask the advisor for hints ahead of ranking. An advisor that fails or
    /// does not answer within `timeout` leaves the strategy equivalent to
    /// its fallback.
    pub async fn prepare(
        advisor: &dyn RelevanceAdvisor,
        fallback: &'a dyn ScoringStrategy,
        profile: &Profile,
        articles: &[Article],
        timeout: Duration,
    ) -> AssistedStrategy<'a> {
        let hints = match tokio::time::timeout(timeout, advisor.advise(profile, articles)).await {
            Ok(Ok(hints)) => {
                debug!("Advisor rated {}/{} articles", hints.len(), articles.len());
                hints
            }
            Ok(Err(e)) => {
                warn!("Relevance advisor failed, using local scoring: {}", e);
                HashMap::new()
            }
            Err(_) => {
                warn!(
                    "Relevance advisor gave no answer within {:?}, using local scoring",
                    timeout
                );
                HashMap::new()
            }
        };
        Self::new(fallback, hints)
    }
}

impl ScoringStrategy for AssistedStrategy<'_> {
    fn name(&self) -> &'static str {
        "assisted"
    }

    fn score(&self, article: &Article, profile: &Profile, ctx: &ScoringContext<'_>) -> ScoreBreakdown {
        let mut breakdown = self.fallback.score(article, profile, ctx);

        if let Some(hint) = self.hints.get(&article.url) {
            let advised = hint * ctx.config.keyword_weight;
            breakdown.keyword = (breakdown.keyword + advised) / 2.0;
        }

        breakdown
    }
}
