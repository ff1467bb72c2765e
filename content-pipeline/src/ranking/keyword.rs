use super::{ScoringContext, ScoringStrategy};
use crate::types::{Article, Profile, ScoreBreakdown};

/// Keyword overlap only. Every other signal stays at zero.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordStrategy;

impl ScoringStrategy for KeywordStrategy {
    fn name(&self) -> &'static str {
        "keyword"
    }

    fn score(&self, article: &Article, profile: &Profile, ctx: &ScoringContext<'_>) -> ScoreBreakdown {
        ScoreBreakdown {
            keyword: keyword_signal(&article.searchable_text(), profile, ctx),
            ..Default::default()
        }
    }
}

/// Fraction of profile keywords found in `text`, scaled to the keyword weight
pub(crate) fn keyword_signal(text: &str, profile: &Profile, ctx: &ScoringContext<'_>) -> f64 {
    let keywords: Vec<String> = profile
        .keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect();

    if keywords.is_empty() {
        return 0.0;
    }

    let found = keywords.iter().filter(|k| text.contains(k.as_str())).count();
    ctx.config.keyword_weight * found as f64 / keywords.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranking::{CategoryTable, RankerConfig};
    use chrono::Utc;

    #[test]
    fn test_keyword_fraction() {
        let config = RankerConfig::default();
        let categories = CategoryTable::default();
        let ctx = ScoringContext {
            config: &config,
            categories: &categories,
            profile_category: None,
            now: Utc::now(),
        };
        let profile = Profile::keywords_only(
            "robots",
            vec!["robot".to_string(), "automation".to_string()],
        );

        let half = keyword_signal("a robot arm", &profile, &ctx);
        assert!((half - config.keyword_weight / 2.0).abs() < 1e-9);
        assert_eq!(keyword_signal("weather report", &profile, &ctx), 0.0);
        assert_eq!(
            keyword_signal("anything", &Profile::default(), &ctx),
            0.0
        );
    }
}
