use crate::parser::FeedParser;
use crate::ranking::CategoryTable;
use crate::traits::ProfileSource;
use crate::types::{PipelineError, Profile, Result};
use crate::utils;
use crate::Fetcher;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

/// Profile for the "topic instead of channel" request shape
pub fn keyword_profile(text: &str) -> Profile {
    Profile::keywords_only(text.trim(), utils::extract_keywords(text))
}

/// What a user-supplied reference points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// `@name`, `t.me/name`, `telegram.me/name`
    Channel(String),
    /// Any other http(s) URL: an article page
    Page(String),
    /// Neither; treated as keywords
    Keywords(String),
}

impl Reference {
    pub fn classify(reference: &str) -> Self {
        let reference = reference.trim();

        if let Some(name) = reference.strip_prefix('@') {
            if is_channel_name(name) {
                return Reference::Channel(name.to_string());
            }
        }

        let with_scheme = if reference.starts_with("t.me/") || reference.starts_with("telegram.me/") {
            format!("https://{}", reference)
        } else {
            reference.to_string()
        };

        if let Ok(url) = Url::parse(&with_scheme) {
            if url.scheme() == "http" || url.scheme() == "https" {
                if let Some(name) = telegram_channel(&url) {
                    return Reference::Channel(name);
                }
                return Reference::Page(reference.to_string());
            }
        }

        Reference::Keywords(reference.to_string())
    }
}

fn is_channel_name(name: &str) -> bool {
    name.len() >= 3 && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn telegram_channel(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_lowercase();
    if host != "t.me" && host != "telegram.me" {
        return None;
    }

    let mut segments = url.path_segments()?.filter(|s| !s.is_empty());
    let mut name = segments.next()?;
    // Web preview links: t.me/s/<name>
    if name == "s" {
        name = segments.next()?;
    }
    is_channel_name(name).then(|| name.to_string())
}

/// Builds a profile from a channel's recent posts, read as a feed.
///
/// Channel names are turned into a feed URL through `feed_template`
/// (`{name}` is substituted); http(s) identifiers are read as feeds directly.
pub struct ChannelProfileSource {
    fetcher: Arc<Fetcher>,
    categories: Arc<CategoryTable>,
    feed_template: String,
    parser: FeedParser,
    max_keywords: usize,
}

impl ChannelProfileSource {
    pub const DEFAULT_FEED_TEMPLATE: &'static str = "https://rsshub.app/telegram/channel/{name}";

    pub fn new(fetcher: Arc<Fetcher>, categories: Arc<CategoryTable>) -> Self {
        Self {
            fetcher,
            categories,
            feed_template: Self::DEFAULT_FEED_TEMPLATE.to_string(),
            // Channel history matters more than freshness here
            parser: FeedParser::new(24 * 90),
            max_keywords: 8,
        }
    }

    pub fn with_feed_template(mut self, template: impl Into<String>) -> Self {
        self.feed_template = template.into();
        self
    }

    pub fn feed_url(&self, identifier: &str) -> Result<String> {
        match Reference::classify(identifier) {
            Reference::Channel(name) => Ok(self.feed_template.replace("{name}", &name)),
            Reference::Page(url) => Ok(url),
            Reference::Keywords(text) => Err(PipelineError::Config(format!(
                "not a channel identifier: {}",
                text
            ))),
        }
    }
}

#[async_trait]
impl ProfileSource for ChannelProfileSource {
    async fn build_profile(&self, identifier: &str) -> Result<Profile> {
        let feed_url = self.feed_url(identifier)?;
        info!("Building profile for {} from {}", identifier, feed_url);

        let content = self
            .fetcher
            .fetch(&feed_url, None, None)
            .await?
            .content
            .ok_or_else(|| PipelineError::Parse(format!("Empty response from {}", feed_url)))?;

        let parsed = self.parser.parse_feed(&content, identifier, Utc::now())?;
        if parsed.articles.is_empty() {
            return Err(PipelineError::General(format!("{} has no recent posts", identifier)));
        }

        let texts: Vec<String> = parsed
            .articles
            .iter()
            .map(|a| format!("{} {}", a.title, a.summary))
            .collect();
        let keywords = utils::top_terms(texts.iter().map(|t| t.as_str()), self.max_keywords);

        let mut tag_counts: HashMap<String, usize> = HashMap::new();
        for tag in parsed.articles.iter().flat_map(|a| a.tags.iter()) {
            *tag_counts.entry(tag.to_lowercase()).or_insert(0) += 1;
        }
        let mut subtopics: Vec<(String, usize)> = tag_counts.into_iter().collect();
        subtopics.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let main_topic = parsed
            .title
            .clone()
            .unwrap_or_else(|| identifier.trim_start_matches('@').to_string());
        let category = self.categories.detect(&texts.join(" "));

        debug!("Profile for {}: {:?} / {:?}", identifier, keywords, category);

        Ok(Profile {
            main_topic,
            subtopics: subtopics.into_iter().take(3).map(|(tag, _)| tag).collect(),
            keywords,
            content_angle: parsed.description.unwrap_or_default(),
            category,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_profile() {
        let profile = keyword_profile("  Robot, automation ");
        assert_eq!(profile.main_topic, "Robot, automation");
        assert_eq!(profile.keywords, vec!["robot", "automation"]);
        assert!(profile.subtopics.is_empty());
        assert_eq!(profile.category, None);
    }

    #[test]
    fn test_classify_references() {
        assert_eq!(Reference::classify("@tech_daily"), Reference::Channel("tech_daily".into()));
        assert_eq!(Reference::classify("t.me/tech_daily"), Reference::Channel("tech_daily".into()));
        assert_eq!(
            Reference::classify("https://t.me/s/tech_daily"),
            Reference::Channel("tech_daily".into())
        );
        assert_eq!(
            Reference::classify("https://example.com/news/1"),
            Reference::Page("https://example.com/news/1".into())
        );
        assert_eq!(
            Reference::classify("robots in farming"),
            Reference::Keywords("robots in farming".into())
        );
        assert_eq!(Reference::classify("@"), Reference::Keywords("@".into()));
    }
}
