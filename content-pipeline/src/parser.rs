use crate::types::{Article, PipelineError, Result};
use chrono::{DateTime, Duration, Utc};
use feed_rs::parser;
use scraper::Html;
use std::collections::HashSet;
use tracing::{debug, info};

#[derive(Debug)]
pub struct ParsedFeed {
    pub title: Option<String>,
    pub description: Option<String>,
    pub articles: Vec<Article>,
}

pub struct FeedParser {
    retention: Duration,
}

impl FeedParser {
    pub fn new(retention_hours: i64) -> Self {
        Self {
            retention: Duration::hours(retention_hours),
        }
    }

    /// Parse RSS/Atom content into articles attributed to `source_name`.
    /// Entries without a link, repeated GUIDs/URLs and entries older than
    /// the retention window are skipped.
    pub fn parse_feed(&self, content: &str, source_name: &str, now: DateTime<Utc>) -> Result<ParsedFeed> {
        debug!("Parsing feed content ({} bytes)", content.len());

        let feed = parser::parse(content.as_bytes())
            .map_err(|e| PipelineError::Parse(format!("Failed to parse feed: {}", e)))?;

        let title = feed.title.map(|t| t.content);
        let description = feed.description.map(|d| d.content);
        let mut seen_guids = HashSet::new();
        let mut seen_urls = HashSet::new();
        let mut articles = Vec::new();
        let mut expired = 0usize;

        for entry in feed.entries {
            if !entry.id.is_empty() && !seen_guids.insert(entry.id.clone()) {
                debug!("Skipping duplicate entry with GUID: {}", entry.id);
                continue;
            }

            let Some(article) = self.parse_entry(entry, source_name, now) else {
                continue;
            };

            if !seen_urls.insert(article.url.clone()) {
                debug!("Skipping duplicate entry with URL: {}", article.url);
                continue;
            }

            if !self.is_fresh(&article, now) {
                expired += 1;
                continue;
            }

            articles.push(article);
        }

        info!(
            "Parsed {} articles from {} ({} outside retention window)",
            articles.len(),
            source_name,
            expired
        );

        Ok(ParsedFeed {
            title,
            description,
            articles,
        })
    }

    pub fn is_fresh(&self, article: &Article, now: DateTime<Utc>) -> bool {
        article.published_at >= now - self.retention
    }

    /// Drop articles that aged out of the retention window since they were parsed
    pub fn retain_fresh(&self, articles: Vec<Article>, now: DateTime<Utc>) -> Vec<Article> {
        articles
            .into_iter()
            .filter(|article| self.is_fresh(article, now))
            .collect()
    }

    fn parse_entry(&self, entry: feed_rs::model::Entry, source_name: &str, now: DateTime<Utc>) -> Option<Article> {
        let url = entry.links.first()?.href.clone();
        let title = entry
            .title
            .map(|t| strip_html(&t.content))
            .unwrap_or_else(|| "Untitled".to_string());

        // Prefer the summary, fall back to the full content body
        let summary = entry
            .summary
            .map(|s| s.content)
            .or_else(|| entry.content.as_ref().and_then(|c| c.body.clone()))
            .map(|s| strip_html(&s))
            .unwrap_or_default();

        let published_at = entry
            .published
            .or(entry.updated)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(now);

        let image_url = entry
            .media
            .iter()
            .flat_map(|media| media.thumbnails.iter())
            .map(|thumbnail| thumbnail.image.uri.clone())
            .next()
            .or_else(|| {
                entry
                    .links
                    .iter()
                    .find(|link| {
                        link.media_type
                            .as_deref()
                            .is_some_and(|media_type| media_type.starts_with("image/"))
                    })
                    .map(|link| link.href.clone())
            });

        let tags = entry.categories.into_iter().map(|c| c.term).collect();

        Some(Article {
            title,
            summary,
            url,
            source: source_name.to_string(),
            published_at,
            image_url,
            tags,
        })
    }

    pub fn extract_feed_info(content: &str) -> Result<(Option<String>, Option<String>)> {
        match parser::parse(content.as_bytes()) {
            Ok(feed) => Ok((feed.title.map(|t| t.content), feed.description.map(|d| d.content))),
            Err(e) => Err(PipelineError::Parse(format!("Failed to extract feed info: {}", e))),
        }
    }
}

/// Text content of an HTML fragment with whitespace collapsed
pub fn strip_html(fragment: &str) -> String {
    let document = Html::parse_fragment(fragment);
    let text: String = document.root_element().text().collect::<Vec<_>>().join(" ");
    crate::utils::text::collapse_whitespace(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Robot Weekly</title>
    <description>Automation news</description>
    <item>
      <guid>a1</guid>
      <title>New &lt;b&gt;robot&lt;/b&gt; arm</title>
      <link>https://example.com/robot-arm</link>
      <description>&lt;p&gt;A factory robot that learns.&lt;/p&gt;</description>
      <category>robotics</category>
      <pubDate>Mon, 19 Oct 2026 10:00:00 GMT</pubDate>
    </item>
    <item>
      <guid>a1</guid>
      <title>Duplicate guid</title>
      <link>https://example.com/dup</link>
      <pubDate>Mon, 19 Oct 2026 10:00:00 GMT</pubDate>
    </item>
    <item>
      <guid>a2</guid>
      <title>Old story</title>
      <link>https://example.com/old</link>
      <pubDate>Mon, 05 Oct 2026 10:00:00 GMT</pubDate>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn test_parse_feed_filters_duplicates_and_expired() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
        let parser = FeedParser::new(72);
        let parsed = parser.parse_feed(FEED, "Robot Weekly", now).unwrap();

        assert_eq!(parsed.title.as_deref(), Some("Robot Weekly"));
        assert_eq!(parsed.articles.len(), 1);

        let article = &parsed.articles[0];
        assert_eq!(article.title, "New robot arm");
        assert_eq!(article.summary, "A factory robot that learns.");
        assert_eq!(article.url, "https://example.com/robot-arm");
        assert_eq!(article.source, "Robot Weekly");
        assert_eq!(article.tags, vec!["robotics".to_string()]);
    }

    #[test]
    fn test_retain_fresh_reapplies_window() {
        let parsed_at = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
        let parser = FeedParser::new(72);
        let articles = parser.parse_feed(FEED, "Robot Weekly", parsed_at).unwrap().articles;

        let later = parsed_at + Duration::hours(70);
        assert_eq!(parser.retain_fresh(articles.clone(), later).len(), 1);

        let much_later = parsed_at + Duration::hours(71);
        assert!(parser.retain_fresh(articles, much_later).is_empty());
    }

    #[test]
    fn test_parse_feed_rejects_garbage() {
        let parser = FeedParser::new(72);
        assert!(parser.parse_feed("not a feed", "x", Utc::now()).is_err());
    }
}
