use crate::parser::FeedParser;
use crate::traits::Source;
use crate::types::{Article, FetchConfig, Result};
use crate::utils;
use crate::Fetcher;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug, Default, Clone)]
struct FeedCache {
    title: Option<String>,
    etag: Option<String>,
    last_modified: Option<String>,
    articles: Vec<Article>,
}

/// Generic RSS/Atom feed source
pub struct RssFeedSource {
    pub url: String,
    pub title: Option<String>,
    fetcher: Arc<Fetcher>,
    parser: FeedParser,
    cache: RwLock<FeedCache>,
}

impl RssFeedSource {
    pub fn new(url: String, fetcher: Arc<Fetcher>) -> Self {
        let parser = FeedParser::new(fetcher.config().retention_hours);
        Self {
            url,
            title: None,
            fetcher,
            parser,
            cache: RwLock::new(FeedCache::default()),
        }
    }

    pub fn from_config(url: String, fetch_config: FetchConfig) -> Result<Self> {
        Ok(Self::new(url, Arc::new(Fetcher::new(fetch_config)?)))
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    async fn display_name(&self) -> String {
        if let Some(title) = &self.title {
            return title.clone();
        }
        if let Some(title) = &self.cache.read().await.title {
            return title.clone();
        }
        fallback_name(&self.url)
    }
}

fn fallback_name(url: &str) -> String {
    match utils::url::extract_domain(url) {
        Some(domain) => format!("RSS Feed ({})", domain),
        None => "RSS Feed".to_string(),
    }
}

#[async_trait]
impl Source for RssFeedSource {
    fn name(&self) -> String {
        // The configured title wins; otherwise the feed's own title once known
        match &self.title {
            Some(title) => title.clone(),
            None => self
                .cache
                .try_read()
                .ok()
                .and_then(|cache| cache.title.clone())
                .unwrap_or_else(|| fallback_name(&self.url)),
        }
    }

    async fn fetch_articles(&self) -> Result<Vec<Article>> {
        info!("Pulling RSS feed: {}", self.url);

        let (etag, last_modified) = {
            let cache = self.cache.read().await;
            (cache.etag.clone(), cache.last_modified.clone())
        };

        let fetch_result = self
            .fetcher
            .fetch(&self.url, etag.as_deref(), last_modified.as_deref())
            .await?;

        debug!(
            "Feed {} answered {:?} in {}ms",
            self.url, fetch_result.http_status, fetch_result.response_time_ms
        );

        let content = match fetch_result.content {
            Some(content) => content,
            None => {
                // 304: the previous batch is still current, minus what aged out
                let mut cache = self.cache.write().await;
                let cached = std::mem::take(&mut cache.articles);
                cache.articles = self.parser.retain_fresh(cached, Utc::now());
                debug!(
                    "Feed {} not modified, reusing {} cached articles",
                    self.url,
                    cache.articles.len()
                );
                return Ok(cache.articles.clone());
            }
        };

        let feed_title = FeedParser::extract_feed_info(&content)
            .ok()
            .and_then(|(title, _)| title);
        {
            let mut cache = self.cache.write().await;
            if cache.title.is_none() {
                cache.title = feed_title;
            }
        }

        let source_name = self.display_name().await;
        let parsed = self.parser.parse_feed(&content, &source_name, Utc::now())?;

        let mut cache = self.cache.write().await;
        cache.etag = fetch_result.etag;
        cache.last_modified = fetch_result.last_modified;
        cache.articles = parsed.articles.clone();

        info!("Pulled {} articles from {}", parsed.articles.len(), source_name);
        Ok(parsed.articles)
    }
}
