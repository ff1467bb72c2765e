use crate::types::{Article, PipelineError, Result};
use crate::utils;
use crate::Fetcher;
use chrono::Utc;
use scraper::{Html, Selector};
use std::sync::Arc;
use tracing::{debug, info};

/// Readable text of one article page
#[derive(Debug, Clone, PartialEq)]
pub struct PageContent {
    pub url: String,
    pub title: String,
    pub body: String,
    pub image_url: Option<String>,
}

impl PageContent {
    /// The page as the single candidate of a link request
    pub fn to_article(&self) -> Article {
        let summary = self
            .body
            .split("\n\n")
            .next()
            .map(|p| utils::text::smart_truncate(p, 300))
            .unwrap_or_default();

        Article {
            title: self.title.clone(),
            summary,
            url: self.url.clone(),
            source: utils::url::extract_domain(&self.url).unwrap_or_else(|| "web".to_string()),
            published_at: Utc::now(),
            image_url: self.image_url.clone(),
            tags: Vec::new(),
        }
    }
}

struct PageSelectors {
    og_title: Selector,
    og_image: Selector,
    heading: Selector,
    title: Selector,
    article_paragraph: Selector,
    paragraph: Selector,
}

impl PageSelectors {
    fn new() -> Result<Self> {
        Ok(Self {
            og_title: selector(r#"meta[property="og:title"]"#)?,
            og_image: selector(r#"meta[property="og:image"]"#)?,
            heading: selector("h1")?,
            title: selector("title")?,
            article_paragraph: selector("article p")?,
            paragraph: selector("p")?,
        })
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| PipelineError::Config(format!("bad selector {}: {}", css, e)))
}

/// Downloads a page and pulls out its title and body paragraphs
pub struct PageFetcher {
    fetcher: Arc<Fetcher>,
    selectors: PageSelectors,
    min_paragraph_chars: usize,
    max_body_chars: usize,
}

impl PageFetcher {
    pub fn new(fetcher: Arc<Fetcher>) -> Result<Self> {
        Ok(Self {
            fetcher,
            selectors: PageSelectors::new()?,
            min_paragraph_chars: 40,
            max_body_chars: 6000,
        })
    }

    pub async fn fetch(&self, url: &str) -> Result<PageContent> {
        if !utils::url::is_http_url(url) {
            return Err(PipelineError::Config(format!("not an http(s) URL: {}", url)));
        }

        let html = self.fetcher.fetch_page(url).await?;
        let page = self.extract(&html, url).ok_or_else(|| {
            PipelineError::Parse(format!("no readable text on {}", url))
        })?;

        info!("Read page {} ({} chars)", url, page.body.chars().count());
        Ok(page)
    }

    pub fn extract(&self, html: &str, url: &str) -> Option<PageContent> {
        let document = Html::parse_document(html);
        let s = &self.selectors;

        let meta = |selector: &Selector| {
            document
                .select(selector)
                .filter_map(|el| el.value().attr("content"))
                .map(utils::text::collapse_whitespace)
                .find(|v| !v.is_empty())
        };
        let text_of = |selector: &Selector| {
            document
                .select(selector)
                .map(|el| utils::text::collapse_whitespace(&el.text().collect::<String>()))
                .find(|v| !v.is_empty())
        };

        let mut paragraphs: Vec<String> = document
            .select(&s.article_paragraph)
            .map(|el| utils::text::collapse_whitespace(&el.text().collect::<Vec<_>>().join(" ")))
            .filter(|p| p.chars().count() >= self.min_paragraph_chars)
            .collect();
        if paragraphs.is_empty() {
            debug!("No <article> paragraphs on {}, using all <p>", url);
            paragraphs = document
                .select(&s.paragraph)
                .map(|el| utils::text::collapse_whitespace(&el.text().collect::<Vec<_>>().join(" ")))
                .filter(|p| p.chars().count() >= self.min_paragraph_chars)
                .collect();
        }

        if paragraphs.is_empty() {
            return None;
        }

        let title = meta(&s.og_title)
            .or_else(|| text_of(&s.heading))
            .or_else(|| text_of(&s.title))
            .unwrap_or_else(|| url.to_string());

        Some(PageContent {
            url: url.to_string(),
            title,
            body: utils::text::smart_truncate(&paragraphs.join("\n\n"), self.max_body_chars),
            image_url: meta(&s.og_image),
        })
    }
}
