use crate::types::{FetchConfig, PipelineError, Result};
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use reqwest::{Client, Response, StatusCode};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct FetchResult {
    pub http_status: Option<u16>,
    pub response_time_ms: u64,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    /// `None` on 304 Not Modified
    pub content: Option<String>,
}

pub struct Fetcher {
    client: Client,
    config: FetchConfig,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// GET `url` with conditional headers, retrying transport errors and
    /// non-success statuses with exponential backoff.
    pub async fn fetch(
        &self,
        url: &str,
        etag: Option<&str>,
        last_modified: Option<&str>,
    ) -> Result<FetchResult> {
        let start_time = Instant::now();
        debug!("Fetching {}", url);

        let mut backoff: ExponentialBackoff<backoff::SystemClock> = ExponentialBackoff {
            current_interval: Duration::from_secs(self.config.retry_delay_seconds),
            initial_interval: Duration::from_secs(self.config.retry_delay_seconds),
            max_interval: Duration::from_secs(self.config.retry_delay_seconds * 8),
            multiplier: 2.0,
            max_elapsed_time: Some(Duration::from_secs(self.config.source_timeout_seconds)),
            ..Default::default()
        };

        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            match self.send_conditional(url, etag, last_modified).await {
                Ok(response) => {
                    let status = response.status();
                    let response_time_ms = start_time.elapsed().as_millis() as u64;

                    if status == StatusCode::NOT_MODIFIED {
                        debug!("Not modified: {}", url);
                        return Ok(FetchResult {
                            http_status: Some(status.as_u16()),
                            response_time_ms,
                            etag: etag.map(|s| s.to_string()),
                            last_modified: last_modified.map(|s| s.to_string()),
                            content: None,
                        });
                    }

                    if !status.is_success() {
                        last_error = Some(PipelineError::General(format!(
                            "HTTP {}: {}",
                            status,
                            status.canonical_reason().unwrap_or("Unknown")
                        )));
                    } else {
                        return self.read_body(url, response, response_time_ms).await;
                    }
                }
                Err(e) => last_error = Some(e),
            }

            if attempt < self.config.max_retries {
                if let Some(delay) = backoff.next_backoff() {
                    warn!("Attempt {} failed for {}, retrying in {:?}", attempt + 1, url, delay);
                    tokio::time::sleep(delay).await;
                    continue;
                }
            }
            break;
        }

        error!("Failed to fetch {} after {} attempts", url, self.config.max_retries + 1);
        Err(last_error.unwrap_or_else(|| PipelineError::General("Unknown fetch error".to_string())))
    }

    /// Plain GET without conditional headers, used for article pages
    pub async fn fetch_page(&self, url: &str) -> Result<String> {
        let result = self.fetch(url, None, None).await?;
        result
            .content
            .ok_or_else(|| PipelineError::Parse(format!("Empty response from {}", url)))
    }

    async fn read_body(&self, url: &str, response: Response, response_time_ms: u64) -> Result<FetchResult> {
        let status = response.status();
        let etag = header_value(&response, "etag");
        let last_modified = header_value(&response, "last-modified");

        if let Some(content_length) = response.content_length() {
            let size_mb = content_length as usize / (1024 * 1024);
            if size_mb > self.config.max_feed_size_mb {
                return Err(PipelineError::FeedTooLarge { size_mb });
            }
        }

        let content = response.text().await?;
        info!("Fetched {} ({} bytes, {}ms)", url, content.len(), response_time_ms);

        Ok(FetchResult {
            http_status: Some(status.as_u16()),
            response_time_ms,
            etag,
            last_modified,
            content: Some(content),
        })
    }

    async fn send_conditional(
        &self,
        url: &str,
        etag: Option<&str>,
        last_modified: Option<&str>,
    ) -> Result<Response> {
        let mut request = self.client.get(url);

        if let Some(etag) = etag {
            request = request.header("If-None-Match", etag);
        }

        if let Some(last_modified) = last_modified {
            request = request.header("If-Modified-Since", last_modified);
        }

        Ok(request.send().await?)
    }
}

fn header_value(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}
