use crate::traits::{Generator, RelevanceAdvisor};
use crate::types::{Article, GeneratorError, PipelineError, Profile, Result};
use crate::utils;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct GeneratorConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub request_timeout_seconds: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.7,
            max_tokens: 700,
            request_timeout_seconds: 60,
        }
    }
}

impl GeneratorConfig {
    /// `OPENAI_API_KEY`, `OPENAI_BASE_URL`, `OPENAI_MODEL`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_key: std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty()),
            base_url: std::env::var("OPENAI_BASE_URL").unwrap_or(defaults.base_url),
            model: std::env::var("OPENAI_MODEL").unwrap_or(defaults.model),
            ..defaults
        }
    }
}

impl fmt::Debug for GeneratorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratorConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

const SYSTEM_PROMPT: &str = "You write short, engaging social media posts for news channels. \
Write in the language of the source material. Do not invent facts that are not in the source.";

/// Client for an OpenAI-compatible chat-completions endpoint
pub struct OpenAiGenerator {
    client: Client,
    config: GeneratorConfig,
}

impl OpenAiGenerator {
    pub fn new(config: GeneratorConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;
        Ok(Self { client, config })
    }

    async fn complete(&self, system: &str, user: String) -> std::result::Result<String, GeneratorError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| GeneratorError::Configuration("OPENAI_API_KEY is not set".to_string()))?;

        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user,
                },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        debug!("POST {} (model {})", url, self.config.model);

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(GeneratorError::Unauthorized(format!("HTTP {}", status)));
        }
        if status == StatusCode::NOT_FOUND {
            return Err(GeneratorError::Configuration(format!(
                "endpoint or model not found: {} ({})",
                url, self.config.model
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GeneratorError::Transport(format!(
                "HTTP {}: {}",
                status,
                utils::text::smart_truncate(&body, 200)
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| GeneratorError::InvalidResponse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.unwrap_or_default())
            .ok_or_else(|| GeneratorError::InvalidResponse("no choices in response".to_string()))
    }
}

impl fmt::Debug for OpenAiGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiGenerator")
            .field("client", &"<reqwest::Client>")
            .field("config", &self.config)
            .finish()
    }
}

pub fn post_prompt(profile: &Profile, article: &Article) -> String {
    let mut prompt = String::with_capacity(article.summary.len() + 512);
    prompt.push_str(&format!("Channel topic: {}\n", profile.main_topic));
    if !profile.subtopics.is_empty() {
        prompt.push_str(&format!("Subtopics: {}\n", profile.subtopics.join(", ")));
    }
    if !profile.keywords.is_empty() {
        prompt.push_str(&format!("Audience keywords: {}\n", profile.keywords.join(", ")));
    }
    if !profile.content_angle.trim().is_empty() {
        prompt.push_str(&format!("Angle: {}\n", profile.content_angle.trim()));
    }
    prompt.push_str(&format!(
        "\nWrite a post for this channel based on the news below.\n\nTitle: {}\nSummary: {}\nSource: {}\n",
        article.title, article.summary, article.url
    ));
    prompt
}

pub fn content_prompt(title: &str, body: &str) -> String {
    format!(
        "Rewrite the following page as a post for a news channel.\n\nTitle: {}\n\n{}",
        title,
        utils::text::smart_truncate(body, 6000)
    )
}

#[async_trait]
impl Generator for OpenAiGenerator {
    fn generator_name(&self) -> String {
        format!("OpenAI-compatible ({})", self.config.model)
    }

    async fn generate(
        &self,
        profile: &Profile,
        article: &Article,
    ) -> std::result::Result<String, GeneratorError> {
        info!("Generating post for \"{}\"", article.title);
        self.complete(SYSTEM_PROMPT, post_prompt(profile, article)).await
    }

    async fn generate_from_content(
        &self,
        title: &str,
        body: &str,
    ) -> std::result::Result<String, GeneratorError> {
        info!("Generating post from page \"{}\"", title);
        self.complete(SYSTEM_PROMPT, content_prompt(title, body)).await
    }
}

/// Ratings come back as `{"1": 7, "2": 0, ...}` (0-10, keyed by list number)
pub fn parse_ratings(text: &str, articles: &[Article]) -> Result<HashMap<String, f64>> {
    let start = text.find('{');
    let end = text.rfind('}');
    let json = match (start, end) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => return Err(PipelineError::Parse("no JSON object in ratings".to_string())),
    };

    let raw: HashMap<String, serde_json::Value> = serde_json::from_str(json)?;
    let mut hints = HashMap::new();
    for (key, value) in raw {
        let (Ok(index), Some(rating)) = (key.trim().parse::<usize>(), value.as_f64()) else {
            continue;
        };
        if let Some(article) = index.checked_sub(1).and_then(|i| articles.get(i)) {
            hints.insert(article.url.clone(), (rating / 10.0).clamp(0.0, 1.0));
        }
    }
    Ok(hints)
}

#[async_trait]
impl RelevanceAdvisor for OpenAiGenerator {
    async fn advise(&self, profile: &Profile, articles: &[Article]) -> Result<HashMap<String, f64>> {
        if articles.is_empty() {
            return Ok(HashMap::new());
        }

        let mut prompt = format!(
            "Rate how relevant each headline is for a channel about \"{}\" (keywords: {}). \
Answer with a JSON object mapping the headline number to a score from 0 to 10 and nothing else.\n\n",
            profile.main_topic,
            profile.keywords.join(", ")
        );
        for (i, article) in articles.iter().enumerate() {
            prompt.push_str(&format!("{}. {}\n", i + 1, article.title));
        }

        let answer = self
            .complete("You rate news relevance. Reply with JSON only.", prompt)
            .await?;
        let hints = parse_ratings(&answer, articles);
        if let Err(e) = &hints {
            warn!("Unusable relevance ratings: {}", e);
        }
        hints
    }
}
