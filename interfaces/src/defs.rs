use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub summary: String,
    pub url: String,
    pub source: String,
    pub published_at: DateTime<Utc>,
    pub image_url: Option<String>,
    pub tags: Vec<String>,
}

impl Article {
    /// Lower-cased title and summary, the text every matcher runs against.
    pub fn searchable_text(&self) -> String {
        format!("{} {}", self.title, self.summary).to_lowercase()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub keyword: f64,
    pub topic: f64,
    pub freshness: f64,
    pub quality: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        self.keyword + self.topic + self.freshness + self.quality
    }

    /// The part of the score that says something about the profile.
    /// Freshness and quality alone never make an article relevant.
    pub fn relevance(&self) -> f64 {
        self.keyword + self.topic
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredArticle {
    pub article: Article,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub main_topic: String,
    pub subtopics: Vec<String>,
    pub keywords: Vec<String>,
    pub content_angle: String,
    pub category: Option<String>,
}

impl Profile {
    pub fn keywords_only(main_topic: impl Into<String>, keywords: Vec<String>) -> Self {
        Self {
            main_topic: main_topic.into(),
            keywords,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GenerationMode {
    /// Write a post about a ranked news item for the profile's audience.
    Topic,
    /// Rewrite the content of a single page the user linked.
    Link,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub user_id: String,
    pub profile: Profile,
    pub mode: GenerationMode,
    pub candidates: Vec<ScoredArticle>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FailureReason {
    NoCandidates,
    CandidatesExhausted { attempts: usize },
    QuotaExhausted,
    GeneratorUnavailable { message: String },
    ContentUnavailable { message: String },
    LedgerFailure { message: String },
    Cancelled,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::NoCandidates => write!(f, "no relevant articles found"),
            FailureReason::CandidatesExhausted { attempts } => {
                write!(f, "generation refused or empty for all {} candidates", attempts)
            }
            FailureReason::QuotaExhausted => write!(f, "generation quota exhausted"),
            FailureReason::GeneratorUnavailable { message } => {
                write!(f, "generation service unavailable: {}", message)
            }
            FailureReason::ContentUnavailable { message } => {
                write!(f, "could not read the linked content: {}", message)
            }
            FailureReason::LedgerFailure { message } => {
                write!(f, "quota could not be charged, post withheld: {}", message)
            }
            FailureReason::Cancelled => write!(f, "request cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GenerationResult {
    Success { text: String, article: Article },
    Failure { reason: FailureReason },
}

impl GenerationResult {
    pub fn failure(reason: FailureReason) -> Self {
        GenerationResult::Failure { reason }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, GenerationResult::Success { .. })
    }

    pub fn article(&self) -> Option<&Article> {
        match self {
            GenerationResult::Success { article, .. } => Some(article),
            GenerationResult::Failure { .. } => None,
        }
    }

    pub fn failure_reason(&self) -> Option<&FailureReason> {
        match self {
            GenerationResult::Success { .. } => None,
            GenerationResult::Failure { reason } => Some(reason),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaBalance {
    pub remaining: i64,
    pub total_used: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub id: String,
    pub user_id: String,
    pub topic: String,
    pub article_url: String,
    pub created_at: DateTime<Utc>,
}

// Object style note:
// Everything in this module is plain data. Scores are only meaningful for the
// profile they were computed against and are never persisted; a
// GenerationRequest lives for one pipeline run. Quota balances belong to the
// ledger implementation, callers only see copies.
