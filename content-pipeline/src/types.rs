pub use interfaces::defs::{
    Article, FailureReason, GenerationMode, GenerationRecord, GenerationRequest, GenerationResult,
    Profile, QuotaBalance, ScoreBreakdown, ScoredArticle,
};

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
    pub max_feed_size_mb: usize,
    pub max_redirects: usize,
    /// Items older than this are dropped by sources at fetch time.
    pub retention_hours: i64,
    /// Upper bound for one source, retries included.
    pub source_timeout_seconds: u64,
    /// Keep only the first article per canonical key across sources.
    /// Off by default: the aggregator historically passed duplicates through.
    pub dedupe_across_sources: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "Content-Pipeline/1.0".to_string(),
            timeout_seconds: 15,
            max_retries: 2,
            retry_delay_seconds: 1,
            max_feed_size_mb: 10,
            max_redirects: 5,
            retention_hours: 72,
            source_timeout_seconds: 30,
            dedupe_across_sources: false,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum GeneratorError {
    #[error("generator misconfigured: {0}")]
    Configuration(String),

    #[error("generator rejected credentials: {0}")]
    Unauthorized(String),

    #[error("generation request failed: {0}")]
    Transport(String),

    #[error("generation timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("malformed generation response: {0}")]
    InvalidResponse(String),
}

impl GeneratorError {
    /// Errors that no other candidate can fix.
    pub fn is_fatal(&self) -> bool {
        matches!(self, GeneratorError::Configuration(_) | GeneratorError::Unauthorized(_))
    }
}

impl From<reqwest::Error> for GeneratorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GeneratorError::Transport(format!("timeout: {}", err))
        } else {
            GeneratorError::Transport(err.to_string())
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Source {source_name} failed: {message}")]
    SourceFetch { source_name: String, message: String },

    #[error("Source {source_name} timed out after {seconds}s")]
    SourceTimeout { source_name: String, seconds: u64 },

    #[error("Feed size exceeds limit: {size_mb}MB")]
    FeedTooLarge { size_mb: usize },

    #[error("Generation failed: {0}")]
    Generation(#[from] GeneratorError),

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("General error: {0}")]
    General(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
