pub mod types;
pub mod traits;
pub mod utils;
pub mod fetcher;
pub mod parser;
pub mod sources;
pub mod aggregator;
pub mod ranking;
pub mod validation;
pub mod profile;
pub mod page;
pub mod generator;
pub mod ledger;
pub mod store;
pub mod orchestrator;

pub use types::*;
pub use traits::*;
pub use fetcher::Fetcher;
pub use parser::FeedParser;
pub use sources::RssFeedSource;
pub use aggregator::{AggregateOutcome, Aggregator, ContentPolicy};
pub use ranking::{
    AssistedStrategy, CategoryStrategy, CategoryTable, KeywordStrategy, Ranker, RankerConfig,
    ScoringStrategy,
};
pub use validation::{PhraseRefusalDetector, RefusalCheck, Rejection, Validator};
pub use profile::{keyword_profile, ChannelProfileSource, Reference};
pub use page::{PageContent, PageFetcher};
pub use generator::{GeneratorConfig, OpenAiGenerator};
pub use ledger::{InMemoryHistory, InMemoryQuotaLedger};
pub use store::SqliteStore;
pub use orchestrator::{Orchestrator, OrchestratorConfig, PipelineRun, RunState};
