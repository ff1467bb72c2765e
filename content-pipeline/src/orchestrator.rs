use crate::aggregator::Aggregator;
use crate::page::{PageContent, PageFetcher};
use crate::profile::{keyword_profile, Reference};
use crate::ranking::{AssistedStrategy, Ranker};
use crate::traits::{GenerationHistory, Generator, ProfileSource, QuotaLedger, RelevanceAdvisor};
use crate::types::{
    Article, FailureReason, GenerationMode, GenerationRecord, GenerationRequest, GenerationResult,
    GeneratorError, Profile, ScoreBreakdown, ScoredArticle,
};
use crate::validation::Validator;
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// How many ranked candidates a run may try
    pub candidate_limit: usize,
    /// Upper bound for one call to the generation service (a candidate or
    /// the relevance advisor)
    pub generation_timeout: Duration,
    /// Upper bound for a whole request, commit excluded. `None` waits forever.
    pub request_timeout: Option<Duration>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            candidate_limit: 5,
            generation_timeout: Duration::from_secs(90),
            request_timeout: Some(Duration::from_secs(300)),
        }
    }
}

/// Where a run is. `Committed` and `Exhausted` are decisions; nothing has
/// been charged until the run is finished.
#[derive(Debug, Clone)]
pub enum RunState {
    Idle,
    Aggregating,
    Ranking { articles: Vec<Article> },
    GeneratingCandidate(usize),
    Validating {
        index: usize,
        output: Result<String, GeneratorError>,
    },
    NextCandidate { index: usize },
    Committed { index: usize, text: String },
    Exhausted(FailureReason),
}

impl RunState {
    pub fn name(&self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Aggregating => "aggregating",
            RunState::Ranking { .. } => "ranking",
            RunState::GeneratingCandidate(_) => "generating",
            RunState::Validating { .. } => "validating",
            RunState::NextCandidate { .. } => "next-candidate",
            RunState::Committed { .. } => "committed",
            RunState::Exhausted(_) => "exhausted",
        }
    }

    pub fn is_decided(&self) -> bool {
        matches!(self, RunState::Committed { .. } | RunState::Exhausted(_))
    }
}

/// One request driven through aggregate → rank → (generate → validate)* → charge.
///
/// `step` performs exactly one transition, so a run can be inspected between
/// states. `finish` performs the charge and must only be called once.
pub struct PipelineRun<'a> {
    orchestrator: &'a Orchestrator,
    request: GenerationRequest,
    topic: String,
    page_body: Option<String>,
    state: RunState,
    attempts: usize,
}

impl<'a> PipelineRun<'a> {
    fn new(orchestrator: &'a Orchestrator, user_id: &str, profile: Profile, topic: String) -> Self {
        Self {
            orchestrator,
            request: GenerationRequest {
                user_id: user_id.to_string(),
                profile,
                mode: GenerationMode::Topic,
                candidates: Vec::new(),
            },
            topic,
            page_body: None,
            state: RunState::Idle,
            attempts: 0,
        }
    }

    /// A link request: the page is the only candidate, nothing to aggregate
    fn for_page(orchestrator: &'a Orchestrator, user_id: &str, page: PageContent) -> Self {
        let article = page.to_article();
        let candidate = ScoredArticle {
            article,
            score: 0.0,
            breakdown: ScoreBreakdown::default(),
            category: None,
        };
        Self {
            orchestrator,
            request: GenerationRequest {
                user_id: user_id.to_string(),
                profile: Profile::keywords_only(page.title.clone(), Vec::new()),
                mode: GenerationMode::Link,
                candidates: vec![candidate],
            },
            topic: page.url,
            page_body: Some(page.body),
            state: RunState::GeneratingCandidate(0),
            attempts: 0,
        }
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn request(&self) -> &GenerationRequest {
        &self.request
    }

    /// Generator calls made so far
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    pub async fn step(&mut self) -> &RunState {
        let current = std::mem::replace(&mut self.state, RunState::Idle);
        let from = current.name();

        self.state = match current {
            RunState::Idle => RunState::Aggregating,

            RunState::Aggregating => {
                let outcome = self.orchestrator.aggregator.fetch_all().await;
                if !outcome.errors.is_empty() {
                    warn!(
                        "{} source(s) failed for {}",
                        outcome.errors.len(),
                        self.request.user_id
                    );
                }
                RunState::Ranking {
                    articles: outcome.articles,
                }
            }

            RunState::Ranking { articles } => {
                self.request.candidates = self
                    .orchestrator
                    .rank(&self.request.profile, &articles)
                    .await;
                if self.request.candidates.is_empty() {
                    info!("No relevant articles for \"{}\"", self.request.profile.main_topic);
                    RunState::Exhausted(FailureReason::NoCandidates)
                } else {
                    RunState::GeneratingCandidate(0)
                }
            }

            RunState::GeneratingCandidate(index) => {
                let output = self.generate(index).await;
                RunState::Validating { index, output }
            }

            RunState::Validating { index, output } => self.validate(index, output),

            RunState::NextCandidate { index } => {
                let next = index + 1;
                if next >= self.request.candidates.len() {
                    warn!(
                        "All {} candidates failed for {}",
                        self.attempts, self.request.user_id
                    );
                    RunState::Exhausted(FailureReason::CandidatesExhausted {
                        attempts: self.attempts,
                    })
                } else {
                    RunState::GeneratingCandidate(next)
                }
            }

            decided @ (RunState::Committed { .. } | RunState::Exhausted(_)) => decided,
        };

        debug!("Run for {}: {} -> {}", self.request.user_id, from, self.state.name());
        &self.state
    }

    /// Step until committed or exhausted. Charges nothing.
    pub async fn run_to_decision(&mut self) {
        while !self.state.is_decided() {
            self.step().await;
        }
    }

    async fn generate(&mut self, index: usize) -> Result<String, GeneratorError> {
        let orchestrator = self.orchestrator;
        self.attempts += 1;
        let article = &self.request.candidates[index].article;
        info!(
            "Generating candidate {}/{}: {}",
            index + 1,
            self.request.candidates.len(),
            article.title
        );

        let call = match &self.page_body {
            Some(body) => orchestrator.generator.generate_from_content(&article.title, body),
            None => orchestrator.generator.generate(&self.request.profile, article),
        };

        let timeout = orchestrator.config.generation_timeout;
        match tokio::time::timeout(timeout, call).await {
            Ok(output) => output,
            Err(_) => Err(GeneratorError::Timeout {
                seconds: timeout.as_secs(),
            }),
        }
    }

    fn validate(&self, index: usize, output: Result<String, GeneratorError>) -> RunState {
        let text = match output {
            Ok(text) => text,
            Err(e) if e.is_fatal() && index == 0 => {
                error!(
                    "Generator {} unusable, aborting run: {}",
                    self.orchestrator.generator.generator_name(),
                    e
                );
                return RunState::Exhausted(FailureReason::GeneratorUnavailable {
                    message: e.to_string(),
                });
            }
            Err(e) => {
                warn!("Candidate {} failed: {}", index + 1, e);
                return RunState::NextCandidate { index };
            }
        };

        match self.orchestrator.validator.validate(&text) {
            Ok(()) => RunState::Committed { index, text },
            Err(rejection) => {
                warn!("Candidate {} rejected: {}", index + 1, rejection);
                RunState::NextCandidate { index }
            }
        }
    }

    /// Charge and record a committed run, or report why it failed.
    pub async fn finish(self) -> GenerationResult {
        let user_id = self.request.user_id;

        let (index, text) = match self.state {
            RunState::Committed { index, text } => (index, text),
            RunState::Exhausted(reason) => return GenerationResult::failure(reason),
            other => {
                warn!("Run for {} abandoned while {}", user_id, other.name());
                return GenerationResult::failure(FailureReason::Cancelled);
            }
        };

        let article = self.request.candidates[index].article.clone();
        let orchestrator = self.orchestrator;

        match orchestrator.ledger.debit(&user_id).await {
            Ok(true) => {}
            Ok(false) => {
                warn!("Generation for {} succeeded but quota ran out", user_id);
                return GenerationResult::failure(FailureReason::QuotaExhausted);
            }
            Err(e) => {
                error!("Ledger debit failed for {}, post withheld: {}", user_id, e);
                return GenerationResult::failure(FailureReason::LedgerFailure {
                    message: e.to_string(),
                });
            }
        }

        if let Some(history) = &orchestrator.history {
            let record = GenerationRecord {
                id: Uuid::new_v4().to_string(),
                user_id: user_id.clone(),
                topic: self.topic,
                article_url: article.url.clone(),
                created_at: Utc::now(),
            };
            if let Err(e) = history.record(record).await {
                warn!("Failed to record generation for {}: {}", user_id, e);
            }
        }

        info!("Generated post for {} from {}", user_id, article.url);
        GenerationResult::Success { text, article }
    }
}

pub struct Orchestrator {
    aggregator: Arc<Aggregator>,
    ranker: Arc<Ranker>,
    generator: Arc<dyn Generator>,
    ledger: Arc<dyn QuotaLedger>,
    validator: Arc<Validator>,
    history: Option<Arc<dyn GenerationHistory>>,
    profile_source: Option<Arc<dyn ProfileSource>>,
    page_fetcher: Option<Arc<PageFetcher>>,
    advisor: Option<Arc<dyn RelevanceAdvisor>>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        aggregator: Arc<Aggregator>,
        ranker: Arc<Ranker>,
        generator: Arc<dyn Generator>,
        ledger: Arc<dyn QuotaLedger>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            aggregator,
            ranker,
            generator,
            ledger,
            validator: Arc::new(Validator::default()),
            history: None,
            profile_source: None,
            page_fetcher: None,
            advisor: None,
            config,
        }
    }

    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    pub fn with_history(mut self, history: Arc<dyn GenerationHistory>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_profile_source(mut self, profile_source: Arc<dyn ProfileSource>) -> Self {
        self.profile_source = Some(profile_source);
        self
    }

    pub fn with_page_fetcher(mut self, page_fetcher: Arc<PageFetcher>) -> Self {
        self.page_fetcher = Some(page_fetcher);
        self
    }

    pub fn with_advisor(mut self, advisor: Arc<dyn RelevanceAdvisor>) -> Self {
        self.advisor = Some(advisor);
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// A fresh run in `Idle`
    pub fn start_run(&self, user_id: &str, profile: Profile, topic: impl Into<String>) -> PipelineRun<'_> {
        PipelineRun::new(self, user_id, profile, topic.into())
    }

    pub async fn generate_by_keywords(&self, user_id: &str, keywords: &str) -> GenerationResult {
        self.generate_by_keywords_with_cancel(user_id, keywords, std::future::pending())
            .await
    }

    pub async fn generate_by_keywords_with_cancel(
        &self,
        user_id: &str,
        keywords: &str,
        cancel: impl Future<Output = ()>,
    ) -> GenerationResult {
        if let Some(refused) = self.check_quota(user_id).await {
            return refused;
        }

        info!("Keyword request from {}: \"{}\"", user_id, keywords.trim());
        let run = self.start_run(user_id, keyword_profile(keywords), keywords.trim());
        self.execute_with_cancel(run, cancel).await
    }

    pub async fn generate_by_reference(&self, user_id: &str, reference: &str) -> GenerationResult {
        self.generate_by_reference_with_cancel(user_id, reference, std::future::pending())
            .await
    }

    /// A channel reference ranks news for the channel's profile; an article
    /// URL rewrites that page; anything else is read as keywords.
    pub async fn generate_by_reference_with_cancel(
        &self,
        user_id: &str,
        reference: &str,
        cancel: impl Future<Output = ()>,
    ) -> GenerationResult {
        if let Some(refused) = self.check_quota(user_id).await {
            return refused;
        }

        let signal = self.request_signal(cancel);
        tokio::pin!(signal);

        let prepared = tokio::select! {
            biased;
            _ = &mut signal => None,
            run = self.prepare_reference_run(user_id, reference) => Some(run),
        };

        match prepared {
            None => {
                warn!("Request from {} cancelled before generation", user_id);
                GenerationResult::failure(FailureReason::Cancelled)
            }
            Some(Err(reason)) => GenerationResult::failure(reason),
            Some(Ok(run)) => self.drive(run, signal).await,
        }
    }

    async fn prepare_reference_run(
        &self,
        user_id: &str,
        reference: &str,
    ) -> Result<PipelineRun<'_>, FailureReason> {
        match Reference::classify(reference) {
            Reference::Channel(name) => {
                info!("Channel request from {}: @{}", user_id, name);
                let profile = self.channel_profile(reference, &name).await;
                Ok(self.start_run(user_id, profile, reference.trim()))
            }
            Reference::Page(url) => {
                info!("Link request from {}: {}", user_id, url);
                let page_fetcher = self.page_fetcher.as_ref().ok_or_else(|| {
                    FailureReason::ContentUnavailable {
                        message: "link generation is not configured".to_string(),
                    }
                })?;
                let page = page_fetcher.fetch(&url).await.map_err(|e| {
                    warn!("Could not read {}: {}", url, e);
                    FailureReason::ContentUnavailable {
                        message: e.to_string(),
                    }
                })?;
                Ok(PipelineRun::for_page(self, user_id, page))
            }
            Reference::Keywords(text) => {
                info!("Reference from {} is not a link, using keywords: \"{}\"", user_id, text);
                Ok(self.start_run(user_id, keyword_profile(&text), text))
            }
        }
    }

    async fn channel_profile(&self, reference: &str, name: &str) -> Profile {
        if let Some(source) = &self.profile_source {
            match source.build_profile(reference).await {
                Ok(profile) => return profile,
                Err(e) => warn!("Channel analysis failed for {}, using keywords: {}", reference, e),
            }
        }
        keyword_profile(&name.replace('_', " "))
    }

    /// Drive `run` to a decision unless `cancel` (or the request timeout)
    /// fires first, then finish it. The charge itself is never interrupted.
    pub async fn execute_with_cancel(
        &self,
        run: PipelineRun<'_>,
        cancel: impl Future<Output = ()>,
    ) -> GenerationResult {
        let signal = self.request_signal(cancel);
        tokio::pin!(signal);
        self.drive(run, signal).await
    }

    async fn drive<F>(&self, mut run: PipelineRun<'_>, mut signal: std::pin::Pin<&mut F>) -> GenerationResult
    where
        F: Future<Output = ()>,
    {
        let decided = tokio::select! {
            biased;
            _ = &mut signal => false,
            _ = run.run_to_decision() => true,
        };

        if !decided {
            warn!(
                "Request from {} cancelled after {} generation attempt(s), nothing charged",
                run.request().user_id,
                run.attempts()
            );
            return GenerationResult::failure(FailureReason::Cancelled);
        }

        run.finish().await
    }

    /// Resolves when the caller cancels or the request timeout elapses
    fn request_signal(&self, cancel: impl Future<Output = ()>) -> impl Future<Output = ()> {
        let timeout = self.config.request_timeout;
        async move {
            let deadline = async {
                match timeout {
                    Some(timeout) => tokio::time::sleep(timeout).await,
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::select! {
                _ = cancel => {}
                _ = deadline => {}
            }
        }
    }

    /// Quota is checked before a run starts, never inside it
    async fn check_quota(&self, user_id: &str) -> Option<GenerationResult> {
        match self.ledger.balance(user_id).await {
            Ok(balance) if balance.remaining > 0 => None,
            Ok(_) => {
                info!("User {} has no generations left", user_id);
                Some(GenerationResult::failure(FailureReason::QuotaExhausted))
            }
            Err(e) => {
                error!("Could not read balance for {}: {}", user_id, e);
                Some(GenerationResult::failure(FailureReason::LedgerFailure {
                    message: e.to_string(),
                }))
            }
        }
    }

    async fn rank(&self, profile: &Profile, articles: &[Article]) -> Vec<ScoredArticle> {
        let limit = self.config.candidate_limit;
        match &self.advisor {
            Some(advisor) => {
                let strategy = AssistedStrategy::prepare(
                    advisor.as_ref(),
                    self.ranker.strategy(),
                    profile,
                    articles,
                    self.config.generation_timeout,
                )
                .await;
                self.ranker.rank_with(&strategy, articles, profile, limit, Utc::now())
            }
            None => self.ranker.rank(articles, profile, limit),
        }
    }
}
