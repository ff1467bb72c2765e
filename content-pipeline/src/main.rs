use anyhow::Context;
use clap::{Parser, Subcommand};
use content_pipeline::{
    Aggregator, CategoryTable, ChannelProfileSource, FailureReason, FetchConfig, Fetcher,
    GenerationResult, Generator, GeneratorConfig, OpenAiGenerator, Orchestrator, OrchestratorConfig,
    PageFetcher, QuotaLedger, Ranker, RankerConfig, RssFeedSource, Source, SqliteStore,
};
use content_pipeline::utils::url::is_http_url;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

const DEFAULT_FEEDS: &[&str] = &[
    "https://feeds.bbci.co.uk/news/technology/rss.xml",
    "https://feeds.bbci.co.uk/news/rss.xml",
    "https://feeds.npr.org/1001/rss.xml",
    "https://rss.cnn.com/rss/edition.rss",
];

#[derive(Parser, Debug)]
#[command(author, version, about = "Turns news into channel posts", long_about = None)]
struct Cli {
    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// sqlite URL of the quota store (falls back to DATABASE_URL)
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Feed to aggregate, as URL or TITLE=URL; repeat for several
    /// (defaults to a built-in list)
    #[arg(long = "feed", global = true)]
    feeds: Vec<String>,

    /// JSON category table replacing the built-in one
    #[arg(long, global = true)]
    categories: Option<PathBuf>,

    /// Free generations for users the store has not seen yet
    #[arg(long, global = true, default_value_t = 0)]
    free_quota: i64,

    /// Let the generation service pre-rate headlines
    #[arg(long, global = true)]
    assisted: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a post about the best news for some keywords
    Topic {
        #[arg(long)]
        user: String,
        #[arg(long)]
        keywords: String,
    },
    /// Generate from a channel (@name, t.me/name) or an article URL
    Link {
        #[arg(long)]
        user: String,
        reference: String,
    },
    /// Add generations to a user's balance
    Credit {
        #[arg(long)]
        user: String,
        #[arg(long)]
        amount: u32,
    },
    /// Show a user's balance
    Balance {
        #[arg(long)]
        user: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    let database_url = cli
        .database_url
        .clone()
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .unwrap_or_else(|| "sqlite://content-pipeline.db".to_string());

    let store = Arc::new(
        SqliteStore::connect(&database_url)
            .await
            .with_context(|| format!("opening quota store {}", database_url))?
            .with_initial_quota(cli.free_quota),
    );

    match &cli.command {
        Command::Credit { user, amount } => {
            let balance = store.credit(user, *amount).await?;
            println!("{}: {} generations left ({} used)", user, balance.remaining, balance.total_used);
            return Ok(());
        }
        Command::Balance { user } => {
            let balance = store.balance(user).await?;
            println!("{}: {} generations left ({} used)", user, balance.remaining, balance.total_used);
            return Ok(());
        }
        Command::Topic { .. } | Command::Link { .. } => {}
    }

    let orchestrator = build_orchestrator(&cli, store.clone())?;

    let result = match &cli.command {
        Command::Topic { user, keywords } => orchestrator.generate_by_keywords(user, keywords).await,
        Command::Link { user, reference } => orchestrator.generate_by_reference(user, reference).await,
        Command::Credit { .. } | Command::Balance { .. } => return Ok(()),
    };

    match result {
        GenerationResult::Success { text, article } => {
            println!("{}\n\nSource: {}", text, article.url);
            Ok(())
        }
        GenerationResult::Failure { reason } => {
            error!("Generation failed: {}", reason);
            if matches!(reason, FailureReason::QuotaExhausted) {
                println!("No generations left. Use `credit` to add more.");
            } else {
                println!("Could not generate a post: {}", reason);
            }
            std::process::exit(1);
        }
    }
}

fn build_orchestrator(cli: &Cli, store: Arc<SqliteStore>) -> anyhow::Result<Orchestrator> {
    let fetch_config = FetchConfig::default();
    let fetcher = Arc::new(Fetcher::new(fetch_config.clone())?);

    let feed_urls: Vec<String> = if cli.feeds.is_empty() {
        DEFAULT_FEEDS.iter().map(|f| f.to_string()).collect()
    } else {
        cli.feeds.clone()
    };
    let sources: Vec<Arc<dyn Source>> = feed_urls
        .into_iter()
        .map(|feed| {
            let source = match feed.split_once('=') {
                Some((title, url)) if is_http_url(url) => {
                    RssFeedSource::new(url.to_string(), fetcher.clone()).with_title(title)
                }
                _ => RssFeedSource::new(feed, fetcher.clone()),
            };
            Arc::new(source) as Arc<dyn Source>
        })
        .collect();
    info!("Using {} feeds", sources.len());

    let categories = Arc::new(match &cli.categories {
        Some(path) => CategoryTable::from_file(path)
            .with_context(|| format!("loading categories from {}", path.display()))?,
        None => CategoryTable::default(),
    });

    let generator_config = GeneratorConfig::from_env();
    info!("Generator: {:?}", generator_config);
    let generator = Arc::new(OpenAiGenerator::new(generator_config)?);
    info!("Posts are written by {}", generator.generator_name());

    let aggregator = Arc::new(Aggregator::new(sources, &fetch_config));
    let ranker = Arc::new(Ranker::new(RankerConfig::default(), categories.clone()));

    let mut orchestrator = Orchestrator::new(
        aggregator,
        ranker,
        generator.clone(),
        store.clone(),
        OrchestratorConfig::default(),
    )
    .with_history(store)
    .with_profile_source(Arc::new(ChannelProfileSource::new(fetcher.clone(), categories)))
    .with_page_fetcher(Arc::new(PageFetcher::new(fetcher)?));

    if cli.assisted {
        orchestrator = orchestrator.with_advisor(generator);
    }

    Ok(orchestrator)
}
