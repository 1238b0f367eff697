use anyhow::{Context, Result};
use clap::Parser;
use shared::{
    Config, ContentExtractor, HackerNewsClient, OpenAiClassifier, Pipeline, PreFilter,
    StoryStore,
};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "scrape-stories")]
#[command(about = "Fetch top Hacker News stories, classify them with an LLM, and store the relevant ones")]
struct Args {
    /// Maximum number of top stories to consider (overrides HN_MAX_STORIES)
    #[arg(short, long)]
    limit: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .init();

    let args = Args::parse();
    let config = Config::from_env()?;
    let limit = args.limit.unwrap_or(config.max_stories);

    let store = StoryStore::open(&config.database_url)?;
    info!(database = %config.database_url, stored = store.count()?, "Database ready");

    let source = HackerNewsClient::new(config.hn_api_base.clone())?;
    let extractor = ContentExtractor::new()?;
    let classifier = OpenAiClassifier::new(
        config.require_openai_key()?.to_string(),
        config.openai_model.clone(),
        &config.openai_base_url,
    )?;
    let prefilter = PreFilter::new(&config.keywords, config.min_score);

    let pipeline = Pipeline::new(&source, &extractor, &classifier, &store, &prefilter);
    let report = pipeline
        .run_once(limit)
        .await
        .context("Scrape run aborted")?;

    info!(
        saved = report.saved,
        total = store.count()?,
        "Done"
    );

    Ok(())
}
