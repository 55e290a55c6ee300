use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fixcal_adapters::manual::{draft_from_fields, prompt_drafts};
use fixcal_core::FixtureDraft;
use fixcal_storage::FixtureStore;
use fixcal_sync::{FeedConfig, IngestReport, RunOptions, SyncPipeline, SyncRunSummary};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "fixcal", version)]
#[command(about = "Scrape league fixtures into a local store and publish them as an iCalendar feed")]
struct Cli {
    /// YAML configuration file (defaults to ./fixcal.yaml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// SQLite fixture store
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Output .ics file
    #[arg(long, global = true)]
    feed: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Scrape the configured source, store new fixtures and rewrite the feed
    Sync {
        /// Skip the source and only regenerate the feed from the store
        #[arg(long)]
        no_scrape: bool,
    },
    /// Add a fixture by hand; prompts interactively when no fields are given
    Add {
        /// DATE TIME HOME AWAY [VENUE] [RESULT]
        #[arg(value_name = "FIELD", num_args = 0..=6)]
        fields: Vec<String>,
    },
    /// Print stored fixtures ordered by date
    List {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Rewrite the feed from the store without scraping
    Generate,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = FeedConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(db) = cli.db {
        config.database_path = db;
    }
    if let Some(feed) = cli.feed {
        config.feed_path = feed;
    }

    let command = cli.command.unwrap_or(Commands::Sync { no_scrape: false });
    let manual = match &command {
        Commands::Add { fields } => collect_manual(fields)?,
        _ => Vec::new(),
    };

    let store = FixtureStore::open(&config.database_path)
        .await
        .with_context(|| format!("opening {}", config.database_path.display()))?;
    let outcome = dispatch(command, config, manual, &store).await;
    store.close().await;
    outcome
}

async fn dispatch(command: Commands, config: FeedConfig, manual: Vec<FixtureDraft>, store: &FixtureStore) -> Result<()> {
    debug!(?command, db = %config.database_path.display(), feed = %config.feed_path.display(), "dispatching");
    let pipeline = SyncPipeline::new(config)?;

    match command {
        Commands::Sync { no_scrape } => {
            let summary = pipeline
                .run_once(
                    store,
                    RunOptions {
                        scrape: !no_scrape,
                        manual,
                    },
                )
                .await
                .context("sync run failed")?;
            print_run(&summary);
        }
        Commands::Add { .. } => {
            if manual.is_empty() {
                println!("no fixtures entered");
                return Ok(());
            }
            let summary = pipeline
                .run_once(store, RunOptions { scrape: false, manual })
                .await
                .context("adding fixtures failed")?;
            print_run(&summary);
        }
        Commands::List { limit } => {
            let fixtures = store.all_sorted().await.context("reading fixture store")?;
            if fixtures.is_empty() {
                println!("no fixtures stored");
            }
            for stored in fixtures.iter().take(limit.unwrap_or(usize::MAX)) {
                println!("{stored}");
            }
        }
        Commands::Generate => {
            let (events, feed) = pipeline.write_feed(store).await.context("generating feed")?;
            println!(
                "feed {}: events={} bytes={} unchanged={}",
                feed.path.display(),
                events,
                feed.byte_size,
                feed.unchanged
            );
        }
    }

    Ok(())
}

fn collect_manual(fields: &[String]) -> Result<Vec<FixtureDraft>> {
    if fields.is_empty() {
        let stdin = std::io::stdin();
        let stdout = std::io::stdout();
        return prompt_drafts(&mut stdin.lock(), &mut stdout.lock()).context("reading fixtures from stdin");
    }
    Ok(vec![draft_from_fields(fields)?])
}

fn print_run(summary: &SyncRunSummary) {
    let IngestReport {
        inserted,
        updated,
        skipped,
        rejected,
    } = &summary.ingest;
    println!(
        "sync complete: run_id={} scraped={} manual={} inserted={} updated={} skipped={} rejected={} events={} feed={}{}",
        summary.run_id,
        summary.scraped_drafts,
        summary.manual_drafts,
        inserted,
        updated,
        skipped,
        rejected.len(),
        summary.events,
        summary.feed.path.display(),
        if summary.feed.unchanged { " (unchanged)" } else { "" }
    );
    for record in rejected {
        println!("  rejected #{} [{}] {}: {}", record.index, record.source_id, record.summary, record.error);
    }
}
