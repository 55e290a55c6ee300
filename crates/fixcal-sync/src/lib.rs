//! Fixture reconciliation, calendar feed generation and run orchestration.

use std::time::Duration;

use chrono::{DateTime, Utc};
use fixcal_adapters::{adapter_for_source, AdapterError, FixtureSource};
use fixcal_core::{Fixture, FixtureDraft, ParseError, ParseOptions, StoredFixture};
use fixcal_storage::{
    FeedFile, FeedWrite, FeedWriteError, FetchError, FixtureStore, HttpClientConfig, HttpFetcher, StoreError,
};
use thiserror::Error;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

pub mod config;
pub mod ics;

pub use config::FeedConfig;
pub use ics::{event_uid, render_calendar, CalendarDocument, CalendarSettings};

pub const CRATE_NAME: &str = "fixcal-sync";

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("fixture source `{source_id}` unavailable")]
    SourceUnavailable {
        source_id: String,
        #[source]
        source: AdapterError,
    },
    #[error("no fixture source configured (set `source.url` or FIXCAL_SOURCE_URL)")]
    NoSourceConfigured,
    #[error("building http client")]
    HttpClient(#[source] FetchError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    FeedWrite(#[from] FeedWriteError),
}

/// Outcome of comparing an incoming fixture with what the store holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Insert,
    MergeResult,
    Skip,
}

/// Existing rows win, except that a late result fills an empty one.
pub fn reconcile(existing: Option<&StoredFixture>, incoming: &Fixture) -> Decision {
    match existing {
        None => Decision::Insert,
        Some(stored) if !stored.fixture.has_result() && incoming.has_result() => Decision::MergeResult,
        Some(_) => Decision::Skip,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRecord {
    pub index: usize,
    pub source_id: String,
    pub summary: String,
    pub error: ParseError,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    pub rejected: Vec<RejectedRecord>,
}

impl IngestReport {
    pub fn changed(&self) -> bool {
        self.inserted + self.updated > 0
    }
}

pub async fn ingest(
    store: &FixtureStore,
    drafts: &[FixtureDraft],
    options: &ParseOptions,
) -> Result<IngestReport, StoreError> {
    ingest_at(store, drafts, options, Utc::now()).await
}

/// Validate and upsert a batch in one transaction, committed before return.
/// Bad records are collected, never fatal; store failures roll everything back.
pub async fn ingest_at(
    store: &FixtureStore,
    drafts: &[FixtureDraft],
    options: &ParseOptions,
    at: DateTime<Utc>,
) -> Result<IngestReport, StoreError> {
    let mut report = IngestReport::default();
    let mut tx = store.begin().await?;

    for (index, draft) in drafts.iter().enumerate() {
        let fixture = match Fixture::from_draft(draft, options) {
            Ok(fixture) => fixture,
            Err(error) => {
                debug!(index, source_id = %draft.source_id, %error, "rejecting fixture record");
                report.rejected.push(RejectedRecord {
                    index,
                    source_id: draft.source_id.clone(),
                    summary: draft.summary(),
                    error,
                });
                continue;
            }
        };

        let existing = tx.get(fixture.identity_key()).await?;
        match reconcile(existing.as_ref(), &fixture) {
            Decision::Insert => {
                tx.insert(&fixture, at).await?;
                report.inserted += 1;
            }
            Decision::MergeResult => {
                tx.merge_result(fixture.identity_key(), fixture.result(), at)
                    .await?;
                report.updated += 1;
            }
            Decision::Skip => report.skipped += 1,
        }
    }

    tx.commit().await?;
    info!(
        inserted = report.inserted,
        updated = report.updated,
        skipped = report.skipped,
        rejected = report.rejected.len(),
        "ingest committed"
    );
    Ok(report)
}

/// Render the whole store. A read failure yields an error, never a partial feed.
pub async fn generate_feed(
    store: &FixtureStore,
    settings: &CalendarSettings,
) -> Result<CalendarDocument, StoreError> {
    let fixtures = store.all_sorted().await?;
    Ok(render_calendar(&fixtures, settings))
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub scrape: bool,
    pub manual: Vec<FixtureDraft>,
}

#[derive(Debug, Clone)]
pub struct SyncRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub scraped_drafts: usize,
    pub manual_drafts: usize,
    pub ingest: IngestReport,
    pub events: usize,
    pub feed: FeedWrite,
}

pub struct SyncPipeline {
    config: FeedConfig,
    http: HttpFetcher,
    source: Option<Box<dyn FixtureSource>>,
}

impl SyncPipeline {
    pub fn new(config: FeedConfig) -> Result<Self, SyncError> {
        let http = HttpFetcher::new(HttpClientConfig {
            timeout: Duration::from_secs(config.http_timeout_secs),
            user_agent: Some(config.user_agent.clone()),
        })
        .map_err(SyncError::HttpClient)?;
        let source = config.source.as_ref().map(adapter_for_source);
        Ok(Self {
            config,
            http,
            source,
        })
    }

    pub fn with_source(mut self, source: Box<dyn FixtureSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    /// Fetch and parse the configured source without touching the store.
    pub async fn scrape(&self) -> Result<Vec<FixtureDraft>, SyncError> {
        let source = self.source.as_ref().ok_or(SyncError::NoSourceConfigured)?;
        let unavailable = |source_err: AdapterError| SyncError::SourceUnavailable {
            source_id: source.source_id().to_string(),
            source: source_err,
        };
        let page = source.fetch_listing(&self.http).await.map_err(unavailable)?;
        let drafts = source.parse_listing(&page).map_err(unavailable)?;
        info!(source_id = source.source_id(), drafts = drafts.len(), "source scraped");
        Ok(drafts)
    }

    /// One full cycle: gather drafts, ingest, regenerate and replace the feed.
    pub async fn run_once(&self, store: &FixtureStore, options: RunOptions) -> Result<SyncRunSummary, SyncError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("sync_run", %run_id);
        async move {
            let started_at = Utc::now();

            let scraped = if options.scrape {
                self.scrape().await?
            } else {
                Vec::new()
            };
            let scraped_drafts = scraped.len();
            let manual_drafts = options.manual.len();
            let mut drafts = scraped;
            drafts.extend(options.manual);

            let ingest = ingest(store, &drafts, &self.config.parse_options()).await?;
            for rejected in &ingest.rejected {
                warn!(
                    index = rejected.index,
                    source_id = %rejected.source_id,
                    record = %rejected.summary,
                    error = %rejected.error,
                    "fixture record rejected"
                );
            }

            let (events, feed) = self.write_feed(store).await?;

            Ok(SyncRunSummary {
                run_id,
                started_at,
                finished_at: Utc::now(),
                scraped_drafts,
                manual_drafts,
                ingest,
                events,
                feed,
            })
        }
        .instrument(span)
        .await
    }

    /// Regenerate the feed from the store alone.
    pub async fn write_feed(&self, store: &FixtureStore) -> Result<(usize, FeedWrite), SyncError> {
        let document = generate_feed(store, &self.config.calendar).await?;
        let feed = FeedFile::new(&self.config.feed_path)
            .write_atomic(document.as_bytes())
            .await?;
        info!(
            path = %feed.path.display(),
            events = document.event_count(),
            unchanged = feed.unchanged,
            "feed written"
        );
        Ok((document.event_count(), feed))
    }
}
