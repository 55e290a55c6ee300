use std::path::PathBuf;

use fixcal_adapters::{adapter_for_source, SourceConfig, SourceKind};
use fixcal_core::FixtureDraft;
use fixcal_storage::{HttpClientConfig, HttpFetcher};

fn sample_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../fixtures/league-table/sample")
        .canonicalize()
        .expect("sample fixture dir")
}

#[tokio::test]
async fn golden_json_snapshot_test_league_table() {
    let dir = sample_dir();
    let adapter = adapter_for_source(&SourceConfig {
        kind: SourceKind::LeagueTable,
        url: format!("file://{}", dir.join("page.html").display()),
        club: Some("SG Wasserball Essen".to_string()),
    });
    let http = HttpFetcher::new(HttpClientConfig::default()).expect("fetcher");

    let page = adapter.fetch_listing(&http).await.expect("fetch sample page");
    let drafts = adapter.parse_listing(&page).expect("parse sample page");

    let snapshot = std::fs::read_to_string(dir.join("snapshot.json")).expect("read snapshot");
    let expected: Vec<FixtureDraft> = serde_json::from_str(&snapshot).expect("parse snapshot");
    assert_eq!(drafts, expected);
}

#[tokio::test]
async fn missing_page_is_a_fetch_error() {
    let adapter = adapter_for_source(&SourceConfig {
        kind: SourceKind::LeagueTable,
        url: "file:///definitely/not/here.html".to_string(),
        club: None,
    });
    let http = HttpFetcher::new(HttpClientConfig::default()).expect("fetcher");
    let err = adapter.fetch_listing(&http).await.unwrap_err();
    assert!(matches!(err, fixcal_adapters::AdapterError::Fetch(_)));
}
