//! Fixture source adapters: league table scraping and manual entry.

use async_trait::async_trait;
use fixcal_core::{normalize_result, FixtureDraft};
use fixcal_storage::{FetchError, HttpFetcher};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub mod manual;

pub use manual::{draft_from_fields, prompt_drafts, MANUAL_SOURCE_ID};

pub const CRATE_NAME: &str = "fixcal-adapters";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    #[default]
    LeagueTable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub kind: SourceKind,
    pub url: String,
    /// Keep only games where either side contains this name.
    #[serde(default)]
    pub club: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub url: String,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

#[async_trait]
pub trait FixtureSource: Send + Sync {
    fn source_id(&self) -> &str;

    async fn fetch_listing(&self, http: &HttpFetcher) -> Result<FetchedPage, AdapterError>;

    fn parse_listing(&self, page: &FetchedPage) -> Result<Vec<FixtureDraft>, AdapterError>;
}

/// Column positions of a league schedule row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeagueTableLayout {
    pub min_cells: usize,
    pub game_number: usize,
    pub date_time: usize,
    pub home_team: usize,
    pub away_team: usize,
    pub venue: usize,
    pub result: usize,
}

impl Default for LeagueTableLayout {
    fn default() -> Self {
        Self {
            min_cells: 8,
            game_number: 0,
            date_time: 1,
            home_team: 3,
            away_team: 5,
            venue: 6,
            result: 7,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LeagueTableAdapter {
    url: String,
    club: Option<String>,
    layout: LeagueTableLayout,
    date_re: Regex,
    time_re: Regex,
    team_prefix_re: Regex,
}

impl LeagueTableAdapter {
    pub const SOURCE_ID: &'static str = "league-table";

    pub fn new(url: impl Into<String>, club: Option<String>) -> Self {
        Self {
            url: url.into(),
            club: club.filter(|c| !c.trim().is_empty()),
            layout: LeagueTableLayout::default(),
            date_re: Regex::new(r"\d{1,2}\.\d{1,2}\.\d{2,4}").expect("static date regex"),
            time_re: Regex::new(r"\d{1,2}:\d{2}").expect("static time regex"),
            team_prefix_re: Regex::new(r"^\d+\W*").expect("static team prefix regex"),
        }
    }

    pub fn with_layout(mut self, layout: LeagueTableLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Drop rank numbers and stray symbols in front of a team name.
    fn clean_team_name(&self, raw: &str) -> String {
        let cleaned = self.team_prefix_re.replace(raw.trim(), "");
        let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
        if cleaned.chars().all(|c| c.is_ascii_digit()) {
            String::new()
        } else {
            cleaned
        }
    }

    fn involves_club(&self, home: &str, away: &str) -> bool {
        match &self.club {
            Some(club) => {
                let club = club.to_lowercase();
                home.to_lowercase().contains(&club) || away.to_lowercase().contains(&club)
            }
            None => true,
        }
    }
}

#[async_trait]
impl FixtureSource for LeagueTableAdapter {
    fn source_id(&self) -> &str {
        Self::SOURCE_ID
    }

    async fn fetch_listing(&self, http: &HttpFetcher) -> Result<FetchedPage, AdapterError> {
        let resp = http.fetch_bytes(&self.url).await?;
        Ok(FetchedPage {
            url: resp.final_url,
            body: String::from_utf8_lossy(&resp.body).into_owned(),
        })
    }

    fn parse_listing(&self, page: &FetchedPage) -> Result<Vec<FixtureDraft>, AdapterError> {
        let document = Html::parse_document(&page.body);
        let row_sel = selector("table tr")?;
        let cell_sel = selector("td, th")?;
        let link_sel = selector("a")?;
        let layout = self.layout;

        let mut drafts = Vec::new();
        for row in document.select(&row_sel) {
            let cells: Vec<ElementRef> = row.select(&cell_sel).collect();
            if cells.len() < layout.min_cells {
                continue;
            }

            let game_number = element_text(cells[layout.game_number]);
            if game_number.is_empty() || !game_number.chars().all(|c| c.is_ascii_digit()) {
                continue;
            }

            let home_team = self.clean_team_name(&element_text(cells[layout.home_team]));
            let away_team = self.clean_team_name(&element_text(cells[layout.away_team]));
            if !self.involves_club(&home_team, &away_team) {
                continue;
            }

            let when = element_text(cells[layout.date_time]);
            let Some(date) = self.date_re.find(&when).map(|m| m.as_str().to_string()) else {
                debug!(game = %game_number, "skipping unscheduled game");
                continue;
            };
            let time = self
                .time_re
                .find(&when)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();

            let result_cell = cells[layout.result];
            let result = result_cell
                .select(&link_sel)
                .next()
                .map(element_text)
                .unwrap_or_else(|| element_text(result_cell));

            drafts.push(FixtureDraft {
                source_id: Self::SOURCE_ID.to_string(),
                date,
                time,
                home_team,
                away_team,
                venue: element_text(cells[layout.venue]),
                result: normalize_result(&result),
            });
        }

        debug!(url = %page.url, drafts = drafts.len(), "parsed league table");
        Ok(drafts)
    }
}

pub fn adapter_for_source(config: &SourceConfig) -> Box<dyn FixtureSource> {
    match config.kind {
        SourceKind::LeagueTable => Box::new(LeagueTableAdapter::new(
            config.url.clone(),
            config.club.clone(),
        )),
    }
}

fn selector(css: &str) -> Result<Selector, AdapterError> {
    Selector::parse(css).map_err(|e| AdapterError::Message(e.to_string()))
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(rows: &str) -> FetchedPage {
        FetchedPage {
            url: "file:///league.html".into(),
            body: format!("<html><body><table>{rows}</table></body></html>"),
        }
    }

    fn row(cells: &[&str]) -> String {
        let tds: String = cells.iter().map(|c| format!("<td>{c}</td>")).collect();
        format!("<tr>{tds}</tr>")
    }

    #[test]
    fn parses_game_rows_and_ignores_headers() {
        let html = format!(
            "<tr><th>Nr.</th><th>Datum</th><th></th><th>Heim</th><th></th><th>Gast</th><th>Ort</th><th>Erg.</th></tr>{}",
            row(&["12", "20.12.25, 15:00 Uhr", "", "SGW Essen", "-", "Weihnachtsfeier", "Weihnachtsmarkt", "3:2"])
        );
        let adapter = LeagueTableAdapter::new("file:///league.html", None);
        let drafts = adapter.parse_listing(&page(&html)).unwrap();

        assert_eq!(drafts.len(), 1);
        let d = &drafts[0];
        assert_eq!(d.source_id, "league-table");
        assert_eq!(d.date, "20.12.25");
        assert_eq!(d.time, "15:00");
        assert_eq!(d.home_team, "SGW Essen");
        assert_eq!(d.away_team, "Weihnachtsfeier");
        assert_eq!(d.venue, "Weihnachtsmarkt");
        assert_eq!(d.result, "3:2");
    }

    #[test]
    fn club_filter_is_case_insensitive() {
        let html = format!(
            "{}{}",
            row(&["1", "01.02.2026", "", "SG Wasserball Essen", "-", "ASC Duisburg", "Essen", ""]),
            row(&["2", "02.02.2026", "", "ASC Duisburg", "-", "SV Lünen", "Duisburg", ""])
        );
        let adapter = LeagueTableAdapter::new("x", Some("sg wasserball essen".into()));
        let drafts = adapter.parse_listing(&page(&html)).unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].away_team, "ASC Duisburg");
    }

    #[test]
    fn short_rows_and_non_numeric_game_numbers_are_skipped() {
        let html = format!(
            "{}{}",
            row(&["1", "01.02.2026", "", "A", "-", "B"]),
            row(&["Spielfrei", "01.02.2026", "", "A", "-", "B", "X", ""])
        );
        let adapter = LeagueTableAdapter::new("x", None);
        assert!(adapter.parse_listing(&page(&html)).unwrap().is_empty());
    }

    #[test]
    fn custom_layout_moves_columns() {
        let html = row(&["5", "Halle 2", "A", "B", "07.03.2026 10:00", "1:1"]);
        let adapter = LeagueTableAdapter::new("x", None).with_layout(LeagueTableLayout {
            min_cells: 6,
            game_number: 0,
            date_time: 4,
            home_team: 2,
            away_team: 3,
            venue: 1,
            result: 5,
        });
        let drafts = adapter.parse_listing(&page(&html)).unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].venue, "Halle 2");
        assert_eq!(drafts[0].time, "10:00");
        assert_eq!(drafts[0].result, "1:1");
    }

    #[test]
    fn team_names_lose_rank_prefixes() {
        let adapter = LeagueTableAdapter::new("x", None);
        assert_eq!(adapter.clean_team_name("3. SV  Lünen 08"), "SV Lünen 08");
        assert_eq!(adapter.clean_team_name("SV Lünen 08 II"), "SV Lünen 08 II");
        assert_eq!(adapter.clean_team_name("42"), "");
    }

    #[test]
    fn placeholder_scores_are_dropped() {
        let html = row(&["7", "01.02.2026 12:00", "", "A", "-", "B", "X", "<a href=\"#\">-:-</a>"]);
        let drafts = LeagueTableAdapter::new("x", None).parse_listing(&page(&html)).unwrap();
        assert_eq!(drafts[0].result, "");
    }
}
