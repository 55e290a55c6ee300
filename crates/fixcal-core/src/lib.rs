//! Core fixture model, validation and identity keys for fixcal.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

pub const CRATE_NAME: &str = "fixcal-core";

/// Untyped handoff contract from source adapters into the ingest boundary.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FixtureDraft {
    pub source_id: String,
    pub date: String,
    pub time: String,
    pub home_team: String,
    pub away_team: String,
    pub venue: String,
    pub result: String,
}

impl FixtureDraft {
    /// Short human-readable label used in rejection reports.
    pub fn summary(&self) -> String {
        let when = format!("{} {}", self.date.trim(), self.time.trim());
        format!(
            "{} | {} vs {}",
            when.trim(),
            self.home_team.trim(),
            self.away_team.trim()
        )
    }
}

/// Context needed to turn a draft into a [`Fixture`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Year used for dates written without one (`20.12`).
    pub default_year: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("invalid date `{input}`")]
    InvalidDate { input: String },
    #[error("invalid time `{input}`")]
    InvalidTime { input: String },
}

/// Deterministic natural identity of a fixture: date, kickoff and both teams.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct IdentityKey(String);

impl IdentityKey {
    pub fn derive(date: NaiveDate, time: Option<NaiveTime>, home_team: &str, away_team: &str) -> Self {
        let time = time.map(|t| t.format("%H:%M").to_string()).unwrap_or_default();
        let canonical = format!(
            "{}|{}|{}|{}",
            date.format("%Y-%m-%d"),
            time,
            normalize_team_name(home_team).to_lowercase(),
            normalize_team_name(away_team).to_lowercase()
        );
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name-based UUID for calendar event identifiers.
    pub fn event_uuid(&self) -> Uuid {
        Uuid::new_v5(&Uuid::NAMESPACE_URL, self.0.as_bytes())
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validated fixture. The identity key is always consistent with the fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fixture {
    identity_key: IdentityKey,
    date: NaiveDate,
    time: Option<NaiveTime>,
    home_team: String,
    away_team: String,
    venue: String,
    result: String,
}

impl Fixture {
    pub fn new(
        date: NaiveDate,
        time: Option<NaiveTime>,
        home_team: &str,
        away_team: &str,
        venue: &str,
        result: &str,
    ) -> Result<Self, ParseError> {
        let home_team = normalize_team_name(home_team);
        let away_team = normalize_team_name(away_team);
        if home_team.is_empty() {
            return Err(ParseError::MissingField("home_team"));
        }
        if away_team.is_empty() {
            return Err(ParseError::MissingField("away_team"));
        }
        let time = time.and_then(|t| NaiveTime::from_hms_opt(t.hour(), t.minute(), 0));
        Ok(Self {
            identity_key: IdentityKey::derive(date, time, &home_team, &away_team),
            date,
            time,
            home_team,
            away_team,
            venue: venue.trim().to_string(),
            result: normalize_result(result),
        })
    }

    pub fn from_draft(draft: &FixtureDraft, options: &ParseOptions) -> Result<Self, ParseError> {
        let date = parse_fixture_date(&draft.date, options)?;
        let time = parse_kickoff(&draft.time)?;
        Self::new(
            date,
            time,
            &draft.home_team,
            &draft.away_team,
            &draft.venue,
            &draft.result,
        )
    }

    pub fn identity_key(&self) -> &IdentityKey {
        &self.identity_key
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn time(&self) -> Option<NaiveTime> {
        self.time
    }

    pub fn home_team(&self) -> &str {
        &self.home_team
    }

    pub fn away_team(&self) -> &str {
        &self.away_team
    }

    pub fn venue(&self) -> &str {
        &self.venue
    }

    pub fn result(&self) -> &str {
        &self.result
    }

    pub fn has_result(&self) -> bool {
        !self.result.is_empty()
    }

    /// Result is not part of the identity, so replacing it keeps the key.
    pub fn with_result(mut self, result: &str) -> Self {
        self.result = normalize_result(result);
        self
    }

    /// Feed ordering: date, then kickoff (unknown first), then identity key.
    pub fn sort_key(&self) -> (NaiveDate, Option<NaiveTime>, &str) {
        (self.date, self.time, self.identity_key.as_str())
    }
}

impl fmt::Display for Fixture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.date.format("%d.%m.%Y"))?;
        match self.time {
            Some(time) => write!(f, " {}", time.format("%H:%M"))?,
            None => f.write_str("      ")?,
        }
        write!(f, " | {} vs {}", self.home_team, self.away_team)?;
        if !self.venue.is_empty() {
            write!(f, " | {}", self.venue)?;
        }
        if !self.result.is_empty() {
            write!(f, " | {}", self.result)?;
        }
        Ok(())
    }
}

/// Persisted fixture with store bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredFixture {
    pub fixture: Fixture,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub revision: u32,
}

impl fmt::Display for StoredFixture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | rev {}, changed {}",
            self.fixture,
            self.revision,
            self.updated_at.format("%Y-%m-%d %H:%M UTC")
        )
    }
}

/// Placeholders such as `-:-` or `-` carry no score and count as not played.
pub fn normalize_result(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.chars().any(|c| c.is_ascii_digit()) {
        trimmed.to_string()
    } else {
        String::new()
    }
}

/// Trim and collapse inner whitespace; case is preserved.
pub fn normalize_team_name(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse `DD.MM.YYYY`, `DD.MM.YY`, `DD.MM` or `YYYY-MM-DD`.
pub fn parse_fixture_date(input: &str, options: &ParseOptions) -> Result<NaiveDate, ParseError> {
    let raw = input.trim();
    if raw.is_empty() {
        return Err(ParseError::MissingField("date"));
    }
    let invalid = || ParseError::InvalidDate {
        input: raw.to_string(),
    };

    if raw.contains('-') {
        return NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| invalid());
    }

    let parts: Vec<&str> = raw.trim_end_matches('.').split('.').map(str::trim).collect();
    let (day, month, year) = match parts.as_slice() {
        [day, month] => (*day, *month, None),
        [day, month, year] => (*day, *month, Some(*year)),
        _ => return Err(invalid()),
    };

    let day = digits(day, 2).ok_or_else(invalid)?;
    let month = digits(month, 2).ok_or_else(invalid)?;
    let year = match year {
        None => options.default_year,
        Some(y) if y.len() == 2 => expand_two_digit_year(digits(y, 2).ok_or_else(invalid)?),
        Some(y) if y.len() == 4 => digits(y, 4).ok_or_else(invalid)? as i32,
        Some(_) => return Err(invalid()),
    };

    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid)
}

/// Parse a kickoff time; empty (or `-`) means unknown.
pub fn parse_kickoff(input: &str) -> Result<Option<NaiveTime>, ParseError> {
    let lowered = input.trim().to_ascii_lowercase();
    let trimmed = lowered
        .strip_suffix("uhr")
        .or_else(|| lowered.strip_suffix('h'))
        .unwrap_or(&lowered)
        .trim();
    if trimmed.is_empty() || trimmed == "-" {
        return Ok(None);
    }
    NaiveTime::parse_from_str(trimmed, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
        .map(Some)
        .map_err(|_| ParseError::InvalidTime {
            input: input.trim().to_string(),
        })
}

fn digits(input: &str, max_len: usize) -> Option<u32> {
    if input.is_empty() || input.len() > max_len || !input.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    input.parse().ok()
}

/// `00-49` map to the 2000s, `50-99` to the 1900s.
fn expand_two_digit_year(year: u32) -> i32 {
    if year < 50 {
        2000 + year as i32
    } else {
        1900 + year as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> ParseOptions {
        ParseOptions { default_year: 2025 }
    }

    fn draft(date: &str, time: &str, home: &str, away: &str) -> FixtureDraft {
        FixtureDraft {
            source_id: "manual".into(),
            date: date.into(),
            time: time.into(),
            home_team: home.into(),
            away_team: away.into(),
            venue: "Weihnachtsmarkt".into(),
            result: String::new(),
        }
    }

    #[test]
    fn parses_supported_date_shapes() {
        let expected = NaiveDate::from_ymd_opt(2025, 12, 20).unwrap();
        assert_eq!(parse_fixture_date("20.12.2025", &opts()).unwrap(), expected);
        assert_eq!(parse_fixture_date("20.12.25", &opts()).unwrap(), expected);
        assert_eq!(parse_fixture_date("20.12.", &opts()).unwrap(), expected);
        assert_eq!(parse_fixture_date("20.12", &opts()).unwrap(), expected);
        assert_eq!(parse_fixture_date("2025-12-20", &opts()).unwrap(), expected);
        assert_eq!(
            parse_fixture_date("1.2.99", &opts()).unwrap(),
            NaiveDate::from_ymd_opt(1999, 2, 1).unwrap()
        );
    }

    #[test]
    fn rejects_impossible_and_malformed_dates() {
        assert_eq!(
            parse_fixture_date("31.02.2025", &opts()),
            Err(ParseError::InvalidDate {
                input: "31.02.2025".into()
            })
        );
        assert!(parse_fixture_date("tomorrow", &opts()).is_err());
        assert!(parse_fixture_date("20.12.202", &opts()).is_err());
        assert!(parse_fixture_date("2025-13-01", &opts()).is_err());
        assert_eq!(
            parse_fixture_date("  ", &opts()),
            Err(ParseError::MissingField("date"))
        );
    }

    #[test]
    fn kickoff_accepts_common_spellings() {
        let three = NaiveTime::from_hms_opt(15, 0, 0).unwrap();
        assert_eq!(parse_kickoff("15:00").unwrap(), Some(three));
        assert_eq!(parse_kickoff("15:00 Uhr").unwrap(), Some(three));
        assert_eq!(parse_kickoff("15:00:00").unwrap(), Some(three));
        assert_eq!(
            parse_kickoff("9:30").unwrap(),
            NaiveTime::from_hms_opt(9, 30, 0)
        );
        assert_eq!(parse_kickoff("").unwrap(), None);
        assert_eq!(parse_kickoff("-").unwrap(), None);
        assert!(matches!(
            parse_kickoff("25:00"),
            Err(ParseError::InvalidTime { .. })
        ));
    }

    #[test]
    fn identity_ignores_whitespace_case_and_result() {
        let a = Fixture::from_draft(&draft("20.12.2025", "15:00", "SGW Essen", "Weihnachtsfeier"), &opts()).unwrap();
        let b = Fixture::from_draft(
            &draft("2025-12-20", "15:00 Uhr", "  sgw   essen ", "WEIHNACHTSFEIER"),
            &opts(),
        )
        .unwrap()
        .with_result("3:2");
        assert_eq!(a.identity_key(), b.identity_key());
        assert_eq!(a.identity_key().event_uuid(), b.identity_key().event_uuid());
    }

    #[test]
    fn identity_changes_with_kickoff_or_teams() {
        let base = Fixture::from_draft(&draft("20.12.2025", "15:00", "A", "B"), &opts()).unwrap();
        let later = Fixture::from_draft(&draft("20.12.2025", "16:00", "A", "B"), &opts()).unwrap();
        let unknown = Fixture::from_draft(&draft("20.12.2025", "", "A", "B"), &opts()).unwrap();
        let swapped = Fixture::from_draft(&draft("20.12.2025", "15:00", "B", "A"), &opts()).unwrap();
        assert_ne!(base.identity_key(), later.identity_key());
        assert_ne!(base.identity_key(), unknown.identity_key());
        assert_ne!(base.identity_key(), swapped.identity_key());
        assert_eq!(base.identity_key().as_str().len(), 64);
    }

    #[test]
    fn missing_teams_are_rejected() {
        let err = Fixture::from_draft(&draft("20.12.2025", "", " ", "B"), &opts()).unwrap_err();
        assert_eq!(err, ParseError::MissingField("home_team"));
        let err = Fixture::from_draft(&draft("20.12.2025", "", "A", ""), &opts()).unwrap_err();
        assert_eq!(err, ParseError::MissingField("away_team"));
    }

    #[test]
    fn display_renders_list_line() {
        let fixture = Fixture::from_draft(&draft("20.12.2025", "15:00", "SGW Essen", "Weihnachtsfeier"), &opts())
            .unwrap()
            .with_result("3:2");
        assert_eq!(
            fixture.to_string(),
            "20.12.2025 15:00 | SGW Essen vs Weihnachtsfeier | Weihnachtsmarkt | 3:2"
        );
    }

    #[test]
    fn placeholder_results_count_as_unplayed() {
        let mut d = draft("20.12.2025", "15:00", "A", "B");
        d.result = "-:-".into();
        let fixture = Fixture::from_draft(&d, &opts()).unwrap();
        assert_eq!(fixture.result(), "");
        assert!(!fixture.has_result());
        assert!(!fixture.clone().with_result(" - ").has_result());
        assert_eq!(fixture.with_result(" 10:0 ").result(), "10:0");
        assert_eq!(normalize_result("n.a."), "");
    }

    #[test]
    fn stored_display_shows_revision_and_last_change() {
        let fixture = Fixture::from_draft(&draft("20.12.2025", "15:00", "SGW Essen", "Weihnachtsfeier"), &opts()).unwrap();
        let at = DateTime::parse_from_rfc3339("2025-12-01T09:30:00Z").unwrap().with_timezone(&Utc);
        let stored = StoredFixture {
            fixture,
            created_at: at,
            updated_at: at,
            revision: 2,
        };
        assert_eq!(
            stored.to_string(),
            "20.12.2025 15:00 | SGW Essen vs Weihnachtsfeier | Weihnachtsmarkt | rev 2, changed 2025-12-01 09:30 UTC"
        );
    }

    #[test]
    fn sort_key_puts_unknown_kickoff_first() {
        let timed = Fixture::from_draft(&draft("20.12.2025", "10:00", "A", "B"), &opts()).unwrap();
        let untimed = Fixture::from_draft(&draft("20.12.2025", "", "C", "D"), &opts()).unwrap();
        assert!(untimed.sort_key() < timed.sort_key());
    }
}
