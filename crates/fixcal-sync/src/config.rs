use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Datelike, Local};
use fixcal_adapters::{SourceConfig, SourceKind};
use fixcal_core::ParseOptions;
use serde::{Deserialize, Serialize};

use crate::ics::CalendarSettings;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub database_path: PathBuf,
    pub feed_path: PathBuf,
    pub source: Option<SourceConfig>,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    /// Year for dates written without one; the current local year when unset.
    pub default_year: Option<i32>,
    pub calendar: CalendarSettings,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("fixtures.db"),
            feed_path: PathBuf::from("fixtures.ics"),
            source: None,
            user_agent: format!("fixcal/{}", env!("CARGO_PKG_VERSION")),
            http_timeout_secs: 20,
            default_year: None,
            calendar: CalendarSettings::default(),
        }
    }
}

impl FeedConfig {
    pub const DEFAULT_FILE: &'static str = "fixcal.yaml";

    /// Defaults, then the YAML file (explicit path or `./fixcal.yaml`), then
    /// `FIXCAL_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let default_file = Path::new(Self::DEFAULT_FILE);
        let mut config = match path {
            Some(path) => Self::from_yaml_file(path)?,
            None if default_file.exists() => Self::from_yaml_file(default_file)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("FIXCAL_DB") {
            self.database_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("FIXCAL_FEED") {
            self.feed_path = PathBuf::from(v);
        }
        if let Some(url) = lookup("FIXCAL_SOURCE_URL") {
            match &mut self.source {
                Some(source) => source.url = url,
                None => {
                    self.source = Some(SourceConfig {
                        kind: SourceKind::default(),
                        url,
                        club: None,
                    })
                }
            }
        }
        if let Some(club) = lookup("FIXCAL_CLUB") {
            if let Some(source) = &mut self.source {
                source.club = Some(club);
            }
        }
        if let Some(v) = lookup("FIXCAL_USER_AGENT") {
            self.user_agent = v;
        }
        if let Some(v) = lookup("FIXCAL_HTTP_TIMEOUT_SECS") {
            self.http_timeout_secs = v
                .parse()
                .with_context(|| format!("FIXCAL_HTTP_TIMEOUT_SECS must be a number, got `{v}`"))?;
        }
        Ok(())
    }

    /// Fixed once per run so every record of a batch sees the same year.
    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            default_year: self.default_year.unwrap_or_else(|| Local::now().year()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn yaml_overrides_defaults_partially() {
        let config = FeedConfig::from_yaml_str(
            r#"
feed_path: public/sgw.ics
source:
  url: https://example.org/League.aspx?LeagueID=197
  club: SG Wasserball Essen
calendar:
  name: SGW Essen Wasserball
  event_duration_minutes: 90
"#,
        )
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("fixtures.db"));
        assert_eq!(config.feed_path, PathBuf::from("public/sgw.ics"));
        let source = config.source.unwrap();
        assert_eq!(source.kind, SourceKind::LeagueTable);
        assert_eq!(source.club.as_deref(), Some("SG Wasserball Essen"));
        assert_eq!(config.calendar.name, "SGW Essen Wasserball");
        assert_eq!(config.calendar.event_duration_minutes, 90);
        assert_eq!(config.calendar.timezone, "Europe/Berlin");
    }

    #[test]
    fn env_overrides_win_and_create_a_source() {
        let env: HashMap<&str, &str> = [
            ("FIXCAL_DB", "/var/lib/fixcal/db.sqlite"),
            ("FIXCAL_SOURCE_URL", "file:///tmp/league.html"),
            ("FIXCAL_CLUB", "SGW"),
            ("FIXCAL_HTTP_TIMEOUT_SECS", "5"),
        ]
        .into_iter()
        .collect();

        let mut config = FeedConfig::default();
        config
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/var/lib/fixcal/db.sqlite"));
        assert_eq!(config.http_timeout_secs, 5);
        let source = config.source.unwrap();
        assert_eq!(source.url, "file:///tmp/league.html");
        assert_eq!(source.club.as_deref(), Some("SGW"));
    }

    #[test]
    fn bad_timeout_is_reported() {
        let mut config = FeedConfig::default();
        let err = config
            .apply_env(|k| (k == "FIXCAL_HTTP_TIMEOUT_SECS").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("FIXCAL_HTTP_TIMEOUT_SECS"));
    }

    #[test]
    fn explicit_default_year_is_used() {
        let config = FeedConfig {
            default_year: Some(2031),
            ..FeedConfig::default()
        };
        assert_eq!(config.parse_options().default_year, 2031);
    }
}
