//! iCalendar (RFC 5545) rendering of the stored fixture set.

use chrono::{DateTime, Days, NaiveDate, NaiveTime, TimeDelta, Utc};
use fixcal_core::{IdentityKey, StoredFixture};
use ical::generator::Emitter;
use ical::parser::ical::component::{IcalCalendar, IcalEvent};
use ical::property::Property;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarSettings {
    pub name: String,
    pub description: String,
    pub product_id: String,
    /// Zone the fixture wall-clock times belong to; emitted as `X-WR-TIMEZONE`.
    pub timezone: String,
    pub uid_domain: String,
    pub event_duration_minutes: u32,
}

impl Default for CalendarSettings {
    fn default() -> Self {
        Self {
            name: "Fixtures".to_string(),
            description: "Automatically generated fixture calendar".to_string(),
            product_id: "-//fixcal//Fixture Calendar//EN".to_string(),
            timezone: "Europe/Berlin".to_string(),
            uid_domain: "fixcal.local".to_string(),
            event_duration_minutes: 120,
        }
    }
}

/// Rendered feed plus the event identifiers it contains, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarDocument {
    text: String,
    event_uids: Vec<String>,
}

impl CalendarDocument {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.text.as_bytes()
    }

    pub fn event_uids(&self) -> &[String] {
        &self.event_uids
    }

    pub fn event_count(&self) -> usize {
        self.event_uids.len()
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

pub fn event_uid(key: &IdentityKey, uid_domain: &str) -> String {
    format!("{}@{}", key.event_uuid(), uid_domain)
}

/// Project fixtures into a calendar. Output depends only on the input rows,
/// never on the wall clock.
pub fn render_calendar(fixtures: &[StoredFixture], settings: &CalendarSettings) -> CalendarDocument {
    let mut ordered: Vec<&StoredFixture> = fixtures.iter().collect();
    ordered.sort_by(|a, b| a.fixture.sort_key().cmp(&b.fixture.sort_key()));

    let mut calendar = IcalCalendar::new();
    calendar.properties = vec![
        raw("VERSION", "2.0"),
        text("PRODID", &settings.product_id),
        raw("CALSCALE", "GREGORIAN"),
        raw("METHOD", "PUBLISH"),
        text("X-WR-CALNAME", &settings.name),
        text("X-WR-CALDESC", &settings.description),
        text("X-WR-TIMEZONE", &settings.timezone),
    ];

    let mut event_uids = Vec::with_capacity(ordered.len());
    for stored in ordered {
        let uid = event_uid(stored.fixture.identity_key(), &settings.uid_domain);
        calendar.events.push(fixture_event(stored, &uid, settings));
        event_uids.push(uid);
    }

    CalendarDocument {
        text: calendar.generate(),
        event_uids,
    }
}

fn fixture_event(stored: &StoredFixture, uid: &str, settings: &CalendarSettings) -> IcalEvent {
    let fixture = &stored.fixture;
    let stamp = utc_stamp(stored.updated_at);

    let mut event = IcalEvent::new();
    let props = &mut event.properties;
    props.push(text("UID", uid));
    props.push(raw("DTSTAMP", &stamp));
    match fixture.time() {
        Some(time) => {
            let (start, end) = timed_span(fixture.date(), time, settings.event_duration_minutes);
            props.push(raw("DTSTART", &start));
            props.push(raw("DTEND", &end));
        }
        None => {
            let next_day = fixture
                .date()
                .checked_add_days(Days::new(1))
                .unwrap_or(fixture.date());
            props.push(date_value("DTSTART", fixture.date()));
            props.push(date_value("DTEND", next_day));
        }
    }

    let mut summary = format!("{} vs {}", fixture.home_team(), fixture.away_team());
    if fixture.has_result() {
        summary.push_str(&format!(" ({})", fixture.result()));
    }
    props.push(text("SUMMARY", &summary));
    if !fixture.venue().is_empty() {
        props.push(text("LOCATION", fixture.venue()));
    }
    if fixture.has_result() {
        props.push(text("DESCRIPTION", &format!("Result: {}", fixture.result())));
    }
    props.push(raw("STATUS", "CONFIRMED"));
    props.push(raw("TRANSP", "OPAQUE"));
    props.push(raw("SEQUENCE", &stored.revision.to_string()));
    props.push(raw("LAST-MODIFIED", &stamp));
    event
}

fn timed_span(date: NaiveDate, time: NaiveTime, duration_minutes: u32) -> (String, String) {
    let start = date.and_time(time);
    let end = start
        .checked_add_signed(TimeDelta::minutes(i64::from(duration_minutes)))
        .unwrap_or(start);
    (
        start.format("%Y%m%dT%H%M%S").to_string(),
        end.format("%Y%m%dT%H%M%S").to_string(),
    )
}

fn utc_stamp(at: DateTime<Utc>) -> String {
    at.format("%Y%m%dT%H%M%SZ").to_string()
}

fn raw(name: &str, value: &str) -> Property {
    Property {
        name: name.to_string(),
        params: None,
        value: Some(value.to_string()),
    }
}

fn text(name: &str, value: &str) -> Property {
    raw(name, &escape_text(value))
}

fn date_value(name: &str, date: NaiveDate) -> Property {
    Property {
        name: name.to_string(),
        params: Some(vec![("VALUE".to_string(), vec!["DATE".to_string()])]),
        value: Some(date.format("%Y%m%d").to_string()),
    }
}

/// TEXT escaping; the emitter writes values verbatim.
fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            _ => out.push(ch),
        }
    }
    out
}
