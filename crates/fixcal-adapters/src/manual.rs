//! Operator-entered fixtures, from positional arguments or an interactive prompt.

use std::io::{self, BufRead, Write};

use fixcal_core::FixtureDraft;

use crate::AdapterError;

pub const MANUAL_SOURCE_ID: &str = "manual";

/// Build a draft from `date time home away [venue] [result]`.
pub fn draft_from_fields<S: AsRef<str>>(fields: &[S]) -> Result<FixtureDraft, AdapterError> {
    if !(4..=6).contains(&fields.len()) {
        return Err(AdapterError::Message(format!(
            "expected DATE TIME HOME AWAY [VENUE] [RESULT], got {} field(s)",
            fields.len()
        )));
    }
    let field = |i: usize| {
        fields
            .get(i)
            .map(|s| s.as_ref().trim().to_string())
            .unwrap_or_default()
    };
    Ok(FixtureDraft {
        source_id: MANUAL_SOURCE_ID.to_string(),
        date: field(0),
        time: field(1),
        home_team: field(2),
        away_team: field(3),
        venue: dash_as_empty(field(4)),
        result: dash_as_empty(field(5)),
    })
}

/// A lone `-` stands for "nothing" so later fields can still be given.
fn dash_as_empty(value: String) -> String {
    if value == "-" {
        String::new()
    } else {
        value
    }
}

/// Ask for fixtures until an empty date or a negative answer ends input.
pub fn prompt_drafts<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> io::Result<Vec<FixtureDraft>> {
    writeln!(output, "=== Manual fixture entry ===")?;
    writeln!(output, "Leave the date empty to finish.")?;

    let mut drafts = Vec::new();
    loop {
        writeln!(output, "\n--- Fixture {} ---", drafts.len() + 1)?;

        let date = ask(input, output, "Date (DD.MM.YYYY or DD.MM): ")?;
        if date.is_empty() {
            break;
        }
        let time = ask(input, output, "Time (HH:MM) [optional]: ")?;
        let home_team = ask(input, output, "Home team: ")?;
        if home_team.is_empty() {
            writeln!(output, "Home team is required!")?;
            continue;
        }
        let away_team = ask(input, output, "Away team: ")?;
        if away_team.is_empty() {
            writeln!(output, "Away team is required!")?;
            continue;
        }
        let venue = ask(input, output, "Venue [optional]: ")?;
        let result = ask(input, output, "Result [optional]: ")?;

        drafts.push(FixtureDraft {
            source_id: MANUAL_SOURCE_ID.to_string(),
            date,
            time,
            home_team,
            away_team,
            venue: dash_as_empty(venue),
            result: dash_as_empty(result),
        });

        let more = ask(input, output, "\nAdd another fixture? (y/n): ")?.to_lowercase();
        if !matches!(more.as_str(), "j" | "ja" | "y" | "yes") {
            break;
        }
    }
    Ok(drafts)
}

fn ask<R: BufRead, W: Write>(input: &mut R, output: &mut W, prompt: &str) -> io::Result<String> {
    write!(output, "{prompt}")?;
    output.flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim().to_string())
}
