//! Weather-provider pollen CSV → [`PollenReading`].

use tracing::debug;

use crate::csv::{self, COMMA, cell};
use crate::error::ParseError;
use crate::record::{PollenLevel, PollenReading};

/// Parse `code,date,pollen` rows. The first row is a header.
pub fn parse_pollen_csv(text: &str) -> Result<Vec<PollenReading>, ParseError> {
    let rows = csv::parse_rows(text, COMMA);
    let Some((_header, data)) = csv::split_header(rows) else {
        return Err(ParseError::Empty);
    };
    if data.is_empty() {
        return Err(ParseError::Empty);
    }

    let mut skipped = 0usize;
    let readings: Vec<PollenReading> = data
        .iter()
        .filter_map(|row| {
            let city_code = cell(row, 0).trim();
            if row.len() < 3 || city_code.is_empty() {
                skipped += 1;
                return None;
            }
            let count = parse_count(cell(row, 2));
            Some(PollenReading {
                city_code: city_code.to_string(),
                observed_at: cell(row, 1).trim().to_string(),
                count,
                level: PollenLevel::from_hourly_count(count),
            })
        })
        .collect();

    if skipped > 0 {
        debug!(skipped, "short pollen rows ignored");
    }
    Ok(readings)
}

/// Hourly count; negative or unparsable values count as zero.
fn parse_count(raw: &str) -> u32 {
    raw.trim()
        .parse::<i64>()
        .ok()
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(0)
}
