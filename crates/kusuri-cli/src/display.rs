//! Vertical card display for feed records.
//!
//! Each record renders as a titled card with labelled sections. Fields that
//! hold the no-data sentinel are left out, and a section whose fields are
//! all empty is skipped.

use std::fmt::Write;

use chrono::{DateTime, Local};
use kusuri_core::{
    IncidentReport, PollenReading, ShortageRecord, SurveillanceRecord, is_no_data,
};
use kusuri_feed::{FeedRecords, Loaded, Provenance};

const MAX_HISTORY_WEEKS: usize = 10;
const LABEL_WIDTH: usize = 16;

// ── Public API ──

/// All cards for `records`, separated by blank lines.
pub fn render_records(records: &FeedRecords) -> String {
    let mut out = String::new();
    match records {
        FeedRecords::Shortage(rows) => rows.iter().for_each(|r| shortage_card(&mut out, r)),
        FeedRecords::Incidents(rows) => rows.iter().for_each(|r| incident_card(&mut out, r)),
        FeedRecords::Surveillance(rows) => {
            rows.iter().for_each(|r| surveillance_card(&mut out, r))
        }
        FeedRecords::Pollen(rows) => rows.iter().for_each(|r| pollen_card(&mut out, r)),
    }
    out
}

/// One-line footer: how many records and where they came from. `total` is
/// the count before any display limit was applied.
pub fn render_provenance(loaded: &Loaded<FeedRecords>, total: usize) -> String {
    let source = match loaded.provenance {
        Provenance::Cache => "cache",
        Provenance::Network => "network",
    };
    let at = DateTime::from_timestamp_millis(loaded.fetched_at)
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "unknown time".to_string());
    format!(
        "{total} {} record(s), showing {}, from {source} (fetched {at})",
        loaded.data.key(),
        loaded.data.len(),
    )
}

// ── Cards ──

fn shortage_card(out: &mut String, r: &ShortageRecord) {
    let trend = r.trend.symbol();
    let _ = writeln!(out, "=== {} {trend} ===", r.product_name);
    section(
        out,
        "Product",
        &[
            ("ingredient", &r.ingredient_name),
            ("manufacturer", &r.manufacturer),
            ("category", &r.product_category),
            ("basic drug", &r.is_basic_drug),
            ("YJ code", &r.yj_code),
        ],
    );
    let updated = r
        .updated_on
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default();
    section(
        out,
        "Shipment",
        &[
            ("status", &r.shipment_status),
            ("volume", &r.shipment_volume_status),
            ("reason", &r.reason_for_limitation),
            ("prospect", &r.resolution_prospect),
            ("expected", &r.expected_date),
            ("updated", &updated),
            ("change", &r.changed_part),
        ],
    );
}

fn incident_card(out: &mut String, r: &IncidentReport) {
    let _ = writeln!(out, "=== {}年 {} ===", r.year, r.month);
    section(
        out,
        "Case",
        &[("summary", &r.summary), ("content", &r.content)],
    );
    if r.is_inquiry() {
        section(
            out,
            "Inquiry",
            &[
                ("doubts", &r.factor_doubts),
                ("estimated", &r.estimated_text),
                ("effort", &r.effort_text),
            ],
        );
    } else {
        section(
            out,
            "Cause",
            &[
                ("factor", &r.factor),
                ("factors", &r.factors),
                ("improvement", &r.improvement),
            ],
        );
    }
}

fn surveillance_card(out: &mut String, r: &SurveillanceRecord) {
    let _ = writeln!(out, "=== {} / {} ===", r.disease, r.prefecture);
    let skip = r.history.len().saturating_sub(MAX_HISTORY_WEEKS);
    let weeks: Vec<String> = r.history[skip..]
        .iter()
        .map(|w| format!("{:02}週 {:.2}", w.week, w.value))
        .collect();
    let latest = r
        .latest()
        .map(|w| format!("{:.2}", w.value))
        .unwrap_or_default();
    let history = weeks.join("\n");
    section(
        out,
        "Per sentinel site",
        &[("latest", &latest), ("history", &history)],
    );
}

fn pollen_card(out: &mut String, r: &PollenReading) {
    let _ = writeln!(out, "=== {} ===", r.city_code);
    let count = r.count.to_string();
    let level = format!("{:?}", r.level);
    section(
        out,
        "Pollen",
        &[
            ("observed", &r.observed_at),
            ("count", &count),
            ("level", &level),
        ],
    );
}

// ── Section rendering ──

fn section(out: &mut String, header: &str, fields: &[(&str, &String)]) {
    let present: Vec<_> = fields
        .iter()
        .filter(|(_, value)| !is_no_data(value.trim()))
        .collect();
    if present.is_empty() {
        return;
    }

    let _ = writeln!(out, "{header}");
    for (label, value) in present {
        let mut lines = value.lines();
        let first = lines.next().unwrap_or_default();
        let _ = writeln!(out, "  {label:<LABEL_WIDTH$} {first}");
        for line in lines {
            let _ = writeln!(out, "  {:<LABEL_WIDTH$} {line}", "");
        }
    }
    let _ = writeln!(out);
}
