//! Infection-surveillance workbook (CSV) → [`SurveillanceRecord`].
//!
//! The sheet stacks one section per disease. Each section has a heading
//! row naming the disease, a week header row (`01週`, `02週`, …), a type
//! header row that marks which columns are per-sentinel-site values
//! (`定点当たり` / `定当`), then one row per prefecture.

use std::collections::HashSet;

use tracing::debug;

use crate::codes::DISEASE;
use crate::csv::{self, COMMA, RawRow, cell};
use crate::error::ParseError;
use crate::record::{SurveillanceRecord, WeeklyValue};

/// Rows searched below a section heading for the week header.
const HEADER_SEARCH_ROWS: usize = 20;
/// Minimum rows for a workbook to hold any section at all.
const MIN_ROWS: usize = 5;
/// A heading may decorate the disease name by at most this many characters.
const HEADING_SLACK: usize = 4;

#[derive(Debug, Clone, Copy)]
struct Section {
    disease: &'static str,
    start: usize,
}

#[derive(Debug, Clone, Copy)]
struct WeekColumn {
    week: u32,
    col: usize,
}

/// Parse the workbook into one record per (disease, prefecture).
pub fn parse_surveillance_csv(text: &str) -> Result<Vec<SurveillanceRecord>, ParseError> {
    let rows: Vec<RawRow> = csv::parse_rows(text, COMMA)
        .into_iter()
        .map(|row| row.into_iter().map(|c| c.trim().to_string()).collect())
        .collect();
    if rows.len() < MIN_ROWS {
        return Err(ParseError::Empty);
    }

    let sections = find_sections(&rows);
    let mut records = Vec::new();
    for (i, section) in sections.iter().enumerate() {
        let end = sections.get(i + 1).map(|s| s.start).unwrap_or(rows.len());
        let extracted = extract_section(&rows[..end], *section);
        debug!(disease = section.disease, count = extracted.len(), "parsed surveillance section");
        records.extend(extracted);
    }
    Ok(records)
}

fn is_heading(first: &str, name: &str) -> bool {
    first == name
        || (first.contains(name) && first.chars().count() <= name.chars().count() + HEADING_SLACK)
}

/// Section start rows in sheet order. The first heading for a disease wins.
fn find_sections(rows: &[RawRow]) -> Vec<Section> {
    let mut seen = HashSet::new();
    let mut sections = Vec::new();
    for (idx, row) in rows.iter().enumerate() {
        let first = cell(row, 0);
        if first.is_empty() {
            continue;
        }
        let hit = DISEASE
            .entries()
            .iter()
            .find(|(_, name)| is_heading(first, name));
        if let Some((key, _)) = hit
            && seen.insert(*key)
        {
            sections.push(Section { disease: *key, start: idx });
        }
    }
    sections
}

/// Week numbers written as `NN週` in a cell, in order.
fn week_numbers(text: &str) -> Vec<u32> {
    let chars: Vec<char> = text.chars().collect();
    let mut weeks = Vec::new();
    for (i, c) in chars.iter().enumerate() {
        if *c != '週' {
            continue;
        }
        let digits: String = chars[..i]
            .iter()
            .rev()
            .take_while(|d| d.is_ascii_digit())
            .take(2)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        if let Ok(week) = digits.parse() {
            weeks.push(week);
        }
    }
    weeks
}

fn is_rate_column(kind: &str) -> bool {
    kind.contains("定当") || kind.contains("定点当たり")
}

fn extract_section(rows: &[RawRow], section: Section) -> Vec<SurveillanceRecord> {
    let search_end = rows.len().min(section.start + 1 + HEADER_SEARCH_ROWS);
    let week_header = (section.start + 1..search_end).find(|&i| {
        let joined = rows[i].join(",");
        week_numbers(&joined).len() > 1
    });
    let Some(week_row) = week_header else {
        debug!(disease = section.disease, "week header not found");
        return Vec::new();
    };
    let type_row = week_row + 1;
    if type_row >= rows.len() {
        return Vec::new();
    }

    let columns: Vec<WeekColumn> = rows[week_row]
        .iter()
        .enumerate()
        .filter_map(|(col, text)| {
            let week = *week_numbers(text).first()?;
            is_rate_column(cell(&rows[type_row], col)).then_some(WeekColumn { week, col })
        })
        .collect();
    if columns.is_empty() {
        debug!(disease = section.disease, "no per-site columns");
        return Vec::new();
    }

    let mut seen = HashSet::new();
    rows[type_row + 1..]
        .iter()
        .filter_map(|row| {
            let prefecture = cell(row, 0);
            if prefecture.is_empty() || !seen.insert(prefecture.to_string()) {
                return None;
            }
            let history = columns
                .iter()
                .map(|wc| WeeklyValue {
                    week: wc.week,
                    value: parse_rate(cell(row, wc.col)),
                })
                .collect();
            Some(SurveillanceRecord {
                disease: section.disease.to_string(),
                prefecture: prefecture.to_string(),
                history,
            })
        })
        .collect()
}

/// Numeric cell, or 0 when blank or not a number.
fn parse_rate(raw: &str) -> f64 {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHEET: &str = "
,,,,,,
2026年01週(12月29日～01月04日),2026年01月08日,,,
インフルエンザ,,,,
,総数,定点,01週,01週
,報告数,定点当たり,報告数,定点当たり
北海道,33217,10.35,33217,10.35
";

    #[test]
    fn single_week_section_from_real_layout() {
        let records = parse_surveillance_csv(SHEET).unwrap();
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.disease, "Influenza");
        assert_eq!(r.prefecture, "北海道");
        assert_eq!(r.history, vec![WeeklyValue { week: 1, value: 10.35 }]);
    }

    #[test]
    fn multiple_sections_and_prefectures() {
        let sheet = "\
title,,,,
インフルエンザ,,,,
,02週,02週,03週,03週
,報告数,定当,報告数,定当
北海道,10,1.5,20,2.5
青森県,5,-,6,0.8
ＲＳウイルス感染症,,,,
,02週,02週,03週,03週
,報告数,定当,報告数,定当
北海道,1,0.1,2,0.2
";
        let records = parse_surveillance_csv(sheet).unwrap();
        assert_eq!(records.len(), 3);

        assert_eq!(records[0].prefecture, "北海道");
        assert_eq!(
            records[0].history,
            vec![WeeklyValue { week: 2, value: 1.5 }, WeeklyValue { week: 3, value: 2.5 }]
        );
        assert_eq!(records[1].prefecture, "青森県");
        assert_eq!(records[1].history[0].value, 0.0);
        assert_eq!(records[1].latest().map(|w| w.value), Some(0.8));

        assert_eq!(records[2].disease, "RSV");
        assert_eq!(records[2].history[1], WeeklyValue { week: 3, value: 0.2 });
    }

    #[test]
    fn too_few_rows_is_empty_error() {
        assert_eq!(parse_surveillance_csv("a\nb\n"), Err(ParseError::Empty));
    }

    #[test]
    fn missing_week_header_yields_nothing() {
        let sheet = "x\nインフルエンザ\n,報告数\n北海道,1\n青森県,2\n";
        assert!(parse_surveillance_csv(sheet).unwrap().is_empty());
    }

    #[test]
    fn decorated_heading_matches() {
        assert!(is_heading("インフルエンザ", "インフルエンザ"));
        assert!(is_heading("インフルエンザ（定点）", "インフルエンザ"));
        assert!(!is_heading("インフルエンザ様疾患の集計値一覧", "インフルエンザ"));
    }

    #[test]
    fn week_numbers_take_last_two_digits() {
        assert_eq!(week_numbers("2026年01週"), vec![1]);
        assert_eq!(week_numbers("01週,12週"), vec![1, 12]);
        assert!(week_numbers("週").is_empty());
    }
}
