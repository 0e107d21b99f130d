//! Drug-shortage spreadsheet export (CSV) → [`ShortageRecord`].
//!
//! The sheet is positional: column indices below are fixed by the
//! published layout, with a header row first.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Deserialize;
use tracing::debug;

use crate::codes::SHIPMENT_STATUS;
use crate::csv::{self, COMMA, cell};
use crate::error::{FieldFallback, ParseError};
use crate::record::{NO_DATA, ShipmentCategory, ShortageRecord, Trend, or_no_data};
use crate::text::normalize_search_key;

/// Column positions in the shortage sheet.
pub mod col {
    pub const INGREDIENT_NAME: usize = 2;
    pub const YJ_CODE: usize = 4;
    pub const PRODUCT_NAME: usize = 5;
    pub const MANUFACTURER: usize = 6;
    pub const PRODUCT_CATEGORY: usize = 7;
    pub const IS_BASIC_DRUG: usize = 8;
    pub const SHIPMENT_STATUS: usize = 11;
    pub const REASON_FOR_LIMITATION: usize = 13;
    pub const RESOLUTION_PROSPECT: usize = 14;
    pub const EXPECTED_DATE: usize = 15;
    pub const SHIPMENT_VOLUME_STATUS: usize = 16;
    pub const UPDATED_ON: usize = 19;
    pub const TREND: usize = 22;
    pub const CHANGE_NOTE: usize = 23;
}

/// Parse the CSV export. Returns one record per data row, in source order.
pub fn parse_shortage_csv(text: &str) -> Result<Vec<ShortageRecord>, ParseError> {
    let rows = csv::parse_rows(text, COMMA);
    let (_header, data) = csv::split_header(rows).ok_or(ParseError::Empty)?;
    if data.is_empty() {
        return Err(ParseError::Empty);
    }

    let records: Vec<ShortageRecord> = data.iter().map(|row| shortage_from_row(row)).collect();
    debug!(count = records.len(), "parsed shortage rows");
    Ok(records)
}

/// Build one record from a row. Short rows read missing cells as empty.
pub fn shortage_from_row(row: &[String]) -> ShortageRecord {
    let text = |idx: usize| or_no_data(cell(row, idx));

    let shipment_status = resolve_shipment_status(cell(row, col::SHIPMENT_STATUS));
    let (updated_cells, changed_part) = match decode_change_metadata(cell(row, col::CHANGE_NOTE)) {
        Ok(cols) => (cols, NO_DATA.to_string()),
        Err(_) => (Vec::new(), or_no_data(cell(row, col::CHANGE_NOTE))),
    };

    let product_name = text(col::PRODUCT_NAME);
    let ingredient_name = text(col::INGREDIENT_NAME);
    let manufacturer = text(col::MANUFACTURER);

    ShortageRecord {
        normalized_product_name: normalize_search_key(&product_name),
        normalized_ingredient_name: normalize_search_key(&ingredient_name),
        normalized_manufacturer: normalize_search_key(&manufacturer),
        product_name,
        ingredient_name,
        manufacturer,
        status_category: ShipmentCategory::classify(&shipment_status),
        shipment_status,
        reason_for_limitation: text(col::REASON_FOR_LIMITATION),
        resolution_prospect: text(col::RESOLUTION_PROSPECT),
        expected_date: text(col::EXPECTED_DATE),
        shipment_volume_status: text(col::SHIPMENT_VOLUME_STATUS),
        yj_code: text(col::YJ_CODE),
        product_category: text(col::PRODUCT_CATEGORY),
        is_basic_drug: text(col::IS_BASIC_DRUG),
        updated_on: decode_update_date(cell(row, col::UPDATED_ON)).ok(),
        updated_cells,
        trend: Trend::from_glyph(cell(row, col::TREND)),
        changed_part,
    }
}

/// Numeric status codes resolve through the code table; literal labels
/// are kept as written.
pub fn resolve_shipment_status(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return NO_DATA.to_string();
    }
    if raw.chars().all(|c| c.is_ascii_digit()) {
        return SHIPMENT_STATUS.resolve(&format!("{raw:0>2}"));
    }
    raw.to_string()
}

#[derive(Deserialize)]
struct ChangeMetadata {
    #[serde(default)]
    updated_cols: Option<Vec<serde_json::Value>>,
}

/// Decode the change-metadata column as `{"updated_cols": [...]}`.
///
/// `Err` means the caller should treat the cell as a free-text note.
pub fn decode_change_metadata(raw: &str) -> Result<Vec<String>, FieldFallback> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(FieldFallback::Missing);
    }
    if raw.len() < 2 || !raw.starts_with('{') {
        return Err(FieldFallback::Unrecognized);
    }

    let meta: ChangeMetadata = serde_json::from_str(raw)
        .or_else(|_| serde_json::from_str(&raw.replace("\"\"", "\"")))
        .map_err(|_| FieldFallback::Unrecognized)?;

    let cols = meta
        .updated_cols
        .unwrap_or_default()
        .into_iter()
        .map(|v| match v {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        })
        .collect();
    Ok(cols)
}

/// Decode the update-date column. Accepts the spreadsheet's
/// `Date(year, month0, day)` wrapper (zero-based month) and common
/// free-text date forms.
pub fn decode_update_date(raw: &str) -> Result<NaiveDate, FieldFallback> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(FieldFallback::Missing);
    }

    if raw.starts_with("Date(") {
        let parts = digit_groups(raw);
        if parts.len() >= 3 {
            let month0 = u32::try_from(parts[1]).map_err(|_| FieldFallback::Unrecognized)?;
            let day = u32::try_from(parts[2]).map_err(|_| FieldFallback::Unrecognized)?;
            let year = i32::try_from(parts[0]).map_err(|_| FieldFallback::Unrecognized)?;
            let month = month0.checked_add(1).ok_or(FieldFallback::Unrecognized)?;
            return NaiveDate::from_ymd_opt(year, month, day).ok_or(FieldFallback::Unrecognized);
        }
        return Err(FieldFallback::Unrecognized);
    }

    for fmt in ["%Y-%m-%d", "%Y/%m/%d", "%Y年%m月%d日", "%Y.%m.%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, fmt) {
            return Ok(date);
        }
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y/%m/%d %H:%M:%S", "%Y/%m/%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(dt.date());
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.date_naive());
    }
    Err(FieldFallback::Unrecognized)
}

fn digit_groups(s: &str) -> Vec<i64> {
    s.split(|c: char| !c.is_ascii_digit())
        .filter(|g| !g.is_empty())
        .filter_map(|g| g.parse().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "\"c0\",\"c1\",\"c2\",\"c3\",\"c4\",\"c5\",\"c6\",\"c7\",\"c8\",\"c9\",\"c10\",\"c11\",\"c12\",\"c13\",\"c14\",\"c15\",\"c16\",\"c17\",\"c18\",\"c19\",\"c20\",\"c21\",\"c22\",\"c23\"";

    fn row(cells: &[(usize, &str)]) -> String {
        let mut out = vec![String::new(); 24];
        for (idx, value) in cells {
            out[*idx] = (*value).to_string();
        }
        out.iter()
            .map(|c| format!("\"{}\"", c.replace('"', "\"\"")))
            .collect::<Vec<_>>()
            .join(",")
    }

    #[test]
    fn status_code_resolves_through_table() {
        let csv = format!(
            "{HEADER}\n{}\n",
            row(&[(0, "001"), (5, "Foo"), (11, "01")])
        );
        let records = parse_shortage_csv(&csv).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].product_name, "Foo");
        assert_eq!(records[0].shipment_status, "通常出荷");
        assert_eq!(records[0].status_category, ShipmentCategory::Normal);
    }

    #[test]
    fn n_rows_in_n_records_out_in_order() {
        let body: Vec<String> = (0..5)
            .map(|i| {
                let name = format!("品名{i}");
                row(&[(5, name.as_str()), (11, "限定出荷（その他）")])
            })
            .collect();
        let csv = format!("{HEADER}\n{}\n", body.join("\n"));
        let records = parse_shortage_csv(&csv).unwrap();
        assert_eq!(records.len(), 5);
        for (i, r) in records.iter().enumerate() {
            assert_eq!(r.product_name, format!("品名{i}"));
            assert_eq!(r.status_category, ShipmentCategory::Limited);
        }
    }

    #[test]
    fn quoted_comma_and_escaped_quote_survive() {
        let csv = format!("{HEADER}\n{}\n", row(&[(5, "a,b\"c")]));
        let records = parse_shortage_csv(&csv).unwrap();
        assert_eq!(records[0].product_name, "a,b\"c");
    }

    #[test]
    fn short_row_does_not_fail() {
        let csv = format!("{HEADER}\n\"x\",\"y\",\"アムロジピン\"\n");
        let records = parse_shortage_csv(&csv).unwrap();
        let r = &records[0];
        assert_eq!(r.ingredient_name, "アムロジピン");
        assert_eq!(r.product_name, NO_DATA);
        assert_eq!(r.shipment_status, NO_DATA);
        assert_eq!(r.updated_on, None);
        assert_eq!(r.trend, Trend::Unchanged);
        assert!(r.updated_cells.is_empty());
    }

    #[test]
    fn header_only_is_empty_error() {
        assert_eq!(parse_shortage_csv(HEADER), Err(ParseError::Empty));
        assert_eq!(parse_shortage_csv(""), Err(ParseError::Empty));
    }

    #[test]
    fn metadata_json_populates_updated_cells() {
        let csv = format!(
            "{HEADER}\n{}\n",
            row(&[(22, "▲"), (23, r#"{"updated_cols":["L","N",16]}"#)])
        );
        let r = &parse_shortage_csv(&csv).unwrap()[0];
        assert_eq!(r.updated_cells, vec!["L", "N", "16"]);
        assert!(r.was_updated("N"));
        assert_eq!(r.changed_part, NO_DATA);
        assert_eq!(r.trend, Trend::Up);
    }

    #[test]
    fn metadata_plain_text_becomes_changed_part() {
        let csv = format!("{HEADER}\n{}\n", row(&[(22, "⤵️"), (23, "出荷対応")]));
        let r = &parse_shortage_csv(&csv).unwrap()[0];
        assert!(r.updated_cells.is_empty());
        assert_eq!(r.changed_part, "出荷対応");
        assert_eq!(r.trend, Trend::Down);
    }

    #[test]
    fn broken_json_metadata_falls_back_to_text() {
        assert_eq!(decode_change_metadata("{not json"), Err(FieldFallback::Unrecognized));
        let csv = format!("{HEADER}\n{}\n", row(&[(23, "{not json")]));
        let r = &parse_shortage_csv(&csv).unwrap()[0];
        assert_eq!(r.changed_part, "{not json");
    }

    #[test]
    fn doubled_quotes_in_metadata_are_tolerated() {
        let cols = decode_change_metadata(r#"{""updated_cols"":[""L""]}"#).unwrap();
        assert_eq!(cols, vec!["L"]);
    }

    #[test]
    fn gviz_date_month_is_zero_based() {
        assert_eq!(
            decode_update_date("Date(2024,0,15)"),
            Ok(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap())
        );
        assert_eq!(
            decode_update_date("Date(2025,11,31)"),
            Ok(NaiveDate::from_ymd_opt(2025, 12, 31).unwrap())
        );
    }

    #[test]
    fn free_text_dates() {
        let expected = NaiveDate::from_ymd_opt(2026, 2, 6).unwrap();
        assert_eq!(decode_update_date("2026-02-06"), Ok(expected));
        assert_eq!(decode_update_date("2026/02/06"), Ok(expected));
        assert_eq!(decode_update_date("2026年02月06日"), Ok(expected));
        assert_eq!(decode_update_date("2026-02-06T09:00:00+09:00"), Ok(expected));
    }

    #[test]
    fn unreadable_dates_fall_back() {
        assert_eq!(decode_update_date(""), Err(FieldFallback::Missing));
        assert_eq!(decode_update_date("未定"), Err(FieldFallback::Unrecognized));
        assert_eq!(decode_update_date("Date(2024)"), Err(FieldFallback::Unrecognized));
        assert_eq!(decode_update_date("Date(2024,1,30)"), Err(FieldFallback::Unrecognized));
        assert_eq!(
            decode_update_date("Date(2024,4294967295,1)"),
            Err(FieldFallback::Unrecognized)
        );
    }

    #[test]
    fn numeric_status_codes() {
        assert_eq!(resolve_shipment_status("5"), "供給停止");
        assert_eq!(resolve_shipment_status("99"), "不明な出荷対応");
        assert_eq!(resolve_shipment_status("②限定出荷（自社の事情）"), "②限定出荷（自社の事情）");
        assert_eq!(resolve_shipment_status(" "), NO_DATA);
    }

    #[test]
    fn search_keys_are_normalized() {
        let csv = format!("{HEADER}\n{}\n", row(&[(2, "あむろじぴん"), (6, "ＡＢＣ製薬")]));
        let r = &parse_shortage_csv(&csv).unwrap()[0];
        assert_eq!(r.normalized_ingredient_name, "アムロジピン");
        assert_eq!(r.normalized_manufacturer, "abc製薬");
    }
}
