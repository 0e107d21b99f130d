//! Normalized record types produced by the feed parsers.
//!
//! Every text field holds a deterministic value: blanks become [`NO_DATA`]
//! rather than an empty string, so renderers never see a hole.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Sentinel for a field the upstream feed left blank.
pub const NO_DATA: &str = "記載なし";

/// True for the sentinel and for every placeholder the upstream feeds use
/// for "nothing here". Consumers treat these exactly like absence.
pub fn is_no_data(value: &str) -> bool {
    matches!(value.trim(), "" | NO_DATA | "N/A" | "-")
}

pub(crate) fn or_no_data(value: &str) -> String {
    let value = value.trim();
    if value.is_empty() {
        NO_DATA.to_string()
    } else {
        value.to_string()
    }
}

// ── Drug shortage ──

/// One row of the drug-shortage spreadsheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortageRecord {
    pub product_name: String,
    pub ingredient_name: String,
    pub manufacturer: String,
    pub shipment_status: String,
    pub status_category: ShipmentCategory,
    pub reason_for_limitation: String,
    pub resolution_prospect: String,
    pub expected_date: String,
    pub shipment_volume_status: String,
    pub yj_code: String,
    pub product_category: String,
    pub is_basic_drug: String,
    pub updated_on: Option<NaiveDate>,
    /// Column identifiers the sheet flagged as changed in the last update.
    pub updated_cells: Vec<String>,
    pub trend: Trend,
    /// Free-text change note, when the metadata column is not JSON.
    pub changed_part: String,
    pub normalized_product_name: String,
    pub normalized_ingredient_name: String,
    pub normalized_manufacturer: String,
}

impl ShortageRecord {
    pub fn was_updated(&self, column: &str) -> bool {
        self.updated_cells.iter().any(|c| c == column)
    }
}

/// Coarse grouping of the shipment status used by filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentCategory {
    Normal,
    Limited,
    Stopped,
    Unknown,
}

impl ShipmentCategory {
    /// Keyword classification of a status label. Checked in order:
    /// normal, limited, stopped.
    pub fn classify(status: &str) -> Self {
        let s = status.trim();
        if s.contains("通常出荷") || s.contains('通') {
            ShipmentCategory::Normal
        } else if ["限定出荷", "出荷制限", "限", "制"].iter().any(|k| s.contains(k)) {
            ShipmentCategory::Limited
        } else if s.contains("供給停止") || s.contains("停止") || s.contains('停') {
            ShipmentCategory::Stopped
        } else {
            ShipmentCategory::Unknown
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ShipmentCategory::Normal => "通常出荷",
            ShipmentCategory::Limited => "限定出荷",
            ShipmentCategory::Stopped => "供給停止",
            ShipmentCategory::Unknown => "不明",
        }
    }
}

/// Direction of the most recent shipment-status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Up,
    Down,
    #[default]
    Unchanged,
}

impl Trend {
    /// Collapse the equivalent glyphs the sheet uses into one direction.
    pub fn from_glyph(raw: &str) -> Self {
        match raw.trim().trim_end_matches('\u{FE0F}') {
            "▲" | "⤴" => Trend::Up,
            "▼" | "⤵" => Trend::Down,
            _ => Trend::Unchanged,
        }
    }

    /// Canonical display symbol; empty when unchanged.
    pub fn symbol(self) -> &'static str {
        match self {
            Trend::Up => "⤴️",
            Trend::Down => "⤵️",
            Trend::Unchanged => "",
        }
    }
}

// ── Incident reports ──

/// A pharmacy near-miss ("hiyari-hatto") report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentReport {
    pub year: String,
    pub month: String,
    pub summary: String,
    pub content: String,
    pub factor: String,
    /// Contributing factors, one resolved label per line.
    pub factors: String,
    /// Factors for prescription-inquiry cases, one resolved label per line.
    pub factor_doubts: String,
    pub improvement: String,
    pub estimated_text: String,
    pub effort_text: String,
}

impl IncidentReport {
    /// Prescription-inquiry cases carry estimated causes and pharmacy
    /// efforts instead of factors and improvements.
    pub fn is_inquiry(&self) -> bool {
        self.summary.contains("疑義照会")
    }
}

// ── Infection surveillance ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveillanceRecord {
    /// Disease key from the disease code table (e.g. `Influenza`).
    pub disease: String,
    pub prefecture: String,
    pub history: Vec<WeeklyValue>,
}

impl SurveillanceRecord {
    pub fn latest(&self) -> Option<&WeeklyValue> {
        self.history.last()
    }
}

/// Reports per sentinel site for one epidemiological week.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeeklyValue {
    pub week: u32,
    pub value: f64,
}

// ── Pollen ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollenReading {
    pub city_code: String,
    /// Observation time as sent by the provider.
    pub observed_at: String,
    pub count: u32,
    pub level: PollenLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollenLevel {
    None,
    Low,
    Medium,
    High,
    VeryHigh,
}

impl PollenLevel {
    /// Level for an hourly count.
    pub fn from_hourly_count(count: u32) -> Self {
        match count {
            12.. => PollenLevel::VeryHigh,
            7..=11 => PollenLevel::High,
            4..=6 => PollenLevel::Medium,
            1..=3 => PollenLevel::Low,
            0 => PollenLevel::None,
        }
    }
}

// ── Cache envelope ──

/// A parsed feed as persisted in the local cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedPayload<R> {
    /// Epoch milliseconds at which the payload was fetched.
    pub timestamp: i64,
    pub data: Vec<R>,
}

impl<R> CachedPayload<R> {
    pub fn new(data: Vec<R>, timestamp: i64) -> Self {
        Self { timestamp, data }
    }

    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms - self.timestamp
    }

    /// Fresh while strictly younger than `window_ms`.
    pub fn is_fresh(&self, now_ms: i64, window_ms: u64) -> bool {
        let window = i64::try_from(window_ms).unwrap_or(i64::MAX);
        self.age_ms(now_ms) < window
    }
}
