//! Feed definitions: where each dataset lives, how long a copy stays fresh,
//! and which parser turns its payload into records.

use chrono::{Local, NaiveDate};
use kusuri_core::text::sanitize_query;
use kusuri_core::{
    FeedSource, IncidentReport, ParseError, PollenReading, ShortageRecord, SurveillanceRecord,
    parse_incident_xml, parse_pollen_csv, parse_shortage_csv, parse_surveillance_csv,
};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::fetch::{ACCEPT_CSV, ACCEPT_XML, FeedRequest};

/// A remote dataset served through the cache gate.
pub trait Feed: Clone + Send + Sync + 'static {
    type Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static;

    /// Short name used in logs and the CLI.
    fn name(&self) -> &'static str;
    fn source(&self) -> &FeedSource;
    /// Storage key for the cached payload. Distinct requests need distinct keys.
    fn cache_key(&self) -> String;
    fn request(&self) -> FeedRequest;
    fn parse(&self, body: &str) -> Result<Vec<Self::Record>, ParseError>;

    fn freshness_ms(&self) -> u64 {
        self.source().freshness_ms
    }

    /// Prefix shared by every key this feed caches under. Clearing the feed
    /// drops all of them.
    fn key_prefix(&self) -> String {
        self.cache_key()
    }

    /// Whether a newly stored payload replaces every other key under
    /// [`Feed::key_prefix`].
    fn supersedes_prefix(&self) -> bool {
        false
    }
}

// ── Shortage ──

#[derive(Debug, Clone)]
pub struct ShortageFeed {
    pub source: FeedSource,
}

impl Feed for ShortageFeed {
    type Record = ShortageRecord;

    fn name(&self) -> &'static str {
        "shortage"
    }

    fn source(&self) -> &FeedSource {
        &self.source
    }

    fn cache_key(&self) -> String {
        "shortage".to_string()
    }

    fn request(&self) -> FeedRequest {
        FeedRequest::get(&self.source.url, ACCEPT_CSV)
    }

    fn parse(&self, body: &str) -> Result<Vec<ShortageRecord>, ParseError> {
        parse_shortage_csv(body)
    }
}

// ── Incidents ──

/// Search parameters for the incident-report service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncidentQuery {
    /// Drug or ingredient name.
    pub keyword: Option<String>,
    /// Additional free-text narrowing.
    pub filter: Option<String>,
    pub count: u32,
    /// Upstream sort order; `2` is newest first.
    pub order: u32,
}

impl Default for IncidentQuery {
    /// The newest twenty reports.
    fn default() -> Self {
        Self {
            keyword: None,
            filter: None,
            count: 20,
            order: 2,
        }
    }
}

impl IncidentQuery {
    pub fn keyword(keyword: impl Into<String>) -> Self {
        Self {
            keyword: Some(keyword.into()),
            count: 50,
            ..Self::default()
        }
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    fn clean(value: &Option<String>) -> String {
        value.as_deref().map(sanitize_query).unwrap_or_default()
    }

    /// Query pairs for the service. A keyword alone searches the product
    /// and generic-name fields; anything else is a full-text search, ANDed
    /// when both parts are present.
    pub fn params(&self) -> Vec<(String, String)> {
        let mut params = vec![
            ("count".to_string(), self.count.to_string()),
            ("order".to_string(), self.order.to_string()),
        ];
        let keyword = Self::clean(&self.keyword);
        let filter = Self::clean(&self.filter);
        let mut push = |k: &str, v: &str| params.push((k.to_string(), v.to_string()));

        if !keyword.is_empty() && filter.is_empty() {
            push("item", "DATMEDNAME");
            push("item", "DATGENERIC");
            push("word", &keyword);
            push("condition", "any");
        } else {
            let combined = [keyword.as_str(), filter.as_str()]
                .into_iter()
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            if !combined.is_empty() {
                push("word", &combined);
                if !keyword.is_empty() && !filter.is_empty() {
                    push("condition", "all");
                }
            }
        }
        params
    }
}

/// Every incident search is cached under a key starting with this.
pub const INCIDENT_KEY_PREFIX: &str = "incidents?";

#[derive(Debug, Clone)]
pub struct IncidentFeed {
    pub source: FeedSource,
    pub query: IncidentQuery,
}

impl Feed for IncidentFeed {
    type Record = IncidentReport;

    fn name(&self) -> &'static str {
        "incidents"
    }

    fn source(&self) -> &FeedSource {
        &self.source
    }

    fn cache_key(&self) -> String {
        let query = self
            .query
            .params()
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        format!("{INCIDENT_KEY_PREFIX}{query}")
    }

    fn key_prefix(&self) -> String {
        INCIDENT_KEY_PREFIX.to_string()
    }

    fn request(&self) -> FeedRequest {
        let mut request = FeedRequest::get(&self.source.url, ACCEPT_XML);
        request.query = self.query.params();
        request
    }

    fn parse(&self, body: &str) -> Result<Vec<IncidentReport>, ParseError> {
        parse_incident_xml(body)
    }
}

// ── Surveillance ──

/// The weekly surveillance CSV is published without a declared charset.
pub const SURVEILLANCE_CHARSET: &str = "Shift_JIS";

#[derive(Debug, Clone)]
pub struct SurveillanceFeed {
    pub source: FeedSource,
}

impl Feed for SurveillanceFeed {
    type Record = SurveillanceRecord;

    fn name(&self) -> &'static str {
        "surveillance"
    }

    fn source(&self) -> &FeedSource {
        &self.source
    }

    fn cache_key(&self) -> String {
        "surveillance".to_string()
    }

    fn request(&self) -> FeedRequest {
        FeedRequest::get(&self.source.url, ACCEPT_CSV).with_charset(SURVEILLANCE_CHARSET)
    }

    fn parse(&self, body: &str) -> Result<Vec<SurveillanceRecord>, ParseError> {
        parse_surveillance_csv(body)
    }
}

// ── Pollen ──

/// Marker in the provider's 404 body when today's data is not published yet.
pub const POLLEN_NO_DATA: &str = "data does not exist";

/// Pollen payloads are cached per day under this prefix. Only the latest
/// day is kept.
pub const POLLEN_KEY_PREFIX: &str = "pollen-";

/// Today's hourly pollen counts for every observation city.
#[derive(Debug, Clone)]
pub struct PollenFeed {
    pub source: FeedSource,
    /// Day to request; `None` means today in local time.
    pub date: Option<NaiveDate>,
}

impl PollenFeed {
    fn day(&self) -> NaiveDate {
        self.date.unwrap_or_else(|| Local::now().date_naive())
    }
}

impl Feed for PollenFeed {
    type Record = PollenReading;

    fn name(&self) -> &'static str {
        "pollen"
    }

    fn source(&self) -> &FeedSource {
        &self.source
    }

    fn cache_key(&self) -> String {
        format!("{POLLEN_KEY_PREFIX}{}", self.day().format("%Y%m%d"))
    }

    fn key_prefix(&self) -> String {
        POLLEN_KEY_PREFIX.to_string()
    }

    fn supersedes_prefix(&self) -> bool {
        true
    }

    fn request(&self) -> FeedRequest {
        let day = self.day().format("%Y%m%d").to_string();
        FeedRequest::get(&self.source.url, ACCEPT_CSV)
            .param("citycode", "ALL")
            .param("start", day.clone())
            .param("end", day)
            .with_no_data_marker(POLLEN_NO_DATA)
    }

    fn parse(&self, body: &str) -> Result<Vec<PollenReading>, ParseError> {
        parse_pollen_csv(body)
    }
}
