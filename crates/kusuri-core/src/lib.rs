pub mod codes;
pub mod config;
pub mod csv;
pub mod error;
pub mod incident;
pub mod pollen;
pub mod record;
pub mod shortage;
pub mod surveillance;
pub mod text;

pub use codes::{CodeAxis, CodeTable};
pub use config::{ConfigError, FeedSource, PipelineConfig};
pub use error::{FieldFallback, ParseError};
pub use incident::parse_incident_xml;
pub use pollen::parse_pollen_csv;
pub use record::{
    CachedPayload, IncidentReport, NO_DATA, PollenLevel, PollenReading, ShipmentCategory,
    ShortageRecord, SurveillanceRecord, Trend, WeeklyValue, is_no_data,
};
pub use shortage::parse_shortage_csv;
pub use surveillance::parse_surveillance_csv;
pub use text::{extract_search_term, normalize_search_key};
