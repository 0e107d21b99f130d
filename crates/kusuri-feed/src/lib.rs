//! Feed fetching and caching: the HTTP fetcher, per-feed definitions, the
//! single-flight cache gate, and the [`Pipeline`] facade over all of them.

mod error;
pub mod feed;
pub mod fetch;
pub mod gate;
pub mod pipeline;

pub use error::{BODY_SNIPPET_CHARS, FeedError, FetchError};
pub use feed::{Feed, IncidentFeed, IncidentQuery, PollenFeed, ShortageFeed, SurveillanceFeed};
pub use fetch::{FeedRequest, FetchOutcome, Fetcher, HttpFetcher};
pub use gate::{CacheGate, Loaded, Provenance};
pub use pipeline::{FeedKey, FeedRecords, Pipeline};
