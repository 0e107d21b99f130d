//! The pipeline facade: one entry point per feed, each going through its
//! own cache gate.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use kusuri_core::{
    IncidentReport, PipelineConfig, PollenReading, ShortageRecord, SurveillanceRecord,
};
use kusuri_store::{CacheStore, FileStore};
use serde::Serialize;
use tracing::info;

use crate::FeedError;
use crate::feed::{
    IncidentFeed, IncidentQuery, PollenFeed, ShortageFeed, SurveillanceFeed,
};
use crate::fetch::{Fetcher, HttpFetcher};
use crate::gate::{CacheGate, Loaded};

/// Names the four feeds on the command line and in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedKey {
    Shortage,
    Incidents,
    Surveillance,
    Pollen,
}

impl FeedKey {
    pub const ALL: [FeedKey; 4] = [
        FeedKey::Shortage,
        FeedKey::Incidents,
        FeedKey::Surveillance,
        FeedKey::Pollen,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FeedKey::Shortage => "shortage",
            FeedKey::Incidents => "incidents",
            FeedKey::Surveillance => "surveillance",
            FeedKey::Pollen => "pollen",
        }
    }
}

impl fmt::Display for FeedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedKey {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        FeedKey::ALL
            .into_iter()
            .find(|k| k.as_str() == wanted)
            .ok_or_else(|| FeedError::UnknownFeed(s.to_string()))
    }
}

/// Records of any feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "feed", content = "records", rename_all = "lowercase")]
pub enum FeedRecords {
    Shortage(Vec<ShortageRecord>),
    Incidents(Vec<IncidentReport>),
    Surveillance(Vec<SurveillanceRecord>),
    Pollen(Vec<PollenReading>),
}

impl FeedRecords {
    pub fn key(&self) -> FeedKey {
        match self {
            FeedRecords::Shortage(_) => FeedKey::Shortage,
            FeedRecords::Incidents(_) => FeedKey::Incidents,
            FeedRecords::Surveillance(_) => FeedKey::Surveillance,
            FeedRecords::Pollen(_) => FeedKey::Pollen,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            FeedRecords::Shortage(r) => r.len(),
            FeedRecords::Incidents(r) => r.len(),
            FeedRecords::Surveillance(r) => r.len(),
            FeedRecords::Pollen(r) => r.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keep at most `n` records.
    pub fn truncate(&mut self, n: usize) {
        match self {
            FeedRecords::Shortage(r) => r.truncate(n),
            FeedRecords::Incidents(r) => r.truncate(n),
            FeedRecords::Surveillance(r) => r.truncate(n),
            FeedRecords::Pollen(r) => r.truncate(n),
        }
    }
}

/// Every feed behind one cache store and one fetcher.
pub struct Pipeline {
    config: PipelineConfig,
    shortage: CacheGate<ShortageRecord>,
    incidents: CacheGate<IncidentReport>,
    surveillance: CacheGate<SurveillanceRecord>,
    pollen: CacheGate<PollenReading>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        store: Arc<dyn CacheStore>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            config,
            shortage: CacheGate::new(Arc::clone(&store), Arc::clone(&fetcher)),
            incidents: CacheGate::new(Arc::clone(&store), Arc::clone(&fetcher)),
            surveillance: CacheGate::new(Arc::clone(&store), Arc::clone(&fetcher)),
            pollen: CacheGate::new(store, fetcher),
        }
    }

    /// File-backed cache under `config.cache_dir` and the HTTP fetcher.
    pub fn open(config: PipelineConfig) -> Result<Self, FeedError> {
        let store = FileStore::open(&config.cache_dir)?;
        let fetcher = HttpFetcher::new(
            Duration::from_secs(config.request_timeout_secs),
            &config.user_agent,
            config.cache_bust,
        )?;
        info!(cache_dir = %config.cache_dir.display(), "pipeline ready");
        Ok(Self::new(config, Arc::new(store), Arc::new(fetcher)))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn shortage_feed(&self) -> ShortageFeed {
        ShortageFeed {
            source: self.config.shortage.clone(),
        }
    }

    fn incident_feed(&self, query: IncidentQuery) -> IncidentFeed {
        IncidentFeed {
            source: self.config.incidents.clone(),
            query,
        }
    }

    fn surveillance_feed(&self) -> SurveillanceFeed {
        SurveillanceFeed {
            source: self.config.surveillance.clone(),
        }
    }

    fn pollen_feed(&self) -> PollenFeed {
        PollenFeed {
            source: self.config.pollen.clone(),
            date: None,
        }
    }

    /// Records for `key`. Incidents use the default query (newest reports).
    pub async fn load_records(&self, key: FeedKey) -> Result<Loaded<FeedRecords>, FeedError> {
        match key {
            FeedKey::Shortage => Ok(self
                .shortage
                .load(&self.shortage_feed())
                .await?
                .map(FeedRecords::Shortage)),
            FeedKey::Incidents => self.load_incidents(IncidentQuery::default()).await,
            FeedKey::Surveillance => Ok(self
                .surveillance
                .load(&self.surveillance_feed())
                .await?
                .map(FeedRecords::Surveillance)),
            FeedKey::Pollen => Ok(self
                .pollen
                .load(&self.pollen_feed())
                .await?
                .map(FeedRecords::Pollen)),
        }
    }

    /// Incident reports matching `query`. Each distinct query is cached
    /// separately.
    pub async fn load_incidents(
        &self,
        query: IncidentQuery,
    ) -> Result<Loaded<FeedRecords>, FeedError> {
        Ok(self
            .incidents
            .load(&self.incident_feed(query))
            .await?
            .map(FeedRecords::Incidents))
    }

    /// Drop every cached payload of `key`: all incident searches, all
    /// pollen days. Returns how many entries were removed.
    pub async fn clear(&self, key: FeedKey) -> Result<usize, FeedError> {
        match key {
            FeedKey::Shortage => self.shortage.invalidate(&self.shortage_feed()).await,
            FeedKey::Incidents => {
                self.incidents
                    .invalidate(&self.incident_feed(IncidentQuery::default()))
                    .await
            }
            FeedKey::Surveillance => {
                self.surveillance
                    .invalidate(&self.surveillance_feed())
                    .await
            }
            FeedKey::Pollen => self.pollen.invalidate(&self.pollen_feed()).await,
        }
    }

    /// Clear, then load from the network.
    pub async fn reload(&self, key: FeedKey) -> Result<Loaded<FeedRecords>, FeedError> {
        self.clear(key).await?;
        self.load_records(key).await
    }
}
