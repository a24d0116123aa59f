use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use feed_rs::parser;
use reqwest::Client;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::config::{Config, SourceConfig};
use crate::error::{PlanetError, Result};
use crate::filter;
use crate::normalizer::{self, RawEntry};
use crate::store::{EntryStore, LastUpdate, MergeOutcome};

/// Counters for one source's ingestion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub fetched: usize,
    pub added: usize,
    pub updated: usize,
    pub filtered: usize,
    pub skipped: usize,
    pub expired: usize,
    pub stored: usize,
}

#[derive(Debug)]
pub struct SourceReport {
    pub name: String,
    pub outcome: std::result::Result<IngestStats, String>,
}

#[derive(Debug)]
pub struct RefreshReport {
    pub sources: Vec<SourceReport>,
    pub finished_at: DateTime<Utc>,
}

impl RefreshReport {
    pub fn failures(&self) -> impl Iterator<Item = &SourceReport> {
        self.sources.iter().filter(|s| s.outcome.is_err())
    }
}

pub struct Fetcher {
    client: Client,
    config: Arc<Config>,
    refreshing: Arc<RwLock<bool>>,
}

impl Fetcher {
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("DwarfPlanet/", env!("CARGO_PKG_VERSION"), " (Feed Aggregator)"))
            .build()?;

        Ok(Self {
            client,
            config,
            refreshing: Arc::new(RwLock::new(false)),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn is_refreshing(&self) -> bool {
        *self.refreshing.read().await
    }

    /// Runs one ingestion over every source. Returns `None` when another
    /// refresh was already in progress.
    pub async fn refresh_all_sources(&self) -> anyhow::Result<Option<RefreshReport>> {
        // Check if already refreshing
        {
            let mut refreshing = self.refreshing.write().await;
            if *refreshing {
                info!("Refresh already in progress, skipping");
                return Ok(None);
            }
            *refreshing = true;
        }

        let result = self.do_refresh_all().await;

        // Clear refreshing flag
        {
            let mut refreshing = self.refreshing.write().await;
            *refreshing = false;
        }

        result.map(Some)
    }

    async fn do_refresh_all(&self) -> anyhow::Result<RefreshReport> {
        info!("Refreshing {} sources", self.config.sources.len());

        let mut reports = Vec::with_capacity(self.config.sources.len());
        for source in &self.config.sources {
            let outcome = match self.refresh_source(source).await {
                Ok(stats) => Ok(stats),
                Err(e) => {
                    error!("Failed to refresh source '{}': {}", source.name, e);
                    Err(e.to_string())
                }
            };
            reports.push(SourceReport {
                name: source.name.clone(),
                outcome,
            });
        }

        // Recorded even when some sources failed
        let finished_at = Utc::now().trunc_subsecs(0);
        LastUpdate::save(&self.config.data_dir, finished_at)?;
        info!(
            "Feed refresh complete at {}",
            finished_at.format("%Y-%m-%d %H:%M:%S")
        );

        Ok(RefreshReport {
            sources: reports,
            finished_at,
        })
    }

    pub async fn refresh_source(&self, source: &SourceConfig) -> Result<IngestStats> {
        info!("Fetching source: {} ({})", source.name, source.feed);

        let raw_entries = self.fetch_feed(&source.feed).await?;

        let mut store = EntryStore::load(&self.config.data_dir, &source.name);
        debug!("{} old entries loaded for '{}'", store.len(), source.name);

        let stats = ingest(
            &mut store,
            source,
            raw_entries,
            self.config.retention(),
            Utc::now(),
        );

        if let Err(e) = store.save() {
            error!(
                "Could not save {} merged entries of '{}', previous store left untouched",
                store.len(),
                source.name
            );
            return Err(e);
        }

        info!(
            "Source '{}': {} added, {} updated, {} stored",
            source.name, stats.added, stats.updated, stats.stored
        );
        Ok(stats)
    }

    pub async fn fetch_feed(&self, url: &str) -> Result<Vec<RawEntry>> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let bytes = response.bytes().await?;
        parse_feed(&bytes)
    }
}

pub fn parse_feed(bytes: &[u8]) -> Result<Vec<RawEntry>> {
    let parsed = parser::parse(bytes).map_err(|e| PlanetError::FeedParse(e.to_string()))?;
    Ok(parsed.entries.into_iter().map(RawEntry::from).collect())
}

/// Normalizes, filters and merges `raw_entries` into `store` in feed order,
/// then applies retention. Entries that cannot be normalized are skipped.
pub fn ingest(
    store: &mut EntryStore,
    source: &SourceConfig,
    raw_entries: Vec<RawEntry>,
    retention: Option<chrono::Duration>,
    now: DateTime<Utc>,
) -> IngestStats {
    let mut stats = IngestStats {
        fetched: raw_entries.len(),
        ..Default::default()
    };

    for raw in &raw_entries {
        let entry = match normalizer::normalize(raw) {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Skipping entry of '{}': {}", source.name, e);
                stats.skipped += 1;
                continue;
            }
        };

        if !filter::accepts(&source.filters, &entry) {
            stats.filtered += 1;
            continue;
        }

        match store.merge(entry) {
            MergeOutcome::Added => stats.added += 1,
            MergeOutcome::Updated => stats.updated += 1,
        }
    }

    stats.expired = store.retain(retention, now);
    store.sort();
    stats.stored = store.len();

    if stats.skipped > 0 {
        warn!(
            "Skipped {} of {} entries from '{}'",
            stats.skipped, stats.fetched, source.name
        );
    }

    stats
}

pub async fn start_background_refresh(fetcher: Arc<Fetcher>, interval_minutes: u64) {
    let interval = Duration::from_secs(interval_minutes * 60);

    // Do initial fetch
    info!("Starting initial feed fetch");
    if let Err(e) = fetcher.refresh_all_sources().await {
        error!("Initial feed fetch failed: {}", e);
    }

    // Then schedule periodic refreshes
    loop {
        tokio::time::sleep(interval).await;
        info!("Starting scheduled feed refresh");
        if let Err(e) = fetcher.refresh_all_sources().await {
            error!("Scheduled feed refresh failed: {}", e);
        }
    }
}
