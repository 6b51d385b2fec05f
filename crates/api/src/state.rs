//! Application state shared across handlers.

use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::middleware::rate_limit::{RateLimiter, SharedRateLimiter};
use event_store::EventStore;
use pipeline::Pipeline;
use pulse_core::{Error, Result, Site, SiteDirectory};

/// Cache TTL for site lookups (30 seconds).
const SITE_CACHE_TTL: Duration = Duration::from_secs(30);

/// Maximum cached site entries.
const SITE_CACHE_MAX_CAPACITY: u64 = 10_000;

/// Site directory client with a short-TTL cache in front.
///
/// Negative lookups are cached too, so a burst of events for a bogus site id
/// hits the directory once per TTL.
#[derive(Clone)]
pub struct SiteCache {
    directory: Arc<dyn SiteDirectory>,
    cache: Cache<Uuid, Option<Site>>,
}

impl SiteCache {
    pub fn new(directory: Arc<dyn SiteDirectory>) -> Self {
        Self {
            directory,
            cache: Cache::builder()
                .max_capacity(SITE_CACHE_MAX_CAPACITY)
                .time_to_live(SITE_CACHE_TTL)
                .build(),
        }
    }

    /// Looks up a site, going through the cache.
    pub async fn lookup(&self, site_id: Uuid) -> Option<Site> {
        if let Some(cached) = self.cache.get(&site_id).await {
            debug!(%site_id, "site cache hit");
            return cached;
        }
        let site = self.directory.lookup(site_id);
        self.cache.insert(site_id, site.clone()).await;
        site
    }

    /// Resolves a site that must exist and be active, with the admission
    /// error codes for each failure.
    pub async fn require_active(&self, site_id: Uuid) -> Result<Site> {
        match self.lookup(site_id).await {
            None => Err(Error::unknown_site(site_id)),
            Some(site) if !site.active => Err(Error::inactive_site(site_id)),
            Some(site) => Ok(site),
        }
    }

    /// Resolves a site that must exist. Inactive sites still serve reads.
    pub async fn require_known(&self, site_id: Uuid) -> Result<Site> {
        self.lookup(site_id)
            .await
            .ok_or_else(|| Error::unknown_site(site_id))
    }

    /// Drops a cached entry, for tests that flip a site's state.
    pub async fn invalidate(&self, site_id: Uuid) {
        self.cache.invalidate(&site_id).await;
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Append-only event store (the ingest sink)
    pub store: Arc<EventStore>,
    /// Aggregation pipeline and its read-side stores
    pub pipeline: Arc<Pipeline>,
    /// Site directory with cache
    pub sites: SiteCache,
    /// Per-site rate limiter
    pub rate_limiter: SharedRateLimiter,
}

impl AppState {
    pub fn new(
        store: Arc<EventStore>,
        pipeline: Arc<Pipeline>,
        directory: Arc<dyn SiteDirectory>,
    ) -> Self {
        Self {
            store,
            pipeline,
            sites: SiteCache::new(directory),
            rate_limiter: Arc::new(RateLimiter::new()),
        }
    }

    /// Starts the rate limiter cleanup background task.
    pub fn start_rate_limiter_cleanup(&self) -> tokio::task::JoinHandle<()> {
        let rate_limiter = self.rate_limiter.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(300));
            loop {
                interval.tick().await;
                rate_limiter.cleanup_stale(Duration::from_secs(600));
            }
        })
    }
}
