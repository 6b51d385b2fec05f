//! Tenant site types.
//!
//! Site registration and CRUD belong to the registration collaborator; the
//! engine only reads sites through [`SiteDirectory`] and never mutates them.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;
use validator::Validate;

use crate::limits::DEFAULT_SITE_RATE_LIMIT;

/// A tenant site in the system.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Site {
    /// Unique site ID
    pub id: Uuid,
    /// Display name
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    /// Registered domain
    #[validate(length(min = 1, max = 256))]
    pub domain: String,
    /// Whether the site is active; inactive sites reject ingest
    pub active: bool,
    /// Admission ceiling override (events per second)
    pub rate_limit: Option<u32>,
}

impl Site {
    /// Creates a new active site with default settings.
    pub fn new(name: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            domain: domain.into(),
            active: true,
            rate_limit: None,
        }
    }

    /// Returns the effective admission rate ceiling for this site.
    pub fn effective_rate_limit(&self) -> u32 {
        self.rate_limit.unwrap_or(DEFAULT_SITE_RATE_LIMIT)
    }
}

/// Read-only lookup of tenant sites, owned by the registration collaborator.
pub trait SiteDirectory: Send + Sync {
    /// Resolves a site by id. `None` for unknown sites.
    fn lookup(&self, site_id: Uuid) -> Option<Site>;
}

/// In-memory site directory, seeded from configuration.
#[derive(Default)]
pub struct InMemorySiteDirectory {
    sites: RwLock<HashMap<Uuid, Site>>,
}

impl InMemorySiteDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or replaces a site.
    pub fn insert(&self, site: Site) {
        self.sites.write().insert(site.id, site);
    }

    /// Marks a site inactive; subsequent ingest for it is rejected.
    pub fn deactivate(&self, site_id: Uuid) {
        if let Some(site) = self.sites.write().get_mut(&site_id) {
            site.active = false;
        }
    }

    pub fn len(&self) -> usize {
        self.sites.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.read().is_empty()
    }
}

impl SiteDirectory for InMemorySiteDirectory {
    fn lookup(&self, site_id: Uuid) -> Option<Site> {
        self.sites.read().get(&site_id).cloned()
    }
}
