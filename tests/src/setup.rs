//! Common test setup.

use api::{router, AppState};
use axum::Router;
use event_store::EventStore;
use pipeline::{LogDispatcher, Pipeline, PipelineConfig};
use pulse_core::{InMemorySiteDirectory, Site};
use std::sync::Arc;
use telemetry::health;

/// Test context running the whole engine in-process.
///
/// The real Axum router with all middleware sits in front of the real event
/// store and pipeline; only the background loops are replaced, by draining
/// the pipeline synchronously where a test needs consumed state.
pub struct TestContext {
    pub store: Arc<EventStore>,
    pub pipeline: Arc<Pipeline>,
    pub directory: Arc<InMemorySiteDirectory>,
    pub router: Router,
}

impl TestContext {
    pub fn new() -> Self {
        let store = Arc::new(EventStore::new());
        let directory = Arc::new(InMemorySiteDirectory::new());
        let pipeline = Arc::new(Pipeline::new(
            store.clone(),
            Arc::new(LogDispatcher),
            PipelineConfig::default(),
        ));
        let state = AppState::new(store.clone(), pipeline.clone(), directory.clone());
        let router = router(state);

        health().store.set_healthy();
        health().pipeline.set_healthy();

        Self {
            store,
            pipeline,
            directory,
            router,
        }
    }

    /// Registers an active site and returns it.
    pub fn seed_site(&self) -> Site {
        let site = Site::new("Test Site", "test.example.com");
        self.directory.insert(site.clone());
        site
    }

    /// Registers a site with a custom rate limit.
    pub fn seed_site_with_rate(&self, rate_limit: u32) -> Site {
        let mut site = Site::new("Limited Site", "limited.example.com");
        site.rate_limit = Some(rate_limit);
        self.directory.insert(site.clone());
        site
    }

    /// Consumes the event log to its head, feeding every pipeline consumer.
    pub fn drain(&self) {
        self.pipeline.drain();
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}
