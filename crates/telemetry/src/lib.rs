//! Internal telemetry for the SitePulse analytics engine.
//!
//! Metrics are plain in-process atomics, snapshotted to the structured log
//! on an interval; there is no external metrics system to feed.

pub mod health;
pub mod metrics;
pub mod tracing_setup;

pub use health::*;
pub use metrics::*;
pub use tracing_setup::*;
