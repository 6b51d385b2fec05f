//! Streaming aggregation pipeline for the SitePulse engine.
//!
//! Consumers read the event store independently, each at its own cursor:
//! - sessionizer + metrics aggregator (one loop, shared cursor)
//! - heatmap binner
//!
//! The alert evaluator polls committed rollups on its own interval and never
//! touches the ingest path.

pub mod aggregator;
pub mod alerts;
pub mod binner;
pub mod dispatch;
pub mod query;
pub mod scheduler;
pub mod sessionizer;

pub use aggregator::{Aggregator, RollupStore};
pub use alerts::{AlertEvaluator, NotificationStore, RuleStore};
pub use binner::{HeatmapStore, ScrollDistribution};
pub use dispatch::{LogDispatcher, NotificationDispatcher};
pub use query::{AnalyticsSummary, QueryService, RealtimeSelector, RealtimeSnapshot};
pub use scheduler::{Pipeline, PipelineConfig};
pub use sessionizer::Sessionizer;
