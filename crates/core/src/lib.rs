//! Core types, schemas, and validation for the SitePulse analytics engine.

pub mod alerts;
pub mod dedup;
pub mod device;
pub mod error;
pub mod events;
pub mod heatmap;
pub mod limits;
pub mod rollup;
pub mod session;
pub mod shard;
pub mod site;

pub use alerts::*;
pub use dedup::SeqDedup;
pub use device::{classify_user_agent, DeviceClass};
pub use error::{Error, RejectedCode, Result};
pub use events::*;
pub use heatmap::*;
pub use rollup::*;
pub use session::*;
pub use shard::ShardedMap;
pub use site::*;
