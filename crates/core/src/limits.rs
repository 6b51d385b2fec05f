//! Admission limits for the analytics engine.
//!
//! Limits bound what a single tenant can push through the ingest path so no
//! site's traffic or malformed data can degrade another tenant.
//!
//! The `#[validate]` derive macro requires literal values in attributes, so
//! field limits are duplicated there. Keep both in sync when modifying.

// === String Field Limits (chars) ===

/// Visitor ID max length (pseudonymous browser-generated tokens).
pub const MAX_VISITOR_ID_LEN: usize = 128;

/// Session hint max length (client-proposed correlation token).
pub const MAX_SESSION_HINT_LEN: usize = 128;

/// URL max length. Matches HTTP Referer header limit.
pub const MAX_URL_LEN: usize = 2048;

/// Referrer URL max length.
pub const MAX_REFERRER_LEN: usize = 2048;

/// User agent string max length.
/// Browser UAs: 100-300 typical, 500+ with extensions.
pub const MAX_USER_AGENT_LEN: usize = 512;

/// Page title max length.
pub const MAX_TITLE_LEN: usize = 500;

/// Script error message max length.
pub const MAX_ERROR_MESSAGE_LEN: usize = 1000;

// === Rate Limiting ===

/// Default per-site admission ceiling (events per second) when the site
/// record carries no override.
pub const DEFAULT_SITE_RATE_LIMIT: u32 = 200;

/// Burst multiplier over the sustained rate for the per-site token bucket.
pub const RATE_BURST_MULTIPLIER: u32 = 5;

// === Consumption ===

/// Maximum events a pipeline consumer pulls from the store per pass.
pub const FETCH_BATCH_SIZE: usize = 512;

// === Timestamp Bounds ===

/// Client timestamps further in the future than this are ignored as ordering
/// hints (server timestamps are authoritative either way).
pub const MAX_FUTURE_SKEW_SECS: i64 = 5;
