//! Shared helpers for the integration test suites.

pub mod fixtures;
pub mod setup;
