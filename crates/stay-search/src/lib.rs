//! Availability-aware unit search with dynamic per-night pricing.
//!
//! The [`search`] module holds the engine; [`config`], [`telemetry`] and [`error`] carry the
//! service plumbing shared with the HTTP binary.

pub mod config;
pub mod error;
pub mod search;
pub mod telemetry;
