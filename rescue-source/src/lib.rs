//! Rescue Triage data sources
//!
//! Supplies full-refresh snapshots to the dashboard runtime:
//! - HTTP polling of the triage backend API, with retry and stale fallback
//! - A zone generator whose randomness sits behind an injectable signal source

pub mod client;
pub mod source;
pub mod api;
pub mod generator;

pub use client::*;
pub use source::*;
pub use api::*;
pub use generator::*;
