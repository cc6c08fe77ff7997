//! Rescue Triage Runtime
//!
//! Drives the dashboard: polls a data source on a fixed interval, merges
//! operator state into each snapshot, applies it to the entity store and
//! assembles views for rendering.

pub mod dashboard;
pub mod view;

pub use dashboard::*;
pub use view::*;
