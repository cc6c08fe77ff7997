//! Rescue Triage Core - scoring and ranking primitives for disaster response
//!
//! This crate provides the foundational primitives:
//! - Entity model (victims, zones) and full-refresh snapshots
//! - Weighted danger scoring with operator boosts
//! - Severity classification (threshold bands or upstream pass-through)
//! - An id-keyed entity store with ranking, bucket counts and operator actions
//! - Cluster geometry, response resources and dashboard summaries
//! - TOML profiles bundling all of the above

pub mod error;
pub mod entity;
pub mod scoring;
pub mod classify;
pub mod ranking;
pub mod store;
pub mod cluster;
pub mod fleet;
pub mod summary;
pub mod profile;

pub use error::*;
pub use entity::*;
pub use scoring::*;
pub use classify::*;
pub use ranking::*;
pub use store::*;
pub use cluster::*;
pub use fleet::*;
pub use summary::*;
pub use profile::*;

/// Number of ranked entities shown by default
pub const DEFAULT_TOP_N: usize = 5;

/// Boost applied per "increase priority" action
pub const DEFAULT_BOOST_STEP: f64 = 20.0;

/// Tolerance when checking that weights sum to 1.0
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Population attributed to each zone in the zone demo
pub const FIXED_ZONE_POPULATION: u64 = 10_000;

/// Critical-case estimate per score point in the zone demo
pub const CRITICAL_PER_SCORE_POINT: f64 = 20.0;

/// Top score above which immediate deployment is advised
pub const DEPLOYMENT_THRESHOLD: f64 = 70.0;

/// Fallback cluster radius per victim, in metres
pub const RADIUS_PER_VICTIM_M: f64 = 50.0;
