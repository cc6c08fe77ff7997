//! Render-ready view of the dashboard state

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;

use rescue_core::{
    nearest_available, zone_counts, Ambulance, BucketCounts, Cluster, DashboardStats, Entity,
    EntityStore, FleetSummary, Hospital, Position, Status, ZoneCount, ZoneSummary,
};

/// One row of the ranked list
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedEntry {
    /// 1-based; 0 when the entity is excluded from ranking
    pub rank: usize,
    pub id: String,
    pub score: f64,
    pub bucket: String,
    pub level: u8,
    pub status: Status,
    pub manual_boost: f64,
    pub position: Position,
    pub hospital_assigned: Option<String>,
    pub reported_at: Option<NaiveDateTime>,
    /// Closest available ambulance, for unresolved entities
    pub nearest_ambulance: Option<String>,
}

impl RankedEntry {
    pub fn new(rank: usize, entity: &Entity) -> Self {
        Self {
            rank,
            id: entity.id().to_string(),
            score: entity.score(),
            bucket: entity.bucket().label.clone(),
            level: entity.bucket().level,
            status: entity.status(),
            manual_boost: entity.manual_boost(),
            position: entity.position(),
            hospital_assigned: entity.hospital_assigned().map(str::to_string),
            reported_at: entity.reported_at(),
            nearest_ambulance: None,
        }
    }

    fn with_nearest(mut self, entity: &Entity, ambulances: &[Ambulance]) -> Self {
        if !entity.is_resolved() {
            self.nearest_ambulance =
                nearest_available(ambulances, entity.position()).map(|a| a.id.clone());
        }
        self
    }
}

/// State a view is built from
pub struct ViewInputs<'a> {
    pub profile: &'a str,
    pub store: &'a EntityStore,
    pub clusters: &'a [Cluster],
    pub ambulances: &'a [Ambulance],
    pub hospitals: &'a [Hospital],
    /// Resolutions not yet confirmed by the source
    pub unconfirmed: Vec<String>,
    pub top_n: usize,
    pub stale: bool,
}

/// Everything the rendering layer needs for one frame
#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub generated_at: DateTime<Utc>,
    pub profile: String,
    pub stale: bool,
    pub top: Vec<RankedEntry>,
    pub buckets: BucketCounts,
    pub zones: Vec<ZoneCount>,
    pub stats: DashboardStats,
    pub summary: ZoneSummary,
    pub fleet: FleetSummary,
    pub priority: Vec<String>,
    pub unconfirmed: Vec<String>,
    pub selected: Option<RankedEntry>,
}

impl DashboardView {
    pub fn build(inputs: ViewInputs<'_>) -> Self {
        let store = inputs.store;
        let ranked = store.rank();

        let top = ranked
            .iter()
            .take(inputs.top_n)
            .enumerate()
            .map(|(i, e)| RankedEntry::new(i + 1, e).with_nearest(e, inputs.ambulances))
            .collect();

        let selected = store.selected().map(|selected| {
            let rank = ranked
                .iter()
                .position(|e| e.id() == selected.id())
                .map(|i| i + 1)
                .unwrap_or(0);
            RankedEntry::new(rank, selected).with_nearest(selected, inputs.ambulances)
        });

        Self {
            generated_at: Utc::now(),
            profile: inputs.profile.to_string(),
            stale: inputs.stale,
            top,
            buckets: store.aggregate_buckets(),
            zones: zone_counts(inputs.clusters),
            stats: DashboardStats::from_store(store),
            summary: ZoneSummary::from_store(store),
            fleet: FleetSummary::new(inputs.ambulances, inputs.hospitals),
            priority: store
                .priority_list()
                .iter()
                .map(|e| e.id().to_string())
                .collect(),
            unconfirmed: inputs.unconfirmed,
            selected,
        }
    }
}
