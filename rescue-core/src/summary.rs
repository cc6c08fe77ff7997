//! Summary figures for the dashboard header and advisory panel

use serde::{Deserialize, Serialize};

use crate::{
    EntityStore, Status, CRITICAL_PER_SCORE_POINT, DEPLOYMENT_THRESHOLD, FIXED_ZONE_POPULATION,
};

/// Recommended response for the current top-ranked entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Advisory {
    ImmediateDeployment,
    Monitor,
}

impl Advisory {
    pub fn for_score(top_score: Option<f64>) -> Self {
        match top_score {
            Some(score) if score > DEPLOYMENT_THRESHOLD => Advisory::ImmediateDeployment,
            _ => Advisory::Monitor,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Advisory::ImmediateDeployment => "Immediate Deployment Recommended",
            Advisory::Monitor => "Monitor Situation",
        }
    }
}

/// Top-ranked entity reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopEntity {
    pub id: String,
    pub score: f64,
}

/// Zone-demo headline figures over unresolved zones
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneSummary {
    pub total_population: u64,
    pub total_critical: u64,
    pub top: Option<TopEntity>,
    pub advisory: Advisory,
}

impl ZoneSummary {
    pub fn from_store(store: &EntityStore) -> Self {
        let active: Vec<_> = store.entities().filter(|e| !e.is_resolved()).collect();

        let total_population = FIXED_ZONE_POPULATION * active.len() as u64;
        let total_critical = active
            .iter()
            .map(|e| critical_estimate(e.score()))
            .sum();

        let top = store.rank_where(|e| !e.is_resolved()).first().map(|e| TopEntity {
            id: e.id().to_string(),
            score: e.score(),
        });
        let advisory = Advisory::for_score(top.as_ref().map(|t| t.score));

        Self {
            total_population,
            total_critical,
            top,
            advisory,
        }
    }
}

/// Estimated critical cases for a zone score; negative scores count as none
pub fn critical_estimate(score: f64) -> u64 {
    (score * CRITICAL_PER_SCORE_POINT).floor().max(0.0) as u64
}

/// Headline counts matching the backend's stats contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total: usize,
    pub critical: usize,
    pub assigned: usize,
}

impl DashboardStats {
    /// Compute from local state; `critical` is the classifier's top level
    pub fn from_store(store: &EntityStore) -> Self {
        let top_level = store.scorer().classifier().top_level();
        let critical = store
            .entities()
            .filter(|e| e.bucket().level == top_level)
            .count();
        let assigned = store
            .entities()
            .filter(|e| matches!(e.status(), Status::Assigned | Status::Rescued))
            .count();

        Self {
            total: store.len(),
            critical,
            assigned,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EntitySnapshot, Position, Snapshot};

    fn zone(id: &str, heart: f64, oxygen: f64) -> EntitySnapshot {
        EntitySnapshot::new(id, Position::new(13.0, 80.1))
            .with_signal("heart_stress", heart)
            .with_signal("oxygen_drop", oxygen)
    }

    #[test]
    fn test_advisory_threshold() {
        assert_eq!(Advisory::for_score(Some(70.5)), Advisory::ImmediateDeployment);
        assert_eq!(Advisory::for_score(Some(70.0)), Advisory::Monitor);
        assert_eq!(Advisory::for_score(None), Advisory::Monitor);
        assert_eq!(Advisory::Monitor.message(), "Monitor Situation");
    }

    #[test]
    fn test_zone_summary() {
        let mut store = EntityStore::default();
        store
            .apply_snapshot(&Snapshot::new(vec![
                zone("Zone 1", 90.0, 80.0),
                zone("Zone 2", 10.0, 20.0),
                zone("Zone 3", 50.0, 50.0),
            ]))
            .unwrap();
        store.resolve("Zone 3").unwrap();

        let summary = ZoneSummary::from_store(&store);
        assert_eq!(summary.total_population, 20_000);
        assert_eq!(summary.total_critical, 1700 + 300);
        assert_eq!(summary.top.as_ref().unwrap().id, "Zone 1");
        assert_eq!(summary.advisory, Advisory::ImmediateDeployment);
    }

    #[test]
    fn test_zone_summary_empty_store() {
        let summary = ZoneSummary::from_store(&EntityStore::default());
        assert_eq!(summary.total_population, 0);
        assert!(summary.top.is_none());
        assert_eq!(summary.advisory, Advisory::Monitor);
    }

    #[test]
    fn test_critical_estimate_floors() {
        assert_eq!(critical_estimate(42.37), 847);
        assert_eq!(critical_estimate(-5.0), 0);
    }
}
