//! Severity clusters reported by the backend's hotspot detection

use serde::{Deserialize, Serialize};

use crate::{Entity, Position, RADIUS_PER_VICTIM_M};

/// Mean Earth radius in metres
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A group of nearby victims
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: i64,
    pub lat: f64,
    pub lng: f64,
    #[serde(alias = "victim_count")]
    pub count: usize,
    #[serde(default)]
    pub avg_severity: f64,
    /// Reach in metres; older backends omit it
    #[serde(default)]
    pub radius: Option<f64>,
}

impl Cluster {
    pub fn center(&self) -> Position {
        Position::new(self.lat, self.lng)
    }

    /// Radius to draw: the backend's value when usable, else derived from size
    pub fn display_radius(&self) -> f64 {
        match self.radius {
            Some(r) if r.is_finite() && r > 0.0 => r,
            _ => self.count as f64 * RADIUS_PER_VICTIM_M,
        }
    }

    /// Clusters whose mean severity exceeds level 2 are drawn as critical
    pub fn is_critical(&self) -> bool {
        self.avg_severity > 2.0
    }

    pub fn label(&self) -> String {
        format!("Z{}", self.id)
    }

    pub fn contains(&self, position: Position) -> bool {
        haversine_m(self.center(), position) <= self.display_radius()
    }
}

/// Great-circle distance between two positions, in metres
pub fn haversine_m(a: Position, b: Position) -> f64 {
    let (lat1, lng1) = (a.lat.to_radians(), a.lng.to_radians());
    let (lat2, lng2) = (b.lat.to_radians(), b.lng.to_radians());
    let dlat = lat2 - lat1;
    let dlng = lng2 - lng1;

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Bar-chart entry: victims per cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneCount {
    pub name: String,
    pub count: usize,
}

/// Victims-per-cluster series in cluster id order
pub fn zone_counts(clusters: &[Cluster]) -> Vec<ZoneCount> {
    let mut sorted: Vec<&Cluster> = clusters.iter().collect();
    sorted.sort_by_key(|c| c.id);
    sorted
        .into_iter()
        .map(|c| ZoneCount {
            name: c.label(),
            count: c.count,
        })
        .collect()
}

/// Count, per cluster, the given entities lying within its display radius
pub fn cluster_membership<'a, I>(entities: I, clusters: &[Cluster]) -> Vec<ZoneCount>
where
    I: IntoIterator<Item = &'a Entity>,
{
    let mut counts: Vec<ZoneCount> = zone_counts(clusters)
        .into_iter()
        .map(|z| ZoneCount { count: 0, ..z })
        .collect();

    let mut sorted: Vec<&Cluster> = clusters.iter().collect();
    sorted.sort_by_key(|c| c.id);

    for entity in entities {
        for (cluster, slot) in sorted.iter().zip(counts.iter_mut()) {
            if cluster.contains(entity.position()) {
                slot.count += 1;
            }
        }
    }

    counts
}
