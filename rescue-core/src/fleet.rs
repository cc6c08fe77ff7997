//! Response resources: ambulance units and receiving hospitals

use serde::{Deserialize, Serialize};

use crate::{haversine_m, Position};

/// Availability of a response unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    #[default]
    #[serde(alias = "Available")]
    Available,
    #[serde(alias = "Busy", alias = "dispatched")]
    Busy,
}

/// An ambulance on the map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ambulance {
    pub id: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub status: UnitStatus,
}

impl Ambulance {
    pub fn position(&self) -> Position {
        Position::new(self.lat, self.lng)
    }

    pub fn is_available(&self) -> bool {
        self.status == UnitStatus::Available
    }
}

/// A receiving hospital and its bed capacity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hospital {
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub total_beds: u32,
    #[serde(default)]
    pub available_beds: u32,
    #[serde(default)]
    pub specialty: Option<String>,
}

impl Hospital {
    pub fn position(&self) -> Position {
        Position::new(self.lat, self.lng)
    }

    pub fn has_capacity(&self) -> bool {
        self.available_beds > 0
    }

    /// Fraction of beds in use; 0 when the hospital reports no beds
    pub fn occupancy(&self) -> f64 {
        if self.total_beds == 0 {
            return 0.0;
        }
        let used = self.total_beds.saturating_sub(self.available_beds);
        used as f64 / self.total_beds as f64
    }
}

/// Unit and bed availability for the dashboard header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FleetSummary {
    pub ambulances: usize,
    pub available: usize,
    pub busy: usize,
    pub hospitals: usize,
    pub beds_available: u32,
}

impl FleetSummary {
    pub fn new(ambulances: &[Ambulance], hospitals: &[Hospital]) -> Self {
        let available = ambulances.iter().filter(|a| a.is_available()).count();
        Self {
            ambulances: ambulances.len(),
            available,
            busy: ambulances.len() - available,
            hospitals: hospitals.len(),
            beds_available: hospitals.iter().map(|h| h.available_beds).sum(),
        }
    }
}

/// Closest available ambulance to `target`; ties go to the smaller id
pub fn nearest_available(ambulances: &[Ambulance], target: Position) -> Option<&Ambulance> {
    ambulances
        .iter()
        .filter(|a| a.is_available())
        .map(|a| (haversine_m(a.position(), target), a))
        .min_by(|(da, a), (db, b)| da.total_cmp(db).then_with(|| a.id.cmp(&b.id)))
        .map(|(_, a)| a)
}

/// Closest hospital with at least one free bed
pub fn nearest_with_beds(hospitals: &[Hospital], target: Position) -> Option<&Hospital> {
    hospitals
        .iter()
        .filter(|h| h.has_capacity())
        .map(|h| (haversine_m(h.position(), target), h))
        .min_by(|(da, a), (db, b)| da.total_cmp(db).then_with(|| a.name.cmp(&b.name)))
        .map(|(_, h)| h)
}
