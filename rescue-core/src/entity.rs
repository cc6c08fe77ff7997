//! Entities subject to triage scoring
//!
//! An entity is either a victim reported by the backend or a zone produced
//! by the generator. Data sources deliver them as [`EntitySnapshot`]s inside
//! a [`Snapshot`]; the store turns each snapshot into an [`Entity`] carrying
//! its derived score and bucket.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{Ambulance, Bucket, Cluster, Hospital};

/// Stable entity identifier
pub type EntityId = String;

/// Named numeric signals (vitals, stress indicators, upstream severity)
pub type RawInputs = BTreeMap<String, f64>;

/// Geographic position in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lng: f64,
}

impl Position {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Operator-controlled lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Awaiting response
    #[default]
    #[serde(alias = "unassigned", alias = "Active")]
    Active,
    /// A responder has been dispatched
    #[serde(alias = "Assigned")]
    Assigned,
    /// Rescue completed
    #[serde(alias = "Rescued")]
    Rescued,
}

impl Status {
    /// Assigned and rescued entities are considered resolved
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Status::Active)
    }
}

/// One entity as delivered by a data source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub id: EntityId,
    pub position: Position,
    #[serde(default)]
    pub raw_inputs: RawInputs,
    /// Left unset when the source does not track operator boosts
    #[serde(default)]
    pub manual_boost: Option<f64>,
    #[serde(default)]
    pub status: Option<Status>,
    /// Receiving hospital chosen upstream
    #[serde(default)]
    pub hospital_assigned: Option<String>,
    /// When the source first reported the entity
    #[serde(default)]
    pub reported_at: Option<NaiveDateTime>,
}

impl EntitySnapshot {
    pub fn new(id: &str, position: Position) -> Self {
        Self {
            id: id.to_string(),
            position,
            raw_inputs: RawInputs::new(),
            manual_boost: None,
            status: None,
            hospital_assigned: None,
            reported_at: None,
        }
    }

    pub fn with_signal(mut self, name: &str, value: f64) -> Self {
        self.raw_inputs.insert(name.to_string(), value);
        self
    }

    pub fn with_boost(mut self, boost: f64) -> Self {
        self.manual_boost = Some(boost);
        self
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_hospital(mut self, hospital: &str) -> Self {
        self.hospital_assigned = Some(hospital.to_string());
        self
    }

    pub fn with_reported_at(mut self, reported_at: NaiveDateTime) -> Self {
        self.reported_at = Some(reported_at);
        self
    }
}

/// One full refresh cycle of data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub entities: Vec<EntitySnapshot>,
    #[serde(default)]
    pub clusters: Vec<Cluster>,
    #[serde(default)]
    pub ambulances: Vec<Ambulance>,
    #[serde(default)]
    pub hospitals: Vec<Hospital>,
    #[serde(default = "Utc::now")]
    pub received_at: DateTime<Utc>,
    /// Set when a source re-serves its last-known-good data
    #[serde(default)]
    pub stale: bool,
}

impl Snapshot {
    pub fn new(entities: Vec<EntitySnapshot>) -> Self {
        Self {
            entities,
            clusters: Vec::new(),
            ambulances: Vec::new(),
            hospitals: Vec::new(),
            received_at: Utc::now(),
            stale: false,
        }
    }

    pub fn with_clusters(mut self, clusters: Vec<Cluster>) -> Self {
        self.clusters = clusters;
        self
    }

    pub fn with_resources(mut self, ambulances: Vec<Ambulance>, hospitals: Vec<Hospital>) -> Self {
        self.ambulances = ambulances;
        self.hospitals = hospitals;
        self
    }

    /// Mark this snapshot as re-served data
    pub fn into_stale(mut self) -> Self {
        self.stale = true;
        self
    }
}

/// A scored entity held by the store
///
/// `score` and `bucket` are only written by the store's recomputation path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    id: EntityId,
    position: Position,
    raw_inputs: RawInputs,
    manual_boost: f64,
    status: Status,
    score: f64,
    bucket: Bucket,
    hospital_assigned: Option<String>,
    reported_at: Option<NaiveDateTime>,
}

impl Entity {
    pub(crate) fn new(
        id: EntityId,
        position: Position,
        raw_inputs: RawInputs,
        manual_boost: f64,
        status: Status,
        score: f64,
        bucket: Bucket,
    ) -> Self {
        Self {
            id,
            position,
            raw_inputs,
            manual_boost,
            status,
            score,
            bucket,
            hospital_assigned: None,
            reported_at: None,
        }
    }

    /// Attach the upstream dispatch details
    pub(crate) fn with_dispatch(
        mut self,
        hospital_assigned: Option<String>,
        reported_at: Option<NaiveDateTime>,
    ) -> Self {
        self.hospital_assigned = hospital_assigned;
        self.reported_at = reported_at;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn raw_inputs(&self) -> &RawInputs {
        &self.raw_inputs
    }

    pub fn signal(&self, name: &str) -> Option<f64> {
        self.raw_inputs.get(name).copied()
    }

    pub fn manual_boost(&self) -> f64 {
        self.manual_boost
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn bucket(&self) -> &Bucket {
        &self.bucket
    }

    pub fn is_resolved(&self) -> bool {
        self.status.is_resolved()
    }

    pub fn hospital_assigned(&self) -> Option<&str> {
        self.hospital_assigned.as_deref()
    }

    pub fn reported_at(&self) -> Option<NaiveDateTime> {
        self.reported_at
    }

    pub(crate) fn set_manual_boost(&mut self, boost: f64) {
        self.manual_boost = boost;
    }

    pub(crate) fn set_status(&mut self, status: Status) {
        self.status = status;
    }

    pub(crate) fn set_derived(&mut self, score: f64, bucket: Bucket) {
        self.score = score;
        self.bucket = bucket;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_accepts_source_vocabularies() {
        let unassigned: Status = serde_json::from_str("\"unassigned\"").unwrap();
        let rescued: Status = serde_json::from_str("\"Rescued\"").unwrap();
        let assigned: Status = serde_json::from_str("\"assigned\"").unwrap();

        assert_eq!(unassigned, Status::Active);
        assert_eq!(rescued, Status::Rescued);
        assert_eq!(assigned, Status::Assigned);
        assert!(!unassigned.is_resolved());
        assert!(rescued.is_resolved());
    }

    #[test]
    fn test_snapshot_builder() {
        let snapshot = EntitySnapshot::new("V-101", Position::new(34.0522, -118.2437))
            .with_signal("severity", 3.0)
            .with_boost(10.0);

        assert_eq!(snapshot.raw_inputs.get("severity"), Some(&3.0));
        assert_eq!(snapshot.manual_boost, Some(10.0));
        assert_eq!(snapshot.status, None);
    }

    #[test]
    fn test_entity_snapshot_defaults_when_deserialized() {
        let json = r#"{"id":"Z1","position":{"lat":13.0,"lng":80.2}}"#;
        let snapshot: EntitySnapshot = serde_json::from_str(json).unwrap();
        assert!(snapshot.raw_inputs.is_empty());
        assert!(snapshot.manual_boost.is_none());
        assert!(snapshot.hospital_assigned.is_none());
    }

    #[test]
    fn test_recorded_snapshot_without_timestamp() {
        let json = r#"{
            "entities": [{"id": "V-1", "position": {"lat": 13.08, "lng": 80.27},
                          "raw_inputs": {"severity": 2}, "hospital_assigned": "SIMS Hospital, Vadapalani",
                          "reported_at": "2024-01-01T10:00:00"}],
            "ambulances": [{"id": "AMB-01", "lat": 13.05, "lng": 80.24, "status": "busy"}]
        }"#;
        let snapshot: Snapshot = serde_json::from_str(json).unwrap();
        let entity = &snapshot.entities[0];

        assert!(!snapshot.stale);
        assert!(snapshot.hospitals.is_empty());
        assert_eq!(snapshot.ambulances.len(), 1);
        assert_eq!(entity.hospital_assigned.as_deref(), Some("SIMS Hospital, Vadapalani"));
        assert_eq!(entity.reported_at.unwrap().to_string(), "2024-01-01 10:00:00");
    }
}
