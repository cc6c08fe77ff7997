//! Triage backend API source
//!
//! Polls the backend's victim and cluster endpoints and turns the rows into
//! snapshots. Transport failures and 5xx responses are retried with linear
//! backoff; other failures are returned at once. When a fetch fails the
//! last-known-good snapshot is re-served marked stale.

use chrono::{DateTime, NaiveDateTime};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use async_trait::async_trait;
use rescue_core::{
    Ambulance, Cluster, DashboardStats, EntitySnapshot, Hospital, Position, Snapshot, Status,
};

use crate::{create_client, ApiConfig, DataSource, SourceError};

/// Raw-input names for victim vitals
pub const SEVERITY: &str = "severity";
pub const AGE: &str = "age";
pub const HEART_RATE: &str = "heart_rate";
pub const SPO2: &str = "spo2";
pub const TEMPERATURE: &str = "temperature";

/// One row of `GET /api/victims`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VictimRecord {
    pub id: String,
    pub lat: f64,
    pub lng: f64,
    /// Model triage level 0..3
    #[serde(alias = "severity")]
    pub triage_level: Option<f64>,
    #[serde(default)]
    pub age: Option<f64>,
    #[serde(default, alias = "hr")]
    pub heart_rate: Option<f64>,
    #[serde(default)]
    pub spo2: Option<f64>,
    #[serde(default, alias = "temp")]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub status: Option<Status>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub hospital_assigned: Option<String>,
}

impl VictimRecord {
    /// Convert into an entity snapshot; absent vitals are left out
    pub fn into_entity(self) -> EntitySnapshot {
        let mut entity = EntitySnapshot::new(&self.id, Position::new(self.lat, self.lng));

        let signals = [
            (SEVERITY, self.triage_level),
            (AGE, self.age),
            (HEART_RATE, self.heart_rate),
            (SPO2, self.spo2),
            (TEMPERATURE, self.temperature),
        ];
        for (name, value) in signals {
            if let Some(v) = value {
                entity = entity.with_signal(name, v);
            }
        }

        if let Some(status) = self.status {
            entity = entity.with_status(status);
        }
        if let Some(hospital) = self.hospital_assigned.as_deref() {
            entity = entity.with_hospital(hospital);
        }
        if let Some(raw) = self.timestamp.as_deref() {
            match parse_timestamp(raw) {
                Some(reported_at) => entity = entity.with_reported_at(reported_at),
                None => debug!("Ignoring unparseable timestamp {:?} on {}", raw, self.id),
            }
        }
        entity
    }
}

/// Accepts ISO-8601 with `T` or space separator, with or without an offset
fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|d| d.naive_utc()))
}

/// Build a snapshot from decoded victim and cluster rows
pub fn victims_to_snapshot(victims: Vec<VictimRecord>, clusters: Vec<Cluster>) -> Snapshot {
    let entities = victims.into_iter().map(VictimRecord::into_entity).collect();
    Snapshot::new(entities).with_clusters(clusters)
}

/// Backend API polling source
pub struct ApiSource {
    config: ApiConfig,
    client: Client,
    last_good: Option<Snapshot>,
}

impl ApiSource {
    pub fn new(config: ApiConfig) -> Result<Self, SourceError> {
        let client = create_client(&config)?;
        Ok(Self {
            config,
            client,
            last_good: None,
        })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    async fn try_get<T: DeserializeOwned>(&self, url: &str) -> Result<T, SourceError> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(SourceError::Status {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// GET a JSON endpoint, retrying transport failures
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, SourceError> {
        let url = self.config.endpoint(path);
        let mut last_error = String::new();

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = self.config.retry_backoff_ms * attempt as u64;
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            match self.try_get(&url).await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => {
                    warn!("GET {} failed: {}", url, e);
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        "GET {} failed (attempt {}/{}): {}",
                        url,
                        attempt + 1,
                        self.config.max_retries + 1,
                        e
                    );
                    last_error = e.to_string();
                }
            }
        }

        Err(SourceError::MaxRetries(self.config.max_retries, last_error))
    }

    /// Fetch fresh victims plus clusters and response resources (no stale fallback).
    ///
    /// Only the victim list is required; the other endpoints are optional and
    /// an unavailable one yields an empty list.
    pub async fn fetch_fresh(&self) -> Result<Snapshot, SourceError> {
        let (victims, clusters, ambulances, hospitals) = futures::join!(
            self.get_json::<Vec<VictimRecord>>("/api/victims"),
            self.get_json::<Vec<Cluster>>("/api/clusters"),
            self.get_json::<Vec<Ambulance>>("/api/ambulances"),
            self.get_json::<Vec<Hospital>>("/api/hospitals")
        );

        let victims = victims?;
        let clusters = optional("clusters", clusters);
        let ambulances = optional("ambulances", ambulances);
        let hospitals = optional("hospitals", hospitals);

        debug!(
            "Fetched {} victims, {} clusters, {} ambulances, {} hospitals",
            victims.len(),
            clusters.len(),
            ambulances.len(),
            hospitals.len()
        );
        Ok(victims_to_snapshot(victims, clusters).with_resources(ambulances, hospitals))
    }

    /// Headline counts from `GET /api/stats`
    pub async fn fetch_stats(&self) -> Result<DashboardStats, SourceError> {
        self.get_json("/api/stats").await
    }

    /// Dispatch an ambulance via `POST /api/assign/{id}`
    pub async fn assign(&self, victim_id: &str) -> Result<(), SourceError> {
        let url = self.config.endpoint(&format!("/api/assign/{}", victim_id));
        let response = self.client.post(&url).send().await?;

        if !response.status().is_success() {
            return Err(SourceError::Status {
                status: response.status().as_u16(),
                url,
            });
        }

        info!("Assigned responder to {}", victim_id);
        Ok(())
    }
}

fn optional<T>(what: &str, result: Result<Vec<T>, SourceError>) -> Vec<T> {
    match result {
        Ok(items) => items,
        Err(SourceError::Status { status: 404, .. }) => {
            debug!("Backend does not serve {}", what);
            Vec::new()
        }
        Err(e) => {
            warn!("Fetching {} failed, continuing without them: {}", what, e);
            Vec::new()
        }
    }
}

#[async_trait]
impl DataSource for ApiSource {
    fn name(&self) -> &str {
        "backend-api"
    }

    async fn fetch(&mut self) -> Result<Snapshot, SourceError> {
        match self.fetch_fresh().await {
            Ok(snapshot) => {
                self.last_good = Some(snapshot.clone());
                Ok(snapshot)
            }
            Err(e) => match &self.last_good {
                Some(previous) => {
                    warn!("Serving last-known-good snapshot: {}", e);
                    Ok(previous.clone().into_stale())
                }
                None => Err(e),
            },
        }
    }

    async fn notify_resolved(&mut self, entity_id: &str) -> Result<(), SourceError> {
        self.assign(entity_id).await
    }
}
