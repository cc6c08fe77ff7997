//! Dashboard Coordinator
//!
//! Owns the entity store and drives it from a data source:
//! - A fixed interval triggers a full refresh (fetch, merge, apply)
//! - Each refresh overwrites the previous one's derived state
//! - A failed refresh leaves the last applied state in place
//! - Operator actions go straight to the store between refreshes
//! - Resolutions the source has not accepted are held and re-sent

use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use chrono::{DateTime, Utc};
use rescue_core::{
    Ambulance, Cluster, EntityId, EntityStore, Hospital, Profile, Snapshot, Status, StoreStats,
    TriageError,
};
use rescue_source::{DataSource, SourceError};

use crate::{DashboardView, ViewInputs};

/// Errors from the dashboard runtime
#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Triage error: {0}")]
    Triage(#[from] TriageError),
}

/// Dashboard configuration
pub struct DashboardConfig {
    /// Snapshot supplier
    pub source: Box<dyn DataSource>,
    /// Scoring profile
    pub profile: Profile,
    /// Refresh interval in milliseconds
    pub refresh_interval_ms: u64,
    /// Maximum runtime in seconds (0 = unlimited)
    pub max_runtime_secs: u64,
    /// Maximum refresh cycles (0 = unlimited)
    pub max_cycles: u64,
}

/// The dashboard coordinator
pub struct Dashboard {
    source: Box<dyn DataSource>,
    profile: Profile,
    store: EntityStore,
    clusters: Vec<Cluster>,
    ambulances: Vec<Ambulance>,
    hospitals: Vec<Hospital>,
    /// Local resolutions the source has not yet confirmed
    pending: BTreeMap<EntityId, Status>,
    refresh_interval_ms: u64,
    max_runtime_secs: u64,
    max_cycles: u64,
    stale: bool,
    last_refresh: Option<DateTime<Utc>>,
    cycles: u64,
    failures: u64,
}

/// Outcome of one successful refresh
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshOutcome {
    pub entity_count: usize,
    pub cluster_count: usize,
    pub stale: bool,
}

/// Totals reported when `run` stops
#[derive(Debug, Clone)]
pub struct DashboardReport {
    pub cycles: u64,
    pub failures: u64,
    pub stats: StoreStats,
    pub view: DashboardView,
}

/// Fill operator state the snapshot leaves unset from the current store.
///
/// Snapshots are authoritative for what they carry; this only preserves
/// manual boosts and statuses for ids the store already knows.
pub fn merge_operator_state(store: &EntityStore, snapshot: &mut Snapshot) {
    for incoming in &mut snapshot.entities {
        if let Some(existing) = store.get(&incoming.id) {
            if incoming.manual_boost.is_none() {
                incoming.manual_boost = Some(existing.manual_boost());
            }
            if incoming.status.is_none() {
                incoming.status = Some(existing.status());
            }
        }
    }
}

impl Dashboard {
    /// Create a new dashboard with configuration
    pub fn new(config: DashboardConfig) -> Result<Self, DashboardError> {
        let store = config.profile.store()?;

        info!(
            "Dashboard using profile '{}' with source '{}'",
            config.profile.name(),
            config.source.name()
        );

        Ok(Self {
            source: config.source,
            profile: config.profile,
            store,
            clusters: Vec::new(),
            ambulances: Vec::new(),
            hospitals: Vec::new(),
            pending: BTreeMap::new(),
            refresh_interval_ms: config.refresh_interval_ms,
            max_runtime_secs: config.max_runtime_secs,
            max_cycles: config.max_cycles,
            stale: false,
            last_refresh: None,
            cycles: 0,
            failures: 0,
        })
    }

    /// Fetch a snapshot, merge operator state and apply it.
    ///
    /// Held resolutions override the source's status until the source reports
    /// the entity resolved itself; after a successful apply they are re-sent.
    pub async fn refresh_once(&mut self) -> Result<RefreshOutcome, DashboardError> {
        self.cycles += 1;

        let mut snapshot = match self.source.fetch().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.failures += 1;
                return Err(e.into());
            }
        };

        let pending = self.hold_pending(&mut snapshot);
        merge_operator_state(&self.store, &mut snapshot);

        let applied = match self.store.apply_snapshot(&snapshot) {
            Ok(applied) => applied,
            Err(e) => {
                self.failures += 1;
                return Err(e.into());
            }
        };

        self.pending = pending;
        self.clusters = snapshot.clusters;
        self.ambulances = snapshot.ambulances;
        self.hospitals = snapshot.hospitals;
        self.stale = snapshot.stale;
        self.last_refresh = Some(snapshot.received_at);

        if self.stale {
            warn!("Refresh {} applied stale data", self.cycles);
        } else {
            self.resend_pending().await;
        }

        Ok(RefreshOutcome {
            entity_count: applied.entity_count,
            cluster_count: self.clusters.len(),
            stale: applied.stale,
        })
    }

    /// Force held statuses into `snapshot`; returns the set still unconfirmed.
    ///
    /// Ids the snapshot reports resolved, or no longer carries, are released.
    fn hold_pending(&self, snapshot: &mut Snapshot) -> BTreeMap<EntityId, Status> {
        let mut still_pending = BTreeMap::new();
        if self.pending.is_empty() {
            return still_pending;
        }

        for incoming in &mut snapshot.entities {
            let Some(status) = self.pending.get(&incoming.id) else {
                continue;
            };
            match incoming.status {
                Some(reported) if reported.is_resolved() => {
                    debug!("Source confirmed resolution of {}", incoming.id);
                }
                _ => {
                    incoming.status = Some(*status);
                    still_pending.insert(incoming.id.clone(), *status);
                }
            }
        }
        still_pending
    }

    async fn resend_pending(&mut self) {
        let ids: Vec<EntityId> = self.pending.keys().cloned().collect();
        for id in ids {
            match self.source.notify_resolved(&id).await {
                Ok(()) => {
                    info!("Source accepted resolution of {} on retry", id);
                    self.pending.remove(&id);
                }
                Err(e) => warn!("Resolution of {} still not accepted: {}", id, e),
            }
        }
    }

    /// Run until `max_cycles` or `max_runtime_secs`, calling `on_cycle` after each refresh
    pub async fn run_with<F>(&mut self, mut on_cycle: F) -> Result<DashboardReport, DashboardError>
    where
        F: FnMut(&Dashboard),
    {
        let mut ticker = interval(Duration::from_millis(self.refresh_interval_ms.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let start = Instant::now();
        let max_runtime = if self.max_runtime_secs > 0 {
            Duration::from_secs(self.max_runtime_secs)
        } else {
            Duration::MAX
        };
        let first_cycle = self.cycles;

        info!("Dashboard refreshing every {}ms", self.refresh_interval_ms);

        loop {
            ticker.tick().await;

            if start.elapsed() >= max_runtime {
                warn!("Dashboard reached maximum runtime");
                break;
            }

            match self.refresh_once().await {
                Ok(outcome) => {
                    debug!(
                        "Refresh {}: {} entities, {} clusters",
                        self.cycles, outcome.entity_count, outcome.cluster_count
                    );
                }
                Err(DashboardError::Source(e)) => {
                    warn!("Refresh {} failed, keeping previous state: {}", self.cycles, e);
                }
                Err(e) => {
                    error!("Refresh {} rejected, keeping previous state: {}", self.cycles, e);
                }
            }

            on_cycle(self);

            if self.max_cycles > 0 && self.cycles - first_cycle >= self.max_cycles {
                info!("Dashboard completed {} cycles", self.max_cycles);
                break;
            }
        }

        Ok(DashboardReport {
            cycles: self.cycles,
            failures: self.failures,
            stats: self.store.stats(),
            view: self.view(),
        })
    }

    /// Run without a per-cycle callback
    pub async fn run(&mut self) -> Result<DashboardReport, DashboardError> {
        self.run_with(|_| {}).await
    }

    /// Apply the profile's boost step to an entity
    pub fn boost(&mut self, id: &str) -> Result<f64, DashboardError> {
        let step = self.profile.display.boost_step;
        self.boost_by(id, step)
    }

    pub fn boost_by(&mut self, id: &str, delta: f64) -> Result<f64, DashboardError> {
        let score = self.store.boost(id, delta)?;
        info!("Operator boosted {} (score now {:.1})", id, score);
        Ok(score)
    }

    /// Resolve an entity locally and report it to the source.
    ///
    /// The local status change stands even if the source rejects the report:
    /// the id is held resolved across refreshes and re-sent each cycle until
    /// the source accepts it or reports it resolved.
    pub async fn resolve(&mut self, id: &str) -> Result<Status, DashboardError> {
        let status = self.store.resolve(id)?;
        info!("Operator resolved {} as {:?}", id, status);

        match self.source.notify_resolved(id).await {
            Ok(()) => {
                self.pending.remove(id);
            }
            Err(e) => {
                warn!("Source did not accept resolution of {}, holding it: {}", id, e);
                self.pending.insert(id.to_string(), status);
            }
        }
        Ok(status)
    }

    /// Ids resolved locally that the source has not confirmed
    pub fn pending_resolutions(&self) -> impl Iterator<Item = &str> {
        self.pending.keys().map(|id| id.as_str())
    }

    pub fn select(&mut self, id: &str) -> Result<(), DashboardError> {
        self.store.select(id)?;
        Ok(())
    }

    pub fn clear_selection(&mut self) {
        self.store.clear_selection();
    }

    pub fn move_up(&mut self, id: &str) -> Result<(), DashboardError> {
        Ok(self.store.move_up(id)?)
    }

    pub fn move_down(&mut self, id: &str) -> Result<(), DashboardError> {
        Ok(self.store.move_down(id)?)
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    pub fn ambulances(&self) -> &[Ambulance] {
        &self.ambulances
    }

    pub fn hospitals(&self) -> &[Hospital] {
        &self.hospitals
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
        self.last_refresh
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Current render-ready view
    pub fn view(&self) -> DashboardView {
        DashboardView::build(ViewInputs {
            profile: self.profile.name(),
            store: &self.store,
            clusters: &self.clusters,
            ambulances: &self.ambulances,
            hospitals: &self.hospitals,
            unconfirmed: self.pending_resolutions().map(str::to_string).collect(),
            top_n: self.profile.display.top_n,
            stale: self.stale,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rescue_core::{Cluster, EntitySnapshot, Position, HEART_STRESS, OXYGEN_DROP};
    use rescue_source::{StaticSource, ZoneGenerator};
    use std::collections::{BTreeSet, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn zone(id: &str, heart: f64, oxygen: f64) -> EntitySnapshot {
        EntitySnapshot::new(id, Position::new(13.0, 80.15))
            .with_signal(HEART_STRESS, heart)
            .with_signal(OXYGEN_DROP, oxygen)
    }

    /// Replays queued results, then fails
    struct ScriptedSource {
        script: VecDeque<Result<Snapshot, SourceError>>,
        resolved: Vec<String>,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<Snapshot, SourceError>>) -> Self {
            Self {
                script: script.into(),
                resolved: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl DataSource for ScriptedSource {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn fetch(&mut self) -> Result<Snapshot, SourceError> {
            self.script
                .pop_front()
                .unwrap_or_else(|| Err(SourceError::MaxRetries(0, "script exhausted".to_string())))
        }

        async fn notify_resolved(&mut self, entity_id: &str) -> Result<(), SourceError> {
            self.resolved.push(entity_id.to_string());
            Ok(())
        }
    }

    /// Backend stand-in: every row carries a status, `Active` until an
    /// assignment for that id has been accepted. The first `rejections`
    /// assignment calls fail.
    struct FlakyBackend {
        victims: Vec<(&'static str, f64)>,
        accepted: BTreeSet<String>,
        rejections: usize,
        attempts: Arc<AtomicUsize>,
    }

    impl FlakyBackend {
        fn new(rejections: usize) -> (Self, Arc<AtomicUsize>) {
            let attempts = Arc::new(AtomicUsize::new(0));
            let backend = Self {
                victims: vec![("V-1", 3.0), ("V-2", 1.0)],
                accepted: BTreeSet::new(),
                rejections,
                attempts: attempts.clone(),
            };
            (backend, attempts)
        }
    }

    #[async_trait]
    impl DataSource for FlakyBackend {
        fn name(&self) -> &str {
            "flaky-backend"
        }

        async fn fetch(&mut self) -> Result<Snapshot, SourceError> {
            let entities = self
                .victims
                .iter()
                .map(|(id, severity)| {
                    let status = if self.accepted.contains(*id) {
                        Status::Assigned
                    } else {
                        Status::Active
                    };
                    EntitySnapshot::new(id, Position::new(13.08, 80.27))
                        .with_signal("severity", *severity)
                        .with_status(status)
                })
                .collect();
            Ok(Snapshot::new(entities))
        }

        async fn notify_resolved(&mut self, entity_id: &str) -> Result<(), SourceError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= self.rejections {
                return Err(SourceError::Status {
                    status: 503,
                    url: format!("/api/assign/{}", entity_id),
                });
            }
            self.accepted.insert(entity_id.to_string());
            Ok(())
        }
    }

    fn dashboard_with(profile: &str, source: Box<dyn DataSource>) -> Dashboard {
        Dashboard::new(DashboardConfig {
            source,
            profile: Profile::embedded(profile).unwrap(),
            refresh_interval_ms: 10,
            max_runtime_secs: 0,
            max_cycles: 0,
        })
        .unwrap()
    }

    fn dashboard(source: Box<dyn DataSource>) -> Dashboard {
        Dashboard::new(DashboardConfig {
            source,
            profile: Profile::embedded("zones").unwrap(),
            refresh_interval_ms: 10,
            max_runtime_secs: 0,
            max_cycles: 0,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_refresh_applies_snapshot() {
        let snapshot = Snapshot::new(vec![zone("Zone 1", 90.0, 70.0), zone("Zone 2", 10.0, 30.0)]);
        let mut dash = dashboard(Box::new(StaticSource::new("fixture", snapshot)));

        let outcome = dash.refresh_once().await.unwrap();
        assert_eq!(outcome.entity_count, 2);
        assert!(!outcome.stale);

        let view = dash.view();
        assert_eq!(view.top[0].id, "Zone 1");
        assert_eq!(view.top[0].bucket, "critical");
        assert_eq!(view.buckets.total(), 2);
    }

    #[tokio::test]
    async fn test_boost_survives_refresh() {
        let snapshot = Snapshot::new(vec![zone("Zone 1", 60.0, 60.0), zone("Zone 2", 20.0, 20.0)]);
        let mut dash = dashboard(Box::new(StaticSource::new("fixture", snapshot)));
        dash.refresh_once().await.unwrap();

        let score = dash.boost("Zone 2").unwrap();
        assert_eq!(score, 40.0);
        dash.boost("Zone 2").unwrap();
        dash.boost("Zone 2").unwrap();

        dash.refresh_once().await.unwrap();
        let entity = dash.store().get("Zone 2").unwrap();
        assert_eq!(entity.manual_boost(), 60.0);
        assert_eq!(entity.score(), 80.0);
        assert_eq!(dash.view().top[0].id, "Zone 2");
        assert_eq!(dash.view().priority, vec!["Zone 2".to_string()]);
    }

    #[tokio::test]
    async fn test_resolution_survives_refresh_and_is_reported() {
        let snapshot = Snapshot::new(vec![zone("Zone 1", 90.0, 90.0), zone("Zone 2", 10.0, 10.0)]);
        let mut dash = dashboard(Box::new(ScriptedSource::new(vec![
            Ok(snapshot.clone()),
            Ok(snapshot),
        ])));
        dash.refresh_once().await.unwrap();

        assert_eq!(dash.resolve("Zone 1").await.unwrap(), Status::Rescued);
        dash.refresh_once().await.unwrap();

        let view = dash.view();
        assert_eq!(view.top.len(), 1);
        assert_eq!(view.top[0].id, "Zone 2");
        assert_eq!(view.buckets.total(), 2);
        assert_eq!(view.stats.assigned, 1);
    }

    #[tokio::test]
    async fn test_rejected_resolution_held_across_refresh() {
        let (backend, attempts) = FlakyBackend::new(usize::MAX);
        let mut dash = dashboard_with("dashboard", Box::new(backend));
        dash.refresh_once().await.unwrap();

        assert_eq!(dash.resolve("V-1").await.unwrap(), Status::Assigned);
        assert_eq!(dash.pending_resolutions().collect::<Vec<_>>(), vec!["V-1"]);

        dash.refresh_once().await.unwrap();

        assert_eq!(dash.store().get("V-1").unwrap().status(), Status::Assigned);
        let view = dash.view();
        assert_eq!(view.top.len(), 1);
        assert_eq!(view.top[0].id, "V-2");
        assert_eq!(view.unconfirmed, vec!["V-1".to_string()]);
        // one call from resolve, one re-send after the refresh
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_rejected_resolution_resent_until_accepted() {
        let (backend, attempts) = FlakyBackend::new(1);
        let mut dash = dashboard_with("dashboard", Box::new(backend));
        dash.refresh_once().await.unwrap();

        dash.resolve("V-1").await.unwrap();
        dash.refresh_once().await.unwrap();
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(dash.pending_resolutions().count(), 0);

        // the backend now reports the assignment itself
        dash.refresh_once().await.unwrap();
        assert_eq!(dash.store().get("V-1").unwrap().status(), Status::Assigned);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert!(dash.view().unconfirmed.is_empty());
    }

    #[tokio::test]
    async fn test_recorded_snapshot_replayed() {
        let json = r#"{
            "entities": [
                {"id": "V-101", "position": {"lat": 13.0827, "lng": 80.2707},
                 "raw_inputs": {"severity": 3}, "status": "unassigned",
                 "hospital_assigned": "Stanley Medical College Hospital"},
                {"id": "V-103", "position": {"lat": 13.0502, "lng": 80.2417},
                 "raw_inputs": {"severity": 0}}
            ],
            "ambulances": [
                {"id": "AMB-01", "lat": 13.08, "lng": 80.27, "status": "available"},
                {"id": "AMB-02", "lat": 13.05, "lng": 80.24, "status": "busy"}
            ],
            "hospitals": [
                {"name": "Stanley Medical College Hospital", "lat": 13.1054, "lng": 80.2872,
                 "total_beds": 400, "available_beds": 100}
            ]
        }"#;
        let snapshot: Snapshot = serde_json::from_str(json).unwrap();
        let mut dash =
            dashboard_with("dashboard", Box::new(StaticSource::new("replay", snapshot)));
        dash.refresh_once().await.unwrap();

        let view = dash.view();
        assert_eq!(view.top[0].id, "V-101");
        assert_eq!(view.top[0].bucket, "critical");
        assert_eq!(
            view.top[0].hospital_assigned.as_deref(),
            Some("Stanley Medical College Hospital")
        );
        assert_eq!(view.top[0].nearest_ambulance.as_deref(), Some("AMB-01"));
        assert_eq!(view.fleet.available, 1);
        assert_eq!(view.fleet.beds_available, 100);
        assert_eq!(dash.ambulances().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_last_state() {
        let good = Snapshot::new(vec![zone("Zone 1", 50.0, 50.0)]);
        let missing = Snapshot::new(vec![EntitySnapshot::new("Zone 9", Position::new(13.0, 80.1))
            .with_signal(HEART_STRESS, 10.0)]);
        let mut dash = dashboard(Box::new(ScriptedSource::new(vec![Ok(good), Ok(missing)])));

        dash.refresh_once().await.unwrap();
        let err = dash.refresh_once().await.unwrap_err();
        assert!(matches!(err, DashboardError::Triage(TriageError::MissingSignal(_))));

        let err = dash.refresh_once().await.unwrap_err();
        assert!(matches!(err, DashboardError::Source(_)));

        assert_eq!(dash.store().len(), 1);
        assert!(dash.store().get("Zone 1").is_some());
    }

    #[tokio::test]
    async fn test_stale_snapshot_flagged() {
        let clusters = vec![Cluster {
            id: 1,
            lat: 13.0,
            lng: 80.15,
            count: 14,
            avg_severity: 1.5,
            radius: None,
        }];
        let snapshot = Snapshot::new(vec![zone("Zone 1", 50.0, 50.0)])
            .with_clusters(clusters)
            .into_stale();
        let mut dash = dashboard(Box::new(StaticSource::new("fixture", snapshot)));

        let outcome = dash.refresh_once().await.unwrap();
        assert!(outcome.stale);
        assert!(dash.is_stale());
        assert_eq!(dash.view().zones[0].name, "Z1");
    }

    #[tokio::test]
    async fn test_run_stops_after_max_cycles() {
        let mut dash = Dashboard::new(DashboardConfig {
            source: Box::new(ZoneGenerator::seeded(20, 5)),
            profile: Profile::embedded("zones").unwrap(),
            refresh_interval_ms: 5,
            max_runtime_secs: 0,
            max_cycles: 3,
        })
        .unwrap();

        let mut seen = 0;
        let report = dash.run_with(|_| seen += 1).await.unwrap();

        assert_eq!(seen, 3);
        assert_eq!(report.cycles, 3);
        assert_eq!(report.failures, 0);
        assert_eq!(report.stats.total, 20);
        assert_eq!(report.view.top.len(), 5);
        assert!(serde_json::to_string(&report.view).is_ok());
    }

    #[tokio::test]
    async fn test_operator_actions_on_unknown_ids() {
        let snapshot = Snapshot::new(vec![zone("Zone 1", 50.0, 50.0)]);
        let mut dash = dashboard(Box::new(StaticSource::new("fixture", snapshot)));
        dash.refresh_once().await.unwrap();

        assert!(matches!(
            dash.boost("Zone 7"),
            Err(DashboardError::Triage(TriageError::InvalidBoostTarget(_)))
        ));
        assert!(dash.resolve("Zone 7").await.is_err());
        assert!(dash.select("Zone 7").is_err());

        dash.select("Zone 1").unwrap();
        assert_eq!(dash.view().selected.unwrap().rank, 1);
    }
}
