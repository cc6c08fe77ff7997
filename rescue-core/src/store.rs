//! Entity Store - id-keyed state behind the dashboard
//!
//! The store is the single place entity state lives:
//! - Snapshots from a data source replace the entity set wholesale
//! - Every write recomputes score and bucket before the next read
//! - Operator actions (boost, resolve, select, reorder) are explicit methods
//! - A separate id list tracks the operator's manual priority order

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::{
    aggregate_buckets, rank, top_n, BucketCounts, Entity, EntityId, Scorer, Snapshot, Status,
    TriageError,
};

/// How resolved entities are treated by ranking and counting
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolvePolicy {
    /// Drop assigned/rescued entities from `rank` and `top_n`
    #[serde(default = "default_true")]
    pub exclude_resolved_in_ranking: bool,
    /// Drop assigned/rescued entities from `aggregate_buckets`
    #[serde(default)]
    pub exclude_resolved_in_counts: bool,
    /// Status written by `resolve`
    #[serde(default = "default_resolved_status")]
    pub resolved_status: Status,
}

fn default_true() -> bool {
    true
}

fn default_resolved_status() -> Status {
    Status::Rescued
}

impl Default for ResolvePolicy {
    fn default() -> Self {
        Self {
            exclude_resolved_in_ranking: true,
            exclude_resolved_in_counts: false,
            resolved_status: Status::Rescued,
        }
    }
}

/// The id-keyed entity store
#[derive(Debug, Clone)]
pub struct EntityStore {
    /// Entities (id -> Entity)
    entities: BTreeMap<EntityId, Entity>,

    /// Manual priority order, operator-maintained
    priority: Vec<EntityId>,

    /// Currently selected entity
    selected: Option<EntityId>,

    scorer: Scorer,

    policy: ResolvePolicy,

    /// Completed recomputation passes
    cycles: u64,
}

impl EntityStore {
    /// Create an empty store
    pub fn new(scorer: Scorer, policy: ResolvePolicy) -> Self {
        Self {
            entities: BTreeMap::new(),
            priority: Vec::new(),
            selected: None,
            scorer,
            policy,
            cycles: 0,
        }
    }

    pub fn scorer(&self) -> &Scorer {
        &self.scorer
    }

    pub fn policy(&self) -> &ResolvePolicy {
        &self.policy
    }

    /// Replace the entity set with an authoritative snapshot.
    ///
    /// All entities are scored before any state changes; if one fails the
    /// store keeps its previous contents. Operator state for ids present in
    /// both old and new sets is NOT carried over here: callers that want to
    /// preserve boosts/statuses across cycles fill them into the snapshot
    /// first.
    pub fn apply_snapshot(&mut self, snapshot: &Snapshot) -> Result<ApplyResult, TriageError> {
        let mut next = BTreeMap::new();

        for incoming in &snapshot.entities {
            if next.contains_key(&incoming.id) {
                return Err(TriageError::DuplicateEntity(incoming.id.clone()));
            }

            let manual_boost = incoming.manual_boost.unwrap_or(0.0);
            let (score, bucket) = self.scorer.evaluate(&incoming.raw_inputs, manual_boost)?;

            let entity = Entity::new(
                incoming.id.clone(),
                incoming.position,
                incoming.raw_inputs.clone(),
                manual_boost,
                incoming.status.unwrap_or_default(),
                score,
                bucket,
            )
            .with_dispatch(incoming.hospital_assigned.clone(), incoming.reported_at);
            next.insert(incoming.id.clone(), entity);
        }

        let added = next.keys().filter(|id| !self.entities.contains_key(*id)).count();
        let removed = self.entities.keys().filter(|id| !next.contains_key(*id)).count();

        self.entities = next;
        self.priority.retain(|id| self.entities.contains_key(id));
        if let Some(selected) = &self.selected {
            if !self.entities.contains_key(selected) {
                self.selected = None;
            }
        }
        self.cycles += 1;

        debug!(
            "Applied snapshot: {} entities ({} added, {} removed, stale={})",
            self.entities.len(),
            added,
            removed,
            snapshot.stale
        );

        Ok(ApplyResult {
            entity_count: self.entities.len(),
            added,
            removed,
            stale: snapshot.stale,
        })
    }

    /// Recompute every entity's score and bucket from its current inputs
    pub fn recompute(&mut self) -> Result<usize, TriageError> {
        let mut derived = Vec::with_capacity(self.entities.len());
        for entity in self.entities.values() {
            let result = self.scorer.evaluate(entity.raw_inputs(), entity.manual_boost())?;
            derived.push(result);
        }

        for (entity, (score, bucket)) in self.entities.values_mut().zip(derived) {
            entity.set_derived(score, bucket);
        }
        self.cycles += 1;

        Ok(self.entities.len())
    }

    fn recompute_one(&mut self, id: &str) -> Result<f64, TriageError> {
        let entity = self
            .entities
            .get_mut(id)
            .ok_or_else(|| TriageError::InvalidBoostTarget(id.to_string()))?;
        let (score, bucket) = self
            .scorer
            .evaluate(entity.raw_inputs(), entity.manual_boost())?;
        entity.set_derived(score, bucket);
        Ok(score)
    }

    /// Add `delta` to an entity's manual boost; returns the new score
    pub fn boost(&mut self, id: &str, delta: f64) -> Result<f64, TriageError> {
        if !delta.is_finite() {
            return Err(TriageError::NonFiniteValue("boost delta".to_string()));
        }
        let entity = self
            .entities
            .get_mut(id)
            .ok_or_else(|| TriageError::InvalidBoostTarget(id.to_string()))?;

        let previous = entity.manual_boost();
        entity.set_manual_boost(previous + delta);

        if let Err(e) = self.recompute_one(id) {
            if let Some(entity) = self.entities.get_mut(id) {
                entity.set_manual_boost(previous);
            }
            return Err(e);
        }

        if !self.priority.iter().any(|p| p == id) {
            self.priority.push(id.to_string());
        }

        let score = self.entities.get(id).map(|e| e.score()).unwrap_or_default();
        debug!("Boosted {} by {} -> score {:.1}", id, delta, score);
        Ok(score)
    }

    /// Reset an entity's manual boost to zero; returns the new score
    pub fn reset_boost(&mut self, id: &str) -> Result<f64, TriageError> {
        let entity = self
            .entities
            .get_mut(id)
            .ok_or_else(|| TriageError::InvalidBoostTarget(id.to_string()))?;
        entity.set_manual_boost(0.0);
        self.recompute_one(id)
    }

    /// Mark an entity resolved using the policy's resolved status
    pub fn resolve(&mut self, id: &str) -> Result<Status, TriageError> {
        let status = self.policy.resolved_status;
        self.set_status(id, status)?;
        Ok(status)
    }

    /// Set an entity's status explicitly
    pub fn set_status(&mut self, id: &str, status: Status) -> Result<(), TriageError> {
        let entity = self
            .entities
            .get_mut(id)
            .ok_or_else(|| TriageError::InvalidBoostTarget(id.to_string()))?;
        entity.set_status(status);
        debug!("Entity {} -> {:?}", id, status);
        Ok(())
    }

    /// Select an entity for detail display
    pub fn select(&mut self, id: &str) -> Result<&Entity, TriageError> {
        let entity = self
            .entities
            .get(id)
            .ok_or_else(|| TriageError::InvalidBoostTarget(id.to_string()))?;
        self.selected = Some(id.to_string());
        Ok(entity)
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    pub fn selected(&self) -> Option<&Entity> {
        self.selected.as_ref().and_then(|id| self.entities.get(id))
    }

    /// Entities in manual priority order
    pub fn priority_list(&self) -> Vec<&Entity> {
        self.priority
            .iter()
            .filter_map(|id| self.entities.get(id))
            .collect()
    }

    /// Move an entity one place up the manual priority list
    pub fn move_up(&mut self, id: &str) -> Result<(), TriageError> {
        let index = self.priority_index(id)?;
        if index > 0 {
            self.priority.swap(index, index - 1);
        }
        Ok(())
    }

    /// Move an entity one place down the manual priority list
    pub fn move_down(&mut self, id: &str) -> Result<(), TriageError> {
        let index = self.priority_index(id)?;
        if index + 1 < self.priority.len() {
            self.priority.swap(index, index + 1);
        }
        Ok(())
    }

    fn priority_index(&self, id: &str) -> Result<usize, TriageError> {
        self.priority
            .iter()
            .position(|p| p == id)
            .ok_or_else(|| TriageError::InvalidBoostTarget(id.to_string()))
    }

    /// Get an entity by id
    pub fn get(&self, id: &str) -> Option<&Entity> {
        self.entities.get(id)
    }

    /// All entities in id order
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Ranked entities under the resolve policy
    pub fn rank(&self) -> Vec<&Entity> {
        let exclude = self.policy.exclude_resolved_in_ranking;
        rank(self.entities.values(), |e| !(exclude && e.is_resolved()))
    }

    /// Ranked entities matching an extra predicate (policy still applies)
    pub fn rank_where<F>(&self, predicate: F) -> Vec<&Entity>
    where
        F: Fn(&Entity) -> bool,
    {
        let exclude = self.policy.exclude_resolved_in_ranking;
        rank(self.entities.values(), |e| {
            !(exclude && e.is_resolved()) && predicate(e)
        })
    }

    /// Top `n` of the ranking
    pub fn top_n(&self, n: usize) -> Vec<&Entity> {
        top_n(&self.rank(), n).to_vec()
    }

    /// Bucket counts under the resolve policy
    pub fn aggregate_buckets(&self) -> BucketCounts {
        let exclude = self.policy.exclude_resolved_in_counts;
        aggregate_buckets(
            self.scorer.classifier(),
            self.entities
                .values()
                .filter(|e| !(exclude && e.is_resolved())),
        )
    }

    /// Bucket counts with an explicit resolved-entity choice
    pub fn aggregate_buckets_with(&self, exclude_resolved: bool) -> BucketCounts {
        aggregate_buckets(
            self.scorer.classifier(),
            self.entities
                .values()
                .filter(|e| !(exclude_resolved && e.is_resolved())),
        )
    }

    /// Get store statistics
    pub fn stats(&self) -> StoreStats {
        let resolved = self.entities.values().filter(|e| e.is_resolved()).count();
        let boosted = self
            .entities
            .values()
            .filter(|e| e.manual_boost() != 0.0)
            .count();

        StoreStats {
            total: self.entities.len(),
            active: self.entities.len() - resolved,
            resolved,
            boosted,
            prioritized: self.priority.len(),
            cycles: self.cycles,
        }
    }
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new(Scorer::default(), ResolvePolicy::default())
    }
}

/// Result of applying a snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyResult {
    pub entity_count: usize,
    pub added: usize,
    pub removed: usize,
    pub stale: bool,
}

/// Store statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub total: usize,
    pub active: usize,
    pub resolved: usize,
    pub boosted: usize,
    pub prioritized: usize,
    pub cycles: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Band, Classifier, EntitySnapshot, Position, ScoreWeights};

    fn scenario_store() -> EntityStore {
        let weights = ScoreWeights::new([("x", 0.5), ("y", 0.5)]).unwrap();
        let classifier = Classifier::thresholds(vec![
            Band::new("low", 0.0),
            Band::new("mid", 40.0),
            Band::new("high", 70.0),
        ])
        .unwrap();

        let mut store = EntityStore::new(Scorer::new(weights, classifier), ResolvePolicy::default());
        let snapshot = Snapshot::new(vec![
            EntitySnapshot::new("A", Position::new(13.08, 80.27))
                .with_signal("x", 80.0)
                .with_signal("y", 20.0)
                .with_boost(0.0),
            EntitySnapshot::new("B", Position::new(13.05, 80.21))
                .with_signal("x", 10.0)
                .with_signal("y", 10.0)
                .with_boost(25.0),
        ]);
        store.apply_snapshot(&snapshot).unwrap();
        store
    }

    fn ranked_ids(store: &EntityStore) -> Vec<String> {
        store.rank().iter().map(|e| e.id().to_string()).collect()
    }

    #[test]
    fn test_scenario_scores_and_buckets() {
        let store = scenario_store();

        assert_eq!(store.get("A").unwrap().score(), 50.0);
        assert_eq!(store.get("B").unwrap().score(), 35.0);
        assert_eq!(store.get("A").unwrap().bucket().label, "mid");
        assert_eq!(store.get("B").unwrap().bucket().label, "low");
        assert_eq!(ranked_ids(&store), vec!["A", "B"]);
    }

    #[test]
    fn test_boost_reorders_ranking() {
        let mut store = scenario_store();

        let score = store.boost("B", 40.0).unwrap();
        assert_eq!(score, 75.0);
        assert_eq!(store.get("B").unwrap().bucket().label, "high");
        assert_eq!(ranked_ids(&store), vec!["B", "A"]);
        assert_eq!(store.priority_list().len(), 1);
    }

    #[test]
    fn test_resolve_excluded_from_rank_but_counted() {
        let mut store = scenario_store();

        assert_eq!(store.resolve("A").unwrap(), Status::Rescued);
        assert_eq!(ranked_ids(&store), vec!["B"]);

        let counts = store.aggregate_buckets();
        assert_eq!(counts.total(), 2);
        assert_eq!(counts.get("mid"), 1);

        let active_only = store.aggregate_buckets_with(true);
        assert_eq!(active_only.total(), 1);
    }

    #[test]
    fn test_unknown_targets_rejected() {
        let mut store = scenario_store();

        assert_eq!(
            store.boost("Z", 10.0).unwrap_err(),
            TriageError::InvalidBoostTarget("Z".to_string())
        );
        assert!(matches!(store.resolve("Z"), Err(TriageError::InvalidBoostTarget(_))));
        assert!(matches!(store.select("Z"), Err(TriageError::InvalidBoostTarget(_))));
        assert!(matches!(store.move_up("A"), Err(TriageError::InvalidBoostTarget(_))));
    }

    #[test]
    fn test_reset_boost() {
        let mut store = scenario_store();
        store.boost("A", 30.0).unwrap();
        assert_eq!(store.get("A").unwrap().score(), 80.0);

        let score = store.reset_boost("A").unwrap();
        assert_eq!(score, 50.0);
        assert_eq!(store.get("A").unwrap().manual_boost(), 0.0);
    }

    #[test]
    fn test_failed_snapshot_keeps_previous_state() {
        let mut store = scenario_store();

        let bad = Snapshot::new(vec![
            EntitySnapshot::new("C", Position::new(13.0, 80.0)).with_signal("x", 10.0),
        ]);
        let err = store.apply_snapshot(&bad).unwrap_err();

        assert_eq!(err, TriageError::MissingSignal("y".to_string()));
        assert_eq!(store.len(), 2);
        assert!(store.get("C").is_none());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut store = EntityStore::default();
        let entity = EntitySnapshot::new("Zone 1", Position::new(13.0, 80.1))
            .with_signal("heart_stress", 10.0)
            .with_signal("oxygen_drop", 10.0);
        let snapshot = Snapshot::new(vec![entity.clone(), entity]);

        assert_eq!(
            store.apply_snapshot(&snapshot).unwrap_err(),
            TriageError::DuplicateEntity("Zone 1".to_string())
        );
    }

    #[test]
    fn test_snapshot_is_authoritative() {
        let mut store = scenario_store();
        store.boost("B", 5.0).unwrap();
        store.select("B").unwrap();

        let next = Snapshot::new(vec![EntitySnapshot::new("A", Position::new(13.08, 80.27))
            .with_signal("x", 20.0)
            .with_signal("y", 20.0)]);
        let result = store.apply_snapshot(&next).unwrap();

        assert_eq!(result.removed, 1);
        assert_eq!(result.added, 0);
        assert!(store.get("B").is_none());
        assert!(store.priority_list().is_empty());
        assert!(store.selected().is_none());
        assert_eq!(store.get("A").unwrap().score(), 20.0);
    }

    #[test]
    fn test_priority_reordering() {
        let mut store = scenario_store();
        store.boost("A", 1.0).unwrap();
        store.boost("B", 1.0).unwrap();
        store.boost("A", 1.0).unwrap(); // already listed

        let order: Vec<_> = store.priority_list().iter().map(|e| e.id()).collect();
        assert_eq!(order, vec!["A", "B"]);

        store.move_down("A").unwrap();
        let order: Vec<_> = store.priority_list().iter().map(|e| e.id()).collect();
        assert_eq!(order, vec!["B", "A"]);

        // edges are no-ops
        store.move_down("A").unwrap();
        store.move_up("B").unwrap();
        let order: Vec<_> = store.priority_list().iter().map(|e| e.id()).collect();
        assert_eq!(order, vec!["B", "A"]);
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let mut store = scenario_store();
        let before: Vec<_> = store.entities().map(|e| (e.score(), e.bucket().clone())).collect();

        store.recompute().unwrap();
        let after: Vec<_> = store.entities().map(|e| (e.score(), e.bucket().clone())).collect();

        assert_eq!(before, after);
        assert_eq!(store.stats().cycles, 2);
    }

    #[test]
    fn test_top_n_on_small_store() {
        let store = scenario_store();
        assert_eq!(store.top_n(5).len(), 2);
        assert!(EntityStore::default().top_n(5).is_empty());
    }

    #[test]
    fn test_stats() {
        let mut store = scenario_store();
        store.resolve("B").unwrap();

        let stats = store.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.resolved, 1);
        assert_eq!(stats.active, 1);
        assert_eq!(stats.boosted, 1);
    }

    #[test]
    fn test_dispatch_details_carried_onto_entities() {
        let mut store = EntityStore::default();
        let reported = chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|d| d.and_hms_opt(10, 0, 0))
            .unwrap();
        let snapshot = Snapshot::new(vec![EntitySnapshot::new("V-101", Position::new(13.08, 80.27))
            .with_signal("heart_stress", 90.0)
            .with_signal("oxygen_drop", 60.0)
            .with_hospital("Rajiv Gandhi Govt General Hospital")
            .with_reported_at(reported)]);
        store.apply_snapshot(&snapshot).unwrap();

        let entity = store.get("V-101").unwrap();
        assert_eq!(entity.hospital_assigned(), Some("Rajiv Gandhi Govt General Hospital"));
        assert_eq!(entity.reported_at(), Some(reported));
        assert_eq!(entity.score(), 75.0);
    }
}
