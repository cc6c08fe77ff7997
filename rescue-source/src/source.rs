//! Common interface for snapshot data sources

use async_trait::async_trait;
use rescue_core::Snapshot;

use crate::SourceError;

/// A supplier of full-refresh snapshots.
///
/// Each call returns the complete current entity set. Sources never merge
/// partial updates; transport retries and stale fallback are the source's
/// job, scoring is not.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Source name for logging
    fn name(&self) -> &str;

    /// Fetch the next snapshot
    async fn fetch(&mut self) -> Result<Snapshot, SourceError>;

    /// Report that an operator resolved an entity.
    ///
    /// Sources backed by a remote service forward this; the default is a no-op.
    async fn notify_resolved(&mut self, _entity_id: &str) -> Result<(), SourceError> {
        Ok(())
    }
}

/// A source that returns the same snapshot every cycle
pub struct StaticSource {
    name: String,
    snapshot: Snapshot,
}

impl StaticSource {
    pub fn new(name: &str, snapshot: Snapshot) -> Self {
        Self {
            name: name.to_string(),
            snapshot,
        }
    }
}

#[async_trait]
impl DataSource for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&mut self) -> Result<Snapshot, SourceError> {
        let mut snapshot = self.snapshot.clone();
        snapshot.received_at = chrono::Utc::now();
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rescue_core::{EntitySnapshot, Position};

    #[tokio::test]
    async fn test_static_source_repeats_snapshot() {
        let snapshot = Snapshot::new(vec![EntitySnapshot::new("V-1", Position::new(13.0, 80.2))]);
        let mut source = StaticSource::new("fixture", snapshot);

        let first = source.fetch().await.unwrap();
        let second = source.fetch().await.unwrap();
        assert_eq!(first.entities, second.entities);
        assert_eq!(source.name(), "fixture");
        assert!(source.notify_resolved("V-1").await.is_ok());
    }
}
