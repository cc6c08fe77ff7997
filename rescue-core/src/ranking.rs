//! Ranking and bucket aggregation
//!
//! Ranking is score descending with ties broken by id ascending, so the
//! order is fully deterministic. Filters run before sorting.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::{Bucket, Classifier, Entity};

/// Rank ordering: higher score first, then lexicographically smaller id
pub fn compare_rank(a: &Entity, b: &Entity) -> Ordering {
    b.score()
        .total_cmp(&a.score())
        .then_with(|| a.id().cmp(b.id()))
}

/// Filter, then sort by rank ordering
pub fn rank<'a, I, F>(entities: I, filter: F) -> Vec<&'a Entity>
where
    I: IntoIterator<Item = &'a Entity>,
    F: Fn(&Entity) -> bool,
{
    let mut ranked: Vec<&'a Entity> = entities.into_iter().filter(|e| filter(*e)).collect();
    ranked.sort_by(|a, b| compare_rank(a, b));
    ranked
}

/// First `min(n, len)` items; safe on empty or short input
pub fn top_n<T>(ranked: &[T], n: usize) -> &[T] {
    &ranked[..n.min(ranked.len())]
}

/// Count for one bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketCount {
    pub level: u8,
    pub label: String,
    pub count: usize,
}

/// Per-bucket counts, least severe first; zero-count buckets included
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BucketCounts {
    entries: Vec<BucketCount>,
}

impl BucketCounts {
    /// Zero counts for every bucket of `classifier`
    pub fn empty(classifier: &Classifier) -> Self {
        Self {
            entries: classifier
                .buckets()
                .into_iter()
                .map(|b| BucketCount {
                    level: b.level,
                    label: b.label,
                    count: 0,
                })
                .collect(),
        }
    }

    fn increment(&mut self, bucket: &Bucket) {
        match self
            .entries
            .iter_mut()
            .find(|e| e.level == bucket.level && e.label == bucket.label)
        {
            Some(entry) => entry.count += 1,
            None => {
                self.entries.push(BucketCount {
                    level: bucket.level,
                    label: bucket.label.clone(),
                    count: 1,
                });
                self.entries.sort_by_key(|e| e.level);
            }
        }
    }

    pub fn get(&self, label: &str) -> usize {
        self.entries
            .iter()
            .filter(|e| e.label == label)
            .map(|e| e.count)
            .sum()
    }

    pub fn get_level(&self, level: u8) -> usize {
        self.entries
            .iter()
            .filter(|e| e.level == level)
            .map(|e| e.count)
            .sum()
    }

    pub fn total(&self) -> usize {
        self.entries.iter().map(|e| e.count).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BucketCount> {
        self.entries.iter()
    }
}

/// Count entities per bucket; every entity lands in exactly one bucket
pub fn aggregate_buckets<'a, I>(classifier: &Classifier, entities: I) -> BucketCounts
where
    I: IntoIterator<Item = &'a Entity>,
{
    let mut counts = BucketCounts::empty(classifier);
    for entity in entities {
        counts.increment(entity.bucket());
    }
    counts
}
