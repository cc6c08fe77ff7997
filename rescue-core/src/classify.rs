//! Severity classification
//!
//! Two schemes share one classifier:
//! - **Thresholds**: bucket computed from the score using ordered bands.
//!   Lower bounds are inclusive, so a score on a boundary lands in the
//!   higher bucket.
//! - **PassThrough**: bucket read from an ordinal the upstream data already
//!   carries (e.g. a model's triage level 0..3).

use serde::{Deserialize, Serialize};

use crate::{RawInputs, TriageError};

/// Discrete severity class
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Bucket {
    /// Ordinal, 0 = least severe
    pub level: u8,
    pub label: String,
}

impl Bucket {
    pub fn new(level: u8, label: &str) -> Self {
        Self {
            level,
            label: label.to_string(),
        }
    }
}

/// A threshold band: scores in `[lower, next band's lower)` map to `label`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub label: String,
    pub lower: f64,
}

impl Band {
    pub fn new(label: &str, lower: f64) -> Self {
        Self {
            label: label.to_string(),
            lower,
        }
    }
}

/// Maps a score (or an upstream field) to a bucket
#[derive(Debug, Clone, PartialEq)]
pub enum Classifier {
    Thresholds { bands: Vec<Band> },
    PassThrough { signal: String, levels: Vec<String> },
}

impl Classifier {
    /// Threshold classifier; lower bounds must be finite and strictly increasing
    pub fn thresholds(bands: Vec<Band>) -> Result<Self, TriageError> {
        if bands.is_empty() {
            return Err(TriageError::InvalidConfig(
                "threshold classifier needs at least one band".to_string(),
            ));
        }
        if bands.len() > u8::MAX as usize {
            return Err(TriageError::InvalidConfig("too many bands".to_string()));
        }
        if bands.iter().any(|b| !b.lower.is_finite()) {
            return Err(TriageError::InvalidConfig(
                "band lower bounds must be finite".to_string(),
            ));
        }
        if bands.windows(2).any(|w| w[0].lower >= w[1].lower) {
            return Err(TriageError::InvalidConfig(
                "band lower bounds must be strictly increasing".to_string(),
            ));
        }
        Ok(Classifier::Thresholds { bands })
    }

    /// Pass-through classifier reading an ordinal from `signal`
    pub fn pass_through(signal: &str, levels: Vec<String>) -> Result<Self, TriageError> {
        if levels.is_empty() {
            return Err(TriageError::InvalidConfig(
                "pass-through classifier needs at least one level".to_string(),
            ));
        }
        if levels.len() > u8::MAX as usize {
            return Err(TriageError::InvalidConfig("too many levels".to_string()));
        }
        Ok(Classifier::PassThrough {
            signal: signal.to_string(),
            levels,
        })
    }

    /// low [0,40), moderate [40,70), critical [70,∞)
    pub fn zone_default() -> Self {
        Classifier::Thresholds {
            bands: vec![
                Band::new("low", 0.0),
                Band::new("moderate", 40.0),
                Band::new("critical", 70.0),
            ],
        }
    }

    /// Four-level upstream triage scale carried in the `severity` signal
    pub fn dashboard_default() -> Self {
        Classifier::PassThrough {
            signal: "severity".to_string(),
            levels: ["low", "moderate", "high", "critical"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    /// Classify one entity.
    ///
    /// Threshold mode only looks at `score`; pass-through mode only looks at
    /// the configured signal in `raw_inputs`.
    pub fn classify(&self, score: f64, raw_inputs: &RawInputs) -> Result<Bucket, TriageError> {
        match self {
            Classifier::Thresholds { bands } => {
                if !score.is_finite() {
                    return Err(TriageError::NonFiniteValue("score".to_string()));
                }
                Ok(classify_score(bands, score))
            }
            Classifier::PassThrough { signal, levels } => {
                let value = raw_inputs
                    .get(signal)
                    .copied()
                    .ok_or_else(|| TriageError::MissingSignal(signal.clone()))?;
                if !value.is_finite() {
                    return Err(TriageError::NonFiniteValue(signal.clone()));
                }
                if value < 0.0 || value.fract() != 0.0 || value >= levels.len() as f64 {
                    return Err(TriageError::InvalidLevel {
                        signal: signal.clone(),
                        value,
                    });
                }
                let level = value as usize;
                Ok(Bucket::new(level as u8, &levels[level]))
            }
        }
    }

    /// Every bucket this classifier can produce, least severe first
    pub fn buckets(&self) -> Vec<Bucket> {
        match self {
            Classifier::Thresholds { bands } => bands
                .iter()
                .enumerate()
                .map(|(i, b)| Bucket::new(i as u8, &b.label))
                .collect(),
            Classifier::PassThrough { levels, .. } => levels
                .iter()
                .enumerate()
                .map(|(i, l)| Bucket::new(i as u8, l))
                .collect(),
        }
    }

    /// Most severe bucket level
    pub fn top_level(&self) -> u8 {
        let count = match self {
            Classifier::Thresholds { bands } => bands.len(),
            Classifier::PassThrough { levels, .. } => levels.len(),
        };
        count.saturating_sub(1) as u8
    }
}

fn classify_score(bands: &[Band], score: f64) -> Bucket {
    // Below the lowest bound still counts as the lowest band
    let level = bands
        .iter()
        .rposition(|b| score >= b.lower)
        .unwrap_or(0);
    Bucket::new(level as u8, &bands[level].label)
}
