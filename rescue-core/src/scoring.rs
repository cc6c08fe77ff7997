//! Weighted danger scoring
//!
//! A score is the weighted sum of an entity's configured signals plus the
//! operator's manual boost:
//!
//! `score = Σ(weight_i * raw_inputs[i]) + manual_boost`
//!
//! The weight vector is fixed at construction. Scoring is pure: any live
//! randomness belongs to the data source, never to this path.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{Bucket, Classifier, RawInputs, TriageError, WEIGHT_SUM_TOLERANCE};

/// Signal names used by the zone demo
pub const HEART_STRESS: &str = "heart_stress";
pub const OXYGEN_DROP: &str = "oxygen_drop";

/// Fixed weight vector over named signals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, f64>", into = "BTreeMap<String, f64>")]
pub struct ScoreWeights {
    weights: BTreeMap<String, f64>,
}

impl ScoreWeights {
    /// Build a weight vector; weights must be finite, non-negative and sum to 1.0
    pub fn new<I, S>(weights: I) -> Result<Self, TriageError>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let weights: BTreeMap<String, f64> =
            weights.into_iter().map(|(k, v)| (k.into(), v)).collect();

        if weights.is_empty() {
            return Err(TriageError::InvalidConfig(
                "at least one weighted signal is required".to_string(),
            ));
        }

        for (name, weight) in &weights {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(TriageError::InvalidConfig(format!(
                    "weight for {} must be finite and non-negative, got {}",
                    name, weight
                )));
            }
        }

        let total: f64 = weights.values().sum();
        if (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(TriageError::InvalidConfig(format!(
                "weights must sum to 1.0, got {}",
                total
            )));
        }

        Ok(Self { weights })
    }

    /// Equal-weight heart stress / oxygen drop vector used by the zone demo
    pub fn zone_default() -> Self {
        let mut weights = BTreeMap::new();
        weights.insert(HEART_STRESS.to_string(), 0.5);
        weights.insert(OXYGEN_DROP.to_string(), 0.5);
        Self { weights }
    }

    /// Configured signal names in summation order
    pub fn signals(&self) -> impl Iterator<Item = &str> {
        self.weights.keys().map(|s| s.as_str())
    }

    pub fn get(&self, signal: &str) -> Option<f64> {
        self.weights.get(signal).copied()
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Compute the danger score for one entity
    pub fn compute_score(&self, raw_inputs: &RawInputs, manual_boost: f64) -> Result<f64, TriageError> {
        if !manual_boost.is_finite() {
            return Err(TriageError::NonFiniteValue("manual_boost".to_string()));
        }

        let mut score = 0.0;
        for (signal, weight) in &self.weights {
            let value = raw_inputs
                .get(signal)
                .copied()
                .ok_or_else(|| TriageError::MissingSignal(signal.clone()))?;
            if !value.is_finite() {
                return Err(TriageError::NonFiniteValue(signal.clone()));
            }
            score += weight * value;
        }

        Ok(score + manual_boost)
    }
}

impl TryFrom<BTreeMap<String, f64>> for ScoreWeights {
    type Error = TriageError;

    fn try_from(weights: BTreeMap<String, f64>) -> Result<Self, Self::Error> {
        Self::new(weights)
    }
}

impl From<ScoreWeights> for BTreeMap<String, f64> {
    fn from(weights: ScoreWeights) -> Self {
        weights.weights
    }
}

/// Weights and classifier applied together to produce `(score, bucket)`
#[derive(Debug, Clone, PartialEq)]
pub struct Scorer {
    weights: ScoreWeights,
    classifier: Classifier,
}

impl Scorer {
    pub fn new(weights: ScoreWeights, classifier: Classifier) -> Self {
        Self { weights, classifier }
    }

    pub fn weights(&self) -> &ScoreWeights {
        &self.weights
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Score then classify; both are pure functions of the arguments
    pub fn evaluate(&self, raw_inputs: &RawInputs, manual_boost: f64) -> Result<(f64, Bucket), TriageError> {
        let score = self.weights.compute_score(raw_inputs, manual_boost)?;
        let bucket = self.classifier.classify(score, raw_inputs)?;
        Ok((score, bucket))
    }
}

impl Default for Scorer {
    fn default() -> Self {
        Self::new(ScoreWeights::zone_default(), Classifier::zone_default())
    }
}
