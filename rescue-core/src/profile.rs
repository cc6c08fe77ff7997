//! Triage profiles
//!
//! A profile bundles the weight vector, classifier and resolve policy for
//! one deployment. Profiles are TOML documents; the `zones` and `dashboard`
//! profiles are embedded, custom ones are loaded from disk.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::{
    Band, Classifier, EntityStore, ResolvePolicy, ScoreWeights, Scorer, TriageError,
    DEFAULT_BOOST_STEP, DEFAULT_TOP_N,
};

/// Errors from loading profiles
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("Failed to read profile: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse profile: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid profile: {0}")]
    Invalid(#[from] TriageError),

    #[error("Unknown profile: {0}")]
    Unknown(String),
}

/// A profile definition loaded from TOML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub profile: ProfileMetadata,
    pub weights: ScoreWeights,
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub policy: ResolvePolicy,
    #[serde(default)]
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileMetadata {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Serialized form of a [`Classifier`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ClassifierConfig {
    Thresholds { bands: Vec<Band> },
    PassThrough { signal: String, levels: Vec<String> },
}

impl ClassifierConfig {
    pub fn build(&self) -> Result<Classifier, TriageError> {
        match self {
            ClassifierConfig::Thresholds { bands } => Classifier::thresholds(bands.clone()),
            ClassifierConfig::PassThrough { signal, levels } => {
                Classifier::pass_through(signal, levels.clone())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Boost added per "increase priority" action
    #[serde(default = "default_boost_step")]
    pub boost_step: f64,
    /// Ranked entities shown in the top list
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

fn default_boost_step() -> f64 {
    DEFAULT_BOOST_STEP
}

fn default_top_n() -> usize {
    DEFAULT_TOP_N
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            boost_step: DEFAULT_BOOST_STEP,
            top_n: DEFAULT_TOP_N,
        }
    }
}

const EMBEDDED: &[(&str, &str)] = &[
    ("zones", include_str!("../profiles/zones.toml")),
    ("dashboard", include_str!("../profiles/dashboard.toml")),
];

impl Profile {
    /// Parse and validate a profile
    pub fn from_toml_str(content: &str) -> Result<Self, ProfileError> {
        let profile: Profile = toml::from_str(content)?;
        profile.classifier.build()?;
        Ok(profile)
    }

    /// Load a profile file from disk
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ProfileError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load one of the embedded profiles by name
    pub fn embedded(name: &str) -> Result<Self, ProfileError> {
        let (_, content) = EMBEDDED
            .iter()
            .find(|(n, _)| *n == name)
            .ok_or_else(|| ProfileError::Unknown(name.to_string()))?;
        Self::from_toml_str(content)
    }

    /// Names of the embedded profiles
    pub fn embedded_names() -> Vec<&'static str> {
        EMBEDDED.iter().map(|(n, _)| *n).collect()
    }

    pub fn name(&self) -> &str {
        &self.profile.name
    }

    pub fn scorer(&self) -> Result<Scorer, TriageError> {
        Ok(Scorer::new(self.weights.clone(), self.classifier.build()?))
    }

    /// Empty store configured by this profile
    pub fn store(&self) -> Result<EntityStore, TriageError> {
        Ok(EntityStore::new(self.scorer()?, self.policy))
    }
}
