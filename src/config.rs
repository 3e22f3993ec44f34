use std::path::Path;

use chrono::NaiveDate;
use serde::Deserialize;
use tracing::info;

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    pub clusters: usize,
    pub seed: u64,
    pub restarts: usize,
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            clusters: 3,
            seed: 42,
            restarts: 10,
            max_iterations: 300,
            tolerance: 1e-6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub tie_epsilon: f64,
    pub include_cluster_feature: bool,
    /// Fill missing ground-truth labels with the rule-based labeller.
    pub heuristic_labels: bool,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            max_depth: 4,
            min_samples_split: 2,
            tie_epsilon: 0.05,
            include_cluster_feature: false,
            heuristic_labels: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RecommendationConfig {
    pub high_threshold: f64,
    pub low_threshold: f64,
    pub revision_threshold: f64,
    pub enrichment_topic: String,
    pub quiz_length: usize,
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            high_threshold: 0.8,
            low_threshold: 0.5,
            revision_threshold: 0.5,
            enrichment_topic: "Enrichment Challenges".to_string(),
            quiz_length: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngagementConfig {
    pub frequency_weight: f64,
    pub recency_weight: f64,
    pub reported_weight: f64,
    pub target_attempts: usize,
}

impl Default for EngagementConfig {
    fn default() -> Self {
        Self {
            frequency_weight: 0.6,
            recency_weight: 0.4,
            reported_weight: 0.5,
            target_attempts: 10,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Reference date for recency; defaults to the latest attempt in the data.
    pub as_of: Option<NaiveDate>,
    pub segmentation: SegmentationConfig,
    pub classifier: ClassifierConfig,
    pub recommendation: RecommendationConfig,
    pub engagement: EngagementConfig,
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub clusters: Option<usize>,
    pub seed: Option<u64>,
    pub high_threshold: Option<f64>,
    pub low_threshold: Option<f64>,
    pub tie_epsilon: Option<f64>,
    pub as_of: Option<NaiveDate>,
}

impl PipelineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|source| PipelineError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                info!(path = %path.display(), "loaded pipeline config");
                Self::from_toml_str(&content)?
            }
            None => Self::default(),
        };

        config.apply(overrides);
        config.validate()?;
        Ok(config)
    }

    pub fn apply(&mut self, overrides: &ConfigOverrides) {
        if let Some(clusters) = overrides.clusters {
            self.segmentation.clusters = clusters;
        }
        if let Some(seed) = overrides.seed {
            self.segmentation.seed = seed;
        }
        if let Some(high) = overrides.high_threshold {
            self.recommendation.high_threshold = high;
        }
        if let Some(low) = overrides.low_threshold {
            self.recommendation.low_threshold = low;
        }
        if let Some(epsilon) = overrides.tie_epsilon {
            self.classifier.tie_epsilon = epsilon;
        }
        if overrides.as_of.is_some() {
            self.as_of = overrides.as_of;
        }
    }

    pub fn validate(&self) -> Result<()> {
        let seg = &self.segmentation;
        if seg.clusters == 0 {
            return Err(PipelineError::Config("clusters must be at least 1".into()));
        }
        if seg.restarts == 0 || seg.max_iterations == 0 {
            return Err(PipelineError::Config(
                "restarts and max_iterations must be at least 1".into(),
            ));
        }
        if !(seg.tolerance.is_finite() && seg.tolerance > 0.0) {
            return Err(PipelineError::Config("tolerance must be positive".into()));
        }

        let cls = &self.classifier;
        if cls.max_depth == 0 {
            return Err(PipelineError::Config("max_depth must be at least 1".into()));
        }
        if !(cls.tie_epsilon.is_finite() && cls.tie_epsilon >= 0.0) {
            return Err(PipelineError::Config("tie_epsilon must be >= 0".into()));
        }

        let rec = &self.recommendation;
        let in_unit = |value: f64| (0.0..=1.0).contains(&value);
        if !in_unit(rec.low_threshold) || !in_unit(rec.high_threshold) {
            return Err(PipelineError::Config("thresholds must lie in [0, 1]".into()));
        }
        if rec.low_threshold >= rec.high_threshold {
            return Err(PipelineError::Config(format!(
                "low_threshold ({}) must be below high_threshold ({})",
                rec.low_threshold, rec.high_threshold
            )));
        }
        if !in_unit(rec.revision_threshold) {
            return Err(PipelineError::Config(
                "revision_threshold must lie in [0, 1]".into(),
            ));
        }

        let eng = &self.engagement;
        if eng.frequency_weight < 0.0
            || eng.recency_weight < 0.0
            || eng.frequency_weight + eng.recency_weight <= 0.0
        {
            return Err(PipelineError::Config(
                "engagement weights must be non-negative with a positive sum".into(),
            ));
        }
        if !in_unit(eng.reported_weight) {
            return Err(PipelineError::Config("reported_weight must lie in [0, 1]".into()));
        }
        if eng.target_attempts == 0 {
            return Err(PipelineError::Config("target_attempts must be at least 1".into()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.segmentation.clusters, 3);
        assert_eq!(config.recommendation.high_threshold, 0.8);
        assert_eq!(config.recommendation.low_threshold, 0.5);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = PipelineConfig::from_toml_str(
            r#"
            as_of = "2026-01-20"

            [segmentation]
            clusters = 4

            [recommendation]
            high_threshold = 0.85
            "#,
        )
        .unwrap();

        assert_eq!(config.segmentation.clusters, 4);
        assert_eq!(config.segmentation.seed, 42);
        assert_eq!(config.recommendation.high_threshold, 0.85);
        assert_eq!(config.recommendation.low_threshold, 0.5);
        assert_eq!(config.as_of, NaiveDate::from_ymd_opt(2026, 1, 20));
    }

    #[test]
    fn overrides_win_over_file_values() {
        let mut config = PipelineConfig::default();
        config.apply(&ConfigOverrides {
            clusters: Some(2),
            tie_epsilon: Some(0.1),
            ..Default::default()
        });
        assert_eq!(config.segmentation.clusters, 2);
        assert_eq!(config.classifier.tie_epsilon, 0.1);
    }

    #[test]
    fn rejects_inverted_thresholds() {
        let mut config = PipelineConfig::default();
        config.recommendation.low_threshold = 0.9;
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn rejects_zero_clusters() {
        let mut config = PipelineConfig::default();
        config.segmentation.clusters = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_reads_file_and_applies_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.toml");
        std::fs::write(&path, "[classifier]\nmax_depth = 2\n").unwrap();

        let config = PipelineConfig::load(
            Some(&path),
            &ConfigOverrides {
                seed: Some(7),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(config.classifier.max_depth, 2);
        assert_eq!(config.segmentation.seed, 7);
    }
}
