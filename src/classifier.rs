use serde::Serialize;
use tracing::{debug, info};

use crate::config::ClassifierConfig;
use crate::error::{PipelineError, Result};
use crate::models::{FeatureVector, LearnerRecord, ProficiencyLabel};

const CLASSES: usize = ProficiencyLabel::ALL.len();

#[derive(Debug, Clone)]
pub struct TrainingSample {
    pub features: FeatureVector,
    pub cluster: Option<usize>,
    pub label: ProficiencyLabel,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Prediction {
    pub label: ProficiencyLabel,
    pub confidence: f64,
    /// Indexed by `ProficiencyLabel::index`.
    pub probabilities: [f64; CLASSES],
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        counts: [usize; CLASSES],
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

/// CART decision tree over learner features, split on Gini impurity.
#[derive(Debug, Clone)]
pub struct ProficiencyClassifier {
    root: Node,
    include_cluster: bool,
    tie_epsilon: f64,
}

fn to_row(features: &FeatureVector, cluster: Option<usize>, include_cluster: bool) -> Vec<f64> {
    let mut row = features.as_array().to_vec();
    if include_cluster {
        row.push(cluster.map_or(-1.0, |c| c as f64));
    }
    row
}

fn gini(counts: &[usize; CLASSES], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let total = total as f64;
    1.0 - counts
        .iter()
        .map(|&c| {
            let p = c as f64 / total;
            p * p
        })
        .sum::<f64>()
}

fn class_counts(labels: &[usize], indices: &[usize]) -> [usize; CLASSES] {
    let mut counts = [0usize; CLASSES];
    for &i in indices {
        counts[labels[i]] += 1;
    }
    counts
}

struct TreeBuilder<'a> {
    rows: &'a [Vec<f64>],
    labels: &'a [usize],
    max_depth: usize,
    min_samples_split: usize,
}

impl TreeBuilder<'_> {
    fn build(&self, indices: &[usize], depth: usize) -> Node {
        let counts = class_counts(self.labels, indices);
        let pure = counts.iter().filter(|&&c| c > 0).count() <= 1;
        if pure || depth >= self.max_depth || indices.len() < self.min_samples_split {
            return Node::Leaf { counts };
        }

        let parent = gini(&counts, indices.len());
        let Some((feature, threshold, impurity)) = self.best_split(indices) else {
            return Node::Leaf { counts };
        };
        if parent - impurity <= 1e-12 {
            return Node::Leaf { counts };
        }

        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| self.rows[i][feature] <= threshold);

        Node::Split {
            feature,
            threshold,
            left: Box::new(self.build(&left, depth + 1)),
            right: Box::new(self.build(&right, depth + 1)),
        }
    }

    /// Lowest weighted child impurity over midpoints between distinct values.
    fn best_split(&self, indices: &[usize]) -> Option<(usize, f64, f64)> {
        let n = indices.len();
        let features = self.rows.first().map_or(0, Vec::len);
        let mut best: Option<(usize, f64, f64)> = None;

        for feature in 0..features {
            let mut sorted = indices.to_vec();
            sorted.sort_by(|&a, &b| self.rows[a][feature].total_cmp(&self.rows[b][feature]));

            let mut left = [0usize; CLASSES];
            let mut right = class_counts(self.labels, &sorted);

            for split in 1..n {
                let moved = sorted[split - 1];
                left[self.labels[moved]] += 1;
                right[self.labels[moved]] -= 1;

                let lo = self.rows[moved][feature];
                let hi = self.rows[sorted[split]][feature];
                if hi <= lo {
                    continue;
                }

                let impurity = (split as f64 * gini(&left, split)
                    + (n - split) as f64 * gini(&right, n - split))
                    / n as f64;
                if best.map_or(true, |(_, _, b)| impurity < b) {
                    best = Some((feature, (lo + hi) / 2.0, impurity));
                }
            }
        }

        best
    }
}

impl ProficiencyClassifier {
    pub fn fit(samples: &[TrainingSample], config: &ClassifierConfig) -> Result<Self> {
        let mut per_label = [0usize; CLASSES];
        for sample in samples {
            per_label[sample.label.index()] += 1;
        }
        let missing: Vec<&str> = ProficiencyLabel::ALL
            .iter()
            .filter(|label| per_label[label.index()] == 0)
            .map(|label| label.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::model_fit(format!(
                "training set has no {} examples",
                missing.join(", ")
            )));
        }

        let rows: Vec<Vec<f64>> = samples
            .iter()
            .map(|s| to_row(&s.features, s.cluster, config.include_cluster_feature))
            .collect();
        let labels: Vec<usize> = samples.iter().map(|s| s.label.index()).collect();
        let indices: Vec<usize> = (0..samples.len()).collect();

        let builder = TreeBuilder {
            rows: &rows,
            labels: &labels,
            max_depth: config.max_depth,
            min_samples_split: config.min_samples_split.max(2),
        };
        let root = builder.build(&indices, 0);

        let classifier = Self {
            root,
            include_cluster: config.include_cluster_feature,
            tie_epsilon: config.tie_epsilon,
        };
        info!(
            samples = samples.len(),
            depth = classifier.depth(),
            leaves = classifier.leaves(),
            "proficiency classifier fitted"
        );
        Ok(classifier)
    }

    pub fn predict(&self, features: &FeatureVector, cluster: Option<usize>) -> Prediction {
        let row = to_row(features, cluster, self.include_cluster);
        let mut node = &self.root;
        let counts = loop {
            match node {
                Node::Leaf { counts } => break counts,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold {
                        left.as_ref()
                    } else {
                        right.as_ref()
                    };
                }
            }
        };

        let total: usize = counts.iter().sum();
        let mut probabilities = [0.0; CLASSES];
        for (p, &c) in probabilities.iter_mut().zip(counts.iter()) {
            *p = c as f64 / total.max(1) as f64;
        }

        let label = resolve_tie(&probabilities, self.tie_epsilon);
        let prediction = Prediction {
            label,
            confidence: probabilities[label.index()],
            probabilities,
        };
        debug!(?prediction, "classified learner");
        prediction
    }

    pub fn depth(&self) -> usize {
        fn walk(node: &Node) -> usize {
            match node {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(left).max(walk(right)),
            }
        }
        walk(&self.root)
    }

    pub fn leaves(&self) -> usize {
        fn walk(node: &Node) -> usize {
            match node {
                Node::Leaf { .. } => 1,
                Node::Split { left, right, .. } => walk(left) + walk(right),
            }
        }
        walk(&self.root)
    }
}

/// Among labels within `epsilon` of the top probability, the lowest tier wins.
pub fn resolve_tie(probabilities: &[f64; CLASSES], epsilon: f64) -> ProficiencyLabel {
    let top = probabilities.iter().copied().fold(f64::MIN, f64::max);
    ProficiencyLabel::ALL
        .into_iter()
        .find(|label| probabilities[label.index()] >= top - epsilon)
        .unwrap_or(ProficiencyLabel::Struggling)
}

/// Rule-based tier for learners the learners table leaves unlabelled.
pub fn heuristic_label(record: &LearnerRecord) -> Option<ProficiencyLabel> {
    let attempts = record.attempts.len();
    if attempts == 0 {
        return None;
    }
    let avg_score = record.scores().sum::<f64>() / attempts as f64;
    let avg_time = record.response_times().sum::<f64>() / attempts as f64;
    let hints = record.total_hints();

    let label = if avg_score < 60.0 && (avg_time > 70.0 || hints > 5) {
        ProficiencyLabel::Struggling
    } else if avg_score >= 85.0 && avg_time < 35.0 && hints == 0 {
        ProficiencyLabel::Advanced
    } else {
        ProficiencyLabel::Average
    };
    Some(label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QuizAttempt;

    fn features(accuracy: f64, time: f64, engagement: f64) -> FeatureVector {
        FeatureVector {
            accuracy_rate: accuracy,
            avg_response_time: time,
            engagement_score: engagement,
            attempt_count: 3,
        }
    }

    fn sample(accuracy: f64, time: f64, engagement: f64, label: ProficiencyLabel) -> TrainingSample {
        TrainingSample {
            features: features(accuracy, time, engagement),
            cluster: None,
            label,
        }
    }

    fn training_set() -> Vec<TrainingSample> {
        use ProficiencyLabel::*;
        vec![
            sample(0.48, 82.0, 62.0, Struggling),
            sample(0.42, 88.0, 55.0, Struggling),
            sample(0.55, 75.0, 60.0, Struggling),
            sample(0.75, 45.0, 78.0, Average),
            sample(0.69, 55.0, 72.0, Average),
            sample(0.72, 50.0, 70.0, Average),
            sample(0.94, 26.0, 95.0, Advanced),
            sample(0.91, 29.0, 92.0, Advanced),
            sample(0.88, 31.0, 90.0, Advanced),
        ]
    }

    #[test]
    fn strong_engaged_learner_is_advanced() {
        let model = ProficiencyClassifier::fit(&training_set(), &ClassifierConfig::default()).unwrap();
        let prediction = model.predict(&features(0.9, 30.0, 95.0), None);
        assert_eq!(prediction.label, ProficiencyLabel::Advanced);
        assert_eq!(prediction.confidence, 1.0);
    }

    #[test]
    fn fits_training_tiers() {
        let model = ProficiencyClassifier::fit(&training_set(), &ClassifierConfig::default()).unwrap();
        for sample in training_set() {
            assert_eq!(model.predict(&sample.features, None).label, sample.label);
        }
        assert!(model.depth() <= ClassifierConfig::default().max_depth);
        assert!(model.leaves() >= 3);
    }

    #[test]
    fn missing_label_class_fails_fit() {
        let samples: Vec<TrainingSample> = training_set()
            .into_iter()
            .filter(|s| s.label != ProficiencyLabel::Advanced)
            .collect();
        let err = ProficiencyClassifier::fit(&samples, &ClassifierConfig::default()).unwrap_err();
        assert!(matches!(err, PipelineError::ModelFit(ref msg) if msg.contains("Advanced")));
    }

    #[test]
    fn probabilities_cover_known_labels_only() {
        let model = ProficiencyClassifier::fit(&training_set(), &ClassifierConfig::default()).unwrap();
        for accuracy in [0.0, 0.3, 0.6, 0.8, 1.0] {
            let prediction = model.predict(&features(accuracy, 60.0, 50.0), None);
            assert!(ProficiencyLabel::ALL.contains(&prediction.label));
            let sum: f64 = prediction.probabilities.iter().sum();
            assert!((sum - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn tied_leaf_resolves_to_lower_tier() {
        use ProficiencyLabel::*;
        let samples = vec![
            sample(0.3, 90.0, 40.0, Struggling),
            sample(0.8, 40.0, 80.0, Average),
            sample(0.8, 40.0, 80.0, Advanced),
        ];
        let model = ProficiencyClassifier::fit(&samples, &ClassifierConfig::default()).unwrap();
        let prediction = model.predict(&features(0.8, 40.0, 80.0), None);
        assert_eq!(prediction.label, Average);
        assert_eq!(prediction.confidence, 0.5);
    }

    #[test]
    fn epsilon_controls_near_ties() {
        let probabilities = [0.0, 0.4, 0.6];
        assert_eq!(resolve_tie(&probabilities, 0.05), ProficiencyLabel::Advanced);
        assert_eq!(resolve_tie(&probabilities, 0.25), ProficiencyLabel::Average);
        assert_eq!(resolve_tie(&[0.5, 0.0, 0.5], 0.0), ProficiencyLabel::Struggling);
    }

    #[test]
    fn cluster_feature_is_used_when_enabled() {
        use ProficiencyLabel::*;
        let config = ClassifierConfig {
            include_cluster_feature: true,
            ..ClassifierConfig::default()
        };
        let samples: Vec<TrainingSample> = [(0, Struggling), (1, Average), (2, Advanced)]
            .into_iter()
            .map(|(cluster, label)| TrainingSample {
                features: features(0.7, 50.0, 70.0),
                cluster: Some(cluster),
                label,
            })
            .collect();
        let model = ProficiencyClassifier::fit(&samples, &config).unwrap();
        assert_eq!(model.predict(&features(0.7, 50.0, 70.0), Some(2)).label, Advanced);
        assert_eq!(model.predict(&features(0.7, 50.0, 70.0), Some(0)).label, Struggling);
    }

    fn record(rows: &[(f64, f64, u32)]) -> LearnerRecord {
        LearnerRecord {
            learner_id: "L001".to_string(),
            name: "Test".to_string(),
            reported_engagement: None,
            learning_pace: None,
            known_label: None,
            attempts: rows
                .iter()
                .map(|&(score, time, hints)| QuizAttempt {
                    topic: "Algebra".to_string(),
                    score,
                    response_time: time,
                    hints_used: hints,
                    retries: 0,
                    taken_on: None,
                })
                .collect(),
        }
    }

    #[test]
    fn heuristic_labels_follow_thresholds() {
        assert_eq!(heuristic_label(&record(&[])), None);
        assert_eq!(
            heuristic_label(&record(&[(45.0, 85.0, 8), (52.0, 78.0, 6)])),
            Some(ProficiencyLabel::Struggling)
        );
        assert_eq!(
            heuristic_label(&record(&[(92.0, 28.0, 0), (95.0, 25.0, 0)])),
            Some(ProficiencyLabel::Advanced)
        );
        assert_eq!(
            heuristic_label(&record(&[(92.0, 28.0, 1)])),
            Some(ProficiencyLabel::Average)
        );
        assert_eq!(
            heuristic_label(&record(&[(55.0, 40.0, 2)])),
            Some(ProficiencyLabel::Average)
        );
    }
}
