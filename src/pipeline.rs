use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::classifier::{self, ProficiencyClassifier, TrainingSample};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::features;
use crate::loader::Dataset;
use crate::models::{FeatureVector, LearnerRecord, Recommendation};
use crate::recommend;
use crate::report::{self, Assessment, BatchReport};
use crate::segmentation::SegmentationModel;

/// Fitted models for one run. Built fresh from the population every time.
#[derive(Debug, Clone)]
pub struct ModelBundle {
    pub segmentation: SegmentationModel,
    pub classifier: ProficiencyClassifier,
}

impl ModelBundle {
    pub fn fit(profiles: &[(&LearnerRecord, FeatureVector)], config: &PipelineConfig) -> Result<Self> {
        let population: Vec<(String, FeatureVector)> = profiles
            .iter()
            .map(|(record, features)| (record.learner_id.clone(), *features))
            .collect();
        let segmentation = SegmentationModel::fit(&population, &config.segmentation)?;

        let mut heuristic = 0usize;
        let samples: Vec<TrainingSample> = profiles
            .iter()
            .filter_map(|(record, features)| {
                let label = record.known_label.or_else(|| {
                    if !config.classifier.heuristic_labels {
                        return None;
                    }
                    heuristic += 1;
                    classifier::heuristic_label(record)
                })?;
                Some(TrainingSample {
                    features: *features,
                    cluster: segmentation.cluster_of(&record.learner_id),
                    label,
                })
            })
            .collect();
        info!(
            samples = samples.len(),
            heuristic_labels = heuristic,
            "training proficiency classifier"
        );

        let classifier = ProficiencyClassifier::fit(&samples, &config.classifier)?;
        Ok(Self {
            segmentation,
            classifier,
        })
    }

    pub fn assess(
        &self,
        record: &LearnerRecord,
        features: FeatureVector,
        names: &HashMap<&str, &str>,
        config: &PipelineConfig,
    ) -> (Assessment, Recommendation) {
        let cluster = self
            .segmentation
            .cluster_of(&record.learner_id)
            .unwrap_or_else(|| self.segmentation.predict(&features));
        let prediction = self.classifier.predict(&features, Some(cluster));
        let recommendation = recommend::recommend(
            prediction.label,
            &record.topic_accuracy(),
            &config.recommendation,
        );

        let latest_score = record.latest_attempt().map(|attempt| attempt.score / 100.0);
        let focus_topic = recommendation
            .path_topics
            .first()
            .map(String::as_str)
            .unwrap_or("General");

        let assessment = Assessment {
            features,
            cluster,
            peers: self
                .segmentation
                .peers(&record.learner_id)
                .into_iter()
                .map(|id| names.get(id).copied().unwrap_or(id).to_string())
                .collect(),
            prediction,
            adaptation: recommend::adapt_content(
                prediction.label,
                latest_score,
                &config.recommendation,
            ),
            resources: recommend::study_resources(prediction.label, focus_topic),
        };
        (assessment, recommendation)
    }
}

/// Extract, fit, classify, recommend and report over the whole dataset.
pub fn run(dataset: &Dataset, config: &PipelineConfig) -> Result<BatchReport> {
    let reference = features::reference_date(&dataset.learners, config.as_of);

    let mut extracted: Vec<Option<FeatureVector>> = Vec::with_capacity(dataset.learners.len());
    for record in &dataset.learners {
        match features::extract(record, reference, &config.engagement) {
            Ok(features) => extracted.push(Some(features)),
            Err(err @ PipelineError::InsufficientData { .. }) => {
                warn!(error = %err, "learner excluded from model fit");
                extracted.push(None);
            }
            Err(err) => return Err(err),
        }
    }

    let profiles: Vec<(&LearnerRecord, FeatureVector)> = dataset
        .learners
        .iter()
        .zip(extracted.iter())
        .filter_map(|(record, features)| features.map(|f| (record, f)))
        .collect();
    let models = ModelBundle::fit(&profiles, config)?;
    debug!(
        assignments = ?models.segmentation.assignments(),
        inertia = models.segmentation.inertia(),
        "learners segmented"
    );
    if dataset.questions.is_empty() {
        warn!("question bank is empty, next-quiz lists will be empty");
    }

    let names: HashMap<&str, &str> = dataset
        .learners
        .iter()
        .map(|r| (r.learner_id.as_str(), r.name.as_str()))
        .collect();
    let quiz_length = config.recommendation.quiz_length;

    let learners = dataset
        .learners
        .iter()
        .zip(extracted)
        .map(|(record, features)| match features {
            Some(features) => {
                let (assessment, recommendation) =
                    models.assess(record, features, &names, config);
                let quiz = dataset.questions.plan_quiz(&recommendation, quiz_length);
                report::learner_report(record, Some(assessment), &recommendation, &quiz)
            }
            None => {
                let recommendation = Recommendation::insufficient_history();
                let quiz = dataset.questions.plan_quiz(&recommendation, quiz_length);
                report::learner_report(record, None, &recommendation, &quiz)
            }
        })
        .collect();

    let batch = BatchReport {
        reference_date: reference,
        clusters: report::cluster_summaries(
            &models.segmentation.centroids(),
            &models.segmentation.cluster_sizes(),
        ),
        learners,
        malformed_rows: dataset.malformed_rows,
    };
    info!(
        learners = batch.learners.len(),
        insufficient_history = batch.insufficient_history(),
        "pipeline run complete"
    );
    Ok(batch)
}
