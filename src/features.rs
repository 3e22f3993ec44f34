use chrono::NaiveDate;

use crate::config::EngagementConfig;
use crate::error::{PipelineError, Result};
use crate::models::{FeatureVector, LearnerRecord};

pub fn extract(
    record: &LearnerRecord,
    reference: Option<NaiveDate>,
    config: &EngagementConfig,
) -> Result<FeatureVector> {
    let attempt_count = record.attempts.len();
    if attempt_count == 0 {
        return Err(PipelineError::InsufficientData {
            learner_id: record.learner_id.clone(),
        });
    }

    let total_score: f64 = record.scores().sum();
    let accuracy_rate = (total_score / (100.0 * attempt_count as f64)).clamp(0.0, 1.0);
    let avg_response_time =
        (record.response_times().sum::<f64>() / attempt_count as f64).max(0.0);

    Ok(FeatureVector {
        accuracy_rate,
        avg_response_time,
        engagement_score: engagement_score(record, reference, config),
        attempt_count,
    })
}

/// Activity from attempt frequency and recency, blended with the reported
/// engagement when the learners table carries one.
pub fn engagement_score(
    record: &LearnerRecord,
    reference: Option<NaiveDate>,
    config: &EngagementConfig,
) -> f64 {
    let frequency =
        (record.attempts.len() as f64 / config.target_attempts.max(1) as f64).min(1.0);
    let recency = match (record.latest_attempt_date(), reference) {
        (Some(latest), Some(reference)) => recency_weight((reference - latest).num_days()),
        _ => recency_weight(i64::MAX),
    };

    let weight_sum = config.frequency_weight + config.recency_weight;
    let activity = if weight_sum > 0.0 {
        100.0 * (config.frequency_weight * frequency + config.recency_weight * recency)
            / weight_sum
    } else {
        0.0
    };

    let score = match record.reported_engagement {
        Some(reported) => {
            config.reported_weight * reported + (1.0 - config.reported_weight) * activity
        }
        None => activity,
    };
    score.clamp(0.0, 100.0)
}

pub fn recency_weight(days_ago: i64) -> f64 {
    match days_ago.max(0) {
        0..=7 => 1.0,
        8..=30 => 0.7,
        31..=60 => 0.4,
        _ => 0.2,
    }
}

/// The configured date, else the most recent attempt across all learners.
pub fn reference_date<'a>(
    learners: impl IntoIterator<Item = &'a LearnerRecord>,
    as_of: Option<NaiveDate>,
) -> Option<NaiveDate> {
    as_of.or_else(|| {
        learners
            .into_iter()
            .filter_map(LearnerRecord::latest_attempt_date)
            .max()
    })
}
