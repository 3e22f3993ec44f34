use std::collections::{BTreeMap, BTreeSet};

use crate::config::RecommendationConfig;
use crate::models::{
    ContentAdaptation, ContentFormat, Difficulty, Priority, ProficiencyLabel, Recommendation,
    RecommendationStatus, StudyResource,
};

const STD_DEV_SLACK: f64 = 1e-9;

/// Topics ordered by ascending accuracy, ties broken by name.
fn ranked(topic_accuracy: &BTreeMap<String, f64>) -> Vec<(&str, f64)> {
    let mut topics: Vec<(&str, f64)> = topic_accuracy
        .iter()
        .map(|(topic, &accuracy)| (topic.as_str(), accuracy))
        .collect();
    topics.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0)));
    topics
}

pub fn recommend(
    label: ProficiencyLabel,
    topic_accuracy: &BTreeMap<String, f64>,
    config: &RecommendationConfig,
) -> Recommendation {
    if topic_accuracy.is_empty() {
        return Recommendation::insufficient_history();
    }

    let topics = ranked(topic_accuracy);
    let (next_difficulty, path_topics): (Difficulty, Vec<String>) = match label {
        ProficiencyLabel::Struggling => (
            Difficulty::Easy,
            topics.iter().take(2).map(|(t, _)| t.to_string()).collect(),
        ),
        ProficiencyLabel::Average => {
            let n = topics.len() as f64;
            let mean = topics.iter().map(|(_, a)| a).sum::<f64>() / n;
            let std_dev = (topics.iter().map(|(_, a)| (a - mean).powi(2)).sum::<f64>() / n).sqrt();
            (
                Difficulty::Medium,
                topics
                    .iter()
                    .filter(|(_, a)| (a - mean).abs() <= std_dev + STD_DEV_SLACK)
                    .map(|(t, _)| t.to_string())
                    .collect(),
            )
        }
        ProficiencyLabel::Advanced => {
            let path = match topics.first() {
                Some((topic, accuracy)) if *accuracy < config.high_threshold => {
                    vec![topic.to_string()]
                }
                _ => vec![config.enrichment_topic.clone()],
            };
            (Difficulty::Hard, path)
        }
    };

    let strengths: BTreeSet<String> = topics
        .iter()
        .filter(|(_, a)| *a >= config.high_threshold)
        .map(|(t, _)| t.to_string())
        .collect();
    let weaknesses: BTreeSet<String> = topics
        .iter()
        .filter(|(_, a)| *a <= config.low_threshold)
        .map(|(t, _)| t.to_string())
        .collect();

    Recommendation {
        next_difficulty,
        path_topics,
        strengths,
        weaknesses,
        status: RecommendationStatus::Personalized,
    }
}

/// Presentation hints for the next session. `latest_score` is a fraction.
pub fn adapt_content(
    label: ProficiencyLabel,
    latest_score: Option<f64>,
    config: &RecommendationConfig,
) -> ContentAdaptation {
    let revision_needed = latest_score.is_some_and(|score| score < config.revision_threshold);
    match label {
        ProficiencyLabel::Struggling => ContentAdaptation {
            content_format: ContentFormat::Visual,
            challenge_mode: false,
            provide_hints: true,
            revision_needed,
        },
        ProficiencyLabel::Average => ContentAdaptation {
            content_format: ContentFormat::Text,
            challenge_mode: false,
            provide_hints: true,
            revision_needed,
        },
        ProficiencyLabel::Advanced => ContentAdaptation {
            content_format: ContentFormat::Text,
            challenge_mode: true,
            provide_hints: false,
            revision_needed,
        },
    }
}

fn resource(
    kind: &'static str,
    title: String,
    description: &'static str,
    priority: Priority,
) -> StudyResource {
    StudyResource {
        kind,
        title,
        description,
        priority,
    }
}

pub fn study_resources(label: ProficiencyLabel, focus_topic: &str) -> Vec<StudyResource> {
    use Priority::{High, Medium};

    match label {
        ProficiencyLabel::Struggling => vec![
            resource(
                "Video Tutorial",
                format!("Visual Guide to {focus_topic} Basics"),
                "Step-by-step visual explanation with examples",
                High,
            ),
            resource(
                "Guided Practice",
                "Interactive Practice Problems".to_string(),
                "Practice with instant feedback and hints",
                High,
            ),
            resource(
                "Revision Summary",
                format!("{focus_topic} Key Concepts Review"),
                "Quick reference sheet with formulas and examples",
                Medium,
            ),
            resource(
                "Focus Session",
                "One-on-One Tutoring Recommended".to_string(),
                "Personalized help with difficult concepts",
                High,
            ),
        ],
        ProficiencyLabel::Average => vec![
            resource(
                "Practice Set",
                format!("{focus_topic} Mixed Practice"),
                "Variety of problems to strengthen skills",
                High,
            ),
            resource(
                "Concept Review",
                "Video Review of Key Topics".to_string(),
                "Refresh your understanding",
                Medium,
            ),
            resource(
                "Skill Builder",
                "Targeted Improvement Exercises".to_string(),
                "Focus on areas needing work",
                High,
            ),
            resource(
                "Quick Quiz",
                "Daily Challenge".to_string(),
                "Keep your skills sharp with daily practice",
                Medium,
            ),
        ],
        ProficiencyLabel::Advanced => vec![
            resource(
                "Challenge Problem",
                format!("Advanced {focus_topic} Competition Problems"),
                "Olympiad-level questions to test your skills",
                High,
            ),
            resource(
                "Research Project",
                "Real-World Application Project".to_string(),
                "Apply concepts to solve real problems",
                Medium,
            ),
            resource(
                "Peer Teaching",
                "Help Others Learn".to_string(),
                "Reinforce your knowledge by teaching peers",
                Medium,
            ),
            resource(
                "Advanced Topics",
                format!("Next Level: Beyond {focus_topic}"),
                "Explore university-level concepts",
                High,
            ),
        ],
    }
}
