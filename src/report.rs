use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::Path;

use chrono::NaiveDate;
use serde::Serialize;

use crate::classifier::Prediction;
use crate::error::{PipelineError, Result};
use crate::models::{
    ContentAdaptation, Difficulty, FeatureVector, LearnerRecord, ProficiencyLabel, Question,
    QuizAttempt, Recommendation, RecommendationStatus, StudyResource,
};

pub const INSUFFICIENT_HISTORY: &str = "insufficient-history";

#[derive(Debug, Clone, Serialize)]
pub struct LearnerReport {
    pub learner_id: String,
    pub name: String,
    pub status: &'static str,
    pub learning_pace: Option<String>,
    pub reported_engagement: Option<f64>,
    pub cluster: Option<usize>,
    pub peers: Vec<String>,
    pub proficiency: Option<ProficiencyLabel>,
    pub confidence: Option<f64>,
    pub accuracy_pct: Option<f64>,
    pub avg_response_time: Option<f64>,
    pub engagement: Option<f64>,
    pub attempts: usize,
    pub retries: u32,
    pub topics: Vec<String>,
    pub next_difficulty: Difficulty,
    pub path_topics: Vec<String>,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub adaptation: Option<ContentAdaptation>,
    pub resources: Vec<StudyResource>,
    pub next_quiz: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterSummary {
    pub cluster: usize,
    pub size: usize,
    pub accuracy_pct: f64,
    pub avg_response_time: f64,
    pub engagement: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub reference_date: Option<NaiveDate>,
    pub clusters: Vec<ClusterSummary>,
    pub learners: Vec<LearnerReport>,
    pub malformed_rows: usize,
}

/// Model output for a learner that had enough history to be assessed.
#[derive(Debug, Clone)]
pub struct Assessment {
    pub features: FeatureVector,
    pub cluster: usize,
    pub peers: Vec<String>,
    pub prediction: Prediction,
    pub adaptation: ContentAdaptation,
    pub resources: Vec<StudyResource>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    All,
    Learner(String),
    Cluster(usize),
}

impl Scope {
    pub fn label(&self) -> String {
        match self {
            Scope::All => "all learners".to_string(),
            Scope::Learner(id) => format!("learner {id}"),
            Scope::Cluster(cluster) => format!("cluster {cluster}"),
        }
    }

    fn includes(&self, report: &LearnerReport) -> bool {
        match self {
            Scope::All => true,
            Scope::Learner(id) => &report.learner_id == id,
            Scope::Cluster(cluster) => report.cluster == Some(*cluster),
        }
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

pub fn learner_report(
    record: &LearnerRecord,
    assessment: Option<Assessment>,
    recommendation: &Recommendation,
    next_quiz: &[&Question],
) -> LearnerReport {
    let status = match recommendation.status {
        RecommendationStatus::Personalized => "ok",
        RecommendationStatus::InsufficientHistory => INSUFFICIENT_HISTORY,
    };

    let mut report = LearnerReport {
        learner_id: record.learner_id.clone(),
        name: record.name.clone(),
        status,
        learning_pace: record.learning_pace.clone(),
        reported_engagement: record.reported_engagement,
        cluster: None,
        peers: Vec::new(),
        proficiency: None,
        confidence: None,
        accuracy_pct: None,
        avg_response_time: None,
        engagement: None,
        attempts: record.attempts.len(),
        retries: record.attempts.iter().map(|attempt| attempt.retries).sum(),
        topics: record.topics().into_iter().map(str::to_string).collect(),
        next_difficulty: recommendation.next_difficulty,
        path_topics: recommendation.path_topics.clone(),
        strengths: recommendation.strengths.iter().cloned().collect(),
        weaknesses: recommendation.weaknesses.iter().cloned().collect(),
        adaptation: None,
        resources: Vec::new(),
        next_quiz: next_quiz.iter().map(|q| q.question_id.clone()).collect(),
    };

    if let Some(assessment) = assessment {
        report.cluster = Some(assessment.cluster);
        report.peers = assessment.peers;
        report.proficiency = Some(assessment.prediction.label);
        report.confidence = Some(round_to(assessment.prediction.confidence, 2));
        report.accuracy_pct = Some(round_to(assessment.features.accuracy_rate * 100.0, 1));
        report.avg_response_time = Some(round_to(assessment.features.avg_response_time, 1));
        report.engagement = Some(assessment.features.engagement_score.round());
        report.adaptation = Some(assessment.adaptation);
        report.resources = assessment.resources;
    }

    report
}

pub fn cluster_summaries(centroids: &[FeatureVector], sizes: &[usize]) -> Vec<ClusterSummary> {
    centroids
        .iter()
        .zip(sizes.iter())
        .enumerate()
        .map(|(cluster, (centroid, &size))| ClusterSummary {
            cluster,
            size,
            accuracy_pct: round_to(centroid.accuracy_rate * 100.0, 1),
            avg_response_time: round_to(centroid.avg_response_time, 1),
            engagement: round_to(centroid.engagement_score, 1),
        })
        .collect()
}

impl BatchReport {
    pub fn filtered(mut self, scope: &Scope) -> Self {
        self.learners.retain(|report| scope.includes(report));
        self
    }

    pub fn tier_mix(&self) -> BTreeMap<ProficiencyLabel, usize> {
        let mut mix = BTreeMap::new();
        for report in &self.learners {
            if let Some(label) = report.proficiency {
                *mix.entry(label).or_insert(0) += 1;
            }
        }
        mix
    }

    pub fn insufficient_history(&self) -> usize {
        self.learners
            .iter()
            .filter(|r| r.status == INSUFFICIENT_HISTORY)
            .count()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// One line per learner, for terminal output.
pub fn summary_line(report: &LearnerReport) -> String {
    match (report.proficiency, report.cluster) {
        (Some(label), Some(cluster)) => format!(
            "- {} ({}) {} [{:.0}%] cluster {} | accuracy {:.1}% | next {} on {}",
            report.name,
            report.learner_id,
            label,
            report.confidence.unwrap_or(0.0) * 100.0,
            cluster,
            report.accuracy_pct.unwrap_or(0.0),
            report.next_difficulty,
            join_or(&report.path_topics, "-"),
        ),
        _ => format!(
            "- {} ({}) {}: start with an {} quiz",
            report.name, report.learner_id, INSUFFICIENT_HISTORY, report.next_difficulty
        ),
    }
}

fn join_or(items: &[String], empty: &str) -> String {
    if items.is_empty() {
        empty.to_string()
    } else {
        items.join(", ")
    }
}

pub fn build_report(batch: &BatchReport, scope: &Scope) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Learner Insights Report");
    match batch.reference_date {
        Some(date) => {
            let _ = writeln!(output, "Generated for {} (activity as of {})", scope.label(), date);
        }
        None => {
            let _ = writeln!(output, "Generated for {} (no dated activity)", scope.label());
        }
    }
    let _ = writeln!(output);

    let _ = writeln!(output, "## Learner Segments");
    if batch.clusters.is_empty() {
        let _ = writeln!(output, "No clusters fitted.");
    } else {
        for cluster in &batch.clusters {
            let _ = writeln!(
                output,
                "- Cluster {}: {} learners (accuracy {:.1}%, response {:.1}s, engagement {:.1})",
                cluster.cluster,
                cluster.size,
                cluster.accuracy_pct,
                cluster.avg_response_time,
                cluster.engagement
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Proficiency Mix");
    let mix = batch.tier_mix();
    if mix.is_empty() {
        let _ = writeln!(output, "No learners classified in this scope.");
    } else {
        for (label, count) in mix {
            let _ = writeln!(output, "- {label}: {count} learners");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Learners");
    if batch.learners.is_empty() {
        let _ = writeln!(output, "No learners in this scope.");
    }
    for report in &batch.learners {
        let _ = writeln!(output);
        let _ = writeln!(output, "### {} ({})", report.name, report.learner_id);

        let Some(label) = report.proficiency else {
            let _ = writeln!(
                output,
                "Status: {}. No quiz attempts recorded yet; start with an {} quiz.",
                INSUFFICIENT_HISTORY, report.next_difficulty
            );
            if !report.next_quiz.is_empty() {
                let _ = writeln!(output, "- Next quiz: {}", report.next_quiz.join(", "));
            }
            continue;
        };

        let _ = writeln!(
            output,
            "- Proficiency: {} (confidence {:.2})",
            label,
            report.confidence.unwrap_or(0.0)
        );
        if let Some(cluster) = report.cluster {
            let _ = writeln!(
                output,
                "- Cluster: {} (peers: {})",
                cluster,
                join_or(&report.peers, "none")
            );
        }
        let _ = writeln!(
            output,
            "- Accuracy {:.1}% across {} attempts, avg response {:.1}s, engagement {:.0}/100",
            report.accuracy_pct.unwrap_or(0.0),
            report.attempts,
            report.avg_response_time.unwrap_or(0.0),
            report.engagement.unwrap_or(0.0)
        );
        let _ = writeln!(output, "- Next quiz difficulty: {}", report.next_difficulty);
        let _ = writeln!(output, "- Learning path: {}", join_or(&report.path_topics, "-"));
        let _ = writeln!(output, "- Strengths: {}", join_or(&report.strengths, "none yet"));
        let _ = writeln!(output, "- Weaknesses: {}", join_or(&report.weaknesses, "none"));
        if let Some(adaptation) = &report.adaptation {
            let _ = writeln!(
                output,
                "- Delivery: {:?} content, hints {}, challenge mode {}{}",
                adaptation.content_format,
                if adaptation.provide_hints { "on" } else { "off" },
                if adaptation.challenge_mode { "on" } else { "off" },
                if adaptation.revision_needed {
                    ", revision recommended"
                } else {
                    ""
                }
            );
        }
        for resource in report.resources.iter().take(2) {
            let _ = writeln!(
                output,
                "- {:?} priority {}: {}",
                resource.priority, resource.kind, resource.title
            );
        }
        if !report.next_quiz.is_empty() {
            let _ = writeln!(output, "- Next quiz: {}", report.next_quiz.join(", "));
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Data Quality");
    let _ = writeln!(
        output,
        "- {} learners with insufficient history",
        batch.insufficient_history()
    );
    let _ = writeln!(output, "- {} malformed rows skipped", batch.malformed_rows);

    output
}

#[derive(Serialize)]
struct ExportRow<'a> {
    learner_id: &'a str,
    learner_name: &'a str,
    engagement_score: Option<f64>,
    learning_pace: Option<&'a str>,
    classification: Option<String>,
    derived_engagement: Option<f64>,
    strengths: String,
    weaknesses: String,
}

#[derive(Serialize)]
struct HistoryRow<'a> {
    learner_id: &'a str,
    topic: &'a str,
    accuracy: f64,
    avg_time: f64,
    hints_used: u32,
    retries: u32,
    date: Option<NaiveDate>,
}

fn create_writer(path: &Path) -> Result<csv::Writer<std::fs::File>> {
    let file = std::fs::File::create(path).map_err(|source| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(csv::Writer::from_writer(file))
}

fn finish(mut writer: csv::Writer<std::fs::File>, path: &Path) -> Result<()> {
    writer.flush().map_err(|source| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes the learners-table layout so the export can be loaded again.
/// `engagement_score` stays the reported value; the computed score goes in
/// `derived_engagement`.
pub fn write_export(batch: &BatchReport, path: &Path) -> Result<usize> {
    let mut writer = create_writer(path)?;

    for report in &batch.learners {
        writer.serialize(ExportRow {
            learner_id: &report.learner_id,
            learner_name: &report.name,
            engagement_score: report.reported_engagement,
            learning_pace: report.learning_pace.as_deref(),
            classification: report.proficiency.map(|label| format!("{label} Learner")),
            derived_engagement: report.engagement,
            strengths: report.strengths.join(","),
            weaknesses: report.weaknesses.join(","),
        })?;
    }

    finish(writer, path)?;
    Ok(batch.learners.len())
}

/// Writes every attempt in the quiz-attempts layout, oldest first and
/// undated attempts last.
pub fn write_quiz_history(learners: &[LearnerRecord], path: &Path) -> Result<usize> {
    let mut history: Vec<(&str, &QuizAttempt)> = learners
        .iter()
        .flat_map(|learner| {
            learner
                .attempts
                .iter()
                .map(move |attempt| (learner.learner_id.as_str(), attempt))
        })
        .collect();
    history.sort_by_key(|(_, attempt)| (attempt.taken_on.is_none(), attempt.taken_on));

    let mut writer = create_writer(path)?;
    for &(learner_id, attempt) in &history {
        writer.serialize(HistoryRow {
            learner_id,
            topic: &attempt.topic,
            accuracy: attempt.score,
            avg_time: attempt.response_time,
            hints_used: attempt.hints_used,
            retries: attempt.retries,
            date: attempt.taken_on,
        })?;
    }

    finish(writer, path)?;
    Ok(history.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContentFormat;
    use std::collections::BTreeSet;

    fn record(id: &str, attempts: usize) -> LearnerRecord {
        LearnerRecord {
            learner_id: id.to_string(),
            name: format!("Learner {id}"),
            reported_engagement: Some(70.0),
            learning_pace: Some("moderate".to_string()),
            known_label: None,
            attempts: (0..attempts)
                .map(|_| QuizAttempt {
                    topic: "Geometry".to_string(),
                    score: 90.0,
                    response_time: 30.0,
                    hints_used: 0,
                    retries: 0,
                    taken_on: None,
                })
                .collect(),
        }
    }

    fn assessment() -> Assessment {
        Assessment {
            features: FeatureVector {
                accuracy_rate: 0.90333,
                avg_response_time: 26.3333,
                engagement_score: 94.6,
                attempt_count: 3,
            },
            cluster: 2,
            peers: vec!["Dana".to_string()],
            prediction: Prediction {
                label: ProficiencyLabel::Advanced,
                confidence: 0.666666,
                probabilities: [0.0, 0.333333, 0.666666],
            },
            adaptation: ContentAdaptation {
                content_format: ContentFormat::Text,
                challenge_mode: true,
                provide_hints: false,
                revision_needed: false,
            },
            resources: Vec::new(),
        }
    }

    fn advanced_recommendation() -> Recommendation {
        Recommendation {
            next_difficulty: Difficulty::Hard,
            path_topics: vec!["Enrichment Challenges".to_string()],
            strengths: BTreeSet::from(["Geometry".to_string()]),
            weaknesses: BTreeSet::new(),
            status: RecommendationStatus::Personalized,
        }
    }

    fn batch() -> BatchReport {
        BatchReport {
            reference_date: NaiveDate::from_ymd_opt(2026, 1, 14),
            clusters: cluster_summaries(
                &[FeatureVector {
                    accuracy_rate: 0.9,
                    avg_response_time: 27.0,
                    engagement_score: 93.0,
                    attempt_count: 3,
                }],
                &[1],
            ),
            learners: vec![
                learner_report(
                    &record("L003", 3),
                    Some(assessment()),
                    &advanced_recommendation(),
                    &[],
                ),
                learner_report(
                    &record("L005", 0),
                    None,
                    &Recommendation::insufficient_history(),
                    &[],
                ),
            ],
            malformed_rows: 2,
        }
    }

    #[test]
    fn rounds_presentation_fields() {
        let report = &batch().learners[0];
        assert_eq!(report.status, "ok");
        assert_eq!(report.accuracy_pct, Some(90.3));
        assert_eq!(report.avg_response_time, Some(26.3));
        assert_eq!(report.engagement, Some(95.0));
        assert_eq!(report.confidence, Some(0.67));
        assert_eq!(report.strengths, vec!["Geometry"]);
    }

    #[test]
    fn learners_without_history_are_flagged() {
        let report = &batch().learners[1];
        assert_eq!(report.status, INSUFFICIENT_HISTORY);
        assert_eq!(report.proficiency, None);
        assert!(summary_line(report).contains(INSUFFICIENT_HISTORY));
    }

    #[test]
    fn markdown_lists_segments_and_learners() {
        let markdown = build_report(&batch(), &Scope::All);
        assert!(markdown.contains("# Learner Insights Report"));
        assert!(markdown.contains("- Cluster 0: 1 learners"));
        assert!(markdown.contains("- Advanced: 1 learners"));
        assert!(markdown.contains("### Learner L003 (L003)"));
        assert!(markdown.contains("- Next quiz difficulty: hard"));
        assert!(markdown.contains("Status: insufficient-history"));
        assert!(markdown.contains("- 2 malformed rows skipped"));
    }

    #[test]
    fn scope_filters_learners() {
        let only_cluster = batch().filtered(&Scope::Cluster(2));
        assert_eq!(only_cluster.learners.len(), 1);
        let only_learner = batch().filtered(&Scope::Learner("L005".to_string()));
        assert_eq!(only_learner.learners[0].learner_id, "L005");
    }

    #[test]
    fn json_carries_status_and_label() {
        let json = batch().to_json().unwrap();
        assert!(json.contains("\"status\": \"insufficient-history\""));
        assert!(json.contains("\"proficiency\": \"Advanced\""));
    }

    #[test]
    fn export_reloads_as_learners_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.csv");
        assert_eq!(write_export(&batch(), &path).unwrap(), 2);

        let (learners, skipped) = crate::loader::read_learners(&path).unwrap();
        assert_eq!(skipped, 0);
        assert_eq!(learners[0].known_label, Some(ProficiencyLabel::Advanced));
        assert_eq!(learners[0].reported_engagement, Some(70.0));
        assert_eq!(learners[1].known_label, None);
        assert_eq!(learners[1].reported_engagement, Some(70.0));

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.lines().next().unwrap().contains("derived_engagement"));
        assert!(raw.contains(",95.0,") || raw.contains(",95,"));
    }

    #[test]
    fn quiz_history_reloads_as_attempts_in_date_order() {
        let dated = |topic: &str, day: u32| QuizAttempt {
            topic: topic.to_string(),
            score: 80.0,
            response_time: 32.5,
            hints_used: 1,
            retries: 2,
            taken_on: NaiveDate::from_ymd_opt(2026, 1, day),
        };
        let mut first = record("L001", 0);
        first.attempts = vec![dated("Algebra", 12), dated("Geometry", 14)];
        let mut second = record("L002", 0);
        second.attempts = vec![
            dated("Statistics", 10),
            QuizAttempt {
                taken_on: None,
                ..dated("Calculus", 1)
            },
        ];

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quiz_history.csv");
        assert_eq!(write_quiz_history(&[first, second], &path).unwrap(), 4);

        let (attempts, skipped) = crate::loader::read_attempts(&path).unwrap();
        assert_eq!(skipped, 0);
        let order: Vec<(&str, &str)> = attempts
            .iter()
            .map(|(id, attempt)| (id.as_str(), attempt.topic.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("L002", "Statistics"),
                ("L001", "Algebra"),
                ("L001", "Geometry"),
                ("L002", "Calculus"),
            ]
        );
        assert_eq!(attempts[0].1.retries, 2);
        assert_eq!(attempts[0].1.response_time, 32.5);
        assert_eq!(attempts[3].1.taken_on, None);
    }
}
