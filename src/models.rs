use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ProficiencyLabel {
    Struggling,
    Average,
    Advanced,
}

impl ProficiencyLabel {
    /// Ordered from the lowest tier to the highest.
    pub const ALL: [ProficiencyLabel; 3] = [Self::Struggling, Self::Average, Self::Advanced];

    pub fn index(self) -> usize {
        match self {
            Self::Struggling => 0,
            Self::Average => 1,
            Self::Advanced => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Struggling => "Struggling",
            Self::Average => "Average",
            Self::Advanced => "Advanced",
        }
    }

    /// Accepts `Advanced`, `advanced learner`, `Struggling Learner` and so on.
    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_lowercase();
        let head = normalized
            .strip_suffix("learner")
            .unwrap_or(&normalized)
            .trim();
        match head {
            "struggling" => Some(Self::Struggling),
            "average" => Some(Self::Average),
            "advanced" => Some(Self::Advanced),
            _ => None,
        }
    }
}

impl fmt::Display for ProficiencyLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "easy" => Some(Self::Easy),
            "medium" | "mid" => Some(Self::Medium),
            "hard" => Some(Self::Hard),
            _ => None,
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuizAttempt {
    pub topic: String,
    /// Percentage of correct answers, 0-100.
    pub score: f64,
    /// Mean seconds per question.
    pub response_time: f64,
    pub hints_used: u32,
    pub retries: u32,
    pub taken_on: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LearnerRecord {
    pub learner_id: String,
    pub name: String,
    pub reported_engagement: Option<f64>,
    pub learning_pace: Option<String>,
    pub known_label: Option<ProficiencyLabel>,
    pub attempts: Vec<QuizAttempt>,
}

impl LearnerRecord {
    pub fn scores(&self) -> impl Iterator<Item = f64> + '_ {
        self.attempts.iter().map(|attempt| attempt.score)
    }

    pub fn response_times(&self) -> impl Iterator<Item = f64> + '_ {
        self.attempts.iter().map(|attempt| attempt.response_time)
    }

    pub fn topics(&self) -> BTreeSet<&str> {
        self.attempts
            .iter()
            .map(|attempt| attempt.topic.as_str())
            .collect()
    }

    pub fn total_hints(&self) -> u32 {
        self.attempts.iter().map(|attempt| attempt.hints_used).sum()
    }

    pub fn latest_attempt_date(&self) -> Option<NaiveDate> {
        self.attempts.iter().filter_map(|attempt| attempt.taken_on).max()
    }

    pub fn latest_attempt(&self) -> Option<&QuizAttempt> {
        self.attempts.last()
    }

    /// Mean accuracy per topic, in [0, 1].
    pub fn topic_accuracy(&self) -> BTreeMap<String, f64> {
        let mut totals: BTreeMap<String, (f64, usize)> = BTreeMap::new();
        for attempt in &self.attempts {
            let entry = totals.entry(attempt.topic.clone()).or_insert((0.0, 0));
            entry.0 += attempt.score;
            entry.1 += 1;
        }

        totals
            .into_iter()
            .map(|(topic, (sum, count))| (topic, (sum / count as f64 / 100.0).clamp(0.0, 1.0)))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureVector {
    pub accuracy_rate: f64,
    pub avg_response_time: f64,
    pub engagement_score: f64,
    pub attempt_count: usize,
}

impl FeatureVector {
    pub const DIM: usize = 4;

    pub fn as_array(&self) -> [f64; Self::DIM] {
        [
            self.accuracy_rate,
            self.avg_response_time,
            self.engagement_score,
            self.attempt_count as f64,
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterAssignment {
    pub learner_id: String,
    pub cluster: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecommendationStatus {
    Personalized,
    InsufficientHistory,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub next_difficulty: Difficulty,
    pub path_topics: Vec<String>,
    pub strengths: BTreeSet<String>,
    pub weaknesses: BTreeSet<String>,
    pub status: RecommendationStatus,
}

impl Recommendation {
    pub fn insufficient_history() -> Self {
        Self {
            next_difficulty: Difficulty::Easy,
            path_topics: Vec::new(),
            strengths: BTreeSet::new(),
            weaknesses: BTreeSet::new(),
            status: RecommendationStatus::InsufficientHistory,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentFormat {
    Visual,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentAdaptation {
    pub content_format: ContentFormat,
    pub challenge_mode: bool,
    pub provide_hints: bool,
    pub revision_needed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Priority {
    High,
    Medium,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StudyResource {
    pub kind: &'static str,
    pub title: String,
    pub description: &'static str,
    pub priority: Priority,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Question {
    pub question_id: String,
    pub topic: String,
    pub difficulty: Difficulty,
    pub prompt: String,
    pub options: [String; 4],
    pub correct_index: usize,
    pub hint: String,
    pub explanation: String,
}
