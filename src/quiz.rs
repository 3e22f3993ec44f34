use std::collections::{BTreeMap, HashSet};

use crate::models::{Difficulty, Question, Recommendation, RecommendationStatus};

/// Questions indexed by topic and difficulty, each bucket ordered by id.
#[derive(Debug, Clone, Default)]
pub struct QuestionBank {
    by_topic: BTreeMap<String, BTreeMap<Difficulty, BTreeMap<String, Question>>>,
    ids: HashSet<String>,
}

impl QuestionBank {
    /// Hands the question back if its id is already taken.
    pub fn insert(&mut self, question: Question) -> Result<(), Question> {
        if !self.ids.insert(question.question_id.clone()) {
            return Err(question);
        }
        self.by_topic
            .entry(question.topic.clone())
            .or_default()
            .entry(question.difficulty)
            .or_default()
            .insert(question.question_id.clone(), question);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.by_topic.keys().map(String::as_str)
    }

    pub fn questions(&self, topic: &str, difficulty: Difficulty) -> Vec<&Question> {
        self.by_topic
            .get(topic)
            .and_then(|levels| levels.get(&difficulty))
            .map(|bucket| bucket.values().collect())
            .unwrap_or_default()
    }

    /// Picks the next quiz for a learner.
    ///
    /// Path topics are drawn round-robin in path order, then any remaining
    /// topic at the same difficulty fills the quiz up to `limit`.
    pub fn plan_quiz(&self, recommendation: &Recommendation, limit: usize) -> Vec<&Question> {
        let difficulty = match recommendation.status {
            RecommendationStatus::Personalized => recommendation.next_difficulty,
            RecommendationStatus::InsufficientHistory => Difficulty::Easy,
        };

        let mut selected: Vec<&Question> = Vec::new();
        let mut queues: Vec<std::vec::IntoIter<&Question>> = recommendation
            .path_topics
            .iter()
            .map(|topic| self.questions(topic, difficulty).into_iter())
            .collect();

        while selected.len() < limit {
            let mut progressed = false;
            for queue in queues.iter_mut() {
                if selected.len() >= limit {
                    break;
                }
                if let Some(question) = queue.next() {
                    selected.push(question);
                    progressed = true;
                }
            }
            if !progressed {
                break;
            }
        }

        for topic in self.topics() {
            if selected.len() >= limit {
                break;
            }
            if recommendation.path_topics.iter().any(|t| t == topic) {
                continue;
            }
            for question in self.questions(topic, difficulty) {
                if selected.len() >= limit {
                    break;
                }
                selected.push(question);
            }
        }

        selected
    }
}
