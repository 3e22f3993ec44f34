use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{PipelineError, Result};
use crate::models::{Difficulty, LearnerRecord, ProficiencyLabel, Question, QuizAttempt};
use crate::quiz::QuestionBank;

#[derive(Debug, Clone)]
pub struct DataPaths {
    pub learners: PathBuf,
    pub quiz: PathBuf,
    pub questions: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Dataset {
    pub learners: Vec<LearnerRecord>,
    pub questions: QuestionBank,
    pub malformed_rows: usize,
}

#[derive(Deserialize)]
struct LearnerRow {
    learner_id: String,
    learner_name: Option<String>,
    engagement_score: Option<f64>,
    learning_pace: Option<String>,
    classification: Option<String>,
}

#[derive(Deserialize)]
struct AttemptRow {
    learner_id: String,
    topic: Option<String>,
    accuracy: f64,
    avg_time: f64,
    hints_used: Option<u32>,
    retries: Option<u32>,
    date: Option<NaiveDate>,
}

#[derive(Deserialize)]
struct QuestionRow {
    question_id: String,
    topic: String,
    difficulty: String,
    question: String,
    option1: String,
    option2: String,
    option3: String,
    option4: String,
    correct_index: usize,
    hint: Option<String>,
    explanation: Option<String>,
}

struct Loaded<T> {
    rows: Vec<T>,
    skipped: usize,
}

const LEARNER_COLUMNS: &[&str] = &["learner_id"];
const ATTEMPT_COLUMNS: &[&str] = &["learner_id", "accuracy", "avg_time"];
const QUESTION_COLUMNS: &[&str] = &[
    "question_id",
    "topic",
    "difficulty",
    "question",
    "option1",
    "option2",
    "option3",
    "option4",
    "correct_index",
];

/// Reads every row of a headed CSV, skipping the ones `convert` rejects.
/// A header without one of `columns` fails the whole file.
fn read_rows<R, T>(
    path: &Path,
    columns: &[&'static str],
    mut convert: impl FnMut(R, &str, u64) -> Result<T>,
) -> Result<Loaded<T>>
where
    R: DeserializeOwned,
{
    let file = File::open(path).map_err(|source| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(file);
    let headers = reader.headers()?.clone();
    let file_label = path.display().to_string();
    if let Some(column) = columns
        .iter()
        .copied()
        .find(|column| !headers.iter().any(|header| header == *column))
    {
        return Err(PipelineError::MissingColumn {
            file: file_label,
            column,
        });
    }

    let mut rows = Vec::new();
    let mut skipped = 0usize;

    for result in reader.records() {
        let record = match result {
            Ok(record) => record,
            Err(err) if matches!(err.kind(), csv::ErrorKind::Io(_)) => return Err(err.into()),
            Err(err) => {
                let line = err.position().map(|p| p.line()).unwrap_or(0);
                let err = PipelineError::malformed(&file_label, line, err.to_string());
                warn!(error = %err, "skipping malformed row");
                skipped += 1;
                continue;
            }
        };
        let line = record.position().map(|p| p.line()).unwrap_or(0);

        let converted = record
            .deserialize::<R>(Some(&headers))
            .map_err(|err| PipelineError::malformed(&file_label, line, err.to_string()))
            .and_then(|row| convert(row, &file_label, line));

        match converted {
            Ok(row) => rows.push(row),
            Err(err @ PipelineError::MalformedRow { .. }) => {
                warn!(error = %err, "skipping malformed row");
                skipped += 1;
            }
            Err(err) => return Err(err),
        }
    }

    Ok(Loaded { rows, skipped })
}

fn required(value: String, field: &str, file: &str, line: u64) -> Result<String> {
    if value.is_empty() {
        Err(PipelineError::malformed(file, line, format!("{field} is blank")))
    } else {
        Ok(value)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

pub fn read_learners(path: &Path) -> Result<(Vec<LearnerRecord>, usize)> {
    let mut seen: HashSet<String> = HashSet::new();
    let loaded = read_rows(path, LEARNER_COLUMNS, |row: LearnerRow, file, line| {
        let learner_id = required(row.learner_id, "learner_id", file, line)?;
        if !seen.insert(learner_id.clone()) {
            return Err(PipelineError::malformed(
                file,
                line,
                format!("duplicate learner_id {learner_id}"),
            ));
        }

        let reported_engagement = match row.engagement_score {
            Some(score) if !(0.0..=100.0).contains(&score) => {
                return Err(PipelineError::malformed(
                    file,
                    line,
                    format!("engagement_score {score} outside 0-100"),
                ))
            }
            other => other,
        };

        let known_label = match non_blank(row.classification) {
            Some(value) => Some(ProficiencyLabel::parse(&value).ok_or_else(|| {
                PipelineError::malformed(file, line, format!("unknown classification {value:?}"))
            })?),
            None => None,
        };

        Ok(LearnerRecord {
            name: non_blank(row.learner_name).unwrap_or_else(|| learner_id.clone()),
            learner_id,
            reported_engagement,
            learning_pace: non_blank(row.learning_pace),
            known_label,
            attempts: Vec::new(),
        })
    })?;

    Ok((loaded.rows, loaded.skipped))
}

pub fn read_attempts(path: &Path) -> Result<(Vec<(String, QuizAttempt)>, usize)> {
    let loaded = read_rows(path, ATTEMPT_COLUMNS, |row: AttemptRow, file, line| {
        let learner_id = required(row.learner_id, "learner_id", file, line)?;
        if !(0.0..=100.0).contains(&row.accuracy) {
            return Err(PipelineError::malformed(
                file,
                line,
                format!("accuracy {} outside 0-100", row.accuracy),
            ));
        }
        if !(row.avg_time.is_finite() && row.avg_time >= 0.0) {
            return Err(PipelineError::malformed(
                file,
                line,
                format!("avg_time {} must be a non-negative number", row.avg_time),
            ));
        }

        Ok((
            learner_id,
            QuizAttempt {
                topic: non_blank(row.topic).unwrap_or_else(|| "General".to_string()),
                score: row.accuracy,
                response_time: row.avg_time,
                hints_used: row.hints_used.unwrap_or(0),
                retries: row.retries.unwrap_or(0),
                taken_on: row.date,
            },
        ))
    })?;

    Ok((loaded.rows, loaded.skipped))
}

pub fn read_questions(path: &Path) -> Result<(QuestionBank, usize)> {
    let mut bank = QuestionBank::default();
    let loaded = read_rows(path, QUESTION_COLUMNS, |row: QuestionRow, file, line| {
        let question_id = required(row.question_id, "question_id", file, line)?;
        let difficulty = Difficulty::parse(&row.difficulty).ok_or_else(|| {
            PipelineError::malformed(file, line, format!("unknown difficulty {:?}", row.difficulty))
        })?;
        if row.correct_index > 3 {
            return Err(PipelineError::malformed(
                file,
                line,
                format!("correct_index {} outside 0-3", row.correct_index),
            ));
        }

        Ok(Question {
            question_id,
            topic: required(row.topic, "topic", file, line)?,
            difficulty,
            prompt: required(row.question, "question", file, line)?,
            options: [row.option1, row.option2, row.option3, row.option4],
            correct_index: row.correct_index,
            hint: non_blank(row.hint)
                .unwrap_or_else(|| "Think carefully about this question".to_string()),
            explanation: non_blank(row.explanation)
                .unwrap_or_else(|| "Review the concept".to_string()),
        })
    })?;

    let mut skipped = loaded.skipped;
    for question in loaded.rows {
        if let Err(question) = bank.insert(question) {
            warn!(
                question_id = %question.question_id,
                file = %path.display(),
                "skipping duplicate question_id"
            );
            skipped += 1;
        }
    }

    Ok((bank, skipped))
}

/// Joins the three tables on learner_id. Attempts are ordered by date, with
/// undated attempts after dated ones in file order.
pub fn load_dataset(paths: &DataPaths) -> Result<Dataset> {
    let (mut learners, learner_skips) = read_learners(&paths.learners)?;
    let (attempts, attempt_skips) = read_attempts(&paths.quiz)?;
    let (questions, question_skips) = read_questions(&paths.questions)?;

    let index: HashMap<String, usize> = learners
        .iter()
        .enumerate()
        .map(|(i, learner)| (learner.learner_id.clone(), i))
        .collect();

    let mut orphaned = 0usize;
    for (learner_id, attempt) in attempts {
        match index.get(&learner_id) {
            Some(&i) => learners[i].attempts.push(attempt),
            None => {
                warn!(%learner_id, "skipping quiz attempt for unknown learner");
                orphaned += 1;
            }
        }
    }

    for learner in learners.iter_mut() {
        learner
            .attempts
            .sort_by_key(|attempt| (attempt.taken_on.is_none(), attempt.taken_on));
    }

    let malformed_rows = learner_skips + attempt_skips + question_skips + orphaned;
    info!(
        learners = learners.len(),
        questions = questions.len(),
        malformed_rows,
        "dataset loaded"
    );

    Ok(Dataset {
        learners,
        questions,
        malformed_rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    const QUESTIONS: &str = "question_id,topic,difficulty,question,option1,option2,option3,option4,correct_index,hint,explanation\n\
Q1,Algebra,easy,Solve x + 2 = 5,1,2,3,4,2,Subtract 2,x = 3\n";

    #[test]
    fn joins_attempts_onto_learners_in_date_order() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths {
            learners: write_file(
                dir.path(),
                "learners.csv",
                "learner_id,learner_name,engagement_score,learning_pace,classification\n\
L001,Alice Johnson,62,slow,Struggling Learner\n\
L002,Bob Smith,,moderate,\n",
            ),
            quiz: write_file(
                dir.path(),
                "quiz.csv",
                "learner_id,topic,accuracy,avg_time,hints_used,retries,date\n\
L001,Geometry,52,78,6,2,2026-01-12\n\
L001,Algebra,45,85,8,3,2026-01-10\n\
L002,Statistics,73,48,,,\n",
            ),
            questions: write_file(dir.path(), "questions.csv", QUESTIONS),
        };

        let dataset = load_dataset(&paths).unwrap();
        assert_eq!(dataset.learners.len(), 2);
        assert_eq!(dataset.malformed_rows, 0);

        let alice = &dataset.learners[0];
        assert_eq!(alice.known_label, Some(ProficiencyLabel::Struggling));
        assert_eq!(alice.reported_engagement, Some(62.0));
        assert_eq!(alice.attempts[0].topic, "Algebra");
        assert_eq!(alice.attempts[1].topic, "Geometry");

        let bob = &dataset.learners[1];
        assert_eq!(bob.known_label, None);
        assert_eq!(bob.reported_engagement, None);
        assert_eq!(bob.attempts[0].hints_used, 0);
        assert_eq!(bob.attempts[0].taken_on, None);
        assert_eq!(dataset.questions.len(), 1);
    }

    #[test]
    fn malformed_rows_are_skipped_and_counted() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths {
            learners: write_file(
                dir.path(),
                "learners.csv",
                "learner_id,learner_name,classification\n\
L001,Alice,Average\n\
L002,Bob,Genius\n\
L001,Alice Again,Average\n",
            ),
            quiz: write_file(
                dir.path(),
                "quiz.csv",
                "learner_id,topic,accuracy,avg_time\n\
L001,Algebra,abc,40\n\
L001,Algebra,140,40\n\
L001,Algebra,70,-3\n\
L404,Algebra,70,40\n\
L001,Geometry,80,35\n",
            ),
            questions: write_file(
                dir.path(),
                "questions.csv",
                &format!(
                    "{QUESTIONS}Q2,Algebra,impossible,?,a,b,c,d,0,,\nQ3,Algebra,hard,?,a,b,c,d,7,,\nQ1,Algebra,easy,dup,a,b,c,d,0,,\n"
                ),
            ),
        };

        let dataset = load_dataset(&paths).unwrap();
        assert_eq!(dataset.learners.len(), 1);
        assert_eq!(dataset.learners[0].attempts.len(), 1);
        assert_eq!(dataset.learners[0].attempts[0].topic, "Geometry");
        assert_eq!(dataset.questions.len(), 1);
        // 2 learner rows, 4 attempt rows (one orphaned), 3 question rows
        assert_eq!(dataset.malformed_rows, 9);
    }

    #[test]
    fn rows_with_wrong_field_count_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "quiz.csv",
            "learner_id,topic,accuracy,avg_time\n\
L001,Algebra,70\n\
L001,Algebra,70,40,extra\n\
L001,Geometry,80,35\n",
        );

        let (attempts, skipped) = read_attempts(&path).unwrap();
        assert_eq!(skipped, 2);
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].1.topic, "Geometry");
    }

    #[test]
    fn missing_required_column_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "quiz.csv",
            "learner_id,topic,accuracy\nL001,Algebra,70\n",
        );

        match read_attempts(&path) {
            Err(PipelineError::MissingColumn { column, .. }) => assert_eq!(column, "avg_time"),
            other => panic!("expected missing column error, got {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let result = read_learners(&dir.path().join("absent.csv"));
        assert!(matches!(result, Err(PipelineError::Io { .. })));
    }
}
