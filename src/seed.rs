use std::path::Path;

use tracing::info;

use crate::error::{PipelineError, Result};
use crate::loader::DataPaths;

const LEARNERS: &[(&str, &str, &str, &str, &str)] = &[
    ("L001", "Alice Johnson", "62", "slow", "Struggling Learner"),
    ("L002", "Bob Smith", "78", "moderate", "Average Learner"),
    ("L003", "Carol Williams", "95", "fast", "Advanced Learner"),
    ("L004", "David Brown", "72", "moderate", "Average Learner"),
    ("L005", "Evan Clarke", "55", "slow", ""),
    ("L006", "Farah Khan", "88", "fast", ""),
    ("L007", "Grace Lee", "", "", ""),
];

// learner_id, topic, accuracy, avg_time, hints_used, retries, date
const ATTEMPTS: &[(&str, &str, u32, u32, u32, u32, &str)] = &[
    ("L001", "Algebra", 45, 85, 8, 3, "2026-01-10"),
    ("L001", "Geometry", 52, 78, 6, 2, "2026-01-12"),
    ("L001", "Algebra", 48, 82, 7, 3, "2026-01-14"),
    ("L002", "Algebra", 75, 45, 2, 0, "2026-01-10"),
    ("L002", "Geometry", 78, 42, 1, 0, "2026-01-12"),
    ("L002", "Statistics", 73, 48, 2, 1, "2026-01-14"),
    ("L003", "Algebra", 92, 28, 0, 0, "2026-01-10"),
    ("L003", "Geometry", 95, 25, 0, 0, "2026-01-12"),
    ("L003", "Calculus", 94, 26, 0, 0, "2026-01-14"),
    ("L004", "Algebra", 68, 55, 3, 1, "2026-01-10"),
    ("L004", "Geometry", 71, 52, 2, 1, "2026-01-12"),
    ("L004", "Algebra", 69, 58, 3, 2, "2026-01-14"),
    ("L005", "Algebra", 40, 92, 7, 3, "2025-12-20"),
    ("L005", "Statistics", 50, 80, 5, 2, "2025-12-28"),
    ("L005", "Geometry", 44, 88, 6, 2, "2026-01-03"),
    ("L006", "Calculus", 90, 30, 0, 0, "2026-01-08"),
    ("L006", "Algebra", 88, 32, 0, 0, "2026-01-11"),
    ("L006", "Statistics", 91, 29, 0, 0, "2026-01-13"),
];

// question_id, topic, difficulty, question, options, correct_index, hint, explanation
type QuestionSeed = (
    &'static str,
    &'static str,
    &'static str,
    &'static str,
    [&'static str; 4],
    u32,
    &'static str,
    &'static str,
);

#[rustfmt::skip]
const QUESTIONS: &[QuestionSeed] = &[
    ("ALG-E1", "Algebra", "easy", "Solve for x: 2x + 5 = 13", ["x = 3", "x = 4", "x = 5", "x = 6"], 1,
        "Subtract 5 from both sides first, then divide by 2", "2x = 8, so x = 4"),
    ("ALG-E2", "Algebra", "easy", "What is 3(x + 2) expanded?", ["3x + 2", "3x + 5", "3x + 6", "x + 6"], 2,
        "Multiply 3 by each term inside the parentheses", "3 × x = 3x and 3 × 2 = 6"),
    ("ALG-M1", "Algebra", "medium", "Solve: 3x - 7 = 2x + 5", ["x = 10", "x = 11", "x = 12", "x = 13"], 2,
        "Get all x terms on one side and constants on the other", "x - 7 = 5, so x = 12"),
    ("ALG-M2", "Algebra", "medium", "Factor: x² + 5x + 6", ["(x+2)(x+3)", "(x+1)(x+6)", "(x+4)(x+2)", "(x+5)(x+1)"], 0,
        "Find two numbers that multiply to 6 and add to 5", "2 and 3 multiply to 6 and add to 5"),
    ("ALG-H1", "Algebra", "hard", "Solve: x² - 7x + 12 = 0", ["x = 2, 5", "x = 3, 4", "x = 1, 6", "x = 2, 6"], 1,
        "Factor or use the quadratic formula", "(x-3)(x-4) = 0"),
    ("GEO-E1", "Geometry", "easy", "What is the area of a rectangle with length 8 and width 5?", ["13", "26", "40", "45"], 2,
        "Area = length × width", "8 × 5 = 40 square units"),
    ("GEO-M1", "Geometry", "medium", "Find the area of a triangle with base 10 and height 6", ["16", "30", "60", "120"], 1,
        "Area = (1/2) × base × height", "(1/2) × 10 × 6 = 30 square units"),
    ("GEO-H1", "Geometry", "hard", "What is the hypotenuse of a right triangle with legs 6 and 8?", ["8", "10", "12", "14"], 1,
        "Use a² + b² = c²", "36 + 64 = 100, so c = 10"),
    ("STA-E1", "Statistics", "easy", "What is the mean of 5, 10, 15, 20?", ["10", "12.5", "15", "17.5"], 1,
        "Mean = sum of values ÷ number of values", "50 ÷ 4 = 12.5"),
    ("STA-M1", "Statistics", "medium", "What is the range of 12, 18, 15, 22, 9, 25?", ["13", "14", "15", "16"], 3,
        "Range = maximum - minimum", "25 - 9 = 16"),
    ("STA-H1", "Statistics", "hard", "A fair die is rolled twice. What is the probability of two sixes?", ["1/6", "1/12", "1/36", "1/3"], 2,
        "Multiply the probabilities of independent events", "1/6 × 1/6 = 1/36"),
    ("CAL-E1", "Calculus", "easy", "What is the derivative of x²?", ["x", "2x", "x²", "2"], 1,
        "Use the power rule", "d/dx x² = 2x"),
    ("CAL-M1", "Calculus", "medium", "What is the derivative of 3x³ - 2x?", ["9x² - 2", "9x² - 2x", "3x² - 2", "x³ - 2"], 0,
        "Apply the power rule to each term", "9x² - 2"),
    ("CAL-H1", "Calculus", "hard", "What is the limit of (x² - 4)/(x - 2) as x approaches 2?", ["0", "2", "4", "undefined"], 2,
        "Factor the numerator and simplify before substituting", "(x+2)(x-2)/(x-2) = x + 2, so the limit is 4"),
];

fn writer(path: &Path) -> Result<csv::Writer<std::fs::File>> {
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

/// Writes a small, realistic dataset covering every tier plus a newcomer.
pub fn write_sample_data(dir: &Path) -> Result<DataPaths> {
    std::fs::create_dir_all(dir).map_err(|source| PipelineError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let paths = DataPaths {
        learners: dir.join("learners.csv"),
        quiz: dir.join("quiz_attempts.csv"),
        questions: dir.join("questions.csv"),
    };

    let mut out = writer(&paths.learners)?;
    out.write_record([
        "learner_id",
        "learner_name",
        "engagement_score",
        "learning_pace",
        "classification",
    ])?;
    for row in LEARNERS {
        out.serialize(row)?;
    }
    finish(out, &paths.learners)?;

    let mut out = writer(&paths.quiz)?;
    out.write_record([
        "learner_id",
        "topic",
        "accuracy",
        "avg_time",
        "hints_used",
        "retries",
        "date",
    ])?;
    for row in ATTEMPTS {
        out.serialize(row)?;
    }
    finish(out, &paths.quiz)?;

    let mut out = writer(&paths.questions)?;
    out.write_record([
        "question_id",
        "topic",
        "difficulty",
        "question",
        "option1",
        "option2",
        "option3",
        "option4",
        "correct_index",
        "hint",
        "explanation",
    ])?;
    for (id, topic, difficulty, question, options, correct, hint, explanation) in QUESTIONS {
        let correct = correct.to_string();
        out.write_record([
            *id, *topic, *difficulty, *question, options[0], options[1], options[2], options[3],
            correct.as_str(), *hint, *explanation,
        ])?;
    }
    finish(out, &paths.questions)?;

    info!(
        dir = %dir.display(),
        learners = LEARNERS.len(),
        attempts = ATTEMPTS.len(),
        questions = QUESTIONS.len(),
        "sample data written"
    );
    Ok(paths)
}
