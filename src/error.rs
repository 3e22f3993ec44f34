use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("learner {learner_id} has no scored attempts")]
    InsufficientData { learner_id: String },
    #[error("model fit failed: {0}")]
    ModelFit(String),
    #[error("{file}:{line}: malformed row: {reason}")]
    MalformedRow {
        file: String,
        line: u64,
        reason: String,
    },
    #[error("{file}: missing required column {column:?}")]
    MissingColumn { file: String, column: &'static str },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("i/o error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),
}

impl PipelineError {
    pub fn model_fit(message: impl Into<String>) -> Self {
        Self::ModelFit(message.into())
    }

    pub fn malformed(file: &str, line: u64, reason: impl Into<String>) -> Self {
        Self::MalformedRow {
            file: file.to_string(),
            line,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
