use std::path::PathBuf;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

mod classifier;
mod config;
mod error;
mod features;
mod loader;
mod models;
mod pipeline;
mod quiz;
mod recommend;
mod report;
mod seed;
mod segmentation;

use config::{ConfigOverrides, PipelineConfig};
use loader::{DataPaths, Dataset};
use report::{BatchReport, Scope};

#[derive(Parser)]
#[command(name = "smart-learning-insights")]
#[command(about = "Learner segmentation, proficiency tiers and quiz recommendations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct DataArgs {
    #[arg(long, default_value = "data/learners.csv")]
    learners: PathBuf,
    #[arg(long, default_value = "data/quiz_attempts.csv")]
    quiz: PathBuf,
    #[arg(long, default_value = "data/questions.csv")]
    questions: PathBuf,
    /// TOML file with pipeline settings
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    clusters: Option<usize>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    high_threshold: Option<f64>,
    #[arg(long)]
    low_threshold: Option<f64>,
    #[arg(long)]
    tie_epsilon: Option<f64>,
    /// Reference date for recency (YYYY-MM-DD)
    #[arg(long)]
    as_of: Option<NaiveDate>,
}

#[derive(Args)]
#[command(group(
    ArgGroup::new("scope")
        .args(["learner", "cluster"])
        .multiple(false)
))]
struct ScopeArgs {
    #[arg(long)]
    learner: Option<String>,
    #[arg(long)]
    cluster: Option<usize>,
}

#[derive(Clone, Copy, ValueEnum)]
enum ReportFormat {
    Markdown,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Write sample learners, quiz attempts and question bank CSVs
    Seed {
        #[arg(long, default_value = "data")]
        dir: PathBuf,
    },
    /// Print proficiency and recommendations per learner
    Analyze {
        #[command(flatten)]
        data: DataArgs,
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Generate a markdown or JSON report
    Report {
        #[command(flatten)]
        data: DataArgs,
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(long, value_enum, default_value_t = ReportFormat::Markdown)]
        format: ReportFormat,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Export enriched learner profiles in the learners CSV layout
    Export {
        #[command(flatten)]
        data: DataArgs,
        #[arg(long, default_value = "learners_export.csv")]
        out: PathBuf,
        /// Also write the attempt history in the quiz-attempts layout
        #[arg(long)]
        quiz_out: Option<PathBuf>,
    },
}

impl ScopeArgs {
    fn scope(&self) -> Scope {
        match (&self.learner, self.cluster) {
            (Some(id), _) => Scope::Learner(id.clone()),
            (None, Some(cluster)) => Scope::Cluster(cluster),
            (None, None) => Scope::All,
        }
    }
}

fn run_pipeline(data: &DataArgs) -> anyhow::Result<(Dataset, BatchReport)> {
    let overrides = ConfigOverrides {
        clusters: data.clusters,
        seed: data.seed,
        high_threshold: data.high_threshold,
        low_threshold: data.low_threshold,
        tie_epsilon: data.tie_epsilon,
        as_of: data.as_of,
    };
    let config = PipelineConfig::load(data.config.as_deref(), &overrides)
        .context("failed to load pipeline configuration")?;

    let paths = DataPaths {
        learners: data.learners.clone(),
        quiz: data.quiz.clone(),
        questions: data.questions.clone(),
    };
    let dataset = loader::load_dataset(&paths).context("failed to load learner data")?;
    let batch = pipeline::run(&dataset, &config).context("learner analysis failed")?;
    Ok((dataset, batch))
}

fn main() -> anyhow::Result<()> {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Seed { dir } => {
            let paths = seed::write_sample_data(&dir)?;
            println!(
                "Sample data written to {}, {} and {}.",
                paths.learners.display(),
                paths.quiz.display(),
                paths.questions.display()
            );
        }
        Commands::Analyze { data, scope, limit } => {
            let scope = scope.scope();
            let (_, batch) = run_pipeline(&data)?;
            let batch = batch.filtered(&scope);

            if batch.learners.is_empty() {
                println!("No learners found for {}.", scope.label());
                return Ok(());
            }

            println!("Learner insights for {}:", scope.label());
            for report in batch.learners.iter().take(limit) {
                println!("{}", report::summary_line(report));
            }
            if batch.malformed_rows > 0 {
                println!("Skipped {} malformed rows.", batch.malformed_rows);
            }
        }
        Commands::Report {
            data,
            scope,
            format,
            out,
        } => {
            let scope = scope.scope();
            let (_, batch) = run_pipeline(&data)?;
            let batch = batch.filtered(&scope);
            let rendered = match format {
                ReportFormat::Markdown => report::build_report(&batch, &scope),
                ReportFormat::Json => batch.to_json()?,
            };
            std::fs::write(&out, rendered)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Export {
            data,
            out,
            quiz_out,
        } => {
            let (dataset, batch) = run_pipeline(&data)?;
            let written = report::write_export(&batch, &out)?;
            println!("Exported {written} learners to {}.", out.display());
            if let Some(quiz_out) = quiz_out {
                let attempts = report::write_quiz_history(&dataset.learners, &quiz_out)?;
                println!("Exported {attempts} quiz attempts to {}.", quiz_out.display());
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn scope_flags_are_exclusive() {
        let result = Cli::try_parse_from([
            "smart-learning-insights",
            "analyze",
            "--learner",
            "L001",
            "--cluster",
            "1",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn overrides_parse_from_flags() {
        let cli = Cli::try_parse_from([
            "smart-learning-insights",
            "report",
            "--clusters",
            "4",
            "--as-of",
            "2026-01-20",
            "--format",
            "json",
        ])
        .unwrap();
        match cli.command {
            Commands::Report { data, format, .. } => {
                assert_eq!(data.clusters, Some(4));
                assert_eq!(data.as_of, NaiveDate::from_ymd_opt(2026, 1, 20));
                assert!(matches!(format, ReportFormat::Json));
            }
            _ => panic!("expected report command"),
        }
    }

    #[test]
    fn export_accepts_quiz_history_path() {
        let cli = Cli::try_parse_from([
            "smart-learning-insights",
            "export",
            "--out",
            "learners_export.csv",
            "--quiz-out",
            "quiz_history.csv",
        ])
        .unwrap();
        match cli.command {
            Commands::Export { quiz_out, .. } => {
                assert_eq!(quiz_out, Some(PathBuf::from("quiz_history.csv")));
            }
            _ => panic!("expected export command"),
        }
    }
}
