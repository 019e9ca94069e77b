//! Ragbench CLI: ask questions over a corpus, run tracked evaluations and
//! probe cross-lingual retrieval.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Ragbench: retrieval-augmented generation with an evaluation harness
#[derive(Parser, Debug)]
#[command(name = "ragbench", version, about, long_about = None)]
struct Cli {
    /// Workspace directory
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Answer a question from a directory of documents
    Ask {
        /// The question
        question: String,
        /// Directory of .pdf/.md/.txt documents to index
        #[arg(long)]
        docs: PathBuf,
        /// Number of documents to retrieve
        #[arg(short)]
        k: Option<usize>,
        /// Print the answer as it is generated
        #[arg(long)]
        stream: bool,
    },
    /// Run a tracked evaluation over a question set
    Eval {
        /// Directory of .pdf/.md/.txt documents to index
        #[arg(long)]
        docs: PathBuf,
        /// JSON file with a "questions" array
        #[arg(long)]
        questions: PathBuf,
        /// Experiment name (defaults to tracking.experiment_name)
        #[arg(long)]
        experiment: Option<String>,
        /// Run name
        #[arg(long)]
        run_name: Option<String>,
        #[arg(long)]
        chunk_size: Option<usize>,
        #[arg(long)]
        chunk_overlap: Option<usize>,
        /// Number of documents to retrieve per question
        #[arg(short)]
        k: Option<usize>,
        /// Record failed questions and continue instead of aborting
        #[arg(long)]
        skip_failures: bool,
    },
    /// Measure cross-lingual retrieval over a bilingual corpus
    Probe {
        /// Directory of English and German (`*_de.*`) documents
        #[arg(long)]
        docs: PathBuf,
        /// Where to write the JSON report
        #[arg(short, long, default_value = "exp_002_results.json")]
        output: PathBuf,
    },
    /// List recorded evaluation runs
    Runs {
        /// Only show this experiment
        #[arg(long)]
        experiment: Option<String>,
    },
    /// List supported chat providers
    Providers,
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Create default configuration file
    Init,
    /// Show current configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("dev", "ragbench", "ragbench")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "ragbench.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    tracing::debug!(workspace = %workspace.display(), "Resolved workspace");

    commands::handle_command(cli.command, &workspace).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_eval() {
        let cli = Cli::try_parse_from([
            "ragbench",
            "-v",
            "eval",
            "--docs",
            "data/sample_docs",
            "--questions",
            "q.json",
            "-k",
            "2",
            "--skip-failures",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Commands::Eval {
                k, skip_failures, ..
            } => {
                assert_eq!(k, Some(2));
                assert!(skip_failures);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_probe_default_output() {
        let cli = Cli::try_parse_from(["ragbench", "probe", "--docs", "d"]).unwrap();
        match cli.command {
            Commands::Probe { output, .. } => {
                assert_eq!(output, PathBuf::from("exp_002_results.json"))
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
