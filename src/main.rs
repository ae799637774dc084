use anyhow::Result;
use clap::{ArgGroup, Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use kioku::sync::MergeStrategy;

mod bench;
mod commands;

/// Kioku - vocabulary mastery tracking
/// Scores quiz answers and schedules spaced-repetition reviews
#[derive(Parser)]
#[command(name = "kioku")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Vocabulary mastery tracking and spaced-repetition scheduling", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the data directory, database and default config
    Init,

    /// Record one answer
    #[command(group(ArgGroup::new("outcome").required(true).args(["correct", "incorrect"])))]
    Answer {
        #[arg(long)]
        subject: String,
        /// Word id from the catalog
        #[arg(long)]
        word: String,
        #[arg(long)]
        correct: bool,
        #[arg(long)]
        incorrect: bool,
        /// Seconds taken to answer
        #[arg(long, default_value = "2.0", allow_negative_numbers = true)]
        time: f64,
        /// Number of blanks in the question
        #[arg(long, default_value = "1")]
        blanks: u32,
        /// Study session number
        #[arg(long)]
        session: Option<i64>,
        /// Answer text the learner picked
        #[arg(long)]
        chosen: Option<String>,
        /// Expected answer text
        #[arg(long)]
        expected: Option<String>,
    },

    /// Show current status
    Status,

    /// Show level distribution and dashboard stats
    Stats {
        #[arg(long)]
        subject: Option<String>,
    },

    /// List words due for review, most urgent first
    Review {
        #[arg(long)]
        subject: String,
        /// Vocabulary catalog (JSON array)
        #[arg(long)]
        catalog: PathBuf,
        /// Only words already past their interval
        #[arg(long)]
        no_due_soon: bool,
        #[arg(long)]
        limit: Option<usize>,
    },

    /// List words past their spaced-repetition interval
    Due {
        #[arg(long)]
        subject: String,
        #[arg(long)]
        catalog: PathBuf,
        /// Print only the number of due words
        #[arg(long)]
        count_only: bool,
    },

    /// List words currently at the Weak level
    Weak {
        #[arg(long)]
        subject: String,
    },

    /// Pick questions for a quiz session
    Quiz {
        #[arg(long)]
        subject: String,
        #[arg(long)]
        catalog: PathBuf,
        #[arg(long, default_value = "10")]
        count: usize,
        /// Start a new session before selecting
        #[arg(long)]
        next_session: bool,
    },

    /// Export mastery data to a file
    Export {
        /// Output file path
        #[arg(long, default_value = "kioku-mastery.json")]
        output: PathBuf,
        /// Only export this subject
        #[arg(long)]
        subject: Option<String>,
    },

    /// Import mastery data from a file
    Import {
        /// Input file path
        input: PathBuf,
        /// Merge strategy: add (default), replace, keep-latest
        #[arg(long, default_value = "add")]
        merge: MergeStrategy,
    },

    /// Run performance benchmarks
    Bench,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr) // Always write logs to stderr, not stdout
        .init();

    let data_dir = kioku::get_kioku_dir()?;

    match cli.command {
        Commands::Init => {
            info!("Initializing Kioku");
            commands::init(&data_dir)?;
        }
        Commands::Answer {
            subject,
            word,
            correct,
            incorrect: _,
            time,
            blanks,
            session,
            chosen,
            expected,
        } => {
            let answer = kioku::Answer::new(subject, word, correct)
                .with_response_time(time)
                .with_blank_count(blanks)
                .with_answer_texts(chosen, expected);
            let answer = match session {
                Some(id) => answer.with_session(id),
                None => answer,
            };
            commands::answer(&data_dir, answer)?;
        }
        Commands::Status => {
            commands::status(&data_dir)?;
        }
        Commands::Stats { subject } => {
            commands::stats(&data_dir, subject.as_deref())?;
        }
        Commands::Review {
            subject,
            catalog,
            no_due_soon,
            limit,
        } => {
            commands::review(&data_dir, &subject, &catalog, !no_due_soon, limit)?;
        }
        Commands::Due {
            subject,
            catalog,
            count_only,
        } => {
            commands::due(&data_dir, &subject, &catalog, count_only)?;
        }
        Commands::Weak { subject } => {
            commands::weak(&data_dir, &subject)?;
        }
        Commands::Quiz {
            subject,
            catalog,
            count,
            next_session,
        } => {
            commands::quiz(&data_dir, &subject, &catalog, count, next_session)?;
        }
        Commands::Export { output, subject } => {
            commands::export(&data_dir, &output, subject.as_deref())?;
        }
        Commands::Import { input, merge } => {
            commands::import(&data_dir, &input, merge)?;
        }
        Commands::Bench => {
            bench::run_benchmarks()?;
        }
    }

    Ok(())
}
