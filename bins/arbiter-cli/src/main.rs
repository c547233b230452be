mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "arbiter-cli")]
#[command(about = "Arbiter CLI - Seed questions, run code and follow submissions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a question (title + test cases) in Redis
    AddQuestion {
        /// Question id submissions refer to
        #[arg(short, long)]
        id: String,

        /// JSON file: {"title", "description", "testCases": [{"input", "expectedOutput"}]}
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Run a source file once against custom input on the executor
    Run {
        /// Language name (cpp, c, python, py, java)
        #[arg(short, long)]
        language: String,

        /// Source file
        #[arg(short, long)]
        file: PathBuf,

        /// File whose content is fed to stdin
        #[arg(long)]
        input_file: Option<PathBuf>,
    },

    /// Submit a source file for judging against a question
    Submit {
        /// Question id
        #[arg(short, long)]
        question: String,

        /// Language name (cpp, c, python, py, java)
        #[arg(short, long)]
        language: String,

        /// Source file
        #[arg(short, long)]
        file: PathBuf,

        /// Submitting user id
        #[arg(short, long)]
        user: String,
    },

    /// Show a submission's status and output
    Status {
        /// Submission id
        #[arg(short, long)]
        id: String,

        /// Owner of the submission
        #[arg(short, long)]
        user: String,

        /// Poll until the verdict is in
        #[arg(short, long, default_value = "false")]
        wait: bool,

        /// Give up waiting after this many seconds
        #[arg(long, default_value = "300")]
        timeout_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::AddQuestion { id, file } => {
            commands::add_question(&id, &file).await?;
        }
        Commands::Run {
            language,
            file,
            input_file,
        } => {
            commands::run_code(&language, &file, input_file.as_deref()).await?;
        }
        Commands::Submit {
            question,
            language,
            file,
            user,
        } => {
            commands::submit(&question, &language, &file, &user).await?;
        }
        Commands::Status {
            id,
            user,
            wait,
            timeout_secs,
        } => {
            let wait = wait.then(|| Duration::from_secs(timeout_secs));
            commands::status(&id, &user, wait).await?;
        }
    }

    Ok(())
}
