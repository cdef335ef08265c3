pub mod check;
pub mod run;
pub mod schema;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "reddit-insight")]
#[command(
    author,
    version,
    about = "Research a question against Reddit discussions and write LLM insight reports"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose/debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the research pipeline and write both reports
    Run(RunArgs),

    /// Report which credentials resolve and from where
    Check(CheckArgs),

    /// Print JSON Schema for config validation
    Schema,
}

#[derive(Parser, Clone)]
pub struct RunArgs {
    /// Research question to investigate
    #[arg(short, long)]
    pub question: String,

    /// Subreddit to search (`all`, a name, or names joined by `+`)
    #[arg(short, long, default_value = "all")]
    pub subreddit: String,

    /// Maximum number of posts to analyse
    #[arg(short, long, default_value_t = 60)]
    pub limit: u32,

    /// Number of sub-tasks to split the question into
    #[arg(short, long, default_value_t = 4)]
    pub task_count: u32,

    /// new, relevance, hot, top or comments
    #[arg(long, default_value = "new")]
    pub sort: String,

    /// hour, day, week, month, year or all
    #[arg(long, default_value = "year")]
    pub time_filter: String,

    /// Model name (defaults to CLAUDE_MODEL, then the config default)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Path to config file
    #[arg(short, long, default_value = "reddit-insight.yaml")]
    pub config: PathBuf,

    /// Override output directory
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Override max concurrent upstream calls
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Access passcode, required when ACCESS_PASSCODE is configured
    #[arg(long, env = "REDDIT_INSIGHT_PASSCODE", hide_env_values = true)]
    pub passcode: Option<String>,

    /// Print the run outcome as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Clone)]
pub struct CheckArgs {
    /// Path to config file (for the secrets file location)
    #[arg(short, long, default_value = "reddit-insight.yaml")]
    pub config: PathBuf,
}
