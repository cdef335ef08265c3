use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

mod cli;
mod config;
mod credentials;
mod decomposer;
mod error;
mod fetcher;
mod labeler;
mod output;
mod parser;
mod pipeline;
mod provider;
mod reddit;
mod request;
mod session;
mod synthesizer;
mod types;

#[cfg(test)]
mod testing;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Pick up a local .env before anything reads the environment
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize tracing - only show logs with --verbose
    let filter = if cli.verbose {
        EnvFilter::new("reddit_insight=debug")
    } else {
        EnvFilter::new("reddit_insight=warn")
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run(args) => cli::run::execute(args).await,
        Commands::Check(args) => cli::check::execute(args),
        Commands::Schema => cli::schema::execute(),
    }
}
