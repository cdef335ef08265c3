use crate::cli::RunArgs;
use crate::config::Config;
use crate::credentials::{CredentialChain, Credentials, CLAUDE_MODEL};
use crate::error::PipelineError;
use crate::pipeline::{run_pipeline, RunOutcome, RunStatus};
use crate::reddit::Throttle;
use crate::request::ResearchRequest;
use crate::session::SessionContext;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub async fn execute(args: RunArgs) -> anyhow::Result<()> {
    // Load and validate config
    let mut config = Config::load_or_default(&args.config)?;

    // Apply CLI overrides
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency;
    }
    if let Some(output_dir) = args.output_dir {
        config.output_dir = output_dir;
    }
    config.validate()?;

    let chain = CredentialChain::standard(&config.secrets_file)?;
    let model = resolve_model(args.model, &chain, &config);

    // Bad parameters fail before credentials are required or any call is made
    let request = ResearchRequest {
        question: args.question,
        subreddit: args.subreddit.trim().to_string(),
        limit: args.limit,
        task_count: args.task_count,
        sort: args.sort.parse().map_err(PipelineError::from)?,
        time_filter: args.time_filter.parse().map_err(PipelineError::from)?,
        model,
    };
    request.validate().map_err(PipelineError::from)?;

    let credentials = Credentials::resolve(&chain)?;
    let mut session = SessionContext::new(credentials.access_passcode.as_deref());
    session.authorize(args.passcode.as_deref())?;
    debug!(authorized = session.is_authorized(), "Session gate passed");

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            on_interrupt.cancel();
        }
    });

    let throttle = Arc::new(Throttle::new(Duration::from_millis(
        config.reddit.min_request_interval_ms,
    )));

    info!("Reports will be written to {:?}", config.output_dir);
    let outcome = run_pipeline(
        &config,
        &request,
        &config.output_dir,
        &credentials,
        throttle,
        &cancel,
    )
    .await?;

    if outcome.is_degraded() {
        warn!("Run finished degraded");
    }
    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_outcome(&outcome);
    }

    Ok(())
}

/// `--model`, then `CLAUDE_MODEL`, then the config default
fn resolve_model(flag: Option<String>, chain: &CredentialChain, config: &Config) -> String {
    flag.or_else(|| chain.get(CLAUDE_MODEL))
        .unwrap_or_else(|| config.llm.default_model.clone())
}

fn print_outcome(outcome: &RunOutcome) {
    let stats = &outcome.stats;

    if let RunStatus::Degraded { reason } = &outcome.status {
        eprintln!("warning: degraded success, narrative report unavailable: {}", reason);
    }
    for warning in &stats.fetch_warnings {
        eprintln!("warning: {}", warning);
    }

    println!(
        "\n{} sub-tasks, {} posts fetched: {} labeled, {} unmatched, {} failed ({:.1}s)\n",
        stats.subtasks,
        stats.fetched,
        stats.labeled,
        stats.unmatched,
        stats.failed,
        outcome.duration_sec
    );
    for task in &outcome.subtasks {
        println!("  {} {}", task.id, task.title);
    }
    println!();

    if let Some(path) = outcome.report_path() {
        println!("Report:     {}", path.display());
    }
    if let Some(path) = outcome.raw_labeled_path() {
        println!("Raw labels: {}", path.display());
    }
}
