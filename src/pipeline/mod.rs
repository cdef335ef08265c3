//! Run orchestration and the shared retry policy

mod orchestrator;
mod retry;

pub use orchestrator::{run_pipeline, Pipeline, RunOutcome, RunStats, RunStatus};
pub use retry::retry_with_backoff;
