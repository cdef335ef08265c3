use crate::config::Config;
use crate::credentials::Credentials;
use crate::decomposer::decompose;
use crate::error::{PipelineError, Stage};
use crate::fetcher::fetch;
use crate::labeler::label;
use crate::output::{run_stem, write_reports, RAW_KEY, REPORT_KEY};
use crate::provider::{ClaudeClient, LlmClient};
use crate::reddit::{ContentSource, RedditClient, Throttle};
use crate::request::ResearchRequest;
use crate::synthesizer::{render_raw_report, write_narrative};
use crate::types::{LabelStatus, SubTask};
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    Complete,
    /// Raw report written, narrative missing
    Degraded { reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStats {
    pub subtasks: usize,
    pub fetched: usize,
    pub labeled: usize,
    pub unmatched: usize,
    pub failed: usize,
    pub fetch_warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    #[serde(flatten)]
    pub status: RunStatus,
    /// `report_path` and `raw_labeled_path`; the former is absent when degraded
    pub outputs: BTreeMap<String, PathBuf>,
    pub subtasks: Vec<SubTask>,
    pub stats: RunStats,
    pub duration_sec: f64,
}

impl RunOutcome {
    pub fn report_path(&self) -> Option<&Path> {
        self.outputs.get(REPORT_KEY).map(PathBuf::as_path)
    }

    pub fn raw_labeled_path(&self) -> Option<&Path> {
        self.outputs.get(RAW_KEY).map(PathBuf::as_path)
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self.status, RunStatus::Degraded { .. })
    }
}

/// Run-wide deadline and cancellation applied to every stage
struct RunGuard<'a> {
    deadline: Instant,
    budget: Duration,
    cancel: &'a CancellationToken,
}

impl RunGuard<'_> {
    /// Drive a stage future until it completes, the run is cancelled or the
    /// deadline passes. Dropping the future aborts its in-flight calls.
    async fn stage<T>(
        &self,
        stage: Stage,
        fut: impl Future<Output = T>,
    ) -> Result<T, PipelineError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(PipelineError::Cancelled { stage }),
            result = timeout_at(self.deadline, fut) => result.map_err(|_| PipelineError::TimedOut {
                stage,
                after: self.budget,
            }),
        }
    }

    fn ensure_not_cancelled(&self, stage: Stage) -> Result<(), PipelineError> {
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled { stage });
        }
        Ok(())
    }
}

pub struct Pipeline {
    config: Config,
    llm: Arc<dyn LlmClient>,
    source: Arc<dyn ContentSource>,
}

impl Pipeline {
    pub fn new(config: Config, llm: Arc<dyn LlmClient>, source: Arc<dyn ContentSource>) -> Self {
        Self {
            config,
            llm,
            source,
        }
    }

    /// Decompose, fetch, label, synthesize and persist one request.
    ///
    /// The request is validated before any upstream call. A narrative that
    /// fails or hits the run deadline degrades the run to the raw report
    /// instead of failing it.
    pub async fn run(
        &self,
        request: &ResearchRequest,
        output_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, PipelineError> {
        let started = Instant::now();
        request.validate()?;

        let guard = RunGuard {
            deadline: started + self.config.run_timeout(),
            budget: self.config.run_timeout(),
            cancel,
        };
        let llm = self.llm.as_ref();
        let config = &self.config;

        info!(
            llm = self.llm.name(),
            source = self.source.name(),
            subreddit = %request.subreddit,
            limit = request.limit,
            task_count = request.task_count,
            "Starting research run"
        );

        let subtasks = guard
            .stage(
                Stage::Decompose,
                decompose(
                    llm,
                    config,
                    &request.question,
                    request.task_count as usize,
                    &request.model,
                ),
            )
            .await??;
        info!(stage = %Stage::Decompose, subtasks = subtasks.len(), "Stage complete");

        let queries: Vec<String> = subtasks.iter().map(|t| t.search_query.clone()).collect();
        let fetched = guard
            .stage(
                Stage::Fetch,
                fetch(self.source.as_ref(), config, request, &queries),
            )
            .await??;
        info!(stage = %Stage::Fetch, items = fetched.items.len(), "Stage complete");

        let mut stats = RunStats {
            subtasks: subtasks.len(),
            fetched: fetched.items.len(),
            fetch_warnings: fetched.warnings,
            ..RunStats::default()
        };

        let labeled = guard
            .stage(
                Stage::Label,
                label(
                    llm,
                    config,
                    &request.question,
                    &subtasks,
                    fetched.items,
                    &request.model,
                ),
            )
            .await?;
        for entry in &labeled {
            match entry.status {
                LabelStatus::Labeled => stats.labeled += 1,
                LabelStatus::Unmatched => stats.unmatched += 1,
                LabelStatus::Failed { .. } => stats.failed += 1,
            }
        }
        info!(
            stage = %Stage::Label,
            labeled = stats.labeled,
            unmatched = stats.unmatched,
            failed = stats.failed,
            "Stage complete"
        );

        // Raw first: a narrative that fails or runs out of time only degrades
        let raw = render_raw_report(&request.question, &subtasks, &labeled);
        let narrative = guard
            .stage(
                Stage::Synthesize,
                write_narrative(llm, config, request, &subtasks, &labeled),
            )
            .await;
        let (narrative, status) = match narrative {
            Ok(Ok(narrative)) => (Some(narrative), RunStatus::Complete),
            Ok(Err(e)) => {
                warn!("Narrative failed, keeping raw report only: {}", e);
                (None, RunStatus::Degraded { reason: e.to_string() })
            }
            Err(e @ PipelineError::TimedOut { .. }) => {
                warn!("Narrative ran out of time, keeping raw report only: {}", e);
                (None, RunStatus::Degraded { reason: e.to_string() })
            }
            Err(e) => return Err(e),
        };

        guard.ensure_not_cancelled(Stage::Persist)?;
        let stem = run_stem(request, Utc::now());
        let outputs = write_reports(output_dir, &stem, narrative.as_deref(), &raw)?;

        let duration = started.elapsed();
        info!("Run finished in {:.1}s", duration.as_secs_f64());

        Ok(RunOutcome {
            status,
            outputs,
            subtasks,
            stats,
            duration_sec: duration.as_secs_f64(),
        })
    }
}

/// Build the production clients from resolved credentials and run once.
///
/// `throttle` may be shared between runs that use the same platform
/// credentials.
pub async fn run_pipeline(
    config: &Config,
    request: &ResearchRequest,
    output_dir: &Path,
    credentials: &Credentials,
    throttle: Arc<Throttle>,
    cancel: &CancellationToken,
) -> Result<RunOutcome, PipelineError> {
    request.validate()?;

    let llm = ClaudeClient::new(
        &credentials.llm_api_key,
        &credentials.llm_base_url,
        config.request_timeout(),
    )
    .map_err(|e| PipelineError::ClientInit(e.to_string()))?;
    let source = RedditClient::new(
        credentials,
        &config.reddit,
        config.request_timeout(),
        throttle,
    )
    .map_err(|e| PipelineError::ClientInit(e.to_string()))?;

    let pipeline = Pipeline::new(config.clone(), Arc::new(llm), Arc::new(source));
    pipeline.run(request, output_dir, cancel).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FetchError, ProviderError};
    use crate::request::sample_request;
    use crate::testing::{item_ids_in_prompt, labels_json, FakeSource, ScriptedLlm};
    use crate::types::{sample_item, ContentItem};
    use std::fs;
    use tempfile::TempDir;

    fn config() -> Config {
        let mut config = Config::default();
        config.retry.backoff_base_ms = 1;
        config
    }

    fn pool(n: usize) -> Vec<ContentItem> {
        (0..n)
            .map(|i| sample_item(&format!("p{:03}", i), (i % 7) as i64))
            .collect()
    }

    fn tasks_json(n: usize) -> String {
        let tasks: Vec<serde_json::Value> = (1..=n)
            .map(|i| {
                serde_json::json!({
                    "title": format!("Angle {}", i),
                    "description": format!("Facet {}", i),
                    "search_query": format!("coffee facet {}", i),
                })
            })
            .collect();
        serde_json::json!({ "tasks": tasks }).to_string()
    }

    /// Task assigned to a pool item: `p{n}` goes to `T{n % 4 + 1}`
    fn task_for(id: &str) -> String {
        let n: usize = id.trim_start_matches('p').parse().unwrap_or(0);
        format!("T{}", n % 4 + 1)
    }

    fn scripted(fail_synthesis: bool) -> Arc<ScriptedLlm> {
        Arc::new(ScriptedLlm::new(move |req| match req.stage {
            Stage::Decompose => Ok(tasks_json(4)),
            Stage::Label => {
                let ids = item_ids_in_prompt(&req.prompt);
                Ok(labels_json(&ids, |id| vec![task_for(id)]))
            }
            Stage::Synthesize if fail_synthesis => Err(ProviderError::Http {
                status: 401,
                body: "invalid x-api-key".to_string(),
            }),
            _ => Ok("### Angle 1\nMachines are loud [#p000].".to_string()),
        }))
    }

    fn pipeline(config: Config, llm: Arc<ScriptedLlm>, source: Arc<FakeSource>) -> Pipeline {
        Pipeline::new(config, llm, source)
    }

    fn files_in(dir: &Path) -> usize {
        fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }

    #[tokio::test]
    async fn test_labeled_sections_match_subtasks() {
        let dir = TempDir::new().unwrap();
        let llm = scripted(false);
        let source = Arc::new(FakeSource::with_items(pool(60)));

        let outcome = pipeline(config(), llm.clone(), source.clone())
            .run(&sample_request(), dir.path(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.status, RunStatus::Complete);
        assert_eq!(outcome.stats.fetched, 60);
        assert_eq!(outcome.stats.labeled, 60);
        assert!(outcome.report_path().unwrap().exists());

        let raw = fs::read_to_string(outcome.raw_labeled_path().unwrap()).unwrap();
        let mut sections: Vec<(String, Vec<String>)> = Vec::new();
        for line in raw.lines() {
            if let Some(title) = line.strip_prefix("## ") {
                sections.push((title.to_string(), Vec::new()));
            } else if let Some(rest) = line.strip_prefix("### [") {
                let id = rest.split(']').next().unwrap().to_string();
                sections.last_mut().unwrap().1.push(id);
            }
        }

        assert_eq!(sections.len(), 4);
        let total: usize = sections.iter().map(|(_, ids)| ids.len()).sum();
        assert_eq!(total, 60);
        for (index, (title, ids)) in sections.iter().enumerate() {
            let task = format!("T{}", index + 1);
            assert!(title.starts_with(&task));
            assert!(ids.iter().all(|id| task_for(id) == task));
        }
    }

    #[tokio::test]
    async fn test_invalid_request_makes_no_calls() {
        let dir = TempDir::new().unwrap();
        let llm = scripted(false);
        let source = Arc::new(FakeSource::with_items(pool(60)));
        let mut request = sample_request();
        request.task_count = 0;

        let result = pipeline(config(), llm.clone(), source.clone())
            .run(&request, dir.path(), &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(PipelineError::InvalidRequest(_))));
        assert_eq!(llm.calls(), 0);
        assert_eq!(source.calls(), 0);
        assert_eq!(files_in(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_fetch_failure_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let llm = scripted(false);
        let source = Arc::new(FakeSource::with_items(pool(60)).failing_when(|_| {
            Some(FetchError::Auth {
                status: 403,
                message: "forbidden".to_string(),
            })
        }));

        let err = pipeline(config(), llm.clone(), source)
            .run(&sample_request(), dir.path(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Stage::Fetch);
        assert!(err.to_string().contains("Fetch stage failed"));
        assert_eq!(llm.calls_for(Stage::Label), 0);
        assert_eq!(files_in(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_narrative_failure_degrades_to_raw_report() {
        let dir = TempDir::new().unwrap();
        let llm = scripted(true);
        let source = Arc::new(FakeSource::with_items(pool(60)));

        let outcome = pipeline(config(), llm, source)
            .run(&sample_request(), dir.path(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.is_degraded());
        assert!(outcome.report_path().is_none());
        let raw = outcome.raw_labeled_path().unwrap();
        assert!(fs::read_to_string(raw)
            .unwrap()
            .starts_with("# Raw Quotes and Labels"));
        assert_eq!(files_in(dir.path()), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_in_flight_stage() {
        let dir = TempDir::new().unwrap();
        let source =
            Arc::new(FakeSource::with_items(pool(60)).with_delay(Duration::from_secs(30)));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let err = pipeline(config(), scripted(false), source)
            .run(&sample_request(), dir.path(), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Cancelled { stage: Stage::Fetch }));
        assert_eq!(files_in(dir.path()), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_timeout_surfaces_stage() {
        let dir = TempDir::new().unwrap();
        let mut config = config();
        config.run_timeout_sec = 5;
        let source =
            Arc::new(FakeSource::with_items(pool(60)).with_delay(Duration::from_secs(60)));

        let err = pipeline(config, scripted(false), source)
            .run(&sample_request(), dir.path(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::TimedOut {
                stage: Stage::Fetch,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_narrative_timeout_keeps_raw_report() {
        let dir = TempDir::new().unwrap();
        let mut config = config();
        config.run_timeout_sec = 5;
        let llm = Arc::new(
            ScriptedLlm::new(|req| match req.stage {
                Stage::Decompose => Ok(tasks_json(4)),
                Stage::Label => {
                    let ids = item_ids_in_prompt(&req.prompt);
                    Ok(labels_json(&ids, |id| vec![task_for(id)]))
                }
                _ => Ok("### Angle 1\nMachines are loud [#p000].".to_string()),
            })
            .with_delay_for(Stage::Synthesize, Duration::from_secs(60)),
        );
        let source = Arc::new(FakeSource::with_items(pool(60)));

        let outcome = pipeline(config, llm.clone(), source)
            .run(&sample_request(), dir.path(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.is_degraded());
        assert!(matches!(
            &outcome.status,
            RunStatus::Degraded { reason } if reason.contains("synthesize")
        ));
        assert!(outcome.report_path().is_none());
        assert!(outcome.raw_labeled_path().unwrap().exists());
        assert_eq!(outcome.stats.labeled, 60);
        assert_eq!(llm.calls_for(Stage::Synthesize), 1);
        assert_eq!(files_in(dir.path()), 1);
    }

    #[test]
    fn test_outcome_serializes_flat_status() {
        let outcome = RunOutcome {
            status: RunStatus::Degraded {
                reason: "LLM call failed".to_string(),
            },
            outputs: BTreeMap::from([(RAW_KEY.to_string(), PathBuf::from("r.md"))]),
            subtasks: Vec::new(),
            stats: RunStats::default(),
            duration_sec: 1.0,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["reason"], "LLM call failed");
        assert_eq!(json["outputs"]["raw_labeled_path"], "r.md");
    }
}
