//! Pipeline orchestrator: accounts → collectors → assembler → writer.
//!
//! ## Per-account lifecycle
//!
//! `Pending → Fetching → Assembling → Writing → Done | Skipped`
//!
//! Accounts run concurrently up to `pipeline.concurrency`, with a random
//! pause between dispatches. Any failure inside an account skips only that
//! account. A structural store failure cancels the run: nothing new is
//! dispatched, in-flight accounts finish, and the run returns an error.
//! Re-running a window is idempotent (upsert on account/ad/date).

use crate::assembler::{assemble, Lookups};
use crate::config::AppConfig;
use crate::errors::{AccountError, FetchError, PipelineError, WriteError};
use crate::graph::http_client::ReqwestTransport;
use crate::graph::{collect_creatives, AdsDataSource, GraphApiSource};
use crate::models::{Account, DateWindow};
use crate::storage::{Repository, RunRecord};
use crate::writer::{DeadLetterLog, UpsertWriter, WriteReport};
use anyhow::{Context, Result};
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountState {
    Pending,
    Fetching,
    Assembling,
    Writing,
    Done,
    Skipped,
}

impl fmt::Display for AccountState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AccountState::Pending => "PENDING",
            AccountState::Fetching => "FETCHING",
            AccountState::Assembling => "ASSEMBLING",
            AccountState::Writing => "WRITING",
            AccountState::Done => "DONE",
            AccountState::Skipped => "SKIPPED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct AccountOutcome {
    pub account: Account,
    pub state: AccountState,
    pub reason: Option<String>,
    pub rows_written: usize,
    pub rows_dead_lettered: usize,
    pub rows_dropped: usize,
}

impl AccountOutcome {
    fn skipped(account: Account, reason: impl Into<String>) -> Self {
        Self {
            account,
            state: AccountState::Skipped,
            reason: Some(reason.into()),
            rows_written: 0,
            rows_dead_lettered: 0,
            rows_dropped: 0,
        }
    }
}

#[derive(Debug)]
pub struct RunSummary {
    pub run_id: Option<i64>,
    pub window: DateWindow,
    pub outcomes: Vec<AccountOutcome>,
}

impl RunSummary {
    pub fn done(&self) -> usize {
        self.count(AccountState::Done)
    }

    pub fn skipped(&self) -> usize {
        self.count(AccountState::Skipped)
    }

    pub fn rows_written(&self) -> usize {
        self.outcomes.iter().map(|o| o.rows_written).sum()
    }

    pub fn rows_dead_lettered(&self) -> usize {
        self.outcomes.iter().map(|o| o.rows_dead_lettered).sum()
    }

    pub fn rows_dropped(&self) -> usize {
        self.outcomes.iter().map(|o| o.rows_dropped).sum()
    }

    fn count(&self, state: AccountState) -> usize {
        self.outcomes.iter().filter(|o| o.state == state).count()
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub concurrency: usize,
    pub pace_min_ms: u64,
    pub pace_max_ms: u64,
    pub enrich_creatives: bool,
}

impl From<&AppConfig> for PipelineSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            concurrency: config.pipeline.concurrency,
            pace_min_ms: config.pipeline.pace_min_ms,
            pace_max_ms: config.pipeline.pace_max_ms,
            enrich_creatives: config.pipeline.enrich_creatives,
        }
    }
}

/// What a spawned account task hands back to the dispatcher.
enum TaskResult {
    Finished(AccountOutcome),
    Aborted(Account, WriteError),
}

pub struct Pipeline {
    source: Arc<dyn AdsDataSource>,
    repo: Arc<Repository>,
    writer: Arc<UpsertWriter>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn AdsDataSource>,
        repo: Arc<Repository>,
        writer: Arc<UpsertWriter>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            source,
            repo,
            writer,
            settings,
        }
    }

    /// Wire the Graph API source, DuckDB store and writer from config.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let token = config.access_token()?;

        let repo = Arc::new(
            Repository::open(&config.storage.db_path, config.writer.moderation)
                .context("Failed to open DuckDB")?,
        );
        if config.storage.run_migrations {
            repo.run_migrations()?;
        }

        let transport = Arc::new(
            ReqwestTransport::new(&config.api, token).context("Failed to build HTTP transport")?,
        );
        let source = Arc::new(GraphApiSource::new(transport, &config.api));

        let writer = Arc::new(UpsertWriter::new(
            repo.clone(),
            DeadLetterLog::new(&config.storage.dead_letter_dir),
            config.writer.batch_size,
        ));

        Ok(Self::new(source, repo, writer, PipelineSettings::from(config)))
    }

    #[cfg(test)]
    pub fn repository(&self) -> &Arc<Repository> {
        &self.repo
    }

    pub async fn run(
        &self,
        accounts: Vec<Account>,
        window: DateWindow,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, PipelineError> {
        // Run-local token: a structural abort stops this run without touching the caller's token.
        let run_token = cancel.child_token();

        let run_id = match self.repo.begin_ingest_run(&window) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("Could not record ingest run start: {:#}", e);
                None
            }
        };

        info!(
            "=== Ingesting {} accounts for {} → {} (concurrency {}) ===",
            accounts.len(),
            window.since,
            window.until,
            self.settings.concurrency
        );

        let sem = Arc::new(Semaphore::new(self.settings.concurrency.max(1)));
        let mut outcomes: Vec<Option<AccountOutcome>> = vec![None; accounts.len()];
        let mut handles = Vec::new();

        for (index, account) in accounts.into_iter().enumerate() {
            if index > 0 {
                self.pace(&run_token).await;
            }

            let permit = tokio::select! {
                biased;
                _ = run_token.cancelled() => None,
                permit = sem.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                info!(account = %account.account_id, "{}: not dispatched, run cancelled", account.business_name);
                outcomes[index] = Some(AccountOutcome::skipped(account, AccountError::Cancelled.to_string()));
                continue;
            };

            debug!(account = %account.account_id, state = %AccountState::Pending, "{}", account.business_name);

            let source = Arc::clone(&self.source);
            let writer = Arc::clone(&self.writer);
            let token = run_token.clone();
            let enrich = self.settings.enrich_creatives;
            let task_window = window;
            let task_account = account.clone();

            let handle = tokio::spawn(async move {
                let _permit = permit;
                let result = process_account(source, writer, task_account, task_window, enrich, &token).await;
                if matches!(result, TaskResult::Aborted(..)) {
                    token.cancel();
                }
                result
            });

            handles.push((index, account, handle));
        }

        let mut structural: Option<WriteError> = None;

        for (index, account, handle) in handles {
            let outcome = match handle.await {
                Ok(TaskResult::Finished(outcome)) => outcome,
                Ok(TaskResult::Aborted(account, e)) => {
                    let outcome = AccountOutcome::skipped(account, e.to_string());
                    structural.get_or_insert(e);
                    outcome
                }
                Err(e) => {
                    error!(account = %account.account_id, "Task panic for {}: {}", account.business_name, e);
                    AccountOutcome::skipped(account, format!("task panicked: {}", e))
                }
            };
            outcomes[index] = Some(outcome);
        }

        let summary = RunSummary {
            run_id,
            window,
            outcomes: outcomes.into_iter().flatten().collect(),
        };

        let error_msg = structural.as_ref().map(|e| e.to_string());
        if let Some(id) = run_id {
            let record = RunRecord {
                accounts_done: summary.done(),
                accounts_skipped: summary.skipped(),
                rows_written: summary.rows_written(),
                rows_dead_lettered: summary.rows_dead_lettered(),
                error: error_msg.as_deref(),
            };
            if let Err(e) = self.repo.finish_ingest_run(id, &record) {
                warn!("Could not record ingest run finish: {:#}", e);
            }
        }

        if let Some(e) = structural {
            error!("=== Run aborted: {} ===", e);
            return Err(PipelineError::Structural(e));
        }

        info!(
            "=== Done: {} accounts ok | {} skipped | {} rows | {} dead-lettered ===",
            summary.done(),
            summary.skipped(),
            summary.rows_written(),
            summary.rows_dead_lettered()
        );
        Ok(summary)
    }

    /// Random pause between account dispatches, cut short by cancellation.
    async fn pace(&self, cancel: &CancellationToken) {
        let (min, max) = (self.settings.pace_min_ms, self.settings.pace_max_ms);
        if max == 0 {
            return;
        }
        let ms = rand::random_range(min..=max.max(min));
        debug!("Pacing {} ms before next account", ms);
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(Duration::from_millis(ms)) => {}
        }
    }
}

async fn process_account(
    source: Arc<dyn AdsDataSource>,
    writer: Arc<UpsertWriter>,
    account: Account,
    window: DateWindow,
    enrich_creatives: bool,
    cancel: &CancellationToken,
) -> TaskResult {
    let id = account.account_id.clone();
    let transition = |state: AccountState| {
        debug!(account = %id, state = %state, "{}", account.business_name);
    };

    // ── Fetching ──────────────────────────────────────────────────────────────
    transition(AccountState::Fetching);
    let fetched = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AccountError::Cancelled),
        r = fetch_account(source.as_ref(), &account, &window, enrich_creatives) => r,
    };
    let (lookups, raw) = match fetched {
        Ok(v) => v,
        Err(e) => {
            let transient = matches!(&e, AccountError::Fetch { source, .. } if source.is_transient());
            warn!(account = %id, transient, "{} skipped: {}", account.business_name, e);
            return TaskResult::Finished(AccountOutcome::skipped(account, e.to_string()));
        }
    };

    // ── Assembling ────────────────────────────────────────────────────────────
    transition(AccountState::Assembling);
    let assembled = assemble(&account, &raw, &lookups, Utc::now().naive_utc());
    let dropped = assembled.dropped;

    // ── Writing ───────────────────────────────────────────────────────────────
    transition(AccountState::Writing);
    let business = account.business_name.clone();
    let rows = assembled.rows;
    let written = tokio::task::spawn_blocking(move || writer.write(&business, &rows)).await;

    let report: WriteReport = match written {
        Ok(Ok(report)) => report,
        Ok(Err(e)) => return TaskResult::Aborted(account, e),
        Err(e) => {
            error!(account = %id, "Writer task failed: {}", e);
            return TaskResult::Finished(AccountOutcome::skipped(account, format!("writer task failed: {}", e)));
        }
    };

    info!(
        account = %id,
        degraded_batches = report.degraded_batches,
        "{} DONE: {} rows written, {} dead-lettered, {} malformed",
        account.business_name,
        report.succeeded,
        report.dead_lettered,
        dropped
    );

    TaskResult::Finished(AccountOutcome {
        account,
        state: AccountState::Done,
        reason: None,
        rows_written: report.succeeded,
        rows_dead_lettered: report.dead_lettered,
        rows_dropped: dropped,
    })
}

/// Ads, campaigns and insights are independent reads and run concurrently.
async fn fetch_account(
    source: &dyn AdsDataSource,
    account: &Account,
    window: &DateWindow,
    enrich_creatives: bool,
) -> Result<(Lookups, Vec<serde_json::Value>), AccountError> {
    let id = account.account_id.as_str();
    let wrap = |resource: &'static str| move |source: FetchError| AccountError::Fetch { resource, source };

    let (ads, campaigns, raw) = tokio::try_join!(
        async { source.fetch_ads(id).await.map_err(wrap("ads")) },
        async { source.fetch_campaigns(id).await.map_err(wrap("campaigns")) },
        async { source.fetch_insights(id, window).await.map_err(wrap("insights")) },
    )?;

    let creatives = if enrich_creatives {
        let ad_ids = raw.iter().filter_map(|r| r.get("ad_id").and_then(|v| v.as_str()));
        collect_creatives(source, id, ad_ids).await
    } else {
        Default::default()
    };

    Ok((
        Lookups {
            ads,
            campaigns,
            creatives,
        },
        raw,
    ))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModerationPolicy;
    use crate::graph::http_client::mock::{fast_config, ok, reply, MockTransport};
    use crate::models::{Ad, Campaign, Creative};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_test::{assert_err, assert_ok};

    fn account(name: &str, id: &str) -> Account {
        Account {
            team: "west".into(),
            business_name: name.into(),
            account_id: id.into(),
        }
    }

    fn accounts() -> Vec<Account> {
        vec![
            account("Iron Works Gym", "111"),
            account("Peak Fitness", "222"),
            account("Harbor Yoga", "333"),
        ]
    }

    fn window() -> DateWindow {
        DateWindow::new(
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 6, 2).unwrap(),
        )
        .unwrap()
    }

    /// Graph stub: account 222 is forbidden, every other account has two ads over two days.
    fn graph(url: &str) -> Result<crate::graph::http_client::RawResponse, crate::errors::TransportError> {
        if url.contains("act_222") {
            return reply(403, r#"{"error":{"message":"(#200) Permissions error"}}"#);
        }
        if url.contains("/ads?") {
            ok(json!({ "data": [
                { "id": "a1", "name": "Promo", "campaign_id": "c1" },
                { "id": "a2", "name": "Retarget", "campaign_id": "c1" }
            ]}))
        } else if url.contains("/campaigns?") {
            ok(json!({ "data": [{ "id": "c1", "name": "Summer", "daily_budget": "25000000" }] }))
        } else if url.contains("/insights?") {
            let mut data = Vec::new();
            for ad in ["a1", "a2"] {
                for day in ["2024-06-01", "2024-06-02"] {
                    data.push(json!({
                        "ad_id": ad, "date_start": day,
                        "impressions": "200", "clicks": "10", "spend": "50",
                        "actions": [{ "action_type": "lead", "value": "5" }]
                    }));
                }
            }
            ok(json!({ "data": data }))
        } else {
            reply(404, "unexpected")
        }
    }

    struct Harness {
        pipeline: Pipeline,
        transport: Arc<MockTransport>,
        _dead_letters: tempfile::TempDir,
    }

    fn harness() -> Harness {
        let transport = Arc::new(MockTransport::new(graph));
        let source = Arc::new(GraphApiSource::new(transport.clone(), &fast_config()));
        let repo = Arc::new(Repository::open_in_memory(ModerationPolicy::Preserve).unwrap());
        repo.run_migrations().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let writer = Arc::new(UpsertWriter::new(repo.clone(), DeadLetterLog::new(dir.path()), 100));
        let settings = PipelineSettings {
            concurrency: 2,
            pace_min_ms: 0,
            pace_max_ms: 0,
            enrich_creatives: false,
        };
        Harness {
            pipeline: Pipeline::new(source, repo, writer, settings),
            transport,
            _dead_letters: dir,
        }
    }

    /// No ads or campaigns; every insights call sleeps for `delay` and records overlap.
    #[derive(Default)]
    struct SlowSource {
        delay: Duration,
        cancel_on_insights: Option<CancellationToken>,
        insight_calls: AtomicUsize,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl AdsDataSource for SlowSource {
        async fn fetch_ads(&self, _: &str) -> Result<HashMap<String, Ad>, FetchError> {
            Ok(HashMap::new())
        }

        async fn fetch_campaigns(&self, _: &str) -> Result<HashMap<String, Campaign>, FetchError> {
            Ok(HashMap::new())
        }

        async fn fetch_insights(&self, _: &str, _: &DateWindow) -> Result<Vec<Value>, FetchError> {
            self.insight_calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            if let Some(token) = &self.cancel_on_insights {
                token.cancel();
            }
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(Vec::new())
        }

        async fn fetch_creative(&self, _: &str) -> Result<Option<Creative>, FetchError> {
            Ok(None)
        }

        async fn resolve_image_url(&self, _: &str, _: &str) -> Result<Option<String>, FetchError> {
            Ok(None)
        }
    }

    fn pipeline_over(source: Arc<dyn AdsDataSource>, concurrency: usize) -> (Pipeline, tempfile::TempDir) {
        let repo = Arc::new(Repository::open_in_memory(ModerationPolicy::Preserve).unwrap());
        repo.run_migrations().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let writer = Arc::new(UpsertWriter::new(repo.clone(), DeadLetterLog::new(dir.path()), 100));
        let settings = PipelineSettings {
            concurrency,
            pace_min_ms: 0,
            pace_max_ms: 0,
            enrich_creatives: false,
        };
        (Pipeline::new(source, repo, writer, settings), dir)
    }

    fn many_accounts(n: usize) -> Vec<Account> {
        (0..n).map(|i| account(&format!("Gym {i}"), &format!("{}", 900 + i))).collect()
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let source = Arc::new(SlowSource {
            delay: Duration::from_millis(50),
            ..Default::default()
        });
        let (pipeline, _dir) = pipeline_over(source.clone(), 2);

        let summary = assert_ok!(pipeline.run(many_accounts(6), window(), &CancellationToken::new()).await);

        assert_eq!(summary.done(), 6);
        assert_eq!(source.insight_calls.load(Ordering::SeqCst), 6);
        assert_eq!(source.peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cancel_during_fetch_stops_the_run() {
        let cancel = CancellationToken::new();
        let source = Arc::new(SlowSource {
            delay: Duration::from_secs(30),
            cancel_on_insights: Some(cancel.clone()),
            ..Default::default()
        });
        let (pipeline, _dir) = pipeline_over(source.clone(), 1);

        let run = pipeline.run(many_accounts(3), window(), &cancel);
        let summary = assert_ok!(assert_ok!(tokio::time::timeout(Duration::from_secs(5), run).await));

        assert_eq!(summary.skipped(), 3);
        assert!(summary
            .outcomes
            .iter()
            .all(|o| o.reason.as_deref() == Some("run cancelled")));
        // the in-flight account was interrupted; the other two were never started
        assert_eq!(source.insight_calls.load(Ordering::SeqCst), 1);
        assert_eq!(pipeline.repository().row_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failing_account_is_isolated() {
        let h = harness();
        let summary = assert_ok!(h.pipeline.run(accounts(), window(), &CancellationToken::new()).await);

        let states: Vec<_> = summary.outcomes.iter().map(|o| o.state).collect();
        assert_eq!(states, vec![AccountState::Done, AccountState::Skipped, AccountState::Done]);
        assert!(summary.outcomes[1].reason.as_deref().unwrap().contains("403"));
        assert_eq!(summary.rows_written(), 8);
        assert_eq!(summary.rows_dead_lettered(), 0);

        let repo = h.pipeline.repository();
        assert_eq!(repo.row_count().unwrap(), 8);
        assert_eq!(repo.account_count().unwrap(), 2);

        let row = repo
            .fetch_row("111", "a1", NaiveDate::from_ymd_opt(2024, 6, 1).unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(row.campaign_name.as_deref(), Some("Summer"));
        assert_eq!(row.daily_budget, Some(25.0));
        assert_eq!(row.metrics.cpa, 10.0);

        let (status, _) = repo.last_run_status().unwrap().unwrap();
        assert_eq!(status, "success");
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let h = harness();
        let cancel = CancellationToken::new();
        h.pipeline.run(accounts(), window(), &cancel).await.unwrap();
        let mut first = h.pipeline.repository().rows_for_account("111").unwrap();

        h.pipeline.run(accounts(), window(), &cancel).await.unwrap();
        let mut second = h.pipeline.repository().rows_for_account("111").unwrap();

        assert_eq!(h.pipeline.repository().row_count().unwrap(), 8);
        for r in first.iter_mut().chain(second.iter_mut()) {
            r.ingested_at = NaiveDate::MIN.and_hms_opt(0, 0, 0).unwrap();
        }
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_cancelled_run_dispatches_nothing() {
        let h = harness();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = h.pipeline.run(accounts(), window(), &cancel).await.unwrap();

        assert_eq!(summary.skipped(), 3);
        assert!(summary
            .outcomes
            .iter()
            .all(|o| o.reason.as_deref() == Some("run cancelled")));
        assert_eq!(h.transport.call_count(), 0);
        assert_eq!(h.pipeline.repository().row_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_structural_failure_aborts_run() {
        let transport = Arc::new(MockTransport::new(graph));
        let source = Arc::new(GraphApiSource::new(transport.clone(), &fast_config()));
        // no migrations: the table is missing
        let repo = Arc::new(Repository::open_in_memory(ModerationPolicy::Preserve).unwrap());
        let dir = tempfile::tempdir().unwrap();
        let writer = Arc::new(UpsertWriter::new(repo.clone(), DeadLetterLog::new(dir.path()), 100));
        let settings = PipelineSettings {
            concurrency: 1,
            pace_min_ms: 0,
            pace_max_ms: 0,
            enrich_creatives: false,
        };
        let pipeline = Pipeline::new(source, repo, writer, settings);
        let cancel = CancellationToken::new();

        let err = assert_err!(pipeline.run(accounts(), window(), &cancel).await);

        assert!(matches!(err, PipelineError::Structural(_)));
        // the caller's token is left alone
        assert!(!cancel.is_cancelled());
        // accounts after the failing write are never fetched
        let calls = transport.calls();
        assert!(calls.iter().any(|url| url.contains("act_111")));
        assert!(!calls.iter().any(|url| url.contains("act_222") || url.contains("act_333")));
    }

    #[tokio::test]
    async fn test_creative_enrichment() {
        let transport = Arc::new(MockTransport::new(|url: &str| {
            if url.contains("/adcreatives") {
                ok(json!({ "data": [{ "id": "cr1", "thumbnail_url": "https://cdn/t.png",
                    "object_story_spec": { "link_data": { "message": "Join now", "name": "Summer deal" } } }] }))
            } else {
                graph(url)
            }
        }));
        let source = Arc::new(GraphApiSource::new(transport, &fast_config()));
        let repo = Arc::new(Repository::open_in_memory(ModerationPolicy::Preserve).unwrap());
        repo.run_migrations().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let writer = Arc::new(UpsertWriter::new(repo.clone(), DeadLetterLog::new(dir.path()), 100));
        let settings = PipelineSettings {
            concurrency: 1,
            pace_min_ms: 0,
            pace_max_ms: 0,
            enrich_creatives: true,
        };
        let pipeline = Pipeline::new(source, repo.clone(), writer, settings);

        pipeline
            .run(vec![account("Iron Works Gym", "111")], window(), &CancellationToken::new())
            .await
            .unwrap();

        let row = repo
            .fetch_row("111", "a2", NaiveDate::from_ymd_opt(2024, 6, 2).unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(row.creative.creative_id.as_deref(), Some("cr1"));
        assert_eq!(row.creative.thumbnail_url.as_deref(), Some("https://cdn/t.png"));
    }
}
