use crate::config::ModerationPolicy;
use crate::errors::StoreError;
use crate::models::{DateWindow, MetricRow};
use crate::moderation::FlagVerdict;
use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use duckdb::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::info;

// ── Schema ────────────────────────────────────────────────────────────────────

const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS ad_metrics (
    account_id      VARCHAR   NOT NULL,
    ad_id           VARCHAR   NOT NULL,
    date            DATE      NOT NULL,
    row_id          VARCHAR   NOT NULL,
    business_name   VARCHAR   NOT NULL,
    ad_name         VARCHAR   NOT NULL,
    campaign_id     VARCHAR,
    campaign_name   VARCHAR,
    daily_budget    DOUBLE,
    impressions     BIGINT    NOT NULL CHECK (impressions >= 0),
    clicks          BIGINT    NOT NULL CHECK (clicks >= 0),
    spend           DOUBLE    NOT NULL CHECK (spend >= 0),
    frequency       DOUBLE    NOT NULL DEFAULT 0,
    reach           BIGINT    NOT NULL DEFAULT 0,
    ctr             DOUBLE    NOT NULL,
    cpc             DOUBLE    NOT NULL,
    cpm             DOUBLE    NOT NULL,
    cpa             DOUBLE    NOT NULL,
    leads           BIGINT    NOT NULL,
    purchases       BIGINT    NOT NULL,
    conversions     BIGINT    NOT NULL,
    -- Owned by downstream moderation
    flagged         BOOLEAN   NOT NULL DEFAULT FALSE,
    flagged_reason  VARCHAR,
    ai_summary      VARCHAR,
    creative_id     VARCHAR,
    headline        VARCHAR,
    description     VARCHAR,
    cta_type        VARCHAR,
    thumbnail_url   VARCHAR,
    image_hash      VARCHAR,
    image_url       VARCHAR,
    ingested_at     TIMESTAMP NOT NULL,
    PRIMARY KEY (account_id, ad_id, date)
);

CREATE SEQUENCE IF NOT EXISTS ingest_run_ids START 1;

CREATE TABLE IF NOT EXISTS ingest_runs (
    id                  BIGINT PRIMARY KEY DEFAULT nextval('ingest_run_ids'),
    started_at          TIMESTAMP NOT NULL,
    finished_at         TIMESTAMP,
    status              VARCHAR NOT NULL DEFAULT 'running',
    window_since        DATE,
    window_until        DATE,
    accounts_done       BIGINT DEFAULT 0,
    accounts_skipped    BIGINT DEFAULT 0,
    rows_written        BIGINT DEFAULT 0,
    rows_dead_lettered  BIGINT DEFAULT 0,
    error_msg           VARCHAR
);

CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TIMESTAMP NOT NULL
);
"#;

const METRIC_COLUMNS: &str = "account_id, ad_id, date, row_id, business_name, ad_name, \
     campaign_id, campaign_name, daily_budget, impressions, clicks, spend, frequency, reach, \
     ctr, cpc, cpm, cpa, leads, purchases, conversions, flagged, flagged_reason, \
     creative_id, headline, description, cta_type, thumbnail_url, image_hash, image_url, ingested_at";

/// Full replace of every pipeline-owned column; moderation columns per policy.
fn upsert_sql(policy: ModerationPolicy) -> String {
    let moderation = match policy {
        ModerationPolicy::Preserve => "",
        ModerationPolicy::Reset => {
            ",
                flagged        = excluded.flagged,
                flagged_reason = excluded.flagged_reason,
                ai_summary     = NULL"
        }
    };

    format!(
        r#"
        INSERT INTO ad_metrics ({METRIC_COLUMNS})
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (account_id, ad_id, date) DO UPDATE SET
            row_id        = excluded.row_id,
            business_name = excluded.business_name,
            ad_name       = excluded.ad_name,
            campaign_id   = excluded.campaign_id,
            campaign_name = excluded.campaign_name,
            daily_budget  = excluded.daily_budget,
            impressions   = excluded.impressions,
            clicks        = excluded.clicks,
            spend         = excluded.spend,
            frequency     = excluded.frequency,
            reach         = excluded.reach,
            ctr           = excluded.ctr,
            cpc           = excluded.cpc,
            cpm           = excluded.cpm,
            cpa           = excluded.cpa,
            leads         = excluded.leads,
            purchases     = excluded.purchases,
            conversions   = excluded.conversions,
            creative_id   = excluded.creative_id,
            headline      = excluded.headline,
            description   = excluded.description,
            cta_type      = excluded.cta_type,
            thumbnail_url = excluded.thumbnail_url,
            image_hash    = excluded.image_hash,
            image_url     = excluded.image_url,
            ingested_at   = excluded.ingested_at{moderation}
        "#
    )
}

// ── Store trait ───────────────────────────────────────────────────────────────

/// Destination for metric rows. Implementations must be safe to share
/// between concurrently running accounts.
pub trait MetricStore: Send + Sync {
    /// Upsert all rows atomically: either every row is applied or none is.
    fn upsert_rows(&self, rows: &[MetricRow]) -> Result<usize, StoreError>;
}

// ── Repository ────────────────────────────────────────────────────────────────

pub struct Repository {
    conn: Mutex<Connection>,
    upsert_sql: String,
}

impl Repository {
    pub fn open(path: &Path, policy: ModerationPolicy) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Could not create dir {:?}", parent))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open DuckDB at {:?}", path))?;
        Ok(Self::from_connection(conn, policy))
    }

    pub fn open_in_memory(policy: ModerationPolicy) -> Result<Self> {
        Ok(Self::from_connection(Connection::open_in_memory()?, policy))
    }

    fn from_connection(conn: Connection, policy: ModerationPolicy) -> Self {
        Self {
            conn: Mutex::new(conn),
            upsert_sql: upsert_sql(policy),
        }
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panicked writer leaves no open transaction behind; the connection is still usable.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn run_migrations(&self) -> Result<()> {
        info!("Running migrations…");
        let conn = self.conn();
        conn.execute_batch(DDL).context("DDL failed")?;
        conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, ?)",
            params![Utc::now().naive_utc()],
        )?;
        info!("Migrations done.");
        Ok(())
    }

    /// Record a moderation verdict. Returns false when no row matches.
    pub fn apply_verdict(&self, account_id: &str, verdict: &FlagVerdict) -> Result<bool> {
        let conn = self.conn();
        let n = conn
            .execute(
                r#"UPDATE ad_metrics SET
                       flagged = ?, flagged_reason = ?, ai_summary = COALESCE(?, ai_summary)
                   WHERE account_id = ? AND ad_id = ? AND date = ?"#,
                params![
                    verdict.flagged,
                    verdict.reason,
                    verdict.summary,
                    account_id,
                    verdict.ad_id,
                    verdict.date,
                ],
            )
            .with_context(|| format!("apply verdict {} {}", verdict.ad_id, verdict.date))?;
        Ok(n > 0)
    }

    pub fn row_count(&self) -> Result<i64> {
        let conn = self.conn();
        Ok(conn.query_row("SELECT COUNT(*) FROM ad_metrics", [], |r| r.get(0))?)
    }

    pub fn account_count(&self) -> Result<i64> {
        let conn = self.conn();
        Ok(conn.query_row("SELECT COUNT(DISTINCT account_id) FROM ad_metrics", [], |r| r.get(0))?)
    }

    pub fn flagged_count(&self) -> Result<i64> {
        let conn = self.conn();
        Ok(conn.query_row("SELECT COUNT(*) FROM ad_metrics WHERE flagged", [], |r| r.get(0))?)
    }

    pub fn date_range(&self) -> Result<(Option<NaiveDate>, Option<NaiveDate>)> {
        let conn = self.conn();
        Ok(conn.query_row("SELECT MIN(date), MAX(date) FROM ad_metrics", [], |r| {
            Ok((r.get(0)?, r.get(1)?))
        })?)
    }

    // ── Ingest run log ────────────────────────────────────────────────────────

    pub fn begin_ingest_run(&self, window: &DateWindow) -> Result<i64> {
        let conn = self.conn();
        let id = conn.query_row(
            r#"INSERT INTO ingest_runs (started_at, status, window_since, window_until)
               VALUES (?, 'running', ?, ?) RETURNING id"#,
            params![Utc::now().naive_utc(), window.since, window.until],
            |r| r.get(0),
        )?;
        Ok(id)
    }

    pub fn finish_ingest_run(&self, run_id: i64, outcome: &RunRecord<'_>) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            r#"UPDATE ingest_runs SET
               finished_at = ?, status = ?,
               accounts_done = ?, accounts_skipped = ?,
               rows_written = ?, rows_dead_lettered = ?, error_msg = ?
               WHERE id = ?"#,
            params![
                Utc::now().naive_utc(),
                if outcome.error.is_none() { "success" } else { "error" },
                outcome.accounts_done as i64,
                outcome.accounts_skipped as i64,
                outcome.rows_written as i64,
                outcome.rows_dead_lettered as i64,
                outcome.error,
                run_id,
            ],
        )?;
        Ok(())
    }

    pub fn last_run_status(&self) -> Result<Option<(String, Option<chrono::NaiveDateTime>)>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT status, finished_at FROM ingest_runs ORDER BY id DESC LIMIT 1")?;
        let mut rows = stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?;
        Ok(rows.next().transpose()?)
    }
}

/// Totals recorded when a run finishes.
#[derive(Debug, Default)]
pub struct RunRecord<'a> {
    pub accounts_done: usize,
    pub accounts_skipped: usize,
    pub rows_written: usize,
    pub rows_dead_lettered: usize,
    pub error: Option<&'a str>,
}

impl MetricStore for Repository {
    fn upsert_rows(&self, rows: &[MetricRow]) -> Result<usize, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn();
        let tx = conn.transaction().map_err(store_error)?;

        for r in rows {
            tx.execute(
                &self.upsert_sql,
                params![
                    r.account_id,
                    r.ad_id,
                    r.date,
                    r.row_id,
                    r.business_name,
                    r.ad_name,
                    r.campaign_id,
                    r.campaign_name,
                    r.daily_budget,
                    r.impressions,
                    r.clicks,
                    r.spend,
                    r.frequency,
                    r.reach,
                    r.metrics.ctr,
                    r.metrics.cpc,
                    r.metrics.cpm,
                    r.metrics.cpa,
                    r.metrics.leads,
                    r.metrics.purchases,
                    r.metrics.conversions,
                    r.flagged,
                    r.flagged_reason,
                    r.creative.creative_id,
                    r.creative.headline,
                    r.creative.description,
                    r.creative.cta_type,
                    r.creative.thumbnail_url,
                    r.creative.image_hash,
                    r.creative.image_url,
                    r.ingested_at,
                ],
            )
            .map_err(store_error)?;
        }

        tx.commit().map_err(store_error)?;
        Ok(rows.len())
    }
}

fn store_error(e: duckdb::Error) -> StoreError {
    StoreError::classify(e.to_string())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
