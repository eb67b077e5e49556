//! Classified failures for the ingestion pipeline.
//!
//! Everything below the account level is recovered locally; only
//! `Structural` persistence failures escape a run.

use thiserror::Error;

// ── Fetch ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum FetchError {
    /// 429 / 5xx / transport failures that outlived the retry budget.
    #[error("gave up on {url} after {attempts} attempts: {reason}")]
    Transient {
        url: String,
        attempts: u32,
        reason: String,
    },

    /// Non-retryable 4xx. `body` is kept for diagnostics.
    #[error("HTTP {status} from {url}: {body}")]
    Fatal {
        url: String,
        status: u16,
        body: String,
    },

    #[error("undecodable response from {url}: {reason}")]
    Decode { url: String, reason: String },
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient { .. })
    }
}

/// Transport-level failure (connect, timeout, TLS, body read).
#[derive(Debug, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        TransportError(e.to_string())
    }
}

// ── Account ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("{resource} fetch failed: {source}")]
    Fetch {
        resource: &'static str,
        #[source]
        source: FetchError,
    },

    #[error("run cancelled")]
    Cancelled,
}

// ── Rows ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Error, Clone, PartialEq)]
#[error("malformed insight row (ad {ad_id}): {reason}")]
pub struct RowParseError {
    pub ad_id: String,
    pub reason: String,
}

impl RowParseError {
    pub fn new(ad_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            ad_id: ad_id.into(),
            reason: reason.into(),
        }
    }
}

// ── Persistence ───────────────────────────────────────────────────────────────

#[derive(Debug, Error, Clone)]
pub enum StoreError {
    /// Deployment defect: the identity key is not enforceable at the store.
    #[error("store is misconfigured: {0}")]
    Structural(String),

    #[error("{0}")]
    Data(String),
}

impl StoreError {
    /// Classify a raw store message.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();

        let missing_key = lower.contains("conflict")
            && (lower.contains("unique") || lower.contains("primary key"));
        let missing_table = lower.contains("catalog error") && lower.contains("does not exist");

        if missing_key || missing_table {
            StoreError::Structural(message)
        } else {
            StoreError::Data(message)
        }
    }

    pub fn is_structural(&self) -> bool {
        matches!(self, StoreError::Structural(_))
    }
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error(
        "structural persistence failure for {business_name} (batch {batch_index}): {detail}. \
         ad_metrics needs a PRIMARY KEY/UNIQUE index on (account_id, ad_id, date); \
         run `ads-ingest migrate`"
    )]
    Structural {
        business_name: String,
        batch_index: usize,
        detail: String,
    },
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Structural(#[from] WriteError),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
