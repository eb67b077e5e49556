use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Account ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    pub team: String,
    pub business_name: String,
    pub account_id: String, // bare numeric id, no `act_` prefix
}

// ── Ads & campaigns (rebuilt every run) ───────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ad {
    pub ad_id: String,
    pub name: String,
    pub campaign_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Campaign {
    pub campaign_id: String,
    pub name: String,
    pub daily_budget: Option<f64>, // currency units, already divided by the minor-unit scale
}

/// First creative attached to an ad, flattened to the columns we persist.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Creative {
    pub creative_id: Option<String>,
    pub headline: Option<String>,
    pub description: Option<String>,
    pub cta_type: Option<String>,
    pub thumbnail_url: Option<String>,
    pub image_hash: Option<String>,
    pub image_url: Option<String>,
}

// ── Insights ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Action {
    pub action_type: String,
    pub value: i64,
}

/// One validated (ad, day) performance record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InsightRow {
    pub ad_id: String,
    pub date: NaiveDate,
    pub impressions: i64,
    pub clicks: i64,
    pub spend: f64,
    pub frequency: f64,
    pub reach: i64,
    pub actions: Vec<Action>,
}

/// Rate/ratio metrics computed from an `InsightRow`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct DerivedMetrics {
    pub ctr: f64,
    pub cpc: f64,
    pub cpm: f64,
    pub cpa: f64,
    pub leads: i64,
    pub purchases: i64,
    pub conversions: i64,
}

// ── Persisted row ─────────────────────────────────────────────────────────────

/// Identity: (account_id, ad_id, date).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricRow {
    pub row_id: String,
    pub account_id: String,
    pub business_name: String,
    pub ad_id: String,
    pub date: NaiveDate,
    pub ad_name: String,
    pub campaign_id: Option<String>,
    pub campaign_name: Option<String>,
    pub daily_budget: Option<f64>,
    pub impressions: i64,
    pub clicks: i64,
    pub spend: f64,
    pub frequency: f64,
    pub reach: i64,
    #[serde(flatten)]
    pub metrics: DerivedMetrics,
    pub flagged: bool,
    pub flagged_reason: Option<String>,
    #[serde(flatten)]
    pub creative: Creative,
    pub ingested_at: NaiveDateTime,
}

impl MetricRow {
    pub fn key(&self) -> (&str, &str, NaiveDate) {
        (&self.account_id, &self.ad_id, self.date)
    }
}

// ── Query window ──────────────────────────────────────────────────────────────

/// Closed date range `[since, until]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateWindow {
    pub since: NaiveDate,
    pub until: NaiveDate,
}

impl DateWindow {
    pub fn new(since: NaiveDate, until: NaiveDate) -> Option<Self> {
        (since <= until).then_some(Self { since, until })
    }

    /// Rolling window of `days` days ending on `today` (inclusive).
    /// `None` when the start would fall before the earliest representable date.
    pub fn trailing(today: NaiveDate, days: u32) -> Option<Self> {
        let since = today.checked_sub_days(chrono::Days::new(u64::from(days)))?;
        Some(Self { since, until: today })
    }
}

// ── Raw API payloads ──────────────────────────────────────────────────────────

/// Graph API list envelope: `{ "data": [...], "paging": { "next": "..." } }`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub data: Vec<Value>,
    #[serde(default)]
    pub paging: Option<Paging>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Paging {
    pub next: Option<String>,
}

impl Page {
    pub fn next_cursor(&self) -> Option<&str> {
        self.paging
            .as_ref()
            .and_then(|p| p.next.as_deref())
            .filter(|n| !n.is_empty())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAd {
    pub id: Option<String>,
    pub name: Option<String>,
    pub campaign_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawCampaign {
    pub id: Option<String>,
    pub name: Option<String>,
    pub daily_budget: Option<Value>, // string of minor units
}
