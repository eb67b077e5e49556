//! Joins raw insight records with the account's ad/campaign lookups.

use crate::graph::cleaner::parse_insight;
use crate::metrics;
use crate::models::{Account, Ad, Campaign, Creative, InsightRow, MetricRow};
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};
use uuid::Uuid;

const UNKNOWN_AD_NAME: &str = "Unknown";

/// Per-account lookup tables, local to one account's processing task.
#[derive(Debug, Default)]
pub struct Lookups {
    pub ads: HashMap<String, Ad>,
    pub campaigns: HashMap<String, Campaign>,
    pub creatives: HashMap<String, Creative>,
}

#[derive(Debug, Default)]
pub struct Assembled {
    pub rows: Vec<MetricRow>,
    /// Raw records dropped as malformed.
    pub dropped: usize,
}

/// Stable per-(ad, day) id, identical across runs.
pub fn row_id(ad_id: &str, date: NaiveDate) -> String {
    let name = format!("{}-{}", ad_id, date.format("%Y-%m-%d"));
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
}

/// Validate, join and derive every raw record. Malformed records are logged
/// and skipped; a missing ad or campaign only leaves fields unset.
pub fn assemble(account: &Account, raw: &[Value], lookups: &Lookups, now: NaiveDateTime) -> Assembled {
    let mut out = Assembled {
        rows: Vec::with_capacity(raw.len()),
        dropped: 0,
    };

    for record in raw {
        match parse_insight(record) {
            Ok(insight) => out.rows.push(to_metric_row(account, insight, lookups, now)),
            Err(e) => {
                warn!(account = %account.account_id, "{}", e);
                out.dropped += 1;
            }
        }
    }

    debug!(
        account = %account.account_id,
        "{} rows assembled, {} dropped",
        out.rows.len(),
        out.dropped
    );
    out
}

pub fn to_metric_row(account: &Account, insight: InsightRow, lookups: &Lookups, now: NaiveDateTime) -> MetricRow {
    let ad = lookups.ads.get(&insight.ad_id);
    let campaign_id = ad.and_then(|a| a.campaign_id.clone());
    let campaign = campaign_id.as_ref().and_then(|id| lookups.campaigns.get(id));

    MetricRow {
        row_id: row_id(&insight.ad_id, insight.date),
        account_id: account.account_id.clone(),
        business_name: account.business_name.clone(),
        ad_name: ad
            .map(|a| a.name.clone())
            .unwrap_or_else(|| UNKNOWN_AD_NAME.to_string()),
        campaign_id,
        campaign_name: campaign.map(|c| c.name.clone()),
        daily_budget: campaign.and_then(|c| c.daily_budget),
        metrics: metrics::derive(&insight),
        impressions: insight.impressions,
        clicks: insight.clicks,
        spend: insight.spend,
        frequency: insight.frequency,
        reach: insight.reach,
        flagged: false,
        flagged_reason: None,
        creative: lookups.creatives.get(&insight.ad_id).cloned().unwrap_or_default(),
        date: insight.date,
        ad_id: insight.ad_id,
        ingested_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn account() -> Account {
        Account {
            team: "west".into(),
            business_name: "Iron Works Gym".into(),
            account_id: "111".into(),
        }
    }

    fn lookups() -> Lookups {
        let mut l = Lookups::default();
        l.ads.insert(
            "a1".into(),
            Ad { ad_id: "a1".into(), name: "Summer promo".into(), campaign_id: Some("c1".into()) },
        );
        l.ads.insert(
            "a2".into(),
            Ad { ad_id: "a2".into(), name: "Orphan".into(), campaign_id: Some("gone".into()) },
        );
        l.campaigns.insert(
            "c1".into(),
            Campaign { campaign_id: "c1".into(), name: "Summer".into(), daily_budget: Some(25.0) },
        );
        l
    }

    fn insight(ad_id: &str) -> Value {
        json!({
            "ad_id": ad_id, "date_start": "2024-06-01",
            "impressions": "200", "clicks": "10", "spend": "50",
            "actions": [{ "action_type": "lead", "value": "5" }]
        })
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 2).unwrap().and_hms_opt(6, 0, 0).unwrap()
    }

    #[test]
    fn test_full_join() {
        let out = assemble(&account(), &[insight("a1")], &lookups(), now());
        assert_eq!(out.dropped, 0);
        let r = &out.rows[0];
        assert_eq!(r.account_id, "111");
        assert_eq!(r.business_name, "Iron Works Gym");
        assert_eq!(r.ad_name, "Summer promo");
        assert_eq!(r.campaign_name.as_deref(), Some("Summer"));
        assert_eq!(r.daily_budget, Some(25.0));
        assert_eq!(r.metrics.ctr, 5.0);
        assert_eq!(r.metrics.leads, 5);
        assert_eq!(r.metrics.cpa, 10.0);
        assert!(!r.flagged);
        assert!(r.flagged_reason.is_none());
    }

    #[test]
    fn test_missing_ad_is_not_fatal() {
        let out = assemble(&account(), &[insight("nope")], &lookups(), now());
        let r = &out.rows[0];
        assert_eq!(r.ad_name, "Unknown");
        assert!(r.campaign_id.is_none());
        assert!(r.campaign_name.is_none());
    }

    #[test]
    fn test_missing_campaign_is_not_fatal() {
        let out = assemble(&account(), &[insight("a2")], &lookups(), now());
        let r = &out.rows[0];
        assert_eq!(r.campaign_id.as_deref(), Some("gone"));
        assert!(r.campaign_name.is_none());
        assert!(r.daily_budget.is_none());
    }

    #[test]
    fn test_malformed_rows_are_skipped() {
        let bad = json!({ "ad_id": "a1", "date_start": "2024-06-01", "clicks": "x" });
        let out = assemble(&account(), &[insight("a1"), bad, insight("a2")], &lookups(), now());
        assert_eq!(out.rows.len(), 2);
        assert_eq!(out.dropped, 1);
    }

    #[test]
    fn test_row_id_is_stable() {
        let d = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        assert_eq!(row_id("a1", d), row_id("a1", d));
        assert_ne!(row_id("a1", d), row_id("a2", d));
        assert_ne!(row_id("a1", d), row_id("a1", d.succ_opt().unwrap()));
    }
}
