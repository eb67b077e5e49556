//! Rate and ratio metrics derived from raw insight counters.
//!
//! `derive` is pure: identical inputs always give bit-identical outputs,
//! which is what keeps re-ingestion idempotent. Zero denominators yield 0.

use crate::models::{Action, DerivedMetrics, InsightRow};

pub fn derive(row: &InsightRow) -> DerivedMetrics {
    let impressions = row.impressions as f64;
    let clicks = row.clicks as f64;

    let leads = sum_actions(&row.actions, |t| t == "lead");
    let purchases = sum_actions(&row.actions, |t| t.contains("purchase"));
    let conversions = leads + purchases;

    DerivedMetrics {
        ctr: ratio(clicks, impressions, row.impressions) * 100.0,
        cpc: ratio(row.spend, clicks, row.clicks),
        cpm: ratio(row.spend, impressions, row.impressions) * 1000.0,
        cpa: ratio(row.spend, conversions as f64, conversions),
        leads,
        purchases,
        conversions,
    }
}

fn ratio(numerator: f64, denominator: f64, guard: i64) -> f64 {
    if guard > 0 { numerator / denominator } else { 0.0 }
}

fn sum_actions(actions: &[Action], matches: impl Fn(&str) -> bool) -> i64 {
    actions
        .iter()
        .filter(|a| matches(&a.action_type))
        .map(|a| a.value)
        .sum()
}
