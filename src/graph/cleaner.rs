use crate::errors::RowParseError;
use crate::models::{Action, Ad, Campaign, Creative, InsightRow, RawAd, RawCampaign};
use chrono::NaiveDate;
use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

/// Budgets arrive in platform minor units.
pub const BUDGET_MINOR_UNIT_SCALE: f64 = 1_000_000.0;

// ── Scalars ───────────────────────────────────────────────────────────────────

/// Integer from a JSON number or numeric string. "1234" → 1234
pub fn as_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Float from a JSON number or numeric string. "12.34" → 12.34
pub fn as_f64(v: &Value) -> Option<f64> {
    let parsed = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|f| f.is_finite())
}

fn as_text(v: Option<&Value>) -> Option<String> {
    match v? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ── Ads / campaigns ───────────────────────────────────────────────────────────

pub fn ads_by_id(items: Vec<Value>) -> HashMap<String, Ad> {
    let mut ads = HashMap::with_capacity(items.len());
    for item in items {
        let raw: RawAd = match serde_json::from_value(item) {
            Ok(r) => r,
            Err(e) => {
                warn!("Skipping unreadable ad entry: {}", e);
                continue;
            }
        };
        let Some(ad_id) = raw.id.filter(|id| !id.is_empty()) else {
            warn!("Skipping ad without id");
            continue;
        };
        ads.insert(
            ad_id.clone(),
            Ad {
                ad_id,
                name: raw.name.unwrap_or_else(|| "Unknown".to_string()),
                campaign_id: raw.campaign_id.filter(|c| !c.is_empty()),
            },
        );
    }
    ads
}

pub fn campaigns_by_id(items: Vec<Value>) -> HashMap<String, Campaign> {
    let mut campaigns = HashMap::with_capacity(items.len());
    for item in items {
        let raw: RawCampaign = match serde_json::from_value(item) {
            Ok(r) => r,
            Err(e) => {
                warn!("Skipping unreadable campaign entry: {}", e);
                continue;
            }
        };
        let Some(campaign_id) = raw.id.filter(|id| !id.is_empty()) else {
            warn!("Skipping campaign without id");
            continue;
        };
        campaigns.insert(
            campaign_id.clone(),
            Campaign {
                campaign_id,
                name: raw.name.unwrap_or_default(),
                daily_budget: raw.daily_budget.as_ref().and_then(normalise_budget),
            },
        );
    }
    campaigns
}

/// Minor units → currency units. "25000000" → 25.0
pub fn normalise_budget(v: &Value) -> Option<f64> {
    as_f64(v).map(|minor| minor / BUDGET_MINOR_UNIT_SCALE)
}

// ── Insights ──────────────────────────────────────────────────────────────────

/// Validate one raw insight record.
///
/// `ad_id`, `date_start`, `impressions`, `clicks` and `spend` are required;
/// `frequency` and `reach` default to zero; every action needs a type and an
/// integer value.
pub fn parse_insight(raw: &Value) -> Result<InsightRow, RowParseError> {
    let ad_id = as_text(raw.get("ad_id")).ok_or_else(|| RowParseError::new("?", "missing ad_id"))?;
    let err = |reason: String| RowParseError::new(ad_id.clone(), reason);

    let date_str = raw
        .get("date_start")
        .and_then(Value::as_str)
        .ok_or_else(|| err("missing date_start".into()))?;
    let date = NaiveDate::parse_from_str(date_str.trim(), "%Y-%m-%d")
        .map_err(|e| err(format!("bad date_start {:?}: {}", date_str, e)))?;

    let required_int = |field: &str| {
        raw.get(field)
            .and_then(as_i64)
            .ok_or_else(|| err(format!("missing or non-integer {}", field)))
    };
    let impressions = required_int("impressions")?;
    let clicks = required_int("clicks")?;
    let spend = raw
        .get("spend")
        .and_then(as_f64)
        .ok_or_else(|| err("missing or non-numeric spend".into()))?;

    let frequency = match raw.get("frequency") {
        None | Some(Value::Null) => 0.0,
        Some(v) => as_f64(v).ok_or_else(|| err("non-numeric frequency".into()))?,
    };
    let reach = match raw.get("reach") {
        None | Some(Value::Null) => 0,
        Some(v) => as_i64(v).ok_or_else(|| err("non-integer reach".into()))?,
    };

    let actions = match raw.get("actions") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|a| parse_action(a).map_err(&err))
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => return Err(err("actions is not a list".into())),
    };

    Ok(InsightRow {
        ad_id: ad_id.clone(),
        date,
        impressions,
        clicks,
        spend,
        frequency,
        reach,
        actions,
    })
}

fn parse_action(raw: &Value) -> Result<Action, String> {
    let action_type = raw
        .get("action_type")
        .and_then(Value::as_str)
        .ok_or("action without action_type")?;
    let value = raw
        .get("value")
        .and_then(as_i64)
        .ok_or_else(|| format!("non-integer value for action {}", action_type))?;
    Ok(Action {
        action_type: action_type.to_string(),
        value,
    })
}

// ── Creatives ─────────────────────────────────────────────────────────────────

/// Flatten a creative: link_data (image ads) or video_data (video ads), with
/// asset_feed_spec overriding for dynamic creatives.
pub fn extract_creative(raw: &Value) -> Creative {
    let mut c = Creative {
        creative_id: as_text(raw.get("id")),
        thumbnail_url: as_text(raw.get("thumbnail_url")),
        image_hash: as_text(raw.get("image_hash")),
        ..Default::default()
    };

    let story = raw.get("object_story_spec");
    if let Some(link) = story.and_then(|s| s.get("link_data")) {
        c.headline = as_text(link.get("name"));
        c.description = as_text(link.get("description")).or_else(|| as_text(link.get("message")));
        c.image_hash = as_text(link.get("image_hash")).or(c.image_hash);
        c.cta_type = as_text(link.get("call_to_action").and_then(|a| a.get("type")));
    } else if let Some(video) = story.and_then(|s| s.get("video_data")) {
        c.headline = as_text(video.get("title"));
        c.description = as_text(video.get("message"));
        c.cta_type = as_text(video.get("call_to_action").and_then(|a| a.get("type")));
    }

    if let Some(feed) = raw.get("asset_feed_spec") {
        if let Some(hash) = feed
            .get("images")
            .and_then(Value::as_array)
            .and_then(|imgs| imgs.first())
            .and_then(|img| as_text(img.get("hash")))
        {
            c.image_hash = Some(hash);
        }
        if let Some(template) = feed
            .get("ad_templates")
            .and_then(Value::as_array)
            .and_then(|t| t.first())
        {
            c.headline = as_text(template.get("title")).or(c.headline);
            c.description = as_text(template.get("body")).or(c.description);
        }
    }

    c
}

/// `url` of the first entry in an `/adimages` response.
pub fn first_image_url(page: &Value) -> Option<String> {
    page.get("data")
        .and_then(Value::as_array)
        .and_then(|d| d.first())
        .and_then(|img| as_text(img.get("url")))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_insight_graph_strings() {
        let raw = json!({
            "ad_id": "238",
            "date_start": "2024-05-02",
            "date_stop": "2024-05-02",
            "impressions": "200",
            "clicks": "10",
            "spend": "50.00",
            "frequency": "1.25",
            "reach": "160",
            "actions": [
                { "action_type": "lead", "value": "2" },
                { "action_type": "link_click", "value": "9" }
            ]
        });
        let row = parse_insight(&raw).unwrap();
        assert_eq!(row.ad_id, "238");
        assert_eq!(row.date, NaiveDate::from_ymd_opt(2024, 5, 2).unwrap());
        assert_eq!(row.impressions, 200);
        assert_eq!(row.spend, 50.0);
        assert_eq!(row.reach, 160);
        assert_eq!(row.actions.len(), 2);
        assert_eq!(row.actions[0].value, 2);
    }

    #[test]
    fn test_optional_fields_default() {
        let raw = json!({ "ad_id": "1", "date_start": "2024-05-02", "impressions": 0, "clicks": 0, "spend": 0 });
        let row = parse_insight(&raw).unwrap();
        assert_eq!(row.frequency, 0.0);
        assert_eq!(row.reach, 0);
        assert!(row.actions.is_empty());
    }

    #[test]
    fn test_missing_required_field_is_rejected() {
        let raw = json!({ "ad_id": "1", "date_start": "2024-05-02", "clicks": "3", "spend": "1" });
        let err = parse_insight(&raw).unwrap_err();
        assert_eq!(err.ad_id, "1");
        assert!(err.reason.contains("impressions"));
    }

    #[test]
    fn test_non_numeric_action_value_is_rejected() {
        let raw = json!({
            "ad_id": "7", "date_start": "2024-05-02",
            "impressions": "1", "clicks": "1", "spend": "1",
            "actions": [{ "action_type": "purchase", "value": "lots" }]
        });
        let err = parse_insight(&raw).unwrap_err();
        assert!(err.reason.contains("purchase"));
    }

    #[test]
    fn test_bad_date_is_rejected() {
        let raw = json!({ "ad_id": "1", "date_start": "02/05/2024", "impressions": 1, "clicks": 1, "spend": 1 });
        assert!(parse_insight(&raw).is_err());
    }

    #[test]
    fn test_budget_normalisation() {
        assert_eq!(normalise_budget(&json!("25000000")), Some(25.0));
        assert_eq!(normalise_budget(&json!(1_500_000)), Some(1.5));
        assert_eq!(normalise_budget(&json!("n/a")), None);
    }

    #[test]
    fn test_campaign_without_budget() {
        let map = campaigns_by_id(vec![
            json!({ "id": "c1", "name": "Spring", "daily_budget": "5000000" }),
            json!({ "id": "c2", "name": "Lifetime" }),
            json!({ "name": "orphan" }),
        ]);
        assert_eq!(map.len(), 2);
        assert_eq!(map["c1"].daily_budget, Some(5.0));
        assert_eq!(map["c2"].daily_budget, None);
    }

    #[test]
    fn test_ads_default_name() {
        let map = ads_by_id(vec![json!({ "id": "a1", "campaign_id": "c1" }), json!({ "id": "" })]);
        assert_eq!(map.len(), 1);
        assert_eq!(map["a1"].name, "Unknown");
        assert_eq!(map["a1"].campaign_id.as_deref(), Some("c1"));
    }

    #[test]
    fn test_extract_image_creative() {
        let c = extract_creative(&json!({
            "id": "cr1",
            "thumbnail_url": "https://cdn/t.jpg",
            "object_story_spec": { "link_data": {
                "name": "Join now", "message": "First month free",
                "image_hash": "abc", "call_to_action": { "type": "SIGN_UP" }
            }}
        }));
        assert_eq!(c.creative_id.as_deref(), Some("cr1"));
        assert_eq!(c.headline.as_deref(), Some("Join now"));
        assert_eq!(c.description.as_deref(), Some("First month free"));
        assert_eq!(c.cta_type.as_deref(), Some("SIGN_UP"));
        assert_eq!(c.image_hash.as_deref(), Some("abc"));
    }

    #[test]
    fn test_extract_dynamic_creative_overrides() {
        let c = extract_creative(&json!({
            "id": "cr2",
            "object_story_spec": { "video_data": { "title": "Old", "message": "Body" } },
            "asset_feed_spec": {
                "images": [{ "hash": "h1" }],
                "ad_templates": [{ "title": "New title" }]
            }
        }));
        assert_eq!(c.headline.as_deref(), Some("New title"));
        assert_eq!(c.description.as_deref(), Some("Body"));
        assert_eq!(c.image_hash.as_deref(), Some("h1"));
    }

    #[test]
    fn test_first_image_url() {
        assert_eq!(
            first_image_url(&json!({ "data": [{ "hash": "h", "url": "https://cdn/i.png" }] })).as_deref(),
            Some("https://cdn/i.png")
        );
        assert_eq!(first_image_url(&json!({ "data": [] })), None);
    }
}
