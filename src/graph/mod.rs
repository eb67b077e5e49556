pub mod cleaner;
pub mod http_client;

use crate::config::ApiConfig;
use crate::errors::FetchError;
use crate::models::{Ad, Campaign, Creative, DateWindow};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

use self::cleaner::{ads_by_id, campaigns_by_id, extract_creative, first_image_url};
use self::http_client::{HttpClient, HttpTransport};

const AD_FIELDS: &str = "id,name,adset_id,campaign_id";
const CAMPAIGN_FIELDS: &str = "id,name,daily_budget";
const INSIGHT_FIELDS: &str = "date_start,ad_id,impressions,clicks,spend,frequency,reach,actions";
const CREATIVE_FIELDS: &str = "id,name,object_story_spec,thumbnail_url,asset_feed_spec,image_hash,object_type";
const CREATIVE_PAGE_SIZE: u32 = 10;

// ── Source trait ──────────────────────────────────────────────────────────────

/// Swappable ads-platform abstraction.
#[async_trait]
pub trait AdsDataSource: Send + Sync {
    /// `ad_id -> Ad` for the whole account.
    async fn fetch_ads(&self, account_id: &str) -> Result<HashMap<String, Ad>, FetchError>;

    /// `campaign_id -> Campaign` with budgets in currency units.
    async fn fetch_campaigns(&self, account_id: &str) -> Result<HashMap<String, Campaign>, FetchError>;

    /// Raw daily insight records for `[since, until]`, validated later row by row.
    async fn fetch_insights(&self, account_id: &str, window: &DateWindow) -> Result<Vec<Value>, FetchError>;

    /// First creative attached to an ad, if any.
    async fn fetch_creative(&self, ad_id: &str) -> Result<Option<Creative>, FetchError>;

    async fn resolve_image_url(&self, account_id: &str, image_hash: &str) -> Result<Option<String>, FetchError>;
}

// ── Graph API ─────────────────────────────────────────────────────────────────

pub struct GraphApiSource {
    client: HttpClient,
    base_url: String,
    insights_page_size: u32,
    entity_page_size: u32,
}

impl GraphApiSource {
    pub fn new(transport: Arc<dyn HttpTransport>, config: &ApiConfig) -> Self {
        Self {
            client: HttpClient::new(transport, config),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            insights_page_size: config.insights_page_size,
            entity_page_size: config.entity_page_size,
        }
    }

    /// e.g. 1234 → {base}/act_1234/insights
    fn account_url(&self, account_id: &str, edge: &str) -> String {
        format!("{}/act_{}/{}", self.base_url, account_id, edge)
    }
}

#[async_trait]
impl AdsDataSource for GraphApiSource {
    async fn fetch_ads(&self, account_id: &str) -> Result<HashMap<String, Ad>, FetchError> {
        let items = self
            .client
            .fetch_all_items(
                &self.account_url(account_id, "ads"),
                &[
                    ("fields", AD_FIELDS.to_string()),
                    ("limit", self.entity_page_size.to_string()),
                ],
            )
            .await?;
        let ads = ads_by_id(items);
        debug!(account = account_id, "{} ads", ads.len());
        Ok(ads)
    }

    async fn fetch_campaigns(&self, account_id: &str) -> Result<HashMap<String, Campaign>, FetchError> {
        let items = self
            .client
            .fetch_all_items(
                &self.account_url(account_id, "campaigns"),
                &[
                    ("fields", CAMPAIGN_FIELDS.to_string()),
                    ("limit", self.entity_page_size.to_string()),
                ],
            )
            .await?;
        let campaigns = campaigns_by_id(items);
        debug!(account = account_id, "{} campaigns", campaigns.len());
        Ok(campaigns)
    }

    async fn fetch_insights(&self, account_id: &str, window: &DateWindow) -> Result<Vec<Value>, FetchError> {
        let params = [
            ("fields", INSIGHT_FIELDS.to_string()),
            ("level", "ad".to_string()),
            ("time_range[since]", window.since.format("%Y-%m-%d").to_string()),
            ("time_range[until]", window.until.format("%Y-%m-%d").to_string()),
            ("time_increment", "1".to_string()),
            ("limit", self.insights_page_size.to_string()),
        ];

        let mut cursor = self.client.pages(&self.account_url(account_id, "insights"), &params)?;
        let mut rows = Vec::new();
        while let Some(page) = cursor.next_page().await {
            rows.extend(page?.data);
        }
        info!(
            account = account_id,
            "{} insight records across {} pages",
            rows.len(),
            cursor.pages_fetched()
        );
        Ok(rows)
    }

    async fn fetch_creative(&self, ad_id: &str) -> Result<Option<Creative>, FetchError> {
        let page = self
            .client
            .fetch(
                &format!("{}/{}/adcreatives", self.base_url, ad_id),
                &[
                    ("fields", CREATIVE_FIELDS.to_string()),
                    ("limit", CREATIVE_PAGE_SIZE.to_string()),
                ],
            )
            .await?;
        Ok(page
            .get("data")
            .and_then(Value::as_array)
            .and_then(|d| d.first())
            .map(extract_creative))
    }

    async fn resolve_image_url(&self, account_id: &str, image_hash: &str) -> Result<Option<String>, FetchError> {
        let hashes = serde_json::json!([image_hash]).to_string();
        let page = self
            .client
            .fetch(&self.account_url(account_id, "adimages"), &[("hashes", hashes)])
            .await?;
        Ok(first_image_url(&page))
    }
}

// ── Creative enrichment ───────────────────────────────────────────────────────

/// Creatives for every distinct ad in `ad_ids`, with image hashes resolved to
/// URLs. Lookups that fail are logged and left out; they never fail the account.
pub async fn collect_creatives<'a, I>(
    source: &dyn AdsDataSource,
    account_id: &str,
    ad_ids: I,
) -> HashMap<String, Creative>
where
    I: IntoIterator<Item = &'a str>,
{
    let distinct: BTreeSet<&str> = ad_ids.into_iter().collect();
    let mut creatives = HashMap::with_capacity(distinct.len());
    let mut image_urls: HashMap<String, Option<String>> = HashMap::new();

    for ad_id in distinct {
        let mut creative = match source.fetch_creative(ad_id).await {
            Ok(Some(c)) => c,
            Ok(None) => continue,
            Err(e) => {
                warn!(account = account_id, ad = ad_id, "Creative lookup failed: {}", e);
                continue;
            }
        };

        if let Some(hash) = creative.image_hash.clone() {
            let url = match image_urls.get(&hash) {
                Some(cached) => cached.clone(),
                None => {
                    let resolved = source
                        .resolve_image_url(account_id, &hash)
                        .await
                        .unwrap_or_else(|e| {
                            warn!(account = account_id, hash = %hash, "Image lookup failed: {}", e);
                            None
                        });
                    image_urls.insert(hash, resolved.clone());
                    resolved
                }
            };
            creative.image_url = url;
        }

        creatives.insert(ad_id.to_string(), creative);
    }

    debug!(account = account_id, "{} creatives resolved", creatives.len());
    creatives
}

// ── Tests ─────────────────────────────────────────────────────────────────────
