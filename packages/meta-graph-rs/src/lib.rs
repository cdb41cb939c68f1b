//! Meta Graph API client for marketing metrics.
//!
//! Builds the per-resource first-page URLs (ad insights, ad creatives,
//! campaigns, page insights, Instagram insights) and delegates pagination
//! to the pipeline's fetcher. The access token rides in the query string,
//! matching how Graph's own next-page URLs carry it.

pub mod insights;

use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use etl::{fetch_all_pages, EtlError, Extractor, HttpPageSource, PageSource, Record, ResourceSpec, Result, SyncWindow};

use crate::insights::flatten_insights;

pub const GRAPH_API_BASE: &str = "https://graph.facebook.com/v19.0";

const AD_INSIGHT_FIELDS: &str =
    "ad_id,ad_name,adset_id,campaign_id,impressions,clicks,spend,ctr,cpc,date_start,date_stop";
const CREATIVE_FIELDS: &str = "id,name,title,body,image_url,thumbnail_url";
const CAMPAIGN_FIELDS: &str = "id,name,status,objective,start_time,stop_time";
const PAGE_METRICS: &str = "page_impressions,page_post_engagements,page_fans";
const INSTAGRAM_METRICS: &str = "impressions,reach,profile_views";

/// Page size requested per collection call.
const PAGE_SIZE: &str = "100";

/// Credentials and scope ids for one Meta ad account.
#[derive(Debug, Clone)]
pub struct MetaConfig {
    pub access_token: String,
    /// Ad account id, with or without the `act_` prefix.
    pub ad_account_id: String,
    /// Facebook page to pull page insights for, when present.
    pub page_id: Option<String>,
    /// Instagram business account to pull insights for, when present.
    pub instagram_account_id: Option<String>,
}

impl MetaConfig {
    pub fn new(access_token: impl Into<String>, ad_account_id: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            ad_account_id: ad_account_id.into(),
            page_id: None,
            instagram_account_id: None,
        }
    }

    pub fn with_page_id(mut self, page_id: impl Into<String>) -> Self {
        self.page_id = Some(page_id.into());
        self
    }

    pub fn with_instagram_account_id(mut self, account_id: impl Into<String>) -> Self {
        self.instagram_account_id = Some(account_id.into());
        self
    }

    /// The `act_<id>` path segment Graph expects for ad-account edges.
    fn act_id(&self) -> String {
        let id = self.ad_account_id.trim_start_matches("act_");
        format!("act_{id}")
    }
}

/// Meta Graph API client.
pub struct MetaClient<S: PageSource> {
    config: MetaConfig,
    source: S,
    base: String,
}

impl MetaClient<HttpPageSource> {
    pub fn new(config: MetaConfig) -> Self {
        Self::with_source(config, HttpPageSource::new())
    }
}

impl<S: PageSource> MetaClient<S> {
    /// Use a custom page source (tests, rate-limited wrappers).
    pub fn with_source(config: MetaConfig, source: S) -> Self {
        Self {
            config,
            source,
            base: GRAPH_API_BASE.to_string(),
        }
    }

    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = base.into();
        self
    }
}

impl<S: PageSource + 'static> MetaClient<S> {
    /// The extractor set for this account: ad-account resources always,
    /// page and Instagram insights only for configured scopes.
    pub fn extractors(self) -> Vec<Box<dyn Extractor>> {
        let client = Arc::new(self);
        let mut extractors: Vec<Box<dyn Extractor>> = vec![
            Box::new(MetaExtractor::new(client.clone(), MetaResource::AdInsights)),
            Box::new(MetaExtractor::new(client.clone(), MetaResource::AdCreatives)),
            Box::new(MetaExtractor::new(client.clone(), MetaResource::Campaigns)),
        ];
        if client.config.page_id.is_some() {
            extractors.push(Box::new(MetaExtractor::new(
                client.clone(),
                MetaResource::PageInsights,
            )));
        }
        if client.config.instagram_account_id.is_some() {
            extractors.push(Box::new(MetaExtractor::new(
                client.clone(),
                MetaResource::InstagramInsights,
            )));
        }
        extractors
    }
}

/// The Meta resource types this integration syncs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaResource {
    AdInsights,
    AdCreatives,
    Campaigns,
    PageInsights,
    InstagramInsights,
}

impl MetaResource {
    fn spec(&self) -> ResourceSpec {
        match self {
            MetaResource::AdInsights => {
                ResourceSpec::new("meta_ad_insights", ["ad_id", "date_start"])
            }
            MetaResource::AdCreatives => ResourceSpec::new("ad_creatives", ["id"]),
            MetaResource::Campaigns => ResourceSpec::new("meta_campaigns", ["id"]),
            MetaResource::PageInsights => {
                ResourceSpec::new("meta_page_insights", ["page_id", "metric", "end_time"])
            }
            MetaResource::InstagramInsights => ResourceSpec::new(
                "meta_instagram_insights",
                ["account_id", "metric", "end_time"],
            ),
        }
    }
}

/// One extractor per Meta resource, sharing the client.
struct MetaExtractor<S: PageSource> {
    client: Arc<MetaClient<S>>,
    resource: MetaResource,
    spec: ResourceSpec,
}

impl<S: PageSource> MetaExtractor<S> {
    fn new(client: Arc<MetaClient<S>>, resource: MetaResource) -> Self {
        Self {
            client,
            resource,
            spec: resource.spec(),
        }
    }

    fn first_url(&self, window: &SyncWindow) -> Result<String> {
        let config = &self.client.config;
        let base = &self.client.base;
        let token = config.access_token.as_str();

        let url = match self.resource {
            MetaResource::AdInsights => {
                let time_range = format!(
                    r#"{{"since":"{}","until":"{}"}}"#,
                    window.since_date(),
                    window.until_date()
                );
                Url::parse_with_params(
                    &format!("{base}/{}/insights", config.act_id()),
                    &[
                        ("level", "ad"),
                        ("fields", AD_INSIGHT_FIELDS),
                        ("time_range", time_range.as_str()),
                        ("time_increment", "1"),
                        ("limit", PAGE_SIZE),
                        ("access_token", token),
                    ],
                )
            }
            MetaResource::AdCreatives => Url::parse_with_params(
                &format!("{base}/{}/adcreatives", config.act_id()),
                &[
                    ("fields", CREATIVE_FIELDS),
                    ("limit", PAGE_SIZE),
                    ("access_token", token),
                ],
            ),
            MetaResource::Campaigns => Url::parse_with_params(
                &format!("{base}/{}/campaigns", config.act_id()),
                &[
                    ("fields", CAMPAIGN_FIELDS),
                    ("limit", PAGE_SIZE),
                    ("access_token", token),
                ],
            ),
            MetaResource::PageInsights => {
                let page_id = self.scope_id("page_id", config.page_id.as_deref())?;
                Url::parse_with_params(
                    &format!("{base}/{page_id}/insights"),
                    &[
                        ("metric", PAGE_METRICS),
                        ("period", "day"),
                        ("since", window.since_date().as_str()),
                        ("until", window.until_date().as_str()),
                        ("access_token", token),
                    ],
                )
            }
            MetaResource::InstagramInsights => {
                let account_id =
                    self.scope_id("instagram_account_id", config.instagram_account_id.as_deref())?;
                Url::parse_with_params(
                    &format!("{base}/{account_id}/insights"),
                    &[
                        ("metric", INSTAGRAM_METRICS),
                        ("period", "day"),
                        ("since", window.since_date().as_str()),
                        ("until", window.until_date().as_str()),
                        ("access_token", token),
                    ],
                )
            }
        };

        url.map(|u| u.to_string())
            .map_err(|e| EtlError::Config(format!("bad Graph URL: {e}")))
    }

    fn scope_id<'a>(&self, name: &str, value: Option<&'a str>) -> Result<&'a str> {
        value.ok_or_else(|| EtlError::Config(format!("{name} is required for {:?}", self.resource)))
    }
}

#[async_trait]
impl<S: PageSource + 'static> Extractor for MetaExtractor<S> {
    fn spec(&self) -> &ResourceSpec {
        &self.spec
    }

    async fn extract(&self, window: &SyncWindow) -> Result<Vec<Record>> {
        let url = self.first_url(window)?;
        let records = fetch_all_pages(&self.client.source, &url).await?;

        let config = &self.client.config;
        Ok(match self.resource {
            MetaResource::PageInsights => flatten_insights(
                records,
                "page_id",
                config.page_id.as_deref().unwrap_or_default(),
            ),
            MetaResource::InstagramInsights => flatten_insights(
                records,
                "account_id",
                config.instagram_account_id.as_deref().unwrap_or_default(),
            ),
            _ => records,
        })
    }
}
