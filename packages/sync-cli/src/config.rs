//! Environment-based configuration.

use anyhow::{Context, Result};
use meta_graph::MetaConfig;
use rdstation::RdStationConfig;

/// Process-level configuration shared by every integration.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Extractor fan-out bound per run.
    pub concurrency: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let database_url =
            std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

        let concurrency = match std::env::var("ETL_CONCURRENCY") {
            Ok(value) => value
                .parse::<usize>()
                .context("ETL_CONCURRENCY must be a positive integer")?,
            Err(_) => 4,
        };

        Ok(Self {
            database_url,
            concurrency,
        })
    }

    /// Meta credentials, read when the meta integration is selected.
    pub fn meta(&self) -> Result<MetaConfig> {
        let access_token =
            std::env::var("META_ACCESS_TOKEN").context("META_ACCESS_TOKEN must be set")?;
        let ad_account_id =
            std::env::var("META_AD_ACCOUNT_ID").context("META_AD_ACCOUNT_ID must be set")?;

        let mut config = MetaConfig::new(access_token, ad_account_id);
        if let Ok(page_id) = std::env::var("META_PAGE_ID") {
            config = config.with_page_id(page_id);
        }
        if let Ok(account_id) = std::env::var("META_INSTAGRAM_ACCOUNT_ID") {
            config = config.with_instagram_account_id(account_id);
        }
        Ok(config)
    }

    /// RD Station credentials, read when that integration is selected.
    pub fn rdstation(&self) -> Result<RdStationConfig> {
        let api_token =
            std::env::var("RDSTATION_API_TOKEN").context("RDSTATION_API_TOKEN must be set")?;
        Ok(RdStationConfig::new(api_token))
    }
}
