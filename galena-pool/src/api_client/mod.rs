//! HTTP client for the daemon's statistics API.

pub mod types;

use anyhow::Result;

use types::{BlockSummary, PoolSummary, WorkerSummary};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080";

pub struct Client {
    http: reqwest::Client,
    base_url: String,
}

impl Client {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL.to_string())
    }

    pub fn with_base_url(base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn get_pool(&self) -> Result<PoolSummary> {
        Ok(self
            .http
            .get(format!("{}/v0/pool", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }

    pub async fn get_workers(&self) -> Result<Vec<WorkerSummary>> {
        Ok(self
            .http
            .get(format!("{}/v0/workers", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }

    pub async fn get_blocks(&self) -> Result<Vec<BlockSummary>> {
        Ok(self
            .http
            .get(format!("{}/v0/blocks", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}
