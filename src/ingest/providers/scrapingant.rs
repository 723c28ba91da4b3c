// src/ingest/providers/scrapingant.rs
use std::time::Duration;

use crate::error::UpstreamFetchError;

/// Client for the ScrapingAnt rendering proxy: it fetches a marketplace page
/// through a headless browser and hands back the page source.
#[derive(Clone)]
pub struct ScrapingAntClient {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
    timeout: Duration,
}

impl ScrapingAntClient {
    pub fn new(
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent("smart-sniper/0.1")
            .connect_timeout(Duration::from_secs(10).min(timeout))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            endpoint: endpoint.into(),
            timeout,
        })
    }

    /// Page source of `target_url`, or why it could not be had.
    pub async fn fetch_page(&self, target_url: &str) -> Result<String, UpstreamFetchError> {
        let resp = self
            .http
            .get(&self.endpoint)
            .query(&[
                ("url", target_url),
                ("x-api-key", self.api_key.as_str()),
                ("browser", "true"),
                ("cookies_persistence", "true"),
                ("return_page_source", "true"),
            ])
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(UpstreamFetchError::Status {
                status: status.as_u16(),
            });
        }

        resp.text().await.map_err(|e| self.classify(e))
    }

    fn classify(&self, e: reqwest::Error) -> UpstreamFetchError {
        if e.is_timeout() {
            UpstreamFetchError::Timeout(self.timeout)
        } else {
            UpstreamFetchError::Http(e)
        }
    }
}
