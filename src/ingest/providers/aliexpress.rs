// src/ingest/providers/aliexpress.rs
use async_trait::async_trait;
use url::Url;

use super::{parse_search_page, CardSelectors, PageSource, ScrapingAntClient};
use crate::error::UpstreamFetchError;
use crate::ingest::types::{Currency, SourceAdapter, SourceBatch};
use crate::ingest::validate::SiteProfile;

pub const SOURCE_ID: &str = "aliexpress";

const SEARCH_URL: &str = "https://www.aliexpress.com/wholesale";

const PROFILE: SiteProfile = SiteProfile {
    source_id: SOURCE_ID,
    host_suffix: "aliexpress.com",
    currency: Currency::Usd,
};

const SELECTORS: CardSelectors = CardSelectors {
    card: "div.product-card",
    link: "a",
    title: "h3, .product-title",
    price: ".product-price",
    sales: ".product-sold",
    moq: ".product-moq",
    image: "img",
};

/// AliExpress retail search; prices are quoted in USD.
pub struct AliExpressProvider {
    source: PageSource,
}

impl AliExpressProvider {
    pub fn from_fixture_str(s: &str) -> Self {
        Self {
            source: PageSource::Fixture(s.to_string()),
        }
    }

    pub fn from_client(client: ScrapingAntClient) -> Self {
        Self {
            source: PageSource::Proxy(client),
        }
    }

    pub fn search_url(keyword: &str) -> Result<Url, url::ParseError> {
        Url::parse_with_params(SEARCH_URL, &[("SearchText", keyword)])
    }
}

#[async_trait]
impl SourceAdapter for AliExpressProvider {
    async fn fetch(
        &self,
        keyword: &str,
        max_results: usize,
    ) -> Result<SourceBatch, UpstreamFetchError> {
        let target = Self::search_url(keyword)
            .map_err(|e| UpstreamFetchError::Parse(format!("search url: {e}")))?;
        let body = self.source.load(target.as_str()).await?;
        parse_search_page(&body, &PROFILE, &SELECTORS, max_results)
    }

    fn name(&self) -> &'static str {
        SOURCE_ID
    }
}
