// src/ingest/providers/alibaba_1688.rs
use async_trait::async_trait;
use url::Url;

use super::{parse_search_page, CardSelectors, PageSource, ScrapingAntClient};
use crate::error::UpstreamFetchError;
use crate::ingest::types::{Currency, SourceAdapter, SourceBatch};
use crate::ingest::validate::SiteProfile;

pub const SOURCE_ID: &str = "1688";

const SEARCH_URL: &str = "https://s.1688.com/selloffer/offer_search.htm";

const PROFILE: SiteProfile = SiteProfile {
    source_id: SOURCE_ID,
    host_suffix: "1688.com",
    currency: Currency::Cny,
};

const SELECTORS: CardSelectors = CardSelectors {
    card: "div.card-item",
    link: "a",
    title: "h3",
    price: "span.price",
    sales: "span.sales",
    moq: ".moq",
    image: "img",
};

/// 1688.com wholesale search, rendered through ScrapingAnt.
pub struct Ali1688Provider {
    source: PageSource,
}

impl Ali1688Provider {
    /// Serve a canned search page regardless of keyword.
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
        Url::parse_with_params(SEARCH_URL, &[("keywords", keyword)])
    }
}

#[async_trait]
impl SourceAdapter for Ali1688Provider {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_url_encodes_keyword() {
        let u = Ali1688Provider::search_url("鞋架 折叠").unwrap();
        assert!(u.as_str().starts_with(SEARCH_URL));
        assert_eq!(
            u.query_pairs().next().map(|(k, v)| (k.into_owned(), v.into_owned())),
            Some(("keywords".to_string(), "鞋架 折叠".to_string()))
        );
    }
}
