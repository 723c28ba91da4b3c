// src/ingest/providers/mod.rs
//! Marketplace adapters and the shared search-page parser.
//!
//! Every marketplace search page is a grid of product cards. Adapters differ
//! only in where the page lives and which CSS selectors find the fields, so
//! each one supplies a [`CardSelectors`] and a [`SiteProfile`] and delegates
//! the rest to [`parse_search_page`].

pub mod alibaba_1688;
pub mod aliexpress;
pub mod scrapingant;

use std::time::Duration;

use scraper::{ElementRef, Html, Selector};

use crate::config::SourceSettings;
use crate::error::{ConfigurationError, UpstreamFetchError};
use crate::ingest::block::detect_block_page;
use crate::ingest::types::{SourceAdapter, SourceBatch};
use crate::ingest::validate::{image_ref, validate_card, RawCard, SiteProfile};

pub use alibaba_1688::Ali1688Provider;
pub use aliexpress::AliExpressProvider;
pub use scrapingant::ScrapingAntClient;

/// CSS selectors locating one product card and its fields (relative to the card).
#[derive(Debug, Clone, Copy)]
pub struct CardSelectors {
    pub card: &'static str,
    pub link: &'static str,
    pub title: &'static str,
    pub price: &'static str,
    pub sales: &'static str,
    pub moq: &'static str,
    pub image: &'static str,
}

struct Compiled {
    card: Selector,
    link: Selector,
    title: Selector,
    price: Selector,
    sales: Selector,
    moq: Selector,
    image: Selector,
}

impl CardSelectors {
    fn compile(&self) -> Result<Compiled, UpstreamFetchError> {
        let sel = |s: &str| {
            Selector::parse(s).map_err(|e| UpstreamFetchError::Parse(format!("selector {s:?}: {e}")))
        };
        Ok(Compiled {
            card: sel(self.card)?,
            link: sel(self.link)?,
            title: sel(self.title)?,
            price: sel(self.price)?,
            sales: sel(self.sales)?,
            moq: sel(self.moq)?,
            image: sel(self.image)?,
        })
    }
}

/// Where an adapter gets its page from.
pub(crate) enum PageSource {
    /// Canned page source; the keyword is ignored.
    Fixture(String),
    Proxy(ScrapingAntClient),
}

impl PageSource {
    pub(crate) async fn load(&self, target_url: &str) -> Result<String, UpstreamFetchError> {
        match self {
            PageSource::Fixture(s) => Ok(s.clone()),
            PageSource::Proxy(client) => client.fetch_page(target_url).await,
        }
    }
}

/// Parse a rendered search page into validated listings.
///
/// Block/challenge pages come back as [`UpstreamFetchError::Blocked`];
/// records failing validation are dropped and counted in `rejected`.
pub fn parse_search_page(
    body: &str,
    profile: &SiteProfile,
    selectors: &CardSelectors,
    max_results: usize,
) -> Result<SourceBatch, UpstreamFetchError> {
    if let Some(reason) = detect_block_page(body) {
        return Err(UpstreamFetchError::Blocked(reason));
    }

    let compiled = selectors.compile()?;
    let document = Html::parse_document(body);

    let mut listings = Vec::new();
    let mut rejected = 0usize;
    for card_el in document.select(&compiled.card) {
        if listings.len() >= max_results {
            break;
        }
        let card = extract_card(card_el, &compiled);
        match validate_card(&card, profile) {
            Ok(l) => listings.push(l),
            Err(e) => {
                rejected += 1;
                tracing::debug!(
                    target: "ingest",
                    source = profile.source_id,
                    error = %e,
                    "record dropped"
                );
            }
        }
    }

    Ok(SourceBatch::new(listings, rejected))
}

fn extract_card(card: ElementRef<'_>, s: &Compiled) -> RawCard {
    // The card element itself is often the anchor.
    let link = card.select(&s.link).next().or_else(|| {
        (card.value().name() == "a").then_some(card)
    });
    let href = link.and_then(|a| a.value().attr("href")).map(str::to_string);

    let title = first_text(card, &s.title)
        .or_else(|| link.and_then(|a| a.value().attr("title")).map(str::to_string));

    let image = card.select(&s.image).next().and_then(|img| {
        let attrs = ["data-src", "data-lazy-src", "src"];
        attrs
            .iter()
            .filter_map(|a| img.value().attr(a))
            .find(|v| image_ref(v).is_some())
            .map(str::to_string)
    });

    RawCard {
        href,
        title,
        price: first_text(card, &s.price),
        sales: first_text(card, &s.sales),
        moq: first_text(card, &s.moq),
        image,
    }
}

fn first_text(card: ElementRef<'_>, sel: &Selector) -> Option<String> {
    card.select(sel)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Instantiate the adapters enabled in `settings`.
///
/// Fails before any network call when a credential is absent or a source id is unknown.
pub fn build_adapters(
    settings: &SourceSettings,
    timeout: Duration,
) -> Result<Vec<Box<dyn SourceAdapter>>, ConfigurationError> {
    use crate::config::pipeline::keys;

    if settings.enabled.is_empty() {
        return Err(ConfigurationError::missing([keys::SOURCES]));
    }
    for id in &settings.enabled {
        if !matches!(id.as_str(), alibaba_1688::SOURCE_ID | aliexpress::SOURCE_ID) {
            return Err(ConfigurationError::invalid(keys::SOURCES, id, "unknown source"));
        }
    }

    let api_key = settings
        .scrapingant_api_key
        .as_deref()
        .ok_or_else(|| ConfigurationError::missing([keys::SCRAPINGANT_API_KEY]))?;
    url::Url::parse(&settings.scrapingant_endpoint).map_err(|e| {
        ConfigurationError::invalid(
            keys::SCRAPINGANT_ENDPOINT,
            &settings.scrapingant_endpoint,
            e.to_string(),
        )
    })?;
    let client = ScrapingAntClient::new(api_key, settings.scrapingant_endpoint.clone(), timeout)
        .map_err(|e| {
            ConfigurationError::invalid(
                keys::SCRAPINGANT_ENDPOINT,
                &settings.scrapingant_endpoint,
                e.to_string(),
            )
        })?;

    let mut adapters: Vec<Box<dyn SourceAdapter>> = Vec::with_capacity(settings.enabled.len());
    for id in &settings.enabled {
        match id.as_str() {
            alibaba_1688::SOURCE_ID => {
                adapters.push(Box::new(Ali1688Provider::from_client(client.clone())))
            }
            aliexpress::SOURCE_ID => {
                adapters.push(Box::new(AliExpressProvider::from_client(client.clone())))
            }
            _ => {}
        }
    }
    Ok(adapters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::Currency;

    const PROFILE: SiteProfile = SiteProfile {
        source_id: "test",
        host_suffix: "example.com",
        currency: Currency::Cny,
    };

    const SELECTORS: CardSelectors = CardSelectors {
        card: "div.card",
        link: "a",
        title: "h3",
        price: ".price",
        sales: ".sales",
        moq: ".moq",
        image: "img",
    };

    fn page(cards: &str) -> String {
        format!(
            "<html><head><title>search</title></head><body>{cards}{}</body></html>",
            "<!-- padding -->".repeat(40)
        )
    }

    #[test]
    fn parses_cards_and_counts_rejects() {
        let body = page(
            r#"
            <div class="card"><a href="https://m.example.com/1"><h3>One</h3></a>
              <span class="price">¥3.20</span><span class="sales">120</span>
              <img src="https://img.example.com/blank.gif" data-src="https://img.example.com/1.jpg"></div>
            <div class="card"><a href="/relative"><h3>Two</h3></a><span class="price">¥1</span></div>
            <div class="card"><a href="https://example.com/3"><h3></h3></a><span class="price">¥1</span></div>
            "#,
        );
        let batch = parse_search_page(&body, &PROFILE, &SELECTORS, 50).unwrap();
        assert_eq!(batch.listings.len(), 1);
        assert_eq!(batch.rejected, 2);
        let l = &batch.listings[0];
        assert_eq!(l.title, "One");
        assert_eq!(l.popularity_signal, 120);
        assert_eq!(l.image_ref.as_deref(), Some("https://img.example.com/1.jpg"));
    }

    #[test]
    fn respects_max_results() {
        let card = r#"<div class="card"><a href="https://example.com/x"><h3>X</h3></a><span class="price">2</span></div>"#;
        let body = page(&card.repeat(10));
        let batch = parse_search_page(&body, &PROFILE, &SELECTORS, 4).unwrap();
        assert_eq!(batch.listings.len(), 4);
    }

    #[test]
    fn block_pages_are_errors_not_empty_parses() {
        let err = parse_search_page("<html>denied</html>", &PROFILE, &SELECTORS, 10).unwrap_err();
        assert_eq!(err.kind(), "blocked");
    }

    #[test]
    fn adapters_need_credentials_and_known_sources() {
        let mut s = SourceSettings::default();
        let err = build_adapters(&s, Duration::from_secs(5)).err().unwrap();
        assert_eq!(err.keys(), vec!["scrapingant_api_key".to_string()]);

        s.scrapingant_api_key = Some("k".into());
        s.enabled = vec!["1688".into(), "aliexpress".into()];
        let adapters = build_adapters(&s, Duration::from_secs(5)).unwrap();
        let names: Vec<_> = adapters.iter().map(|a| a.name()).collect();
        assert_eq!(names, vec!["1688", "aliexpress"]);

        s.enabled = vec!["taobao".into()];
        let err = build_adapters(&s, Duration::from_secs(5)).err().unwrap();
        assert_eq!(err.keys(), vec!["sources".to_string()]);

        s.enabled.clear();
        let err = build_adapters(&s, Duration::from_secs(5)).err().unwrap();
        assert_eq!(err.keys(), vec!["sources".to_string()]);
    }
}
