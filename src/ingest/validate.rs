// src/ingest/validate.rs
//! Turning loosely-scraped upstream records into [`RawListing`]s.
//!
//! Anything that cannot be trusted is rejected here (missing title,
//! non-positive price, relative or foreign URL). Images are the exception:
//! a missing or placeholder image becomes `None` instead of a rejection.

use once_cell::sync::OnceCell;
use regex::Regex;
use url::Url;

use crate::error::ValidationError;
use crate::ingest::normalize_text;
use crate::ingest::types::{Currency, RawListing};

/// Fields exactly as scraped, before any interpretation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawCard {
    pub href: Option<String>,
    pub title: Option<String>,
    pub price: Option<String>,
    pub sales: Option<String>,
    pub moq: Option<String>,
    pub image: Option<String>,
}

/// What a listing from a given marketplace must look like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SiteProfile {
    pub source_id: &'static str,
    /// Registrable domain every listing URL must belong to, e.g. `1688.com`.
    pub host_suffix: &'static str,
    pub currency: Currency,
}

const PLACEHOLDER_IMAGE_MARKERS: &[&str] = &[
    "placeholder",
    "lazyload",
    "blank.gif",
    "spaceball",
    "loading.gif",
    "default.png",
    "/s.gif",
    "no-image",
];

pub fn validate_card(card: &RawCard, profile: &SiteProfile) -> Result<RawListing, ValidationError> {
    let title = card
        .title
        .as_deref()
        .map(normalize_text)
        .filter(|t| !t.is_empty())
        .ok_or(ValidationError::MissingTitle)?;

    let unit_price = card
        .price
        .as_deref()
        .and_then(parse_price)
        .filter(|p| *p > 0.0)
        .ok_or(ValidationError::NonPositivePrice)?;
    if unit_price > MAX_UNIT_PRICE {
        return Err(ValidationError::PriceTooHigh(unit_price.to_string()));
    }

    let url = absolute_url(card.href.as_deref().unwrap_or_default(), profile.host_suffix)?;

    Ok(RawListing {
        source_id: profile.source_id.to_string(),
        url,
        title,
        unit_price,
        currency: profile.currency,
        unit_count_min: card.moq.as_deref().and_then(parse_moq).unwrap_or(1),
        popularity_signal: card.sales.as_deref().and_then(parse_count).unwrap_or(0),
        image_ref: card.image.as_deref().and_then(image_ref),
        synthetic: false,
    })
}

/// No wholesale unit costs a million in any supported currency; bigger
/// numbers are scraping noise (phone numbers, concatenated ids).
pub const MAX_UNIT_PRICE: f64 = 1_000_000.0;

/// Highest number in a price label: `"¥12.50-15.80"` → 15.80.
///
/// Ranges resolve to their top so cost estimates err on the expensive side.
/// Numbers carrying a quantity unit (`100件起批`, `2 pcs`) are order sizes,
/// not prices, and are skipped.
pub fn parse_price(s: &str) -> Option<f64> {
    static RE_NUM: OnceCell<Regex> = OnceCell::new();
    let re = RE_NUM.get_or_init(|| {
        Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(件|个|套|只|双|起批|起订|pieces|piece|pcs|pc|units|unit|lots|lot)?")
            .unwrap()
    });
    let cleaned = s.replace(',', "");
    re.captures_iter(&cleaned)
        .filter(|c| c.get(2).is_none())
        .filter_map(|c| c.get(1)?.as_str().parse::<f64>().ok())
        .filter(|x| x.is_finite())
        .fold(None, |acc: Option<f64>, x| Some(acc.map_or(x, |a| a.max(x))))
}

/// Sales counters: `"1.2万+"` → 12000, `"3.5k sold"` → 3500, `"成交 35笔"` → 35.
pub fn parse_count(s: &str) -> Option<u64> {
    static RE_COUNT: OnceCell<Regex> = OnceCell::new();
    let re = RE_COUNT
        .get_or_init(|| Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(?:(万|千)|([wk])\b)?").unwrap());
    let cleaned = s.replace(',', "");
    let caps = re.captures(&cleaned)?;
    let base: f64 = caps.get(1)?.as_str().parse().ok()?;
    let unit = caps
        .get(2)
        .or_else(|| caps.get(3))
        .map(|m| m.as_str().to_lowercase());
    let mult = match unit.as_deref() {
        Some("万") | Some("w") => 10_000.0,
        Some("千") | Some("k") => 1_000.0,
        _ => 1.0,
    };
    Some((base * mult).round() as u64)
}

/// First integer in an MOQ label: `"≥2件"` → 2, `"Min. order: 10 pieces"` → 10. Zero is not an MOQ.
pub fn parse_moq(s: &str) -> Option<u32> {
    static RE_INT: OnceCell<Regex> = OnceCell::new();
    let re = RE_INT.get_or_init(|| Regex::new(r"\d+").unwrap());
    re.find(s)
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .filter(|n| *n > 0)
}

/// Absolute http(s) URL on the expected marketplace, fragment removed.
pub fn absolute_url(href: &str, host_suffix: &str) -> Result<String, ValidationError> {
    let href = href.trim();
    if href.is_empty() {
        return Err(ValidationError::MissingUrl);
    }
    let candidate = if href.starts_with("//") {
        format!("https:{href}")
    } else {
        href.to_string()
    };
    let mut url = match Url::parse(&candidate) {
        Ok(u) => u,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            return Err(ValidationError::RelativeUrl(href.to_string()))
        }
        Err(_) => return Err(ValidationError::MalformedUrl(href.to_string())),
    };
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ValidationError::MalformedUrl(href.to_string()));
    }
    let host = url
        .host_str()
        .map(|h| h.to_ascii_lowercase())
        .ok_or_else(|| ValidationError::MalformedUrl(href.to_string()))?;
    if !host_matches(&host, host_suffix) {
        return Err(ValidationError::HostMismatch {
            host,
            expected: host_suffix.to_string(),
        });
    }
    url.set_fragment(None);
    Ok(url.to_string())
}

fn host_matches(host: &str, suffix: &str) -> bool {
    host == suffix || host.ends_with(&format!(".{suffix}"))
}

/// Usable image URL or `None` ("unknown"); placeholders and relative paths are not images.
pub fn image_ref(src: &str) -> Option<String> {
    let src = src.trim();
    if src.is_empty() || src.starts_with("data:") {
        return None;
    }
    let lower = src.to_ascii_lowercase();
    if PLACEHOLDER_IMAGE_MARKERS.iter().any(|m| lower.contains(m)) {
        return None;
    }
    let candidate = if src.starts_with("//") {
        format!("https:{src}")
    } else {
        src.to_string()
    };
    let url = Url::parse(&candidate).ok()?;
    matches!(url.scheme(), "http" | "https").then(|| url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const P1688: SiteProfile = SiteProfile {
        source_id: "1688",
        host_suffix: "1688.com",
        currency: Currency::Cny,
    };

    fn card() -> RawCard {
        RawCard {
            href: Some("//detail.1688.com/offer/123.html#top".into()),
            title: Some("  <b>不锈钢</b>&nbsp;鞋架 ".into()),
            price: Some("¥12.50-15.80".into()),
            sales: Some("1.2万+ 成交".into()),
            moq: Some("≥2件".into()),
            image: Some("//cbu01.alicdn.com/img/a.jpg".into()),
        }
    }

    #[test]
    fn full_card_normalizes() {
        let l = validate_card(&card(), &P1688).unwrap();
        assert_eq!(l.source_id, "1688");
        assert_eq!(l.url, "https://detail.1688.com/offer/123.html");
        assert_eq!(l.title, "不锈钢 鞋架");
        assert_eq!(l.unit_price, 15.80);
        assert_eq!(l.currency, Currency::Cny);
        assert_eq!(l.unit_count_min, 2);
        assert_eq!(l.popularity_signal, 12_000);
        assert_eq!(l.image_ref.as_deref(), Some("https://cbu01.alicdn.com/img/a.jpg"));
        assert!(!l.synthetic);
    }

    #[test]
    fn rejects_missing_title_and_bad_price() {
        let mut c = card();
        c.title = Some("   ".into());
        assert_eq!(validate_card(&c, &P1688), Err(ValidationError::MissingTitle));

        let mut c = card();
        c.price = Some("面议".into());
        assert_eq!(validate_card(&c, &P1688), Err(ValidationError::NonPositivePrice));

        let mut c = card();
        c.price = Some("¥0.00".into());
        assert_eq!(validate_card(&c, &P1688), Err(ValidationError::NonPositivePrice));
    }

    #[test]
    fn rejects_relative_and_foreign_urls() {
        assert!(matches!(
            absolute_url("/offer/1.html", "1688.com"),
            Err(ValidationError::RelativeUrl(_))
        ));
        assert!(matches!(
            absolute_url("https://evil-1688.com/offer/1.html", "1688.com"),
            Err(ValidationError::HostMismatch { .. })
        ));
        assert!(matches!(
            absolute_url("javascript:void(0)", "1688.com"),
            Err(ValidationError::MalformedUrl(_))
        ));
        assert_eq!(absolute_url("", "1688.com"), Err(ValidationError::MissingUrl));
        assert!(absolute_url("https://1688.com/x", "1688.com").is_ok());
    }

    #[test]
    fn placeholder_images_are_unknown_not_rejections() {
        let mut c = card();
        c.image = Some("https://img.alicdn.com/tps/i1/lazyload-placeholder.png".into());
        let l = validate_card(&c, &P1688).unwrap();
        assert_eq!(l.image_ref, None);
        assert_eq!(image_ref("data:image/gif;base64,R0lGOD"), None);
        assert_eq!(image_ref("/relative/a.jpg"), None);
        assert_eq!(image_ref(""), None);
    }

    #[test]
    fn counters_and_moq_parse_loosely() {
        assert_eq!(parse_count("500+ sold"), Some(500));
        assert_eq!(parse_count("3.5K orders"), Some(3_500));
        assert_eq!(parse_count("1,234 sold"), Some(1_234));
        assert_eq!(parse_count("no sales"), None);
        assert_eq!(parse_count("12 weeks"), Some(12));
        assert_eq!(parse_moq("Min. order: 10 pieces"), Some(10));
        assert_eq!(parse_moq("0件"), None);
        assert_eq!(parse_price("US $1,299.00"), Some(1299.0));
    }

    #[test]
    fn quantities_in_price_labels_are_not_prices() {
        assert_eq!(parse_price("¥3.20 100件起批"), Some(3.2));
        assert_eq!(parse_price("US $1.10 / 50 pcs"), Some(1.1));
        assert_eq!(parse_price("¥2.00-2.60 ≥2件"), Some(2.6));
        assert_eq!(parse_price("500件"), None);
    }

    #[test]
    fn absurd_prices_are_rejected() {
        let mut c = card();
        c.price = Some("¥99999999999999999".into());
        assert!(matches!(
            validate_card(&c, &P1688),
            Err(ValidationError::PriceTooHigh(_))
        ));

        c.price = Some("¥999999.00".into());
        assert!(validate_card(&c, &P1688).is_ok());
    }
}
