// src/fallback.rs
//! Synthetic listings for when every marketplace came back empty.
//!
//! Every generated listing is unmistakable: `source_id = "fallback"`, a
//! `[SAMPLE]` title prefix, a URL on the reserved `.invalid` TLD and
//! `synthetic = true`.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::ingest::types::{Currency, RawListing};

pub const FALLBACK_SOURCE_ID: &str = "fallback";
pub const SAMPLE_PREFIX: &str = "[SAMPLE]";

const PRICE_RANGE_CNY: std::ops::Range<f64> = 5.0..80.0;
const POPULARITY_RANGE: std::ops::Range<u64> = 10..5000;
const MOQ_RANGE: std::ops::RangeInclusive<u32> = 1..=10;

pub struct FallbackGenerator {
    rng: StdRng,
}

impl FallbackGenerator {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Reproducible output, for tests.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn generate(&mut self, keyword: &str, count: usize) -> Vec<RawListing> {
        let keyword = keyword.trim();
        let slug = slug(keyword);
        (1..=count)
            .map(|i| {
                let price = (self.rng.random_range(PRICE_RANGE_CNY) * 10.0).round() / 10.0;
                RawListing {
                    source_id: FALLBACK_SOURCE_ID.to_string(),
                    url: format!("https://fallback.invalid/{slug}/{i}"),
                    title: format!("{SAMPLE_PREFIX} {keyword} #{i}"),
                    unit_price: price,
                    currency: Currency::Cny,
                    unit_count_min: self.rng.random_range(MOQ_RANGE),
                    popularity_signal: self.rng.random_range(POPULARITY_RANGE),
                    image_ref: None,
                    synthetic: true,
                }
            })
            .collect()
    }
}

impl Default for FallbackGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Keyword as a URL path segment; non-ASCII becomes hex so the URL stays ASCII.
fn slug(keyword: &str) -> String {
    let mut out = String::with_capacity(keyword.len());
    for ch in keyword.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
        } else if ch.is_whitespace() || ch == '-' {
            if !out.ends_with('-') {
                out.push('-');
            }
        } else {
            use std::fmt::Write as _;
            let _ = write!(&mut out, "{:x}", u32::from(ch));
        }
    }
    let out = out.trim_matches('-').to_string();
    if out.is_empty() {
        "item".to_string()
    } else {
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_exact_count_clearly_marked() {
        let items = FallbackGenerator::seeded(7).generate("무선충전기", 10);
        assert_eq!(items.len(), 10);
        for (i, l) in items.iter().enumerate() {
            assert!(l.synthetic);
            assert_eq!(l.source_id, FALLBACK_SOURCE_ID);
            assert!(l.title.starts_with(SAMPLE_PREFIX));
            assert!(l.title.contains("무선충전기"));
            assert!(l.url.starts_with("https://fallback.invalid/"));
            assert!(l.url.ends_with(&format!("/{}", i + 1)));
            assert!(l.unit_price >= 5.0 && l.unit_price <= 80.0);
            assert!((1..=10).contains(&l.unit_count_min));
            assert!((10..5000).contains(&l.popularity_signal));
            assert!(l.image_ref.is_none());
        }
    }

    #[test]
    fn seeded_generators_repeat() {
        let a = FallbackGenerator::seeded(42).generate("shoe rack", 5);
        let b = FallbackGenerator::seeded(42).generate("shoe rack", 5);
        assert_eq!(a, b);
        assert!(a[0].url.contains("/shoe-rack/"));
    }

    #[test]
    fn zero_count_is_empty() {
        assert!(FallbackGenerator::seeded(1).generate("x", 0).is_empty());
    }

    #[test]
    fn slug_handles_odd_input() {
        assert_eq!(slug("  "), "item");
        assert_eq!(slug("A b--c"), "a-b-c");
        assert!(slug("鞋").chars().all(|c| c.is_ascii_hexdigit()));
    }
}
