// src/config/pipeline.rs
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use super::ConfigProvider;
use crate::error::ConfigurationError;

pub mod keys {
    pub const CNY_EXCHANGE_RATE: &str = "cny_exchange_rate";
    pub const USD_EXCHANGE_RATE: &str = "usd_exchange_rate";
    pub const EXCHANGE_RATE_BUFFER: &str = "exchange_rate_buffer";
    pub const SHIPPING_COST_BASE: &str = "shipping_cost_base";
    pub const CUSTOMS_TAX_RATE: &str = "customs_tax_rate";
    pub const TARGET_MARGIN_RATE: &str = "target_margin_rate";
    pub const CHANNELS: &str = "channels";
    pub const DEBUG_MODE: &str = "debug_mode_ignore_filters";
    pub const SOURCES: &str = "sources";
    pub const SCRAPINGANT_API_KEY: &str = "scrapingant_api_key";
    pub const SCRAPINGANT_ENDPOINT: &str = "scrapingant_endpoint";
    pub const FETCH_TIMEOUT_SECS: &str = "fetch_timeout_secs";
    pub const MAX_RESULTS_PER_SOURCE: &str = "max_results_per_source";
    pub const MAX_CANDIDATES: &str = "max_candidates";
    pub const TOP_K: &str = "top_k";
    pub const DEBUG_TOP_K: &str = "debug_top_k";
    pub const FALLBACK_COUNT: &str = "fallback_count";

    /// `naver` → `naver_fee_rate`
    pub fn fee_rate(channel: &str) -> String {
        format!("{channel}_fee_rate")
    }
}

pub const DEFAULT_SCRAPINGANT_ENDPOINT: &str = "https://api.scrapingant.com/v2/general";

/// Where adapters come from and what they need to talk upstream.
#[derive(Clone, PartialEq)]
pub struct SourceSettings {
    /// Lower-cased adapter ids, in configured order.
    pub enabled: Vec<String>,
    pub scrapingant_api_key: Option<String>,
    pub scrapingant_endpoint: String,
}

// Keeps the credential out of logs.
impl fmt::Debug for SourceSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceSettings")
            .field("enabled", &self.enabled)
            .field(
                "scrapingant_api_key",
                &self.scrapingant_api_key.as_ref().map(|k| format!("<{} chars>", k.len())),
            )
            .field("scrapingant_endpoint", &self.scrapingant_endpoint)
            .finish()
    }
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            enabled: vec!["1688".to_string()],
            scrapingant_api_key: None,
            scrapingant_endpoint: DEFAULT_SCRAPINGANT_ENDPOINT.to_string(),
        }
    }
}

/// Settings snapshot for one pipeline invocation. Read once, never mutated mid-run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// KRW per CNY.
    pub exchange_rate: f64,
    /// KRW per USD.
    pub usd_exchange_rate: f64,
    /// Upward bias applied to the purchase estimate (> 1.0 means "assume it costs more").
    pub safety_buffer: f64,
    /// Flat international shipping per item, KRW.
    pub shipping_cost: i64,
    pub customs_rate: f64,
    /// Percent, e.g. `30.0`.
    pub target_margin_pct: f64,
    /// Marketplace commission per sales channel, as a fraction of the sale price.
    pub channel_fees: BTreeMap<String, f64>,
    /// Skip the safety filter and the margin threshold (diagnostic runs).
    pub bypass_filters: bool,
    pub sources: SourceSettings,
    pub fetch_timeout: Duration,
    pub max_results_per_source: usize,
    /// Upper bound on listings admitted to the funnel after pre-ranking.
    pub max_candidates: usize,
    pub top_k: usize,
    pub debug_top_k: usize,
    pub fallback_count: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let mut channel_fees = BTreeMap::new();
        channel_fees.insert("naver".to_string(), 0.06);
        channel_fees.insert("coupang".to_string(), 0.11);
        Self {
            exchange_rate: 190.0,
            usd_exchange_rate: 1380.0,
            safety_buffer: 1.05,
            shipping_cost: 5000,
            customs_rate: 0.10,
            target_margin_pct: 30.0,
            channel_fees,
            bypass_filters: false,
            sources: SourceSettings::default(),
            fetch_timeout: Duration::from_secs(60),
            max_results_per_source: 50,
            max_candidates: 200,
            top_k: 3,
            debug_top_k: 50,
            fallback_count: 10,
        }
    }
}

impl PipelineConfig {
    /// Read and validate every setting. Absent keys take their defaults;
    /// unparsable or out-of-range values are rejected.
    pub fn from_provider(p: &dyn ConfigProvider) -> Result<Self, ConfigurationError> {
        let d = Self::default();

        let exchange_rate = positive_f64(p, keys::CNY_EXCHANGE_RATE, d.exchange_rate)?;
        let usd_exchange_rate = positive_f64(p, keys::USD_EXCHANGE_RATE, d.usd_exchange_rate)?;
        let safety_buffer = positive_f64(p, keys::EXCHANGE_RATE_BUFFER, d.safety_buffer)?;
        if safety_buffer < 1.0 {
            tracing::warn!(
                safety_buffer,
                "exchange_rate_buffer below 1.0 underestimates purchase cost"
            );
        }

        let shipping_cost = parse_i64(p, keys::SHIPPING_COST_BASE, d.shipping_cost)?;
        if shipping_cost < 0 {
            return Err(ConfigurationError::invalid(
                keys::SHIPPING_COST_BASE,
                &shipping_cost.to_string(),
                "must not be negative",
            ));
        }

        let customs_rate = fraction(p, keys::CUSTOMS_TAX_RATE, d.customs_rate)?;

        let target_margin_pct = parse_f64(p, keys::TARGET_MARGIN_RATE, d.target_margin_pct)?;
        if !(0.0..100.0).contains(&target_margin_pct) {
            return Err(ConfigurationError::invalid(
                keys::TARGET_MARGIN_RATE,
                &target_margin_pct.to_string(),
                "must be in [0, 100)",
            ));
        }

        let channels = split_list(&p.get(keys::CHANNELS, "naver,coupang"));
        let mut channel_fees = BTreeMap::new();
        for ch in channels {
            let default = d.channel_fees.get(&ch).copied().unwrap_or(0.0);
            let rate = fraction(p, &keys::fee_rate(&ch), default)?;
            channel_fees.insert(ch, rate);
        }

        let bypass_filters = parse_bool(p, keys::DEBUG_MODE, false)?;

        let sources = SourceSettings {
            enabled: split_list(&p.get(keys::SOURCES, "1688")),
            scrapingant_api_key: p.lookup(keys::SCRAPINGANT_API_KEY),
            scrapingant_endpoint: p.get(keys::SCRAPINGANT_ENDPOINT, DEFAULT_SCRAPINGANT_ENDPOINT),
        };

        let fetch_timeout_secs = positive_usize(p, keys::FETCH_TIMEOUT_SECS, 60)?;

        Ok(Self {
            exchange_rate,
            usd_exchange_rate,
            safety_buffer,
            shipping_cost,
            customs_rate,
            target_margin_pct,
            channel_fees,
            bypass_filters,
            sources,
            fetch_timeout: Duration::from_secs(fetch_timeout_secs as u64),
            max_results_per_source: positive_usize(
                p,
                keys::MAX_RESULTS_PER_SOURCE,
                d.max_results_per_source,
            )?,
            max_candidates: positive_usize(p, keys::MAX_CANDIDATES, d.max_candidates)?,
            top_k: positive_usize(p, keys::TOP_K, d.top_k)?,
            debug_top_k: positive_usize(p, keys::DEBUG_TOP_K, d.debug_top_k)?,
            fallback_count: positive_usize(p, keys::FALLBACK_COUNT, d.fallback_count)?,
        })
    }

    /// Selection size for this run: `debug_top_k` under bypass, `top_k` otherwise.
    pub fn selection_limit(&self) -> usize {
        if self.bypass_filters {
            self.debug_top_k
        } else {
            self.top_k
        }
    }
}

fn split_list(s: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for it in s.split(',') {
        let t = it.trim().to_ascii_lowercase();
        if !t.is_empty() && !out.contains(&t) {
            out.push(t);
        }
    }
    out
}

fn parse_f64(p: &dyn ConfigProvider, key: &str, default: f64) -> Result<f64, ConfigurationError> {
    match p.lookup(key) {
        None => Ok(default),
        Some(v) => match v.parse::<f64>() {
            Ok(x) if x.is_finite() => Ok(x),
            _ => Err(ConfigurationError::invalid(key, &v, "expected a number")),
        },
    }
}

fn positive_f64(
    p: &dyn ConfigProvider,
    key: &str,
    default: f64,
) -> Result<f64, ConfigurationError> {
    let x = parse_f64(p, key, default)?;
    if x <= 0.0 {
        return Err(ConfigurationError::invalid(key, &x.to_string(), "must be positive"));
    }
    Ok(x)
}

fn fraction(p: &dyn ConfigProvider, key: &str, default: f64) -> Result<f64, ConfigurationError> {
    let x = parse_f64(p, key, default)?;
    if !(0.0..1.0).contains(&x) {
        return Err(ConfigurationError::invalid(key, &x.to_string(), "must be in [0, 1)"));
    }
    Ok(x)
}

fn parse_i64(p: &dyn ConfigProvider, key: &str, default: i64) -> Result<i64, ConfigurationError> {
    match p.lookup(key) {
        None => Ok(default),
        Some(v) => v
            .parse::<i64>()
            .or_else(|_| {
                // "5000.0" is common in hand-edited files
                v.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite() && f.fract() == 0.0)
                    .map(|f| f as i64)
                    .ok_or(())
            })
            .map_err(|_| ConfigurationError::invalid(key, &v, "expected an integer")),
    }
}

fn positive_usize(
    p: &dyn ConfigProvider,
    key: &str,
    default: usize,
) -> Result<usize, ConfigurationError> {
    match p.lookup(key) {
        None => Ok(default),
        Some(v) => match v.parse::<usize>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(ConfigurationError::invalid(key, &v, "expected a positive integer")),
        },
    }
}

fn parse_bool(p: &dyn ConfigProvider, key: &str, default: bool) -> Result<bool, ConfigurationError> {
    match p.lookup(key) {
        None => Ok(default),
        Some(v) => match v.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigurationError::invalid(key, &v, "expected true/false")),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapConfig;

    #[test]
    fn empty_provider_yields_seeded_defaults() {
        let c = PipelineConfig::from_provider(&MapConfig::new()).unwrap();
        assert_eq!(c, PipelineConfig::default());
        assert_eq!(c.selection_limit(), 3);
        assert_eq!(c.sources.enabled, vec!["1688".to_string()]);
        assert!(c.sources.scrapingant_api_key.is_none());
    }

    #[test]
    fn values_are_parsed_and_lists_normalized() {
        let p = MapConfig::new()
            .set(keys::CNY_EXCHANGE_RATE, "185.5")
            .set(keys::SHIPPING_COST_BASE, "4500.0")
            .set(keys::TARGET_MARGIN_RATE, "25")
            .set(keys::DEBUG_MODE, "TRUE")
            .set(keys::SOURCES, " 1688 , AliExpress,1688,")
            .set(keys::CHANNELS, "naver, gmarket")
            .set("gmarket_fee_rate", "0.12")
            .set(keys::SCRAPINGANT_API_KEY, "  secret ");
        let c = PipelineConfig::from_provider(&p).unwrap();
        assert_eq!(c.exchange_rate, 185.5);
        assert_eq!(c.shipping_cost, 4500);
        assert_eq!(c.target_margin_pct, 25.0);
        assert!(c.bypass_filters);
        assert_eq!(c.selection_limit(), 50);
        assert_eq!(c.sources.enabled, vec!["1688", "aliexpress"]);
        assert_eq!(c.sources.scrapingant_api_key.as_deref(), Some("secret"));
        assert_eq!(c.channel_fees.len(), 2);
        assert_eq!(c.channel_fees["naver"], 0.06);
        assert_eq!(c.channel_fees["gmarket"], 0.12);
    }

    #[test]
    fn out_of_range_values_are_configuration_errors() {
        for (k, v) in [
            (keys::TARGET_MARGIN_RATE, "100"),
            (keys::TARGET_MARGIN_RATE, "abc"),
            (keys::CNY_EXCHANGE_RATE, "0"),
            (keys::CUSTOMS_TAX_RATE, "1.5"),
            (keys::SHIPPING_COST_BASE, "-1"),
            (keys::TOP_K, "0"),
            (keys::DEBUG_MODE, "maybe"),
        ] {
            let err = PipelineConfig::from_provider(&MapConfig::new().set(k, v)).unwrap_err();
            assert_eq!(err.keys(), vec![k.to_string()], "{k}={v}");
        }
    }

    #[test]
    fn debug_output_redacts_credentials() {
        let p = MapConfig::new().set(keys::SCRAPINGANT_API_KEY, "topsecret");
        let c = PipelineConfig::from_provider(&p).unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("topsecret"));
        assert!(dbg.contains("<9 chars>"));
    }
}
