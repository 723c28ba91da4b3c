// src/config/mod.rs
//! Configuration providers.
//!
//! Every setting is a flat string key (`cny_exchange_rate`, `target_margin_rate`, ...).
//! Providers only answer "what is the raw value for this key"; trimming and the
//! "empty means unset" rule live in [`ConfigProvider::get`] so every backend
//! behaves the same. Typed values are read once per invocation into a
//! [`PipelineConfig`] snapshot.

pub mod file;
pub mod pipeline;

use std::collections::BTreeMap;

pub use file::FileConfig;
pub use pipeline::{PipelineConfig, SourceSettings};

/// Prefix used by [`EnvConfig`]: key `target_margin_rate` ↔ `SNIPER_TARGET_MARGIN_RATE`.
pub const ENV_PREFIX: &str = "SNIPER_";

pub trait ConfigProvider: Send + Sync {
    /// Raw value as stored, or `None` if the backend has no entry for `key`.
    fn raw(&self, key: &str) -> Option<String>;

    /// Trimmed value, falling back to `default` when absent or empty.
    fn get(&self, key: &str, default: &str) -> String {
        self.lookup(key).unwrap_or_else(|| default.to_string())
    }

    /// Trimmed, non-empty value if one is set.
    fn lookup(&self, key: &str) -> Option<String> {
        self.raw(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

/// Reads `SNIPER_<KEY>` from the process environment.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    prefix: String,
}

impl EnvConfig {
    pub fn new() -> Self {
        Self::with_prefix(ENV_PREFIX)
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn var_name(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key.to_ascii_uppercase())
    }
}

impl ConfigProvider for EnvConfig {
    fn raw(&self, key: &str) -> Option<String> {
        std::env::var(self.var_name(key)).ok()
    }
}

/// In-memory provider; handy for tests and for the HTTP layer's overrides.
#[derive(Debug, Clone, Default)]
pub struct MapConfig {
    values: BTreeMap<String, String>,
}

impl MapConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: &str, value: impl Into<String>) -> Self {
        self.values.insert(key.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(key.to_string(), value.into());
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MapConfig {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl ConfigProvider for MapConfig {
    fn raw(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// First provider holding a non-empty value wins.
pub struct Layered {
    layers: Vec<Box<dyn ConfigProvider>>,
}

impl Layered {
    pub fn new(layers: Vec<Box<dyn ConfigProvider>>) -> Self {
        Self { layers }
    }

    /// Environment first, then the settings file resolved by [`FileConfig::load_default`].
    pub fn env_then_file() -> anyhow::Result<Self> {
        Ok(Self::new(vec![
            Box::new(EnvConfig::new()),
            Box::new(FileConfig::load_default()?),
        ]))
    }
}

impl ConfigProvider for Layered {
    fn raw(&self, key: &str) -> Option<String> {
        self.layers.iter().find_map(|p| p.lookup(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_trims_and_treats_empty_as_unset() {
        let c = MapConfig::new()
            .set("a", "  12 ")
            .set("b", "   ")
            .set("c", "");
        assert_eq!(c.get("a", "0"), "12");
        assert_eq!(c.get("b", "dflt"), "dflt");
        assert_eq!(c.get("c", "dflt"), "dflt");
        assert_eq!(c.get("missing", "dflt"), "dflt");
    }

    #[test]
    fn layered_skips_empty_layers() {
        let top = MapConfig::new().set("k", " ");
        let bottom = MapConfig::new().set("k", "from-bottom").set("j", "x");
        let l = Layered::new(vec![Box::new(top), Box::new(bottom)]);
        assert_eq!(l.get("k", "d"), "from-bottom");
        assert_eq!(l.get("j", "d"), "x");
        assert_eq!(l.get("none", "d"), "d");
    }

    #[test]
    fn env_var_name_is_prefixed_upper_case() {
        let e = EnvConfig::new();
        assert_eq!(e.var_name("cny_exchange_rate"), "SNIPER_CNY_EXCHANGE_RATE");
    }

    #[serial_test::serial]
    #[test]
    fn env_provider_reads_process_env() {
        let e = EnvConfig::with_prefix("SNIPER_TEST_");
        std::env::set_var("SNIPER_TEST_SHIPPING_COST_BASE", " 4200 ");
        assert_eq!(e.get("shipping_cost_base", "5000"), "4200");
        std::env::remove_var("SNIPER_TEST_SHIPPING_COST_BASE");
        assert_eq!(e.get("shipping_cost_base", "5000"), "5000");
    }
}
