// src/config/file.rs
use anyhow::{anyhow, Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::ConfigProvider;

pub const ENV_CONFIG_PATH: &str = "SNIPER_CONFIG_PATH";

/// Flat key/value settings read from a TOML or JSON file.
///
/// Scalars are stored as strings so the file behaves exactly like the other
/// providers: `target_margin_rate = 25` and `"target_margin_rate": "25"` are
/// equivalent.
#[derive(Debug, Clone, Default)]
pub struct FileConfig {
    values: BTreeMap<String, String>,
    origin: Option<PathBuf>,
}

impl FileConfig {
    /// Load settings from an explicit path. Supports TOML or JSON formats.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let values = parse_settings(&content, ext.as_str())
            .with_context(|| format!("parsing settings in {}", path.display()))?;
        Ok(Self {
            values,
            origin: Some(path.to_path_buf()),
        })
    }

    /// Load settings using env var + fallbacks:
    /// 1) $SNIPER_CONFIG_PATH
    /// 2) config/sniper.toml
    /// 3) config/sniper.json
    ///
    /// No file at all yields an empty provider (every key falls back to its default).
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            } else {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
        }
        let toml_p = PathBuf::from("config/sniper.toml");
        if toml_p.exists() {
            return Self::load_from(&toml_p);
        }
        let json_p = PathBuf::from("config/sniper.json");
        if json_p.exists() {
            return Self::load_from(&json_p);
        }
        Ok(Self::default())
    }

    pub fn origin(&self) -> Option<&Path> {
        self.origin.as_deref()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl ConfigProvider for FileConfig {
    fn raw(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

fn parse_settings(s: &str, hint_ext: &str) -> Result<BTreeMap<String, String>> {
    // JSON objects start with '{'; everything else is tried as TOML first.
    let try_json_first = hint_ext == "json" || s.trim_start().starts_with('{');
    if try_json_first {
        if let Ok(v) = parse_json(s) {
            return Ok(v);
        }
    }
    if let Ok(v) = parse_toml(s) {
        return Ok(v);
    }
    if !try_json_first {
        if let Ok(v) = parse_json(s) {
            return Ok(v);
        }
    }
    Err(anyhow!("unsupported settings format"))
}

fn parse_toml(s: &str) -> Result<BTreeMap<String, String>> {
    let table: toml::Table = toml::from_str(s)?;
    let mut out = BTreeMap::new();
    for (k, v) in table {
        let text = match v {
            toml::Value::String(s) => s,
            toml::Value::Integer(i) => i.to_string(),
            toml::Value::Float(f) => f.to_string(),
            toml::Value::Boolean(b) => b.to_string(),
            toml::Value::Array(items) => join_list(items.iter().filter_map(|i| i.as_str())),
            other => return Err(anyhow!("unsupported value for `{k}`: {other}")),
        };
        out.insert(k, text);
    }
    Ok(out)
}

fn parse_json(s: &str) -> Result<BTreeMap<String, String>> {
    let map: serde_json::Map<String, serde_json::Value> = serde_json::from_str(s)?;
    let mut out = BTreeMap::new();
    for (k, v) in map {
        let text = match v {
            serde_json::Value::String(s) => s,
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::Bool(b) => b.to_string(),
            serde_json::Value::Null => String::new(),
            serde_json::Value::Array(items) => join_list(items.iter().filter_map(|i| i.as_str())),
            other => return Err(anyhow!("unsupported value for `{k}`: {other}")),
        };
        out.insert(k, text);
    }
    Ok(out)
}

/// Lists (e.g. `sources = ["1688", "aliexpress"]`) become the comma form other providers use.
fn join_list<'a>(items: impl Iterator<Item = &'a str>) -> String {
    items
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{env, fs};

    #[test]
    fn toml_and_json_scalars_become_strings() {
        let toml = r#"
target_margin_rate = 25
exchange_rate_buffer = 1.07
debug_mode_ignore_filters = true
scrapingant_api_key = "abc"
sources = ["1688", " aliexpress ", ""]
"#;
        let t = parse_toml(toml).unwrap();
        assert_eq!(t["target_margin_rate"], "25");
        assert_eq!(t["exchange_rate_buffer"], "1.07");
        assert_eq!(t["debug_mode_ignore_filters"], "true");
        assert_eq!(t["sources"], "1688,aliexpress");

        let json = r#"{"target_margin_rate": 25, "scrapingant_api_key": null}"#;
        let j = parse_json(json).unwrap();
        assert_eq!(j["target_margin_rate"], "25");
        assert_eq!(j["scrapingant_api_key"], "");
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_settings("[[[", "toml").is_err());
    }

    #[serial_test::serial]
    #[test]
    fn default_uses_env_then_fallbacks() {
        // Isolate CWD so the real config/ directory does not leak in
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();

        env::remove_var(ENV_CONFIG_PATH);

        // No files → empty provider
        let c = FileConfig::load_default().unwrap();
        assert!(c.is_empty());

        // Env wins
        let p_json = tmp.path().join("sniper.json");
        fs::write(&p_json, r#"{"top_k": 5}"#).unwrap();
        env::set_var(ENV_CONFIG_PATH, p_json.display().to_string());
        let c2 = FileConfig::load_default().unwrap();
        assert_eq!(c2.get("top_k", "3"), "5");
        env::remove_var(ENV_CONFIG_PATH);

        env::set_current_dir(&old).unwrap();
    }
}
