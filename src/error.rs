//! Error taxonomy for the sourcing funnel.
//!
//! Only [`SourcingError`] ever reaches a caller. Everything else is
//! non-fatal: upstream failures degrade to "zero results", invalid records
//! are dropped and counted, persistence failures are logged and skipped.

use std::time::Duration;
use thiserror::Error;

/// A required setting is absent or unusable. Raised before any network call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("missing configuration: {}", keys.join(", "))]
    Missing { keys: Vec<String> },

    #[error("invalid configuration value for `{key}` ({value:?}): {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
}

impl ConfigurationError {
    pub fn missing<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Missing {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    pub fn invalid(key: &str, value: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    /// Keys the caller should look at to fix the problem.
    pub fn keys(&self) -> Vec<String> {
        match self {
            Self::Missing { keys } => keys.clone(),
            Self::Invalid { key, .. } => vec![key.clone()],
        }
    }
}

/// Why one adapter produced nothing. Never propagated past the scrape barrier.
#[derive(Debug, Error)]
pub enum UpstreamFetchError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream answered HTTP {status}")]
    Status { status: u16 },

    #[error("no answer within {0:?}")]
    Timeout(Duration),

    #[error("block or challenge page detected: {0}")]
    Blocked(String),

    #[error("unparsable upstream response: {0}")]
    Parse(String),
}

impl UpstreamFetchError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Http(_) => "http",
            Self::Status { .. } => "status",
            Self::Timeout(_) => "timeout",
            Self::Blocked(_) => "blocked",
            Self::Parse(_) => "parse",
        }
    }
}

/// A single upstream record that cannot become a listing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listing has no title")]
    MissingTitle,

    #[error("listing price is missing or not positive")]
    NonPositivePrice,

    #[error("listing price {0} is implausibly high")]
    PriceTooHigh(String),

    #[error("listing url is missing")]
    MissingUrl,

    #[error("listing url is relative: {0}")]
    RelativeUrl(String),

    #[error("listing url is malformed: {0}")]
    MalformedUrl(String),

    #[error("listing url host {host} does not belong to {expected}")]
    HostMismatch { host: String, expected: String },
}

/// One row could not be written. Logged and skipped.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("encoding row: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("stored row is unreadable: {0}")]
    Corrupt(String),
}

/// The only failures an invocation reports to its caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourcingError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("keyword required")]
    EmptyKeyword,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_message_lists_every_key() {
        let e = ConfigurationError::missing(["scrapingant_api_key", "sources"]);
        assert_eq!(
            e.to_string(),
            "missing configuration: scrapingant_api_key, sources"
        );
        assert_eq!(e.keys().len(), 2);
    }

    #[test]
    fn invalid_reports_its_key() {
        let e = ConfigurationError::invalid("target_margin_rate", "120", "must be below 100");
        assert_eq!(e.keys(), vec!["target_margin_rate".to_string()]);
        assert!(e.to_string().contains("must be below 100"));
    }

    #[test]
    fn fetch_error_kinds_are_stable() {
        assert_eq!(UpstreamFetchError::Status { status: 503 }.kind(), "status");
        assert_eq!(
            UpstreamFetchError::Timeout(Duration::from_secs(1)).kind(),
            "timeout"
        );
        assert_eq!(UpstreamFetchError::Blocked("captcha".into()).kind(), "blocked");
    }
}
