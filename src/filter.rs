//! Host-based allow/deny policy applied before any data source is fetched.

use std::collections::HashSet;

use thiserror::Error;
use url::Url;

use crate::types::config::requests::{FilterConfig, FilterMode};

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("invalid data source URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("URL has no host: {0}")]
    MissingHost(String),
}

#[derive(Debug, Clone)]
pub struct UrlFilter {
    mode: FilterMode,
    hosts: HashSet<String>,
}

impl UrlFilter {
    pub fn new(mode: FilterMode, hosts: impl IntoIterator<Item = String>) -> Self {
        Self {
            mode,
            hosts: hosts.into_iter().map(|h| h.to_ascii_lowercase()).collect(),
        }
    }

    pub fn from_config(config: &FilterConfig) -> Self {
        Self::new(config.mode, config.hosts.iter().cloned())
    }

    pub fn mode(&self) -> FilterMode {
        self.mode
    }

    /// `Ok(false)` is a policy violation; `Err` means the URL could not be
    /// judged at all. Callers treat both as a rejection.
    pub fn validate_url(&self, raw: &str) -> Result<bool, FilterError> {
        let url = Url::parse(raw)?;
        match url.scheme() {
            "http" | "https" => {}
            other => return Err(FilterError::UnsupportedScheme(other.to_string())),
        }
        let host = url
            .host_str()
            .ok_or_else(|| FilterError::MissingHost(raw.to_string()))?
            .to_ascii_lowercase();

        let listed = self.hosts.contains(&host);
        Ok(match self.mode {
            FilterMode::Allowlist => listed,
            FilterMode::Denylist => !listed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_denylist_allows_everything() {
        let filter = UrlFilter::new(FilterMode::Denylist, Vec::new());
        assert!(filter.validate_url("https://api.example.com/price").unwrap());
        assert!(filter.validate_url("http://10.0.0.1:8080/x").unwrap());
    }

    #[test]
    fn test_denylist_rejects_exactly_listed_host() {
        let filter = UrlFilter::new(FilterMode::Denylist, vec!["Bad.example.com".to_string()]);
        assert!(!filter.validate_url("https://bad.example.com/a").unwrap());
        assert!(!filter.validate_url("http://BAD.EXAMPLE.COM:81/b?c=d").unwrap());
        assert!(filter.validate_url("https://good.example.com/a").unwrap());
        assert!(filter.validate_url("https://sub.bad.example.com/a").unwrap());
    }

    #[test]
    fn test_allowlist_only_admits_listed_hosts() {
        let filter = UrlFilter::new(FilterMode::Allowlist, vec!["api.example.com".to_string()]);
        assert!(filter.validate_url("https://api.example.com/price").unwrap());
        assert!(!filter.validate_url("https://other.example.com/price").unwrap());
    }

    #[test]
    fn test_malformed_urls_are_errors() {
        let filter = UrlFilter::new(FilterMode::Denylist, Vec::new());
        assert!(matches!(
            filter.validate_url("not a url"),
            Err(FilterError::InvalidUrl(_))
        ));
        assert!(matches!(
            filter.validate_url("file:///etc/passwd"),
            Err(FilterError::UnsupportedScheme(_))
        ));
    }
}
