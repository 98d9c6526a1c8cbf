use std::time::Duration;

use serde::Deserialize;

pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestsConfig {
    #[serde(default)]
    pub filter: FilterConfig,
    /// Upper bound on a single data source fetch, connect to last byte.
    pub fetch_timeout_secs: Option<u64>,
}

impl RequestsConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilterConfig {
    #[serde(default)]
    pub mode: FilterMode,
    #[serde(default)]
    pub hosts: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    /// Only listed hosts may be fetched.
    #[serde(alias = "whitelist")]
    Allowlist,
    /// Every host except the listed ones may be fetched.
    #[default]
    #[serde(alias = "blacklist")]
    Denylist,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_mode_defaults_to_denylist() {
        let config: RequestsConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.filter.mode, FilterMode::Denylist);
        assert!(config.filter.hosts.is_empty());
        assert_eq!(config.fetch_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_filter_mode_accepts_legacy_names() {
        let config: FilterConfig =
            serde_json::from_str(r#"{"mode": "whitelist", "hosts": ["a.com"]}"#).unwrap();
        assert_eq!(config.mode, FilterMode::Allowlist);
    }

    #[test]
    fn test_unknown_filter_mode_is_rejected() {
        let result: Result<FilterConfig, _> = serde_json::from_str(r#"{"mode": "greylist"}"#);
        assert!(result.is_err());
    }
}
