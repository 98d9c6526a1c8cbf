//! Data Source Resolver: one HTTP fetch followed by selector extraction.
//!
//! The leading character of the selector declares the payload kind: `$` for
//! JSON (bracket path, see [`json`]) and `/` for XML (XPath 1.0, see
//! [`xml`]). The matching `Accept` header is sent with the request.

pub mod json;
pub mod xml;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use thiserror::Error;

pub use json::JsonPathError;
pub use xml::XPathError;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("unsupported selector {0:?}: must start with '$' or '/'")]
    UnsupportedSelector(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("data source answered with HTTP {0}")]
    Status(StatusCode),

    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("invalid XML payload: {0}")]
    InvalidXml(String),

    #[error(transparent)]
    JsonPath(#[from] JsonPathError),

    #[error(transparent)]
    XPath(#[from] XPathError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Json,
    Xml,
}

impl PayloadKind {
    pub fn from_selector(selector: &str) -> Result<Self, ResolveError> {
        match selector.chars().next() {
            Some('$') => Ok(Self::Json),
            Some('/') => Ok(Self::Xml),
            _ => Err(ResolveError::UnsupportedSelector(selector.to_string())),
        }
    }

    pub fn accept(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Xml => "application/xml",
        }
    }
}

/// A resolved scalar, ready to be submitted on-chain as a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionResult {
    Text(String),
    Number(serde_json::Number),
}

impl fmt::Display for ExtractionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Number(n) => {
                if n.is_f64() {
                    // f64's Display never switches to exponent notation
                    match n.as_f64() {
                        Some(v) => write!(f, "{}", v),
                        None => write!(f, "{}", n),
                    }
                } else {
                    write!(f, "{}", n)
                }
            }
        }
    }
}

/// Extract a value from an already fetched payload.
pub fn extract(body: &str, selector: &str) -> Result<ExtractionResult, ResolveError> {
    match PayloadKind::from_selector(selector)? {
        PayloadKind::Json => json::extract(body, &selector[1..]),
        PayloadKind::Xml => xml::extract(body, selector),
    }
}

#[async_trait]
pub trait DataResolver: Send + Sync + 'static {
    async fn resolve(&self, url: &str, selector: &str) -> Result<ExtractionResult, ResolveError>;
}

/// [`DataResolver`] over a shared `reqwest` client. No retries: a failed fetch
/// fails the request.
#[derive(Debug, Clone)]
pub struct Resolver {
    client: reqwest::Client,
}

impl Resolver {
    pub fn new(timeout: Duration) -> Result<Self, ResolveError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl DataResolver for Resolver {
    async fn resolve(&self, url: &str, selector: &str) -> Result<ExtractionResult, ResolveError> {
        let kind = PayloadKind::from_selector(selector)?;

        let response = self
            .client
            .get(url)
            .header(ACCEPT, kind.accept())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ResolveError::Status(status));
        }

        let body = response.text().await?;
        tracing::trace!(url, bytes = body.len(), "Fetched data source");

        extract(&body, selector)
    }
}

#[cfg(test)]
pub(crate) mod stub {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Answers every resolve with a fixed value and counts calls.
    pub struct StubResolver {
        value: Option<String>,
        calls: AtomicUsize,
    }

    impl StubResolver {
        pub fn returning(value: &str) -> Self {
            Self {
                value: Some(value.to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn failing() -> Self {
            Self {
                value: None,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DataResolver for StubResolver {
        async fn resolve(
            &self,
            _url: &str,
            _selector: &str,
        ) -> Result<ExtractionResult, ResolveError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.value {
                Some(v) => Ok(ExtractionResult::Text(v.clone())),
                None => Err(ResolveError::JsonPath(JsonPathError::KeyNotFound(
                    "stub".to_string(),
                ))),
            }
        }
    }
}
