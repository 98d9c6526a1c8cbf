//! XPath 1.0 extraction from XML payloads.
//!
//! The selector must evaluate to a node-set holding exactly one node. Its
//! string value (text content for elements, the value for attributes) is
//! returned trimmed.

use sxd_xpath::{Context, Factory, Value};
use thiserror::Error;

use super::{ExtractionResult, ResolveError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum XPathError {
    #[error("malformed XPath: {0}")]
    Invalid(String),

    #[error("XPath evaluation failed: {0}")]
    Evaluation(String),

    #[error("XPath does not select nodes")]
    NotANodeSet,

    #[error("XPath matched no node")]
    NoMatch,

    #[error("XPath matched {0} nodes, expected exactly one")]
    Ambiguous(usize),
}

pub fn extract(body: &str, selector: &str) -> Result<ExtractionResult, ResolveError> {
    let xpath = Factory::new()
        .build(selector)
        .map_err(|e| XPathError::Invalid(e.to_string()))?
        .ok_or_else(|| XPathError::Invalid("empty expression".to_string()))?;

    let package = sxd_document::parser::parse(body.trim_start())
        .map_err(|e| ResolveError::InvalidXml(e.to_string()))?;
    let document = package.as_document();

    let value = xpath
        .evaluate(&Context::new(), document.root())
        .map_err(|e| XPathError::Evaluation(e.to_string()))?;
    let Value::Nodeset(nodes) = value else {
        return Err(XPathError::NotANodeSet.into());
    };

    match nodes.size() {
        0 => Err(XPathError::NoMatch.into()),
        1 => {
            let node = nodes
                .document_order_first()
                .ok_or(XPathError::NoMatch)?;
            Ok(ExtractionResult::Text(node.string_value().trim().to_string()))
        }
        n => Err(XPathError::Ambiguous(n).into()),
    }
}
