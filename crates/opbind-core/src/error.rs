use thiserror::Error;

use crate::graph::AttrValue;
use crate::identity::VersionRange;

/// Raised while building a backend's catalogs. Never raised by lookup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("operator {domain}::{op_type} registered twice for versions {range}")]
    Conflict {
        domain: String,
        op_type: String,
        range: VersionRange,
    },
    #[error("operator {domain}::{op_type} registered with empty version range {start}-{end}")]
    InvertedRange {
        domain: String,
        op_type: String,
        start: u32,
        end: u32,
    },
    #[error("more than one catalog for domain '{domain}'")]
    DuplicateDomain { domain: String },
}

/// A kernel rejected the attribute mapping of its node.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AttributeError {
    #[error("missing required attribute '{name}'")]
    Missing { name: String },
    #[error("attribute '{name}' must be {expected}, got {found}")]
    WrongType {
        name: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("attribute '{name}' is invalid: {reason}")]
    Invalid { name: String, reason: String },
}

impl AttributeError {
    pub(crate) fn wrong_type(name: &str, expected: &'static str, found: &AttrValue) -> Self {
        Self::WrongType {
            name: name.to_string(),
            expected,
            found: found.type_name(),
        }
    }

    pub fn invalid(name: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}
