//! Frozen per-domain operator catalogs.
//!
//! A catalog maps `(op_type, version range)` to a [`KernelFactory`]. Catalogs
//! are assembled with [`CatalogBuilder`] during backend construction and have
//! no mutation API afterwards, so they can be shared across threads freely.

use std::collections::HashMap;

use crate::error::CatalogError;
use crate::identity::{normalize_domain, VersionRange};
use crate::kernel::KernelFactory;

struct Entry {
    range: VersionRange,
    factory: KernelFactory,
    seq: usize,
}

pub struct CatalogBuilder {
    domain: String,
    entries: Vec<(String, Entry)>,
}

impl CatalogBuilder {
    pub fn new(domain: &str) -> Self {
        Self {
            domain: normalize_domain(domain).to_string(),
            entries: Vec::new(),
        }
    }

    pub fn register(
        mut self,
        op_type: impl Into<String>,
        range: VersionRange,
        factory: KernelFactory,
    ) -> Self {
        let seq = self.entries.len();
        self.entries.push((
            op_type.into(),
            Entry {
                range,
                factory,
                seq,
            },
        ));
        self
    }

    pub fn build(self) -> Result<OperatorCatalog, CatalogError> {
        let mut ops: HashMap<String, Vec<Entry>> = HashMap::new();
        for (op_type, entry) in self.entries {
            if let Some(end) = entry.range.end.filter(|end| *end < entry.range.start) {
                return Err(CatalogError::InvertedRange {
                    domain: self.domain,
                    op_type,
                    start: entry.range.start,
                    end,
                });
            }
            let slot = ops.entry(op_type.clone()).or_default();
            if slot.iter().any(|e| e.range == entry.range) {
                return Err(CatalogError::Conflict {
                    domain: self.domain,
                    op_type,
                    range: entry.range,
                });
            }
            slot.push(entry);
        }

        // Most specific first; later registrations win ties.
        for entries in ops.values_mut() {
            entries.sort_by(|a, b| {
                a.range
                    .specificity()
                    .cmp(&b.range.specificity())
                    .then(b.seq.cmp(&a.seq))
            });
        }

        Ok(OperatorCatalog {
            domain: self.domain,
            ops,
        })
    }
}

pub struct OperatorCatalog {
    domain: String,
    ops: HashMap<String, Vec<Entry>>,
}

impl OperatorCatalog {
    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn lookup(&self, op_type: &str, domain: &str, version: u32) -> Option<&KernelFactory> {
        if normalize_domain(domain) != self.domain {
            return None;
        }
        self.ops
            .get(op_type)?
            .iter()
            .find(|e| e.range.contains(version))
            .map(|e| &e.factory)
    }

    pub fn contains(&self, op_type: &str, domain: &str, version: u32) -> bool {
        self.lookup(op_type, domain, version).is_some()
    }

    /// All registrations sorted by op type, then range start.
    pub fn entries(&self) -> Vec<(&str, VersionRange)> {
        let mut out = self
            .ops
            .iter()
            .flat_map(|(op, entries)| entries.iter().map(move |e| (op.as_str(), e.range)))
            .collect::<Vec<_>>();
        out.sort_by(|a, b| a.0.cmp(b.0).then(a.1.start.cmp(&b.1.start)));
        out
    }

    pub fn len(&self) -> usize {
        self.ops.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// The catalogs a backend owns, at most one per domain.
#[derive(Default)]
pub struct CatalogSet {
    catalogs: Vec<OperatorCatalog>,
}

impl CatalogSet {
    pub fn new(catalogs: Vec<OperatorCatalog>) -> Result<Self, CatalogError> {
        for (i, catalog) in catalogs.iter().enumerate() {
            if catalogs[..i].iter().any(|c| c.domain == catalog.domain) {
                return Err(CatalogError::DuplicateDomain {
                    domain: catalog.domain.clone(),
                });
            }
        }
        Ok(Self { catalogs })
    }

    pub fn get(&self, domain: &str) -> Option<&OperatorCatalog> {
        let domain = normalize_domain(domain);
        self.catalogs.iter().find(|c| c.domain == domain)
    }

    pub fn iter(&self) -> impl Iterator<Item = &OperatorCatalog> {
        self.catalogs.iter()
    }

    pub fn domains(&self) -> impl Iterator<Item = &str> {
        self.catalogs.iter().map(|c| c.domain.as_str())
    }
}
