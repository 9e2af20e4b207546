use std::fmt;

/// The standard operator domain. An empty domain string is an alias for it.
pub const DEFAULT_DOMAIN: &str = "ai.onnx";

pub fn normalize_domain(domain: &str) -> &str {
    if domain.is_empty() {
        DEFAULT_DOMAIN
    } else {
        domain
    }
}

/// Inclusive range of opset versions an operator registration covers.
/// `end == None` means open-ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VersionRange {
    pub start: u32,
    pub end: Option<u32>,
}

impl VersionRange {
    /// Inclusive on both ends. `CatalogBuilder::build` rejects `end < start`.
    pub const fn new(start: u32, end: u32) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }

    pub const fn since(start: u32) -> Self {
        Self { start, end: None }
    }

    pub const fn exact(version: u32) -> Self {
        Self::new(version, version)
    }

    pub fn contains(&self, version: u32) -> bool {
        version >= self.start && self.end.map_or(true, |end| version <= end)
    }

    /// Lower rank is more specific. Bounded ranges rank by width, open-ended
    /// ranges always rank after bounded ones and prefer the later start.
    pub(crate) fn specificity(&self) -> (u8, u32) {
        match self.end {
            Some(end) => (0, end.saturating_sub(self.start)),
            None => (1, u32::MAX - self.start),
        }
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(end) if end == self.start => write!(f, "{}", self.start),
            Some(end) => write!(f, "{}-{}", self.start, end),
            None => write!(f, "{}+", self.start),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OperatorIdentity {
    pub op_type: String,
    pub domain: String,
    pub version: u32,
}

impl OperatorIdentity {
    pub fn new(op_type: impl Into<String>, domain: &str, version: u32) -> Self {
        Self {
            op_type: op_type.into(),
            domain: normalize_domain(domain).to_string(),
            version,
        }
    }
}

impl fmt::Display for OperatorIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}@{}", self.domain, self.op_type, self.version)
    }
}

/// One opset import: a domain and the version the graph was written against.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Opset {
    pub domain: String,
    pub version: u32,
}

impl Opset {
    pub fn new(domain: &str, version: u32) -> Self {
        Self {
            domain: normalize_domain(domain).to_string(),
            version,
        }
    }

    pub fn onnx(version: u32) -> Self {
        Self::new(DEFAULT_DOMAIN, version)
    }
}

/// Per-session opset imports keyed by normalized domain. Later imports for
/// the same domain replace earlier ones.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OpsetImports {
    imports: Vec<Opset>,
}

impl OpsetImports {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, opset: Opset) {
        match self.imports.iter_mut().find(|o| o.domain == opset.domain) {
            Some(existing) => existing.version = opset.version,
            None => self.imports.push(opset),
        }
    }

    pub fn version_for(&self, domain: &str) -> Option<u32> {
        let domain = normalize_domain(domain);
        self.imports
            .iter()
            .find(|o| o.domain == domain)
            .map(|o| o.version)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Opset> {
        self.imports.iter()
    }
}

impl FromIterator<Opset> for OpsetImports {
    fn from_iter<I: IntoIterator<Item = Opset>>(iter: I) -> Self {
        let mut imports = Self::new();
        for opset in iter {
            imports.insert(opset);
        }
        imports
    }
}
