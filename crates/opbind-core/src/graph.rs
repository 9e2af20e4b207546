use std::collections::BTreeMap;

use crate::error::AttributeError;
use crate::tensor::Tensor;

#[derive(Clone, Debug)]
pub enum AttrValue {
    Float(f32),
    Int(i64),
    String(String),
    Tensor(Tensor),
    Floats(Vec<f32>),
    Ints(Vec<i64>),
    Strings(Vec<String>),
}

impl AttrValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            AttrValue::Float(_) => "float",
            AttrValue::Int(_) => "int",
            AttrValue::String(_) => "string",
            AttrValue::Tensor(_) => "tensor",
            AttrValue::Floats(_) => "floats",
            AttrValue::Ints(_) => "ints",
            AttrValue::Strings(_) => "strings",
        }
    }
}

/// Attribute mapping of a node with typed accessors for kernels.
#[derive(Clone, Debug, Default)]
pub struct Attributes {
    items: BTreeMap<String, AttrValue>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: AttrValue) {
        self.items.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.items.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.items.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.items.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Integers are accepted where a float is expected.
    pub fn float(&self, name: &str) -> Result<f32, AttributeError> {
        match self.get(name) {
            Some(AttrValue::Float(v)) => Ok(*v),
            Some(AttrValue::Int(v)) => Ok(*v as f32),
            Some(other) => Err(AttributeError::wrong_type(name, "float", other)),
            None => Err(AttributeError::Missing {
                name: name.to_string(),
            }),
        }
    }

    pub fn float_or(&self, name: &str, default: f32) -> Result<f32, AttributeError> {
        if self.contains(name) {
            self.float(name)
        } else {
            Ok(default)
        }
    }

    pub fn int(&self, name: &str) -> Result<i64, AttributeError> {
        match self.get(name) {
            Some(AttrValue::Int(v)) => Ok(*v),
            Some(other) => Err(AttributeError::wrong_type(name, "int", other)),
            None => Err(AttributeError::Missing {
                name: name.to_string(),
            }),
        }
    }

    pub fn int_or(&self, name: &str, default: i64) -> Result<i64, AttributeError> {
        if self.contains(name) {
            self.int(name)
        } else {
            Ok(default)
        }
    }

    pub fn ints(&self, name: &str) -> Result<&[i64], AttributeError> {
        match self.get(name) {
            Some(AttrValue::Ints(v)) => Ok(v),
            Some(other) => Err(AttributeError::wrong_type(name, "ints", other)),
            None => Err(AttributeError::Missing {
                name: name.to_string(),
            }),
        }
    }

    pub fn string(&self, name: &str) -> Result<&str, AttributeError> {
        match self.get(name) {
            Some(AttrValue::String(v)) => Ok(v),
            Some(other) => Err(AttributeError::wrong_type(name, "string", other)),
            None => Err(AttributeError::Missing {
                name: name.to_string(),
            }),
        }
    }

    pub fn string_or<'a>(&'a self, name: &str, default: &'a str) -> Result<&'a str, AttributeError> {
        if self.contains(name) {
            self.string(name)
        } else {
            Ok(default)
        }
    }

    /// Fails on the first attribute not in `allowed`.
    pub fn reject_unknown(&self, allowed: &[&str]) -> Result<(), AttributeError> {
        match self.names().find(|name| !allowed.contains(name)) {
            Some(name) => Err(AttributeError::Invalid {
                name: name.to_string(),
                reason: "attribute is not supported by this kernel".to_string(),
            }),
            None => Ok(()),
        }
    }
}

impl FromIterator<(String, AttrValue)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (String, AttrValue)>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

/// One computation step of a loaded graph. Input and output slots index into
/// tensor storage owned by the graph.
#[derive(Clone, Debug)]
pub struct GraphNode {
    pub name: String,
    pub op_type: String,
    /// `None` means the standard domain.
    pub domain: Option<String>,
    /// Overrides the session's opset import for this node's domain.
    pub version: Option<u32>,
    pub attributes: Attributes,
    pub inputs: Vec<usize>,
    pub outputs: Vec<usize>,
}

impl GraphNode {
    pub fn new(op_type: impl Into<String>) -> Self {
        let op_type = op_type.into();
        Self {
            name: op_type.clone(),
            op_type,
            domain: None,
            version: None,
            attributes: Attributes::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: AttrValue) -> Self {
        self.attributes.insert(name, value);
        self
    }

    pub fn with_io(mut self, inputs: Vec<usize>, outputs: Vec<usize>) -> Self {
        self.inputs = inputs;
        self.outputs = outputs;
        self
    }
}
