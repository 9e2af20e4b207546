use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use opbind_core::{AttrValue, GraphNode, Opset};
use serde::Deserialize;

/// On-disk graph description consumed by `opbind resolve`.
#[derive(Debug, Deserialize)]
pub struct GraphFile {
    #[serde(default)]
    pub opset_import: Vec<OpsetEntry>,
    pub nodes: Vec<NodeEntry>,
}

#[derive(Debug, Deserialize)]
pub struct OpsetEntry {
    #[serde(default)]
    pub domain: String,
    pub version: u32,
}

#[derive(Debug, Deserialize)]
pub struct NodeEntry {
    #[serde(default)]
    pub name: Option<String>,
    pub op_type: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub version: Option<u32>,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttrEntry>,
    #[serde(default)]
    pub inputs: Vec<usize>,
    #[serde(default)]
    pub outputs: Vec<usize>,
}

/// Integers are tried before floats, so `1` is an int and `1.0` a float.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum AttrEntry {
    Int(i64),
    Float(f64),
    String(String),
    Ints(Vec<i64>),
    Floats(Vec<f64>),
    Strings(Vec<String>),
}

impl From<&AttrEntry> for AttrValue {
    fn from(entry: &AttrEntry) -> Self {
        match entry {
            AttrEntry::Int(v) => AttrValue::Int(*v),
            AttrEntry::Float(v) => AttrValue::Float(*v as f32),
            AttrEntry::String(v) => AttrValue::String(v.clone()),
            AttrEntry::Ints(v) => AttrValue::Ints(v.clone()),
            AttrEntry::Floats(v) => AttrValue::Floats(v.iter().map(|f| *f as f32).collect()),
            AttrEntry::Strings(v) => AttrValue::Strings(v.clone()),
        }
    }
}

impl GraphFile {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read graph file {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("invalid graph file {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn opsets(&self) -> Vec<Opset> {
        self.opset_import
            .iter()
            .map(|o| Opset::new(&o.domain, o.version))
            .collect()
    }

    pub fn nodes(&self) -> Vec<GraphNode> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let name = entry
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("{}_{i}", entry.op_type));
                let mut node = GraphNode::new(entry.op_type.clone())
                    .named(name)
                    .with_io(entry.inputs.clone(), entry.outputs.clone());
                node.domain = entry.domain.clone();
                node.version = entry.version;
                for (key, value) in &entry.attributes {
                    node.attributes.insert(key.clone(), AttrValue::from(value));
                }
                node
            })
            .collect()
    }
}
