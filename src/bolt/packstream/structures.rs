//! Graph entity structures carried in RECORD fields.
//!
//! Bolt 5 appends element ids to every entity; Bolt 4 servers send the
//! shorter layout. Both are accepted on read, and the layout is chosen on
//! write by whether element ids are present.

use std::collections::HashMap;

use super::marker::*;
use super::types::{PackStreamStructure, PackStreamValue};
use super::PackStreamError;

/// Typed access to the fields of one structure.
struct Fields<'a> {
    name: &'static str,
    s: &'a PackStreamStructure,
}

impl<'a> Fields<'a> {
    fn open(value: &'a PackStreamValue, tag: u8, name: &'static str, min: usize) -> Result<Self, PackStreamError> {
        let s = value
            .as_structure()
            .ok_or_else(|| PackStreamError::InvalidStructure(format!("expected {name} structure")))?;
        if s.tag != tag {
            return Err(PackStreamError::InvalidStructure(format!(
                "expected {name} tag 0x{tag:02X}, got 0x{:02X}",
                s.tag
            )));
        }
        if s.fields.len() < min {
            return Err(PackStreamError::InvalidStructure(format!(
                "{name} requires at least {min} fields, got {}",
                s.fields.len()
            )));
        }
        Ok(Self { name, s })
    }

    fn bad(&self, index: usize, what: &str) -> PackStreamError {
        PackStreamError::InvalidStructure(format!("{} field {index} must be {what}", self.name))
    }

    fn int(&self, index: usize) -> Result<i64, PackStreamError> {
        self.s.fields[index].as_int().ok_or_else(|| self.bad(index, "an integer"))
    }

    fn string(&self, index: usize) -> Result<String, PackStreamError> {
        self.s.fields[index]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| self.bad(index, "a string"))
    }

    fn map(&self, index: usize) -> Result<HashMap<String, PackStreamValue>, PackStreamError> {
        self.s.fields[index].as_map().cloned().ok_or_else(|| self.bad(index, "a map"))
    }

    fn list(&self, index: usize) -> Result<&'a [PackStreamValue], PackStreamError> {
        self.s.fields[index].as_list().ok_or_else(|| self.bad(index, "a list"))
    }

    fn optional_string(&self, index: usize) -> Option<String> {
        self.s.field(index).and_then(|v| v.as_str()).map(str::to_string)
    }
}

fn strings(items: &[String]) -> PackStreamValue {
    PackStreamValue::List(items.iter().cloned().map(PackStreamValue::String).collect())
}

#[derive(Debug, Clone, PartialEq)]
pub struct PackStreamNode {
    pub id: i64,
    pub labels: Vec<String>,
    pub properties: HashMap<String, PackStreamValue>,
    pub element_id: Option<String>,
}

impl PackStreamNode {
    pub fn new(id: i64, labels: Vec<String>, properties: HashMap<String, PackStreamValue>) -> Self {
        Self {
            id,
            labels,
            properties,
            element_id: None,
        }
    }

    pub fn with_element_id(mut self, element_id: impl Into<String>) -> Self {
        self.element_id = Some(element_id.into());
        self
    }

    pub fn to_value(&self) -> PackStreamValue {
        let mut fields = vec![
            PackStreamValue::Integer(self.id),
            strings(&self.labels),
            PackStreamValue::Map(self.properties.clone()),
        ];
        if let Some(element_id) = &self.element_id {
            fields.push(PackStreamValue::String(element_id.clone()));
        }
        PackStreamValue::Structure(PackStreamStructure::new(NODE_TAG, fields))
    }

    pub fn from_value(value: &PackStreamValue) -> Result<Self, PackStreamError> {
        let f = Fields::open(value, NODE_TAG, "Node", 3)?;
        let labels = f
            .list(1)?
            .iter()
            .map(|v| v.as_str().map(str::to_string).ok_or_else(|| f.bad(1, "a list of strings")))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            id: f.int(0)?,
            labels,
            properties: f.map(2)?,
            element_id: f.optional_string(3),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PackStreamRelationship {
    pub id: i64,
    pub start_node_id: i64,
    pub end_node_id: i64,
    pub rel_type: String,
    pub properties: HashMap<String, PackStreamValue>,
    /// Element ids: own, start node, end node.
    pub element_ids: Option<(String, String, String)>,
}

impl PackStreamRelationship {
    pub fn to_value(&self) -> PackStreamValue {
        let mut fields = vec![
            PackStreamValue::Integer(self.id),
            PackStreamValue::Integer(self.start_node_id),
            PackStreamValue::Integer(self.end_node_id),
            PackStreamValue::String(self.rel_type.clone()),
            PackStreamValue::Map(self.properties.clone()),
        ];
        if let Some((own, start, end)) = &self.element_ids {
            fields.extend([own, start, end].map(|s| PackStreamValue::String(s.clone())));
        }
        PackStreamValue::Structure(PackStreamStructure::new(RELATIONSHIP_TAG, fields))
    }

    pub fn from_value(value: &PackStreamValue) -> Result<Self, PackStreamError> {
        let f = Fields::open(value, RELATIONSHIP_TAG, "Relationship", 5)?;
        let element_ids = match (f.optional_string(5), f.optional_string(6), f.optional_string(7)) {
            (Some(own), Some(start), Some(end)) => Some((own, start, end)),
            _ => None,
        };
        Ok(Self {
            id: f.int(0)?,
            start_node_id: f.int(1)?,
            end_node_id: f.int(2)?,
            rel_type: f.string(3)?,
            properties: f.map(4)?,
            element_ids,
        })
    }
}

/// Relationship inside a path, without its end points.
#[derive(Debug, Clone, PartialEq)]
pub struct PackStreamUnboundRelationship {
    pub id: i64,
    pub rel_type: String,
    pub properties: HashMap<String, PackStreamValue>,
    pub element_id: Option<String>,
}

impl PackStreamUnboundRelationship {
    pub fn to_value(&self) -> PackStreamValue {
        let mut fields = vec![
            PackStreamValue::Integer(self.id),
            PackStreamValue::String(self.rel_type.clone()),
            PackStreamValue::Map(self.properties.clone()),
        ];
        if let Some(element_id) = &self.element_id {
            fields.push(PackStreamValue::String(element_id.clone()));
        }
        PackStreamValue::Structure(PackStreamStructure::new(UNBOUND_RELATIONSHIP_TAG, fields))
    }

    pub fn from_value(value: &PackStreamValue) -> Result<Self, PackStreamError> {
        let f = Fields::open(value, UNBOUND_RELATIONSHIP_TAG, "UnboundRelationship", 3)?;
        Ok(Self {
            id: f.int(0)?,
            rel_type: f.string(1)?,
            properties: f.map(2)?,
            element_id: f.optional_string(3),
        })
    }
}

/// Alternating node/relationship walk encoded as index pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct PackStreamPath {
    pub nodes: Vec<PackStreamNode>,
    pub relationships: Vec<PackStreamUnboundRelationship>,
    /// Pairs of (signed, 1-based relationship index, node index).
    pub indices: Vec<i64>,
}

impl PackStreamPath {
    pub fn to_value(&self) -> PackStreamValue {
        PackStreamValue::Structure(PackStreamStructure::new(
            PATH_TAG,
            vec![
                PackStreamValue::List(self.nodes.iter().map(PackStreamNode::to_value).collect()),
                PackStreamValue::List(
                    self.relationships
                        .iter()
                        .map(PackStreamUnboundRelationship::to_value)
                        .collect(),
                ),
                PackStreamValue::List(self.indices.iter().copied().map(PackStreamValue::Integer).collect()),
            ],
        ))
    }

    pub fn from_value(value: &PackStreamValue) -> Result<Self, PackStreamError> {
        let f = Fields::open(value, PATH_TAG, "Path", 3)?;
        let nodes = f.list(0)?.iter().map(PackStreamNode::from_value).collect::<Result<_, _>>()?;
        let relationships = f
            .list(1)?
            .iter()
            .map(PackStreamUnboundRelationship::from_value)
            .collect::<Result<_, _>>()?;
        let indices = f
            .list(2)?
            .iter()
            .map(|v| v.as_int().ok_or_else(|| f.bad(2, "a list of integers")))
            .collect::<Result<Vec<i64>, _>>()?;
        if indices.len() % 2 != 0 {
            return Err(f.bad(2, "an even-length index sequence"));
        }
        Ok(Self {
            nodes,
            relationships,
            indices,
        })
    }

    /// Number of hops in the path.
    pub fn len(&self) -> usize {
        self.indices.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}
