//! Static signature tables.
//!
//! Routine metadata is kept in JSON documents and turned into validated
//! [`RoutineSignature`]s once at startup:
//!
//! ```json
//! { "routines": [
//!     { "name": "bodn2c",
//!       "inputs": [ { "name": "name", "type": "body_name" } ],
//!       "outputs": [ { "name": "code", "type": "body_code" } ],
//!       "found_flag": true } ] }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use spx_model::{ElementKind, NdArray, TypeTag, Value};

use crate::error::{DispatchError, Result};
use crate::signature::RoutineSignature;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureTable {
    pub routines: Vec<RoutineEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutineEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native: Option<String>,
    #[serde(default)]
    pub inputs: Vec<ArgumentEntry>,
    #[serde(default)]
    pub outputs: Vec<ArgumentEntry>,
    #[serde(default)]
    pub found_flag: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgumentEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub tag: TypeTag,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

impl SignatureTable {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Validates every entry and builds the signatures in table order.
    pub fn signatures(&self) -> Result<Vec<RoutineSignature>> {
        self.routines.iter().map(RoutineEntry::to_signature).collect()
    }
}

impl RoutineEntry {
    pub fn to_signature(&self) -> Result<RoutineSignature> {
        let mut builder = RoutineSignature::builder(&self.name);
        if let Some(native) = &self.native {
            builder = builder.native(native);
        }
        for input in &self.inputs {
            builder = match &input.default {
                Some(raw) => {
                    let value = value_from_json(raw, &input.tag).ok_or_else(|| {
                        DispatchError::Table(format!(
                            "{}: default for {:?} is not a valid {}",
                            self.name, input.name, input.tag
                        ))
                    })?;
                    builder.input_with_default(&input.name, input.tag.clone(), value)
                }
                None => builder.input(&input.name, input.tag.clone()),
            };
        }
        for output in &self.outputs {
            builder = builder.output(&output.name, output.tag.clone());
        }
        if self.found_flag {
            builder = builder.found_flag();
        }
        builder.build()
    }
}

/// Convenience for `SignatureTable::load(path)?.signatures()`.
pub fn load_signature_table(path: impl AsRef<Path>) -> Result<Vec<RoutineSignature>> {
    SignatureTable::load(path)?.signatures()
}

/// Interprets a JSON default as a value of the given tag.
pub fn value_from_json(raw: &serde_json::Value, tag: &TypeTag) -> Option<Value> {
    match tag {
        TypeTag::Array(kind, _) => {
            let mut shape = Vec::new();
            let mut flat = Vec::new();
            flatten(raw, 0, &mut shape, &mut flat)?;
            let mut parts = Vec::with_capacity(flat.len());
            for item in flat {
                parts.push(scalar_from_json(item, *kind)?);
            }
            let array = NdArray::stack(&shape, *kind, &[], &parts).ok()?;
            Some(Value::Array(array))
        }
        other => scalar_from_json(raw, other.element_kind()),
    }
}

fn scalar_from_json(raw: &serde_json::Value, kind: ElementKind) -> Option<Value> {
    match kind {
        ElementKind::Int => raw.as_i64().map(Value::Int),
        ElementKind::Float => raw.as_f64().map(Value::Float),
        ElementKind::Bool => raw.as_bool().map(Value::Bool),
        ElementKind::Str => raw.as_str().map(Value::from),
    }
}

/// Flattens nested JSON lists, checking that they are rectangular.
fn flatten<'a>(
    raw: &'a serde_json::Value,
    depth: usize,
    shape: &mut Vec<usize>,
    flat: &mut Vec<&'a serde_json::Value>,
) -> Option<()> {
    match raw.as_array() {
        Some(items) => {
            if shape.len() == depth && flat.is_empty() {
                shape.push(items.len());
            } else if shape.get(depth) != Some(&items.len()) {
                return None;
            }
            for item in items {
                flatten(item, depth + 1, shape, flat)?;
            }
            Some(())
        }
        None => {
            if depth != shape.len() {
                return None;
            }
            flat.push(raw);
            Some(())
        }
    }
}
