//! Signature registry.
//!
//! Every routine's declared inputs, outputs and defaults. The native library
//! offers no reflection, so coercion, broadcasting and variant construction
//! all work from these records.

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::sync::Arc;

use spx_compat::{canonical_symbol, native_symbol};
use spx_model::{NdArray, TypeTag, Value};
use tracing::debug;

use crate::error::{DispatchError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct InputSpec {
    pub name: String,
    pub tag: TypeTag,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputSpec {
    pub name: String,
    pub tag: TypeTag,
}

/// Declared interface of one native routine. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutineSignature {
    name: String,
    native: String,
    inputs: Vec<InputSpec>,
    outputs: Vec<OutputSpec>,
    defaults: Vec<Value>,
    found_flag: bool,
}

impl RoutineSignature {
    pub fn builder(name: &str) -> SignatureBuilder {
        SignatureBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Exported symbol invoked in the native library.
    pub fn native_symbol(&self) -> &str {
        &self.native
    }

    pub fn inputs(&self) -> &[InputSpec] {
        &self.inputs
    }

    /// All native outputs, including the trailing found-flag if any.
    pub fn outputs(&self) -> &[OutputSpec] {
        &self.outputs
    }

    /// Outputs without the found-flag.
    pub fn value_outputs(&self) -> &[OutputSpec] {
        if self.found_flag {
            &self.outputs[..self.outputs.len() - 1]
        } else {
            &self.outputs
        }
    }

    pub fn has_found_flag(&self) -> bool {
        self.found_flag
    }

    /// Defaults for the trailing suffix of inputs, in input order.
    pub fn defaults(&self) -> &[Value] {
        &self.defaults
    }

    /// Index of the first input that has a default.
    pub fn default_start(&self) -> usize {
        self.inputs.len() - self.defaults.len()
    }

    pub fn default_for(&self, index: usize) -> Option<&Value> {
        index
            .checked_sub(self.default_start())
            .and_then(|i| self.defaults.get(i))
    }

    pub fn required_inputs(&self) -> usize {
        self.default_start()
    }

    pub fn input_index(&self, name: &str) -> Option<usize> {
        self.inputs
            .iter()
            .position(|input| input.name.eq_ignore_ascii_case(name))
    }

    /// True when any input is a body or frame identifier.
    pub fn alias_eligible(&self) -> bool {
        self.inputs.iter().any(|input| input.tag.is_identifier())
    }

    /// Outputs reported when a flag-mode call finds nothing.
    pub fn not_found_outputs(&self) -> Vec<Value> {
        let mut out: Vec<Value> = self
            .value_outputs()
            .iter()
            .map(|output| placeholder(&output.tag))
            .collect();
        if self.found_flag {
            out.push(Value::Bool(false));
        }
        out
    }
}

fn placeholder(tag: &TypeTag) -> Value {
    match tag {
        TypeTag::Array(kind, shape) => Value::Array(NdArray::zeros(*kind, shape.concrete(0))),
        other => Value::zero(other.element_kind()),
    }
}

/// True when `value` could be passed for `tag` without any conversion.
pub(crate) fn value_fits_tag(value: &Value, tag: &TypeTag) -> bool {
    match (tag, value) {
        (TypeTag::Array(kind, shape), Value::Array(array)) => {
            array.kind() == *kind && shape.matches(array.shape())
        }
        (TypeTag::Array(..), _) | (_, Value::Array(_)) => false,
        (tag, value) => tag.element_kind() == value.element_kind(),
    }
}

/// Declarative construction of a [`RoutineSignature`].
#[derive(Debug, Clone)]
pub struct SignatureBuilder {
    name: String,
    native: Option<String>,
    inputs: Vec<InputSpec>,
    outputs: Vec<OutputSpec>,
    defaults: Vec<(usize, Value)>,
    found_flag: bool,
}

impl SignatureBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: canonical_symbol(name),
            native: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            defaults: Vec::new(),
            found_flag: false,
        }
    }

    /// Overrides the exported symbol (defaults to `<name>_c`).
    pub fn native(mut self, symbol: &str) -> Self {
        self.native = Some(symbol.to_string());
        self
    }

    pub fn input(mut self, name: &str, tag: TypeTag) -> Self {
        self.inputs.push(InputSpec {
            name: name.to_string(),
            tag,
        });
        self
    }

    pub fn input_with_default(mut self, name: &str, tag: TypeTag, default: impl Into<Value>) -> Self {
        self.defaults.push((self.inputs.len(), default.into()));
        self.input(name, tag)
    }

    pub fn output(mut self, name: &str, tag: TypeTag) -> Self {
        self.outputs.push(OutputSpec {
            name: name.to_string(),
            tag,
        });
        self
    }

    /// The native routine ends its outputs with a boolean found-flag.
    pub fn found_flag(mut self) -> Self {
        self.found_flag = true;
        self
    }

    pub fn build(self) -> Result<RoutineSignature> {
        let invalid = |reason: String| DispatchError::InvalidSignature {
            routine: self.name.clone(),
            reason,
        };

        if self.name.is_empty() {
            return Err(invalid("routine name is empty".to_string()));
        }

        let mut seen = HashSet::new();
        for input in &self.inputs {
            if !seen.insert(input.name.to_ascii_lowercase()) {
                return Err(invalid(format!("input {:?} declared twice", input.name)));
            }
        }

        let first_default = self.inputs.len() - self.defaults.len();
        for (offset, (index, value)) in self.defaults.iter().enumerate() {
            if *index != first_default + offset {
                return Err(invalid(format!(
                    "input {:?} has a default but a later input does not",
                    self.inputs[*index].name
                )));
            }
            let tag = &self.inputs[*index].tag;
            if !value_fits_tag(value, tag) {
                return Err(invalid(format!(
                    "default {value} does not fit input {:?} of type {tag}",
                    self.inputs[*index].name
                )));
            }
        }

        let mut outputs = self.outputs;
        if self.found_flag {
            outputs.push(OutputSpec {
                name: "found".to_string(),
                tag: TypeTag::Bool,
            });
        }

        let native = self.native.unwrap_or_else(|| native_symbol(&self.name));
        Ok(RoutineSignature {
            name: self.name,
            native,
            inputs: self.inputs,
            outputs,
            defaults: self.defaults.into_iter().map(|(_, value)| value).collect(),
            found_flag: self.found_flag,
        })
    }
}

/// Read-only after startup: routines are registered once, then looked up.
#[derive(Debug, Clone, Default)]
pub struct SignatureRegistry {
    routines: BTreeMap<String, Arc<RoutineSignature>>,
}

impl SignatureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, signature: RoutineSignature) -> Result<Arc<RoutineSignature>> {
        let name = signature.name().to_string();
        if self.routines.contains_key(&name) {
            return Err(DispatchError::DuplicateRoutine { name });
        }
        debug!(
            routine = %name,
            inputs = signature.inputs().len(),
            outputs = signature.outputs().len(),
            "registered routine signature"
        );
        let signature = Arc::new(signature);
        self.routines.insert(name, Arc::clone(&signature));
        Ok(signature)
    }

    pub fn lookup(&self, name: &str) -> Result<&Arc<RoutineSignature>> {
        self.routines
            .get(&canonical_symbol(name))
            .ok_or_else(|| DispatchError::UnknownRoutine {
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.routines.contains_key(&canonical_symbol(name))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.routines.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<RoutineSignature>> {
        self.routines.values()
    }

    pub fn len(&self) -> usize {
        self.routines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routines.is_empty()
    }
}
