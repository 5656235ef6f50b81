//! Dispatch configuration.
//!
//! Selects the coercion level applied to every call and the error/alias modes
//! routines start in. Routine-level overrides are made through the
//! dispatcher's `use_*` entry points, not here.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// How strictly raw arguments are matched against declared type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Coercion {
    /// Pass values through untouched
    None,
    /// Reject values whose type differs from the tag
    Check,
    /// Cast values to the tag's type where the cast is lossless
    Convert,
    /// Convert, and translate body/frame names and codes into each other
    Translate,
}

impl Default for Coercion {
    fn default() -> Self {
        Coercion::Translate
    }
}

impl Coercion {
    pub const ALL: [Coercion; 4] = [
        Coercion::None,
        Coercion::Check,
        Coercion::Convert,
        Coercion::Translate,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Coercion::None => "none",
            Coercion::Check => "check",
            Coercion::Convert => "convert",
            Coercion::Translate => "translate",
        }
    }
}

/// Whether a "not found" outcome is reported as a flag or raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorMode {
    Flag,
    Raise,
}

impl Default for ErrorMode {
    fn default() -> Self {
        ErrorMode::Flag
    }
}

/// Whether body/frame arguments are expanded to their alias groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AliasMode {
    Literal,
    Aliased,
}

impl Default for AliasMode {
    fn default() -> Self {
        AliasMode::Literal
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub coercion: Coercion,
    /// Error mode bound to routines that have no explicit override
    pub error_mode: ErrorMode,
    /// Alias mode bound to routines that have no explicit override
    pub alias_mode: AliasMode,
}

impl DispatchConfig {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
