//! Variant lattice.
//!
//! Every routine is reachable as up to eight variants: error mode (flag or
//! raise) × alias mode (literal or aliased) × vectorized or scalar. The
//! aliased half only exists for routines with a body or frame input. Each
//! variant is linked to its error, flag, vector and scalar neighbours when
//! the routine is registered.

use std::collections::{BTreeMap, HashMap};
use std::fmt::{Display, Formatter};

use spx_compat::canonical_symbol;

use crate::config::{AliasMode, ErrorMode};
use crate::error::{DispatchError, Result};
use crate::signature::RoutineSignature;

/// Error and alias mode of a variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VariantKey {
    pub error_mode: ErrorMode,
    pub alias_mode: AliasMode,
}

impl VariantKey {
    pub fn new(error_mode: ErrorMode, alias_mode: AliasMode) -> Self {
        Self {
            error_mode,
            alias_mode,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Variant {
    pub key: VariantKey,
    pub vectorized: bool,
}

impl Variant {
    pub fn new(key: VariantKey, vectorized: bool) -> Self {
        Self { key, vectorized }
    }

    fn slot(&self) -> usize {
        let aliased = usize::from(self.key.alias_mode == AliasMode::Aliased);
        let vector = usize::from(self.vectorized);
        let raise = usize::from(self.key.error_mode == ErrorMode::Raise);
        (aliased << 2) | (vector << 1) | raise
    }

    fn from_slot(slot: usize) -> Self {
        let error_mode = if slot & 1 == 1 {
            ErrorMode::Raise
        } else {
            ErrorMode::Flag
        };
        let alias_mode = if slot & 4 == 4 {
            AliasMode::Aliased
        } else {
            AliasMode::Literal
        };
        Self {
            key: VariantKey::new(error_mode, alias_mode),
            vectorized: slot & 2 == 2,
        }
    }

    /// Suffix appended to the routine name, e.g. `_aliased_vector_error`.
    pub fn suffix(&self) -> String {
        let mut suffix = String::new();
        if self.key.alias_mode == AliasMode::Aliased {
            suffix.push_str("_aliased");
        }
        if self.vectorized {
            suffix.push_str("_vector");
        }
        if self.key.error_mode == ErrorMode::Raise {
            suffix.push_str("_error");
        }
        suffix
    }

    pub fn symbol(&self, routine: &str) -> String {
        format!("{routine}{}", self.suffix())
    }

    pub fn with_error_mode(self, error_mode: ErrorMode) -> Self {
        Self {
            key: VariantKey {
                error_mode,
                ..self.key
            },
            ..self
        }
    }

    pub fn with_alias_mode(self, alias_mode: AliasMode) -> Self {
        Self {
            key: VariantKey {
                alias_mode,
                ..self.key
            },
            ..self
        }
    }

    pub fn with_vectorized(self, vectorized: bool) -> Self {
        Self { vectorized, ..self }
    }
}

impl Display for Variant {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let suffix = self.suffix();
        if suffix.is_empty() {
            f.write_str("base")
        } else {
            f.write_str(&suffix[1..])
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    Error,
    Flag,
    Vector,
    Scalar,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantEntry {
    pub variant: Variant,
    pub symbol: String,
    links: [usize; 4],
}

impl VariantEntry {
    fn link(&self, link: Link) -> usize {
        self.links[link as usize]
    }
}

/// All variants of one routine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutineVariants {
    routine: String,
    aliasable: bool,
    entries: [Option<VariantEntry>; 8],
}

impl RoutineVariants {
    pub fn new(signature: &RoutineSignature) -> Self {
        let routine = signature.name().to_string();
        let aliasable = signature.alias_eligible();
        let entries = std::array::from_fn(|slot| {
            let variant = Variant::from_slot(slot);
            if variant.key.alias_mode == AliasMode::Aliased && !aliasable {
                return None;
            }
            let links = [
                variant.with_error_mode(ErrorMode::Raise).slot(),
                variant.with_error_mode(ErrorMode::Flag).slot(),
                variant.with_vectorized(true).slot(),
                variant.with_vectorized(false).slot(),
            ];
            Some(VariantEntry {
                variant,
                symbol: variant.symbol(&routine),
                links,
            })
        });
        Self {
            routine,
            aliasable,
            entries,
        }
    }

    pub fn routine(&self) -> &str {
        &self.routine
    }

    /// True when the aliased half of the lattice exists.
    pub fn aliasable(&self) -> bool {
        self.aliasable
    }

    pub fn get(&self, variant: Variant) -> Option<&VariantEntry> {
        self.entries[variant.slot()].as_ref()
    }

    /// Neighbour of `variant` along one axis.
    ///
    /// `select` reaches explicit suffixes through these links; callers can
    /// use them to step from a variant they hold.
    pub fn follow(&self, variant: Variant, link: Link) -> Option<&VariantEntry> {
        let entry = self.get(variant)?;
        self.entries[entry.link(link)].as_ref()
    }

    pub fn entries(&self) -> impl Iterator<Item = &VariantEntry> {
        self.entries.iter().flatten()
    }

    /// Variant a caller gets for a request under the current binding.
    ///
    /// Axes left open by the request take the bound mode. A bound aliased
    /// mode falls back to literal for routines without identifier inputs.
    pub fn select(&self, request: VariantRequest, bound: VariantKey) -> Result<&VariantEntry> {
        let alias_mode = match request.alias_mode {
            Some(AliasMode::Aliased) if !self.aliasable => {
                return Err(DispatchError::UnknownVariant {
                    symbol: format!("{}_aliased", self.routine),
                });
            }
            Some(mode) => mode,
            None if self.aliasable => bound.alias_mode,
            None => AliasMode::Literal,
        };
        let base = Variant::new(VariantKey::new(bound.error_mode, alias_mode), false);
        let mut entry = self.get(base).ok_or_else(|| DispatchError::UnknownVariant {
            symbol: base.symbol(&self.routine),
        })?;
        if let Some(mode) = request.error_mode {
            let link = match mode {
                ErrorMode::Raise => Link::Error,
                ErrorMode::Flag => Link::Flag,
            };
            entry = self.step(entry, link)?;
        }
        if request.vectorized {
            entry = self.step(entry, Link::Vector)?;
        }
        Ok(entry)
    }

    fn step(&self, entry: &VariantEntry, link: Link) -> Result<&VariantEntry> {
        self.follow(entry.variant, link)
            .ok_or_else(|| DispatchError::UnknownVariant {
                symbol: entry.variant.symbol(&self.routine),
            })
    }
}

/// Axes fixed by a caller symbol; `None` means "use the binding".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VariantRequest {
    pub error_mode: Option<ErrorMode>,
    pub alias_mode: Option<AliasMode>,
    pub vectorized: bool,
}

const SUFFIXES: [&str; 5] = ["_error", "_flag", "_aliased", "_noaliases", "_vector"];

impl VariantRequest {
    fn apply(&mut self, suffix: &str) -> bool {
        match suffix {
            "_error" if self.error_mode.is_none() => self.error_mode = Some(ErrorMode::Raise),
            "_flag" if self.error_mode.is_none() => self.error_mode = Some(ErrorMode::Flag),
            "_aliased" if self.alias_mode.is_none() => self.alias_mode = Some(AliasMode::Aliased),
            "_noaliases" if self.alias_mode.is_none() => {
                self.alias_mode = Some(AliasMode::Literal)
            }
            "_vector" if !self.vectorized => self.vectorized = true,
            _ => return false,
        }
        true
    }
}

/// Variants of every registered routine.
#[derive(Debug, Clone, Default)]
pub struct VariantTable {
    routines: BTreeMap<String, RoutineVariants>,
}

impl VariantTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, signature: &RoutineSignature) -> &RoutineVariants {
        let variants = RoutineVariants::new(signature);
        self.routines
            .entry(variants.routine.clone())
            .or_insert(variants)
    }

    pub fn get(&self, routine: &str) -> Option<&RoutineVariants> {
        self.routines.get(routine)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RoutineVariants> {
        self.routines.values()
    }

    /// Splits a caller symbol into routine name and requested axes.
    ///
    /// Suffixes are peeled from the right in any order; each axis may be
    /// fixed once. A registered routine whose own name ends in a suffix is
    /// matched before any peeling.
    pub fn parse_symbol(&self, symbol: &str) -> Result<(&RoutineVariants, VariantRequest)> {
        let unknown = || DispatchError::UnknownVariant {
            symbol: symbol.to_string(),
        };
        let mut name = canonical_symbol(symbol);
        let mut request = VariantRequest::default();
        loop {
            if let Some(variants) = self.routines.get(&name) {
                return Ok((variants, request));
            }
            let suffix = SUFFIXES
                .iter()
                .find(|suffix| name.len() > suffix.len() && name.ends_with(*suffix))
                .ok_or_else(|| {
                    if request == VariantRequest::default() {
                        DispatchError::UnknownRoutine {
                            name: symbol.to_string(),
                        }
                    } else {
                        unknown()
                    }
                })?;
            if !request.apply(suffix) {
                return Err(unknown());
            }
            name.truncate(name.len() - suffix.len());
        }
    }
}

/// Error and alias modes currently bound to each routine.
///
/// A routine-level override beats the process-wide default. Setting a mode
/// for every routine resets the overrides on that axis, so it also reaches
/// routines registered later.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    default: VariantKey,
    error_overrides: HashMap<String, ErrorMode>,
    alias_overrides: HashMap<String, AliasMode>,
}

impl Bindings {
    pub fn new(default: VariantKey) -> Self {
        Self {
            default,
            ..Self::default()
        }
    }

    pub fn default_key(&self) -> VariantKey {
        self.default
    }

    /// Mode pair in force for `routine`.
    pub fn bound(&self, routine: &str) -> VariantKey {
        VariantKey {
            error_mode: self
                .error_overrides
                .get(routine)
                .copied()
                .unwrap_or(self.default.error_mode),
            alias_mode: self
                .alias_overrides
                .get(routine)
                .copied()
                .unwrap_or(self.default.alias_mode),
        }
    }

    /// Binds `mode` to the named routines, or to all of them when empty.
    pub fn set_error_mode(&mut self, mode: ErrorMode, routines: &[String]) {
        if routines.is_empty() {
            self.default.error_mode = mode;
            self.error_overrides.clear();
        } else {
            for routine in routines {
                self.error_overrides.insert(routine.clone(), mode);
            }
        }
    }

    pub fn set_alias_mode(&mut self, mode: AliasMode, routines: &[String]) {
        if routines.is_empty() {
            self.default.alias_mode = mode;
            self.alias_overrides.clear();
        } else {
            for routine in routines {
                self.alias_overrides.insert(routine.clone(), mode);
            }
        }
    }

    pub fn reset(&mut self, default: VariantKey) {
        self.default = default;
        self.error_overrides.clear();
        self.alias_overrides.clear();
    }
}
