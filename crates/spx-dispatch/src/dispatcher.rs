//! The dispatcher.
//!
//! Owns every piece of mutable dispatch state: the native library and its
//! error state, alias tables, variant bindings and the last alias choices.
//! A call resolves its caller symbol to a variant, coerces the arguments,
//! runs the alias search and broadcast where needed, and finally applies the
//! variant's error mode to the found-flag.

use std::collections::HashMap;
use std::sync::Arc;

use spx_compat::{BridgeError, NativeLibrary, canonical_symbol};
use spx_model::Value;
use tracing::{debug, trace};

use crate::alias::{AliasDomain, AliasGroup, AliasResolver, Identifier, search_candidates};
use crate::broadcast::{BroadcastPlan, broadcast_call};
use crate::coerce::{CallArgs, CoercionRequest, CoercionTable, ProcessedArg, coerce};
use crate::config::{AliasMode, Coercion, DispatchConfig, ErrorMode};
use crate::error::{DispatchError, Result};
use crate::signature::{RoutineSignature, SignatureRegistry};
use crate::table::SignatureTable;
use crate::variants::{Bindings, Variant, VariantEntry, VariantKey, VariantRequest, VariantTable};

/// Identifier that won an alias search for one argument.
#[derive(Debug, Clone, PartialEq)]
pub struct AliasChoice {
    /// Input position of the aliased argument
    pub index: usize,
    pub value: Value,
    /// Position of `value` in the candidate list
    pub rank: usize,
}

pub struct Dispatcher {
    config: DispatchConfig,
    registry: SignatureRegistry,
    variants: VariantTable,
    bindings: Bindings,
    aliases: AliasResolver,
    coercion: CoercionTable,
    native: NativeLibrary,
    alias_choices: HashMap<String, Vec<AliasChoice>>,
}

impl Dispatcher {
    pub fn new(native: NativeLibrary) -> Self {
        Self::with_config(native, DispatchConfig::default())
    }

    pub fn with_config(native: NativeLibrary, config: DispatchConfig) -> Self {
        Self {
            bindings: Bindings::new(VariantKey::new(config.error_mode, config.alias_mode)),
            config,
            registry: SignatureRegistry::new(),
            variants: VariantTable::new(),
            aliases: AliasResolver::new(),
            coercion: CoercionTable::new(),
            native,
            alias_choices: HashMap::new(),
        }
    }

    /// Registers a routine whose native symbol is already in the library.
    ///
    /// The native arity and output count must agree with the signature.
    pub fn register(&mut self, signature: RoutineSignature) -> Result<Arc<RoutineSignature>> {
        let spec = self
            .native
            .spec(signature.native_symbol())
            .ok_or_else(|| {
                DispatchError::Bridge(BridgeError::RoutineNotRegistered {
                    symbol: signature.native_symbol().to_string(),
                })
            })?;
        if spec.expected_args != signature.inputs().len()
            || spec.expected_outputs != signature.outputs().len()
        {
            return Err(DispatchError::InvalidSignature {
                routine: signature.name().to_string(),
                reason: format!(
                    "native routine {} takes {} inputs and returns {} outputs, signature declares {} and {}",
                    spec.symbol,
                    spec.expected_args,
                    spec.expected_outputs,
                    signature.inputs().len(),
                    signature.outputs().len()
                ),
            });
        }

        let signature = self.registry.register(signature)?;
        let variants = self.variants.insert(&signature);
        debug!(
            routine = signature.name(),
            variants = variants.entries().count(),
            "registered routine"
        );
        Ok(signature)
    }

    /// Registers every routine of a signature table, in table order.
    pub fn register_table(&mut self, table: &SignatureTable) -> Result<Vec<Arc<RoutineSignature>>> {
        table
            .signatures()?
            .into_iter()
            .map(|signature| self.register(signature))
            .collect()
    }

    pub fn register_table_json(&mut self, raw: &str) -> Result<Vec<Arc<RoutineSignature>>> {
        self.register_table(&SignatureTable::from_json_str(raw)?)
    }

    /// Calls a routine through a caller symbol such as `bodvcd_vector_error`.
    pub fn call(&mut self, symbol: &str, args: impl Into<CallArgs>) -> Result<Vec<Value>> {
        let (routine, variant) = self.resolve_symbol(symbol)?;
        self.call_variant(&routine, variant, args)
    }

    /// Routine name and variant a caller symbol denotes right now.
    pub fn resolve_symbol(&self, symbol: &str) -> Result<(String, Variant)> {
        let (variants, request) = self.variants.parse_symbol(symbol)?;
        let bound = self.bindings.bound(variants.routine());
        let entry = variants.select(request, bound)?;
        Ok((variants.routine().to_string(), entry.variant))
    }

    pub fn call_variant(
        &mut self,
        routine: &str,
        variant: Variant,
        args: impl Into<CallArgs>,
    ) -> Result<Vec<Value>> {
        let signature = Arc::clone(self.registry.lookup(routine)?);
        let exists = self
            .variants
            .get(signature.name())
            .and_then(|variants| variants.get(variant))
            .is_some();
        if !exists {
            return Err(DispatchError::UnknownVariant {
                symbol: variant.symbol(signature.name()),
            });
        }

        let request = CoercionRequest {
            level: self.config.coercion,
            alias_mode: variant.key.alias_mode,
            vectorized: variant.vectorized,
        };
        let processed = coerce(
            &signature,
            args.into(),
            request,
            &self.coercion,
            &self.aliases,
        )?;
        trace!(routine = signature.name(), variant = %variant, "dispatch");

        if processed
            .iter()
            .any(|arg| matches!(arg, ProcessedArg::Aliases { .. }))
        {
            self.alias_choices.remove(signature.name());
        }

        let flag_mode = variant.key.error_mode == ErrorMode::Flag;
        let outputs = self.execute(&signature, processed, flag_mode)?;
        finish(&signature, variant.key.error_mode, outputs)
    }

    /// Runs coerced arguments, expanding alias candidates first.
    fn execute(
        &mut self,
        signature: &RoutineSignature,
        args: Vec<ProcessedArg>,
        flag_mode: bool,
    ) -> Result<Vec<Value>> {
        match args
            .iter()
            .position(|arg| matches!(arg, ProcessedArg::Aliases { .. }))
        {
            Some(position) => self.search_aliases(signature, args, position, flag_mode),
            None => self.run_literal(signature, &args, flag_mode),
        }
    }

    /// Tries the candidates of one aliased argument in priority order.
    ///
    /// Later aliased arguments are searched inside each attempt. Attempts
    /// never convert failures to flags, so a false found-flag or an unknown
    /// identifier moves the search on; only the last candidate's failure is
    /// reported, as a flag in flag mode.
    fn search_aliases(
        &mut self,
        signature: &RoutineSignature,
        args: Vec<ProcessedArg>,
        position: usize,
        flag_mode: bool,
    ) -> Result<Vec<Value>> {
        let routine = signature.name();
        let candidates = match &args[position] {
            ProcessedArg::Aliases { candidates, .. } => candidates.clone(),
            _ => Vec::new(),
        };

        let outcome = search_candidates(routine, position, &candidates, |candidate| {
            let mut attempt = args.clone();
            attempt[position] = ProcessedArg::Value(candidate.clone());
            let outputs = self.execute(signature, attempt, false)?;
            if found(signature, &outputs) {
                Ok(outputs)
            } else {
                Err(DispatchError::NotFound {
                    routine: routine.to_string(),
                })
            }
        });

        match outcome {
            Ok((outputs, rank)) => {
                let value = candidates[rank].clone();
                trace!(routine, index = position, %value, rank, "alias candidate accepted");
                let choices = self.alias_choices.entry(routine.to_string()).or_default();
                choices.retain(|choice| choice.index != position);
                choices.push(AliasChoice {
                    index: position,
                    value,
                    rank,
                });
                choices.sort_by_key(|choice| choice.index);
                Ok(outputs)
            }
            Err(err) if flag_mode && signature.has_found_flag() && err.is_not_found() => {
                Ok(signature.not_found_outputs())
            }
            Err(err) => Err(err),
        }
    }

    /// Calls the native routine directly or once per broadcast element.
    fn run_literal(
        &mut self,
        signature: &RoutineSignature,
        args: &[ProcessedArg],
        convert_not_found: bool,
    ) -> Result<Vec<Value>> {
        match BroadcastPlan::build(signature.name(), args)? {
            Some(plan) => broadcast_call(
                signature.name(),
                &plan,
                args,
                signature.outputs(),
                |scalars| self.invoke_element(signature, scalars, convert_not_found),
            ),
            None => {
                let mut values = Vec::with_capacity(args.len());
                for (index, arg) in args.iter().enumerate() {
                    let value = arg.as_value().cloned().ok_or_else(|| {
                        DispatchError::UnresolvedIdentifier {
                            routine: signature.name().to_string(),
                            index,
                            identifier: "<deferred argument>".to_string(),
                        }
                    })?;
                    values.push(value);
                }
                self.invoke_native(signature, values, convert_not_found)
            }
        }
    }

    fn invoke_native(
        &mut self,
        signature: &RoutineSignature,
        args: Vec<Value>,
        convert_not_found: bool,
    ) -> Result<Vec<Value>> {
        Ok(self
            .invoke_element(signature, args, convert_not_found)?
            .unwrap_or_else(|| signature.not_found_outputs()))
    }

    /// One native call; `None` when a not-found failure is reported as a flag.
    fn invoke_element(
        &mut self,
        signature: &RoutineSignature,
        args: Vec<Value>,
        convert_not_found: bool,
    ) -> Result<Option<Vec<Value>>> {
        match self.native.invoke(signature.native_symbol(), &args) {
            Ok(outputs) => Ok(Some(outputs)),
            Err(BridgeError::Failed(error))
                if convert_not_found && signature.has_found_flag() && error.is_not_found() =>
            {
                trace!(routine = signature.name(), short = %error.short, "native failure reported as not found");
                Ok(None)
            }
            Err(BridgeError::Failed(error)) => Err(DispatchError::Native {
                routine: signature.name().to_string(),
                error,
            }),
            Err(other) => Err(DispatchError::Bridge(other)),
        }
    }

    fn canonical_names(&self, routines: &[&str]) -> Result<Vec<String>> {
        routines
            .iter()
            .map(|name| self.registry.lookup(name).map(|sig| sig.name().to_string()))
            .collect()
    }

    /// Raise mode for the named routines, or for all of them when empty.
    pub fn use_errors(&mut self, routines: &[&str]) -> Result<()> {
        let names = self.canonical_names(routines)?;
        self.bindings.set_error_mode(ErrorMode::Raise, &names);
        debug!(routines = ?names, "raise mode bound");
        Ok(())
    }

    pub fn use_flags(&mut self, routines: &[&str]) -> Result<()> {
        let names = self.canonical_names(routines)?;
        self.bindings.set_error_mode(ErrorMode::Flag, &names);
        debug!(routines = ?names, "flag mode bound");
        Ok(())
    }

    pub fn use_aliases(&mut self, routines: &[&str]) -> Result<()> {
        let names = self.canonical_names(routines)?;
        self.bindings.set_alias_mode(AliasMode::Aliased, &names);
        debug!(routines = ?names, "aliased mode bound");
        Ok(())
    }

    pub fn use_noaliases(&mut self, routines: &[&str]) -> Result<()> {
        let names = self.canonical_names(routines)?;
        self.bindings.set_alias_mode(AliasMode::Literal, &names);
        debug!(routines = ?names, "literal mode bound");
        Ok(())
    }

    pub fn set_coercion(&mut self, level: Coercion) {
        debug!(level = level.name(), "coercion level set");
        self.config.coercion = level;
    }

    pub fn coercion(&self) -> Coercion {
        self.config.coercion
    }

    /// Mode pair a plain call of `routine` currently uses.
    pub fn apply_default(&self, routine: &str) -> Result<VariantKey> {
        Ok(self.current_variant(routine)?.variant.key)
    }

    /// Scalar variant a plain call of `routine` currently reaches.
    pub fn current_variant(&self, routine: &str) -> Result<&VariantEntry> {
        let name = canonical_symbol(routine);
        let variants = self
            .variants
            .get(&name)
            .ok_or_else(|| DispatchError::UnknownRoutine {
                name: routine.to_string(),
            })?;
        variants.select(VariantRequest::default(), self.bindings.bound(&name))
    }

    /// Every variant symbol registered for `routine`.
    pub fn variant_names(&self, routine: &str) -> Result<Vec<String>> {
        let name = canonical_symbol(routine);
        let variants = self
            .variants
            .get(&name)
            .ok_or_else(|| DispatchError::UnknownRoutine {
                name: routine.to_string(),
            })?;
        Ok(variants.entries().map(|entry| entry.symbol.clone()).collect())
    }

    pub fn define_body_aliases(&mut self, identifiers: &[Identifier]) -> Option<Arc<AliasGroup>> {
        self.aliases.define(AliasDomain::Body, identifiers)
    }

    pub fn define_frame_aliases(&mut self, identifiers: &[Identifier]) -> Option<Arc<AliasGroup>> {
        self.aliases.define(AliasDomain::Frame, identifiers)
    }

    pub fn body_aliases(&self, identifier: &Identifier) -> Arc<AliasGroup> {
        self.aliases.resolve(AliasDomain::Body, identifier)
    }

    pub fn frame_aliases(&self, identifier: &Identifier) -> Arc<AliasGroup> {
        self.aliases.resolve(AliasDomain::Frame, identifier)
    }

    pub fn aliases(&self) -> &AliasResolver {
        &self.aliases
    }

    pub fn aliases_mut(&mut self) -> &mut AliasResolver {
        &mut self.aliases
    }

    /// Winning identifiers of the last successful alias search of `routine`.
    pub fn last_alias_choice(&self, routine: &str) -> Option<&[AliasChoice]> {
        self.alias_choices
            .get(&canonical_symbol(routine))
            .map(Vec::as_slice)
    }

    pub fn signature(&self, routine: &str) -> Result<&Arc<RoutineSignature>> {
        self.registry.lookup(routine)
    }

    pub fn registry(&self) -> &SignatureRegistry {
        &self.registry
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn coercion_table_mut(&mut self) -> &mut CoercionTable {
        &mut self.coercion
    }

    pub fn native(&self) -> &NativeLibrary {
        &self.native
    }

    pub fn native_mut(&mut self) -> &mut NativeLibrary {
        &mut self.native
    }

    /// Clears aliases, bindings, alias choices and the native error state.
    ///
    /// Registered routines and the coercion level are kept.
    pub fn reset(&mut self) {
        self.native.reset();
        self.aliases.reset();
        self.bindings.reset(VariantKey::new(
            self.config.error_mode,
            self.config.alias_mode,
        ));
        self.alias_choices.clear();
        debug!("dispatcher reset");
    }
}

/// False when the routine's found-flag (or any element of it) is false.
fn found(signature: &RoutineSignature, outputs: &[Value]) -> bool {
    if !signature.has_found_flag() {
        return true;
    }
    match outputs.last() {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Array(flags)) => flags
            .as_bools()
            .is_none_or(|flags| flags.iter().all(|flag| *flag)),
        _ => true,
    }
}

/// Applies the error mode to a routine's raw outputs.
fn finish(signature: &RoutineSignature, mode: ErrorMode, mut outputs: Vec<Value>) -> Result<Vec<Value>> {
    if !signature.has_found_flag() || mode == ErrorMode::Flag {
        return Ok(outputs);
    }
    if !found(signature, &outputs) {
        return Err(DispatchError::NotFound {
            routine: signature.name().to_string(),
        });
    }
    outputs.pop();
    Ok(outputs)
}
