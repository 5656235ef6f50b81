//! Argument coercion.
//!
//! Raw call arguments are bound to a routine's declared inputs, completed
//! with defaults and passed through one rule per argument. The rule is
//! picked from a [`CoercionTable`] keyed by the input's tag kind and the
//! active [`Coercion`] level. Aliased and vectorized variants then mark
//! arguments that the dispatcher or the broadcast engine must expand.

use std::collections::HashMap;

use spx_model::{NdArray, TagKind, TypeTag, Value};
use tracing::trace;

use crate::alias::{AliasDomain, AliasResolver, Identifier, IdentifierForm};
use crate::config::{AliasMode, Coercion};
use crate::error::{DispatchError, Result};
use crate::signature::RoutineSignature;

/// Positional and keyword arguments of one call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    positional: Vec<Value>,
    keywords: Vec<(String, Value)>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    pub fn keyword(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.keywords.push((name.to_string(), value.into()));
        self
    }

    pub fn positional(&self) -> &[Value] {
        &self.positional
    }

    pub fn keywords(&self) -> &[(String, Value)] {
        &self.keywords
    }

    pub fn len(&self) -> usize {
        self.positional.len() + self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<Value>> for CallArgs {
    fn from(positional: Vec<Value>) -> Self {
        Self {
            positional,
            keywords: Vec::new(),
        }
    }
}

impl From<&[Value]> for CallArgs {
    fn from(positional: &[Value]) -> Self {
        Self::from(positional.to_vec())
    }
}

/// One coerced input.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessedArg {
    /// Ready to pass to the native routine
    Value(Value),
    /// Equivalent identifiers to try in priority order
    Aliases {
        domain: AliasDomain,
        candidates: Vec<Value>,
    },
    /// Array with leading axes in front of `core_rank` trailing core axes
    Extended { array: NdArray, core_rank: usize },
}

impl ProcessedArg {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            ProcessedArg::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_deferred(&self) -> bool {
        !matches!(self, ProcessedArg::Value(_))
    }
}

/// What a rule knows about the argument it is coercing.
#[derive(Debug, Clone, Copy)]
pub struct CoercionContext<'a> {
    pub routine: &'a str,
    pub index: usize,
    pub tag: &'a TypeTag,
    pub aliases: &'a AliasResolver,
    /// Arrays may carry axes in front of the declared core shape
    pub leading_allowed: bool,
}

impl CoercionContext<'_> {
    fn mismatch(&self, value: &Value) -> DispatchError {
        DispatchError::TypeMismatch {
            routine: self.routine.to_string(),
            index: self.index,
            expected: self.tag.clone(),
            found: describe(value),
        }
    }

    fn conversion_failure(&self, value: &Value) -> DispatchError {
        DispatchError::ConversionFailure {
            routine: self.routine.to_string(),
            index: self.index,
            target: self.tag.clone(),
            value: value.to_string(),
        }
    }

    fn unresolved(&self, identifier: &Value) -> DispatchError {
        DispatchError::UnresolvedIdentifier {
            routine: self.routine.to_string(),
            index: self.index,
            identifier: identifier.to_string(),
        }
    }

    fn domain(&self) -> AliasDomain {
        if self.tag.is_frame() {
            AliasDomain::Frame
        } else {
            AliasDomain::Body
        }
    }

    fn scalar(&self) -> Self {
        Self {
            leading_allowed: false,
            ..*self
        }
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Array(_) => value.to_string(),
        other => other.type_name().to_string(),
    }
}

pub type CoercionRule = fn(Value, &CoercionContext<'_>) -> Result<Value>;

const TAG_KINDS: [TagKind; 9] = [
    TagKind::Int,
    TagKind::Float,
    TagKind::Bool,
    TagKind::String,
    TagKind::BodyCode,
    TagKind::BodyName,
    TagKind::FrameCode,
    TagKind::FrameName,
    TagKind::Array,
];

/// Rule per (tag kind, level), filled once at construction.
#[derive(Debug, Clone)]
pub struct CoercionTable {
    rules: HashMap<(TagKind, Coercion), CoercionRule>,
}

impl Default for CoercionTable {
    fn default() -> Self {
        Self::new()
    }
}

impl CoercionTable {
    pub fn new() -> Self {
        let mut rules: HashMap<(TagKind, Coercion), CoercionRule> = HashMap::new();
        for kind in TAG_KINDS {
            let array = kind == TagKind::Array;
            rules.insert((kind, Coercion::None), identity);
            let (check, convert): (CoercionRule, CoercionRule) = if array {
                (check_array, convert_array)
            } else {
                (check_scalar, convert_scalar)
            };
            rules.insert((kind, Coercion::Check), check);
            rules.insert((kind, Coercion::Convert), convert);
            let translate: CoercionRule = match kind {
                TagKind::BodyCode | TagKind::FrameCode => translate_code,
                TagKind::BodyName | TagKind::FrameName => translate_name,
                TagKind::Array => convert_array,
                _ => convert_scalar,
            };
            rules.insert((kind, Coercion::Translate), translate);
        }
        Self { rules }
    }

    pub fn rule(&self, kind: TagKind, level: Coercion) -> CoercionRule {
        self.rules.get(&(kind, level)).copied().unwrap_or(identity)
    }

    /// Replaces one rule, e.g. to make a tag stricter than the default.
    pub fn set_rule(&mut self, kind: TagKind, level: Coercion, rule: CoercionRule) {
        self.rules.insert((kind, level), rule);
    }

    pub fn apply(&self, level: Coercion, value: Value, ctx: &CoercionContext<'_>) -> Result<Value> {
        (self.rule(ctx.tag.kind(), level))(value, ctx)
    }
}

fn identity(value: Value, _ctx: &CoercionContext<'_>) -> Result<Value> {
    Ok(value)
}

/// Applies a scalar rule to every element of an array argument.
fn map_elements(
    array: &NdArray,
    ctx: &CoercionContext<'_>,
    rule: CoercionRule,
) -> Result<Value> {
    let scalar_ctx = ctx.scalar();
    let mut parts = Vec::with_capacity(array.len());
    for flat in 0..array.len() {
        if let Some(element) = array.element(flat) {
            parts.push(rule(element, &scalar_ctx)?);
        }
    }
    let kind = parts
        .first()
        .map(Value::element_kind)
        .unwrap_or_else(|| ctx.tag.element_kind());
    Ok(Value::Array(NdArray::stack(array.shape(), kind, &[], &parts)?))
}

/// Arrays only reach a scalar rule on vectorized calls.
fn elementwise(value: &Value, ctx: &CoercionContext<'_>, rule: CoercionRule) -> Option<Result<Value>> {
    let Value::Array(array) = value else {
        return None;
    };
    Some(if ctx.leading_allowed {
        map_elements(array, ctx, rule)
    } else {
        Err(ctx.mismatch(value))
    })
}

fn check_scalar(value: Value, ctx: &CoercionContext<'_>) -> Result<Value> {
    if let Some(result) = elementwise(&value, ctx, check_scalar) {
        return result;
    }
    if value.element_kind() == ctx.tag.element_kind() {
        Ok(value)
    } else {
        Err(ctx.mismatch(&value))
    }
}

fn convert_scalar(value: Value, ctx: &CoercionContext<'_>) -> Result<Value> {
    if let Some(result) = elementwise(&value, ctx, convert_scalar) {
        return result;
    }
    value
        .cast(ctx.tag.element_kind())
        .ok_or_else(|| ctx.conversion_failure(&value))
}

/// Verifies an array's trailing axes against the declared core shape.
fn check_core_shape(array: &NdArray, ctx: &CoercionContext<'_>) -> Result<()> {
    let core = ctx.tag.core_shape();
    let rank = array.rank();
    let fits = if ctx.leading_allowed {
        rank >= core.rank() && core.matches(&array.shape()[rank - core.rank()..])
    } else {
        core.matches(array.shape())
    };
    if fits {
        Ok(())
    } else {
        Err(ctx.mismatch(&Value::Array(array.clone())))
    }
}

fn check_array(value: Value, ctx: &CoercionContext<'_>) -> Result<Value> {
    let Value::Array(array) = &value else {
        return Err(ctx.mismatch(&value));
    };
    check_core_shape(array, ctx)?;
    if array.kind() != ctx.tag.element_kind() {
        return Err(ctx.mismatch(&value));
    }
    Ok(value)
}

fn convert_array(value: Value, ctx: &CoercionContext<'_>) -> Result<Value> {
    let Value::Array(array) = &value else {
        return Err(ctx.mismatch(&value));
    };
    check_core_shape(array, ctx)?;
    array
        .cast(ctx.tag.element_kind())
        .map(Value::Array)
        .ok_or_else(|| ctx.conversion_failure(&value))
}

/// Codes pass through, numeric strings are codes, names are looked up.
fn translate_code(value: Value, ctx: &CoercionContext<'_>) -> Result<Value> {
    if let Some(result) = elementwise(&value, ctx, translate_code) {
        return result;
    }
    match value {
        Value::Str(name) => {
            if let Ok(code) = name.trim().parse::<i64>() {
                return Ok(Value::Int(code));
            }
            ctx.aliases
                .table(ctx.domain())
                .code_for_name(&name)
                .map(Value::Int)
                .ok_or_else(|| ctx.unresolved(&Value::Str(name)))
        }
        other => convert_scalar(other, ctx),
    }
}

/// Names pass through, codes are looked up.
fn translate_name(value: Value, ctx: &CoercionContext<'_>) -> Result<Value> {
    if let Some(result) = elementwise(&value, ctx, translate_name) {
        return result;
    }
    match value {
        Value::Str(_) => Ok(value),
        Value::Int(code) => ctx
            .aliases
            .table(ctx.domain())
            .name_for_code(code)
            .map(Value::from)
            .ok_or_else(|| ctx.unresolved(&value)),
        other => Err(ctx.conversion_failure(&other)),
    }
}

/// Selects the coercion behaviour of one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoercionRequest {
    pub level: Coercion,
    pub alias_mode: AliasMode,
    pub vectorized: bool,
}

/// Binds positional then keyword arguments to declared inputs.
fn bind(signature: &RoutineSignature, args: CallArgs) -> Result<Vec<Option<Value>>> {
    let routine = signature.name();
    let inputs = signature.inputs();
    if args.positional.len() > inputs.len() {
        return Err(DispatchError::TooManyArguments {
            routine: routine.to_string(),
            expected: inputs.len(),
            got: args.positional.len(),
        });
    }

    let mut slots: Vec<Option<Value>> = vec![None; inputs.len()];
    for (slot, value) in slots.iter_mut().zip(args.positional) {
        *slot = Some(value);
    }
    for (keyword, value) in args.keywords {
        let index =
            signature
                .input_index(&keyword)
                .ok_or_else(|| DispatchError::UnknownKeyword {
                    routine: routine.to_string(),
                    keyword: keyword.clone(),
                })?;
        if slots[index].is_some() {
            return Err(DispatchError::DuplicateArgument {
                routine: routine.to_string(),
                index,
                name: inputs[index].name.clone(),
            });
        }
        slots[index] = Some(value);
    }
    Ok(slots)
}

/// Coerces a call's arguments for one routine.
///
/// Errors name the routine and, for per-argument failures, the input index.
/// The native routine is never involved; the alias tables are only read.
pub fn coerce(
    signature: &RoutineSignature,
    args: CallArgs,
    request: CoercionRequest,
    table: &CoercionTable,
    aliases: &AliasResolver,
) -> Result<Vec<ProcessedArg>> {
    let routine = signature.name();
    let slots = bind(signature, args)?;

    let mut processed = Vec::with_capacity(slots.len());
    for (index, (slot, input)) in slots.into_iter().zip(signature.inputs()).enumerate() {
        let raw = match slot {
            Some(value) => value,
            None => signature.default_for(index).cloned().ok_or_else(|| {
                DispatchError::MissingArgument {
                    routine: routine.to_string(),
                    index,
                    name: input.name.clone(),
                }
            })?,
        };

        let ctx = CoercionContext {
            routine,
            index,
            tag: &input.tag,
            aliases,
            leading_allowed: request.vectorized,
        };
        let value = table.apply(request.level, raw, &ctx)?;

        let core_rank = input.tag.core_rank();
        let value = match value {
            Value::Array(array) if request.vectorized && array.rank() > core_rank => {
                let core = input.tag.core_shape();
                if !core.matches(&array.shape()[array.rank() - core_rank..]) {
                    return Err(ctx.mismatch(&Value::Array(array)));
                }
                trace!(routine, index, shape = ?array.shape(), core_rank, "extended argument");
                processed.push(ProcessedArg::Extended { array, core_rank });
                continue;
            }
            other => other,
        };

        if request.alias_mode == AliasMode::Aliased
            && input.tag.is_identifier()
            && let Some(identifier) = Identifier::from_value(&value)
        {
            let form = match input.tag {
                TypeTag::BodyName | TypeTag::FrameName => IdentifierForm::Name,
                _ => IdentifierForm::Code,
            };
            let domain = ctx.domain();
            let candidates = aliases.candidates(domain, &identifier, form);
            if candidates.len() > 1 {
                trace!(routine, index, count = candidates.len(), "alias candidates");
                processed.push(ProcessedArg::Aliases {
                    domain,
                    candidates: candidates.iter().map(Identifier::to_value).collect(),
                });
                continue;
            }
        }

        processed.push(ProcessedArg::Value(value));
    }
    Ok(processed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use spx_model::ElementKind;

    fn request(level: Coercion) -> CoercionRequest {
        CoercionRequest {
            level,
            alias_mode: AliasMode::Literal,
            vectorized: false,
        }
    }

    fn rotate() -> RoutineSignature {
        RoutineSignature::builder("rotate")
            .input("angle", TypeTag::Float)
            .input_with_default("axis", TypeTag::Int, 3i64)
            .output("matrix", TypeTag::array(ElementKind::Float, vec![3, 3]))
            .build()
            .expect("valid signature")
    }

    fn bodvcd() -> RoutineSignature {
        RoutineSignature::builder("bodvcd")
            .input("body", TypeTag::BodyCode)
            .input("item", TypeTag::String)
            .output("values", TypeTag::array(ElementKind::Float, vec![0]))
            .build()
            .expect("valid signature")
    }

    fn run(
        sig: &RoutineSignature,
        args: impl Into<CallArgs>,
        request: CoercionRequest,
        aliases: &AliasResolver,
    ) -> Result<Vec<ProcessedArg>> {
        coerce(sig, args.into(), request, &CoercionTable::new(), aliases)
    }

    #[test]
    fn missing_trailing_argument_takes_default() {
        let aliases = AliasResolver::new();
        let out = run(&rotate(), vec![Value::Float(0.5)], request(Coercion::Check), &aliases)
            .expect("default fills axis");
        assert_eq!(
            out,
            vec![
                ProcessedArg::Value(Value::Float(0.5)),
                ProcessedArg::Value(Value::Int(3)),
            ]
        );

        let err = run(&rotate(), Vec::new(), request(Coercion::Check), &aliases)
            .expect_err("angle is required");
        assert!(matches!(err, DispatchError::MissingArgument { index: 0, .. }));
    }

    #[test]
    fn binding_errors() {
        let aliases = AliasResolver::new();
        let sig = rotate();
        let too_many = vec![Value::Float(0.5), Value::Int(1), Value::Int(2)];
        assert!(matches!(
            run(&sig, too_many, request(Coercion::None), &aliases),
            Err(DispatchError::TooManyArguments { expected: 2, got: 3, .. })
        ));

        let unknown = CallArgs::new().arg(0.5).keyword("spin", 1i64);
        assert!(matches!(
            run(&sig, unknown, request(Coercion::None), &aliases),
            Err(DispatchError::UnknownKeyword { keyword, .. }) if keyword == "spin"
        ));

        let twice = CallArgs::new().arg(0.5).keyword("ANGLE", 1.0);
        assert!(matches!(
            run(&sig, twice, request(Coercion::None), &aliases),
            Err(DispatchError::DuplicateArgument { index: 0, .. })
        ));
    }

    #[test]
    fn keywords_bind_by_name() {
        let aliases = AliasResolver::new();
        let args = CallArgs::new().keyword("axis", 1i64).keyword("angle", 2.0);
        let out = run(&rotate(), args, request(Coercion::Check), &aliases).expect("bound");
        assert_eq!(out[0], ProcessedArg::Value(Value::Float(2.0)));
        assert_eq!(out[1], ProcessedArg::Value(Value::Int(1)));
    }

    #[test]
    fn check_rejects_and_convert_casts() {
        let aliases = AliasResolver::new();
        let args = vec![Value::Int(1)];
        let err = run(&rotate(), args.clone(), request(Coercion::Check), &aliases)
            .expect_err("int is not float under check");
        assert_eq!(err.argument_index(), Some(0));
        assert!(matches!(err, DispatchError::TypeMismatch { .. }));

        let out = run(&rotate(), args, request(Coercion::Convert), &aliases).expect("converted");
        assert_eq!(out[0], ProcessedArg::Value(Value::Float(1.0)));

        let err = run(
            &rotate(),
            vec![Value::Float(1.0), Value::Float(2.5)],
            request(Coercion::Convert),
            &aliases,
        )
        .expect_err("2.5 is not an integer");
        assert!(matches!(err, DispatchError::ConversionFailure { index: 1, .. }));
    }

    #[test]
    fn none_level_passes_values_through() {
        let aliases = AliasResolver::new();
        let out = run(&rotate(), vec![Value::from("x")], request(Coercion::None), &aliases)
            .expect("no checks");
        assert_eq!(out[0], ProcessedArg::Value(Value::from("x")));
    }

    #[test]
    fn array_core_shape_is_checked() {
        let aliases = AliasResolver::new();
        let sig = RoutineSignature::builder("vnorm")
            .input("v", TypeTag::array(ElementKind::Float, vec![3]))
            .output("norm", TypeTag::Float)
            .build()
            .expect("valid signature");
        let short = Value::Array(NdArray::vector(vec![1.0, 2.0]));
        assert!(matches!(
            run(&sig, vec![short], request(Coercion::Check), &aliases),
            Err(DispatchError::TypeMismatch { .. })
        ));

        let ints = NdArray::from_i64(vec![3], vec![1, 2, 3]).expect("array");
        let out = run(&sig, vec![Value::Array(ints)], request(Coercion::Convert), &aliases)
            .expect("cast to float");
        assert_eq!(
            out[0],
            ProcessedArg::Value(Value::Array(NdArray::vector(vec![1.0, 2.0, 3.0])))
        );
    }

    #[test]
    fn translate_maps_names_to_codes() {
        let mut aliases = AliasResolver::new();
        aliases.define(AliasDomain::Body, &["EARTH".into(), 399.into()]);
        let args = vec![Value::from("earth"), Value::from("RADII")];
        let out = run(&bodvcd(), args, request(Coercion::Translate), &aliases).expect("known");
        assert_eq!(out[0], ProcessedArg::Value(Value::Int(399)));

        let numeric = vec![Value::from(" 499 "), Value::from("RADII")];
        let out = run(&bodvcd(), numeric, request(Coercion::Translate), &aliases).expect("numeric");
        assert_eq!(out[0], ProcessedArg::Value(Value::Int(499)));

        let unknown = vec![Value::from("VULCAN"), Value::from("RADII")];
        let err = run(&bodvcd(), unknown, request(Coercion::Translate), &aliases)
            .expect_err("no such body");
        assert!(matches!(err, DispatchError::UnresolvedIdentifier { index: 0, .. }));
    }

    #[test]
    fn aliased_requests_expand_identifier_groups() {
        let mut aliases = AliasResolver::new();
        aliases.define(AliasDomain::Body, &[553.into(), 55076.into()]);
        let request = CoercionRequest {
            level: Coercion::Translate,
            alias_mode: AliasMode::Aliased,
            vectorized: false,
        };
        let out = run(&bodvcd(), vec![Value::Int(55076), Value::from("RADII")], request, &aliases)
            .expect("coerced");
        assert_eq!(
            out[0],
            ProcessedArg::Aliases {
                domain: AliasDomain::Body,
                candidates: vec![Value::Int(553), Value::Int(55076)],
            }
        );
        assert_eq!(out[1], ProcessedArg::Value(Value::from("RADII")));

        let single = run(&bodvcd(), vec![Value::Int(399), Value::from("RADII")], request, &aliases)
            .expect("coerced");
        assert_eq!(single[0], ProcessedArg::Value(Value::Int(399)));
    }

    #[test]
    fn vectorized_requests_mark_extended_arrays() {
        let aliases = AliasResolver::new();
        let sig = RoutineSignature::builder("vnorm")
            .input("v", TypeTag::array(ElementKind::Float, vec![3]))
            .output("norm", TypeTag::Float)
            .build()
            .expect("valid signature");
        let stacked = NdArray::from_f64(vec![2, 3], vec![1.0; 6]).expect("array");
        let vector = CoercionRequest {
            level: Coercion::Check,
            alias_mode: AliasMode::Literal,
            vectorized: true,
        };
        let out = run(&sig, vec![Value::Array(stacked.clone())], vector, &aliases)
            .expect("leading axis allowed");
        assert_eq!(
            out[0],
            ProcessedArg::Extended {
                array: stacked.clone(),
                core_rank: 1
            }
        );

        let err = run(&sig, vec![Value::Array(stacked)], request(Coercion::Check), &aliases)
            .expect_err("scalar variant rejects leading axes");
        assert!(matches!(err, DispatchError::TypeMismatch { .. }));
    }

    #[test]
    fn vectorized_scalar_inputs_convert_element_wise() {
        let aliases = AliasResolver::new();
        let ints = NdArray::from_i64(vec![2], vec![1, 2]).expect("array");
        let vector = CoercionRequest {
            level: Coercion::Convert,
            alias_mode: AliasMode::Literal,
            vectorized: true,
        };
        let out = run(&rotate(), vec![Value::Array(ints)], vector, &aliases).expect("converted");
        assert_eq!(
            out[0],
            ProcessedArg::Extended {
                array: NdArray::vector(vec![1.0, 2.0]),
                core_rank: 0
            }
        );
        assert_eq!(out[1], ProcessedArg::Value(Value::Int(3)));
    }
}
