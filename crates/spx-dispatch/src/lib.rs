//! Dispatch layer over a native numeric library.
//!
//! This crate provides:
//! - **Signature registry**: declared inputs, outputs and defaults per routine,
//!   built in code or loaded from JSON signature tables
//! - **Coercion**: binding of positional/keyword arguments and per-type rules
//!   at four strictness levels
//! - **Alias resolution**: priority-ordered groups of equivalent body and
//!   frame codes and names, with a fallback search over the candidates
//! - **Broadcasting**: scalar routines applied over arrays with extra
//!   leading axes
//! - **Variants**: flag/raise × literal/aliased × scalar/vector callables
//!   selected by caller symbol and per-routine bindings
//!
//! # Example
//!
//! ```ignore
//! use spx_dispatch::{Dispatcher, DispatchConfig};
//!
//! let mut dispatcher = Dispatcher::with_config(library, DispatchConfig::default());
//! dispatcher.register_table_json(SIGNATURES)?;
//! dispatcher.use_errors(&["bodvcd"])?;
//! let radii = dispatcher.call("bodvcd", vec![399.into(), "RADII".into()])?;
//! ```

pub mod alias;
pub mod broadcast;
pub mod coerce;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod shared;
pub mod signature;
pub mod table;
pub mod variants;

pub use alias::{
    AliasDomain, AliasGroup, AliasResolver, AliasTable, Identifier, IdentifierForm,
    normalize_name, search_candidates,
};
pub use broadcast::{BroadcastOperand, BroadcastPlan, broadcast_call, broadcast_shapes};
pub use coerce::{
    CallArgs, CoercionContext, CoercionRequest, CoercionRule, CoercionTable, ProcessedArg, coerce,
};
pub use config::{AliasMode, Coercion, DispatchConfig, ErrorMode};
pub use dispatcher::{AliasChoice, Dispatcher};
pub use error::{DispatchError, Result};
pub use shared::SharedDispatcher;
pub use signature::{InputSpec, OutputSpec, RoutineSignature, SignatureBuilder, SignatureRegistry};
pub use table::{ArgumentEntry, RoutineEntry, SignatureTable, load_signature_table, value_from_json};
pub use variants::{
    Bindings, Link, RoutineVariants, Variant, VariantEntry, VariantKey, VariantRequest,
    VariantTable,
};
