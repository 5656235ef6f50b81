use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use spx_model::Value;
use tracing::trace;

use crate::error_state::{ErrorState, NativeError};
use crate::symbols::{canonical_symbol, native_symbol};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutineSpec {
    pub symbol: String,
    pub expected_args: usize,
    pub expected_outputs: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutineHandle {
    pub symbol: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    RoutineNotRegistered {
        symbol: String,
    },
    InvalidArgumentCount {
        symbol: String,
        expected: usize,
        got: usize,
    },
    InvalidOutputCount {
        symbol: String,
        expected: usize,
        got: usize,
    },
    Failed(NativeError),
}

impl Display for BridgeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            BridgeError::RoutineNotRegistered { symbol } => {
                write!(f, "routine not registered: {symbol}")
            }
            BridgeError::InvalidArgumentCount {
                symbol,
                expected,
                got,
            } => write!(
                f,
                "invalid argument count for {symbol}: expected {expected}, got {got}"
            ),
            BridgeError::InvalidOutputCount {
                symbol,
                expected,
                got,
            } => write!(
                f,
                "routine {symbol} produced {got} outputs, expected {expected}"
            ),
            BridgeError::Failed(err) => write!(f, "native failure: {err}"),
        }
    }
}

impl std::error::Error for BridgeError {}

/// An exported routine: fixed positional inputs in, positional outputs out,
/// failures signalled through the shared [`ErrorState`].
pub type NativeRoutine =
    Arc<dyn Fn(&[Value], &mut ErrorState) -> Vec<Value> + Send + Sync + 'static>;

/// The native library as seen by the dispatch layer.
#[derive(Default)]
pub struct NativeLibrary {
    routines: BTreeMap<String, (RoutineSpec, NativeRoutine)>,
    state: ErrorState,
    calls: u64,
}

impl NativeLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        symbol: &str,
        expected_args: usize,
        expected_outputs: usize,
        routine: NativeRoutine,
    ) -> RoutineHandle {
        let exported = native_symbol(symbol);
        let spec = RoutineSpec {
            symbol: exported.clone(),
            expected_args,
            expected_outputs,
        };
        self.routines.insert(exported.clone(), (spec, routine));
        RoutineHandle { symbol: exported }
    }

    pub fn spec(&self, symbol: &str) -> Option<&RoutineSpec> {
        self.routines
            .get(&native_symbol(symbol))
            .map(|entry| &entry.0)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.routines.contains_key(&native_symbol(symbol))
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.routines.keys().map(String::as_str)
    }

    /// Runs a routine and converts a signalled failure into an error.
    ///
    /// The error state is always clean when this returns.
    pub fn invoke(&mut self, symbol: &str, args: &[Value]) -> Result<Vec<Value>, BridgeError> {
        let exported = native_symbol(symbol);
        let (spec, routine) =
            self.routines
                .get(&exported)
                .ok_or_else(|| BridgeError::RoutineNotRegistered {
                    symbol: canonical_symbol(symbol),
                })?;

        if args.len() != spec.expected_args {
            return Err(BridgeError::InvalidArgumentCount {
                symbol: exported,
                expected: spec.expected_args,
                got: args.len(),
            });
        }

        // A failure left behind by an earlier caller must not leak into this call.
        if let Some(stale) = self.state.take() {
            trace!(symbol = %exported, short = %stale.short, "discarding stale native failure");
        }

        self.calls += 1;
        trace!(symbol = %exported, args = args.len(), "native invoke");
        self.state.check_in(&exported);
        let outputs = routine(args, &mut self.state);
        self.state.check_out();

        if let Some(err) = self.state.take() {
            return Err(BridgeError::Failed(err));
        }
        if outputs.len() != spec.expected_outputs {
            return Err(BridgeError::InvalidOutputCount {
                symbol: exported,
                expected: spec.expected_outputs,
                got: outputs.len(),
            });
        }
        Ok(outputs)
    }

    pub fn error_state(&self) -> &ErrorState {
        &self.state
    }

    pub fn error_state_mut(&mut self) -> &mut ErrorState {
        &mut self.state
    }

    pub fn failed(&self) -> bool {
        self.state.failed()
    }

    pub fn reset(&mut self) {
        self.state.reset();
    }

    /// Number of routine invocations performed so far.
    pub fn call_count(&self) -> u64 {
        self.calls
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn library() -> NativeLibrary {
        let mut lib = NativeLibrary::new();
        lib.register(
            "compare",
            2,
            1,
            Arc::new(|args, _| vec![Value::Bool(args[0] == args[1])]),
        );
        lib.register(
            "bodvcd_c",
            1,
            1,
            Arc::new(|args, state| {
                if args[0] != Value::Int(399) {
                    state.signal("SPICE(IDCODENOTFOUND)", format!("body {} unknown", args[0]));
                    return vec![Value::Float(0.0)];
                }
                vec![Value::Float(6378.1366)]
            }),
        );
        lib
    }

    #[test]
    fn registers_and_invokes_routine() {
        let mut lib = library();
        let out = lib
            .invoke("compare", &[Value::Int(3), Value::Int(3)])
            .expect("call should succeed");
        assert_eq!(out, vec![Value::Bool(true)]);
        assert_eq!(lib.call_count(), 1);
    }

    #[test]
    fn resolves_exported_and_plain_names() {
        let lib = library();
        assert!(lib.contains("BODVCD"));
        assert!(lib.contains("bodvcd_c"));
        let spec = lib.spec("compare_c").expect("spec should exist");
        assert_eq!(spec.symbol, "compare_c");
        assert_eq!(spec.expected_args, 2);
    }

    #[test]
    fn validates_argument_count() {
        let mut lib = library();
        let err = lib
            .invoke("compare", &[Value::Int(1)])
            .expect_err("invalid arg count should fail");
        assert_eq!(
            err,
            BridgeError::InvalidArgumentCount {
                symbol: "compare_c".to_string(),
                expected: 2,
                got: 1
            }
        );
        assert_eq!(lib.call_count(), 0);
    }

    #[test]
    fn signalled_failure_is_taken_out_of_state() {
        let mut lib = library();
        let err = lib
            .invoke("bodvcd", &[Value::Int(999)])
            .expect_err("unknown body should fail");
        match err {
            BridgeError::Failed(native) => {
                assert!(native.is_unrecognized_identifier());
                assert_eq!(native.traceback, vec!["bodvcd_c".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!lib.failed());

        let out = lib
            .invoke("bodvcd", &[Value::Int(399)])
            .expect("next call starts clean");
        assert_eq!(out, vec![Value::Float(6378.1366)]);
    }

    #[test]
    fn stale_failure_does_not_leak_into_next_call() {
        let mut lib = library();
        lib.error_state_mut()
            .signal("SPICE(INVALIDVALUE)", "left behind");
        let out = lib
            .invoke("compare", &[Value::Int(1), Value::Int(2)])
            .expect("stale state is discarded");
        assert_eq!(out, vec![Value::Bool(false)]);
    }

    #[test]
    fn returns_not_registered_error() {
        let mut lib = NativeLibrary::new();
        let err = lib
            .invoke("missing_symbol", &[])
            .expect_err("missing routine should fail");
        assert_eq!(
            err,
            BridgeError::RoutineNotRegistered {
                symbol: "missing_symbol".to_string()
            }
        );
    }
}
