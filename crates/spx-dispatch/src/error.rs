//! Error types for spx-dispatch

use spx_compat::{BridgeError, NativeError};
use spx_model::{ModelError, TypeTag};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DispatchError>;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("unknown routine: {name}")]
    UnknownRoutine { name: String },

    #[error("routine already registered: {name}")]
    DuplicateRoutine { name: String },

    #[error("invalid signature for {routine}: {reason}")]
    InvalidSignature { routine: String, reason: String },

    #[error("unknown variant symbol: {symbol}")]
    UnknownVariant { symbol: String },

    #[error("{routine}: missing argument {index} ({name})")]
    MissingArgument {
        routine: String,
        index: usize,
        name: String,
    },

    #[error("{routine}: takes at most {expected} arguments, got {got}")]
    TooManyArguments {
        routine: String,
        expected: usize,
        got: usize,
    },

    #[error("{routine}: unknown keyword argument {keyword:?}")]
    UnknownKeyword { routine: String, keyword: String },

    #[error("{routine}: argument {index} ({name}) given more than once")]
    DuplicateArgument {
        routine: String,
        index: usize,
        name: String,
    },

    #[error("{routine}: argument {index} expected {expected}, found {found}")]
    TypeMismatch {
        routine: String,
        index: usize,
        expected: TypeTag,
        found: String,
    },

    #[error("{routine}: cannot convert argument {index} ({value}) to {target}")]
    ConversionFailure {
        routine: String,
        index: usize,
        target: TypeTag,
        value: String,
    },

    #[error("{routine}: argument {index}: unresolved identifier {identifier}")]
    UnresolvedIdentifier {
        routine: String,
        index: usize,
        identifier: String,
    },

    #[error("{routine}: incompatible leading shapes {shapes:?}")]
    ShapeMismatch {
        routine: String,
        shapes: Vec<Vec<usize>>,
    },

    #[error("{routine}: {error}")]
    Native { routine: String, error: NativeError },

    #[error("{routine}: not found")]
    NotFound { routine: String },

    #[error("native bridge: {0}")]
    Bridge(BridgeError),

    #[error("signature table: {0}")]
    Table(String),

    #[error("value model: {0}")]
    Model(#[from] ModelError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DispatchError {
    /// Argument position for failures detected while coercing inputs.
    pub fn argument_index(&self) -> Option<usize> {
        match self {
            DispatchError::MissingArgument { index, .. }
            | DispatchError::DuplicateArgument { index, .. }
            | DispatchError::TypeMismatch { index, .. }
            | DispatchError::ConversionFailure { index, .. }
            | DispatchError::UnresolvedIdentifier { index, .. } => Some(*index),
            _ => None,
        }
    }

    pub fn native(&self) -> Option<&NativeError> {
        match self {
            DispatchError::Native { error, .. } => Some(error),
            _ => None,
        }
    }

    /// The native routine rejected the identifier it was given.
    pub fn is_unrecognized_identifier(&self) -> bool {
        self.native()
            .is_some_and(NativeError::is_unrecognized_identifier)
    }

    /// Failures that mean "nothing found" rather than a computational error.
    pub fn is_not_found(&self) -> bool {
        match self {
            DispatchError::NotFound { .. } => true,
            DispatchError::Native { error, .. } => error.is_not_found(),
            _ => false,
        }
    }

    /// Failures after which an alias search moves on to the next candidate:
    /// the identifier was not recognized, or a found-flag came back false.
    pub fn continues_alias_search(&self) -> bool {
        matches!(self, DispatchError::NotFound { .. }) || self.is_unrecognized_identifier()
    }
}
