//! Boundary primitives for the wrapped native numeric library.
//!
//! This crate provides:
//! - symbol normalization between caller-facing and exported routine names
//! - the native error state (short code, long message, traceback) that
//!   routines signal into, and the classification of short codes
//! - a runtime library of opaque routines invoked by symbol

mod bridge;
mod error_state;
mod symbols;

pub use bridge::{BridgeError, NativeLibrary, NativeRoutine, RoutineHandle, RoutineSpec};
pub use error_state::{ErrorState, NativeError, NativeErrorKind, classify_short_code};
pub use symbols::{canonical_symbol, native_symbol};
