//! Shared value model for the spx dispatch layer.
//!
//! This crate provides:
//! - **Type tags** describing what a native routine expects per argument
//! - **Values** passed across the dispatch boundary
//! - **NdArray**, a row-major n-d array with typed storage, used for both
//!   fixed-shape arguments and vectorized (broadcast) calls

mod array;
mod tag;
mod value;

use thiserror::Error;

pub use array::{ArrayData, NdArray, row_major_strides, unravel_index};
pub use tag::{ElementKind, Shape, TagKind, TypeTag};
pub use value::Value;

pub type Result<T> = std::result::Result<T, ModelError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("invalid type tag: {0}")]
    InvalidTag(String),

    #[error("data length {got} does not fill shape {shape:?} ({expected} elements)")]
    DataLength {
        shape: Vec<usize>,
        expected: usize,
        got: usize,
    },

    #[error("index {index:?} out of bounds for shape {shape:?}")]
    IndexOutOfBounds { index: Vec<usize>, shape: Vec<usize> },

    #[error("cannot stack {found} element into {expected} array")]
    MixedKinds {
        expected: ElementKind,
        found: ElementKind,
    },

    #[error("cannot stack parts of shape {found:?} with parts of shape {expected:?}")]
    MixedShapes {
        expected: Vec<usize>,
        found: Vec<usize>,
    },
}
