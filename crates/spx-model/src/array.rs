use crate::tag::ElementKind;
use crate::value::Value;
use crate::{ModelError, Result};

/// Typed element storage of an [`NdArray`].
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    Int(Vec<i64>),
    Float(Vec<f64>),
    Bool(Vec<bool>),
    Str(Vec<String>),
}

impl ArrayData {
    pub fn with_capacity(kind: ElementKind, capacity: usize) -> Self {
        match kind {
            ElementKind::Int => ArrayData::Int(Vec::with_capacity(capacity)),
            ElementKind::Float => ArrayData::Float(Vec::with_capacity(capacity)),
            ElementKind::Bool => ArrayData::Bool(Vec::with_capacity(capacity)),
            ElementKind::Str => ArrayData::Str(Vec::with_capacity(capacity)),
        }
    }

    pub fn kind(&self) -> ElementKind {
        match self {
            ArrayData::Int(_) => ElementKind::Int,
            ArrayData::Float(_) => ElementKind::Float,
            ArrayData::Bool(_) => ElementKind::Bool,
            ArrayData::Str(_) => ElementKind::Str,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ArrayData::Int(v) => v.len(),
            ArrayData::Float(v) => v.len(),
            ArrayData::Bool(v) => v.len(),
            ArrayData::Str(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        match self {
            ArrayData::Int(v) => v.get(index).map(|x| Value::Int(*x)),
            ArrayData::Float(v) => v.get(index).map(|x| Value::Float(*x)),
            ArrayData::Bool(v) => v.get(index).map(|x| Value::Bool(*x)),
            ArrayData::Str(v) => v.get(index).map(|x| Value::Str(x.clone())),
        }
    }

    fn copy_range(&self, start: usize, end: usize) -> ArrayData {
        match self {
            ArrayData::Int(v) => ArrayData::Int(v[start..end].to_vec()),
            ArrayData::Float(v) => ArrayData::Float(v[start..end].to_vec()),
            ArrayData::Bool(v) => ArrayData::Bool(v[start..end].to_vec()),
            ArrayData::Str(v) => ArrayData::Str(v[start..end].to_vec()),
        }
    }

    /// Appends a scalar or the elements of an array of the same kind.
    fn append(&mut self, value: &Value) -> Result<()> {
        let mismatch = |found: ElementKind, expected: ElementKind| ModelError::MixedKinds {
            expected,
            found,
        };
        let expected = self.kind();
        match (self, value) {
            (ArrayData::Int(out), Value::Int(x)) => out.push(*x),
            (ArrayData::Float(out), Value::Float(x)) => out.push(*x),
            (ArrayData::Bool(out), Value::Bool(x)) => out.push(*x),
            (ArrayData::Str(out), Value::Str(x)) => out.push(x.clone()),
            (ArrayData::Int(out), Value::Array(a)) => match a.data() {
                ArrayData::Int(src) => out.extend_from_slice(src),
                other => return Err(mismatch(other.kind(), expected)),
            },
            (ArrayData::Float(out), Value::Array(a)) => match a.data() {
                ArrayData::Float(src) => out.extend_from_slice(src),
                other => return Err(mismatch(other.kind(), expected)),
            },
            (ArrayData::Bool(out), Value::Array(a)) => match a.data() {
                ArrayData::Bool(src) => out.extend_from_slice(src),
                other => return Err(mismatch(other.kind(), expected)),
            },
            (ArrayData::Str(out), Value::Array(a)) => match a.data() {
                ArrayData::Str(src) => out.extend_from_slice(src),
                other => return Err(mismatch(other.kind(), expected)),
            },
            (_, other) => return Err(mismatch(other.element_kind(), expected)),
        }
        Ok(())
    }
}

/// Row-major contiguous n-d array.
#[derive(Debug, Clone, PartialEq)]
pub struct NdArray {
    shape: Vec<usize>,
    data: ArrayData,
}

impl NdArray {
    pub fn new(shape: impl Into<Vec<usize>>, data: ArrayData) -> Result<Self> {
        let shape = shape.into();
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(ModelError::DataLength {
                shape,
                expected,
                got: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    pub fn from_f64(shape: impl Into<Vec<usize>>, data: Vec<f64>) -> Result<Self> {
        Self::new(shape, ArrayData::Float(data))
    }

    pub fn from_i64(shape: impl Into<Vec<usize>>, data: Vec<i64>) -> Result<Self> {
        Self::new(shape, ArrayData::Int(data))
    }

    pub fn from_bools(shape: impl Into<Vec<usize>>, data: Vec<bool>) -> Result<Self> {
        Self::new(shape, ArrayData::Bool(data))
    }

    pub fn from_strings(shape: impl Into<Vec<usize>>, data: Vec<String>) -> Result<Self> {
        Self::new(shape, ArrayData::Str(data))
    }

    /// Rank-1 float array.
    pub fn vector(data: Vec<f64>) -> Self {
        Self {
            shape: vec![data.len()],
            data: ArrayData::Float(data),
        }
    }

    /// Array of the given shape filled with the zero value of `kind`.
    pub fn zeros(kind: ElementKind, shape: impl Into<Vec<usize>>) -> Self {
        let shape = shape.into();
        let len: usize = shape.iter().product();
        let data = match kind {
            ElementKind::Int => ArrayData::Int(vec![0; len]),
            ElementKind::Float => ArrayData::Float(vec![0.0; len]),
            ElementKind::Bool => ArrayData::Bool(vec![false; len]),
            ElementKind::Str => ArrayData::Str(vec![String::new(); len]),
        };
        Self { shape, data }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn kind(&self) -> ElementKind {
        self.data.kind()
    }

    pub fn data(&self) -> &ArrayData {
        &self.data
    }

    pub fn as_f64(&self) -> Option<&[f64]> {
        match &self.data {
            ArrayData::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<&[i64]> {
        match &self.data {
            ArrayData::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bools(&self) -> Option<&[bool]> {
        match &self.data {
            ArrayData::Bool(v) => Some(v),
            _ => None,
        }
    }

    /// Element at a row-major flat offset.
    pub fn element(&self, flat: usize) -> Option<Value> {
        self.data.get(flat)
    }

    /// Axes in front of the trailing `core_rank` axes.
    pub fn leading_shape(&self, core_rank: usize) -> &[usize] {
        &self.shape[..self.rank().saturating_sub(core_rank)]
    }

    /// Copies out the block addressed by a prefix of leading indices.
    ///
    /// The result has the remaining trailing axes as its shape; a full index
    /// yields a rank-0 array.
    pub fn subarray(&self, prefix: &[usize]) -> Result<NdArray> {
        let out_of_bounds = || ModelError::IndexOutOfBounds {
            index: prefix.to_vec(),
            shape: self.shape.clone(),
        };
        if prefix.len() > self.rank() {
            return Err(out_of_bounds());
        }
        let strides = row_major_strides(&self.shape);
        let mut offset = 0usize;
        for (axis, &i) in prefix.iter().enumerate() {
            if i >= self.shape[axis] {
                return Err(out_of_bounds());
            }
            offset += i * strides[axis];
        }
        let inner = self.shape[prefix.len()..].to_vec();
        let block: usize = inner.iter().product();
        Ok(NdArray {
            shape: inner,
            data: self.data.copy_range(offset, offset + block),
        })
    }

    /// Rank-0 arrays collapse into their scalar.
    pub fn into_value(self) -> Value {
        if self.shape.is_empty()
            && let Some(scalar) = self.data.get(0)
        {
            return scalar;
        }
        Value::Array(self)
    }

    /// Element-wise cast; `None` when any element cannot be represented.
    pub fn cast(&self, kind: ElementKind) -> Option<NdArray> {
        if kind == self.kind() {
            return Some(self.clone());
        }
        let mut data = ArrayData::with_capacity(kind, self.len());
        for i in 0..self.len() {
            let element = self.data.get(i)?.cast(kind)?;
            data.append(&element).ok()?;
        }
        Some(NdArray {
            shape: self.shape.clone(),
            data,
        })
    }

    /// Stacks equally shaped parts into an array of shape `leading ++ inner`.
    pub fn stack(
        leading: &[usize],
        kind: ElementKind,
        inner: &[usize],
        parts: &[Value],
    ) -> Result<NdArray> {
        let count: usize = leading.iter().product();
        let mut shape = leading.to_vec();
        shape.extend_from_slice(inner);
        if parts.len() != count {
            return Err(ModelError::DataLength {
                shape,
                expected: count,
                got: parts.len(),
            });
        }

        let block: usize = inner.iter().product();
        let mut data = ArrayData::with_capacity(kind, count * block);
        for part in parts {
            if part.shape() != inner {
                return Err(ModelError::MixedShapes {
                    expected: inner.to_vec(),
                    found: part.shape().to_vec(),
                });
            }
            data.append(part)?;
        }
        NdArray::new(shape, data)
    }
}

pub fn row_major_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1usize; shape.len()];
    for axis in (0..shape.len().saturating_sub(1)).rev() {
        strides[axis] = strides[axis + 1] * shape[axis + 1];
    }
    strides
}

/// Converts a row-major flat offset into a multi-index.
pub fn unravel_index(mut flat: usize, shape: &[usize]) -> Vec<usize> {
    let mut index = vec![0usize; shape.len()];
    for axis in (0..shape.len()).rev() {
        let extent = shape[axis].max(1);
        index[axis] = flat % extent;
        flat /= extent;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_data_that_does_not_fill_shape() {
        let err = NdArray::from_f64(vec![2, 2], vec![1.0, 2.0, 3.0]).expect_err("short data");
        assert_eq!(
            err,
            ModelError::DataLength {
                shape: vec![2, 2],
                expected: 4,
                got: 3
            }
        );
    }

    #[test]
    fn strides_and_unravel_are_row_major() {
        assert_eq!(row_major_strides(&[2, 3, 4]), vec![12, 4, 1]);
        assert_eq!(unravel_index(0, &[2, 3]), vec![0, 0]);
        assert_eq!(unravel_index(4, &[2, 3]), vec![1, 1]);
        assert_eq!(unravel_index(5, &[2, 3]), vec![1, 2]);
    }

    #[test]
    fn subarray_extracts_trailing_block() {
        let a = NdArray::from_f64(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])
            .expect("valid array");
        let row = a.subarray(&[1]).expect("row exists");
        assert_eq!(row.shape(), &[3]);
        assert_eq!(row.as_f64(), Some(&[4.0, 5.0, 6.0][..]));

        let cell = a.subarray(&[0, 2]).expect("cell exists");
        assert_eq!(cell.into_value(), Value::Float(3.0));

        assert!(a.subarray(&[2]).is_err());
    }

    #[test]
    fn cast_float_to_int_requires_integral_values() {
        let exact = NdArray::from_f64(vec![2], vec![1.0, -4.0]).expect("valid");
        let ints = exact.cast(ElementKind::Int).expect("integral floats cast");
        assert_eq!(ints.as_i64(), Some(&[1, -4][..]));

        let inexact = NdArray::from_f64(vec![2], vec![1.5, 2.0]).expect("valid");
        assert!(inexact.cast(ElementKind::Int).is_none());
    }

    #[test]
    fn stack_builds_leading_then_inner_shape() {
        let parts = vec![
            Value::Array(NdArray::vector(vec![1.0, 2.0])),
            Value::Array(NdArray::vector(vec![3.0, 4.0])),
            Value::Array(NdArray::vector(vec![5.0, 6.0])),
        ];
        let stacked =
            NdArray::stack(&[3], ElementKind::Float, &[2], &parts).expect("stack should succeed");
        assert_eq!(stacked.shape(), &[3, 2]);
        assert_eq!(
            stacked.as_f64(),
            Some(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0][..])
        );
    }

    #[test]
    fn stack_rejects_mixed_kinds() {
        let parts = vec![Value::Float(1.0), Value::Int(2)];
        let err = NdArray::stack(&[2], ElementKind::Float, &[], &parts).expect_err("mixed kinds");
        assert_eq!(
            err,
            ModelError::MixedKinds {
                expected: ElementKind::Float,
                found: ElementKind::Int
            }
        );
    }
}
