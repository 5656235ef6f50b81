use std::fmt::{Display, Formatter};

use crate::array::NdArray;
use crate::tag::ElementKind;

/// A value crossing the dispatch boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Array(NdArray),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
        }
    }

    /// Element kind for scalars and arrays alike.
    pub fn element_kind(&self) -> ElementKind {
        match self {
            Value::Int(_) => ElementKind::Int,
            Value::Float(_) => ElementKind::Float,
            Value::Bool(_) => ElementKind::Bool,
            Value::Str(_) => ElementKind::Str,
            Value::Array(array) => array.kind(),
        }
    }

    /// Shape of the value; scalars have shape `[]`.
    pub fn shape(&self) -> &[usize] {
        match self {
            Value::Array(array) => array.shape(),
            _ => &[],
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&NdArray> {
        match self {
            Value::Array(v) => Some(v),
            _ => None,
        }
    }

    /// Lossless cast to another element kind; arrays cast element-wise.
    pub fn cast(&self, kind: ElementKind) -> Option<Value> {
        if let Value::Array(array) = self {
            return array.cast(kind).map(Value::Array);
        }
        if self.element_kind() == kind {
            return Some(self.clone());
        }
        match (self, kind) {
            (Value::Int(v), ElementKind::Float) => Some(Value::Float(*v as f64)),
            (Value::Int(v), ElementKind::Bool) => Some(Value::Bool(*v != 0)),
            (Value::Float(v), ElementKind::Int) => {
                (v.is_finite() && v.fract() == 0.0).then(|| Value::Int(*v as i64))
            }
            (Value::Float(v), ElementKind::Bool) => Some(Value::Bool(*v != 0.0)),
            (Value::Bool(v), ElementKind::Int) => Some(Value::Int(i64::from(*v))),
            (Value::Bool(v), ElementKind::Float) => Some(Value::Float(if *v { 1.0 } else { 0.0 })),
            (Value::Int(v), ElementKind::Str) => Some(Value::Str(v.to_string())),
            (Value::Float(v), ElementKind::Str) => Some(Value::Str(v.to_string())),
            (Value::Bool(v), ElementKind::Str) => Some(Value::Str(v.to_string())),
            (Value::Str(s), ElementKind::Int) => s.trim().parse().ok().map(Value::Int),
            (Value::Str(s), ElementKind::Float) => s.trim().parse().ok().map(Value::Float),
            (Value::Str(s), ElementKind::Bool) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            _ => None,
        }
    }

    /// Zero value of a kind; used for outputs of a call that found nothing.
    pub fn zero(kind: ElementKind) -> Self {
        match kind {
            ElementKind::Int => Value::Int(0),
            ElementKind::Float => Value::Float(0.0),
            ElementKind::Bool => Value::Bool(false),
            ElementKind::Str => Value::Str(String::new()),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Str(v) => write!(f, "{v:?}"),
            Value::Array(array) => write!(f, "{}{:?}", array.kind(), array.shape()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<NdArray> for Value {
    fn from(v: NdArray) -> Self {
        Value::Array(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn casts_between_scalar_kinds() {
        assert_eq!(Value::Int(3).cast(ElementKind::Float), Some(Value::Float(3.0)));
        assert_eq!(Value::Float(3.0).cast(ElementKind::Int), Some(Value::Int(3)));
        assert_eq!(Value::Float(3.25).cast(ElementKind::Int), None);
        assert_eq!(Value::from(" 42 ").cast(ElementKind::Int), Some(Value::Int(42)));
        assert_eq!(Value::Bool(true).cast(ElementKind::Int), Some(Value::Int(1)));
        assert_eq!(Value::from("nope").cast(ElementKind::Bool), None);
    }

    #[test]
    fn scalars_have_empty_shape() {
        assert!(Value::Int(1).shape().is_empty());
        let v = Value::Array(NdArray::vector(vec![1.0, 2.0]));
        assert_eq!(v.shape(), &[2]);
        assert_eq!(v.element_kind(), ElementKind::Float);
    }
}
