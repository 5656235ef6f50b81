use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ModelError;

/// Storage kind of an array element or scalar value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Int,
    Float,
    Bool,
    Str,
}

impl ElementKind {
    pub fn name(&self) -> &'static str {
        match self {
            ElementKind::Int => "int",
            ElementKind::Float => "float",
            ElementKind::Bool => "bool",
            ElementKind::Str => "string",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "int" => Some(ElementKind::Int),
            "float" | "double" => Some(ElementKind::Float),
            "bool" => Some(ElementKind::Bool),
            "string" | "str" => Some(ElementKind::Str),
            _ => None,
        }
    }
}

impl Display for ElementKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Declared core shape of an array argument. A dimension of 0 is a wildcard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Shape(Vec<usize>);

impl Shape {
    pub fn new(dims: impl Into<Vec<usize>>) -> Self {
        Self(dims.into())
    }

    pub fn scalar() -> Self {
        Self(Vec::new())
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// True when `actual` has the same rank and every fixed dimension agrees.
    pub fn matches(&self, actual: &[usize]) -> bool {
        actual.len() == self.0.len()
            && self
                .0
                .iter()
                .zip(actual)
                .all(|(&want, &got)| want == 0 || want == got)
    }

    /// Concrete shape with wildcards replaced by `fill`.
    pub fn concrete(&self, fill: usize) -> Vec<usize> {
        self.0
            .iter()
            .map(|&d| if d == 0 { fill } else { d })
            .collect()
    }
}

impl Display for Shape {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("[")?;
        for (i, dim) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            if *dim == 0 {
                f.write_str("*")?;
            } else {
                write!(f, "{dim}")?;
            }
        }
        f.write_str("]")
    }
}

/// Declared type of a routine input or output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TypeTag {
    Int,
    Float,
    Bool,
    String,
    BodyCode,
    BodyName,
    FrameCode,
    FrameName,
    Array(ElementKind, Shape),
}

/// Payload-free discriminant of [`TypeTag`], used to key coercion rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagKind {
    Int,
    Float,
    Bool,
    String,
    BodyCode,
    BodyName,
    FrameCode,
    FrameName,
    Array,
}

impl TypeTag {
    pub fn array(kind: ElementKind, dims: impl Into<Vec<usize>>) -> Self {
        TypeTag::Array(kind, Shape::new(dims))
    }

    pub fn kind(&self) -> TagKind {
        match self {
            TypeTag::Int => TagKind::Int,
            TypeTag::Float => TagKind::Float,
            TypeTag::Bool => TagKind::Bool,
            TypeTag::String => TagKind::String,
            TypeTag::BodyCode => TagKind::BodyCode,
            TypeTag::BodyName => TagKind::BodyName,
            TypeTag::FrameCode => TagKind::FrameCode,
            TypeTag::FrameName => TagKind::FrameName,
            TypeTag::Array(..) => TagKind::Array,
        }
    }

    /// Element kind a value of this tag is stored as.
    pub fn element_kind(&self) -> ElementKind {
        match self {
            TypeTag::Int | TypeTag::BodyCode | TypeTag::FrameCode => ElementKind::Int,
            TypeTag::Float => ElementKind::Float,
            TypeTag::Bool => ElementKind::Bool,
            TypeTag::String | TypeTag::BodyName | TypeTag::FrameName => ElementKind::Str,
            TypeTag::Array(kind, _) => *kind,
        }
    }

    /// Number of trailing axes owned by one native call.
    pub fn core_rank(&self) -> usize {
        match self {
            TypeTag::Array(_, shape) => shape.rank(),
            _ => 0,
        }
    }

    pub fn core_shape(&self) -> Shape {
        match self {
            TypeTag::Array(_, shape) => shape.clone(),
            _ => Shape::scalar(),
        }
    }

    pub fn is_body(&self) -> bool {
        matches!(self, TypeTag::BodyCode | TypeTag::BodyName)
    }

    pub fn is_frame(&self) -> bool {
        matches!(self, TypeTag::FrameCode | TypeTag::FrameName)
    }

    /// Body and frame identifiers can take part in alias resolution.
    pub fn is_identifier(&self) -> bool {
        self.is_body() || self.is_frame()
    }
}

impl Display for TypeTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeTag::Int => f.write_str("int"),
            TypeTag::Float => f.write_str("float"),
            TypeTag::Bool => f.write_str("bool"),
            TypeTag::String => f.write_str("string"),
            TypeTag::BodyCode => f.write_str("body_code"),
            TypeTag::BodyName => f.write_str("body_name"),
            TypeTag::FrameCode => f.write_str("frame_code"),
            TypeTag::FrameName => f.write_str("frame_name"),
            TypeTag::Array(kind, shape) => write!(f, "{kind}{shape}"),
        }
    }
}

impl FromStr for TypeTag {
    type Err = ModelError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let text = raw.trim().to_ascii_lowercase();
        let invalid = || ModelError::InvalidTag(raw.to_string());

        if let Some(open) = text.find('[') {
            let close = text.strip_suffix(']').ok_or_else(invalid)?;
            let kind = ElementKind::parse(text[..open].trim()).ok_or_else(invalid)?;
            let inner = &close[open + 1..];
            let mut dims = Vec::new();
            if !inner.trim().is_empty() {
                for part in inner.split(',') {
                    let part = part.trim();
                    let dim = if part == "*" {
                        0
                    } else {
                        part.parse::<usize>().map_err(|_| invalid())?
                    };
                    dims.push(dim);
                }
            }
            return Ok(TypeTag::Array(kind, Shape::new(dims)));
        }

        match text.as_str() {
            "int" => Ok(TypeTag::Int),
            "float" | "double" => Ok(TypeTag::Float),
            "bool" => Ok(TypeTag::Bool),
            "string" | "str" => Ok(TypeTag::String),
            "body_code" => Ok(TypeTag::BodyCode),
            "body_name" => Ok(TypeTag::BodyName),
            "frame_code" => Ok(TypeTag::FrameCode),
            "frame_name" => Ok(TypeTag::FrameName),
            _ => Err(invalid()),
        }
    }
}

impl TryFrom<String> for TypeTag {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TypeTag> for String {
    fn from(tag: TypeTag) -> Self {
        tag.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scalar_and_identifier_tags() {
        assert_eq!("int".parse::<TypeTag>(), Ok(TypeTag::Int));
        assert_eq!(" Body_Code ".parse::<TypeTag>(), Ok(TypeTag::BodyCode));
        assert_eq!("frame_name".parse::<TypeTag>(), Ok(TypeTag::FrameName));
    }

    #[test]
    fn parses_array_tags_with_wildcards() {
        let tag: TypeTag = "float[*,3]".parse().expect("tag should parse");
        assert_eq!(tag, TypeTag::array(ElementKind::Float, vec![0, 3]));
        assert_eq!(tag.core_rank(), 2);
        assert_eq!(tag.to_string(), "float[*,3]");
    }

    #[test]
    fn rejects_malformed_tags() {
        assert!("float[3".parse::<TypeTag>().is_err());
        assert!("quaternion".parse::<TypeTag>().is_err());
        assert!("int[x]".parse::<TypeTag>().is_err());
    }

    #[test]
    fn shape_wildcards_match_any_extent() {
        let shape = Shape::new(vec![0, 3]);
        assert!(shape.matches(&[7, 3]));
        assert!(!shape.matches(&[7, 4]));
        assert!(!shape.matches(&[3]));
    }

    #[test]
    fn tags_roundtrip_through_serde_strings() {
        let tag = TypeTag::array(ElementKind::Int, vec![2]);
        let json = serde_json::to_string(&tag).expect("serialize");
        assert_eq!(json, "\"int[2]\"");
        let back: TypeTag = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, tag);
    }
}
