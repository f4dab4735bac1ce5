//! Port Types
//!
//! The structural type system used to decide whether an output port may feed
//! an input port. Types are parsed from CWL shorthand (`File`, `int[]`,
//! `string?`) or long form mappings, and serialized back to CWL for
//! emission.

use std::collections::BTreeMap;
use std::fmt;

use serde_yaml::{Mapping, Value};

/// CWL primitive value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Primitive {
    Null,
    Boolean,
    Int,
    Long,
    Float,
    Double,
    String,
}

impl Primitive {
    /// Returns the CWL spelling of this primitive.
    pub fn name(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean => "boolean",
            Self::Int => "int",
            Self::Long => "long",
            Self::Float => "float",
            Self::Double => "double",
            Self::String => "string",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "null" => Some(Self::Null),
            "boolean" => Some(Self::Boolean),
            "int" => Some(Self::Int),
            "long" => Some(Self::Long),
            "float" => Some(Self::Float),
            "double" => Some(Self::Double),
            "string" => Some(Self::String),
            _ => None,
        }
    }
}

/// Declared type of a port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PortType {
    /// Matches every other type
    Any,
    Primitive(Primitive),
    /// A file, optionally constrained to a format IRI (e.g. `edam:format_1930`)
    File { format: Option<String> },
    Directory,
    Array(Box<PortType>),
    Record(BTreeMap<String, PortType>),
}

/// How a source type satisfies a target type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compatibility {
    /// Structurally identical
    Exact,
    /// One side is `Any`
    Any,
    /// An `Array(T)` source feeds a `T` input; the consuming step scatters
    Scatter,
    /// A `T` source feeds an `Array(T)` input; the link is nested into a list
    Gather,
}

/// A parsed type together with its optionality marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeSpec {
    pub ty: PortType,
    pub optional: bool,
}

impl PortType {
    /// An unconstrained file type.
    pub fn file() -> Self {
        Self::File { format: None }
    }

    /// Wraps a type in an array.
    pub fn array(item: PortType) -> Self {
        Self::Array(Box::new(item))
    }

    /// Parses CWL shorthand such as `File`, `int[]`, `string?` or `File[]?`.
    pub fn parse(text: &str) -> Result<TypeSpec, String> {
        let mut text = text.trim();
        if text.is_empty() {
            return Err("empty type".to_string());
        }

        let optional = text.ends_with('?');
        if optional {
            text = &text[..text.len() - 1];
        }

        let mut depth = 0;
        while let Some(inner) = text.strip_suffix("[]") {
            text = inner;
            depth += 1;
        }

        let mut ty = match text {
            "Any" => Self::Any,
            "File" => Self::file(),
            "Directory" => Self::Directory,
            name => Primitive::from_name(name)
                .map(Self::Primitive)
                .ok_or_else(|| format!("unknown type '{}'", name))?,
        };
        for _ in 0..depth {
            ty = Self::array(ty);
        }

        Ok(TypeSpec { ty, optional })
    }

    /// Parses a type from YAML: shorthand strings, `["null", T]` unions, or
    /// `{type: array|record|<name>, items, fields, format}` mappings.
    pub fn from_yaml(value: &Value) -> Result<TypeSpec, String> {
        match value {
            Value::String(text) => Self::parse(text),
            Value::Sequence(items) => {
                let non_null: Vec<&Value> = items
                    .iter()
                    .filter(|item| item.as_str() != Some("null"))
                    .collect();
                if non_null.len() != 1 {
                    return Err("only unions of null and a single type are supported".to_string());
                }
                let mut spec = Self::from_yaml(non_null[0])?;
                spec.optional = spec.optional || non_null.len() < items.len();
                Ok(spec)
            }
            Value::Mapping(map) => Self::from_mapping(map),
            other => Err(format!("expected a type, found {:?}", other)),
        }
    }

    fn from_mapping(map: &Mapping) -> Result<TypeSpec, String> {
        let kind = map.get("type").ok_or("type mapping has no 'type' key")?;
        let format = map.get("format").and_then(Value::as_str).map(str::to_string);

        let mut spec = match kind.as_str() {
            Some("array") => {
                let items = map.get("items").ok_or("array type has no 'items'")?;
                TypeSpec {
                    ty: Self::array(Self::from_yaml(items)?.ty),
                    optional: false,
                }
            }
            Some("record") => TypeSpec {
                ty: Self::Record(Self::parse_fields(map.get("fields"))?),
                optional: false,
            },
            _ => Self::from_yaml(kind)?,
        };

        if let (Some(format), PortType::File { .. }) = (format, &spec.ty) {
            spec.ty = PortType::File {
                format: Some(format),
            };
        }
        Ok(spec)
    }

    fn parse_fields(fields: Option<&Value>) -> Result<BTreeMap<String, PortType>, String> {
        let mut parsed = BTreeMap::new();
        match fields {
            None => {}
            Some(Value::Mapping(map)) => {
                for (name, ty) in map {
                    let name = name.as_str().ok_or("record field names must be strings")?;
                    parsed.insert(name.to_string(), Self::from_yaml(ty)?.ty);
                }
            }
            Some(Value::Sequence(items)) => {
                for item in items {
                    let name = item
                        .get("name")
                        .and_then(Value::as_str)
                        .ok_or("record field has no 'name'")?;
                    let ty = item.get("type").ok_or("record field has no 'type'")?;
                    parsed.insert(name.to_string(), Self::from_yaml(ty)?.ty);
                }
            }
            Some(other) => return Err(format!("invalid record fields: {:?}", other)),
        }
        Ok(parsed)
    }

    /// Infers whether a literal YAML value can stand in for this type.
    pub fn accepts_literal(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::Any, _) => true,
            (Self::Primitive(Primitive::Null), Value::Null) => true,
            (Self::Primitive(Primitive::Boolean), Value::Bool(_)) => true,
            (Self::Primitive(Primitive::Int | Primitive::Long), Value::Number(n)) => {
                n.is_i64() || n.is_u64()
            }
            (Self::Primitive(Primitive::Float | Primitive::Double), Value::Number(_)) => true,
            (Self::Primitive(Primitive::String), Value::String(_)) => true,
            (Self::File { .. } | Self::Directory, Value::String(_)) => true,
            (Self::File { .. }, Value::Mapping(map)) => {
                map.get("class").and_then(Value::as_str) == Some("File")
            }
            (Self::Directory, Value::Mapping(map)) => {
                map.get("class").and_then(Value::as_str) == Some("Directory")
            }
            (Self::Array(item), Value::Sequence(values)) => {
                values.iter().all(|v| item.accepts_literal(v))
            }
            (Self::Record(fields), Value::Mapping(map)) => fields
                .iter()
                .all(|(name, ty)| map.get(name.as_str()).map_or(false, |v| ty.accepts_literal(v))),
            _ => false,
        }
    }

    /// Serializes the type as a CWL type expression.
    pub fn to_cwl(&self, optional: bool) -> Value {
        match self.shorthand() {
            Some(text) if optional => Value::String(format!("{}?", text)),
            Some(text) => Value::String(text),
            None if optional => Value::Sequence(vec![Value::String("null".to_string()), self.long_form()]),
            None => self.long_form(),
        }
    }

    fn shorthand(&self) -> Option<String> {
        match self {
            Self::Any => Some("Any".to_string()),
            Self::Primitive(p) => Some(p.name().to_string()),
            Self::File { .. } => Some("File".to_string()),
            Self::Directory => Some("Directory".to_string()),
            Self::Array(item) => item.shorthand().map(|s| format!("{}[]", s)),
            Self::Record(_) => None,
        }
    }

    fn long_form(&self) -> Value {
        let mut map = Mapping::new();
        match self {
            Self::Array(item) => {
                map.insert("type".into(), "array".into());
                map.insert("items".into(), item.to_cwl(false));
            }
            Self::Record(fields) => {
                map.insert("type".into(), "record".into());
                let fields = fields
                    .iter()
                    .map(|(name, ty)| {
                        let mut field = Mapping::new();
                        field.insert("name".into(), name.as_str().into());
                        field.insert("type".into(), ty.to_cwl(false));
                        Value::Mapping(field)
                    })
                    .collect();
                map.insert("fields".into(), Value::Sequence(fields));
            }
            other => return other.to_cwl(false),
        }
        Value::Mapping(map)
    }
}

impl fmt::Display for PortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File {
                format: Some(format),
            } => write!(f, "File({})", format),
            Self::Array(item) => write!(f, "{}[]", item),
            Self::Record(fields) => {
                let parts: Vec<String> = fields
                    .iter()
                    .map(|(name, ty)| format!("{}: {}", name, ty))
                    .collect();
                write!(f, "record{{{}}}", parts.join(", "))
            }
            other => f.write_str(&other.shorthand().unwrap_or_default()),
        }
    }
}

/// Structural equality where `Any` matches anything and unconstrained file
/// formats match any format.
pub fn structurally_matches(a: &PortType, b: &PortType) -> bool {
    match (a, b) {
        (PortType::Any, _) | (_, PortType::Any) => true,
        (PortType::Primitive(x), PortType::Primitive(y)) => x == y,
        (PortType::File { format: fa }, PortType::File { format: fb }) => match (fa, fb) {
            (Some(x), Some(y)) => x == y,
            _ => true,
        },
        (PortType::Directory, PortType::Directory) => true,
        (PortType::Array(x), PortType::Array(y)) => structurally_matches(x, y),
        (PortType::Record(fa), PortType::Record(fb)) => {
            fa.len() == fb.len()
                && fa
                    .iter()
                    .all(|(name, t)| fb.get(name).map_or(false, |u| structurally_matches(t, u)))
        }
        _ => false,
    }
}

/// Decides whether an output of type `source` may feed an input of type `target`.
pub fn compatibility(source: &PortType, target: &PortType) -> Option<Compatibility> {
    if matches!(source, PortType::Any) || matches!(target, PortType::Any) {
        return Some(Compatibility::Any);
    }
    if structurally_matches(source, target) {
        return Some(Compatibility::Exact);
    }
    if let PortType::Array(item) = source {
        if structurally_matches(item, target) {
            return Some(Compatibility::Scatter);
        }
    }
    if let PortType::Array(item) = target {
        if structurally_matches(source, item) {
            return Some(Compatibility::Gather);
        }
    }
    None
}
