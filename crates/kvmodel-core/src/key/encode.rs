use crate::{
    key::escape::{escape, unescape},
    model::attribute::AttributeKind,
    value::{CoercionError, Value, format_float, format_timestamp, parse_timestamp},
};
use std::fmt::{self, Display};

///
/// TypeTag
///
/// Type namespace of an index fragment. Values of different kinds never
/// collide because the tag is part of the key.
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TypeTag {
    Null,
    String,
    Integer,
    Float,
    Timestamp,
    Boolean,
}

impl TypeTag {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Timestamp => "timestamp",
            Self::Boolean => "boolean",
        }
    }

    #[must_use]
    pub fn parse(tag: &str) -> Option<Self> {
        let tag = match tag {
            "null" => Self::Null,
            "string" => Self::String,
            "integer" => Self::Integer,
            "float" => Self::Float,
            "timestamp" => Self::Timestamp,
            "boolean" => Self::Boolean,
            _ => return None,
        };

        Some(tag)
    }

    /// Tag used for non-null values of `kind`; ids share the string space.
    #[must_use]
    pub const fn for_kind(kind: AttributeKind) -> Option<Self> {
        match kind {
            AttributeKind::Text | AttributeKind::Id => Some(Self::String),
            AttributeKind::Integer => Some(Self::Integer),
            AttributeKind::Float => Some(Self::Float),
            AttributeKind::Timestamp => Some(Self::Timestamp),
            AttributeKind::Boolean => Some(Self::Boolean),
            AttributeKind::List | AttributeKind::Set | AttributeKind::Hash | AttributeKind::SortedSet => {
                None
            }
        }
    }
}

impl Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

///
/// IndexFragment
///
/// `<type>:<escaped value>` suffix identifying one value inside an index.
///

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct IndexFragment {
    tag: TypeTag,
    value: String,
}

impl IndexFragment {
    /// Fragment every null value encodes to.
    #[must_use]
    pub fn null() -> Self {
        Self {
            tag: TypeTag::Null,
            value: "null".to_string(),
        }
    }

    /// Parse a fragment previously produced by `to_string`.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let (tag, value) = text.split_once(':')?;

        Some(Self {
            tag: TypeTag::parse(tag)?,
            value: value.to_string(),
        })
    }

    #[must_use]
    pub const fn tag(&self) -> TypeTag {
        self.tag
    }

    /// Escaped value text as it appears in the key.
    #[must_use]
    pub fn encoded_value(&self) -> &str {
        &self.value
    }

    /// Original value text.
    #[must_use]
    pub fn decoded_value(&self) -> String {
        unescape(&self.value)
    }
}

impl Display for IndexFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tag, self.value)
    }
}

/// Encode `value` into the index fragment for an attribute of `kind`.
///
/// The value is coerced to `kind` first, so `Int(5)` and `Text("5")` on an
/// integer attribute produce the same fragment.
pub fn encode_index_key(kind: AttributeKind, value: &Value) -> Result<IndexFragment, CoercionError> {
    let Some(text) = encode_scalar(kind, value)? else {
        return Ok(IndexFragment::null());
    };
    let tag = TypeTag::for_kind(kind).ok_or_else(|| CoercionError::new(kind, value))?;

    Ok(IndexFragment {
        tag,
        value: escape(&text),
    })
}

/// Encode a scalar value into its stored text; `None` for null.
pub fn encode_scalar(kind: AttributeKind, value: &Value) -> Result<Option<String>, CoercionError> {
    let text = match value.coerce(kind)? {
        Value::Null => return Ok(None),
        Value::Text(s) | Value::Id(s) => s,
        Value::Int(v) => v.to_string(),
        Value::Float(v) => format_float(v),
        Value::Timestamp(v) => format_timestamp(v),
        Value::Bool(v) => v.to_string(),
        Value::List(_) | Value::Set(_) | Value::Hash(_) | Value::SortedSet(_) => {
            return Err(CoercionError::new(kind, value));
        }
    };

    Ok(Some(text))
}

/// Decode stored scalar text back into a value of `kind`.
pub fn decode_scalar(kind: AttributeKind, raw: &str) -> Result<Value, CoercionError> {
    let failed = || CoercionError::new(kind, &Value::Text(raw.to_string()));

    let value = match kind {
        AttributeKind::Text => Value::Text(raw.to_string()),
        AttributeKind::Id => Value::Id(raw.to_string()),
        AttributeKind::Integer => Value::Int(raw.parse().map_err(|_| failed())?),
        AttributeKind::Float => Value::Float(raw.parse().map_err(|_| failed())?),
        AttributeKind::Timestamp => Value::Timestamp(parse_timestamp(raw).ok_or_else(failed)?),
        AttributeKind::Boolean => match raw {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => return Err(failed()),
        },
        AttributeKind::List | AttributeKind::Set | AttributeKind::Hash | AttributeKind::SortedSet => {
            return Err(failed());
        }
    };

    Ok(value)
}
