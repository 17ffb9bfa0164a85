use crate::{
    key::KeyShape,
    model::index::{IndexKind, RangeMode},
};
use std::fmt::{self, Display};

///
/// AttributeKind
///
/// Closed set of attribute types. The kind decides the stored encoding, the
/// storage shape, and which index kinds are legal.
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum AttributeKind {
    // Scalars
    Text,
    Integer,
    Float,
    Id,
    Timestamp,
    Boolean,

    // Collections
    List,
    Set,
    Hash,
    SortedSet,
}

impl AttributeKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Id => "id",
            Self::Timestamp => "timestamp",
            Self::Boolean => "boolean",
            Self::List => "list",
            Self::Set => "set",
            Self::Hash => "hash",
            Self::SortedSet => "sorted_set",
        }
    }

    #[must_use]
    pub const fn is_scalar(self) -> bool {
        !self.is_collection()
    }

    #[must_use]
    pub const fn is_collection(self) -> bool {
        matches!(self, Self::List | Self::Set | Self::Hash | Self::SortedSet)
    }

    /// Whether regular-expression conditions may target this kind.
    #[must_use]
    pub const fn is_string_typed(self) -> bool {
        matches!(self, Self::Text)
    }

    /// Shape of the key holding this attribute.
    ///
    /// Scalars live as one field of the record's attribute hash; every
    /// collection owns a key of its own shape.
    #[must_use]
    pub const fn storage_shape(self) -> KeyShape {
        match self {
            Self::Text | Self::Integer | Self::Float | Self::Id | Self::Timestamp | Self::Boolean => {
                KeyShape::Hash
            }
            Self::List => KeyShape::List,
            Self::Set => KeyShape::Set,
            Self::Hash => KeyShape::Hash,
            Self::SortedSet => KeyShape::SortedSet,
        }
    }

    /// Range semantics available to a range index over this kind.
    #[must_use]
    pub const fn range_mode(self) -> Option<RangeMode> {
        match self {
            Self::Integer | Self::Float | Self::Timestamp => Some(RangeMode::Score),
            Self::Text => Some(RangeMode::Lex),
            _ => None,
        }
    }

    /// Whether an index of `index` kind may be declared over this kind.
    #[must_use]
    pub const fn supports_index(self, index: IndexKind) -> bool {
        if self.is_collection() {
            return false;
        }

        match index {
            IndexKind::Value | IndexKind::Unique => true,
            IndexKind::Range => self.range_mode().is_some(),
        }
    }
}

impl Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

///
/// AttributeModel
/// Declared attribute: name, kind, and optional index.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AttributeModel {
    pub name: &'static str,
    pub kind: AttributeKind,
    pub index: Option<IndexKind>,
}

impl AttributeModel {
    #[must_use]
    pub const fn new(name: &'static str, kind: AttributeKind) -> Self {
        Self {
            name,
            kind,
            index: None,
        }
    }

    /// Declare a non-unique value index.
    #[must_use]
    pub const fn indexed(mut self) -> Self {
        self.index = Some(IndexKind::Value);
        self
    }

    /// Declare a unique value index.
    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.index = Some(IndexKind::Unique);
        self
    }

    /// Declare a range index.
    #[must_use]
    pub const fn ranged(mut self) -> Self {
        self.index = Some(IndexKind::Range);
        self
    }
}
