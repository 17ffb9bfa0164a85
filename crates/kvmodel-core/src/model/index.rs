use crate::key::KeyShape;
use std::fmt::{self, Display};

///
/// IndexKind
///
/// Value   → encoded value maps to a set of ids
/// Unique  → encoded value maps to at most one id
/// Range   → ids ordered by a score (or lexicographically for text)
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum IndexKind {
    Value,
    Unique,
    Range,
}

impl IndexKind {
    /// Shape of the index's top-level key.
    ///
    /// For value indices this is the parent set of value fragments; the ids
    /// live in one child set per fragment.
    #[must_use]
    pub const fn parent_shape(self) -> KeyShape {
        match self {
            Self::Value => KeyShape::Set,
            Self::Unique => KeyShape::Hash,
            Self::Range => KeyShape::SortedSet,
        }
    }
}

impl Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value => f.write_str("value"),
            Self::Unique => f.write_str("unique"),
            Self::Range => f.write_str("range"),
        }
    }
}

///
/// RangeMode
///
/// Score → numeric bounds over the member score
/// Lex   → lexicographic bounds over text values
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum RangeMode {
    #[default]
    Score,
    Lex,
}

impl Display for RangeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Score => f.write_str("score"),
            Self::Lex => f.write_str("lex"),
        }
    }
}
