mod coerce;
mod compare;
mod time;


use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

// re-exports
pub use coerce::CoercionError;
pub use compare::{compare_ids, natural_cmp};
pub(crate) use coerce::format_float;
pub(crate) use time::{format_timestamp, parse_timestamp, timestamp_score};

///
/// Value
///
/// Typed attribute value as held by a `Record` and passed into filter
/// conditions. Scalar variants mirror the scalar attribute kinds; collection
/// variants carry the members stored under the attribute's own key.
///
/// Null        → the attribute is unset.
/// SortedSet   → (member, score) pairs in ascending score order.
///

#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    #[default]
    Null,
    Text(String),
    Int(i64),
    Float(f64),
    Id(String),
    Timestamp(DateTime<Utc>),
    Bool(bool),
    List(Vec<String>),
    Set(BTreeSet<String>),
    Hash(BTreeMap<String, String>),
    SortedSet(Vec<(String, f64)>),
}

impl Value {
    /// Build a sorted-set value, ordering members by score then member.
    #[must_use]
    pub fn sorted_set<I, S>(members: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut members: Vec<(String, f64)> = members
            .into_iter()
            .map(|(member, score)| (member.into(), score))
            .collect();
        members.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

        Self::SortedSet(members)
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Whether this value is one of the collection variants.
    #[must_use]
    pub const fn is_collection(&self) -> bool {
        matches!(
            self,
            Self::List(_) | Self::Set(_) | Self::Hash(_) | Self::SortedSet(_)
        )
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Text view of `Text` and `Id` values.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) | Self::Id(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Timestamp(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::List(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_set(&self) -> Option<&BTreeSet<String>> {
        match self {
            Self::Set(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_hash(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            Self::Hash(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_sorted_set(&self) -> Option<&[(String, f64)]> {
        match self {
            Self::SortedSet(v) => Some(v),
            _ => None,
        }
    }
}

//
// Conversions
//

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

impl From<Vec<String>> for Value {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

impl From<BTreeSet<String>> for Value {
    fn from(value: BTreeSet<String>) -> Self {
        Self::Set(value)
    }
}

impl From<BTreeMap<String, String>> for Value {
    fn from(value: BTreeMap<String, String>) -> Self {
        Self::Hash(value)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Self>,
{
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}
