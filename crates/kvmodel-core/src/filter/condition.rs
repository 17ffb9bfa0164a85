use crate::{model::index::RangeMode, value::Value};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::{collections::BTreeMap, ops::Bound};

///
/// Condition
///
/// Eq       → attribute equals the value
/// AnyOf    → attribute equals any of the values (OR)
/// Matches  → string attribute matches the pattern
/// Range    → range-indexed attribute falls inside the bounds
///

#[derive(Clone, Debug)]
pub enum Condition {
    Eq(Value),
    AnyOf(Vec<Value>),
    Matches(Regex),
    Range(RangeQuery),
}

impl Condition {
    pub fn any_of<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::AnyOf(values.into_iter().map(Into::into).collect())
    }

    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Eq(_) => "value",
            Self::AnyOf(_) => "value list",
            Self::Matches(_) => "regexp",
            Self::Range(_) => "range",
        }
    }
}

impl From<Value> for Condition {
    fn from(value: Value) -> Self {
        Self::Eq(value)
    }
}

impl From<&str> for Condition {
    fn from(value: &str) -> Self {
        Self::Eq(value.into())
    }
}

impl From<String> for Condition {
    fn from(value: String) -> Self {
        Self::Eq(value.into())
    }
}

impl From<i64> for Condition {
    fn from(value: i64) -> Self {
        Self::Eq(value.into())
    }
}

impl From<i32> for Condition {
    fn from(value: i32) -> Self {
        Self::Eq(value.into())
    }
}

impl From<f64> for Condition {
    fn from(value: f64) -> Self {
        Self::Eq(value.into())
    }
}

impl From<bool> for Condition {
    fn from(value: bool) -> Self {
        Self::Eq(value.into())
    }
}

impl From<DateTime<Utc>> for Condition {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Eq(value.into())
    }
}

impl From<Vec<Value>> for Condition {
    fn from(values: Vec<Value>) -> Self {
        Self::AnyOf(values)
    }
}

impl From<Regex> for Condition {
    fn from(pattern: Regex) -> Self {
        Self::Matches(pattern)
    }
}

impl From<RangeQuery> for Condition {
    fn from(range: RangeQuery) -> Self {
        Self::Range(range)
    }
}

///
/// Conditions
///
/// Attribute → condition map of one set step. Attributes are ANDed; an
/// empty map matches the whole root scope.
///

#[derive(Clone, Debug, Default)]
pub struct Conditions(BTreeMap<String, Condition>);

impl Conditions {
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Add (or replace) the condition on `attribute`.
    #[must_use]
    pub fn with(mut self, attribute: impl Into<String>, condition: impl Into<Condition>) -> Self {
        self.0.insert(attribute.into(), condition.into());
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Condition)> {
        self.0.iter().map(|(name, condition)| (name.as_str(), condition))
    }
}

impl<K, C> FromIterator<(K, C)> for Conditions
where
    K: Into<String>,
    C: Into<Condition>,
{
    fn from_iter<I: IntoIterator<Item = (K, C)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(name, condition)| (name.into(), condition.into()))
                .collect(),
        )
    }
}

impl<K, C, const N: usize> From<[(K, C); N]> for Conditions
where
    K: Into<String>,
    C: Into<Condition>,
{
    fn from(pairs: [(K, C); N]) -> Self {
        pairs.into_iter().collect()
    }
}

///
/// RangeQuery
///
/// Independently optional lower and upper bounds. `Score` ranges compare
/// numbers and timestamps; `Lex` ranges compare text byte-wise.
///

#[derive(Clone, Debug, PartialEq)]
pub struct RangeQuery {
    pub lower: Bound<Value>,
    pub upper: Bound<Value>,
    pub mode: RangeMode,
}

impl RangeQuery {
    /// Unbounded numeric range.
    #[must_use]
    pub const fn score() -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
            mode: RangeMode::Score,
        }
    }

    /// Unbounded lexicographic range.
    #[must_use]
    pub const fn lex() -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
            mode: RangeMode::Lex,
        }
    }

    #[must_use]
    pub fn gt(mut self, value: impl Into<Value>) -> Self {
        self.lower = Bound::Excluded(value.into());
        self
    }

    #[must_use]
    pub fn gte(mut self, value: impl Into<Value>) -> Self {
        self.lower = Bound::Included(value.into());
        self
    }

    #[must_use]
    pub fn lt(mut self, value: impl Into<Value>) -> Self {
        self.upper = Bound::Excluded(value.into());
        self
    }

    #[must_use]
    pub fn lte(mut self, value: impl Into<Value>) -> Self {
        self.upper = Bound::Included(value.into());
        self
    }
}
