#![expect(clippy::cast_possible_truncation, clippy::cast_precision_loss)]

use crate::{
    model::attribute::AttributeKind,
    value::{
        Value,
        time::{format_timestamp, parse_timestamp, timestamp_from_secs},
    },
};
use chrono::DateTime;
use thiserror::Error as ThisError;

///
/// CoercionError
///
/// A value could not be converted into the declared attribute kind.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
#[error("cannot coerce {value} into {kind}")]
pub struct CoercionError {
    pub kind: AttributeKind,
    pub value: String,
}

impl CoercionError {
    pub(crate) fn new(kind: AttributeKind, value: &Value) -> Self {
        Self {
            kind,
            value: format!("{value:?}"),
        }
    }
}

impl Value {
    /// Convert into the canonical variant for `kind`.
    ///
    /// Null passes through for every kind. Text is parsed into numeric,
    /// boolean and timestamp kinds; integers widen into floats and
    /// timestamps (epoch seconds); integral floats narrow into integers.
    pub fn coerce(&self, kind: AttributeKind) -> Result<Self, CoercionError> {
        use AttributeKind as K;

        let coerced = match (kind, self) {
            (_, Self::Null) => Some(Self::Null),

            // text
            (K::Text, Self::Text(s) | Self::Id(s)) => Some(Self::Text(s.clone())),
            (K::Text, Self::Int(v)) => Some(Self::Text(v.to_string())),
            (K::Text, Self::Float(v)) => Some(Self::Text(format_float(*v))),
            (K::Text, Self::Bool(v)) => Some(Self::Text(v.to_string())),
            (K::Text, Self::Timestamp(v)) => Some(Self::Text(format_timestamp(*v))),

            // id
            (K::Id, Self::Id(s) | Self::Text(s)) => Some(Self::Id(s.clone())),
            (K::Id, Self::Int(v)) => Some(Self::Id(v.to_string())),

            // numeric
            (K::Integer, Self::Int(v)) => Some(Self::Int(*v)),
            (K::Integer, Self::Text(s)) => s.trim().parse().ok().map(Self::Int),
            (K::Integer, Self::Float(v)) => integral(*v).map(Self::Int),
            (K::Float, Self::Float(v)) => Some(Self::Float(*v)),
            (K::Float, Self::Int(v)) => Some(Self::Float(*v as f64)),
            (K::Float, Self::Text(s)) => s.trim().parse().ok().map(Self::Float),

            // timestamp
            (K::Timestamp, Self::Timestamp(v)) => Some(Self::Timestamp(*v)),
            (K::Timestamp, Self::Int(v)) => DateTime::from_timestamp(*v, 0).map(Self::Timestamp),
            (K::Timestamp, Self::Float(v)) => timestamp_from_secs(*v).map(Self::Timestamp),
            (K::Timestamp, Self::Text(s)) => parse_timestamp(s).map(Self::Timestamp),

            // boolean
            (K::Boolean, Self::Bool(v)) => Some(Self::Bool(*v)),
            (K::Boolean, Self::Text(s)) => match s.as_str() {
                "true" => Some(Self::Bool(true)),
                "false" => Some(Self::Bool(false)),
                _ => None,
            },

            // collections
            (K::List, Self::List(v)) => Some(Self::List(v.clone())),
            (K::List, Self::Set(v)) => Some(Self::List(v.iter().cloned().collect())),
            (K::Set, Self::Set(v)) => Some(Self::Set(v.clone())),
            (K::Set, Self::List(v)) => Some(Self::Set(v.iter().cloned().collect())),
            (K::Hash, Self::Hash(v)) => Some(Self::Hash(v.clone())),
            (K::SortedSet, Self::SortedSet(v)) => Some(Self::sorted_set(v.iter().cloned())),

            _ => None,
        };

        coerced.ok_or_else(|| CoercionError::new(kind, self))
    }
}

/// Shortest text that parses back to the same float. Both zeros print `0`.
pub(crate) fn format_float(value: f64) -> String {
    // -0.0 + 0.0 is +0.0
    format!("{}", value + 0.0)
}

fn integral(value: f64) -> Option<i64> {
    let in_range = value >= i64::MIN as f64 && value < i64::MAX as f64;

    (value.is_finite() && value.fract() == 0.0 && in_range).then_some(value as i64)
}
