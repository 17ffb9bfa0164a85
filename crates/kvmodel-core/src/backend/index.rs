//! Where an attribute value lives inside its index.

use crate::{
    backend::mutation::{Member, Mutation},
    key::{IndexFragment, Key, KeyError, encode_index_key},
    model::{attribute::AttributeModel, entity::EntityModel, index::IndexKind, index::RangeMode},
    value::{CoercionError, Value, timestamp_score},
};

/// Separator between the value and the id in lexicographic range members.
pub const LEX_SEPARATOR: char = '\0';

///
/// IndexTarget
///
/// Value   → `entry` holds the ids; `parent` lists every live fragment
/// Unique  → `field` of the unique hash maps to the single id
/// Range   → sorted-set location; `lex` carries the text for `Lex` ranges
///

#[derive(Clone, Debug, PartialEq)]
pub enum IndexTarget {
    Value {
        parent: Key,
        entry: Key,
        fragment: IndexFragment,
    },
    Unique {
        hash: Key,
        field: String,
    },
    Range {
        key: Key,
        score: f64,
        lex: Option<String>,
    },
}

impl IndexTarget {
    /// Sorted-set member for `id`.
    #[must_use]
    pub fn range_member(lex: Option<&str>, id: &str) -> String {
        match lex {
            Some(value) => format!("{value}{LEX_SEPARATOR}{id}"),
            None => id.to_string(),
        }
    }

    /// Record id carried by a range-index member.
    #[must_use]
    pub fn range_member_id(member: &str, mode: RangeMode) -> &str {
        match mode {
            RangeMode::Score => member,
            RangeMode::Lex => member
                .rsplit_once(LEX_SEPARATOR)
                .map_or(member, |(_, id)| id),
        }
    }

    /// Queue the writes that index `id` here.
    pub fn insert(&self, mutation: &mut Mutation, id: &str) -> Result<(), KeyError> {
        match self {
            Self::Value {
                parent,
                entry,
                fragment,
            } => {
                mutation.add(entry, id)?;
                mutation.add(parent, fragment.to_string())?;
            }
            Self::Unique { hash, field } => {
                mutation.add(hash, Member::field(field.clone(), id))?;
            }
            Self::Range { key, score, lex } => {
                mutation.add(key, Member::scored(Self::range_member(lex.as_deref(), id), *score))?;
            }
        }

        Ok(())
    }

    /// Queue the writes that unindex `id` from here. Vacated value-index
    /// entries are purged only when `vacated` is set.
    pub fn remove(&self, mutation: &mut Mutation, id: &str, vacated: bool) -> Result<(), KeyError> {
        match self {
            Self::Value {
                parent,
                entry,
                fragment,
            } => {
                if vacated {
                    mutation.purge_entry(parent, entry, fragment)?;
                } else {
                    mutation.delete(entry, id)?;
                }
            }
            Self::Unique { hash, field } => {
                mutation.delete(hash, field.clone())?;
            }
            Self::Range { key, lex, .. } => {
                mutation.delete(key, Self::range_member(lex.as_deref(), id))?;
            }
        }

        Ok(())
    }
}

/// Locate `value` of `attribute` inside its index.
///
/// `None` when the attribute is not indexed, or when the index does not
/// hold nulls (unique and range indices).
pub fn index_target(
    model: &EntityModel,
    attribute: &AttributeModel,
    value: &Value,
) -> Result<Option<IndexTarget>, CoercionError> {
    let Some(index) = attribute.index else {
        return Ok(None);
    };
    let value = value.coerce(attribute.kind)?;

    let target = match index {
        IndexKind::Value => {
            let fragment = encode_index_key(attribute.kind, &value)?;

            IndexTarget::Value {
                parent: Key::index(model.name, attribute.name, index.parent_shape()),
                entry: Key::index_entry(model.name, attribute.name, &fragment),
                fragment,
            }
        }
        IndexKind::Unique => {
            if value.is_null() {
                return Ok(None);
            }
            let fragment = encode_index_key(attribute.kind, &value)?;

            IndexTarget::Unique {
                hash: Key::index(model.name, attribute.name, index.parent_shape()),
                field: fragment.to_string(),
            }
        }
        IndexKind::Range => {
            let key = Key::index(model.name, attribute.name, index.parent_shape());

            match value {
                Value::Null => return Ok(None),
                Value::Text(text) => IndexTarget::Range {
                    key,
                    score: 0.0,
                    lex: Some(text),
                },
                other => IndexTarget::Range {
                    key,
                    score: score_of(&other).ok_or_else(|| CoercionError::new(attribute.kind, &other))?,
                    lex: None,
                },
            }
        }
    };

    Ok(Some(target))
}

/// Escaped index text of `value` as coerced to `attribute`'s kind.
pub fn safe_value(attribute: &AttributeModel, value: &Value) -> Result<String, CoercionError> {
    let fragment = encode_index_key(attribute.kind, value)?;

    Ok(fragment.encoded_value().to_string())
}

/// Range-index score of a numeric or timestamp value.
#[expect(clippy::cast_precision_loss)]
pub(crate) fn score_of(value: &Value) -> Option<f64> {
    match value {
        Value::Int(v) => Some(*v as f64),
        Value::Float(v) => Some(*v),
        Value::Timestamp(v) => Some(timestamp_score(*v)),
        _ => None,
    }
}
