//! Step evaluation: turns a step list into the ids of one working set.

use crate::{
    ID_ATTRIBUTE,
    backend::{Backend, IndexTarget, LEX_SEPARATOR, index_target, score_of},
    error::Error,
    filter::{
        FilterError,
        condition::{Condition, Conditions, RangeQuery},
        step::{SetOp, SortDirection, SortKey, Step},
    },
    key::{IndexFragment, Key, KeyShape, TypeTag, encode_scalar},
    model::{
        attribute::{AttributeKind, AttributeModel},
        entity::EntityModel,
        index::{IndexKind, RangeMode},
    },
    value::{Value, compare_ids, natural_cmp},
};
use regex::Regex;
use std::{
    cmp::Ordering,
    collections::{BTreeSet, HashSet},
    ops::Bound,
};

// Sorts just above `value` and below any longer text that extends it.
const LEX_SUCCESSOR: char = '\u{1}';

///
/// WorkingSet
///
/// Unordered → plain membership, materialized in natural id order
/// Ordered   → explicit order established by a sort or list step
///

#[derive(Clone, Debug)]
pub(crate) enum WorkingSet {
    Unordered(BTreeSet<String>),
    Ordered(Vec<String>),
}

impl WorkingSet {
    pub(crate) fn len(&self) -> usize {
        match self {
            Self::Unordered(ids) => ids.len(),
            Self::Ordered(ids) => ids.len(),
        }
    }

    pub(crate) fn contains(&self, id: &str) -> bool {
        match self {
            Self::Unordered(ids) => ids.contains(id),
            Self::Ordered(ids) => ids.iter().any(|member| member == id),
        }
    }

    fn intersect(&mut self, other: &BTreeSet<String>) {
        match self {
            Self::Unordered(ids) => ids.retain(|id| other.contains(id)),
            Self::Ordered(ids) => ids.retain(|id| other.contains(id)),
        }
    }

    fn diff(&mut self, other: &BTreeSet<String>) {
        match self {
            Self::Unordered(ids) => ids.retain(|id| !other.contains(id)),
            Self::Ordered(ids) => ids.retain(|id| !other.contains(id)),
        }
    }

    // new ids follow the existing order, in natural id order
    fn union(&mut self, other: BTreeSet<String>) {
        match self {
            Self::Unordered(ids) => ids.extend(other),
            Self::Ordered(ids) => {
                let present: HashSet<&String> = ids.iter().collect();
                let mut added: Vec<String> = other
                    .into_iter()
                    .filter(|id| !present.contains(id))
                    .collect();
                added.sort_by(|a, b| compare_ids(a, b));
                ids.extend(added);
            }
        }
    }

    fn window(self, offset: usize, limit: Option<usize>) -> Self {
        let ids = self.into_ids().into_iter().skip(offset);

        Self::Ordered(match limit {
            Some(limit) => ids.take(limit).collect(),
            None => ids.collect(),
        })
    }

    /// Ids in working-set order; unordered sets come out in natural id order.
    pub(crate) fn into_ids(self) -> Vec<String> {
        match self {
            Self::Unordered(ids) => {
                let mut ids: Vec<String> = ids.into_iter().collect();
                ids.sort_by(|a, b| compare_ids(a, b));
                ids
            }
            Self::Ordered(ids) => ids,
        }
    }
}

///
/// Evaluator
///

pub(crate) struct Evaluator<'a> {
    backend: &'a Backend,
    model: &'static EntityModel,
    root: &'a Key,
}

impl<'a> Evaluator<'a> {
    pub(crate) const fn new(backend: &'a Backend, model: &'static EntityModel, root: &'a Key) -> Self {
        Self {
            backend,
            model,
            root,
        }
    }

    /// Ids in the root scope, unfiltered.
    pub(crate) fn root_ids(&self) -> Result<BTreeSet<String>, Error> {
        Ok(self.backend.connection().smembers(self.root.name())?)
    }

    pub(crate) fn run(&self, steps: &[&Step]) -> Result<WorkingSet, Error> {
        let root = self.root_ids()?;
        let mut working = WorkingSet::Unordered(root.clone());

        for step in steps {
            working = match step {
                Step::Set { op, conditions } => {
                    let matched = self.resolve(conditions, &root)?;
                    match op {
                        SetOp::Intersect => working.intersect(&matched),
                        SetOp::Union => working.union(matched),
                        SetOp::Diff => working.diff(&matched),
                    }
                    working
                }
                Step::List { offset, limit } => working.window(*offset, *limit),
                Step::Sort { keys } => self.sort(working, keys)?,
                Step::Empty => WorkingSet::Unordered(BTreeSet::new()),
            };
        }

        Ok(working)
    }

    // ------------------------------------------------------------------
    // Set steps
    // ------------------------------------------------------------------

    // Ids inside the root scope matching every condition.
    fn resolve(&self, conditions: &Conditions, root: &BTreeSet<String>) -> Result<BTreeSet<String>, Error> {
        let mut matched: Option<BTreeSet<String>> = None;

        for (name, condition) in conditions.iter() {
            let ids = self.resolve_attribute(name, condition, root)?;
            matched = Some(match matched {
                Some(acc) => acc.intersection(&ids).cloned().collect(),
                None => ids,
            });
        }

        Ok(match matched {
            Some(ids) => ids.intersection(root).cloned().collect(),
            None => root.clone(),
        })
    }

    fn resolve_attribute(
        &self,
        name: &str,
        condition: &Condition,
        root: &BTreeSet<String>,
    ) -> Result<BTreeSet<String>, Error> {
        if name == ID_ATTRIBUTE {
            return resolve_id(condition, root);
        }

        let attr = self
            .model
            .attribute(name)
            .ok_or_else(|| FilterError::UnknownAttribute {
                entity: self.model.name,
                attribute: name.to_string(),
            })?;
        let index = attr.index.ok_or_else(|| FilterError::UnindexedAttribute {
            attribute: name.to_string(),
        })?;
        if matches!(condition, Condition::Matches(_)) && !attr.kind.is_string_typed() {
            return Err(FilterError::InvalidRegexTarget {
                attribute: name.to_string(),
                kind: attr.kind,
            }
            .into());
        }

        match (index, condition) {
            (IndexKind::Range, _) => self.resolve_range(attr, condition),
            (_, Condition::Range(_)) => Err(FilterError::InvalidRangeTarget {
                attribute: name.to_string(),
                reason: "the attribute has no range index",
            }
            .into()),
            (_, Condition::Eq(value)) => self.lookup(attr, std::slice::from_ref(value)),
            (_, Condition::AnyOf(values)) => self.lookup(attr, values),
            (IndexKind::Value, Condition::Matches(pattern)) => self.scan_value_index(attr, pattern),
            (IndexKind::Unique, Condition::Matches(pattern)) => self.scan_unique_index(attr, pattern),
        }
    }

    // Exact lookups in a value or unique index; several values are ORed.
    fn lookup(&self, attr: &AttributeModel, values: &[Value]) -> Result<BTreeSet<String>, Error> {
        let conn = self.backend.connection();
        let mut entries = Vec::new();
        let mut fields = Vec::new();

        for value in values {
            match self.target(attr, value)? {
                Some(IndexTarget::Value { entry, .. }) => entries.push(entry.name().to_string()),
                Some(IndexTarget::Unique { hash, field }) => {
                    fields.push((hash.name().to_string(), field));
                }
                _ => {}
            }
        }

        let mut ids = if entries.is_empty() {
            BTreeSet::new()
        } else {
            conn.sunion(&entries)?
        };
        if !fields.is_empty() {
            ids.extend(conn.hget_many(&fields)?.into_iter().flatten());
        }

        Ok(ids)
    }

    // Regex over every live fragment of a value index.
    fn scan_value_index(&self, attr: &AttributeModel, pattern: &Regex) -> Result<BTreeSet<String>, Error> {
        let conn = self.backend.connection();
        let parent = Key::index(self.model.name, attr.name, KeyShape::Set);

        let entries: Vec<String> = conn
            .smembers(parent.name())?
            .iter()
            .filter_map(|raw| IndexFragment::parse(raw))
            .filter(|fragment| fragment_matches(fragment, pattern))
            .map(|fragment| {
                Key::index_entry(self.model.name, attr.name, &fragment)
                    .name()
                    .to_string()
            })
            .collect();

        if entries.is_empty() {
            return Ok(BTreeSet::new());
        }

        Ok(conn.sunion(&entries)?)
    }

    // Regex over every field of a unique index.
    fn scan_unique_index(&self, attr: &AttributeModel, pattern: &Regex) -> Result<BTreeSet<String>, Error> {
        let hash = Key::index(self.model.name, attr.name, KeyShape::Hash);

        Ok(self
            .backend
            .connection()
            .hgetall(hash.name())?
            .into_iter()
            .filter(|(field, _)| {
                IndexFragment::parse(field).is_some_and(|fragment| fragment_matches(&fragment, pattern))
            })
            .map(|(_, id)| id)
            .collect())
    }

    fn resolve_range(&self, attr: &AttributeModel, condition: &Condition) -> Result<BTreeSet<String>, Error> {
        let Some(mode) = attr.kind.range_mode() else {
            return Err(FilterError::InvalidRangeTarget {
                attribute: attr.name.to_string(),
                reason: "the attribute kind has no ordering",
            }
            .into());
        };

        // range indices hold no nulls
        match condition {
            Condition::Eq(Value::Null) => Ok(BTreeSet::new()),
            Condition::Eq(value) => self.range(attr, mode, &closed(value.clone(), mode)),
            Condition::AnyOf(values) => {
                let mut ids = BTreeSet::new();
                for value in values.iter().filter(|value| !value.is_null()) {
                    ids.extend(self.range(attr, mode, &closed(value.clone(), mode))?);
                }
                Ok(ids)
            }
            Condition::Matches(pattern) => {
                let key = Key::index(self.model.name, attr.name, KeyShape::SortedSet);
                let members = self.backend.connection().zrange_by_lex(
                    key.name(),
                    Bound::Unbounded,
                    Bound::Unbounded,
                )?;

                Ok(members
                    .iter()
                    .filter_map(|member| member.rsplit_once(LEX_SEPARATOR))
                    .filter(|(value, _)| pattern.is_match(value))
                    .map(|(_, id)| id.to_string())
                    .collect())
            }
            Condition::Range(query) => {
                if query.mode != mode {
                    return Err(FilterError::InvalidRangeTarget {
                        attribute: attr.name.to_string(),
                        reason: match mode {
                            RangeMode::Score => "the attribute needs a score range",
                            RangeMode::Lex => "the attribute needs a lex range",
                        },
                    }
                    .into());
                }
                self.range(attr, mode, query)
            }
        }
    }

    fn range(&self, attr: &AttributeModel, mode: RangeMode, query: &RangeQuery) -> Result<BTreeSet<String>, Error> {
        let conn = self.backend.connection();
        let key = Key::index(self.model.name, attr.name, KeyShape::SortedSet);

        let members = match mode {
            RangeMode::Score => {
                let lower = map_bound(&query.lower, |v| score_bound(attr, v))?;
                let upper = map_bound(&query.upper, |v| score_bound(attr, v))?;
                conn.zrange_by_score(key.name(), lower, upper)?
            }
            RangeMode::Lex => {
                let lower = lex_lower(attr, &query.lower)?;
                let upper = lex_upper(attr, &query.upper)?;
                conn.zrange_by_lex(key.name(), as_str_bound(&lower), as_str_bound(&upper))?
            }
        };

        Ok(members
            .iter()
            .map(|member| IndexTarget::range_member_id(member, mode).to_string())
            .collect())
    }

    fn target(&self, attr: &AttributeModel, value: &Value) -> Result<Option<IndexTarget>, FilterError> {
        index_target(self.model, attr, value).map_err(|err| invalid_value(attr, &err))
    }

    // ------------------------------------------------------------------
    // Sort steps
    // ------------------------------------------------------------------

    fn sort(&self, working: WorkingSet, keys: &[SortKey]) -> Result<WorkingSet, Error> {
        let mut columns = Vec::with_capacity(keys.len());
        let mut attributes = Vec::new();
        for key in keys {
            if key.attribute == ID_ATTRIBUTE {
                columns.push((None, key.direction));
                continue;
            }
            let attr = self
                .model
                .attribute(&key.attribute)
                .ok_or_else(|| FilterError::UnknownAttribute {
                    entity: self.model.name,
                    attribute: key.attribute.clone(),
                })?;
            if attr.kind.is_collection() {
                return Err(FilterError::InvalidSortTarget {
                    attribute: key.attribute.clone(),
                    kind: attr.kind,
                }
                .into());
            }
            columns.push((Some(attributes.len()), key.direction));
            attributes.push(attr);
        }

        let ids = working.into_ids();
        let rows = if attributes.is_empty() {
            vec![Vec::new(); ids.len()]
        } else {
            self.backend.fetch(self.model, &ids, &attributes)?
        };

        let mut rows: Vec<(String, Vec<Value>)> = ids.into_iter().zip(rows).collect();
        rows.sort_by(|(a_id, a), (b_id, b)| {
            columns
                .iter()
                .map(|(column, direction)| {
                    let ordering = match column {
                        Some(col) => natural_cmp(&a[*col], &b[*col]),
                        None => compare_ids(a_id, b_id),
                    };
                    match direction {
                        SortDirection::Asc => ordering,
                        SortDirection::Desc => ordering.reverse(),
                    }
                })
                .find(|ordering| *ordering != Ordering::Equal)
                .unwrap_or_else(|| compare_ids(a_id, b_id))
        });

        Ok(WorkingSet::Ordered(rows.into_iter().map(|(id, _)| id).collect()))
    }
}

// Primary-id conditions resolve against the root scope directly.
fn resolve_id(condition: &Condition, root: &BTreeSet<String>) -> Result<BTreeSet<String>, Error> {
    let wanted = |value: &Value| -> Result<Option<String>, Error> {
        encode_scalar(AttributeKind::Id, value).map_err(|err| {
            FilterError::InvalidValue {
                attribute: ID_ATTRIBUTE.to_string(),
                message: err.to_string(),
            }
            .into()
        })
    };

    let ids = match condition {
        Condition::Eq(value) => wanted(value)?.into_iter().collect(),
        Condition::AnyOf(values) => {
            let mut ids = BTreeSet::new();
            for value in values {
                ids.extend(wanted(value)?);
            }
            ids
        }
        Condition::Matches(pattern) => root
            .iter()
            .filter(|id| pattern.is_match(id))
            .cloned()
            .collect(),
        Condition::Range(_) => {
            return Err(FilterError::InvalidRangeTarget {
                attribute: ID_ATTRIBUTE.to_string(),
                reason: "ids carry no range index",
            }
            .into());
        }
    };

    Ok(ids)
}

fn fragment_matches(fragment: &IndexFragment, pattern: &Regex) -> bool {
    fragment.tag() == TypeTag::String && pattern.is_match(&fragment.decoded_value())
}

fn invalid_value(attr: &AttributeModel, err: &impl std::fmt::Display) -> FilterError {
    FilterError::InvalidValue {
        attribute: attr.name.to_string(),
        message: err.to_string(),
    }
}

// Equality expressed as a closed range.
fn closed(value: Value, mode: RangeMode) -> RangeQuery {
    RangeQuery {
        lower: Bound::Included(value.clone()),
        upper: Bound::Included(value),
        mode,
    }
}

fn map_bound<T>(
    bound: &Bound<Value>,
    f: impl Fn(&Value) -> Result<T, FilterError>,
) -> Result<Bound<T>, FilterError> {
    Ok(match bound {
        Bound::Included(value) => Bound::Included(f(value)?),
        Bound::Excluded(value) => Bound::Excluded(f(value)?),
        Bound::Unbounded => Bound::Unbounded,
    })
}

fn score_bound(attr: &AttributeModel, value: &Value) -> Result<f64, FilterError> {
    let coerced = value.coerce(attr.kind).map_err(|err| invalid_value(attr, &err))?;

    score_of(&coerced).ok_or_else(|| FilterError::InvalidValue {
        attribute: attr.name.to_string(),
        message: "range bounds cannot be null".to_string(),
    })
}

fn lex_text(attr: &AttributeModel, value: &Value) -> Result<String, FilterError> {
    match value.coerce(attr.kind).map_err(|err| invalid_value(attr, &err))? {
        Value::Text(text) => Ok(text),
        _ => Err(FilterError::InvalidValue {
            attribute: attr.name.to_string(),
            message: "range bounds cannot be null".to_string(),
        }),
    }
}

// Members are `<value>\0<id>`, so bounds on the value are shifted to bracket
// every id stored under it.
fn lex_lower(attr: &AttributeModel, bound: &Bound<Value>) -> Result<Bound<String>, FilterError> {
    Ok(match bound {
        Bound::Included(value) => Bound::Included(lex_text(attr, value)?),
        Bound::Excluded(value) => Bound::Included(format!("{}{LEX_SUCCESSOR}", lex_text(attr, value)?)),
        Bound::Unbounded => Bound::Unbounded,
    })
}

fn lex_upper(attr: &AttributeModel, bound: &Bound<Value>) -> Result<Bound<String>, FilterError> {
    Ok(match bound {
        Bound::Included(value) => Bound::Excluded(format!("{}{LEX_SUCCESSOR}", lex_text(attr, value)?)),
        Bound::Excluded(value) => Bound::Excluded(lex_text(attr, value)?),
        Bound::Unbounded => Bound::Unbounded,
    })
}

fn as_str_bound(bound: &Bound<String>) -> Bound<&str> {
    match bound {
        Bound::Included(text) => Bound::Included(text.as_str()),
        Bound::Excluded(text) => Bound::Excluded(text.as_str()),
        Bound::Unbounded => Bound::Unbounded,
    }
}
