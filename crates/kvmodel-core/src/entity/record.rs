use crate::{
    backend::{Backend, IndexTarget, Member, Mutation, index_target},
    entity::{Entity, RecordError, association},
    error::Error,
    key::{Key, encode_scalar},
    model::{attribute::AttributeModel, entity::EntityModel, index::IndexKind},
    obs::sink::{self, ExecKind, MetricsEvent},
    value::Value,
};
use std::collections::BTreeMap;
use tracing::debug;

static NULL: Value = Value::Null;

///
/// Record
///
/// Dynamically typed record of one entity model. Values are coerced to the
/// declared attribute kind on `set`; unset attributes read as `Null` (or an
/// empty collection once loaded from the store).
///

#[derive(Clone, Debug)]
pub struct Record {
    model: &'static EntityModel,
    id: Option<String>,
    values: BTreeMap<&'static str, Value>,
}

impl Record {
    /// New, unsaved record; `save` assigns the id.
    #[must_use]
    pub const fn new(model: &'static EntityModel) -> Self {
        Self {
            model,
            id: None,
            values: BTreeMap::new(),
        }
    }

    /// Record with a caller-chosen id.
    #[must_use]
    pub fn with_id(model: &'static EntityModel, id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::new(model)
        }
    }

    #[must_use]
    pub const fn model(&self) -> &'static EntityModel {
        self.model
    }

    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Current value of `name`; `Null` when unset or undeclared.
    #[must_use]
    pub fn get(&self, name: &str) -> &Value {
        self.values.get(name).unwrap_or(&NULL)
    }

    /// Set attribute `name`, coercing `value` to its declared kind.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<&mut Self, Error> {
        let attr = self.attribute(name)?;
        let value = value.into().coerce(attr.kind)?;

        if is_unset(&value) {
            self.values.remove(attr.name);
        } else {
            self.values.insert(attr.name, value);
        }

        Ok(self)
    }

    /// Builder form of `set`.
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Result<Self, Error> {
        self.set(name, value)?;

        Ok(self)
    }

    /// Set attributes, by name.
    pub fn values(&self) -> impl Iterator<Item = (&'static str, &Value)> {
        self.values.iter().map(|(name, value)| (*name, value))
    }

    fn attribute(&self, name: &str) -> Result<&'static AttributeModel, RecordError> {
        self.model
            .attribute(name)
            .ok_or_else(|| RecordError::UnknownAttribute {
                class: self.model.name,
                attribute: name.to_string(),
            })
    }

    // ------------------------------------------------------------------
    // Associations
    // ------------------------------------------------------------------

    /// Ids linked through association `name`; empty for unsaved records.
    pub fn associated_ids(&self, backend: &Backend, name: &str) -> Result<Vec<String>, Error> {
        let assoc = self
            .model
            .association(name)
            .ok_or_else(|| RecordError::UnknownAssociation {
                class: self.model.name,
                association: name.to_string(),
            })?;
        let Some(id) = &self.id else {
            return Ok(Vec::new());
        };

        association::associated_ids(backend, self.model, assoc, id)
    }

    /// Records linked through association `name`.
    pub fn associated(&self, backend: &Backend, name: &str) -> Result<Vec<Self>, Error> {
        let ids = self.associated_ids(backend, name)?;
        let Some(assoc) = self.model.association(name) else {
            return Ok(Vec::new());
        };

        Ok(Self::load_many(backend, assoc.target, &ids)?
            .into_iter()
            .flatten()
            .collect())
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Write the record and maintain every index, atomically and under the
    /// class lock. New records get the next id of their class.
    pub fn save(&mut self, backend: &Backend) -> Result<(), Error> {
        backend.lock([self.model.name], || self.save_locked(backend))
    }

    fn save_locked(&mut self, backend: &Backend) -> Result<(), Error> {
        let model = self.model;
        let id = match &self.id {
            Some(id) => id.clone(),
            None => backend.next_id(model)?,
        };
        let previous = Self::load(backend, model, &id)?;
        self.check_unique(backend, &id)?;

        let mut mutation = Mutation::new();
        mutation.add(&model.ids_key(), id.as_str())?;
        self.write_attributes(&mut mutation, &id)?;
        let (inserts, removes) = self.write_indices(backend, &mut mutation, &id, previous.as_ref())?;
        backend.apply(mutation)?;

        debug!(entity = model.name, id = %id, inserts, removes, "record saved");
        sink::record(MetricsEvent::IndexDelta {
            entity: model.name,
            inserts,
            removes,
        });
        sink::record(MetricsEvent::Exec {
            kind: ExecKind::Save,
            entity: model.name,
            rows: 1,
        });
        self.id = Some(id);

        Ok(())
    }

    // A unique value already mapped to another id rejects the save.
    fn check_unique(&self, backend: &Backend, id: &str) -> Result<(), Error> {
        let unique = self
            .model
            .indexed_attributes()
            .filter(|attr| attr.index == Some(IndexKind::Unique));

        for attr in unique {
            let Some(IndexTarget::Unique { hash, field }) =
                index_target(self.model, attr, self.get(attr.name))?
            else {
                continue;
            };

            if let Some(owner) = backend.connection().hget(hash.name(), &field)?
                && owner != id
            {
                sink::record(MetricsEvent::UniqueViolation {
                    entity: self.model.name,
                });

                return Err(RecordError::UniqueViolation {
                    class: self.model.name,
                    attribute: attr.name,
                    value: encode_scalar(attr.kind, self.get(attr.name))?.unwrap_or_default(),
                    owner,
                }
                .into());
            }
        }

        Ok(())
    }

    fn write_attributes(&self, mutation: &mut Mutation, id: &str) -> Result<(), Error> {
        let model = self.model;
        let attrs_key = Key::attrs(model.name, id);

        for attr in model.attributes {
            let value = self.get(attr.name);

            if attr.kind.is_scalar() {
                match encode_scalar(attr.kind, value)? {
                    Some(text) => mutation.add(&attrs_key, Member::field(attr.name, text))?,
                    None => mutation.delete(&attrs_key, attr.name)?,
                };
                continue;
            }

            // collections are rewritten wholesale
            let key = Key::attr(model.name, id, attr.name, attr.kind.storage_shape());
            mutation.clear(&key)?;
            match value {
                Value::List(items) => {
                    for item in items {
                        mutation.add(&key, item)?;
                    }
                }
                Value::Set(items) => {
                    for item in items {
                        mutation.add(&key, item)?;
                    }
                }
                Value::Hash(fields) => {
                    for (field, value) in fields {
                        mutation.add(&key, Member::field(field.as_str(), value.as_str()))?;
                    }
                }
                Value::SortedSet(members) => {
                    for (member, score) in members {
                        mutation.add(&key, Member::scored(member.as_str(), *score))?;
                    }
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// Queue index maintenance against the previously stored version.
    /// Returns `(inserts, removes)`.
    fn write_indices(
        &self,
        backend: &Backend,
        mutation: &mut Mutation,
        id: &str,
        previous: Option<&Self>,
    ) -> Result<(u64, u64), Error> {
        let model = self.model;
        let (mut inserts, mut removes) = (0, 0);

        for attr in model.indexed_attributes() {
            let new = index_target(model, attr, self.get(attr.name))?;
            let old = match previous {
                Some(prev) => index_target(model, attr, prev.get(attr.name))?,
                None => None,
            };
            if previous.is_some() && old == new {
                continue;
            }

            match (old, new) {
                // value index: relocate the id between entries in one step
                (
                    Some(IndexTarget::Value {
                        parent,
                        entry: old_entry,
                        fragment: old_fragment,
                    }),
                    Some(IndexTarget::Value {
                        entry: new_entry,
                        fragment: new_fragment,
                        ..
                    }),
                ) => {
                    mutation.move_member(&old_entry, &new_entry, id)?;
                    mutation.add(&parent, new_fragment.to_string())?;
                    if vacates(backend, &old_entry, id)? {
                        mutation.delete(&parent, old_fragment.to_string())?;
                    }
                    inserts += 1;
                    removes += 1;
                }
                (old, new) => {
                    if let Some(old) = old {
                        let vacated = match &old {
                            IndexTarget::Value { entry, .. } => vacates(backend, entry, id)?,
                            _ => false,
                        };
                        old.remove(mutation, id, vacated)?;
                        removes += 1;
                    }
                    if let Some(new) = new {
                        new.insert(mutation, id)?;
                        inserts += 1;
                    }
                }
            }
        }

        Ok((inserts, removes))
    }

    fn destroy_locked(&self, backend: &Backend) -> Result<(), Error> {
        let model = self.model;
        let Some(id) = &self.id else {
            return Ok(());
        };
        // index entries follow what is stored, not the in-memory copy
        let Some(stored) = Self::load(backend, model, id)? else {
            return Ok(());
        };

        let mut mutation = Mutation::new();
        mutation.delete(&model.ids_key(), id.as_str())?;
        mutation.purge(&Key::attrs(model.name, id));
        for attr in model.attributes.iter().filter(|a| a.kind.is_collection()) {
            mutation.purge(&Key::attr(
                model.name,
                id,
                attr.name,
                attr.kind.storage_shape(),
            ));
        }

        let mut removes = 0;
        for attr in model.indexed_attributes() {
            let Some(target) = index_target(model, attr, stored.get(attr.name))? else {
                continue;
            };
            let vacated = match &target {
                IndexTarget::Value { entry, .. } => vacates(backend, entry, id)?,
                _ => false,
            };
            target.remove(&mut mutation, id, vacated)?;
            removes += 1;
        }
        backend.apply(mutation)?;

        debug!(entity = model.name, id = %id, "record destroyed");
        sink::record(MetricsEvent::IndexDelta {
            entity: model.name,
            inserts: 0,
            removes,
        });
        sink::record(MetricsEvent::Exec {
            kind: ExecKind::Destroy,
            entity: model.name,
            rows: 1,
        });

        Ok(())
    }

    fn from_row(
        model: &'static EntityModel,
        id: String,
        attributes: &[&'static AttributeModel],
        row: Vec<Value>,
    ) -> Self {
        let values = attributes
            .iter()
            .zip(row)
            .filter(|(_, value)| !is_unset(value))
            .map(|(attr, value)| (attr.name, value))
            .collect();

        Self {
            model,
            id: Some(id),
            values,
        }
    }
}

impl Entity for Record {
    fn load(
        backend: &Backend,
        model: &'static EntityModel,
        id: &str,
    ) -> Result<Option<Self>, Error> {
        let mut loaded = Self::load_many(backend, model, &[id.to_string()])?;

        Ok(loaded.pop().flatten())
    }

    fn load_many(
        backend: &Backend,
        model: &'static EntityModel,
        ids: &[String],
    ) -> Result<Vec<Option<Self>>, Error> {
        let mut present = Vec::with_capacity(ids.len());
        for id in ids {
            present.push(backend.exists(model, id)?);
        }

        let wanted: Vec<String> = ids
            .iter()
            .zip(&present)
            .filter(|(_, present)| **present)
            .map(|(id, _)| id.clone())
            .collect();
        let attributes: Vec<&'static AttributeModel> = model.attributes.iter().collect();
        let mut rows = backend.fetch(model, &wanted, &attributes)?.into_iter();

        let mut out = Vec::with_capacity(ids.len());
        for (id, present) in ids.iter().zip(present) {
            let record = if present {
                rows.next()
                    .map(|row| Self::from_row(model, id.clone(), &attributes, row))
            } else {
                None
            };
            out.push(record);
        }

        sink::record(MetricsEvent::Exec {
            kind: ExecKind::Load,
            entity: model.name,
            rows: u64::try_from(wanted.len()).unwrap_or(u64::MAX),
        });

        Ok(out)
    }

    fn destroy(self, backend: &Backend) -> Result<(), Error> {
        backend.lock([self.model.name], || self.destroy_locked(backend))
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.model.name == other.model.name && self.id == other.id && self.values == other.values
    }
}

// Null and empty collections both mean "not stored".
fn is_unset(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::List(v) => v.is_empty(),
        Value::Set(v) => v.is_empty(),
        Value::Hash(v) => v.is_empty(),
        Value::SortedSet(v) => v.is_empty(),
        _ => false,
    }
}

// Whether removing `id` leaves the value-index entry empty.
fn vacates(backend: &Backend, entry: &Key, id: &str) -> Result<bool, Error> {
    let members = backend.members(entry)?;

    Ok(members.iter().all(|member| member == id))
}
