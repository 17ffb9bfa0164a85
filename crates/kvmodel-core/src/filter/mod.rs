//! Module: filter
//! Responsibility: the lazy, immutable query pipeline over one entity class
//! and its terminal operations.
//! Does not own: index layout (see `backend`) or hydration (see `entity`).

mod condition;
mod eval;
mod step;


use crate::{
    backend::Backend,
    entity::{self, Entity, Record, RecordError},
    error::Error,
    key::{Key, KeyError, KeyShape},
    model::{association::AssociationModel, attribute::AttributeKind, entity::EntityModel},
    obs::sink::{self, MetricsEvent},
    value::compare_ids,
};
use eval::{Evaluator, WorkingSet};
use std::{collections::BTreeSet, marker::PhantomData};
use step::StepList;
use thiserror::Error as ThisError;
use tracing::debug;

// re-exports
pub use condition::{Condition, Conditions, RangeQuery};
pub use regex::Regex;
pub use step::{SetOp, SortDirection, SortKey, Step};

///
/// FilterError
///

#[remain::sorted]
#[derive(Debug, ThisError)]
pub enum FilterError {
    #[error("invalid range query on '{attribute}': {reason}")]
    InvalidRangeTarget {
        attribute: String,
        reason: &'static str,
    },

    #[error("Can't query non-string values via regexp ('{attribute}' is {kind})")]
    InvalidRegexTarget {
        attribute: String,
        kind: AttributeKind,
    },

    #[error("cannot sort on '{attribute}' of kind {kind}")]
    InvalidSortTarget {
        attribute: String,
        kind: AttributeKind,
    },

    #[error("invalid value for '{attribute}': {message}")]
    InvalidValue { attribute: String, message: String },

    #[error("property '{attribute}' is not indexed")]
    UnindexedAttribute { attribute: String },

    #[error("{entity} has no attribute '{attribute}'")]
    UnknownAttribute {
        entity: &'static str,
        attribute: String,
    },
}

///
/// Filter
///
/// Immutable description of a query over one entity class. Chain methods
/// return a new filter sharing this one's steps; nothing touches the store
/// until a terminal operation runs.
///

pub struct Filter<'a, E = Record> {
    backend: &'a Backend,
    model: &'static EntityModel,
    root: Key,
    steps: StepList,
    extra_locks: Vec<String>,
    _entity: PhantomData<fn() -> E>,
}

impl<'a, E: Entity> Filter<'a, E> {
    /// Filter over every record of `model`.
    #[must_use]
    pub fn new(backend: &'a Backend, model: &'static EntityModel) -> Self {
        Self {
            backend,
            model,
            root: model.ids_key(),
            steps: StepList::default(),
            extra_locks: Vec::new(),
            _entity: PhantomData,
        }
    }

    /// Filter whose root scope is the id set at `root` instead of the whole
    /// class.
    pub fn scoped(
        backend: &'a Backend,
        model: &'static EntityModel,
        root: Key,
    ) -> Result<Self, KeyError> {
        root.expect_shape("filter root", &[KeyShape::Set])?;

        Ok(Self {
            root,
            ..Self::new(backend, model)
        })
    }

    /// Same query, hydrating `T` instead.
    #[must_use]
    pub fn hydrate_as<T: Entity>(&self) -> Filter<'a, T> {
        Filter {
            backend: self.backend,
            model: self.model,
            root: self.root.clone(),
            steps: self.steps.clone(),
            extra_locks: self.extra_locks.clone(),
            _entity: PhantomData,
        }
    }

    #[must_use]
    pub const fn model(&self) -> &'static EntityModel {
        self.model
    }

    #[must_use]
    pub const fn root(&self) -> &Key {
        &self.root
    }

    /// Names of the queued steps, oldest first.
    #[must_use]
    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.to_vec().into_iter().map(Step::name).collect()
    }

    // ------------------------------------------------------------------
    // Chain
    // ------------------------------------------------------------------

    fn push(&self, step: Step) -> Self {
        Self {
            steps: self.steps.push(step),
            ..self.clone()
        }
    }

    /// Keep only ids matching every condition.
    #[must_use]
    pub fn intersect(&self, conditions: impl Into<Conditions>) -> Self {
        self.push(Step::Set {
            op: SetOp::Intersect,
            conditions: conditions.into(),
        })
    }

    /// Add root-scope ids matching every condition.
    #[must_use]
    pub fn union(&self, conditions: impl Into<Conditions>) -> Self {
        self.push(Step::Set {
            op: SetOp::Union,
            conditions: conditions.into(),
        })
    }

    /// Drop ids matching every condition.
    #[must_use]
    pub fn diff(&self, conditions: impl Into<Conditions>) -> Self {
        self.push(Step::Set {
            op: SetOp::Diff,
            conditions: conditions.into(),
        })
    }

    /// Order by one or more attributes; `"id"` orders by the natural id order.
    #[must_use]
    pub fn sort<I>(&self, keys: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<SortKey>,
    {
        self.push(Step::Sort {
            keys: keys.into_iter().map(Into::into).collect(),
        })
    }

    #[must_use]
    pub fn sort_by(&self, attribute: &str, direction: SortDirection) -> Self {
        self.sort([(attribute, direction)])
    }

    #[must_use]
    pub fn offset(&self, offset: usize, limit: Option<usize>) -> Self {
        self.push(Step::List { offset, limit })
    }

    /// One-based page of `per_page` ids; pages below 1 read as page 1.
    #[must_use]
    pub fn page(&self, page: usize, per_page: usize) -> Self {
        let page = page.max(1);

        self.offset(per_page.saturating_mul(page - 1), Some(per_page))
    }

    #[must_use]
    pub fn limit(&self, limit: usize) -> Self {
        self.offset(0, Some(limit))
    }

    #[must_use]
    pub fn empty(&self) -> Self {
        self.push(Step::Empty)
    }

    /// Also hold the lock on `classes` while a terminal runs.
    #[must_use]
    pub fn locking<I, S>(&self, classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut filter = self.clone();
        filter.extra_locks.extend(classes.into_iter().map(Into::into));

        filter
    }

    // ------------------------------------------------------------------
    // Terminals
    // ------------------------------------------------------------------

    /// Matching ids, in working-set order.
    pub fn ids(&self) -> Result<Vec<String>, Error> {
        if self.steps.is_empty() {
            return Ok(self.evaluate()?.into_ids());
        }

        self.locked(&[], || Ok(self.evaluate()?.into_ids()))
    }

    /// Number of matching ids; nothing is hydrated.
    pub fn count(&self) -> Result<usize, Error> {
        if self.steps.is_empty() {
            return Ok(self.backend.connection().scard(self.root.name())?);
        }

        self.locked(&[], || Ok(self.evaluate()?.len()))
    }

    /// Whether `id` is in the root scope, ignoring every step.
    pub fn exists(&self, id: &str) -> Result<bool, Error> {
        Ok(self.backend.connection().sismember(self.root.name(), id)?)
    }

    /// Whether `id` survives the filter.
    pub fn includes(&self, id: &str) -> Result<bool, Error> {
        if self.steps.is_empty() {
            return self.exists(id);
        }

        self.locked(&[], || Ok(self.evaluate()?.contains(id)))
    }

    pub fn find_by_id(&self, id: &str) -> Result<Option<E>, Error> {
        self.locked(&[], || {
            if !self.evaluate()?.contains(id) {
                return Ok(None);
            }

            E::load(self.backend, self.model, id)
        })
    }

    pub fn require_by_id(&self, id: &str) -> Result<E, Error> {
        self.find_by_id(id)?.ok_or_else(|| {
            RecordError::NotFound {
                class: self.model.name,
                id: id.to_string(),
            }
            .into()
        })
    }

    /// One slot per requested id, `None` where the id does not match.
    pub fn find_by_ids<S: AsRef<str>>(&self, ids: &[S]) -> Result<Vec<Option<E>>, Error> {
        self.locked(&[], || {
            let working = self.evaluate()?;
            let wanted: Vec<String> = ids
                .iter()
                .map(|id| id.as_ref())
                .filter(|id| working.contains(id))
                .map(str::to_string)
                .collect();
            let mut loaded = E::load_many(self.backend, self.model, &wanted)?.into_iter();

            Ok(ids
                .iter()
                .map(|id| {
                    if working.contains(id.as_ref()) {
                        loaded.next().flatten()
                    } else {
                        None
                    }
                })
                .collect())
        })
    }

    pub fn require_by_ids<S: AsRef<str>>(&self, ids: &[S]) -> Result<Vec<E>, Error> {
        let found = self.find_by_ids(ids)?;

        let missing: Vec<String> = ids
            .iter()
            .zip(&found)
            .filter(|(_, entity)| entity.is_none())
            .map(|(id, _)| id.as_ref().to_string())
            .collect();
        if !missing.is_empty() {
            return Err(RecordError::NotFoundMany {
                class: self.model.name,
                ids: missing,
            }
            .into());
        }

        Ok(found.into_iter().flatten().collect())
    }

    pub fn first(&self) -> Result<Option<E>, Error> {
        self.locked(&[], || {
            let Some(id) = self.evaluate()?.into_ids().into_iter().next() else {
                return Ok(None);
            };

            E::load(self.backend, self.model, &id)
        })
    }

    /// Every matching entity, hydrated in working-set order.
    pub fn all(&self) -> Result<Vec<E>, Error> {
        self.locked(&[], || self.hydrate())
    }

    pub fn each(&self, mut f: impl FnMut(E)) -> Result<(), Error> {
        for entity in self.all()? {
            f(entity);
        }

        Ok(())
    }

    pub fn collect<T>(&self, f: impl FnMut(E) -> T) -> Result<Vec<T>, Error> {
        Ok(self.all()?.into_iter().map(f).collect())
    }

    pub fn select(&self, mut f: impl FnMut(&E) -> bool) -> Result<Vec<E>, Error> {
        Ok(self.all()?.into_iter().filter(|entity| f(entity)).collect())
    }

    pub fn reject(&self, mut f: impl FnMut(&E) -> bool) -> Result<Vec<E>, Error> {
        Ok(self.all()?.into_iter().filter(|entity| !f(entity)).collect())
    }

    /// Destroy every matching entity under the lock of this class and every
    /// associated class. Returns how many were destroyed.
    pub fn destroy_all(&self) -> Result<usize, Error> {
        let associated: Vec<&str> = self.model.associated_classes().into_iter().collect();

        self.locked(&associated, || {
            let entities = self.hydrate()?;
            let count = entities.len();
            for entity in entities {
                entity.destroy(self.backend)?;
            }

            debug!(entity = self.model.name, count, "filter destroyed records");
            Ok(count)
        })
    }

    /// Ids linked through association `name` from every matching record,
    /// deduplicated, in natural id order.
    pub fn associated_ids_for(&self, name: &str) -> Result<Vec<String>, Error> {
        let assoc = self.association(name)?;

        self.locked(&[assoc.target.name], || self.collect_associated(assoc))
    }

    /// Records linked through association `name` from every matching record.
    pub fn associations_for<T: Entity>(&self, name: &str) -> Result<Vec<T>, Error> {
        let assoc = self.association(name)?;

        self.locked(&[assoc.target.name], || {
            let ids = self.collect_associated(assoc)?;

            Ok(T::load_many(self.backend, assoc.target, &ids)?
                .into_iter()
                .flatten()
                .collect())
        })
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    // Lock this class, the extra classes and `also`, then run `body`.
    fn locked<T>(&self, also: &[&str], body: impl FnOnce() -> Result<T, Error>) -> Result<T, Error> {
        let classes = std::iter::once(self.model.name.to_string())
            .chain(self.extra_locks.iter().cloned())
            .chain(also.iter().map(|class| (*class).to_string()));

        self.backend.lock(classes, body)
    }

    fn evaluate(&self) -> Result<WorkingSet, Error> {
        let steps = self.steps.to_vec();
        let working = Evaluator::new(self.backend, self.model, &self.root).run(&steps)?;

        let rows = working.len();
        debug!(
            entity = self.model.name,
            steps = steps.len(),
            rows,
            "filter executed"
        );
        sink::record(MetricsEvent::FilterExec {
            entity: self.model.name,
            steps: u64::try_from(steps.len()).unwrap_or(u64::MAX),
            rows: u64::try_from(rows).unwrap_or(u64::MAX),
        });

        Ok(working)
    }

    fn hydrate(&self) -> Result<Vec<E>, Error> {
        let ids = self.evaluate()?.into_ids();

        Ok(E::load_many(self.backend, self.model, &ids)?
            .into_iter()
            .flatten()
            .collect())
    }

    fn association(&self, name: &str) -> Result<&'static AssociationModel, RecordError> {
        self.model
            .association(name)
            .ok_or_else(|| RecordError::UnknownAssociation {
                class: self.model.name,
                association: name.to_string(),
            })
    }

    fn collect_associated(&self, assoc: &AssociationModel) -> Result<Vec<String>, Error> {
        let mut linked = BTreeSet::new();
        for id in self.evaluate()?.into_ids() {
            linked.extend(entity::associated_ids(self.backend, self.model, assoc, &id)?);
        }

        let mut linked: Vec<String> = linked.into_iter().collect();
        linked.sort_by(|a, b| compare_ids(a, b));

        Ok(linked)
    }
}

impl<E> Clone for Filter<'_, E> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend,
            model: self.model,
            root: self.root.clone(),
            steps: self.steps.clone(),
            extra_locks: self.extra_locks.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E> std::fmt::Debug for Filter<'_, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Filter")
            .field("entity", &self.model.name)
            .field("root", &self.root)
            .field("steps", &self.steps.len())
            .field("extra_locks", &self.extra_locks)
            .finish_non_exhaustive()
    }
}
