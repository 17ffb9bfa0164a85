//! Module: backend
//! Responsibility: typed reads and atomic writes over one connection, and
//! the locking entry point for everything that touches more than one key.
//! Does not own: key naming (see `key`) or record semantics (see `entity`).

mod index;
mod mutation;

#[cfg(test)]
mod tests;

use crate::{
    config::Config,
    error::Error,
    filter::Filter,
    key::{Key, KeyShape, decode_scalar},
    lock::{ClassSet, DistributedLock, Lease, LockConfig, LockError, LockStrategy, NoopLock},
    model::{attribute::AttributeKind, attribute::AttributeModel, entity::EntityModel},
    store::{KeyValueOps, StoreError},
    value::Value,
};
use std::{cell::RefCell, collections::BTreeMap, time::Duration};
use tracing::{debug, warn};

// re-exports
pub use index::{IndexTarget, LEX_SEPARATOR, index_target, safe_value};
pub use mutation::{Member, Mutation};

pub(crate) use index::score_of;

///
/// BackendKind
///
/// KeyValue      → plain key-value server; multi-key writes need the lock
/// NativeAtomic  → store with its own atomicity; locking is a no-op
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BackendKind {
    KeyValue,
    NativeAtomic,
}

///
/// Backend
///
/// Per-execution-context handle: owns one connection and the lease held on
/// it. Not `Sync`; open one backend per thread.
///

pub struct Backend {
    kind: BackendKind,
    conn: Box<dyn KeyValueOps>,
    strategy: Box<dyn LockStrategy>,
    held: RefCell<Option<Lease>>,
}

impl Backend {
    /// Backend over a key-value server, serialized by the distributed lock.
    pub fn key_value(conn: impl KeyValueOps + 'static, config: LockConfig) -> Self {
        Self::with_strategy(BackendKind::KeyValue, conn, DistributedLock::new(config))
    }

    /// Backend over a natively atomic store; `lock` just runs its body.
    pub fn native_atomic(conn: impl KeyValueOps + 'static) -> Self {
        Self::with_strategy(BackendKind::NativeAtomic, conn, NoopLock::new())
    }

    /// Key-value backend configured from a loaded `Config`.
    pub fn from_config(conn: impl KeyValueOps + 'static, config: &Config) -> Self {
        Self::key_value(conn, config.lock.clone())
    }

    pub fn with_strategy(
        kind: BackendKind,
        conn: impl KeyValueOps + 'static,
        strategy: impl LockStrategy + 'static,
    ) -> Self {
        Self {
            kind,
            conn: Box::new(conn),
            strategy: Box::new(strategy),
            held: RefCell::new(None),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> BackendKind {
        self.kind
    }

    /// Raw connection, for reads the typed helpers do not cover.
    #[must_use]
    pub fn connection(&self) -> &dyn KeyValueOps {
        self.conn.as_ref()
    }

    /// Identifier this backend writes as lock owner.
    #[must_use]
    pub fn owner_id(&self) -> &str {
        self.strategy.owner()
    }

    /// Classes currently locked by this backend.
    #[must_use]
    pub fn held_classes(&self) -> Option<ClassSet> {
        self.held.borrow().as_ref().map(|lease| lease.classes.clone())
    }

    /// Filter over every record of `model`.
    #[must_use]
    pub fn filter(&self, model: &'static EntityModel) -> Filter<'_> {
        Filter::new(self, model)
    }

    // ------------------------------------------------------------------
    // Locking
    // ------------------------------------------------------------------

    /// Run `body` while holding the lock over `classes`.
    ///
    /// Nested calls inside a held lock run directly when the held classes
    /// cover the request, and fail with `ClassConflict` otherwise. The lock
    /// is released when `body` returns or panics; a failed release is logged
    /// and never replaces the body's result.
    pub fn lock<I, S, T>(&self, classes: I, body: impl FnOnce() -> Result<T, Error>) -> Result<T, Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let requested = ClassSet::new(classes);

        // decide under the borrow, run the body after it is dropped
        let reentrant = match self.held.borrow().as_ref() {
            Some(lease) if lease.classes.is_superset(&requested) => true,
            Some(lease) => {
                return Err(LockError::ClassConflict {
                    held: lease.classes.clone(),
                    requested,
                }
                .into());
            }
            None => false,
        };
        if reentrant {
            return body();
        }

        let lease = self.strategy.acquire(self.connection(), &requested)?;
        *self.held.borrow_mut() = Some(lease);

        let guard = ReleaseGuard {
            backend: self,
            armed: true,
        };
        let result = body();
        if let Err(err) = guard.release() {
            // the lease expires on its own; the body's outcome stands
            warn!(error = %err, "failed to release lock");
        }

        result
    }

    /// Push the held lease's expiry to `duration` from now.
    pub fn extend_lock(&self, duration: Duration) -> Result<(), Error> {
        let mut held = self.held.borrow_mut();
        let lease = held.as_mut().ok_or(LockError::NotHeld)?;

        self.strategy.extend(self.connection(), lease, duration)
    }

    fn release_held(&self) -> Result<(), Error> {
        let lease = self.held.borrow_mut().take();
        match lease {
            Some(lease) => self.strategy.release(self.connection(), &lease),
            None => Ok(()),
        }
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Apply every queued command in one atomic batch.
    pub fn apply(&self, mutation: Mutation) -> Result<(), Error> {
        if mutation.is_empty() {
            return Ok(());
        }

        let commands = mutation.into_commands();
        debug!(commands = commands.len(), "applying mutation");
        if !self.conn.exec(&commands)? {
            return Err(StoreError::Aborted.into());
        }

        Ok(())
    }

    pub fn set(&self, key: &Key, value: impl Into<String>) -> Result<(), Error> {
        let mut mutation = Mutation::new();
        mutation.set(key, value)?;

        self.apply(mutation)
    }

    pub fn add(&self, key: &Key, member: impl Into<Member>) -> Result<(), Error> {
        let mut mutation = Mutation::new();
        mutation.add(key, member)?;

        self.apply(mutation)
    }

    pub fn delete(&self, key: &Key, member: impl Into<Member>) -> Result<(), Error> {
        let mut mutation = Mutation::new();
        mutation.delete(key, member)?;

        self.apply(mutation)
    }

    pub fn move_member(
        &self,
        source: &Key,
        destination: &Key,
        member: impl Into<String>,
    ) -> Result<(), Error> {
        let mut mutation = Mutation::new();
        mutation.move_member(source, destination, member)?;

        self.apply(mutation)
    }

    pub fn clear(&self, key: &Key) -> Result<(), Error> {
        let mut mutation = Mutation::new();
        mutation.clear(key)?;

        self.apply(mutation)
    }

    /// Delete `key`; a value-index entry also leaves its parent set.
    pub fn purge(&self, key: &Key) -> Result<(), Error> {
        let mut mutation = Mutation::new();
        match key.index_parent() {
            Some((parent, fragment)) => mutation.purge_indexed(&parent, key, fragment),
            None => mutation.purge(key),
        };

        self.apply(mutation)
    }

    /// Issue the next id of `model`'s class.
    pub fn next_id(&self, model: &EntityModel) -> Result<String, Error> {
        let next = self.conn.incr(Key::id_sequence(model.name).name())?;

        Ok(next.to_string())
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Members of a set key.
    pub fn members(&self, key: &Key) -> Result<Vec<String>, Error> {
        key.expect_shape("members", &[KeyShape::Set])?;

        Ok(self.conn.smembers(key.name())?.into_iter().collect())
    }

    /// Whether `id` is a stored record of `model`.
    pub fn exists(&self, model: &EntityModel, id: &str) -> Result<bool, Error> {
        Ok(self.conn.sismember(model.ids_key().name(), id)?)
    }

    /// One attribute of one record.
    pub fn get(
        &self,
        model: &EntityModel,
        id: &str,
        attribute: &AttributeModel,
    ) -> Result<Value, Error> {
        let mut rows = self.fetch(model, &[id.to_string()], &[attribute])?;

        Ok(rows
            .pop()
            .and_then(|mut row| row.pop())
            .unwrap_or_default())
    }

    /// Batched attribute read: one row per id, one value per attribute, in
    /// the order given. Scalars are read with one pipelined `HGET` round;
    /// each collection attribute costs one read per id.
    pub fn fetch(
        &self,
        model: &EntityModel,
        ids: &[String],
        attributes: &[&AttributeModel],
    ) -> Result<Vec<Vec<Value>>, Error> {
        let mut rows = vec![vec![Value::Null; attributes.len()]; ids.len()];

        let mut requests = Vec::new();
        let mut slots = Vec::new();
        for (row, id) in ids.iter().enumerate() {
            let attrs_key = Key::attrs(model.name, id);
            for (col, attr) in attributes.iter().enumerate() {
                if attr.kind.is_scalar() {
                    requests.push((attrs_key.name().to_string(), attr.name.to_string()));
                    slots.push((row, col));
                }
            }
        }

        if !requests.is_empty() {
            let raw = self.conn.hget_many(&requests)?;
            for ((row, col), raw) in slots.into_iter().zip(raw) {
                if let Some(raw) = raw {
                    rows[row][col] = decode_scalar(attributes[col].kind, &raw)?;
                }
            }
        }

        for (row, id) in ids.iter().enumerate() {
            for (col, attr) in attributes.iter().enumerate() {
                if attr.kind.is_collection() {
                    rows[row][col] = self.read_collection(model, id, attr)?;
                }
            }
        }

        Ok(rows)
    }

    fn read_collection(
        &self,
        model: &EntityModel,
        id: &str,
        attr: &AttributeModel,
    ) -> Result<Value, Error> {
        let key = Key::attr(model.name, id, attr.name, attr.kind.storage_shape());
        let name = key.name();

        let value = match attr.kind {
            AttributeKind::List => Value::List(self.conn.lrange(name)?),
            AttributeKind::Set => Value::Set(self.conn.smembers(name)?),
            AttributeKind::Hash => Value::Hash(self.conn.hgetall(name)?),
            AttributeKind::SortedSet => Value::SortedSet(self.conn.zrange_with_scores(name)?),
            _ => Value::Null,
        };

        Ok(value)
    }

    /// Every scalar field stored for one record, keyed by attribute name.
    pub fn fields(&self, model: &EntityModel, id: &str) -> Result<BTreeMap<String, String>, Error> {
        Ok(self.conn.hgetall(Key::attrs(model.name, id).name())?)
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("kind", &self.kind)
            .field("owner", &self.owner_id())
            .field("held", &self.held_classes())
            .finish_non_exhaustive()
    }
}

///
/// ReleaseGuard
/// Releases the held lease if the locked body unwinds.
///

struct ReleaseGuard<'a> {
    backend: &'a Backend,
    armed: bool,
}

impl ReleaseGuard<'_> {
    fn release(mut self) -> Result<(), Error> {
        self.armed = false;

        self.backend.release_held()
    }
}

impl Drop for ReleaseGuard<'_> {
    fn drop(&mut self) {
        if self.armed
            && let Err(err) = self.backend.release_held()
        {
            warn!(error = %err, "failed to release lock while unwinding");
        }
    }
}
