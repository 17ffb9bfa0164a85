//! Module: lock
//! Responsibility: exclusive access to groups of entity classes across
//! processes, using only atomic key-store primitives.
//! Does not own: re-entrancy (the backend tracks the held lease) or the
//! choice of strategy (made when the backend is built).

mod config;
mod distributed;

#[cfg(test)]
mod tests;

use crate::{error::Error, store::KeyValueOps};
use chrono::{DateTime, Utc};
use derive_more::Deref;
use std::{
    fmt::{self, Display},
    time::Duration,
};
use thiserror::Error as ThisError;

// re-exports
pub use config::LockConfig;
pub use distributed::DistributedLock;

///
/// LockError
///

#[remain::sorted]
#[derive(Debug, ThisError)]
pub enum LockError {
    #[error("lock over [{held}] is held; cannot take [{requested}] inside it")]
    ClassConflict { held: ClassSet, requested: ClassSet },

    #[error("could not acquire lock on [{resources}]")]
    NotAcquired { resources: ClassSet },

    #[error("no lock is held")]
    NotHeld,
}

///
/// ClassSet
///
/// Sorted, de-duplicated class names. Locks are always taken in this order.
///

#[derive(Clone, Debug, Default, Deref, Eq, Hash, PartialEq)]
pub struct ClassSet(Vec<String>);

impl ClassSet {
    pub fn new<I, S>(classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut classes: Vec<String> = classes.into_iter().map(Into::into).collect();
        classes.sort();
        classes.dedup();

        Self(classes)
    }

    /// Whether every class of `other` is in this set.
    #[must_use]
    pub fn is_superset(&self, other: &Self) -> bool {
        other
            .0
            .iter()
            .all(|class| self.0.binary_search(class).is_ok())
    }
}

impl Display for ClassSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(", "))
    }
}

impl<'a> IntoIterator for &'a ClassSet {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

///
/// Lease
///
/// Proof of a held lock. `expires_at` is `None` for strategies without
/// expiry keys.
///

#[derive(Clone, Debug)]
pub struct Lease {
    pub classes: ClassSet,
    pub owner: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub duration: Duration,
}

///
/// LockStrategy
///
/// How a backend serializes access to its classes. Selected once, when the
/// backend is constructed.
///

pub trait LockStrategy {
    /// Identifier written as the owner of every acquired class.
    fn owner(&self) -> &str;

    /// Block until every class is held or the strategy gives up.
    fn acquire(&self, conn: &dyn KeyValueOps, classes: &ClassSet) -> Result<Lease, Error>;

    /// Push the lease's expiry to `duration` from now.
    fn extend(
        &self,
        conn: &dyn KeyValueOps,
        lease: &mut Lease,
        duration: Duration,
    ) -> Result<(), Error>;

    /// Release the lease. Losing ownership in the meantime is not an error.
    fn release(&self, conn: &dyn KeyValueOps, lease: &Lease) -> Result<(), Error>;
}

///
/// NoopLock
///
/// For stores whose writes are atomic on their own: acquiring never waits
/// and releasing touches nothing.
///

#[derive(Debug)]
pub struct NoopLock {
    owner: String,
}

impl NoopLock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            owner: ulid::Ulid::new().to_string(),
        }
    }
}

impl Default for NoopLock {
    fn default() -> Self {
        Self::new()
    }
}

impl LockStrategy for NoopLock {
    fn owner(&self) -> &str {
        &self.owner
    }

    fn acquire(&self, _conn: &dyn KeyValueOps, classes: &ClassSet) -> Result<Lease, Error> {
        Ok(Lease {
            classes: classes.clone(),
            owner: self.owner.clone(),
            expires_at: None,
            duration: Duration::ZERO,
        })
    }

    fn extend(
        &self,
        _conn: &dyn KeyValueOps,
        lease: &mut Lease,
        duration: Duration,
    ) -> Result<(), Error> {
        lease.duration = duration;

        Ok(())
    }

    fn release(&self, _conn: &dyn KeyValueOps, _lease: &Lease) -> Result<(), Error> {
        Ok(())
    }
}
