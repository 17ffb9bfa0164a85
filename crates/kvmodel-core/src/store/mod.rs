//! Module: store
//! Responsibility: the connection boundary consumed by the backend.
//! Does not own: dialing servers, pooling, or key naming.
//!
//! `KeyValueOps` lists exactly the primitives the record layer needs from a
//! Redis-like server. Implementations wrap a real client; `MemoryStore` is the
//! in-process implementation used by tests and embedded callers.

mod memory;

#[cfg(test)]
mod tests;

use std::{
    collections::{BTreeMap, BTreeSet},
    ops::Bound,
};
use thiserror::Error as ThisError;

// re-exports
pub use memory::{MemoryConnection, MemoryStore};

///
/// StoreError
///

#[remain::sorted]
#[derive(Debug, ThisError)]
pub enum StoreError {
    #[error("transaction aborted")]
    Aborted,

    #[error("store unreachable: {message}")]
    Connectivity { message: String },

    #[error("corrupt data under '{key}': {message}")]
    Corrupt { key: String, message: String },

    #[error("operation against '{key}' holding the wrong kind of value (expected {expected})")]
    WrongType { key: String, expected: &'static str },
}

impl StoreError {
    pub(crate) fn corrupt(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Corrupt {
            key: key.into(),
            message: message.into(),
        }
    }
}

///
/// Command
///
/// One write queued into an atomic batch (`MULTI`/`EXEC`).
///

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Set {
        key: String,
        value: String,
    },
    Del {
        key: String,
    },
    HSet {
        key: String,
        field: String,
        value: String,
    },
    HDel {
        key: String,
        field: String,
    },
    SAdd {
        key: String,
        member: String,
    },
    SRem {
        key: String,
        member: String,
    },
    SMove {
        source: String,
        destination: String,
        member: String,
    },
    ZAdd {
        key: String,
        member: String,
        score: f64,
    },
    ZRem {
        key: String,
        member: String,
    },
    RPush {
        key: String,
        value: String,
    },
}

impl Command {
    /// Name of the store command, for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Set { .. } => "SET",
            Self::Del { .. } => "DEL",
            Self::HSet { .. } => "HSET",
            Self::HDel { .. } => "HDEL",
            Self::SAdd { .. } => "SADD",
            Self::SRem { .. } => "SREM",
            Self::SMove { .. } => "SMOVE",
            Self::ZAdd { .. } => "ZADD",
            Self::ZRem { .. } => "ZREM",
            Self::RPush { .. } => "RPUSH",
        }
    }
}

///
/// KeyValueOps
///
/// Connection handle for one execution context.
///
/// `watch` state belongs to the handle: `exec` applies its batch only when no
/// watched key changed since `watch`, and always clears the watch list.
/// Collection reads on a missing key return an empty collection.
///

pub trait KeyValueOps {
    // ------------------------------------------------------------------
    // Scalars
    // ------------------------------------------------------------------

    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, StoreError>;

    /// `MSETNX`: set every pair only if none of the keys exist.
    fn set_all_if_absent(&self, pairs: &[(String, String)]) -> Result<bool, StoreError>;

    fn incr(&self, key: &str) -> Result<i64, StoreError>;

    // ------------------------------------------------------------------
    // Sets
    // ------------------------------------------------------------------

    fn smembers(&self, key: &str) -> Result<BTreeSet<String>, StoreError>;

    fn sismember(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    fn scard(&self, key: &str) -> Result<usize, StoreError>;

    fn sunion(&self, keys: &[String]) -> Result<BTreeSet<String>, StoreError>;

    fn sinter(&self, keys: &[String]) -> Result<BTreeSet<String>, StoreError>;

    /// Members of the first set absent from every other set.
    fn sdiff(&self, keys: &[String]) -> Result<BTreeSet<String>, StoreError>;

    // ------------------------------------------------------------------
    // Sorted sets
    // ------------------------------------------------------------------

    fn zrange_by_score(
        &self,
        key: &str,
        min: Bound<f64>,
        max: Bound<f64>,
    ) -> Result<Vec<String>, StoreError>;

    /// Members between `min` and `max` in byte order; meaningful when every
    /// member shares one score.
    fn zrange_by_lex(
        &self,
        key: &str,
        min: Bound<&str>,
        max: Bound<&str>,
    ) -> Result<Vec<String>, StoreError>;

    fn zrange_with_scores(&self, key: &str) -> Result<Vec<(String, f64)>, StoreError>;

    // ------------------------------------------------------------------
    // Hashes and lists
    // ------------------------------------------------------------------

    fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError>;

    /// Pipelined `HGET` over `(key, field)` pairs.
    fn hget_many(&self, requests: &[(String, String)]) -> Result<Vec<Option<String>>, StoreError>;

    fn hgetall(&self, key: &str) -> Result<BTreeMap<String, String>, StoreError>;

    /// Every element of the list under `key`.
    fn lrange(&self, key: &str) -> Result<Vec<String>, StoreError>;

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    fn watch(&self, keys: &[String]) -> Result<(), StoreError>;

    fn unwatch(&self) -> Result<(), StoreError>;

    /// Apply `commands` atomically. Returns `false` (and applies nothing)
    /// when a watched key changed.
    fn exec(&self, commands: &[Command]) -> Result<bool, StoreError>;
}
