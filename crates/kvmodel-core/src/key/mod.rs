//! Module: key
//! Responsibility: key naming, fragment escaping, and value encoding.
//! Does not own: any I/O; every function here is pure.

mod encode;
mod escape;


use std::fmt::{self, Display};
use thiserror::Error as ThisError;

pub use encode::{IndexFragment, TypeTag, decode_scalar, encode_index_key, encode_scalar};
pub use escape::{escape, unescape};

///
/// KeyError
///

#[remain::sorted]
#[derive(Debug, ThisError)]
pub enum KeyError {
    #[error("key '{key}' has shape {shape}, which cannot hold a {member} member")]
    InvalidMember {
        key: String,
        shape: KeyShape,
        member: &'static str,
    },

    #[error("key '{key}' has shape {shape}, which does not support {operation}")]
    ShapeMismatch {
        key: String,
        shape: KeyShape,
        operation: &'static str,
    },
}

///
/// KeyShape
/// Declared storage shape of a key.
///

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum KeyShape {
    Scalar,
    List,
    Set,
    Hash,
    SortedSet,
}

impl KeyShape {
    #[must_use]
    pub const fn is_collection(self) -> bool {
        !matches!(self, Self::Scalar)
    }
}

impl Display for KeyShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Scalar => "scalar",
            Self::List => "list",
            Self::Set => "set",
            Self::Hash => "hash",
            Self::SortedSet => "sorted_set",
        };

        f.write_str(label)
    }
}

///
/// Key
///
/// A namespaced store location plus its declared shape.
///
/// `<class>:<id>:attrs[:<attr>]`                      per-record storage
/// `<class>::attrs:ids`                               class id membership
/// `<class>::indices:by_<attr>[:<type>:<value>]`      indices
/// `<class>::lock:{owner,expires_at}`                 lock lease
///

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Key {
    name: String,
    shape: KeyShape,
}

impl Key {
    #[must_use]
    pub fn new(name: impl Into<String>, shape: KeyShape) -> Self {
        Self {
            name: name.into(),
            shape,
        }
    }

    // ------------------------------------------------------------------
    // Layout
    // ------------------------------------------------------------------

    /// Membership set of every id of `class`.
    #[must_use]
    pub fn ids(class: &str) -> Self {
        Self::new(format!("{}::attrs:ids", escape(class)), KeyShape::Set)
    }

    /// Counter issuing new ids for `class`.
    #[must_use]
    pub fn id_sequence(class: &str) -> Self {
        Self::new(format!("{}::attrs:id_seq", escape(class)), KeyShape::Scalar)
    }

    /// Hash holding every scalar attribute of one record.
    #[must_use]
    pub fn attrs(class: &str, id: &str) -> Self {
        Self::new(
            format!("{}:{}:attrs", escape(class), escape(id)),
            KeyShape::Hash,
        )
    }

    /// Key owned by one collection attribute of one record.
    #[must_use]
    pub fn attr(class: &str, id: &str, attr: &str, shape: KeyShape) -> Self {
        Self::new(
            format!("{}:{}:attrs:{}", escape(class), escape(id), escape(attr)),
            shape,
        )
    }

    /// Top-level key of the index over `attr`.
    #[must_use]
    pub fn index(class: &str, attr: &str, shape: KeyShape) -> Self {
        Self::new(
            format!("{}::indices:by_{}", escape(class), escape(attr)),
            shape,
        )
    }

    /// Id set of one value-index entry.
    #[must_use]
    pub fn index_entry(class: &str, attr: &str, fragment: &IndexFragment) -> Self {
        Self::new(
            format!("{}::indices:by_{}:{fragment}", escape(class), escape(attr)),
            KeyShape::Set,
        )
    }

    /// Lock owner key for `class`.
    #[must_use]
    pub fn lock_owner(class: &str) -> Self {
        Self::new(format!("{}::lock:owner", escape(class)), KeyShape::Scalar)
    }

    /// Lock expiry key for `class`.
    #[must_use]
    pub fn lock_expiry(class: &str) -> Self {
        Self::new(
            format!("{}::lock:expires_at", escape(class)),
            KeyShape::Scalar,
        )
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn shape(&self) -> KeyShape {
        self.shape
    }

    /// Parent set and fragment of a value-index entry key; `None` for any
    /// other key.
    #[must_use]
    pub fn index_parent(&self) -> Option<(Self, &str)> {
        const MARKER: &str = "::indices:by_";

        if self.shape != KeyShape::Set {
            return None;
        }
        let start = self.name.find(MARKER)? + MARKER.len();
        let split = start + self.name[start..].find(':')?;
        let fragment = &self.name[split + 1..];
        if fragment.is_empty() {
            return None;
        }

        Some((Self::new(&self.name[..split], KeyShape::Set), fragment))
    }

    /// Fail unless this key has one of the `allowed` shapes.
    pub fn expect_shape(
        &self,
        operation: &'static str,
        allowed: &[KeyShape],
    ) -> Result<(), KeyError> {
        if allowed.contains(&self.shape) {
            Ok(())
        } else {
            Err(KeyError::ShapeMismatch {
                key: self.name.clone(),
                shape: self.shape,
                operation,
            })
        }
    }
}

impl Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
