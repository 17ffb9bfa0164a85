//! Module: entity
//! Responsibility: hydrating, saving and destroying records, and resolving
//! associations between them.
//! Does not own: query planning (see `filter`) or raw key access (see
//! `backend`).

mod association;
mod record;

#[cfg(test)]
mod tests;

use crate::{backend::Backend, error::Error, model::entity::EntityModel};
use thiserror::Error as ThisError;

// re-exports
pub use association::associated_ids;
pub use record::Record;

///
/// RecordError
///

#[remain::sorted]
#[derive(Debug, ThisError)]
pub enum RecordError {
    #[error("{class} record '{id}' not found")]
    NotFound { class: &'static str, id: String },

    #[error("{class} records not found: {}", ids.join(", "))]
    NotFoundMany {
        class: &'static str,
        ids: Vec<String>,
    },

    #[error("{class}.{attribute} value '{value}' already belongs to record '{owner}'")]
    UniqueViolation {
        class: &'static str,
        attribute: &'static str,
        value: String,
        owner: String,
    },

    #[error("{class} has no association '{association}'")]
    UnknownAssociation {
        class: &'static str,
        association: String,
    },

    #[error("{class} has no attribute '{attribute}'")]
    UnknownAttribute {
        class: &'static str,
        attribute: String,
    },
}

///
/// Entity
///
/// A type the filter pipeline can hydrate and destroy. `Record` is the
/// built-in implementation; typed wrappers usually delegate to it.
///

pub trait Entity: Sized {
    /// Load one record; `None` when `id` is not a stored record of `model`.
    fn load(backend: &Backend, model: &'static EntityModel, id: &str)
    -> Result<Option<Self>, Error>;

    /// Load several records, preserving the order of `ids`.
    fn load_many(
        backend: &Backend,
        model: &'static EntityModel,
        ids: &[String],
    ) -> Result<Vec<Option<Self>>, Error> {
        ids.iter().map(|id| Self::load(backend, model, id)).collect()
    }

    /// Remove the record, its attributes and its index entries.
    fn destroy(self, backend: &Backend) -> Result<(), Error>;
}
