//! Static schema descriptors for entities, attributes, indices and
//! associations. Declared once per entity type; the core never builds them at
//! runtime.

pub mod association;
pub mod attribute;
pub mod entity;
pub mod index;


use crate::model::{attribute::AttributeKind, index::IndexKind};
use thiserror::Error as ThisError;

///
/// ModelError
///

#[remain::sorted]
#[derive(Debug, ThisError)]
pub enum ModelError {
    #[error("entity '{entity}' declares attribute '{attribute}' more than once")]
    DuplicateAttribute {
        entity: &'static str,
        attribute: &'static str,
    },

    #[error(
        "association '{entity}.{association}' uses foreign key '{foreign_key}', which {owner} does not declare"
    )]
    MissingForeignKey {
        entity: &'static str,
        association: &'static str,
        foreign_key: &'static str,
        owner: &'static str,
    },

    #[error("entity '{entity}' declares reserved attribute '{attribute}'")]
    ReservedAttribute {
        entity: &'static str,
        attribute: &'static str,
    },

    #[error(
        "association '{entity}.{association}' needs a value or unique index on {owner}.{foreign_key}"
    )]
    UnindexedForeignKey {
        entity: &'static str,
        association: &'static str,
        foreign_key: &'static str,
        owner: &'static str,
    },

    #[error("attribute '{entity}.{attribute}' of kind {kind} cannot carry a {index} index")]
    UnsupportedIndex {
        entity: &'static str,
        attribute: &'static str,
        kind: AttributeKind,
        index: IndexKind,
    },
}
