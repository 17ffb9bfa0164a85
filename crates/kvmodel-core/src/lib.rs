//! Core runtime for kvmodel: key encoding, entity models, the backend façade,
//! class-scoped distributed locks, and the lazy filter pipeline.
#![warn(unreachable_pub)]

// public exports are one module level down
pub mod backend;
pub mod config;
pub mod entity;
pub mod error;
pub mod filter;
pub mod key;
pub mod lock;
pub mod model;
pub mod obs;
pub mod store;
pub mod value;

pub use error::{Error, ErrorClass};

// test
#[cfg(test)]
pub(crate) mod test_support;

///
/// CONSTANTS
///

/// Attribute name reserved for the primary id of every entity.
pub const ID_ATTRIBUTE: &str = "id";

///
/// Prelude
///
/// Prelude contains only domain vocabulary.
/// No errors, stores, serializers, or helpers are re-exported here.
///

pub mod prelude {
    pub use crate::{
        backend::Backend,
        entity::{Entity, Record},
        filter::{Condition, Conditions, Filter, RangeQuery, SortKey},
        model::{
            association::{AssociationKind, AssociationModel},
            attribute::{AttributeKind, AttributeModel},
            entity::EntityModel,
            index::IndexKind,
        },
        value::Value,
    };
}
