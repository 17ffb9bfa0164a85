//! ## Crate layout
//! - `core`: key encoding, entity models, the backend, distributed locks,
//!   the filter pipeline, and observability.
//!
//! The `prelude` module mirrors the surface used by application code;
//! stores, lock strategies and metrics stay behind `core`.

pub use kvmodel_core as core;

//
// Consts
//

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use core::{Error, ErrorClass, config::Config};

///
/// Prelude
/// using _ brings traits into scope and avoids name conflicts
///

pub mod prelude {
    pub use crate::core::{
        backend::Backend,
        entity::{Entity as _, Record},
        filter::{Condition, Conditions, Filter, RangeQuery, Regex, SortDirection, SortKey},
        lock::LockConfig,
        model::{
            association::AssociationModel,
            attribute::{AttributeKind, AttributeModel},
            entity::EntityModel,
        },
        store::KeyValueOps as _,
        value::Value,
    };
}
