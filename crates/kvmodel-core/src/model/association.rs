use crate::model::entity::EntityModel;
use std::fmt;

///
/// AssociationKind
///
/// BelongsTo → the foreign key is an `Id` attribute on this entity
/// HasOne    → the foreign key is an indexed attribute on the target
/// HasMany   → as `HasOne`, resolving to every matching target
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AssociationKind {
    BelongsTo,
    HasOne,
    HasMany,
}

///
/// AssociationModel
///

#[derive(Clone, Copy)]
pub struct AssociationModel {
    pub name: &'static str,
    pub kind: AssociationKind,
    pub target: &'static EntityModel,
    pub foreign_key: &'static str,
}

impl AssociationModel {
    #[must_use]
    pub const fn belongs_to(
        name: &'static str,
        target: &'static EntityModel,
        foreign_key: &'static str,
    ) -> Self {
        Self {
            name,
            kind: AssociationKind::BelongsTo,
            target,
            foreign_key,
        }
    }

    #[must_use]
    pub const fn has_one(
        name: &'static str,
        target: &'static EntityModel,
        foreign_key: &'static str,
    ) -> Self {
        Self {
            name,
            kind: AssociationKind::HasOne,
            target,
            foreign_key,
        }
    }

    #[must_use]
    pub const fn has_many(
        name: &'static str,
        target: &'static EntityModel,
        foreign_key: &'static str,
    ) -> Self {
        Self {
            name,
            kind: AssociationKind::HasMany,
            target,
            foreign_key,
        }
    }
}

// Targets may point back at the owning entity, so only the target's name is
// printed.
impl fmt::Debug for AssociationModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssociationModel")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("target", &self.target.name)
            .field("foreign_key", &self.foreign_key)
            .finish()
    }
}
