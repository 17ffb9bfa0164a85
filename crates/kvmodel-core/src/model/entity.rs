use crate::{
    ID_ATTRIBUTE,
    key::Key,
    model::{
        ModelError,
        association::{AssociationKind, AssociationModel},
        attribute::AttributeModel,
        index::IndexKind,
    },
};
use std::collections::BTreeSet;

///
/// EntityModel
/// Static runtime model for one entity class.
///

#[derive(Debug)]
pub struct EntityModel {
    /// Class name used as the first key fragment and the lock resource name.
    pub name: &'static str,
    /// Declared attributes (the primary id is implicit).
    pub attributes: &'static [AttributeModel],
    /// Declared associations to other entity classes.
    pub associations: &'static [AssociationModel],
}

impl EntityModel {
    #[must_use]
    pub const fn new(
        name: &'static str,
        attributes: &'static [AttributeModel],
        associations: &'static [AssociationModel],
    ) -> Self {
        Self {
            name,
            attributes,
            associations,
        }
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&'static AttributeModel> {
        let attributes: &'static [AttributeModel] = self.attributes;

        attributes.iter().find(|attr| attr.name == name)
    }

    #[must_use]
    pub fn association(&self, name: &str) -> Option<&'static AssociationModel> {
        let associations: &'static [AssociationModel] = self.associations;

        associations.iter().find(|assoc| assoc.name == name)
    }

    /// Attributes that declare an index.
    pub fn indexed_attributes(&self) -> impl Iterator<Item = &'static AttributeModel> + use<> {
        let attributes: &'static [AttributeModel] = self.attributes;

        attributes.iter().filter(|attr| attr.index.is_some())
    }

    /// Membership set of every id of this class.
    #[must_use]
    pub fn ids_key(&self) -> Key {
        Key::ids(self.name)
    }

    /// Class names of every associated entity, this class excluded.
    #[must_use]
    pub fn associated_classes(&self) -> BTreeSet<&'static str> {
        self.associations
            .iter()
            .map(|assoc| assoc.target.name)
            .filter(|name| *name != self.name)
            .collect()
    }

    /// Check declared attributes, indices and association foreign keys.
    pub fn validate(&self) -> Result<(), ModelError> {
        let mut seen = BTreeSet::new();

        for attr in self.attributes {
            if attr.name == ID_ATTRIBUTE {
                return Err(ModelError::ReservedAttribute {
                    entity: self.name,
                    attribute: attr.name,
                });
            }
            if !seen.insert(attr.name) {
                return Err(ModelError::DuplicateAttribute {
                    entity: self.name,
                    attribute: attr.name,
                });
            }
            if let Some(index) = attr.index
                && !attr.kind.supports_index(index)
            {
                return Err(ModelError::UnsupportedIndex {
                    entity: self.name,
                    attribute: attr.name,
                    kind: attr.kind,
                    index,
                });
            }
        }

        for assoc in self.associations {
            self.validate_association(assoc)?;
        }

        Ok(())
    }

    fn validate_association(&self, assoc: &AssociationModel) -> Result<(), ModelError> {
        let owner = match assoc.kind {
            AssociationKind::BelongsTo => self,
            AssociationKind::HasOne | AssociationKind::HasMany => assoc.target,
        };

        let Some(foreign_key) = owner.attribute(assoc.foreign_key) else {
            return Err(ModelError::MissingForeignKey {
                entity: self.name,
                association: assoc.name,
                foreign_key: assoc.foreign_key,
                owner: owner.name,
            });
        };

        let needs_index = !matches!(assoc.kind, AssociationKind::BelongsTo);
        let has_index = matches!(
            foreign_key.index,
            Some(IndexKind::Value | IndexKind::Unique)
        );
        if needs_index && !has_index {
            return Err(ModelError::UnindexedForeignKey {
                entity: self.name,
                association: assoc.name,
                foreign_key: assoc.foreign_key,
                owner: owner.name,
            });
        }

        Ok(())
    }
}
