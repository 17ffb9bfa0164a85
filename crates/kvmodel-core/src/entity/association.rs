use crate::{
    backend::{Backend, IndexTarget, index_target},
    error::Error,
    key::encode_scalar,
    model::{
        ModelError,
        association::{AssociationKind, AssociationModel},
        entity::EntityModel,
    },
    value::{Value, compare_ids},
};

/// Ids of the records `association` links to from record `id` of `model`.
///
/// BelongsTo reads the foreign key stored on the record itself; HasOne and
/// HasMany look the id up in the target's foreign-key index. Results are in
/// natural id order; HasOne keeps at most the first.
pub fn associated_ids(
    backend: &Backend,
    model: &'static EntityModel,
    association: &AssociationModel,
    id: &str,
) -> Result<Vec<String>, Error> {
    let owner = match association.kind {
        AssociationKind::BelongsTo => model,
        AssociationKind::HasOne | AssociationKind::HasMany => association.target,
    };
    let Some(foreign_key) = owner.attribute(association.foreign_key) else {
        return Err(ModelError::MissingForeignKey {
            entity: model.name,
            association: association.name,
            foreign_key: association.foreign_key,
            owner: owner.name,
        }
        .into());
    };

    if association.kind == AssociationKind::BelongsTo {
        let value = backend.get(model, id, foreign_key)?;

        return Ok(encode_scalar(foreign_key.kind, &value)?.into_iter().collect());
    }

    let lookup = Value::Text(id.to_string());
    let mut ids = match index_target(association.target, foreign_key, &lookup)? {
        Some(IndexTarget::Value { entry, .. }) => backend.members(&entry)?,
        Some(IndexTarget::Unique { hash, field }) => backend
            .connection()
            .hget(hash.name(), &field)?
            .into_iter()
            .collect(),
        _ => {
            return Err(ModelError::UnindexedForeignKey {
                entity: model.name,
                association: association.name,
                foreign_key: association.foreign_key,
                owner: owner.name,
            }
            .into());
        }
    };

    ids.sort_by(|a, b| compare_ids(a, b));
    if association.kind == AssociationKind::HasOne {
        ids.truncate(1);
    }

    Ok(ids)
}
