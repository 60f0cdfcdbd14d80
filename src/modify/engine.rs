use super::{Modification, ModificationSet};
use crate::{
    error::{ApplyError, Error, Result, Target},
    spell::{Operation, OperationGroup, Schema, SpellDocument, SpellEntry},
};

fn group_mut(entry: &mut SpellEntry, group_id: u32) -> Result<&mut OperationGroup> {
    let spell_id = entry.id;

    entry
        .group_mut(group_id)
        .ok_or(Error::NotFound(Target::Group { spell_id, group_id }))
}

fn operation_mut(
    entry: &mut SpellEntry,
    group_id: u32,
    operation_type: u32,
) -> Result<&mut Operation> {
    let spell_id = entry.id;

    group_mut(entry, group_id)?
        .operation_mut(operation_type)
        .ok_or(Error::NotFound(Target::Operation {
            spell_id,
            group_id,
            operation_type,
        }))
}

/// Applies one modification to `entry`. Each arm finishes every fallible step before it changes
/// anything, so an error here never leaves a half-made edit behind.
fn apply_one(entry: &mut SpellEntry, modification: &Modification, schema: &Schema) -> Result<()> {
    let spell_id = entry.id;

    match modification {
        Modification::AddOperationGroup { group_id } => {
            if entry.group(*group_id).is_some() {
                return Err(Error::DuplicateGroup {
                    spell_id,
                    group_id: *group_id,
                });
            }

            entry.groups.push(OperationGroup::new(*group_id));
        }

        Modification::RemoveOperationGroup { group_id } => {
            let index = entry
                .groups
                .iter()
                .position(|group| group.id == *group_id)
                .ok_or(Error::NotFound(Target::Group {
                    spell_id,
                    group_id: *group_id,
                }))?;

            entry.groups.remove(index);
        }

        Modification::AddOperation {
            group_id,
            operation_type,
            properties,
            insert_after,
        } => {
            let group = group_mut(entry, *group_id)?;

            let mut operation = Operation::new(*operation_type);
            operation.properties = properties
                .iter()
                .map(|(property_id, value)| {
                    schema.construct(*operation_type, *property_id, value.as_ref())
                })
                .collect::<Result<_>>()?;

            let index = insert_after
                .and_then(|after| group.position_of(after))
                .map_or(group.operations.len(), |found| found + 1);

            group.operations.insert(index, operation);
        }

        Modification::RemoveOperation {
            group_id,
            operation_type,
        } => {
            let group = group_mut(entry, *group_id)?;

            let index = group
                .position_of(*operation_type)
                .ok_or(Error::NotFound(Target::Operation {
                    spell_id,
                    group_id: *group_id,
                    operation_type: *operation_type,
                }))?;

            group.operations.remove(index);
        }

        Modification::AddProperty {
            group_id,
            operation_type,
            property_id,
            value,
        } => {
            let operation = operation_mut(entry, *group_id, *operation_type)?;
            let property = schema.construct(*operation_type, *property_id, value.as_ref())?;

            operation.properties.push(property);
        }

        Modification::RemoveProperty {
            group_id,
            operation_type,
            property_id,
        } => {
            let operation = operation_mut(entry, *group_id, *operation_type)?;

            let index = operation
                .properties
                .iter()
                .position(|property| property.id() == *property_id)
                .ok_or(Error::NotFound(Target::Property {
                    spell_id,
                    group_id: *group_id,
                    operation_type: *operation_type,
                    property_id: *property_id,
                }))?;

            operation.properties.remove(index);
        }

        Modification::SetProperty {
            group_id,
            operation_type,
            property_id,
            value,
        } => {
            let property = operation_mut(entry, *group_id, *operation_type)?
                .property_mut(*property_id)
                .ok_or(Error::NotFound(Target::Property {
                    spell_id,
                    group_id: *group_id,
                    operation_type: *operation_type,
                    property_id: *property_id,
                }))?;

            // The existing property decides the kind, not the schema. Decoded properties always
            // match the schema anyway, and this lets unknown properties be edited in place.
            let value = property.kind().value_from(*property_id, value)?;
            property.set_value(value)?;
        }
    }

    Ok(())
}

/// Applies `set` to `document`.
///
/// Modifications are applied in order, and each one sees the effects of those before it. The
/// first failure stops the whole set. Anything already applied stays applied, so callers that
/// need all-or-nothing behaviour should apply the set to a clone of the document.
///
/// The target spell must exist unless the set replaces the original, in which case an empty spell
/// is created for it.
pub fn apply(
    document: &mut SpellDocument,
    set: &ModificationSet,
    schema: &Schema,
) -> Result<(), ApplyError> {
    let entry = if set.replace_original {
        let entry = document.entry_or_insert(set.spell_id);
        entry.groups.clear();
        entry
    } else {
        document
            .entry_mut(set.spell_id)
            .ok_or(ApplyError::Precondition(Error::NotFound(Target::Spell {
                spell_id: set.spell_id,
            })))?
    };

    for (index, modification) in set.modifications.iter().enumerate() {
        log::debug!(
            "spell {}: applying modification #{index} ({})",
            set.spell_id,
            modification.kind()
        );

        apply_one(entry, modification, schema).map_err(|source| ApplyError::Modification {
            index,
            kind: modification.kind(),
            source,
        })?;
    }

    log::info!(
        "Applied {} modification{} to spell {} ({})",
        set.modifications.len(),
        if set.modifications.len() == 1 { "" } else { "s" },
        set.spell_id,
        set.label()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::*;
    use crate::modify::{ModValue, ModificationKind};
    use crate::spell::{Property, PropertyKind, PropertyValue};

    const A: u32 = 1;
    const B: u32 = 2;
    const C: u32 = 3;

    fn schema() -> Schema {
        Schema::new()
            .property(2, PropertyKind::Float)
            .property(4, PropertyKind::Int)
            .property(6, PropertyKind::Vec3)
    }

    /// Spell 5 with group 0 holding operations `[A, B, A]`, where the first `A` has a float
    /// property 2.
    fn document() -> SpellDocument {
        let mut first_a = Operation::new(A);
        first_a
            .properties
            .push(Property::new(2, PropertyValue::Float(1.0)));

        let mut group = OperationGroup::new(0);
        group.operations = vec![first_a, Operation::new(B), Operation::new(A)];

        let mut document = SpellDocument::new();
        document.entry_or_insert(5).groups.push(group);
        document
    }

    fn set(modifications: Vec<Modification>) -> ModificationSet {
        ModificationSet {
            modifications,
            ..ModificationSet::new(5)
        }
    }

    fn types(document: &SpellDocument) -> Vec<u32> {
        document.entry(5).unwrap().groups[0]
            .operations
            .iter()
            .map(|operation| operation.type_code)
            .collect()
    }

    #[test]
    fn add_operation_goes_after_the_first_match() {
        let mut document = document();

        let add = Modification::AddOperation {
            group_id: 0,
            operation_type: C,
            properties: IndexMap::new(),
            insert_after: Some(A),
        };

        apply(&mut document, &set(vec![add]), &schema()).unwrap();
        assert_eq!(types(&document), vec![A, C, B, A]);
    }

    #[test]
    fn add_operation_appends_without_an_anchor() {
        let mut document = document();

        let modifications = vec![
            Modification::AddOperation {
                group_id: 0,
                operation_type: C,
                properties: IndexMap::new(),
                insert_after: None,
            },
            Modification::AddOperation {
                group_id: 0,
                operation_type: C,
                properties: IndexMap::new(),
                insert_after: Some(99),
            },
        ];

        apply(&mut document, &set(modifications), &schema()).unwrap();
        assert_eq!(types(&document), vec![A, B, A, C, C]);
    }

    #[test]
    fn add_operation_builds_properties_in_order() {
        let mut document = document();

        let properties = IndexMap::from([
            (6, None),
            (2, Some(ModValue::Float(0.25))),
            (4, Some(ModValue::Int(-3))),
        ]);

        let add = Modification::AddOperation {
            group_id: 0,
            operation_type: C,
            properties,
            insert_after: None,
        };

        apply(&mut document, &set(vec![add]), &schema()).unwrap();

        let group = document.entry(5).unwrap().group(0).unwrap();
        let values: Vec<_> = group
            .operation(C)
            .unwrap()
            .properties
            .iter()
            .map(|property| (property.id(), *property.value()))
            .collect();

        assert_eq!(
            values,
            vec![
                (6, PropertyValue::Vec3([0.0; 3])),
                (2, PropertyValue::Float(0.25)),
                (4, PropertyValue::Int(-3)),
            ]
        );
    }

    #[test]
    fn add_operation_with_an_unknown_property_inserts_nothing() {
        let mut document = document();

        let add = Modification::AddOperation {
            group_id: 0,
            operation_type: C,
            properties: IndexMap::from([(2, None), (77, None)]),
            insert_after: None,
        };

        let err = apply(&mut document, &set(vec![add]), &schema()).unwrap_err();
        assert_eq!(
            err.error(),
            &Error::UnsupportedProperty {
                property_id: 77,
                operation_type: C
            }
        );
        assert_eq!(types(&document), vec![A, B, A]);
    }

    #[test]
    fn replace_original_clears_every_group() {
        let mut document = document();
        let entry = document.entry_mut(5).unwrap();
        entry.groups.push(OperationGroup::new(1));
        entry.groups.push(OperationGroup::new(2));

        let replace = ModificationSet {
            replace_original: true,
            ..ModificationSet::new(5)
        };

        apply(&mut document, &replace, &schema()).unwrap();
        assert!(document.entry(5).unwrap().groups.is_empty());
    }

    #[test]
    fn replace_original_creates_missing_spells() {
        let mut document = document();

        let replace = ModificationSet {
            spell_id: 9,
            replace_original: true,
            modifications: vec![Modification::AddOperationGroup { group_id: 3 }],
            ..Default::default()
        };

        apply(&mut document, &replace, &schema()).unwrap();
        assert_eq!(document.spell_ids().collect::<Vec<_>>(), vec![5, 9]);
        assert!(document.entry(9).unwrap().group(3).is_some());
    }

    #[test]
    fn missing_spell_is_a_precondition_failure() {
        let mut document = document();
        let before = document.clone();

        let err = apply(&mut document, &ModificationSet::new(6), &schema()).unwrap_err();

        assert_eq!(
            err,
            ApplyError::Precondition(Error::NotFound(Target::Spell { spell_id: 6 }))
        );
        assert_eq!(err.index(), None);
        assert_eq!(document, before);
    }

    #[test]
    fn add_property_rejects_unknown_ids_without_changes() {
        let mut document = document();

        let add = Modification::AddProperty {
            group_id: 0,
            operation_type: A,
            property_id: 500,
            value: Some(ModValue::Int(1)),
        };

        let count = |document: &SpellDocument| {
            document.entry(5).unwrap().groups[0].operations[0]
                .properties
                .len()
        };

        let before = count(&document);
        let err = apply(&mut document, &set(vec![add]), &schema()).unwrap_err();

        assert!(matches!(
            err.error(),
            Error::UnsupportedProperty {
                property_id: 500,
                ..
            }
        ));
        assert_eq!(count(&document), before);
    }

    #[test]
    fn set_property_regenerates_the_raw_bytes() {
        let mut document = document();

        let modification = Modification::SetProperty {
            group_id: 0,
            operation_type: A,
            property_id: 2,
            value: ModValue::Float(8.0),
        };

        apply(&mut document, &set(vec![modification]), &schema()).unwrap();

        let property = document.entry(5).unwrap().groups[0].operations[0]
            .property(2)
            .unwrap();

        assert_eq!(property.value(), &PropertyValue::Float(8.0));
        assert_eq!(property.raw(), &8.0f32.to_le_bytes());
    }

    #[test]
    fn set_property_requires_an_existing_property() {
        let mut document = document();

        let modification = Modification::SetProperty {
            group_id: 0,
            operation_type: B,
            property_id: 2,
            value: ModValue::Float(8.0),
        };

        let err = apply(&mut document, &set(vec![modification]), &schema()).unwrap_err();
        assert!(matches!(
            err.error(),
            Error::NotFound(Target::Property { property_id: 2, .. })
        ));
    }

    #[test]
    fn per_operation_edits_address_the_first_match() {
        let mut document = document();

        let modifications = vec![
            Modification::AddProperty {
                group_id: 0,
                operation_type: A,
                property_id: 4,
                value: None,
            },
            Modification::RemoveOperation {
                group_id: 0,
                operation_type: A,
            },
        ];

        apply(&mut document, &set(modifications), &schema()).unwrap();

        let group = &document.entry(5).unwrap().groups[0];
        assert_eq!(types(&document), vec![B, A]);
        assert!(group.operations[1].properties.is_empty());
    }

    #[test]
    fn group_edits_check_for_duplicates_and_absence() {
        let mut document = document();

        let duplicate = set(vec![Modification::AddOperationGroup { group_id: 0 }]);
        let err = apply(&mut document, &duplicate, &schema()).unwrap_err();
        assert_eq!(
            err.error(),
            &Error::DuplicateGroup {
                spell_id: 5,
                group_id: 0
            }
        );

        let remove_twice = set(vec![
            Modification::RemoveOperationGroup { group_id: 0 },
            Modification::RemoveOperationGroup { group_id: 0 },
        ]);
        let err = apply(&mut document, &remove_twice, &schema()).unwrap_err();

        assert_eq!(
            err,
            ApplyError::Modification {
                index: 1,
                kind: ModificationKind::RemoveOperationGroup,
                source: Error::NotFound(Target::Group {
                    spell_id: 5,
                    group_id: 0
                }),
            }
        );

        // The first removal is not rolled back.
        assert!(document.entry(5).unwrap().groups.is_empty());
    }

    #[test]
    fn later_modifications_see_earlier_ones() {
        let mut document = document();

        let modifications = vec![
            Modification::AddOperationGroup { group_id: 8 },
            Modification::AddOperation {
                group_id: 8,
                operation_type: C,
                properties: IndexMap::new(),
                insert_after: None,
            },
            Modification::AddProperty {
                group_id: 8,
                operation_type: C,
                property_id: 2,
                value: Some(ModValue::Float(2.5)),
            },
            Modification::RemoveProperty {
                group_id: 0,
                operation_type: A,
                property_id: 2,
            },
        ];

        apply(&mut document, &set(modifications), &schema()).unwrap();

        let entry = document.entry(5).unwrap();
        let added = entry.group(8).unwrap().operation(C).unwrap();

        assert_eq!(
            added.property(2).unwrap().value(),
            &PropertyValue::Float(2.5)
        );
        assert!(entry.groups[0].operations[0].properties.is_empty());
    }
}
