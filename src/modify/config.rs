//! Loads modification sets from JSON files.
//!
//! Each file describes one set:
//!
//! ```json
//! {
//!     "magic_id": 5,
//!     "name": "Faster fireball",
//!     "replace_original": false,
//!     "modifications": [
//!         {
//!             "type": "set_property",
//!             "operation_group_id": 0,
//!             "operation_id": 10,
//!             "property_id": 2,
//!             "value": 3.5
//!         }
//!     ]
//! }
//! ```

use std::path::{Path, PathBuf};

use eyre::{format_err, Context, Result};
use indexmap::IndexMap;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use super::{Modification, ModificationKind, ModificationSet};

/// A value given for a property in a modification file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Vector([f32; 3]),
}

fn end_of_group() -> i32 {
    -1
}

/// One entry in a file's `modifications` list.
#[derive(Debug, Clone, Deserialize)]
pub struct ModificationRecord {
    #[serde(rename = "type")]
    pub kind: ModificationKind,

    pub operation_group_id: u32,

    /// The operation type that the modification targets. Required by everything except group
    /// modifications.
    #[serde(default)]
    pub operation_id: Option<u32>,

    #[serde(default)]
    pub property_id: Option<u32>,

    #[serde(default)]
    pub value: Option<ModValue>,

    /// Properties for a new operation. A `null` value gives the property its default value.
    #[serde(default)]
    pub properties: Option<IndexMap<u32, Option<ModValue>>>,

    /// Negative values mean the end of the group.
    #[serde(default = "end_of_group")]
    pub insert_after_operation_type_id: i32,
}

impl ModificationRecord {
    /// Converts the record into a modification, checking that the fields its kind needs are
    /// present.
    pub fn into_modification(self) -> Result<Modification> {
        let kind = self.kind;
        let group_id = self.operation_group_id;

        let operation_type = || {
            self.operation_id
                .ok_or_else(|| format_err!("{} needs an 'operation_id'", kind))
        };

        let property_id = || {
            self.property_id
                .ok_or_else(|| format_err!("{} needs a 'property_id'", kind))
        };

        let modification = match kind {
            ModificationKind::SetProperty => Modification::SetProperty {
                group_id,
                operation_type: operation_type()?,
                property_id: property_id()?,
                value: self
                    .value
                    .clone()
                    .ok_or_else(|| format_err!("{} needs a 'value'", kind))?,
            },

            ModificationKind::RemoveProperty => Modification::RemoveProperty {
                group_id,
                operation_type: operation_type()?,
                property_id: property_id()?,
            },

            ModificationKind::AddProperty => Modification::AddProperty {
                group_id,
                operation_type: operation_type()?,
                property_id: property_id()?,
                value: self.value.clone(),
            },

            ModificationKind::AddOperation => Modification::AddOperation {
                group_id,
                operation_type: operation_type()?,
                properties: self.properties.clone().unwrap_or_default(),
                insert_after: u32::try_from(self.insert_after_operation_type_id).ok(),
            },

            ModificationKind::RemoveOperation => Modification::RemoveOperation {
                group_id,
                operation_type: operation_type()?,
            },

            ModificationKind::AddOperationGroup => Modification::AddOperationGroup { group_id },

            ModificationKind::RemoveOperationGroup => {
                Modification::RemoveOperationGroup { group_id }
            }
        };

        Ok(modification)
    }
}

/// The contents of a modification file.
#[derive(Debug, Clone, Deserialize)]
pub struct ModificationFile {
    /// The ID of the spell to modify.
    pub magic_id: u32,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub replace_original: bool,

    #[serde(default)]
    pub modifications: Vec<ModificationRecord>,
}

impl ModificationFile {
    pub fn parse(json: &str) -> Result<ModificationFile> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn into_set(self) -> Result<ModificationSet> {
        let modifications = self
            .modifications
            .into_iter()
            .enumerate()
            .map(|(index, record)| {
                record
                    .into_modification()
                    .wrap_err_with(|| format!("In modification #{index}"))
            })
            .collect::<Result<_>>()?;

        Ok(ModificationSet {
            spell_id: self.magic_id,
            replace_original: self.replace_original,
            modifications,
            name: self.name,
            description: self.description,
        })
    }
}

/// Reads and converts the modification file at `path`.
pub fn load_file(path: impl AsRef<Path>) -> Result<ModificationSet> {
    let path = path.as_ref();

    let json = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("Unable to read modification file {path:?}"))?;

    ModificationFile::parse(&json)
        .and_then(ModificationFile::into_set)
        .wrap_err_with(|| format!("Invalid modification file {path:?}"))
}

/// Modification sets grouped by the spell they target. Sets for the same spell are kept in the
/// order they were added, which is the order they are applied in.
#[derive(Debug, Clone, Default)]
pub struct ModificationCatalog {
    sets: IndexMap<u32, Vec<ModificationSet>>,
}

impl ModificationCatalog {
    pub fn new() -> ModificationCatalog {
        ModificationCatalog::default()
    }

    /// Loads every `.json` file in `dir`, in file name order.
    ///
    /// A file that can't be loaded doesn't stop the others from loading. The errors for any such
    /// files are returned alongside the catalog so that they can be reported.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<(ModificationCatalog, Vec<eyre::Report>)> {
        let dir = dir.as_ref();
        log::info!("Loading modification files from {:?}", dir);

        let paths: Vec<PathBuf> = std::fs::read_dir(dir)
            .wrap_err_with(|| format!("Unable to read modification directory {dir:?}"))?
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| {
                path.is_file()
                    && path
                        .extension()
                        .and_then(std::ffi::OsStr::to_str)
                        .map_or(false, |ext| ext.eq_ignore_ascii_case("json"))
            })
            .sorted()
            .collect();

        let (sets, errors): (Vec<_>, Vec<_>) = paths.iter().map(load_file).partition_result();

        let mut catalog = ModificationCatalog::new();

        for set in sets {
            catalog.add(set);
        }

        Ok((catalog, errors))
    }

    pub fn add(&mut self, set: ModificationSet) {
        log::info!(
            "Loaded '{}' for spell {}: {}",
            set.label(),
            set.spell_id,
            set.description.as_deref().unwrap_or("no description")
        );

        self.sets.entry(set.spell_id).or_default().push(set);
    }

    /// Returns the sets for `spell_id` in the order they should be applied.
    pub fn sets_for(&self, spell_id: u32) -> &[ModificationSet] {
        self.sets
            .get(&spell_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Returns every set, grouped by spell.
    pub fn iter(&self) -> impl Iterator<Item = &ModificationSet> {
        self.sets.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.sets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_documented_format() {
        let set = ModificationFile::parse(
            r#"{
                "magic_id": 5,
                "name": "Faster fireball",
                "modifications": [
                    {
                        "type": "add_property",
                        "operation_group_id": 0,
                        "operation_id": 10,
                        "property_id": 2,
                        "value": 3.5
                    },
                    {
                        "type": "AddOperation",
                        "operation_group_id": 0,
                        "operation_id": 12,
                        "properties": { "4": [1.0, 2.0, 3.0], "2": null },
                        "insert_after_operation_type_id": 10
                    },
                    {
                        "type": "remove_operation_group",
                        "operation_group_id": 3
                    }
                ]
            }"#,
        )
        .and_then(ModificationFile::into_set)
        .unwrap();

        assert_eq!(set.spell_id, 5);
        assert!(!set.replace_original);
        assert_eq!(set.label(), "Faster fireball");

        assert_eq!(
            set.modifications,
            vec![
                Modification::AddProperty {
                    group_id: 0,
                    operation_type: 10,
                    property_id: 2,
                    value: Some(ModValue::Float(3.5)),
                },
                Modification::AddOperation {
                    group_id: 0,
                    operation_type: 12,
                    properties: IndexMap::from([
                        (4, Some(ModValue::Vector([1.0, 2.0, 3.0]))),
                        (2, None)
                    ]),
                    insert_after: Some(10),
                },
                Modification::RemoveOperationGroup { group_id: 3 },
            ]
        );
    }

    #[test]
    fn insert_position_defaults_to_the_end() {
        let record: ModificationRecord = serde_json::from_str(
            r#"{ "type": "add_operation", "operation_group_id": 1, "operation_id": 7 }"#,
        )
        .unwrap();

        assert_eq!(record.insert_after_operation_type_id, -1);
        assert!(matches!(
            record.into_modification().unwrap(),
            Modification::AddOperation {
                insert_after: None,
                ..
            }
        ));
    }

    #[test]
    fn values_keep_their_json_type() {
        let values: Vec<ModValue> =
            serde_json::from_str("[true, 3, 3.0, -1, [0, 1, 2.5]]").unwrap();

        assert_eq!(
            values,
            vec![
                ModValue::Bool(true),
                ModValue::Int(3),
                ModValue::Float(3.0),
                ModValue::Int(-1),
                ModValue::Vector([0.0, 1.0, 2.5]),
            ]
        );
    }

    #[test]
    fn missing_fields_are_reported_with_the_record_index() {
        let err = ModificationFile::parse(
            r#"{
                "magic_id": 1,
                "modifications": [
                    { "type": "add_operation_group", "operation_group_id": 0 },
                    { "type": "set_property", "operation_group_id": 0, "operation_id": 1, "property_id": 2 }
                ]
            }"#,
        )
        .and_then(ModificationFile::into_set)
        .unwrap_err();

        let message = format!("{err:?}");
        assert!(message.contains("modification #1"), "{message}");
        assert!(message.contains("'value'"), "{message}");
    }

    #[test]
    fn operation_modifications_need_an_operation_id() {
        let err = ModificationFile::parse(
            r#"{
                "magic_id": 1,
                "modifications": [
                    { "type": "add_operation_group", "operation_group_id": 0 },
                    { "type": "remove_operation", "operation_group_id": 0 }
                ]
            }"#,
        )
        .and_then(ModificationFile::into_set)
        .unwrap_err();

        let message = format!("{err:?}");
        assert!(message.contains("modification #1"), "{message}");
        assert!(message.contains("'operation_id'"), "{message}");

        // Group modifications don't target an operation.
        let record: ModificationRecord = serde_json::from_str(
            r#"{ "type": "remove_operation_group", "operation_group_id": 4 }"#,
        )
        .unwrap();

        assert_eq!(
            record.into_modification().unwrap(),
            Modification::RemoveOperationGroup { group_id: 4 }
        );
    }

    #[test]
    fn load_dir_keeps_going_past_bad_files() {
        let dir = tempfile::tempdir().unwrap();

        std::fs::write(
            dir.path().join("b.json"),
            r#"{ "magic_id": 5, "name": "second" }"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("a.json"),
            r#"{ "magic_id": 5, "name": "first", "replace_original": true }"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("c.json"), "{ not json").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let (catalog, errors) = ModificationCatalog::load_dir(dir.path()).unwrap();

        assert_eq!(catalog.len(), 2);
        assert_eq!(errors.len(), 1);

        let names: Vec<_> = catalog
            .sets_for(5)
            .iter()
            .map(|set| set.label())
            .collect();
        assert_eq!(names, vec!["first", "second"]);

        assert!(catalog.sets_for(6).is_empty());
    }
}
