//! Declarative edits to spell documents.
//!
//! A [`ModificationSet`] targets one spell and lists [`Modification`]s that are applied in order
//! by [`apply`]. Sets are usually loaded from JSON files by the [`config`] module.

pub mod config;
mod engine;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub use config::{ModValue, ModificationCatalog};
pub use engine::apply;

/// The kinds of edit that can be made to a spell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
pub enum ModificationKind {
    #[serde(alias = "SetProperty")]
    SetProperty,

    #[serde(alias = "RemoveProperty")]
    RemoveProperty,

    #[serde(alias = "AddProperty")]
    AddProperty,

    #[serde(alias = "AddOperation")]
    AddOperation,

    #[serde(alias = "RemoveOperation")]
    RemoveOperation,

    #[serde(alias = "AddOperationGroup")]
    AddOperationGroup,

    #[serde(alias = "RemoveOperationGroup")]
    RemoveOperationGroup,
}

/// A single edit. Operations are addressed by type, and where a group contains more than one
/// operation of the same type, the first one is always used.
#[derive(Debug, Clone, PartialEq)]
pub enum Modification {
    /// Overwrites the value of an existing property.
    SetProperty {
        group_id: u32,
        operation_type: u32,
        property_id: u32,
        value: ModValue,
    },

    RemoveProperty {
        group_id: u32,
        operation_type: u32,
        property_id: u32,
    },

    /// Appends a property. Without a value, the property gets the default for its kind.
    AddProperty {
        group_id: u32,
        operation_type: u32,
        property_id: u32,
        value: Option<ModValue>,
    },

    /// Inserts an operation after the first operation of type `insert_after`, or at the end of
    /// the group if `insert_after` is `None` or no operation of that type exists.
    AddOperation {
        group_id: u32,
        operation_type: u32,
        properties: IndexMap<u32, Option<ModValue>>,
        insert_after: Option<u32>,
    },

    RemoveOperation {
        group_id: u32,
        operation_type: u32,
    },

    AddOperationGroup {
        group_id: u32,
    },

    RemoveOperationGroup {
        group_id: u32,
    },
}

impl Modification {
    pub fn kind(&self) -> ModificationKind {
        match self {
            Modification::SetProperty { .. } => ModificationKind::SetProperty,
            Modification::RemoveProperty { .. } => ModificationKind::RemoveProperty,
            Modification::AddProperty { .. } => ModificationKind::AddProperty,
            Modification::AddOperation { .. } => ModificationKind::AddOperation,
            Modification::RemoveOperation { .. } => ModificationKind::RemoveOperation,
            Modification::AddOperationGroup { .. } => ModificationKind::AddOperationGroup,
            Modification::RemoveOperationGroup { .. } => ModificationKind::RemoveOperationGroup,
        }
    }
}

/// An ordered list of modifications for one spell.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModificationSet {
    pub spell_id: u32,

    /// Clear the spell's groups before applying anything, so that the set describes the whole
    /// spell rather than changes to it.
    pub replace_original: bool,

    pub modifications: Vec<Modification>,

    pub name: Option<String>,
    pub description: Option<String>,
}

impl ModificationSet {
    pub fn new(spell_id: u32) -> ModificationSet {
        ModificationSet {
            spell_id,
            ..Default::default()
        }
    }

    /// Returns the set's name if it has one, or a description of its target if not.
    pub fn label(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("modifications for spell {}", self.spell_id))
    }
}
