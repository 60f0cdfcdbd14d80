//! The editable in-memory form of a spell resource.

use indexmap::IndexMap;

use super::value::Property;

/// One typed instruction inside a spell.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub type_code: u32,

    /// Properties in the order they are encoded.
    pub properties: Vec<Property>,
}

impl Operation {
    pub fn new(type_code: u32) -> Operation {
        Operation {
            type_code,
            properties: Vec::new(),
        }
    }

    /// Returns the first property with the given ID.
    pub fn property(&self, property_id: u32) -> Option<&Property> {
        self.properties
            .iter()
            .find(|property| property.id() == property_id)
    }

    pub fn property_mut(&mut self, property_id: u32) -> Option<&mut Property> {
        self.properties
            .iter_mut()
            .find(|property| property.id() == property_id)
    }
}

/// An ordered list of operations.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationGroup {
    /// Unique within the owning spell.
    pub id: u32,
    pub operations: Vec<Operation>,
}

impl OperationGroup {
    pub fn new(id: u32) -> OperationGroup {
        OperationGroup {
            id,
            operations: Vec::new(),
        }
    }

    /// Returns the first operation of `type_code`. Groups can hold several operations of the same
    /// type, and only the first one is reachable through this method.
    pub fn operation(&self, type_code: u32) -> Option<&Operation> {
        self.operations
            .iter()
            .find(|operation| operation.type_code == type_code)
    }

    pub fn operation_mut(&mut self, type_code: u32) -> Option<&mut Operation> {
        self.operations
            .iter_mut()
            .find(|operation| operation.type_code == type_code)
    }

    /// Returns the index of the first operation of `type_code`.
    pub fn position_of(&self, type_code: u32) -> Option<usize> {
        self.operations
            .iter()
            .position(|operation| operation.type_code == type_code)
    }
}

/// A single spell and its operation groups.
#[derive(Debug, Clone, PartialEq)]
pub struct SpellEntry {
    pub id: u32,
    pub groups: Vec<OperationGroup>,
}

impl SpellEntry {
    pub fn new(id: u32) -> SpellEntry {
        SpellEntry {
            id,
            groups: Vec::new(),
        }
    }

    pub fn group(&self, group_id: u32) -> Option<&OperationGroup> {
        self.groups.iter().find(|group| group.id == group_id)
    }

    pub fn group_mut(&mut self, group_id: u32) -> Option<&mut OperationGroup> {
        self.groups.iter_mut().find(|group| group.id == group_id)
    }
}

/// Every spell in a resource, keyed by spell ID. Iteration follows the order the spells were
/// decoded (or inserted) in, which is also the order they are encoded in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpellDocument {
    entries: IndexMap<u32, SpellEntry>,
}

impl SpellDocument {
    pub fn new() -> SpellDocument {
        SpellDocument::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn spell_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.keys().copied()
    }

    pub fn entries(&self) -> impl Iterator<Item = &SpellEntry> {
        self.entries.values()
    }

    pub fn entry(&self, spell_id: u32) -> Option<&SpellEntry> {
        self.entries.get(&spell_id)
    }

    pub fn entry_mut(&mut self, spell_id: u32) -> Option<&mut SpellEntry> {
        self.entries.get_mut(&spell_id)
    }

    /// Returns the entry for `spell_id`, appending an empty one if there isn't one yet.
    pub fn entry_or_insert(&mut self, spell_id: u32) -> &mut SpellEntry {
        self.entries
            .entry(spell_id)
            .or_insert_with(|| SpellEntry::new(spell_id))
    }

    /// Inserts `entry`, returning the entry it replaced. A replaced entry keeps its position.
    pub fn insert_entry(&mut self, entry: SpellEntry) -> Option<SpellEntry> {
        self.entries.insert(entry.id, entry)
    }
}
