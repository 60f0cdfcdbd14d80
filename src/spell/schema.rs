//! The table describing how properties are represented.
//!
//! The byte layout of spell resources differs between assets, so none of it is hard-coded in the
//! codec. A schema supplies the wire tag for each property kind, the kind that each property ID
//! must have, and (optionally) which property IDs each operation type accepts.

use std::{
    collections::{BTreeMap, HashMap},
    path::Path,
};

use eyre::WrapErr;
use serde::{Deserialize, Serialize};

use super::value::{Property, PropertyKind};
use crate::error::{Error, Result};
use crate::modify::ModValue;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Maps wire tags to property kinds.
    #[serde(default = "default_tags")]
    tags: BTreeMap<u8, PropertyKind>,

    /// The kind that each known property ID is stored as. Properties can only be created for IDs
    /// in this table, because guessing the width of an unknown property would corrupt the
    /// document.
    #[serde(default)]
    properties: HashMap<u32, PropertyKind>,

    /// Property IDs accepted by each operation type. Operation types with no entry here accept
    /// any property in `properties`.
    #[serde(default)]
    operations: HashMap<u32, Vec<u32>>,
}

fn default_tags() -> BTreeMap<u8, PropertyKind> {
    BTreeMap::from([
        (0, PropertyKind::Identifier),
        (1, PropertyKind::Float),
        (2, PropertyKind::Int),
        (3, PropertyKind::Bool),
        (4, PropertyKind::Byte),
        (5, PropertyKind::Vec3),
    ])
}

impl Default for Schema {
    fn default() -> Self {
        Schema::new()
    }
}

impl Schema {
    /// Creates a schema with the default wire tags and no known properties.
    pub fn new() -> Schema {
        Schema {
            tags: default_tags(),
            properties: HashMap::new(),
            operations: HashMap::new(),
        }
    }

    /// Loads a schema from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> eyre::Result<Schema> {
        let path = path.as_ref();

        let file = std::fs::File::open(path)
            .wrap_err_with(|| format!("Unable to open schema file {path:?}"))?;

        serde_json::from_reader(std::io::BufReader::new(file))
            .wrap_err_with(|| format!("Unable to parse schema file {path:?}"))
    }

    /// Uses `tag` as the wire tag for `kind`, replacing any tag previously used for it.
    pub fn tag(mut self, tag: u8, kind: PropertyKind) -> Schema {
        self.tags.retain(|_, existing| *existing != kind);
        self.tags.insert(tag, kind);
        self
    }

    /// Registers `property_id` as a property stored as `kind`.
    pub fn property(mut self, property_id: u32, kind: PropertyKind) -> Schema {
        self.properties.insert(property_id, kind);
        self
    }

    /// Restricts `operation_type` to the given property IDs.
    pub fn operation(
        mut self,
        operation_type: u32,
        property_ids: impl IntoIterator<Item = u32>,
    ) -> Schema {
        self.operations
            .insert(operation_type, property_ids.into_iter().collect());
        self
    }

    pub fn kind_for_tag(&self, tag: u8) -> Option<PropertyKind> {
        self.tags.get(&tag).copied()
    }

    pub fn tag_for(&self, kind: PropertyKind) -> Option<u8> {
        self.tags
            .iter()
            .find(|(_, tagged)| **tagged == kind)
            .map(|(tag, _)| *tag)
    }

    /// Returns the kind that `property_id` is stored as, if it's a known property.
    pub fn property_kind(&self, property_id: u32) -> Option<PropertyKind> {
        self.properties.get(&property_id).copied()
    }

    /// Returns the kind of `property_id` if operations of `operation_type` may carry it.
    fn kind_for(&self, operation_type: u32, property_id: u32) -> Option<PropertyKind> {
        let allowed = self
            .operations
            .get(&operation_type)
            .map_or(true, |ids| ids.contains(&property_id));

        if allowed {
            self.property_kind(property_id)
        } else {
            None
        }
    }

    /// Builds a new property for an operation of `operation_type`. The property holds `value`
    /// if one is given, or the default value for its kind if not.
    pub fn construct(
        &self,
        operation_type: u32,
        property_id: u32,
        value: Option<&ModValue>,
    ) -> Result<Property> {
        let kind =
            self.kind_for(operation_type, property_id)
                .ok_or(Error::UnsupportedProperty {
                    property_id,
                    operation_type,
                })?;

        let value = match value {
            Some(value) => kind.value_from(property_id, value)?,
            None => kind.default_value(),
        };

        Ok(Property::new(property_id, value))
    }
}
