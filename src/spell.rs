//! The structured model of a spell resource and the codec that converts it to and from bytes.
//!
//! A document holds spell entries, each entry holds operation groups, each group holds operations
//! and each operation holds typed properties.

mod codec;
mod model;
mod schema;
mod value;

pub use codec::{decode, encode};
pub use model::{Operation, OperationGroup, SpellDocument, SpellEntry};
pub use schema::Schema;
pub use value::{Property, PropertyKind, PropertyValue};
