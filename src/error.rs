//! Error types shared by the spell codec, the modification engine and the resource registry.

use std::fmt::Display;

use thiserror::Error;

use crate::modify::ModificationKind;
use crate::spell::PropertyKind;

/// Identifies the thing a lookup failed to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// A spell entry.
    Spell { spell_id: u32 },

    /// An operation group within a spell.
    Group { spell_id: u32, group_id: u32 },

    /// The first operation of a given type within a group.
    Operation {
        spell_id: u32,
        group_id: u32,
        operation_type: u32,
    },

    /// A property on an operation.
    Property {
        spell_id: u32,
        group_id: u32,
        operation_type: u32,
        property_id: u32,
    },
}

impl Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Spell { spell_id } => write!(f, "spell {spell_id}"),

            Target::Group { spell_id, group_id } => {
                write!(f, "group {group_id} of spell {spell_id}")
            }

            Target::Operation {
                spell_id,
                group_id,
                operation_type,
            } => write!(
                f,
                "operation of type {operation_type} in group {group_id} of spell {spell_id}"
            ),

            Target::Property {
                spell_id,
                group_id,
                operation_type,
                property_id,
            } => write!(
                f,
                "property {property_id} on operation {operation_type} in group {group_id} of spell {spell_id}"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// The buffer could not be decoded. The buffer itself is never touched when this happens.
    #[error("malformed document at byte {offset}: {reason}")]
    MalformedDocument { offset: usize, reason: String },

    #[error("spell {spell_id} already has a group with id {group_id}")]
    DuplicateGroup { spell_id: u32, group_id: u32 },

    #[error("{0} not found")]
    NotFound(Target),

    #[error("property {property_id} cannot be constructed for operation type {operation_type}")]
    UnsupportedProperty {
        property_id: u32,
        operation_type: u32,
    },

    #[error("value for property {property_id} ({kind}) is invalid: {reason}")]
    InvalidValue {
        property_id: u32,
        kind: PropertyKind,
        reason: String,
    },

    /// The handle was invalidated (or removed from the registry) before the operation ran.
    #[error("resource handle {path_hash:#010x} is no longer valid")]
    StaleHandle { path_hash: u32 },

    #[error("unable to allocate an override buffer of {len} bytes")]
    AllocationFailed { len: usize },
}

impl Error {
    pub(crate) fn malformed(offset: usize, reason: impl Into<String>) -> Error {
        Error::MalformedDocument {
            offset,
            reason: reason.into(),
        }
    }
}

/// A failure while applying a modification set.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApplyError {
    /// The set could not be started at all, so the document is untouched.
    #[error("cannot apply modifications: {0}")]
    Precondition(#[source] Error),

    /// Modification `index` failed. Modifications before it have already been applied to the
    /// document and are not rolled back.
    #[error("modification #{index} ({kind}) failed: {source}")]
    Modification {
        index: usize,
        kind: ModificationKind,

        #[source]
        source: Error,
    },
}

impl ApplyError {
    /// Returns the underlying error.
    pub fn error(&self) -> &Error {
        match self {
            ApplyError::Precondition(err) | ApplyError::Modification { source: err, .. } => err,
        }
    }

    /// Returns the index of the modification that failed, if one did.
    pub fn index(&self) -> Option<usize> {
        match self {
            ApplyError::Precondition(_) => None,
            ApplyError::Modification { index, .. } => Some(*index),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
