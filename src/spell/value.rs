//! Typed property values and the raw bytes they were decoded from.

use std::fmt::Display;

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::modify::ModValue;

/// The representation used for a property on the wire. Every kind has a fixed width.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumIter,
)]
pub enum PropertyKind {
    /// A reference to another resource by numeric ID.
    Identifier,
    Float,
    Int,
    Bool,
    Byte,

    /// Three consecutive floats.
    Vec3,
}

impl PropertyKind {
    /// The number of bytes a value of this kind occupies in an encoded document.
    pub fn width(self) -> usize {
        match self {
            PropertyKind::Identifier | PropertyKind::Float | PropertyKind::Int => 4,
            PropertyKind::Bool | PropertyKind::Byte => 1,
            PropertyKind::Vec3 => 12,
        }
    }

    /// Returns the value that a newly added property of this kind holds when no value is given.
    pub fn default_value(self) -> PropertyValue {
        match self {
            PropertyKind::Identifier => PropertyValue::Identifier(-1),
            PropertyKind::Float => PropertyValue::Float(0.0),
            PropertyKind::Int => PropertyValue::Int(0),
            PropertyKind::Bool => PropertyValue::Bool(false),
            PropertyKind::Byte => PropertyValue::Byte(0),
            PropertyKind::Vec3 => PropertyValue::Vec3([0.0; 3]),
        }
    }

    /// Converts a configured value into a value of this kind. The conversion is strict: the only
    /// widening allowed is from an integer to a float.
    pub fn value_from(self, property_id: u32, input: &ModValue) -> Result<PropertyValue> {
        let invalid = |reason: String| Error::InvalidValue {
            property_id,
            kind: self,
            reason,
        };

        let as_i32 = |int: i64| {
            i32::try_from(int).map_err(|_| invalid(format!("{int} does not fit in 32 bits")))
        };

        let value = match (self, input) {
            (PropertyKind::Identifier, ModValue::Int(int)) => {
                PropertyValue::Identifier(as_i32(*int)?)
            }
            (PropertyKind::Int, ModValue::Int(int)) => PropertyValue::Int(as_i32(*int)?),

            (PropertyKind::Float, ModValue::Float(float)) => {
                let narrowed = *float as f32;

                if !narrowed.is_finite() {
                    return Err(invalid(format!("{float} is not a finite 32-bit float")));
                }

                PropertyValue::Float(narrowed)
            }
            (PropertyKind::Float, ModValue::Int(int)) => PropertyValue::Float(*int as f32),

            (PropertyKind::Bool, ModValue::Bool(flag)) => PropertyValue::Bool(*flag),

            (PropertyKind::Byte, ModValue::Int(int)) => PropertyValue::Byte(
                u8::try_from(*int).map_err(|_| invalid(format!("{int} is not a byte")))?,
            ),

            (PropertyKind::Vec3, ModValue::Vector(vector)) => PropertyValue::Vec3(*vector),

            (_, other) => return Err(invalid(format!("cannot use {other:?}"))),
        };

        Ok(value)
    }
}

/// A decoded property value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PropertyValue {
    Identifier(i32),
    Float(f32),
    Int(i32),
    Bool(bool),
    Byte(u8),
    Vec3([f32; 3]),
}

impl PropertyValue {
    pub fn kind(&self) -> PropertyKind {
        match self {
            PropertyValue::Identifier(_) => PropertyKind::Identifier,
            PropertyValue::Float(_) => PropertyKind::Float,
            PropertyValue::Int(_) => PropertyKind::Int,
            PropertyValue::Bool(_) => PropertyKind::Bool,
            PropertyValue::Byte(_) => PropertyKind::Byte,
            PropertyValue::Vec3(_) => PropertyKind::Vec3,
        }
    }

    /// Reads a value of `kind` from the start of `bytes`. The slice must be exactly
    /// `kind.width()` bytes long.
    fn decode(kind: PropertyKind, bytes: &[u8]) -> PropertyValue {
        match kind {
            PropertyKind::Identifier => PropertyValue::Identifier(LittleEndian::read_i32(bytes)),
            PropertyKind::Float => PropertyValue::Float(LittleEndian::read_f32(bytes)),
            PropertyKind::Int => PropertyValue::Int(LittleEndian::read_i32(bytes)),
            PropertyKind::Bool => PropertyValue::Bool(bytes[0] != 0),
            PropertyKind::Byte => PropertyValue::Byte(bytes[0]),
            PropertyKind::Vec3 => PropertyValue::Vec3([
                LittleEndian::read_f32(&bytes[0..4]),
                LittleEndian::read_f32(&bytes[4..8]),
                LittleEndian::read_f32(&bytes[8..12]),
            ]),
        }
    }

    /// Produces the canonical encoding of this value.
    fn encode(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; self.kind().width()];

        match *self {
            PropertyValue::Identifier(id) => LittleEndian::write_i32(&mut bytes, id),
            PropertyValue::Float(float) => LittleEndian::write_f32(&mut bytes, float),
            PropertyValue::Int(int) => LittleEndian::write_i32(&mut bytes, int),
            PropertyValue::Bool(flag) => bytes[0] = u8::from(flag),
            PropertyValue::Byte(byte) => bytes[0] = byte,
            PropertyValue::Vec3(vector) => LittleEndian::write_f32_into(&vector, &mut bytes),
        }

        bytes
    }
}

impl Display for PropertyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropertyValue::Identifier(id) => write!(f, "id:{id}"),
            PropertyValue::Float(float) => write!(f, "{float}"),
            PropertyValue::Int(int) => write!(f, "{int}"),
            PropertyValue::Bool(flag) => write!(f, "{flag}"),
            PropertyValue::Byte(byte) => write!(f, "{byte:#04x}"),
            PropertyValue::Vec3([x, y, z]) => write!(f, "({x}, {y}, {z})"),
        }
    }
}

/// A single typed field on an operation.
///
/// The raw bytes are kept alongside the typed value so that a property which is never edited is
/// written back exactly as it was read, even when its encoding isn't canonical (a `Bool` stored
/// as `0x02`, for example). Any edit goes through [`Property::set_value`], which regenerates them.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    id: u32,
    value: PropertyValue,
    raw: Vec<u8>,
}

impl Property {
    /// Creates a property with the canonical encoding of `value`.
    pub fn new(id: u32, value: PropertyValue) -> Property {
        Property {
            id,
            raw: value.encode(),
            value,
        }
    }

    /// Creates a property from bytes read out of a document. `raw` must be `kind.width()` long.
    pub(crate) fn from_raw(id: u32, kind: PropertyKind, raw: &[u8]) -> Property {
        debug_assert_eq!(raw.len(), kind.width());

        Property {
            id,
            value: PropertyValue::decode(kind, raw),
            raw: raw.to_vec(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn kind(&self) -> PropertyKind {
        self.value.kind()
    }

    pub fn value(&self) -> &PropertyValue {
        &self.value
    }

    /// The bytes that will be written for this property when the document is encoded.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Replaces the value. The new value must be the same kind as the old one, since the kind
    /// determines the width of the encoded property.
    pub fn set_value(&mut self, value: PropertyValue) -> Result<()> {
        if value.kind() != self.kind() {
            return Err(Error::InvalidValue {
                property_id: self.id,
                kind: self.kind(),
                reason: format!("cannot store a {} value", value.kind()),
            });
        }

        self.raw = value.encode();
        self.value = value;

        Ok(())
    }
}
