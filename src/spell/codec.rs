//! Reads and writes the binary spell format.
//!
//! All integers are little-endian.
//!
//! ```text
//! u32 spell count
//!   u32 spell id, u32 group count
//!     u32 group id, u32 operation count
//!       u32 operation type, u32 property count
//!         u32 property id, u8 tag, value (width fixed by the tag's kind)
//! ```
//!
//! Counts are always recomputed from the model when encoding, so documents can grow and shrink.

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};

use super::{
    model::{Operation, OperationGroup, SpellDocument, SpellEntry},
    schema::Schema,
    value::Property,
};
use crate::error::{Error, Result};

/// The smallest number of bytes any counted record can take up. Used to reject counts that could
/// never fit in the rest of the buffer before we try to read that many records.
const MIN_RECORD_SIZE: usize = 5;

/// Wraps a byte slice and turns short reads into errors that say what was being read.
struct Reader<'buf> {
    cursor: Cursor<&'buf [u8]>,
}

impl<'buf> Reader<'buf> {
    fn new(bytes: &'buf [u8]) -> Reader<'buf> {
        Reader {
            cursor: Cursor::new(bytes),
        }
    }

    fn offset(&self) -> usize {
        self.cursor.position() as usize
    }

    fn remaining(&self) -> usize {
        self.cursor.get_ref().len().saturating_sub(self.offset())
    }

    fn truncated(&self, what: &str) -> Error {
        Error::malformed(self.offset(), format!("buffer ends while reading {what}"))
    }

    fn u32(&mut self, what: &str) -> Result<u32> {
        let offset = self.offset();

        self.cursor.read_u32::<LittleEndian>().map_err(|_| {
            self.cursor.set_position(offset as u64);
            self.truncated(what)
        })
    }

    fn u8(&mut self, what: &str) -> Result<u8> {
        self.cursor.read_u8().map_err(|_| self.truncated(what))
    }

    fn bytes(&mut self, len: usize, what: &str) -> Result<&'buf [u8]> {
        if self.remaining() < len {
            return Err(self.truncated(what));
        }

        let start = self.offset();
        let bytes = &self.cursor.get_ref()[start..start + len];
        self.cursor.set_position((start + len) as u64);

        Ok(bytes)
    }

    /// Reads a record count, rejecting counts that the remaining bytes couldn't possibly hold.
    fn count(&mut self, what: &str) -> Result<usize> {
        let offset = self.offset();
        let count = self.u32(what)? as usize;

        if count > self.remaining() / MIN_RECORD_SIZE {
            return Err(Error::malformed(
                offset,
                format!("{what} of {count} cannot fit in {} bytes", self.remaining()),
            ));
        }

        Ok(count)
    }
}

fn read_property(reader: &mut Reader, schema: &Schema) -> Result<Property> {
    let property_id = reader.u32("property id")?;

    let tag_offset = reader.offset();
    let tag = reader.u8("property tag")?;

    let kind = schema.kind_for_tag(tag).ok_or_else(|| {
        Error::malformed(
            tag_offset,
            format!("property {property_id} has unknown type tag {tag:#04x}"),
        )
    })?;

    if let Some(expected) = schema.property_kind(property_id) {
        if expected != kind {
            return Err(Error::malformed(
                tag_offset,
                format!("property {property_id} is tagged {kind} but must be {expected}"),
            ));
        }
    }

    let raw = reader.bytes(kind.width(), "property value")?;

    Ok(Property::from_raw(property_id, kind, raw))
}

fn read_operation(reader: &mut Reader, schema: &Schema) -> Result<Operation> {
    let mut operation = Operation::new(reader.u32("operation type")?);

    let count = reader.count("property count")?;
    operation.properties = (0..count)
        .map(|_| read_property(reader, schema))
        .collect::<Result<_>>()?;

    Ok(operation)
}

fn read_group(reader: &mut Reader, schema: &Schema) -> Result<OperationGroup> {
    let mut group = OperationGroup::new(reader.u32("group id")?);

    let count = reader.count("operation count")?;
    group.operations = (0..count)
        .map(|_| read_operation(reader, schema))
        .collect::<Result<_>>()?;

    Ok(group)
}

fn read_entry(reader: &mut Reader, schema: &Schema) -> Result<SpellEntry> {
    let mut entry = SpellEntry::new(reader.u32("spell id")?);

    let count = reader.count("group count")?;

    for _ in 0..count {
        let offset = reader.offset();
        let group = read_group(reader, schema)?;

        if entry.group(group.id).is_some() {
            return Err(Error::malformed(
                offset,
                format!("spell {} has more than one group {}", entry.id, group.id),
            ));
        }

        entry.groups.push(group);
    }

    Ok(entry)
}

/// Decodes a spell document from `bytes`.
///
/// Fails if the buffer is truncated, contains bytes past the end of the document, uses a tag that
/// `schema` has no kind for, or repeats a spell or group ID.
pub fn decode(bytes: &[u8], schema: &Schema) -> Result<SpellDocument> {
    let mut reader = Reader::new(bytes);
    let mut document = SpellDocument::new();

    let count = reader.count("spell count")?;

    for _ in 0..count {
        let offset = reader.offset();
        let entry = read_entry(&mut reader, schema)?;
        let spell_id = entry.id;

        if document.insert_entry(entry).is_some() {
            return Err(Error::malformed(
                offset,
                format!("spell {spell_id} appears more than once"),
            ));
        }
    }

    if reader.remaining() != 0 {
        return Err(Error::malformed(
            reader.offset(),
            format!("{} unexpected bytes after the last spell", reader.remaining()),
        ));
    }

    Ok(document)
}

fn write_count(out: &mut Vec<u8>, count: usize, what: &str) -> Result<()> {
    let count = u32::try_from(count)
        .map_err(|_| Error::malformed(out.len(), format!("too many {what} to encode")))?;

    write_u32(out, count);
    Ok(())
}

fn write_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Encodes `document`. Properties are written from their raw bytes, so untouched values come out
/// exactly as they went in.
pub fn encode(document: &SpellDocument, schema: &Schema) -> Result<Vec<u8>> {
    let mut out = Vec::new();

    write_count(&mut out, document.len(), "spells")?;

    for entry in document.entries() {
        write_u32(&mut out, entry.id);
        write_count(&mut out, entry.groups.len(), "groups")?;

        for group in &entry.groups {
            write_u32(&mut out, group.id);
            write_count(&mut out, group.operations.len(), "operations")?;

            for operation in &group.operations {
                write_u32(&mut out, operation.type_code);
                write_count(&mut out, operation.properties.len(), "properties")?;

                for property in &operation.properties {
                    let tag = schema.tag_for(property.kind()).ok_or_else(|| {
                        Error::malformed(
                            out.len(),
                            format!("schema has no tag for {} values", property.kind()),
                        )
                    })?;

                    write_u32(&mut out, property.id());
                    out.push(tag);
                    out.extend_from_slice(property.raw());
                }
            }
        }
    }

    Ok(out)
}
