//! ColumnFamily serialization with a per-row column offset table
//!
//! ## Layout
//! ```text
//! ┌───────────────┬──────────────┐
//! │ Comparator(1) │ Count: u32   │
//! ├───────────────┴──────────────┴──────────────────────┐
//! │ Offset table: Count × [NameLen: u16][Name][Off: u32]│
//! ├─────────────────────────────────────────────────────┤
//! │ BlockLen: u32                                       │
//! ├─────────────────────────────────────────────────────┤
//! │ Column block: Count × [NameLen: u16][Name][Flags: u8]│
//! │   [ClockTag: u8][Clock: 8 | 16][ValLen: u32][Value] │
//! └─────────────────────────────────────────────────────┘
//! ```
//! `Off` is relative to the start of the column block, so a single column
//! can be decoded without touching its neighbours.

use std::cmp::Ordering;

use crate::clock::{ColumnClock, TimestampClock};
use crate::codec::ByteReader;
use crate::error::{Result, StoreError};
use crate::marshal::{ColumnComparator, TimeUuid};

use super::{Column, ColumnFamily};

/// Flag bit marking a tombstone
const FLAG_TOMBSTONE: u8 = 0x01;

/// Append the serialized form of `cf` (offset table included) to `out`
pub fn serialize_with_indexes(cf: &ColumnFamily, out: &mut Vec<u8>) -> Result<()> {
    let mut block = Vec::with_capacity(cf.size() + cf.len() * 16);
    let mut offsets = Vec::with_capacity(cf.len());

    for column in cf.iter() {
        offsets.push(block.len() as u32);
        encode_column(column, &mut block)?;
    }

    out.push(cf.comparator().tag());
    out.extend_from_slice(&(cf.len() as u32).to_le_bytes());
    for (column, offset) in cf.iter().zip(&offsets) {
        out.extend_from_slice(&name_len(column.name())?.to_le_bytes());
        out.extend_from_slice(column.name());
        out.extend_from_slice(&offset.to_le_bytes());
    }
    out.extend_from_slice(&(block.len() as u32).to_le_bytes());
    out.extend_from_slice(&block);
    Ok(())
}

/// Convenience wrapper returning a fresh buffer
pub fn to_bytes(cf: &ColumnFamily) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    serialize_with_indexes(cf, &mut out)?;
    Ok(out)
}

/// Decode a whole column family, checking the offset table against the block
pub fn deserialize(bytes: &[u8]) -> Result<ColumnFamily> {
    let layout = Layout::parse(bytes)?;

    let mut reader = ByteReader::new(layout.block);
    let mut columns = Vec::with_capacity(layout.entries.len());
    for (name, offset) in &layout.entries {
        if reader.position() != *offset as usize {
            return Err(StoreError::Serialization(format!(
                "column offset {} does not match block position {}",
                offset,
                reader.position()
            )));
        }
        let column = decode_column(&mut reader)?;
        if column.name() != *name {
            return Err(StoreError::Serialization(
                "offset table name does not match column".to_string(),
            ));
        }
        columns.push(column);
    }
    if !reader.is_empty() {
        return Err(StoreError::Serialization(format!(
            "{} trailing bytes in column block",
            reader.remaining()
        )));
    }

    ColumnFamily::from_sorted(layout.comparator, columns)
}

/// Look up one column through the offset table without decoding the rest
pub fn find_column(bytes: &[u8], name: &[u8]) -> Result<Option<Column>> {
    let layout = Layout::parse(bytes)?;

    let idx = match layout
        .entries
        .binary_search_by(|(entry, _)| layout.comparator.compare(entry, name))
    {
        Ok(idx) => idx,
        Err(_) => return Ok(None),
    };

    let offset = layout.entries[idx].1 as usize;
    if offset >= layout.block.len() {
        return Err(StoreError::Serialization(format!(
            "column offset {} beyond block of {} bytes",
            offset,
            layout.block.len()
        )));
    }
    let mut reader = ByteReader::new(&layout.block[offset..]);
    let column = decode_column(&mut reader)?;
    if column.name() != name {
        return Err(StoreError::Serialization(
            "offset table points at a different column".to_string(),
        ));
    }
    Ok(Some(column))
}

/// Parsed header + offset table of a serialized column family
struct Layout<'a> {
    comparator: ColumnComparator,
    entries: Vec<(&'a [u8], u32)>,
    block: &'a [u8],
}

impl<'a> Layout<'a> {
    fn parse(bytes: &'a [u8]) -> Result<Self> {
        let mut reader = ByteReader::new(bytes);
        let comparator = ColumnComparator::from_tag(reader.u8()?)?;
        let count = reader.u32()? as usize;

        // each table entry is at least 6 bytes; bound the allocation by the input
        let mut entries = Vec::with_capacity(count.min(reader.remaining() / 6));
        let mut previous: Option<(&[u8], u32)> = None;
        for _ in 0..count {
            let len = reader.u16()? as usize;
            let name = reader.bytes(len)?;
            let offset = reader.u32()?;
            if let Some((prev_name, prev_offset)) = previous {
                if offset <= prev_offset {
                    return Err(StoreError::Serialization(format!(
                        "column offsets not increasing at {}",
                        offset
                    )));
                }
                // lookups binary-search the table
                if comparator.compare(prev_name, name) != Ordering::Less {
                    return Err(StoreError::Serialization(
                        "offset table names out of comparator order".to_string(),
                    ));
                }
            }
            previous = Some((name, offset));
            entries.push((name, offset));
        }

        let block_len = reader.u32()? as usize;
        let block = reader.bytes(block_len)?;
        if !reader.is_empty() {
            return Err(StoreError::Serialization(format!(
                "{} trailing bytes after column block",
                reader.remaining()
            )));
        }

        Ok(Self {
            comparator,
            entries,
            block,
        })
    }
}

fn name_len(name: &[u8]) -> Result<u16> {
    u16::try_from(name.len()).map_err(|_| {
        StoreError::Validation(format!("column name of {} bytes is too long", name.len()))
    })
}

fn encode_column(column: &Column, out: &mut Vec<u8>) -> Result<()> {
    out.extend_from_slice(&name_len(column.name())?.to_le_bytes());
    out.extend_from_slice(column.name());
    out.push(if column.is_tombstone() { FLAG_TOMBSTONE } else { 0 });
    out.push(column.clock().tag());
    match column.clock() {
        ColumnClock::Timestamp(clock) => out.extend_from_slice(&clock.timestamp().to_le_bytes()),
        ColumnClock::TimeUuid(uuid) => out.extend_from_slice(uuid.as_bytes()),
    }
    let value_len = u32::try_from(column.value().len()).map_err(|_| {
        StoreError::Validation(format!(
            "column value of {} bytes is too long",
            column.value().len()
        ))
    })?;
    out.extend_from_slice(&value_len.to_le_bytes());
    out.extend_from_slice(column.value());
    Ok(())
}

fn decode_column(reader: &mut ByteReader<'_>) -> Result<Column> {
    let name_len = reader.u16()? as usize;
    let name = reader.bytes(name_len)?;

    let flags = reader.u8()?;
    if flags & !FLAG_TOMBSTONE != 0 {
        return Err(StoreError::Serialization(format!(
            "unknown column flags {:#04x}",
            flags
        )));
    }

    let clock = match reader.u8()? {
        ColumnClock::TIMESTAMP_TAG => ColumnClock::Timestamp(TimestampClock::new(reader.i64()?)),
        ColumnClock::TIME_UUID_TAG => ColumnClock::TimeUuid(TimeUuid::from_bytes(reader.uuid()?)),
        other => {
            return Err(StoreError::Serialization(format!(
                "unknown clock tag {}",
                other
            )))
        }
    };

    let value_len = reader.u32()? as usize;
    let value = reader.bytes(value_len)?;

    Ok(Column::from_parts(
        name,
        value,
        clock,
        flags & FLAG_TOMBSTONE != 0,
    ))
}
