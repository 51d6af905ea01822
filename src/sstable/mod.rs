//! SSTable Module
//!
//! Sorted String Table - immutable on-disk sorted rows, one file per component.
//!
//! ## Data Component
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Header (6 bytes)                                        │
//! │   Magic: "CFSD" (4) | Version: u16 (2)                  │
//! ├─────────────────────────────────────────────────────────┤
//! │ Rows (variable), in partitioner order                   │
//! │   [KeyLen: u32][Key][CfLen: u32][ColumnFamily][CRC: u32]│
//! │   ... repeated for each row ...                         │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Derived Components (Index, Filter, Statistics)
//! ```text
//! ┌──────────┬─────────────┬───────────────┬─────────┬──────────┐
//! │ Magic (4)│ Version (2) │ PayloadLen (8)│ Payload │ CRC (4)  │
//! └──────────┴─────────────┴───────────────┴─────────┴──────────┘
//! ```
//! Derived components are written to a temporary name and renamed into
//! place, so a crash never leaves a half-written one under its real name.

mod descriptor;
mod filter;
mod index;
mod reader;
mod scanner;
mod stats;
mod writer;

use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};

use crate::error::{Result, StoreError};

pub use descriptor::{Component, Descriptor};
pub use filter::BloomFilter;
pub use index::{IndexEntry, PrimaryIndex};
pub use reader::SSTableReader;
pub use scanner::{DataScanner, RawRow};
pub use stats::SSTableStats;
pub use writer::{write_raw_sstable, SSTableWriter};

// =============================================================================
// Shared Constants (used by writer, reader, scanner)
// =============================================================================

/// Magic bytes identifying a DATA component
pub(crate) const DATA_MAGIC: &[u8; 4] = b"CFSD";

/// Magic bytes of the PRIMARY_INDEX component
pub(crate) const INDEX_MAGIC: &[u8; 4] = b"CFSI";

/// Magic bytes of the FILTER component
pub(crate) const FILTER_MAGIC: &[u8; 4] = b"CFSF";

/// Magic bytes of the STATISTICS component
pub(crate) const STATS_MAGIC: &[u8; 4] = b"CFSS";

/// Current on-disk format version (all components)
pub(crate) const VERSION: u16 = 1;

/// DATA header: Magic (4) + Version (2)
pub(crate) const DATA_HEADER_SIZE: u64 = 6;

/// Derived component frame: Magic (4) + Version (2) + PayloadLen (8) + CRC (4)
const FRAME_OVERHEAD: usize = 18;

/// Upper bound on a single key or column family record
pub(crate) const MAX_FIELD_LEN: u64 = 256 * 1024 * 1024;

// =============================================================================
// Derived Component Framing
// =============================================================================

/// Write a framed component via a temporary file and rename it into place
pub(crate) fn write_component(
    descriptor: &Descriptor,
    component: Component,
    magic: &[u8; 4],
    payload: &[u8],
) -> Result<()> {
    let path = descriptor.filename_for(component);
    let tmp = descriptor.temp_filename_for(component);

    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&tmp)?;
    let mut writer = BufWriter::new(file);

    writer.write_all(magic)?;
    writer.write_all(&VERSION.to_le_bytes())?;
    writer.write_all(&(payload.len() as u64).to_le_bytes())?;
    writer.write_all(payload)?;
    writer.write_all(&crc32fast::hash(payload).to_le_bytes())?;
    writer.flush()?;

    let file = writer.into_inner().map_err(|e| {
        StoreError::Storage(format!("Failed to flush {}: {}", tmp.display(), e))
    })?;
    file.sync_all()?;

    fs::rename(&tmp, &path)?;
    Ok(())
}

/// Read a framed component, returning its payload once the frame checks out
pub(crate) fn read_component(
    descriptor: &Descriptor,
    component: Component,
    magic: &[u8; 4],
) -> Result<Vec<u8>> {
    let path = descriptor.filename_for(component);
    if !path.is_file() {
        return Err(StoreError::MissingComponent { component, path });
    }

    let bytes = fs::read(&path)?;
    let invalid = |reason: String| StoreError::InvalidComponent {
        path: path.clone(),
        reason,
    };

    if bytes.len() < FRAME_OVERHEAD {
        return Err(invalid(format!("{} bytes is shorter than a frame", bytes.len())));
    }
    if &bytes[0..4] != magic {
        return Err(invalid(format!("bad magic {:?}", &bytes[0..4])));
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != VERSION {
        return Err(invalid(format!("unsupported version {}", version)));
    }

    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&bytes[6..14]);
    let payload_len = u64::from_le_bytes(len_bytes);
    if payload_len != (bytes.len() - FRAME_OVERHEAD) as u64 {
        return Err(invalid(format!(
            "declared payload of {} bytes, file holds {}",
            payload_len,
            bytes.len() - FRAME_OVERHEAD
        )));
    }

    let payload = &bytes[14..bytes.len() - 4];
    let mut crc_bytes = [0u8; 4];
    crc_bytes.copy_from_slice(&bytes[bytes.len() - 4..]);
    let expected = u32::from_le_bytes(crc_bytes);
    let actual = crc32fast::hash(payload);
    if expected != actual {
        return Err(invalid(format!(
            "checksum mismatch: expected {:#010x}, got {:#010x}",
            expected, actual
        )));
    }

    Ok(payload.to_vec())
}

/// Remove every derived component (and leftover temporaries) of a generation
pub(crate) fn remove_derived(descriptor: &Descriptor) -> Result<()> {
    for component in Component::DERIVED {
        for path in [
            descriptor.filename_for(component),
            descriptor.temp_filename_for(component),
        ] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
    }
    Ok(())
}
