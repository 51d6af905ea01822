//! DATA Scanner
//!
//! Sequential iteration over every row record in a DATA component. This is
//! the only path recovery trusts: it never consults derived components.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::db::{serializer, ColumnFamily};
use crate::dht::{DecoratedKey, Partitioner};
use crate::error::{Result, StoreError};

use super::{Component, Descriptor, DATA_HEADER_SIZE, DATA_MAGIC, MAX_FIELD_LEN, VERSION};

/// One undecoded row record
#[derive(Debug, Clone)]
pub struct RawRow {
    pub key: DecoratedKey,
    /// Offset of the record within the DATA component
    pub offset: u64,
    /// Serialized column family
    pub columns: Vec<u8>,
}

impl RawRow {
    pub fn decode(&self) -> Result<ColumnFamily> {
        serializer::deserialize(&self.columns)
    }
}

/// A row record as laid out on disk
pub(crate) struct Record {
    pub(crate) key: Vec<u8>,
    pub(crate) columns: Vec<u8>,
    /// Bytes occupied, checksum included
    pub(crate) length: u64,
}

/// Read the record starting at `offset`; `reader` must be positioned there
pub(crate) fn read_record<R: Read>(
    reader: &mut R,
    path: &Path,
    offset: u64,
    data_length: u64,
) -> Result<Record> {
    let corrupt = |reason: String| StoreError::CorruptDataComponent {
        path: path.to_path_buf(),
        offset,
        reason,
    };
    let available = data_length.saturating_sub(offset);
    let mut hasher = crc32fast::Hasher::new();
    let mut len_buf = [0u8; 4];

    if available < 4 {
        return Err(corrupt(format!("truncated row header ({} bytes left)", available)));
    }
    reader.read_exact(&mut len_buf)?;
    hasher.update(&len_buf);
    let key_len = u32::from_le_bytes(len_buf) as u64;
    if key_len > MAX_FIELD_LEN || 8 + key_len > available {
        return Err(corrupt(format!(
            "key length {} exceeds remaining {} bytes",
            key_len, available
        )));
    }

    let mut key = vec![0u8; key_len as usize];
    reader.read_exact(&mut key)?;
    hasher.update(&key);

    reader.read_exact(&mut len_buf)?;
    hasher.update(&len_buf);
    let cf_len = u32::from_le_bytes(len_buf) as u64;
    let length = 4 + key_len + 4 + cf_len + 4;
    if cf_len > MAX_FIELD_LEN || length > available {
        return Err(corrupt(format!(
            "row length {} exceeds remaining {} bytes",
            length, available
        )));
    }

    let mut columns = vec![0u8; cf_len as usize];
    reader.read_exact(&mut columns)?;
    hasher.update(&columns);

    reader.read_exact(&mut len_buf)?;
    let expected = u32::from_le_bytes(len_buf);
    let actual = hasher.finalize();
    if expected != actual {
        return Err(corrupt(format!(
            "checksum mismatch: expected {:#010x}, got {:#010x}",
            expected, actual
        )));
    }

    Ok(Record {
        key,
        columns,
        length,
    })
}

/// Sequential reader over a DATA component. Yields rows in file order and
/// stops after the first error.
pub struct DataScanner {
    path: PathBuf,
    reader: BufReader<File>,
    partitioner: Arc<dyn Partitioner>,
    offset: u64,
    data_length: u64,
    failed: bool,
}

impl DataScanner {
    /// Open the DATA component of `descriptor` and validate its header
    pub fn open(descriptor: &Descriptor, partitioner: Arc<dyn Partitioner>) -> Result<Self> {
        let path = descriptor.filename_for(Component::Data);
        if !path.is_file() {
            return Err(StoreError::MissingDataComponent(path));
        }

        let file = File::open(&path)?;
        let data_length = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        let corrupt = |reason: &str| StoreError::CorruptDataComponent {
            path: path.clone(),
            offset: 0,
            reason: reason.to_string(),
        };
        if data_length < DATA_HEADER_SIZE {
            return Err(corrupt("truncated header"));
        }
        let mut header = [0u8; DATA_HEADER_SIZE as usize];
        reader.read_exact(&mut header)?;
        if &header[0..4] != DATA_MAGIC {
            return Err(corrupt("bad magic"));
        }
        if u16::from_le_bytes([header[4], header[5]]) != VERSION {
            return Err(corrupt("unsupported version"));
        }

        Ok(Self {
            path,
            reader,
            partitioner,
            offset: DATA_HEADER_SIZE,
            data_length,
            failed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the DATA component in bytes
    pub fn data_length(&self) -> u64 {
        self.data_length
    }

    /// Offset of the next record
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

impl Iterator for DataScanner {
    type Item = Result<RawRow>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.data_length {
            return None;
        }

        let offset = self.offset;
        match read_record(&mut self.reader, &self.path, offset, self.data_length) {
            Ok(record) => {
                self.offset += record.length;
                Some(Ok(RawRow {
                    key: self.partitioner.decorate(&record.key),
                    offset,
                    columns: record.columns,
                }))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
