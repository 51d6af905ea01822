//! SSTable Descriptor
//!
//! Addresses the component files of one SSTable generation.
//!
//! File names: `{keyspace}-{table}-{generation}-{Kind}.db`

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, StoreError};

/// One file role within an SSTable generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Component {
    /// Row records; authoritative, never regenerated
    Data,
    /// Sorted key → DATA offset entries
    PrimaryIndex,
    /// Approximate key membership
    Filter,
    /// Row counts and key bounds
    Statistics,
}

impl Component {
    /// Every component of a complete generation
    pub const ALL: [Component; 4] = [
        Component::Data,
        Component::PrimaryIndex,
        Component::Filter,
        Component::Statistics,
    ];

    /// Components that can be rebuilt from DATA
    pub const DERIVED: [Component; 3] = [
        Component::PrimaryIndex,
        Component::Filter,
        Component::Statistics,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Component::Data => "Data",
            Component::PrimaryIndex => "Index",
            Component::Filter => "Filter",
            Component::Statistics => "Statistics",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    pub fn is_derived(&self) -> bool {
        *self != Component::Data
    }
}

/// Identifies one generation of one table
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Descriptor {
    directory: PathBuf,
    keyspace: String,
    table: String,
    generation: u64,
}

impl Descriptor {
    pub fn new(
        directory: impl Into<PathBuf>,
        keyspace: impl Into<String>,
        table: impl Into<String>,
        generation: u64,
    ) -> Result<Self> {
        let keyspace = keyspace.into();
        let table = table.into();
        for name in [&keyspace, &table] {
            if name.is_empty() || name.contains('-') || name.contains(std::path::MAIN_SEPARATOR) {
                return Err(StoreError::Validation(format!(
                    "invalid keyspace/table name {:?}",
                    name
                )));
            }
        }
        Ok(Self {
            directory: directory.into(),
            keyspace,
            table,
            generation,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Same table, different generation
    pub fn with_generation(&self, generation: u64) -> Self {
        Self {
            generation,
            ..self.clone()
        }
    }

    /// Path of `component` for this generation
    pub fn filename_for(&self, component: Component) -> PathBuf {
        self.directory.join(format!(
            "{}-{}-{}-{}.db",
            self.keyspace,
            self.table,
            self.generation,
            component.name()
        ))
    }

    /// Path used while a derived component is being written
    pub(crate) fn temp_filename_for(&self, component: Component) -> PathBuf {
        self.filename_for(component).with_extension("db.tmp")
    }

    pub fn exists(&self, component: Component) -> bool {
        self.filename_for(component).is_file()
    }

    /// Parse a component file name
    /// "ks-users-7-Index.db" → (Descriptor{ks, users, 7}, PrimaryIndex)
    pub fn from_filename(path: &Path) -> Option<(Self, Component)> {
        let file_name = path.file_name()?.to_str()?;
        let stem = file_name.strip_suffix(".db")?;

        let mut parts = stem.split('-');
        let keyspace = parts.next()?;
        let table = parts.next()?;
        let generation = parts.next()?.parse().ok()?;
        let component = Component::from_name(parts.next()?)?;
        if parts.next().is_some() {
            return None;
        }

        let directory = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let descriptor = Self::new(directory, keyspace, table, generation).ok()?;
        Some((descriptor, component))
    }

    /// Every generation with at least one component file in `dir`, oldest first
    pub fn list(dir: &Path) -> Result<Vec<Self>> {
        let mut found = BTreeSet::new();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() {
                if let Some((descriptor, _)) = Self::from_filename(&path) {
                    found.insert(descriptor);
                }
            }
        }

        let mut descriptors: Vec<_> = found.into_iter().collect();
        descriptors.sort_by_key(|d| d.generation);
        Ok(descriptors)
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.keyspace, self.table, self.generation)
    }
}
