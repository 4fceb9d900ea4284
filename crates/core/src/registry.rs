//! Office registry - loads and serves the configured offices
//!
//! The registry scans the offices directory for `*.dot` files, parses each one
//! and provides lookup by office ID. It is built once at startup and shared
//! read-only by every guild controller.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::Result;
use crate::models::Office;

/// File extension of office descriptions
const OFFICE_EXTENSION: &str = "dot";

/// Office registry - central store of available offices
#[derive(Debug, Default)]
pub struct OfficeRegistry {
    /// Loaded offices by office ID
    offices: BTreeMap<String, Arc<Office>>,
}

impl OfficeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from already parsed offices
    pub fn from_offices(offices: impl IntoIterator<Item = Office>) -> Self {
        let mut registry = Self::new();
        for office in offices {
            registry.insert(office);
        }
        registry
    }

    /// Load every office file in a directory
    ///
    /// Any unreadable office file fails the whole load.
    pub fn load(offices_dir: &Path) -> Result<Self> {
        let mut registry = Self::new();
        for path in discover_offices(offices_dir)? {
            let office = Office::from_file(&path)?;
            tracing::info!(
                office_id = %office.id(),
                path = %path.display(),
                rooms = office.room_count(),
                "Loaded office"
            );
            registry.insert(office);
        }
        Ok(registry)
    }

    fn insert(&mut self, office: Office) {
        let id = office.id().to_string();
        if self.offices.insert(id.clone(), Arc::new(office)).is_some() {
            tracing::warn!(office_id = %id, "Duplicate office ID, keeping the last one loaded");
        }
    }

    /// Get an office by ID
    pub fn get(&self, office_id: &str) -> Option<&Arc<Office>> {
        self.offices.get(office_id)
    }

    /// Check if an office is registered
    pub fn contains(&self, office_id: &str) -> bool {
        self.offices.contains_key(office_id)
    }

    /// All offices, ordered by ID
    pub fn offices(&self) -> impl Iterator<Item = &Arc<Office>> {
        self.offices.values()
    }

    /// Get number of registered offices
    pub fn len(&self) -> usize {
        self.offices.len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.offices.is_empty()
    }
}

/// Office files in a directory, sorted by path
fn discover_offices(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file() && path.extension().is_some_and(|ext| ext == OFFICE_EXTENSION)
        })
        .collect();
    paths.sort();
    Ok(paths)
}
