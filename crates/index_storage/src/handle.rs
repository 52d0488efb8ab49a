use std::path::{
    Path,
    PathBuf,
};

use crate::{
    IndexName,
    IndexProperties,
};

/// An open fragment. Handles are produced by an [`crate::IndexStorage`] and
/// must be handed back to [`crate::IndexStorage::close`] so updated
/// properties are persisted.
#[derive(Debug)]
pub struct IndexHandle {
    location: PathBuf,
    name: IndexName,
    properties: IndexProperties,
    dirty: bool,
}

impl IndexHandle {
    pub fn new(location: PathBuf, name: IndexName, properties: IndexProperties) -> Self {
        Self {
            location,
            name,
            properties,
            dirty: false,
        }
    }

    /// A handle for a fragment that has not been written yet.
    pub fn new_empty(location: PathBuf, name: IndexName) -> Self {
        Self {
            location,
            name,
            properties: IndexProperties::default(),
            dirty: true,
        }
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn name(&self) -> &IndexName {
        &self.name
    }

    pub fn properties(&self) -> &IndexProperties {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> &mut IndexProperties {
        self.dirty = true;
        &mut self.properties
    }

    pub fn document_count(&self) -> u64 {
        self.properties.num_documents
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Path of the file holding `structure` for this fragment.
    pub fn structure_path(&self, structure: &str) -> PathBuf {
        structure_path(&self.location, &self.name, structure)
    }
}

pub(crate) fn structure_path(location: &Path, name: &IndexName, structure: &str) -> PathBuf {
    location.join(format!("{name}.{structure}"))
}
