use std::{
    collections::BTreeSet,
    path::Path,
};

use crate::{
    IndexHandle,
    IndexName,
};

/// Low level operations on named fragments. Implementations must be safe to
/// call concurrently for distinct names.
pub trait IndexStorage: Send + Sync + 'static {
    /// Open an existing fragment, or `None` if nothing is stored under `name`.
    fn open(&self, location: &Path, name: &IndexName) -> anyhow::Result<Option<IndexHandle>>;

    /// Create a new, empty fragment to be filled in by a writer.
    fn create_empty(&self, location: &Path, name: &IndexName) -> anyhow::Result<IndexHandle>;

    fn document_count(&self, handle: &IndexHandle) -> u64 {
        handle.document_count()
    }

    /// Persist any pending changes and release the handle.
    fn close(&self, handle: IndexHandle) -> anyhow::Result<()>;

    /// Remove every structure of the fragment.
    fn delete(&self, location: &Path, name: &IndexName) -> anyhow::Result<()>;

    /// Move a fragment to a new name, possibly in another location. Fails if
    /// the destination already exists.
    fn rename(
        &self,
        location: &Path,
        from: &IndexName,
        to_location: &Path,
        to: &IndexName,
    ) -> anyhow::Result<()>;

    fn exists(&self, location: &Path, name: &IndexName) -> anyhow::Result<bool>;

    /// Names of every fragment stored in `location`.
    fn list(&self, location: &Path) -> anyhow::Result<BTreeSet<IndexName>>;
}
