use std::{
    collections::BTreeSet,
    fs,
    io,
    path::{
        Path,
        PathBuf,
    },
};

use anyhow::Context;
use walkdir::WalkDir;

use crate::{
    IndexHandle,
    IndexName,
    IndexProperties,
    IndexStorage,
    PROPERTIES_STRUCTURE,
    handle::structure_path,
};

/// Stores fragments as flat files in a local directory. Every file belonging
/// to fragment `name` is called `<name>.<structure>`, and the fragment exists
/// iff its properties file does.
#[derive(Clone, Debug, Default)]
pub struct LocalDirIndexStorage;

impl LocalDirIndexStorage {
    pub fn new() -> Self {
        Self
    }

    /// All files in `location` that belong to `name`, as (path, structure).
    fn fragment_files(
        &self,
        location: &Path,
        name: &IndexName,
    ) -> anyhow::Result<Vec<(PathBuf, String)>> {
        let prefix = format!("{name}.");
        let mut files = vec![];
        for entry in WalkDir::new(location)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(file_name) = entry.file_name().to_str() else {
                continue;
            };
            if let Some(structure) = file_name.strip_prefix(&prefix) {
                files.push((entry.path().to_path_buf(), structure.to_owned()));
            }
        }
        Ok(files)
    }

    fn read_properties(path: &Path) -> anyhow::Result<Option<IndexProperties>> {
        let contents = match fs::read(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("Failed to read {path:?}")),
        };
        let properties = serde_json::from_slice(&contents)
            .with_context(|| format!("Corrupt index properties in {path:?}"))?;
        Ok(Some(properties))
    }
}

impl IndexStorage for LocalDirIndexStorage {
    fn open(&self, location: &Path, name: &IndexName) -> anyhow::Result<Option<IndexHandle>> {
        let path = structure_path(location, name, PROPERTIES_STRUCTURE);
        let Some(properties) = Self::read_properties(&path)? else {
            return Ok(None);
        };
        Ok(Some(IndexHandle::new(
            location.to_path_buf(),
            name.clone(),
            properties,
        )))
    }

    fn create_empty(&self, location: &Path, name: &IndexName) -> anyhow::Result<IndexHandle> {
        anyhow::ensure!(
            !self.exists(location, name)?,
            "Index {name} already exists in {location:?}"
        );
        let handle = IndexHandle::new_empty(location.to_path_buf(), name.clone());
        // Write the properties straight away so the fragment is visible to
        // `exists`, `list` and `delete` even if the writer never closes it.
        let path = handle.structure_path(PROPERTIES_STRUCTURE);
        fs::write(&path, serde_json::to_vec_pretty(handle.properties())?)
            .with_context(|| format!("Failed to create {path:?}"))?;
        Ok(handle)
    }

    fn close(&self, handle: IndexHandle) -> anyhow::Result<()> {
        if !handle.is_dirty() {
            return Ok(());
        }
        let path = handle.structure_path(PROPERTIES_STRUCTURE);
        fs::write(&path, serde_json::to_vec_pretty(handle.properties())?)
            .with_context(|| format!("Failed to write {path:?}"))?;
        Ok(())
    }

    fn delete(&self, location: &Path, name: &IndexName) -> anyhow::Result<()> {
        let files = self.fragment_files(location, name)?;
        anyhow::ensure!(
            !files.is_empty(),
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("No index {name} to delete in {location:?}"),
            )
        );
        for (path, _) in &files {
            fs::remove_file(path).with_context(|| format!("Failed to delete {path:?}"))?;
        }
        tracing::debug!("Deleted index {name} ({} files)", files.len());
        Ok(())
    }

    fn rename(
        &self,
        location: &Path,
        from: &IndexName,
        to_location: &Path,
        to: &IndexName,
    ) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.exists(to_location, to)?,
            "Cannot rename {from} to {to}: {to} already exists in {to_location:?}"
        );
        let files = self.fragment_files(location, from)?;
        anyhow::ensure!(
            files
                .iter()
                .any(|(_, structure)| structure == PROPERTIES_STRUCTURE),
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("No index {from} to rename in {location:?}"),
            )
        );
        fs::create_dir_all(to_location)?;
        // Move the properties last: until it moves, the source still exists
        // as far as `open` is concerned.
        let (properties, data): (Vec<_>, Vec<_>) = files
            .into_iter()
            .partition(|(_, structure)| structure == PROPERTIES_STRUCTURE);
        for (path, structure) in data.into_iter().chain(properties) {
            let target = structure_path(to_location, to, &structure);
            fs::rename(&path, &target)
                .with_context(|| format!("Failed to move {path:?} to {target:?}"))?;
        }
        tracing::debug!("Renamed index {from} to {to}");
        Ok(())
    }

    fn exists(&self, location: &Path, name: &IndexName) -> anyhow::Result<bool> {
        Ok(structure_path(location, name, PROPERTIES_STRUCTURE).try_exists()?)
    }

    fn list(&self, location: &Path) -> anyhow::Result<BTreeSet<IndexName>> {
        let suffix = format!(".{PROPERTIES_STRUCTURE}");
        let mut names = BTreeSet::new();
        for entry in WalkDir::new(location).min_depth(1).max_depth(1) {
            let entry = entry?;
            let Some(file_name) = entry.file_name().to_str() else {
                continue;
            };
            // Files whose prefix is not a valid name cannot belong to a fragment.
            if let Some(Ok(name)) = file_name.strip_suffix(&suffix).map(str::parse::<IndexName>) {
                names.insert(name);
            }
        }
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::LocalDirIndexStorage;
    use crate::{
        IndexName,
        IndexStorage,
    };

    fn name(s: &str) -> IndexName {
        s.parse().unwrap()
    }

    #[test]
    fn test_open_missing_is_none() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let storage = LocalDirIndexStorage::new();
        assert!(storage.open(dir.path(), &name("data"))?.is_none());
        assert!(storage.list(dir.path())?.is_empty());
        Ok(())
    }

    #[test]
    fn test_create_close_open() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let storage = LocalDirIndexStorage::new();
        let mut handle = storage.create_empty(dir.path(), &name("data_merge0"))?;
        assert_eq!(storage.document_count(&handle), 0);
        handle.properties_mut().num_documents = 12;
        storage.close(handle)?;

        let reopened = storage
            .open(dir.path(), &name("data_merge0"))?
            .expect("fragment should exist");
        assert_eq!(storage.document_count(&reopened), 12);
        assert!(storage.create_empty(dir.path(), &name("data_merge0")).is_err());
        Ok(())
    }

    #[test]
    fn test_delete_only_touches_own_prefix() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let storage = LocalDirIndexStorage::new();
        for n in ["data_stream1", "data_stream10"] {
            let handle = storage.create_empty(dir.path(), &name(n))?;
            fs::write(handle.structure_path("lexicon"), b"{}")?;
            storage.close(handle)?;
        }
        storage.delete(dir.path(), &name("data_stream1"))?;
        assert_eq!(
            storage.list(dir.path())?.into_iter().collect::<Vec<_>>(),
            vec![name("data_stream10")]
        );
        assert!(dir.path().join("data_stream10.lexicon").exists());
        assert!(!dir.path().join("data_stream1.lexicon").exists());

        // Deleting twice is an error.
        assert!(storage.delete(dir.path(), &name("data_stream1")).is_err());
        Ok(())
    }

    #[test]
    fn test_rename_moves_every_structure() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let storage = LocalDirIndexStorage::new();
        let mut handle = storage.create_empty(dir.path(), &name("data_merge3"))?;
        fs::write(handle.structure_path("inverted"), b"postings")?;
        handle.properties_mut().num_documents = 2;
        storage.close(handle)?;

        storage.rename(dir.path(), &name("data_merge3"), dir.path(), &name("data"))?;
        assert!(!storage.exists(dir.path(), &name("data_merge3"))?);
        let handle = storage.open(dir.path(), &name("data"))?.unwrap();
        assert_eq!(handle.document_count(), 2);
        assert_eq!(fs::read(handle.structure_path("inverted"))?, b"postings");
        Ok(())
    }

    #[test]
    fn test_rename_refuses_to_overwrite() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let storage = LocalDirIndexStorage::new();
        for n in ["data", "data_stream0"] {
            let handle = storage.create_empty(dir.path(), &name(n))?;
            storage.close(handle)?;
        }
        assert!(
            storage
                .rename(dir.path(), &name("data_stream0"), dir.path(), &name("data"))
                .is_err()
        );
        assert!(storage.exists(dir.path(), &name("data_stream0"))?);
        Ok(())
    }
}
