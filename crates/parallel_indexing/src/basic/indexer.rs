use std::{
    path::{
        Path,
        PathBuf,
    },
    sync::Arc,
};

use errors::ErrorMetadata;
use index_storage::{
    IndexName,
    IndexStorage,
};

use super::format::BasicIndex;
use crate::{
    capabilities::{
        Indexer,
        IndexerFactory,
    },
    document::Document,
};

/// Builds fragments in the basic format through an [`IndexStorage`].
#[derive(Clone)]
pub struct BasicIndexerFactory {
    storage: Arc<dyn IndexStorage>,
}

impl BasicIndexerFactory {
    pub fn new(storage: Arc<dyn IndexStorage>) -> Self {
        Self { storage }
    }
}

impl IndexerFactory for BasicIndexerFactory {
    fn construct(&self, location: &Path, name: &IndexName) -> anyhow::Result<Box<dyn Indexer>> {
        if !location.is_dir() {
            anyhow::bail!(ErrorMetadata::invalid_configuration(
                "MissingOutputLocation",
                format!("Cannot index into {location:?}: not a directory"),
            ));
        }
        Ok(Box::new(BasicIndexer {
            storage: self.storage.clone(),
            location: location.to_path_buf(),
            name: name.clone(),
            worker_count: 1,
        }))
    }
}

pub struct BasicIndexer {
    storage: Arc<dyn IndexStorage>,
    location: PathBuf,
    name: IndexName,
    worker_count: usize,
}

impl Indexer for BasicIndexer {
    fn set_parallelism_hint(&mut self, worker_count: usize) {
        self.worker_count = worker_count.max(1);
    }

    fn index_documents(
        &mut self,
        documents: &mut dyn Iterator<Item = anyhow::Result<Document>>,
    ) -> anyhow::Result<()> {
        // Read the whole partition first so a broken source leaves nothing
        // behind under our name.
        let mut index = BasicIndex::default();
        for document in documents {
            index.add_document(&document?);
        }
        let mut handle = self.storage.create_empty(&self.location, &self.name)?;
        index.write(&mut handle)?;
        self.storage.close(handle)?;
        tracing::debug!(
            "Indexed {} documents into {} (one of {} workers)",
            index.documents.len(),
            self.name,
            self.worker_count
        );
        Ok(())
    }
}
