//! The pluggable algorithms the pipeline drives: an [`Indexer`] that turns
//! one document stream into one fragment, and a [`Merger`] that combines two
//! fragments into a third. Callers inject them through factories with fixed
//! construction signatures; plain closures work as factories too.
use std::path::Path;

use index_storage::{
    IndexHandle,
    IndexName,
};

use crate::document::Document;

pub trait Indexer: Send {
    /// Total number of workers indexing concurrently, for sizing internal
    /// buffers.
    fn set_parallelism_hint(&mut self, worker_count: usize);

    /// Consume every document and leave a complete fragment behind under the
    /// name the indexer was constructed with.
    fn index_documents(
        &mut self,
        documents: &mut dyn Iterator<Item = anyhow::Result<Document>>,
    ) -> anyhow::Result<()>;
}

pub trait IndexerFactory: Send + Sync + 'static {
    fn construct(&self, location: &Path, name: &IndexName) -> anyhow::Result<Box<dyn Indexer>>;
}

impl<F> IndexerFactory for F
where
    F: Fn(&Path, &IndexName) -> anyhow::Result<Box<dyn Indexer>> + Send + Sync + 'static,
{
    fn construct(&self, location: &Path, name: &IndexName) -> anyhow::Result<Box<dyn Indexer>> {
        self(location, name)
    }
}

pub trait Merger: Send {
    /// Write the union of both inputs into the destination. Inputs are only
    /// read.
    fn merge_structures(&mut self) -> anyhow::Result<()>;
}

pub trait MergerFactory: Send + Sync + 'static {
    fn construct<'a>(
        &self,
        left: &'a IndexHandle,
        right: &'a IndexHandle,
        destination: &'a mut IndexHandle,
    ) -> anyhow::Result<Box<dyn Merger + 'a>>;
}

impl<F> MergerFactory for F
where
    F: for<'a> Fn(
            &'a IndexHandle,
            &'a IndexHandle,
            &'a mut IndexHandle,
        ) -> anyhow::Result<Box<dyn Merger + 'a>>
        + Send
        + Sync
        + 'static,
{
    fn construct<'a>(
        &self,
        left: &'a IndexHandle,
        right: &'a IndexHandle,
        destination: &'a mut IndexHandle,
    ) -> anyhow::Result<Box<dyn Merger + 'a>> {
        self(left, right, destination)
    }
}
