//! Fixtures for exercising the pipeline without real corpora.
use std::{
    collections::BTreeSet,
    path::Path,
    sync::{
        Arc,
        atomic::{
            AtomicUsize,
            Ordering,
        },
    },
};

use index_storage::{
    IndexHandle,
    IndexName,
    IndexStorage,
    LocalDirIndexStorage,
};
use maplit::btreemap;
use parking_lot::Mutex;
use proptest::prelude::*;

use crate::{
    basic::{
        BasicIndex,
        BasicMergerFactory,
    },
    capabilities::{
        Merger,
        MergerFactory,
    },
    document::{
        DOCNO_KEY,
        Document,
        DocumentPostingList,
    },
    merge::{
        MergeResult,
        PartialIndex,
    },
};

pub fn document(docno: &str, terms: &[(&str, u32)]) -> Document {
    Document::new(
        btreemap! { DOCNO_KEY.to_owned() => docno.to_owned() },
        terms.iter().copied().collect::<DocumentPostingList>(),
    )
}

/// `num_documents` documents named `<label>-<i>`, each containing the term
/// `common` once and a term unique to the document.
pub fn documents(label: &str, num_documents: u64) -> Vec<Document> {
    (0..num_documents)
        .map(|i| {
            let docno = format!("{label}-{i}");
            let unique = format!("t{label}{i}");
            document(&docno, &[("common", 1), (unique.as_str(), 2)])
        })
        .collect()
}

/// A partition that yields [`documents`] successfully.
pub fn partition(
    label: &str,
    num_documents: u64,
) -> std::vec::IntoIter<anyhow::Result<Document>> {
    documents(label, num_documents)
        .into_iter()
        .map(Ok)
        .collect::<Vec<_>>()
        .into_iter()
}

/// Write a closed basic-format fragment with `num_documents` documents.
pub fn write_fragment(
    storage: &dyn IndexStorage,
    location: &Path,
    name: &IndexName,
    num_documents: u64,
) -> anyhow::Result<MergeResult> {
    let mut index = BasicIndex::default();
    for document in documents(name, num_documents) {
        index.add_document(&document);
    }
    let mut handle = storage.create_empty(location, name)?;
    index.write(&mut handle)?;
    storage.close(handle)?;
    Ok(MergeResult::Present(PartialIndex::new(
        name.clone(),
        num_documents,
    )))
}

/// The basic merger, counting how often it is constructed.
#[derive(Clone, Default)]
pub struct CountingMergerFactory {
    invocations: Arc<AtomicUsize>,
}

impl CountingMergerFactory {
    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

impl MergerFactory for CountingMergerFactory {
    fn construct<'a>(
        &self,
        left: &'a IndexHandle,
        right: &'a IndexHandle,
        destination: &'a mut IndexHandle,
    ) -> anyhow::Result<Box<dyn Merger + 'a>> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        BasicMergerFactory.construct(left, right, destination)
    }
}

/// Local storage that fails selected operations and remembers which
/// fragments were closed.
#[derive(Default)]
pub struct FaultyStorage {
    inner: LocalDirIndexStorage,
    fail_open: Mutex<BTreeSet<IndexName>>,
    fail_rename: Mutex<bool>,
    closed: Mutex<Vec<IndexName>>,
}

impl FaultyStorage {
    pub fn fail_open(&self, name: &IndexName) {
        self.fail_open.lock().insert(name.clone());
    }

    pub fn fail_rename(&self) {
        *self.fail_rename.lock() = true;
    }

    pub fn closed(&self) -> Vec<IndexName> {
        self.closed.lock().clone()
    }
}

impl IndexStorage for FaultyStorage {
    fn open(&self, location: &Path, name: &IndexName) -> anyhow::Result<Option<IndexHandle>> {
        if self.fail_open.lock().contains(name) {
            anyhow::bail!("injected failure opening {name}");
        }
        self.inner.open(location, name)
    }

    fn create_empty(&self, location: &Path, name: &IndexName) -> anyhow::Result<IndexHandle> {
        self.inner.create_empty(location, name)
    }

    fn close(&self, handle: IndexHandle) -> anyhow::Result<()> {
        self.closed.lock().push(handle.name().clone());
        self.inner.close(handle)
    }

    fn delete(&self, location: &Path, name: &IndexName) -> anyhow::Result<()> {
        self.inner.delete(location, name)
    }

    fn rename(
        &self,
        location: &Path,
        from: &IndexName,
        to_location: &Path,
        to: &IndexName,
    ) -> anyhow::Result<()> {
        if *self.fail_rename.lock() {
            anyhow::bail!("injected failure renaming {from} to {to}");
        }
        self.inner.rename(location, from, to_location, to)
    }

    fn exists(&self, location: &Path, name: &IndexName) -> anyhow::Result<bool> {
        self.inner.exists(location, name)
    }

    fn list(&self, location: &Path) -> anyhow::Result<BTreeSet<IndexName>> {
        self.inner.list(location)
    }
}

/// Document counts for a run's partitions, with plenty of empty ones.
pub fn arb_partition_sizes() -> impl Strategy<Value = Vec<u64>> {
    prop::collection::vec(prop_oneof![Just(0u64), 1..5u64], 1..10)
}
