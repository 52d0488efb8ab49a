use std::{
    path::{
        Path,
        PathBuf,
    },
    sync::Arc,
};

use anyhow::Context;
use errors::ErrorMetadata;
use index_storage::{
    IndexHandle,
    IndexName,
    IndexStorage,
};

use crate::{
    capabilities::MergerFactory,
    metrics::fragment_merge_timer,
    name_allocator::NameAllocator,
    stats::RunCounters,
};

/// A fragment that has been completely written and closed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartialIndex {
    name: IndexName,
    document_count: u64,
}

impl PartialIndex {
    pub fn new(name: IndexName, document_count: u64) -> Self {
        Self {
            name,
            document_count,
        }
    }

    pub fn name(&self) -> &IndexName {
        &self.name
    }

    pub fn document_count(&self) -> u64 {
        self.document_count
    }
}

/// The value the reduction works over. `Absent` means no index was produced
/// and is the identity of [`MergeOperator::merge`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum MergeResult {
    #[default]
    Absent,
    Present(PartialIndex),
}

impl MergeResult {
    pub fn is_present(&self) -> bool {
        matches!(self, MergeResult::Present(_))
    }

    pub fn document_count(&self) -> u64 {
        match self {
            MergeResult::Absent => 0,
            MergeResult::Present(index) => index.document_count,
        }
    }
}

/// Combines two [`MergeResult`]s into one, consuming both inputs on disk.
///
/// The operation is associative and commutative up to fragment names, so any
/// reduction shape over the build results ends with the same documents.
#[derive(Clone)]
pub struct MergeOperator {
    location: PathBuf,
    storage: Arc<dyn IndexStorage>,
    merger_factory: Arc<dyn MergerFactory>,
    names: Arc<NameAllocator>,
    counters: Arc<RunCounters>,
}

impl MergeOperator {
    pub fn new(
        location: PathBuf,
        storage: Arc<dyn IndexStorage>,
        merger_factory: Arc<dyn MergerFactory>,
        names: Arc<NameAllocator>,
    ) -> Self {
        Self {
            location,
            storage,
            merger_factory,
            names,
            counters: Arc::new(RunCounters::default()),
        }
    }

    pub fn counters(&self) -> &Arc<RunCounters> {
        &self.counters
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn merge(&self, left: MergeResult, right: MergeResult) -> anyhow::Result<MergeResult> {
        match (left, right) {
            (MergeResult::Absent, other) | (other, MergeResult::Absent) => Ok(other),
            (MergeResult::Present(left), MergeResult::Present(right)) => {
                match (left.document_count, right.document_count) {
                    (0, 0) => {
                        self.drop_empty(&left)?;
                        self.drop_empty(&right)?;
                        Ok(MergeResult::Absent)
                    },
                    (0, _) => {
                        self.drop_empty(&left)?;
                        Ok(MergeResult::Present(right))
                    },
                    (_, 0) => {
                        self.drop_empty(&right)?;
                        Ok(MergeResult::Present(left))
                    },
                    _ => self.merge_nonempty(left, right),
                }
            },
        }
    }

    fn drop_empty(&self, index: &PartialIndex) -> anyhow::Result<()> {
        self.storage
            .delete(&self.location, &index.name)
            .with_context(|| {
                ErrorMetadata::merge_failed(format!(
                    "Failed to delete empty fragment {}",
                    index.name
                ))
            })?;
        self.counters.empty_fragment_dropped();
        tracing::debug!("Dropped empty fragment {}", index.name);
        Ok(())
    }

    fn open(&self, index: &PartialIndex) -> anyhow::Result<Option<IndexHandle>> {
        let handle = self
            .storage
            .open(&self.location, &index.name)
            .with_context(|| {
                ErrorMetadata::merge_failed(format!("Failed to open fragment {}", index.name))
            })?;
        if handle.is_none() {
            tracing::warn!("Fragment {} vanished before it could be merged", index.name);
        }
        Ok(handle)
    }

    fn merge_nonempty(
        &self,
        left: PartialIndex,
        right: PartialIndex,
    ) -> anyhow::Result<MergeResult> {
        let left_opened = self.open(&left)?;
        let right_opened = match self.open(&right) {
            Ok(handle) => handle,
            Err(e) => {
                if let Some(l) = left_opened {
                    if let Err(close_error) = self.storage.close(l) {
                        tracing::warn!("Failed to close fragment {}: {close_error:#}", left.name);
                    }
                }
                return Err(e);
            },
        };
        let (left_handle, right_handle) = match (left_opened, right_opened) {
            (Some(l), Some(r)) => (l, r),
            (Some(l), None) => {
                self.storage.close(l)?;
                return Ok(MergeResult::Present(left));
            },
            (None, Some(r)) => {
                self.storage.close(r)?;
                return Ok(MergeResult::Present(right));
            },
            (None, None) => return Ok(MergeResult::Absent),
        };
        let _timer = fragment_merge_timer();
        let destination_name = self.names.next_merge_name();
        let merge_error = || {
            ErrorMetadata::merge_failed(format!(
                "Failed to merge {} and {} into {destination_name}",
                left.name, right.name
            ))
        };
        let mut destination = self
            .storage
            .create_empty(&self.location, &destination_name)
            .with_context(merge_error)?;
        {
            let mut merger = self
                .merger_factory
                .construct(&left_handle, &right_handle, &mut destination)
                .with_context(|| {
                    ErrorMetadata::invalid_configuration(
                        "MergerConstructionFailed",
                        format!("Could not construct a merger for {destination_name}"),
                    )
                })?;
            merger.merge_structures().with_context(merge_error)?;
        }
        let document_count = self.storage.document_count(&destination);
        self.storage.close(left_handle).with_context(merge_error)?;
        self.storage.close(right_handle).with_context(merge_error)?;
        self.storage.close(destination).with_context(merge_error)?;

        let expected = left.document_count + right.document_count;
        if document_count != expected {
            anyhow::bail!(ErrorMetadata::merge_failed(format!(
                "Merged fragment {destination_name} has {document_count} documents, expected \
                 {expected}"
            )));
        }
        for input in [&left, &right] {
            self.storage
                .delete(&self.location, &input.name)
                .with_context(merge_error)?;
        }
        self.counters.merged();
        tracing::debug!(
            "Merged {} and {} into {destination_name} ({document_count} documents)",
            left.name,
            right.name
        );
        Ok(MergeResult::Present(PartialIndex::new(
            destination_name,
            document_count,
        )))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use errors::ErrorMetadataAnyhowExt;
    use index_storage::{
        IndexHandle,
        IndexStorage,
        LocalDirIndexStorage,
    };
    use proptest::prelude::*;

    use super::{
        MergeOperator,
        MergeResult,
    };
    use crate::{
        capabilities::{
            Merger,
            MergerFactory,
        },
        name_allocator::NameAllocator,
        testing::{
            CountingMergerFactory,
            FaultyStorage,
            write_fragment,
        },
    };

    struct Fixture {
        dir: tempfile::TempDir,
        storage: Arc<dyn IndexStorage>,
        names: Arc<NameAllocator>,
        merger: CountingMergerFactory,
        operator: MergeOperator,
    }

    fn fixture() -> anyhow::Result<Fixture> {
        let dir = tempfile::tempdir()?;
        let storage: Arc<dyn IndexStorage> = Arc::new(LocalDirIndexStorage::new());
        let names = Arc::new(NameAllocator::new("data_stream".parse()?, "data_merge".parse()?));
        let merger = CountingMergerFactory::default();
        let operator = MergeOperator::new(
            dir.path().to_path_buf(),
            storage.clone(),
            Arc::new(merger.clone()),
            names.clone(),
        );
        Ok(Fixture {
            dir,
            storage,
            names,
            merger,
            operator,
        })
    }

    impl Fixture {
        fn fragment(&self, num_documents: u64) -> anyhow::Result<MergeResult> {
            write_fragment(
                &*self.storage,
                self.dir.path(),
                &self.names.next_build_name(),
                num_documents,
            )
        }

        fn num_fragments(&self) -> anyhow::Result<usize> {
            Ok(self.storage.list(self.dir.path())?.len())
        }
    }

    #[test]
    fn test_absent_is_identity() -> anyhow::Result<()> {
        let f = fixture()?;
        let x = f.fragment(3)?;
        assert_eq!(f.operator.merge(MergeResult::Absent, x.clone())?, x);
        assert_eq!(f.operator.merge(x.clone(), MergeResult::Absent)?, x);
        assert_eq!(
            f.operator.merge(MergeResult::Absent, MergeResult::Absent)?,
            MergeResult::Absent
        );
        assert_eq!(f.num_fragments()?, 1);
        assert_eq!(f.merger.invocations(), 0);
        Ok(())
    }

    #[test]
    fn test_two_empty_fragments_collapse() -> anyhow::Result<()> {
        let f = fixture()?;
        let (a, b) = (f.fragment(0)?, f.fragment(0)?);
        assert_eq!(f.operator.merge(a, b)?, MergeResult::Absent);
        assert_eq!(f.num_fragments()?, 0);
        assert_eq!(f.merger.invocations(), 0);
        Ok(())
    }

    #[test]
    fn test_one_sided_pass_through() -> anyhow::Result<()> {
        let f = fixture()?;
        let (empty, full) = (f.fragment(0)?, f.fragment(5)?);
        assert_eq!(f.operator.merge(empty, full.clone())?, full);

        let empty = f.fragment(0)?;
        assert_eq!(f.operator.merge(full.clone(), empty)?, full);

        assert_eq!(f.num_fragments()?, 1);
        assert_eq!(f.merger.invocations(), 0);
        assert_eq!(f.names.num_merge_names(), 0);
        Ok(())
    }

    #[test]
    fn test_nonempty_merge_replaces_inputs() -> anyhow::Result<()> {
        let f = fixture()?;
        let (a, b) = (f.fragment(2)?, f.fragment(3)?);
        let MergeResult::Present(merged) = f.operator.merge(a, b)? else {
            panic!("merging non-empty fragments produced nothing");
        };
        assert_eq!(merged.document_count(), 5);
        assert_eq!(&**merged.name(), "data_merge0");
        assert_eq!(
            f.storage.list(f.dir.path())?.into_iter().collect::<Vec<_>>(),
            vec![merged.name().clone()]
        );
        assert_eq!(f.merger.invocations(), 1);
        Ok(())
    }

    struct LossyMerger<'a>(&'a mut IndexHandle);

    impl Merger for LossyMerger<'_> {
        fn merge_structures(&mut self) -> anyhow::Result<()> {
            self.0.properties_mut().num_documents = 1;
            Ok(())
        }
    }

    struct LossyMergerFactory;

    impl MergerFactory for LossyMergerFactory {
        fn construct<'a>(
            &self,
            _left: &'a IndexHandle,
            _right: &'a IndexHandle,
            destination: &'a mut IndexHandle,
        ) -> anyhow::Result<Box<dyn Merger + 'a>> {
            Ok(Box::new(LossyMerger(destination)))
        }
    }

    #[test]
    fn test_merged_count_mismatch_is_a_merge_failure() -> anyhow::Result<()> {
        let f = fixture()?;
        let operator = MergeOperator::new(
            f.dir.path().to_path_buf(),
            f.storage.clone(),
            Arc::new(LossyMergerFactory),
            f.names.clone(),
        );
        let err = operator
            .merge(f.fragment(2)?, f.fragment(2)?)
            .unwrap_err();
        assert!(err.is_worker_failure());
        // Inputs are kept when the merged fragment cannot be trusted.
        assert_eq!(f.num_fragments()?, 3);
        Ok(())
    }

    #[test]
    fn test_open_failure_closes_other_side() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let storage = Arc::new(FaultyStorage::default());
        let names = Arc::new(NameAllocator::new("data_stream".parse()?, "data_merge".parse()?));
        let operator = MergeOperator::new(
            dir.path().to_path_buf(),
            storage.clone(),
            Arc::new(CountingMergerFactory::default()),
            names.clone(),
        );
        let (left, right) = (names.next_build_name(), names.next_build_name());
        let a = write_fragment(&*storage, dir.path(), &left, 2)?;
        let b = write_fragment(&*storage, dir.path(), &right, 3)?;
        storage.fail_open(&right);

        let err = operator.merge(a, b).unwrap_err();
        assert!(err.is_worker_failure());
        assert_eq!(storage.closed(), vec![left.clone(), right.clone(), left]);
        assert_eq!(names.num_merge_names(), 0);
        assert_eq!(storage.list(dir.path())?.len(), 2);
        Ok(())
    }

    fn arb_merge_input() -> impl Strategy<Value = Option<u64>> {
        prop_oneof![Just(None), Just(Some(0)), (1..4u64).prop_map(Some)]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 32,
            failure_persistence: None,
            ..ProptestConfig::default()
        })]

        #[test]
        fn test_merge_is_associative(
            a in arb_merge_input(),
            b in arb_merge_input(),
            c in arb_merge_input(),
        ) {
            let reduce = |left_first: bool| -> anyhow::Result<(u64, usize)> {
                let f = fixture()?;
                let make = |n: Option<u64>| match n {
                    None => Ok(MergeResult::Absent),
                    Some(n) => f.fragment(n),
                };
                let (x, y, z) = (make(a)?, make(b)?, make(c)?);
                let result = if left_first {
                    let xy = f.operator.merge(x, y)?;
                    f.operator.merge(xy, z)?
                } else {
                    let yz = f.operator.merge(y, z)?;
                    f.operator.merge(x, yz)?
                };
                let remaining = f.num_fragments()?;
                assert_eq!(remaining, usize::from(result.is_present()));
                Ok((result.document_count(), remaining))
            };
            let left = reduce(true).unwrap();
            let right = reduce(false).unwrap();
            prop_assert_eq!(left, right);
            let expected: u64 = [a, b, c].into_iter().flatten().sum();
            prop_assert_eq!(left.0, expected);
        }
    }
}
