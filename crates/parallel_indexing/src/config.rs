use std::{
    num::NonZeroUsize,
    path::{
        Path,
        PathBuf,
    },
};

use errors::ErrorMetadata;
use index_storage::{
    IndexName,
    IndexStorage,
};

use crate::knobs::{
    PARALLEL_INDEX_BUILD_PREFIX,
    PARALLEL_INDEX_MAX_WORKERS,
    PARALLEL_INDEX_MERGE_PREFIX,
    PARALLEL_INDEX_OUTPUT_NAME,
    PARALLEL_INDEX_REDUCTION_STRATEGY,
};

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    strum::EnumString,
    strum::Display,
    strum::EnumIter,
)]
#[strum(serialize_all = "snake_case")]
pub enum ReductionStrategy {
    /// Fold the fragments one at a time inside a single pool job.
    Sequential,
    /// Merge disjoint pairs concurrently, round by round, until one remains.
    #[default]
    PairwiseTree,
}

/// Everything about a run that is not the partitions or the algorithms.
#[derive(Clone, Debug)]
pub struct ParallelBuildConfig {
    output_location: PathBuf,
    output_name: IndexName,
    build_prefix: IndexName,
    merge_prefix: IndexName,
    max_workers: Option<NonZeroUsize>,
    reduction: ReductionStrategy,
}

impl ParallelBuildConfig {
    /// A configuration writing to `output_location`, with every other
    /// setting taken from the knobs.
    pub fn new(output_location: impl Into<PathBuf>) -> anyhow::Result<Self> {
        Ok(Self {
            output_location: output_location.into(),
            output_name: PARALLEL_INDEX_OUTPUT_NAME.parse()?,
            build_prefix: PARALLEL_INDEX_BUILD_PREFIX.parse()?,
            merge_prefix: PARALLEL_INDEX_MERGE_PREFIX.parse()?,
            max_workers: NonZeroUsize::new(*PARALLEL_INDEX_MAX_WORKERS),
            reduction: *PARALLEL_INDEX_REDUCTION_STRATEGY,
        })
    }

    pub fn with_output_name(mut self, output_name: IndexName) -> Self {
        self.output_name = output_name;
        self
    }

    pub fn with_build_prefix(mut self, build_prefix: IndexName) -> Self {
        self.build_prefix = build_prefix;
        self
    }

    pub fn with_merge_prefix(mut self, merge_prefix: IndexName) -> Self {
        self.merge_prefix = merge_prefix;
        self
    }

    /// Cap the number of concurrent workers. `None` runs one worker per
    /// partition.
    pub fn with_max_workers(mut self, max_workers: Option<NonZeroUsize>) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn with_reduction(mut self, reduction: ReductionStrategy) -> Self {
        self.reduction = reduction;
        self
    }

    pub fn output_location(&self) -> &Path {
        &self.output_location
    }

    pub fn output_name(&self) -> &IndexName {
        &self.output_name
    }

    pub fn build_prefix(&self) -> &IndexName {
        &self.build_prefix
    }

    pub fn merge_prefix(&self) -> &IndexName {
        &self.merge_prefix
    }

    pub fn reduction(&self) -> ReductionStrategy {
        self.reduction
    }

    /// Size of the worker pool for a run over `num_partitions` partitions.
    /// Never zero.
    pub fn worker_count(&self, num_partitions: usize) -> usize {
        let workers = match self.max_workers {
            Some(max) => num_partitions.min(max.get()),
            None => num_partitions,
        };
        workers.max(1)
    }

    /// Check the run can start without clobbering anything. Every failure is
    /// a configuration error.
    pub fn validate(&self, storage: &dyn IndexStorage) -> anyhow::Result<()> {
        if !self.output_location.is_dir() {
            anyhow::bail!(ErrorMetadata::invalid_configuration(
                "MissingOutputLocation",
                format!(
                    "Output location {:?} is not an existing directory",
                    self.output_location
                ),
            ));
        }
        if self.build_prefix.starts_with(&*self.merge_prefix)
            || self.merge_prefix.starts_with(&*self.build_prefix)
        {
            anyhow::bail!(ErrorMetadata::invalid_configuration(
                "OverlappingPrefixes",
                format!(
                    "Build prefix {} and merge prefix {} must not be prefixes of each other",
                    self.build_prefix, self.merge_prefix
                ),
            ));
        }
        for prefix in [&self.build_prefix, &self.merge_prefix] {
            let numbered = self
                .output_name
                .strip_prefix(&**prefix)
                .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()));
            if numbered {
                anyhow::bail!(ErrorMetadata::invalid_configuration(
                    "OutputNameCollidesWithPrefix",
                    format!(
                        "Output name {} could be allocated to a fragment with prefix {prefix}",
                        self.output_name
                    ),
                ));
            }
        }
        if storage.exists(&self.output_location, &self.output_name)? {
            anyhow::bail!(ErrorMetadata::invalid_configuration(
                "OutputAlreadyExists",
                format!(
                    "An index named {} already exists in {:?}",
                    self.output_name, self.output_location
                ),
            ));
        }
        Ok(())
    }
}
