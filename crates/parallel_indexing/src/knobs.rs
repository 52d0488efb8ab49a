//! Tunable parameters for parallel index builds.
//!
//! Every knob can be overridden with an environment variable of the same
//! name. Values are read once per process; per-run overrides go through the
//! setters on [`crate::ParallelBuildConfig`].
#![deny(missing_docs)]

use std::sync::LazyLock;

use cmd_util::env::env_config;

use crate::config::ReductionStrategy;

/// Upper bound on concurrently building or merging workers.
/// 0 -> one worker per partition.
pub static PARALLEL_INDEX_MAX_WORKERS: LazyLock<usize> =
    LazyLock::new(|| env_config("PARALLEL_INDEX_MAX_WORKERS", 0));

/// How fragments are combined after the build phase: `sequential` folds them
/// one at a time, `pairwise_tree` merges disjoint pairs concurrently.
pub static PARALLEL_INDEX_REDUCTION_STRATEGY: LazyLock<ReductionStrategy> = LazyLock::new(|| {
    env_config(
        "PARALLEL_INDEX_REDUCTION_STRATEGY",
        ReductionStrategy::default(),
    )
});

/// Name prefix of fragments written by the build phase.
pub static PARALLEL_INDEX_BUILD_PREFIX: LazyLock<String> =
    LazyLock::new(|| env_config("PARALLEL_INDEX_BUILD_PREFIX", "data_stream".to_owned()));

/// Name prefix of fragments written by merges.
pub static PARALLEL_INDEX_MERGE_PREFIX: LazyLock<String> =
    LazyLock::new(|| env_config("PARALLEL_INDEX_MERGE_PREFIX", "data_merge".to_owned()));

/// Name the surviving fragment is committed under.
pub static PARALLEL_INDEX_OUTPUT_NAME: LazyLock<String> =
    LazyLock::new(|| env_config("PARALLEL_INDEX_OUTPUT_NAME", "data".to_owned()));
