//! Parallel index construction.
//!
//! A [`ParallelBuildReducer`] takes a set of document partitions, indexes
//! each one into its own on-disk fragment on a bounded pool of worker
//! threads, folds the fragments together with an associative
//! [`MergeOperator`] and finally renames the single surviving fragment to the
//! output name.
//!
//! The indexing and merging algorithms are injected through
//! [`IndexerFactory`] and [`MergerFactory`]; [`basic`] provides a small
//! reference format that implements both.

pub mod basic;
mod bounded_thread_pool;
mod capabilities;
mod config;
mod document;
pub mod knobs;
mod merge;
mod metrics;
mod name_allocator;
mod reducer;
mod stats;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use crate::{
    bounded_thread_pool::BoundedThreadPool,
    capabilities::{
        Indexer,
        IndexerFactory,
        Merger,
        MergerFactory,
    },
    config::{
        ParallelBuildConfig,
        ReductionStrategy,
    },
    document::{
        BoxedDocumentSource,
        DOCNO_KEY,
        Document,
        DocumentPostingList,
        DocumentSource,
    },
    merge::{
        MergeOperator,
        MergeResult,
        PartialIndex,
    },
    name_allocator::NameAllocator,
    reducer::{
        BuildOutcome,
        ParallelBuildReducer,
    },
    stats::{
        BuildStats,
        RunCounters,
    },
};
