use std::sync::atomic::{
    AtomicU64,
    Ordering,
};

use crate::metrics::{
    log_empty_fragment_dropped,
    log_empty_partition_skipped,
    log_fragment_built,
    log_fragments_merged,
};

/// What one run did, returned alongside the output index.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub partitions: usize,
    /// Partitions that were empty when probed and never reached an indexer.
    pub empty_partitions_skipped: u64,
    pub fragments_built: u64,
    /// Merges that invoked the merger. Zero-document shortcuts are not
    /// counted here.
    pub merges: u64,
    pub empty_fragments_dropped: u64,
    pub output_documents: u64,
}

/// Shared tallies for one run. Every increment is mirrored to the process
/// metrics.
#[derive(Debug, Default)]
pub struct RunCounters {
    empty_partitions_skipped: AtomicU64,
    fragments_built: AtomicU64,
    merges: AtomicU64,
    empty_fragments_dropped: AtomicU64,
}

impl RunCounters {
    pub fn empty_partition_skipped(&self) {
        self.empty_partitions_skipped.fetch_add(1, Ordering::Relaxed);
        log_empty_partition_skipped();
    }

    pub fn fragment_built(&self) {
        self.fragments_built.fetch_add(1, Ordering::Relaxed);
        log_fragment_built();
    }

    pub fn merged(&self) {
        self.merges.fetch_add(1, Ordering::Relaxed);
        log_fragments_merged();
    }

    pub fn empty_fragment_dropped(&self) {
        self.empty_fragments_dropped.fetch_add(1, Ordering::Relaxed);
        log_empty_fragment_dropped();
    }

    pub fn snapshot(&self, partitions: usize, output_documents: u64) -> BuildStats {
        BuildStats {
            partitions,
            empty_partitions_skipped: self.empty_partitions_skipped.load(Ordering::Relaxed),
            fragments_built: self.fragments_built.load(Ordering::Relaxed),
            merges: self.merges.load(Ordering::Relaxed),
            empty_fragments_dropped: self.empty_fragments_dropped.load(Ordering::Relaxed),
            output_documents,
        }
    }
}
