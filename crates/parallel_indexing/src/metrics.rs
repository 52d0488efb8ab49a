use metrics::{
    STATUS_LABEL,
    StatusTimer,
    Timer,
    log_counter,
    log_gauge_delta,
    register_indexing_counter,
    register_indexing_gauge,
    register_indexing_histogram,
};
use prometheus::Histogram;

register_indexing_histogram!(
    PARALLEL_INDEX_BUILD_RUN_SECONDS,
    "Time to build, reduce and commit one parallel index",
    &STATUS_LABEL
);
pub fn build_run_timer() -> StatusTimer {
    StatusTimer::new(&PARALLEL_INDEX_BUILD_RUN_SECONDS)
}

register_indexing_histogram!(
    PARALLEL_INDEX_PARTITION_BUILD_SECONDS,
    "Time for one worker to index one partition"
);
pub fn partition_build_timer() -> Timer<Histogram> {
    Timer::new(&PARALLEL_INDEX_PARTITION_BUILD_SECONDS)
}

register_indexing_histogram!(
    PARALLEL_INDEX_FRAGMENT_MERGE_SECONDS,
    "Time to merge two non-empty fragments"
);
pub fn fragment_merge_timer() -> Timer<Histogram> {
    Timer::new(&PARALLEL_INDEX_FRAGMENT_MERGE_SECONDS)
}

register_indexing_histogram!(
    PARALLEL_INDEX_OUTPUT_COMMIT_SECONDS,
    "Time to rename the surviving fragment to the output name",
    &STATUS_LABEL
);
pub fn output_commit_timer() -> StatusTimer {
    StatusTimer::new(&PARALLEL_INDEX_OUTPUT_COMMIT_SECONDS)
}

register_indexing_counter!(
    PARALLEL_INDEX_FRAGMENTS_BUILT_TOTAL,
    "Number of fragments written by the build phase"
);
pub fn log_fragment_built() {
    log_counter(&PARALLEL_INDEX_FRAGMENTS_BUILT_TOTAL, 1);
}

register_indexing_counter!(
    PARALLEL_INDEX_EMPTY_PARTITIONS_SKIPPED_TOTAL,
    "Number of partitions that were empty and never reached an indexer"
);
pub fn log_empty_partition_skipped() {
    log_counter(&PARALLEL_INDEX_EMPTY_PARTITIONS_SKIPPED_TOTAL, 1);
}

register_indexing_counter!(
    PARALLEL_INDEX_FRAGMENTS_MERGED_TOTAL,
    "Number of merges that invoked the merger"
);
pub fn log_fragments_merged() {
    log_counter(&PARALLEL_INDEX_FRAGMENTS_MERGED_TOTAL, 1);
}

register_indexing_counter!(
    PARALLEL_INDEX_EMPTY_FRAGMENTS_DROPPED_TOTAL,
    "Number of zero-document fragments deleted during the reduction"
);
pub fn log_empty_fragment_dropped() {
    log_counter(&PARALLEL_INDEX_EMPTY_FRAGMENTS_DROPPED_TOTAL, 1);
}

register_indexing_counter!(
    PARALLEL_INDEX_DOCUMENTS_INDEXED_TOTAL,
    "Number of documents in committed output indexes"
);
pub fn log_documents_indexed(num_documents: u64) {
    log_counter(&PARALLEL_INDEX_DOCUMENTS_INDEXED_TOTAL, num_documents);
}

register_indexing_gauge!(
    PARALLEL_INDEX_POOL_BUSY_THREADS,
    "Number of pool threads currently building or merging"
);
pub fn log_pool_thread_busy() {
    log_gauge_delta(&PARALLEL_INDEX_POOL_BUSY_THREADS, 1.0);
}

pub fn log_pool_thread_idle() {
    log_gauge_delta(&PARALLEL_INDEX_POOL_BUSY_THREADS, -1.0);
}
