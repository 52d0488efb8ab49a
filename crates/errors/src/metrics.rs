use metrics::register_indexing_counter;

register_indexing_counter!(
    pub INVALID_CONFIGURATION_ERROR_TOTAL,
    "Count of runs rejected because of an invalid configuration"
);
register_indexing_counter!(pub BUILD_FAILED_ERROR_TOTAL, "Count of failed partition builds");
register_indexing_counter!(pub MERGE_FAILED_ERROR_TOTAL, "Count of failed fragment merges");
register_indexing_counter!(pub COMMIT_FAILED_ERROR_TOTAL, "Count of failed output commits");
