use std::collections::BTreeSet;

use serde::{
    Deserialize,
    Serialize,
};

/// Structure name of the properties file every fragment carries.
pub const PROPERTIES_STRUCTURE: &str = "properties";

/// Collection statistics and bookkeeping persisted next to a fragment's data.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IndexProperties {
    pub num_documents: u64,
    pub num_terms: u64,
    pub num_postings: u64,
    pub num_tokens: u64,
    /// Data structures written for this fragment, excluding the properties
    /// themselves.
    pub structures: BTreeSet<String>,
}

impl IndexProperties {
    pub fn is_empty(&self) -> bool {
        self.num_documents == 0
    }
}
