use std::collections::BTreeMap;

use serde::{
    Deserialize,
    Serialize,
};

/// Metadata key holding a document's external identifier.
pub const DOCNO_KEY: &str = "docno";

/// Term frequencies of one tokenised document.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct DocumentPostingList {
    frequencies: BTreeMap<String, u32>,
}

impl DocumentPostingList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `frequency` occurrences of `term`.
    pub fn insert(&mut self, term: impl Into<String>, frequency: u32) {
        *self.frequencies.entry(term.into()).or_default() += frequency;
    }

    pub fn frequency(&self, term: &str) -> u32 {
        self.frequencies.get(term).copied().unwrap_or(0)
    }

    /// Number of tokens in the document.
    pub fn document_length(&self) -> u64 {
        self.frequencies.values().map(|&f| f as u64).sum()
    }

    pub fn num_terms(&self) -> usize {
        self.frequencies.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.frequencies.iter().map(|(t, f)| (t.as_str(), *f))
    }
}

impl<T: Into<String>> FromIterator<(T, u32)> for DocumentPostingList {
    fn from_iter<I: IntoIterator<Item = (T, u32)>>(iter: I) -> Self {
        let mut postings = Self::new();
        for (term, frequency) in iter {
            postings.insert(term, frequency);
        }
        postings
    }
}

/// One record produced by a document source: metadata plus postings.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Document {
    pub metadata: BTreeMap<String, String>,
    pub postings: DocumentPostingList,
}

impl Document {
    pub fn new(metadata: BTreeMap<String, String>, postings: DocumentPostingList) -> Self {
        Self { metadata, postings }
    }

    pub fn docno(&self) -> Option<&str> {
        self.metadata.get(DOCNO_KEY).map(String::as_str)
    }
}

/// A finite, single use stream of documents. A failed item is fatal to the
/// partition consuming it.
pub trait DocumentSource: Iterator<Item = anyhow::Result<Document>> + Send {}

impl<T> DocumentSource for T where T: Iterator<Item = anyhow::Result<Document>> + Send {}

/// The type partitions are erased to before they are handed to workers.
pub type BoxedDocumentSource = Box<dyn DocumentSource>;

#[cfg(test)]
mod tests {
    use maplit::btreemap;

    use super::{
        Document,
        DocumentPostingList,
    };

    #[test]
    fn test_posting_list_accumulates() {
        let postings: DocumentPostingList = [("a", 1), ("b", 40), ("a", 2)].into_iter().collect();
        assert_eq!(postings.frequency("a"), 3);
        assert_eq!(postings.frequency("b"), 40);
        assert_eq!(postings.frequency("c"), 0);
        assert_eq!(postings.num_terms(), 2);
        assert_eq!(postings.document_length(), 43);
    }

    #[test]
    fn test_docno() {
        let doc = Document::new(
            btreemap! { "docno".to_owned() => "d1".to_owned() },
            DocumentPostingList::new(),
        );
        assert_eq!(doc.docno(), Some("d1"));
        assert_eq!(Document::default().docno(), None);
    }
}
