use std::{
    collections::BTreeMap,
    fs,
};

use anyhow::Context;
use index_storage::IndexHandle;
use serde::{
    Deserialize,
    Serialize,
    de::DeserializeOwned,
};

use crate::document::Document;

pub const LEXICON_STRUCTURE: &str = "lexicon";
pub const INVERTED_STRUCTURE: &str = "inverted";
pub const DOCUMENT_STRUCTURE: &str = "document";

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LexiconEntry {
    /// Number of documents containing the term.
    pub document_frequency: u64,
    /// Total occurrences of the term across the fragment.
    pub collection_frequency: u64,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Posting {
    pub doc_id: u64,
    pub frequency: u32,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct DocumentEntry {
    pub docno: Option<String>,
    pub length: u64,
}

/// In-memory form of a fragment in the basic format. Document ids are dense
/// and local to the fragment.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BasicIndex {
    pub lexicon: BTreeMap<String, LexiconEntry>,
    pub inverted: BTreeMap<String, Vec<Posting>>,
    pub documents: Vec<DocumentEntry>,
}

impl BasicIndex {
    pub fn add_document(&mut self, document: &Document) {
        let doc_id = self.documents.len() as u64;
        for (term, frequency) in document.postings.iter().filter(|(_, f)| *f > 0) {
            let entry = self.lexicon.entry(term.to_owned()).or_default();
            entry.document_frequency += 1;
            entry.collection_frequency += frequency as u64;
            self.inverted
                .entry(term.to_owned())
                .or_default()
                .push(Posting { doc_id, frequency });
        }
        self.documents.push(DocumentEntry {
            docno: document.docno().map(str::to_owned),
            length: document.postings.document_length(),
        });
    }

    /// Append `other` after this index, shifting its document ids past ours.
    pub fn append(&mut self, other: BasicIndex) {
        let offset = self.documents.len() as u64;
        for (term, entry) in other.lexicon {
            let ours = self.lexicon.entry(term).or_default();
            ours.document_frequency += entry.document_frequency;
            ours.collection_frequency += entry.collection_frequency;
        }
        for (term, postings) in other.inverted {
            self.inverted
                .entry(term)
                .or_default()
                .extend(postings.into_iter().map(|p| Posting {
                    doc_id: p.doc_id + offset,
                    frequency: p.frequency,
                }));
        }
        self.documents.extend(other.documents);
    }

    pub fn load(handle: &IndexHandle) -> anyhow::Result<Self> {
        // Fragments created but never written have no structures yet.
        if !handle.properties().structures.contains(LEXICON_STRUCTURE) {
            return Ok(Self::default());
        }
        Ok(Self {
            lexicon: read_structure(handle, LEXICON_STRUCTURE)?,
            inverted: read_structure(handle, INVERTED_STRUCTURE)?,
            documents: read_structure(handle, DOCUMENT_STRUCTURE)?,
        })
    }

    /// Write every structure and record the statistics in the handle's
    /// properties. The caller closes the handle.
    pub fn write(&self, handle: &mut IndexHandle) -> anyhow::Result<()> {
        write_structure(handle, LEXICON_STRUCTURE, &self.lexicon)?;
        write_structure(handle, INVERTED_STRUCTURE, &self.inverted)?;
        write_structure(handle, DOCUMENT_STRUCTURE, &self.documents)?;

        let properties = handle.properties_mut();
        properties.num_documents = self.documents.len() as u64;
        properties.num_terms = self.lexicon.len() as u64;
        properties.num_postings = self.inverted.values().map(|p| p.len() as u64).sum();
        properties.num_tokens = self.documents.iter().map(|d| d.length).sum();
        for structure in [LEXICON_STRUCTURE, INVERTED_STRUCTURE, DOCUMENT_STRUCTURE] {
            properties.structures.insert(structure.to_owned());
        }
        Ok(())
    }
}

fn read_structure<T: DeserializeOwned>(handle: &IndexHandle, structure: &str) -> anyhow::Result<T> {
    let path = handle.structure_path(structure);
    let contents = fs::read(&path).with_context(|| format!("Failed to read {path:?}"))?;
    serde_json::from_slice(&contents).with_context(|| format!("Corrupt {structure} in {path:?}"))
}

fn write_structure<T: Serialize>(
    handle: &IndexHandle,
    structure: &str,
    value: &T,
) -> anyhow::Result<()> {
    let path = handle.structure_path(structure);
    fs::write(&path, serde_json::to_vec(value)?)
        .with_context(|| format!("Failed to write {path:?}"))
}

#[cfg(test)]
mod tests {
    use super::{
        BasicIndex,
        Posting,
    };
    use crate::testing::document;

    #[test]
    fn test_append_offsets_document_ids() {
        let mut left = BasicIndex::default();
        left.add_document(&document("a", &[("apple", 2)]));
        left.add_document(&document("b", &[("apple", 1), ("pear", 1)]));
        let mut right = BasicIndex::default();
        right.add_document(&document("c", &[("pear", 4)]));

        left.append(right);
        assert_eq!(left.documents.len(), 3);
        assert_eq!(left.documents[2].docno.as_deref(), Some("c"));
        assert_eq!(
            left.inverted["pear"],
            vec![
                Posting {
                    doc_id: 1,
                    frequency: 1
                },
                Posting {
                    doc_id: 2,
                    frequency: 4
                },
            ]
        );
        assert_eq!(left.lexicon["pear"].document_frequency, 2);
        assert_eq!(left.lexicon["pear"].collection_frequency, 5);
        assert_eq!(left.lexicon["apple"].collection_frequency, 3);
    }

    #[test]
    fn test_zero_frequency_terms_are_ignored() {
        let mut index = BasicIndex::default();
        index.add_document(&document("a", &[("ghost", 0), ("real", 1)]));
        assert!(!index.lexicon.contains_key("ghost"));
        assert_eq!(index.documents[0].length, 1);
    }
}
