//! A small reference index format: JSON lexicon, inverted file and document
//! index per fragment. Good enough to exercise the pipeline end to end and to
//! serve as a template for real formats.

mod format;
mod indexer;
mod merger;

pub use self::{
    format::{
        BasicIndex,
        DOCUMENT_STRUCTURE,
        DocumentEntry,
        INVERTED_STRUCTURE,
        LEXICON_STRUCTURE,
        LexiconEntry,
        Posting,
    },
    indexer::{
        BasicIndexer,
        BasicIndexerFactory,
    },
    merger::{
        BasicMerger,
        BasicMergerFactory,
    },
};
