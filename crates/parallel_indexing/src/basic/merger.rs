use index_storage::IndexHandle;

use super::format::BasicIndex;
use crate::capabilities::{
    Merger,
    MergerFactory,
};

#[derive(Clone, Copy, Debug, Default)]
pub struct BasicMergerFactory;

impl MergerFactory for BasicMergerFactory {
    fn construct<'a>(
        &self,
        left: &'a IndexHandle,
        right: &'a IndexHandle,
        destination: &'a mut IndexHandle,
    ) -> anyhow::Result<Box<dyn Merger + 'a>> {
        Ok(Box::new(BasicMerger {
            left,
            right,
            destination,
        }))
    }
}

/// Concatenates two basic fragments. Documents of `right` follow those of
/// `left`, and lexicon statistics are summed term by term.
pub struct BasicMerger<'a> {
    left: &'a IndexHandle,
    right: &'a IndexHandle,
    destination: &'a mut IndexHandle,
}

impl Merger for BasicMerger<'_> {
    fn merge_structures(&mut self) -> anyhow::Result<()> {
        let mut merged = BasicIndex::load(self.left)?;
        merged.append(BasicIndex::load(self.right)?);
        merged.write(self.destination)
    }
}
