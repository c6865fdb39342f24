use std::marker::PhantomData;
use std::sync::Arc;

use crate::buffer::BufferPoolManager;
use crate::common::{PageId, RecordId, Result, StrataError};

use super::btree_page::LeafPageRef;
use super::key::IndexKey;

/// Forward iterator over the leaf chain, yielding (key, RID) in ascending
/// key order. Each call pins the current leaf, reads one slot and unpins
/// it again, so the iterator owns at most one pinned leaf at a time.
pub struct IndexIterator<K> {
    bpm: Arc<BufferPoolManager>,
    current_page_id: Option<PageId>,
    current_index: usize,
    _marker: PhantomData<K>,
}

impl<K: IndexKey> IndexIterator<K> {
    pub(crate) fn new(bpm: Arc<BufferPoolManager>, start_page_id: PageId, slot: usize) -> Self {
        Self {
            bpm,
            current_page_id: Some(start_page_id),
            current_index: slot,
            _marker: PhantomData,
        }
    }

    pub(crate) fn empty(bpm: Arc<BufferPoolManager>) -> Self {
        Self {
            bpm,
            current_page_id: None,
            current_index: 0,
            _marker: PhantomData,
        }
    }

    /// Advances the iterator. Exhaustion is reached when the last leaf's
    /// slots run out and there is no next leaf.
    pub fn next_entry(&mut self) -> Result<Option<(K, RecordId)>> {
        while let Some(page_id) = self.current_page_id {
            let next_page = {
                let guard = self
                    .bpm
                    .read_page(page_id)?
                    .ok_or(StrataError::BufferPoolFull)?;
                let leaf = LeafPageRef::<K>::new(guard.data());

                if self.current_index < leaf.size() as usize {
                    let key = leaf.key_at(self.current_index);
                    let rid = leaf.rid_at(self.current_index);
                    self.current_index += 1;
                    return Ok(Some((key, rid)));
                }

                leaf.next_page_id()
            };

            self.current_page_id = next_page.is_valid().then_some(next_page);
            self.current_index = 0;
        }

        Ok(None)
    }
}

impl<K: IndexKey> Iterator for IndexIterator<K> {
    type Item = Result<(K, RecordId)>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_entry() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
