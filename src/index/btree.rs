use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::buffer::BufferPoolManager;
use crate::common::{PageId, RecordId, Result, StrataError, INVALID_PAGE_ID, PAGE_SIZE};

use super::btree_iterator::IndexIterator;
use super::btree_page::{
    BTreePageMut, BTreePageRef, InternalPage, InternalPageRef, LeafPage, LeafPageRef,
    CHILD_SIZE, COMMON_HEADER_SIZE, LEAF_HEADER_SIZE, RID_SIZE,
};
use super::key::{IndexKey, KeyComparator};

/// B+tree index over fixed-width keys and record IDs.
///
/// Every node lives in a buffer-pool frame; the tree fetches, pins, mutates
/// and unpins pages through RAII guards. Keys are unique. Leaves are linked
/// through next pointers for range scans.
///
/// The mutex around the root page ID doubles as the tree latch: every
/// operation holds it for its duration, so structure modifications are
/// serialized at tree granularity. Iterators run outside the latch and rely
/// on the caller not to scan concurrently with writers.
pub struct BPlusTree<K, C> {
    bpm: Arc<BufferPoolManager>,
    comparator: C,
    /// Root page ID; INVALID_PAGE_ID when the tree is empty
    root: Mutex<PageId>,
    leaf_max_size: u16,
    internal_max_size: u16,
    _marker: PhantomData<K>,
}

/// Largest leaf entry count that fits in a page with its header.
fn default_leaf_max_size<K: IndexKey>() -> u16 {
    ((PAGE_SIZE - LEAF_HEADER_SIZE) / (K::ENCODED_LEN + RID_SIZE)) as u16
}

/// Largest internal entry count that fits, leaving one slot of headroom for
/// the transient overflow an insert may cause before the split.
fn default_internal_max_size<K: IndexKey>() -> u16 {
    ((PAGE_SIZE - COMMON_HEADER_SIZE) / (K::ENCODED_LEN + CHILD_SIZE)) as u16 - 1
}

impl<K: IndexKey, C: KeyComparator<K>> BPlusTree<K, C> {
    /// Creates an empty tree with node sizes derived from the page size.
    pub fn new(bpm: Arc<BufferPoolManager>, comparator: C) -> Self {
        Self::with_max_sizes(
            bpm,
            comparator,
            default_leaf_max_size::<K>(),
            default_internal_max_size::<K>(),
        )
    }

    /// Creates an empty tree with explicit node capacities.
    pub fn with_max_sizes(
        bpm: Arc<BufferPoolManager>,
        comparator: C,
        leaf_max_size: u16,
        internal_max_size: u16,
    ) -> Self {
        assert!(leaf_max_size >= 2 && internal_max_size >= 3);
        Self {
            bpm,
            comparator,
            root: Mutex::new(INVALID_PAGE_ID),
            leaf_max_size,
            internal_max_size,
            _marker: PhantomData,
        }
    }

    /// Reattaches to a persisted tree by its root page ID.
    pub fn open(bpm: Arc<BufferPoolManager>, comparator: C, root_page_id: PageId) -> Self {
        let tree = Self::new(bpm, comparator);
        *tree.root.lock() = root_page_id;
        tree
    }

    pub fn is_empty(&self) -> bool {
        !self.root.lock().is_valid()
    }

    pub fn root_page_id(&self) -> PageId {
        *self.root.lock()
    }

    /// Point lookup. Returns the RID stored under the key, if any.
    pub fn get_value(&self, key: &K) -> Result<Option<RecordId>> {
        let root = self.root.lock();
        if !root.is_valid() {
            return Ok(None);
        }

        let leaf_id = self.find_leaf(*root, key)?;
        let guard = self.fetch_read(leaf_id)?;
        let leaf = LeafPageRef::<K>::new(guard.data());
        Ok(leaf.lookup(key, &self.comparator))
    }

    /// Inserts a key/RID pair. Returns false and leaves the tree unchanged
    /// when the key is already present.
    pub fn insert(&self, key: &K, rid: RecordId) -> Result<bool> {
        let mut root = self.root.lock();

        if !root.is_valid() {
            self.start_new_tree(&mut root, key, rid)?;
            return Ok(true);
        }

        let leaf_id = self.find_leaf(*root, key)?;

        let (inserted, needs_split) = {
            let mut guard = self.fetch_write(leaf_id)?;
            let mut leaf = LeafPage::<K>::new(guard.data_mut());
            let old_size = leaf.size();
            let new_size = leaf.insert(key, rid, &self.comparator);
            (new_size != old_size, new_size >= self.leaf_max_size)
        };

        if !inserted {
            return Ok(false);
        }
        if needs_split {
            self.split_leaf(&mut root, leaf_id)?;
        }
        Ok(true)
    }

    /// Removes the key if present; absent keys are a no-op.
    pub fn remove(&self, key: &K) -> Result<()> {
        let mut root = self.root.lock();
        if !root.is_valid() {
            return Ok(());
        }

        let leaf_id = self.find_leaf(*root, key)?;

        let (removed, new_size) = {
            let mut guard = self.fetch_write(leaf_id)?;
            let mut leaf = LeafPage::<K>::new(guard.data_mut());
            let old_size = leaf.size();
            let new_size = leaf.remove(key, &self.comparator);
            (new_size != old_size, new_size)
        };

        if !removed {
            return Ok(());
        }

        if leaf_id == *root {
            if new_size == 0 {
                *root = INVALID_PAGE_ID;
                self.bpm.delete_page(leaf_id)?;
            }
            return Ok(());
        }

        if new_size < self.min_leaf_size() {
            self.coalesce_or_redistribute_leaf(&mut root, leaf_id)?;
        }
        Ok(())
    }

    /// Iterator positioned at the smallest key.
    pub fn begin(&self) -> Result<IndexIterator<K>> {
        let root = self.root.lock();
        if !root.is_valid() {
            return Ok(IndexIterator::empty(Arc::clone(&self.bpm)));
        }

        let mut page_id = *root;
        loop {
            let guard = self.fetch_read(page_id)?;
            if BTreePageRef::new(guard.data()).is_leaf() {
                break;
            }
            page_id = InternalPageRef::<K>::new(guard.data()).child_at(0);
        }

        Ok(IndexIterator::new(Arc::clone(&self.bpm), page_id, 0))
    }

    /// Iterator positioned at the first key >= the given key.
    pub fn begin_at(&self, key: &K) -> Result<IndexIterator<K>> {
        let root = self.root.lock();
        if !root.is_valid() {
            return Ok(IndexIterator::empty(Arc::clone(&self.bpm)));
        }

        let leaf_id = self.find_leaf(*root, key)?;
        let slot = {
            let guard = self.fetch_read(leaf_id)?;
            LeafPageRef::<K>::new(guard.data()).key_index(key, &self.comparator)
        };

        Ok(IndexIterator::new(Arc::clone(&self.bpm), leaf_id, slot))
    }

    fn min_leaf_size(&self) -> u16 {
        self.leaf_max_size / 2
    }

    fn min_internal_size(&self) -> u16 {
        // An internal node below two children could not offer its own
        // children a sibling to balance with
        (self.internal_max_size / 2).max(2)
    }

    fn fetch_read(&self, page_id: PageId) -> Result<crate::buffer::ReadPageGuard<'_>> {
        self.bpm
            .read_page(page_id)?
            .ok_or(StrataError::BufferPoolFull)
    }

    fn fetch_write(&self, page_id: PageId) -> Result<crate::buffer::WritePageGuard<'_>> {
        self.bpm
            .write_page(page_id)?
            .ok_or(StrataError::BufferPoolFull)
    }

    /// Descends from the given root to the leaf covering the key. Each
    /// level's guard is dropped (unpinned clean) before the child is
    /// fetched.
    fn find_leaf(&self, root: PageId, key: &K) -> Result<PageId> {
        let mut page_id = root;
        loop {
            let guard = self.fetch_read(page_id)?;
            if BTreePageRef::new(guard.data()).is_leaf() {
                return Ok(page_id);
            }
            page_id = InternalPageRef::<K>::new(guard.data()).lookup(key, &self.comparator);
        }
    }

    fn start_new_tree(&self, root: &mut PageId, key: &K, rid: RecordId) -> Result<()> {
        let (page_id, mut guard) = self
            .bpm
            .new_page()?
            .ok_or(StrataError::BufferPoolFull)?;

        let mut leaf = LeafPage::<K>::new(guard.data_mut());
        leaf.init(page_id, INVALID_PAGE_ID, self.leaf_max_size);
        leaf.insert(key, rid, &self.comparator);

        *root = page_id;
        Ok(())
    }

    /// Splits a full leaf: the upper half moves to a fresh right sibling,
    /// the chain is relinked, and the separator (the new leaf's first key)
    /// goes up to the parent.
    fn split_leaf(&self, root: &mut PageId, leaf_id: PageId) -> Result<()> {
        let (new_leaf_id, mut new_guard) = self
            .bpm
            .new_page()?
            .ok_or(StrataError::BufferPoolFull)?;

        let separator = {
            let mut leaf_guard = self.fetch_write(leaf_id)?;
            let mut leaf = LeafPage::<K>::new(leaf_guard.data_mut());
            let mut new_leaf = LeafPage::<K>::new(new_guard.data_mut());

            new_leaf.init(new_leaf_id, leaf.parent_page_id(), self.leaf_max_size);
            leaf.move_half_to(&mut new_leaf);
            new_leaf.set_next_page_id(leaf.next_page_id());
            leaf.set_next_page_id(new_leaf_id);

            new_leaf.key_at(0)
        };
        drop(new_guard);

        self.insert_into_parent(root, leaf_id, &separator, new_leaf_id)
    }

    /// Hangs a freshly split-off right node under the left node's parent,
    /// growing a new root when the left node was the root.
    fn insert_into_parent(
        &self,
        root: &mut PageId,
        left_id: PageId,
        key: &K,
        right_id: PageId,
    ) -> Result<()> {
        let parent_id = {
            let guard = self.fetch_read(left_id)?;
            BTreePageRef::new(guard.data()).parent_page_id()
        };

        if !parent_id.is_valid() {
            // The left node was the root; grow the tree by one level
            let (new_root_id, mut root_guard) = self
                .bpm
                .new_page()?
                .ok_or(StrataError::BufferPoolFull)?;
            {
                let mut node = InternalPage::<K>::new(root_guard.data_mut());
                node.init(new_root_id, INVALID_PAGE_ID, self.internal_max_size);
                node.populate_new_root(left_id, key, right_id);
            }
            drop(root_guard);

            self.adopt(left_id, new_root_id)?;
            self.adopt(right_id, new_root_id)?;
            *root = new_root_id;
            return Ok(());
        }

        let needs_split = {
            let mut guard = self.fetch_write(parent_id)?;
            let mut node = InternalPage::<K>::new(guard.data_mut());
            node.insert_node_after(left_id, key, right_id) > self.internal_max_size
        };

        if needs_split {
            self.split_internal(root, parent_id)?;
        }
        Ok(())
    }

    /// Splits an overflowing internal node. The promoted middle key ends up
    /// in the new node's dummy slot; moved children are adopted.
    fn split_internal(&self, root: &mut PageId, node_id: PageId) -> Result<()> {
        let (new_node_id, mut new_guard) = self
            .bpm
            .new_page()?
            .ok_or(StrataError::BufferPoolFull)?;

        let (separator, moved_children) = {
            let mut node_guard = self.fetch_write(node_id)?;
            let mut node = InternalPage::<K>::new(node_guard.data_mut());
            let mut new_node = InternalPage::<K>::new(new_guard.data_mut());

            new_node.init(new_node_id, node.parent_page_id(), self.internal_max_size);
            node.move_half_to(&mut new_node);

            let moved = (0..new_node.size() as usize)
                .map(|i| new_node.child_at(i))
                .collect::<Vec<_>>();
            (new_node.key_at(0), moved)
        };
        drop(new_guard);

        for child in moved_children {
            self.adopt(child, new_node_id)?;
        }

        self.insert_into_parent(root, node_id, &separator, new_node_id)
    }

    /// Rewrites a moved child's parent pointer through the buffer pool.
    fn adopt(&self, child_id: PageId, parent_id: PageId) -> Result<()> {
        let mut guard = self.fetch_write(child_id)?;
        BTreePageMut::new(guard.data_mut()).set_parent_page_id(parent_id);
        Ok(())
    }

    /// Locates the underflowing node's position under its parent and the
    /// sibling to balance with. The left sibling is preferred; the parent's
    /// leftmost child uses its right sibling.
    fn pick_sibling(
        &self,
        parent_id: PageId,
        node_id: PageId,
    ) -> Result<(usize, PageId, bool)> {
        let guard = self.fetch_read(parent_id)?;
        let parent = InternalPageRef::<K>::new(guard.data());
        let node_index = parent.value_index(node_id).ok_or_else(|| {
            StrataError::IndexCorrupted(format!("page {} missing from its parent", node_id))
        })?;

        if node_index > 0 {
            Ok((node_index, parent.child_at(node_index - 1), true))
        } else {
            Ok((node_index, parent.child_at(1), false))
        }
    }

    /// Handles the parent after a merge removed one of its slots: adjust
    /// the root, recurse on an underflow, or stop.
    fn handle_parent_after_merge(
        &self,
        root: &mut PageId,
        parent_id: PageId,
        parent_size: u16,
    ) -> Result<()> {
        if parent_id == *root {
            if parent_size == 1 {
                self.adjust_root(root)?;
            }
            return Ok(());
        }
        if parent_size < self.min_internal_size() {
            self.coalesce_or_redistribute_internal(root, parent_id)?;
        }
        Ok(())
    }

    fn coalesce_or_redistribute_leaf(&self, root: &mut PageId, node_id: PageId) -> Result<()> {
        let parent_id = {
            let guard = self.fetch_read(node_id)?;
            BTreePageRef::new(guard.data()).parent_page_id()
        };
        let (node_index, sibling_id, sibling_on_left) = self.pick_sibling(parent_id, node_id)?;

        let (node_size, sibling_size) = {
            let node_guard = self.fetch_read(node_id)?;
            let sibling_guard = self.fetch_read(sibling_id)?;
            (
                BTreePageRef::new(node_guard.data()).size(),
                BTreePageRef::new(sibling_guard.data()).size(),
            )
        };

        if node_size + sibling_size < self.leaf_max_size {
            // Merge the right node into the left one
            let (left_id, right_id, right_index) = if sibling_on_left {
                (sibling_id, node_id, node_index)
            } else {
                (node_id, sibling_id, node_index + 1)
            };

            {
                let mut left_guard = self.fetch_write(left_id)?;
                let mut right_guard = self.fetch_write(right_id)?;
                let mut left = LeafPage::<K>::new(left_guard.data_mut());
                let mut right = LeafPage::<K>::new(right_guard.data_mut());
                right.move_all_to(&mut left);
            }

            let parent_size = {
                let mut parent_guard = self.fetch_write(parent_id)?;
                let mut parent = InternalPage::<K>::new(parent_guard.data_mut());
                parent.remove_at(right_index);
                parent.size()
            };

            self.bpm.delete_page(right_id)?;
            self.handle_parent_after_merge(root, parent_id, parent_size)
        } else {
            // Move one entry over from the fuller sibling
            let mut parent_guard = self.fetch_write(parent_id)?;
            let mut node_guard = self.fetch_write(node_id)?;
            let mut sibling_guard = self.fetch_write(sibling_id)?;

            let mut parent = InternalPage::<K>::new(parent_guard.data_mut());
            let mut node = LeafPage::<K>::new(node_guard.data_mut());
            let mut sibling = LeafPage::<K>::new(sibling_guard.data_mut());

            if sibling_on_left {
                sibling.move_last_to_front_of(&mut node);
                parent.set_key_at(node_index, &node.key_at(0));
            } else {
                sibling.move_first_to_end_of(&mut node);
                parent.set_key_at(node_index + 1, &sibling.key_at(0));
            }
            Ok(())
        }
    }

    fn coalesce_or_redistribute_internal(
        &self,
        root: &mut PageId,
        node_id: PageId,
    ) -> Result<()> {
        let parent_id = {
            let guard = self.fetch_read(node_id)?;
            BTreePageRef::new(guard.data()).parent_page_id()
        };
        let (node_index, sibling_id, sibling_on_left) = self.pick_sibling(parent_id, node_id)?;

        let (node_size, sibling_size) = {
            let node_guard = self.fetch_read(node_id)?;
            let sibling_guard = self.fetch_read(sibling_id)?;
            (
                BTreePageRef::new(node_guard.data()).size(),
                BTreePageRef::new(sibling_guard.data()).size(),
            )
        };

        if node_size + sibling_size <= self.internal_max_size {
            // Merge right into left; the parent separator joins in between
            let (left_id, right_id, right_index) = if sibling_on_left {
                (sibling_id, node_id, node_index)
            } else {
                (node_id, sibling_id, node_index + 1)
            };

            let middle_key = {
                let guard = self.fetch_read(parent_id)?;
                InternalPageRef::<K>::new(guard.data()).key_at(right_index)
            };

            let moved_children = {
                let mut left_guard = self.fetch_write(left_id)?;
                let mut right_guard = self.fetch_write(right_id)?;
                let mut left = InternalPage::<K>::new(left_guard.data_mut());
                let mut right = InternalPage::<K>::new(right_guard.data_mut());

                let moved = (0..right.size() as usize)
                    .map(|i| right.child_at(i))
                    .collect::<Vec<_>>();
                right.move_all_to(&mut left, &middle_key);
                moved
            };

            for child in moved_children {
                self.adopt(child, left_id)?;
            }

            let parent_size = {
                let mut parent_guard = self.fetch_write(parent_id)?;
                let mut parent = InternalPage::<K>::new(parent_guard.data_mut());
                parent.remove_at(right_index);
                parent.size()
            };

            self.bpm.delete_page(right_id)?;
            self.handle_parent_after_merge(root, parent_id, parent_size)
        } else {
            // Rotate one entry through the parent separator
            let moved_child = {
                let mut parent_guard = self.fetch_write(parent_id)?;
                let mut node_guard = self.fetch_write(node_id)?;
                let mut sibling_guard = self.fetch_write(sibling_id)?;

                let mut parent = InternalPage::<K>::new(parent_guard.data_mut());
                let mut node = InternalPage::<K>::new(node_guard.data_mut());
                let mut sibling = InternalPage::<K>::new(sibling_guard.data_mut());

                if sibling_on_left {
                    let middle_key = parent.key_at(node_index);
                    let new_separator = sibling.key_at(sibling.size() as usize - 1);
                    let moved = sibling.move_last_to_front_of(&mut node, &middle_key);
                    parent.set_key_at(node_index, &new_separator);
                    moved
                } else {
                    let sibling_index = node_index + 1;
                    let middle_key = parent.key_at(sibling_index);
                    let new_separator = sibling.key_at(1);
                    let moved = sibling.move_first_to_end_of(&mut node, &middle_key);
                    parent.set_key_at(sibling_index, &new_separator);
                    moved
                }
            };

            self.adopt(moved_child, node_id)
        }
    }

    /// Deletion bubbled to the root and left it with a single child:
    /// promote the child and delete the old root.
    fn adjust_root(&self, root: &mut PageId) -> Result<()> {
        let old_root_id = *root;

        let new_root_id = {
            let mut guard = self.fetch_write(old_root_id)?;
            let mut node = InternalPage::<K>::new(guard.data_mut());
            node.remove_and_return_only_child()
        };

        self.adopt(new_root_id, INVALID_PAGE_ID)?;
        *root = new_root_id;
        self.bpm.delete_page(old_root_id)?;
        Ok(())
    }
}
