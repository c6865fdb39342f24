pub mod btree;
pub mod btree_iterator;
pub mod btree_page;
pub mod key;

pub use btree::BPlusTree;
pub use btree_iterator::IndexIterator;
pub use btree_page::{
    BTreePageMut, BTreePageRef, BTreePageType, InternalPage, InternalPageRef, LeafPage,
    LeafPageRef,
};
pub use key::{IndexKey, KeyComparator, U32Comparator, U64Comparator};
