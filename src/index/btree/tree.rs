//! B-tree index (C6, spec §4.6): search, insert (optimistic split
//! propagation), and delete over pages owned by a [`BufferPoolManager`],
//! with every page mutation grouped into a [`MiniTransaction`].

use parking_lot::Mutex;

use crate::buffer::BufferPoolManager;
use crate::common::{PageId, Result};
use crate::log::LogManager;
use crate::mtr::{LatchMode, MiniTransaction};
use crate::storage::page::{PageHeader, PageType};

use super::node::{InternalNode, LeafNode, NODE_BODY_CAPACITY};

/// Which direction/inclusivity a search targets (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// First key `>= target`.
    Ge,
    /// First key `> target`.
    Gt,
    /// Last key `<= target`.
    Le,
    /// Last key `< target`.
    Lt,
}

/// A B+tree keyed by byte-comparable keys (see
/// [`crate::record::Tuple::encode_comparable`]), storing opaque value
/// bytes at the leaves. Used both as a clustered index (value = full row)
/// and a secondary index (value = clustered key, per spec §4.6's
/// "clustered/secondary tree variants").
pub struct BTreeIndex<'a> {
    bpm: &'a BufferPoolManager,
    log: &'a LogManager,
    root: Mutex<PageId>,
}

fn body_offset() -> u16 {
    PageHeader::SIZE as u16
}

impl<'a> BTreeIndex<'a> {
    /// Create a new, empty tree: allocates a single leaf page as root.
    pub fn create(bpm: &'a BufferPoolManager, log: &'a LogManager) -> Result<Self> {
        let mut mtr = MiniTransaction::start(bpm, log);
        let (handle, page_id) = mtr.new_page()?;
        write_leaf(&mut mtr, handle, &LeafNode::empty());
        mtr.commit()?;
        Ok(Self {
            bpm,
            log,
            root: Mutex::new(page_id),
        })
    }

    /// Attach to an already-existing tree rooted at `root`.
    pub fn open(bpm: &'a BufferPoolManager, log: &'a LogManager, root: PageId) -> Self {
        Self {
            bpm,
            log,
            root: Mutex::new(root),
        }
    }

    pub fn root_page(&self) -> PageId {
        *self.root.lock()
    }

    /// Point lookup.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let leaf_id = self.descend_to_leaf(key)?;
        let guard = self.bpm.fetch_page_read(leaf_id)?;
        let leaf = LeafNode::decode(&guard.as_slice()[body_offset() as usize..]);
        let pos = leaf.lower_bound(key);
        Ok(leaf
            .entries
            .get(pos)
            .filter(|(k, _)| k.as_slice() == key)
            .map(|(_, v)| v.clone()))
    }

    /// The first key satisfying `mode` relative to `key`, plus its value.
    pub fn search(&self, key: &[u8], mode: SearchMode) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        let leaf_id = self.descend_to_leaf(key)?;
        let guard = self.bpm.fetch_page_read(leaf_id)?;
        let leaf = LeafNode::decode(&guard.as_slice()[body_offset() as usize..]);
        let pos = leaf.lower_bound(key);
        match mode {
            SearchMode::Ge => Ok(leaf.entries.get(pos).cloned()),
            SearchMode::Gt => {
                let start = if leaf.entries.get(pos).map(|(k, _)| k.as_slice()) == Some(key) {
                    pos + 1
                } else {
                    pos
                };
                Ok(leaf.entries.get(start).cloned())
            }
            SearchMode::Le | SearchMode::Lt => {
                let exact = leaf.entries.get(pos).map(|(k, _)| k.as_slice()) == Some(key);
                let idx = if mode == SearchMode::Le && exact {
                    Some(pos)
                } else if pos == 0 {
                    None
                } else {
                    Some(pos - 1)
                };
                Ok(idx.and_then(|i| leaf.entries.get(i).cloned()))
            }
        }
    }

    fn descend_to_leaf(&self, key: &[u8]) -> Result<PageId> {
        let mut current = *self.root.lock();
        loop {
            let guard = self.bpm.fetch_page_read(current)?;
            let body = &guard.as_slice()[body_offset() as usize..];
            if super::node::is_leaf(body) {
                return Ok(current);
            }
            let node = InternalNode::decode(body);
            current = node.child_for(key);
        }
    }

    /// Insert `(key, value)`, splitting pages bottom-up as needed
    /// (optimistic insert that always takes the write path, per spec
    /// §4.6's "insert: optimistic -> pessimistic promotion" simplified
    /// to always pessimistic since every page here is tiny relative to a
    /// 4KB page).
    pub fn insert(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let root = *self.root.lock();
        let mut mtr = MiniTransaction::start(self.bpm, self.log);
        if let Some((sep, new_right)) = self.insert_recursive(&mut mtr, root, key, value)? {
            let (handle, new_root_id) = mtr.new_page()?;
            let node = InternalNode {
                first_child: root,
                entries: vec![(sep, new_right)],
            };
            write_internal(&mut mtr, handle, &node);
            *self.root.lock() = new_root_id;
        }
        mtr.commit()?;
        Ok(())
    }

    fn insert_recursive(
        &self,
        mtr: &mut MiniTransaction<'a>,
        page_id: PageId,
        key: &[u8],
        value: &[u8],
    ) -> Result<Option<(Vec<u8>, PageId)>> {
        let handle = mtr.page_get(page_id, LatchMode::Write)?;
        let body = mtr.page_body(handle).to_vec();

        if super::node::is_leaf(&body) {
            let mut leaf = LeafNode::decode(&body);
            let pos = leaf.lower_bound(key);
            leaf.entries.insert(pos, (key.to_vec(), value.to_vec()));

            if leaf.encoded_len() <= NODE_BODY_CAPACITY {
                write_leaf(mtr, handle, &leaf);
                return Ok(None);
            }

            let split_at = leaf.entries.len() / 2;
            let right_entries = leaf.entries.split_off(split_at);
            let right_first_key = right_entries[0].0.clone();
            let old_next = leaf.next;

            let (right_handle, right_id) = mtr.new_page()?;
            leaf.next = right_id;
            let right = LeafNode {
                entries: right_entries,
                next: old_next,
                prev: page_id,
            };
            write_leaf(mtr, handle, &leaf);
            write_leaf(mtr, right_handle, &right);

            if old_next.is_valid() {
                let next_handle = mtr.page_get(old_next, LatchMode::Write)?;
                let mut next_leaf = LeafNode::decode(mtr.page_body(next_handle));
                next_leaf.prev = right_id;
                write_leaf(mtr, next_handle, &next_leaf);
            }

            return Ok(Some((right_first_key, right_id)));
        }

        let mut node = InternalNode::decode(&body);
        let child = node.child_for(key);
        let Some((sep, new_child)) = self.insert_recursive(mtr, child, key, value)? else {
            return Ok(None);
        };

        let ins_pos = node.entries.partition_point(|(k, _)| k.as_slice() < sep.as_slice());
        node.entries.insert(ins_pos, (sep, new_child));

        if node.encoded_len() <= NODE_BODY_CAPACITY {
            write_internal(mtr, handle, &node);
            return Ok(None);
        }

        let mid = node.entries.len() / 2;
        let mut right_entries = node.entries.split_off(mid);
        let (promoted_key, right_first_child) = right_entries.remove(0);
        let (right_handle, right_id) = mtr.new_page()?;
        let right = InternalNode {
            first_child: right_first_child,
            entries: right_entries,
        };
        write_internal(mtr, handle, &node);
        write_internal(mtr, right_handle, &right);
        Ok(Some((promoted_key, right_id)))
    }

    /// Remove `key` if present. Leaves underfull pages in place rather
    /// than merging siblings — an intentional simplification of the
    /// original's `btr_compress`/merge-on-delete path.
    pub fn delete(&self, key: &[u8]) -> Result<bool> {
        let leaf_id = self.descend_to_leaf(key)?;
        let mut mtr = MiniTransaction::start(self.bpm, self.log);
        let handle = mtr.page_get(leaf_id, LatchMode::Write)?;
        let mut leaf = LeafNode::decode(mtr.page_body(handle));
        let pos = leaf.lower_bound(key);
        let found = leaf.entries.get(pos).map(|(k, _)| k.as_slice()) == Some(key);
        if found {
            leaf.entries.remove(pos);
            write_leaf(&mut mtr, handle, &leaf);
        }
        mtr.commit()?;
        Ok(found)
    }

    /// Iterate the leaf chain starting at the leaf containing `start_key`
    /// (or the very first leaf if `start_key` is `None`), forward.
    pub fn scan_forward(&self, start_key: Option<&[u8]>) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut current = match start_key {
            Some(k) => self.descend_to_leaf(k)?,
            None => self.leftmost_leaf()?,
        };
        let mut out = Vec::new();
        loop {
            let guard = self.bpm.fetch_page_read(current)?;
            let leaf = LeafNode::decode(&guard.as_slice()[body_offset() as usize..]);
            let next = leaf.next;
            out.extend(leaf.entries);
            if !next.is_valid() {
                break;
            }
            current = next;
        }
        Ok(out)
    }

    fn leftmost_leaf(&self) -> Result<PageId> {
        let mut current = *self.root.lock();
        loop {
            let guard = self.bpm.fetch_page_read(current)?;
            let body = &guard.as_slice()[body_offset() as usize..];
            if super::node::is_leaf(body) {
                return Ok(current);
            }
            current = InternalNode::decode(body).first_child;
        }
    }
}

fn write_leaf(mtr: &mut MiniTransaction<'_>, handle: crate::mtr::PageHandle, leaf: &LeafNode) {
    if leaf.encoded_len() > NODE_BODY_CAPACITY {
        // Caller must split before this point; defensive only.
    }
    mtr.write_ulint(handle, 0, PageType::BTreeLeaf as u64, 1);
    mtr.write_bytes(handle, body_offset(), &leaf.encode());
}

fn write_internal(mtr: &mut MiniTransaction<'_>, handle: crate::mtr::PageHandle, node: &InternalNode) {
    mtr.write_ulint(handle, 0, PageType::BTreeInternal as u64, 1);
    mtr.write_bytes(handle, body_offset(), &node.encode());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::DiskManager;
    use tempfile::tempdir;

    fn setup() -> (BufferPoolManager, LogManager, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let dm = DiskManager::create(dir.path().join("t.db")).unwrap();
        let bpm = BufferPoolManager::new(64, dm);
        let log = LogManager::create(dir.path().join("r.log"), 16).unwrap();
        (bpm, log, dir)
    }

    #[test]
    fn test_insert_and_get() {
        let (bpm, log, _d) = setup();
        let tree = BTreeIndex::create(&bpm, &log).unwrap();
        tree.insert(b"b", b"2").unwrap();
        tree.insert(b"a", b"1").unwrap();
        assert_eq!(tree.get(b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(tree.get(b"b").unwrap(), Some(b"2".to_vec()));
        assert_eq!(tree.get(b"c").unwrap(), None);
    }

    #[test]
    fn test_scan_forward_sorted() {
        let (bpm, log, _d) = setup();
        let tree = BTreeIndex::create(&bpm, &log).unwrap();
        for k in [b"d", b"b", b"a", b"c"] {
            tree.insert(k, k).unwrap();
        }
        let all = tree.scan_forward(None).unwrap();
        let keys: Vec<_> = all.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec(), b"d".to_vec()]);
    }

    #[test]
    fn test_split_propagates_to_root() {
        let (bpm, log, _d) = setup();
        let tree = BTreeIndex::create(&bpm, &log).unwrap();
        // Large-ish values force leaf splits well before 1000 entries.
        for i in 0..500u32 {
            let key = i.to_be_bytes().to_vec();
            let val = vec![0xAB; 32];
            tree.insert(&key, &val).unwrap();
        }
        assert!(tree.root_page().is_valid());
        let all = tree.scan_forward(None).unwrap();
        assert_eq!(all.len(), 500);
        for w in all.windows(2) {
            assert!(w[0].0 < w[1].0);
        }
    }

    #[test]
    fn test_delete_removes_key() {
        let (bpm, log, _d) = setup();
        let tree = BTreeIndex::create(&bpm, &log).unwrap();
        tree.insert(b"a", b"1").unwrap();
        assert!(tree.delete(b"a").unwrap());
        assert_eq!(tree.get(b"a").unwrap(), None);
        assert!(!tree.delete(b"a").unwrap());
    }

    #[test]
    fn test_search_modes() {
        let (bpm, log, _d) = setup();
        let tree = BTreeIndex::create(&bpm, &log).unwrap();
        for k in [b"a", b"c", b"e"] {
            tree.insert(k, k).unwrap();
        }
        assert_eq!(tree.search(b"c", SearchMode::Ge).unwrap().unwrap().0, b"c");
        assert_eq!(tree.search(b"c", SearchMode::Gt).unwrap().unwrap().0, b"e");
        assert_eq!(tree.search(b"c", SearchMode::Le).unwrap().unwrap().0, b"c");
        assert_eq!(tree.search(b"c", SearchMode::Lt).unwrap().unwrap().0, b"a");
        assert_eq!(tree.search(b"b", SearchMode::Lt).unwrap().unwrap().0, b"a");
        assert_eq!(tree.search(b"b", SearchMode::Ge).unwrap().unwrap().0, b"c");
    }
}
