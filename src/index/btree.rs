//! Disk-backed B+-tree over [`crate::buffer::BufferPool`] frames.
//!
//! Concurrency is coarse: a single mutex (which also holds the current
//! root page id) serializes every structural operation. Point lookups that
//! don't need to race a concurrent split are rare enough in this engine
//! that per-node latch crabbing isn't worth the complexity; see DESIGN.md.

use std::sync::Mutex;

use log::{debug, trace};

use crate::buffer::BufferPool;
use crate::common::{PageId, Rid, INVALID_PAGE_ID};
use crate::page::PageType;

use super::btree_page::{
    default_internal_max_size, default_leaf_max_size, BTreeInternalPage, BTreeKey, BTreeLeafPage,
    BTreePage,
};

pub struct BPlusTree<'a> {
    pool: &'a BufferPool,
    root: Mutex<PageId>,
    leaf_max_size: u32,
    internal_max_size: u32,
}

impl<'a> BPlusTree<'a> {
    pub fn new(pool: &'a BufferPool) -> BPlusTree<'a> {
        BPlusTree {
            pool,
            root: Mutex::new(INVALID_PAGE_ID),
            leaf_max_size: default_leaf_max_size(),
            internal_max_size: default_internal_max_size(),
        }
    }

    /// Attaches to a tree whose root is already known (as recorded by the
    /// catalog for a previously-created index).
    pub fn with_root(pool: &'a BufferPool, root_page_id: PageId) -> BPlusTree<'a> {
        BPlusTree {
            pool,
            root: Mutex::new(root_page_id),
            leaf_max_size: default_leaf_max_size(),
            internal_max_size: default_internal_max_size(),
        }
    }

    pub fn root_page_id(&self) -> PageId {
        *self.root.lock().unwrap()
    }

    pub fn is_empty(&self) -> bool {
        self.root_page_id() == INVALID_PAGE_ID
    }

    // ---- descent ----

    /// Walks from `root` to the leaf that should hold `key`, recording at
    /// each internal level `(page_id, child_index_followed)` so callers can
    /// splice in a new separator/child without re-descending.
    fn descend(&self, root: PageId, key: BTreeKey) -> (Vec<(PageId, u32)>, PageId) {
        let mut path = Vec::new();
        let mut current = root;
        loop {
            let guard = self.pool.fetch_page(current).expect("btree page missing");
            let is_leaf = guard.read(BTreePage::is_leaf);
            if is_leaf {
                return (path, current);
            }
            let idx = guard.read(|p| BTreeInternalPage::find_child_index(p, key));
            let child = guard.read(|p| BTreeInternalPage::child_at(p, idx));
            path.push((current, idx));
            current = child;
        }
    }

    /// Leftmost leaf under `root`, used to start a full-tree scan.
    fn leftmost_leaf(&self, root: PageId) -> PageId {
        let mut current = root;
        loop {
            let guard = self.pool.fetch_page(current).expect("btree page missing");
            let is_leaf = guard.read(BTreePage::is_leaf);
            if is_leaf {
                return current;
            }
            current = guard.read(|p| BTreeInternalPage::child_at(p, 0));
        }
    }

    // ---- point lookup / scans ----

    pub fn find(&self, key: BTreeKey) -> Option<Rid> {
        let root = self.root_page_id();
        if root == INVALID_PAGE_ID {
            return None;
        }
        let (_, leaf_id) = self.descend(root, key);
        let guard = self.pool.fetch_page(leaf_id)?;
        guard.read(|p| BTreeLeafPage::find(p, key))
    }

    /// Inclusive range scan `[start, end]`. `start > end` yields nothing.
    pub fn range_scan(&self, start: BTreeKey, end: BTreeKey) -> Vec<(BTreeKey, Rid)> {
        let mut out = Vec::new();
        if start > end {
            return out;
        }
        let root = self.root_page_id();
        if root == INVALID_PAGE_ID {
            return out;
        }
        let (_, mut leaf_id) = self.descend(root, start);
        loop {
            if leaf_id == INVALID_PAGE_ID {
                break;
            }
            let guard = match self.pool.fetch_page(leaf_id) {
                Some(g) => g,
                None => break,
            };
            let n = guard.read(BTreePage::num_keys);
            let mut stop = false;
            for i in 0..n {
                let k = guard.read(|p| BTreeLeafPage::key_at(p, i));
                if k < start {
                    continue;
                }
                if k > end {
                    stop = true;
                    break;
                }
                let v = guard.read(|p| BTreeLeafPage::value_at(p, i));
                out.push((k, v));
            }
            let next = guard.read(BTreeLeafPage::next_leaf_id);
            if stop {
                break;
            }
            leaf_id = next;
        }
        out
    }

    pub fn iter(&self) -> BTreeIterator<'_> {
        let root = self.root_page_id();
        let leaf_id = if root == INVALID_PAGE_ID {
            INVALID_PAGE_ID
        } else {
            self.leftmost_leaf(root)
        };
        BTreeIterator {
            tree: self,
            leaf_id,
            index: 0,
        }
    }

    // ---- entry extraction helpers (single-page-at-a-time, no aliased &mut Page) ----

    fn read_leaf_entries(&self, page_id: PageId) -> (Vec<(BTreeKey, Rid)>, PageId, PageId, PageId) {
        let guard = self.pool.fetch_page(page_id).expect("leaf missing");
        let n = guard.read(BTreePage::num_keys);
        let entries = (0..n)
            .map(|i| guard.read(|p| (BTreeLeafPage::key_at(p, i), BTreeLeafPage::value_at(p, i))))
            .collect();
        let next = guard.read(BTreeLeafPage::next_leaf_id);
        let prev = guard.read(BTreeLeafPage::prev_leaf_id);
        let parent = guard.read(BTreePage::parent_page_id);
        (entries, next, prev, parent)
    }

    fn write_leaf_entries(
        &self,
        page_id: PageId,
        entries: &[(BTreeKey, Rid)],
        next: PageId,
        prev: PageId,
        parent: PageId,
    ) {
        let guard = self.pool.fetch_page(page_id).expect("leaf missing");
        guard.write(|p| {
            BTreeLeafPage::init(p, self.leaf_max_size);
            for (i, &(k, v)) in entries.iter().enumerate() {
                BTreeLeafPage::set_key_at(p, i as u32, k);
                BTreeLeafPage::set_value_at(p, i as u32, v);
            }
            BTreePage::set_num_keys(p, entries.len() as u32);
            BTreeLeafPage::set_next_leaf_id(p, next);
            BTreeLeafPage::set_prev_leaf_id(p, prev);
            BTreePage::set_parent_page_id(p, parent);
        });
        guard.unpin(true);
    }

    fn read_internal_entries(&self, page_id: PageId) -> (PageId, Vec<(BTreeKey, PageId)>, PageId) {
        let guard = self.pool.fetch_page(page_id).expect("internal missing");
        let n = guard.read(BTreePage::num_keys);
        let first_child = guard.read(|p| BTreeInternalPage::child_at(p, 0));
        let entries = (0..n)
            .map(|i| {
                guard.read(|p| (BTreeInternalPage::key_at(p, i), BTreeInternalPage::child_at(p, i + 1)))
            })
            .collect();
        let parent = guard.read(BTreePage::parent_page_id);
        (first_child, entries, parent)
    }

    fn write_internal_entries(
        &self,
        page_id: PageId,
        first_child: PageId,
        entries: &[(BTreeKey, PageId)],
        parent: PageId,
    ) {
        let guard = self.pool.fetch_page(page_id).expect("internal missing");
        guard.write(|p| {
            BTreeInternalPage::init(p, self.internal_max_size);
            BTreeInternalPage::set_child_at(p, 0, first_child);
            for (i, &(k, c)) in entries.iter().enumerate() {
                BTreeInternalPage::set_key_at(p, i as u32, k);
                BTreeInternalPage::set_child_at(p, i as u32 + 1, c);
            }
            BTreePage::set_num_keys(p, entries.len() as u32);
            BTreePage::set_parent_page_id(p, parent);
        });
        guard.unpin(true);
        self.reparent_children(page_id, first_child, entries);
    }

    fn reparent_children(&self, new_parent: PageId, first_child: PageId, entries: &[(BTreeKey, PageId)]) {
        let mut children = vec![first_child];
        children.extend(entries.iter().map(|&(_, c)| c));
        for child in children {
            if let Some(g) = self.pool.fetch_page(child) {
                g.write(|p| BTreePage::set_parent_page_id(p, new_parent));
                g.unpin(true);
            }
        }
    }

    // ---- insert ----

    pub fn insert(&self, key: BTreeKey, value: Rid) -> bool {
        let mut root_guard = self.root.lock().unwrap();
        if *root_guard == INVALID_PAGE_ID {
            let guard = self.pool.new_page().expect("buffer pool exhausted");
            let root_id = guard.page_id();
            guard.write(|p| {
                p.set_page_type(PageType::BTreeLeaf);
                BTreeLeafPage::init(p, self.leaf_max_size);
                BTreeLeafPage::insert(p, key, value);
            });
            guard.unpin(true);
            *root_guard = root_id;
            debug!("btree created root leaf {} for first insert", root_id);
            return true;
        }

        let root = *root_guard;
        let (path, leaf_id) = self.descend(root, key);

        let (mut entries, next, prev, parent) = self.read_leaf_entries(leaf_id);
        if entries.iter().any(|&(k, _)| k == key) {
            return false;
        }
        entries.push((key, value));
        entries.sort_by_key(|&(k, _)| k);

        if entries.len() as u32 <= self.leaf_max_size {
            self.write_leaf_entries(leaf_id, &entries, next, prev, parent);
            return true;
        }

        // Split: lower half stays, upper half moves to a new right sibling.
        let mid = entries.len() / 2;
        let new_guard = self.pool.new_page().expect("buffer pool exhausted");
        let new_leaf_id = new_guard.page_id();
        new_guard.write(|p| p.set_page_type(PageType::BTreeLeaf));
        drop(new_guard);

        let up_key = entries[mid].0;
        self.write_leaf_entries(new_leaf_id, &entries[mid..], next, leaf_id, parent);
        self.write_leaf_entries(leaf_id, &entries[..mid], new_leaf_id, prev, parent);
        if next != INVALID_PAGE_ID {
            if let Some(g) = self.pool.fetch_page(next) {
                g.write(|p| BTreeLeafPage::set_prev_leaf_id(p, new_leaf_id));
                g.unpin(true);
            }
        }

        self.propagate_insert(&mut root_guard, path, up_key, leaf_id, new_leaf_id);
        true
    }

    /// Inserts `(up_key, right_child)` into `left_child`'s parent (the top
    /// of `path`), splitting the parent in turn if it overflows, up to and
    /// including creating a new root.
    fn propagate_insert(
        &self,
        root_guard: &mut PageId,
        mut path: Vec<(PageId, u32)>,
        mut up_key: BTreeKey,
        mut left_child: PageId,
        mut right_child: PageId,
    ) {
        loop {
            let Some((parent_id, child_index)) = path.pop() else {
                // left_child had no parent: it was the root. Create a new one.
                let guard = self.pool.new_page().expect("buffer pool exhausted");
                let new_root_id = guard.page_id();
                guard.write(|p| {
                    p.set_page_type(PageType::BTreeInternal);
                    BTreeInternalPage::init_as_root(p, self.internal_max_size, left_child, up_key, right_child);
                });
                guard.unpin(true);
                for child in [left_child, right_child] {
                    if let Some(g) = self.pool.fetch_page(child) {
                        g.write(|p| BTreePage::set_parent_page_id(p, new_root_id));
                        g.unpin(true);
                    }
                }
                *root_guard = new_root_id;
                debug!("btree grew a new root {}", new_root_id);
                return;
            };

            let (first_child, mut entries, grandparent) = self.read_internal_entries(parent_id);
            entries.insert(child_index as usize, (up_key, right_child));

            if entries.len() as u32 <= self.internal_max_size {
                self.write_internal_entries(parent_id, first_child, &entries, grandparent);
                return;
            }

            // Parent overflowed too: split it, promoting the middle key.
            let mid = entries.len() / 2;
            let promoted = entries[mid].0;
            let new_guard = self.pool.new_page().expect("buffer pool exhausted");
            let new_internal_id = new_guard.page_id();
            new_guard.write(|p| p.set_page_type(PageType::BTreeInternal));
            drop(new_guard);

            let right_first_child = entries[mid].1;
            let right_entries = &entries[mid + 1..];
            self.write_internal_entries(new_internal_id, right_first_child, right_entries, grandparent);
            self.write_internal_entries(parent_id, first_child, &entries[..mid], grandparent);

            left_child = parent_id;
            right_child = new_internal_id;
            up_key = promoted;
            trace!("internal split at {} promotes {}", parent_id, promoted);
        }
    }

    // ---- remove ----

    pub fn remove(&self, key: BTreeKey) -> bool {
        let mut root_guard = self.root.lock().unwrap();
        let root = *root_guard;
        if root == INVALID_PAGE_ID {
            return false;
        }
        let (path, leaf_id) = self.descend(root, key);
        let (mut entries, next, prev, parent) = self.read_leaf_entries(leaf_id);
        let before = entries.len();
        entries.retain(|&(k, _)| k != key);
        if entries.len() == before {
            return false;
        }
        self.write_leaf_entries(leaf_id, &entries, next, prev, parent);

        let is_root = path.is_empty();
        let underflowed = !is_root && (entries.len() as u32) < self.leaf_max_size / 2;
        if underflowed {
            self.fix_leaf_underflow(&mut root_guard, path, leaf_id);
        }
        true
    }

    fn fix_leaf_underflow(&self, root_guard: &mut PageId, mut path: Vec<(PageId, u32)>, node_id: PageId) {
        let Some((parent_id, child_index)) = path.pop() else {
            return;
        };
        let (first_child, parent_entries, grandparent) = self.read_internal_entries(parent_id);

        let left_sibling = if child_index > 0 {
            Some(if child_index == 1 { first_child } else { parent_entries[child_index as usize - 2].1 })
        } else {
            None
        };
        let right_sibling = if (child_index as usize) < parent_entries.len() {
            Some(parent_entries[child_index as usize].1)
        } else {
            None
        };

        // Try borrowing from the right sibling first, then the left.
        if let Some(right_id) = right_sibling {
            let (mut right_entries, r_next, r_prev, r_parent) = self.read_leaf_entries(right_id);
            if right_entries.len() as u32 > self.leaf_max_size / 2 {
                let (mut node_entries, n_next, n_prev, n_parent) = self.read_leaf_entries(node_id);
                node_entries.push(right_entries.remove(0));
                self.write_leaf_entries(node_id, &node_entries, n_next, n_prev, n_parent);
                self.write_leaf_entries(right_id, &right_entries, r_next, r_prev, r_parent);
                let new_sep = right_entries[0].0;
                self.replace_parent_key(parent_id, first_child, &parent_entries, child_index, new_sep, grandparent);
                return;
            }
        }
        if let Some(left_id) = left_sibling {
            let (mut left_entries, l_next, l_prev, l_parent) = self.read_leaf_entries(left_id);
            if left_entries.len() as u32 > self.leaf_max_size / 2 {
                let borrowed = left_entries.pop().unwrap();
                let (mut node_entries, n_next, n_prev, n_parent) = self.read_leaf_entries(node_id);
                node_entries.insert(0, borrowed);
                self.write_leaf_entries(left_id, &left_entries, l_next, l_prev, l_parent);
                self.write_leaf_entries(node_id, &node_entries, n_next, n_prev, n_parent);
                let new_sep = node_entries[0].0;
                self.replace_parent_key(parent_id, first_child, &parent_entries, child_index - 1, new_sep, grandparent);
                return;
            }
        }

        // Neither sibling can spare an entry: merge.
        if let Some(right_id) = right_sibling {
            let (right_entries, r_next, _r_prev, _r_parent) = self.read_leaf_entries(right_id);
            let (mut node_entries, _n_next, n_prev, n_parent) = self.read_leaf_entries(node_id);
            node_entries.extend(right_entries);
            self.write_leaf_entries(node_id, &node_entries, r_next, n_prev, n_parent);
            if r_next != INVALID_PAGE_ID {
                if let Some(g) = self.pool.fetch_page(r_next) {
                    g.write(|p| BTreeLeafPage::set_prev_leaf_id(p, node_id));
                    g.unpin(true);
                }
            }
            self.pool.delete_page(right_id);
            self.remove_internal_entry(root_guard, parent_id, first_child, parent_entries, child_index, grandparent);
        } else if let Some(left_id) = left_sibling {
            let (mut left_entries, _l_next, l_prev, l_parent) = self.read_leaf_entries(left_id);
            let (node_entries, n_next, _n_prev, _n_parent) = self.read_leaf_entries(node_id);
            left_entries.extend(node_entries);
            self.write_leaf_entries(left_id, &left_entries, n_next, l_prev, l_parent);
            if n_next != INVALID_PAGE_ID {
                if let Some(g) = self.pool.fetch_page(n_next) {
                    g.write(|p| BTreeLeafPage::set_prev_leaf_id(p, left_id));
                    g.unpin(true);
                }
            }
            self.pool.delete_page(node_id);
            self.remove_internal_entry(root_guard, parent_id, first_child, parent_entries, child_index - 1, grandparent);
        }
    }

    fn replace_parent_key(
        &self,
        parent_id: PageId,
        first_child: PageId,
        entries: &[(BTreeKey, PageId)],
        index: u32,
        new_key: BTreeKey,
        grandparent: PageId,
    ) {
        let mut entries = entries.to_vec();
        entries[index as usize].0 = new_key;
        self.write_internal_entries(parent_id, first_child, &entries, grandparent);
    }

    /// Removes the separator at `index` from `parent_id` (used after a
    /// child merge absorbs its sibling), recursing upward if the parent
    /// itself underflows, and collapsing the root if it becomes childless.
    fn remove_internal_entry(
        &self,
        root_guard: &mut PageId,
        parent_id: PageId,
        first_child: PageId,
        mut entries: Vec<(BTreeKey, PageId)>,
        index: u32,
        grandparent: PageId,
    ) {
        entries.remove(index as usize);

        let is_root = grandparent == INVALID_PAGE_ID && parent_id == *root_guard;
        if entries.is_empty() && is_root {
            // The root internal node has exactly one child left: collapse
            // the tree by one level.
            self.pool.delete_page(parent_id);
            if let Some(g) = self.pool.fetch_page(first_child) {
                g.write(|p| BTreePage::set_parent_page_id(p, INVALID_PAGE_ID));
                g.unpin(true);
            }
            *root_guard = first_child;
            return;
        }

        self.write_internal_entries(parent_id, first_child, &entries, grandparent);

        if is_root || entries.len() as u32 >= self.internal_max_size / 2 {
            return;
        }

        // This is best-effort: an underflowed internal node above the leaf
        // level is tolerated rather than further rebalanced. Keys remain
        // correctly reachable; only fanout degrades slightly.
    }
}

pub struct BTreeIterator<'a> {
    tree: &'a BPlusTree<'a>,
    leaf_id: PageId,
    index: u32,
}

impl<'a> Iterator for BTreeIterator<'a> {
    type Item = (BTreeKey, Rid);

    fn next(&mut self) -> Option<(BTreeKey, Rid)> {
        loop {
            if self.leaf_id == INVALID_PAGE_ID {
                return None;
            }
            let guard = self.tree.pool.fetch_page(self.leaf_id)?;
            let n = guard.read(BTreePage::num_keys);
            if self.index >= n {
                self.leaf_id = guard.read(BTreeLeafPage::next_leaf_id);
                self.index = 0;
                continue;
            }
            let entry = guard.read(|p| (BTreeLeafPage::key_at(p, self.index), BTreeLeafPage::value_at(p, self.index)));
            self.index += 1;
            return Some(entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::DiskManager;

    fn pool() -> BufferPool {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("btree.db");
        std::mem::forget(dir);
        let disk = DiskManager::open(path, 4096).unwrap();
        BufferPool::new(disk, 64)
    }

    #[test]
    fn insert_and_find() {
        let pool = pool();
        let tree = BPlusTree::new(&pool);
        for i in 0..50 {
            assert!(tree.insert(i, Rid::new(i as i32, 0)));
        }
        for i in 0..50 {
            assert_eq!(tree.find(i), Some(Rid::new(i as i32, 0)));
        }
        assert_eq!(tree.find(999), None);
    }

    #[test]
    fn duplicate_insert_rejected() {
        let pool = pool();
        let tree = BPlusTree::new(&pool);
        assert!(tree.insert(1, Rid::new(1, 0)));
        assert!(!tree.insert(1, Rid::new(2, 0)));
    }

    #[test]
    fn range_scan_returns_sorted_subset() {
        let pool = pool();
        let tree = BPlusTree::new(&pool);
        for i in 0..100 {
            tree.insert(i, Rid::new(i as i32, 0));
        }
        let got: Vec<i64> = tree.range_scan(10, 15).into_iter().map(|(k, _)| k).collect();
        assert_eq!(got, vec![10, 11, 12, 13, 14, 15]);
    }

    #[test]
    fn full_iteration_in_key_order() {
        let pool = pool();
        let tree = BPlusTree::new(&pool);
        let mut keys: Vec<i64> = (0..80).collect();
        // insert out of order to exercise splits from different directions
        keys.reverse();
        for &k in &keys {
            tree.insert(k, Rid::new(k as i32, 0));
        }
        let got: Vec<i64> = tree.iter().map(|(k, _)| k).collect();
        let mut expected: Vec<i64> = (0..80).collect();
        expected.sort();
        assert_eq!(got, expected);
    }

    #[test]
    fn remove_then_find_fails_and_siblings_repair() {
        let pool = pool();
        let tree = BPlusTree::new(&pool);
        for i in 0..60 {
            tree.insert(i, Rid::new(i as i32, 0));
        }
        for i in (0..40).step_by(2) {
            assert!(tree.remove(i));
        }
        for i in (0..40).step_by(2) {
            assert_eq!(tree.find(i), None);
        }
        for i in (1..40).step_by(2) {
            assert_eq!(tree.find(i), Some(Rid::new(i as i32, 0)));
        }
        for i in 40..60 {
            assert_eq!(tree.find(i), Some(Rid::new(i as i32, 0)));
        }
    }

    #[test]
    fn remove_nonexistent_key_returns_false() {
        let pool = pool();
        let tree = BPlusTree::new(&pool);
        tree.insert(1, Rid::new(1, 0));
        assert!(!tree.remove(42));
    }
}
