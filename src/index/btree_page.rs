//! B+-tree internal/leaf page layouts, built atop the generic [`Page`] header.
//!
//! Layout after the 32-byte generic header, a 16-byte b+-tree header:
//! `{page_type:u8, reserved:[u8;3], num_keys:u32, max_size:u32,
//!   parent_page_id:i32}`.
//!
//! Internal node data area: `child_0 | key_0 | child_1 | key_1 | ... |
//! key_{n-1} | child_n` (n keys, n+1 children).
//!
//! Leaf node data area: `next_leaf_id | prev_leaf_id | key_0 | value_0 |
//! key_1 | value_1 | ...` (sibling pointers for range scans).

use crate::common::{PageId, Rid, SlotId, DEFAULT_PAGE_SIZE, INVALID_PAGE_ID, PAGE_HEADER_SIZE};
use crate::page::Page;

pub type BTreeKey = i64;

const BTREE_HEADER_SIZE: usize = 16;
const DATA_AREA_OFFSET: usize = PAGE_HEADER_SIZE + BTREE_HEADER_SIZE;

const NUM_KEYS_OFFSET: usize = PAGE_HEADER_SIZE + 4;
const MAX_SIZE_OFFSET: usize = PAGE_HEADER_SIZE + 8;
const PARENT_OFFSET: usize = PAGE_HEADER_SIZE + 12;

const KEY_SIZE: usize = 8;
const CHILD_SIZE: usize = 4;
const RID_SIZE: usize = 6; // page_id:i32 ‖ slot_id:u16
const INTERNAL_PAIR_SIZE: usize = KEY_SIZE + CHILD_SIZE;
const LEAF_PAIR_SIZE: usize = KEY_SIZE + RID_SIZE;
const SIBLING_SIZE: usize = 8; // next_leaf_id:i32 ‖ prev_leaf_id:i32

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BTreePageKind {
    Invalid = 0,
    Internal = 1,
    Leaf = 2,
}

impl BTreePageKind {
    fn from_u8(v: u8) -> BTreePageKind {
        match v {
            1 => BTreePageKind::Internal,
            2 => BTreePageKind::Leaf,
            _ => BTreePageKind::Invalid,
        }
    }
}

/// Header field accessors shared by internal and leaf pages.
pub struct BTreePage;

impl BTreePage {
    pub fn compute_internal_max_size(page_size: usize) -> u32 {
        let available = page_size - DATA_AREA_OFFSET - CHILD_SIZE;
        (available / INTERNAL_PAIR_SIZE) as u32
    }

    pub fn compute_leaf_max_size(page_size: usize) -> u32 {
        let available = page_size - DATA_AREA_OFFSET - SIBLING_SIZE;
        (available / LEAF_PAIR_SIZE) as u32
    }

    pub fn kind(page: &Page) -> BTreePageKind {
        BTreePageKind::from_u8(page.data()[PAGE_HEADER_SIZE])
    }

    fn set_kind(page: &mut Page, kind: BTreePageKind) {
        page.data_mut()[PAGE_HEADER_SIZE] = kind as u8;
    }

    pub fn is_leaf(page: &Page) -> bool {
        Self::kind(page) == BTreePageKind::Leaf
    }

    pub fn num_keys(page: &Page) -> u32 {
        u32::from_le_bytes(page.data()[NUM_KEYS_OFFSET..NUM_KEYS_OFFSET + 4].try_into().unwrap())
    }

    pub fn set_num_keys(page: &mut Page, n: u32) {
        page.data_mut()[NUM_KEYS_OFFSET..NUM_KEYS_OFFSET + 4].copy_from_slice(&n.to_le_bytes());
    }

    pub fn max_size(page: &Page) -> u32 {
        u32::from_le_bytes(page.data()[MAX_SIZE_OFFSET..MAX_SIZE_OFFSET + 4].try_into().unwrap())
    }

    pub fn set_max_size(page: &mut Page, n: u32) {
        page.data_mut()[MAX_SIZE_OFFSET..MAX_SIZE_OFFSET + 4].copy_from_slice(&n.to_le_bytes());
    }

    pub fn parent_page_id(page: &Page) -> PageId {
        PageId::from_le_bytes(page.data()[PARENT_OFFSET..PARENT_OFFSET + 4].try_into().unwrap())
    }

    pub fn set_parent_page_id(page: &mut Page, pid: PageId) {
        page.data_mut()[PARENT_OFFSET..PARENT_OFFSET + 4].copy_from_slice(&pid.to_le_bytes());
    }

    pub fn is_root(page: &Page) -> bool {
        Self::parent_page_id(page) == INVALID_PAGE_ID
    }

    pub fn is_full(page: &Page) -> bool {
        Self::num_keys(page) >= Self::max_size(page)
    }

    /// Minimum occupancy for a non-root node (spec §4.9: `max_size / 2`).
    pub fn min_size(page: &Page) -> u32 {
        Self::max_size(page) / 2
    }

    pub fn is_underflow(page: &Page) -> bool {
        !Self::is_root(page) && Self::num_keys(page) < Self::min_size(page)
    }
}

/// Internal node: `n` keys route to `n+1` children. `child_i` holds keys
/// less than `key_i`; the last child holds keys `>= key_{n-1}`.
pub struct BTreeInternalPage;

impl BTreeInternalPage {
    pub fn init(page: &mut Page, max_size: u32) {
        BTreePage::set_kind(page, BTreePageKind::Internal);
        BTreePage::set_num_keys(page, 0);
        BTreePage::set_max_size(page, max_size);
        BTreePage::set_parent_page_id(page, INVALID_PAGE_ID);
    }

    fn child_offset(index: u32) -> usize {
        if index == 0 {
            DATA_AREA_OFFSET
        } else {
            DATA_AREA_OFFSET + CHILD_SIZE + (index as usize - 1) * INTERNAL_PAIR_SIZE
        }
    }

    fn key_offset(index: u32) -> usize {
        DATA_AREA_OFFSET + CHILD_SIZE + index as usize * INTERNAL_PAIR_SIZE
    }

    pub fn key_at(page: &Page, index: u32) -> BTreeKey {
        let off = Self::key_offset(index);
        BTreeKey::from_le_bytes(page.data()[off..off + KEY_SIZE].try_into().unwrap())
    }

    pub fn set_key_at(page: &mut Page, index: u32, key: BTreeKey) {
        let off = Self::key_offset(index);
        page.data_mut()[off..off + KEY_SIZE].copy_from_slice(&key.to_le_bytes());
    }

    pub fn child_at(page: &Page, index: u32) -> PageId {
        let off = Self::child_offset(index);
        PageId::from_le_bytes(page.data()[off..off + CHILD_SIZE].try_into().unwrap())
    }

    pub fn set_child_at(page: &mut Page, index: u32, child: PageId) {
        let off = Self::child_offset(index);
        page.data_mut()[off..off + CHILD_SIZE].copy_from_slice(&child.to_le_bytes());
    }

    /// Binary search for the first key strictly greater than `key`; that
    /// index is the child that should hold `key`.
    pub fn find_child_index(page: &Page, key: BTreeKey) -> u32 {
        let n = BTreePage::num_keys(page);
        let (mut lo, mut hi) = (0u32, n);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if Self::key_at(page, mid) <= key {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    /// Inserts `key` at `index` with its right child at `index + 1`,
    /// shifting later entries up. Returns `false` if already full.
    pub fn insert_at(page: &mut Page, index: u32, key: BTreeKey, right_child: PageId) -> bool {
        if BTreePage::is_full(page) {
            return false;
        }
        let n = BTreePage::num_keys(page);
        let mut i = n;
        while i > index {
            Self::set_key_at(page, i, Self::key_at(page, i - 1));
            Self::set_child_at(page, i + 1, Self::child_at(page, i));
            i -= 1;
        }
        Self::set_key_at(page, index, key);
        Self::set_child_at(page, index + 1, right_child);
        BTreePage::set_num_keys(page, n + 1);
        true
    }

    pub fn remove_at(page: &mut Page, index: u32) {
        let n = BTreePage::num_keys(page);
        if index >= n {
            return;
        }
        for i in index..n - 1 {
            Self::set_key_at(page, i, Self::key_at(page, i + 1));
            Self::set_child_at(page, i + 1, Self::child_at(page, i + 2));
        }
        BTreePage::set_num_keys(page, n - 1);
    }

    /// Sets this page up as a brand-new root with one separator key between
    /// `left` and `right`.
    pub fn init_as_root(page: &mut Page, max_size: u32, left: PageId, key: BTreeKey, right: PageId) {
        Self::init(page, max_size);
        Self::set_child_at(page, 0, left);
        Self::set_key_at(page, 0, key);
        Self::set_child_at(page, 1, right);
        BTreePage::set_num_keys(page, 1);
    }

    /// Moves the upper half of entries to `sibling`, returning the
    /// separator key to push up into the parent.
    pub fn split_into(page: &mut Page, sibling: &mut Page, sibling_max_size: u32) -> BTreeKey {
        Self::init(sibling, sibling_max_size);
        let n = BTreePage::num_keys(page);
        let mid = n / 2;
        let up_key = Self::key_at(page, mid);

        // Keys after `mid` and all children after child_{mid} move over;
        // the middle key itself is promoted, not duplicated.
        for i in (mid + 1)..n {
            Self::set_key_at(sibling, i - mid - 1, Self::key_at(page, i));
        }
        for i in (mid + 1)..=n {
            Self::set_child_at(sibling, i - mid - 1, Self::child_at(page, i));
        }
        BTreePage::set_num_keys(sibling, n - mid - 1);
        BTreePage::set_num_keys(page, mid);
        up_key
    }

    pub fn merge_from_right(page: &mut Page, separator: BTreeKey, right: &Page) {
        let n = BTreePage::num_keys(page);
        let rn = BTreePage::num_keys(right);
        Self::set_key_at(page, n, separator);
        Self::set_child_at(page, n + 1, Self::child_at(right, 0));
        for i in 0..rn {
            Self::set_key_at(page, n + 1 + i, Self::key_at(right, i));
            Self::set_child_at(page, n + 2 + i, Self::child_at(right, i + 1));
        }
        BTreePage::set_num_keys(page, n + 1 + rn);
    }

    /// Rotates the parent separator down into `page` and the right
    /// sibling's first child up through it. Returns the new separator to
    /// store back in the parent.
    pub fn borrow_from_right(page: &mut Page, separator: BTreeKey, right: &mut Page) -> BTreeKey {
        let n = BTreePage::num_keys(page);
        Self::set_key_at(page, n, separator);
        Self::set_child_at(page, n + 1, Self::child_at(right, 0));
        BTreePage::set_num_keys(page, n + 1);

        let new_sep = Self::key_at(right, 0);
        let rn = BTreePage::num_keys(right);
        for i in 0..rn - 1 {
            Self::set_key_at(right, i, Self::key_at(right, i + 1));
            Self::set_child_at(right, i, Self::child_at(right, i + 1));
        }
        Self::set_child_at(right, rn - 1, Self::child_at(right, rn));
        BTreePage::set_num_keys(right, rn - 1);
        new_sep
    }

    /// Rotates the parent separator down into `page` (as its new first
    /// key) and the left sibling's last child up through it. Returns the
    /// new separator to store back in the parent.
    pub fn borrow_from_left(page: &mut Page, separator: BTreeKey, left: &mut Page) -> BTreeKey {
        let n = BTreePage::num_keys(page);
        let mut i = n;
        while i > 0 {
            Self::set_key_at(page, i, Self::key_at(page, i - 1));
            i -= 1;
        }
        let mut i = n + 1;
        while i > 0 {
            Self::set_child_at(page, i, Self::child_at(page, i - 1));
            i -= 1;
        }
        let ln = BTreePage::num_keys(left);
        Self::set_child_at(page, 0, Self::child_at(left, ln));
        Self::set_key_at(page, 0, separator);
        BTreePage::set_num_keys(page, n + 1);

        let new_sep = Self::key_at(left, ln - 1);
        BTreePage::set_num_keys(left, ln - 1);
        new_sep
    }
}

/// Leaf node: keys map directly to RIDs, chained via `next_leaf_id`/
/// `prev_leaf_id` for ordered range scans.
pub struct BTreeLeafPage;

impl BTreeLeafPage {
    pub fn init(page: &mut Page, max_size: u32) {
        BTreePage::set_kind(page, BTreePageKind::Leaf);
        BTreePage::set_num_keys(page, 0);
        BTreePage::set_max_size(page, max_size);
        BTreePage::set_parent_page_id(page, INVALID_PAGE_ID);
        Self::set_next_leaf_id(page, INVALID_PAGE_ID);
        Self::set_prev_leaf_id(page, INVALID_PAGE_ID);
    }

    pub fn next_leaf_id(page: &Page) -> PageId {
        PageId::from_le_bytes(page.data()[DATA_AREA_OFFSET..DATA_AREA_OFFSET + 4].try_into().unwrap())
    }

    pub fn set_next_leaf_id(page: &mut Page, pid: PageId) {
        page.data_mut()[DATA_AREA_OFFSET..DATA_AREA_OFFSET + 4].copy_from_slice(&pid.to_le_bytes());
    }

    pub fn prev_leaf_id(page: &Page) -> PageId {
        let off = DATA_AREA_OFFSET + 4;
        PageId::from_le_bytes(page.data()[off..off + 4].try_into().unwrap())
    }

    pub fn set_prev_leaf_id(page: &mut Page, pid: PageId) {
        let off = DATA_AREA_OFFSET + 4;
        page.data_mut()[off..off + 4].copy_from_slice(&pid.to_le_bytes());
    }

    fn key_offset(index: u32) -> usize {
        DATA_AREA_OFFSET + SIBLING_SIZE + index as usize * LEAF_PAIR_SIZE
    }

    fn value_offset(index: u32) -> usize {
        Self::key_offset(index) + KEY_SIZE
    }

    pub fn key_at(page: &Page, index: u32) -> BTreeKey {
        let off = Self::key_offset(index);
        BTreeKey::from_le_bytes(page.data()[off..off + KEY_SIZE].try_into().unwrap())
    }

    pub fn set_key_at(page: &mut Page, index: u32, key: BTreeKey) {
        let off = Self::key_offset(index);
        page.data_mut()[off..off + KEY_SIZE].copy_from_slice(&key.to_le_bytes());
    }

    pub fn value_at(page: &Page, index: u32) -> Rid {
        let off = Self::value_offset(index);
        let page_id = PageId::from_le_bytes(page.data()[off..off + 4].try_into().unwrap());
        let slot_id = SlotId::from_le_bytes(page.data()[off + 4..off + 6].try_into().unwrap());
        Rid::new(page_id, slot_id)
    }

    pub fn set_value_at(page: &mut Page, index: u32, value: Rid) {
        let off = Self::value_offset(index);
        page.data_mut()[off..off + 4].copy_from_slice(&value.page_id.to_le_bytes());
        page.data_mut()[off + 4..off + 6].copy_from_slice(&value.slot_id.to_le_bytes());
    }

    /// Binary search returning `(index, found)`: `index` is either the
    /// matching slot or the insertion point.
    pub fn find_key_index(page: &Page, key: BTreeKey) -> (u32, bool) {
        let n = BTreePage::num_keys(page);
        let (mut lo, mut hi) = (0u32, n);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let mid_key = Self::key_at(page, mid);
            if mid_key == key {
                return (mid, true);
            } else if mid_key < key {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        (lo, false)
    }

    pub fn find(page: &Page, key: BTreeKey) -> Option<Rid> {
        let (idx, found) = Self::find_key_index(page, key);
        if found {
            Some(Self::value_at(page, idx))
        } else {
            None
        }
    }

    /// Returns `false` if full or the key already exists.
    pub fn insert(page: &mut Page, key: BTreeKey, value: Rid) -> bool {
        if BTreePage::is_full(page) {
            return false;
        }
        let (idx, found) = Self::find_key_index(page, key);
        if found {
            return false;
        }
        let n = BTreePage::num_keys(page);
        let mut i = n;
        while i > idx {
            Self::set_key_at(page, i, Self::key_at(page, i - 1));
            Self::set_value_at(page, i, Self::value_at(page, i - 1));
            i -= 1;
        }
        Self::set_key_at(page, idx, key);
        Self::set_value_at(page, idx, value);
        BTreePage::set_num_keys(page, n + 1);
        true
    }

    pub fn remove(page: &mut Page, key: BTreeKey) -> bool {
        let (idx, found) = Self::find_key_index(page, key);
        if !found {
            return false;
        }
        let n = BTreePage::num_keys(page);
        for i in idx..n - 1 {
            Self::set_key_at(page, i, Self::key_at(page, i + 1));
            Self::set_value_at(page, i, Self::value_at(page, i + 1));
        }
        BTreePage::set_num_keys(page, n - 1);
        true
    }

    /// Moves the upper half of entries into `sibling`, returning the
    /// sibling's first key (the parent's new separator).
    pub fn split_into(page: &mut Page, sibling: &mut Page, sibling_max_size: u32) -> BTreeKey {
        Self::init(sibling, sibling_max_size);
        let n = BTreePage::num_keys(page);
        let mid = n / 2;
        for i in mid..n {
            Self::set_key_at(sibling, i - mid, Self::key_at(page, i));
            Self::set_value_at(sibling, i - mid, Self::value_at(page, i));
        }
        BTreePage::set_num_keys(sibling, n - mid);
        BTreePage::set_num_keys(page, mid);
        Self::key_at(sibling, 0)
    }

    pub fn merge_from_right(page: &mut Page, right: &Page) {
        let n = BTreePage::num_keys(page);
        let rn = BTreePage::num_keys(right);
        for i in 0..rn {
            Self::set_key_at(page, n + i, Self::key_at(right, i));
            Self::set_value_at(page, n + i, Self::value_at(right, i));
        }
        BTreePage::set_num_keys(page, n + rn);
        Self::set_next_leaf_id(page, Self::next_leaf_id(right));
    }

    /// Moves the right sibling's first entry onto the end of `page`,
    /// returning the new first key of `right` for the parent separator.
    pub fn borrow_from_right(page: &mut Page, right: &mut Page) -> BTreeKey {
        let n = BTreePage::num_keys(page);
        Self::set_key_at(page, n, Self::key_at(right, 0));
        Self::set_value_at(page, n, Self::value_at(right, 0));
        BTreePage::set_num_keys(page, n + 1);

        let rn = BTreePage::num_keys(right);
        for i in 0..rn - 1 {
            Self::set_key_at(right, i, Self::key_at(right, i + 1));
            Self::set_value_at(right, i, Self::value_at(right, i + 1));
        }
        BTreePage::set_num_keys(right, rn - 1);
        Self::key_at(right, 0)
    }

    /// Moves the left sibling's last entry onto the front of `page`,
    /// returning `page`'s new first key for the parent separator.
    pub fn borrow_from_left(page: &mut Page, left: &mut Page) -> BTreeKey {
        let n = BTreePage::num_keys(page);
        let ln = BTreePage::num_keys(left);
        let mut i = n;
        while i > 0 {
            Self::set_key_at(page, i, Self::key_at(page, i - 1));
            Self::set_value_at(page, i, Self::value_at(page, i - 1));
            i -= 1;
        }
        Self::set_key_at(page, 0, Self::key_at(left, ln - 1));
        Self::set_value_at(page, 0, Self::value_at(left, ln - 1));
        BTreePage::set_num_keys(page, n + 1);
        BTreePage::set_num_keys(left, ln - 1);
        Self::key_at(page, 0)
    }
}

pub fn default_internal_max_size() -> u32 {
    BTreePage::compute_internal_max_size(DEFAULT_PAGE_SIZE)
}

pub fn default_leaf_max_size() -> u32 {
    BTreePage::compute_leaf_max_size(DEFAULT_PAGE_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> Page {
        let mut p = Page::new(DEFAULT_PAGE_SIZE);
        p.init_header(1);
        p
    }

    #[test]
    fn leaf_insert_keeps_sorted_order() {
        let mut page = fresh();
        BTreeLeafPage::init(&mut page, default_leaf_max_size());
        for (k, pid) in [(5, 50), (1, 10), (3, 30)] {
            assert!(BTreeLeafPage::insert(&mut page, k, Rid::new(pid, 0)));
        }
        let keys: Vec<i64> = (0..BTreePage::num_keys(&page))
            .map(|i| BTreeLeafPage::key_at(&page, i))
            .collect();
        assert_eq!(keys, vec![1, 3, 5]);
    }

    #[test]
    fn leaf_duplicate_rejected() {
        let mut page = fresh();
        BTreeLeafPage::init(&mut page, default_leaf_max_size());
        assert!(BTreeLeafPage::insert(&mut page, 1, Rid::new(1, 0)));
        assert!(!BTreeLeafPage::insert(&mut page, 1, Rid::new(2, 0)));
    }

    #[test]
    fn leaf_find_and_remove() {
        let mut page = fresh();
        BTreeLeafPage::init(&mut page, default_leaf_max_size());
        BTreeLeafPage::insert(&mut page, 7, Rid::new(9, 2));
        assert_eq!(BTreeLeafPage::find(&page, 7), Some(Rid::new(9, 2)));
        assert!(BTreeLeafPage::remove(&mut page, 7));
        assert_eq!(BTreeLeafPage::find(&page, 7), None);
    }

    #[test]
    fn leaf_split_moves_upper_half() {
        let mut page = fresh();
        let max_size = 4;
        BTreeLeafPage::init(&mut page, max_size);
        for k in 0..4 {
            BTreeLeafPage::insert(&mut page, k, Rid::new(k as i32, 0));
        }
        let mut sibling = fresh();
        let up = BTreeLeafPage::split_into(&mut page, &mut sibling, max_size);
        assert_eq!(up, 2);
        assert_eq!(BTreePage::num_keys(&page), 2);
        assert_eq!(BTreePage::num_keys(&sibling), 2);
        assert_eq!(BTreeLeafPage::key_at(&sibling, 0), 2);
    }

    #[test]
    fn internal_find_child_index_routes_correctly() {
        let mut page = fresh();
        BTreeInternalPage::init(&mut page, default_internal_max_size());
        BTreeInternalPage::init_as_root(&mut page, default_internal_max_size(), 1, 10, 2);
        assert_eq!(BTreeInternalPage::find_child_index(&page, 5), 0);
        assert_eq!(BTreeInternalPage::find_child_index(&page, 10), 1);
        assert_eq!(BTreeInternalPage::find_child_index(&page, 15), 1);
    }

    #[test]
    fn internal_split_promotes_middle_key() {
        let mut page = fresh();
        let max_size = 4;
        BTreeInternalPage::init(&mut page, max_size);
        BTreeInternalPage::set_child_at(&mut page, 0, 100);
        for (i, k) in [10, 20, 30, 40].into_iter().enumerate() {
            BTreeInternalPage::insert_at(&mut page, i as u32, k, 200 + i as i32);
        }
        let mut sibling = fresh();
        let up = BTreeInternalPage::split_into(&mut page, &mut sibling, max_size);
        assert_eq!(up, 30);
        assert_eq!(BTreePage::num_keys(&page), 2);
        assert_eq!(BTreePage::num_keys(&sibling), 1);
    }
}
