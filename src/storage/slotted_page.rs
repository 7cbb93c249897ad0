//! Slotted table page: variable-length records located by a slot directory.
//!
//! Layout after the 32-byte generic header:
//! `[slot_0][slot_1]...` (slots grow toward higher offsets) `...free space...
//! ...[record_n]...[record_0]` (records grow toward lower offsets, i.e. down
//! from the page end). `next_page_id`/`prev_page_id` are packed into the
//! generic header's reserved bytes at offsets 24 and 28.

use crate::common::{PageId, SlotId, INVALID_PAGE_ID, INVALID_SLOT_ID, PAGE_HEADER_SIZE};
use crate::page::{Page, PageType};

pub const SLOT_SIZE: usize = 4;
const NEXT_PAGE_OFFSET: usize = 24;
const PREV_PAGE_OFFSET: usize = 28;

/// Operates on a `Page`'s bytes as a slotted table page. Borrows the page
/// mutably/immutably for the duration of each call rather than owning it —
/// the buffer pool retains ownership of the underlying frame.
pub struct SlottedPage;

impl SlottedPage {
    pub fn init(page: &mut Page) {
        page.set_page_type(PageType::Table);
        page.set_record_count(0);
        page.set_free_space_offset(PAGE_HEADER_SIZE as u16);
        page.set_free_space_end(page.size() as u16);
        Self::set_next_page_id(page, INVALID_PAGE_ID);
        Self::set_prev_page_id(page, INVALID_PAGE_ID);
    }

    pub fn next_page_id(page: &Page) -> PageId {
        PageId::from_le_bytes(page.data()[NEXT_PAGE_OFFSET..NEXT_PAGE_OFFSET + 4].try_into().unwrap())
    }

    pub fn set_next_page_id(page: &mut Page, pid: PageId) {
        page.data_mut()[NEXT_PAGE_OFFSET..NEXT_PAGE_OFFSET + 4].copy_from_slice(&pid.to_le_bytes());
    }

    pub fn prev_page_id(page: &Page) -> PageId {
        PageId::from_le_bytes(page.data()[PREV_PAGE_OFFSET..PREV_PAGE_OFFSET + 4].try_into().unwrap())
    }

    pub fn set_prev_page_id(page: &mut Page, pid: PageId) {
        page.data_mut()[PREV_PAGE_OFFSET..PREV_PAGE_OFFSET + 4].copy_from_slice(&pid.to_le_bytes());
    }

    fn slot_offset(slot_id: SlotId) -> usize {
        PAGE_HEADER_SIZE + slot_id as usize * SLOT_SIZE
    }

    fn slot_count(page: &Page) -> u16 {
        page.record_count()
    }

    fn get_slot(page: &Page, slot_id: SlotId) -> (u16, u16) {
        let off = Self::slot_offset(slot_id);
        let offset = u16::from_le_bytes(page.data()[off..off + 2].try_into().unwrap());
        let length = u16::from_le_bytes(page.data()[off + 2..off + 4].try_into().unwrap());
        (offset, length)
    }

    fn set_slot(page: &mut Page, slot_id: SlotId, offset: u16, length: u16) {
        let off = Self::slot_offset(slot_id);
        page.data_mut()[off..off + 2].copy_from_slice(&offset.to_le_bytes());
        page.data_mut()[off + 2..off + 4].copy_from_slice(&length.to_le_bytes());
    }

    fn is_slot_deleted(page: &Page, slot_id: SlotId) -> bool {
        Self::get_slot(page, slot_id).0 == 0
    }

    fn free_space(page: &Page) -> u16 {
        let end = page.free_space_end();
        let off = page.free_space_offset();
        if end <= off {
            0
        } else {
            end - off
        }
    }

    fn find_free_slot(page: &Page) -> SlotId {
        let count = Self::slot_count(page);
        for i in 0..count {
            if Self::is_slot_deleted(page, i) {
                return i;
            }
        }
        count
    }

    /// Whether `size` bytes would currently fit (accounting for whether a
    /// new slot entry would also be needed).
    pub fn can_fit(page: &Page, size: u16) -> bool {
        let reuse_slot = Self::find_free_slot(page) < Self::slot_count(page);
        let needed = if reuse_slot { size } else { size + SLOT_SIZE as u16 };
        Self::free_space(page) >= needed
    }

    /// Inserts a record, reusing a deleted slot if one exists. Returns the
    /// slot id, or `None` if there isn't room.
    pub fn insert_record(page: &mut Page, bytes: &[u8]) -> Option<SlotId> {
        if bytes.is_empty() {
            return None;
        }
        let size = bytes.len() as u16;
        let slot_id = Self::find_free_slot(page);
        let is_new_slot = slot_id >= Self::slot_count(page);
        let needed = if is_new_slot { size + SLOT_SIZE as u16 } else { size };
        if Self::free_space(page) < needed {
            return None;
        }

        let record_offset = page.free_space_end() - size;
        let start = record_offset as usize;
        page.data_mut()[start..start + size as usize].copy_from_slice(bytes);
        Self::set_slot(page, slot_id, record_offset, size);
        page.set_free_space_end(record_offset);

        if is_new_slot {
            page.set_record_count(slot_id + 1);
            page.set_free_space_offset(
                (PAGE_HEADER_SIZE + (slot_id as usize + 1) * SLOT_SIZE) as u16,
            );
        }
        Some(slot_id)
    }

    /// Marks a slot deleted. Returns `false` if the slot was out of range
    /// or already deleted.
    pub fn delete_record(page: &mut Page, slot_id: SlotId) -> bool {
        if slot_id >= Self::slot_count(page) {
            return false;
        }
        if Self::is_slot_deleted(page, slot_id) {
            return false;
        }
        Self::set_slot(page, slot_id, 0, 0);
        true
    }

    /// Updates a record in place if it still fits in its old slot length
    /// (fragmentation tolerated); otherwise reallocates at the free-space
    /// end if room allows. Returns `false` if neither works.
    pub fn update_record(page: &mut Page, slot_id: SlotId, bytes: &[u8]) -> bool {
        if slot_id >= Self::slot_count(page) || bytes.is_empty() {
            return false;
        }
        let (old_offset, old_length) = Self::get_slot(page, slot_id);
        if old_offset == 0 {
            return false;
        }
        let size = bytes.len() as u16;

        if size <= old_length {
            let start = old_offset as usize;
            page.data_mut()[start..start + size as usize].copy_from_slice(bytes);
            // Length is left unchanged; the remainder becomes fragmentation.
            return true;
        }

        let extra_needed = size - old_length;
        if Self::free_space(page) < extra_needed {
            return false;
        }
        let new_offset = page.free_space_end() - size;
        let start = new_offset as usize;
        page.data_mut()[start..start + size as usize].copy_from_slice(bytes);
        Self::set_slot(page, slot_id, new_offset, size);
        page.set_free_space_end(new_offset);
        true
    }

    /// Returns the record bytes for `slot_id`, or an empty vector for an
    /// invalid or deleted slot.
    pub fn get_record(page: &Page, slot_id: SlotId) -> Vec<u8> {
        if slot_id == INVALID_SLOT_ID || slot_id >= Self::slot_count(page) {
            return Vec::new();
        }
        let (offset, length) = Self::get_slot(page, slot_id);
        if offset == 0 {
            return Vec::new();
        }
        page.data()[offset as usize..offset as usize + length as usize].to_vec()
    }

    pub fn is_occupied(page: &Page, slot_id: SlotId) -> bool {
        slot_id != INVALID_SLOT_ID
            && slot_id < Self::slot_count(page)
            && !Self::is_slot_deleted(page, slot_id)
    }

    /// Rewrites surviving records contiguously against the page end,
    /// preserving slot ids (it only ever moves record bytes, never
    /// renumbers slots).
    pub fn compact(page: &mut Page) {
        let count = Self::slot_count(page);
        let mut records: Vec<(SlotId, u16, u16)> = (0..count)
            .filter(|&i| !Self::is_slot_deleted(page, i))
            .map(|i| {
                let (o, l) = Self::get_slot(page, i);
                (i, o, l)
            })
            .collect();
        if records.is_empty() {
            page.set_free_space_end(page.size() as u16);
            return;
        }
        records.sort_by(|a, b| b.1.cmp(&a.1));

        let mut temp = Vec::new();
        for &(_, offset, length) in &records {
            temp.extend_from_slice(&page.data()[offset as usize..offset as usize + length as usize]);
        }

        let mut write_offset = page.size() as u16;
        let mut cursor = 0usize;
        for &(slot_id, _, length) in &records {
            write_offset -= length;
            let start = write_offset as usize;
            page.data_mut()[start..start + length as usize]
                .copy_from_slice(&temp[cursor..cursor + length as usize]);
            Self::set_slot(page, slot_id, write_offset, length);
            cursor += length as usize;
        }
        page.set_free_space_end(write_offset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::DEFAULT_PAGE_SIZE;

    fn fresh_page() -> Page {
        let mut page = Page::new(DEFAULT_PAGE_SIZE);
        page.init_header(1);
        SlottedPage::init(&mut page);
        page
    }

    #[test]
    fn insert_get_delete() {
        let mut page = fresh_page();
        let s0 = SlottedPage::insert_record(&mut page, b"hello").unwrap();
        let s1 = SlottedPage::insert_record(&mut page, b"world!!").unwrap();
        assert_eq!(s0, 0);
        assert_eq!(s1, 1);
        assert_eq!(SlottedPage::get_record(&page, s0), b"hello");
        assert_eq!(SlottedPage::get_record(&page, s1), b"world!!");

        assert!(SlottedPage::delete_record(&mut page, s0));
        assert!(SlottedPage::get_record(&page, s0).is_empty());
        assert!(!SlottedPage::is_occupied(&page, s0));
    }

    #[test]
    fn deleted_slot_reused() {
        let mut page = fresh_page();
        let s0 = SlottedPage::insert_record(&mut page, b"aaaa").unwrap();
        SlottedPage::delete_record(&mut page, s0);
        let s1 = SlottedPage::insert_record(&mut page, b"bbbb").unwrap();
        assert_eq!(s1, s0);
    }

    #[test]
    fn update_in_place_when_smaller_or_equal() {
        let mut page = fresh_page();
        let s0 = SlottedPage::insert_record(&mut page, b"abcdef").unwrap();
        assert!(SlottedPage::update_record(&mut page, s0, b"xy"));
        // In-place shrink keeps the old slot length, so the old tail bytes
        // survive as fragmentation; only the first 2 bytes are overwritten.
        assert_eq!(SlottedPage::get_record(&page, s0), b"xycdef");
    }

    #[test]
    fn update_reallocates_when_larger() {
        let mut page = fresh_page();
        let s0 = SlottedPage::insert_record(&mut page, b"ab").unwrap();
        assert!(SlottedPage::update_record(&mut page, s0, b"abcdefgh"));
        assert_eq!(SlottedPage::get_record(&page, s0), b"abcdefgh");
    }

    #[test]
    fn compact_preserves_slot_ids_and_bytes() {
        let mut page = fresh_page();
        let s0 = SlottedPage::insert_record(&mut page, b"one").unwrap();
        let s1 = SlottedPage::insert_record(&mut page, b"two").unwrap();
        let s2 = SlottedPage::insert_record(&mut page, b"three").unwrap();
        SlottedPage::delete_record(&mut page, s1);

        SlottedPage::compact(&mut page);

        assert_eq!(SlottedPage::get_record(&page, s0), b"one");
        assert_eq!(SlottedPage::get_record(&page, s2), b"three");
        assert!(!SlottedPage::is_occupied(&page, s1));
    }

    #[test]
    fn next_prev_links_persist() {
        let mut page = fresh_page();
        SlottedPage::set_next_page_id(&mut page, 5);
        SlottedPage::set_prev_page_id(&mut page, 3);
        assert_eq!(SlottedPage::next_page_id(&page), 5);
        assert_eq!(SlottedPage::prev_page_id(&page), 3);
    }
}
