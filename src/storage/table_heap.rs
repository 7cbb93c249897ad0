//! Doubly-linked list of slotted table pages, RID-addressed CRUD + iterator.

use log::{debug, trace};

use crate::buffer::BufferPool;
use crate::common::{PageId, Rid, SlotId, INVALID_PAGE_ID};
use crate::page::PageType;
use crate::tuple::{Schema, Tuple};

use super::slotted_page::SlottedPage;

/// A table's storage: a cached first page id plus whatever the buffer pool
/// resolves from there via `next_page_id` links. Cheap to copy — it's just
/// a pool reference and a page id — so executors can hold one by value.
#[derive(Clone, Copy)]
pub struct TableHeap<'a> {
    pool: &'a BufferPool,
    first_page_id: PageId,
}

impl<'a> TableHeap<'a> {
    /// Creates a brand-new, empty heap (allocates its first page).
    pub fn create(pool: &'a BufferPool) -> TableHeap<'a> {
        let guard = pool.new_page().expect("buffer pool exhausted creating heap");
        let first_page_id = guard.page_id();
        guard.write(|p| SlottedPage::init(p));
        guard.write(|p| p.set_page_type(PageType::Table));
        guard.unpin(true);
        debug!("table heap created, first_page_id={}", first_page_id);
        TableHeap {
            pool,
            first_page_id,
        }
    }

    /// Attaches to an existing heap whose first page id is already known
    /// (as recorded by the catalog).
    pub fn open(pool: &'a BufferPool, first_page_id: PageId) -> TableHeap<'a> {
        TableHeap {
            pool,
            first_page_id,
        }
    }

    pub fn first_page_id(&self) -> PageId {
        self.first_page_id
    }

    /// Walks pages from `first_page_id`, inserting into the first page with
    /// room; allocates and links a new page if none fits.
    pub fn insert_tuple(&self, tuple: &Tuple, schema: &Schema) -> Option<Rid> {
        let bytes = tuple.serialize(schema).ok()?;
        if bytes.len() > u16::MAX as usize {
            return None;
        }
        let size = bytes.len() as u16;

        let mut page_id = self.first_page_id;
        let mut prev_page_id = INVALID_PAGE_ID;
        loop {
            let guard = self.pool.fetch_page(page_id)?;
            let fits = guard.read(|p| SlottedPage::can_fit(p, size));
            if fits {
                let slot = guard.write(|p| SlottedPage::insert_record(p, &bytes));
                guard.unpin(true);
                return slot.map(|s| Rid::new(page_id, s));
            }
            let next = guard.read(|p| SlottedPage::next_page_id(p));
            guard.unpin(false);
            if next == INVALID_PAGE_ID {
                prev_page_id = page_id;
                break;
            }
            page_id = next;
        }

        // No page fit; allocate a new one and append to the tail.
        let new_guard = self.pool.new_page()?;
        let new_page_id = new_guard.page_id();
        new_guard.write(|p| {
            SlottedPage::init(p);
            p.set_page_type(PageType::Table);
            SlottedPage::set_prev_page_id(p, prev_page_id);
        });
        let slot = new_guard.write(|p| SlottedPage::insert_record(p, &bytes));
        new_guard.unpin(true);

        if let Some(prev) = self.pool.fetch_page(prev_page_id) {
            prev.write(|p| SlottedPage::set_next_page_id(p, new_page_id));
            prev.unpin(true);
        }

        trace!("insert_tuple allocated new page {}", new_page_id);
        slot.map(|s| Rid::new(new_page_id, s))
    }

    pub fn get_tuple(&self, rid: Rid, schema: &Schema) -> Option<Tuple> {
        let guard = self.pool.fetch_page(rid.page_id)?;
        let bytes = guard.read(|p| SlottedPage::get_record(p, rid.slot_id));
        guard.unpin(false);
        if bytes.is_empty() {
            return None;
        }
        let mut tuple = Tuple::deserialize(&bytes, schema).ok()?;
        tuple.rid = rid;
        Some(tuple)
    }

    pub fn delete_tuple(&self, rid: Rid) -> bool {
        let guard = match self.pool.fetch_page(rid.page_id) {
            Some(g) => g,
            None => return false,
        };
        let ok = guard.write(|p| SlottedPage::delete_record(p, rid.slot_id));
        guard.unpin(ok);
        ok
    }

    /// Tries an in-place update first; on overflow, deletes the old record
    /// and inserts on whatever page fits (possibly a different page). Per
    /// spec §4.5, the migrated RID is not surfaced to the caller — a known
    /// limitation that can leave secondary indexes stale.
    pub fn update_tuple(&self, new_tuple: &Tuple, rid: Rid, schema: &Schema) -> bool {
        let bytes = match new_tuple.serialize(schema) {
            Ok(b) => b,
            Err(_) => return false,
        };
        if bytes.len() > u16::MAX as usize {
            return false;
        }
        let guard = match self.pool.fetch_page(rid.page_id) {
            Some(g) => g,
            None => return false,
        };
        let ok = guard.write(|p| SlottedPage::update_record(p, rid.slot_id, &bytes));
        guard.unpin(ok);
        if ok {
            return true;
        }

        if !self.delete_tuple(rid) {
            return false;
        }
        self.insert_tuple(new_tuple, schema).is_some()
    }

    pub fn iter(&self, schema: Schema) -> TableIterator<'a> {
        TableIterator::new(*self, schema)
    }
}

/// Advances by `(page, slot)`, skipping deleted slots and crossing page
/// boundaries via `next_page_id`. Holds no live page pin across a yield —
/// it copies the tuple bytes out before returning (spec §9 design note on
/// iterator invalidation). Owns its `TableHeap` (a cheap pool ref + page
/// id) rather than borrowing it, so it can be stored inside an executor
/// without a self-referential lifetime.
pub struct TableIterator<'h> {
    heap: TableHeap<'h>,
    schema: Schema,
    page_id: PageId,
    slot_id: SlotId,
    done: bool,
}

impl<'h> TableIterator<'h> {
    fn new(heap: TableHeap<'h>, schema: Schema) -> TableIterator<'h> {
        TableIterator {
            page_id: heap.first_page_id(),
            heap,
            schema,
            slot_id: 0,
            done: false,
        }
    }

    pub fn rewind(&mut self) {
        self.page_id = self.heap.first_page_id();
        self.slot_id = 0;
        self.done = false;
    }
}

impl<'h> Iterator for TableIterator<'h> {
    type Item = Tuple;

    fn next(&mut self) -> Option<Tuple> {
        if self.done {
            return None;
        }
        loop {
            if self.page_id == INVALID_PAGE_ID {
                self.done = true;
                return None;
            }
            let guard = self.heap.pool.fetch_page(self.page_id)?;
            let record_count = guard.read(|p| p.record_count());
            if self.slot_id as u32 >= record_count as u32 {
                let next = guard.read(|p| SlottedPage::next_page_id(p));
                guard.unpin(false);
                self.page_id = next;
                self.slot_id = 0;
                continue;
            }
            let occupied = guard.read(|p| SlottedPage::is_occupied(p, self.slot_id));
            if !occupied {
                guard.unpin(false);
                self.slot_id += 1;
                continue;
            }
            let bytes = guard.read(|p| SlottedPage::get_record(p, self.slot_id));
            let rid = Rid::new(self.page_id, self.slot_id);
            guard.unpin(false);
            self.slot_id += 1;
            if let Ok(mut tuple) = Tuple::deserialize(&bytes, &self.schema) {
                tuple.rid = rid;
                return Some(tuple);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::DiskManager;
    use crate::tuple::{Column, TypeId, Value};

    fn pool() -> BufferPool {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("heap.db");
        std::mem::forget(dir);
        let disk = DiskManager::open(path, 4096).unwrap();
        BufferPool::new(disk, 16)
    }

    fn schema() -> Schema {
        Schema::new(vec![
            Column::new("id", TypeId::Integer),
            Column::new("name", TypeId::Varchar),
        ])
    }

    #[test]
    fn insert_and_scan_preserves_order() {
        let pool = pool();
        let heap = TableHeap::create(&pool);
        let schema = schema();

        for i in 0..5 {
            let t = Tuple::new(vec![Value::Integer(i), Value::Varchar(format!("n{}", i))]);
            heap.insert_tuple(&t, &schema).unwrap();
        }

        let collected: Vec<i64> = heap
            .iter(schema.clone())
            .map(|t| t.get(0).as_i64().unwrap())
            .collect();
        assert_eq!(collected, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn delete_is_skipped_by_iterator() {
        let pool = pool();
        let heap = TableHeap::create(&pool);
        let schema = schema();
        let t0 = Tuple::new(vec![Value::Integer(0), Value::Varchar("a".into())]);
        let t1 = Tuple::new(vec![Value::Integer(1), Value::Varchar("b".into())]);
        let rid0 = heap.insert_tuple(&t0, &schema).unwrap();
        heap.insert_tuple(&t1, &schema).unwrap();

        assert!(heap.delete_tuple(rid0));
        assert!(heap.get_tuple(rid0, &schema).is_none());

        let remaining: Vec<i64> = heap.iter(schema.clone()).map(|t| t.get(0).as_i64().unwrap()).collect();
        assert_eq!(remaining, vec![1]);
    }

    #[test]
    fn update_in_place_then_read_back() {
        let pool = pool();
        let heap = TableHeap::create(&pool);
        let schema = schema();
        let t0 = Tuple::new(vec![Value::Integer(1), Value::Varchar("x".into())]);
        let rid = heap.insert_tuple(&t0, &schema).unwrap();

        let updated = Tuple::new(vec![Value::Integer(99), Value::Varchar("x".into())]);
        assert!(heap.update_tuple(&updated, rid, &schema));
        let back = heap.get_tuple(rid, &schema).unwrap();
        assert_eq!(back.get(0).as_i64(), Some(99));
    }
}
