//! MVCC snapshot filter: drops tuples the scanning transaction's snapshot
//! cannot see, per spec §4.13's visibility rule.

use crate::common::TxnId;
use crate::error::DbResult;
use crate::tuple::{Schema, Tuple};

use super::Executor;

pub struct VisibilityFilterExecutor<'a> {
    child: Box<dyn Executor + 'a>,
    reader: TxnId,
    reader_start_ts: u64,
}

impl<'a> VisibilityFilterExecutor<'a> {
    pub fn new(child: Box<dyn Executor + 'a>, reader: TxnId, reader_start_ts: u64) -> VisibilityFilterExecutor<'a> {
        VisibilityFilterExecutor { child, reader, reader_start_ts }
    }
}

impl<'a> Executor for VisibilityFilterExecutor<'a> {
    fn schema(&self) -> &Schema {
        self.child.schema()
    }

    fn init(&mut self) -> DbResult<()> {
        self.child.init()
    }

    fn next(&mut self) -> DbResult<Option<Tuple>> {
        while let Some(tuple) = self.child.next()? {
            if tuple.version.is_visible(self.reader, self.reader_start_ts) {
                return Ok(Some(tuple));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferPool;
    use crate::disk::DiskManager;
    use crate::execution::seq_scan::SeqScanExecutor;
    use crate::storage::TableHeap;
    use crate::tuple::{Column, TypeId, Value};
    use crate::transaction::VersionMeta;

    fn pool() -> BufferPool {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("visibility.db");
        std::mem::forget(dir);
        BufferPool::new(DiskManager::open(path, 4096).unwrap(), 16)
    }

    fn schema() -> Schema {
        Schema::new(vec![Column::new("id", TypeId::Integer)])
    }

    #[test]
    fn hides_uncommitted_insert_from_other_readers() {
        let pool = pool();
        let heap = TableHeap::create(&pool);
        let schema = schema();

        let mut own = Tuple::new(vec![Value::Integer(1)]);
        own.version = VersionMeta::init_version(5);
        heap.insert_tuple(&own, &schema);

        let mut committed = Tuple::new(vec![Value::Integer(2)]);
        committed.version = VersionMeta::init_version(4);
        committed.version.finalize_commit(4, 1);
        heap.insert_tuple(&committed, &schema);

        let scan = Box::new(SeqScanExecutor::new(heap, schema, None));
        let mut exec = VisibilityFilterExecutor::new(scan, 9, 2);
        exec.init().unwrap();
        let mut seen = Vec::new();
        while let Some(t) = exec.next().unwrap() {
            seen.push(t.get(0).as_i64().unwrap());
        }
        assert_eq!(seen, vec![2]);
    }
}
