use crate::error::DbResult;
use crate::index::{BPlusTree, BTreeKey};
use crate::storage::TableHeap;
use crate::tuple::{Schema, Tuple};

use super::Executor;

/// The three access patterns described in spec §4.11.
#[derive(Debug, Clone, Copy)]
pub enum ScanBound {
    Point(BTreeKey),
    Range { start: Option<BTreeKey>, end: Option<BTreeKey> },
    Full,
}

pub struct IndexScanExecutor<'a> {
    tree: BPlusTree<'a>,
    heap: TableHeap<'a>,
    schema: Schema,
    bound: ScanBound,
    rids: Vec<crate::common::Rid>,
    cursor: usize,
}

impl<'a> IndexScanExecutor<'a> {
    pub fn new(tree: BPlusTree<'a>, heap: TableHeap<'a>, schema: Schema, bound: ScanBound) -> IndexScanExecutor<'a> {
        IndexScanExecutor {
            tree,
            heap,
            schema,
            bound,
            rids: Vec::new(),
            cursor: 0,
        }
    }
}

impl<'a> Executor for IndexScanExecutor<'a> {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn init(&mut self) -> DbResult<()> {
        self.rids = match self.bound {
            ScanBound::Point(key) => self.tree.find(key).into_iter().collect(),
            ScanBound::Range { start, end } => {
                let lo = start.unwrap_or(i64::MIN);
                let hi = end.unwrap_or(i64::MAX);
                self.tree.range_scan(lo, hi).into_iter().map(|(_, rid)| rid).collect()
            }
            ScanBound::Full => self.tree.iter().map(|(_, rid)| rid).collect(),
        };
        self.cursor = 0;
        Ok(())
    }

    fn next(&mut self) -> DbResult<Option<Tuple>> {
        while self.cursor < self.rids.len() {
            let rid = self.rids[self.cursor];
            self.cursor += 1;
            // A RID that no longer resolves means the tuple was deleted
            // since the index entry was written; skip it silently.
            if let Some(tuple) = self.heap.get_tuple(rid, &self.schema) {
                return Ok(Some(tuple));
            }
        }
        Ok(None)
    }
}
