use crate::error::DbResult;
use crate::sql::Expr;
use crate::storage::TableHeap;
use crate::tuple::{Column, Schema, Tuple, TypeId, Value};

use super::Executor;

fn affected_schema() -> Schema {
    Schema::new(vec![Column::new("affected_rows", TypeId::BigInt)])
}

/// Consumes a pre-built list of rows (already type-coerced by the binder)
/// and inserts them all on the first `next()` call. Emits no tuples; the
/// caller reads the row count back via `affected_rows()`.
pub struct InsertExecutor<'a> {
    heap: TableHeap<'a>,
    schema: Schema,
    rows: Vec<Tuple>,
    affected: u64,
    done: bool,
}

impl<'a> InsertExecutor<'a> {
    pub fn new(heap: TableHeap<'a>, schema: Schema, rows: Vec<Tuple>) -> InsertExecutor<'a> {
        InsertExecutor {
            heap,
            schema,
            rows,
            affected: 0,
            done: false,
        }
    }

    pub fn affected_rows(&self) -> u64 {
        self.affected
    }
}

impl<'a> Executor for InsertExecutor<'a> {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn init(&mut self) -> DbResult<()> {
        self.affected = 0;
        self.done = false;
        Ok(())
    }

    fn next(&mut self) -> DbResult<Option<Tuple>> {
        if self.done {
            return Ok(None);
        }
        for row in &self.rows {
            if self.heap.insert_tuple(row, &self.schema).is_some() {
                self.affected += 1;
            }
        }
        self.done = true;
        Ok(None)
    }
}

/// For each tuple the child yields, rebuilds a row with SET columns replaced
/// by their evaluated (and coerced) expressions, then rewrites it in place.
pub struct UpdateExecutor<'a> {
    child: Box<dyn Executor + 'a>,
    heap: TableHeap<'a>,
    schema: Schema,
    assignments: Vec<(usize, Expr)>,
    affected: u64,
}

impl<'a> UpdateExecutor<'a> {
    pub fn new(
        child: Box<dyn Executor + 'a>,
        heap: TableHeap<'a>,
        schema: Schema,
        assignments: Vec<(usize, Expr)>,
    ) -> UpdateExecutor<'a> {
        UpdateExecutor {
            child,
            heap,
            schema,
            assignments,
            affected: 0,
        }
    }

    pub fn affected_rows(&self) -> u64 {
        self.affected
    }
}

impl<'a> Executor for UpdateExecutor<'a> {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn init(&mut self) -> DbResult<()> {
        self.affected = 0;
        self.child.init()
    }

    fn next(&mut self) -> DbResult<Option<Tuple>> {
        while let Some(target) = self.child.next()? {
            let rid = target.rid;
            let mut values = target.values.clone();
            for (index, expr) in &self.assignments {
                let value = expr.evaluate(&target);
                let want_ty = self.schema.column(*index).type_id;
                values[*index] = value.coerce(want_ty).unwrap_or(Value::Null(want_ty));
            }
            let mut new_tuple = Tuple::new(values);
            new_tuple.version = target.version;
            if self.heap.update_tuple(&new_tuple, rid, &self.schema) {
                self.affected += 1;
            }
        }
        Ok(None)
    }
}

/// Deletes every row the child yields, counting successful removals.
pub struct DeleteExecutor<'a> {
    child: Box<dyn Executor + 'a>,
    heap: TableHeap<'a>,
    schema: Schema,
    affected: u64,
}

impl<'a> DeleteExecutor<'a> {
    pub fn new(child: Box<dyn Executor + 'a>, heap: TableHeap<'a>, schema: Schema) -> DeleteExecutor<'a> {
        DeleteExecutor {
            child,
            heap,
            schema,
            affected: 0,
        }
    }

    pub fn affected_rows(&self) -> u64 {
        self.affected
    }
}

impl<'a> Executor for DeleteExecutor<'a> {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn init(&mut self) -> DbResult<()> {
        self.affected = 0;
        self.child.init()
    }

    fn next(&mut self) -> DbResult<Option<Tuple>> {
        while let Some(target) = self.child.next()? {
            if self.heap.delete_tuple(target.rid) {
                self.affected += 1;
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

    fn pool() -> BufferPool {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dml.db");
        std::mem::forget(dir);
        BufferPool::new(DiskManager::open(path, 4096).unwrap(), 16)
    }

    fn schema() -> Schema {
        Schema::new(vec![Column::new("id", TypeId::Integer), Column::new("v", TypeId::Integer)])
    }

    #[test]
    fn insert_then_scan() {
        let pool = pool();
        let heap = TableHeap::create(&pool);
        let schema = schema();
        let rows = vec![
            Tuple::new(vec![Value::Integer(1), Value::Integer(10)]),
            Tuple::new(vec![Value::Integer(2), Value::Integer(20)]),
        ];
        let mut ins = InsertExecutor::new(heap, schema.clone(), rows);
        ins.init().unwrap();
        ins.next().unwrap();
        assert_eq!(ins.affected_rows(), 2);

        let mut scan = SeqScanExecutor::new(heap, schema, None);
        scan.init().unwrap();
        let mut count = 0;
        while scan.next().unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 2);
    }

    #[test]
    fn delete_removes_rows() {
        let pool = pool();
        let heap = TableHeap::create(&pool);
        let schema = schema();
        heap.insert_tuple(&Tuple::new(vec![Value::Integer(1), Value::Integer(10)]), &schema);
        heap.insert_tuple(&Tuple::new(vec![Value::Integer(2), Value::Integer(20)]), &schema);

        let scan = Box::new(SeqScanExecutor::new(heap, schema.clone(), None));
        let mut del = DeleteExecutor::new(scan, heap, affected_schema());
        del.init().unwrap();
        del.next().unwrap();
        assert_eq!(del.affected_rows(), 2);

        let mut rescan = SeqScanExecutor::new(heap, schema, None);
        rescan.init().unwrap();
        assert!(rescan.next().unwrap().is_none());
    }
}
