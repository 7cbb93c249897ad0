use crate::error::DbResult;
use crate::sql::Expr;
use crate::storage::{TableHeap, TableIterator};
use crate::tuple::{Schema, Tuple};

use super::Executor;

pub struct SeqScanExecutor<'a> {
    heap: TableHeap<'a>,
    schema: Schema,
    predicate: Option<Expr>,
    iter: Option<TableIterator<'a>>,
}

impl<'a> SeqScanExecutor<'a> {
    pub fn new(heap: TableHeap<'a>, schema: Schema, predicate: Option<Expr>) -> SeqScanExecutor<'a> {
        SeqScanExecutor {
            heap,
            schema,
            predicate,
            iter: None,
        }
    }
}

impl<'a> Executor for SeqScanExecutor<'a> {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn init(&mut self) -> DbResult<()> {
        self.iter = Some(self.heap.iter(self.schema.clone()));
        Ok(())
    }

    fn next(&mut self) -> DbResult<Option<Tuple>> {
        let iter = self.iter.as_mut().expect("init() not called");
        for tuple in iter {
            let passes = match &self.predicate {
                None => true,
                Some(expr) => expr.evaluate(&tuple).as_bool() == Some(true),
            };
            if passes {
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
    use crate::sql::expression::CompareOp;
    use crate::tuple::{Column, TypeId, Value};

    fn pool() -> BufferPool {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seqscan.db");
        std::mem::forget(dir);
        BufferPool::new(DiskManager::open(path, 4096).unwrap(), 16)
    }

    fn schema() -> Schema {
        Schema::new(vec![Column::new("id", TypeId::Integer)])
    }

    #[test]
    fn filters_with_predicate() {
        let pool = pool();
        let heap = TableHeap::create(&pool);
        let schema = schema();
        for i in 0..5 {
            heap.insert_tuple(&Tuple::new(vec![Value::Integer(i)]), &schema);
        }
        let predicate = Expr::Comparison {
            op: CompareOp::Gt,
            left: Box::new(Expr::ColumnRef { table: None, column: "id".into(), index: 0, ty: Some(TypeId::Integer) }),
            right: Box::new(Expr::Constant(Value::Integer(2))),
        };
        let mut exec = SeqScanExecutor::new(heap, schema, Some(predicate));
        exec.init().unwrap();
        let mut results = Vec::new();
        while let Some(t) = exec.next().unwrap() {
            results.push(t.get(0).as_i64().unwrap());
        }
        assert_eq!(results, vec![3, 4]);
    }
}
