use std::collections::HashMap;

use crate::error::DbResult;
use crate::sql::ast::JoinType;
use crate::sql::Expr;
use crate::tuple::{Schema, Tuple, Value};

use super::{concat_tuples, null_extend, Executor};

/// Equi-join on one key expression per side. Build phase drains `left` (the
/// build side) into a multimap in `init()`; probe phase streams `right`.
pub struct HashJoinExecutor<'a> {
    left: Box<dyn Executor + 'a>,
    right: Box<dyn Executor + 'a>,
    left_key: Expr,
    right_key: Expr,
    join_type: JoinType,
    schema: Schema,

    build: HashMap<HashKey, Vec<usize>>,
    build_rows: Vec<Tuple>,
    build_matched: Vec<bool>,

    probe_matches: Vec<usize>,
    probe_cursor: usize,
    current_probe: Option<Tuple>,
    probe_had_match: bool,
    draining_unmatched_build: bool,
    unmatched_cursor: usize,
}

/// `Value` doesn't implement `Hash`/`Eq` (NULL and float semantics don't
/// support it); keys are reduced to a small hashable projection instead.
/// NULL never matches anything, so it's excluded from the map entirely.
#[derive(PartialEq, Eq, Hash, Clone)]
enum HashKey {
    Int(i64),
    Str(String),
    Bool(bool),
}

fn hash_key(v: &Value) -> Option<HashKey> {
    match v {
        Value::Null(_) => None,
        Value::Varchar(s) => Some(HashKey::Str(s.clone())),
        Value::Boolean(b) => Some(HashKey::Bool(*b)),
        other => other.as_i64().map(HashKey::Int),
    }
}

impl<'a> HashJoinExecutor<'a> {
    pub fn new(
        left: Box<dyn Executor + 'a>,
        right: Box<dyn Executor + 'a>,
        left_key: Expr,
        right_key: Expr,
        join_type: JoinType,
    ) -> HashJoinExecutor<'a> {
        let mut columns = left.schema().columns.clone();
        columns.extend(right.schema().columns.clone());
        HashJoinExecutor {
            left,
            right,
            left_key,
            right_key,
            join_type,
            schema: Schema::new(columns),
            build: HashMap::new(),
            build_rows: Vec::new(),
            build_matched: Vec::new(),
            probe_matches: Vec::new(),
            probe_cursor: 0,
            current_probe: None,
            probe_had_match: false,
            draining_unmatched_build: false,
            unmatched_cursor: 0,
        }
    }
}

impl<'a> Executor for HashJoinExecutor<'a> {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn init(&mut self) -> DbResult<()> {
        self.left.init()?;
        self.build.clear();
        self.build_rows.clear();
        while let Some(tuple) = self.left.next()? {
            let key = hash_key(&self.left_key.evaluate(&tuple));
            let idx = self.build_rows.len();
            self.build_rows.push(tuple);
            if let Some(key) = key {
                self.build.entry(key).or_default().push(idx);
            }
        }
        self.build_matched = vec![false; self.build_rows.len()];

        self.right.init()?;
        self.current_probe = self.right.next()?;
        self.probe_matches.clear();
        self.probe_cursor = 0;
        self.probe_had_match = false;
        self.draining_unmatched_build = false;
        self.unmatched_cursor = 0;
        Ok(())
    }

    fn next(&mut self) -> DbResult<Option<Tuple>> {
        loop {
            if self.draining_unmatched_build {
                while self.unmatched_cursor < self.build_rows.len() {
                    let idx = self.unmatched_cursor;
                    self.unmatched_cursor += 1;
                    if !self.build_matched[idx] {
                        return Ok(Some(null_extend(&self.build_rows[idx], self.right.schema())));
                    }
                }
                return Ok(None);
            }

            let probe = match &self.current_probe {
                Some(t) => t.clone(),
                None => {
                    if self.join_type == JoinType::Right {
                        self.draining_unmatched_build = true;
                        continue;
                    }
                    return Ok(None);
                }
            };

            if self.probe_cursor == 0 && self.probe_matches.is_empty() {
                let key = hash_key(&self.right_key.evaluate(&probe));
                self.probe_matches = key.and_then(|k| self.build.get(&k)).cloned().unwrap_or_default();
            }

            if self.probe_cursor < self.probe_matches.len() {
                let idx = self.probe_matches[self.probe_cursor];
                self.probe_cursor += 1;
                self.probe_had_match = true;
                self.build_matched[idx] = true;
                return Ok(Some(concat_tuples(&self.build_rows[idx], &probe)));
            }

            let emit_unmatched_probe = self.join_type == JoinType::Left && !self.probe_had_match;
            self.current_probe = self.right.next()?;
            self.probe_matches.clear();
            self.probe_cursor = 0;
            self.probe_had_match = false;
            if emit_unmatched_probe {
                return Ok(Some(null_extend_probe(&probe, self.left.schema())));
            }
        }
    }
}

/// For a LEFT HASH JOIN (left = build side) the *probe* side is the right
/// child, so an unmatched probe row must be null-extended on the *left*
/// (prefix) rather than the right (suffix) — the mirror image of the
/// ordinary outer-join helper.
fn null_extend_probe(probe: &Tuple, left_schema: &Schema) -> Tuple {
    let mut values = super::nulls_for(left_schema);
    values.extend(probe.values.clone());
    Tuple::new(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::seq_scan::SeqScanExecutor;
    use crate::storage::TableHeap;
    use crate::buffer::BufferPool;
    use crate::disk::DiskManager;
    use crate::tuple::{Column, TypeId};

    fn pool() -> BufferPool {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hj.db");
        std::mem::forget(dir);
        BufferPool::new(DiskManager::open(path, 4096).unwrap(), 32)
    }

    #[test]
    fn inner_equi_join() {
        let pool = pool();
        let left_schema = Schema::new(vec![Column::new("id", TypeId::Integer)]);
        let right_schema = Schema::new(vec![Column::new("lid", TypeId::Integer), Column::new("v", TypeId::Integer)]);
        let left_heap = TableHeap::create(&pool);
        let right_heap = TableHeap::create(&pool);
        for i in 0..3 {
            left_heap.insert_tuple(&Tuple::new(vec![Value::Integer(i)]), &left_schema);
        }
        for i in 0..3 {
            right_heap.insert_tuple(
                &Tuple::new(vec![Value::Integer(i), Value::Integer(i * 10)]),
                &right_schema,
            );
        }
        let left = Box::new(SeqScanExecutor::new(left_heap, left_schema.clone(), None));
        let right = Box::new(SeqScanExecutor::new(right_heap, right_schema.clone(), None));
        let left_key = Expr::ColumnRef { table: None, column: "id".into(), index: 0, ty: Some(TypeId::Integer) };
        let right_key = Expr::ColumnRef { table: None, column: "lid".into(), index: 0, ty: Some(TypeId::Integer) };
        let mut exec = HashJoinExecutor::new(left, right, left_key, right_key, JoinType::Inner);
        exec.init().unwrap();
        let mut rows = 0;
        while exec.next().unwrap().is_some() {
            rows += 1;
        }
        assert_eq!(rows, 3);
    }
}
