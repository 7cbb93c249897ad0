use std::collections::HashMap;

use crate::error::DbResult;
use crate::sql::Expr;
use crate::tuple::{Column, Schema, Tuple, TypeId, Value};

use super::Executor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateKind {
    CountStar,
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

#[derive(Debug, Clone)]
pub struct AggregateExpr {
    pub kind: AggregateKind,
    /// `None` only for `COUNT(*)`.
    pub expr: Option<Expr>,
    pub output_name: String,
}

#[derive(Clone)]
struct Accumulator {
    count: i64,
    sum: f64,
    min: Option<Value>,
    max: Option<Value>,
    has_value: bool,
}

impl Accumulator {
    fn new() -> Accumulator {
        Accumulator { count: 0, sum: 0.0, min: None, max: None, has_value: false }
    }

    fn update(&mut self, kind: AggregateKind, value: Option<Value>) {
        match kind {
            AggregateKind::CountStar => self.count += 1,
            AggregateKind::Count => {
                if value.as_ref().map(|v| !v.is_null()).unwrap_or(false) {
                    self.count += 1;
                }
            }
            AggregateKind::Sum | AggregateKind::Avg => {
                if let Some(v) = value.as_ref().filter(|v| !v.is_null()).and_then(Value::as_f64) {
                    self.sum += v;
                    self.count += 1;
                    self.has_value = true;
                }
            }
            AggregateKind::Min => {
                if let Some(v) = value.filter(|v| !v.is_null()) {
                    let take = match &self.min {
                        None => true,
                        Some(cur) => v.sql_cmp(cur) == Some(std::cmp::Ordering::Less),
                    };
                    if take {
                        self.min = Some(v);
                    }
                    self.has_value = true;
                }
            }
            AggregateKind::Max => {
                if let Some(v) = value.filter(|v| !v.is_null()) {
                    let take = match &self.max {
                        None => true,
                        Some(cur) => v.sql_cmp(cur) == Some(std::cmp::Ordering::Greater),
                    };
                    if take {
                        self.max = Some(v);
                    }
                    self.has_value = true;
                }
            }
        }
    }

    fn finalize(&self, kind: AggregateKind, out_type: TypeId) -> Value {
        match kind {
            AggregateKind::CountStar | AggregateKind::Count => Value::BigInt(self.count),
            AggregateKind::Sum => {
                if !self.has_value {
                    Value::Null(out_type)
                } else if out_type == TypeId::Double {
                    Value::Double(self.sum)
                } else {
                    Value::BigInt(self.sum as i64)
                }
            }
            AggregateKind::Avg => {
                if !self.has_value || self.count == 0 {
                    Value::Null(TypeId::Double)
                } else {
                    Value::Double(self.sum / self.count as f64)
                }
            }
            AggregateKind::Min => self.min.clone().unwrap_or(Value::Null(out_type)),
            AggregateKind::Max => self.max.clone().unwrap_or(Value::Null(out_type)),
        }
    }
}

/// `Value` isn't `Hash`/`Eq`; group keys are reduced to their display form,
/// which is adequate for the fixed scalar types this engine supports.
fn group_key(values: &[Value]) -> String {
    values.iter().map(|v| v.to_string()).collect::<Vec<_>>().join("\u{1}")
}

pub struct AggregationExecutor<'a> {
    child: Box<dyn Executor + 'a>,
    group_by: Vec<Expr>,
    aggregates: Vec<AggregateExpr>,
    schema: Schema,

    groups: HashMap<String, (Vec<Value>, Vec<Accumulator>)>,
    order: Vec<String>,
    cursor: usize,
    initialized: bool,
}

impl<'a> AggregationExecutor<'a> {
    pub fn new(child: Box<dyn Executor + 'a>, group_by: Vec<Expr>, aggregates: Vec<AggregateExpr>) -> AggregationExecutor<'a> {
        let mut columns: Vec<Column> = group_by
            .iter()
            .enumerate()
            .map(|(i, e)| Column::new(format!("group_{}", i), e.result_type().unwrap_or(TypeId::Integer)))
            .collect();
        for agg in &aggregates {
            let ty = match agg.kind {
                AggregateKind::CountStar | AggregateKind::Count => TypeId::BigInt,
                AggregateKind::Avg => TypeId::Double,
                AggregateKind::Sum => {
                    let inner = agg.expr.as_ref().and_then(|e| e.result_type()).unwrap_or(TypeId::BigInt);
                    if inner.is_float_family() { TypeId::Double } else { TypeId::BigInt }
                }
                AggregateKind::Min | AggregateKind::Max => {
                    agg.expr.as_ref().and_then(|e| e.result_type()).unwrap_or(TypeId::BigInt)
                }
            };
            columns.push(Column::new(agg.output_name.clone(), ty));
        }
        AggregationExecutor {
            child,
            group_by,
            aggregates,
            schema: Schema::new(columns),
            groups: HashMap::new(),
            order: Vec::new(),
            cursor: 0,
            initialized: false,
        }
    }
}

impl<'a> Executor for AggregationExecutor<'a> {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn init(&mut self) -> DbResult<()> {
        self.child.init()?;
        self.groups.clear();
        self.order.clear();
        self.cursor = 0;

        while let Some(tuple) = self.child.next()? {
            let key_values: Vec<Value> = self.group_by.iter().map(|e| e.evaluate(&tuple)).collect();
            let key = group_key(&key_values);
            if !self.groups.contains_key(&key) {
                self.order.push(key.clone());
                let accs = self.aggregates.iter().map(|_| Accumulator::new()).collect();
                self.groups.insert(key.clone(), (key_values.clone(), accs));
            }
            let (_, accs) = self.groups.get_mut(&key).unwrap();
            for (acc, agg) in accs.iter_mut().zip(&self.aggregates) {
                let value = agg.expr.as_ref().map(|e| e.evaluate(&tuple));
                acc.update(agg.kind, value);
            }
        }

        // Empty input with no grouping still yields one row (COUNT(*) = 0).
        if self.order.is_empty() && self.group_by.is_empty() {
            let accs = self.aggregates.iter().map(|_| Accumulator::new()).collect();
            self.groups.insert(String::new(), (Vec::new(), accs));
            self.order.push(String::new());
        }
        self.initialized = true;
        Ok(())
    }

    fn next(&mut self) -> DbResult<Option<Tuple>> {
        if !self.initialized || self.cursor >= self.order.len() {
            return Ok(None);
        }
        let key = &self.order[self.cursor];
        self.cursor += 1;
        let (group_values, accs) = self.groups.get(key).unwrap();
        let mut values = group_values.clone();
        for (acc, agg) in accs.iter().zip(&self.aggregates) {
            let out_type = self.schema.column(values.len()).type_id;
            values.push(acc.finalize(agg.kind, out_type));
        }
        Ok(Some(Tuple::new(values)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::seq_scan::SeqScanExecutor;
    use crate::storage::TableHeap;
    use crate::buffer::BufferPool;
    use crate::disk::DiskManager;
    use crate::tuple::Column as Col;

    fn pool() -> BufferPool {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agg.db");
        std::mem::forget(dir);
        BufferPool::new(DiskManager::open(path, 4096).unwrap(), 16)
    }

    #[test]
    fn count_star_on_empty_input_yields_zero() {
        let pool = pool();
        let schema = Schema::new(vec![Col::new("id", TypeId::Integer)]);
        let heap = TableHeap::create(&pool);
        let scan = Box::new(SeqScanExecutor::new(heap, schema, None));
        let mut agg = AggregationExecutor::new(
            scan,
            vec![],
            vec![AggregateExpr { kind: AggregateKind::CountStar, expr: None, output_name: "n".into() }],
        );
        agg.init().unwrap();
        let row = agg.next().unwrap().unwrap();
        assert_eq!(row.get(0).as_i64(), Some(0));
        assert!(agg.next().unwrap().is_none());
    }

    #[test]
    fn sum_and_group_by() {
        let pool = pool();
        let schema = Schema::new(vec![Col::new("g", TypeId::Integer), Col::new("v", TypeId::Integer)]);
        let heap = TableHeap::create(&pool);
        for (g, v) in [(0, 1), (0, 2), (1, 10)] {
            heap.insert_tuple(&Tuple::new(vec![Value::Integer(g), Value::Integer(v)]), &schema);
        }
        let scan = Box::new(SeqScanExecutor::new(heap, schema, None));
        let group_col = Expr::ColumnRef { table: None, column: "g".into(), index: 0, ty: Some(TypeId::Integer) };
        let sum_col = Expr::ColumnRef { table: None, column: "v".into(), index: 1, ty: Some(TypeId::Integer) };
        let mut agg = AggregationExecutor::new(
            scan,
            vec![group_col],
            vec![AggregateExpr { kind: AggregateKind::Sum, expr: Some(sum_col), output_name: "total".into() }],
        );
        agg.init().unwrap();
        let mut totals = Vec::new();
        while let Some(row) = agg.next().unwrap() {
            totals.push(row.get(1).as_i64().unwrap());
        }
        totals.sort();
        assert_eq!(totals, vec![3, 10]);
    }
}
