//! Volcano-style (iterator-model) query executors.
//!
//! Every executor implements `init()`/`next()` rather than the stdlib
//! `Iterator` trait so that per-tuple and catastrophic errors are both
//! reported through `DbResult` (spec §4.11's error policy) instead of
//! forcing callers to unwrap or silently stop on `None`.

pub mod aggregation;
pub mod dml;
pub mod filter;
pub mod hash_join;
pub mod index_scan;
pub mod limit;
pub mod nested_loop_join;
pub mod projection;
pub mod seq_scan;
pub mod sort;
pub mod visibility;

pub use aggregation::{AggregateExpr, AggregateKind, AggregationExecutor};
pub use dml::{DeleteExecutor, InsertExecutor, UpdateExecutor};
pub use filter::FilterExecutor;
pub use hash_join::HashJoinExecutor;
pub use index_scan::{IndexScanExecutor, ScanBound};
pub use limit::LimitExecutor;
pub use nested_loop_join::NestedLoopJoinExecutor;
pub use projection::ProjectionExecutor;
pub use seq_scan::SeqScanExecutor;
pub use sort::SortExecutor;
pub use visibility::VisibilityFilterExecutor;

use crate::error::DbResult;
use crate::tuple::{Schema, Tuple, Value};

pub trait Executor {
    fn schema(&self) -> &Schema;
    fn init(&mut self) -> DbResult<()>;
    fn next(&mut self) -> DbResult<Option<Tuple>>;
}

/// Concatenates two tuples' values into one wide tuple (join output).
pub(crate) fn concat_tuples(left: &Tuple, right: &Tuple) -> Tuple {
    let mut values = left.values.clone();
    values.extend(right.values.iter().cloned());
    Tuple::new(values)
}

/// Pads `left` with `Null` values, one per column of `right_schema`, for an
/// outer-join row with no match on the other side.
pub(crate) fn null_extend(left: &Tuple, right_schema: &Schema) -> Tuple {
    let mut values = left.values.clone();
    values.extend(right_schema.columns.iter().map(|c| Value::Null(c.type_id)));
    Tuple::new(values)
}

pub(crate) fn nulls_for(schema: &Schema) -> Vec<Value> {
    schema.columns.iter().map(|c| Value::Null(c.type_id)).collect()
}
