//! Cost-based access-method selection and EXPLAIN rendering.
//!
//! The planner doesn't build executors itself — it decides, per scanned
//! table, whether a sequential or index scan is cheaper and describes the
//! resulting shape textually. The database layer turns that decision into
//! actual `Executor`s once it has buffer-pool/table-heap handles in hand.

use crate::catalog::Catalog;
use crate::common::Oid;
use crate::sql::ast::{OrderByItem, OrderDirection, SelectStatement};
use crate::sql::expression::{CompareOp, Expr};
use crate::statistics::Statistics;

/// Tunable unit costs, overridable for tests; defaults pulled straight from
/// spec's cost model constants.
#[derive(Debug, Clone, Copy)]
pub struct CostModel {
    pub c_io: f64,
    pub c_cpu: f64,
    pub c_idx: f64,
}

impl Default for CostModel {
    fn default() -> CostModel {
        CostModel { c_io: 1.0, c_cpu: 0.01, c_idx: 0.5 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMethod {
    SequentialScan,
    IndexPointLookup,
    IndexRangeScan,
}

#[derive(Debug, Clone)]
pub enum PlanNode {
    Scan {
        table: String,
        table_oid: Oid,
        method: AccessMethod,
        key_column: Option<usize>,
        estimated_rows: u64,
    },
    Filter {
        input: Box<PlanNode>,
        estimated_rows: u64,
    },
    Projection {
        input: Box<PlanNode>,
    },
    Sort {
        input: Box<PlanNode>,
    },
    Limit {
        input: Box<PlanNode>,
        limit: u64,
    },
    NestedLoopJoin {
        left: Box<PlanNode>,
        right: Box<PlanNode>,
    },
    HashJoin {
        left: Box<PlanNode>,
        right: Box<PlanNode>,
    },
}

impl PlanNode {
    pub fn estimated_rows(&self) -> u64 {
        match self {
            PlanNode::Scan { estimated_rows, .. } => *estimated_rows,
            PlanNode::Filter { estimated_rows, .. } => *estimated_rows,
            PlanNode::Projection { input } | PlanNode::Sort { input } => input.estimated_rows(),
            PlanNode::Limit { input, limit } => (*limit).min(input.estimated_rows()),
            PlanNode::NestedLoopJoin { left, right } | PlanNode::HashJoin { left, right } => {
                left.estimated_rows().saturating_mul(right.estimated_rows()).max(1)
            }
        }
    }

    /// Exact phrase forms from the external-interface spec.
    pub fn explain(&self) -> String {
        let mut lines = Vec::new();
        self.explain_into(&mut lines, 0);
        lines.join("\n")
    }

    fn explain_into(&self, lines: &mut Vec<String>, depth: usize) {
        let indent = "  ".repeat(depth);
        match self {
            PlanNode::Scan { table, method, estimated_rows, .. } => {
                let head = match method {
                    AccessMethod::SequentialScan => format!("Sequential Scan on {}", table),
                    AccessMethod::IndexPointLookup => "Index Scan (Point Lookup)".to_string(),
                    AccessMethod::IndexRangeScan => "Index Scan (Range Scan)".to_string(),
                };
                lines.push(format!("{}{}", indent, head));
                lines.push(format!("{}  Estimated Rows: {}", indent, estimated_rows));
            }
            PlanNode::Filter { input, estimated_rows } => {
                lines.push(format!("{}Filter:", indent));
                input.explain_into(lines, depth + 1);
                lines.push(format!("{}  Estimated Rows: {}", indent, estimated_rows));
            }
            PlanNode::Projection { input } => {
                lines.push(format!("{}Projection", indent));
                input.explain_into(lines, depth + 1);
            }
            PlanNode::Sort { input } => {
                lines.push(format!("{}Sort", indent));
                input.explain_into(lines, depth + 1);
            }
            PlanNode::Limit { input, limit } => {
                lines.push(format!("{}Limit {}", indent, limit));
                input.explain_into(lines, depth + 1);
            }
            PlanNode::NestedLoopJoin { left, right } => {
                lines.push(format!("{}Nested Loop Join", indent));
                left.explain_into(lines, depth + 1);
                right.explain_into(lines, depth + 1);
            }
            PlanNode::HashJoin { left, right } => {
                lines.push(format!("{}Hash Join", indent));
                left.explain_into(lines, depth + 1);
                right.explain_into(lines, depth + 1);
            }
        }
    }
}

/// A predicate's shape, as far as the index selector cares: does it pin a
/// column to an exact value, or bound it within a range.
enum PredicateShape {
    Equality { column: usize },
    Range { column: usize },
    Unindexable,
}

fn classify(expr: &Expr) -> PredicateShape {
    match expr {
        Expr::Comparison { op, left, right } => {
            let column = match (left.as_ref(), right.as_ref()) {
                (Expr::ColumnRef { index, .. }, Expr::Constant(_)) => Some(*index),
                (Expr::Constant(_), Expr::ColumnRef { index, .. }) => Some(*index),
                _ => None,
            };
            match (column, op) {
                (Some(c), CompareOp::Eq) => PredicateShape::Equality { column: c },
                (Some(c), CompareOp::Lt | CompareOp::Le | CompareOp::Gt | CompareOp::Ge) => {
                    PredicateShape::Range { column: c }
                }
                _ => PredicateShape::Unindexable,
            }
        }
        Expr::Logical { op: crate::sql::expression::LogicalOp::And, left, .. } => classify(left),
        _ => PredicateShape::Unindexable,
    }
}

pub struct Planner<'a> {
    catalog: &'a Catalog,
    stats: &'a Statistics,
    cost_model: CostModel,
}

impl<'a> Planner<'a> {
    pub fn new(catalog: &'a Catalog, stats: &'a Statistics) -> Planner<'a> {
        Planner { catalog, stats, cost_model: CostModel::default() }
    }

    pub fn with_cost_model(mut self, cost_model: CostModel) -> Planner<'a> {
        self.cost_model = cost_model;
        self
    }

    /// Picks the cheaper access method for scanning `table` given an
    /// optional filter predicate, per the cost formulas:
    /// `seq_scan_cost = page_count*c_io + row_count*c_cpu`,
    /// `index_cost = log(row_count)*c_idx + selectivity*row_count*(c_io+c_cpu)`.
    pub fn plan_scan(&self, table: &str, filter: Option<&Expr>) -> Option<PlanNode> {
        let info = self.catalog.get_table_by_name(table)?;
        let stats = self.stats.get_table_stats(info.oid);
        let row_count = stats.row_count.max(1) as f64;
        let seq_cost = stats.page_count as f64 * self.cost_model.c_io + row_count * self.cost_model.c_cpu;

        let shape = filter.map(classify).unwrap_or(PredicateShape::Unindexable);
        let indexed = match &shape {
            PredicateShape::Equality { column } | PredicateShape::Range { column } => {
                self.catalog.index_on_column(info.oid, *column)
            }
            PredicateShape::Unindexable => None,
        };

        let plan = match (indexed, &shape) {
            (Some(_), PredicateShape::Equality { column }) => {
                let selectivity = self.stats.estimate_selectivity(true, false);
                let index_cost =
                    row_count.ln().max(0.0) * self.cost_model.c_idx + selectivity * row_count * (self.cost_model.c_io + self.cost_model.c_cpu);
                if index_cost < seq_cost {
                    PlanNode::Scan {
                        table: table.to_string(),
                        table_oid: info.oid,
                        method: AccessMethod::IndexPointLookup,
                        key_column: Some(*column),
                        estimated_rows: (row_count * selectivity).ceil().max(1.0) as u64,
                    }
                } else {
                    self.seq_scan_plan(table, info.oid, stats.row_count)
                }
            }
            (Some(_), PredicateShape::Range { column }) => {
                let selectivity = self.stats.estimate_selectivity(false, true);
                let index_cost =
                    row_count.ln().max(0.0) * self.cost_model.c_idx + selectivity * row_count * (self.cost_model.c_io + self.cost_model.c_cpu);
                if index_cost < seq_cost {
                    PlanNode::Scan {
                        table: table.to_string(),
                        table_oid: info.oid,
                        method: AccessMethod::IndexRangeScan,
                        key_column: Some(*column),
                        estimated_rows: (row_count * selectivity).ceil().max(1.0) as u64,
                    }
                } else {
                    self.seq_scan_plan(table, info.oid, stats.row_count)
                }
            }
            _ => self.seq_scan_plan(table, info.oid, stats.row_count),
        };
        Some(plan)
    }

    fn seq_scan_plan(&self, table: &str, table_oid: Oid, row_count: u64) -> PlanNode {
        PlanNode::Scan {
            table: table.to_string(),
            table_oid,
            method: AccessMethod::SequentialScan,
            key_column: None,
            estimated_rows: row_count,
        }
    }

    /// Wraps a scan plan with the rest of a SELECT's pipeline (filter,
    /// projection, sort, limit) purely for EXPLAIN purposes — the
    /// filter/projection/sort/limit decisions themselves are not
    /// cost-based, they're dictated directly by the statement.
    pub fn plan_select(&self, select: &SelectStatement, base: PlanNode) -> PlanNode {
        let mut node = base;
        if let Some(filter) = &select.filter {
            // An index scan already applied the pinned predicate; a
            // residual Filter node only matters when the scan was seq.
            if matches!(node, PlanNode::Scan { method: AccessMethod::SequentialScan, .. }) {
                let rows = self.estimate_filtered_rows(&node, filter);
                node = PlanNode::Filter { input: Box::new(node), estimated_rows: rows };
            }
        }
        node = PlanNode::Projection { input: Box::new(node) };
        if !select.order_by.is_empty() {
            node = PlanNode::Sort { input: Box::new(node) };
        }
        if select.limit.is_some() || select.offset.is_some() {
            node = PlanNode::Limit { input: Box::new(node), limit: select.limit.unwrap_or(u64::MAX) };
        }
        node
    }

    fn estimate_filtered_rows(&self, input: &PlanNode, filter: &Expr) -> u64 {
        let selectivity = match classify(filter) {
            PredicateShape::Equality { .. } => self.stats.estimate_selectivity(true, false),
            PredicateShape::Range { .. } => self.stats.estimate_selectivity(false, true),
            PredicateShape::Unindexable => 1.0,
        };
        ((input.estimated_rows() as f64) * selectivity).ceil().max(0.0) as u64
    }
}

/// Whether an ORDER BY clause is a single ascending key, the only shape a
/// B+-Tree's natural leaf order could satisfy without an explicit sort node.
pub fn order_matches_index(order: &[OrderByItem]) -> bool {
    order.len() == 1 && order[0].direction == OrderDirection::Asc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple::{Column, Schema, TypeId};

    fn setup() -> (Catalog, Statistics) {
        let catalog = Catalog::new();
        let stats = Statistics::new();
        let schema = Schema::new(vec![Column::new("id", TypeId::Integer), Column::new("v", TypeId::Integer)]);
        let oid = catalog.create_table("t", schema, 1).unwrap();
        catalog.create_index("t_id_idx", oid, 0, 2).unwrap();
        stats.on_table_created(oid);
        stats.on_rows_inserted(oid, 100_000);
        stats.collect_statistics(oid, 2000);
        (catalog, stats)
    }

    #[test]
    fn equality_on_indexed_column_prefers_index() {
        let (catalog, stats) = setup();
        let planner = Planner::new(&catalog, &stats);
        let filter = Expr::Comparison {
            op: CompareOp::Eq,
            left: Box::new(Expr::ColumnRef { table: None, column: "id".into(), index: 0, ty: Some(TypeId::Integer) }),
            right: Box::new(Expr::Constant(crate::tuple::Value::Integer(5))),
        };
        let plan = planner.plan_scan("t", Some(&filter)).unwrap();
        assert!(matches!(plan, PlanNode::Scan { method: AccessMethod::IndexPointLookup, .. }));
    }

    #[test]
    fn no_filter_uses_seq_scan() {
        let (catalog, stats) = setup();
        let planner = Planner::new(&catalog, &stats);
        let plan = planner.plan_scan("t", None).unwrap();
        assert!(matches!(plan, PlanNode::Scan { method: AccessMethod::SequentialScan, .. }));
    }

    #[test]
    fn explain_renders_expected_phrases() {
        let (catalog, stats) = setup();
        let planner = Planner::new(&catalog, &stats);
        let plan = planner.plan_scan("t", None).unwrap();
        let text = plan.explain();
        assert!(text.contains("Sequential Scan on t"));
        assert!(text.contains("Estimated Rows:"));
    }
}
