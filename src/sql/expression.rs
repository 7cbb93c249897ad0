//! Typed expression tree with three-valued (NULL-propagating) evaluation.
//!
//! Column references carry a pre-bind `name` and a post-bind `index`; the
//! binder fills in `index` (and folds constant types) in place rather than
//! building a second, separately-typed tree.

use crate::tuple::{Tuple, TypeId, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Not,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Constant(Value),
    /// Unbound column reference: `table` is `Some` for a qualified `t.col`.
    ColumnRef {
        table: Option<String>,
        column: String,
        /// Filled in by the binder; `usize::MAX` until then.
        index: usize,
        ty: Option<TypeId>,
    },
    BinaryOp {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Comparison {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        /// `None` for unary NOT.
        right: Option<Box<Expr>>,
    },
    /// `expr IS [NOT] NULL`.
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
}

pub const UNBOUND: usize = usize::MAX;

impl Expr {
    pub fn column(name: impl Into<String>) -> Expr {
        Expr::ColumnRef {
            table: None,
            column: name.into(),
            index: UNBOUND,
            ty: None,
        }
    }

    pub fn qualified_column(table: impl Into<String>, name: impl Into<String>) -> Expr {
        Expr::ColumnRef {
            table: Some(table.into()),
            column: name.into(),
            index: UNBOUND,
            ty: None,
        }
    }

    /// Evaluates against a single input tuple (no join context).
    pub fn evaluate(&self, tuple: &Tuple) -> Value {
        match self {
            Expr::Constant(v) => v.clone(),
            Expr::ColumnRef { index, ty, .. } => {
                if *index == UNBOUND || *index >= tuple.values.len() {
                    return Value::Null(ty.unwrap_or(TypeId::Integer));
                }
                tuple.get(*index).clone()
            }
            Expr::BinaryOp { op, left, right } => {
                eval_binary(*op, &left.evaluate(tuple), &right.evaluate(tuple))
            }
            Expr::Comparison { op, left, right } => {
                bool_to_value(eval_comparison(*op, &left.evaluate(tuple), &right.evaluate(tuple)))
            }
            Expr::Logical { op, left, right } => {
                let lv = tri_bool(&left.evaluate(tuple));
                match op {
                    LogicalOp::Not => bool_to_value(lv.map(|b| !b)),
                    LogicalOp::And => {
                        let rv = tri_bool(&right.as_ref().unwrap().evaluate(tuple));
                        bool_to_value(tri_and(lv, rv))
                    }
                    LogicalOp::Or => {
                        let rv = tri_bool(&right.as_ref().unwrap().evaluate(tuple));
                        bool_to_value(tri_or(lv, rv))
                    }
                }
            }
            Expr::IsNull { expr, negated } => {
                let is_null = expr.evaluate(tuple).is_null();
                Value::Boolean(is_null != *negated)
            }
        }
    }

    /// Result type, when staticly known (constants and bound columns only).
    pub fn result_type(&self) -> Option<TypeId> {
        match self {
            Expr::Constant(v) => Some(v.type_id()),
            Expr::ColumnRef { ty, .. } => *ty,
            Expr::Comparison { .. } | Expr::Logical { .. } | Expr::IsNull { .. } => {
                Some(TypeId::Boolean)
            }
            Expr::BinaryOp { left, right, .. } => {
                let lt = left.result_type()?;
                let rt = right.result_type()?;
                Some(if lt.is_float_family() || rt.is_float_family() {
                    TypeId::Double
                } else {
                    TypeId::BigInt
                })
            }
        }
    }
}

fn bool_to_value(b: Option<bool>) -> Value {
    match b {
        Some(b) => Value::Boolean(b),
        None => Value::Null(TypeId::Boolean),
    }
}

fn tri_bool(v: &Value) -> Option<bool> {
    v.as_bool()
}

fn tri_and(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (Some(false), _) | (_, Some(false)) => Some(false),
        (Some(true), Some(true)) => Some(true),
        _ => None,
    }
}

fn tri_or(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (Some(true), _) | (_, Some(true)) => Some(true),
        (Some(false), Some(false)) => Some(false),
        _ => None,
    }
}

fn eval_comparison(op: CompareOp, a: &Value, b: &Value) -> Option<bool> {
    use std::cmp::Ordering;
    match op {
        CompareOp::Eq => a.sql_eq(b),
        CompareOp::Ne => a.sql_eq(b).map(|e| !e),
        CompareOp::Lt => a.sql_cmp(b).map(|o| o == Ordering::Less),
        CompareOp::Le => a.sql_cmp(b).map(|o| o != Ordering::Greater),
        CompareOp::Gt => a.sql_cmp(b).map(|o| o == Ordering::Greater),
        CompareOp::Ge => a.sql_cmp(b).map(|o| o != Ordering::Less),
    }
}

fn eval_binary(op: BinaryOp, a: &Value, b: &Value) -> Value {
    if a.is_null() || b.is_null() {
        let ty = a.type_id();
        return Value::Null(if ty.is_float_family() { ty } else { b.type_id() });
    }
    let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) else {
        return Value::Null(TypeId::Double);
    };
    let use_double = a.type_id().is_float_family() || b.type_id().is_float_family();
    if op == BinaryOp::Div && y == 0.0 {
        return Value::Null(if use_double { TypeId::Double } else { TypeId::BigInt });
    }
    let result = match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::Div => x / y,
    };
    if use_double {
        Value::Double(result)
    } else {
        Value::BigInt(result as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple::Tuple;

    #[test]
    fn comparison_with_null_is_unknown() {
        let e = Expr::Comparison {
            op: CompareOp::Eq,
            left: Box::new(Expr::Constant(Value::Null(TypeId::Integer))),
            right: Box::new(Expr::Constant(Value::Integer(1))),
        };
        let t = Tuple::new(vec![]);
        assert!(e.evaluate(&t).is_null());
    }

    #[test]
    fn and_short_circuits_on_false() {
        let e = Expr::Logical {
            op: LogicalOp::And,
            left: Box::new(Expr::Constant(Value::Boolean(false))),
            right: Some(Box::new(Expr::Constant(Value::Null(TypeId::Boolean)))),
        };
        let t = Tuple::new(vec![]);
        assert_eq!(e.evaluate(&t).as_bool(), Some(false));
    }

    #[test]
    fn arithmetic_promotes_to_double() {
        let e = Expr::BinaryOp {
            op: BinaryOp::Add,
            left: Box::new(Expr::Constant(Value::Integer(1))),
            right: Box::new(Expr::Constant(Value::Double(2.5))),
        };
        let t = Tuple::new(vec![]);
        assert_eq!(e.evaluate(&t).as_f64(), Some(3.5));
    }

    #[test]
    fn division_by_zero_yields_null() {
        let e = Expr::BinaryOp {
            op: BinaryOp::Div,
            left: Box::new(Expr::Constant(Value::Integer(5))),
            right: Box::new(Expr::Constant(Value::Integer(0))),
        };
        let t = Tuple::new(vec![]);
        assert!(e.evaluate(&t).is_null());
    }

    #[test]
    fn is_null_and_is_not_null() {
        let t = Tuple::new(vec![]);
        let null = Expr::Constant(Value::Null(TypeId::Integer));
        assert_eq!(
            (Expr::IsNull { expr: Box::new(null.clone()), negated: false }).evaluate(&t).as_bool(),
            Some(true)
        );
        assert_eq!(
            (Expr::IsNull { expr: Box::new(null), negated: true }).evaluate(&t).as_bool(),
            Some(false)
        );
    }
}
