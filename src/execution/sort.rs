use std::cmp::Ordering;

use crate::error::DbResult;
use crate::sql::ast::OrderDirection;
use crate::sql::Expr;
use crate::tuple::{Schema, Tuple};

use super::Executor;

pub struct SortExecutor<'a> {
    child: Box<dyn Executor + 'a>,
    keys: Vec<(Expr, OrderDirection)>,
    buffer: Vec<Tuple>,
    cursor: usize,
}

impl<'a> SortExecutor<'a> {
    pub fn new(child: Box<dyn Executor + 'a>, keys: Vec<(Expr, OrderDirection)>) -> SortExecutor<'a> {
        SortExecutor {
            child,
            keys,
            buffer: Vec::new(),
            cursor: 0,
        }
    }

    fn compare(keys: &[(Expr, OrderDirection)], a: &Tuple, b: &Tuple) -> Ordering {
        for (expr, dir) in keys {
            let va = expr.evaluate(a);
            let vb = expr.evaluate(b);
            let ord = match (va.is_null(), vb.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => {
                    return if *dir == OrderDirection::Asc { Ordering::Less } else { Ordering::Greater }
                }
                (false, true) => {
                    return if *dir == OrderDirection::Asc { Ordering::Greater } else { Ordering::Less }
                }
                (false, false) => va.sql_cmp(&vb).unwrap_or(Ordering::Equal),
            };
            let ord = if *dir == OrderDirection::Desc { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

impl<'a> Executor for SortExecutor<'a> {
    fn schema(&self) -> &Schema {
        self.child.schema()
    }

    fn init(&mut self) -> DbResult<()> {
        self.child.init()?;
        self.buffer.clear();
        while let Some(tuple) = self.child.next()? {
            self.buffer.push(tuple);
        }
        let keys = &self.keys;
        self.buffer.sort_by(|a, b| Self::compare(keys, a, b));
        self.cursor = 0;
        Ok(())
    }

    fn next(&mut self) -> DbResult<Option<Tuple>> {
        if self.cursor >= self.buffer.len() {
            return Ok(None);
        }
        let tuple = self.buffer[self.cursor].clone();
        self.cursor += 1;
        Ok(Some(tuple))
    }
}
