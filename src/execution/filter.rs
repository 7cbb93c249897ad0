use crate::error::DbResult;
use crate::sql::Expr;
use crate::tuple::{Schema, Tuple};

use super::Executor;

pub struct FilterExecutor<'a> {
    child: Box<dyn Executor + 'a>,
    predicate: Expr,
}

impl<'a> FilterExecutor<'a> {
    pub fn new(child: Box<dyn Executor + 'a>, predicate: Expr) -> FilterExecutor<'a> {
        FilterExecutor { child, predicate }
    }
}

impl<'a> Executor for FilterExecutor<'a> {
    fn schema(&self) -> &Schema {
        self.child.schema()
    }

    fn init(&mut self) -> DbResult<()> {
        self.child.init()
    }

    fn next(&mut self) -> DbResult<Option<Tuple>> {
        while let Some(tuple) = self.child.next()? {
            if self.predicate.evaluate(&tuple).as_bool() == Some(true) {
                return Ok(Some(tuple));
            }
        }
        Ok(None)
    }
}
