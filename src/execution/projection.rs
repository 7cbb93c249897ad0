use crate::error::DbResult;
use crate::sql::Expr;
use crate::tuple::{Column, Schema, Tuple};

use super::Executor;

pub struct ProjectionExecutor<'a> {
    child: Box<dyn Executor + 'a>,
    exprs: Vec<Expr>,
    output_schema: Schema,
}

impl<'a> ProjectionExecutor<'a> {
    /// `names` supplies the output column name for each expression (the
    /// column's own name for a bare `ColumnRef`, or an explicit alias).
    pub fn new(child: Box<dyn Executor + 'a>, exprs: Vec<Expr>, names: Vec<String>) -> ProjectionExecutor<'a> {
        let columns = exprs
            .iter()
            .zip(names)
            .map(|(e, name)| Column::new(name, e.result_type().unwrap_or(crate::tuple::TypeId::Integer)))
            .collect();
        ProjectionExecutor {
            child,
            exprs,
            output_schema: Schema::new(columns),
        }
    }
}

impl<'a> Executor for ProjectionExecutor<'a> {
    fn schema(&self) -> &Schema {
        &self.output_schema
    }

    fn init(&mut self) -> DbResult<()> {
        self.child.init()
    }

    fn next(&mut self) -> DbResult<Option<Tuple>> {
        match self.child.next()? {
            Some(tuple) => {
                let values = self.exprs.iter().map(|e| e.evaluate(&tuple)).collect();
                Ok(Some(Tuple::new(values)))
            }
            None => Ok(None),
        }
    }
}
