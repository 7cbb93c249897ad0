use crate::error::DbResult;
use crate::tuple::{Schema, Tuple};

use super::Executor;

pub struct LimitExecutor<'a> {
    child: Box<dyn Executor + 'a>,
    limit: Option<u64>,
    offset: u64,
    skipped: u64,
    emitted: u64,
}

impl<'a> LimitExecutor<'a> {
    pub fn new(child: Box<dyn Executor + 'a>, limit: Option<u64>, offset: Option<u64>) -> LimitExecutor<'a> {
        LimitExecutor {
            child,
            limit,
            offset: offset.unwrap_or(0),
            skipped: 0,
            emitted: 0,
        }
    }
}

impl<'a> Executor for LimitExecutor<'a> {
    fn schema(&self) -> &Schema {
        self.child.schema()
    }

    fn init(&mut self) -> DbResult<()> {
        self.skipped = 0;
        self.emitted = 0;
        self.child.init()
    }

    fn next(&mut self) -> DbResult<Option<Tuple>> {
        if let Some(limit) = self.limit {
            if self.emitted >= limit {
                return Ok(None);
            }
        }
        while self.skipped < self.offset {
            if self.child.next()?.is_none() {
                return Ok(None);
            }
            self.skipped += 1;
        }
        let next = self.child.next()?;
        if next.is_some() {
            self.emitted += 1;
        }
        Ok(next)
    }
}
