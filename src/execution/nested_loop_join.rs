use crate::error::DbResult;
use crate::sql::ast::JoinType;
use crate::sql::Expr;
use crate::tuple::{Schema, Tuple};

use super::{concat_tuples, null_extend, Executor};

/// `right` is rebuilt (re-`init`) per outer tuple, so it must be cheap to
/// re-initialize — typically a fresh `SeqScanExecutor`/`IndexScanExecutor`.
pub struct NestedLoopJoinExecutor<'a> {
    left: Box<dyn Executor + 'a>,
    right: Box<dyn Executor + 'a>,
    join_type: JoinType,
    on: Option<Expr>,
    schema: Schema,

    current_left: Option<Tuple>,
    left_matched: bool,

    // RIGHT join materializes the right side with a matched-bit vector,
    // since the outer loop structure (rebuild-inner-per-outer-tuple) can't
    // otherwise tell which right rows went unmatched.
    right_buffer: Vec<Tuple>,
    right_matched: Vec<bool>,
    unmatched_cursor: usize,
    probing_unmatched: bool,
}

impl<'a> NestedLoopJoinExecutor<'a> {
    pub fn new(
        left: Box<dyn Executor + 'a>,
        right: Box<dyn Executor + 'a>,
        join_type: JoinType,
        on: Option<Expr>,
    ) -> NestedLoopJoinExecutor<'a> {
        let mut columns = left.schema().columns.clone();
        columns.extend(right.schema().columns.clone());
        NestedLoopJoinExecutor {
            left,
            right,
            join_type,
            on,
            schema: Schema::new(columns),
            current_left: None,
            left_matched: false,
            right_buffer: Vec::new(),
            right_matched: Vec::new(),
            unmatched_cursor: 0,
            probing_unmatched: false,
        }
    }

    fn matches(&self, left: &Tuple, right: &Tuple) -> bool {
        match (&self.on, self.join_type) {
            (_, JoinType::Cross) => true,
            (None, _) => true,
            (Some(on), _) => on.evaluate(&concat_tuples(left, right)).as_bool() == Some(true),
        }
    }
}

impl<'a> Executor for NestedLoopJoinExecutor<'a> {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn init(&mut self) -> DbResult<()> {
        self.left.init()?;
        self.current_left = self.left.next()?;
        self.left_matched = false;
        self.right.init()?;
        self.probing_unmatched = false;
        self.unmatched_cursor = 0;

        if self.join_type == JoinType::Right {
            self.right_buffer.clear();
            while let Some(t) = self.right.next()? {
                self.right_buffer.push(t);
            }
            self.right_matched = vec![false; self.right_buffer.len()];
        }
        Ok(())
    }

    fn next(&mut self) -> DbResult<Option<Tuple>> {
        loop {
            if self.join_type == JoinType::Right {
                return self.next_right_driven();
            }

            let left = match &self.current_left {
                Some(t) => t.clone(),
                None => return Ok(None),
            };

            loop {
                match self.right.next()? {
                    Some(right) => {
                        if self.matches(&left, &right) {
                            self.left_matched = true;
                            return Ok(Some(concat_tuples(&left, &right)));
                        }
                    }
                    None => break,
                }
            }

            let emit_unmatched = self.join_type == JoinType::Left && !self.left_matched;
            self.current_left = self.left.next()?;
            self.left_matched = false;
            self.right.init()?;
            if emit_unmatched {
                return Ok(Some(null_extend(&left, self.right.schema())));
            }
        }
    }
}

impl<'a> NestedLoopJoinExecutor<'a> {
    fn next_right_driven(&mut self) -> DbResult<Option<Tuple>> {
        loop {
            if self.probing_unmatched {
                while self.unmatched_cursor < self.right_buffer.len() {
                    let idx = self.unmatched_cursor;
                    self.unmatched_cursor += 1;
                    if !self.right_matched[idx] {
                        let mut values = super::nulls_for(self.left.schema());
                        values.extend(self.right_buffer[idx].values.clone());
                        return Ok(Some(Tuple::new(values)));
                    }
                }
                return Ok(None);
            }

            let left = match &self.current_left {
                Some(t) => t.clone(),
                None => {
                    self.probing_unmatched = true;
                    continue;
                }
            };

            while self.unmatched_cursor < self.right_buffer.len() {
                let idx = self.unmatched_cursor;
                self.unmatched_cursor += 1;
                let right = &self.right_buffer[idx];
                if self.matches(&left, right) {
                    self.right_matched[idx] = true;
                    return Ok(Some(concat_tuples(&left, right)));
                }
            }

            self.unmatched_cursor = 0;
            self.current_left = self.left.next()?;
        }
    }
}
