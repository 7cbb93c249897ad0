//! Binds a parsed statement against the catalog: resolves column references
//! to schema indices, checks arity/name errors, and fills in expression
//! result types. Binding rewrites the AST's `Expr` nodes in place rather
//! than producing a second, separately-typed tree.

use crate::catalog::Catalog;
use crate::error::{DbResult, Status};
use crate::tuple::Schema;

use super::ast::*;
use super::expression::Expr;

/// One resolved `FROM`/`JOIN` source: a table name, its optional alias, and
/// the schema columns it contributes, already offset into the combined row.
struct BoundSource {
    name: String,
    alias: Option<String>,
    schema: Schema,
    offset: usize,
}

pub struct Binder<'a> {
    catalog: &'a Catalog,
}

impl<'a> Binder<'a> {
    pub fn new(catalog: &'a Catalog) -> Binder<'a> {
        Binder { catalog }
    }

    pub fn bind(&self, statement: &mut Statement) -> DbResult<()> {
        match statement {
            Statement::Select(s) => self.bind_select(s),
            Statement::Insert(s) => self.bind_insert(s),
            Statement::Update(s) => self.bind_update(s),
            Statement::Delete(s) => self.bind_delete(s),
            Statement::CreateTable(_) | Statement::DropTable(_) => Ok(()),
            Statement::CreateIndex(s) => self.bind_create_index(s),
            Statement::DropIndex(_) => Ok(()),
            Statement::Explain(s) => self.bind(&mut s.statement),
        }
    }

    fn sources_for(&self, select: &SelectStatement) -> DbResult<Vec<BoundSource>> {
        let mut sources = Vec::new();
        let mut offset = 0usize;
        let base = self.catalog.get_table_by_name(&select.from).ok_or_else(|| {
            Status::not_found(format!("table {} does not exist", select.from))
        })?;
        offset += base.schema.len();
        sources.push(BoundSource {
            name: select.from.clone(),
            alias: select.alias.clone(),
            schema: base.schema,
            offset: 0,
        });
        for join in &select.joins {
            let info = self.catalog.get_table_by_name(&join.table).ok_or_else(|| {
                Status::not_found(format!("table {} does not exist", join.table))
            })?;
            sources.push(BoundSource {
                name: join.table.clone(),
                alias: join.alias.clone(),
                schema: info.schema,
                offset,
            });
            offset += sources.last().unwrap().schema.len();
        }
        Ok(sources)
    }

    fn bind_select(&self, select: &mut SelectStatement) -> DbResult<()> {
        let sources = self.sources_for(select)?;
        for item in &mut select.columns {
            if let SelectItem::Expr { expr, .. } = item {
                self.bind_expr(expr, &sources)?;
            }
        }
        for join in &mut select.joins {
            if let Some(on) = &mut join.on {
                self.bind_expr(on, &sources)?;
            }
        }
        if let Some(filter) = &mut select.filter {
            self.bind_expr(filter, &sources)?;
        }
        for item in &mut select.order_by {
            self.bind_expr(&mut item.expr, &sources)?;
        }
        Ok(())
    }

    fn bind_insert(&self, insert: &mut InsertStatement) -> DbResult<()> {
        let info = self.catalog.get_table_by_name(&insert.table).ok_or_else(|| {
            Status::not_found(format!("table {} does not exist", insert.table))
        })?;
        let target_columns: Vec<usize> = if insert.columns.is_empty() {
            (0..info.schema.len()).collect()
        } else {
            insert
                .columns
                .iter()
                .map(|c| {
                    info.schema
                        .index_of(c)
                        .ok_or_else(|| Status::invalid_argument(format!("unknown column {}", c)))
                })
                .collect::<DbResult<_>>()?
        };
        for row in &insert.rows {
            if row.len() != target_columns.len() {
                return Err(Status::invalid_argument(format!(
                    "INSERT has {} values but {} columns were targeted",
                    row.len(),
                    target_columns.len()
                )));
            }
        }
        // No column references are legal on the value side of INSERT, so
        // there's nothing further to bind beyond the arity check above.
        Ok(())
    }

    fn bind_update(&self, update: &mut UpdateStatement) -> DbResult<()> {
        let info = self.catalog.get_table_by_name(&update.table).ok_or_else(|| {
            Status::not_found(format!("table {} does not exist", update.table))
        })?;
        let sources = vec![BoundSource {
            name: update.table.clone(),
            alias: None,
            schema: info.schema.clone(),
            offset: 0,
        }];
        for clause in &mut update.assignments {
            if info.schema.index_of(&clause.column).is_none() {
                return Err(Status::invalid_argument(format!("unknown column {}", clause.column)));
            }
            self.bind_expr(&mut clause.value, &sources)?;
        }
        if let Some(filter) = &mut update.filter {
            self.bind_expr(filter, &sources)?;
        }
        Ok(())
    }

    fn bind_delete(&self, delete: &mut DeleteStatement) -> DbResult<()> {
        let info = self.catalog.get_table_by_name(&delete.table).ok_or_else(|| {
            Status::not_found(format!("table {} does not exist", delete.table))
        })?;
        let sources = vec![BoundSource {
            name: delete.table.clone(),
            alias: None,
            schema: info.schema,
            offset: 0,
        }];
        if let Some(filter) = &mut delete.filter {
            self.bind_expr(filter, &sources)?;
        }
        Ok(())
    }

    fn bind_create_index(&self, stmt: &mut CreateIndexStatement) -> DbResult<()> {
        let info = self.catalog.get_table_by_name(&stmt.table).ok_or_else(|| {
            Status::not_found(format!("table {} does not exist", stmt.table))
        })?;
        if info.schema.index_of(&stmt.column).is_none() {
            return Err(Status::invalid_argument(format!("unknown column {}", stmt.column)));
        }
        Ok(())
    }

    fn bind_expr(&self, expr: &mut Expr, sources: &[BoundSource]) -> DbResult<()> {
        match expr {
            Expr::Constant(_) => Ok(()),
            Expr::ColumnRef { table, column, index, ty } => {
                let (global_index, type_id) = self.resolve_column(table.as_deref(), column, sources)?;
                *index = global_index;
                *ty = Some(type_id);
                Ok(())
            }
            Expr::BinaryOp { left, right, .. } | Expr::Comparison { left, right, .. } => {
                self.bind_expr(left, sources)?;
                self.bind_expr(right, sources)
            }
            Expr::Logical { left, right, .. } => {
                self.bind_expr(left, sources)?;
                if let Some(right) = right {
                    self.bind_expr(right, sources)?;
                }
                Ok(())
            }
            Expr::IsNull { expr, .. } => self.bind_expr(expr, sources),
        }
    }

    fn resolve_column(
        &self,
        table: Option<&str>,
        column: &str,
        sources: &[BoundSource],
    ) -> DbResult<(usize, crate::tuple::TypeId)> {
        let mut found = None;
        for source in sources {
            if let Some(qualifier) = table {
                let matches_source =
                    source.name.eq_ignore_ascii_case(qualifier)
                        || source.alias.as_deref().map(|a| a.eq_ignore_ascii_case(qualifier)).unwrap_or(false);
                if !matches_source {
                    continue;
                }
            }
            if let Some(local_index) = source.schema.index_of(column) {
                if found.is_some() {
                    return Err(Status::invalid_argument(format!("ambiguous column reference {}", column)));
                }
                let col = source.schema.column(local_index);
                found = Some((source.offset + local_index, col.type_id));
            }
        }
        found.ok_or_else(|| Status::invalid_argument(format!("unknown column {}", column)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::parser::Parser;
    use crate::tuple::{Column, TypeId};

    fn catalog_with_users() -> Catalog {
        let cat = Catalog::new();
        let schema = Schema::new(vec![
            Column::new("id", TypeId::Integer),
            Column::new("name", TypeId::Varchar),
        ]);
        cat.create_table("users", schema, 1).unwrap();
        cat
    }

    #[test]
    fn binds_simple_filter() {
        let cat = catalog_with_users();
        let mut stmt = Parser::parse_statement("SELECT id FROM users WHERE name = 'a'").unwrap();
        Binder::new(&cat).bind(&mut stmt).unwrap();
        match stmt {
            Statement::Select(s) => {
                let filter = s.filter.unwrap();
                if let Expr::Comparison { left, .. } = filter {
                    if let Expr::ColumnRef { index, .. } = *left {
                        assert_eq!(index, 1);
                    } else {
                        panic!("expected column ref");
                    }
                } else {
                    panic!("expected comparison");
                }
            }
            _ => panic!("expected select"),
        }
    }

    #[test]
    fn unknown_table_errors() {
        let cat = catalog_with_users();
        let mut stmt = Parser::parse_statement("SELECT id FROM ghosts").unwrap();
        assert!(Binder::new(&cat).bind(&mut stmt).is_err());
    }

    #[test]
    fn unknown_column_errors() {
        let cat = catalog_with_users();
        let mut stmt = Parser::parse_statement("SELECT nope FROM users").unwrap();
        assert!(Binder::new(&cat).bind(&mut stmt).is_err());
    }

    #[test]
    fn insert_arity_mismatch_errors() {
        let cat = catalog_with_users();
        let mut stmt = Parser::parse_statement("INSERT INTO users (id, name) VALUES (1)").unwrap();
        assert!(Binder::new(&cat).bind(&mut stmt).is_err());
    }
}
