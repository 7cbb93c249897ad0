//! SQL front end: lexer, parser, AST, binder, and expression evaluation.

pub mod ast;
pub mod binder;
pub mod expression;
pub mod lexer;
pub mod parser;
pub mod token;

pub use ast::Statement;
pub use binder::Binder;
pub use expression::Expr;
pub use parser::Parser;

use crate::catalog::Catalog;
use crate::error::DbResult;

/// Parses and binds a statement against `catalog` in one step.
pub fn parse_and_bind(sql: &str, catalog: &Catalog) -> DbResult<Statement> {
    let mut stmt = Parser::parse_statement(sql)?;
    Binder::new(catalog).bind(&mut stmt)?;
    Ok(stmt)
}
