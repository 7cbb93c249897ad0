//! Recursive-descent parser. Precedence, loosest to tightest:
//! `OR` < `AND` < `NOT` < comparison < additive < multiplicative < unary < primary.

use crate::error::{DbResult, Status};
use crate::tuple::TypeId;

use super::ast::*;
use super::expression::{BinaryOp, CompareOp, Expr, LogicalOp};
use super::lexer::Lexer;
use super::token::{Token, TokenType};

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
}

impl<'a> Parser<'a> {
    pub fn new(sql: &'a str) -> Parser<'a> {
        let mut lexer = Lexer::new(sql);
        let current = lexer.next_token();
        Parser { lexer, current }
    }

    pub fn parse_statement(sql: &str) -> DbResult<Statement> {
        let mut parser = Parser::new(sql);
        let stmt = parser.statement()?;
        parser.expect_optional(TokenType::Semicolon);
        parser.expect(TokenType::EndOfFile)?;
        Ok(stmt)
    }

    fn advance(&mut self) -> Token {
        let tok = self.current.clone();
        self.current = self.lexer.next_token();
        tok
    }

    fn check(&self, kind: TokenType) -> bool {
        self.current.kind == kind
    }

    fn expect(&mut self, kind: TokenType) -> DbResult<Token> {
        if self.current.kind == kind {
            Ok(self.advance())
        } else {
            Err(Status::invalid_argument(format!(
                "expected {:?}, found {} at line {}",
                kind, self.current, self.current.line
            )))
        }
    }

    fn expect_optional(&mut self, kind: TokenType) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn statement(&mut self) -> DbResult<Statement> {
        match self.current.kind {
            TokenType::Select => Ok(Statement::Select(self.select_statement()?)),
            TokenType::Insert => Ok(Statement::Insert(self.insert_statement()?)),
            TokenType::Update => Ok(Statement::Update(self.update_statement()?)),
            TokenType::Delete => Ok(Statement::Delete(self.delete_statement()?)),
            TokenType::Create => self.create_statement(),
            TokenType::Drop => self.drop_statement(),
            TokenType::Explain => self.explain_statement(),
            _ => Err(Status::invalid_argument(format!(
                "unexpected token {} at start of statement",
                self.current
            ))),
        }
    }

    fn explain_statement(&mut self) -> DbResult<Statement> {
        self.expect(TokenType::Explain)?;
        let analyze = self.expect_optional(TokenType::Analyze);
        let inner = self.statement()?;
        Ok(Statement::Explain(ExplainStatement {
            statement: Box::new(inner),
            analyze,
        }))
    }

    // ---- DDL ----

    fn create_statement(&mut self) -> DbResult<Statement> {
        self.expect(TokenType::Create)?;
        if self.check(TokenType::Table) {
            self.advance();
            Ok(Statement::CreateTable(self.create_table_body()?))
        } else if self.check(TokenType::Index) {
            self.advance();
            Ok(Statement::CreateIndex(self.create_index_body()?))
        } else {
            Err(Status::invalid_argument("expected TABLE or INDEX after CREATE"))
        }
    }

    fn create_table_body(&mut self) -> DbResult<CreateTableStatement> {
        let table = self.identifier()?;
        self.expect(TokenType::LParen)?;
        let mut columns = Vec::new();
        loop {
            columns.push(self.column_def()?);
            if !self.expect_optional(TokenType::Comma) {
                break;
            }
        }
        self.expect(TokenType::RParen)?;
        Ok(CreateTableStatement { table, columns })
    }

    fn column_def(&mut self) -> DbResult<ColumnDef> {
        let name = self.identifier()?;
        let (type_id, length) = self.data_type()?;
        let mut nullable = true;
        let mut primary_key = false;
        loop {
            if self.check(TokenType::Not) {
                self.advance();
                self.expect(TokenType::NullKeyword)?;
                nullable = false;
            } else if self.check(TokenType::Primary) {
                self.advance();
                self.expect(TokenType::Key)?;
                primary_key = true;
                nullable = false;
            } else {
                break;
            }
        }
        Ok(ColumnDef {
            name,
            type_id,
            length,
            nullable,
            primary_key,
        })
    }

    fn data_type(&mut self) -> DbResult<(TypeId, u32)> {
        let tok = self.advance();
        let type_id = match tok.kind {
            TokenType::Int | TokenType::Integer => TypeId::Integer,
            TokenType::BigInt => TypeId::BigInt,
            TokenType::SmallInt => TypeId::SmallInt,
            TokenType::Boolean => TypeId::Boolean,
            TokenType::Float => TypeId::Float,
            TokenType::Double => TypeId::Double,
            TokenType::Varchar | TokenType::Text => TypeId::Varchar,
            _ => {
                return Err(Status::invalid_argument(format!(
                    "expected a data type, found {}",
                    tok
                )))
            }
        };
        let mut length = if type_id == TypeId::Varchar { 255 } else { 0 };
        if self.check(TokenType::LParen) {
            self.advance();
            let size_tok = self.expect(TokenType::IntegerLiteral)?;
            length = size_tok.text.parse().unwrap_or(length);
            self.expect(TokenType::RParen)?;
        }
        Ok((type_id, length))
    }

    fn drop_statement(&mut self) -> DbResult<Statement> {
        self.expect(TokenType::Drop)?;
        if self.check(TokenType::Table) {
            self.advance();
            let if_exists = self.if_exists();
            let table = self.identifier()?;
            Ok(Statement::DropTable(DropTableStatement { table, if_exists }))
        } else if self.check(TokenType::Index) {
            self.advance();
            let if_exists = self.if_exists();
            let index_name = self.identifier()?;
            Ok(Statement::DropIndex(DropIndexStatement { index_name, if_exists }))
        } else {
            Err(Status::invalid_argument("expected TABLE or INDEX after DROP"))
        }
    }

    fn if_exists(&mut self) -> bool {
        // "IF EXISTS" is not in the keyword table; accept two identifiers
        // spelling it, case-insensitively, to stay forward-compatible.
        if self.check(TokenType::Identifier) && self.current.text.eq_ignore_ascii_case("if") {
            self.advance();
            if self.check(TokenType::Identifier) && self.current.text.eq_ignore_ascii_case("exists") {
                self.advance();
                return true;
            }
        }
        false
    }

    fn create_index_body(&mut self) -> DbResult<CreateIndexStatement> {
        let index_name = self.identifier()?;
        self.expect(TokenType::On)?;
        let table = self.identifier()?;
        self.expect(TokenType::LParen)?;
        let column = self.identifier()?;
        self.expect(TokenType::RParen)?;
        Ok(CreateIndexStatement { index_name, table, column })
    }

    // ---- DML ----

    fn select_statement(&mut self) -> DbResult<SelectStatement> {
        self.expect(TokenType::Select)?;
        let mut columns = Vec::new();
        loop {
            columns.push(self.select_item()?);
            if !self.expect_optional(TokenType::Comma) {
                break;
            }
        }
        self.expect(TokenType::From)?;
        let from = self.identifier()?;
        let alias = self.optional_alias();

        let mut joins = Vec::new();
        while self.is_join_start() {
            joins.push(self.join_clause()?);
        }

        let filter = if self.expect_optional(TokenType::Where) {
            Some(self.expr()?)
        } else {
            None
        };

        let mut order_by = Vec::new();
        if self.expect_optional(TokenType::Order) {
            self.expect(TokenType::By)?;
            loop {
                let expr = self.expr()?;
                let direction = if self.expect_optional(TokenType::Desc) {
                    OrderDirection::Desc
                } else {
                    self.expect_optional(TokenType::Asc);
                    OrderDirection::Asc
                };
                order_by.push(OrderByItem { expr, direction });
                if !self.expect_optional(TokenType::Comma) {
                    break;
                }
            }
        }

        let limit = if self.expect_optional(TokenType::Limit) {
            Some(self.unsigned_literal()?)
        } else {
            None
        };
        let offset = if self.expect_optional(TokenType::Offset) {
            Some(self.unsigned_literal()?)
        } else {
            None
        };

        Ok(SelectStatement {
            columns,
            from,
            alias,
            joins,
            filter,
            order_by,
            limit,
            offset,
        })
    }

    fn is_join_start(&self) -> bool {
        matches!(
            self.current.kind,
            TokenType::Join | TokenType::Inner | TokenType::Left | TokenType::Right | TokenType::Cross
        )
    }

    fn join_clause(&mut self) -> DbResult<JoinClause> {
        let join_type = match self.current.kind {
            TokenType::Join => {
                self.advance();
                JoinType::Inner
            }
            TokenType::Inner => {
                self.advance();
                self.expect(TokenType::Join)?;
                JoinType::Inner
            }
            TokenType::Left => {
                self.advance();
                self.expect_optional(TokenType::Outer);
                self.expect(TokenType::Join)?;
                JoinType::Left
            }
            TokenType::Right => {
                self.advance();
                self.expect_optional(TokenType::Outer);
                self.expect(TokenType::Join)?;
                JoinType::Right
            }
            TokenType::Cross => {
                self.advance();
                self.expect(TokenType::Join)?;
                JoinType::Cross
            }
            _ => unreachable!(),
        };
        let table = self.identifier()?;
        let alias = self.optional_alias();
        let on = if join_type != JoinType::Cross {
            self.expect(TokenType::On)?;
            Some(self.expr()?)
        } else {
            None
        };
        Ok(JoinClause { join_type, table, alias, on })
    }

    fn optional_alias(&mut self) -> Option<String> {
        if self.expect_optional(TokenType::As) {
            self.identifier().ok()
        } else if self.check(TokenType::Identifier) {
            Some(self.advance().text)
        } else {
            None
        }
    }

    fn select_item(&mut self) -> DbResult<SelectItem> {
        if self.check(TokenType::Star) {
            self.advance();
            return Ok(SelectItem::Star);
        }
        let expr = self.expr()?;
        let alias = self.optional_alias();
        Ok(SelectItem::Expr { expr, alias })
    }

    fn insert_statement(&mut self) -> DbResult<InsertStatement> {
        self.expect(TokenType::Insert)?;
        self.expect(TokenType::Into)?;
        let table = self.identifier()?;
        let mut columns = Vec::new();
        if self.expect_optional(TokenType::LParen) {
            loop {
                columns.push(self.identifier()?);
                if !self.expect_optional(TokenType::Comma) {
                    break;
                }
            }
            self.expect(TokenType::RParen)?;
        }
        self.expect(TokenType::Values)?;
        let mut rows = Vec::new();
        loop {
            self.expect(TokenType::LParen)?;
            let mut row = Vec::new();
            loop {
                row.push(InsertValue::Expr(self.expr()?));
                if !self.expect_optional(TokenType::Comma) {
                    break;
                }
            }
            self.expect(TokenType::RParen)?;
            rows.push(row);
            if !self.expect_optional(TokenType::Comma) {
                break;
            }
        }
        Ok(InsertStatement { table, columns, rows })
    }

    fn update_statement(&mut self) -> DbResult<UpdateStatement> {
        self.expect(TokenType::Update)?;
        let table = self.identifier()?;
        self.expect(TokenType::Set)?;
        let mut assignments = Vec::new();
        loop {
            let column = self.identifier()?;
            self.expect(TokenType::Eq)?;
            let value = self.expr()?;
            assignments.push(SetClause { column, value });
            if !self.expect_optional(TokenType::Comma) {
                break;
            }
        }
        let filter = if self.expect_optional(TokenType::Where) {
            Some(self.expr()?)
        } else {
            None
        };
        Ok(UpdateStatement { table, assignments, filter })
    }

    fn delete_statement(&mut self) -> DbResult<DeleteStatement> {
        self.expect(TokenType::Delete)?;
        self.expect(TokenType::From)?;
        let table = self.identifier()?;
        let filter = if self.expect_optional(TokenType::Where) {
            Some(self.expr()?)
        } else {
            None
        };
        Ok(DeleteStatement { table, filter })
    }

    // ---- Expressions ----

    fn expr(&mut self) -> DbResult<Expr> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> DbResult<Expr> {
        let mut left = self.and_expr()?;
        while self.expect_optional(TokenType::Or) {
            let right = self.and_expr()?;
            left = Expr::Logical {
                op: LogicalOp::Or,
                left: Box::new(left),
                right: Some(Box::new(right)),
            };
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> DbResult<Expr> {
        let mut left = self.not_expr()?;
        while self.expect_optional(TokenType::And) {
            let right = self.not_expr()?;
            left = Expr::Logical {
                op: LogicalOp::And,
                left: Box::new(left),
                right: Some(Box::new(right)),
            };
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> DbResult<Expr> {
        if self.expect_optional(TokenType::Not) {
            let inner = self.not_expr()?;
            return Ok(Expr::Logical {
                op: LogicalOp::Not,
                left: Box::new(inner),
                right: None,
            });
        }
        self.comparison_expr()
    }

    fn comparison_expr(&mut self) -> DbResult<Expr> {
        let left = self.additive_expr()?;
        if self.check(TokenType::Is) {
            self.advance();
            let negated = self.expect_optional(TokenType::Not);
            self.expect(TokenType::NullKeyword)?;
            return Ok(Expr::IsNull { expr: Box::new(left), negated });
        }
        let op = match self.current.kind {
            TokenType::Eq => CompareOp::Eq,
            TokenType::Ne => CompareOp::Ne,
            TokenType::Lt => CompareOp::Lt,
            TokenType::Le => CompareOp::Le,
            TokenType::Gt => CompareOp::Gt,
            TokenType::Ge => CompareOp::Ge,
            _ => return Ok(left),
        };
        self.advance();
        let right = self.additive_expr()?;
        Ok(Expr::Comparison { op, left: Box::new(left), right: Box::new(right) })
    }

    fn additive_expr(&mut self) -> DbResult<Expr> {
        let mut left = self.multiplicative_expr()?;
        loop {
            let op = match self.current.kind {
                TokenType::Plus => BinaryOp::Add,
                TokenType::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.multiplicative_expr()?;
            left = Expr::BinaryOp { op, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    fn multiplicative_expr(&mut self) -> DbResult<Expr> {
        let mut left = self.unary_expr()?;
        loop {
            let op = match self.current.kind {
                TokenType::Star => BinaryOp::Mul,
                TokenType::Slash => BinaryOp::Div,
                _ => break,
            };
            self.advance();
            let right = self.unary_expr()?;
            left = Expr::BinaryOp { op, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    fn unary_expr(&mut self) -> DbResult<Expr> {
        if self.expect_optional(TokenType::Minus) {
            let inner = self.unary_expr()?;
            return Ok(Expr::BinaryOp {
                op: BinaryOp::Sub,
                left: Box::new(Expr::Constant(crate::tuple::Value::Integer(0))),
                right: Box::new(inner),
            });
        }
        self.primary_expr()
    }

    fn primary_expr(&mut self) -> DbResult<Expr> {
        let tok = self.advance();
        match tok.kind {
            TokenType::IntegerLiteral => {
                let n: i64 = tok.text.parse().map_err(|_| Status::invalid_argument("bad integer literal"))?;
                Ok(Expr::Constant(crate::tuple::Value::BigInt(n)))
            }
            TokenType::FloatLiteral => {
                let n: f64 = tok.text.parse().map_err(|_| Status::invalid_argument("bad float literal"))?;
                Ok(Expr::Constant(crate::tuple::Value::Double(n)))
            }
            TokenType::StringLiteral => Ok(Expr::Constant(crate::tuple::Value::Varchar(tok.text))),
            TokenType::TrueKeyword => Ok(Expr::Constant(crate::tuple::Value::Boolean(true))),
            TokenType::FalseKeyword => Ok(Expr::Constant(crate::tuple::Value::Boolean(false))),
            TokenType::NullKeyword => Ok(Expr::Constant(crate::tuple::Value::Null(TypeId::Integer))),
            TokenType::Identifier => {
                if self.check(TokenType::Dot) {
                    self.advance();
                    let column = self.identifier()?;
                    Ok(Expr::qualified_column(tok.text, column))
                } else {
                    Ok(Expr::column(tok.text))
                }
            }
            TokenType::LParen => {
                let inner = self.expr()?;
                self.expect(TokenType::RParen)?;
                Ok(inner)
            }
            _ => Err(Status::invalid_argument(format!("unexpected token {} in expression", tok))),
        }
    }

    fn identifier(&mut self) -> DbResult<String> {
        Ok(self.expect(TokenType::Identifier)?.text)
    }

    fn unsigned_literal(&mut self) -> DbResult<u64> {
        let tok = self.expect(TokenType::IntegerLiteral)?;
        tok.text.parse().map_err(|_| Status::invalid_argument("expected an unsigned integer"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_select() {
        let stmt = Parser::parse_statement("SELECT id, name FROM users WHERE id = 1").unwrap();
        match stmt {
            Statement::Select(s) => {
                assert_eq!(s.from, "users");
                assert_eq!(s.columns.len(), 2);
                assert!(s.filter.is_some());
            }
            _ => panic!("expected select"),
        }
    }

    #[test]
    fn parses_create_table() {
        let stmt = Parser::parse_statement(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name VARCHAR(32) NOT NULL)",
        )
        .unwrap();
        match stmt {
            Statement::CreateTable(c) => {
                assert_eq!(c.table, "users");
                assert_eq!(c.columns.len(), 2);
                assert!(c.columns[0].primary_key);
                assert!(!c.columns[1].nullable);
            }
            _ => panic!("expected create table"),
        }
    }

    #[test]
    fn parses_insert_multi_row() {
        let stmt = Parser::parse_statement("INSERT INTO t (a, b) VALUES (1, 2), (3, 4)").unwrap();
        match stmt {
            Statement::Insert(i) => assert_eq!(i.rows.len(), 2),
            _ => panic!("expected insert"),
        }
    }

    #[test]
    fn operator_precedence() {
        let stmt = Parser::parse_statement("SELECT 1 + 2 * 3 FROM t").unwrap();
        match stmt {
            Statement::Select(s) => match &s.columns[0] {
                SelectItem::Expr { expr: Expr::BinaryOp { op: BinaryOp::Add, right, .. }, .. } => {
                    assert!(matches!(**right, Expr::BinaryOp { op: BinaryOp::Mul, .. }));
                }
                other => panic!("unexpected: {:?}", other),
            },
            _ => panic!("expected select"),
        }
    }

    #[test]
    fn parses_join_and_order_limit() {
        let stmt = Parser::parse_statement(
            "SELECT * FROM a JOIN b ON a.id = b.a_id ORDER BY a.id DESC LIMIT 10 OFFSET 5",
        )
        .unwrap();
        match stmt {
            Statement::Select(s) => {
                assert_eq!(s.joins.len(), 1);
                assert_eq!(s.limit, Some(10));
                assert_eq!(s.offset, Some(5));
            }
            _ => panic!("expected select"),
        }
    }

    #[test]
    fn parses_explain() {
        let stmt = Parser::parse_statement("EXPLAIN SELECT * FROM t").unwrap();
        assert!(matches!(stmt, Statement::Explain(_)));
    }

    #[test]
    fn rejects_garbage() {
        assert!(Parser::parse_statement("SELEKT * FROM t").is_err());
    }
}
