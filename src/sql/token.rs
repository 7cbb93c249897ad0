//! Token types produced by the lexer.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    // DDL
    Create,
    Drop,
    Table,
    Index,
    Primary,
    Key,

    // DML
    Select,
    Insert,
    Update,
    Delete,
    From,
    Where,
    Into,
    Values,
    Set,

    // Logical / literal keywords
    And,
    Or,
    Not,
    Is,
    NullKeyword,
    TrueKeyword,
    FalseKeyword,

    // Join
    Join,
    Inner,
    Left,
    Right,
    Outer,
    Cross,
    On,

    // Misc keywords
    As,
    Order,
    By,
    Asc,
    Desc,
    Limit,
    Offset,
    Explain,
    Analyze,

    // Data types
    Int,
    Integer,
    BigInt,
    SmallInt,
    Boolean,
    Varchar,
    Text,
    Float,
    Double,

    // Punctuation / operators
    LParen,
    RParen,
    Comma,
    Semicolon,
    Star,
    Dot,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Slash,

    // Literals / identifiers
    IntegerLiteral,
    FloatLiteral,
    StringLiteral,
    Identifier,

    EndOfFile,
    Invalid,
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenType,
    pub text: String,
    pub line: usize,
    pub column: usize,
}

impl Token {
    pub fn new(kind: TokenType, text: impl Into<String>, line: usize, column: usize) -> Token {
        Token {
            kind,
            text: text.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}('{}') at {}:{}", self.kind, self.text, self.line, self.column)
    }
}

pub fn keyword_for(word: &str) -> Option<TokenType> {
    let upper = word.to_ascii_uppercase();
    let kind = match upper.as_str() {
        "CREATE" => TokenType::Create,
        "DROP" => TokenType::Drop,
        "TABLE" => TokenType::Table,
        "INDEX" => TokenType::Index,
        "PRIMARY" => TokenType::Primary,
        "KEY" => TokenType::Key,
        "SELECT" => TokenType::Select,
        "INSERT" => TokenType::Insert,
        "UPDATE" => TokenType::Update,
        "DELETE" => TokenType::Delete,
        "FROM" => TokenType::From,
        "WHERE" => TokenType::Where,
        "INTO" => TokenType::Into,
        "VALUES" => TokenType::Values,
        "SET" => TokenType::Set,
        "AND" => TokenType::And,
        "OR" => TokenType::Or,
        "NOT" => TokenType::Not,
        "IS" => TokenType::Is,
        "NULL" => TokenType::NullKeyword,
        "TRUE" => TokenType::TrueKeyword,
        "FALSE" => TokenType::FalseKeyword,
        "JOIN" => TokenType::Join,
        "INNER" => TokenType::Inner,
        "LEFT" => TokenType::Left,
        "RIGHT" => TokenType::Right,
        "OUTER" => TokenType::Outer,
        "CROSS" => TokenType::Cross,
        "ON" => TokenType::On,
        "AS" => TokenType::As,
        "ORDER" => TokenType::Order,
        "BY" => TokenType::By,
        "ASC" => TokenType::Asc,
        "DESC" => TokenType::Desc,
        "LIMIT" => TokenType::Limit,
        "OFFSET" => TokenType::Offset,
        "EXPLAIN" => TokenType::Explain,
        "ANALYZE" => TokenType::Analyze,
        "INT" => TokenType::Int,
        "INTEGER" => TokenType::Integer,
        "BIGINT" => TokenType::BigInt,
        "SMALLINT" => TokenType::SmallInt,
        "BOOLEAN" => TokenType::Boolean,
        "VARCHAR" => TokenType::Varchar,
        "TEXT" => TokenType::Text,
        "FLOAT" => TokenType::Float,
        "DOUBLE" => TokenType::Double,
        _ => return None,
    };
    Some(kind)
}
