//! Hand-rolled SQL lexer: whitespace/comment skipping, keyword table lookup,
//! number/string/operator scanning. One token of lookahead via `peek`.

use super::token::{keyword_for, Token, TokenType};

pub struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    line: usize,
    column: usize,
    peeked: Option<Token>,
}

impl<'a> Lexer<'a> {
    pub fn new(sql: &'a str) -> Lexer<'a> {
        Lexer {
            src: sql.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
            peeked: None,
        }
    }

    pub fn next_token(&mut self) -> Token {
        if let Some(tok) = self.peeked.take() {
            return tok;
        }
        self.scan_token()
    }

    pub fn peek_token(&mut self) -> Token {
        if self.peeked.is_none() {
            self.peeked = Some(self.scan_token());
        }
        self.peeked.clone().unwrap()
    }

    fn current(&self) -> char {
        self.src.get(self.pos).copied().unwrap_or(0) as char
    }

    fn peek_char(&self, offset: usize) -> char {
        self.src.get(self.pos + offset).copied().unwrap_or(0) as char
    }

    fn advance(&mut self) {
        if self.pos < self.src.len() {
            if self.src[self.pos] == b'\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
            self.pos += 1;
        }
    }

    fn skip_trivia(&mut self) {
        loop {
            let c = self.current();
            if c.is_whitespace() {
                self.advance();
            } else if c == '-' && self.peek_char(1) == '-' {
                self.advance();
                self.advance();
                while self.pos < self.src.len() && self.current() != '\n' {
                    self.advance();
                }
            } else if c == '/' && self.peek_char(1) == '*' {
                self.advance();
                self.advance();
                while self.pos < self.src.len() {
                    if self.current() == '*' && self.peek_char(1) == '/' {
                        self.advance();
                        self.advance();
                        break;
                    }
                    self.advance();
                }
            } else {
                break;
            }
        }
    }

    fn scan_token(&mut self) -> Token {
        self.skip_trivia();
        if self.pos >= self.src.len() {
            return Token::new(TokenType::EndOfFile, "", self.line, self.column);
        }
        let c = self.current();
        if c.is_alphabetic() || c == '_' {
            return self.scan_identifier_or_keyword();
        }
        if c.is_ascii_digit() {
            return self.scan_number();
        }
        if c == '\'' || c == '"' {
            return self.scan_string();
        }
        self.scan_operator()
    }

    fn scan_identifier_or_keyword(&mut self) -> Token {
        let col = self.column;
        let line = self.line;
        let mut value = String::new();
        while self.pos < self.src.len() {
            let c = self.current();
            if c.is_alphanumeric() || c == '_' {
                value.push(c);
                self.advance();
            } else {
                break;
            }
        }
        let kind = keyword_for(&value).unwrap_or(TokenType::Identifier);
        Token::new(kind, value, line, col)
    }

    fn scan_number(&mut self) -> Token {
        let col = self.column;
        let line = self.line;
        let mut value = String::new();
        let mut has_dot = false;
        while self.pos < self.src.len() {
            let c = self.current();
            if c.is_ascii_digit() {
                value.push(c);
                self.advance();
            } else if c == '.' && !has_dot && self.peek_char(1).is_ascii_digit() {
                has_dot = true;
                value.push(c);
                self.advance();
            } else {
                break;
            }
        }
        let kind = if has_dot {
            TokenType::FloatLiteral
        } else {
            TokenType::IntegerLiteral
        };
        Token::new(kind, value, line, col)
    }

    fn scan_string(&mut self) -> Token {
        let col = self.column;
        let line = self.line;
        let quote = self.current();
        self.advance();
        let mut value = String::new();
        while self.pos < self.src.len() {
            let c = self.current();
            if c == quote {
                if self.peek_char(1) == quote {
                    value.push(quote);
                    self.advance();
                    self.advance();
                } else {
                    self.advance();
                    break;
                }
            } else if c == '\\' {
                self.advance();
                let escaped = self.current();
                value.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    '\\' => '\\',
                    '\'' => '\'',
                    '"' => '"',
                    other => other,
                });
                self.advance();
            } else {
                value.push(c);
                self.advance();
            }
        }
        Token::new(TokenType::StringLiteral, value, line, col)
    }

    fn scan_operator(&mut self) -> Token {
        let col = self.column;
        let line = self.line;
        let c = self.current();
        self.advance();
        let (kind, text): (TokenType, String) = match c {
            '(' => (TokenType::LParen, "(".into()),
            ')' => (TokenType::RParen, ")".into()),
            ',' => (TokenType::Comma, ",".into()),
            ';' => (TokenType::Semicolon, ";".into()),
            '*' => (TokenType::Star, "*".into()),
            '.' => (TokenType::Dot, ".".into()),
            '+' => (TokenType::Plus, "+".into()),
            '-' => (TokenType::Minus, "-".into()),
            '/' => (TokenType::Slash, "/".into()),
            '=' => (TokenType::Eq, "=".into()),
            '!' => {
                if self.current() == '=' {
                    self.advance();
                    (TokenType::Ne, "!=".into())
                } else {
                    (TokenType::Invalid, "!".into())
                }
            }
            '<' => {
                if self.current() == '=' {
                    self.advance();
                    (TokenType::Le, "<=".into())
                } else if self.current() == '>' {
                    self.advance();
                    (TokenType::Ne, "<>".into())
                } else {
                    (TokenType::Lt, "<".into())
                }
            }
            '>' => {
                if self.current() == '=' {
                    self.advance();
                    (TokenType::Ge, ">=".into())
                } else {
                    (TokenType::Gt, ">".into())
                }
            }
            other => (TokenType::Invalid, other.to_string()),
        };
        Token::new(kind, text, line, col)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(sql: &str) -> Vec<TokenType> {
        let mut lex = Lexer::new(sql);
        let mut out = Vec::new();
        loop {
            let tok = lex.next_token();
            if tok.kind == TokenType::EndOfFile {
                break;
            }
            out.push(tok.kind);
        }
        out
    }

    #[test]
    fn select_statement_tokens() {
        let kinds = kinds("SELECT id, name FROM users WHERE id = 1;");
        assert_eq!(
            kinds,
            vec![
                TokenType::Select,
                TokenType::Identifier,
                TokenType::Comma,
                TokenType::Identifier,
                TokenType::From,
                TokenType::Identifier,
                TokenType::Where,
                TokenType::Identifier,
                TokenType::Eq,
                TokenType::IntegerLiteral,
                TokenType::Semicolon,
            ]
        );
    }

    #[test]
    fn string_escape_and_doubled_quote() {
        let mut lex = Lexer::new("'it''s \\n ok'");
        let tok = lex.next_token();
        assert_eq!(tok.text, "it's \n ok");
    }

    #[test]
    fn comments_are_skipped() {
        let kinds = kinds("SELECT 1 -- trailing comment\n /* block */ FROM t");
        assert_eq!(
            kinds,
            vec![
                TokenType::Select,
                TokenType::IntegerLiteral,
                TokenType::From,
                TokenType::Identifier,
            ]
        );
    }

    #[test]
    fn peek_does_not_consume() {
        let mut lex = Lexer::new("SELECT 1");
        assert_eq!(lex.peek_token().kind, TokenType::Select);
        assert_eq!(lex.next_token().kind, TokenType::Select);
        assert_eq!(lex.next_token().kind, TokenType::IntegerLiteral);
    }

    #[test]
    fn float_vs_integer_literal() {
        let mut lex = Lexer::new("3.14 42");
        assert_eq!(lex.next_token().kind, TokenType::FloatLiteral);
        assert_eq!(lex.next_token().kind, TokenType::IntegerLiteral);
    }
}
