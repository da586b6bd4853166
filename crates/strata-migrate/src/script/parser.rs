//! Parser for revision scripts.
//!
//! A script is a list of `name = value` assignments followed by an `up`
//! block and a `down` block, each holding a sequence of calls:
//!
//! ```text
//! script  := assign* "up" block "down" block
//! assign  := IDENT "=" value
//! block   := "{" call* "}"
//! call    := IDENT "(" (arg ("," arg)* ","?)? ")"
//! arg     := (IDENT "=")? value
//! value   := call | "[" (value ("," value)* ","?)? "]"
//!          | STRING | INT | FLOAT | "true" | "false" | "none"
//! ```

use std::path::{Path, PathBuf};

use crate::error::{MigrateError, Result};

use super::lexer::{Lexer, Token, TokenKind};

/// A parsed value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Call(Call),
    List(Vec<Value>),
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    None,
}

impl Value {
    /// Short description used in error messages.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Call(_) => "call",
            Self::List(_) => "list",
            Self::Str(_) => "string",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Bool(_) => "boolean",
            Self::None => "none",
        }
    }
}

/// A function-style call such as `column("id", "id")`.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    /// Called name.
    pub name: String,
    /// Positional arguments.
    pub args: Vec<Value>,
    /// Keyword arguments in source order.
    pub kwargs: Vec<(String, Value)>,
    /// Byte offset of the call name.
    pub offset: usize,
}

impl Call {
    /// Looks up a keyword argument.
    #[must_use]
    pub fn kwarg(&self, name: &str) -> Option<&Value> {
        self.kwargs.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }
}

/// A top-level `name = value` line.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub name: String,
    pub value: Value,
    pub offset: usize,
}

/// A parsed script before its calls are interpreted.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    /// Header assignments in source order.
    pub assignments: Vec<Assignment>,
    /// Calls of the `up` block.
    pub up: Vec<Call>,
    /// Calls of the `down` block.
    pub down: Vec<Call>,
}

impl Document {
    /// Looks up an assignment by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Assignment> {
        self.assignments.iter().find(|a| a.name == name)
    }
}

/// Recursive-descent parser over the token stream.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    path: PathBuf,
}

impl Parser {
    /// Creates a parser for `source`; `path` is only used in errors.
    #[must_use]
    pub fn new(source: &str, path: &Path) -> Self {
        Self {
            tokens: Lexer::new(source).tokenize(),
            pos: 0,
            path: path.to_path_buf(),
        }
    }

    /// Parses a whole script.
    ///
    /// # Errors
    ///
    /// Returns `MigrateError::Parse` at the first malformed token.
    pub fn parse_document(&mut self) -> Result<Document> {
        let mut document = Document::default();

        loop {
            let token = self.peek().clone();
            match &token.kind {
                TokenKind::Ident(name) if name == "up" => break,
                TokenKind::Ident(name) => {
                    self.advance();
                    self.expect(&TokenKind::Eq, "'='")?;
                    if document.get(name).is_some() {
                        return Err(self.error_at(
                            format!("duplicate assignment '{}'", name),
                            token.span.start,
                        ));
                    }
                    let value = self.parse_value()?;
                    document.assignments.push(Assignment {
                        name: name.clone(),
                        value,
                        offset: token.span.start,
                    });
                }
                _ => return Err(self.unexpected("an assignment or 'up'")),
            }
        }

        self.expect_keyword("up")?;
        document.up = self.parse_block()?;
        self.expect_keyword("down")?;
        document.down = self.parse_block()?;

        if !self.peek().is_eof() {
            return Err(self.unexpected("end of script"));
        }
        Ok(document)
    }

    fn parse_block(&mut self) -> Result<Vec<Call>> {
        self.expect(&TokenKind::LeftBrace, "'{'")?;
        let mut calls = Vec::new();
        while self.peek().kind != TokenKind::RightBrace {
            match self.parse_value()? {
                Value::Call(call) => calls.push(call),
                other => {
                    return Err(self.error(format!(
                        "expected an operation, found {}",
                        other.kind()
                    )))
                }
            }
        }
        self.advance();
        Ok(calls)
    }

    fn parse_value(&mut self) -> Result<Value> {
        let token = self.advance().clone();
        match token.kind {
            TokenKind::Str(s) => Ok(Value::Str(s)),
            TokenKind::Int(i) => Ok(Value::Int(i)),
            TokenKind::Float(f) => Ok(Value::Float(f)),
            TokenKind::LeftBracket => {
                let mut items = Vec::new();
                while self.peek().kind != TokenKind::RightBracket {
                    items.push(self.parse_value()?);
                    if !self.eat_comma() {
                        break;
                    }
                }
                self.expect(&TokenKind::RightBracket, "']'")?;
                Ok(Value::List(items))
            }
            TokenKind::Ident(name) => {
                if self.peek().kind == TokenKind::LeftParen {
                    return self.parse_call(name, token.span.start).map(Value::Call);
                }
                match name.as_str() {
                    "true" => Ok(Value::Bool(true)),
                    "false" => Ok(Value::Bool(false)),
                    "none" => Ok(Value::None),
                    _ => Err(self.error_at(format!("unknown name '{}'", name), token.span.start)),
                }
            }
            TokenKind::Error(message) => Err(self.error_at(message, token.span.start)),
            _ => {
                self.pos -= 1;
                Err(self.unexpected("a value"))
            }
        }
    }

    fn parse_call(&mut self, name: String, offset: usize) -> Result<Call> {
        self.expect(&TokenKind::LeftParen, "'('")?;
        let mut call = Call {
            name,
            args: Vec::new(),
            kwargs: Vec::new(),
            offset,
        };

        while self.peek().kind != TokenKind::RightParen {
            let keyword = match (&self.peek().kind, &self.peek_next().kind) {
                (TokenKind::Ident(k), TokenKind::Eq) => Some(k.clone()),
                _ => None,
            };
            if let Some(keyword) = keyword {
                let at = self.peek().span.start;
                self.advance();
                self.advance();
                if call.kwarg(&keyword).is_some() {
                    return Err(self.error_at(format!("repeated argument '{}'", keyword), at));
                }
                let value = self.parse_value()?;
                call.kwargs.push((keyword, value));
            } else {
                if !call.kwargs.is_empty() {
                    return Err(self.error(
                        "positional argument after keyword argument".to_string(),
                    ));
                }
                call.args.push(self.parse_value()?);
            }
            if !self.eat_comma() {
                break;
            }
        }

        self.expect(&TokenKind::RightParen, "')'")?;
        Ok(call)
    }

    fn peek(&self) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[self.pos.min(last)]
    }

    fn peek_next(&self) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.pos + 1).min(last)]
    }

    fn advance(&mut self) -> &Token {
        let last = self.tokens.len() - 1;
        let index = self.pos.min(last);
        if self.pos <= last {
            self.pos += 1;
        }
        &self.tokens[index]
    }

    fn eat_comma(&mut self) -> bool {
        if self.peek().kind == TokenKind::Comma {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<()> {
        if &self.peek().kind == kind {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<()> {
        match &self.peek().kind {
            TokenKind::Ident(name) if name == keyword => {
                self.advance();
                Ok(())
            }
            _ => Err(self.unexpected(&format!("'{}'", keyword))),
        }
    }

    fn unexpected(&self, expected: &str) -> MigrateError {
        let token = self.peek();
        let found = match &token.kind {
            TokenKind::Eof => "end of script".to_string(),
            TokenKind::Error(message) => message.clone(),
            other => format!("{:?}", other),
        };
        self.error_at(
            format!("expected {}, found {}", expected, found),
            token.span.start,
        )
    }

    fn error(&self, message: String) -> MigrateError {
        self.error_at(message, self.peek().span.start)
    }

    fn error_at(&self, message: String, offset: usize) -> MigrateError {
        MigrateError::Parse {
            path: self.path.clone(),
            message,
            offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Result<Document> {
        Parser::new(source, Path::new("test.mig")).parse_document()
    }

    #[test]
    fn test_parse_document() {
        let document = parse(
            r#"
            revision = "abc"
            revises = ["a", "b",]
            up {
                add_column("t", column("age", "integer", notnull=true))
            }
            down {
                drop_column("t", "age")
            }
            "#,
        )
        .unwrap();

        assert_eq!(document.get("revision").unwrap().value, Value::Str("abc".to_string()));
        assert_eq!(
            document.get("revises").unwrap().value,
            Value::List(vec![Value::Str("a".to_string()), Value::Str("b".to_string())])
        );
        assert_eq!(document.up.len(), 1);
        let call = &document.up[0];
        assert_eq!(call.name, "add_column");
        let Value::Call(column) = &call.args[1] else {
            panic!("expected a call");
        };
        assert_eq!(column.kwarg("notnull"), Some(&Value::Bool(true)));
        assert_eq!(document.down[0].name, "drop_column");
    }

    #[test]
    fn test_empty_blocks() {
        let document = parse("revises = none\nup {}\ndown {}").unwrap();
        assert_eq!(document.get("revises").unwrap().value, Value::None);
        assert!(document.up.is_empty());
        assert!(document.down.is_empty());
    }

    #[test]
    fn test_error_reports_offset() {
        let err = parse("up { drop_table(\"t\" }\ndown {}").unwrap_err();
        match err {
            MigrateError::Parse { offset, message, .. } => {
                assert_eq!(offset, 20);
                assert!(message.contains("')'"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_positional_after_keyword() {
        match parse("up { f(a=1, \"x\") }\ndown {}") {
            Err(MigrateError::Parse { message, offset, .. }) => {
                assert_eq!(message, "positional argument after keyword argument");
                assert_eq!(offset, 12);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_missing_down_block() {
        assert!(parse("up {}").is_err());
    }

    #[test]
    fn test_bare_value_in_block() {
        assert!(parse("up { \"t\" }\ndown {}").is_err());
    }
}
