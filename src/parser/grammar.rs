//! Recursive-descent grammar over the token stream, producing the intermediate
//! [`crate::parser::ast`] tree.

use crate::error::{ParseError, Severity};
use crate::parser::ast::{Block, BlockItem, Expr, ExprKind, TemplatePart};
use crate::parser::lexer::{Lexer, Token, TokenKind};
use crate::source_map::SourceRange;
use std::path::{Path, PathBuf};

pub struct Parser<'a> {
    tokens: Vec<Token>,
    idx: usize,
    filename: PathBuf,
    text: &'a str,
    error_recovery: bool,
    pub errors: Vec<ParseError>,
}

impl<'a> Parser<'a> {
    pub fn new(filename: &Path, text: &'a str, error_recovery: bool) -> Self {
        let (tokens, lex_errors) = Lexer::new(text).tokenize();
        let mut errors = Vec::new();
        for e in lex_errors {
            errors.push(ParseError {
                range: SourceRange::new(filename.to_path_buf(), e.start, e.end),
                message: e.message,
                severity: Severity::Error,
            });
        }
        Self { tokens, idx: 0, filename: filename.to_path_buf(), text, error_recovery, errors }
    }

    fn range(&self, token: &Token) -> SourceRange {
        SourceRange::new(self.filename.clone(), token.start, token.end)
    }

    fn spanning(&self, start: &Token, end: &Token) -> SourceRange {
        SourceRange::new(self.filename.clone(), start.start, end.end)
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.idx]
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.idx].clone();
        if self.idx + 1 < self.tokens.len() {
            self.idx += 1;
        }
        tok
    }

    fn error(&mut self, message: impl Into<String>, range: SourceRange) {
        self.errors.push(ParseError { range, message: message.into(), severity: Severity::Error });
    }

    /// Skips tokens until a top-level resynchronization point: a block-closing `}` or EOF.
    fn recover_to_top_level(&mut self) {
        let mut depth: i32 = 0;
        loop {
            match self.peek().kind {
                TokenKind::Eof => return,
                TokenKind::LBrace => {
                    depth += 1;
                    self.advance();
                }
                TokenKind::RBrace => {
                    self.advance();
                    if depth <= 0 {
                        return;
                    }
                    depth -= 1;
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    pub fn parse_file(&mut self) -> Vec<BlockItem> {
        let mut items = Vec::new();
        while !self.at_eof() {
            match self.parse_item() {
                Some(item) => items.push(item),
                None => {
                    self.recover_to_top_level();
                }
            }
        }
        items
    }

    fn parse_item(&mut self) -> Option<BlockItem> {
        let start = self.peek().clone();
        let words = self.collect_words();
        if words.is_empty() {
            let tok = self.advance();
            self.error("expected a block type or attribute key", self.range(&tok));
            return None;
        }
        match self.peek().kind.clone() {
            TokenKind::Equals => {
                if words.len() != 1 {
                    self.error("attribute key must be a single word", self.range(&start));
                    return None;
                }
                self.advance();
                let value = self.parse_expr()?;
                let end = self.tokens[self.idx.saturating_sub(1)].clone();
                Some(BlockItem::Attribute {
                    key: words[0].clone(),
                    range: self.spanning(&start, &end),
                    value,
                })
            }
            TokenKind::LBrace => Some(BlockItem::Nested(self.parse_block_body(start, words)?)),
            _ => {
                let tok = self.peek().clone();
                self.error("expected '=' or '{' after identifier", self.range(&tok));
                None
            }
        }
    }

    /// Collects a run of `WORD (WORD | STRING)*`, where all labels after the first may be
    /// dotted (`a.b`) words or quoted strings. A word immediately followed by `<...>`
    /// (`list<string>`, `map<x.T>`) is collected as one container-type word.
    fn collect_words(&mut self) -> Vec<String> {
        let mut words = Vec::new();
        loop {
            match self.peek().kind.clone() {
                TokenKind::Word(w) => {
                    self.advance();
                    let mut full = w;
                    while matches!(self.peek().kind, TokenKind::Dot) {
                        self.advance();
                        if let TokenKind::Word(next) = self.peek().kind.clone() {
                            self.advance();
                            full.push('.');
                            full.push_str(&next);
                        } else {
                            break;
                        }
                    }
                    if matches!(self.peek().kind, TokenKind::Less) {
                        if let Some(inner) = self.parse_container_inner() {
                            full.push('<');
                            full.push_str(&inner);
                            full.push('>');
                        }
                    }
                    words.push(full);
                }
                TokenKind::String(s) => {
                    self.advance();
                    words.push(s);
                }
                _ => break,
            }
        }
        words
    }

    /// Consumes `< dotted.word >` after a `<` has been peeked, returning the dotted word inside.
    fn parse_container_inner(&mut self) -> Option<String> {
        self.advance(); // consume '<'
        let TokenKind::Word(w) = self.peek().kind.clone() else {
            let tok = self.peek().clone();
            self.error("expected a type name inside '<...>'", self.range(&tok));
            return None;
        };
        self.advance();
        let mut inner = w;
        while matches!(self.peek().kind, TokenKind::Dot) {
            self.advance();
            if let TokenKind::Word(next) = self.peek().kind.clone() {
                self.advance();
                inner.push('.');
                inner.push_str(&next);
            } else {
                break;
            }
        }
        if !matches!(self.peek().kind, TokenKind::Greater) {
            let tok = self.peek().clone();
            self.error("expected '>' to close container type", self.range(&tok));
            return None;
        }
        self.advance();
        Some(inner)
    }

    fn parse_block_body(&mut self, header_start: Token, words: Vec<String>) -> Option<Block> {
        self.advance(); // consume '{'
        let mut items = Vec::new();
        let mut seen_keys: Vec<(String, SourceRange)> = Vec::new();
        loop {
            match self.peek().kind.clone() {
                TokenKind::RBrace => {
                    let close = self.advance();
                    let (block_type, labels) = words.split_first().map_or(
                        (String::new(), Vec::new()),
                        |(first, rest)| (first.clone(), rest.to_vec()),
                    );
                    return Some(Block {
                        block_type,
                        labels,
                        items,
                        range: self.spanning(&header_start, &close),
                    });
                }
                TokenKind::Eof => {
                    let tok = self.peek().clone();
                    self.error("unterminated block, expected '}'", self.range(&tok));
                    return None;
                }
                _ => match self.parse_item() {
                    Some(item) => {
                        if let BlockItem::Attribute { key, range, .. } = &item {
                            if let Some((_, first_range)) = seen_keys.iter().find(|(k, _)| k == key) {
                                self.errors.push(ParseError {
                                    range: range.clone(),
                                    message: format!(
                                        "Attribute redefined: {key} (first defined at {first_range})"
                                    ),
                                    severity: Severity::Error,
                                });
                            } else {
                                seen_keys.push((key.clone(), range.clone()));
                            }
                        }
                        items.push(item);
                    }
                    None => self.recover_to_top_level(),
                },
            }
        }
    }

    fn parse_expr(&mut self) -> Option<Expr> {
        let start = self.peek().clone();
        match start.kind.clone() {
            TokenKind::Number(n) => {
                self.advance();
                Some(Expr { kind: ExprKind::Number(n), range: self.range(&start) })
            }
            TokenKind::Boolean(b) => {
                self.advance();
                Some(Expr { kind: ExprKind::Boolean(b), range: self.range(&start) })
            }
            TokenKind::String(_) | TokenKind::MultilineString(_) => self.parse_string_expr(),
            TokenKind::LBracket => self.parse_list_expr(),
            TokenKind::LBrace => self.parse_object_expr(),
            TokenKind::Wildcard => {
                self.advance();
                if self.error_recovery {
                    Some(Expr { kind: ExprKind::Dynamic, range: self.range(&start) })
                } else {
                    self.error("wildcard expressions are only valid in error-recovery mode", self.range(&start));
                    None
                }
            }
            TokenKind::Word(_) => self.parse_reference_or_call(),
            _ => {
                self.error(format!("unexpected token while parsing expression: {:?}", start.kind), self.range(&start));
                None
            }
        }
    }

    fn parse_string_expr(&mut self) -> Option<Expr> {
        let tok = self.advance();
        let raw = match &tok.kind {
            TokenKind::String(s) | TokenKind::MultilineString(s) => s.clone(),
            _ => unreachable!(),
        };
        Some(Expr { kind: ExprKind::Template(split_template(&raw)), range: self.range(&tok) })
    }

    fn parse_list_expr(&mut self) -> Option<Expr> {
        let start = self.advance();
        let mut items = Vec::new();
        loop {
            if matches!(self.peek().kind, TokenKind::RBracket) {
                let end = self.advance();
                return Some(Expr { kind: ExprKind::List(items), range: self.spanning(&start, &end) });
            }
            items.push(self.parse_expr()?);
            if matches!(self.peek().kind, TokenKind::Comma) {
                self.advance();
            }
        }
    }

    fn parse_object_expr(&mut self) -> Option<Expr> {
        let start = self.advance();
        let mut entries = Vec::new();
        loop {
            if matches!(self.peek().kind, TokenKind::RBrace) {
                let end = self.advance();
                return Some(Expr { kind: ExprKind::Object(entries), range: self.spanning(&start, &end) });
            }
            let key_tok = self.peek().clone();
            let key = match key_tok.kind.clone() {
                TokenKind::Word(w) => {
                    self.advance();
                    w
                }
                TokenKind::String(s) => {
                    self.advance();
                    s
                }
                _ => {
                    self.error("expected a map key", self.range(&key_tok));
                    return None;
                }
            };
            if !matches!(self.peek().kind, TokenKind::Equals) {
                let tok = self.peek().clone();
                self.error("expected '=' after map key", self.range(&tok));
                return None;
            }
            self.advance();
            let value = self.parse_expr()?;
            entries.push((key, value));
            if matches!(self.peek().kind, TokenKind::Comma) {
                self.advance();
            }
        }
    }

    fn parse_reference_or_call(&mut self) -> Option<Expr> {
        let start = self.peek().clone();
        let mut path = Vec::new();
        loop {
            match self.peek().kind.clone() {
                TokenKind::Word(w) => {
                    self.advance();
                    path.push(w);
                }
                _ => break,
            }
            if matches!(self.peek().kind, TokenKind::Dot) {
                self.advance();
            } else {
                break;
            }
        }
        if matches!(self.peek().kind, TokenKind::LParen) && path.len() == 1 {
            self.advance();
            let mut args = Vec::new();
            loop {
                if matches!(self.peek().kind, TokenKind::RParen) {
                    let end = self.advance();
                    return Some(Expr {
                        kind: ExprKind::Call { name: path.remove(0), args },
                        range: self.spanning(&start, &end),
                    });
                }
                args.push(self.parse_expr()?);
                if matches!(self.peek().kind, TokenKind::Comma) {
                    self.advance();
                }
            }
        }
        if path.is_empty() {
            self.error("expected a reference or literal", self.range(&start));
            return None;
        }
        let end = self.tokens[self.idx.saturating_sub(1)].clone();
        Some(Expr { kind: ExprKind::Reference(path), range: self.spanning(&start, &end) })
    }
}

/// Splits a decoded string literal's content into literal/reference fragments at `${...}`
/// interpolation boundaries.
fn split_template(raw: &str) -> Vec<TemplatePart> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' && bytes.get(i + 1) == Some(&b'{') {
            if let Some(close) = raw[i + 2..].find('}') {
                if !literal.is_empty() {
                    parts.push(TemplatePart::Literal(std::mem::take(&mut literal)));
                }
                let path_str = &raw[i + 2..i + 2 + close];
                parts.push(TemplatePart::Reference(path_str.split('.').map(str::to_string).collect()));
                i += 2 + close + 1;
                continue;
            }
        }
        let ch_len = raw[i..].chars().next().map_or(1, char::len_utf8);
        literal.push_str(&raw[i..i + ch_len]);
        i += ch_len;
    }
    if !literal.is_empty() || parts.is_empty() {
        parts.push(TemplatePart::Literal(literal));
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> (Vec<BlockItem>, Vec<ParseError>) {
        let mut p = Parser::new(Path::new("a.nacl"), text, false);
        let items = p.parse_file();
        (items, p.errors)
    }

    #[test]
    fn parses_a_type_block_with_a_field() {
        let (items, errors) = parse("type salesforce.Account {\n  string Name {\n  }\n}");
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(items.len(), 1);
        let BlockItem::Nested(block) = &items[0] else { panic!("expected a block") };
        assert_eq!(block.block_type, "type");
        assert_eq!(block.labels, vec!["salesforce.Account"]);
    }

    #[test]
    fn parses_a_list_field_type_as_one_word() {
        let (items, errors) = parse("type x.T {\n  list<string> Tags {\n  }\n}");
        assert!(errors.is_empty(), "{errors:?}");
        let BlockItem::Nested(block) = &items[0] else { panic!("expected a block") };
        let BlockItem::Nested(field) = &block.items[0] else { panic!("expected a field") };
        assert_eq!(field.block_type, "list<string>");
        assert_eq!(field.labels, vec!["Tags"]);
    }

    #[test]
    fn duplicate_attribute_in_a_block_is_an_error() {
        let (_, errors) = parse("type x.T {\n  a = 1\n  a = 2\n}");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.starts_with("Attribute redefined"));
    }

    #[test]
    fn wildcard_outside_recovery_mode_is_rejected() {
        let (_, errors) = parse("type x.T {\n  a = *\n}");
        assert!(!errors.is_empty());
    }

    #[test]
    fn wildcard_inside_recovery_mode_is_accepted() {
        let mut p = Parser::new(Path::new("a.nacl"), "type x.T {\n  a = *\n}", true);
        let items = p.parse_file();
        assert!(p.errors.is_empty());
        let BlockItem::Nested(block) = &items[0] else { panic!() };
        let BlockItem::Attribute { value, .. } = &block.items[0] else { panic!() };
        assert!(matches!(value.kind, ExprKind::Dynamic));
    }

    #[test]
    fn template_string_splits_literal_and_reference_parts() {
        let parts = split_template("hello ${x.T.field} world");
        assert_eq!(parts.len(), 3);
        assert!(matches!(&parts[0], TemplatePart::Literal(s) if s == "hello "));
        assert!(matches!(&parts[1], TemplatePart::Reference(p) if p == &vec!["x", "T", "field"]));
        assert!(matches!(&parts[2], TemplatePart::Literal(s) if s == " world"));
    }

    #[test]
    fn recovers_after_a_malformed_top_level_item() {
        let (items, errors) = parse("type x.T {\n  a = 1\n}\n@@@\ntype x.U {\n  b = 2\n}");
        assert!(!errors.is_empty());
        assert_eq!(items.len(), 2);
    }
}
