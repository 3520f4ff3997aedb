//! Character-precise tokenizer for NaCl source text.

use crate::source_map::Position;

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    Word(String),
    Number(f64),
    Boolean(bool),
    String(String),
    MultilineString(String),
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Equals,
    Comma,
    Dot,
    Less,
    Greater,
    Wildcard,
    Eof,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: Position,
    pub end: Position,
}

#[derive(Debug, Clone)]
pub struct LexError {
    pub message: String,
    pub start: Position,
    pub end: Position,
}

/// Converts NaCl source text into a flat token stream. The lexer does not know about block
/// structure; that is the grammar layer's job.
pub struct Lexer<'a> {
    input: &'a [u8],
    text: &'a str,
    pos: usize,
    line: u32,
    col: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(text: &'a str) -> Self {
        Self { input: text.as_bytes(), text, pos: 0, line: 0, col: 0 }
    }

    fn position(&self) -> Position {
        Position::new(self.line, self.col, self.pos)
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let ch = self.peek()?;
        self.pos += 1;
        if ch == b'\n' {
            self.line += 1;
            self.col = 0;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(b' ') | Some(b'\t') | Some(b'\r') | Some(b'\n') => {
                    self.advance();
                }
                Some(b'/') if self.peek_at(1) == Some(b'/') => {
                    while !matches!(self.peek(), None | Some(b'\n')) {
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    /// Tokenizes the entire input, returning every error encountered rather than stopping at
    /// the first one so the grammar layer can still attempt recovery.
    pub fn tokenize(mut self) -> (Vec<Token>, Vec<LexError>) {
        let mut tokens = Vec::new();
        let mut errors = Vec::new();
        loop {
            self.skip_trivia();
            let start = self.position();
            let Some(ch) = self.peek() else {
                tokens.push(Token { kind: TokenKind::Eof, start, end: start });
                break;
            };
            let kind = match ch {
                b'{' => {
                    self.advance();
                    TokenKind::LBrace
                }
                b'}' => {
                    self.advance();
                    TokenKind::RBrace
                }
                b'[' => {
                    self.advance();
                    TokenKind::LBracket
                }
                b']' => {
                    self.advance();
                    TokenKind::RBracket
                }
                b'(' => {
                    self.advance();
                    TokenKind::LParen
                }
                b')' => {
                    self.advance();
                    TokenKind::RParen
                }
                b'=' => {
                    self.advance();
                    TokenKind::Equals
                }
                b',' => {
                    self.advance();
                    TokenKind::Comma
                }
                b'.' => {
                    self.advance();
                    TokenKind::Dot
                }
                b'*' => {
                    self.advance();
                    TokenKind::Wildcard
                }
                b'<' => {
                    self.advance();
                    TokenKind::Less
                }
                b'>' => {
                    self.advance();
                    TokenKind::Greater
                }
                b'"' => match self.read_quoted_string() {
                    Ok(s) => TokenKind::String(s),
                    Err(msg) => {
                        errors.push(LexError { message: msg, start, end: self.position() });
                        continue;
                    }
                },
                b'\'' if self.peek_at(1) == Some(b'\'') && self.peek_at(2) == Some(b'\'') => {
                    match self.read_multiline_string() {
                        Ok(s) => TokenKind::MultilineString(s),
                        Err(msg) => {
                            errors.push(LexError { message: msg, start, end: self.position() });
                            continue;
                        }
                    }
                }
                b'-' | b'0'..=b'9' => match self.read_number() {
                    Some(n) => TokenKind::Number(n),
                    None => self.read_word_kind(),
                },
                _ if is_word_start(ch) => self.read_word_kind(),
                _ => {
                    self.advance();
                    errors.push(LexError {
                        message: format!("unexpected character {:?}", ch as char),
                        start,
                        end: self.position(),
                    });
                    continue;
                }
            };
            let end = self.position();
            tokens.push(Token { kind, start, end });
        }
        (tokens, errors)
    }

    fn read_word_kind(&mut self) -> TokenKind {
        let start_byte = self.pos;
        while self.peek().is_some_and(is_word_continue) {
            self.advance();
        }
        let word = &self.text[start_byte..self.pos];
        match word {
            "true" => TokenKind::Boolean(true),
            "false" => TokenKind::Boolean(false),
            _ => TokenKind::Word(word.to_string()),
        }
    }

    fn read_number(&mut self) -> Option<f64> {
        let start_byte = self.pos;
        let start = (self.pos, self.line, self.col);
        if self.peek() == Some(b'-') {
            self.advance();
        }
        if !self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos = start.0;
            self.line = start.1;
            self.col = start.2;
            return None;
        }
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        if self.peek() == Some(b'.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }
        self.text[start_byte..self.pos].parse::<f64>().ok()
    }

    fn read_quoted_string(&mut self) -> Result<String, String> {
        self.advance(); // opening quote
        let mut out = String::new();
        loop {
            match self.advance() {
                None => return Err("unterminated string literal".to_string()),
                Some(b'"') => return Ok(out),
                Some(b'\\') => match self.advance() {
                    Some(b'n') => out.push('\n'),
                    Some(b't') => out.push('\t'),
                    Some(b'"') => out.push('"'),
                    Some(b'\\') => out.push('\\'),
                    Some(other) => {
                        out.push('\\');
                        out.push(other as char);
                    }
                    None => return Err("unterminated escape sequence".to_string()),
                },
                Some(byte) => out.push(byte as char),
            }
        }
    }

    fn read_multiline_string(&mut self) -> Result<String, String> {
        self.advance();
        self.advance();
        self.advance();
        let start_byte = self.pos;
        loop {
            if self.peek() == Some(b'\'') && self.peek_at(1) == Some(b'\'') && self.peek_at(2) == Some(b'\'') {
                let content = &self.text[start_byte..self.pos];
                self.advance();
                self.advance();
                self.advance();
                // Trim exactly one trailing newline, preserving interior newlines verbatim.
                let trimmed = content.strip_suffix('\n').unwrap_or(content);
                return Ok(trimmed.to_string());
            }
            if self.advance().is_none() {
                return Err("unterminated multiline string literal".to_string());
            }
        }
    }
}

fn is_word_start(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || ch == b'_' || ch == b'$'
}

fn is_word_continue(ch: u8) -> bool {
    ch.is_ascii_alphanumeric() || ch == b'_' || ch == b'-' || ch == b'$'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<TokenKind> {
        let (tokens, errors) = Lexer::new(text).tokenize();
        assert!(errors.is_empty(), "unexpected lex errors: {errors:?}");
        tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn tokenizes_a_simple_block_header() {
        let kinds = kinds("type salesforce.Account {");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Word("type".into()),
                TokenKind::Word("salesforce".into()),
                TokenKind::Dot,
                TokenKind::Word("Account".into()),
                TokenKind::LBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn tokenizes_numbers_and_booleans() {
        let kinds = kinds("a = 42 b = -3.5 c = true");
        assert!(kinds.contains(&TokenKind::Number(42.0)));
        assert!(kinds.contains(&TokenKind::Number(-3.5)));
        assert!(kinds.contains(&TokenKind::Boolean(true)));
    }

    #[test]
    fn decodes_quoted_string_escapes() {
        let (tokens, _) = Lexer::new(r#""a\nb\t\"c\"""#).tokenize();
        assert_eq!(tokens[0].kind, TokenKind::String("a\nb\t\"c\"".to_string()));
    }

    #[test]
    fn multiline_string_trims_only_final_newline() {
        let (tokens, _) = Lexer::new("'''\nline1\nline2\n'''").tokenize();
        assert_eq!(tokens[0].kind, TokenKind::MultilineString("\nline1\nline2".to_string()));
    }

    #[test]
    fn skips_line_comments() {
        let kinds = kinds("a = 1 // trailing comment\nb = 2");
        assert!(matches!(kinds[0], TokenKind::Word(_)));
        assert!(kinds.contains(&TokenKind::Number(1.0)));
        assert!(kinds.contains(&TokenKind::Number(2.0)));
    }

    #[test]
    fn tokenizes_container_type_angle_brackets() {
        let kinds = kinds("list<string> Tags {");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Word("list".into()),
                TokenKind::Less,
                TokenKind::Word("string".into()),
                TokenKind::Greater,
                TokenKind::Word("Tags".into()),
                TokenKind::LBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn wildcard_is_tokenized_even_outside_recovery_mode() {
        // The grammar layer, not the lexer, decides whether `*` is legal here.
        let kinds = kinds("a = *");
        assert!(kinds.contains(&TokenKind::Wildcard));
    }

    #[test]
    fn unterminated_string_is_reported() {
        let (_, errors) = Lexer::new("\"unterminated").tokenize();
        assert_eq!(errors.len(), 1);
    }
}
