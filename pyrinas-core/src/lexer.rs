//! Indentation-aware lexer for Pyrinas sources.
//!
//! Besides ordinary tokens the lexer synthesizes `Indent` / `Dedent`
//! tokens from leading whitespace, so the parser can treat blocks the
//! same way a brace language would. Lexing stops at the first `Error`
//! token; [`tokenize`] turns that token into a [`CoreError::LexError`].

use std::fmt;

use crate::error::CoreError;

/// Width of a tab character when measuring indentation.
const TAB_WIDTH: usize = 8;

/// Kind of a token produced by the lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Literals
    Number,
    String,
    Identifier,

    // Keywords
    Def,
    Class,
    If,
    Else,
    Elif,
    While,
    For,
    Break,
    Continue,
    Return,
    Pass,
    Match,
    Case,
    In,
    And,
    Or,
    Not,
    True,
    False,
    None,
    Import,
    From,
    As,

    // Operators
    Plus,        // +
    Minus,       // -
    Star,        // *
    Slash,       // /
    DoubleSlash, // //
    Percent,     // %
    Assign,      // =
    EqEq,        // ==
    NotEq,       // !=
    Less,        // <
    LessEq,      // <=
    Greater,     // >
    GreaterEq,   // >=
    Arrow,       // ->

    // Delimiters
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Semicolon,
    Dot,

    // Structure
    Newline,
    Indent,
    Dedent,
    Eof,
    Error,
}

impl TokenKind {
    /// Upper-case name used in token dumps and diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            TokenKind::Number => "NUMBER",
            TokenKind::String => "STRING",
            TokenKind::Identifier => "IDENTIFIER",
            TokenKind::Def => "DEF",
            TokenKind::Class => "CLASS",
            TokenKind::If => "IF",
            TokenKind::Else => "ELSE",
            TokenKind::Elif => "ELIF",
            TokenKind::While => "WHILE",
            TokenKind::For => "FOR",
            TokenKind::Break => "BREAK",
            TokenKind::Continue => "CONTINUE",
            TokenKind::Return => "RETURN",
            TokenKind::Pass => "PASS",
            TokenKind::Match => "MATCH",
            TokenKind::Case => "CASE",
            TokenKind::In => "IN",
            TokenKind::And => "AND",
            TokenKind::Or => "OR",
            TokenKind::Not => "NOT",
            TokenKind::True => "TRUE",
            TokenKind::False => "FALSE",
            TokenKind::None => "NONE",
            TokenKind::Import => "IMPORT",
            TokenKind::From => "FROM",
            TokenKind::As => "AS",
            TokenKind::Plus => "PLUS",
            TokenKind::Minus => "MINUS",
            TokenKind::Star => "STAR",
            TokenKind::Slash => "SLASH",
            TokenKind::DoubleSlash => "DOUBLE_SLASH",
            TokenKind::Percent => "PERCENT",
            TokenKind::Assign => "ASSIGN",
            TokenKind::EqEq => "EQ",
            TokenKind::NotEq => "NE",
            TokenKind::Less => "LT",
            TokenKind::LessEq => "LE",
            TokenKind::Greater => "GT",
            TokenKind::GreaterEq => "GE",
            TokenKind::Arrow => "ARROW",
            TokenKind::LParen => "LPAREN",
            TokenKind::RParen => "RPAREN",
            TokenKind::LBracket => "LBRACKET",
            TokenKind::RBracket => "RBRACKET",
            TokenKind::LBrace => "LBRACE",
            TokenKind::RBrace => "RBRACE",
            TokenKind::Comma => "COMMA",
            TokenKind::Colon => "COLON",
            TokenKind::Semicolon => "SEMICOLON",
            TokenKind::Dot => "DOT",
            TokenKind::Newline => "NEWLINE",
            TokenKind::Indent => "INDENT",
            TokenKind::Dedent => "DEDENT",
            TokenKind::Eof => "EOF",
            TokenKind::Error => "ERROR",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single token with its kind and source position.
///
/// `lexeme` is only populated for numbers, strings (with escapes
/// already decoded), identifiers and error tokens (the message).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: Option<String>,
    pub line: usize,
    pub column: usize,
}

impl Token {
    pub fn text(&self) -> &str {
        self.lexeme.as_deref().unwrap_or("")
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.lexeme {
            Some(text) => write!(f, "{}({:?})", self.kind, text),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// Lex a source string into tokens.
///
/// The sequence ends with `Eof` on success, or with a single `Error`
/// token at the first failure.
pub fn lex(source: &str) -> Vec<Token> {
    let lexer = Lexer {
        source,
        chars: source.as_bytes(),
        index: 0,
        line: 1,
        line_start: 0,
        at_line_start: true,
        indents: vec![0],
        tokens: Vec::new(),
    };
    lexer.run()
}

/// Lex a source string, turning a trailing `Error` token into an error.
pub fn tokenize(source: &str) -> Result<Vec<Token>, CoreError> {
    let tokens = lex(source);
    if let Some(token) = tokens.last() {
        if token.kind == TokenKind::Error {
            return Err(CoreError::LexError {
                line: token.line,
                column: token.column,
                message: token.text().to_string(),
            });
        }
    }
    Ok(tokens)
}

/// Render tokens one per line, e.g. `NUMBER("1")`.
pub fn dump_tokens(tokens: &[Token]) -> String {
    let mut out = String::new();
    for token in tokens {
        out.push_str(&format!("{}:{} {}\n", token.line, token.column, token));
    }
    out
}

struct Lexer<'src> {
    source: &'src str,
    chars: &'src [u8],
    index: usize,
    line: usize,
    line_start: usize,
    at_line_start: bool,
    indents: Vec<usize>,
    tokens: Vec<Token>,
}

impl<'src> Lexer<'src> {
    fn run(mut self) -> Vec<Token> {
        while let Some(ch) = self.peek_char() {
            if self.at_line_start {
                self.at_line_start = false;
                if !self.measure_indentation() {
                    return self.tokens;
                }
                continue;
            }

            match ch {
                b' ' | b'\t' | b'\r' => {
                    self.consume_char();
                    continue;
                }
                b'#' => {
                    while let Some(c) = self.peek_char() {
                        if c == b'\n' {
                            break;
                        }
                        self.consume_char();
                    }
                    continue;
                }
                b'\n' => {
                    self.simple_token(TokenKind::Newline);
                    self.consume_char();
                    self.line += 1;
                    self.line_start = self.index;
                    self.at_line_start = true;
                    continue;
                }
                _ => {}
            }

            let ok = match ch {
                b'(' => self.single(TokenKind::LParen),
                b')' => self.single(TokenKind::RParen),
                b'[' => self.single(TokenKind::LBracket),
                b']' => self.single(TokenKind::RBracket),
                b'{' => self.single(TokenKind::LBrace),
                b'}' => self.single(TokenKind::RBrace),
                b',' => self.single(TokenKind::Comma),
                b':' => self.single(TokenKind::Colon),
                b';' => self.single(TokenKind::Semicolon),
                b'.' => self.single(TokenKind::Dot),
                b'+' => self.single(TokenKind::Plus),
                b'*' => self.single(TokenKind::Star),
                b'%' => self.single(TokenKind::Percent),
                b'-' => self.pair(b'>', TokenKind::Arrow, TokenKind::Minus),
                b'/' => self.pair(b'/', TokenKind::DoubleSlash, TokenKind::Slash),
                b'=' => self.pair(b'=', TokenKind::EqEq, TokenKind::Assign),
                b'<' => self.pair(b'=', TokenKind::LessEq, TokenKind::Less),
                b'>' => self.pair(b'=', TokenKind::GreaterEq, TokenKind::Greater),
                b'!' => {
                    if self.peek_next() == Some(b'=') {
                        self.simple_token(TokenKind::NotEq);
                        self.consume_char();
                        self.consume_char();
                        true
                    } else {
                        self.error("unexpected character '!'".to_string())
                    }
                }
                b'"' | b'\'' => self.lex_string(ch),
                b'0'..=b'9' => self.lex_number(),
                _ if is_ident_start(ch) => self.lex_ident_or_keyword(),
                _ => {
                    let found = self.source[self.index..].chars().next().unwrap_or('?');
                    self.error(format!("unexpected character '{found}'"))
                }
            };
            if !ok {
                return self.tokens;
            }
        }

        while self.indents.len() > 1 {
            self.indents.pop();
            self.structural(TokenKind::Dedent);
        }
        self.structural(TokenKind::Eof);
        self.tokens
    }

    /// Measure the leading whitespace of a line and emit the matching
    /// structural tokens. Returns false after emitting an `Error`.
    fn measure_indentation(&mut self) -> bool {
        let mut width = 0;
        while let Some(ch) = self.peek_char() {
            match ch {
                b' ' => width += 1,
                b'\t' => width += TAB_WIDTH,
                _ => break,
            }
            self.consume_char();
        }

        // blank and comment-only lines never open or close blocks
        if matches!(self.peek_char(), None | Some(b'\n' | b'\r' | b'#')) {
            return true;
        }

        let top = self.current_indent();
        if width > top {
            self.indents.push(width);
            self.structural(TokenKind::Indent);
        } else if width < top {
            while self.current_indent() > width {
                self.indents.pop();
                self.structural(TokenKind::Dedent);
            }
            if self.current_indent() != width {
                return self.error("indentation mismatch".to_string());
            }
        }
        true
    }

    fn current_indent(&self) -> usize {
        self.indents.last().copied().unwrap_or(0)
    }

    fn lex_string(&mut self, quote: u8) -> bool {
        let (line, column) = self.position();
        self.consume_char();

        let mut bytes = Vec::new();
        loop {
            match self.peek_char() {
                None | Some(b'\n') => {
                    return self.error("unterminated string literal".to_string());
                }
                Some(ch) if ch == quote => {
                    self.consume_char();
                    break;
                }
                Some(b'\\') => {
                    self.consume_char();
                    let escaped = match self.peek_char() {
                        Some(b'n') => Some(b'\n'),
                        Some(b't') => Some(b'\t'),
                        Some(b'r') => Some(b'\r'),
                        Some(b'\\') => Some(b'\\'),
                        Some(b'"') => Some(b'"'),
                        Some(b'\'') => Some(b'\''),
                        _ => None,
                    };
                    match escaped {
                        Some(byte) => {
                            bytes.push(byte);
                            self.consume_char();
                        }
                        // unknown escapes keep their backslash
                        None => bytes.push(b'\\'),
                    }
                }
                Some(ch) => {
                    bytes.push(ch);
                    self.consume_char();
                }
            }
        }

        match String::from_utf8(bytes) {
            Ok(text) => {
                self.tokens.push(Token {
                    kind: TokenKind::String,
                    lexeme: Some(text),
                    line,
                    column,
                });
                true
            }
            Err(_) => self.error("string literal is not valid UTF-8".to_string()),
        }
    }

    fn lex_number(&mut self) -> bool {
        let start = self.index;
        let (line, column) = self.position();
        self.skip_digits();

        // a '.' only belongs to the number when a digit follows it
        if self.peek_char() == Some(b'.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            self.consume_char();
            self.skip_digits();
        }

        self.tokens.push(Token {
            kind: TokenKind::Number,
            lexeme: Some(self.source[start..self.index].to_string()),
            line,
            column,
        });
        true
    }

    fn skip_digits(&mut self) {
        while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
            self.consume_char();
        }
    }

    fn lex_ident_or_keyword(&mut self) -> bool {
        let start = self.index;
        let (line, column) = self.position();
        while self.peek_char().is_some_and(is_ident_continue) {
            self.consume_char();
        }
        let text = &self.source[start..self.index];

        let kind = match text {
            "def" => TokenKind::Def,
            "class" => TokenKind::Class,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "elif" => TokenKind::Elif,
            "while" => TokenKind::While,
            "for" => TokenKind::For,
            "break" => TokenKind::Break,
            "continue" => TokenKind::Continue,
            "return" => TokenKind::Return,
            "pass" => TokenKind::Pass,
            "match" => TokenKind::Match,
            "case" => TokenKind::Case,
            "in" => TokenKind::In,
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "not" => TokenKind::Not,
            "True" => TokenKind::True,
            "False" => TokenKind::False,
            "None" => TokenKind::None,
            "import" => TokenKind::Import,
            "from" => TokenKind::From,
            "as" => TokenKind::As,
            _ => TokenKind::Identifier,
        };

        let lexeme = (kind == TokenKind::Identifier).then(|| text.to_string());
        self.tokens.push(Token {
            kind,
            lexeme,
            line,
            column,
        });
        true
    }

    fn single(&mut self, kind: TokenKind) -> bool {
        self.simple_token(kind);
        self.consume_char();
        true
    }

    /// One-character lookahead for two-character operators.
    fn pair(&mut self, second: u8, double: TokenKind, single: TokenKind) -> bool {
        if self.peek_next() == Some(second) {
            self.simple_token(double);
            self.consume_char();
            self.consume_char();
        } else {
            self.simple_token(single);
            self.consume_char();
        }
        true
    }

    fn simple_token(&mut self, kind: TokenKind) {
        let (line, column) = self.position();
        self.tokens.push(Token {
            kind,
            lexeme: None,
            line,
            column,
        });
    }

    fn structural(&mut self, kind: TokenKind) {
        self.tokens.push(Token {
            kind,
            lexeme: None,
            line: self.line,
            column: 1,
        });
    }

    fn error(&mut self, message: String) -> bool {
        let (line, column) = self.position();
        self.tokens.push(Token {
            kind: TokenKind::Error,
            lexeme: Some(message),
            line,
            column,
        });
        false
    }

    fn position(&self) -> (usize, usize) {
        (self.line, self.index - self.line_start + 1)
    }

    fn peek_char(&self) -> Option<u8> {
        self.chars.get(self.index).copied()
    }

    fn peek_next(&self) -> Option<u8> {
        self.chars.get(self.index + 1).copied()
    }

    fn consume_char(&mut self) {
        if self.index < self.chars.len() {
            self.index += 1;
        }
    }
}

fn is_ident_start(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || ch == b'_'
}

fn is_ident_continue(ch: u8) -> bool {
    is_ident_start(ch) || ch.is_ascii_digit()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(source).into_iter().map(|token| token.kind).collect()
    }

    #[test]
    fn lexes_minimal_program() {
        use TokenKind::*;
        let tokens = lex("def main():\n    print(1)\n");
        let kinds: Vec<_> = tokens.iter().map(|token| token.kind).collect();
        assert_eq!(
            kinds,
            vec![
                Def, Identifier, LParen, RParen, Colon, Newline, Indent, Identifier, LParen,
                Number, RParen, Newline, Dedent, Eof
            ]
        );
        assert_eq!(tokens[9].text(), "1");
        assert_eq!(tokens[1].text(), "main");
    }

    #[test]
    fn balances_indent_and_dedent() {
        let source = "def f(x: int) -> int:\n    if x > 0:\n        while x > 1:\n            x = x - 1\n    return x\n\nclass P:\n    a: int\n";
        let kinds = kinds(source);
        let indents = kinds.iter().filter(|k| **k == TokenKind::Indent).count();
        let dedents = kinds.iter().filter(|k| **k == TokenKind::Dedent).count();
        assert_eq!(indents, 4);
        assert_eq!(indents, dedents);
        assert_eq!(kinds.last(), Some(&TokenKind::Eof));
    }

    #[test]
    fn unwinds_indentation_without_trailing_newline() {
        let kinds = kinds("def f():\n    if x:\n        pass");
        let dedents = kinds.iter().filter(|k| **k == TokenKind::Dedent).count();
        assert_eq!(dedents, 2);
    }

    #[test]
    fn reports_indentation_mismatch() {
        let tokens = lex("def main():\n    x = 1\n  y = 2\n");
        let last = tokens.last().expect("tokens");
        assert_eq!(last.kind, TokenKind::Error);
        assert_eq!(last.text(), "indentation mismatch");

        let err = tokenize("def main():\n    x = 1\n  y = 2\n").unwrap_err();
        assert!(matches!(err, CoreError::LexError { line: 3, .. }));
    }

    #[test]
    fn tab_counts_as_eight_columns() {
        let kinds = kinds("if x:\n\tpass\n        pass\n");
        let indents = kinds.iter().filter(|k| **k == TokenKind::Indent).count();
        assert_eq!(indents, 1);
        assert!(!kinds.contains(&TokenKind::Error));
    }

    #[test]
    fn blank_and_comment_lines_do_not_change_indentation() {
        let kinds = kinds("def f():\n    x = 1\n\n# note\n      # indented note\n    y = 2\n");
        let indents = kinds.iter().filter(|k| **k == TokenKind::Indent).count();
        assert_eq!(indents, 1);
        assert!(!kinds.contains(&TokenKind::Error));
    }

    #[test]
    fn recognizes_two_character_operators() {
        use TokenKind::*;
        assert_eq!(
            kinds("-> == != <= >= // - = < > /"),
            vec![Arrow, EqEq, NotEq, LessEq, GreaterEq, DoubleSlash, Minus, Assign, Less, Greater, Slash, Eof]
        );
    }

    #[test]
    fn rejects_lone_bang() {
        let err = tokenize("x = !y").unwrap_err();
        assert!(err.message().contains("'!'"));
    }

    #[test]
    fn distinguishes_int_and_float_numbers() {
        let tokens = lex("12 3.25");
        assert_eq!(tokens[0].text(), "12");
        assert_eq!(tokens[1].text(), "3.25");
    }

    #[test]
    fn decodes_string_escapes() {
        let tokens = lex(r#""a\nb\t\"q\"" 'it\'s' "\d""#);
        assert_eq!(tokens[0].text(), "a\nb\t\"q\"");
        assert_eq!(tokens[1].text(), "it's");
        assert_eq!(tokens[2].text(), "\\d");
    }

    #[test]
    fn rejects_unterminated_string() {
        let err = tokenize("x = \"abc\n").unwrap_err();
        assert_eq!(err.message(), "unterminated string literal");
    }

    #[test]
    fn maps_reserved_words_to_keywords() {
        use TokenKind::*;
        assert_eq!(
            kinds("match case elif True None from import as notx"),
            vec![Match, Case, Elif, True, None, From, Import, As, Identifier, Eof]
        );
    }

    #[test]
    fn dumps_tokens_with_lexemes() {
        let dump = dump_tokens(&lex("print(1)"));
        assert!(dump.contains("IDENTIFIER(\"print\")"));
        assert!(dump.contains("NUMBER(\"1\")"));
        assert!(dump.trim_end().ends_with("EOF"));
    }
}
