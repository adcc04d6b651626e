//! Lexer for the C subset.
//!
//! The lexer converts source text into a stream of tokens. Preprocessor
//! lines are consumed here: `#pragma` lines become a single [`TokenKind::Pragma`]
//! token carrying the directive text, every other directive is skipped.

use crate::frontend::token::{Token, TokenKind};
use crate::utils::errors::{LexerError, LexerErrorKind};
use crate::utils::location::{SourceLocation, Span};
use std::iter::Peekable;
use std::str::Chars;
use unicode_xid::UnicodeXID;

/// A lexer for tokenizing source code.
pub struct Lexer<'a> {
    /// The source text
    source: &'a str,
    /// Character iterator
    chars: Peekable<Chars<'a>>,
    /// Current byte offset
    offset: usize,
    /// Current line number (1-indexed)
    line: usize,
    /// Current column number (1-indexed)
    column: usize,
    /// Start of current token
    token_start: SourceLocation,
    /// No token has been produced on the current line yet
    line_start: bool,
    /// Whether we've hit EOF
    at_eof: bool,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given source.
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.chars().peekable(),
            offset: 0,
            line: 1,
            column: 1,
            token_start: SourceLocation::start(),
            line_start: true,
            at_eof: false,
        }
    }

    fn current_location(&self) -> SourceLocation {
        SourceLocation::new(self.line, self.column, self.offset)
    }

    fn mark_token_start(&mut self) {
        self.token_start = self.current_location();
    }

    fn make_span(&self) -> Span {
        Span::from_locations(self.token_start, self.current_location())
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    /// Peek one character past the current one.
    fn peek_next(&self) -> Option<char> {
        let mut chars = self.source[self.offset..].chars();
        chars.next();
        chars.next()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        self.offset += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
            self.line_start = true;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn peek_is(&mut self, pred: impl Fn(char) -> bool) -> bool {
        self.peek().map(pred).unwrap_or(false)
    }

    /// Skip whitespace and comments.
    fn skip_whitespace(&mut self) -> Result<(), LexerError> {
        loop {
            match self.peek() {
                Some(' ') | Some('\t') | Some('\r') | Some('\n') | Some('\x0c') => {
                    self.advance();
                }
                Some('\\') if self.peek_next() == Some('\n') => {
                    self.advance();
                    self.advance();
                }
                Some('/') if self.peek_next() == Some('/') => {
                    while self.peek().is_some() && self.peek() != Some('\n') {
                        self.advance();
                    }
                }
                Some('/') if self.peek_next() == Some('*') => {
                    self.mark_token_start();
                    self.advance();
                    self.advance();
                    loop {
                        match self.advance() {
                            Some('*') if self.peek() == Some('/') => {
                                self.advance();
                                break;
                            }
                            Some(_) => {}
                            None => {
                                return Err(self.make_error(
                                    "Unterminated block comment",
                                    LexerErrorKind::UnterminatedComment,
                                ))
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn make_token(&self, kind: TokenKind) -> Token {
        let span = self.make_span();
        let lexeme = self.source[span.start_offset..span.end_offset].to_string();
        Token::new(kind, span, lexeme)
    }

    fn make_error(&self, message: &str, kind: LexerErrorKind) -> LexerError {
        LexerError {
            message: message.to_string(),
            span: self.make_span(),
            kind,
        }
    }

    /// Scan a preprocessor line. `#` is already consumed.
    ///
    /// Returns `None` for directives other than `#pragma`.
    fn scan_directive(&mut self) -> Option<Token> {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            if c == '\\' && self.peek_next() == Some('\n') {
                self.advance();
                self.advance();
                text.push(' ');
                continue;
            }
            text.push(c);
            self.advance();
        }
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if text == "pragma" || text.starts_with("pragma ") {
            Some(Token::new(TokenKind::Pragma, self.make_span(), text))
        } else {
            log::trace!("skipping preprocessor line #{}", text);
            None
        }
    }

    /// Scan a number literal, including hex prefixes and C suffixes.
    fn scan_number(&mut self, first: char) -> Result<Token, LexerError> {
        let mut is_float = false;

        if first == '0' && matches!(self.peek(), Some('x') | Some('X')) {
            self.advance();
            if !self.peek_is(|c| c.is_ascii_hexdigit()) {
                return Err(self.make_error("Invalid hexadecimal literal", LexerErrorKind::InvalidNumber));
            }
            while self.peek_is(|c| c.is_ascii_hexdigit()) {
                self.advance();
            }
        } else {
            while self.peek_is(|c| c.is_ascii_digit()) {
                self.advance();
            }
            if first == '.' {
                is_float = true;
            } else if self.peek() == Some('.') {
                is_float = true;
                self.advance();
                while self.peek_is(|c| c.is_ascii_digit()) {
                    self.advance();
                }
            }
            if matches!(self.peek(), Some('e') | Some('E')) {
                is_float = true;
                self.advance();
                if matches!(self.peek(), Some('+') | Some('-')) {
                    self.advance();
                }
                if !self.peek_is(|c| c.is_ascii_digit()) {
                    return Err(self.make_error(
                        "Invalid floating-point exponent",
                        LexerErrorKind::InvalidNumber,
                    ));
                }
                while self.peek_is(|c| c.is_ascii_digit()) {
                    self.advance();
                }
            }
        }

        while let Some(c) = self.peek() {
            match c {
                'u' | 'U' | 'l' | 'L' => {
                    self.advance();
                }
                'f' | 'F' if is_float => {
                    self.advance();
                }
                _ => break,
            }
        }

        if is_float {
            Ok(self.make_token(TokenKind::Float))
        } else {
            Ok(self.make_token(TokenKind::Integer))
        }
    }

    /// Scan an identifier or keyword.
    fn scan_identifier(&mut self) -> Token {
        while self.peek_is(|c| c.is_xid_continue() || c == '_') {
            self.advance();
        }
        let span = self.make_span();
        let lexeme = &self.source[span.start_offset..span.end_offset];
        let kind = TokenKind::keyword(lexeme).unwrap_or(TokenKind::Identifier);
        Token::new(kind, span, lexeme.to_string())
    }

    /// Scan a string or character literal. The opening quote is consumed.
    fn scan_quoted(&mut self, quote: char, kind: TokenKind) -> Result<Token, LexerError> {
        loop {
            match self.advance() {
                Some(c) if c == quote => break,
                Some('\\') => {
                    if self.advance().is_none() {
                        return Err(self.make_error(
                            "Unterminated literal",
                            LexerErrorKind::UnterminatedString,
                        ));
                    }
                }
                Some('\n') | None => {
                    return Err(self.make_error(
                        "Unterminated literal",
                        LexerErrorKind::UnterminatedString,
                    ));
                }
                Some(_) => {}
            }
        }
        Ok(self.make_token(kind))
    }

    /// Pick between `base`, `base=` and an optional doubled form.
    fn operator(&mut self, c: char, single: TokenKind, assign: TokenKind, doubled: Option<TokenKind>) -> Token {
        if let Some(doubled) = doubled {
            if self.match_char(c) {
                return self.make_token(doubled);
            }
        }
        if self.match_char('=') {
            self.make_token(assign)
        } else {
            self.make_token(single)
        }
    }

    /// Scan the next token.
    pub fn next_token(&mut self) -> Result<Token, LexerError> {
        loop {
            self.skip_whitespace()?;
            self.mark_token_start();
            if self.peek() == Some('#') && self.line_start {
                self.advance();
                if let Some(pragma) = self.scan_directive() {
                    return Ok(pragma);
                }
                continue;
            }
            break;
        }

        let c = match self.advance() {
            Some(c) => c,
            None => {
                self.at_eof = true;
                return Ok(self.make_token(TokenKind::Eof));
            }
        };
        self.line_start = false;

        use TokenKind::*;
        let token = match c {
            '(' => self.make_token(LeftParen),
            ')' => self.make_token(RightParen),
            '[' => self.make_token(LeftBracket),
            ']' => self.make_token(RightBracket),
            '{' => self.make_token(LeftBrace),
            '}' => self.make_token(RightBrace),
            ',' => self.make_token(Comma),
            ';' => self.make_token(Semicolon),
            ':' => self.make_token(Colon),
            '?' => self.make_token(Question),
            '~' => self.make_token(Tilde),
            '.' if self.peek_is(|c| c.is_ascii_digit()) => return self.scan_number('.'),
            '.' => self.make_token(Dot),

            '+' => self.operator('+', Plus, PlusEqual, Some(PlusPlus)),
            '-' => {
                if self.match_char('>') {
                    self.make_token(Arrow)
                } else {
                    self.operator('-', Minus, MinusEqual, Some(MinusMinus))
                }
            }
            '*' => self.operator('*', Star, StarEqual, None),
            '/' => self.operator('/', Slash, SlashEqual, None),
            '%' => self.operator('%', Percent, PercentEqual, None),
            '^' => self.operator('^', Caret, CaretEqual, None),
            '=' => self.operator('=', Equal, EqualEqual, None),
            '!' => self.operator('!', Bang, BangEqual, None),
            '&' => self.operator('&', Amp, AmpEqual, Some(AmpAmp)),
            '|' => self.operator('|', Pipe, PipeEqual, Some(PipePipe)),
            '<' => {
                if self.match_char('<') {
                    self.operator('<', LessLess, LessLessEqual, None)
                } else {
                    self.operator('<', Less, LessEqual, None)
                }
            }
            '>' => {
                if self.match_char('>') {
                    self.operator('>', GreaterGreater, GreaterGreaterEqual, None)
                } else {
                    self.operator('>', Greater, GreaterEqual, None)
                }
            }

            '"' => return self.scan_quoted('"', TokenKind::String),
            '\'' => return self.scan_quoted('\'', TokenKind::Char),

            c if c.is_ascii_digit() => return self.scan_number(c),
            c if c.is_xid_start() || c == '_' => self.scan_identifier(),

            _ => {
                return Err(self.make_error(
                    &format!("Unexpected character: '{}'", c),
                    LexerErrorKind::UnexpectedChar,
                ))
            }
        };
        Ok(token)
    }

    /// Check if we've reached EOF.
    pub fn is_at_end(&self) -> bool {
        self.at_eof
    }

    /// Collect all tokens into a vector.
    pub fn tokenize(mut self) -> Result<Vec<Token>, LexerError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let is_eof = token.is_eof();
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<Token, LexerError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.at_eof {
            None
        } else {
            let result = self.next_token();
            if result.as_ref().map(|t| t.is_eof()).unwrap_or(true) {
                self.at_eof = true;
            }
            Some(result)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<Token> {
        Lexer::new(source).tokenize().unwrap()
    }

    fn token_kinds(source: &str) -> Vec<TokenKind> {
        lex(source).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_empty() {
        let tokens = lex("");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::Eof);
    }

    #[test]
    fn test_keywords_and_identifiers() {
        let kinds = token_kinds("for int n_1 while");
        assert_eq!(
            kinds,
            vec![
                TokenKind::For,
                TokenKind::Int,
                TokenKind::Identifier,
                TokenKind::While,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_numbers() {
        let tokens = lex("123 45.67 1e10 0x1F 10UL 2.5f .5");
        assert_eq!(tokens[0].kind, TokenKind::Integer);
        assert_eq!(tokens[1].kind, TokenKind::Float);
        assert_eq!(tokens[2].kind, TokenKind::Float);
        assert_eq!(tokens[3].kind, TokenKind::Integer);
        assert_eq!(tokens[3].lexeme, "0x1F");
        assert_eq!(tokens[4].lexeme, "10UL");
        assert_eq!(tokens[5].lexeme, "2.5f");
        assert_eq!(tokens[6].kind, TokenKind::Float);
    }

    #[test]
    fn test_c_operators() {
        let kinds = token_kinds("i++ --j a->b x <<= 2 y >> 1 p & q && r |= s ? t : u");
        assert!(kinds.contains(&TokenKind::PlusPlus));
        assert!(kinds.contains(&TokenKind::MinusMinus));
        assert!(kinds.contains(&TokenKind::Arrow));
        assert!(kinds.contains(&TokenKind::LessLessEqual));
        assert!(kinds.contains(&TokenKind::GreaterGreater));
        assert!(kinds.contains(&TokenKind::Amp));
        assert!(kinds.contains(&TokenKind::AmpAmp));
        assert!(kinds.contains(&TokenKind::PipeEqual));
        assert!(kinds.contains(&TokenKind::Question));
    }

    #[test]
    fn test_pragma_kept_other_directives_skipped() {
        let tokens = lex("#include <stdio.h>\n#define N 10\n  #pragma acc parallel loop\nfor");
        assert_eq!(tokens[0].kind, TokenKind::Pragma);
        assert_eq!(tokens[0].lexeme, "pragma acc parallel loop");
        assert_eq!(tokens[1].kind, TokenKind::For);
    }

    #[test]
    fn test_hash_mid_line_is_error() {
        assert!(Lexer::new("x # y").tokenize().is_err());
    }

    #[test]
    fn test_comments() {
        let tokens = lex("foo // comment\nbar /* block\n comment */ baz");
        assert_eq!(tokens[0].lexeme, "foo");
        assert_eq!(tokens[1].lexeme, "bar");
        assert_eq!(tokens[2].lexeme, "baz");
        assert_eq!(tokens[2].span.start_line, 3);
    }

    #[test]
    fn test_unterminated_comment() {
        let err = Lexer::new("a /* never closed").tokenize().unwrap_err();
        assert_eq!(err.kind, LexerErrorKind::UnterminatedComment);
    }

    #[test]
    fn test_string_and_char_literals() {
        let tokens = lex(r#"printf("a\"b", 'c', '\n')"#);
        assert_eq!(tokens[2].kind, TokenKind::String);
        assert_eq!(tokens[4].kind, TokenKind::Char);
        assert_eq!(tokens[6].kind, TokenKind::Char);
    }

    #[test]
    fn test_location_tracking() {
        let tokens = lex("foo\n  bar");
        assert_eq!(tokens[0].span.start_line, 1);
        assert_eq!(tokens[1].span.start_line, 2);
        assert_eq!(tokens[1].span.start_column, 3);
    }
}
