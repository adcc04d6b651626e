//! Token types for the C subset.
//!
//! This module defines all token types produced by the lexer.

use crate::utils::location::Span;
use std::fmt;

/// A token in the source code.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// The kind of token
    pub kind: TokenKind,
    /// The source span
    pub span: Span,
    /// The lexeme (raw text; the directive text for pragmas)
    pub lexeme: String,
}

impl Token {
    /// Create a new token.
    pub fn new(kind: TokenKind, span: Span, lexeme: String) -> Self {
        Self { kind, span, lexeme }
    }

    /// Check if this is an EOF token.
    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self.kind, self.lexeme)
    }
}

/// The kind of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Literals
    /// Integer literal
    Integer,
    /// Floating-point literal
    Float,
    /// Character literal
    Char,
    /// String literal
    String,

    /// Identifier
    Identifier,
    /// `#pragma ...` line
    Pragma,

    // Statement keywords
    /// `for`
    For,
    /// `while`
    While,
    /// `do`
    Do,
    /// `if`
    If,
    /// `else`
    Else,
    /// `switch`
    Switch,
    /// `case`
    Case,
    /// `default`
    Default,
    /// `break`
    Break,
    /// `continue`
    Continue,
    /// `return`
    Return,
    /// `goto`
    Goto,
    /// `sizeof`
    Sizeof,

    // Type keywords
    /// `void`
    Void,
    /// `char`
    CharType,
    /// `short`
    Short,
    /// `int`
    Int,
    /// `long`
    Long,
    /// `float`
    FloatType,
    /// `double`
    Double,
    /// `signed`
    Signed,
    /// `unsigned`
    Unsigned,
    /// `const`
    Const,
    /// `volatile`
    Volatile,
    /// `static`
    Static,
    /// `extern`
    Extern,
    /// `register`
    Register,
    /// `inline`
    Inline,
    /// `restrict`
    Restrict,
    /// `struct`
    Struct,
    /// `union`
    Union,

    // Arithmetic operators
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `%`
    Percent,
    /// `++`
    PlusPlus,
    /// `--`
    MinusMinus,

    // Bitwise operators
    /// `&`
    Amp,
    /// `|`
    Pipe,
    /// `^`
    Caret,
    /// `~`
    Tilde,
    /// `<<`
    LessLess,
    /// `>>`
    GreaterGreater,

    // Comparison operators
    /// `==`
    EqualEqual,
    /// `!=`
    BangEqual,
    /// `<`
    Less,
    /// `<=`
    LessEqual,
    /// `>`
    Greater,
    /// `>=`
    GreaterEqual,

    // Assignment operators
    /// `=`
    Equal,
    /// `+=`
    PlusEqual,
    /// `-=`
    MinusEqual,
    /// `*=`
    StarEqual,
    /// `/=`
    SlashEqual,
    /// `%=`
    PercentEqual,
    /// `&=`
    AmpEqual,
    /// `|=`
    PipeEqual,
    /// `^=`
    CaretEqual,
    /// `<<=`
    LessLessEqual,
    /// `>>=`
    GreaterGreaterEqual,

    // Logical operators
    /// `&&`
    AmpAmp,
    /// `||`
    PipePipe,
    /// `!`
    Bang,

    // Delimiters
    /// `(`
    LeftParen,
    /// `)`
    RightParen,
    /// `[`
    LeftBracket,
    /// `]`
    RightBracket,
    /// `{`
    LeftBrace,
    /// `}`
    RightBrace,
    /// `,`
    Comma,
    /// `;`
    Semicolon,
    /// `:`
    Colon,
    /// `?`
    Question,
    /// `.`
    Dot,
    /// `->`
    Arrow,

    /// End of file
    Eof,
}

impl TokenKind {
    /// Check if this keyword can start a declaration.
    pub fn is_type_keyword(&self) -> bool {
        use TokenKind::*;
        matches!(
            self,
            Void | CharType | Short | Int | Long | FloatType | Double | Signed | Unsigned | Const
                | Volatile | Static | Extern | Register | Inline | Restrict | Struct | Union
        )
    }

    /// Check if this is an assignment operator.
    pub fn is_assignment(&self) -> bool {
        use TokenKind::*;
        matches!(
            self,
            Equal
                | PlusEqual
                | MinusEqual
                | StarEqual
                | SlashEqual
                | PercentEqual
                | AmpEqual
                | PipeEqual
                | CaretEqual
                | LessLessEqual
                | GreaterGreaterEqual
        )
    }

    /// Get the keyword for a string, if it is a keyword.
    pub fn keyword(s: &str) -> Option<TokenKind> {
        use TokenKind::*;
        let kind = match s {
            "for" => For,
            "while" => While,
            "do" => Do,
            "if" => If,
            "else" => Else,
            "switch" => Switch,
            "case" => Case,
            "default" => Default,
            "break" => Break,
            "continue" => Continue,
            "return" => Return,
            "goto" => Goto,
            "sizeof" => Sizeof,
            "void" => Void,
            "char" => CharType,
            "short" => Short,
            "int" => Int,
            "long" => Long,
            "float" => FloatType,
            "double" => Double,
            "signed" => Signed,
            "unsigned" => Unsigned,
            "const" => Const,
            "volatile" => Volatile,
            "static" => Static,
            "extern" => Extern,
            "register" => Register,
            "inline" => Inline,
            "restrict" => Restrict,
            "struct" => Struct,
            "union" => Union,
            _ => return None,
        };
        Some(kind)
    }

    /// Get a human-readable name for this token kind.
    pub fn name(&self) -> &'static str {
        use TokenKind::*;
        match self {
            Integer => "integer",
            Float => "float literal",
            Char => "character literal",
            String => "string",
            Identifier => "identifier",
            Pragma => "#pragma",
            For => "for",
            While => "while",
            Do => "do",
            If => "if",
            Else => "else",
            Switch => "switch",
            Case => "case",
            Default => "default",
            Break => "break",
            Continue => "continue",
            Return => "return",
            Goto => "goto",
            Sizeof => "sizeof",
            Void => "void",
            CharType => "char",
            Short => "short",
            Int => "int",
            Long => "long",
            FloatType => "float",
            Double => "double",
            Signed => "signed",
            Unsigned => "unsigned",
            Const => "const",
            Volatile => "volatile",
            Static => "static",
            Extern => "extern",
            Register => "register",
            Inline => "inline",
            Restrict => "restrict",
            Struct => "struct",
            Union => "union",
            Plus => "+",
            Minus => "-",
            Star => "*",
            Slash => "/",
            Percent => "%",
            PlusPlus => "++",
            MinusMinus => "--",
            Amp => "&",
            Pipe => "|",
            Caret => "^",
            Tilde => "~",
            LessLess => "<<",
            GreaterGreater => ">>",
            EqualEqual => "==",
            BangEqual => "!=",
            Less => "<",
            LessEqual => "<=",
            Greater => ">",
            GreaterEqual => ">=",
            Equal => "=",
            PlusEqual => "+=",
            MinusEqual => "-=",
            StarEqual => "*=",
            SlashEqual => "/=",
            PercentEqual => "%=",
            AmpEqual => "&=",
            PipeEqual => "|=",
            CaretEqual => "^=",
            LessLessEqual => "<<=",
            GreaterGreaterEqual => ">>=",
            AmpAmp => "&&",
            PipePipe => "||",
            Bang => "!",
            LeftParen => "(",
            RightParen => ")",
            LeftBracket => "[",
            RightBracket => "]",
            LeftBrace => "{",
            RightBrace => "}",
            Comma => ",",
            Semicolon => ";",
            Colon => ":",
            Question => "?",
            Dot => ".",
            Arrow => "->",
            Eof => "end of file",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_lookup() {
        assert_eq!(TokenKind::keyword("for"), Some(TokenKind::For));
        assert_eq!(TokenKind::keyword("unsigned"), Some(TokenKind::Unsigned));
        assert_eq!(TokenKind::keyword("int32_t"), None);
    }

    #[test]
    fn test_type_keywords() {
        assert!(TokenKind::Double.is_type_keyword());
        assert!(TokenKind::Struct.is_type_keyword());
        assert!(!TokenKind::For.is_type_keyword());
    }

    #[test]
    fn test_is_assignment() {
        assert!(TokenKind::LessLessEqual.is_assignment());
        assert!(!TokenKind::EqualEqual.is_assignment());
    }
}
