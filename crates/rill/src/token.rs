//! Token categories produced by the [`crate::lexer::Lexer`].

use crate::error::Coords;

/// Terminal category of a token.
///
/// Most categories carry no payload; the lexer instead records the payload
/// (identifier text, literal value, anonymous-argument index) as the
/// "last-*" fields on [`crate::lexer::Lexer`] itself, mirroring the
/// single-token-lookahead design of the original C++ lexer this was
/// distilled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Structural
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Semicolon,
    Comma,
    Dot,
    Colon,
    DoubleColon,
    Arrow,
    Shl,
    Shr,
    Hash,
    Underscore,

    // Literals / names
    Int,
    Float,
    String,
    Bool,
    Identifier,

    // Anonymous arguments
    Dollar,
    DollarIndex,
    DollarDollar,

    // Keywords
    If,
    Elif,
    Else,
    For,
    In,
    While,
    This,
    Nil,
    Return,
    Break,
    Continue,
    Yield,
    And,
    Or,
    Xor,
    Not,

    // Operators
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    CaretAssign,
    PercentAssign,
    TildeAssign,
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    Tilde,

    NewLine,
    Eof,
    Invalid,
}

impl TokenKind {
    /// True for tokens that terminate an expression (§4.2 "Expression terminators").
    #[must_use]
    pub fn is_expr_terminator(self) -> bool {
        matches!(
            self,
            Self::NewLine
                | Self::Semicolon
                | Self::Comma
                | Self::RParen
                | Self::RBracket
                | Self::RBrace
                | Self::Else
                | Self::Elif
                | Self::In
                | Self::Eof
        )
    }
}

/// A token as returned by the lexer: category plus source coordinates.
///
/// Payload (identifier name, literal value, etc.) is read off the lexer's
/// `last_*` fields immediately after the call that produced this token, per
/// §4.1's public contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub at: Coords,
}

impl Token {
    #[must_use]
    pub fn new(kind: TokenKind, at: Coords) -> Self {
        Self { kind, at }
    }
}
