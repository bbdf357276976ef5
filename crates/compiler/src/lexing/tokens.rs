//! Token kinds and the `Token` record the lexer produces.

use crate::source::Span;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Literals
    IntLiteral,
    FloatLiteral,
    StringLiteral,
    /// `"text${` — the head of an interpolated string.
    StringInterpStart,
    /// `}text${` — a middle segment of an interpolated string.
    StringInterpMiddle,
    /// `}text"` — the tail of an interpolated string.
    StringInterpEnd,
    CharLiteral,
    BoolLiteral,
    NilLiteral,

    Identifier,

    // Keywords
    KwFunc,
    KwVar,
    KwLet,
    KwClass,
    KwInterface,
    KwEnum,
    KwIf,
    KwElse,
    KwFor,
    KwWhile,
    KwReturn,
    KwImport,
    KwPackage,
    KwPublic,
    KwPrivate,
    KwProtected,
    KwThrow,
    KwTry,
    KwCatch,
    KwFinally,
    KwAsync,
    KwAwait,
    KwIo,
    KwCompute,
    KwUnsafe,
    KwShared,
    KwNew,
    KwMatch,
    KwOperator,
    KwExtern,
    KwIn,
    KwBreak,
    KwContinue,
    KwTrue,
    KwFalse,
    KwThis,
    KwCase,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Assign,
    Equal,
    NotEqual,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    And,
    Or,
    Not,
    Arrow,
    FatArrow,
    DotDot,
    QuestionMark,
    QuestionDot,
    DoubleQuestion,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,

    // Punctuation
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Semicolon,
    Colon,
    Comma,
    Dot,
    At,
    Ellipsis,

    // Comments (kept in the stream; the parser skips them, the formatter
    // doesn't exist in this crate so doc comments are the only ones ever
    // inspected, for attaching to the next declaration).
    LineComment,
    BlockComment,
    DocComment,

    EndOfFile,
    Error,
}

impl TokenKind {
    pub fn is_keyword(self) -> bool {
        matches!(
            self,
            TokenKind::KwFunc
                | TokenKind::KwVar
                | TokenKind::KwLet
                | TokenKind::KwClass
                | TokenKind::KwInterface
                | TokenKind::KwEnum
                | TokenKind::KwIf
                | TokenKind::KwElse
                | TokenKind::KwFor
                | TokenKind::KwWhile
                | TokenKind::KwReturn
                | TokenKind::KwImport
                | TokenKind::KwPackage
                | TokenKind::KwPublic
                | TokenKind::KwPrivate
                | TokenKind::KwProtected
                | TokenKind::KwThrow
                | TokenKind::KwTry
                | TokenKind::KwCatch
                | TokenKind::KwFinally
                | TokenKind::KwAsync
                | TokenKind::KwAwait
                | TokenKind::KwIo
                | TokenKind::KwCompute
                | TokenKind::KwUnsafe
                | TokenKind::KwShared
                | TokenKind::KwNew
                | TokenKind::KwMatch
                | TokenKind::KwOperator
                | TokenKind::KwExtern
                | TokenKind::KwIn
                | TokenKind::KwBreak
                | TokenKind::KwContinue
                | TokenKind::KwTrue
                | TokenKind::KwFalse
                | TokenKind::KwThis
                | TokenKind::KwCase
        )
    }

    pub fn is_literal(self) -> bool {
        matches!(
            self,
            TokenKind::IntLiteral
                | TokenKind::FloatLiteral
                | TokenKind::StringLiteral
                | TokenKind::CharLiteral
                | TokenKind::BoolLiteral
                | TokenKind::NilLiteral
        )
    }

    /// Keywords the lexer recognizes for forward compatibility but that the
    /// parser has no grammar production for yet. Used to turn an otherwise
    /// confusing parse error into a clear "reserved keyword" diagnostic.
    pub fn is_reserved_only(self) -> bool {
        matches!(
            self,
            TokenKind::KwUnsafe
                | TokenKind::KwShared
                | TokenKind::KwNew
                | TokenKind::KwPackage
                | TokenKind::KwCase
        )
    }
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, span: Span) -> Self {
        Token {
            kind,
            text: text.into(),
            span,
        }
    }

    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({:?})", self.kind, self.text)
    }
}

/// The reserved-word table, keyed by spelling. `true`/`false` map to
/// `BoolLiteral` rather than `KwTrue`/`KwFalse` directly — callers match on
/// the produced `TokenKind`, not this table, so that distinction is made by
/// the lexer, not duplicated at every call site.
pub fn lookup_keyword(ident: &str) -> Option<TokenKind> {
    Some(match ident {
        "func" => TokenKind::KwFunc,
        "var" => TokenKind::KwVar,
        "let" => TokenKind::KwLet,
        "class" => TokenKind::KwClass,
        "interface" => TokenKind::KwInterface,
        "enum" => TokenKind::KwEnum,
        "if" => TokenKind::KwIf,
        "else" => TokenKind::KwElse,
        "for" => TokenKind::KwFor,
        "while" => TokenKind::KwWhile,
        "return" => TokenKind::KwReturn,
        "import" => TokenKind::KwImport,
        "package" => TokenKind::KwPackage,
        "public" => TokenKind::KwPublic,
        "private" => TokenKind::KwPrivate,
        "protected" => TokenKind::KwProtected,
        "throw" => TokenKind::KwThrow,
        "try" => TokenKind::KwTry,
        "catch" => TokenKind::KwCatch,
        "finally" => TokenKind::KwFinally,
        "async" => TokenKind::KwAsync,
        "await" => TokenKind::KwAwait,
        "io" => TokenKind::KwIo,
        "compute" => TokenKind::KwCompute,
        "unsafe" => TokenKind::KwUnsafe,
        "shared" => TokenKind::KwShared,
        "new" => TokenKind::KwNew,
        "match" => TokenKind::KwMatch,
        "operator" => TokenKind::KwOperator,
        "extern" => TokenKind::KwExtern,
        "in" => TokenKind::KwIn,
        "break" => TokenKind::KwBreak,
        "continue" => TokenKind::KwContinue,
        "true" => TokenKind::BoolLiteral,
        "false" => TokenKind::BoolLiteral,
        "this" => TokenKind::KwThis,
        "case" => TokenKind::KwCase,
        "nil" => TokenKind::NilLiteral,
        _ => return None,
    })
}
