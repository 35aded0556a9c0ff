use kiln_ast::span::Pos;

#[derive(Debug, Clone, PartialEq)]
pub enum TokKind {
    Eof,
    /// Lexical error (unterminated string, unknown `#` syntax)
    Error(String),
    LParen,
    RParen,
    Quote,
    Number(f64),
    Str(String),
    Bool(bool),
    Symbol(String),
}

#[derive(Debug, Clone)]
pub struct Tok {
    pub kind: TokKind,
    pub start: Pos,
    pub end: Pos,
    /// Char offsets into the source, `[lo, hi)`.
    pub lo: usize,
    pub hi: usize,
}
