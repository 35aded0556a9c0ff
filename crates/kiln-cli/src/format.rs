//! `simple-format` templates.
//!
//! Directives: `~A` (display), `~S` (write), `~%` (newline), `~~` (tilde).
//! Diagnostic and result templates are compiled once per process and never
//! torn down.

use once_cell::sync::Lazy;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("unknown format directive `~{0}`")]
    UnknownDirective(char),
    #[error("format string ends with a lone `~`")]
    Dangling,
    #[error("format expects {expected} arguments, got {got}")]
    ArgCount { expected: usize, got: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Lit(String),
    Display,
    Write,
}

/// A parsed format string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pieces: Vec<Piece>,
}

/// One argument, pre-rendered both ways.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FmtArg {
    display: String,
    written: String,
}

impl FmtArg {
    pub fn new(display: impl Into<String>, written: impl Into<String>) -> Self {
        Self {
            display: display.into(),
            written: written.into(),
        }
    }

    /// Argument that prints the same under `~A` and `~S`.
    pub fn text(s: impl Into<String>) -> Self {
        let s = s.into();
        Self {
            display: s.clone(),
            written: s,
        }
    }
}

impl Template {
    pub fn parse(src: &str) -> Result<Self, FormatError> {
        let mut pieces = Vec::new();
        let mut lit = String::new();
        let mut chars = src.chars();
        while let Some(c) = chars.next() {
            if c != '~' {
                lit.push(c);
                continue;
            }
            match chars.next() {
                Some('~') => lit.push('~'),
                Some('%') => lit.push('\n'),
                Some(d @ ('A' | 'a' | 'S' | 's')) => {
                    if !lit.is_empty() {
                        pieces.push(Piece::Lit(std::mem::take(&mut lit)));
                    }
                    pieces.push(if d.eq_ignore_ascii_case(&'a') {
                        Piece::Display
                    } else {
                        Piece::Write
                    });
                }
                Some(other) => return Err(FormatError::UnknownDirective(other)),
                None => return Err(FormatError::Dangling),
            }
        }
        if !lit.is_empty() {
            pieces.push(Piece::Lit(lit));
        }
        Ok(Self { pieces })
    }

    /// Number of `~A` / `~S` slots.
    pub fn slots(&self) -> usize {
        self.pieces
            .iter()
            .filter(|p| !matches!(p, Piece::Lit(_)))
            .count()
    }

    pub fn render(&self, args: &[FmtArg]) -> Result<String, FormatError> {
        if args.len() != self.slots() {
            return Err(FormatError::ArgCount {
                expected: self.slots(),
                got: args.len(),
            });
        }
        let mut out = String::new();
        let mut args = args.iter();
        for piece in &self.pieces {
            match piece {
                Piece::Lit(s) => out.push_str(s),
                Piece::Display => out.push_str(args.next().map_or("", |a| a.display.as_str())),
                Piece::Write => out.push_str(args.next().map_or("", |a| a.written.as_str())),
            }
        }
        Ok(out)
    }
}

/// Parse and render in one step.
pub fn simple_format(fmt: &str, args: &[FmtArg]) -> Result<String, FormatError> {
    Template::parse(fmt)?.render(args)
}

/// Process-wide templates used to build reports.
pub struct Templates {
    /// Authoritative success value
    pub result: Template,
    /// key, message
    pub other_error: Template,
    /// function name, message
    pub in_function: Template,
    /// key, message, offending form
    pub syntax_error: Template,
    /// key, message, `(operation operands...)`
    pub numerical_overflow: Template,
}

const RESULT: &str = "~S";
const OTHER_ERROR: &str = "~A: ~A";
const IN_FUNCTION: &str = "In function ~A:~%~A";
const SYNTAX_ERROR: &str = "~A: ~A in form ~A";
const NUMERICAL_OVERFLOW: &str = "~A: ~A in ~A";

fn compile(src: &str) -> Template {
    Template::parse(src).unwrap_or_else(|_| Template {
        pieces: vec![Piece::Lit(src.to_string())],
    })
}

pub static TEMPLATES: Lazy<Templates> = Lazy::new(|| Templates {
    result: compile(RESULT),
    other_error: compile(OTHER_ERROR),
    in_function: compile(IN_FUNCTION),
    syntax_error: compile(SYNTAX_ERROR),
    numerical_overflow: compile(NUMERICAL_OVERFLOW),
});
