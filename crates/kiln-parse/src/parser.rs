use crate::lexer::Lexer;
use crate::token::{Tok, TokKind};
use anyhow::{bail, Result};
use kiln_ast::ast::{Datum, DatumKind, Form};
use kiln_ast::span::{Pos, SourceRange};
use std::fmt;

/// Maximum list nesting accepted by the reader.
pub const MAX_NESTING_DEPTH: usize = 512;

/// A form the reader could not complete.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadError {
    pub message: String,
    /// Marker at the start of the offending form.
    pub before: Pos,
    /// Marker where the reader gave up.
    pub after: Pos,
    /// Source text of the partial form.
    pub text: String,
}

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} in form {}", self.before, self.message, self.text)
    }
}

impl std::error::Error for ReadError {}

/// Read every top-level form of `src`.
///
/// Reading stops at the first error; the error is the last element.
pub fn read_forms(src: &str) -> Vec<Result<Form, ReadError>> {
    let mut p = Parser::new(src);
    let mut out = Vec::new();
    loop {
        if matches!(p.cur.kind, TokKind::Eof) {
            break;
        }
        let before = p.cur.start;
        let lo = p.cur.lo;
        match p.parse_datum(0) {
            Ok(datum) => {
                let after = datum.range.end();
                out.push(Ok(Form {
                    datum,
                    before,
                    after,
                }));
            }
            Err(fail) => {
                out.push(Err(ReadError {
                    message: fail.message,
                    before,
                    after: fail.at,
                    text: p.lex.slice(lo, fail.offset),
                }));
                break;
            }
        }
    }
    out
}

/// Strict variant: every form must read.
pub fn parse_str(file: &str, src: &str) -> Result<Vec<Form>> {
    let mut forms = Vec::new();
    for read in read_forms(src) {
        match read {
            Ok(form) => forms.push(form),
            Err(e) => bail!("{}:{}: {}", file, e.before, e),
        }
    }
    Ok(forms)
}

struct Fail {
    message: String,
    at: Pos,
    offset: usize,
}

struct Parser {
    lex: Lexer,
    cur: Tok,
}

impl Parser {
    fn new(src: &str) -> Self {
        let mut lex = Lexer::new(src);
        let cur = lex.next_tok();
        Self { lex, cur }
    }

    fn bump(&mut self) -> Tok {
        std::mem::replace(&mut self.cur, self.lex.next_tok())
    }

    fn fail_at_cur(&self, message: impl Into<String>) -> Fail {
        Fail {
            message: message.into(),
            at: self.cur.end,
            offset: self.cur.hi,
        }
    }

    fn parse_datum(&mut self, depth: usize) -> Result<Datum, Fail> {
        if depth > MAX_NESTING_DEPTH {
            return Err(self.fail_at_cur(format!(
                "nesting deeper than {} levels",
                MAX_NESTING_DEPTH
            )));
        }
        let tok = self.bump();
        let range = SourceRange::between(tok.start, tok.end);
        let kind = match tok.kind {
            TokKind::Number(n) => DatumKind::Number(n),
            TokKind::Str(s) => DatumKind::Str(s),
            TokKind::Bool(b) => DatumKind::Bool(b),
            TokKind::Symbol(s) => DatumKind::Symbol(s),
            TokKind::Quote => {
                let inner = self.parse_datum(depth + 1)?;
                let range = SourceRange::between(tok.start, inner.range.end());
                return Ok(Datum::new(DatumKind::Quote(Box::new(inner)), range));
            }
            TokKind::LParen => return self.parse_list(tok.start, depth),
            TokKind::RParen => {
                return Err(Fail {
                    message: "unexpected \")\"".to_string(),
                    at: tok.end,
                    offset: tok.hi,
                })
            }
            TokKind::Eof => {
                return Err(Fail {
                    message: "unexpected end of input".to_string(),
                    at: tok.end,
                    offset: tok.hi,
                })
            }
            TokKind::Error(message) => {
                return Err(Fail {
                    message,
                    at: tok.end,
                    offset: tok.hi,
                })
            }
        };
        Ok(Datum::new(kind, range))
    }

    fn parse_list(&mut self, start: Pos, depth: usize) -> Result<Datum, Fail> {
        let mut items = Vec::new();
        loop {
            match self.cur.kind {
                TokKind::RParen => {
                    let close = self.bump();
                    return Ok(Datum::new(
                        DatumKind::List(items),
                        SourceRange::between(start, close.end),
                    ));
                }
                TokKind::Eof => {
                    return Err(Fail {
                        message: "missing close paren".to_string(),
                        at: self.cur.end,
                        offset: self.lex.offset(),
                    });
                }
                _ => items.push(self.parse_datum(depth + 1)?),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_forms_with_markers() {
        let forms = read_forms("(define v 2.0)\n(sphere v)");
        assert_eq!(forms.len(), 2);
        let second = forms[1].as_ref().expect("second form");
        assert_eq!(second.before, Pos::new(1, 0));
        assert_eq!(second.after, Pos::new(1, 10));
    }

    #[test]
    fn stops_after_first_error() {
        let forms = read_forms("1 ) 2");
        assert_eq!(forms.len(), 2);
        assert!(forms[0].is_ok());
        assert!(forms[1].is_err());
    }
}
