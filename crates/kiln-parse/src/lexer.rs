use crate::token::{Tok, TokKind};
use kiln_ast::span::Pos;

pub struct Lexer {
    src: Vec<char>,
    pos: usize,
    row: u32,
    col: u32,
}

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, '(' | ')' | '"' | ';' | '\'')
}

/// Numeric atoms start with a digit, or with a sign or dot followed by one.
/// Everything else (including `+`, `-`, `inf`) reads as a symbol.
fn looks_numeric(atom: &str) -> bool {
    let mut chars = atom.chars();
    match chars.next() {
        Some(c) if c.is_ascii_digit() => true,
        Some('+' | '-') => match chars.next() {
            Some(c) if c.is_ascii_digit() => true,
            Some('.') => matches!(chars.next(), Some(c) if c.is_ascii_digit()),
            _ => false,
        },
        Some('.') => matches!(chars.next(), Some(c) if c.is_ascii_digit()),
        _ => false,
    }
}

impl Lexer {
    pub fn new(src: &str) -> Self {
        Self {
            src: src.chars().collect(),
            pos: 0,
            row: 0,
            col: 0,
        }
    }

    /// Current reader marker.
    pub fn here(&self) -> Pos {
        Pos::new(self.row, self.col)
    }

    pub fn offset(&self) -> usize {
        self.pos
    }

    /// Source text between two char offsets.
    pub fn slice(&self, lo: usize, hi: usize) -> String {
        let hi = hi.min(self.src.len());
        let lo = lo.min(hi);
        self.src[lo..hi].iter().collect()
    }

    fn bump(&mut self) -> Option<char> {
        let c = *self.src.get(self.pos)?;
        self.pos += 1;
        if c == '\n' {
            self.row += 1;
            self.col = 0;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn peek(&self) -> Option<char> {
        self.src.get(self.pos).copied()
    }

    fn skip_ws_and_comments(&mut self) {
        loop {
            while matches!(self.peek(), Some(c) if c.is_whitespace()) {
                self.bump();
            }
            // line comment: ;
            if self.peek() == Some(';') {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.bump();
                }
                continue;
            }
            break;
        }
    }

    fn tok(&self, kind: TokKind, start: Pos, lo: usize) -> Tok {
        Tok {
            kind,
            start,
            end: self.here(),
            lo,
            hi: self.pos,
        }
    }

    pub fn next_tok(&mut self) -> Tok {
        self.skip_ws_and_comments();
        let start = self.here();
        let lo = self.pos;
        let Some(c) = self.bump() else {
            return self.tok(TokKind::Eof, start, lo);
        };

        match c {
            '(' => return self.tok(TokKind::LParen, start, lo),
            ')' => return self.tok(TokKind::RParen, start, lo),
            '\'' => return self.tok(TokKind::Quote, start, lo),
            '"' => return self.lex_string(start, lo),
            _ => {}
        }

        let mut atom = String::from(c);
        while let Some(p) = self.peek() {
            if is_delimiter(p) {
                break;
            }
            atom.push(p);
            self.bump();
        }

        if let Some(rest) = atom.strip_prefix('#') {
            let kind = match rest {
                "t" | "true" => TokKind::Bool(true),
                "f" | "false" => TokKind::Bool(false),
                _ => TokKind::Error(format!("unknown # syntax `{}`", atom)),
            };
            return self.tok(kind, start, lo);
        }

        if looks_numeric(&atom) {
            let kind = match atom.parse::<f64>() {
                Ok(n) => TokKind::Number(n),
                Err(_) => TokKind::Error(format!("malformed number `{}`", atom)),
            };
            return self.tok(kind, start, lo);
        }

        self.tok(TokKind::Symbol(atom), start, lo)
    }

    fn lex_string(&mut self, start: Pos, lo: usize) -> Tok {
        let mut s = String::new();
        loop {
            let Some(ch) = self.bump() else {
                return self.tok(
                    TokKind::Error("unterminated string literal".to_string()),
                    start,
                    lo,
                );
            };
            match ch {
                '"' => break,
                '\\' => {
                    let Some(esc) = self.bump() else {
                        continue;
                    };
                    let real = match esc {
                        'n' => '\n',
                        't' => '\t',
                        '"' => '"',
                        '\\' => '\\',
                        _ => esc,
                    };
                    s.push(real);
                }
                _ => s.push(ch),
            }
        }
        self.tok(TokKind::Str(s), start, lo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokKind> {
        let mut lex = Lexer::new(src);
        let mut out = Vec::new();
        loop {
            let t = lex.next_tok();
            if t.kind == TokKind::Eof {
                break;
            }
            out.push(t.kind);
        }
        out
    }

    #[test]
    fn signs_read_as_symbols_unless_followed_by_digits() {
        assert_eq!(
            kinds("+ -1 -.5 -x"),
            vec![
                TokKind::Symbol("+".into()),
                TokKind::Number(-1.0),
                TokKind::Number(-0.5),
                TokKind::Symbol("-x".into()),
            ]
        );
    }

    #[test]
    fn tracks_rows_and_columns() {
        let mut lex = Lexer::new("; note\n  (abc)");
        let lp = lex.next_tok();
        assert_eq!(lp.start, Pos::new(1, 2));
        let sym = lex.next_tok();
        assert_eq!(sym.start, Pos::new(1, 3));
        assert_eq!(sym.end, Pos::new(1, 6));
    }

    #[test]
    fn unknown_hash_syntax_is_error() {
        assert!(matches!(kinds("#x")[0], TokKind::Error(_)));
    }

    #[test]
    fn string_escapes() {
        assert_eq!(kinds(r#""a\"b\n""#), vec![TokKind::Str("a\"b\n".into())]);
    }
}
