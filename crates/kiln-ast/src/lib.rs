pub mod span {
    use serde::Serialize;
    use std::fmt;

    /// Reader position. Rows and columns are 0-based; columns count characters.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
    pub struct Pos {
        pub row: u32,
        pub col: u32,
    }

    impl Pos {
        pub fn new(row: u32, col: u32) -> Self {
            Self { row, col }
        }
    }

    impl fmt::Display for Pos {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}:{}", self.row, self.col)
        }
    }

    /// Four-corner text location used by the editor for highlighting.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
    pub struct SourceRange {
        pub start_row: u32,
        pub end_row: u32,
        pub start_col: u32,
        pub end_col: u32,
    }

    impl SourceRange {
        pub fn new(start_row: u32, end_row: u32, start_col: u32, end_col: u32) -> Self {
            Self {
                start_row,
                end_row,
                start_col,
                end_col,
            }
        }

        /// Range spanning two reader markers.
        pub fn between(before: Pos, after: Pos) -> Self {
            Self {
                start_row: before.row,
                end_row: after.row,
                start_col: before.col,
                end_col: after.col,
            }
        }

        pub fn start(&self) -> Pos {
            Pos::new(self.start_row, self.start_col)
        }

        pub fn end(&self) -> Pos {
            Pos::new(self.end_row, self.end_col)
        }

        /// True if `pos` lies in `[start, end)`.
        pub fn contains(&self, pos: Pos) -> bool {
            self.start() <= pos && pos < self.end()
        }
    }

    impl fmt::Display for SourceRange {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(
                f,
                "{}:{}-{}:{}",
                self.start_row, self.start_col, self.end_row, self.end_col
            )
        }
    }
}

pub mod ast {
    use super::span::{Pos, SourceRange};
    use serde::Serialize;
    use std::fmt;

    /// A top-level form together with the reader markers taken before and
    /// after it was read.
    #[derive(Debug, Clone, Serialize)]
    pub struct Form {
        pub datum: Datum,
        pub before: Pos,
        pub after: Pos,
    }

    impl Form {
        pub fn range(&self) -> SourceRange {
            SourceRange::between(self.before, self.after)
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize)]
    pub struct Datum {
        pub kind: DatumKind,
        pub range: SourceRange,
    }

    #[derive(Debug, Clone, PartialEq, Serialize)]
    pub enum DatumKind {
        Number(f64),
        Str(String),
        Bool(bool),
        Symbol(String),
        List(Vec<Datum>),
        /// `'x`, read as `(quote x)` but kept distinct so it prints back the same way.
        Quote(Box<Datum>),
    }

    impl Datum {
        pub fn new(kind: DatumKind, range: SourceRange) -> Self {
            Self { kind, range }
        }

        pub fn as_symbol(&self) -> Option<&str> {
            match &self.kind {
                DatumKind::Symbol(s) => Some(s),
                _ => None,
            }
        }

        pub fn as_list(&self) -> Option<&[Datum]> {
            match &self.kind {
                DatumKind::List(items) => Some(items),
                _ => None,
            }
        }

        pub fn as_number(&self) -> Option<f64> {
            match self.kind {
                DatumKind::Number(n) => Some(n),
                _ => None,
            }
        }
    }

    impl fmt::Display for Datum {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match &self.kind {
                DatumKind::Number(n) => f.write_str(&format_number(*n)),
                DatumKind::Str(s) => write_string_literal(f, s),
                DatumKind::Bool(true) => f.write_str("#t"),
                DatumKind::Bool(false) => f.write_str("#f"),
                DatumKind::Symbol(s) => f.write_str(s),
                DatumKind::List(items) => {
                    f.write_str("(")?;
                    for (i, item) in items.iter().enumerate() {
                        if i > 0 {
                            f.write_str(" ")?;
                        }
                        write!(f, "{}", item)?;
                    }
                    f.write_str(")")
                }
                DatumKind::Quote(inner) => write!(f, "'{}", inner),
            }
        }
    }

    /// Print a number the way the reader accepts it back: integral values
    /// without a fractional part.
    pub fn format_number(n: f64) -> String {
        if n.is_nan() {
            "+nan.0".to_string()
        } else if n.is_infinite() {
            if n > 0.0 { "+inf.0" } else { "-inf.0" }.to_string()
        } else if n.fract() == 0.0 && n.abs() < 1e15 {
            format!("{}", n as i64)
        } else {
            format!("{}", n)
        }
    }

    /// Write `s` as a double-quoted literal with reader escapes.
    pub fn write_string_literal(f: &mut impl fmt::Write, s: &str) -> fmt::Result {
        f.write_char('"')?;
        for ch in s.chars() {
            match ch {
                '"' => f.write_str("\\\"")?,
                '\\' => f.write_str("\\\\")?,
                '\n' => f.write_str("\\n")?,
                '\t' => f.write_str("\\t")?,
                c => f.write_char(c)?,
            }
        }
        f.write_char('"')
    }
}
