//! Turns raw evaluator failures into user-facing diagnostics.
//!
//! Payloads are conventionally `(who a b c)`; anything else is reported as a
//! generic error that prints the raw payload instead of failing.

use kiln_ast::span::SourceRange;
use kiln_types::{ErrorInfo, ErrorKind};
use thiserror::Error;

use crate::format::{simple_format, FmtArg, FormatError, TEMPLATES};
use crate::sandbox::{Evaluator, RawFailure};

pub const SYNTAX_ERROR_KEY: &str = "syntax-error";
pub const NUMERICAL_OVERFLOW_KEY: &str = "numerical-overflow";

/// Why a payload did not follow the convention.
#[derive(Debug, Error)]
enum Malformed {
    #[error("arguments are not a list")]
    NotAList,
    #[error("expected 4 arguments, got {0}")]
    Arity(usize),
    #[error("{0} is not a string")]
    NotText(&'static str),
    #[error("operands are not a list")]
    Operands,
    #[error(transparent)]
    Format(#[from] FormatError),
}

pub fn kind_for(key: &str) -> ErrorKind {
    match key {
        SYNTAX_ERROR_KEY => ErrorKind::SyntaxError,
        NUMERICAL_OVERFLOW_KEY => ErrorKind::NumericalOverflow,
        _ => ErrorKind::GenericError,
    }
}

/// Build the diagnostic for one failure. Pure: the same failure always
/// decodes to the same `ErrorInfo`.
pub fn decode<E: Evaluator>(ev: &E, failure: &RawFailure<E::Value>) -> ErrorInfo {
    let range = SourceRange::between(failure.before, failure.after);
    match decode_payload(ev, failure) {
        Ok((message, function_name)) => ErrorInfo {
            kind: kind_for(&failure.key),
            message,
            stack_trace: failure.stack.clone(),
            range,
            function_name,
        },
        Err(why) => {
            let written = ev.describe(&failure.args);
            tracing::warn!(
                target: "kiln::interpreter",
                key = %failure.key,
                args = %written,
                reason = %why,
                "malformed error payload"
            );
            ErrorInfo {
                kind: ErrorKind::GenericError,
                message: format!("{}: {}", failure.key, written),
                stack_trace: failure.stack.clone(),
                range,
                function_name: None,
            }
        }
    }
}

fn text<E: Evaluator>(ev: &E, v: &E::Value, what: &'static str) -> Result<String, Malformed> {
    ev.as_text(v).ok_or(Malformed::NotText(what))
}

fn decode_payload<E: Evaluator>(
    ev: &E,
    failure: &RawFailure<E::Value>,
) -> Result<(String, Option<String>), Malformed> {
    let args = ev.as_list(&failure.args).ok_or(Malformed::NotAList)?;
    let [who, a, b, c] = args.as_slice() else {
        return Err(Malformed::Arity(args.len()));
    };
    let key = FmtArg::text(failure.key.as_str());
    let t = &*TEMPLATES;

    let message = match failure.key.as_str() {
        SYNTAX_ERROR_KEY => {
            let what = text(ev, a, "message")?;
            let offending = if ev.is_false(c) { b } else { c };
            t.syntax_error.render(&[
                key,
                FmtArg::text(what),
                FmtArg::new(ev.display(offending), ev.describe(offending)),
            ])?
        }
        NUMERICAL_OVERFLOW_KEY => {
            let what = text(ev, a, "message")?;
            let operands = ev.as_list(c).ok_or(Malformed::Operands)?;
            let mut call = format!("({}", ev.display(b));
            for operand in &operands {
                call.push(' ');
                call.push_str(&ev.describe(operand));
            }
            call.push(')');
            t.numerical_overflow
                .render(&[key, FmtArg::text(what), FmtArg::text(call)])?
        }
        _ => {
            let fmt = text(ev, a, "format string")?;
            let fmt_args = if ev.is_false(b) {
                Vec::new()
            } else {
                ev.as_list(b).ok_or(Malformed::NotAList)?
            };
            let rendered: Vec<FmtArg> = fmt_args
                .iter()
                .map(|v| FmtArg::new(ev.display(v), ev.describe(v)))
                .collect();
            let body = simple_format(&fmt, &rendered)?;
            t.other_error.render(&[key, FmtArg::text(body)])?
        }
    };

    if ev.is_false(who) {
        return Ok((message, None));
    }
    let who = ev.as_text(who).unwrap_or_else(|| ev.display(who));
    let wrapped = t
        .in_function
        .render(&[FmtArg::text(who.as_str()), FmtArg::text(message)])?;
    Ok((wrapped, Some(who)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::Value;
    use crate::sandbox::SchemeSandbox;
    use kiln_ast::span::Pos;

    fn failure(key: &str, args: Value) -> RawFailure<Value> {
        RawFailure {
            before: Pos::new(2, 1),
            after: Pos::new(3, 4),
            key: key.to_string(),
            args,
            stack: "0: f at 2:1".to_string(),
        }
    }

    fn payload(items: Vec<Value>) -> Value {
        Value::list(items)
    }

    #[test]
    fn range_and_stack_come_from_the_failure() {
        let ev = SchemeSandbox::default();
        let f = failure(
            "misc-error",
            payload(vec![
                Value::Bool(false),
                Value::str("boom"),
                Value::nil(),
                Value::Bool(false),
            ]),
        );
        let info = decode(&ev, &f);
        assert_eq!(info.range, SourceRange::new(2, 3, 1, 4));
        assert_eq!(info.stack_trace, "0: f at 2:1");
        assert_eq!(info.message, "misc-error: boom");
        assert_eq!(info.kind, ErrorKind::GenericError);
        assert_eq!(info.function_name, None);
    }

    #[test]
    fn syntax_error_prefers_subform() {
        let ev = SchemeSandbox::default();
        let f = failure(
            SYNTAX_ERROR_KEY,
            payload(vec![
                Value::Bool(false),
                Value::str("bad if"),
                Value::str("(if)"),
                Value::symbol("sub"),
            ]),
        );
        assert_eq!(decode(&ev, &f).message, "syntax-error: bad if in form sub");

        let f = failure(
            SYNTAX_ERROR_KEY,
            payload(vec![
                Value::Bool(false),
                Value::str("bad if"),
                Value::list(vec![Value::symbol("if")]),
                Value::Bool(false),
            ]),
        );
        let info = decode(&ev, &f);
        assert_eq!(info.kind, ErrorKind::SyntaxError);
        assert_eq!(info.message, "syntax-error: bad if in form (if)");
    }

    #[test]
    fn overflow_lists_the_operation() {
        let ev = SchemeSandbox::default();
        let f = failure(
            NUMERICAL_OVERFLOW_KEY,
            payload(vec![
                Value::Bool(false),
                Value::str("Numerical overflow"),
                Value::symbol("/"),
                Value::list(vec![Value::Number(1.0), Value::Number(0.0)]),
            ]),
        );
        let info = decode(&ev, &f);
        assert_eq!(info.kind, ErrorKind::NumericalOverflow);
        assert_eq!(info.message, "numerical-overflow: Numerical overflow in (/ 1 0)");
    }

    #[test]
    fn who_wraps_the_message() {
        let ev = SchemeSandbox::default();
        let f = failure(
            "wrong-type-arg",
            payload(vec![
                Value::str("shell"),
                Value::str("Wrong type argument in position ~A to ~A: ~S"),
                Value::list(vec![
                    Value::Number(1.0),
                    Value::symbol("car"),
                    Value::str("x"),
                ]),
                Value::Bool(false),
            ]),
        );
        let info = decode(&ev, &f);
        assert_eq!(info.function_name.as_deref(), Some("shell"));
        assert_eq!(
            info.message,
            "In function shell:\nwrong-type-arg: Wrong type argument in position 1 to car: \"x\""
        );
    }

    #[test]
    fn malformed_payloads_fall_back() {
        let ev = SchemeSandbox::default();
        let cases = vec![
            (Value::Number(3.0), "custom: 3"),
            (payload(vec![Value::Number(1.0)]), "custom: (1)"),
            (
                payload(vec![
                    Value::Bool(false),
                    Value::Number(9.0),
                    Value::nil(),
                    Value::Bool(false),
                ]),
                "custom: (#f 9 () #f)",
            ),
            (
                payload(vec![
                    Value::Bool(false),
                    Value::str("~A and ~A"),
                    Value::list(vec![Value::Number(1.0)]),
                    Value::Bool(false),
                ]),
                "custom: (#f \"~A and ~A\" (1) #f)",
            ),
        ];
        for (args, expected) in cases {
            let info = decode(&ev, &failure("custom", args));
            assert_eq!(info.kind, ErrorKind::GenericError);
            assert_eq!(info.message, expected);
            assert_eq!(info.function_name, None);
        }
    }

    #[test]
    fn malformed_overflow_is_generic() {
        let ev = SchemeSandbox::default();
        let f = failure(
            NUMERICAL_OVERFLOW_KEY,
            payload(vec![
                Value::Bool(false),
                Value::str("Numerical overflow"),
                Value::symbol("/"),
                Value::Number(0.0),
            ]),
        );
        assert_eq!(decode(&ev, &f).kind, ErrorKind::GenericError);
    }
}
