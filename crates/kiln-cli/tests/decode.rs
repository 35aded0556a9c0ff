//! Decoding real evaluator failures, including payloads raised with `throw`.

use kiln_cli::classify::{classify, Authoritative};
use kiln_cli::decode::decode;
use kiln_cli::{Evaluator, SchemeSandbox};
use kiln_types::{ErrorInfo, ErrorKind};

/// Evaluate `src` and decode its first failure twice.
fn decode_twice(src: &str) -> (ErrorInfo, ErrorInfo) {
    let mut sb = SchemeSandbox::default();
    let outcomes = sb.evaluate(src);
    match classify(&outcomes).authoritative {
        Authoritative::Failure(f) => (decode(&sb, f), decode(&sb, f)),
        _ => panic!("expected a failure for {}", src),
    }
}

#[test]
fn decoding_is_idempotent() {
    for src in [
        "(sphere",
        "(+ 1 \"a\")",
        "(define (f) (/ 1 0)) (f)",
        "(throw 'odd 1 2 3)",
        "(error \"x\" 1)",
    ] {
        let (a, b) = decode_twice(src);
        assert_eq!(a, b, "{}", src);
    }
}

#[test]
fn throw_with_short_payload_falls_back() {
    let (info, _) = decode_twice("(throw 'my-error 1 \"two\")");
    assert_eq!(info.kind, ErrorKind::GenericError);
    assert_eq!(info.message, "my-error: (1 \"two\")");
    assert_eq!(info.function_name, None);
}

#[test]
fn throw_with_conventional_payload_is_formatted() {
    let (info, _) = decode_twice("(throw 'my-error #f \"value ~A is ~S\" '(3 \"odd\") #f)");
    assert_eq!(info.kind, ErrorKind::GenericError);
    assert_eq!(info.message, "my-error: value 3 is \"odd\"");
}

#[test]
fn throw_with_syntax_key_is_a_syntax_error() {
    let (info, _) = decode_twice("(throw 'syntax-error 'g \"bad thing\" '(g 1) #f)");
    assert_eq!(info.kind, ErrorKind::SyntaxError);
    assert_eq!(info.function_name.as_deref(), Some("g"));
    assert_eq!(info.message, "In function g:\nsyntax-error: bad thing in form (g 1)");
}

#[test]
fn throw_with_bad_format_falls_back() {
    let (info, _) = decode_twice("(throw 'oops #f \"~A ~A\" '(1) #f)");
    assert_eq!(info.kind, ErrorKind::GenericError);
    assert_eq!(info.message, "oops: (#f \"~A ~A\" (1) #f)");

    let (info, _) = decode_twice("(throw 'oops #f \"~Z\" '() #f)");
    assert_eq!(info.message, "oops: (#f \"~Z\" () #f)");
}

#[test]
fn throw_with_overflow_key_but_no_operands() {
    let (info, _) = decode_twice("(throw 'numerical-overflow #f \"Numerical overflow\" '/ 7)");
    assert_eq!(info.kind, ErrorKind::GenericError);
    assert!(info.message.starts_with("numerical-overflow: (#f"));
}

#[test]
fn stack_trace_is_attached() {
    let (info, _) = decode_twice("(define (inner) (car 1))\n(define (outer) (inner))\n(outer)");
    assert_eq!(info.function_name.as_deref(), Some("inner"));
    let lines: Vec<&str> = info.stack_trace.lines().collect();
    assert_eq!(lines, vec!["2: car at 0:16", "1: inner at 1:16", "0: outer at 2:0"]);
}
