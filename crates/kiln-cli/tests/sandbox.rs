//! Sandbox restrictions: effect gating and call-depth limits.

use kiln_cli::{Interpreter, SandboxConfig};
use kiln_types::{Effect, ErrorKind};

fn with_allow(allow: Vec<Effect>) -> Interpreter {
    Interpreter::with_config(SandboxConfig {
        allow,
        ..SandboxConfig::default()
    })
}

/// Run on a thread with a deliberately small stack.
fn on_small_stack<T: Send + 'static>(f: impl FnOnce() -> T + Send + 'static) -> T {
    std::thread::Builder::new()
        .stack_size(2 << 20)
        .spawn(f)
        .expect("spawn test thread")
        .join()
        .expect("test thread panicked")
}

#[test]
fn effectful_builtins_are_denied_by_default() {
    let mut interp = Interpreter::default();
    for (src, name, effect) in [
        ("(display 1)", "display", "io"),
        ("(newline)", "newline", "io"),
        ("(random 10)", "random", "rand"),
        ("(current-time)", "current-time", "time"),
    ] {
        let report = interp.eval(src);
        let err = &report.errors()[0];
        assert_eq!(err.kind, ErrorKind::GenericError);
        assert_eq!(
            err.message,
            format!(
                "sandbox-violation: {} requires the {} effect, which this sandbox does not allow",
                name, effect
            )
        );
    }
}

#[test]
fn allowed_effects_are_bound() {
    let mut interp = with_allow(vec![Effect::Io, Effect::Rand]);
    let report = interp.eval("(display \"r=\") (display (random 5)) (newline) 'done");
    assert!(report.is_ok(), "{:?}", report);
    assert_eq!(report.result(), Some("done"));
    let output = interp.take_output();
    assert!(output.starts_with("r="));
    assert!(output.ends_with('\n'));

    // Time was not allowed.
    let report = interp.eval("(current-time)");
    assert!(report.errors()[0].message.starts_with("sandbox-violation"));
}

#[test]
fn output_never_leaks_between_evaluations() {
    let mut interp = with_allow(vec![Effect::Io]);
    interp.eval("(display 1)");
    interp.eval("(+ 1 1)");
    assert_eq!(interp.take_output(), "");
}

#[test]
fn unknown_names_are_unbound_not_denied() {
    let report = Interpreter::default().eval("(open-file \"/etc/passwd\")");
    assert_eq!(
        report.errors()[0].message,
        "unbound-variable: Unbound variable: open-file"
    );
}

#[test]
fn call_depth_limit_is_configurable() {
    let mut interp = Interpreter::with_config(SandboxConfig {
        max_call_depth: 50,
        ..SandboxConfig::default()
    });
    let src = "(define (down n) (if (= n 0) 0 (+ 1 (down (- n 1)))))\n(down 40)";
    assert_eq!(interp.eval(src).result(), Some("40"));

    let report = interp.eval("(define (down n) (if (= n 0) 0 (+ 1 (down (- n 1)))))\n(down 60)");
    let err = &report.errors()[0];
    assert_eq!(err.function_name.as_deref(), Some("down"));
    assert_eq!(
        err.message,
        "In function down:\nstack-overflow: Stack overflow (call depth limit 50)"
    );
    assert!(err.stack_trace.lines().count() > 20);
    assert!(err.stack_trace.contains("more frames"));
}

#[test]
fn default_depth_limit() {
    let (ok, overflow) = on_small_stack(|| {
        let mut interp = Interpreter::default();
        let def = "(define (down n) (if (= n 0) 0 (+ 1 (down (- n 1)))))\n";
        let ok = interp.eval(&format!("{}(down 900)", def));
        let overflow = interp.eval(&format!("{}(down 5000)", def));
        (
            ok.result().map(str::to_string),
            overflow.errors().first().map(|e| e.message.clone()),
        )
    });
    assert_eq!(ok.as_deref(), Some("900"));
    let overflow = overflow.expect("overflow error");
    assert!(overflow.ends_with("Stack overflow (call depth limit 1000)"), "{}", overflow);
}

#[test]
fn deep_nesting_is_a_syntax_error() {
    let src = format!("{}1{}", "(".repeat(600), ")".repeat(600));
    let report = on_small_stack(move || {
        let report = Interpreter::default().eval(&src);
        report.errors().first().map(|e| (e.kind, e.message.clone()))
    });
    let (kind, message) = report.expect("nesting error");
    assert_eq!(kind, ErrorKind::SyntaxError);
    assert!(message.contains("nesting deeper than 512 levels"));
}

#[test]
fn runaway_recursion_is_reported_on_a_small_stack() {
    let report = on_small_stack(|| {
        Interpreter::default().eval("(define (spin n) (+ 1 (spin n))) (spin 0)")
    });
    let err = &report.errors()[0];
    assert_eq!(
        err.message,
        "In function spin:\nstack-overflow: Stack overflow (call depth limit 1000)"
    );
}

#[test]
fn wide_arithmetic_on_a_variable_is_reported() {
    let operands = vec!["v"; 200_000].join(" ");
    let (sum, shape) = on_small_stack(move || {
        let mut interp = Interpreter::default();
        let sum = interp.eval(&format!("(define v 1)\n(+ {})", operands));
        let shape = interp.eval(&format!("(define v 1)\n(sphere (+ {}))", operands));
        let json = serde_json::to_string(&shape).expect("serialize");
        (sum, (shape, json.len()))
    });
    assert!(sum.is_ok(), "{:?}", sum.errors());
    let result = sum.result().expect("result");
    assert!(result.starts_with("#<tree (+ (+ "));

    let (shape, json_len) = shape;
    assert!(shape.is_ok());
    assert_eq!(shape.shapes().len(), 1);
    assert_eq!(shape.variables().map(|vars| vars.len()), Some(1));
    assert!(json_len > 200_000);
}

#[test]
fn oversized_script_is_an_error() {
    let mut interp = Interpreter::with_config(SandboxConfig {
        max_source_size: 16,
        ..SandboxConfig::default()
    });
    let report = interp.eval("(sphere 1) (sphere 2) (sphere 3)");
    assert_eq!(
        report.errors()[0].message,
        "source-too-large: Script is 32 bytes; the limit is 16"
    );
}
