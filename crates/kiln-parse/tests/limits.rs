//! Reader nesting limit.

use kiln_parse::{parse_str, read_forms, MAX_NESTING_DEPTH};

#[test]
fn moderate_nesting_works() {
    let src = format!("{}1{}", "(".repeat(50), ")".repeat(50));
    assert!(parse_str("<test>", &src).is_ok());
}

#[test]
fn limit_constant_is_reasonable() {
    assert!(MAX_NESTING_DEPTH >= 256);
}

#[test]
fn excessive_nesting_is_rejected() {
    let depth = MAX_NESTING_DEPTH + 10;
    let src = format!("{}1{}", "(".repeat(depth), ")".repeat(depth));
    let handle = std::thread::Builder::new()
        .stack_size(16 * 1024 * 1024)
        .spawn(move || read_forms(&src))
        .expect("spawn reader thread");
    let reads = handle.join().expect("reader thread");
    let err = reads[0].as_ref().unwrap_err();
    assert!(err.message.contains("nesting deeper"), "{}", err.message);
}
