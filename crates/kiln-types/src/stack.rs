//! Stack growth for the recursive walkers over trees and scripts.
//!
//! Trees built by folding variadic arithmetic are as deep as the operand
//! count, and the evaluator recurses once per script-level call. Both run on
//! whatever thread the caller picked, so recursion points grow the stack on
//! demand instead of relying on a large fixed stack.

/// Minimum stack left before growing (100 KiB).
const RED_ZONE: usize = 100 * 1024;

/// Size of each new stack segment (1 MiB).
const STACK_PER_RECURSION: usize = 1024 * 1024;

/// Run `f`, first switching to a fresh stack segment if less than the red
/// zone remains.
#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

/// WASM manages its own stack.
#[inline]
#[cfg(target_arch = "wasm32")]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}
