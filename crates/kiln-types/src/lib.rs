#![deny(unused_must_use)]
#![warn(clippy::dbg_macro, clippy::todo, clippy::unimplemented)]
#![forbid(unsafe_code)]

mod effects;
mod report;
pub mod stack;
pub mod tree;

pub use effects::{Effect, EffectSet, ALL_EFFECTS};
pub use stack::ensure_sufficient_stack;
pub use report::{ErrorInfo, ErrorKind, EvalReport, Shape, Variable};
pub use tree::{Axis, BinaryOp, Tree, TreeId, UnaryOp};
