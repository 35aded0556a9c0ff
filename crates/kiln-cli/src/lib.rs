//! Kiln: sandboxed evaluation of geometry scripts into editor reports.

#![forbid(unsafe_code)]
#![deny(unused_must_use)]
#![warn(clippy::dbg_macro, clippy::todo, clippy::unimplemented)]

pub mod classify;
pub mod config;
pub mod decode;
pub mod eval;
pub mod extract;
pub mod format;
pub mod host;
pub mod interpreter;
pub mod logging;
pub mod sandbox;
pub mod worker;

pub use config::{ConfigError, SandboxConfig};
pub use interpreter::Interpreter;
pub use sandbox::{EvalOutcome, Evaluator, RawFailure, RegistryEntry, SchemeSandbox};
pub use worker::{EvalWorker, Ticket, WorkerError, WorkerReply};
