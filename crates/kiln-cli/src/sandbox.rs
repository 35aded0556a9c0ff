//! Sandboxed evaluation of whole scripts.
//!
//! An [`Evaluator`] turns script text into one outcome per top-level form and
//! records the free variables it saw. [`SchemeSandbox`] is the shipped
//! implementation: every call starts from a fresh global environment that
//! only holds the builtins the configuration allows.

use std::sync::Arc;

use kiln_ast::span::Pos;
use kiln_parse::read_forms;
use kiln_types::Tree;

use crate::config::SandboxConfig;
use crate::decode::SYNTAX_ERROR_KEY;
use crate::eval::{Machine, Value, VarRegistry};
use crate::host::BuiltinRegistry;

/// Result of evaluating one top-level form.
#[derive(Debug, Clone)]
pub enum EvalOutcome<V> {
    /// All values the form produced; possibly none.
    Success(Vec<V>),
    Failure(RawFailure<V>),
}

impl<V> EvalOutcome<V> {
    pub fn is_success(&self) -> bool {
        matches!(self, EvalOutcome::Success(_))
    }
}

/// Diagnostic exactly as the evaluator raised it.
#[derive(Debug, Clone)]
pub struct RawFailure<V> {
    /// Reader marker at the start of the failing form
    pub before: Pos,
    /// Reader marker after the failing form
    pub after: Pos,
    pub key: String,
    /// Conventionally `(who message-or-format a b)`, but not guaranteed.
    pub args: V,
    pub stack: String,
}

/// A free variable as recorded by the evaluator.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub tree: Tree,
    pub value: f64,
    /// Row, start column and end column of the defining literal.
    pub position: (u32, u32, u32),
}

pub trait Evaluator {
    type Value;

    fn evaluate(&mut self, script: &str) -> Vec<EvalOutcome<Self::Value>>;

    /// Capability test: the geometry tree of a shape value.
    fn as_shape<'v>(&self, value: &'v Self::Value) -> Option<&'v Tree>;

    /// Free variables recorded by the last `evaluate`.
    fn variables(&self) -> Vec<RegistryEntry>;

    /// `~S` rendering.
    fn describe(&self, value: &Self::Value) -> String;

    /// `~A` rendering.
    fn display(&self, value: &Self::Value) -> String;

    fn as_list(&self, value: &Self::Value) -> Option<Vec<Self::Value>>;

    /// Contents of a string or symbol.
    fn as_text(&self, value: &Self::Value) -> Option<String>;

    fn is_false(&self, value: &Self::Value) -> bool;
}

pub struct SchemeSandbox {
    config: SandboxConfig,
    host: Arc<BuiltinRegistry>,
    registry: VarRegistry,
    output: String,
}

impl Default for SchemeSandbox {
    fn default() -> Self {
        Self::new(SandboxConfig::default())
    }
}

impl SchemeSandbox {
    pub fn new(config: SandboxConfig) -> Self {
        Self {
            config,
            host: Arc::new(BuiltinRegistry::new()),
            registry: VarRegistry::new(),
            output: String::new(),
        }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Text written by `display`/`newline` during the last evaluation.
    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }

    fn too_large(&self, script: &str) -> EvalOutcome<Value> {
        let end = end_of(script);
        tracing::warn!(
            target: "kiln::sandbox",
            size = script.len(),
            limit = self.config.max_source_size,
            "script rejected"
        );
        EvalOutcome::Failure(RawFailure {
            before: Pos::new(0, 0),
            after: end,
            key: "source-too-large".to_string(),
            args: Value::list(vec![
                Value::Bool(false),
                Value::str("Script is ~A bytes; the limit is ~A"),
                Value::list(vec![
                    Value::Number(script.len() as f64),
                    Value::Number(self.config.max_source_size as f64),
                ]),
                Value::Bool(false),
            ]),
            stack: String::new(),
        })
    }
}

/// Reader position just past the last character of `text`.
fn end_of(text: &str) -> Pos {
    let row = text.matches('\n').count() as u32;
    let last_line = text.rsplit('\n').next().unwrap_or("");
    Pos::new(row, last_line.chars().count() as u32)
}

impl Evaluator for SchemeSandbox {
    type Value = Value;

    fn evaluate(&mut self, script: &str) -> Vec<EvalOutcome<Value>> {
        self.registry.clear();
        self.output.clear();
        if script.len() > self.config.max_source_size {
            return vec![self.too_large(script)];
        }

        let mut machine = Machine::new(
            Arc::clone(&self.host),
            self.config.allowed(),
            self.config.max_call_depth,
        );
        let env = machine.global_env();
        let mut outcomes = Vec::new();

        // Later forms still run after a failure; their side effects stay.
        for read in read_forms(script) {
            let outcome = match read {
                Ok(form) => match machine.eval_toplevel(&form, &env) {
                    Ok(values) => EvalOutcome::Success(values),
                    Err(raw) => {
                        tracing::debug!(
                            target: "kiln::sandbox",
                            key = %raw.key,
                            at = %form.before,
                            "form failed"
                        );
                        EvalOutcome::Failure(RawFailure {
                            before: form.before,
                            after: form.after,
                            key: raw.key,
                            args: raw.args,
                            stack: raw.stack,
                        })
                    }
                },
                Err(e) => {
                    tracing::debug!(target: "kiln::sandbox", error = %e, "read failed");
                    EvalOutcome::Failure(RawFailure {
                        before: e.before,
                        after: e.after,
                        key: SYNTAX_ERROR_KEY.to_string(),
                        args: Value::list(vec![
                            Value::Bool(false),
                            Value::Str(e.message),
                            Value::Str(e.text),
                            Value::Bool(false),
                        ]),
                        stack: String::new(),
                    })
                }
            };
            outcomes.push(outcome);
        }

        machine.release(&env);
        let (registry, output) = machine.into_parts();
        self.registry = registry;
        self.output = output;
        tracing::debug!(
            target: "kiln::sandbox",
            forms = outcomes.len(),
            variables = self.registry.len(),
            "evaluated"
        );
        outcomes
    }

    fn as_shape<'v>(&self, value: &'v Value) -> Option<&'v Tree> {
        match value {
            Value::Shape(t) => Some(t),
            _ => None,
        }
    }

    fn variables(&self) -> Vec<RegistryEntry> {
        self.registry
            .values()
            .map(|slot| RegistryEntry {
                tree: slot.tree.clone(),
                value: slot.value,
                position: (slot.row, slot.start_col, slot.end_col),
            })
            .collect()
    }

    fn describe(&self, value: &Value) -> String {
        value.written()
    }

    fn display(&self, value: &Value) -> String {
        value.to_string()
    }

    fn as_list(&self, value: &Value) -> Option<Vec<Value>> {
        match value {
            Value::List(items) => Some(items.to_vec()),
            _ => None,
        }
    }

    fn as_text(&self, value: &Value) -> Option<String> {
        match value {
            Value::Str(s) | Value::Symbol(s) => Some(s.clone()),
            _ => None,
        }
    }

    fn is_false(&self, value: &Value) -> bool {
        matches!(value, Value::Bool(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_outcome_per_form() {
        let mut sb = SchemeSandbox::default();
        let out = sb.evaluate("1 (car '()) 3");
        assert_eq!(out.len(), 3);
        assert!(out[0].is_success());
        assert!(!out[1].is_success());
        assert!(out[2].is_success());
    }

    #[test]
    fn read_error_is_last_outcome() {
        let mut sb = SchemeSandbox::default();
        let out = sb.evaluate("(define a 1)\n(sphere");
        assert_eq!(out.len(), 2);
        match &out[1] {
            EvalOutcome::Failure(f) => {
                assert_eq!(f.key, SYNTAX_ERROR_KEY);
                assert_eq!(f.before, Pos::new(1, 0));
                assert_eq!(f.after, Pos::new(1, 7));
                assert!(f.stack.is_empty());
            }
            EvalOutcome::Success(_) => panic!("expected failure"),
        }
        assert_eq!(sb.variables().len(), 1);
    }

    #[test]
    fn registry_is_fresh_per_call() {
        let mut sb = SchemeSandbox::default();
        sb.evaluate("(define a 1) (define b 2)");
        assert_eq!(sb.variables().len(), 2);
        sb.evaluate("(define c 3)");
        assert_eq!(sb.variables().len(), 1);
    }

    #[test]
    fn environment_is_fresh_per_call() {
        let mut sb = SchemeSandbox::default();
        sb.evaluate("(define (f) 1)");
        let out = sb.evaluate("(f)");
        match &out[0] {
            EvalOutcome::Failure(f) => assert_eq!(f.key, "unbound-variable"),
            EvalOutcome::Success(_) => panic!("definitions leaked between calls"),
        }
    }

    #[test]
    fn oversized_script_is_rejected() {
        let config = SandboxConfig {
            max_source_size: 8,
            ..SandboxConfig::default()
        };
        let mut sb = SchemeSandbox::new(config);
        let out = sb.evaluate("(+ 1 2)\n(+ 3 4)");
        assert_eq!(out.len(), 1);
        match &out[0] {
            EvalOutcome::Failure(f) => {
                assert_eq!(f.key, "source-too-large");
                assert_eq!(f.after, Pos::new(1, 7));
            }
            EvalOutcome::Success(_) => panic!("expected rejection"),
        }
    }

    #[test]
    fn display_output_is_captured() {
        let config = SandboxConfig {
            allow: vec![kiln_types::Effect::Io],
            ..SandboxConfig::default()
        };
        let mut sb = SchemeSandbox::new(config);
        sb.evaluate("(display \"hello\") (newline)");
        assert_eq!(sb.take_output(), "hello\n");
        assert_eq!(sb.take_output(), "");
    }
}
