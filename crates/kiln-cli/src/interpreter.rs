//! Script text in, `EvalReport` out.

use kiln_types::EvalReport;

use crate::classify::{classify, Authoritative};
use crate::config::SandboxConfig;
use crate::decode::decode;
use crate::extract::{extract_shapes, extract_variables};
use crate::format::{FmtArg, TEMPLATES};
use crate::sandbox::{Evaluator, SchemeSandbox};

pub struct Interpreter<E: Evaluator = SchemeSandbox> {
    evaluator: E,
}

impl Default for Interpreter<SchemeSandbox> {
    fn default() -> Self {
        Self::new(SchemeSandbox::default())
    }
}

impl Interpreter<SchemeSandbox> {
    pub fn with_config(config: SandboxConfig) -> Self {
        Self::new(SchemeSandbox::new(config))
    }

    /// Console output produced by the last evaluation.
    pub fn take_output(&mut self) -> String {
        self.evaluator.take_output()
    }
}

impl<E: Evaluator> Interpreter<E> {
    pub fn new(evaluator: E) -> Self {
        Self { evaluator }
    }

    pub fn evaluator(&self) -> &E {
        &self.evaluator
    }

    /// Evaluate `script` and build its report.
    pub fn eval(&mut self, script: &str) -> EvalReport {
        let span = tracing::info_span!(target: "kiln::interpreter", "eval", bytes = script.len());
        let _guard = span.enter();

        let outcomes = self.evaluator.evaluate(script);
        let classification = classify(&outcomes);
        tracing::debug!(
            target: "kiln::interpreter",
            forms = outcomes.len(),
            valid = classification.valid,
            "classified"
        );

        let result = match classification.authoritative {
            Authoritative::Failure(failure) => {
                let info = decode(&self.evaluator, failure);
                tracing::info!(
                    target: "kiln::interpreter",
                    kind = %info.kind,
                    range = %info.range,
                    "evaluation failed"
                );
                return EvalReport::Errors { errors: vec![info] };
            }
            Authoritative::Last(values) => Some(self.render_result(values)),
            Authoritative::NoForms => None,
        };

        let variables = extract_variables(&self.evaluator.variables());
        let shapes = extract_shapes(&self.evaluator, &outcomes, &variables);
        tracing::info!(
            target: "kiln::interpreter",
            shapes = shapes.len(),
            variables = variables.len(),
            "evaluation succeeded"
        );
        EvalReport::Output {
            result,
            shapes,
            variables,
        }
    }

    fn render_result(&self, values: &[E::Value]) -> String {
        let ev = &self.evaluator;
        match values {
            [one] => {
                let arg = FmtArg::new(ev.display(one), ev.describe(one));
                TEMPLATES
                    .result
                    .render(&[arg])
                    .unwrap_or_else(|_| ev.describe(one))
            }
            many => {
                let mut out = String::from("(values");
                for v in many {
                    out.push(' ');
                    out.push_str(&ev.describe(v));
                }
                out.push(')');
                out
            }
        }
    }
}
