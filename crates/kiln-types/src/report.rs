use std::collections::BTreeMap;
use std::fmt;

use kiln_ast::span::SourceRange;

use crate::tree::{Tree, TreeId};

/// Closed set of diagnostic categories. `GenericError` is the catch-all,
/// including diagnostics whose payload could not be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ErrorKind {
    SyntaxError,
    NumericalOverflow,
    GenericError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::SyntaxError => "syntax error",
            ErrorKind::NumericalOverflow => "numerical overflow",
            ErrorKind::GenericError => "error",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
    pub stack_trace: String,
    pub range: SourceRange,
    /// Enclosing named procedure, when the failure happened inside one.
    pub function_name: Option<String>,
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.range, self.message)
    }
}

/// A free variable (geometry parameter) and the literal that defined it.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Variable {
    pub id: TreeId,
    pub value: f64,
    pub range: SourceRange,
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Shape {
    pub tree_id: TreeId,
    pub tree: Tree,
    pub variables: BTreeMap<TreeId, Variable>,
}

impl Shape {
    pub fn new(tree: Tree, variables: BTreeMap<TreeId, Variable>) -> Self {
        Self {
            tree_id: tree.id(),
            tree,
            variables,
        }
    }
}

/// Outcome of one evaluation call: diagnostics or extracted output, never both.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(tag = "status", rename_all = "snake_case"))]
pub enum EvalReport {
    Errors {
        errors: Vec<ErrorInfo>,
    },
    Output {
        /// Printed value of the last form; `None` when the script had no forms.
        result: Option<String>,
        shapes: Vec<Shape>,
        variables: BTreeMap<TreeId, Variable>,
    },
}

impl EvalReport {
    pub fn is_ok(&self) -> bool {
        matches!(self, EvalReport::Output { .. })
    }

    pub fn errors(&self) -> &[ErrorInfo] {
        match self {
            EvalReport::Errors { errors } => errors,
            EvalReport::Output { .. } => &[],
        }
    }

    pub fn shapes(&self) -> &[Shape] {
        match self {
            EvalReport::Output { shapes, .. } => shapes,
            EvalReport::Errors { .. } => &[],
        }
    }

    pub fn variables(&self) -> Option<&BTreeMap<TreeId, Variable>> {
        match self {
            EvalReport::Output { variables, .. } => Some(variables),
            EvalReport::Errors { .. } => None,
        }
    }

    pub fn result(&self) -> Option<&str> {
        match self {
            EvalReport::Output { result, .. } => result.as_deref(),
            EvalReport::Errors { .. } => None,
        }
    }
}
