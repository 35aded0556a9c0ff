use std::collections::BTreeMap;

use kiln_ast::span::SourceRange;
use kiln_types::{Shape, TreeId, Variable};

use crate::sandbox::{EvalOutcome, Evaluator, RegistryEntry};

/// One `Variable` per registry entry, keyed by the variable's tree id.
///
/// Free variables are single-line literals: the range ends on the row it
/// starts on.
pub fn extract_variables(entries: &[RegistryEntry]) -> BTreeMap<TreeId, Variable> {
    entries
        .iter()
        .map(|entry| {
            let (row, start_col, end_col) = entry.position;
            let id = entry.tree.id();
            let variable = Variable {
                id,
                value: entry.value,
                range: SourceRange::new(row, row, start_col, end_col),
            };
            (id, variable)
        })
        .collect()
}

/// Every shape value of every successful form, in order. Each shape gets
/// the complete variable map.
pub fn extract_shapes<E: Evaluator>(
    ev: &E,
    outcomes: &[EvalOutcome<E::Value>],
    variables: &BTreeMap<TreeId, Variable>,
) -> Vec<Shape> {
    outcomes
        .iter()
        .filter_map(|outcome| match outcome {
            EvalOutcome::Success(values) => Some(values),
            EvalOutcome::Failure(_) => None,
        })
        .flatten()
        .filter_map(|value| ev.as_shape(value))
        .map(|tree| Shape::new(tree.clone(), variables.clone()))
        .collect()
}
