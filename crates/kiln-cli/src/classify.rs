//! Overall validity of an outcome sequence.

use crate::sandbox::{EvalOutcome, RawFailure};

/// The outcome that decides what a report shows.
#[derive(Debug)]
pub enum Authoritative<'a, V> {
    /// First failing form
    Failure(&'a RawFailure<V>),
    /// Values of the last form, when every form succeeded
    Last(&'a [V]),
    /// The script contained no forms.
    NoForms,
}

#[derive(Debug)]
pub struct Classification<'a, V> {
    pub valid: bool,
    pub authoritative: Authoritative<'a, V>,
}

/// Valid iff every outcome succeeded. Stops at the first failure.
pub fn classify<V>(outcomes: &[EvalOutcome<V>]) -> Classification<'_, V> {
    for outcome in outcomes {
        if let EvalOutcome::Failure(failure) = outcome {
            return Classification {
                valid: false,
                authoritative: Authoritative::Failure(failure),
            };
        }
    }
    let authoritative = match outcomes.last() {
        Some(EvalOutcome::Success(values)) => Authoritative::Last(values),
        _ => Authoritative::NoForms,
    };
    Classification {
        valid: true,
        authoritative,
    }
}
