//! Build errors for machine definitions and transition rows.

use stillwater::validation::Validation;
use stillwater::NonEmptyVec;
use thiserror::Error;

/// Configuration errors detected while building a machine definition.
///
/// Definition-wide checks accumulate every problem they find and report them
/// together as [`BuildError::Invalid`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("Machine '{machine}' has no initial state. Call .initial::<S>() before .build()")]
    MissingInitialState { machine: String },

    #[error("Transition source not specified. Call .from::<S>() or .from_exit::<Sub, P>()")]
    MissingSource,

    #[error("Transition event not specified. Call .on::<E>(), .on_any() or .on_completion()")]
    MissingEvent,

    #[error("Transition target not specified. Call .to::<S>(), .internal() or .defer()")]
    MissingTarget,

    #[error("Internal rows cannot have a target state: {reason}")]
    InvalidInternalRow { reason: String },

    #[error("State '{state}' is reachable from region {first} and region {second}")]
    AmbiguousRegion {
        state: &'static str,
        first: usize,
        second: usize,
    },

    #[error("State '{state}' is not connected to any region")]
    UnassignedState { state: &'static str },

    #[error("State '{state}' is assigned to region {region}, but the machine has {regions} region(s)")]
    RegionOutOfRange {
        state: &'static str,
        region: usize,
        regions: usize,
    },

    #[error("State '{state}' is configured but does not appear in machine '{machine}'")]
    UnknownState { machine: String, state: &'static str },

    #[error("State '{state}' is configured twice in machine '{machine}'")]
    DuplicateState { machine: String, state: &'static str },

    #[error("State '{state}' is used as a submachine but has no definition registered")]
    NotComposite { state: &'static str },

    #[error("Submachine '{machine}' declares no entry point '{point}'")]
    UnknownEntryPoint { machine: String, point: &'static str },

    #[error("Submachine '{machine}' declares no exit point '{point}'")]
    UnknownExitPoint { machine: String, point: &'static str },

    #[error("State '{state}' is declared twice as an explicit entry of one transition")]
    DuplicateExplicitEntry { state: &'static str },

    #[error("Explicit entry '{state}' added without a preceding .to_direct::<Sub, P>()")]
    DanglingDirectEntry { state: &'static str },

    #[error("Explicit entries {first} and {second} of one transition target the same region")]
    ConflictingExplicitEntries {
        first: &'static str,
        second: &'static str,
    },

    #[error("Machine definition is invalid ({} problem(s)): {}", .0.len(), join(.0))]
    Invalid(Vec<BuildError>),
}

/// Collapses accumulated checks: one failure is returned as is, several are
/// wrapped in [`BuildError::Invalid`].
pub(crate) fn collect(checks: Vec<Validation<(), NonEmptyVec<BuildError>>>) -> Result<(), BuildError> {
    match Validation::all_vec(checks).map(|_| ()) {
        Validation::Success(()) => Ok(()),
        Validation::Failure(errors) => {
            let mut flat = Vec::with_capacity(errors.len());
            for error in errors.iter() {
                match error {
                    BuildError::Invalid(inner) => flat.extend(inner.iter().cloned()),
                    other => flat.push(other.clone()),
                }
            }
            Err(if flat.len() == 1 {
                flat.remove(0)
            } else {
                BuildError::Invalid(flat)
            })
        }
    }
}

fn join(errors: &[BuildError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
