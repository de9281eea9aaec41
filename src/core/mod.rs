//! Core state machine vocabulary.
//!
//! This module contains the building blocks shared by every machine:
//! - Events and their runtime kinds
//! - The `State` trait and state identity
//! - Guards and actions attached to transition rows
//! - Dispatch results and the transition log

mod action;
mod event;
mod guard;
mod history;
mod result;
mod state;

pub(crate) use action::Outbox;
pub use action::{Action, ActionArgs};
pub use event::{Completion, Event, EventKind, Start, Stop};
pub use guard::{Guard, GuardArgs};
pub use history::{TransitionLog, TransitionRecord};
pub use result::HandledResult;
pub use state::{State, StateId, StateKind, TypeKey};

/// Strips the module path from a type name.
///
/// Only the outer path is removed: `my_app::events::Wrap<my_app::Inner>`
/// becomes `Wrap<my_app::Inner>`.
pub(crate) fn short_type_name(full: &'static str) -> &'static str {
    if !full.contains('<') {
        return full.rsplit("::").next().unwrap_or(full);
    }
    let (head, _) = full.split_at(full.find('<').unwrap_or(full.len()));
    let start = head.rfind("::").map(|pos| pos + 2).unwrap_or(0);
    &full[start..]
}

#[cfg(test)]
mod tests {
    use super::short_type_name;

    #[test]
    fn strips_module_path() {
        assert_eq!(short_type_name("a::b::Idle"), "Idle");
        assert_eq!(short_type_name("Idle"), "Idle");
    }

    #[test]
    fn keeps_generic_arguments() {
        assert_eq!(short_type_name("a::b::Wrap<c::Inner>"), "Wrap<c::Inner>");
    }
}
