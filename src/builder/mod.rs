//! Builder API for machine definitions.
//!
//! [`TransitionBuilder`] describes one row, [`StateConfig`] the properties of
//! one state, and [`MachineBuilder`] resolves both into a shareable
//! [`MachineDef`](crate::machine::MachineDef).

pub mod error;
pub mod machine;
pub mod macros;
pub mod state;
pub mod transition;

pub use error::BuildError;
pub use machine::MachineBuilder;
pub use state::StateConfig;
pub use transition::{Transition, TransitionBuilder};

use crate::core::{Event, EventKind, Guard, GuardArgs, State};
use crate::dispatch::row::Trigger;
use transition::{factory, narrow_to, SourceSpec, TargetSpec};

/// Create an unguarded row from `S` to `T` on `E`.
///
/// # Example
///
/// ```
/// use hsm::builder::{simple_transition, MachineBuilder};
/// use hsm::{events, states};
///
/// states!(Stopped, Playing);
/// events!(Play);
///
/// let def = MachineBuilder::<()>::new()
///     .initial::<Stopped>()
///     .add_transition(simple_transition::<(), Stopped, Play, Playing>())
///     .build()
///     .unwrap();
/// assert_eq!(def.states().len(), 2);
/// ```
pub fn simple_transition<C, S, E, T>() -> Transition<C>
where
    C: 'static,
    S: State<C> + Default,
    E: Event,
    T: State<C> + Default,
{
    let (source, make_source) = factory::<C, S>();
    let (target, make_target) = factory::<C, T>();
    Transition {
        source: SourceSpec::State(source),
        trigger: Trigger::Exact(EventKind::of::<E>()),
        target: TargetSpec::State(target),
        guard: None,
        action: None,
        otherwise: false,
        states: vec![(source, make_source), (target, make_target)],
    }
}

/// Create a row from `S` to `T` on `E`, taken only when `guard` passes.
///
/// # Example
///
/// ```
/// use hsm::builder::guarded_transition;
/// use hsm::core::{Event, State};
///
/// #[derive(Default)]
/// struct Low;
/// impl State<u8> for Low {}
///
/// #[derive(Default)]
/// struct High;
/// impl State<u8> for High {}
///
/// #[derive(Debug)]
/// struct Raise(u8);
/// impl Event for Raise {}
///
/// let row = guarded_transition::<u8, Low, Raise, High, _>(|raise, level| raise.0 > *level);
/// ```
pub fn guarded_transition<C, S, E, T, F>(guard: F) -> Transition<C>
where
    C: 'static,
    S: State<C> + Default,
    E: Event,
    T: State<C> + Default,
    F: Fn(&E, &C) -> bool + Send + Sync + 'static,
{
    let guard = Guard::new(move |args: &GuardArgs<'_, C, E>| guard(args.event, args.context));
    Transition {
        guard: Some(guard.erase(narrow_to::<E>)),
        ..simple_transition::<C, S, E, T>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Low;
    impl State<u8> for Low {}

    #[derive(Default)]
    struct High;
    impl State<u8> for High {}

    #[derive(Debug)]
    struct Raise(u8);
    impl Event for Raise {}

    fn passes(row: &Transition<u8>, event: &dyn Event, level: u8) -> bool {
        row.guard.as_ref().map_or(true, |guard| {
            guard.check(&GuardArgs {
                event,
                context: &level,
                source: None,
                target: None,
            })
        })
    }

    #[test]
    fn simple_transition_builds() {
        let row = simple_transition::<u8, Low, Raise, High>();

        assert_eq!(row.source, SourceSpec::State(crate::core::TypeKey::of::<Low>()));
        assert_eq!(row.target.state(), Some(crate::core::TypeKey::of::<High>()));
        assert!(row.guard.is_none());
        assert_eq!(row.states.len(), 2);
    }

    #[test]
    fn guarded_transition_respects_guard() {
        let row = guarded_transition::<u8, Low, Raise, High, _>(|raise, level| raise.0 > *level);

        assert!(passes(&row, &Raise(5), 3));
        assert!(!passes(&row, &Raise(2), 3));
    }
}
