//! Resolved transition rows.
//!
//! A [`Row`] is a transition descriptor whose state types have been replaced
//! by ids of the owning machine definition.

use crate::core::{Action, Event, EventKind, Guard, StateId};
use std::any::TypeId;
use std::fmt;

/// Where a row starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RowSource {
    State(StateId),
    /// Leaving `composite` through the exit point `point` of its submachine.
    Exit { composite: StateId, point: TypeId },
    /// Internal row of the machine itself.
    Machine,
}

/// Which events a row reacts to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Trigger {
    Exact(EventKind),
    /// Forwarding row: reacts to the kind itself and to every event listing it
    /// among its bases.
    Base(EventKind),
    /// Reacts to every event except `Completion`.
    Any,
}

/// What a row does when its guard passes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum RowTarget {
    Internal,
    Defer,
    State(StateId),
    /// Enter a composite through explicit sub-states, one per listed region.
    Direct { state: StateId, points: Vec<TypeId> },
    /// Enter a composite through a pseudo entry state.
    Entry { state: StateId, point: TypeId },
}

impl RowTarget {
    pub(crate) fn state(&self) -> Option<StateId> {
        match self {
            RowTarget::Internal | RowTarget::Defer => None,
            RowTarget::State(id)
            | RowTarget::Direct { state: id, .. }
            | RowTarget::Entry { state: id, .. } => Some(*id),
        }
    }
}

pub(crate) struct Row<C> {
    pub(crate) source: RowSource,
    pub(crate) trigger: Trigger,
    pub(crate) target: RowTarget,
    pub(crate) guard: Option<Guard<C, dyn Event>>,
    pub(crate) action: Option<Action<C, dyn Event>>,
    pub(crate) otherwise: bool,
}

impl<C> Row<C> {
    pub(crate) fn source_state(&self) -> Option<StateId> {
        match self.source {
            RowSource::State(id) | RowSource::Exit { composite: id, .. } => Some(id),
            RowSource::Machine => None,
        }
    }
}

impl<C> fmt::Debug for Row<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Row")
            .field("source", &self.source)
            .field("trigger", &self.trigger)
            .field("target", &self.target)
            .field("guarded", &self.guard.is_some())
            .field("otherwise", &self.otherwise)
            .finish()
    }
}
