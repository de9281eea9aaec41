//! State traversal.
//!
//! Visits active or all states of a machine, optionally descending into
//! submachines. Recursive visits only descend into a submachine whose
//! definition (transitively) contains a state matching the predicate.

use super::definition::{MachineDef, StateDef};
use super::engine::Machine;
use crate::core::{State, StateId};

/// Which states a visit covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Selection {
    Active,
    All,
}

/// Whether a visit descends into submachines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Depth {
    Local,
    Recursive,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VisitMode {
    pub selection: Selection,
    pub depth: Depth,
}

impl VisitMode {
    pub const ACTIVE_LOCAL: Self = Self::new(Selection::Active, Depth::Local);
    pub const ACTIVE_RECURSIVE: Self = Self::new(Selection::Active, Depth::Recursive);
    pub const ALL_LOCAL: Self = Self::new(Selection::All, Depth::Local);
    pub const ALL_RECURSIVE: Self = Self::new(Selection::All, Depth::Recursive);

    pub const fn new(selection: Selection, depth: Depth) -> Self {
        Self { selection, depth }
    }
}

/// A state handed to a visitor.
pub struct Visited<'a, C> {
    pub machine: &'a MachineDef<C>,
    pub id: StateId,
    /// Nesting level, 0 for the machine the visit started on.
    pub depth: usize,
    pub def: &'a StateDef<C>,
    pub state: &'a dyn State<C>,
}

impl<C: 'static> Machine<C> {
    /// Calls `visitor` on every selected state matching `predicate`.
    pub fn visit(
        &self,
        mode: VisitMode,
        predicate: &dyn Fn(&StateDef<C>) -> bool,
        visitor: &mut dyn FnMut(Visited<'_, C>),
    ) {
        self.visit_at(0, mode, predicate, visitor);
    }

    fn visit_at(
        &self,
        depth: usize,
        mode: VisitMode,
        predicate: &dyn Fn(&StateDef<C>) -> bool,
        visitor: &mut dyn FnMut(Visited<'_, C>),
    ) {
        let ids: Vec<StateId> = match mode.selection {
            Selection::Active if self.running => self.active.clone(),
            Selection::Active => Vec::new(),
            Selection::All => (0..self.def.states.len()).collect(),
        };

        for id in ids {
            let def = &self.def.states[id];
            if predicate(def) {
                visitor(Visited {
                    machine: &self.def,
                    id,
                    depth,
                    def,
                    state: self.slot_state(id),
                });
            }
            if mode.depth == Depth::Local {
                continue;
            }
            if let Some(sub) = self.sub(id) {
                let reachable = mode.selection == Selection::All || sub.running;
                if reachable && sub.def.contains(predicate) {
                    sub.visit_at(depth + 1, mode, predicate, visitor);
                }
            }
        }
    }

    /// Calls `visitor` with mutable access to every active state, descending
    /// into running submachines.
    pub fn visit_active_mut(&mut self, visitor: &mut dyn FnMut(&mut dyn State<C>, &StateDef<C>)) {
        if !self.running {
            return;
        }
        let def = std::sync::Arc::clone(&self.def);
        for id in self.active.clone() {
            visitor(self.slot_state_mut(id), &def.states[id]);
            if let Some(sub) = self.sub_mut(id) {
                sub.visit_active_mut(visitor);
            }
        }
    }

    /// Active states that do not have a running submachine.
    pub(crate) fn active_leaves(&self) -> Vec<&StateDef<C>> {
        let mut leaves = Vec::new();
        if !self.running {
            return leaves;
        }
        for &id in &self.active {
            match self.sub(id).filter(|sub| sub.running) {
                Some(sub) => leaves.extend(sub.active_leaves()),
                None => leaves.push(&self.def.states[id]),
            }
        }
        leaves
    }
}
