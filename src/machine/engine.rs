//! One level of a machine hierarchy.
//!
//! A [`Machine`] owns one instance of every state of its definition and the
//! active state id of each of its regions. Composite states own their nested
//! `Machine` by value, so a hierarchy is a tree of machines rooted in a
//! [`StateMachine`](super::StateMachine).

use super::definition::MachineDef;
use crate::core::{
    ActionArgs, Completion, Event, GuardArgs, HandledResult, Outbox, State, StateId, StateKind,
    TransitionLog, TransitionRecord,
};
use crate::dispatch::row::{Row, RowTarget};
use crate::dispatch::{EventKey, Scope};
use chrono::Utc;
use std::any::TypeId;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Mutable environment threaded through one dispatch step.
pub(crate) struct Cx<'a, C> {
    pub(crate) context: &'a mut C,
    pub(crate) outbox: &'a mut Outbox,
    pub(crate) log: &'a mut TransitionLog,
    pub(crate) record: bool,
    pub(crate) round: u64,
    /// Set when a state owning completion rows was entered.
    pub(crate) completion: bool,
}

#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct Outcome {
    pub(crate) result: HandledResult,
    pub(crate) changed: bool,
    /// Active state of the first region that is not suspended.
    pub(crate) hook_state: Option<StateId>,
}

#[derive(Clone, Copy, Debug, Default)]
struct Step {
    result: HandledResult,
    changed: bool,
    suspended: bool,
}

/// How a machine is entered.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Entry<'a> {
    /// Initial states, ignoring history.
    Fresh,
    /// Initial states, or the previous configuration if history applies.
    Default,
    /// Explicit sub-states, one per listed region.
    Direct(&'a [TypeId]),
    /// Through a pseudo entry state.
    Pseudo(TypeId),
}

pub(crate) struct ExitRequest {
    pub(crate) point: TypeId,
    pub(crate) event: Box<dyn Event>,
}

struct Slot<C> {
    state: Box<dyn State<C>>,
    sub: Option<Machine<C>>,
}

/// Active configuration and dispatch engine of one machine level.
pub struct Machine<C> {
    pub(crate) def: Arc<MachineDef<C>>,
    slots: Vec<Slot<C>>,
    pub(crate) active: Vec<StateId>,
    pub(crate) running: bool,
    last: Option<Vec<StateId>>,
    pub(crate) exit_request: Option<ExitRequest>,
}

impl<C: 'static> Machine<C> {
    pub(crate) fn new(def: Arc<MachineDef<C>>) -> Self {
        let slots = def
            .states
            .iter()
            .map(|state| Slot {
                state: state.create(),
                sub: state
                    .submachine
                    .as_ref()
                    .map(|sub| Machine::new(Arc::clone(sub))),
            })
            .collect();
        let active = def.initial.clone();
        Self {
            def,
            slots,
            active,
            running: false,
            last: None,
            exit_request: None,
        }
    }

    pub fn definition(&self) -> &Arc<MachineDef<C>> {
        &self.def
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Active state id of every region, in region order.
    pub fn active_state_ids(&self) -> &[StateId] {
        &self.active
    }

    pub fn state(&self, id: StateId) -> Option<&dyn State<C>> {
        self.slots.get(id).map(|slot| &*slot.state)
    }

    pub fn get_state<T: State<C>>(&self) -> Option<&T> {
        let id = self.def.state_id::<T>()?;
        self.slots[id].state.downcast_ref::<T>()
    }

    pub fn get_state_mut<T: State<C>>(&mut self) -> Option<&mut T> {
        let id = self.def.state_id::<T>()?;
        self.slots[id].state.downcast_mut::<T>()
    }

    /// Nested machine owned by the composite state `T`.
    pub fn submachine<T: State<C>>(&self) -> Option<&Machine<C>> {
        let id = self.def.state_id::<T>()?;
        self.slots[id].sub.as_ref()
    }

    pub fn submachine_mut<T: State<C>>(&mut self) -> Option<&mut Machine<C>> {
        let id = self.def.state_id::<T>()?;
        self.slots[id].sub.as_mut()
    }

    /// Whether `T` is active here or in any running nested machine.
    pub fn is_state_active<T: State<C>>(&self) -> bool {
        self.running
            && self.active.iter().any(|&id| {
                self.def.states[id].is::<T>()
                    || self.slots[id]
                        .sub
                        .as_ref()
                        .is_some_and(|sub| sub.is_state_active::<T>())
            })
    }

    pub(crate) fn slot_state(&self, id: StateId) -> &dyn State<C> {
        &*self.slots[id].state
    }

    pub(crate) fn slot_state_mut(&mut self, id: StateId) -> &mut dyn State<C> {
        &mut *self.slots[id].state
    }

    pub(crate) fn sub(&self, id: StateId) -> Option<&Machine<C>> {
        self.slots[id].sub.as_ref()
    }

    pub(crate) fn sub_mut(&mut self, id: StateId) -> Option<&mut Machine<C>> {
        self.slots[id].sub.as_mut()
    }

    pub(crate) fn enter(&mut self, event: &dyn Event, entry: Entry<'_>, cx: &mut Cx<'_, C>) {
        let def = Arc::clone(&self.def);
        let restore = matches!(entry, Entry::Default | Entry::Direct(_)) && def.history.restores(event);
        let mut targets: Vec<StateId> = match (&self.last, restore) {
            (Some(last), true) => last
                .iter()
                .zip(&def.initial)
                .map(|(&previous, &initial)| match def.states[previous].kind {
                    StateKind::EntryPoint | StateKind::ExitPoint => initial,
                    _ => previous,
                })
                .collect(),
            _ => def.initial.clone(),
        };

        let mut pseudo_region = None;
        match entry {
            Entry::Fresh | Entry::Default => {}
            Entry::Direct(points) => {
                for point in points {
                    if let Some(&id) = def.ids.get(point) {
                        targets[def.states[id].region] = id;
                    }
                }
            }
            Entry::Pseudo(point) => {
                if let Some(&id) = def.ids.get(&point) {
                    let region = def.states[id].region;
                    targets[region] = id;
                    pseudo_region = Some(region);
                }
            }
        }

        trace!(machine = %def.name, ?targets, "entering machine");
        self.running = true;
        self.exit_request = None;
        for (region, &id) in targets.iter().enumerate() {
            self.enter_state(id, event, Entry::Default, cx);
            self.active[region] = id;
        }

        if let Some(region) = pseudo_region {
            let key = EventKey::new(event.kind().id());
            let step = self.dispatch_region(region, event, key, cx);
            if !step.result.is_handled() {
                warn!(
                    machine = %def.name,
                    entry = def.states[self.active[region]].name(),
                    event = event.name(),
                    "entry point has no row for the entering event"
                );
            }
        }
    }

    pub(crate) fn exit(&mut self, event: &dyn Event, cx: &mut Cx<'_, C>) {
        if !self.running {
            return;
        }
        for region in 0..self.active.len() {
            self.exit_state(self.active[region], event, cx);
        }
        self.last = Some(self.active.clone());
        self.running = false;
        self.exit_request = None;
    }

    fn enter_state(&mut self, id: StateId, event: &dyn Event, entry: Entry<'_>, cx: &mut Cx<'_, C>) {
        let slot = &mut self.slots[id];
        slot.state.on_entry(event, cx.context);
        if let Some(sub) = slot.sub.as_mut() {
            sub.enter(event, entry, cx);
        }
        if self.def.states[id].has_completion {
            cx.completion = true;
        }
    }

    fn exit_state(&mut self, id: StateId, event: &dyn Event, cx: &mut Cx<'_, C>) {
        let slot = &mut self.slots[id];
        if let Some(sub) = slot.sub.as_mut() {
            sub.exit(event, cx);
        }
        slot.state.on_exit(event, cx.context);
    }

    /// Dispatches `event` to every region, then to machine-scope rows if no
    /// region handled or deferred it.
    pub(crate) fn dispatch(&mut self, event: &dyn Event, key: EventKey, cx: &mut Cx<'_, C>) -> Outcome {
        let mut outcome = Outcome::default();
        if !self.running {
            return outcome;
        }

        for region in 0..self.active.len() {
            let current = self.active[region];
            let step = self.dispatch_region(region, event, key, cx);
            outcome.result |= step.result;
            outcome.changed |= step.changed;
            if !step.suspended && outcome.hook_state.is_none() {
                outcome.hook_state = Some(current);
            }
        }

        let settled = outcome.result.is_handled() || outcome.result.is_deferred();
        if !settled && outcome.hook_state.is_some() {
            let step = self.run_chain(Scope::Machine, event, key, cx);
            outcome.result |= step.result;
            outcome.changed |= step.changed;
        }

        outcome.result = outcome.result.canonical();
        outcome
    }

    /// Whether an active state, at any depth, would defer `event` in the
    /// current configuration.
    ///
    /// A state defers when it declares the event deferred, or when the first
    /// row of its chain whose guard passes is a `defer` row.
    pub(crate) fn defers_event(&self, event: &dyn Event, context: &C) -> bool {
        if !self.running || event.is::<Completion>() {
            return false;
        }
        let key = EventKey::new(event.kind().id());
        self.active.iter().any(|&id| {
            if self.sub(id).is_some_and(|sub| sub.defers_event(event, context)) {
                return true;
            }
            if self.def.states[id].defers(event) {
                return true;
            }
            let chain = self.def.chain(Scope::State(id), key, event);
            let first = chain.rows().iter().map(|&index| &self.def.rows[index]).find(|row| {
                row.guard.as_ref().map_or(true, |guard| {
                    guard.check(&GuardArgs {
                        event,
                        context,
                        source: row.source_state().map(|id| self.slot_state(id)),
                        target: row.target.state().map(|id| self.slot_state(id)),
                    })
                })
            });
            first.is_some_and(|row| row.target == RowTarget::Defer)
        })
    }

    fn dispatch_region(&mut self, region: usize, event: &dyn Event, key: EventKey, cx: &mut Cx<'_, C>) -> Step {
        let def = Arc::clone(&self.def);
        let id = self.active[region];
        let state = &def.states[id];
        match state.kind {
            StateKind::Terminate => return Step::suspended(),
            StateKind::Interrupt if !state.ends_interrupt(event) => return Step::suspended(),
            _ => {}
        }

        let mut step = Step::default();
        if let Some(sub) = self.slots[id].sub.as_mut().filter(|sub| sub.running) {
            let inner = sub.dispatch(event, key, cx);
            step.changed |= inner.changed;
            if let Some(request) = sub.exit_request.take() {
                let exit_key = EventKey::exiting(request.event.kind().id(), request.point);
                let outer = self.run_chain(Scope::State(id), &*request.event, exit_key, cx);
                if !outer.result.is_handled() {
                    warn!(
                        machine = %def.name,
                        state = state.name(),
                        event = request.event.name(),
                        "exit point reached but no outer row takes it"
                    );
                }
                step.changed |= outer.changed;
                step.result = HandledResult::HANDLED;
                return step;
            }
            if inner.result.is_handled() {
                step.result = HandledResult::HANDLED;
                return step;
            }
            step.result = inner.result;
        }

        let outer = self.run_chain(Scope::State(id), event, key, cx);
        step.changed |= outer.changed;
        if outer.result.is_handled() {
            step.result = HandledResult::HANDLED;
        } else {
            step.result |= outer.result;
        }

        if !step.result.is_handled() && !step.result.is_deferred() && state.defers(event) {
            step.result |= HandledResult::DEFERRED;
        }
        step
    }

    /// Tries the rows of the chain in order until one handles or defers.
    fn run_chain(&mut self, scope: Scope, event: &dyn Event, key: EventKey, cx: &mut Cx<'_, C>) -> Step {
        let def = Arc::clone(&self.def);
        let chain = def.chain(scope, key, event);
        let mut step = Step::default();
        for &index in chain.rows() {
            let (result, changed) = self.execute(&def, &def.rows[index], event, cx);
            step.result |= result;
            step.changed |= changed;
            if result.is_handled() || result.is_deferred() {
                break;
            }
        }
        step
    }

    fn execute(&mut self, def: &MachineDef<C>, row: &Row<C>, event: &dyn Event, cx: &mut Cx<'_, C>) -> (HandledResult, bool) {
        let source = row.source_state();
        let target = row.target.state();

        if let Some(guard) = &row.guard {
            let args = GuardArgs {
                event,
                context: &*cx.context,
                source: source.map(|id| self.slot_state(id)),
                target: target.map(|id| self.slot_state(id)),
            };
            if !guard.check(&args) {
                trace!(machine = %def.name, event = event.name(), ?row, "guard rejected");
                return (HandledResult::GUARD_REJECTED, false);
            }
        }

        let (from, to) = match (&row.target, source, target) {
            (RowTarget::Defer, _, _) => return (HandledResult::DEFERRED, false),
            (RowTarget::Internal, _, _) => {
                self.run_action(row, event, source, None, cx);
                return (HandledResult::HANDLED, false);
            }
            (_, Some(from), Some(to)) => (from, to),
            _ => return (HandledResult::NOT_HANDLED, false),
        };

        let region = def.states[to].region;
        self.exit_state(from, event, cx);
        self.run_action(row, event, Some(from), Some(to), cx);
        let entry = match &row.target {
            RowTarget::Direct { points, .. } => Entry::Direct(points),
            RowTarget::Entry { point, .. } => Entry::Pseudo(*point),
            _ => Entry::Default,
        };
        self.enter_state(to, event, entry, cx);
        self.active[region] = to;

        let (from_name, to_name) = (def.states[from].name(), def.states[to].name());
        debug!(machine = %def.name, region, from = from_name, to = to_name, event = event.name(), "transition");
        if cx.record {
            cx.log.record(TransitionRecord {
                machine: def.name.clone(),
                region,
                from: from_name.to_string(),
                to: to_name.to_string(),
                event: event.name().to_string(),
                round: cx.round,
                timestamp: Utc::now(),
            });
        }

        let reached = &def.states[to];
        if reached.kind == StateKind::ExitPoint && self.exit_request.is_none() {
            if let Some(converted) = reached.convert_exit(event) {
                self.exit_request = Some(ExitRequest {
                    point: reached.key.id(),
                    event: converted,
                });
            }
        }
        (HandledResult::HANDLED, true)
    }

    fn run_action(
        &self,
        row: &Row<C>,
        event: &dyn Event,
        source: Option<StateId>,
        target: Option<StateId>,
        cx: &mut Cx<'_, C>,
    ) {
        if let Some(action) = &row.action {
            action.run(&mut ActionArgs {
                event,
                context: &mut *cx.context,
                source: source.map(|id| self.slot_state(id)),
                target: target.map(|id| self.slot_state(id)),
                outbox: &mut *cx.outbox,
            });
        }
    }
}

impl Step {
    fn suspended() -> Self {
        Self {
            suspended: true,
            ..Self::default()
        }
    }
}

impl<C> fmt::Debug for Machine<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Machine")
            .field("name", &self.def.name)
            .field("active", &self.active)
            .field("running", &self.running)
            .finish_non_exhaustive()
    }
}
