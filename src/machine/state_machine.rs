//! Root machine: context, lifecycle, deferred events and posted events.

use super::deferred::DeferredQueue;
use super::definition::{MachineDef, StateDef};
use super::engine::{Cx, Entry, Machine, Outcome};
use super::error::MachineError;
use super::visit::{VisitMode, Visited};
use crate::core::{
    Completion, Event, HandledResult, Outbox, Start, State, StateId, Stop, TransitionLog,
};
use crate::dispatch::{DispatchStrategy, EventKey};
use std::any::TypeId;
use std::sync::Arc;
use tracing::{trace, warn};

/// A running machine hierarchy.
///
/// Owns the context shared by every level, the root [`Machine`], the deferred
/// event queue and the queue of events posted by actions. All operations are
/// synchronous; a `StateMachine` is driven from one thread at a time while
/// its [`MachineDef`] may be shared freely.
///
/// # Example
///
/// ```rust
/// use hsm::prelude::*;
///
/// #[derive(Default)]
/// struct Idle;
/// impl State<u32> for Idle {}
///
/// #[derive(Default)]
/// struct Running;
/// impl State<u32> for Running {
///     fn on_entry(&mut self, _event: &dyn Event, starts: &mut u32) {
///         *starts += 1;
///     }
/// }
///
/// #[derive(Debug)]
/// struct Go;
/// impl Event for Go {}
///
/// let def = MachineBuilder::<u32>::new()
///     .initial::<Idle>()
///     .transition(TransitionBuilder::new().from::<Idle>().on::<Go>().to::<Running>())
///     .unwrap()
///     .build()
///     .unwrap();
///
/// let mut machine = StateMachine::new(def, 0);
/// machine.start().unwrap();
/// assert_eq!(machine.process_event(Go), Ok(HandledResult::HANDLED));
/// assert!(machine.is_state_active::<Running>());
/// assert_eq!(*machine.context(), 1);
/// ```
pub struct StateMachine<C> {
    root: Machine<C>,
    context: C,
    deferred: DeferredQueue,
    outbox: Outbox,
    log: TransitionLog,
    round: u64,
    pass: u64,
}

impl<C: 'static> StateMachine<C> {
    pub fn new(def: Arc<MachineDef<C>>, context: C) -> Self {
        Self {
            root: Machine::new(def),
            context,
            deferred: DeferredQueue::new(),
            outbox: Outbox::default(),
            log: TransitionLog::new(),
            round: 0,
            pass: 0,
        }
    }

    /// Enters the initial states, outermost first.
    pub fn start(&mut self) -> Result<(), MachineError> {
        if self.root.running {
            return Err(MachineError::AlreadyRunning);
        }
        self.round += 1;
        self.run(|root, cx| {
            root.enter(&Start, Entry::Fresh, cx);
            Outcome::default()
        });
        self.flush_posted();
        Ok(())
    }

    /// Exits every active state, innermost first, and drops pending events.
    pub fn stop(&mut self) -> Result<(), MachineError> {
        if !self.root.running {
            return Err(MachineError::NotRunning);
        }
        self.run(|root, cx| {
            root.exit(&Stop, cx);
            Outcome::default()
        });
        self.deferred.clear();
        self.outbox.clear();
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.root.running
    }

    /// Processes one event to completion.
    ///
    /// Returns the combined result of every region. Events nobody handled or
    /// deferred are passed to the no-transition hook; deferred events are
    /// queued and retried after a later event changes the configuration.
    pub fn process_event<E: Event>(&mut self, event: E) -> Result<HandledResult, MachineError> {
        if !self.root.running {
            return Err(MachineError::NotRunning);
        }
        self.round += 1;
        let key = match self.root.def.strategy() {
            DispatchStrategy::Static => EventKey::new(TypeId::of::<E>()),
            DispatchStrategy::Dynamic => EventKey::new((&event as &dyn Event).kind().id()),
        };

        let outcome = self.handle(&event, key);
        if outcome.result.is_deferred() {
            trace!(event = event.name(), round = self.round, "deferring event");
            self.deferred.defer(Box::new(event), self.round);
        }
        let posted = self.flush_posted();
        if outcome.changed || posted {
            self.drain_deferred();
        }
        Ok(outcome.result)
    }

    /// Runs `first`, then dispatches `Completion` until no state owning
    /// completion rows is entered anymore.
    fn run<F>(&mut self, first: F) -> Outcome
    where
        F: FnOnce(&mut Machine<C>, &mut Cx<'_, C>) -> Outcome,
    {
        let mut cx = Cx {
            context: &mut self.context,
            outbox: &mut self.outbox,
            log: &mut self.log,
            record: self.root.def.record_transitions,
            round: self.round,
            completion: false,
        };
        let mut outcome = first(&mut self.root, &mut cx);

        let completion = EventKey::new(TypeId::of::<Completion>());
        while std::mem::take(&mut cx.completion) {
            outcome.changed |= self.root.dispatch(&Completion, completion, &mut cx).changed;
        }
        if let Some(request) = self.root.exit_request.take() {
            warn!(
                event = request.event.name(),
                "exit point reached in the root machine; ignored"
            );
        }
        outcome
    }

    fn handle(&mut self, event: &dyn Event, key: EventKey) -> Outcome {
        let outcome = self.run(|root, cx| root.dispatch(event, key, cx));
        let result = outcome.result;
        if result.is_handled() || result.is_deferred() || event.is::<Completion>() {
            return outcome;
        }
        if let Some(state) = outcome.hook_state {
            let def = Arc::clone(&self.root.def);
            def.call_hook(event, state, &mut self.context);
        }
        outcome
    }

    fn submit(&mut self, event: Box<dyn Event>) -> Outcome {
        let key = EventKey::new(event.kind().id());
        let outcome = self.handle(&*event, key);
        if outcome.result.is_deferred() {
            self.deferred.defer(event, self.round);
        }
        outcome
    }

    /// Processes events posted by actions. Returns whether any of them
    /// changed the configuration.
    fn flush_posted(&mut self) -> bool {
        let mut changed = false;
        while let Some(event) = self.outbox.pop() {
            trace!(event = event.name(), "processing posted event");
            changed |= self.submit(event).changed;
        }
        changed
    }

    /// Retries events deferred in earlier rounds until a pass retires no
    /// event whose replay changed the configuration.
    ///
    /// Each pass tries every due entry once; entries deferred again become
    /// due in the next pass. The number of passes is bounded by the queue
    /// length.
    fn drain_deferred(&mut self) {
        let limit = self.deferred.slots();
        for _ in 0..limit {
            self.pass += 1;
            let mut progress = false;
            let mut index = 0;
            while index < self.deferred.slots() {
                if let Some(event) = self.deferred.take_due(index, self.round, self.pass) {
                    trace!(
                        event = event.name(),
                        round = self.round,
                        pass = self.pass,
                        "replaying deferred event"
                    );
                    let key = EventKey::new(event.kind().id());
                    let outcome = self.handle(&*event, key);
                    let deferred = outcome.result.is_deferred();
                    if deferred {
                        self.deferred.restore(index, event, self.pass);
                    }
                    let posted = self.flush_posted();
                    progress |= !deferred && (outcome.changed || posted);
                }
                index += 1;
            }
            self.deferred.compact();
            if !progress {
                break;
            }
        }
    }

    pub fn definition(&self) -> &Arc<MachineDef<C>> {
        &self.root.def
    }

    /// The root level of the hierarchy.
    pub fn root(&self) -> &Machine<C> {
        &self.root
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut C {
        &mut self.context
    }

    /// Root-level state instance of type `T`.
    pub fn get_state<T: State<C>>(&self) -> Option<&T> {
        self.root.get_state::<T>()
    }

    pub fn get_state_mut<T: State<C>>(&mut self) -> Option<&mut T> {
        self.root.get_state_mut::<T>()
    }

    /// Nested machine of the root-level composite state `T`.
    pub fn submachine<T: State<C>>(&self) -> Option<&Machine<C>> {
        self.root.submachine::<T>()
    }

    pub fn is_state_active<T: State<C>>(&self) -> bool {
        self.root.is_state_active::<T>()
    }

    /// Active state id of every root region.
    pub fn active_state_ids(&self) -> &[StateId] {
        self.root.active_state_ids()
    }

    /// True if any active state, at any depth, carries flag `F`.
    pub fn is_flag_active<F: 'static>(&self) -> bool {
        let mut found = false;
        self.root.visit(
            VisitMode::ACTIVE_RECURSIVE,
            &|state| state.has_flag::<F>(),
            &mut |_| found = true,
        );
        found
    }

    /// True if every active leaf state carries flag `F`.
    ///
    /// Vacuously true when no active leaf state declares any flag.
    pub fn is_flag_active_all<F: 'static>(&self) -> bool {
        let leaves = self.root.active_leaves();
        if leaves.iter().all(|state| state.flags().is_empty()) {
            return true;
        }
        leaves.iter().all(|state| state.has_flag::<F>())
    }

    /// True if some active state, at any depth, would defer `event`.
    ///
    /// Covers state-level deferral and `defer` rows; the guards of `defer`
    /// rows and of the rows ahead of them are evaluated against the current
    /// context.
    pub fn is_event_deferred(&self, event: &dyn Event) -> bool {
        self.root.defers_event(event, &self.context)
    }

    pub fn visit(
        &self,
        mode: VisitMode,
        predicate: &dyn Fn(&StateDef<C>) -> bool,
        visitor: &mut dyn FnMut(Visited<'_, C>),
    ) {
        self.root.visit(mode, predicate, visitor);
    }

    /// Calls `visitor` on every active state at every depth.
    pub fn visit_current_states<F>(&mut self, mut visitor: F)
    where
        F: FnMut(&mut dyn State<C>, &StateDef<C>),
    {
        self.root.visit_active_mut(&mut visitor);
    }

    /// Deferred events waiting for replay, oldest first.
    pub fn pending_events(&self) -> impl Iterator<Item = &dyn Event> + '_ {
        self.deferred.iter()
    }

    pub fn deferred(&self) -> &DeferredQueue {
        &self.deferred
    }

    pub fn log(&self) -> &TransitionLog {
        &self.log
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{MachineBuilder, TransitionBuilder};
    use tracing_test::traced_test;

    crate::states!(Idle, Busy);
    crate::events!(Go, Unknown);

    fn def() -> Arc<MachineDef<u32>> {
        MachineBuilder::new()
            .name("worker")
            .initial::<Idle>()
            .transition(TransitionBuilder::new().from::<Idle>().on::<Go>().to::<Busy>())
            .unwrap()
            .build()
            .unwrap()
    }

    #[test]
    #[traced_test]
    fn unhandled_events_are_logged_by_default() {
        let mut machine = StateMachine::new(def(), 0);
        machine.start().unwrap();

        assert_eq!(machine.process_event(Unknown), Ok(HandledResult::NOT_HANDLED));
        assert!(logs_contain("no transition"));
        assert!(logs_contain("Unknown"));
    }

    #[test]
    fn rounds_advance_per_external_event() {
        let mut machine = StateMachine::new(def(), 0);
        machine.start().unwrap();
        assert_eq!(machine.round, 1);

        machine.process_event(Go).unwrap();
        machine.process_event(Unknown).unwrap();
        assert_eq!(machine.round, 3);
    }

    #[test]
    fn transitions_are_not_recorded_unless_asked() {
        let mut machine = StateMachine::new(def(), 0);
        machine.start().unwrap();
        machine.process_event(Go).unwrap();
        assert!(machine.log().is_empty());
        assert!(machine.is_state_active::<Busy>());
    }
}
