//! Transition actions.
//!
//! An action runs between the exit of the source state and the entry of the
//! target. It may mutate the context and post follow-up events; posted events
//! are processed once the current event has been fully handled.

use super::event::Event;
use super::state::State;
use std::collections::VecDeque;

/// Events posted by actions, waiting to be processed.
#[derive(Debug, Default)]
pub(crate) struct Outbox {
    events: VecDeque<Box<dyn Event>>,
}

impl Outbox {
    pub(crate) fn push(&mut self, event: Box<dyn Event>) {
        self.events.push_back(event);
    }

    pub(crate) fn pop(&mut self) -> Option<Box<dyn Event>> {
        self.events.pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.events.len()
    }

    pub(crate) fn clear(&mut self) {
        self.events.clear();
    }
}

/// Arguments handed to an action.
pub struct ActionArgs<'a, C, E: ?Sized> {
    pub event: &'a E,
    pub context: &'a mut C,
    /// Source state, already exited. `None` for machine-scope rows.
    pub source: Option<&'a dyn State<C>>,
    /// Target state, not yet entered. `None` for internal rows.
    pub target: Option<&'a dyn State<C>>,
    pub(crate) outbox: &'a mut Outbox,
}

impl<'a, C, E: ?Sized> ActionArgs<'a, C, E> {
    /// Queue `event` for processing after the current one.
    pub fn post<P: Event>(&mut self, event: P) {
        self.outbox.push(Box::new(event));
    }
}

type Effect<C, E> = Box<dyn Fn(&mut ActionArgs<'_, C, E>) + Send + Sync>;

/// Side effect attached to a transition row.
///
/// # Example
///
/// ```rust
/// use hsm::core::{Action, Event};
///
/// #[derive(Debug)]
/// struct Deposit(u64);
/// impl Event for Deposit {}
///
/// struct Account {
///     balance: u64,
/// }
///
/// let credit = Action::<Account, Deposit>::new(|args| {
///     args.context.balance += args.event.0;
/// });
/// # let _ = credit;
/// ```
pub struct Action<C, E: ?Sized> {
    effect: Effect<C, E>,
}

impl<C: 'static, E: ?Sized + 'static> Action<C, E> {
    pub fn new<F>(effect: F) -> Self
    where
        F: Fn(&mut ActionArgs<'_, C, E>) + Send + Sync + 'static,
    {
        Action {
            effect: Box::new(effect),
        }
    }

    pub fn run(&self, args: &mut ActionArgs<'_, C, E>) {
        (self.effect)(args)
    }

    /// Runs `self`, then `next`.
    pub fn then(self, next: Action<C, E>) -> Self {
        Self::new(move |args| {
            self.run(args);
            next.run(args);
        })
    }

    pub(crate) fn erase(self, narrow: fn(&dyn Event) -> Option<&E>) -> Action<C, dyn Event> {
        Action::new(move |args| {
            if let Some(event) = narrow(args.event) {
                self.run(&mut ActionArgs {
                    event,
                    context: &mut *args.context,
                    source: args.source,
                    target: args.target,
                    outbox: &mut *args.outbox,
                });
            }
        })
    }
}
