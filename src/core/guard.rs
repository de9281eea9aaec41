//! Guard predicates for controlling transitions.
//!
//! Guards are boolean functions evaluated before a transition fires. They see
//! the event, the shared context and the source/target state instances, but
//! cannot mutate anything.

use super::event::Event;
use super::state::State;
use std::ops::Not;

/// Arguments handed to a guard.
///
/// `source` is `None` only for machine-scope internal rows; `target` is `None`
/// for internal and deferring rows.
pub struct GuardArgs<'a, C, E: ?Sized> {
    pub event: &'a E,
    pub context: &'a C,
    pub source: Option<&'a dyn State<C>>,
    pub target: Option<&'a dyn State<C>>,
}

impl<'a, C: 'static, E: ?Sized> GuardArgs<'a, C, E> {
    /// Source state as its concrete type.
    pub fn source_as<T: State<C>>(&self) -> Option<&'a T> {
        self.source.and_then(|state| state.downcast_ref::<T>())
    }

    /// Target state as its concrete type.
    pub fn target_as<T: State<C>>(&self) -> Option<&'a T> {
        self.target.and_then(|state| state.downcast_ref::<T>())
    }
}

type Predicate<C, E> = Box<dyn Fn(&GuardArgs<'_, C, E>) -> bool + Send + Sync>;

/// Predicate that decides whether a transition may fire.
///
/// Guards compose with [`and`](Guard::and), [`or`](Guard::or) and `!`;
/// composition short-circuits.
///
/// # Example
///
/// ```rust
/// use hsm::core::{Guard, GuardArgs};
///
/// #[derive(Debug)]
/// struct Coin(u32);
/// impl hsm::core::Event for Coin {}
///
/// struct Till {
///     open: bool,
/// }
///
/// let enough = Guard::<Till, Coin>::from_event(|coin| coin.0 >= 50);
/// let open = Guard::<Till, Coin>::from_context(|till| till.open);
/// let guard = enough.and(open);
///
/// let till = Till { open: true };
/// let args = GuardArgs { event: &Coin(60), context: &till, source: None, target: None };
/// assert!(guard.check(&args));
/// ```
pub struct Guard<C, E: ?Sized> {
    predicate: Predicate<C, E>,
}

impl<C: 'static, E: ?Sized + 'static> Guard<C, E> {
    /// Create a guard from a predicate over the full argument set.
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&GuardArgs<'_, C, E>) -> bool + Send + Sync + 'static,
    {
        Guard {
            predicate: Box::new(predicate),
        }
    }

    /// Guard that only looks at the event.
    pub fn from_event<F>(predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        Self::new(move |args| predicate(args.event))
    }

    /// Guard that only looks at the context.
    pub fn from_context<F>(predicate: F) -> Self
    where
        F: Fn(&C) -> bool + Send + Sync + 'static,
    {
        Self::new(move |args| predicate(args.context))
    }

    /// Guard that always passes. Handy for `otherwise` rows.
    pub fn always() -> Self {
        Self::new(|_| true)
    }

    pub fn check(&self, args: &GuardArgs<'_, C, E>) -> bool {
        (self.predicate)(args)
    }

    /// Both guards must pass; `other` is not evaluated if `self` fails.
    pub fn and(self, other: Guard<C, E>) -> Self {
        Self::new(move |args| self.check(args) && other.check(args))
    }

    /// Either guard must pass; `other` is not evaluated if `self` passes.
    pub fn or(self, other: Guard<C, E>) -> Self {
        Self::new(move |args| self.check(args) || other.check(args))
    }

    /// Re-targets the guard to a type-erased event using `narrow`.
    ///
    /// Events that `narrow` rejects make the guard fail.
    pub(crate) fn erase(self, narrow: fn(&dyn Event) -> Option<&E>) -> Guard<C, dyn Event> {
        Guard::new(move |args| match narrow(args.event) {
            Some(event) => self.check(&GuardArgs {
                event,
                context: args.context,
                source: args.source,
                target: args.target,
            }),
            None => false,
        })
    }
}

impl<C: 'static, E: ?Sized + 'static> Not for Guard<C, E> {
    type Output = Self;

    fn not(self) -> Self {
        Self::new(move |args| !self.check(args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug)]
    struct Ping(u32);
    impl Event for Ping {}

    #[derive(Debug)]
    struct Pong;
    impl Event for Pong {}

    #[derive(Default)]
    struct Ctx {
        limit: u32,
    }

    #[derive(Default)]
    struct Waiting;
    impl State<Ctx> for Waiting {}

    fn args<'a>(event: &'a Ping, context: &'a Ctx) -> GuardArgs<'a, Ctx, Ping> {
        GuardArgs {
            event,
            context,
            source: None,
            target: None,
        }
    }

    #[test]
    fn guard_sees_event_and_context() {
        let guard = Guard::<Ctx, Ping>::new(|args| args.event.0 < args.context.limit);
        let ctx = Ctx { limit: 5 };

        assert!(guard.check(&args(&Ping(3), &ctx)));
        assert!(!guard.check(&args(&Ping(8), &ctx)));
    }

    #[test]
    fn and_short_circuits() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let second = Guard::<Ctx, Ping>::new(move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
            true
        });
        let guard = Guard::<Ctx, Ping>::from_event(|ping| ping.0 > 10).and(second);
        let ctx = Ctx::default();

        assert!(!guard.check(&args(&Ping(1), &ctx)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert!(guard.check(&args(&Ping(11), &ctx)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn or_and_not_compose() {
        let small = Guard::<Ctx, Ping>::from_event(|ping| ping.0 < 2);
        let large = Guard::<Ctx, Ping>::from_event(|ping| ping.0 > 8);
        let middle = !small.or(large);
        let ctx = Ctx::default();

        assert!(middle.check(&args(&Ping(5), &ctx)));
        assert!(!middle.check(&args(&Ping(1), &ctx)));
        assert!(!middle.check(&args(&Ping(9), &ctx)));
    }

    #[test]
    fn erased_guard_rejects_other_events() {
        fn narrow(event: &dyn Event) -> Option<&Ping> {
            event.downcast_ref::<Ping>()
        }

        fn erased<'a>(event: &'a dyn Event, context: &'a Ctx) -> GuardArgs<'a, Ctx, dyn Event> {
            GuardArgs {
                event,
                context,
                source: None,
                target: None,
            }
        }

        let guard = Guard::<Ctx, Ping>::from_event(|ping| ping.0 == 1).erase(narrow);
        let ctx = Ctx::default();

        assert!(guard.check(&erased(&Ping(1), &ctx)));
        assert!(!guard.check(&erased(&Pong, &ctx)));
    }

    #[test]
    fn source_as_downcasts_state() {
        let ctx = Ctx::default();
        let waiting = Waiting;
        let args = GuardArgs {
            event: &Ping(0),
            context: &ctx,
            source: Some(&waiting as &dyn State<Ctx>),
            target: None,
        };

        assert!(args.source_as::<Waiting>().is_some());
        assert!(args.target_as::<Waiting>().is_none());
    }
}
