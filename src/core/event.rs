//! Events delivered to state machines.
//!
//! Events are plain Rust values. Their concrete type is the dispatch key:
//! transition rows subscribe to an [`EventKind`], and the engine recovers the
//! concrete value through [`downcast_ref`](trait.Event.html#method.downcast_ref)
//! when a guard or action asks for it.

use super::short_type_name;
use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Trait for everything that can be handed to `process_event`.
///
/// # Base events
///
/// Rust has no inheritance, so an event declares the "base" kinds it also
/// answers to through [`bases`](Event::bases). Rows declared with
/// `on_base::<B>()` fire for every event whose `bases()` contains `B`.
/// The returned list must only depend on the event *type*: chains are cached
/// per type.
///
/// # Example
///
/// ```rust
/// use hsm::core::{Event, EventKind};
///
/// #[derive(Debug)]
/// struct KeyPressed;
/// impl Event for KeyPressed {}
///
/// #[derive(Debug)]
/// struct KeyA;
/// impl Event for KeyA {
///     fn bases(&self) -> Vec<EventKind> {
///         vec![EventKind::of::<KeyPressed>()]
///     }
/// }
///
/// let event: &dyn Event = &KeyA;
/// assert!(event.answers_to(EventKind::of::<KeyPressed>()));
/// assert_eq!(event.name(), "KeyA");
/// ```
pub trait Event: Any + fmt::Debug {
    /// Short name used in logs and the transition log.
    fn name(&self) -> &'static str {
        short_type_name(std::any::type_name::<Self>())
    }

    /// Base kinds this event is also delivered as.
    fn bases(&self) -> Vec<EventKind> {
        Vec::new()
    }
}

impl dyn Event {
    /// Runtime kind of the concrete event behind this reference.
    pub fn kind(&self) -> EventKind {
        EventKind {
            id: (self as &dyn Any).type_id(),
            name: self.name(),
        }
    }

    pub fn is<E: Event>(&self) -> bool {
        (self as &dyn Any).is::<E>()
    }

    pub fn downcast_ref<E: Event>(&self) -> Option<&E> {
        (self as &dyn Any).downcast_ref::<E>()
    }

    /// True when the event is of `kind` or lists it among its bases.
    pub fn answers_to(&self, kind: EventKind) -> bool {
        self.kind() == kind || self.bases().contains(&kind)
    }
}

/// Identity of an event type.
///
/// Equality and hashing only look at the `TypeId`; the name is carried along
/// for diagnostics.
#[derive(Clone, Copy)]
pub struct EventKind {
    id: TypeId,
    name: &'static str,
}

impl EventKind {
    pub fn of<E: Event>() -> Self {
        Self {
            id: TypeId::of::<E>(),
            name: short_type_name(std::any::type_name::<E>()),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for EventKind {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for EventKind {}

impl Hash for EventKind {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Synthetic event dispatched after a state owning completion rows was entered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Completion;

impl Event for Completion {}

/// Event handed to entry callbacks when a machine is started.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Start;

impl Event for Start {}

/// Event handed to exit callbacks when a machine is stopped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stop;

impl Event for Stop {}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Base;
    impl Event for Base {}

    #[derive(Debug, PartialEq)]
    struct Derived(u32);
    impl Event for Derived {
        fn bases(&self) -> Vec<EventKind> {
            vec![EventKind::of::<Base>()]
        }
    }

    #[test]
    fn kind_of_value_matches_kind_of_type() {
        let event: &dyn Event = &Derived(3);
        assert_eq!(event.kind(), EventKind::of::<Derived>());
        assert_ne!(event.kind(), EventKind::of::<Base>());
    }

    #[test]
    fn downcast_recovers_concrete_value() {
        let boxed: Box<dyn Event> = Box::new(Derived(7));
        assert_eq!(boxed.downcast_ref::<Derived>(), Some(&Derived(7)));
        assert!(boxed.downcast_ref::<Base>().is_none());
        assert!(boxed.is::<Derived>());
    }

    #[test]
    fn answers_to_includes_bases() {
        let event: &dyn Event = &Derived(1);
        assert!(event.answers_to(EventKind::of::<Derived>()));
        assert!(event.answers_to(EventKind::of::<Base>()));

        let base: &dyn Event = &Base;
        assert!(!base.answers_to(EventKind::of::<Derived>()));
    }

    #[test]
    fn names_are_short() {
        assert_eq!(EventKind::of::<Completion>().name(), "Completion");
        assert_eq!((&Derived(0) as &dyn Event).name(), "Derived");
        assert_eq!(format!("{:?}", EventKind::of::<Base>()), "Base");
    }
}
