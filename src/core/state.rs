//! Core State trait and state identity.
//!
//! States are Rust types. Each state type participating in a machine gets a
//! stable small-integer [`StateId`] when the machine definition is built; the
//! machine owns one instance of every state for its whole lifetime.

use super::event::Event;
use super::short_type_name;
use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Index of a state inside its owning machine definition.
pub type StateId = usize;

/// Trait for state machine states.
///
/// Entry and exit callbacks receive the event that caused the change and the
/// context shared by the whole hierarchy. Both default to doing nothing.
///
/// # Example
///
/// ```rust
/// use hsm::core::{Event, State};
///
/// #[derive(Default)]
/// struct Playing {
///     entered: u32,
/// }
///
/// struct Player {
///     volume: u8,
/// }
///
/// impl State<Player> for Playing {
///     fn on_entry(&mut self, _event: &dyn Event, context: &mut Player) {
///         self.entered += 1;
///         context.volume = 5;
///     }
/// }
/// ```
pub trait State<C>: Any {
    fn on_entry(&mut self, _event: &dyn Event, _context: &mut C) {}

    fn on_exit(&mut self, _event: &dyn Event, _context: &mut C) {}
}

impl<C: 'static> dyn State<C> {
    pub fn is<T: State<C>>(&self) -> bool {
        (self as &dyn Any).is::<T>()
    }

    pub fn downcast_ref<T: State<C>>(&self) -> Option<&T> {
        (self as &dyn Any).downcast_ref::<T>()
    }

    pub fn downcast_mut<T: State<C>>(&mut self) -> Option<&mut T> {
        (self as &mut dyn Any).downcast_mut::<T>()
    }
}

/// Classification of a state inside its machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateKind {
    /// Plain leaf state.
    Simple,
    /// State that owns a nested machine.
    Composite,
    /// Pseudo-entry on the boundary of its machine.
    EntryPoint,
    /// Pseudo-exit on the boundary of its machine.
    ExitPoint,
    /// Blocks every event of its region except the declared end events.
    Interrupt,
    /// Makes its region permanently inert.
    Terminate,
}

/// Type identity used for state and flag types.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: short_type_name(std::any::type_name::<T>()),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}
