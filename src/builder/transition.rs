//! Builder for transition rows.

use crate::builder::error::BuildError;
use crate::core::{Action, ActionArgs, Completion, Event, EventKind, Guard, GuardArgs, State, TypeKey};
use crate::dispatch::row::Trigger;
use crate::machine::Factory;
use std::fmt;
use std::sync::Arc;

/// Row source before state ids are known.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SourceSpec {
    State(TypeKey),
    Exit { composite: TypeKey, point: TypeKey },
    Machine,
}

/// Row target before state ids are known.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum TargetSpec {
    Internal,
    Defer,
    State(TypeKey),
    Direct { state: TypeKey, points: Vec<TypeKey> },
    Entry { state: TypeKey, point: TypeKey },
}

impl TargetSpec {
    pub(crate) fn state(&self) -> Option<TypeKey> {
        match self {
            TargetSpec::Internal | TargetSpec::Defer => None,
            TargetSpec::State(key)
            | TargetSpec::Direct { state: key, .. }
            | TargetSpec::Entry { state: key, .. } => Some(*key),
        }
    }
}

/// A complete transition row, ready to be added to a `MachineBuilder`.
pub struct Transition<C> {
    pub(crate) source: SourceSpec,
    pub(crate) trigger: Trigger,
    pub(crate) target: TargetSpec,
    pub(crate) guard: Option<Guard<C, dyn Event>>,
    pub(crate) action: Option<Action<C, dyn Event>>,
    pub(crate) otherwise: bool,
    pub(crate) states: Vec<(TypeKey, Factory<C>)>,
}

impl<C> Transition<C> {
    pub(crate) fn source_key(&self) -> Option<TypeKey> {
        match self.source {
            SourceSpec::State(key) | SourceSpec::Exit { composite: key, .. } => Some(key),
            SourceSpec::Machine => None,
        }
    }
}

impl<C> fmt::Debug for Transition<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("source", &self.source)
            .field("trigger", &self.trigger)
            .field("target", &self.target)
            .field("guarded", &self.guard.is_some())
            .field("otherwise", &self.otherwise)
            .finish()
    }
}

pub(crate) fn factory<C, S: State<C> + Default>() -> (TypeKey, Factory<C>) {
    let make: Factory<C> = Arc::new(|| Box::new(S::default()) as Box<dyn State<C>>);
    (TypeKey::of::<S>(), make)
}

pub(crate) fn narrow_to<E: Event>(event: &dyn Event) -> Option<&E> {
    event.downcast_ref::<E>()
}

fn narrow_any(event: &dyn Event) -> Option<&dyn Event> {
    Some(event)
}

/// Builder for constructing transition rows with a fluent API.
///
/// The event type parameter `E` is fixed by [`on`](Self::on); guards and
/// actions added afterwards receive the concrete event. Rows declared with
/// [`on_base`](Self::on_base) or [`on_any`](Self::on_any) receive
/// `&dyn Event`.
///
/// # Example
///
/// ```rust
/// use hsm::builder::TransitionBuilder;
/// use hsm::core::{Event, State};
///
/// #[derive(Default)]
/// struct Locked;
/// impl State<u32> for Locked {}
///
/// #[derive(Default)]
/// struct Unlocked;
/// impl State<u32> for Unlocked {}
///
/// #[derive(Debug)]
/// struct Code(u32);
/// impl Event for Code {}
///
/// let row = TransitionBuilder::<u32>::new()
///     .from::<Locked>()
///     .on::<Code>()
///     .when(|args| args.event.0 == *args.context)
///     .to::<Unlocked>()
///     .build();
/// assert!(row.is_ok());
/// ```
pub struct TransitionBuilder<C, E: ?Sized = dyn Event> {
    source: Option<SourceSpec>,
    trigger: Option<Trigger>,
    target: Option<TargetSpec>,
    guard: Option<Guard<C, dyn Event>>,
    action: Option<Action<C, dyn Event>>,
    otherwise: bool,
    narrow: fn(&dyn Event) -> Option<&E>,
    states: Vec<(TypeKey, Factory<C>)>,
    misuse: Option<BuildError>,
}

impl<C: 'static> TransitionBuilder<C> {
    /// Create a new transition builder.
    pub fn new() -> Self {
        Self {
            source: None,
            trigger: None,
            target: None,
            guard: None,
            action: None,
            otherwise: false,
            narrow: narrow_any,
            states: Vec::new(),
            misuse: None,
        }
    }
}

impl<C: 'static> Default for TransitionBuilder<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: 'static, E: ?Sized + 'static> TransitionBuilder<C, E> {
    /// Set the source state (required unless the row is machine-scope).
    pub fn from<S: State<C> + Default>(mut self) -> Self {
        let (key, make) = factory::<C, S>();
        self.source = Some(SourceSpec::State(key));
        self.states.push((key, make));
        self
    }

    /// Leave composite `Sub` when it reaches its exit point `P`.
    pub fn from_exit<Sub: State<C> + Default, P: 'static>(mut self) -> Self {
        let (key, make) = factory::<C, Sub>();
        self.source = Some(SourceSpec::Exit {
            composite: key,
            point: TypeKey::of::<P>(),
        });
        self.states.push((key, make));
        self
    }

    /// Trigger on events of exactly type `T`.
    pub fn on<T: Event>(self) -> TransitionBuilder<C, T> {
        self.retarget(Trigger::Exact(EventKind::of::<T>()), narrow_to::<T>)
    }

    /// Trigger on `B` and on every event listing `B` among its bases.
    pub fn on_base<B: Event>(self) -> TransitionBuilder<C, dyn Event> {
        self.retarget(Trigger::Base(EventKind::of::<B>()), narrow_any)
    }

    /// Trigger on every event except `Completion`.
    pub fn on_any(self) -> TransitionBuilder<C, dyn Event> {
        self.retarget(Trigger::Any, narrow_any)
    }

    /// Trigger as soon as the source state has been entered.
    pub fn on_completion(self) -> TransitionBuilder<C, Completion> {
        self.retarget(
            Trigger::Exact(EventKind::of::<Completion>()),
            narrow_to::<Completion>,
        )
    }

    fn retarget<T: ?Sized + 'static>(
        self,
        trigger: Trigger,
        narrow: fn(&dyn Event) -> Option<&T>,
    ) -> TransitionBuilder<C, T> {
        TransitionBuilder {
            source: self.source,
            trigger: Some(trigger),
            target: self.target,
            guard: self.guard,
            action: self.action,
            otherwise: self.otherwise,
            narrow,
            states: self.states,
            misuse: self.misuse,
        }
    }

    /// Set the target state.
    pub fn to<S: State<C> + Default>(mut self) -> Self {
        let (key, make) = factory::<C, S>();
        self.target = Some(TargetSpec::State(key));
        self.states.push((key, make));
        self
    }

    /// Enter composite `Sub` directly in its sub-state `P`.
    pub fn to_direct<Sub: State<C> + Default, P: 'static>(mut self) -> Self {
        let (key, make) = factory::<C, Sub>();
        self.target = Some(TargetSpec::Direct {
            state: key,
            points: vec![TypeKey::of::<P>()],
        });
        self.states.push((key, make));
        self
    }

    /// Add another explicit sub-state to a `to_direct` target (fork).
    pub fn and_direct<P: 'static>(mut self) -> Self {
        let point = TypeKey::of::<P>();
        let misuse = match &mut self.target {
            Some(TargetSpec::Direct { points, .. }) if points.contains(&point) => {
                Some(BuildError::DuplicateExplicitEntry {
                    state: point.name(),
                })
            }
            Some(TargetSpec::Direct { points, .. }) => {
                points.push(point);
                None
            }
            _ => Some(BuildError::DanglingDirectEntry {
                state: point.name(),
            }),
        };
        if let Some(error) = misuse {
            self.misuse.get_or_insert(error);
        }
        self
    }

    /// Enter composite `Sub` through its pseudo entry state `P`.
    pub fn to_entry<Sub: State<C> + Default, P: 'static>(mut self) -> Self {
        let (key, make) = factory::<C, Sub>();
        self.target = Some(TargetSpec::Entry {
            state: key,
            point: TypeKey::of::<P>(),
        });
        self.states.push((key, make));
        self
    }

    /// Handle the event without leaving the source state.
    pub fn internal(mut self) -> Self {
        self.target = Some(TargetSpec::Internal);
        self
    }

    /// Defer the event when the guard passes.
    pub fn defer(mut self) -> Self {
        self.target = Some(TargetSpec::Defer);
        self
    }

    /// Add a guard. Several guards must all pass.
    pub fn when<F>(self, predicate: F) -> Self
    where
        F: Fn(&GuardArgs<'_, C, E>) -> bool + Send + Sync + 'static,
    {
        self.guard(Guard::new(predicate))
    }

    /// Add a prebuilt guard. Several guards must all pass.
    pub fn guard(mut self, guard: Guard<C, E>) -> Self {
        let guard = guard.erase(self.narrow);
        self.guard = Some(match self.guard.take() {
            Some(existing) => existing.and(guard),
            None => guard,
        });
        self
    }

    /// Add an action; runs after any action added before.
    pub fn action<F>(mut self, effect: F) -> Self
    where
        F: Fn(&mut ActionArgs<'_, C, E>) + Send + Sync + 'static,
    {
        let action = Action::new(effect).erase(self.narrow);
        self.action = Some(match self.action.take() {
            Some(existing) => existing.then(action),
            None => action,
        });
        self
    }

    /// Try this row only after every other row of its chain.
    pub fn otherwise(mut self) -> Self {
        self.otherwise = true;
        self
    }

    /// Build the transition.
    /// Returns an error if source, event or target is missing.
    pub fn build(mut self) -> Result<Transition<C>, BuildError> {
        if let Some(misuse) = self.misuse.take() {
            return Err(misuse);
        }
        let source = self.source.ok_or(BuildError::MissingSource)?;
        self.finish(source)
    }

    /// Build a machine-scope row: no source, internal or deferring only.
    pub(crate) fn build_machine_scope(mut self) -> Result<Transition<C>, BuildError> {
        if let Some(misuse) = self.misuse.take() {
            return Err(misuse);
        }
        if self.source.is_some() {
            return Err(BuildError::InvalidInternalRow {
                reason: "machine-scope rows have no source state".to_string(),
            });
        }
        if !matches!(
            self.target.get_or_insert(TargetSpec::Internal),
            TargetSpec::Internal | TargetSpec::Defer
        ) {
            return Err(BuildError::InvalidInternalRow {
                reason: "machine-scope rows cannot change state".to_string(),
            });
        }
        self.finish(SourceSpec::Machine)
    }

    fn finish(self, source: SourceSpec) -> Result<Transition<C>, BuildError> {
        let trigger = self.trigger.ok_or(BuildError::MissingEvent)?;
        let target = self.target.ok_or(BuildError::MissingTarget)?;
        Ok(Transition {
            source,
            trigger,
            target,
            guard: self.guard,
            action: self.action,
            otherwise: self.otherwise,
            states: self.states,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Locked;
    impl State<u32> for Locked {}

    #[derive(Default)]
    struct Unlocked;
    impl State<u32> for Unlocked {}

    #[derive(Default)]
    struct Panel;
    impl State<u32> for Panel {}

    struct Digit;
    struct Display;

    #[derive(Debug)]
    struct Code(u32);
    impl Event for Code {}

    #[derive(Debug)]
    struct Reset;
    impl Event for Reset {}

    fn check(row: &Transition<u32>, event: &dyn Event, context: u32) -> bool {
        row.guard.as_ref().map_or(true, |guard| {
            guard.check(&GuardArgs {
                event,
                context: &context,
                source: None,
                target: None,
            })
        })
    }

    #[test]
    fn builds_with_all_required_fields() {
        let row = TransitionBuilder::<u32>::new()
            .from::<Locked>()
            .on::<Code>()
            .to::<Unlocked>()
            .build()
            .unwrap();

        assert_eq!(row.source, SourceSpec::State(TypeKey::of::<Locked>()));
        assert_eq!(row.trigger, Trigger::Exact(EventKind::of::<Code>()));
        assert_eq!(row.target, TargetSpec::State(TypeKey::of::<Unlocked>()));
        assert_eq!(row.states.len(), 2);
        assert!(!row.otherwise);
    }

    #[test]
    fn missing_source_fails() {
        let result = TransitionBuilder::<u32>::new()
            .on::<Code>()
            .to::<Unlocked>()
            .build();
        assert_eq!(result.unwrap_err(), BuildError::MissingSource);
    }

    #[test]
    fn missing_event_fails() {
        let result = TransitionBuilder::<u32>::new()
            .from::<Locked>()
            .to::<Unlocked>()
            .build();
        assert_eq!(result.unwrap_err(), BuildError::MissingEvent);
    }

    #[test]
    fn missing_target_fails() {
        let result = TransitionBuilder::<u32>::new()
            .from::<Locked>()
            .on::<Code>()
            .build();
        assert_eq!(result.unwrap_err(), BuildError::MissingTarget);
    }

    #[test]
    fn typed_guards_see_the_concrete_event() {
        let row = TransitionBuilder::<u32>::new()
            .from::<Locked>()
            .on::<Code>()
            .when(|args| args.event.0 == *args.context)
            .to::<Unlocked>()
            .build()
            .unwrap();

        assert!(check(&row, &Code(7), 7));
        assert!(!check(&row, &Code(8), 7));
        assert!(!check(&row, &Reset, 7));
    }

    #[test]
    fn guards_added_before_the_event_are_kept() {
        let row = TransitionBuilder::<u32>::new()
            .from::<Locked>()
            .when(|args| *args.context > 0)
            .on::<Code>()
            .when(|args| args.event.0 > 1)
            .to::<Unlocked>()
            .build()
            .unwrap();

        assert!(check(&row, &Code(2), 1));
        assert!(!check(&row, &Code(2), 0));
        assert!(!check(&row, &Code(1), 1));
    }

    #[test]
    fn actions_accumulate_in_order() {
        let row = TransitionBuilder::<u32>::new()
            .from::<Locked>()
            .on::<Code>()
            .action(|args| *args.context += args.event.0)
            .action(|args| *args.context *= 10)
            .internal()
            .build()
            .unwrap();

        let mut context = 0;
        let mut outbox = crate::core::Outbox::default();
        let action = row.action.as_ref().unwrap();
        action.run(&mut ActionArgs {
            event: &Code(3) as &dyn Event,
            context: &mut context,
            source: None,
            target: None,
            outbox: &mut outbox,
        });
        assert_eq!(context, 30);
    }

    #[test]
    fn completion_rows_use_the_completion_kind() {
        let row = TransitionBuilder::<u32>::new()
            .from::<Locked>()
            .on_completion()
            .to::<Unlocked>()
            .build()
            .unwrap();
        assert_eq!(row.trigger, Trigger::Exact(EventKind::of::<Completion>()));
    }

    #[test]
    fn direct_targets_collect_points() {
        let row = TransitionBuilder::<u32>::new()
            .from::<Locked>()
            .on::<Reset>()
            .to_direct::<Panel, Digit>()
            .and_direct::<Display>()
            .build()
            .unwrap();

        assert_eq!(
            row.target,
            TargetSpec::Direct {
                state: TypeKey::of::<Panel>(),
                points: vec![TypeKey::of::<Digit>(), TypeKey::of::<Display>()],
            }
        );
    }

    #[test]
    fn duplicate_direct_points_fail() {
        let result = TransitionBuilder::<u32>::new()
            .from::<Locked>()
            .on::<Reset>()
            .to_direct::<Panel, Digit>()
            .and_direct::<Digit>()
            .build();
        assert_eq!(
            result.unwrap_err(),
            BuildError::DuplicateExplicitEntry { state: "Digit" }
        );
    }

    #[test]
    fn and_direct_needs_a_direct_target() {
        let result = TransitionBuilder::<u32>::new()
            .from::<Locked>()
            .on::<Reset>()
            .to::<Panel>()
            .and_direct::<Digit>()
            .build();
        assert_eq!(
            result.unwrap_err(),
            BuildError::DanglingDirectEntry { state: "Digit" }
        );
    }

    #[test]
    fn machine_scope_rows_default_to_internal() {
        let row = TransitionBuilder::<u32>::new()
            .on::<Reset>()
            .build_machine_scope()
            .unwrap();
        assert_eq!(row.source, SourceSpec::Machine);
        assert_eq!(row.target, TargetSpec::Internal);
        assert_eq!(row.source_key(), None);
    }

    #[test]
    fn machine_scope_rows_cannot_change_state() {
        let result = TransitionBuilder::<u32>::new()
            .on::<Reset>()
            .to::<Unlocked>()
            .build_machine_scope();
        assert!(matches!(result, Err(BuildError::InvalidInternalRow { .. })));

        let result = TransitionBuilder::<u32>::new()
            .from::<Locked>()
            .on::<Reset>()
            .build_machine_scope();
        assert!(matches!(result, Err(BuildError::InvalidInternalRow { .. })));
    }
}
