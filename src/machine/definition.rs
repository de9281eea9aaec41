//! Immutable machine definitions.
//!
//! A [`MachineDef`] is produced by `MachineBuilder::build` and shared through
//! an `Arc` by every instance of the machine, including instances nested as
//! submachines of other definitions. It owns the resolved rows and the lazily
//! filled dispatch table.

use crate::core::{Completion, Event, EventKind, State, StateId, StateKind, TypeKey};
use crate::dispatch::row::Row;
use crate::dispatch::{build_chain, Chain, DispatchStrategy, DispatchTable, EventKey, Probe, Scope};
use serde::{Deserialize, Serialize};
use std::any::TypeId;
use std::cell::OnceCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

pub(crate) type Factory<C> = Arc<dyn Fn() -> Box<dyn State<C>> + Send + Sync>;
pub(crate) type ExitConverter = Arc<dyn Fn(&dyn Event) -> Box<dyn Event> + Send + Sync>;
pub(crate) type DeferPredicate = Arc<dyn Fn(&dyn Event) -> bool + Send + Sync>;

/// Called once for every event that no active state handled or deferred.
///
/// Receives the event, the root definition, the id of the active state of the
/// first region that is not suspended, and the context.
pub type NoTransitionHook<C> = Arc<dyn Fn(&dyn Event, &MachineDef<C>, StateId, &mut C) + Send + Sync>;

/// When a submachine restores its previous configuration on re-entry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum HistoryPolicy {
    /// Always start from the initial states.
    #[default]
    None,
    /// Restore the last active states when entered by one of these events.
    Shallow(Vec<EventKind>),
    /// Restore the last active states on every re-entry.
    Always,
}

impl HistoryPolicy {
    pub(crate) fn restores(&self, event: &dyn Event) -> bool {
        match self {
            HistoryPolicy::None => false,
            HistoryPolicy::Shallow(kinds) => kinds.iter().any(|kind| event.answers_to(*kind)),
            HistoryPolicy::Always => true,
        }
    }
}

/// Per-state part of a definition.
pub struct StateDef<C> {
    pub(crate) key: TypeKey,
    pub(crate) kind: StateKind,
    pub(crate) region: usize,
    pub(crate) flags: Vec<TypeKey>,
    pub(crate) deferred: Vec<EventKind>,
    pub(crate) defer_when: Option<DeferPredicate>,
    pub(crate) interrupt_ends: Vec<EventKind>,
    pub(crate) factory: Factory<C>,
    pub(crate) submachine: Option<Arc<MachineDef<C>>>,
    pub(crate) exit_converter: Option<ExitConverter>,
    pub(crate) has_completion: bool,
}

impl<C: 'static> StateDef<C> {
    pub fn key(&self) -> TypeKey {
        self.key
    }

    pub fn name(&self) -> &'static str {
        self.key.name()
    }

    pub fn kind(&self) -> StateKind {
        self.kind
    }

    pub fn region(&self) -> usize {
        self.region
    }

    pub fn flags(&self) -> &[TypeKey] {
        &self.flags
    }

    pub fn has_flag<F: 'static>(&self) -> bool {
        self.flags.contains(&TypeKey::of::<F>())
    }

    pub fn is<T: 'static>(&self) -> bool {
        self.key.id() == TypeId::of::<T>()
    }

    pub fn submachine(&self) -> Option<&Arc<MachineDef<C>>> {
        self.submachine.as_ref()
    }

    /// Whether this state defers `event` by its own declaration.
    ///
    /// `Completion` is never deferred.
    pub fn defers(&self, event: &dyn Event) -> bool {
        if event.is::<Completion>() {
            return false;
        }
        self.deferred.iter().any(|kind| event.answers_to(*kind))
            || self.defer_when.as_ref().is_some_and(|when| when(event))
    }

    /// Whether `event` ends this interrupt state's blocking.
    pub fn ends_interrupt(&self, event: &dyn Event) -> bool {
        self.interrupt_ends.iter().any(|kind| event.answers_to(*kind))
    }

    pub fn has_completion(&self) -> bool {
        self.has_completion
    }

    pub(crate) fn create(&self) -> Box<dyn State<C>> {
        (self.factory)()
    }

    pub(crate) fn convert_exit(&self, event: &dyn Event) -> Option<Box<dyn Event>> {
        self.exit_converter.as_ref().map(|convert| convert(event))
    }

    fn info(&self, id: StateId) -> StateInfo {
        StateInfo {
            id,
            name: self.name().to_string(),
            kind: self.kind,
            region: self.region,
            flags: self.flags.iter().map(|flag| flag.name().to_string()).collect(),
            deferred: self.deferred.iter().map(|kind| kind.name().to_string()).collect(),
            submachine: self.submachine.as_ref().map(|sub| Box::new(sub.report())),
        }
    }
}

impl<C> fmt::Debug for StateDef<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateDef")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .field("region", &self.region)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

/// Serializable description of a resolved state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateInfo {
    pub id: StateId,
    pub name: String,
    pub kind: StateKind,
    pub region: usize,
    pub flags: Vec<String>,
    pub deferred: Vec<String>,
    pub submachine: Option<Box<TopologyReport>>,
}

/// Serializable description of a machine definition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TopologyReport {
    pub name: String,
    pub strategy: DispatchStrategy,
    pub initial: Vec<StateId>,
    pub states: Vec<StateInfo>,
    pub rows: usize,
}

/// Resolved, immutable definition of one machine level.
pub struct MachineDef<C> {
    pub(crate) name: String,
    pub(crate) states: Vec<StateDef<C>>,
    pub(crate) ids: HashMap<TypeId, StateId>,
    pub(crate) initial: Vec<StateId>,
    pub(crate) rows: Vec<Row<C>>,
    pub(crate) table: Box<dyn DispatchTable>,
    pub(crate) history: HistoryPolicy,
    pub(crate) hook: NoTransitionHook<C>,
    pub(crate) record_transitions: bool,
}

impl<C: 'static> MachineDef<C> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn states(&self) -> &[StateDef<C>] {
        &self.states
    }

    pub fn state(&self, id: StateId) -> Option<&StateDef<C>> {
        self.states.get(id)
    }

    pub fn state_id<T: 'static>(&self) -> Option<StateId> {
        self.ids.get(&TypeId::of::<T>()).copied()
    }

    pub(crate) fn state_by_type(&self, id: TypeId) -> Option<&StateDef<C>> {
        self.ids.get(&id).map(|&id| &self.states[id])
    }

    /// Initial state of every region, in region order.
    pub fn initial(&self) -> &[StateId] {
        &self.initial
    }

    pub fn region_count(&self) -> usize {
        self.initial.len()
    }

    pub fn strategy(&self) -> DispatchStrategy {
        self.table.strategy()
    }

    pub fn history(&self) -> &HistoryPolicy {
        &self.history
    }

    /// Whether this definition or any nested submachine has a state matching
    /// `predicate`.
    pub fn contains(&self, predicate: &dyn Fn(&StateDef<C>) -> bool) -> bool {
        self.states.iter().any(|state| {
            predicate(state)
                || state
                    .submachine
                    .as_ref()
                    .is_some_and(|sub| sub.contains(predicate))
        })
    }

    pub fn report(&self) -> TopologyReport {
        TopologyReport {
            name: self.name.clone(),
            strategy: self.strategy(),
            initial: self.initial.clone(),
            states: self
                .states
                .iter()
                .enumerate()
                .map(|(id, state)| state.info(id))
                .collect(),
            rows: self.rows.len(),
        }
    }

    /// Chain of `scope` for `event`, built on first use.
    pub(crate) fn chain(&self, scope: Scope, key: EventKey, event: &dyn Event) -> Chain {
        let count = self.states.len();
        let bases = OnceCell::new();
        self.table.chain(scope.index(count), key, &|index: usize| {
            let probe = Probe {
                kind: event.kind(),
                bases: bases.get_or_init(|| event.bases()),
                exit: key.exit,
            };
            build_chain(&self.rows, Scope::from_index(index, count), &probe)
        })
    }

    pub(crate) fn call_hook(&self, event: &dyn Event, state: StateId, context: &mut C) {
        (self.hook)(event, self, state, context)
    }
}

impl<C> fmt::Debug for MachineDef<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MachineDef")
            .field("name", &self.name)
            .field("states", &self.states)
            .field("initial", &self.initial)
            .field("rows", &self.rows)
            .field("table", &self.table)
            .field("history", &self.history)
            .finish_non_exhaustive()
    }
}

pub(crate) fn default_hook<C: 'static>() -> NoTransitionHook<C> {
    Arc::new(
        |event: &dyn Event, machine: &MachineDef<C>, state: StateId, _context: &mut C| {
            warn!(
                event = event.name(),
                machine = machine.name(),
                state = machine.state(state).map(StateDef::name).unwrap_or("?"),
                "no transition"
            );
        },
    )
}
