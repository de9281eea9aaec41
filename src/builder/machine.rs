//! Builder for machine definitions.

use crate::builder::error::{collect, BuildError};
use crate::builder::state::StateConfig;
use crate::builder::transition::{factory, SourceSpec, TargetSpec, Transition, TransitionBuilder};
use crate::core::{Completion, Event, EventKind, State, StateKind, TypeKey};
use crate::dispatch::row::{Row, RowSource, RowTarget, Trigger};
use crate::dispatch::DispatchStrategy;
use crate::machine::{
    default_hook, ExitConverter, Factory, HistoryPolicy, MachineDef, NoTransitionHook, StateDef,
};
use crate::topology::{resolve, Edge};
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;
use tracing::debug;

type Check = Validation<(), NonEmptyVec<BuildError>>;

/// Builder for constructing machine definitions with a fluent API.
///
/// Every state type named by a row, an initial state or a configuration call
/// becomes a state of the definition. Ids follow the order in which states
/// first appear: row sources, then row targets, then initial states, then
/// explicitly declared states.
///
/// # Example
///
/// ```rust
/// use hsm::builder::{MachineBuilder, StateConfig, TransitionBuilder};
/// use hsm::core::{Event, State};
///
/// #[derive(Default)]
/// struct Empty;
/// impl State<()> for Empty {}
///
/// #[derive(Default)]
/// struct Loaded;
/// impl State<()> for Loaded {}
///
/// struct HasDisc;
///
/// #[derive(Debug)]
/// struct Insert;
/// impl Event for Insert {}
///
/// let def = MachineBuilder::<()>::new()
///     .name("player")
///     .initial::<Empty>()
///     .transition(TransitionBuilder::new().from::<Empty>().on::<Insert>().to::<Loaded>())
///     .unwrap()
///     .state::<Loaded>(StateConfig::new().flag::<HasDisc>())
///     .build()
///     .unwrap();
///
/// assert_eq!(def.state_id::<Empty>(), Some(0));
/// assert_eq!(def.state_id::<Loaded>(), Some(1));
/// ```
pub struct MachineBuilder<C> {
    name: Option<String>,
    initial: Vec<TypeKey>,
    transitions: Vec<Transition<C>>,
    configs: Vec<(TypeKey, StateConfig)>,
    composites: Vec<(TypeKey, Arc<MachineDef<C>>)>,
    entry_points: Vec<(TypeKey, usize)>,
    exit_points: Vec<(TypeKey, ExitConverter)>,
    explicit: Vec<TypeKey>,
    factories: Vec<(TypeKey, Factory<C>)>,
    overrides: Vec<(TypeKey, Factory<C>)>,
    history: HistoryPolicy,
    strategy: DispatchStrategy,
    hook: Option<NoTransitionHook<C>>,
    record: bool,
}

impl<C: 'static> MachineBuilder<C> {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            name: None,
            initial: Vec::new(),
            transitions: Vec::new(),
            configs: Vec::new(),
            composites: Vec::new(),
            entry_points: Vec::new(),
            exit_points: Vec::new(),
            explicit: Vec::new(),
            factories: Vec::new(),
            overrides: Vec::new(),
            history: HistoryPolicy::default(),
            strategy: DispatchStrategy::default(),
            hook: None,
            record: false,
        }
    }

    /// Name used in logs, reports and errors.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add the initial state of the next region (at least one is required).
    pub fn initial<S: State<C> + Default>(mut self) -> Self {
        let (key, make) = factory::<C, S>();
        self.initial.push(key);
        self.factories.push((key, make));
        self
    }

    /// Add a transition using a builder.
    /// Returns an error if the builder fails validation.
    pub fn transition<E: ?Sized + 'static>(
        mut self,
        builder: TransitionBuilder<C, E>,
    ) -> Result<Self, BuildError> {
        let transition = builder.build()?;
        self.transitions.push(transition);
        Ok(self)
    }

    /// Add a pre-built transition.
    pub fn add_transition(mut self, transition: Transition<C>) -> Self {
        self.transitions.push(transition);
        self
    }

    /// Add multiple transitions at once.
    pub fn transitions(mut self, transitions: Vec<Transition<C>>) -> Self {
        self.transitions.extend(transitions);
        self
    }

    /// Add a machine-scope row, tried when no region settled an event.
    /// The builder must not name a source; its target is `internal` or `defer`.
    pub fn internal<E: ?Sized + 'static>(
        mut self,
        builder: TransitionBuilder<C, E>,
    ) -> Result<Self, BuildError> {
        let transition = builder.build_machine_scope()?;
        self.transitions.push(transition);
        Ok(self)
    }

    /// Configure flags, deferral, region or pseudo-state role of `S`.
    pub fn state<S: State<C> + Default>(mut self, config: StateConfig) -> Self {
        let (key, make) = factory::<C, S>();
        self.configs.push((key, config));
        self.factories.push((key, make));
        self
    }

    /// Make `S` a composite state running the machine `def`.
    pub fn composite<S: State<C> + Default>(mut self, def: Arc<MachineDef<C>>) -> Self {
        let (key, make) = factory::<C, S>();
        self.composites.push((key, def));
        self.factories.push((key, make));
        self
    }

    /// Declare `P` a pseudo entry state of `region`.
    pub fn entry_point<P: State<C> + Default>(mut self, region: usize) -> Self {
        let (key, make) = factory::<C, P>();
        self.entry_points.push((key, region));
        self.factories.push((key, make));
        self
    }

    /// Declare `P` a pseudo exit state. Reaching it hands `convert(event)` to
    /// the enclosing machine.
    pub fn exit_point<P, E, F>(mut self, convert: F) -> Self
    where
        P: State<C> + Default,
        E: Event,
        F: Fn(&dyn Event) -> E + Send + Sync + 'static,
    {
        let (key, make) = factory::<C, P>();
        let convert: ExitConverter =
            Arc::new(move |event: &dyn Event| Box::new(convert(event)) as Box<dyn Event>);
        self.exit_points.push((key, convert));
        self.factories.push((key, make));
        self
    }

    /// Create `S` with `make` instead of `S::default()`.
    pub fn factory<S, F>(mut self, make: F) -> Self
    where
        S: State<C>,
        F: Fn() -> S + Send + Sync + 'static,
    {
        let make: Factory<C> = Arc::new(move || Box::new(make()) as Box<dyn State<C>>);
        self.overrides.push((TypeKey::of::<S>(), make));
        self
    }

    /// Include `S` even if no row mentions it.
    pub fn explicit<S: State<C> + Default>(mut self) -> Self {
        let (key, make) = factory::<C, S>();
        self.explicit.push(key);
        self.factories.push((key, make));
        self
    }

    /// History policy used when this machine is re-entered as a submachine.
    pub fn history(mut self, policy: HistoryPolicy) -> Self {
        self.history = policy;
        self
    }

    pub fn dispatch(mut self, strategy: DispatchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Replace the hook called for events nobody handled or deferred.
    pub fn on_no_transition<F>(mut self, hook: F) -> Self
    where
        F: Fn(&dyn Event, &MachineDef<C>, usize, &mut C) + Send + Sync + 'static,
    {
        self.hook = Some(Arc::new(hook));
        self
    }

    /// Append every executed transition to the machine's transition log.
    pub fn record_transitions(mut self, record: bool) -> Self {
        self.record = record;
        self
    }

    /// Build the definition.
    ///
    /// Resolves ids and regions, then validates every configuration call and
    /// row against the result. All problems found in that second step are
    /// reported together.
    pub fn build(self) -> Result<Arc<MachineDef<C>>, BuildError> {
        let name = self.name.clone().unwrap_or_else(|| "Machine".to_string());
        if self.initial.is_empty() {
            return Err(BuildError::MissingInitialState { machine: name });
        }

        let edges: Vec<Edge> = self
            .transitions
            .iter()
            .filter_map(|row| row.source_key().map(|source| Edge::new(source, row.target.state())))
            .collect();
        let hints: Vec<(TypeKey, usize)> = self
            .entry_points
            .iter()
            .copied()
            .chain(
                self.configs
                    .iter()
                    .filter_map(|(key, config)| config.region.map(|region| (*key, region))),
            )
            .collect();
        let topology = resolve(&edges, &self.initial, &self.explicit, &hints)?;

        let mut factories: HashMap<TypeId, Factory<C>> = HashMap::new();
        for (key, make) in self
            .factories
            .iter()
            .chain(self.transitions.iter().flat_map(|row| row.states.iter()))
        {
            factories.entry(key.id()).or_insert_with(|| Arc::clone(make));
        }
        for (key, make) in &self.overrides {
            factories.insert(key.id(), Arc::clone(make));
        }

        let mut checks: Vec<Check> = Vec::new();
        checks.extend(duplicates(&name, self.configs.iter().map(|(key, _)| *key)));
        checks.extend(duplicates(&name, self.composites.iter().map(|(key, _)| *key)));
        let configured = self
            .configs
            .iter()
            .map(|(key, _)| *key)
            .chain(self.overrides.iter().map(|(key, _)| *key))
            .chain(self.composites.iter().map(|(key, _)| *key))
            .chain(self.exit_points.iter().map(|(key, _)| *key));
        for key in configured {
            checks.push(match topology.id_of(key) {
                Some(_) => Validation::success(()),
                None => Validation::fail(BuildError::UnknownState {
                    machine: name.clone(),
                    state: key.name(),
                }),
            });
        }

        let (keys, ids, regions, initial) = topology.into_parts();
        let composites: HashMap<TypeId, &Arc<MachineDef<C>>> = self
            .composites
            .iter()
            .map(|(key, def)| (key.id(), def))
            .collect();
        let lower = Lowering {
            ids: &ids,
            composites: &composites,
        };

        let mut rows = Vec::with_capacity(self.transitions.len());
        for transition in self.transitions {
            match lower.row(transition) {
                Ok(row) => rows.push(row),
                Err(error) => checks.push(Validation::fail(error)),
            }
        }

        let configs: HashMap<TypeId, &StateConfig> = self
            .configs
            .iter()
            .map(|(key, config)| (key.id(), config))
            .collect();
        let entry_points: Vec<TypeId> = self.entry_points.iter().map(|(key, _)| key.id()).collect();
        let exit_points: HashMap<TypeId, &ExitConverter> = self
            .exit_points
            .iter()
            .map(|(key, convert)| (key.id(), convert))
            .collect();
        let completion = Trigger::Exact(EventKind::of::<Completion>());

        let mut states = Vec::with_capacity(keys.len());
        for (id, key) in keys.iter().enumerate() {
            let Some(make) = factories.get(&key.id()) else {
                checks.push(Validation::fail(BuildError::UnknownState {
                    machine: name.clone(),
                    state: key.name(),
                }));
                continue;
            };
            let config = configs.get(&key.id()).copied();
            let submachine = composites.get(&key.id()).map(|def| Arc::clone(def));
            let exit_converter = exit_points.get(&key.id()).map(|convert| Arc::clone(convert));
            let kind = if submachine.is_some() {
                StateKind::Composite
            } else if entry_points.contains(&key.id()) {
                StateKind::EntryPoint
            } else if exit_converter.is_some() {
                StateKind::ExitPoint
            } else if config.is_some_and(|config| config.terminate) {
                StateKind::Terminate
            } else if config.is_some_and(|config| config.interrupt) {
                StateKind::Interrupt
            } else {
                StateKind::Simple
            };

            states.push(StateDef {
                key: *key,
                kind,
                region: regions[id],
                flags: config.map(|config| config.flags.clone()).unwrap_or_default(),
                deferred: config.map(|config| config.deferred.clone()).unwrap_or_default(),
                defer_when: config.and_then(|config| config.defer_when.clone()),
                interrupt_ends: config
                    .map(|config| config.interrupt_ends.clone())
                    .unwrap_or_default(),
                factory: Arc::clone(make),
                submachine,
                exit_converter,
                has_completion: rows
                    .iter()
                    .any(|row| row.source == RowSource::State(id) && row.trigger == completion),
            });
        }

        collect(checks)?;

        debug!(
            machine = %name,
            states = states.len(),
            regions = initial.len(),
            rows = rows.len(),
            strategy = ?self.strategy,
            "built machine definition"
        );

        let count = states.len();
        Ok(Arc::new(MachineDef {
            name,
            states,
            ids,
            initial,
            rows,
            table: self.strategy.table(count + 1),
            history: self.history,
            hook: self.hook.unwrap_or_else(default_hook),
            record_transitions: self.record,
        }))
    }
}

impl<C: 'static> Default for MachineBuilder<C> {
    fn default() -> Self {
        Self::new()
    }
}

fn duplicates(machine: &str, keys: impl Iterator<Item = TypeKey>) -> Vec<Check> {
    let mut seen: Vec<TypeKey> = Vec::new();
    let mut checks = Vec::new();
    for key in keys {
        if seen.contains(&key) {
            checks.push(Validation::fail(BuildError::DuplicateState {
                machine: machine.to_string(),
                state: key.name(),
            }));
        } else {
            seen.push(key);
        }
    }
    checks
}

/// Replaces state types of a row with ids of the definition being built.
struct Lowering<'a, C> {
    ids: &'a HashMap<TypeId, usize>,
    composites: &'a HashMap<TypeId, &'a Arc<MachineDef<C>>>,
}

impl<C: 'static> Lowering<'_, C> {
    fn row(&self, transition: Transition<C>) -> Result<Row<C>, BuildError> {
        let source = match transition.source {
            SourceSpec::State(key) => RowSource::State(self.id(key)?),
            SourceSpec::Machine => RowSource::Machine,
            SourceSpec::Exit { composite, point } => {
                let sub = self.submachine(composite)?;
                let is_exit = sub
                    .state_by_type(point.id())
                    .is_some_and(|state| state.kind() == StateKind::ExitPoint);
                if !is_exit {
                    return Err(BuildError::UnknownExitPoint {
                        machine: sub.name().to_string(),
                        point: point.name(),
                    });
                }
                RowSource::Exit {
                    composite: self.id(composite)?,
                    point: point.id(),
                }
            }
        };

        let target = match transition.target {
            TargetSpec::Internal => RowTarget::Internal,
            TargetSpec::Defer => RowTarget::Defer,
            TargetSpec::State(key) => RowTarget::State(self.id(key)?),
            TargetSpec::Direct { state, points } => {
                let sub = self.submachine(state)?;
                let mut taken: Vec<(usize, TypeKey)> = Vec::new();
                for &point in &points {
                    let region = sub
                        .state_by_type(point.id())
                        .map(|state| state.region())
                        .ok_or_else(|| BuildError::UnknownState {
                            machine: sub.name().to_string(),
                            state: point.name(),
                        })?;
                    if let Some((_, first)) = taken.iter().find(|(used, _)| *used == region) {
                        return Err(BuildError::ConflictingExplicitEntries {
                            first: first.name(),
                            second: point.name(),
                        });
                    }
                    taken.push((region, point));
                }
                RowTarget::Direct {
                    state: self.id(state)?,
                    points: points.iter().map(|point| point.id()).collect(),
                }
            }
            TargetSpec::Entry { state, point } => {
                let sub = self.submachine(state)?;
                let is_entry = sub
                    .state_by_type(point.id())
                    .is_some_and(|state| state.kind() == StateKind::EntryPoint);
                if !is_entry {
                    return Err(BuildError::UnknownEntryPoint {
                        machine: sub.name().to_string(),
                        point: point.name(),
                    });
                }
                RowTarget::Entry {
                    state: self.id(state)?,
                    point: point.id(),
                }
            }
        };

        Ok(Row {
            source,
            trigger: transition.trigger,
            target,
            guard: transition.guard,
            action: transition.action,
            otherwise: transition.otherwise,
        })
    }

    fn id(&self, key: TypeKey) -> Result<usize, BuildError> {
        self.ids.get(&key.id()).copied().ok_or(BuildError::UnassignedState {
            state: key.name(),
        })
    }

    fn submachine(&self, key: TypeKey) -> Result<&Arc<MachineDef<C>>, BuildError> {
        self.composites
            .get(&key.id())
            .copied()
            .ok_or(BuildError::NotComposite { state: key.name() })
    }
}
