//! State identity and region resolution.
//!
//! Runs once per machine definition. Every state type mentioned by the
//! transition table, the initial states or the explicit-creation list gets a
//! small integer id, and every state is placed in exactly one orthogonal
//! region.
//!
//! Ids are assigned in insertion order: sources in table order, then targets
//! in table order, then initial states, then explicitly created states, then
//! states only known from a region hint. Duplicates keep their first id.

use crate::builder::error::{collect, BuildError};
use crate::core::{StateId, TypeKey};
use std::any::TypeId;
use std::collections::HashMap;
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;
use tracing::trace;

/// A state-to-state connection contributed by one transition row.
///
/// `target` is `None` for internal and deferring rows.
#[derive(Clone, Copy, Debug)]
pub struct Edge {
    pub source: TypeKey,
    pub target: Option<TypeKey>,
}

impl Edge {
    pub fn new(source: TypeKey, target: Option<TypeKey>) -> Self {
        Self { source, target }
    }
}

/// Result of [`resolve`].
#[derive(Clone, Debug)]
pub struct Topology {
    states: Vec<TypeKey>,
    ids: HashMap<TypeId, StateId>,
    regions: Vec<usize>,
    initial: Vec<StateId>,
}

impl Topology {
    /// States in id order.
    pub fn states(&self) -> &[TypeKey] {
        &self.states
    }

    pub fn id_of(&self, key: TypeKey) -> Option<StateId> {
        self.ids.get(&key.id()).copied()
    }

    pub fn region_of(&self, id: StateId) -> usize {
        self.regions[id]
    }

    /// Initial state id of every region, in region order.
    pub fn initial(&self) -> &[StateId] {
        &self.initial
    }

    pub fn region_count(&self) -> usize {
        self.initial.len()
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        Vec<TypeKey>,
        HashMap<TypeId, StateId>,
        Vec<usize>,
        Vec<StateId>,
    ) {
        (self.states, self.ids, self.regions, self.initial)
    }
}

#[derive(Default)]
struct Ids {
    states: Vec<TypeKey>,
    ids: HashMap<TypeId, StateId>,
}

impl Ids {
    fn insert(&mut self, key: TypeKey) -> StateId {
        if let Some(&id) = self.ids.get(&key.id()) {
            return id;
        }
        let id = self.states.len();
        self.states.push(key);
        self.ids.insert(key.id(), id);
        id
    }

    fn get(&self, key: TypeKey) -> StateId {
        self.ids[&key.id()]
    }
}

/// Assigns ids and regions.
///
/// * `initial` holds one state per region, in region order.
/// * `explicit` lists states that must exist even if no row mentions them.
/// * `hints` pin a state (and everything reachable from it) to a region; used
///   for entry points and states configured with an explicit region.
///
/// States reachable from no initial state and no hint join the region of a
/// neighbour in the undirected transition graph. A state reachable from two
/// regions is an error, which also covers rows linking two regions.
///
/// # Example
///
/// ```rust
/// use hsm::core::TypeKey;
/// use hsm::topology::{resolve, Edge};
///
/// struct Idle;
/// struct Busy;
/// struct Left;
/// struct Right;
///
/// let edges = [
///     Edge::new(TypeKey::of::<Idle>(), Some(TypeKey::of::<Busy>())),
///     Edge::new(TypeKey::of::<Left>(), Some(TypeKey::of::<Right>())),
/// ];
/// let initial = [TypeKey::of::<Idle>(), TypeKey::of::<Left>()];
///
/// let topology = resolve(&edges, &initial, &[], &[]).unwrap();
/// // sources first, then targets
/// assert_eq!(topology.id_of(TypeKey::of::<Left>()), Some(1));
/// assert_eq!(topology.id_of(TypeKey::of::<Busy>()), Some(2));
/// assert_eq!(topology.region_of(3), 1);
/// ```
pub fn resolve(
    edges: &[Edge],
    initial: &[TypeKey],
    explicit: &[TypeKey],
    hints: &[(TypeKey, usize)],
) -> Result<Topology, BuildError> {
    let mut ids = Ids::default();
    for edge in edges {
        ids.insert(edge.source);
    }
    for edge in edges {
        if let Some(target) = edge.target {
            ids.insert(target);
        }
    }
    for &key in initial {
        ids.insert(key);
    }
    for &key in explicit {
        ids.insert(key);
    }
    for &(key, _) in hints {
        ids.insert(key);
    }

    let count = ids.states.len();
    let mut adjacency: Vec<Vec<StateId>> = vec![Vec::new(); count];
    let mut links: Vec<(StateId, StateId)> = Vec::new();
    for edge in edges {
        if let Some(target) = edge.target {
            let (from, to) = (ids.get(edge.source), ids.get(target));
            adjacency[from].push(to);
            links.push((from, to));
        }
    }

    let mut assignment = Assignment::new(ids.states.iter().map(|key| key.name()).collect());
    for (region, &key) in initial.iter().enumerate() {
        assignment.flood(ids.get(key), region, &adjacency);
    }
    for &(key, region) in hints {
        if region >= initial.len() {
            assignment.errors.push(BuildError::RegionOutOfRange {
                state: key.name(),
                region,
                regions: initial.len(),
            });
            continue;
        }
        assignment.flood(ids.get(key), region, &adjacency);
    }
    assignment.merge_neighbours(&links);

    let mut checks: Vec<Validation<(), NonEmptyVec<BuildError>>> = assignment
        .errors
        .drain(..)
        .map(|error| Validation::fail(error))
        .collect();
    for (id, region) in assignment.regions.iter().enumerate() {
        checks.push(match region {
            Some(_) => Validation::success(()),
            None => Validation::fail(BuildError::UnassignedState {
                state: ids.states[id].name(),
            }),
        });
    }

    collect(checks)?;

    let regions: Vec<usize> = assignment.regions.into_iter().flatten().collect();
    let initial: Vec<StateId> = initial.iter().map(|&key| ids.get(key)).collect();
    trace!(states = count, regions = initial.len(), "resolved topology");

    Ok(Topology {
        states: ids.states,
        ids: ids.ids,
        regions,
        initial,
    })
}

struct Assignment {
    regions: Vec<Option<usize>>,
    errors: Vec<BuildError>,
    names: Vec<&'static str>,
}

impl Assignment {
    fn new(names: Vec<&'static str>) -> Self {
        Self {
            regions: vec![None; names.len()],
            errors: Vec::new(),
            names,
        }
    }

    /// Depth-first marking of everything reachable from `start`.
    fn flood(&mut self, start: StateId, region: usize, adjacency: &[Vec<StateId>]) {
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            match self.regions[id] {
                Some(existing) if existing == region => continue,
                Some(existing) => {
                    self.errors.push(BuildError::AmbiguousRegion {
                        state: self.name(id),
                        first: existing,
                        second: region,
                    });
                    continue;
                }
                None => self.regions[id] = Some(region),
            }
            stack.extend(adjacency[id].iter().rev().copied());
        }
    }

    /// Gives unassigned states the region of an assigned neighbour until
    /// nothing changes.
    fn merge_neighbours(&mut self, links: &[(StateId, StateId)]) {
        let mut changed = true;
        while changed {
            changed = false;
            for &(from, to) in links {
                match (self.regions[from], self.regions[to]) {
                    (Some(region), None) => {
                        self.regions[to] = Some(region);
                        changed = true;
                    }
                    (None, Some(region)) => {
                        self.regions[from] = Some(region);
                        changed = true;
                    }
                    _ => {}
                }
            }
        }
    }

    fn name(&self, id: StateId) -> &'static str {
        self.names[id]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct A;
    struct B;
    struct C;
    struct D;
    struct E;
    struct Orphan;

    fn key<T: 'static>() -> TypeKey {
        TypeKey::of::<T>()
    }

    fn edge<S: 'static, T: 'static>() -> Edge {
        Edge::new(key::<S>(), Some(key::<T>()))
    }

    #[test]
    fn ids_follow_sources_targets_initial_explicit() {
        let edges = [edge::<B, C>(), edge::<A, B>(), Edge::new(key::<D>(), None)];
        let topology = resolve(&edges, &[key::<E>(), key::<A>()], &[key::<Orphan>()], &[]);

        // D is linked to nothing, E and Orphan only by declaration
        let errors = match topology {
            Err(BuildError::Invalid(errors)) => errors,
            other => panic!("expected accumulated errors, got {other:?}"),
        };
        assert!(errors.contains(&BuildError::UnassignedState { state: "D" }));
        assert!(errors.contains(&BuildError::UnassignedState { state: "Orphan" }));

        let topology = resolve(
            &[edge::<B, C>(), edge::<A, B>(), edge::<C, D>()],
            &[key::<A>()],
            &[],
            &[],
        )
        .unwrap();
        let names: Vec<_> = topology.states().iter().map(|k| k.name()).collect();
        assert_eq!(names, vec!["B", "A", "C", "D"]);
    }

    #[test]
    fn resolution_is_deterministic() {
        let edges = [edge::<A, B>(), edge::<B, C>(), edge::<C, A>()];
        let first = resolve(&edges, &[key::<A>()], &[], &[]).unwrap();
        let second = resolve(&edges, &[key::<A>()], &[], &[]).unwrap();
        assert_eq!(first.states(), second.states());
        assert_eq!(first.initial(), second.initial());
    }

    #[test]
    fn regions_are_flooded_from_initial_states() {
        let edges = [edge::<A, B>(), edge::<C, D>()];
        let topology = resolve(&edges, &[key::<A>(), key::<C>()], &[], &[]).unwrap();

        assert_eq!(topology.region_count(), 2);
        for (state, region) in [(key::<A>(), 0), (key::<B>(), 0), (key::<C>(), 1), (key::<D>(), 1)] {
            let id = topology.id_of(state).unwrap();
            assert_eq!(topology.region_of(id), region);
        }
        assert_eq!(topology.initial(), &[0, 1]);
    }

    #[test]
    fn overlapping_regions_are_rejected() {
        let edges = [edge::<A, B>(), edge::<C, B>()];
        let result = resolve(&edges, &[key::<A>(), key::<C>()], &[], &[]);

        assert!(matches!(
            result,
            Err(BuildError::AmbiguousRegion { state: "B", first: 0, second: 1 })
        ));
    }

    #[test]
    fn unreachable_states_join_a_neighbour() {
        // E is only a source into B; it can only be entered explicitly
        let edges = [edge::<A, B>(), edge::<E, B>()];
        let topology = resolve(&edges, &[key::<A>()], &[], &[]).unwrap();
        let id = topology.id_of(key::<E>()).unwrap();
        assert_eq!(topology.region_of(id), 0);
    }

    #[test]
    fn hints_place_entry_states() {
        let edges = [edge::<A, B>(), edge::<C, D>(), edge::<E, D>()];
        let topology = resolve(
            &edges,
            &[key::<A>(), key::<C>()],
            &[],
            &[(key::<E>(), 1)],
        )
        .unwrap();
        let id = topology.id_of(key::<E>()).unwrap();
        assert_eq!(topology.region_of(id), 1);
    }

    #[test]
    fn hint_out_of_range_is_reported() {
        let result = resolve(&[edge::<A, B>()], &[key::<A>()], &[], &[(key::<B>(), 3)]);
        assert!(matches!(
            result,
            Err(BuildError::RegionOutOfRange { region: 3, regions: 1, .. })
        ));
    }
}
