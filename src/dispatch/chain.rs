//! Transition chains.
//!
//! For one (scope, event) pair the chain is the priority-ordered list of rows
//! to try: the surviving forwarding row first, then exact and wildcard rows
//! in table order, then `otherwise` rows in table order.

use super::row::{Row, RowSource, Trigger};
use crate::core::{Completion, EventKind, StateId};
use std::any::TypeId;
use std::sync::Arc;
use tracing::{trace, warn};

/// Owner of a chain: one state, or the machine itself for machine-scope
/// internal rows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Scope {
    State(StateId),
    Machine,
}

impl Scope {
    /// Dense index used by the dispatch tables. The machine scope comes after
    /// every state id.
    pub(crate) fn index(self, state_count: usize) -> usize {
        match self {
            Scope::State(id) => id,
            Scope::Machine => state_count,
        }
    }

    pub(crate) fn from_index(index: usize, state_count: usize) -> Self {
        if index == state_count {
            Scope::Machine
        } else {
            Scope::State(index)
        }
    }
}

/// Cache key of a chain.
///
/// `exit` is set when the event leaves a submachine through an exit point;
/// only rows declared with `from_exit` react to such keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EventKey {
    pub(crate) event: TypeId,
    pub(crate) exit: Option<TypeId>,
}

impl EventKey {
    pub(crate) fn new(event: TypeId) -> Self {
        Self { event, exit: None }
    }

    pub(crate) fn exiting(event: TypeId, point: TypeId) -> Self {
        Self {
            event,
            exit: Some(point),
        }
    }
}

/// Everything needed to build a chain for one concrete event type.
pub(crate) struct Probe<'a> {
    pub(crate) kind: EventKind,
    pub(crate) bases: &'a [EventKind],
    pub(crate) exit: Option<TypeId>,
}

/// Ordered row indices of one (scope, event) pair.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Chain {
    rows: Arc<[usize]>,
}

impl Chain {
    pub(crate) fn rows(&self) -> &[usize] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn source_matches<C>(row: &Row<C>, scope: Scope, exit: Option<TypeId>) -> bool {
    match (row.source, scope, exit) {
        (RowSource::State(id), Scope::State(state), None) => id == state,
        (RowSource::Exit { composite, point }, Scope::State(state), Some(exit)) => {
            composite == state && point == exit
        }
        (RowSource::Machine, Scope::Machine, None) => true,
        _ => false,
    }
}

fn trigger_matches(trigger: Trigger, probe: &Probe<'_>) -> bool {
    match trigger {
        Trigger::Exact(kind) => kind == probe.kind,
        Trigger::Base(kind) => kind == probe.kind || probe.bases.contains(&kind),
        Trigger::Any => probe.kind != EventKind::of::<Completion>(),
    }
}

/// Builds the chain of `scope` for the event described by `probe`.
///
/// When several forwarding rows match, only the last declared one is kept.
pub(crate) fn build_chain<C>(rows: &[Row<C>], scope: Scope, probe: &Probe<'_>) -> Chain {
    let matching: Vec<usize> = rows
        .iter()
        .enumerate()
        .filter(|(_, row)| source_matches(row, scope, probe.exit))
        .filter(|(_, row)| trigger_matches(row.trigger, probe))
        .map(|(index, _)| index)
        .collect();

    let forwarding: Vec<usize> = matching
        .iter()
        .copied()
        .filter(|&index| matches!(rows[index].trigger, Trigger::Base(_)))
        .collect();
    if forwarding.len() > 1 {
        warn!(
            ?scope,
            event = probe.kind.name(),
            rows = forwarding.len(),
            "several forwarding rows match; keeping the last one"
        );
    }
    let kept_forward = forwarding.last().copied();

    let mut ordered = Vec::with_capacity(matching.len());
    ordered.extend(kept_forward.filter(|&index| !rows[index].otherwise));
    ordered.extend(matching.iter().copied().filter(|&index| {
        !rows[index].otherwise && !matches!(rows[index].trigger, Trigger::Base(_))
    }));
    ordered.extend(matching.iter().copied().filter(|&index| {
        rows[index].otherwise
            && (!matches!(rows[index].trigger, Trigger::Base(_)) || Some(index) == kept_forward)
    }));

    trace!(?scope, event = probe.kind.name(), rows = ?ordered, "built transition chain");
    Chain {
        rows: ordered.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Event, Guard};
    use crate::dispatch::row::RowTarget;

    #[derive(Debug)]
    struct Key;
    impl Event for Key {}

    #[derive(Debug)]
    struct KeyA;
    impl Event for KeyA {
        fn bases(&self) -> Vec<EventKind> {
            vec![EventKind::of::<Key>()]
        }
    }

    #[derive(Debug)]
    struct Other;
    impl Event for Other {}

    fn row(source: RowSource, trigger: Trigger, target: StateId) -> Row<()> {
        Row {
            source,
            trigger,
            target: RowTarget::State(target),
            guard: None,
            action: None,
            otherwise: false,
        }
    }

    fn probe<E: Event>(bases: &[EventKind]) -> Probe<'_> {
        Probe {
            kind: EventKind::of::<E>(),
            bases,
            exit: None,
        }
    }

    #[test]
    fn table_order_is_kept_for_exact_rows() {
        let rows = vec![
            row(RowSource::State(0), Trigger::Exact(EventKind::of::<Other>()), 1),
            row(RowSource::State(0), Trigger::Exact(EventKind::of::<Other>()), 2),
            row(RowSource::State(1), Trigger::Exact(EventKind::of::<Other>()), 0),
        ];

        let chain = build_chain(&rows, Scope::State(0), &probe::<Other>(&[]));
        assert_eq!(chain.rows(), &[0, 1]);

        let chain = build_chain(&rows, Scope::State(2), &probe::<Other>(&[]));
        assert!(chain.is_empty());
    }

    #[test]
    fn otherwise_rows_go_last() {
        let mut first = row(RowSource::State(0), Trigger::Exact(EventKind::of::<Other>()), 1);
        first.otherwise = true;
        first.guard = Some(Guard::always());
        let rows = vec![
            first,
            row(RowSource::State(0), Trigger::Any, 2),
            row(RowSource::State(0), Trigger::Exact(EventKind::of::<Other>()), 3),
        ];

        let chain = build_chain(&rows, Scope::State(0), &probe::<Other>(&[]));
        assert_eq!(chain.rows(), &[1, 2, 0]);
    }

    #[test]
    fn last_forwarding_row_wins_and_goes_first() {
        let bases = [EventKind::of::<Key>()];
        let rows = vec![
            row(RowSource::State(0), Trigger::Exact(EventKind::of::<KeyA>()), 1),
            row(RowSource::State(0), Trigger::Base(EventKind::of::<Key>()), 2),
            row(RowSource::State(0), Trigger::Base(EventKind::of::<Key>()), 3),
        ];

        let chain = build_chain(&rows, Scope::State(0), &probe::<KeyA>(&bases));
        assert_eq!(chain.rows(), &[2, 0]);

        // the base event itself also matches forwarding rows
        let chain = build_chain(&rows, Scope::State(0), &probe::<Key>(&[]));
        assert_eq!(chain.rows(), &[2]);
    }

    #[test]
    fn wildcard_ignores_completion() {
        let rows = vec![row(RowSource::State(0), Trigger::Any, 1)];
        let chain = build_chain(&rows, Scope::State(0), &probe::<Completion>(&[]));
        assert!(chain.is_empty());
        let chain = build_chain(&rows, Scope::State(0), &probe::<Other>(&[]));
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn exit_rows_only_match_exit_keys() {
        struct Point;
        let point = TypeId::of::<Point>();
        let rows = vec![
            row(RowSource::State(0), Trigger::Exact(EventKind::of::<Other>()), 1),
            row(
                RowSource::Exit { composite: 0, point },
                Trigger::Exact(EventKind::of::<Other>()),
                2,
            ),
        ];

        let plain = build_chain(&rows, Scope::State(0), &probe::<Other>(&[]));
        assert_eq!(plain.rows(), &[0]);

        let exiting = Probe {
            kind: EventKind::of::<Other>(),
            bases: &[],
            exit: Some(point),
        };
        let chain = build_chain(&rows, Scope::State(0), &exiting);
        assert_eq!(chain.rows(), &[1]);
    }

    #[test]
    fn machine_scope_has_its_own_rows() {
        let mut internal = row(RowSource::Machine, Trigger::Exact(EventKind::of::<Other>()), 0);
        internal.target = RowTarget::Internal;
        let rows = vec![internal];

        assert_eq!(Scope::Machine.index(4), 4);
        assert_eq!(Scope::from_index(4, 4), Scope::Machine);
        assert_eq!(Scope::from_index(2, 4), Scope::State(2));

        let chain = build_chain(&rows, Scope::Machine, &probe::<Other>(&[]));
        assert_eq!(chain.rows(), &[0]);
        let chain = build_chain(&rows, Scope::State(0), &probe::<Other>(&[]));
        assert!(chain.is_empty());
    }
}
