//! Dispatch tables.
//!
//! A table maps (scope, event key) to a [`Chain`]. Tables are shared by every
//! machine instance built from one definition, filled lazily on first use and
//! never invalidated. Both implementations return the same chains; they only
//! differ in how the cache is laid out.

use super::chain::{Chain, EventKey};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::trace;

/// Selects the [`DispatchTable`] implementation of a machine definition.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DispatchStrategy {
    /// One dense array of chains per event type, indexed by state id.
    #[default]
    Static,
    /// One hash map per state, keyed by the runtime event type.
    Dynamic,
}

impl DispatchStrategy {
    pub(crate) fn table(self, scopes: usize) -> Box<dyn DispatchTable> {
        match self {
            DispatchStrategy::Static => Box::new(StaticTable::new(scopes)),
            DispatchStrategy::Dynamic => Box::new(DynamicTable::new(scopes)),
        }
    }
}

/// Chain cache of one machine definition.
///
/// `resolve` builds the chain of one scope index when it is not cached yet.
/// Implementations must be safe to fill from several threads at once.
pub trait DispatchTable: Send + Sync + fmt::Debug {
    fn strategy(&self) -> DispatchStrategy;

    fn chain(&self, scope: usize, key: EventKey, resolve: &dyn Fn(usize) -> Chain) -> Chain;

    /// Number of cached chains, for diagnostics.
    fn cached(&self) -> usize;
}

/// Dense per-event arrays, built for every scope at once on first use of an
/// event type.
#[derive(Debug)]
pub struct StaticTable {
    scopes: usize,
    events: RwLock<HashMap<EventKey, Arc<[Chain]>>>,
}

impl StaticTable {
    pub fn new(scopes: usize) -> Self {
        Self {
            scopes,
            events: RwLock::new(HashMap::new()),
        }
    }

    fn row_for(&self, key: EventKey, resolve: &dyn Fn(usize) -> Chain) -> Arc<[Chain]> {
        if let Some(row) = self
            .events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Arc::clone(row);
        }

        let mut events = self.events.write().unwrap_or_else(PoisonError::into_inner);
        // another thread may have filled it between the two locks
        if let Some(row) = events.get(&key) {
            return Arc::clone(row);
        }
        let row: Arc<[Chain]> = (0..self.scopes).map(resolve).collect();
        trace!(?key, scopes = self.scopes, "filled static dispatch row");
        events.insert(key, Arc::clone(&row));
        row
    }
}

impl DispatchTable for StaticTable {
    fn strategy(&self) -> DispatchStrategy {
        DispatchStrategy::Static
    }

    fn chain(&self, scope: usize, key: EventKey, resolve: &dyn Fn(usize) -> Chain) -> Chain {
        self.row_for(key, resolve)
            .get(scope)
            .cloned()
            .unwrap_or_default()
    }

    fn cached(&self) -> usize {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
            * self.scopes
    }
}

/// One lazily filled map per scope.
#[derive(Debug)]
pub struct DynamicTable {
    cells: Vec<RwLock<HashMap<EventKey, Chain>>>,
}

impl DynamicTable {
    pub fn new(scopes: usize) -> Self {
        Self {
            cells: (0..scopes).map(|_| RwLock::new(HashMap::new())).collect(),
        }
    }
}

impl DispatchTable for DynamicTable {
    fn strategy(&self) -> DispatchStrategy {
        DispatchStrategy::Dynamic
    }

    fn chain(&self, scope: usize, key: EventKey, resolve: &dyn Fn(usize) -> Chain) -> Chain {
        let Some(cell) = self.cells.get(scope) else {
            return Chain::default();
        };
        if let Some(chain) = cell
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return chain.clone();
        }
        cell.write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_insert_with(|| resolve(scope))
            .clone()
    }

    fn cached(&self) -> usize {
        self.cells
            .iter()
            .map(|cell| cell.read().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }
}
