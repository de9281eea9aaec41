//! Transition resolution and dispatch tables.
//!
//! Rows are matched against events once per (scope, event type) pair; the
//! resulting [`Chain`] is cached in the definition's [`DispatchTable`].

mod chain;
pub(crate) mod row;
mod table;

pub(crate) use chain::{build_chain, Probe};
pub use chain::{Chain, EventKey, Scope};
pub use table::{DispatchStrategy, DispatchTable, DynamicTable, StaticTable};
