//! Machine definitions and the runtime engine.
//!
//! - [`MachineDef`]: resolved, shareable definition of one machine level
//! - [`Machine`]: active configuration of one level, owning nested levels
//! - [`StateMachine`]: root of a hierarchy, owning the context and queues

mod deferred;
mod definition;
mod engine;
mod error;
mod state_machine;
mod visit;

pub use deferred::DeferredQueue;
pub(crate) use definition::{default_hook, DeferPredicate, ExitConverter, Factory};
pub use definition::{
    HistoryPolicy, MachineDef, NoTransitionHook, StateDef, StateInfo, TopologyReport,
};
pub use engine::Machine;
pub use error::MachineError;
pub use state_machine::StateMachine;
pub use visit::{Depth, Selection, VisitMode, Visited};
