//! hsm: hierarchical state machines with orthogonal regions
//!
//! States and events are Rust types. A machine is described once with
//! [`MachineBuilder`](builder::MachineBuilder) as a table of transition rows,
//! resolved into an immutable [`MachineDef`](machine::MachineDef) and run by
//! any number of [`StateMachine`](machine::StateMachine) instances.
//!
//! # Core Concepts
//!
//! - **Regions**: a machine has one active state per region; regions react to
//!   every event independently
//! - **Composite states**: a state may own a nested machine, which sees each
//!   event before the rows of its parent
//! - **Chains**: rows sharing a source and an event are tried in order until
//!   one guard passes
//! - **Deferral**: events a state defers are queued and replayed after the
//!   configuration changes
//! - **Dispatch strategies**: static and dynamic lookup of chains behave
//!   identically and differ only in how chains are cached
//!
//! # Example
//!
//! ```rust
//! use hsm::prelude::*;
//! use hsm::{events, states};
//!
//! states!(Stopped, Playing, Paused);
//! events!(Play, Pause, Stop);
//!
//! struct CanResume;
//! type Log = Vec<&'static str>;
//!
//! let def = MachineBuilder::<Log>::new()
//!     .name("player")
//!     .initial::<Stopped>()
//!     .transition(TransitionBuilder::new().from::<Stopped>().on::<Play>().to::<Playing>())
//!     .unwrap()
//!     .transition(
//!         TransitionBuilder::<Log>::new()
//!             .from::<Playing>()
//!             .on::<Pause>()
//!             .action(|args| args.context.push("paused"))
//!             .to::<Paused>(),
//!     )
//!     .unwrap()
//!     .transition(TransitionBuilder::new().from::<Paused>().on::<Play>().to::<Playing>())
//!     .unwrap()
//!     .state::<Paused>(StateConfig::new().flag::<CanResume>().defer::<Stop>())
//!     .build()
//!     .unwrap();
//!
//! let mut player = StateMachine::new(def, Vec::new());
//! player.start().unwrap();
//! player.process_event(Play).unwrap();
//! player.process_event(Pause).unwrap();
//! assert!(player.is_flag_active::<CanResume>());
//!
//! assert_eq!(player.process_event(Stop), Ok(HandledResult::DEFERRED));
//! assert_eq!(player.pending_events().count(), 1);
//! assert_eq!(player.context(), &vec!["paused"]);
//! ```

pub mod builder;
pub mod core;
pub mod dispatch;
pub mod machine;
pub mod topology;

/// Types needed to declare and run a machine.
pub mod prelude {
    pub use crate::builder::{BuildError, MachineBuilder, StateConfig, Transition, TransitionBuilder};
    pub use crate::core::{
        Action, ActionArgs, Completion, Event, EventKind, Guard, GuardArgs, HandledResult, State,
        StateId, StateKind,
    };
    pub use crate::dispatch::DispatchStrategy;
    pub use crate::machine::{
        HistoryPolicy, Machine, MachineDef, MachineError, StateMachine, VisitMode,
    };
}

// Re-export commonly used types
pub use builder::{BuildError, MachineBuilder, StateConfig, TransitionBuilder};
pub use core::{Event, HandledResult, State};
pub use machine::{MachineDef, MachineError, StateMachine};
