//! Fixtures shared by the integration tests.
#![allow(dead_code)]

use hsm::prelude::*;
use std::sync::Arc;

/// Context recording entry and exit callbacks in order.
pub type Trace = Vec<String>;

/// Declares states that log `Name.on_entry` / `Name.on_exit` into a [`Trace`].
macro_rules! traced_states {
    ($($name:ident),* $(,)?) => {
        $(
            #[derive(Default, Debug)]
            pub struct $name;

            impl hsm::core::State<$crate::common::Trace> for $name {
                fn on_entry(&mut self, _event: &dyn hsm::core::Event, trace: &mut $crate::common::Trace) {
                    trace.push(format!("{}.on_entry", stringify!($name)));
                }

                fn on_exit(&mut self, _event: &dyn hsm::core::Event, trace: &mut $crate::common::Trace) {
                    trace.push(format!("{}.on_exit", stringify!($name)));
                }
            }
        )*
    };
}

traced_states!(Empty, Open, Stopped, Playing, Paused, Song1, Song2, Song3, LightOff, LightOn);
hsm::events!(
    pub OpenClose,
    pub CdDetected,
    pub Play,
    pub Pause,
    pub Stop,
    pub NextSong,
    pub PrevSong,
    pub Toggle,
    pub Ping,
);

/// Flag carried by every state with a disc in the drive.
pub struct CdLoaded;

/// Flag of states where playback can resume.
pub struct Resumable;

fn row<S, E, T>() -> TransitionBuilder<Trace, E>
where
    S: State<Trace> + Default,
    E: Event,
    T: State<Trace> + Default,
{
    TransitionBuilder::new().from::<S>().on::<E>().to::<T>()
}

/// Song list of the player; a second region toggles a light.
pub fn songs(strategy: DispatchStrategy) -> Arc<MachineDef<Trace>> {
    MachineBuilder::new()
        .name("songs")
        .dispatch(strategy)
        .initial::<Song1>()
        .initial::<LightOff>()
        .transitions(vec![
            row::<Song1, NextSong, Song2>().build().unwrap(),
            row::<Song2, NextSong, Song3>().build().unwrap(),
            row::<Song3, PrevSong, Song2>().build().unwrap(),
            row::<Song2, PrevSong, Song1>().build().unwrap(),
            row::<LightOff, Toggle, LightOn>().build().unwrap(),
            row::<LightOn, Toggle, LightOff>().build().unwrap(),
        ])
        .state::<Song1>(StateConfig::new().flag::<CdLoaded>())
        .state::<Song2>(StateConfig::new().flag::<CdLoaded>())
        .state::<Song3>(StateConfig::new().flag::<CdLoaded>())
        .history(HistoryPolicy::Shallow(vec![EventKind::of::<Pause>()]))
        .build()
        .unwrap()
}

/// CD player with a composite `Playing` state.
///
/// `Empty` defers `Play` until a disc is detected. `Paused` resumes with
/// `Pause` (restoring the song) and restarts with `Play`.
pub fn player(strategy: DispatchStrategy) -> Arc<MachineDef<Trace>> {
    MachineBuilder::new()
        .name("player")
        .dispatch(strategy)
        .record_transitions(true)
        .initial::<Empty>()
        .transitions(vec![
            row::<Empty, OpenClose, Open>().build().unwrap(),
            row::<Empty, CdDetected, Stopped>().build().unwrap(),
            row::<Open, OpenClose, Empty>().build().unwrap(),
            row::<Stopped, Play, Playing>().build().unwrap(),
            row::<Stopped, OpenClose, Open>().build().unwrap(),
            row::<Playing, Stop, Stopped>().build().unwrap(),
            row::<Playing, Pause, Paused>().build().unwrap(),
            row::<Playing, OpenClose, Open>().build().unwrap(),
            row::<Paused, Pause, Playing>().build().unwrap(),
            row::<Paused, Play, Playing>().build().unwrap(),
            row::<Paused, Stop, Stopped>().build().unwrap(),
        ])
        .composite::<Playing>(songs(strategy))
        .state::<Empty>(StateConfig::new().defer::<Play>())
        .state::<Stopped>(StateConfig::new().flag::<CdLoaded>())
        .state::<Paused>(StateConfig::new().flag::<CdLoaded>().flag::<Resumable>())
        .on_no_transition(|event, _machine, _state, trace: &mut Trace| {
            trace.push(format!("no transition: {}", event.name()));
        })
        .build()
        .unwrap()
}

/// Player events by index, for generated sequences.
pub fn send(machine: &mut StateMachine<Trace>, event: u8) -> HandledResult {
    let result = match event % 9 {
        0 => machine.process_event(OpenClose),
        1 => machine.process_event(CdDetected),
        2 => machine.process_event(Play),
        3 => machine.process_event(Pause),
        4 => machine.process_event(Stop),
        5 => machine.process_event(NextSong),
        6 => machine.process_event(PrevSong),
        7 => machine.process_event(Toggle),
        _ => machine.process_event(Ping),
    };
    result.unwrap_or(HandledResult::NOT_HANDLED)
}

/// Drains the trace accumulated so far.
pub fn take(machine: &mut StateMachine<Trace>) -> Vec<String> {
    std::mem::take(machine.context_mut())
}
