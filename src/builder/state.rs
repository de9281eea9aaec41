//! Per-state configuration.

use crate::core::{Event, EventKind, TypeKey};
use crate::machine::DeferPredicate;
use std::fmt;
use std::sync::Arc;

/// Declarative properties of one state: flags, deferred events, region and
/// pseudo-state role.
///
/// # Example
///
/// ```rust
/// use hsm::builder::StateConfig;
/// use hsm::core::Event;
///
/// struct CdLoaded;
///
/// #[derive(Debug)]
/// struct Play;
/// impl Event for Play {}
///
/// let config = StateConfig::new().flag::<CdLoaded>().defer::<Play>();
/// assert!(config.has_flag::<CdLoaded>());
/// ```
#[derive(Clone, Default)]
pub struct StateConfig {
    pub(crate) flags: Vec<TypeKey>,
    pub(crate) deferred: Vec<EventKind>,
    pub(crate) defer_when: Option<DeferPredicate>,
    pub(crate) interrupt_ends: Vec<EventKind>,
    pub(crate) interrupt: bool,
    pub(crate) terminate: bool,
    pub(crate) region: Option<usize>,
}

impl StateConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach flag type `F`, queried with `is_flag_active::<F>()`.
    pub fn flag<F: 'static>(mut self) -> Self {
        let flag = TypeKey::of::<F>();
        if !self.flags.contains(&flag) {
            self.flags.push(flag);
        }
        self
    }

    /// Defer events answering to `E` while this state is active.
    pub fn defer<E: Event>(mut self) -> Self {
        self.deferred.push(EventKind::of::<E>());
        self
    }

    /// Defer every event matching `predicate` while this state is active.
    pub fn defer_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&dyn Event) -> bool + Send + Sync + 'static,
    {
        self.defer_when = Some(Arc::new(predicate));
        self
    }

    /// Block the region until an event answering to `E` arrives.
    /// May be called several times to accept several end events.
    pub fn interrupt_until<E: Event>(mut self) -> Self {
        self.interrupt = true;
        self.interrupt_ends.push(EventKind::of::<E>());
        self
    }

    /// Make the region inert once this state is entered.
    pub fn terminate(mut self) -> Self {
        self.terminate = true;
        self
    }

    /// Pin the state to `region` even if no row links it to the initial state.
    pub fn region(mut self, region: usize) -> Self {
        self.region = Some(region);
        self
    }

    pub fn has_flag<F: 'static>(&self) -> bool {
        self.flags.contains(&TypeKey::of::<F>())
    }
}

impl fmt::Debug for StateConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateConfig")
            .field("flags", &self.flags)
            .field("deferred", &self.deferred)
            .field("defer_when", &self.defer_when.is_some())
            .field("interrupt_ends", &self.interrupt_ends)
            .field("terminate", &self.terminate)
            .field("region", &self.region)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Loaded;
    struct Playing;

    #[derive(Debug)]
    struct Eject;
    impl Event for Eject {}

    #[test]
    fn flags_are_not_duplicated() {
        let config = StateConfig::new().flag::<Loaded>().flag::<Loaded>().flag::<Playing>();
        assert_eq!(config.flags.len(), 2);
        assert!(config.has_flag::<Playing>());
    }

    #[test]
    fn interrupt_collects_end_events() {
        let config = StateConfig::new().interrupt_until::<Eject>();
        assert!(config.interrupt);
        assert_eq!(config.interrupt_ends, vec![EventKind::of::<Eject>()]);
        assert!(!config.terminate);
    }

    #[test]
    fn defaults_are_plain() {
        let config = StateConfig::new();
        assert!(config.flags.is_empty());
        assert!(config.defer_when.is_none());
        assert_eq!(config.region, None);
    }
}
