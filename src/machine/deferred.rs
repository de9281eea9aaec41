//! Deferred event queue.
//!
//! Entries are appended and retired in place (tombstoned) so that indices
//! stay valid while the queue is being replayed; tombstones are compacted
//! after each replay.

use crate::core::Event;

#[derive(Debug)]
struct Entry {
    event: Option<Box<dyn Event>>,
    round: u64,
    pass: u64,
}

/// FIFO of events deferred by the active configuration.
///
/// Every entry carries the round in which it was deferred and the last drain
/// pass that retried it. An entry is only handed out for replay in a later
/// round, and at most once per pass.
#[derive(Debug, Default)]
pub struct DeferredQueue {
    entries: Vec<Entry>,
}

impl DeferredQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn defer(&mut self, event: Box<dyn Event>, round: u64) {
        self.entries.push(Entry {
            event: Some(event),
            round,
            pass: 0,
        });
    }

    /// Number of events still waiting.
    pub fn pending_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.event.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.pending_count() == 0
    }

    /// Waiting events in deferral order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn Event> + '_ {
        self.entries.iter().filter_map(|entry| entry.event.as_deref())
    }

    pub(crate) fn slots(&self) -> usize {
        self.entries.len()
    }

    /// Takes the event at `index` if it was deferred before `round` and has
    /// not been retried in `pass` yet.
    pub(crate) fn take_due(&mut self, index: usize, round: u64, pass: u64) -> Option<Box<dyn Event>> {
        let entry = self.entries.get_mut(index)?;
        if entry.round >= round || entry.pass >= pass {
            return None;
        }
        entry.event.take()
    }

    /// Puts a taken event back in its slot, marked as retried in `pass`.
    pub(crate) fn restore(&mut self, index: usize, event: Box<dyn Event>, pass: u64) {
        if let Some(entry) = self.entries.get_mut(index) {
            entry.event = Some(event);
            entry.pass = pass;
        }
    }

    /// Drops tombstones, keeping the order of live entries.
    pub(crate) fn compact(&mut self) {
        self.entries.retain(|entry| entry.event.is_some());
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Job(u32);
    impl Event for Job {}

    fn job(value: u32) -> Box<dyn Event> {
        Box::new(Job(value))
    }

    #[test]
    fn entries_are_due_in_later_rounds_only() {
        let mut queue = DeferredQueue::new();
        queue.defer(job(1), 3);

        assert!(queue.take_due(0, 3, 1).is_none());
        let event = queue.take_due(0, 4, 1).unwrap();
        assert_eq!(event.downcast_ref::<Job>(), Some(&Job(1)));
        assert_eq!(queue.pending_count(), 0);
    }

    #[test]
    fn restored_entries_wait_for_the_next_pass() {
        let mut queue = DeferredQueue::new();
        queue.defer(job(1), 1);
        let event = queue.take_due(0, 2, 1).unwrap();
        queue.restore(0, event, 1);

        assert_eq!(queue.pending_count(), 1);
        assert!(queue.take_due(0, 2, 1).is_none());
        assert!(queue.take_due(0, 2, 2).is_some());
    }

    #[test]
    fn fresh_entries_are_not_due_in_their_own_round() {
        let mut queue = DeferredQueue::new();
        queue.defer(job(1), 5);
        assert!(queue.take_due(0, 5, 9).is_none());
        assert!(queue.take_due(0, 6, 9).is_some());
    }

    #[test]
    fn compact_keeps_order() {
        let mut queue = DeferredQueue::new();
        for value in 0..4 {
            queue.defer(job(value), 0);
        }
        queue.take_due(1, 1, 1);
        queue.take_due(2, 1, 1);
        assert_eq!(queue.slots(), 4);

        queue.compact();
        assert_eq!(queue.slots(), 2);
        let left: Vec<_> = queue
            .iter()
            .map(|event| event.downcast_ref::<Job>().map(|job| job.0))
            .collect();
        assert_eq!(left, vec![Some(0), Some(3)]);
    }
}
