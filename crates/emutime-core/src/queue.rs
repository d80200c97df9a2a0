use std::collections::BinaryHeap;
use std::sync::{Arc, Weak};

use crate::event::{Event, EventType};

/// Min-heap of scheduled events keyed by `(time, fifo_order)`.
///
/// Equal-time events pop in the order they were pushed. The fifo counter is
/// never rewound, not even by [`EventQueue::clear`].
#[derive(Debug, Default)]
pub(crate) struct EventQueue {
    heap: BinaryHeap<Event>,
    next_fifo: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, time: i64, kind: Weak<EventType>, reschedule_time: i64) -> u64 {
        let fifo_order = self.next_fifo;
        self.next_fifo += 1;
        self.heap.push(Event {
            time,
            fifo_order,
            kind,
            reschedule_time,
        });
        fifo_order
    }

    pub fn next_time(&self) -> Option<i64> {
        self.heap.peek().map(|e| e.time)
    }

    /// Pop the earliest event if it is due at or before `now`.
    pub fn pop_due(&mut self, now: i64) -> Option<Event> {
        if self.next_time()? <= now {
            self.heap.pop()
        } else {
            None
        }
    }

    /// Drop every queued instance of `kind`, returning how many were removed.
    pub fn remove_kind(&mut self, kind: &Arc<EventType>) -> usize {
        let before = self.heap.len();
        self.heap.retain(|e| !e.is_kind(kind));
        before - self.heap.len()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::create_event;

    fn kind(name: &str) -> Arc<EventType> {
        create_event(name, |_, _| None)
    }

    fn drain(queue: &mut EventQueue) -> Vec<(i64, u64)> {
        let mut out = Vec::new();
        while let Some(e) = queue.pop_due(i64::MAX) {
            out.push((e.time, e.fifo_order));
        }
        out
    }

    #[test]
    fn pops_by_time_then_insertion_order() {
        let k = kind("k");
        let mut queue = EventQueue::new();
        queue.push(30, Arc::downgrade(&k), 0);
        queue.push(10, Arc::downgrade(&k), 0);
        queue.push(10, Arc::downgrade(&k), 0);
        queue.push(20, Arc::downgrade(&k), 0);
        queue.push(10, Arc::downgrade(&k), 0);

        assert_eq!(drain(&mut queue), vec![(10, 1), (10, 2), (10, 4), (20, 3), (30, 0)]);
    }

    #[test]
    fn pop_due_leaves_future_events() {
        let k = kind("k");
        let mut queue = EventQueue::new();
        queue.push(100, Arc::downgrade(&k), 0);
        assert!(queue.pop_due(99).is_none());
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop_due(100).map(|e| e.time), Some(100));
        assert!(queue.pop_due(i64::MAX).is_none());
    }

    #[test]
    fn remove_kind_only_touches_that_kind() {
        let a = kind("a");
        let b = kind("a");
        let mut queue = EventQueue::new();
        queue.push(5, Arc::downgrade(&a), 0);
        queue.push(1, Arc::downgrade(&b), 0);
        queue.push(3, Arc::downgrade(&a), 0);
        queue.push(4, Arc::downgrade(&b), 0);

        assert_eq!(queue.remove_kind(&a), 2);
        assert_eq!(drain(&mut queue), vec![(1, 1), (4, 3)]);
    }

    #[test]
    fn expired_kinds_stay_queued_until_popped() {
        let a = kind("a");
        let b = kind("b");
        let mut queue = EventQueue::new();
        queue.push(1, Arc::downgrade(&a), 0);
        queue.push(2, Arc::downgrade(&b), 0);
        drop(a);

        assert_eq!(queue.remove_kind(&b), 1);
        let evt = queue.pop_due(i64::MAX).expect("expired event still queued");
        assert!(evt.kind.upgrade().is_none());
    }

    #[test]
    fn clear_does_not_rewind_fifo_counter() {
        let k = kind("k");
        let mut queue = EventQueue::new();
        queue.push(1, Arc::downgrade(&k), 0);
        queue.push(1, Arc::downgrade(&k), 0);
        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.push(1, Arc::downgrade(&k), 0), 2);
    }
}
