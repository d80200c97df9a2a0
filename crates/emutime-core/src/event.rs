use std::cmp::Ordering;
use std::fmt;
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Callback invoked when an event fires.
///
/// Receives the event's due time and how late it is being delivered, both in
/// nanoseconds of virtual time. Returning `Some(delay)` re-arms the event
/// `delay` after its due time, and `delay` becomes its period from then on.
pub type TimedCallback = Box<dyn Fn(i64, i64) -> Option<Duration> + Send + Sync>;

/// A kind of timer, defined once by a subsystem and scheduled many times.
///
/// The scheduler only keeps weak references to these. Dropping the last
/// `Arc` silently cancels every queued instance.
pub struct EventType {
    callback: TimedCallback,
    name: String,
    /// Bumped on every unschedule so in-flight reschedules can be discarded.
    /// Only modified under the scheduler's queue lock.
    sequence_number: AtomicU64,
}

impl EventType {
    pub fn new<F>(name: impl Into<String>, callback: F) -> Self
    where
        F: Fn(i64, i64) -> Option<Duration> + Send + Sync + 'static,
    {
        Self {
            callback: Box::new(callback),
            name: name.into(),
            sequence_number: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number.load(AtomicOrdering::Acquire)
    }

    pub(crate) fn bump_sequence(&self) {
        self.sequence_number.fetch_add(1, AtomicOrdering::AcqRel);
    }

    pub(crate) fn invoke(&self, due_time: i64, lateness: i64) -> Option<Duration> {
        (self.callback)(due_time, lateness)
    }
}

impl fmt::Debug for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventType")
            .field("name", &self.name)
            .field("sequence_number", &self.sequence_number())
            .finish_non_exhaustive()
    }
}

pub fn create_event<F>(name: impl Into<String>, callback: F) -> Arc<EventType>
where
    F: Fn(i64, i64) -> Option<Duration> + Send + Sync + 'static,
{
    Arc::new(EventType::new(name, callback))
}

/// One scheduled instance of an [`EventType`].
#[derive(Debug, Clone)]
pub(crate) struct Event {
    pub time: i64,
    pub fifo_order: u64,
    pub kind: Weak<EventType>,
    /// Zero for one-shot events, otherwise the re-arm period in nanoseconds.
    pub reschedule_time: i64,
}

impl Event {
    /// Identity comparison; stays valid after the kind has been dropped.
    pub fn is_kind(&self, kind: &Arc<EventType>) -> bool {
        ptr::eq(self.kind.as_ptr(), Arc::as_ptr(kind))
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.fifo_order == other.fifo_order
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Reversed so that `BinaryHeap` pops the earliest `(time, fifo_order)` first.
impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        (other.time, other.fifo_order).cmp(&(self.time, self.fifo_order))
    }
}
