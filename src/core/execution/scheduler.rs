use crate::core::types::{ProcessId, SimTime};
use std::cmp::Ordering;
use std::collections::{BTreeSet, BinaryHeap};

/// What happens when a timed event fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimedAction {
    /// Resume a thread suspended in `WaitFor`
    Wake(ProcessId),
    /// Toggle the clock with this index
    ClockEdge(usize),
}

#[derive(Debug)]
pub(crate) struct TimedEvent {
    pub time: SimTime,
    pub sequence_num: u64,
    pub action: TimedAction,
}

impl PartialEq for TimedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.sequence_num == other.sequence_num
    }
}

impl Eq for TimedEvent {}

impl PartialOrd for TimedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimedEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (BinaryHeap is max-heap by default)
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.sequence_num.cmp(&self.sequence_num))
    }
}

/// Ready queue for the current delta cycle plus the heap of future events
pub(crate) struct Scheduler {
    timed: BinaryHeap<TimedEvent>,
    sequence_counter: u64,
    /// Ordered by process id, which gives registration-order evaluation and dedup
    ready: BTreeSet<ProcessId>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            timed: BinaryHeap::new(),
            sequence_counter: 0,
            ready: BTreeSet::new(),
        }
    }

    /// Schedule an action at an absolute time
    pub fn schedule_at(&mut self, time: SimTime, action: TimedAction) {
        self.timed.push(TimedEvent {
            time,
            sequence_num: self.sequence_counter,
            action,
        });
        self.sequence_counter += 1;
    }

    /// Time of the earliest pending timed event
    pub fn peek_time(&self) -> Option<SimTime> {
        self.timed.peek().map(|event| event.time)
    }

    /// Remove and return every action scheduled at `time`, in scheduling order
    pub fn pop_due(&mut self, time: SimTime) -> Vec<TimedAction> {
        let mut actions = Vec::new();
        while let Some(event) = self.timed.peek() {
            if event.time != time {
                break;
            }
            if let Some(event) = self.timed.pop() {
                actions.push(event.action);
            }
        }
        actions
    }

    pub fn enqueue(&mut self, process: ProcessId) {
        self.ready.insert(process);
    }

    pub fn has_ready(&self) -> bool {
        !self.ready.is_empty()
    }

    /// Take the whole ready set as one delta-cycle batch
    pub fn take_ready(&mut self) -> Vec<ProcessId> {
        std::mem::take(&mut self.ready).into_iter().collect()
    }

    /// Drop everything still queued; used when the simulation stops
    pub fn clear(&mut self) {
        self.ready.clear();
        self.timed.clear();
    }
}
