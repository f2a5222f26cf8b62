//! Single cooperative task queue
//!
//! Every deferred callback in a session (render ticks, confederate thinking
//! time, probe and end timers) is a `Task` on one queue ordered by due time.
//! Tasks due at the same millisecond run in the order they were scheduled.
//!
//! There is no cancellation: a task that no longer applies is expected to
//! check session state when it runs and do nothing.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use super::sprite::EntityId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    /// Connecting screen is over; start the game
    Start,
    /// Redraw and re-announce the turn
    Tick,
    /// A confederate's thinking time ran out. `serial` identifies the turn
    /// it was scheduled for.
    ConfederateThrow { player: EntityId, serial: u64 },
    /// Show probe number `index`
    Probe { index: usize },
    /// Close probe `index` if still unanswered
    ProbeTimeout { index: usize },
    /// Time limit reached
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Scheduled {
    due: u64,
    seq: u64,
    task: Task,
}

// Ordering: (due ASC, seq ASC); wrapped in `Reverse` for the max-heap
impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        self.due
            .cmp(&other.due)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    queue: BinaryHeap<Reverse<Scheduled>>,
    next_seq: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `task` to run at `due` (ms)
    pub fn schedule_at(&mut self, due: u64, task: Task) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Reverse(Scheduled { due, seq, task }));
    }

    /// Due time of the earliest task
    pub fn next_due(&self) -> Option<u64> {
        self.queue.peek().map(|Reverse(s)| s.due)
    }

    /// Remove and return the earliest task if it is due at `now`
    pub fn pop_due(&mut self, now: u64) -> Option<(u64, Task)> {
        if self.next_due()? > now {
            return None;
        }
        self.queue.pop().map(|Reverse(s)| (s.due, s.task))
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Number of queued tasks matching `pred`
    pub fn count(&self, pred: impl Fn(&Task) -> bool) -> usize {
        self.queue.iter().filter(|Reverse(s)| pred(&s.task)).count()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }
}
