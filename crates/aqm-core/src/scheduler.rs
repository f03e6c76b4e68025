//! Task scheduling
//!
//! Every component of the core waits by registering or rescheduling a task
//! and returning; nothing blocks. [`Scheduler`] is the primitive the core
//! consumes. [`RunLoop`] is a single-threaded implementation of it that
//! keeps a min-heap of `(deadline, sequence)` entries and hands out due
//! tasks in deadline order, first-come first-served among equal deadlines.
//!
//! A task that fires is parked, not removed: its handle stays valid and the
//! task runs again only if it reschedules itself. Cancelling frees the
//! handle; cancelling a freed handle does nothing.

use core::cell::Cell;

use embassy_time::{Duration, Instant};
use heapless::BinaryHeap;
use heapless::binary_heap::Min;
use log::{error, warn};
use thiserror_no_std::Error;

/// Default number of task slots of a [`RunLoop`]
pub const TASK_SLOTS: usize = 4;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("no free task slot (capacity {capacity})")]
    Full { capacity: usize },
}

/// The self-rescheduling tasks of the node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    Transmit,
    Calibration,
}

/// Handle of a registered task.
///
/// Stale handles (the task was cancelled, the slot reused) are detected by
/// the generation counter and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle {
    slot: u8,
    generation: u16,
}

impl TaskHandle {
    pub const fn new(slot: u8, generation: u16) -> Self {
        Self { slot, generation }
    }
}

/// Add `delay` to `now`, clamping at the far future.
pub fn deadline_after(now: Instant, delay: Duration) -> Instant {
    now.checked_add(delay).unwrap_or(Instant::MAX)
}

pub trait Scheduler {
    /// Current monotonic time
    fn now(&self) -> Instant;

    /// Register `task` to run at `at`.
    fn register(&mut self, task: Task, at: Instant) -> Result<TaskHandle, SchedulerError>;

    /// Drop a task. A stale handle is a no-op.
    fn cancel(&mut self, handle: TaskHandle);

    /// Move a task's next run to `at`, superseding any earlier plan.
    fn reschedule(&mut self, handle: TaskHandle, at: Instant);

    fn plan_now(&mut self, handle: TaskHandle) {
        let now = self.now();
        self.reschedule(handle, now);
    }

    fn plan_relative(&mut self, handle: TaskHandle, delay: Duration) {
        let at = deadline_after(self.now(), delay);
        self.reschedule(handle, at);
    }
}

/// Monotonic time source for a [`RunLoop`]
pub trait Clock {
    fn now(&self) -> Instant;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

/// A clock that only moves when told to. Used for tests and for replaying
/// sequences faster than real time.
#[derive(Debug)]
pub struct ManualClock {
    now: Cell<Instant>,
}

impl ManualClock {
    pub const fn new(start: Instant) -> Self {
        Self {
            now: Cell::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(deadline_after(self.now.get(), by));
    }

    pub fn set(&self, at: Instant) {
        self.now.set(at);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.now.get()
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    task: Task,
    /// `None` while parked
    deadline: Option<Instant>,
    sequence: u64,
}

/// Heap entry. Ordering by `(deadline, sequence)` gives FIFO among equal
/// deadlines. An entry is stale once its slot was re-armed or freed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Entry {
    deadline: Instant,
    sequence: u64,
    slot: u8,
}

pub struct RunLoop<C: Clock, const N: usize = TASK_SLOTS> {
    clock: C,
    slots: [Option<Slot>; N],
    generations: [u16; N],
    queue: BinaryHeap<Entry, Min, N>,
    sequence: u64,
}

impl<C: Clock, const N: usize> RunLoop<C, N> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            slots: [None; N],
            generations: [0; N],
            queue: BinaryHeap::new(),
            sequence: 0,
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Number of registered tasks, parked or armed
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deadline of the next armed task, if any
    pub fn next_deadline(&mut self) -> Option<Instant> {
        self.drop_stale();
        self.queue.peek().map(|entry| entry.deadline)
    }

    /// Is `handle` registered and armed?
    pub fn is_armed(&self, handle: TaskHandle) -> bool {
        self.live_slot(handle)
            .is_some_and(|slot| self.slots[slot].is_some_and(|s| s.deadline.is_some()))
    }

    /// Pop the earliest task whose deadline has passed. The task is parked
    /// until its handler reschedules it.
    pub fn next_due(&mut self) -> Option<(TaskHandle, Task)> {
        let now = self.clock.now();
        self.drop_stale();

        let entry = *self.queue.peek()?;
        if entry.deadline > now {
            return None;
        }
        self.queue.pop();

        let index = entry.slot as usize;
        let slot = self.slots[index].as_mut()?;
        slot.deadline = None;
        Some((TaskHandle::new(entry.slot, self.generations[index]), slot.task))
    }

    fn live_slot(&self, handle: TaskHandle) -> Option<usize> {
        let index = handle.slot as usize;
        if index < N && self.slots[index].is_some() && self.generations[index] == handle.generation
        {
            Some(index)
        } else {
            None
        }
    }

    fn is_current(&self, entry: &Entry) -> bool {
        match self.slots[entry.slot as usize] {
            Some(slot) => slot.deadline.is_some() && slot.sequence == entry.sequence,
            None => false,
        }
    }

    fn drop_stale(&mut self) {
        while let Some(entry) = self.queue.peek() {
            if self.is_current(entry) {
                break;
            }
            self.queue.pop();
        }
    }

    fn arm(&mut self, index: usize, at: Instant) {
        self.sequence += 1;
        let Some(slot) = self.slots[index].as_mut() else {
            return;
        };
        slot.deadline = Some(at);
        slot.sequence = self.sequence;

        let entry = Entry {
            deadline: at,
            sequence: self.sequence,
            slot: index as u8,
        };
        if self.queue.push(entry).is_err() {
            // Full of stale entries; at most one live entry per slot fits.
            self.rebuild();
        }
    }

    fn rebuild(&mut self) {
        self.queue.clear();
        for (index, slot) in self.slots.iter().enumerate() {
            let Some(slot) = slot else { continue };
            let Some(deadline) = slot.deadline else {
                continue;
            };
            let _ = self.queue.push(Entry {
                deadline,
                sequence: slot.sequence,
                slot: index as u8,
            });
        }
    }
}

impl<C: Clock, const N: usize> Scheduler for RunLoop<C, N> {
    fn now(&self) -> Instant {
        self.clock.now()
    }

    fn register(&mut self, task: Task, at: Instant) -> Result<TaskHandle, SchedulerError> {
        let Some(index) = self.slots.iter().position(|s| s.is_none()) else {
            error!("Cannot register {:?}: all {} task slots in use", task, N);
            return Err(SchedulerError::Full { capacity: N });
        };

        self.generations[index] = self.generations[index].wrapping_add(1);
        self.slots[index] = Some(Slot {
            task,
            deadline: None,
            sequence: 0,
        });
        self.arm(index, at);

        Ok(TaskHandle::new(index as u8, self.generations[index]))
    }

    fn cancel(&mut self, handle: TaskHandle) {
        if let Some(index) = self.live_slot(handle) {
            self.slots[index] = None;
        }
    }

    fn reschedule(&mut self, handle: TaskHandle, at: Instant) {
        match self.live_slot(handle) {
            Some(index) => self.arm(index, at),
            None => warn!("Ignoring reschedule of stale task handle {:?}", handle),
        }
    }
}
