use std::cell::{Cell, RefCell};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::rc::Rc;

type Task = Box<dyn FnOnce()>;

/// Upper bound on tasks run by a single [`EventLoop::run_until_idle`] call.
const MAX_TASKS_PER_RUN: usize = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// Single-threaded task scheduler with a virtual millisecond clock.
///
/// Timers due at the same instant run in scheduling order. Microtasks drain
/// completely before the next timer fires.
#[derive(Default)]
pub struct EventLoop {
    now: Cell<u64>,
    next_seq: Cell<u64>,
    timers: RefCell<BinaryHeap<Reverse<(u64, u64)>>>,
    callbacks: RefCell<HashMap<u64, Task>>,
    microtasks: RefCell<VecDeque<Task>>,
}

impl EventLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time in milliseconds.
    pub fn now(&self) -> u64 {
        self.now.get()
    }

    pub fn set_timeout(&self, delay_ms: u64, task: impl FnOnce() + 'static) -> TimerId {
        let seq = self.next_seq.get();
        self.next_seq.set(seq + 1);
        let due = self.now.get().saturating_add(delay_ms);
        self.timers.borrow_mut().push(Reverse((due, seq)));
        self.callbacks.borrow_mut().insert(seq, Box::new(task));
        TimerId(seq)
    }

    /// Cancel a pending timer. Returns false if it already ran or was cleared.
    pub fn clear_timeout(&self, id: TimerId) -> bool {
        self.callbacks.borrow_mut().remove(&id.0).is_some()
    }

    pub fn queue_microtask(&self, task: impl FnOnce() + 'static) {
        self.microtasks.borrow_mut().push_back(Box::new(task));
    }

    pub fn pending_timers(&self) -> usize {
        self.callbacks.borrow().len()
    }

    pub fn is_idle(&self) -> bool {
        self.pending_timers() == 0 && self.microtasks.borrow().is_empty()
    }

    /// Run every queued microtask, including ones queued while draining.
    pub fn run_microtasks(&self) -> usize {
        let mut ran = 0;
        loop {
            let task = self.microtasks.borrow_mut().pop_front();
            let Some(task) = task else {
                return ran;
            };
            task();
            ran += 1;
        }
    }

    /// Move the clock forward by `ms`, running everything that falls due.
    pub fn advance(&self, ms: u64) -> usize {
        let until = self.now.get().saturating_add(ms);
        let mut ran = self.run_microtasks();
        while let Some(task) = self.pop_due(Some(until)) {
            task();
            ran += 1 + self.run_microtasks();
        }
        self.now.set(until);
        ran
    }

    /// Run microtasks and timers until nothing is scheduled, jumping the
    /// clock to each timer's due time.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = self.run_microtasks();
        while ran < MAX_TASKS_PER_RUN {
            let Some(task) = self.pop_due(None) else {
                break;
            };
            task();
            ran += 1 + self.run_microtasks();
        }
        if ran >= MAX_TASKS_PER_RUN {
            tracing::warn!(ran, "event loop did not settle; stopping");
        }
        ran
    }

    fn pop_due(&self, until: Option<u64>) -> Option<Task> {
        loop {
            let Reverse((due, seq)) = *self.timers.borrow().peek()?;
            if until.is_some_and(|limit| due > limit) {
                return None;
            }
            self.timers.borrow_mut().pop();
            if let Some(task) = self.callbacks.borrow_mut().remove(&seq) {
                if due > self.now.get() {
                    self.now.set(due);
                }
                return Some(task);
            }
        }
    }
}

/// At most one pending timer; scheduling again replaces the pending one.
#[derive(Clone, Default)]
pub struct Debouncer {
    pending: Rc<Cell<Option<TimerId>>>,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&self, event_loop: &EventLoop, delay_ms: u64, task: impl FnOnce() + 'static) {
        if let Some(id) = self.pending.take() {
            event_loop.clear_timeout(id);
        }
        let pending = self.pending.clone();
        let id = event_loop.set_timeout(delay_ms, move || {
            pending.set(None);
            task();
        });
        self.pending.set(Some(id));
    }

    pub fn cancel(&self, event_loop: &EventLoop) -> bool {
        self.pending
            .take()
            .is_some_and(|id| event_loop.clear_timeout(id))
    }

    pub fn is_pending(&self) -> bool {
        self.pending.get().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log() -> Rc<RefCell<Vec<&'static str>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    #[test]
    fn timers_run_in_due_then_schedule_order() {
        let lp = EventLoop::new();
        let out = log();
        for (delay, name) in [(10, "late"), (0, "first"), (0, "second")] {
            let out = out.clone();
            lp.set_timeout(delay, move || out.borrow_mut().push(name));
        }
        lp.run_until_idle();
        assert_eq!(*out.borrow(), vec!["first", "second", "late"]);
        assert_eq!(lp.now(), 10);
    }

    #[test]
    fn microtasks_drain_before_timers() {
        let lp = Rc::new(EventLoop::new());
        let out = log();
        {
            let out = out.clone();
            lp.set_timeout(0, move || out.borrow_mut().push("timer"));
        }
        {
            let out = out.clone();
            lp.queue_microtask(move || out.borrow_mut().push("micro"));
        }
        lp.run_until_idle();
        assert_eq!(*out.borrow(), vec!["micro", "timer"]);
    }

    #[test]
    fn advance_stops_at_the_horizon() {
        let lp = EventLoop::new();
        let out = log();
        {
            let out = out.clone();
            lp.set_timeout(100, move || out.borrow_mut().push("fired"));
        }
        lp.advance(99);
        assert!(out.borrow().is_empty());
        lp.advance(1);
        assert_eq!(*out.borrow(), vec!["fired"]);
    }

    #[test]
    fn cleared_timer_never_runs() {
        let lp = EventLoop::new();
        let out = log();
        let id = {
            let out = out.clone();
            lp.set_timeout(5, move || out.borrow_mut().push("x"))
        };
        assert!(lp.clear_timeout(id));
        lp.run_until_idle();
        assert!(out.borrow().is_empty());
        assert!(!lp.clear_timeout(id));
    }

    #[test]
    fn debouncer_keeps_only_the_last_request() {
        let lp = EventLoop::new();
        let hits = Rc::new(Cell::new(0));
        let debouncer = Debouncer::new();
        for _ in 0..5 {
            let hits = hits.clone();
            debouncer.schedule(&lp, 0, move || hits.set(hits.get() + 1));
        }
        assert!(debouncer.is_pending());
        lp.run_until_idle();
        assert_eq!(hits.get(), 1);
        assert!(!debouncer.is_pending());
    }
}
