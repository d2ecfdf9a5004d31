//! Two-priority run-to-completion event scheduler
//!
//! Events are created once, bound to an application task value, and posted any number
//! of times. Interrupt handlers post with [`Scheduler::post_from_interrupt`], everything
//! else with [`Scheduler::post`]. Each pass of the dispatch loop runs the interrupt
//! events pending when the pass starts, then the normal events pending at that point,
//! then starts over. Anything posted in between, a handler reposting its own event
//! included, waits for a later pass, so interrupt work is never held back by more
//! than one pass of normal work.
//!
//! Handlers run to completion in the dispatch loop context. They may post events and
//! start or restart timers on the same scheduler.
//!
//! Events, software timers and the internal tick event share one fixed arena of `N` slots.
//! Queue membership is guarded by the scheduler mutex. Handlers always run outside it.
//!
//! ```
//! use duolink::event::Scheduler;
//! use embassy_sync::blocking_mutex::raw::NoopRawMutex;
//!
//! #[derive(Clone, Copy, PartialEq, Debug)]
//! enum Task {
//!     Sample(u16),
//!     Report,
//! }
//!
//! let scheduler = Scheduler::<NoopRawMutex, Task, 4>::new();
//! let sample = scheduler.create_event(Task::Sample(3)).unwrap();
//! let report = scheduler.create_event(Task::Report).unwrap();
//!
//! scheduler.post(report).unwrap();
//! scheduler.post_from_interrupt(sample).unwrap();
//!
//! let mut order = Vec::new();
//! scheduler.run_once(&mut |_, task| order.push(task));
//! assert_eq!(order, [Task::Sample(3), Task::Report]);
//! ```

use core::cell::RefCell;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::config::Config;
use crate::core::Priority;
use crate::queue::{AlreadyQueued, MAX_CAPACITY, NodeId, QueueId, QueueSet};
use crate::time::{Duration, Instant};
use crate::timer::Countdown;

pub(crate) const ISR_QUEUE: QueueId = QueueId::new(0);
pub(crate) const NORMAL_QUEUE: QueueId = QueueId::new(1);
pub(crate) const TIMER_LIST: QueueId = QueueId::new(2);
const QUEUE_COUNT: usize = 3;

/// Handle of an event slot
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EventId(pub(crate) NodeId);

impl EventId {
    pub const fn into_u8(self) -> u8 {
        self.0.into_u8()
    }
}

/// The event arena has no free slot left
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Exhausted;

#[derive(Clone, Copy)]
pub(crate) enum Kind<K> {
    Tick,
    Task(K),
}

pub(crate) struct Slot<K> {
    pub(crate) kind: Option<Kind<K>>,
    pub(crate) countdown: Option<Countdown>,
}

pub(crate) struct Inner<K, const N: usize> {
    pub(crate) queues: QueueSet<QUEUE_COUNT, N>,
    pub(crate) slots: [Slot<K>; N],
    allocated: usize,
    pub(crate) now: Instant,
    pub(crate) missed_ticks: u32,
}

impl<K, const N: usize> Inner<K, N> {
    fn allocate(&mut self, kind: Kind<K>, countdown: Option<Countdown>) -> Result<EventId, Exhausted> {
        let index = self.allocated;
        let slot = self.slots.get_mut(index).ok_or(Exhausted)?;
        slot.kind = Some(kind);
        slot.countdown = countdown;
        self.allocated += 1;
        Ok(EventId(NodeId::new(unwrap!(u8::try_from(index)))))
    }

    pub(crate) fn check(&self, event: EventId) -> NodeId {
        assert!(event.0.index() < self.allocated);
        event.0
    }
}

/// Scheduler context
///
/// `N` is the total number of event and timer slots, one of which is reserved for the
/// tick event. Use `CriticalSectionRawMutex` when interrupt handlers post events.
pub struct Scheduler<M: RawMutex, K, const N: usize> {
    pub(crate) inner: Mutex<M, RefCell<Inner<K, N>>>,
    pub(crate) granularity: Duration,
    pub(crate) tick: EventId,
}

impl<M: RawMutex, K: Copy, const N: usize> Scheduler<M, K, N> {
    const _ASSERT: usize = MAX_CAPACITY - QUEUE_COUNT - N;

    /// Creates a scheduler for the default tick granularity.
    pub fn new() -> Self {
        Self::with_config(&Config::default())
    }

    pub fn with_config(config: &Config) -> Self {
        Self::with_granularity(config.tick_granularity)
    }

    /// Creates a scheduler driven by a tick of the given period.
    pub fn with_granularity(granularity: Duration) -> Self {
        let _ = Self::_ASSERT;
        assert!(granularity > Duration::from_ticks(0));
        let mut inner = Inner {
            queues: QueueSet::new(),
            slots: core::array::from_fn(|_| Slot {
                kind: None,
                countdown: None,
            }),
            allocated: 0,
            now: Instant::from_ticks(0),
            missed_ticks: 0,
        };
        let tick = unwrap!(inner.allocate(Kind::Tick, None));
        Self {
            inner: Mutex::new(RefCell::new(inner)),
            granularity,
            tick,
        }
    }

    pub(crate) fn with_inner<T>(&self, f: impl FnOnce(&mut Inner<K, N>) -> T) -> T {
        self.inner.lock(|cell| f(&mut cell.borrow_mut()))
    }

    pub(crate) fn allocate(
        &self,
        task: K,
        countdown: Option<Countdown>,
    ) -> Result<EventId, Exhausted> {
        self.with_inner(|inner| inner.allocate(Kind::Task(task), countdown))
    }

    /// Binds a new event to the task value.
    pub fn create_event(&self, task: K) -> Result<EventId, Exhausted> {
        self.allocate(task, None)
    }

    /// Task value the event is currently bound to
    pub fn task(&self, event: EventId) -> Option<K> {
        self.with_inner(|inner| {
            let node = inner.check(event);
            match inner.slots[node.index()].kind {
                Some(Kind::Task(task)) => Some(task),
                _ => None,
            }
        })
    }

    /// Replaces the task value. A pending event runs with the new value.
    pub fn set_task(&self, event: EventId, task: K) {
        self.with_inner(|inner| {
            let node = inner.check(event);
            if let Some(Kind::Task(slot)) = inner.slots[node.index()].kind.as_mut() {
                *slot = task;
            }
        })
    }

    fn push(&self, queue: QueueId, event: EventId) -> Result<(), AlreadyQueued> {
        let res = self.with_inner(|inner| {
            let node = inner.check(event);
            inner.queues.push_back(queue, node)
        });
        if let Err(err) = res {
            debug!(
                "event {} already queued on {}",
                event.into_u8(),
                err.queue.into_u8()
            );
        }
        res
    }

    /// Posts the event to the normal queue.
    ///
    /// An event that is already pending or armed as a timer is left untouched.
    pub fn post(&self, event: EventId) -> Result<(), AlreadyQueued> {
        self.push(NORMAL_QUEUE, event)
    }

    /// Posts the event to the interrupt queue. Safe to call from interrupt handlers.
    ///
    /// An event that is already pending or armed as a timer is left untouched.
    pub fn post_from_interrupt(&self, event: EventId) -> Result<(), AlreadyQueued> {
        self.push(ISR_QUEUE, event)
    }

    /// Priority of the queue holding the event, if it waits for dispatch
    pub fn pending(&self, event: EventId) -> Option<Priority> {
        self.with_inner(|inner| {
            let node = inner.check(event);
            match inner.queues.queue_of(node) {
                Some(ISR_QUEUE) => Some(Priority::Interrupt),
                Some(NORMAL_QUEUE) => Some(Priority::Normal),
                _ => None,
            }
        })
    }

    fn pop(&self, queue: QueueId) -> Option<(EventId, Kind<K>)> {
        self.with_inner(|inner| {
            let node = inner.queues.pop_front(queue)?;
            let kind = unwrap!(inner.slots[node.index()].kind);
            Some((EventId(node), kind))
        })
    }

    /// Dispatches the events queued when the drain starts. Events posted meanwhile,
    /// reposts included, wait for the next pass.
    fn drain(&self, queue: QueueId, handler: &mut impl FnMut(EventId, K)) -> usize {
        let Some(last) = self.with_inner(|inner| inner.queues.back(queue)) else {
            return 0;
        };
        let mut count = 0;
        while let Some((event, kind)) = self.pop(queue) {
            match kind {
                Kind::Tick => self.on_tick(),
                Kind::Task(task) => handler(event, task),
            }
            count += 1;
            if event.0 == last {
                break;
            }
        }
        count
    }

    /// Runs one pass: the pending interrupt events, then the pending normal events.
    ///
    /// Timers fired by a tick handled in this pass run in its normal half.
    ///
    /// Returns the number of dispatched events, the internal tick event included.
    pub fn run_once(&self, handler: &mut impl FnMut(EventId, K)) -> usize {
        let interrupt = self.drain(ISR_QUEUE, handler);
        let normal = self.drain(NORMAL_QUEUE, handler);
        interrupt + normal
    }

    /// Dispatch loop
    pub fn run(&self, handler: &mut impl FnMut(EventId, K)) -> ! {
        loop {
            self.run_once(handler);
        }
    }

    pub fn is_idle(&self) -> bool {
        self.with_inner(|inner| {
            inner.queues.is_empty(ISR_QUEUE) && inner.queues.is_empty(NORMAL_QUEUE)
        })
    }
}

impl<M: RawMutex, K: Copy, const N: usize> Default for Scheduler<M, K, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TICK_GRANULARITY;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use heapless::Vec;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Task {
        Isr(u8),
        Normal(u8),
    }

    type TestScheduler = Scheduler<NoopRawMutex, Task, 16>;

    #[test]
    fn test_interrupt_work_drains_first() {
        let scheduler = TestScheduler::new();
        let normal: Vec<EventId, 4> = (0..4)
            .map(|i| scheduler.create_event(Task::Normal(i)).unwrap())
            .collect();
        let isr: Vec<EventId, 3> = (0..3)
            .map(|i| scheduler.create_event(Task::Isr(i)).unwrap())
            .collect();

        scheduler.post(normal[0]).unwrap();
        scheduler.post_from_interrupt(isr[0]).unwrap();
        scheduler.post(normal[1]).unwrap();
        scheduler.post_from_interrupt(isr[1]).unwrap();
        scheduler.post_from_interrupt(isr[2]).unwrap();
        scheduler.post(normal[2]).unwrap();
        scheduler.post(normal[3]).unwrap();

        let mut order: Vec<Task, 8> = Vec::new();
        let count = scheduler.run_once(&mut |_, task| order.push(task).unwrap());

        assert_eq!(count, 7);
        assert_eq!(
            &order[..],
            &[
                Task::Isr(0),
                Task::Isr(1),
                Task::Isr(2),
                Task::Normal(0),
                Task::Normal(1),
                Task::Normal(2),
                Task::Normal(3),
            ]
        );
        assert!(scheduler.is_idle());
    }

    #[test]
    fn test_interrupt_post_during_normal_drain_waits_for_next_pass() {
        let scheduler = TestScheduler::new();
        let first = scheduler.create_event(Task::Normal(0)).unwrap();
        let second = scheduler.create_event(Task::Normal(1)).unwrap();
        let late = scheduler.create_event(Task::Isr(9)).unwrap();

        scheduler.post(first).unwrap();
        scheduler.post(second).unwrap();

        let mut order: Vec<Task, 8> = Vec::new();
        scheduler.run_once(&mut |_, task| {
            if task == Task::Normal(0) {
                scheduler.post_from_interrupt(late).unwrap();
            }
            order.push(task).unwrap();
        });
        assert_eq!(&order[..], &[Task::Normal(0), Task::Normal(1)]);
        assert_eq!(scheduler.pending(late), Some(Priority::Interrupt));

        order.clear();
        scheduler.run_once(&mut |_, task| order.push(task).unwrap());
        assert_eq!(&order[..], &[Task::Isr(9)]);
    }

    #[test]
    fn test_double_post_is_reported() {
        let scheduler = TestScheduler::new();
        let event = scheduler.create_event(Task::Normal(1)).unwrap();

        scheduler.post(event).unwrap();
        assert_eq!(
            scheduler.post_from_interrupt(event),
            Err(AlreadyQueued {
                queue: NORMAL_QUEUE
            })
        );
        assert_eq!(scheduler.pending(event), Some(Priority::Normal));

        let mut count = 0;
        scheduler.run_once(&mut |_, _| count += 1);
        assert_eq!(count, 1);

        scheduler.post(event).unwrap();
    }

    #[test]
    fn test_handler_can_repost_itself() {
        let scheduler = TestScheduler::new();
        let event = scheduler.create_event(Task::Normal(0)).unwrap();
        scheduler.post(event).unwrap();

        let mut runs = 0;
        for _ in 0..3 {
            scheduler.run_once(&mut |id, _| {
                runs += 1;
                scheduler.post(id).unwrap();
            });
        }
        assert_eq!(runs, 3);
        assert_eq!(scheduler.pending(event), Some(Priority::Normal));
    }

    #[test]
    fn test_reposting_handler_yields_to_interrupt_work() {
        let scheduler = TestScheduler::new();
        let busy = scheduler.create_event(Task::Normal(0)).unwrap();
        let late = scheduler.create_event(Task::Isr(1)).unwrap();
        scheduler.post(busy).unwrap();

        let mut order: Vec<Task, 8> = Vec::new();
        let count = scheduler.run_once(&mut |id, task| {
            if task == Task::Normal(0) {
                scheduler.post(id).unwrap();
                scheduler.post_from_interrupt(late).unwrap();
            }
            order.push(task).unwrap();
        });
        assert_eq!(count, 1);
        assert_eq!(&order[..], &[Task::Normal(0)]);

        order.clear();
        scheduler.run_once(&mut |id, task| {
            if task == Task::Normal(0) {
                scheduler.post(id).unwrap();
            }
            order.push(task).unwrap();
        });
        assert_eq!(&order[..], &[Task::Isr(1), Task::Normal(0)]);
        assert_eq!(scheduler.pending(busy), Some(Priority::Normal));
    }

    #[test]
    fn test_set_task_updates_payload() {
        let scheduler = TestScheduler::new();
        let event = scheduler.create_event(Task::Normal(0)).unwrap();
        scheduler.post(event).unwrap();
        scheduler.set_task(event, Task::Normal(5));
        assert_eq!(scheduler.task(event), Some(Task::Normal(5)));

        let mut seen = None;
        scheduler.run_once(&mut |_, task| seen = Some(task));
        assert_eq!(seen, Some(Task::Normal(5)));
    }

    #[test]
    fn test_config_sets_granularity() {
        let mut config = Config::default();
        assert_eq!(TestScheduler::with_config(&config).granularity(), TICK_GRANULARITY);

        config.tick_granularity = Duration::from_millis(1);
        let scheduler = TestScheduler::with_config(&config);
        assert_eq!(scheduler.granularity(), Duration::from_millis(1));

        scheduler.on_tick();
        assert_eq!(scheduler.now(), Instant::from_millis(1));
    }

    #[test]
    fn test_arena_exhaustion() {
        let scheduler = Scheduler::<NoopRawMutex, Task, 3>::new();
        scheduler.create_event(Task::Normal(0)).unwrap();
        scheduler.create_event(Task::Normal(1)).unwrap();
        assert_eq!(scheduler.create_event(Task::Normal(2)), Err(Exhausted));
    }
}
