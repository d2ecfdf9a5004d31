//! Software countdown timers
//!
//! Armed timers sit in one list, in arming order. Every tick of the hardware timer
//! advances the time base and walks the list once: a timer with at most one granule
//! left fires, anything else loses one granule. A fired timer moves onto the normal
//! queue and is dispatched like any other event.
//!
//! Timers do not repeat on their own. A periodic task calls [`Scheduler::restart`]
//! from its handler.
//!
//! The hardware tick interrupt only posts the internal tick event through
//! [`TickSource`], so the list walk runs in the dispatch loop, ahead of normal work.

use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::driver::interrupt::InterruptSource;
use crate::event::{EventId, Exhausted, NORMAL_QUEUE, Scheduler, TIMER_LIST};
use crate::time::{Duration, Instant};

/// Handle of a timer slot
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimerId(EventId);

impl TimerId {
    /// Event posted when the timer fires
    pub const fn event(self) -> EventId {
        self.0
    }
}

impl From<TimerId> for EventId {
    fn from(value: TimerId) -> Self {
        value.0
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerState {
    /// Not counting and not waiting for dispatch
    Idle,
    /// Counting down in the timer list
    Armed,
    /// Expired and waiting in a scheduler queue
    Fired,
}

#[derive(Clone, Copy)]
pub(crate) struct Countdown {
    remaining: Duration,
    reload: Duration,
}

impl Countdown {
    const ZERO: Duration = Duration::from_ticks(0);

    const fn new() -> Self {
        Self {
            remaining: Self::ZERO,
            reload: Self::ZERO,
        }
    }
}

impl<M: RawMutex, K: Copy, const N: usize> Scheduler<M, K, N> {
    /// Binds a new timer to the task value. The timer starts idle.
    pub fn create_timer(&self, task: K) -> Result<TimerId, Exhausted> {
        self.allocate(task, Some(Countdown::new())).map(TimerId)
    }

    fn with_countdown<T>(
        &self,
        timer: TimerId,
        f: impl FnOnce(&mut crate::event::Inner<K, N>, &mut Countdown) -> T,
    ) -> T {
        self.with_inner(|inner| {
            let node = inner.check(timer.0);
            let mut countdown = unwrap!(inner.slots[node.index()].countdown);
            let res = f(inner, &mut countdown);
            inner.slots[node.index()].countdown = Some(countdown);
            res
        })
    }

    /// Arms the timer to fire after `period`.
    ///
    /// A period shorter than the tick granularity could expire anywhere within the next
    /// tick, so such a request leaves the timer untouched. Starting an armed timer
    /// replaces its period.
    pub fn start(&self, timer: TimerId, period: Duration) {
        if period < self.granularity {
            warn!(
                "timer {} period {} us below tick granularity, not armed",
                timer.0.into_u8(),
                period.as_micros()
            );
            return;
        }
        self.with_countdown(timer, |inner, countdown| {
            countdown.remaining = period;
            countdown.reload = period;
            let _ = inner.queues.push_back(TIMER_LIST, timer.0.0);
        })
    }

    /// Disarms the timer.
    ///
    /// A timer that already fired stays in its scheduler queue and will still run.
    pub fn stop(&self, timer: TimerId) {
        self.with_inner(|inner| {
            let node = inner.check(timer.0);
            if inner.queues.contains(TIMER_LIST, node) {
                inner.queues.remove(node);
            }
        })
    }

    /// Re-arms the timer with the period of its last start.
    ///
    /// Has no effect on a timer that was never started.
    pub fn restart(&self, timer: TimerId) {
        self.with_countdown(timer, |inner, countdown| {
            if countdown.reload == Countdown::ZERO {
                return;
            }
            countdown.remaining = countdown.reload;
            let _ = inner.queues.push_back(TIMER_LIST, timer.0.0);
        })
    }

    pub fn timer_state(&self, timer: TimerId) -> TimerState {
        self.with_inner(|inner| {
            let node = inner.check(timer.0);
            match inner.queues.queue_of(node) {
                None => TimerState::Idle,
                Some(TIMER_LIST) => TimerState::Armed,
                Some(_) => TimerState::Fired,
            }
        })
    }

    /// Time left until the timer fires, zero once it has fired
    pub fn remaining(&self, timer: TimerId) -> Duration {
        self.with_countdown(timer, |_, countdown| countdown.remaining)
    }

    /// Monotonic time base, advanced by one granule per handled tick
    pub fn now(&self) -> Instant {
        self.with_inner(|inner| inner.now)
    }

    pub fn granularity(&self) -> Duration {
        self.granularity
    }

    /// Ticks dropped because the previous tick was still waiting for dispatch
    pub fn missed_ticks(&self) -> u32 {
        self.with_inner(|inner| inner.missed_ticks)
    }

    /// Time base handler
    ///
    /// Normally dispatched from the interrupt queue after [`TickSource`] posts the tick
    /// event. The list walk runs in one critical section, so a timer stopped or started
    /// from an interrupt is seen either before or after the whole tick. The lock is held
    /// for O(armed timers).
    pub fn on_tick(&self) {
        let granularity = self.granularity;
        self.with_inner(|inner| {
            inner.now += granularity;
            let mut cursor = inner.queues.front(TIMER_LIST);
            while let Some(node) = cursor {
                cursor = inner.queues.next(node);
                let countdown = unwrap!(inner.slots[node.index()].countdown.as_mut());
                if countdown.remaining <= granularity {
                    countdown.remaining = Countdown::ZERO;
                    inner.queues.remove(node);
                    let _ = inner.queues.push_back(NORMAL_QUEUE, node);
                } else {
                    countdown.remaining -= granularity;
                }
            }
        })
    }

    /// Interrupt source for the hardware tick
    pub fn tick_source(&self) -> TickSource<'_, M, K, N> {
        TickSource(self)
    }
}

/// Posts the tick event from the hardware tick interrupt.
pub struct TickSource<'a, M: RawMutex, K, const N: usize>(&'a Scheduler<M, K, N>);

impl<M: RawMutex, K: Copy, const N: usize> InterruptSource for TickSource<'_, M, K, N> {
    fn on_event(&self) {
        let scheduler = self.0;
        if scheduler.post_from_interrupt(scheduler.tick).is_err() {
            scheduler.with_inner(|inner| inner.missed_ticks += 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicUsize, Ordering};
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use heapless::Vec;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Task {
        Blink,
        Sample,
    }

    const G: Duration = Duration::from_micros(100);

    type TestScheduler = Scheduler<NoopRawMutex, Task, 8>;

    fn fired(scheduler: &TestScheduler) -> Vec<Task, 8> {
        let mut tasks = Vec::new();
        scheduler.run_once(&mut |_, task| tasks.push(task).unwrap());
        tasks
    }

    #[test]
    fn test_fires_after_exact_tick_count() {
        for k in 1..6u32 {
            let scheduler = TestScheduler::with_granularity(G);
            let timer = scheduler.create_timer(Task::Blink).unwrap();
            scheduler.start(timer, G * k);

            for _ in 0..k - 1 {
                scheduler.on_tick();
                assert_eq!(scheduler.timer_state(timer), TimerState::Armed);
            }
            scheduler.on_tick();
            assert_eq!(scheduler.timer_state(timer), TimerState::Fired);
            assert_eq!(scheduler.remaining(timer), Duration::from_ticks(0));
            assert_eq!(&fired(&scheduler)[..], &[Task::Blink]);
            assert_eq!(scheduler.timer_state(timer), TimerState::Idle);
        }
    }

    static LOCKS: AtomicUsize = AtomicUsize::new(0);

    /// Counts critical sections entered on the scheduler state
    struct CountingRawMutex;

    unsafe impl RawMutex for CountingRawMutex {
        const INIT: Self = CountingRawMutex;

        fn lock<R>(&self, f: impl FnOnce() -> R) -> R {
            LOCKS.fetch_add(1, Ordering::SeqCst);
            f()
        }
    }

    #[test]
    fn test_tick_walk_is_one_critical_section() {
        let scheduler = Scheduler::<CountingRawMutex, Task, 8>::with_granularity(G);
        for period in [G * 5, G, G * 2] {
            let timer = scheduler.create_timer(Task::Sample).unwrap();
            scheduler.start(timer, period);
        }

        let before = LOCKS.load(Ordering::SeqCst);
        scheduler.on_tick();
        assert_eq!(LOCKS.load(Ordering::SeqCst) - before, 1);
    }

    #[test]
    fn test_stopped_timer_leaves_others_on_schedule() {
        let scheduler = TestScheduler::with_granularity(G);
        let slow = scheduler.create_timer(Task::Blink).unwrap();
        let stopped = scheduler.create_timer(Task::Sample).unwrap();
        let due = scheduler.create_timer(Task::Sample).unwrap();
        scheduler.start(slow, G * 5);
        scheduler.start(stopped, G);
        scheduler.start(due, G * 2);

        scheduler.stop(stopped);
        scheduler.on_tick();
        assert!(fired(&scheduler).is_empty());
        assert_eq!(scheduler.remaining(due), G);
        assert_eq!(scheduler.remaining(slow), G * 4);

        scheduler.on_tick();
        assert_eq!(scheduler.timer_state(due), TimerState::Fired);
        assert_eq!(scheduler.timer_state(stopped), TimerState::Idle);
        assert_eq!(&fired(&scheduler)[..], &[Task::Sample]);
        assert_eq!(scheduler.timer_state(slow), TimerState::Armed);
    }

    #[test]
    fn test_partial_granule_rounds_up_to_tick() {
        let scheduler = TestScheduler::with_granularity(G);
        let timer = scheduler.create_timer(Task::Blink).unwrap();
        scheduler.start(timer, Duration::from_micros(250));

        scheduler.on_tick();
        scheduler.on_tick();
        assert_eq!(scheduler.remaining(timer), Duration::from_micros(50));
        scheduler.on_tick();
        assert_eq!(scheduler.timer_state(timer), TimerState::Fired);
    }

    #[test]
    fn test_period_below_granularity_is_ignored() {
        let scheduler = TestScheduler::with_granularity(G);
        let timer = scheduler.create_timer(Task::Blink).unwrap();
        scheduler.start(timer, Duration::from_micros(99));

        assert_eq!(scheduler.timer_state(timer), TimerState::Idle);
        scheduler.on_tick();
        assert!(fired(&scheduler).is_empty());
    }

    #[test]
    fn test_stop_disarms() {
        let scheduler = TestScheduler::with_granularity(G);
        let timer = scheduler.create_timer(Task::Blink).unwrap();
        scheduler.start(timer, G * 2);
        scheduler.on_tick();
        scheduler.stop(timer);
        assert_eq!(scheduler.timer_state(timer), TimerState::Idle);

        for _ in 0..4 {
            scheduler.on_tick();
        }
        assert!(fired(&scheduler).is_empty());
    }

    #[test]
    fn test_stop_after_fire_does_not_recall() {
        let scheduler = TestScheduler::with_granularity(G);
        let timer = scheduler.create_timer(Task::Blink).unwrap();
        scheduler.start(timer, G);
        scheduler.on_tick();
        scheduler.stop(timer);

        assert_eq!(scheduler.timer_state(timer), TimerState::Fired);
        assert_eq!(&fired(&scheduler)[..], &[Task::Blink]);
    }

    #[test]
    fn test_restart_from_handler_makes_periodic_timer() {
        let scheduler = TestScheduler::with_granularity(G);
        let timer = scheduler.create_timer(Task::Blink).unwrap();
        scheduler.start(timer, G * 3);

        let mut runs = 0;
        for _ in 0..12 {
            scheduler.on_tick();
            scheduler.run_once(&mut |_, _| {
                runs += 1;
                scheduler.restart(timer);
            });
        }
        assert_eq!(runs, 4);
    }

    #[test]
    fn test_restart_without_start_is_ignored() {
        let scheduler = TestScheduler::with_granularity(G);
        let timer = scheduler.create_timer(Task::Blink).unwrap();
        scheduler.restart(timer);
        assert_eq!(scheduler.timer_state(timer), TimerState::Idle);
    }

    #[test]
    fn test_timers_fire_independently() {
        let scheduler = TestScheduler::with_granularity(G);
        let slow = scheduler.create_timer(Task::Sample).unwrap();
        let fast = scheduler.create_timer(Task::Blink).unwrap();
        scheduler.start(slow, G * 3);
        scheduler.start(fast, G);

        scheduler.on_tick();
        assert_eq!(&fired(&scheduler)[..], &[Task::Blink]);
        scheduler.on_tick();
        assert!(fired(&scheduler).is_empty());
        scheduler.on_tick();
        assert_eq!(&fired(&scheduler)[..], &[Task::Sample]);
    }

    #[test]
    fn test_tick_source_drives_time_base() {
        let scheduler = TestScheduler::with_granularity(G);
        let timer = scheduler.create_timer(Task::Sample).unwrap();
        scheduler.start(timer, G * 2);
        let source = scheduler.tick_source();

        source.on_event();
        source.on_event();
        assert_eq!(scheduler.missed_ticks(), 1);
        assert!(fired(&scheduler).is_empty());
        assert_eq!(scheduler.now(), Instant::from_ticks(0) + G);

        source.on_event();
        assert_eq!(&fired(&scheduler)[..], &[Task::Sample]);
        assert_eq!(scheduler.now(), Instant::from_ticks(0) + G * 2);
    }
}
