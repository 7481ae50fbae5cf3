//! Interrupt-side step scheduling.
//!
//! [`MotionShared`] is the only state the step interrupt touches. It holds the
//! executing move, the move promoted to follow it, the drive-movement arena
//! their steps are counted in, the completion queue and the telemetry
//! counters. Everything sits behind `critical_section` mutexes so that it can
//! be placed in a `static` and shared between the interrupt and the
//! cooperative context.

use core::cell::{Cell, RefCell};

use critical_section::{CriticalSection, Mutex};
use heapless::{Deque, Vec};

use super::dda::ExecutingMove;
use super::drive_movement::DmPool;
use crate::motor::StepOutput;
use crate::{MAX_DRIVES, NUM_DMS};

/// Completed moves waiting to be retired.
const FINISHED_DEPTH: usize = 4;

/// Hardware timer that paces step generation.
pub trait StepClock {
    /// Current step-clock time in ticks.
    fn now(&self) -> u32;

    /// Arm the timer to fire at `due`.
    fn schedule(&mut self, due: u32);
}

/// True if `due` is not later than `now`, with wrap-around.
#[inline]
pub fn is_due(now: u32, due: u32) -> bool {
    (now.wrapping_sub(due) as i32) >= 0
}

/// Counting signal posted by the interrupt and consumed by the cooperative side.
pub struct StepSignal {
    count: Mutex<Cell<u32>>,
}

impl StepSignal {
    /// New signal with no pending posts.
    pub const fn new() -> Self {
        Self {
            count: Mutex::new(Cell::new(0)),
        }
    }

    fn post_in(&self, cs: CriticalSection<'_>) {
        let count = self.count.borrow(cs);
        count.set(count.get().saturating_add(1));
    }

    /// Post the signal.
    pub fn post(&self) {
        critical_section::with(|cs| self.post_in(cs));
    }

    /// Take every pending post. Returns how many there were.
    pub fn take(&self) -> u32 {
        critical_section::with(|cs| self.count.borrow(cs).replace(0))
    }
}

impl Default for StepSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// A move the interrupt finished.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FinishedMove {
    /// Ring slot of the descriptor.
    pub slot: usize,
    /// Admission sequence number.
    pub id: u32,
    /// Step-clock time the move ended.
    pub end_time: u32,
    /// Signed steps dropped by a driver stop.
    pub dropped: [i32; MAX_DRIVES],
}

/// Scheduler state guarded by the critical section.
#[derive(Debug)]
pub(crate) struct StepScheduler<const N: usize> {
    pub(crate) current: Option<ExecutingMove>,
    pub(crate) next: Option<ExecutingMove>,
    pub(crate) pool: DmPool<N>,
    pub(crate) finished: Deque<FinishedMove, FINISHED_DEPTH>,
    pub(crate) last_end: Option<u32>,
    max_steps: u16,
}

impl<const N: usize> StepScheduler<N> {
    const fn new() -> Self {
        Self {
            current: None,
            next: None,
            pool: DmPool::new(),
            finished: Deque::new(),
            last_end: None,
            max_steps: 32,
        }
    }

    pub(crate) fn drain_finished(&mut self) -> Vec<FinishedMove, FINISHED_DEPTH> {
        let mut out = Vec::new();
        while let Some(f) = self.finished.pop_front() {
            let _ = out.push(f);
        }
        out
    }
}

/// State shared between the step interrupt and the motion orchestrator.
///
/// `N` is the size of the drive-movement arena and must match the pool size
/// of the [`Move`](super::Move) using it.
/// ```rust,ignore
/// static MOTION: MotionShared = MotionShared::new();
///
/// #[interrupt]
/// fn TIM2() {
///     MOTION.interrupt(&mut clock, &mut pins);
/// }
/// ```
pub struct MotionShared<const N: usize = NUM_DMS> {
    scheduler: Mutex<RefCell<StepScheduler<N>>>,
    completed: Mutex<Cell<u32>>,
    hiccups: Mutex<Cell<u32>>,
    signal: StepSignal,
}

impl<const N: usize> MotionShared<N> {
    /// Create idle shared state.
    pub const fn new() -> Self {
        Self {
            scheduler: Mutex::new(RefCell::new(StepScheduler::new())),
            completed: Mutex::new(Cell::new(0)),
            hiccups: Mutex::new(Cell::new(0)),
            signal: StepSignal::new(),
        }
    }

    /// Set the step budget of one interrupt.
    pub fn configure(&self, max_steps_per_interrupt: u16) {
        self.with_scheduler(|s| s.max_steps = max_steps_per_interrupt.max(1));
    }

    /// Run `f` on the scheduler state inside a critical section.
    pub(crate) fn with_scheduler<R>(&self, f: impl FnOnce(&mut StepScheduler<N>) -> R) -> R {
        critical_section::with(|cs| f(&mut *self.scheduler.borrow_ref_mut(cs)))
    }

    /// Completion signal.
    #[inline]
    pub fn signal(&self) -> &StepSignal {
        &self.signal
    }

    /// Step-timer interrupt entry point.
    ///
    /// Emits every step that is due, up to the configured budget, continuing
    /// into the promoted follow-on move when the executing one completes, and
    /// re-arms the timer for the next due step. An interrupt that finds
    /// nothing executing or nothing due, or that runs out of budget with steps
    /// still due, counts as a hiccup.
    pub fn interrupt<K: StepClock, O: StepOutput>(&self, clock: &mut K, output: &mut O) {
        critical_section::with(|cs| {
            let mut guard = self.scheduler.borrow_ref_mut(cs);
            let sched = &mut *guard;

            if sched.current.is_none() {
                self.hiccup(cs);
                trace!("step interrupt with nothing executing");
                return;
            }

            let budget = sched.max_steps;
            let mut stepped: u16 = 0;
            let mut completed = false;
            let mut exhausted = false;

            while let Some(current) = sched.current.as_mut() {
                match current.next_due(&sched.pool) {
                    Some(due) if is_due(clock.now(), due) => {
                        if stepped >= budget {
                            exhausted = true;
                            break;
                        }
                        current.step(&mut sched.pool, output);
                        stepped += 1;
                    }
                    Some(_) => break,
                    None => {
                        let done = FinishedMove {
                            slot: current.slot(),
                            id: current.id(),
                            end_time: current.end_time(),
                            dropped: *current.dropped(),
                        };
                        sched.current = sched.next.take();
                        self.current_move_completed(cs, sched, done);
                        completed = true;
                    }
                }
            }

            if exhausted || (stepped == 0 && !completed) {
                self.hiccup(cs);
                trace!("step hiccup: {} steps, budget exhausted {}", stepped, exhausted);
            }

            if let Some(due) = sched.current.as_ref().and_then(|m| m.next_due(&sched.pool)) {
                clock.schedule(due);
            }
        });
    }

    /// Hand a finished move back to the cooperative side.
    fn current_move_completed(&self, cs: CriticalSection<'_>, sched: &mut StepScheduler<N>, done: FinishedMove) {
        if sched.finished.push_back(done).is_err() {
            error!("finished queue overflow, move #{} lost", done.id);
        }
        sched.last_end = Some(done.end_time);

        let completed = self.completed.borrow(cs);
        completed.set(completed.get().wrapping_add(1));
        self.signal.post_in(cs);
    }

    fn hiccup(&self, cs: CriticalSection<'_>) {
        let hiccups = self.hiccups.borrow(cs);
        hiccups.set(hiccups.get().saturating_add(1));
    }

    /// True while a move is executing or promoted to follow.
    pub fn is_executing(&self) -> bool {
        self.with_scheduler(|s| s.current.is_some() || s.next.is_some())
    }

    /// Moves completed by the interrupt since the last reset.
    pub fn completed_moves(&self) -> u32 {
        critical_section::with(|cs| self.completed.borrow(cs).get())
    }

    /// Hiccups since the last read, without clearing them.
    pub fn hiccups(&self) -> u32 {
        critical_section::with(|cs| self.hiccups.borrow(cs).get())
    }

    /// Read and clear the hiccup count.
    pub fn get_and_clear_hiccups(&self) -> u32 {
        critical_section::with(|cs| self.hiccups.borrow(cs).replace(0))
    }

    /// Zero the completed-move and hiccup counters.
    pub fn reset_counters(&self) {
        critical_section::with(|cs| {
            self.completed.borrow(cs).set(0);
            self.hiccups.borrow(cs).set(0);
        });
    }

    /// Ticks between the previous and next step of `drive`, shifted left by
    /// `microstep_shift`. Zero when the drive is not moving.
    pub fn step_interval(&self, drive: usize, microstep_shift: u32) -> u32 {
        let interval = self.with_scheduler(|s| s.current.as_ref().map_or(0, |m| m.step_interval(&s.pool, drive)));
        match interval.checked_shl(microstep_shift) {
            Some(shifted) if shifted >> microstep_shift == interval => shifted,
            _ => u32::MAX,
        }
    }

    /// Drop the remaining steps of the selected drives in the executing move.
    pub fn stop_drivers(&self, mask: u32) {
        self.with_scheduler(|s| {
            if let Some(current) = s.current.as_mut() {
                current.stop_drivers(&mut s.pool, mask);
            }
        });
    }
}

impl<const N: usize> Default for MotionShared<N> {
    fn default() -> Self {
        Self::new()
    }
}
