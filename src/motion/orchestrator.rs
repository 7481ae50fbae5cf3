//! Motion orchestration.
//!
//! [`Move`] owns the look-ahead ring and the kinematics and runs in the
//! cooperative context. It admits waypoints, promotes frozen descriptors to
//! the step interrupt, retires completed ones and handles flushes and
//! geometry changes.

use core::fmt;

use heapless::Vec;

use super::dda::{axis_motors, Dda, ExecutingMove, Position, PreparedMove};
use super::ring::MoveRing;
use super::scheduler::{is_due, FinishedMove, MotionShared, StepClock, StepScheduler};
use super::waypoint::{Waypoint, WaypointSource};
use crate::config::{validate_config, KinematicsConfig, MachineConfig};
use crate::error::{ConfigError, MotionError, Result};
use crate::kinematics::{AnyKinematics, Kinematics};
use crate::{DDA_RING_LENGTH, EXTRUDER_DRIVE, MAX_DRIVES, NUM_AXES, NUM_DMS};

/// What a flush discards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlushMode {
    /// Discard queued moves; the executing move runs to its end.
    Planned,
    /// Also abandon the executing move where it is.
    Abandon,
}

/// Snapshot of the scheduling counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Diagnostics {
    /// Moves admitted since the last reset.
    pub scheduled_moves: u32,
    /// Moves the interrupt completed since the last reset.
    pub completed_moves: u32,
    /// Step timing hiccups since they were last cleared.
    pub hiccups: u32,
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Moves scheduled {}, completed {}, hiccups {}",
            self.scheduled_moves, self.completed_moves, self.hiccups
        )
    }
}

/// Motion orchestrator.
///
/// `C` is the ring capacity and `N` the drive-movement pool size.
pub struct Move<'s, const C: usize = DDA_RING_LENGTH, const N: usize = NUM_DMS> {
    ring: MoveRing<C, N>,
    kinematics: AnyKinematics,
    config: MachineConfig,
    steps_per_mm: [f32; MAX_DRIVES],
    shared: &'s MotionShared<N>,
    scheduled_moves: u32,
}

impl<'s, const C: usize, const N: usize> Move<'s, C, N> {
    /// Build an orchestrator for a validated machine.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` fails validation.
    pub fn new(config: MachineConfig, shared: &'s MotionShared<N>) -> Result<Self> {
        validate_config(&config)?;
        let kinematics = AnyKinematics::from_config(&config.kinematics)?;
        let steps_per_mm = config.steps_per_mm();
        shared.configure(config.planner.max_steps_per_interrupt);

        info!(
            "motion: {} kinematics, {} drives, ring {}",
            kinematics.name(),
            config.num_drives(),
            C
        );

        Ok(Self {
            ring: MoveRing::new(config.planner.step_clock_hz, steps_per_mm[EXTRUDER_DRIVE]),
            kinematics,
            config,
            steps_per_mm,
            shared,
            scheduled_moves: 0,
        })
    }

    /// Machine configuration.
    #[inline]
    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    /// Active geometry.
    #[inline]
    pub fn kinematics(&self) -> &AnyKinematics {
        &self.kinematics
    }

    /// Look-ahead ring.
    #[inline]
    pub fn ring(&self) -> &MoveRing<C, N> {
        &self.ring
    }

    /// Admit a waypoint.
    ///
    /// # Errors
    ///
    /// - [`MotionError::BackpressureFull`] if the ring or pool is full; retry later
    /// - [`MotionError::KinematicsUnreachable`] or
    ///   [`MotionError::PlanningViolation`] if the waypoint can never be executed
    pub fn enqueue(&mut self, waypoint: &Waypoint) -> core::result::Result<(), MotionError> {
        if self.ring.is_full() {
            return Err(MotionError::BackpressureFull);
        }

        let dda = Dda::init(
            waypoint,
            self.ring.last_admitted(),
            &self.kinematics,
            &self.config,
            self.ring.position(),
        )?;
        let slot = self.ring.add(dda)?;
        self.scheduled_moves = self.scheduled_moves.wrapping_add(1);
        debug!("queued move in slot {}", slot);
        Ok(())
    }

    /// One cooperative pass.
    ///
    /// Retires moves the interrupt finished, drains `source` until it is empty
    /// or the ring pushes back, and promotes frozen moves to the interrupt.
    pub fn spin<S: WaypointSource, K: StepClock>(&mut self, source: &mut S, clock: &mut K) {
        self.collect_finished();

        while let Some(waypoint) = source.peek().copied() {
            match self.enqueue(&waypoint) {
                Ok(()) => source.accept(),
                Err(MotionError::BackpressureFull) => break,
                Err(e) => source.reject(e),
            }
        }

        self.promote(clock);
    }

    fn collect_finished(&mut self) {
        if self.shared.signal().take() == 0 {
            return;
        }
        let finished = self.shared.with_scheduler(|s| s.drain_finished());
        self.retire(&finished);
    }

    fn retire(&mut self, finished: &[FinishedMove]) {
        let mut resync = false;
        for f in finished {
            resync |= self.ring.complete(f.slot, &f.dropped);
        }
        if resync {
            self.ring.resync_coords(&self.kinematics, &self.steps_per_mm);
        }
        let retired = self.ring.retire();
        if retired > 0 {
            trace!("retired {} moves", retired);
        }
    }

    /// Hand frozen moves to the interrupt.
    ///
    /// An idle interrupt gets the oldest frozen move, started after the end of
    /// the previous move or after the start lead, whichever is later, freezing
    /// the oldest provisional move if nothing is frozen yet. While a move
    /// executes, a frozen successor is promoted to follow it at once; the
    /// oldest provisional move is only forced into that place when the
    /// executing move is within two start leads of its end.
    ///
    /// Planning and record setup run with interrupts enabled. The critical
    /// sections only take a snapshot of the scheduler and install the result.
    fn promote<K: StepClock>(&mut self, clock: &mut K) {
        let now = clock.now();
        let lead = self.config.planner.start_lead_ticks();

        let (idle, last_end, mut follow) = self.shared.with_scheduler(|s| {
            let follow = match (&s.current, &s.next) {
                (Some(current), None) => Some(current.end_time()),
                _ => None,
            };
            (s.current.is_none(), s.last_end, follow)
        });

        if idle {
            let earliest = now.wrapping_add(lead);
            let start = match last_end {
                Some(end) if !is_due(earliest, end) => end,
                _ => earliest,
            };
            if let Some(prepared) = ready(&mut self.ring).and_then(|slot| self.ring.start(slot, start)) {
                debug!("start #{} at {}", prepared.id(), start);
                let first_due = prepared.first_due().unwrap_or(start);
                let end = prepared.end_time();
                if self.install(prepared, |s| s.current.is_none()) {
                    clock.schedule(first_due);
                    follow = Some(end);
                }
            }
        }

        if let Some(end) = follow {
            let starved = (end.wrapping_sub(now) as i32) <= 2 * (lead as i32);
            let slot = match self.ring.next_ready() {
                Some(slot) => Some(slot),
                None if starved => ready(&mut self.ring),
                None => None,
            };
            if let Some(prepared) = slot.and_then(|slot| self.ring.start(slot, end)) {
                let id = prepared.id();
                // The interrupt may have finished the executing move meanwhile.
                if self.install(prepared, |s| {
                    s.next.is_none() && s.current.as_ref().map(ExecutingMove::end_time) == Some(end)
                }) {
                    trace!("#{} follows at {}", id, end);
                }
            }
        }
    }

    /// Install `prepared` as the executing move if the interrupt has none,
    /// or as its successor otherwise, provided `still_free` holds. A move the
    /// scheduler does not take goes back to frozen in the ring.
    fn install(&mut self, prepared: PreparedMove, still_free: impl FnOnce(&StepScheduler<N>) -> bool) -> bool {
        let slot = prepared.slot();
        let installed = self.shared.with_scheduler(|s| {
            if !still_free(&*s) {
                return false;
            }
            let exec = prepared.load(&mut s.pool);
            if s.current.is_none() {
                s.last_end = None;
                s.current = Some(exec);
            } else {
                s.next = Some(exec);
            }
            true
        });
        if !installed {
            debug!("slot {} not taken by the scheduler", slot);
            self.ring.withdraw(slot);
        }
        installed
    }

    /// Discard queued work.
    pub fn flush(&mut self, mode: FlushMode) {
        let (finished, kept, abandoned) = self.shared.with_scheduler(|s| {
            let finished = s.drain_finished();
            s.next = None;
            match mode {
                FlushMode::Planned => (finished, s.current.as_ref().map(ExecutingMove::slot), None),
                FlushMode::Abandon => {
                    s.last_end = None;
                    let abandoned = s.current.take().map(|exec| (exec.slot(), exec.emitted(&s.pool)));
                    (finished, None, abandoned)
                }
            }
        });
        self.retire(&finished);

        let position = abandoned.map(|(slot, emitted)| self.position_after(slot, &emitted));
        self.ring.flush(kept);
        if let Some(position) = position {
            self.ring.set_position(position);
        }
        info!("flush {}: {} moves kept", mode, self.ring.len());
    }

    /// Where the machine stands after the move in `slot` is cut off with
    /// `emitted` steps done.
    fn position_after(&self, slot: usize, emitted: &[i32; MAX_DRIVES]) -> Position {
        let mut position = *self.ring.slot(slot).start_position();
        for drive in 0..MAX_DRIVES {
            position.motor[drive] += emitted[drive];
        }
        position.coords = self
            .kinematics
            .motor_steps_to_cartesian(&axis_motors(&position.motor), &self.steps_per_mm);
        if self.config.num_drives() > EXTRUDER_DRIVE {
            position.extruder_mm += emitted[EXTRUDER_DRIVE] as f32 / self.steps_per_mm[EXTRUDER_DRIVE];
        }
        position
    }

    /// Abandon all motion at once.
    pub fn emergency_stop(&mut self) {
        warn!("emergency stop");
        self.flush(FlushMode::Abandon);
    }

    /// Drop the remaining steps of the selected drives in the executing move.
    ///
    /// Bit `n` of `mask` selects drive `n`. The tracked position is corrected
    /// when the move is retired.
    pub fn stop_drivers(&mut self, mask: u32) {
        debug!("stop drivers {:x}", mask);
        self.shared.stop_drivers(mask);
    }

    /// True if nothing is queued and nothing executes.
    ///
    /// Reads the ring before the interrupt state.
    pub fn no_live_movement(&self) -> bool {
        self.no_live_movement_with(|| ())
    }

    /// [`no_live_movement`](Self::no_live_movement) with `between` run after
    /// the ring has been read and before the interrupt state is.
    #[doc(hidden)]
    pub fn no_live_movement_with<F: FnOnce()>(&self, between: F) -> bool {
        let ring_empty = self.ring.is_empty();
        between();
        let executing = self.shared.is_executing();
        ring_empty && !executing
    }

    /// Retire finished moves, then check that nothing is left.
    pub fn all_moves_finished(&mut self) -> bool {
        self.collect_finished();
        self.no_live_movement()
    }

    /// Replace the geometry.
    ///
    /// # Errors
    ///
    /// - [`MotionError::KinematicsBusy`] while any movement is live
    /// - a configuration error if the geometry is incomplete or needs more
    ///   drives than configured
    pub fn set_kinematics(&mut self, config: KinematicsConfig) -> Result<()> {
        if !self.all_moves_finished() {
            return Err(MotionError::KinematicsBusy.into());
        }

        let kinematics = AnyKinematics::from_config(&config)?;
        let required = kinematics.required_drives();
        let configured = self.config.num_drives();
        if configured < required {
            return Err(ConfigError::TooFewDrives { required, configured }.into());
        }

        self.kinematics = kinematics;
        self.config.kinematics = config;
        self.ring.resync_coords(&self.kinematics, &self.steps_per_mm);
        info!("kinematics set to {}", self.kinematics.name());
        Ok(())
    }

    /// Moves admitted since the last counter reset.
    #[inline]
    pub fn scheduled_moves(&self) -> u32 {
        self.scheduled_moves
    }

    /// Moves the interrupt completed since the last counter reset.
    pub fn completed_moves(&self) -> u32 {
        self.shared.completed_moves()
    }

    /// Read and clear the hiccup count.
    pub fn get_and_clear_hiccups(&self) -> u32 {
        self.shared.get_and_clear_hiccups()
    }

    /// Zero the scheduled, completed and hiccup counters.
    pub fn reset_move_counters(&mut self) {
        self.scheduled_moves = 0;
        self.shared.reset_counters();
    }

    /// Snapshot of the counters. Hiccups are read without clearing.
    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics {
            scheduled_moves: self.scheduled_moves,
            completed_moves: self.shared.completed_moves(),
            hiccups: self.shared.hiccups(),
        }
    }

    /// Cartesian position at the end of the queued motion.
    pub fn live_position(&self) -> [f32; NUM_AXES] {
        self.ring.position().coords
    }

    /// Full position at the end of the queued motion.
    pub fn position(&self) -> &Position {
        self.ring.position()
    }

    /// Redefine the current Cartesian position, e.g. after homing.
    ///
    /// # Errors
    ///
    /// - [`MotionError::InvalidState`] while any movement is live
    /// - [`MotionError::KinematicsUnreachable`] if the geometry cannot reach `coords`
    pub fn set_position(&mut self, coords: [f32; NUM_AXES]) -> core::result::Result<(), MotionError> {
        if !self.all_moves_finished() {
            return Err(MotionError::InvalidState("moving"));
        }
        let motor = self.kinematics.cartesian_to_motor_steps(&coords, &self.steps_per_mm)?;
        let mut position = *self.ring.position();
        position.motor[..NUM_AXES].copy_from_slice(&motor);
        position.coords = coords;
        self.ring.set_position(position);
        Ok(())
    }

    /// Interval of `drive` in the executing move, see [`MotionShared::step_interval`].
    pub fn step_interval(&self, drive: usize, microstep_shift: u32) -> u32 {
        self.shared.step_interval(drive, microstep_shift)
    }

    /// Drives with steps in each queued move, oldest first. Mostly useful for
    /// checking the tracked state in tests.
    pub fn queued_steps(&self) -> Vec<[i32; MAX_DRIVES], C> {
        self.ring.iter().map(|dda| *dda.steps()).collect()
    }
}

/// Oldest frozen slot, freezing the oldest provisional one if none is.
fn ready<const C: usize, const N: usize>(ring: &mut MoveRing<C, N>) -> Option<usize> {
    ring.next_ready()
        .or_else(|| if ring.freeze_oldest() { ring.next_ready() } else { None })
}
