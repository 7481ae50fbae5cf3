//! Look-ahead move ring.
//!
//! A fixed ring of [`Dda`] slots with three cursors:
//!
//! - `add`: next free slot
//! - `get`: oldest occupied slot
//! - `check`: oldest provisional slot, or `add` when none is provisional
//!
//! Slots between `get` and `check` are frozen or later and are never touched
//! by the planner. Slots between `check` and `add` are provisional; every
//! [`add`](MoveRing::add) re-plans them and freezes the leading ones whose
//! speeds can no longer change.

use heapless::Vec;

use super::dda::{Dda, DdaState, Position, PreparedMove};
use super::drive_movement::DmAllocator;
use super::profile::reachable_speed;
use crate::error::MotionError;
use crate::kinematics::AnyKinematics;
use crate::MAX_DRIVES;

/// Fixed-capacity look-ahead queue of move descriptors.
///
/// `C` is the number of slots, `N` the number of pooled drive-movement records.
/// The ring hands out record indices; the records themselves live in the
/// [`DmPool`](super::DmPool) of the step scheduler.
pub struct MoveRing<const C: usize, const N: usize> {
    slots: [Dda; C],
    add: usize,
    get: usize,
    check: usize,
    free: DmAllocator<N>,
    position: Position,
    settled: Position,
    pressure: f32,
    next_id: u32,
    step_clock_hz: u32,
    extruder_steps_per_mm: f32,
}

impl<const C: usize, const N: usize> MoveRing<C, N> {
    /// Create an empty ring.
    pub fn new(step_clock_hz: u32, extruder_steps_per_mm: f32) -> Self {
        Self {
            slots: core::array::from_fn(|_| Dda::default()),
            add: 0,
            get: 0,
            check: 0,
            free: DmAllocator::new(),
            position: Position::default(),
            settled: Position::default(),
            pressure: 0.0,
            next_id: 1,
            step_clock_hz,
            extruder_steps_per_mm,
        }
    }

    /// Number of slots.
    #[inline]
    pub const fn capacity(&self) -> usize {
        C
    }

    #[inline]
    fn next(index: usize) -> usize {
        if index + 1 == C {
            0
        } else {
            index + 1
        }
    }

    #[inline]
    fn prev(index: usize) -> usize {
        if index == 0 {
            C - 1
        } else {
            index - 1
        }
    }

    /// True when no slot is occupied.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.get == self.add && self.slots[self.add].state() == DdaState::Empty
    }

    /// True when every slot is occupied.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.get == self.add && self.slots[self.add].state() != DdaState::Empty
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        if self.is_full() {
            C
        } else {
            (self.add + C - self.get) % C
        }
    }

    /// Cursor positions as `(add, get, check)`.
    pub fn cursors(&self) -> (usize, usize, usize) {
        (self.add, self.get, self.check)
    }

    /// Drive-movement records in use.
    pub fn records_in_use(&self) -> usize {
        self.free.in_use()
    }

    /// Drive-movement records free.
    pub fn records_available(&self) -> usize {
        self.free.available()
    }

    /// Position at the end of the last admitted move.
    #[inline]
    pub fn position(&self) -> &Position {
        &self.position
    }

    /// Position at the end of the last retired move.
    #[inline]
    pub fn settled_position(&self) -> &Position {
        &self.settled
    }

    /// Override the tracked position. Only meaningful while the ring is empty.
    ///
    /// A pending pressure-advance offset is kept; the filament it pushed is
    /// still in the nozzle.
    pub fn set_position(&mut self, position: Position) {
        self.position = position;
        self.settled = position;
    }

    /// Descriptor in a slot.
    #[inline]
    pub fn slot(&self, index: usize) -> &Dda {
        &self.slots[index]
    }

    /// Occupied descriptors, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Dda> + '_ {
        let get = self.get;
        (0..self.len()).map(move |i| &self.slots[(get + i) % C])
    }

    /// The most recently admitted descriptor.
    pub fn last_admitted(&self) -> Option<&Dda> {
        if self.is_empty() {
            None
        } else {
            Some(&self.slots[Self::prev(self.add)])
        }
    }

    /// Append a provisional descriptor and re-plan.
    ///
    /// Returns the slot index.
    ///
    /// # Errors
    ///
    /// Returns [`MotionError::BackpressureFull`] without changing anything if
    /// the ring or the drive-movement pool is full.
    pub fn add(&mut self, mut dda: Dda) -> Result<usize, MotionError> {
        if self.pressure != 0.0 {
            dda.reserve_extruder();
        }
        if self.is_full() || dda.required_dms() > self.free.available() {
            return Err(MotionError::BackpressureFull);
        }

        dda.admit(self.next_id, &mut self.free);
        self.next_id = self.next_id.wrapping_add(1);
        self.position = *dda.end_position();

        let slot = self.add;
        self.slots[slot] = dda;
        self.add = Self::next(slot);

        self.plan();
        Ok(slot)
    }

    /// Provisional slots from `check` to the newest.
    fn provisional_run(&self) -> Vec<usize, C> {
        let mut run = Vec::new();
        let mut index = self.check;
        while run.len() < C && self.slots[index].state() == DdaState::Provisional {
            let _ = run.push(index);
            index = Self::next(index);
        }
        run
    }

    /// Exit speed of the frozen or executing move ahead of `check`.
    fn pinned_entry(&self) -> f32 {
        if self.check == self.get {
            return 0.0;
        }
        let prev = &self.slots[Self::prev(self.check)];
        match prev.state() {
            DdaState::Frozen | DdaState::Executing => prev.exit_speed(),
            _ => 0.0,
        }
    }

    /// Run the look-ahead pass over the provisional descriptors.
    ///
    /// The backward walk raises entry bounds until one is unchanged. The
    /// forward walk then applies the acceleration limit from the pinned entry
    /// speed, and leading descriptors whose exit speed cannot rise any more
    /// are frozen.
    pub fn plan(&mut self) {
        let run = self.provisional_run();
        let Some(newest) = run.len().checked_sub(1) else {
            return;
        };

        // Backward: the newest move must be able to stop.
        let mut exit = 0.0;
        for (pos, &index) in run.iter().enumerate().rev() {
            let dda = &mut self.slots[index];
            let bound = dda.max_entry(exit);
            if pos != newest && bound == dda.entry_bound {
                break;
            }
            dda.entry_bound = bound;
            exit = bound;
        }

        // Forward: acceleration limit from the pinned entry speed.
        let mut entry = self.pinned_entry();
        for (pos, &index) in run.iter().enumerate() {
            let successor_bound = match run.get(pos + 1) {
                Some(&succ) => self.slots[succ].entry_bound,
                None => 0.0,
            };
            let dda = &mut self.slots[index];
            dda.entry_speed = entry;
            dda.exit_speed = dda.max_exit().min(successor_bound);
            entry = dda.exit_speed;
        }

        // Freeze the settled prefix. The newest move always waits for a successor.
        for pos in 0..newest {
            let index = run[pos];
            let succ = &self.slots[run[pos + 1]];
            let successor_max = succ.max_entry_unconstrained();
            let next_extrudes = succ.is_extruding();

            let dda = &self.slots[index];
            let accel_limited = dda.exit_speed >= dda.max_exit();
            if !(accel_limited || dda.exit_speed >= successor_max) {
                break;
            }
            self.freeze_slot(index, next_extrudes);
        }
    }

    fn freeze_slot(&mut self, index: usize, next_extrudes: bool) {
        self.slots[index].freeze(
            &mut self.pressure,
            next_extrudes,
            self.extruder_steps_per_mm,
            self.step_clock_hz,
        );
        self.check = Self::next(index);
    }

    /// Freeze the oldest provisional descriptor with its current speeds.
    ///
    /// Used when the step scheduler would otherwise run dry. Returns whether
    /// a descriptor was frozen.
    pub fn freeze_oldest(&mut self) -> bool {
        let index = self.check;
        if self.slots[index].state() != DdaState::Provisional {
            return false;
        }
        let succ = &self.slots[Self::next(index)];
        let next_extrudes = succ.state() == DdaState::Provisional && succ.is_extruding();

        // A forced freeze must still reach its exit speed.
        let dda = &mut self.slots[index];
        dda.exit_speed = dda.exit_speed.min(reachable_speed(dda.entry_speed, dda.acceleration(), dda.length()));
        debug!("forced freeze of #{}", dda.id());
        self.freeze_slot(index, next_extrudes);
        true
    }

    /// First frozen slot behind the executing ones.
    pub fn next_ready(&self) -> Option<usize> {
        if self.is_empty() {
            return None;
        }
        let mut index = self.get;
        for _ in 0..C {
            match self.slots[index].state() {
                DdaState::Executing | DdaState::Completed => index = Self::next(index),
                DdaState::Frozen => return Some(index),
                DdaState::Provisional | DdaState::Empty => return None,
            }
        }
        None
    }

    /// Promote a frozen slot to executing.
    pub fn start(&mut self, slot: usize, start_time: u32) -> Option<PreparedMove> {
        self.slots[slot].start(slot, start_time)
    }

    /// Put a started slot back to frozen when the step scheduler did not take it.
    pub fn withdraw(&mut self, slot: usize) {
        self.slots[slot].withdraw();
    }

    /// Pressure-advance offset in millimetres left by the last frozen move.
    #[inline]
    pub fn pressure_offset(&self) -> f32 {
        self.pressure
    }

    /// Mark an executing slot completed.
    ///
    /// Steps dropped by a driver stop are taken off every tracked motor
    /// position. Returns whether any were dropped, in which case Cartesian
    /// coordinates need [`resync_coords`](Self::resync_coords).
    pub fn complete(&mut self, slot: usize, dropped: &[i32; MAX_DRIVES]) -> bool {
        self.slots[slot].complete();
        if dropped.iter().all(|&d| d == 0) {
            return false;
        }

        let get = self.get;
        for i in 0..self.len() {
            self.slots[(get + i) % C].shift_motor(dropped);
        }
        for drive in 0..MAX_DRIVES {
            self.position.motor[drive] -= dropped[drive];
        }
        true
    }

    /// Recompute Cartesian coordinates of every tracked position.
    pub fn resync_coords(&mut self, kinematics: &AnyKinematics, steps_per_mm: &[f32; MAX_DRIVES]) {
        use crate::kinematics::Kinematics;

        let get = self.get;
        for i in 0..self.len() {
            self.slots[(get + i) % C].resync_coords(kinematics, steps_per_mm);
        }
        for position in [&mut self.position, &mut self.settled] {
            position.coords = kinematics
                .motor_steps_to_cartesian(&super::dda::axis_motors(&position.motor), steps_per_mm);
        }
    }

    /// Reset completed slots at the head of the ring. Returns how many.
    pub fn retire(&mut self) -> usize {
        let mut retired = 0;
        while !self.is_empty() && self.slots[self.get].state() == DdaState::Completed {
            let slot = &mut self.slots[self.get];
            self.settled = *slot.end_position();
            slot.release(&mut self.free);
            *slot = Dda::default();
            self.get = Self::next(self.get);
            retired += 1;
        }
        retired
    }

    /// Discard every slot except `keep`.
    pub fn flush(&mut self, keep: Option<usize>) {
        for index in 0..C {
            if Some(index) != keep && self.slots[index].state() != DdaState::Empty {
                self.slots[index].release(&mut self.free);
                self.slots[index] = Dda::default();
            }
        }

        match keep {
            Some(slot) => {
                self.get = slot;
                self.add = Self::next(slot);
                self.position = *self.slots[slot].end_position();
                self.pressure = self.slots[slot].pressure_offset_end();
            }
            None => {
                self.get = 0;
                self.add = 0;
                self.position = self.settled;
                self.pressure = 0.0;
            }
        }
        self.check = self.add;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::units::{Microsteps, MmPerSec, MmPerSecSquared};
    use crate::config::{DriveConfig, KinematicsConfig, MachineConfig};
    use crate::motion::waypoint::Waypoint;
    use crate::EXTRUDER_DRIVE;

    fn machine() -> MachineConfig {
        let mut config = MachineConfig::new(KinematicsConfig::cartesian());
        for name in ["x", "y", "z"] {
            let drive = DriveConfig::new(name, 5.0, Microsteps::SIXTEENTH, MmPerSec(300.0), MmPerSecSquared(1000.0));
            config.drives.push(drive).unwrap();
        }
        config
    }

    fn push<const C: usize, const N: usize>(
        ring: &mut MoveRing<C, N>,
        config: &MachineConfig,
        coords: [f32; 3],
    ) -> Result<usize, MotionError> {
        let wp = Waypoint::linear(coords, MmPerSec(50.0));
        let dda = Dda::init(
            &wp,
            ring.last_admitted(),
            &AnyKinematics::default(),
            config,
            ring.position(),
        )?;
        ring.add(dda)
    }

    #[test]
    fn test_empty_and_full() {
        let config = machine();
        let mut ring: MoveRing<3, 18> = MoveRing::new(1_000_000, 0.0);
        assert!(ring.is_empty());

        for i in 1..=3 {
            push(&mut ring, &config, [i as f32 * 10.0, 0.0, 0.0]).unwrap();
        }
        assert!(ring.is_full());
        assert_eq!(ring.len(), 3);

        let cursors = ring.cursors();
        let in_use = ring.records_in_use();
        assert_eq!(
            push(&mut ring, &config, [40.0, 0.0, 0.0]),
            Err(MotionError::BackpressureFull)
        );
        assert_eq!(ring.cursors(), cursors);
        assert_eq!(ring.records_in_use(), in_use);
    }

    #[test]
    fn test_pool_exhaustion_is_backpressure() {
        let config = machine();
        let mut ring: MoveRing<4, 3> = MoveRing::new(1_000_000, 0.0);
        push(&mut ring, &config, [10.0, 10.0, 0.0]).unwrap();
        assert_eq!(ring.records_available(), 1);

        let cursors = ring.cursors();
        assert_eq!(
            push(&mut ring, &config, [20.0, 20.0, 0.0]),
            Err(MotionError::BackpressureFull)
        );
        assert_eq!(ring.cursors(), cursors);
        assert_eq!(ring.len(), 1);
    }

    #[test]
    fn test_collinear_moves_blend() {
        let config = machine();
        let mut ring: MoveRing<8, 48> = MoveRing::new(1_000_000, 0.0);
        for x in [10.0, 20.0, 30.0] {
            push(&mut ring, &config, [x, 0.0, 0.0]).unwrap();
        }

        let ddas: heapless::Vec<&Dda, 8> = ring.iter().collect();
        assert_eq!(ddas[0].entry_speed(), 0.0);
        assert_eq!(ddas[1].entry_speed(), 50.0);
        assert_eq!(ddas[1].exit_speed(), 50.0);
        assert_eq!(ddas[2].exit_speed(), 0.0);

        // The first two can no longer change; the newest waits for a successor.
        assert_eq!(ddas[0].state(), DdaState::Frozen);
        assert_eq!(ddas[1].state(), DdaState::Frozen);
        assert_eq!(ddas[2].state(), DdaState::Provisional);
    }

    #[test]
    fn test_reversal_stops_between_moves() {
        let config = machine();
        let mut ring: MoveRing<8, 48> = MoveRing::new(1_000_000, 0.0);
        push(&mut ring, &config, [10.0, 0.0, 0.0]).unwrap();
        push(&mut ring, &config, [0.0, 0.0, 0.0]).unwrap();

        let first = ring.iter().next().unwrap();
        assert_eq!(first.exit_speed(), 0.0);
        assert_eq!(first.state(), DdaState::Frozen);
    }

    #[test]
    fn test_plan_is_fixed_point() {
        let config = machine();
        let mut ring: MoveRing<8, 48> = MoveRing::new(1_000_000, 0.0);
        for coords in [[10.0, 0.0, 0.0], [12.0, 1.0, 0.0], [12.5, 3.0, 0.0], [13.0, 3.2, 0.0]] {
            push(&mut ring, &config, coords).unwrap();
        }

        let before: heapless::Vec<(f32, f32), 8> =
            ring.iter().map(|d| (d.entry_speed(), d.exit_speed())).collect();
        ring.plan();
        let after: heapless::Vec<(f32, f32), 8> =
            ring.iter().map(|d| (d.entry_speed(), d.exit_speed())).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_start_retire_fifo() {
        let config = machine();
        let mut ring: MoveRing<4, 24> = MoveRing::new(1_000_000, 0.0);
        push(&mut ring, &config, [10.0, 0.0, 0.0]).unwrap();
        push(&mut ring, &config, [10.0, 10.0, 0.0]).unwrap();
        // The corner froze the first move; the second waits for a successor.
        assert!(ring.freeze_oldest());
        assert!(!ring.freeze_oldest());

        let first = ring.next_ready().unwrap();
        let exec = ring.start(first, 0).unwrap();
        assert_eq!(exec.id(), 1);

        let second = ring.next_ready().unwrap();
        assert_ne!(first, second);
        let exec2 = ring.start(second, exec.end_time()).unwrap();
        assert_eq!(exec2.id(), 2);

        assert!(!ring.complete(first, &[0; MAX_DRIVES]));
        assert_eq!(ring.retire(), 1);
        assert_eq!(ring.settled_position().coords, [10.0, 0.0, 0.0]);
        ring.complete(second, &[0; MAX_DRIVES]);
        assert_eq!(ring.retire(), 1);
        assert!(ring.is_empty());
        assert_eq!(ring.records_in_use(), 0);
    }

    #[test]
    fn test_flush_keeps_executing_slot() {
        let config = machine();
        let mut ring: MoveRing<4, 24> = MoveRing::new(1_000_000, 0.0);
        for x in [10.0, 20.0, 30.0] {
            push(&mut ring, &config, [x, 0.0, 0.0]).unwrap();
        }
        let slot = ring.next_ready().unwrap();
        ring.start(slot, 0).unwrap();

        ring.flush(Some(slot));
        assert_eq!(ring.len(), 1);
        assert_eq!(ring.position().coords, [10.0, 0.0, 0.0]);
        assert_eq!(ring.slot(slot).state(), DdaState::Executing);

        ring.complete(slot, &[0; MAX_DRIVES]);
        ring.retire();
        assert!(ring.is_empty());

        ring.flush(None);
        assert!(ring.is_empty());
        assert_eq!(ring.position().coords, [10.0, 0.0, 0.0]);
    }

    #[test]
    fn test_travel_after_planned_flush_takes_back_pressure() {
        let mut config = machine();
        let extruder = DriveConfig::new("e", 5.0, Microsteps::SIXTEENTH, MmPerSec(300.0), MmPerSecSquared(1000.0));
        config.drives.push(extruder).unwrap();
        let kinematics = AnyKinematics::default();
        let mut ring: MoveRing<4, 24> = MoveRing::new(1_000_000, 80.0);

        for x in [10.0, 20.0, 30.0] {
            let wp = Waypoint::linear([x, 0.0, 0.0], MmPerSec(50.0)).with_extrusion(1.0, 0.05);
            let dda = Dda::init(&wp, ring.last_admitted(), &kinematics, &config, ring.position()).unwrap();
            ring.add(dda).unwrap();
        }
        let kept = ring.next_ready().unwrap();
        ring.start(kept, 0).unwrap();
        // 0.05 s * 50 mm/s * 0.1 = 0.25 mm of filament = 20 steps
        assert_eq!(ring.slot(kept).pressure_advance_steps(), 20);

        ring.flush(Some(kept));
        assert!((ring.pressure_offset() - 0.25).abs() < 1e-6);

        let in_use = ring.records_in_use();
        let travel = Dda::init(
            &Waypoint::linear([0.0, 0.0, 0.0], MmPerSec(50.0)),
            ring.last_admitted(),
            &kinematics,
            &config,
            ring.position(),
        )
        .unwrap();
        let slot = ring.add(travel).unwrap();
        assert_eq!(ring.records_in_use(), in_use + 2);

        assert!(ring.freeze_oldest());
        assert_eq!(ring.slot(slot).steps()[EXTRUDER_DRIVE], -20);
        assert_eq!(ring.pressure_offset(), 0.0);
    }
}
