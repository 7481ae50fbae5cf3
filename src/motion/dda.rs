//! Move descriptors.
//!
//! A [`Dda`] is one planned move: per-drive step counts, the path it follows
//! and the speeds the look-ahead planner settles on. Once frozen it is turned
//! into an [`ExecutingMove`] that the step scheduler advances one step at a time.

use heapless::Vec;
use libm::{roundf, sqrtf};

use super::drive_movement::{DmAllocator, DmPool, DriveMovement};
use super::profile::{junction_speed, reachable_speed, StepTiming};
use super::waypoint::{Extrusion, MoveType, Target, Waypoint};
use crate::config::MachineConfig;
use crate::error::{MotionError, PlanningViolation};
use crate::kinematics::{mm_to_steps, AnyKinematics, Kinematics};
use crate::motor::StepOutput;
use crate::{EXTRUDER_DRIVE, MAX_DRIVES, NUM_AXES};

/// Lifecycle of a ring slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DdaState {
    /// Free slot.
    #[default]
    Empty,
    /// Admitted; speeds may still change.
    Provisional,
    /// Speeds and step timing fixed.
    Frozen,
    /// Handed to the step scheduler.
    Executing,
    /// Last step emitted, waiting to be retired.
    Completed,
}

/// Machine position in both coordinate systems.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Position {
    /// Cartesian coordinates in millimetres.
    pub coords: [f32; NUM_AXES],
    /// Absolute motor positions in microsteps.
    pub motor: [i32; MAX_DRIVES],
    /// Commanded filament position of the first extruder in millimetres.
    pub extruder_mm: f32,
}

/// One planned move.
#[derive(Debug, Clone, Default)]
pub struct Dda {
    state: DdaState,
    id: u32,
    move_type: MoveType,
    steps: [i32; MAX_DRIVES],
    start: Position,
    end: Position,
    unit: [f32; NUM_AXES],
    length: f32,
    requested_speed: f32,
    accel: f32,
    decel: f32,
    junction_limit: f32,
    pub(crate) entry_bound: f32,
    pub(crate) entry_speed: f32,
    pub(crate) exit_speed: f32,
    extrusion: Option<Extrusion>,
    extrusion_ratio: f32,
    pa_offset_end: f32,
    pa_steps: i32,
    reserve_extruder: bool,
    dms: Vec<(u8, u16), MAX_DRIVES>,
    timing: Option<StepTiming>,
}

impl Dda {
    /// Plan a waypoint starting from `start`.
    ///
    /// `previous` is the most recently admitted descriptor, used for the
    /// cornering limit. The result is provisional with zero entry and exit
    /// speeds until the look-ahead pass runs.
    ///
    /// # Errors
    ///
    /// - [`MotionError::KinematicsUnreachable`] if the target is not finite,
    ///   lies outside a rejecting soft limit or cannot be reached by the geometry
    /// - [`MotionError::PlanningViolation`] if no velocity profile exists
    pub fn init(
        waypoint: &Waypoint,
        previous: Option<&Dda>,
        kinematics: &AnyKinematics,
        machine: &MachineConfig,
        start: &Position,
    ) -> Result<Self, MotionError> {
        if !waypoint.feed_rate.is_valid() {
            return Err(PlanningViolation::InvalidFeedRate.into());
        }
        let feed_rate = waypoint.feed_rate.value();

        let steps_per_mm = machine.steps_per_mm();
        let num_drives = machine.num_drives();
        let raw = waypoint.is_raw_motor();
        let mut end = *start;

        match waypoint.target {
            Target::Cartesian(mut coords) if !raw => {
                for (axis, c) in coords.iter_mut().enumerate() {
                    if !c.is_finite() {
                        return Err(MotionError::KinematicsUnreachable { axis });
                    }
                    if let Some(limits) = machine.axis_limits(axis) {
                        *c = limits
                            .apply(*c)
                            .ok_or(MotionError::KinematicsUnreachable { axis })?;
                    }
                }
                let motor = kinematics.cartesian_to_motor_steps(&coords, &steps_per_mm)?;
                end.motor[..NUM_AXES].copy_from_slice(&motor);
                end.coords = coords;
            }
            Target::Cartesian(positions) => {
                for (axis, &mm) in positions.iter().enumerate() {
                    end.motor[axis] = mm_to_steps(mm, steps_per_mm[axis], axis)?;
                }
                end.coords = kinematics.motor_steps_to_cartesian(&axis_motors(&end.motor), &steps_per_mm);
            }
            Target::Motor(target) => {
                for (drive, &t) in target.iter().enumerate() {
                    if drive >= num_drives && t != start.motor[drive] {
                        return Err(PlanningViolation::TooManyDrives.into());
                    }
                }
                end.motor = target;
                end.coords = kinematics.motor_steps_to_cartesian(&axis_motors(&end.motor), &steps_per_mm);
                if num_drives > EXTRUDER_DRIVE {
                    end.extruder_mm = target[EXTRUDER_DRIVE] as f32 / steps_per_mm[EXTRUDER_DRIVE];
                }
            }
        }

        let extrusion = waypoint.extrusion.filter(|e| e.amount != 0.0);
        if let Some(e) = extrusion {
            if !(e.amount.is_finite() && e.pressure_advance.is_finite()) {
                return Err(MotionError::KinematicsUnreachable { axis: EXTRUDER_DRIVE });
            }
            if num_drives <= EXTRUDER_DRIVE {
                return Err(PlanningViolation::TooManyDrives.into());
            }
            end.extruder_mm += e.amount;
            end.motor[EXTRUDER_DRIVE] = mm_to_steps(
                end.extruder_mm,
                steps_per_mm[EXTRUDER_DRIVE],
                EXTRUDER_DRIVE,
            )?;
        }

        let mut steps = [0i32; MAX_DRIVES];
        for (drive, s) in steps.iter_mut().enumerate() {
            *s = end.motor[drive]
                .checked_sub(start.motor[drive])
                .ok_or(MotionError::KinematicsUnreachable { axis: drive })?;
        }
        if steps.iter().all(|&s| s == 0) {
            return Err(PlanningViolation::NullMove.into());
        }

        let motor_length = || {
            let mut sum = 0.0;
            for drive in 0..num_drives {
                let mm = steps[drive] as f32 / steps_per_mm[drive];
                sum += mm * mm;
            }
            sqrtf(sum)
        };

        let mut unit = [0.0; NUM_AXES];
        let length = if raw {
            motor_length()
        } else {
            let mut sum = 0.0;
            for axis in 0..NUM_AXES {
                let d = end.coords[axis] - start.coords[axis];
                unit[axis] = d;
                sum += d * d;
            }
            let path = sqrtf(sum);
            if path > 0.0 {
                for u in unit.iter_mut() {
                    *u /= path;
                }
                path
            } else if let Some(e) = extrusion {
                // Extrude-only move.
                unit = [0.0; NUM_AXES];
                libm::fabsf(e.amount)
            } else {
                motor_length()
            }
        };
        if !(length.is_finite() && length > 0.0) {
            return Err(PlanningViolation::NullMove.into());
        }

        // Each drive covers its share of the path; cap speed and acceleration
        // so that no drive exceeds its own limits.
        let mut requested_speed = feed_rate;
        let mut accel = f32::INFINITY;
        for (drive, config) in machine.drives.iter().enumerate() {
            if steps[drive] == 0 {
                continue;
            }
            let share = libm::fabsf(steps[drive] as f32 / steps_per_mm[drive]) / length;
            requested_speed = requested_speed.min(config.max_speed.path_limit(share));
            accel = accel.min(config.max_acceleration.path_limit(share));
        }
        if !(accel.is_finite() && accel > 0.0) {
            return Err(PlanningViolation::NoAcceleration.into());
        }

        let move_type = if raw {
            MoveType::RawMotor
        } else {
            MoveType::Coordinated
        };

        let junction_limit = match previous {
            Some(prev)
                if move_type == MoveType::Coordinated
                    && prev.move_type == MoveType::Coordinated
                    && has_direction(&prev.unit)
                    && has_direction(&unit) =>
            {
                junction_speed(&prev.unit, &unit, accel, machine.planner.junction_deviation.value())
                    .min(requested_speed)
                    .min(prev.requested_speed)
            }
            _ => 0.0,
        };

        Ok(Self {
            state: DdaState::Provisional,
            id: 0,
            move_type,
            steps,
            start: *start,
            end,
            unit,
            length,
            requested_speed,
            accel,
            decel: accel,
            junction_limit,
            entry_bound: 0.0,
            entry_speed: 0.0,
            exit_speed: 0.0,
            extrusion,
            extrusion_ratio: extrusion.map_or(0.0, |e| e.amount / length),
            pa_offset_end: 0.0,
            pa_steps: 0,
            reserve_extruder: false,
            dms: Vec::new(),
            timing: None,
        })
    }

    /// Current state.
    #[inline]
    pub fn state(&self) -> DdaState {
        self.state
    }

    /// Admission sequence number.
    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Net steps per drive, sign gives direction.
    #[inline]
    pub fn steps(&self) -> &[i32; MAX_DRIVES] {
        &self.steps
    }

    /// Position at the start of the move.
    #[inline]
    pub fn start_position(&self) -> &Position {
        &self.start
    }

    /// Position at the end of the move.
    #[inline]
    pub fn end_position(&self) -> &Position {
        &self.end
    }

    /// Path length in millimetres.
    #[inline]
    pub fn length(&self) -> f32 {
        self.length
    }

    /// Requested speed after drive limits.
    #[inline]
    pub fn requested_speed(&self) -> f32 {
        self.requested_speed
    }

    /// Acceleration magnitude after drive limits.
    #[inline]
    pub fn acceleration(&self) -> f32 {
        self.accel
    }

    /// Cornering limit with the previous move.
    #[inline]
    pub fn junction_limit(&self) -> f32 {
        self.junction_limit
    }

    /// Planned entry speed.
    #[inline]
    pub fn entry_speed(&self) -> f32 {
        self.entry_speed
    }

    /// Planned exit speed.
    #[inline]
    pub fn exit_speed(&self) -> f32 {
        self.exit_speed
    }

    /// Cruise speed, known once frozen.
    pub fn cruise_speed(&self) -> Option<f32> {
        self.timing.map(|t| t.cruise)
    }

    /// Step timing, known once frozen.
    #[inline]
    pub fn timing(&self) -> Option<&StepTiming> {
        self.timing.as_ref()
    }

    /// True for raw motor moves.
    #[inline]
    pub fn is_raw_motor(&self) -> bool {
        self.move_type == MoveType::RawMotor
    }

    /// True if the move drives the extruder.
    #[inline]
    pub fn is_extruding(&self) -> bool {
        self.extrusion.is_some()
    }

    /// Extruder steps added by pressure advance at freeze.
    #[inline]
    pub fn pressure_advance_steps(&self) -> i32 {
        self.pa_steps
    }

    /// Highest entry speed that still allows reaching `exit` by the end.
    pub(crate) fn max_entry(&self, exit: f32) -> f32 {
        self.junction_limit
            .min(self.requested_speed)
            .min(reachable_speed(exit, self.decel, self.length))
    }

    /// Entry speed this move would accept with no successor constraint.
    pub(crate) fn max_entry_unconstrained(&self) -> f32 {
        self.junction_limit.min(self.requested_speed)
    }

    /// Highest exit speed reachable from the planned entry speed.
    pub(crate) fn max_exit(&self) -> f32 {
        reachable_speed(self.entry_speed, self.accel, self.length)
    }

    /// Drives that need a drive-movement record, in drive order.
    fn dm_drives(&self) -> impl Iterator<Item = usize> + '_ {
        let extruder = self.extrusion.is_some() || self.reserve_extruder;
        (0..MAX_DRIVES).filter(move |&d| self.steps[d] != 0 || (extruder && d == EXTRUDER_DRIVE))
    }

    /// Number of drive-movement records this move needs.
    pub(crate) fn required_dms(&self) -> usize {
        self.dm_drives().count()
    }

    /// Keep an extruder record even if the move does not extrude, so that a
    /// pressure-advance offset left by the previous move can be taken back.
    pub(crate) fn reserve_extruder(&mut self) {
        self.reserve_extruder = true;
    }

    fn owns_record(&self, drive: usize) -> bool {
        self.dms.iter().any(|&(d, _)| d as usize == drive)
    }

    /// Take record indices and mark the move admitted.
    ///
    /// The caller has checked that enough indices are free.
    pub(crate) fn admit<const N: usize>(&mut self, id: u32, free: &mut DmAllocator<N>) {
        self.id = id;
        let mut dms = Vec::new();
        for drive in self.dm_drives() {
            if let Some(index) = free.alloc() {
                let _ = dms.push((drive as u8, index));
            }
        }
        self.dms = dms;
    }

    /// Give the record indices back.
    pub(crate) fn release<const N: usize>(&mut self, free: &mut DmAllocator<N>) {
        for &(_, index) in self.dms.iter() {
            free.release(index);
        }
        self.dms.clear();
    }

    /// Fix the speeds and compute the step timing.
    ///
    /// `pressure` carries the pressure-advance offset in millimetres of
    /// filament from one frozen move to the next. An extruding move sets it
    /// to what its own exit speed calls for. A move without extrusion takes
    /// it back to zero when it owns an extruder record and passes it on
    /// unchanged otherwise.
    pub(crate) fn freeze(
        &mut self,
        pressure: &mut f32,
        next_extrudes: bool,
        extruder_steps_per_mm: f32,
        step_clock_hz: u32,
    ) {
        let timing = StepTiming::new(
            self.length,
            self.entry_speed,
            self.requested_speed,
            self.exit_speed,
            self.accel,
            self.decel,
            step_clock_hz,
        );

        self.pa_offset_end = match self.extrusion {
            Some(e) if next_extrudes && e.pressure_advance > 0.0 => {
                e.pressure_advance * self.exit_speed * self.extrusion_ratio
            }
            Some(_) => 0.0,
            None if self.owns_record(EXTRUDER_DRIVE) => 0.0,
            None => *pressure,
        };
        self.pa_steps = roundf(self.pa_offset_end * extruder_steps_per_mm) as i32
            - roundf(*pressure * extruder_steps_per_mm) as i32;
        self.steps[EXTRUDER_DRIVE] += self.pa_steps;
        *pressure = self.pa_offset_end;

        trace!(
            "freeze #{}: entry {} cruise {} exit {}",
            self.id,
            self.entry_speed,
            timing.cruise,
            self.exit_speed
        );
        self.timing = Some(timing);
        self.state = DdaState::Frozen;
    }

    /// Build the records of the move, first step due after `start_time`.
    ///
    /// The slot counts as executing from here on; the records reach the
    /// arena when the step scheduler takes the move with
    /// [`PreparedMove::load`].
    pub(crate) fn start(&mut self, slot: usize, start_time: u32) -> Option<PreparedMove> {
        if self.state != DdaState::Frozen {
            return None;
        }
        let timing = self.timing?;

        let mut records = Vec::new();
        let mut dms = Vec::new();
        for &(drive, index) in self.dms.iter() {
            let mut dm = DriveMovement::new(drive, self.steps[drive as usize]);
            if dm.is_pending() {
                dm.start(&timing, start_time);
                let _ = records.push((index, dm));
                let _ = dms.push(index);
            }
        }

        self.state = DdaState::Executing;
        Some(PreparedMove {
            exec: ExecutingMove {
                slot,
                id: self.id,
                start_time,
                end_time: start_time.wrapping_add(timing.duration_ticks()),
                timing,
                dms,
                dropped: [0; MAX_DRIVES],
            },
            records,
        })
    }

    /// Undo [`start`](Self::start) for a move the step scheduler did not take.
    pub(crate) fn withdraw(&mut self) {
        if self.state == DdaState::Executing {
            self.state = DdaState::Frozen;
        }
    }

    /// Mark the last step emitted.
    pub(crate) fn complete(&mut self) {
        if self.state == DdaState::Executing {
            self.state = DdaState::Completed;
        }
    }

    /// Pressure-advance offset left at the end of the move.
    pub(crate) fn pressure_offset_end(&self) -> f32 {
        self.pa_offset_end
    }

    /// Shift stored motor positions by steps that were never emitted.
    pub(crate) fn shift_motor(&mut self, dropped: &[i32; MAX_DRIVES]) {
        for drive in 0..MAX_DRIVES {
            self.start.motor[drive] -= dropped[drive];
            self.end.motor[drive] -= dropped[drive];
        }
    }

    /// Recompute stored Cartesian coordinates from motor positions.
    pub(crate) fn resync_coords(&mut self, kinematics: &AnyKinematics, steps_per_mm: &[f32; MAX_DRIVES]) {
        self.start.coords = kinematics.motor_steps_to_cartesian(&axis_motors(&self.start.motor), steps_per_mm);
        self.end.coords = kinematics.motor_steps_to_cartesian(&axis_motors(&self.end.motor), steps_per_mm);
    }
}

/// Motor positions of the geometry drives.
pub(crate) fn axis_motors(motor: &[i32; MAX_DRIVES]) -> [i32; NUM_AXES] {
    core::array::from_fn(|axis| motor[axis])
}

fn has_direction(unit: &[f32; NUM_AXES]) -> bool {
    unit.iter().any(|&u| u != 0.0)
}

/// A started move whose records are not yet in the arena.
#[derive(Debug, Clone)]
pub struct PreparedMove {
    exec: ExecutingMove,
    records: Vec<(u16, DriveMovement), MAX_DRIVES>,
}

impl PreparedMove {
    /// Ring slot of the descriptor.
    #[inline]
    pub fn slot(&self) -> usize {
        self.exec.slot
    }

    /// Admission sequence number.
    #[inline]
    pub fn id(&self) -> u32 {
        self.exec.id
    }

    /// Step-clock time the move ends.
    #[inline]
    pub fn end_time(&self) -> u32 {
        self.exec.end_time
    }

    /// Due time of the first step across all drives.
    pub fn first_due(&self) -> Option<u32> {
        let start = self.exec.start_time;
        self.records
            .iter()
            .map(|(_, dm)| dm)
            .filter(|dm| dm.is_pending())
            .min_by_key(|dm| dm.next_due.wrapping_sub(start))
            .map(|dm| dm.next_due)
    }

    /// Copy the records into `pool` and hand over the executing move.
    pub fn load<const N: usize>(self, pool: &mut DmPool<N>) -> ExecutingMove {
        for (index, record) in self.records {
            if let Some(dm) = pool.get_mut(index) {
                *dm = record;
            }
        }
        self.exec
    }
}

/// A move owned by the step scheduler.
///
/// Holds arena indices only; the per-drive state lives in the [`DmPool`]
/// passed to each call.
#[derive(Debug, Clone)]
pub struct ExecutingMove {
    slot: usize,
    id: u32,
    start_time: u32,
    end_time: u32,
    timing: StepTiming,
    dms: Vec<u16, MAX_DRIVES>,
    dropped: [i32; MAX_DRIVES],
}

impl ExecutingMove {
    /// Ring slot of the descriptor.
    #[inline]
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Admission sequence number.
    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Step-clock time the move started.
    #[inline]
    pub fn start_time(&self) -> u32 {
        self.start_time
    }

    /// Step-clock time the move ends.
    #[inline]
    pub fn end_time(&self) -> u32 {
        self.end_time
    }

    /// Arena indices of the drives that step in this move.
    #[inline]
    pub fn records(&self) -> &[u16] {
        &self.dms
    }

    fn drives<'a, const N: usize>(
        &'a self,
        pool: &'a DmPool<N>,
    ) -> impl Iterator<Item = (u16, &'a DriveMovement)> + 'a {
        self.dms
            .iter()
            .filter_map(move |&index| pool.get(index).map(|dm| (index, dm)))
    }

    /// True once no drive has steps left.
    pub fn is_finished<const N: usize>(&self, pool: &DmPool<N>) -> bool {
        !self.drives(pool).any(|(_, dm)| dm.is_pending())
    }

    /// Arena index and due time of the pending drive stepping first.
    fn earliest<const N: usize>(&self, pool: &DmPool<N>) -> Option<(u16, u32)> {
        let start = self.start_time;
        self.drives(pool)
            .filter(|(_, dm)| dm.is_pending())
            .min_by_key(|(_, dm)| dm.next_due.wrapping_sub(start))
            .map(|(index, dm)| (index, dm.next_due))
    }

    /// Due time of the next step across all drives.
    pub fn next_due<const N: usize>(&self, pool: &DmPool<N>) -> Option<u32> {
        self.earliest(pool).map(|(_, due)| due)
    }

    /// Emit the earliest due step. Returns whether steps remain.
    pub fn step<const N: usize, O: StepOutput>(&mut self, pool: &mut DmPool<N>, output: &mut O) -> bool {
        let Some((index, _)) = self.earliest(pool) else {
            return false;
        };
        if let Some(dm) = pool.get_mut(index) {
            if dm.steps_done == 0 {
                output.set_direction(dm.drive as usize, dm.direction.is_forward());
            }
            output.step(dm.drive as usize);
            dm.advance(&self.timing, self.start_time);
        }
        !self.is_finished(pool)
    }

    /// Ticks between the previous and next step of `drive`, 0 when idle.
    pub fn step_interval<const N: usize>(&self, pool: &DmPool<N>, drive: usize) -> u32 {
        self.drives(pool)
            .find(|(_, dm)| dm.drive as usize == drive && dm.is_pending())
            .map_or(0, |(_, dm)| dm.step_interval)
    }

    /// Drop the remaining steps of every drive whose bit is set in `mask`.
    pub fn stop_drivers<const N: usize>(&mut self, pool: &mut DmPool<N>, mask: u32) {
        for &index in self.dms.iter() {
            if let Some(dm) = pool.get_mut(index) {
                if mask & (1 << dm.drive) != 0 && dm.is_pending() {
                    self.dropped[dm.drive as usize] += dm.stop();
                }
            }
        }
    }

    /// Signed steps emitted so far per drive.
    pub fn emitted<const N: usize>(&self, pool: &DmPool<N>) -> [i32; MAX_DRIVES] {
        let mut out = [0; MAX_DRIVES];
        for (_, dm) in self.drives(pool) {
            out[dm.drive as usize] = dm.emitted();
        }
        out
    }

    /// Signed steps dropped by [`stop_drivers`](Self::stop_drivers).
    #[inline]
    pub fn dropped(&self) -> &[i32; MAX_DRIVES] {
        &self.dropped
    }
}
