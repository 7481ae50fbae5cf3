//! Integration tests for stepper-dda.
//!
//! These tests drive the whole pipeline on a simulated step clock: TOML
//! parsing, admission, look-ahead, promotion, the step interrupt and
//! retirement.

use std::cell::Cell;

use heapless::Deque;
use stepper_dda::config::units::MmPerSec;
use stepper_dda::motion::{is_due, DdaState, FlushMode};
use stepper_dda::{
    parse_config, KinematicsConfig, MachineConfig, MotionError, MotionShared, Move, StepClock,
    StepOutput, Waypoint, MAX_DRIVES,
};

// =============================================================================
// Simulation harness
// =============================================================================

const MACHINE: &str = r#"
[kinematics]
kind = "cartesian"

[planner]
step_clock_hz = 1000000
junction_deviation_mm = 0.05
max_steps_per_interrupt = 32
start_lead_us = 2000

[[drives]]
name = "x"
full_steps_per_mm = 5.0
microsteps = 16
max_speed_mm_per_sec = 300.0
max_acceleration_mm_per_sec2 = 1000.0

[[drives]]
name = "y"
full_steps_per_mm = 5.0
microsteps = 16
max_speed_mm_per_sec = 300.0
max_acceleration_mm_per_sec2 = 1000.0

[[drives]]
name = "z"
full_steps_per_mm = 5.0
microsteps = 16
max_speed_mm_per_sec = 300.0
max_acceleration_mm_per_sec2 = 1000.0

[[drives]]
name = "e"
full_steps_per_mm = 5.0
microsteps = 16
max_speed_mm_per_sec = 300.0
max_acceleration_mm_per_sec2 = 1000.0
"#;

fn machine() -> MachineConfig {
    parse_config(MACHINE).expect("machine config")
}

#[derive(Default)]
struct SimClock {
    now: u32,
    armed: Option<u32>,
}

impl StepClock for SimClock {
    fn now(&self) -> u32 {
        self.now
    }

    fn schedule(&mut self, due: u32) {
        self.armed = Some(due);
    }
}

#[derive(Default)]
struct Recorder {
    now: u32,
    forward: [bool; MAX_DRIVES],
    position: [i32; MAX_DRIVES],
    last_step: u32,
}

impl StepOutput for Recorder {
    fn set_direction(&mut self, drive: usize, forward: bool) {
        self.forward[drive] = forward;
    }

    fn step(&mut self, drive: usize) {
        self.position[drive] += if self.forward[drive] { 1 } else { -1 };
        self.last_step = self.now;
    }
}

#[derive(Default)]
struct Sim {
    clock: SimClock,
    out: Recorder,
    queue: Deque<Waypoint, 32>,
}

impl Sim {
    fn fire<const N: usize>(&mut self, shared: &MotionShared<N>, due: u32) {
        if !is_due(self.clock.now, due) {
            self.clock.now = due;
        }
        self.out.now = self.clock.now;
        shared.interrupt(&mut self.clock, &mut self.out);
    }

    /// Alternate cooperative passes and interrupts until nothing is left.
    fn run_until_idle<const C: usize, const N: usize>(
        &mut self,
        motion: &mut Move<'_, C, N>,
        shared: &MotionShared<N>,
    ) {
        for _ in 0..200_000 {
            motion.spin(&mut self.queue, &mut self.clock);
            if let Some(due) = self.clock.armed.take() {
                self.fire(shared, due);
            } else if self.queue.is_empty() && motion.all_moves_finished() {
                return;
            } else {
                self.clock.now = self.clock.now.wrapping_add(1000);
            }
        }
        panic!("simulation did not settle");
    }

    /// Run `count` interrupts, with a cooperative pass before each.
    fn run_interrupts<const C: usize, const N: usize>(
        &mut self,
        motion: &mut Move<'_, C, N>,
        shared: &MotionShared<N>,
        count: usize,
    ) {
        for _ in 0..count {
            motion.spin(&mut self.queue, &mut self.clock);
            if let Some(due) = self.clock.armed.take() {
                self.fire(shared, due);
            }
        }
    }
}

fn x_move(x: f32) -> Waypoint {
    Waypoint::linear([x, 0.0, 0.0], MmPerSec(50.0))
}

// =============================================================================
// Admission and backpressure
// =============================================================================

#[test]
fn test_full_ring_rejects_without_change() {
    let shared = MotionShared::new();
    let mut motion: Move<'_, 4, 24> = Move::new(machine(), &shared).unwrap();

    for i in 1..=4 {
        motion.enqueue(&x_move(i as f32 * 10.0)).unwrap();
    }
    let cursors = motion.ring().cursors();
    let position = *motion.position();

    assert_eq!(motion.enqueue(&x_move(50.0)), Err(MotionError::BackpressureFull));
    assert_eq!(motion.ring().cursors(), cursors);
    assert_eq!(*motion.position(), position);
    assert_eq!(motion.scheduled_moves(), 4);
}

#[test]
fn test_pool_exhaustion_is_backpressure() {
    let shared = MotionShared::new();
    let mut motion: Move<'_, 8, 4> = Move::new(machine(), &shared).unwrap();

    // Diagonal moves need a record for X and one for Y.
    motion.enqueue(&Waypoint::linear([10.0, 10.0, 0.0], MmPerSec(50.0))).unwrap();
    motion.enqueue(&Waypoint::linear([20.0, 20.0, 0.0], MmPerSec(50.0))).unwrap();

    let cursors = motion.ring().cursors();
    assert_eq!(
        motion.enqueue(&Waypoint::linear([30.0, 20.0, 0.0], MmPerSec(50.0))),
        Err(MotionError::BackpressureFull)
    );
    assert_eq!(motion.ring().cursors(), cursors);
    assert_eq!(motion.ring().len(), 2);
    assert_eq!(motion.ring().records_available(), 0);
}

#[test]
fn test_spin_stops_draining_on_backpressure() {
    let shared = MotionShared::new();
    let mut motion: Move<'_, 2, 12> = Move::new(machine(), &shared).unwrap();
    let mut sim = Sim::default();

    for i in 1..=4 {
        sim.queue.push_back(x_move(i as f32 * 10.0)).unwrap();
    }
    motion.spin(&mut sim.queue, &mut sim.clock);

    assert_eq!(motion.ring().len(), 2);
    assert_eq!(sim.queue.len(), 2);
}

#[test]
fn test_spin_rejects_unplannable_waypoints() {
    let shared = MotionShared::new();
    let mut motion: Move<'_, 4, 24> = Move::new(machine(), &shared).unwrap();
    let mut sim = Sim::default();

    sim.queue.push_back(Waypoint::linear([f32::NAN, 0.0, 0.0], MmPerSec(50.0))).unwrap();
    sim.queue.push_back(x_move(10.0)).unwrap();
    motion.spin(&mut sim.queue, &mut sim.clock);

    assert!(sim.queue.is_empty());
    assert_eq!(motion.scheduled_moves(), 1);
}

// =============================================================================
// Look-ahead
// =============================================================================

#[test]
fn test_collinear_moves_keep_speed_through_junctions() {
    let shared = MotionShared::new();
    let mut motion: Move<'_, 8, 48> = Move::new(machine(), &shared).unwrap();

    for x in [10.0, 20.0, 30.0] {
        motion.enqueue(&x_move(x)).unwrap();
    }

    let middle = motion.ring().iter().nth(1).unwrap();
    assert_eq!(middle.junction_limit(), 50.0);
    assert_eq!(middle.entry_speed(), 50.0);
    assert_eq!(middle.exit_speed(), 50.0);
    assert_eq!(middle.state(), DdaState::Frozen);
}

// =============================================================================
// Execution
// =============================================================================

#[test]
fn test_isolated_move_matches_trapezoid() {
    let shared = MotionShared::new();
    let mut motion: Move = Move::new(machine(), &shared).unwrap();
    let mut sim = Sim::default();

    // 20 mm at 50 mm/s and 1000 mm/s²: 0.05 s ramps, 0.35 s cruise.
    sim.queue.push_back(x_move(20.0)).unwrap();
    sim.run_until_idle(&mut motion, &shared);

    assert_eq!(sim.out.position[..3], [1600, 0, 0]);

    // Started one start lead after the first pass at t = 0.
    let duration = sim.out.last_step - 2000;
    assert!((duration as i64 - 450_000).abs() <= 1, "duration {}", duration);

    assert_eq!(motion.completed_moves(), 1);
    assert_eq!(motion.get_and_clear_hiccups(), 0);
    assert_eq!(
        format!("{}", motion.diagnostics()),
        "Moves scheduled 1, completed 1, hiccups 0"
    );
}

#[test]
fn test_square_path_returns_home() {
    let shared = MotionShared::new();
    let mut motion: Move = Move::new(machine(), &shared).unwrap();
    let mut sim = Sim::default();

    for corner in [[10.0, 0.0, 0.0], [10.0, 10.0, 0.0], [0.0, 10.0, 0.0], [0.0, 0.0, 0.0]] {
        sim.queue.push_back(Waypoint::linear(corner, MmPerSec(50.0))).unwrap();
    }
    sim.run_until_idle(&mut motion, &shared);

    assert_eq!(sim.out.position, [0; MAX_DRIVES]);
    assert_eq!(motion.live_position(), [0.0, 0.0, 0.0]);
    assert_eq!(motion.completed_moves(), 4);
    assert!(motion.no_live_movement());
}

#[test]
fn test_step_budget_exhaustion_counts_hiccups() {
    let mut config = machine();
    config.planner.max_steps_per_interrupt = 1;
    let shared = MotionShared::new();
    let mut motion: Move = Move::new(config, &shared).unwrap();
    let mut sim = Sim::default();

    // X and Y step on the same ticks.
    sim.queue.push_back(Waypoint::linear([5.0, 5.0, 0.0], MmPerSec(50.0))).unwrap();
    sim.run_until_idle(&mut motion, &shared);

    assert_eq!(sim.out.position[..2], [400, 400]);
    assert!(motion.get_and_clear_hiccups() > 0);
}

#[test]
fn test_raw_motor_move() {
    let shared = MotionShared::new();
    let mut motion: Move = Move::new(machine(), &shared).unwrap();
    let mut sim = Sim::default();

    let mut target = [0; MAX_DRIVES];
    target[0] = 800;
    sim.queue.push_back(Waypoint::raw_motor(target, MmPerSec(50.0))).unwrap();
    sim.run_until_idle(&mut motion, &shared);

    assert_eq!(sim.out.position[0], 800);
    assert_eq!(motion.live_position(), [10.0, 0.0, 0.0]);
}

#[test]
fn test_extrusion_drives_extruder() {
    let shared = MotionShared::new();
    let mut motion: Move = Move::new(machine(), &shared).unwrap();
    let mut sim = Sim::default();

    sim.queue
        .push_back(x_move(10.0).with_extrusion(0.5, 0.0))
        .unwrap();
    sim.run_until_idle(&mut motion, &shared);

    assert_eq!(sim.out.position[3], 40);
    assert_eq!(motion.position().extruder_mm, 0.5);
}

#[test]
fn test_core_xy_mixes_drives() {
    let shared = MotionShared::new();
    let mut motion: Move = Move::new(machine(), &shared).unwrap();
    let mut sim = Sim::default();

    motion.set_kinematics(KinematicsConfig::core_xy()).unwrap();
    sim.queue.push_back(x_move(10.0)).unwrap();
    sim.queue.push_back(Waypoint::linear([10.0, 10.0, 0.0], MmPerSec(50.0))).unwrap();
    sim.run_until_idle(&mut motion, &shared);

    // A = X + Y, B = X - Y
    assert_eq!(sim.out.position[..2], [1600, 0]);
    assert_eq!(motion.live_position(), [10.0, 10.0, 0.0]);
}

#[test]
fn test_stop_drivers_corrects_position() {
    let shared = MotionShared::new();
    let mut motion: Move = Move::new(machine(), &shared).unwrap();
    let mut sim = Sim::default();

    sim.queue.push_back(Waypoint::linear([10.0, 10.0, 0.0], MmPerSec(50.0))).unwrap();
    sim.run_interrupts(&mut motion, &shared, 20);
    motion.stop_drivers(0b01);
    sim.run_until_idle(&mut motion, &shared);

    let x = sim.out.position[0];
    assert!(x > 0 && x < 800, "x = {}", x);
    assert_eq!(sim.out.position[1], 800);
    assert_eq!(motion.position().motor[0], x);
    assert!((motion.live_position()[0] - x as f32 / 80.0).abs() < 1e-4);
    assert_eq!(motion.live_position()[1], 10.0);
}

// =============================================================================
// Flush and live-movement checks
// =============================================================================

#[test]
fn test_abandon_flush_with_five_queued_and_one_executing() {
    let shared = MotionShared::new();
    let mut motion: Move<'_, 8, 48> = Move::new(machine(), &shared).unwrap();
    let mut sim = Sim::default();

    // One move runs to its end before the flush.
    sim.queue.push_back(x_move(5.0)).unwrap();
    sim.run_until_idle(&mut motion, &shared);
    assert_eq!(motion.completed_moves(), 1);

    for i in 1..=6 {
        motion.enqueue(&x_move(5.0 + i as f32 * 10.0)).unwrap();
    }
    sim.run_interrupts(&mut motion, &shared, 20);
    assert!(shared.is_executing());
    assert_eq!(motion.ring().len(), 6);

    motion.flush(FlushMode::Abandon);
    assert!(motion.ring().is_empty());
    assert!(!shared.is_executing());
    assert!(motion.no_live_movement());
    // Only the move that fully finished counts.
    assert_eq!(motion.completed_moves(), 1);

    // The tracked position is where the steps stopped.
    let x = sim.out.position[0];
    assert!(x > 400 && x < 1200, "x = {}", x);
    assert_eq!(motion.position().motor[0], x);

    // Motion resumes from there.
    sim.queue.push_back(x_move(20.0)).unwrap();
    sim.run_until_idle(&mut motion, &shared);
    assert_eq!(sim.out.position[0], 1600);
    assert_eq!(motion.completed_moves(), 2);
}

#[test]
fn test_planned_flush_finishes_executing_move() {
    let shared = MotionShared::new();
    let mut motion: Move<'_, 8, 48> = Move::new(machine(), &shared).unwrap();
    let mut sim = Sim::default();

    for i in 1..=6 {
        motion.enqueue(&x_move(i as f32 * 10.0)).unwrap();
    }
    sim.run_interrupts(&mut motion, &shared, 20);

    motion.flush(FlushMode::Planned);
    assert_eq!(motion.ring().len(), 1);
    assert_eq!(motion.live_position(), [10.0, 0.0, 0.0]);

    sim.run_until_idle(&mut motion, &shared);
    assert_eq!(sim.out.position[0], 800);
    assert_eq!(motion.completed_moves(), 1);
}

#[test]
fn test_planned_flush_takes_back_pressure_advance() {
    let shared = MotionShared::new();
    let mut motion: Move<'_, 8, 48> = Move::new(machine(), &shared).unwrap();
    let mut sim = Sim::default();

    for i in 1..=4 {
        motion
            .enqueue(&x_move(i as f32 * 10.0).with_extrusion(1.0, 0.05))
            .unwrap();
    }
    sim.run_interrupts(&mut motion, &shared, 5);
    motion.flush(FlushMode::Planned);
    sim.run_until_idle(&mut motion, &shared);

    // The kept move ended with the extruder ahead by its pressure offset.
    assert_eq!(motion.position().motor[3], 80);
    assert_eq!(sim.out.position[3], 100);

    // A travel move takes the offset back.
    sim.queue.push_back(x_move(0.0)).unwrap();
    sim.run_until_idle(&mut motion, &shared);
    assert_eq!(sim.out.position[3], motion.position().motor[3]);
    assert_eq!(sim.out.position[0], 0);
}

#[test]
fn test_no_live_movement_reads_ring_first() {
    let shared = MotionShared::new();
    let mut motion: Move = Move::new(machine(), &shared).unwrap();
    let mut sim = Sim::default();
    let executing_between = Cell::new(None);

    assert!(motion.no_live_movement());

    motion.enqueue(&x_move(1.0)).unwrap();
    motion.spin(&mut sim.queue, &mut sim.clock);
    assert!(shared.is_executing());

    // The interrupt finishes the move after the ring read and before the
    // interrupt read. The ring still holds it, so movement is live.
    let live = !motion.no_live_movement_with(|| {
        executing_between.set(Some(shared.is_executing()));
        while let Some(due) = sim.clock.armed.take() {
            sim.fire(&shared, due);
        }
    });
    assert!(live);
    assert_eq!(executing_between.get(), Some(true));
    assert!(!shared.is_executing());
    assert_eq!(sim.out.position[0], 80);
    assert_eq!(motion.completed_moves(), 1);

    // Retiring empties the ring; only then is there no live movement.
    assert!(!motion.no_live_movement());
    assert!(motion.all_moves_finished());
    assert!(motion.no_live_movement());
}

#[test]
fn test_emergency_stop_then_set_kinematics() {
    let shared = MotionShared::new();
    let mut motion: Move = Move::new(machine(), &shared).unwrap();
    let mut sim = Sim::default();

    sim.queue.push_back(x_move(10.0)).unwrap();
    sim.run_interrupts(&mut motion, &shared, 5);
    assert!(motion.set_kinematics(KinematicsConfig::core_xy()).is_err());

    motion.emergency_stop();
    motion.set_kinematics(KinematicsConfig::core_xy()).unwrap();
    assert_eq!(motion.config().kinematics, KinematicsConfig::core_xy());
}

#[test]
fn test_reset_move_counters() {
    let shared = MotionShared::new();
    let mut motion: Move = Move::new(machine(), &shared).unwrap();
    let mut sim = Sim::default();

    sim.queue.push_back(x_move(1.0)).unwrap();
    sim.run_until_idle(&mut motion, &shared);
    assert_eq!(motion.scheduled_moves(), 1);

    motion.reset_move_counters();
    assert_eq!(motion.scheduled_moves(), 0);
    assert_eq!(motion.completed_moves(), 0);
}
