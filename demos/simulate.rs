//! Example: Run a square toolpath against a simulated step timer.
//!
//! This example demonstrates how to:
//! - Load a machine description from TOML
//! - Feed waypoints to the look-ahead ring from a cooperative loop
//! - Service the step interrupt from a (simulated) hardware timer
//! - Read back diagnostics after the queue drains
//!
//! Run with: `cargo run --example simulate --features std [machine.toml]`

use heapless::Deque;
use stepper_dda::{
    config::units::MmPerSec,
    error::Result,
    motion::is_due,
    MotionShared, Move, StepClock, StepOutput, Waypoint, MAX_DRIVES,
};

static MOTION: MotionShared = MotionShared::new();

const DEFAULT_MACHINE: &str = r#"
[kinematics]
kind = "cartesian"

[planner]
step_clock_hz = 1000000
junction_deviation_mm = 0.05
max_steps_per_interrupt = 16

[[drives]]
name = "x"
full_steps_per_mm = 5.0
microsteps = 16
max_speed_mm_per_sec = 200.0
max_acceleration_mm_per_sec2 = 1500.0

[[drives]]
name = "y"
full_steps_per_mm = 5.0
microsteps = 16
max_speed_mm_per_sec = 200.0
max_acceleration_mm_per_sec2 = 1500.0

[[drives]]
name = "z"
full_steps_per_mm = 25.0
microsteps = 16
max_speed_mm_per_sec = 10.0
max_acceleration_mm_per_sec2 = 100.0
"#;

/// Step timer that jumps straight to the next compare value.
#[derive(Default)]
struct SimTimer {
    now: u32,
    compare: Option<u32>,
}

impl StepClock for SimTimer {
    fn now(&self) -> u32 {
        self.now
    }

    fn schedule(&mut self, due: u32) {
        self.compare = Some(due);
    }
}

/// Counts pulses per drive instead of toggling pins.
#[derive(Default)]
struct PulseCounter {
    forward: [bool; MAX_DRIVES],
    position: [i32; MAX_DRIVES],
    pulses: u64,
}

impl StepOutput for PulseCounter {
    fn set_direction(&mut self, drive: usize, forward: bool) {
        self.forward[drive] = forward;
    }

    fn step(&mut self, drive: usize) {
        self.position[drive] += if self.forward[drive] { 1 } else { -1 };
        self.pulses += 1;
    }
}

fn main() -> Result<()> {
    println!("=== Look-ahead Simulation Example ===\n");

    let config = match std::env::args().nth(1) {
        Some(path) => {
            println!("Loading machine from {}", path);
            stepper_dda::load_config(path)?
        }
        None => stepper_dda::parse_config(DEFAULT_MACHINE)?,
    };
    println!("Drives: {}", config.drives.len());
    println!("Step clock: {} Hz", config.planner.step_clock_hz);

    let mut motion: Move = Move::new(config, &MOTION)?;

    // Two laps of a 40 mm square at two feed rates
    let corners = [[40.0, 0.0, 0.0], [40.0, 40.0, 0.0], [0.0, 40.0, 0.0], [0.0, 0.0, 0.0]];
    let mut queue: Deque<Waypoint, 16> = Deque::new();
    for feed in [60.0, 150.0] {
        for corner in corners {
            let _ = queue.push_back(Waypoint::linear(corner, MmPerSec(feed)));
        }
    }
    println!("Queued {} waypoints\n", queue.len());

    let mut timer = SimTimer::default();
    let mut pins = PulseCounter::default();
    let mut interrupts = 0u32;

    loop {
        motion.spin(&mut queue, &mut timer);
        match timer.compare.take() {
            Some(due) => {
                if !is_due(timer.now, due) {
                    timer.now = due;
                }
                MOTION.interrupt(&mut timer, &mut pins);
                interrupts += 1;
            }
            None if queue.is_empty() && motion.all_moves_finished() => break,
            None => timer.now = timer.now.wrapping_add(1000),
        }
    }

    let elapsed_s = timer.now as f32 / motion.config().planner.step_clock_hz as f32;
    println!("Simulated time: {:.3} s", elapsed_s);
    println!("Interrupts: {}", interrupts);
    println!("Step pulses: {}", pins.pulses);
    println!("Final motor position: {:?}", &pins.position[..3]);
    println!("Final position: {:?}", motion.position().coords);
    println!("{}", motion.diagnostics());

    println!("\n=== Simulation Complete ===");
    Ok(())
}
