//! Motion module for stepper-dda.
//!
//! Provides velocity planning, the look-ahead ring and step scheduling.

mod dda;
mod drive_movement;
mod orchestrator;
mod profile;
mod ring;
mod scheduler;
mod waypoint;

pub use dda::{Dda, DdaState, ExecutingMove, Position, PreparedMove};
pub use drive_movement::{DmAllocator, DmPool, DriveMovement};
pub use orchestrator::{Diagnostics, FlushMode, Move};
pub use profile::{junction_speed, peak_speed, reachable_speed, Direction, StepTiming};
pub use ring::MoveRing;
pub use scheduler::{is_due, FinishedMove, MotionShared, StepClock, StepSignal};
pub use waypoint::{Extrusion, MoveType, Target, Waypoint, WaypointSource};
