//! Per-drive step timing records, the arena that holds them and the
//! allocator that hands out arena indices.
//!
//! The arena ([`DmPool`]) lives in the interrupt-shared state and is only
//! touched inside a critical section. The allocator ([`DmAllocator`]) belongs
//! to the look-ahead ring on the cooperative side, so admitting and retiring
//! moves never has to mask interrupts.

use heapless::Vec;

use super::profile::{Direction, StepTiming};

/// Step timing state of one drive within one move.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DriveMovement {
    /// Drive index.
    pub drive: u8,
    /// Steps this drive makes in the move.
    pub total_steps: u32,
    /// Steps already emitted.
    pub steps_done: u32,
    /// Direction of travel.
    pub direction: Direction,
    /// Absolute step-clock time of the next step.
    pub next_due: u32,
    /// Ticks between the previous and the next step.
    pub step_interval: u32,
}

impl DriveMovement {
    /// A record with nothing to do.
    pub const IDLE: Self = Self {
        drive: 0,
        total_steps: 0,
        steps_done: 0,
        direction: Direction::Forward,
        next_due: 0,
        step_interval: 0,
    };

    /// Record for `net_steps` on `drive`.
    pub fn new(drive: u8, net_steps: i32) -> Self {
        Self {
            drive,
            total_steps: net_steps.unsigned_abs(),
            direction: Direction::from_steps(net_steps),
            ..Self::IDLE
        }
    }

    /// True while steps remain.
    #[inline]
    pub fn is_pending(&self) -> bool {
        self.steps_done < self.total_steps
    }

    /// Steps not yet emitted.
    #[inline]
    pub fn remaining(&self) -> u32 {
        self.total_steps - self.steps_done
    }

    /// Signed steps emitted so far.
    #[inline]
    pub fn emitted(&self) -> i32 {
        self.steps_done as i32 * self.direction.sign()
    }

    /// Compute the due time of the first step for a move starting at `start_time`.
    pub fn start(&mut self, timing: &StepTiming, start_time: u32) {
        self.steps_done = 0;
        if self.is_pending() {
            let offset = timing.step_ticks(1, self.total_steps);
            self.next_due = start_time.wrapping_add(offset);
            self.step_interval = offset;
        } else {
            self.next_due = start_time;
            self.step_interval = 0;
        }
    }

    /// Account for one emitted step and compute the next due time.
    ///
    /// Returns whether this drive still has steps pending.
    pub fn advance(&mut self, timing: &StepTiming, start_time: u32) -> bool {
        self.steps_done += 1;
        if !self.is_pending() {
            self.step_interval = 0;
            return false;
        }
        let due = start_time.wrapping_add(timing.step_ticks(self.steps_done + 1, self.total_steps));
        self.step_interval = due.wrapping_sub(self.next_due);
        self.next_due = due;
        true
    }

    /// Drop the remaining steps. Returns the signed number dropped.
    pub fn stop(&mut self) -> i32 {
        let dropped = self.remaining() as i32 * self.direction.sign();
        self.total_steps = self.steps_done;
        self.step_interval = 0;
        dropped
    }
}

impl Default for DriveMovement {
    fn default() -> Self {
        Self::IDLE
    }
}

/// Fixed arena of [`DriveMovement`] records addressed by index.
///
/// The step interrupt advances the records of the executing move in place.
#[derive(Debug)]
pub struct DmPool<const N: usize> {
    records: [DriveMovement; N],
}

impl<const N: usize> DmPool<N> {
    /// Create an arena of idle records.
    pub const fn new() -> Self {
        Self {
            records: [DriveMovement::IDLE; N],
        }
    }

    /// Total number of records.
    #[inline]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Read a record.
    #[inline]
    pub fn get(&self, index: u16) -> Option<&DriveMovement> {
        self.records.get(index as usize)
    }

    /// Write a record.
    #[inline]
    pub fn get_mut(&mut self, index: u16) -> Option<&mut DriveMovement> {
        self.records.get_mut(index as usize)
    }
}

impl<const N: usize> Default for DmPool<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Free list over the indices of a [`DmPool`] of the same size.
#[derive(Debug)]
pub struct DmAllocator<const N: usize> {
    free: Vec<u16, N>,
}

impl<const N: usize> DmAllocator<N> {
    /// Create an allocator with every index free.
    pub fn new() -> Self {
        let mut free = Vec::new();
        // Pop order hands out low indices first.
        for index in (0..N).rev() {
            let _ = free.push(index as u16);
        }
        Self { free }
    }

    /// Indices currently free.
    #[inline]
    pub fn available(&self) -> usize {
        self.free.len()
    }

    /// Indices currently handed out.
    #[inline]
    pub fn in_use(&self) -> usize {
        N - self.free.len()
    }

    /// Take a free index.
    pub fn alloc(&mut self) -> Option<u16> {
        self.free.pop()
    }

    /// Return an index. Out-of-range and already free indices are ignored.
    pub fn release(&mut self, index: u16) {
        if (index as usize) < N && !self.free.contains(&index) {
            let _ = self.free.push(index);
        }
    }
}

impl<const N: usize> Default for DmAllocator<N> {
    fn default() -> Self {
        Self::new()
    }
}
