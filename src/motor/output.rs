//! Step and direction outputs.
//!
//! Generic over embedded-hal 1.0 pin types.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use heapless::Vec;

use crate::config::MachineConfig;
use crate::MAX_DRIVES;

/// Sink for step and direction transitions, driven from the step interrupt.
pub trait StepOutput {
    /// Set the direction of `drive` before its next step.
    fn set_direction(&mut self, drive: usize, forward: bool);

    /// Emit one step pulse on `drive`.
    fn step(&mut self, drive: usize);
}

impl<T: StepOutput + ?Sized> StepOutput for &mut T {
    fn set_direction(&mut self, drive: usize, forward: bool) {
        (**self).set_direction(drive, forward);
    }

    fn step(&mut self, drive: usize) {
        (**self).step(drive);
    }
}

/// STEP/DIR pin pair of one drive.
pub struct DrivePins<STEP, DIR> {
    /// STEP pin (pulse to move one step).
    pub step: STEP,
    /// DIR pin (high = forward unless inverted).
    pub dir: DIR,
    /// Whether direction pin logic is inverted.
    pub invert_direction: bool,
}

/// [`StepOutput`] on embedded-hal output pins.
///
/// Pin errors cannot be reported from interrupt context; they are counted
/// instead and can be read with [`pin_errors`](Self::pin_errors).
pub struct PinBank<STEP, DIR, DELAY>
where
    STEP: OutputPin,
    DIR: OutputPin,
    DELAY: DelayNs,
{
    drives: Vec<DrivePins<STEP, DIR>, MAX_DRIVES>,

    /// Current direction per drive (cached to avoid unnecessary pin writes).
    directions: [Option<bool>; MAX_DRIVES],

    /// Delay provider for the STEP pulse width.
    delay: DELAY,

    /// STEP high time in nanoseconds, 0 for back-to-back writes.
    pulse_ns: u32,

    pin_errors: u32,
}

impl<STEP, DIR, DELAY> PinBank<STEP, DIR, DELAY>
where
    STEP: OutputPin,
    DIR: OutputPin,
    DELAY: DelayNs,
{
    /// Create an empty bank.
    pub fn new(delay: DELAY, pulse_ns: u32) -> Self {
        Self {
            drives: Vec::new(),
            directions: [None; MAX_DRIVES],
            delay,
            pulse_ns,
            pin_errors: 0,
        }
    }

    /// Add the pins of the next drive. Returns its index, or the pins back if
    /// the bank is full.
    pub fn add_drive(
        &mut self,
        step: STEP,
        dir: DIR,
        invert_direction: bool,
    ) -> core::result::Result<usize, (STEP, DIR)> {
        let index = self.drives.len();
        self.drives
            .push(DrivePins {
                step,
                dir,
                invert_direction,
            })
            .map_err(|pins| (pins.step, pins.dir))?;
        Ok(index)
    }

    /// Take the direction inversion of every drive from `config`.
    pub fn apply_config(&mut self, config: &MachineConfig) {
        for (pins, drive) in self.drives.iter_mut().zip(config.drives.iter()) {
            pins.invert_direction = drive.invert_direction;
        }
        self.directions = [None; MAX_DRIVES];
    }

    /// Number of drives wired.
    #[inline]
    pub fn len(&self) -> usize {
        self.drives.len()
    }

    /// True if no drive is wired.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.drives.is_empty()
    }

    /// Pin writes that failed.
    #[inline]
    pub fn pin_errors(&self) -> u32 {
        self.pin_errors
    }

    /// Give back the pins and the delay provider.
    pub fn release(self) -> (Vec<DrivePins<STEP, DIR>, MAX_DRIVES>, DELAY) {
        (self.drives, self.delay)
    }
}

impl<STEP, DIR, DELAY> StepOutput for PinBank<STEP, DIR, DELAY>
where
    STEP: OutputPin,
    DIR: OutputPin,
    DELAY: DelayNs,
{
    fn set_direction(&mut self, drive: usize, forward: bool) {
        if self.directions.get(drive).copied().flatten() == Some(forward) {
            return;
        }
        let Some(pins) = self.drives.get_mut(drive) else {
            return;
        };

        let result = if forward != pins.invert_direction {
            pins.dir.set_high()
        } else {
            pins.dir.set_low()
        };

        match result {
            Ok(()) => self.directions[drive] = Some(forward),
            Err(_) => self.pin_errors = self.pin_errors.saturating_add(1),
        }
    }

    fn step(&mut self, drive: usize) {
        let Some(pins) = self.drives.get_mut(drive) else {
            return;
        };

        let mut ok = pins.step.set_high().is_ok();
        if self.pulse_ns > 0 {
            self.delay.delay_ns(self.pulse_ns);
        }
        ok &= pins.step.set_low().is_ok();

        if !ok {
            self.pin_errors = self.pin_errors.saturating_add(1);
        }
    }
}
