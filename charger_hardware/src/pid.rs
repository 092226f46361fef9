//! Incremental (velocity-form) PI current regulator.
//!
//! Power is kept in fixed point, scaled by `2^denominator_bits`. The first
//! call after a reset uses the direct form because there is no previous
//! sample to difference against; later calls only add increments. The first
//! time the measured current exceeds the target, the integral is discarded
//! and the power snaps back to the last commanded value. That latch is
//! one-shot until the next reset.

/// Startup power, found empirically to sit just below the regulator's
/// conduction threshold.
pub const RESET_POWER: i32 = 1_300_000;
pub const DEFAULT_KP: i32 = 128;
pub const DEFAULT_KI: i32 = 50;
pub const DEFAULT_DENOMINATOR_BITS: u8 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PidGains {
    pub kp: i32,
    pub ki: i32,
    pub denominator_bits: u8,
}

impl Default for PidGains {
    fn default() -> Self {
        Self {
            kp: DEFAULT_KP,
            ki: DEFAULT_KI,
            denominator_bits: DEFAULT_DENOMINATOR_BITS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gain {
    Proportional,
    Integral,
}

#[derive(Debug, Clone)]
pub struct PidController {
    kp: i32,
    ki: i32,
    denominator_bits: u8,
    power: i32,
    previous_power: i32,
    i_sum: i32,
    /// `(h0, h1)`: the two previous current samples, `None` right after reset.
    history: Option<(i32, i32)>,
    reached: bool,
}

impl Default for PidController {
    fn default() -> Self {
        Self::from(PidGains::default())
    }
}

impl From<PidGains> for PidController {
    fn from(g: PidGains) -> Self {
        Self::new(g.kp, g.ki, g.denominator_bits)
    }
}

impl PidController {
    pub fn new(kp: i32, ki: i32, denominator_bits: u8) -> Self {
        let mut pid = Self {
            kp,
            ki,
            denominator_bits: denominator_bits.clamp(1, 30),
            power: 0,
            previous_power: 0,
            i_sum: 0,
            history: None,
            reached: false,
        };
        pid.reset();
        pid
    }

    pub fn reset(&mut self) {
        self.power = RESET_POWER;
        self.previous_power = RESET_POWER;
        self.i_sum = 0;
        self.history = None;
        self.reached = false;
    }

    /// Next actuator command for the given target and measured current.
    pub fn request_power(&mut self, target: i32, actual: i32) -> i32 {
        match self.history {
            None => {
                self.i_sum = target - actual;
                self.power = self
                    .kp
                    .saturating_mul(target - actual)
                    .saturating_add(self.ki.saturating_mul(self.i_sum));
                self.history = Some((actual, actual));
            }
            Some((_, h1)) => {
                if !self.reached && actual > target {
                    self.i_sum = 0;
                    self.power = self.previous_power;
                    self.reached = true;
                } else {
                    let delta = self
                        .kp
                        .saturating_mul(h1 - actual)
                        .saturating_add(self.ki.saturating_mul(target - actual));
                    self.power = self.power.saturating_add(delta);
                    self.previous_power = self.power;
                }
                self.history = Some((h1, actual));
            }
        }
        tracing::trace!(target, actual, power = self.power, "pid step");
        self.output()
    }

    /// Rounded scale-down of the fixed-point power.
    pub fn output(&self) -> i32 {
        let half = 1i64 << (self.denominator_bits - 1);
        ((i64::from(self.power) + half) >> self.denominator_bits) as i32
    }

    /// Set a gain and return its value; a negative `value` only queries it.
    pub fn change_gain(&mut self, which: Gain, value: i32) -> i32 {
        let slot = match which {
            Gain::Proportional => &mut self.kp,
            Gain::Integral => &mut self.ki,
        };
        if value >= 0 {
            *slot = value;
        }
        *slot
    }

    pub fn i_sum(&self) -> i32 {
        self.i_sum
    }

    pub fn power(&self) -> i32 {
        self.power
    }

    pub fn reached(&self) -> bool {
        self.reached
    }
}
