//! Contracts shared by the charger control core and its hardware backends.
//!
//! Every fallible method returns a boxed error so that real drivers, the
//! simulator and test fakes can each use their own error type; the core maps
//! them to its typed error at the boundary.

pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

use std::time::Duration;

/// Result type used across the hardware trait boundary.
pub type HwResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Temperature sensor selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sensor {
    /// Thermistor attached to the battery in the given channel.
    Slot(usize),
    /// Heat sink shared by both charging regulators.
    HeatSink,
}

/// Accumulated charge and discharge, in whole mAh, since the last reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChargeCounters {
    pub charged_mah: u32,
    pub discharged_mah: u32,
}

/// Charger actuation and sensing for a set of independent channels.
///
/// Reads may be served from a cache; callers must tolerate values that are a
/// few seconds old.
pub trait ChargerHardware {
    /// Number of battery channels driven by this backend.
    fn channels(&self) -> usize;

    /// Terminal voltage in millivolts.
    fn voltage_mv(&mut self, channel: usize) -> HwResult<u16>;

    /// Charge or discharge current in milliamps, depending on the channel mode.
    fn current_ma(&mut self, channel: usize) -> HwResult<u16>;

    /// Temperature in tenths of a degree Celsius.
    fn temperature(&mut self, sensor: Sensor) -> HwResult<i16>;

    /// Switch the discharge load on or off. Always stops charging.
    fn set_discharge(&mut self, channel: usize, on: bool) -> HwResult<()>;

    /// Short discharge pulse while charging; ignored in any other mode.
    fn pulse_discharge(&mut self, channel: usize, duration: Duration) -> HwResult<()>;

    /// Engage the closed-loop current regulator. `0` disables charging.
    fn set_charge_current(&mut self, channel: usize, target_ma: u16) -> HwResult<()>;

    /// Suspend or resume charging without forgetting the current target.
    fn pause_charging(&mut self, channel: usize, on: bool) -> HwResult<()>;

    /// Apply the `iteration`-th step of the detect-power ramp to an idle
    /// channel and report whether any charge current flowed.
    fn probe_battery_presence(&mut self, channel: usize, iteration: u8) -> HwResult<bool>;

    /// One regulation step: advance the current servo and the mAh counters.
    fn keep_current(&mut self, _channel: usize) -> HwResult<()> {
        Ok(())
    }

    fn counters(&self, _channel: usize) -> ChargeCounters {
        ChargeCounters::default()
    }

    fn reset_counters(&mut self, _channel: usize) {}
}

impl<T: ChargerHardware + ?Sized> ChargerHardware for Box<T> {
    fn channels(&self) -> usize {
        (**self).channels()
    }
    fn voltage_mv(&mut self, channel: usize) -> HwResult<u16> {
        (**self).voltage_mv(channel)
    }
    fn current_ma(&mut self, channel: usize) -> HwResult<u16> {
        (**self).current_ma(channel)
    }
    fn temperature(&mut self, sensor: Sensor) -> HwResult<i16> {
        (**self).temperature(sensor)
    }
    fn set_discharge(&mut self, channel: usize, on: bool) -> HwResult<()> {
        (**self).set_discharge(channel, on)
    }
    fn pulse_discharge(&mut self, channel: usize, duration: Duration) -> HwResult<()> {
        (**self).pulse_discharge(channel, duration)
    }
    fn set_charge_current(&mut self, channel: usize, target_ma: u16) -> HwResult<()> {
        (**self).set_charge_current(channel, target_ma)
    }
    fn pause_charging(&mut self, channel: usize, on: bool) -> HwResult<()> {
        (**self).pause_charging(channel, on)
    }
    fn probe_battery_presence(&mut self, channel: usize, iteration: u8) -> HwResult<bool> {
        (**self).probe_battery_presence(channel, iteration)
    }
    fn keep_current(&mut self, channel: usize) -> HwResult<()> {
        (**self).keep_current(channel)
    }
    fn counters(&self, channel: usize) -> ChargeCounters {
        (**self).counters(channel)
    }
    fn reset_counters(&mut self, channel: usize) {
        (**self).reset_counters(channel);
    }
}
