//! Scriptable in-memory hardware for phase and dispatcher tests.

use std::collections::VecDeque;
use std::time::Duration;

use charger_traits::{ChargeCounters, ChargerHardware, HwResult, Sensor};

/// Actuator calls recorded by [`FakeHardware`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwCall {
    Discharge(usize, bool),
    Pulse(usize),
    ChargeCurrent(usize, u16),
    Pause(usize, bool),
    Probe(usize, u8),
}

#[derive(Debug, Clone, Default)]
pub struct FakeChannel {
    /// Returned once `voltage_script` is empty.
    pub voltage_mv: u16,
    /// Readings served first, front to back.
    pub voltage_script: VecDeque<u16>,
    pub current_ma: u16,
    pub temperature: i16,
    /// The probe succeeds from this iteration on.
    pub probe_ok_from: Option<u8>,
    pub discharging: bool,
    pub charge_target_ma: u16,
    pub paused: bool,
}

/// Readings are whatever the test put in; actuators only record.
#[derive(Debug, Clone)]
pub struct FakeHardware {
    pub slots: Vec<FakeChannel>,
    pub heat_sink: i16,
    pub calls: Vec<HwCall>,
    /// When set, every sensor read fails with this message.
    pub fail_reads: Option<String>,
    /// When set, every actuator call fails with this message and is not recorded.
    pub fail_writes: Option<String>,
}

impl FakeHardware {
    pub fn new(channels: usize) -> Self {
        Self {
            slots: vec![FakeChannel::default(); channels],
            heat_sink: 250,
            calls: Vec::new(),
            fail_reads: None,
            fail_writes: None,
        }
    }

    pub fn channel_mut(&mut self, channel: usize) -> &mut FakeChannel {
        &mut self.slots[channel]
    }

    fn slot(&mut self, channel: usize) -> HwResult<&mut FakeChannel> {
        self.slots
            .get_mut(channel)
            .ok_or_else(|| format!("no channel {channel}").into())
    }

    fn check_read(&self) -> HwResult<()> {
        fail_with(self.fail_reads.as_deref())
    }

    fn check_write(&self) -> HwResult<()> {
        fail_with(self.fail_writes.as_deref())
    }
}

fn fail_with(msg: Option<&str>) -> HwResult<()> {
    match msg {
        Some(msg) => Err(Box::new(std::io::Error::other(msg.to_owned()))),
        None => Ok(()),
    }
}

impl ChargerHardware for FakeHardware {
    fn channels(&self) -> usize {
        self.slots.len()
    }

    fn voltage_mv(&mut self, channel: usize) -> HwResult<u16> {
        self.check_read()?;
        let ch = self.slot(channel)?;
        Ok(ch.voltage_script.pop_front().unwrap_or(ch.voltage_mv))
    }

    fn current_ma(&mut self, channel: usize) -> HwResult<u16> {
        self.check_read()?;
        Ok(self.slot(channel)?.current_ma)
    }

    fn temperature(&mut self, sensor: Sensor) -> HwResult<i16> {
        self.check_read()?;
        match sensor {
            Sensor::Slot(channel) => Ok(self.slot(channel)?.temperature),
            Sensor::HeatSink => Ok(self.heat_sink),
        }
    }

    fn set_discharge(&mut self, channel: usize, on: bool) -> HwResult<()> {
        self.check_write()?;
        let ch = self.slot(channel)?;
        ch.discharging = on;
        ch.charge_target_ma = 0;
        self.calls.push(HwCall::Discharge(channel, on));
        Ok(())
    }

    fn pulse_discharge(&mut self, channel: usize, _duration: Duration) -> HwResult<()> {
        self.check_write()?;
        self.slot(channel)?;
        self.calls.push(HwCall::Pulse(channel));
        Ok(())
    }

    fn set_charge_current(&mut self, channel: usize, target_ma: u16) -> HwResult<()> {
        self.check_write()?;
        let ch = self.slot(channel)?;
        ch.charge_target_ma = target_ma;
        ch.discharging = false;
        self.calls.push(HwCall::ChargeCurrent(channel, target_ma));
        Ok(())
    }

    fn pause_charging(&mut self, channel: usize, on: bool) -> HwResult<()> {
        self.check_write()?;
        self.slot(channel)?.paused = on;
        self.calls.push(HwCall::Pause(channel, on));
        Ok(())
    }

    fn probe_battery_presence(&mut self, channel: usize, iteration: u8) -> HwResult<bool> {
        let ok = self.slot(channel)?.probe_ok_from.is_some_and(|n| iteration >= n);
        self.calls.push(HwCall::Probe(channel, iteration));
        Ok(ok)
    }

    fn counters(&self, _channel: usize) -> ChargeCounters {
        ChargeCounters::default()
    }
}
