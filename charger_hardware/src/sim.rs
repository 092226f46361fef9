//! Simulated twin charger.
//!
//! Each channel carries a crude NiMH cell: state of charge drives an
//! open-circuit voltage curve that peaks just past full and then drops, and
//! overcharge heats the cell. The charging regulator is a PWM stage whose
//! output current is linear in the duty above a conduction threshold; the
//! per-channel [`PidController`] closes the loop in [`keep_current`].
//!
//! All time comes from the injected [`Clock`], so a `ManualClock` runs a
//! whole charge session in a fraction of a second.
//!
//! [`keep_current`]: ChargerHardware::keep_current

use std::sync::Arc;
use std::time::{Duration, Instant};

use charger_traits::{ChargeCounters, ChargerHardware, Clock, HwResult, Sensor};

use crate::cache::ReadingCache;
use crate::error::HwError;
use crate::fan::FanGovernor;
use crate::pid::{PidController, PidGains};

/// Maximum regulator duty accepted by the PWM stage.
pub const MAX_DUTY: i32 = 7000;
/// Presence probe sweeps the duty across this range.
pub const BATT_DETECT_POWER: i32 = 4000;
pub const MAX_BATT_DETECT_POWER: i32 = 7000;
/// Probe succeeds when more current than this flows (mA).
pub const BATT_DETECT_CURRENT: f64 = 50.0;
const PROBE_STEPS: u8 = 20;

const CONDUCTION_DUTY: f64 = 500.0;
const MA_PER_DUTY: f64 = 0.1;
const CELL_THERMAL_TAU_S: f64 = 900.0;
const SINK_THERMAL_TAU_S: f64 = 120.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    Stop,
    Charge,
    Pause,
    Discharge,
}

/// Initial state of a simulated cell.
#[derive(Debug, Clone)]
pub struct CellSpec {
    pub present: bool,
    pub capacity_mah: u16,
    /// Initial state of charge, 0.0..=1.0.
    pub state_of_charge: f32,
}

impl Default for CellSpec {
    fn default() -> Self {
        Self {
            present: true,
            capacity_mah: 2000,
            state_of_charge: 0.3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Ambient temperature, tenths °C.
    pub ambient: i16,
    pub cells: Vec<CellSpec>,
    /// Discharge load per channel, ohms.
    pub discharge_ohms: Vec<f64>,
    pub voltage_ttl: Duration,
    pub temperature_ttl: Duration,
    /// Interval of one regulator step.
    pub regulation_step: Duration,
    pub pid: PidGains,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            ambient: 220,
            cells: vec![CellSpec::default(), CellSpec::default()],
            discharge_ohms: vec![1.1, 1.0],
            voltage_ttl: Duration::from_secs(10),
            temperature_ttl: Duration::from_secs(29),
            regulation_step: Duration::from_millis(20),
            pid: PidGains::default(),
        }
    }
}

#[derive(Debug)]
struct Cell {
    present: bool,
    capacity: f64,
    charge_mah: f64,
    temperature: f64,
}

impl Cell {
    fn from_spec(spec: &CellSpec, ambient: f64) -> Self {
        let capacity = f64::from(spec.capacity_mah.max(1));
        Self {
            present: spec.present,
            capacity,
            charge_mah: capacity * f64::from(spec.state_of_charge.clamp(0.0, 1.0)),
            temperature: ambient,
        }
    }

    /// Open-circuit voltage in mV.
    fn ocv(&self) -> f64 {
        if !self.present {
            return 0.0;
        }
        let q = self.charge_mah;
        let c = self.capacity;
        let knee = 0.1 * c;
        let peak = 1.03 * c;
        if q < 3.0 {
            880.0 + 40.0 * q
        } else if q < knee {
            1000.0 + 200.0 * (q - 3.0) / (knee - 3.0).max(1.0)
        } else if q < c {
            1200.0 + 200.0 * (q - knee) / (c - knee)
        } else if q < peak {
            1400.0 + 20.0 * (q - c) / (peak - c)
        } else {
            (1420.0 - 800.0 * (q - peak) / c).max(1100.0)
        }
    }

    fn overcharge(&self) -> f64 {
        ((self.charge_mah - self.capacity) / self.capacity).max(0.0)
    }
}

#[derive(Debug)]
struct Channel {
    cell: Cell,
    mode: ChannelMode,
    target_ma: u16,
    duty: i32,
    pid: PidController,
    discharge_ohms: f64,
    voltage: ReadingCache<u16>,
    temperature: ReadingCache<i16>,
    charged_mah: f64,
    discharged_mah: f64,
    last_update: Instant,
    last_regulation: Instant,
}

impl Channel {
    /// Regulator steps due since the previous regulation, capped so that a
    /// long pause does not stall the caller.
    fn regulation_steps(&mut self, now: Instant, step: Duration) -> u32 {
        let elapsed = now.saturating_duration_since(self.last_regulation);
        let due = (elapsed.as_nanos() / step.as_nanos().max(1)).min(64) as u32;
        if due > 0 {
            self.last_regulation = now;
        }
        due
    }

    fn regulator_ma(&self) -> f64 {
        if !self.cell.present {
            return 0.0;
        }
        ((f64::from(self.duty) - CONDUCTION_DUTY) * MA_PER_DUTY).max(0.0)
    }

    fn discharge_ma(&self) -> f64 {
        self.cell.ocv() / self.discharge_ohms
    }

    /// Signed cell current, positive while charging.
    fn cell_current(&self) -> f64 {
        match self.mode {
            ChannelMode::Charge => self.regulator_ma(),
            ChannelMode::Discharge => -self.discharge_ma(),
            ChannelMode::Stop | ChannelMode::Pause => 0.0,
        }
    }

    fn integrate(&mut self, now: Instant, ambient: f64) {
        let dt = now.saturating_duration_since(self.last_update).as_secs_f64();
        self.last_update = now;
        if dt <= 0.0 {
            return;
        }
        let ma = self.cell_current();
        self.apply_charge(ma, dt);

        let heating = if ma > 0.0 {
            0.05 * ma + 1500.0 * self.cell.overcharge()
        } else {
            0.02 * -ma
        };
        let target = ambient + heating;
        let k = 1.0 - (-dt / CELL_THERMAL_TAU_S).exp();
        self.cell.temperature += (target - self.cell.temperature) * k;
    }

    fn apply_charge(&mut self, ma: f64, seconds: f64) {
        let mah = ma * seconds / 3600.0;
        if mah >= 0.0 {
            self.charged_mah += mah;
        } else {
            self.discharged_mah -= mah;
        }
        self.cell.charge_mah = (self.cell.charge_mah + mah).max(0.0);
    }
}

/// Two-channel (or N-channel) charger backed by simulated cells.
pub struct SimulatedCharger {
    clock: Arc<dyn Clock + Send + Sync>,
    channels: Vec<Channel>,
    ambient: f64,
    heat_sink: f64,
    heat_sink_cache: ReadingCache<i16>,
    sink_update: Instant,
    fan: FanGovernor,
    regulation_step: Duration,
    /// Temperature sensors that stop answering.
    silent_sensors: Vec<Sensor>,
}

impl core::fmt::Debug for SimulatedCharger {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SimulatedCharger")
            .field("channels", &self.channels.len())
            .field("heat_sink", &self.heat_sink)
            .field("fan", &self.fan.running())
            .finish()
    }
}

impl SimulatedCharger {
    pub fn new(cfg: SimConfig, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        let now = clock.now();
        let ambient = f64::from(cfg.ambient);
        let channels = cfg
            .cells
            .iter()
            .enumerate()
            .map(|(i, spec)| Channel {
                cell: Cell::from_spec(spec, ambient),
                mode: ChannelMode::Stop,
                target_ma: 0,
                duty: 0,
                pid: PidController::from(cfg.pid),
                discharge_ohms: cfg.discharge_ohms.get(i).copied().unwrap_or(1.0).max(0.1),
                voltage: ReadingCache::new(cfg.voltage_ttl),
                temperature: ReadingCache::new(cfg.temperature_ttl),
                charged_mah: 0.0,
                discharged_mah: 0.0,
                last_update: now,
                last_regulation: now,
            })
            .collect();
        Self {
            clock,
            channels,
            ambient,
            heat_sink: ambient,
            heat_sink_cache: ReadingCache::new(cfg.temperature_ttl),
            sink_update: now,
            fan: FanGovernor::new(cfg.ambient),
            regulation_step: cfg.regulation_step.max(Duration::from_millis(1)),
            silent_sensors: Vec::new(),
        }
    }

    pub fn mode(&self, channel: usize) -> Option<ChannelMode> {
        self.channels.get(channel).map(|c| c.mode)
    }

    pub fn fan_running(&self) -> bool {
        self.fan.running()
    }

    /// Current simulated state of charge, for diagnostics.
    pub fn state_of_charge(&self, channel: usize) -> Option<f64> {
        self.channels
            .get(channel)
            .map(|c| c.cell.charge_mah / c.cell.capacity)
    }

    /// Insert or remove the cell in a channel.
    pub fn set_present(&mut self, channel: usize, present: bool) -> HwResult<()> {
        let ch = self.channel(channel)?;
        ch.cell.present = present;
        ch.voltage.invalidate();
        Ok(())
    }

    /// Make a temperature sensor time out (or answer again).
    pub fn set_sensor_silent(&mut self, sensor: Sensor, silent: bool) {
        self.silent_sensors.retain(|s| *s != sensor);
        if silent {
            self.silent_sensors.push(sensor);
        }
    }

    fn channel(&mut self, channel: usize) -> Result<&mut Channel, HwError> {
        let now = self.clock.now();
        let ambient = self.ambient;
        let ch = self
            .channels
            .get_mut(channel)
            .ok_or(HwError::ChannelOutOfRange(channel))?;
        ch.integrate(now, ambient);
        Ok(ch)
    }

    fn update_heat_sink(&mut self) {
        let now = self.clock.now();
        let dt = now.saturating_duration_since(self.sink_update).as_secs_f64();
        self.sink_update = now;
        if dt <= 0.0 {
            return;
        }
        let load: f64 = self.channels.iter().map(|c| c.cell_current().abs()).sum();
        let cooling = if self.fan.running() { 0.7 } else { 1.0 };
        let target = self.ambient + 0.15 * load * cooling;
        let k = 1.0 - (-dt / SINK_THERMAL_TAU_S).exp();
        self.heat_sink += (target - self.heat_sink) * k;
        self.fan.update(round_i16(self.heat_sink));
    }
}

fn round_u16(v: f64) -> u16 {
    v.round().clamp(0.0, f64::from(u16::MAX)) as u16
}

fn round_i16(v: f64) -> i16 {
    v.round().clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16
}

impl ChargerHardware for SimulatedCharger {
    fn channels(&self) -> usize {
        self.channels.len()
    }

    fn voltage_mv(&mut self, channel: usize) -> HwResult<u16> {
        let now = self.clock.now();
        let ch = self.channel(channel)?;
        let ocv = ch.cell.ocv();
        Ok(ch.voltage.get_or_refresh(now, || round_u16(ocv)))
    }

    fn current_ma(&mut self, channel: usize) -> HwResult<u16> {
        let ch = self.channel(channel)?;
        Ok(round_u16(ch.cell_current().abs()))
    }

    fn temperature(&mut self, sensor: Sensor) -> HwResult<i16> {
        let now = self.clock.now();
        if self.silent_sensors.contains(&sensor) {
            tracing::debug!(?sensor, "temperature sensor silent");
            return Err(Box::new(HwError::SensorTimeout));
        }
        match sensor {
            Sensor::Slot(channel) => {
                let ch = self.channel(channel)?;
                let t = round_i16(ch.cell.temperature);
                Ok(ch.temperature.get_or_refresh(now, || t))
            }
            Sensor::HeatSink => {
                self.update_heat_sink();
                let t = round_i16(self.heat_sink);
                Ok(self.heat_sink_cache.get_or_refresh(now, || t))
            }
        }
    }

    fn set_discharge(&mut self, channel: usize, on: bool) -> HwResult<()> {
        let ch = self.channel(channel)?;
        ch.mode = if on {
            ChannelMode::Discharge
        } else {
            ChannelMode::Stop
        };
        ch.duty = 0;
        ch.target_ma = 0;
        Ok(())
    }

    fn pulse_discharge(&mut self, channel: usize, duration: Duration) -> HwResult<()> {
        let ch = self.channel(channel)?;
        if ch.mode == ChannelMode::Charge {
            let ma = ch.discharge_ma();
            ch.apply_charge(-ma, duration.as_secs_f64());
        }
        Ok(())
    }

    fn set_charge_current(&mut self, channel: usize, target_ma: u16) -> HwResult<()> {
        let ch = self.channel(channel)?;
        ch.mode = if target_ma > 0 {
            ChannelMode::Charge
        } else {
            ChannelMode::Stop
        };
        ch.target_ma = target_ma;
        ch.duty = 0;
        ch.pid.reset();
        ch.last_regulation = ch.last_update;
        tracing::debug!(channel, target_ma, "charge current set");
        Ok(())
    }

    fn pause_charging(&mut self, channel: usize, on: bool) -> HwResult<()> {
        let ch = self.channel(channel)?;
        ch.mode = match (ch.mode, on) {
            (ChannelMode::Charge, true) => ChannelMode::Pause,
            (ChannelMode::Pause, false) => ChannelMode::Charge,
            (mode, _) => mode,
        };
        Ok(())
    }

    fn probe_battery_presence(&mut self, channel: usize, iteration: u8) -> HwResult<bool> {
        let ch = self.channel(channel)?;
        if iteration >= PROBE_STEPS || ch.mode != ChannelMode::Stop {
            return Ok(false);
        }
        let span = MAX_BATT_DETECT_POWER - BATT_DETECT_POWER;
        ch.duty = BATT_DETECT_POWER + span * i32::from(iteration) / i32::from(PROBE_STEPS - 1);
        let ma = ch.regulator_ma();
        ch.duty = 0;
        tracing::trace!(channel, iteration, ma, "presence probe");
        Ok(ma > BATT_DETECT_CURRENT)
    }

    fn keep_current(&mut self, channel: usize) -> HwResult<()> {
        let step = self.regulation_step;
        let now = self.clock.now();
        let ch = self.channel(channel)?;
        if ch.mode == ChannelMode::Charge {
            for _ in 0..ch.regulation_steps(now, step) {
                let actual = round_u16(ch.regulator_ma());
                let duty = ch
                    .pid
                    .request_power(i32::from(ch.target_ma), i32::from(actual));
                ch.duty = duty.clamp(0, MAX_DUTY);
            }
        }
        self.update_heat_sink();
        Ok(())
    }

    fn counters(&self, channel: usize) -> ChargeCounters {
        self.channels
            .get(channel)
            .map(|c| ChargeCounters {
                charged_mah: c.charged_mah.floor() as u32,
                discharged_mah: c.discharged_mah.floor() as u32,
            })
            .unwrap_or_default()
    }

    fn reset_counters(&mut self, channel: usize) {
        if let Some(c) = self.channels.get_mut(channel) {
            c.charged_mah = 0.0;
            c.discharged_mah = 0.0;
        }
    }
}
