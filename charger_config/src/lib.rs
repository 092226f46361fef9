#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas and the persisted slot record for the charger.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - `record` holds the fixed-size, checksummed per-slot settings that
//!   survive a restart.
use serde::Deserialize;

mod atomic;
pub mod record;

pub use record::{ConfigRecord, RecordError, RecordStore, SlotRecord};

/// Charge-rate profile of a slot.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Schedule {
    /// 0.1 C for a fixed 11 hours.
    #[default]
    Slow,
    /// 0.05 C capped low, for deeply discharged or old cells.
    Restore,
    /// 0.25 C for a fixed 5 hours.
    Fast,
}

impl Schedule {
    pub const ALL: [Schedule; 3] = [Schedule::Slow, Schedule::Restore, Schedule::Fast];

    pub fn as_u8(self) -> u8 {
        match self {
            Schedule::Slow => 0,
            Schedule::Restore => 1,
            Schedule::Fast => 2,
        }
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        Self::ALL.get(usize::from(v)).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            Schedule::Slow => "slow",
            Schedule::Restore => "restore",
            Schedule::Fast => "fast",
        }
    }
}

impl core::str::FromStr for Schedule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "slow" => Ok(Schedule::Slow),
            "restore" => Ok(Schedule::Restore),
            "fast" => Ok(Schedule::Fast),
            other => Err(format!("unknown schedule '{other}' (slow|restore|fast)")),
        }
    }
}

/// Voltage and current thresholds (mV, mA).
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Thresholds {
    /// Anything above this on an idle slot may be a cell.
    pub detect_voltage_mv: u16,
    /// Discharge ends once voltage stays below this.
    pub min_voltage_mv: u16,
    pub precharge_voltage_mv: u16,
    /// Charge terminates when the averaged voltage reaches this.
    pub max_voltage_mv: u16,
    pub postcharge_voltage_mv: u16,
    /// Current that proves a cell is connected, also the discharge floor.
    pub min_discharge_current_ma: u16,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            detect_voltage_mv: 100,
            min_voltage_mv: 900,
            precharge_voltage_mv: 1000,
            max_voltage_mv: 1580,
            postcharge_voltage_mv: 1590,
            min_discharge_current_ma: 20,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Currents {
    pub precharge_ma: u16,
    pub keep_ma: u16,
    /// Upper bound of the Restore schedule current.
    pub restore_max_ma: u16,
    pub discharge_pulse_ms: u64,
}

impl Default for Currents {
    fn default() -> Self {
        Self {
            precharge_ma: 30,
            keep_ma: 10,
            restore_max_ma: 40,
            discharge_pulse_ms: 20,
        }
    }
}

/// Temperatures in tenths of a degree Celsius.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Temperature {
    /// Allowed rise over the temperature seen 20 minutes into a charge.
    pub max_charge_rise: i16,
    /// Charging stops for good at this cell temperature.
    pub hot: i16,
    /// Soft limit: pause above it, resume a little below.
    pub max: i16,
    pub heatsink_overheat: i16,
}

impl Default for Temperature {
    fn default() -> Self {
        Self {
            max_charge_rise: 150,
            hot: 500,
            max: 550,
            heatsink_overheat: 600,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Timing {
    pub discharge_budget_h: u64,
    pub precharge_budget_min: u64,
    pub postcharge_budget_min: u64,
    /// Dispatcher poll period; also paces the current regulator.
    pub tick_ms: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            discharge_budget_h: 10,
            precharge_budget_min: 120,
            postcharge_budget_min: 20,
            tick_ms: 100,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PidCfg {
    pub kp: i32,
    pub ki: i32,
    pub denominator_bits: u8,
}

impl Default for PidCfg {
    fn default() -> Self {
        Self {
            kp: 128,
            ki: 50,
            denominator_bits: 9,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Store {
    /// Location of the persisted slot record.
    pub path: String,
}

impl Default for Store {
    fn default() -> Self {
        Self {
            path: "charger.rec".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SimCell {
    pub present: bool,
    pub capacity_mah: u16,
    pub state_of_charge: f32,
}

impl Default for SimCell {
    fn default() -> Self {
        Self {
            present: true,
            capacity_mah: 2000,
            state_of_charge: 0.3,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Simulation {
    /// Ambient temperature, tenths °C.
    pub ambient: i16,
    #[serde(rename = "cell")]
    pub cells: Vec<SimCell>,
}

impl Default for Simulation {
    fn default() -> Self {
        Self {
            ambient: 220,
            cells: vec![SimCell::default(), SimCell::default()],
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Config {
    pub thresholds: Thresholds,
    pub currents: Currents,
    pub temperature: Temperature,
    pub timing: Timing,
    pub pid: PidCfg,
    pub store: Store,
    pub logging: Logging,
    pub simulation: Simulation,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Thresholds
        let t = &self.thresholds;
        if t.detect_voltage_mv == 0 {
            eyre::bail!("thresholds.detect_voltage_mv must be > 0");
        }
        if t.min_voltage_mv <= t.detect_voltage_mv {
            eyre::bail!("thresholds.min_voltage_mv must be above detect_voltage_mv");
        }
        if t.precharge_voltage_mv <= t.min_voltage_mv {
            eyre::bail!("thresholds.precharge_voltage_mv must be above min_voltage_mv");
        }
        if t.max_voltage_mv <= t.precharge_voltage_mv {
            eyre::bail!("thresholds.max_voltage_mv must be above precharge_voltage_mv");
        }
        if t.postcharge_voltage_mv < t.max_voltage_mv {
            eyre::bail!("thresholds.postcharge_voltage_mv must be >= max_voltage_mv");
        }
        if t.max_voltage_mv > 2000 {
            eyre::bail!("thresholds.max_voltage_mv is unreasonably high for a NiMH cell (>2000)");
        }
        if t.min_discharge_current_ma == 0 {
            eyre::bail!("thresholds.min_discharge_current_ma must be > 0");
        }

        // Currents
        let c = &self.currents;
        if c.precharge_ma < 3 {
            eyre::bail!("currents.precharge_ma must be >= 3");
        }
        if c.keep_ma == 0 {
            eyre::bail!("currents.keep_ma must be > 0");
        }
        if c.restore_max_ma == 0 {
            eyre::bail!("currents.restore_max_ma must be > 0");
        }
        if c.discharge_pulse_ms == 0 || c.discharge_pulse_ms > 1000 {
            eyre::bail!("currents.discharge_pulse_ms must be in [1, 1000]");
        }

        // Temperature
        let tp = &self.temperature;
        if tp.max_charge_rise <= 0 {
            eyre::bail!("temperature.max_charge_rise must be > 0");
        }
        if tp.hot >= tp.max {
            eyre::bail!("temperature.hot must be below temperature.max");
        }
        if tp.max > 800 {
            eyre::bail!("temperature.max is unreasonably high (>80.0 C)");
        }
        if tp.heatsink_overheat <= tp.hot {
            eyre::bail!("temperature.heatsink_overheat must be above temperature.hot");
        }

        // Timing
        let tm = &self.timing;
        if tm.discharge_budget_h == 0 || tm.discharge_budget_h > 48 {
            eyre::bail!("timing.discharge_budget_h must be in [1, 48]");
        }
        if tm.precharge_budget_min < 2 {
            eyre::bail!("timing.precharge_budget_min must be >= 2");
        }
        if tm.postcharge_budget_min == 0 {
            eyre::bail!("timing.postcharge_budget_min must be >= 1");
        }
        if tm.tick_ms == 0 || tm.tick_ms > 1000 {
            eyre::bail!("timing.tick_ms must be in [1, 1000]");
        }

        // PID
        if self.pid.kp < 0 || self.pid.ki < 0 {
            eyre::bail!("pid gains must be >= 0");
        }
        if !(1..=20).contains(&self.pid.denominator_bits) {
            eyre::bail!("pid.denominator_bits must be in [1, 20]");
        }

        // Store
        if self.store.path.trim().is_empty() {
            eyre::bail!("store.path must not be empty");
        }

        // Logging
        if let Some(rot) = &self.logging.rotation
            && !matches!(rot.as_str(), "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }

        // Simulation
        if self.simulation.cells.is_empty() {
            eyre::bail!("simulation.cell must list at least one cell");
        }
        for (i, cell) in self.simulation.cells.iter().enumerate() {
            if cell.capacity_mah < 100 {
                eyre::bail!("simulation.cell[{i}].capacity_mah must be >= 100");
            }
            if !(0.0..=1.0).contains(&cell.state_of_charge) {
                eyre::bail!("simulation.cell[{i}].state_of_charge must be in [0.0, 1.0]");
            }
        }

        Ok(())
    }
}
