//! Runtime configuration of the charge controller.
//!
//! These are the structs the phases read on every run. They are separate
//! from the TOML-deserialized config in `charger_config`; see `conversions`.

use std::time::Duration;

use charger_config::Schedule;

use crate::util::{hours, minutes};

/// Voltage and current thresholds (mV, mA).
#[derive(Debug, Clone)]
pub struct VoltageCfg {
    /// An idle slot reading above this may hold a cell.
    pub detect_mv: u16,
    /// Discharge floor.
    pub min_mv: u16,
    /// Precharge ends once the cell rises above this.
    pub precharge_mv: u16,
    /// Charge terminates when the averaged voltage reaches this.
    pub max_mv: u16,
    pub postcharge_mv: u16,
    /// Proves a connected cell in Check; ends Discharge when current falls below it.
    pub min_discharge_ma: u16,
}

impl Default for VoltageCfg {
    fn default() -> Self {
        Self {
            detect_mv: 100,
            min_mv: 900,
            precharge_mv: 1000,
            max_mv: 1580,
            postcharge_mv: 1590,
            min_discharge_ma: 20,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CurrentCfg {
    pub precharge_ma: u16,
    pub keep_ma: u16,
    /// Cap of the Restore schedule current.
    pub restore_max_ma: u16,
    /// Discharge pulse used before voltage reads while charging.
    pub discharge_pulse: Duration,
}

impl Default for CurrentCfg {
    fn default() -> Self {
        Self {
            precharge_ma: 30,
            keep_ma: 10,
            restore_max_ma: 40,
            discharge_pulse: Duration::from_millis(20),
        }
    }
}

/// Temperatures in tenths of a degree Celsius.
#[derive(Debug, Clone)]
pub struct ThermalCfg {
    /// Rise allowed over the temperature seen 20 minutes into a charge.
    pub max_charge_rise: i16,
    /// Charging stops for good at this cell temperature.
    pub hot: i16,
    /// Pause above this, resume a little below.
    pub max: i16,
    pub heatsink_overheat: i16,
}

impl Default for ThermalCfg {
    fn default() -> Self {
        Self {
            max_charge_rise: 150,
            hot: 500,
            max: 550,
            heatsink_overheat: 600,
        }
    }
}

/// Phase time budgets.
#[derive(Debug, Clone)]
pub struct BudgetCfg {
    pub discharge: Duration,
    /// A cell still under the precharge voltage after this is given up on
    /// and trickle charged in Keep.
    pub precharge: Duration,
    pub postcharge: Duration,
}

impl Default for BudgetCfg {
    fn default() -> Self {
        Self {
            discharge: hours(10),
            precharge: minutes(120),
            postcharge: minutes(20),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChargerCfg {
    pub voltage: VoltageCfg,
    pub current: CurrentCfg,
    pub thermal: ThermalCfg,
    pub budget: BudgetCfg,
    /// Dispatcher poll period.
    pub tick: Duration,
}

impl Default for ChargerCfg {
    fn default() -> Self {
        Self {
            voltage: VoltageCfg::default(),
            current: CurrentCfg::default(),
            thermal: ThermalCfg::default(),
            budget: BudgetCfg::default(),
            tick: Duration::from_millis(100),
        }
    }
}

/// Per-slot settings applied by `BatterySlot::init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotSettings {
    pub capacity_mah: u16,
    pub schedule: Schedule,
    /// Remaining discharge/charge repetitions; 0 charges once.
    pub loops: u8,
    pub skip_discharge: bool,
}

impl Default for SlotSettings {
    fn default() -> Self {
        Self {
            capacity_mah: charger_config::record::DEFAULT_CAPACITY_MAH,
            schedule: Schedule::Slow,
            loops: 0,
            skip_discharge: false,
        }
    }
}
