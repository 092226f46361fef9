//! `From` implementations bridging `charger_config` types to `charger_core` types.

use std::time::Duration;

use crate::config::{BudgetCfg, ChargerCfg, CurrentCfg, SlotSettings, ThermalCfg, VoltageCfg};
use crate::util::{hours, minutes};

// ── VoltageCfg ───────────────────────────────────────────────────────────────

impl From<&charger_config::Thresholds> for VoltageCfg {
    fn from(c: &charger_config::Thresholds) -> Self {
        Self {
            detect_mv: c.detect_voltage_mv,
            min_mv: c.min_voltage_mv,
            precharge_mv: c.precharge_voltage_mv,
            max_mv: c.max_voltage_mv,
            postcharge_mv: c.postcharge_voltage_mv,
            min_discharge_ma: c.min_discharge_current_ma,
        }
    }
}

// ── CurrentCfg ───────────────────────────────────────────────────────────────

impl From<&charger_config::Currents> for CurrentCfg {
    fn from(c: &charger_config::Currents) -> Self {
        Self {
            precharge_ma: c.precharge_ma,
            keep_ma: c.keep_ma,
            restore_max_ma: c.restore_max_ma,
            discharge_pulse: Duration::from_millis(c.discharge_pulse_ms),
        }
    }
}

// ── ThermalCfg ───────────────────────────────────────────────────────────────

impl From<&charger_config::Temperature> for ThermalCfg {
    fn from(c: &charger_config::Temperature) -> Self {
        Self {
            max_charge_rise: c.max_charge_rise,
            hot: c.hot,
            max: c.max,
            heatsink_overheat: c.heatsink_overheat,
        }
    }
}

// ── BudgetCfg ────────────────────────────────────────────────────────────────

impl From<&charger_config::Timing> for BudgetCfg {
    fn from(c: &charger_config::Timing) -> Self {
        Self {
            discharge: hours(c.discharge_budget_h),
            precharge: minutes(c.precharge_budget_min),
            postcharge: minutes(c.postcharge_budget_min),
        }
    }
}

// ── ChargerCfg ───────────────────────────────────────────────────────────────

impl From<&charger_config::Config> for ChargerCfg {
    fn from(c: &charger_config::Config) -> Self {
        Self {
            voltage: (&c.thresholds).into(),
            current: (&c.currents).into(),
            thermal: (&c.temperature).into(),
            budget: (&c.timing).into(),
            tick: Duration::from_millis(c.timing.tick_ms),
        }
    }
}

// ── SlotSettings ─────────────────────────────────────────────────────────────

impl From<&charger_config::SlotRecord> for SlotSettings {
    fn from(r: &charger_config::SlotRecord) -> Self {
        let r = r.normalized();
        Self {
            capacity_mah: r.capacity_mah,
            schedule: r.schedule,
            loops: r.loops,
            skip_discharge: r.skip_discharge(),
        }
    }
}

impl From<&SlotSettings> for charger_config::SlotRecord {
    fn from(s: &SlotSettings) -> Self {
        let mut r = Self {
            capacity_mah: s.capacity_mah,
            schedule: s.schedule,
            loops: s.loops,
            flags: 0,
        };
        r.set_skip_discharge(s.skip_discharge);
        r.normalized()
    }
}
