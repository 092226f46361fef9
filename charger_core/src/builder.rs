//! Type-state builder for `Charger`.
//!
//! `build()` only exists once hardware has been supplied; `try_build()` is
//! always available and reports what is missing at runtime.

use std::marker::PhantomData;
use std::sync::Arc;

use charger_config::ConfigRecord;
use charger_traits::ChargerHardware;
use charger_traits::clock::{Clock, MonotonicClock};
use crossbeam_channel as xch;

use crate::charger::{Charger, SlotEvent};
use crate::config::{ChargerCfg, SlotSettings};
use crate::error::{BuildError, Result};

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

pub struct ChargerBuilder<H, S = Missing> {
    hw: Option<H>,
    cfg: Option<ChargerCfg>,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    slots: Vec<SlotSettings>,
    events: Option<xch::Sender<SlotEvent>>,
    _s: PhantomData<S>,
}

impl<H: ChargerHardware> Default for ChargerBuilder<H, Missing> {
    fn default() -> Self {
        Self {
            hw: None,
            cfg: None,
            clock: None,
            slots: Vec::new(),
            events: None,
            _s: PhantomData,
        }
    }
}

impl<H: ChargerHardware> Charger<H> {
    /// Start building a Charger.
    pub fn builder() -> ChargerBuilder<H, Missing> {
        ChargerBuilder::default()
    }
}

fn validate(cfg: &ChargerCfg, channels: usize, slots: &[SlotSettings]) -> Result<()> {
    if channels == 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "hardware reports no channels",
        )));
    }
    if slots.len() > channels {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "more slot settings than hardware channels",
        )));
    }
    if slots.iter().any(|s| s.capacity_mah < 20) {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "slot capacity must be >= 20 mAh",
        )));
    }
    let v = &cfg.voltage;
    if !(v.detect_mv < v.min_mv && v.min_mv < v.precharge_mv && v.precharge_mv < v.max_mv) {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "voltage thresholds must increase: detect < min < precharge < max",
        )));
    }
    if cfg.current.precharge_ma == 0 || cfg.current.keep_ma == 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "precharge and keep currents must be > 0",
        )));
    }
    if cfg.thermal.hot >= cfg.thermal.max {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "hot temperature must be below the maximum",
        )));
    }
    if cfg.tick.is_zero() {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "tick must be > 0",
        )));
    }
    Ok(())
}

impl<H: ChargerHardware, S> ChargerBuilder<H, S> {
    /// Fallible build available in any type-state.
    pub fn try_build(self) -> Result<Charger<H>> {
        let hw = self
            .hw
            .ok_or_else(|| eyre::Report::new(BuildError::MissingHardware))?;
        let cfg = self.cfg.unwrap_or_default();
        validate(&cfg, hw.channels(), &self.slots)?;
        let clock: Arc<dyn Clock + Send + Sync> = match self.clock {
            Some(c) => c,
            None => Arc::new(MonotonicClock::new()),
        };
        Ok(Charger::new(hw, cfg, clock, &self.slots, self.events))
    }

    pub fn with_config(mut self, cfg: ChargerCfg) -> Self {
        self.cfg = Some(cfg);
        self
    }

    /// Provide a custom clock; defaults to `MonotonicClock`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Settings per channel, in channel order. Missing entries use defaults.
    pub fn with_slots(mut self, slots: impl IntoIterator<Item = SlotSettings>) -> Self {
        self.slots = slots.into_iter().collect();
        self
    }

    /// Settings from the persisted record.
    pub fn with_record(self, record: &ConfigRecord) -> Self {
        self.with_slots(record.slots.iter().map(SlotSettings::from))
    }

    /// Publish `SlotEvent`s on this channel. Events are dropped when it is full.
    pub fn with_events(mut self, tx: xch::Sender<SlotEvent>) -> Self {
        self.events = Some(tx);
        self
    }
}

impl<H: ChargerHardware> ChargerBuilder<H, Missing> {
    pub fn with_hardware(self, hw: H) -> ChargerBuilder<H, Set> {
        ChargerBuilder {
            hw: Some(hw),
            cfg: self.cfg,
            clock: self.clock,
            slots: self.slots,
            events: self.events,
            _s: PhantomData,
        }
    }
}

impl<H: ChargerHardware> ChargerBuilder<H, Set> {
    /// Validate and build. Only available once hardware is set.
    pub fn build(self) -> Result<Charger<H>> {
        self.try_build()
    }
}
