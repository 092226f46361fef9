//! The six treatment phases.
//!
//! Each phase is a variant of [`Phase`] carrying its own state. The
//! dispatcher calls [`Phase::init`] once on entry (it returns the phase time
//! budget, `None` for unbounded) and then [`Phase::run`] whenever the
//! previous run's delay has elapsed.

use std::time::{Duration, Instant};

use charger_config::Schedule;
use charger_traits::{ChargerHardware, Sensor};
use eyre::WrapErr;

use crate::battery::{BatterySlot, FinishReason, PhaseKind};
use crate::config::ChargerCfg;
use crate::error::Result;
use crate::hw_error::map_hw_error;

/// Outcome of one phase run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Run again after this delay.
    Wait(Duration),
    /// The phase finished normally.
    Done,
    /// Safety termination; the slot goes to Keep.
    Abort,
}

const fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

/// Everything a phase may touch besides its slot.
pub struct PhaseCtx<'a, H: ChargerHardware + ?Sized> {
    pub hw: &'a mut H,
    pub channel: usize,
    pub cfg: &'a ChargerCfg,
    pub now: Instant,
}

macro_rules! hw_call {
    ($call:expr, $what:literal) => {
        $call
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err($what)
    };
}

impl<H: ChargerHardware + ?Sized> PhaseCtx<'_, H> {
    fn voltage(&mut self) -> Result<u16> {
        hw_call!(self.hw.voltage_mv(self.channel), "voltage_mv")
    }

    fn current(&mut self) -> Result<u16> {
        hw_call!(self.hw.current_ma(self.channel), "current_ma")
    }

    fn temperature(&mut self) -> Result<i16> {
        hw_call!(
            self.hw.temperature(Sensor::Slot(self.channel)),
            "slot temperature"
        )
    }

    fn heat_sink(&mut self) -> Result<i16> {
        hw_call!(self.hw.temperature(Sensor::HeatSink), "heat sink temperature")
    }

    fn discharge(&mut self, on: bool) -> Result<()> {
        hw_call!(self.hw.set_discharge(self.channel, on), "set_discharge")
    }

    fn pulse(&mut self) -> Result<()> {
        let d = self.cfg.current.discharge_pulse;
        hw_call!(self.hw.pulse_discharge(self.channel, d), "pulse_discharge")
    }

    fn charge_current(&mut self, ma: u16) -> Result<()> {
        hw_call!(
            self.hw.set_charge_current(self.channel, ma),
            "set_charge_current"
        )
    }

    fn pause(&mut self, on: bool) -> Result<()> {
        hw_call!(self.hw.pause_charging(self.channel, on), "pause_charging")
    }

    fn probe(&mut self, iteration: u8) -> Result<bool> {
        hw_call!(
            self.hw.probe_battery_presence(self.channel, iteration),
            "probe_battery_presence"
        )
    }
}

// ── Check ────────────────────────────────────────────────────────────────────

/// Wait for a cell, then confirm it by drawing or pushing current.
#[derive(Debug, Clone, Default)]
pub struct Check;

impl Check {
    const POLL: Duration = ms(5000);
    const SETTLE: Duration = ms(500);
    const CURRENT_RETRY: Duration = ms(100);
    const PROBE_RETRY: Duration = ms(200);
    const GIVE_UP: Duration = ms(2000);
    /// Voltage must agree with its average this closely before probing.
    const SETTLED_MV: u16 = 30;
    const CURRENT_TRIES: u8 = 3;
    const PROBE_TRIES: u8 = 20;

    fn run<H: ChargerHardware + ?Sized>(
        &mut self,
        ctx: &mut PhaseCtx<'_, H>,
        slot: &mut BatterySlot,
    ) -> Result<Step> {
        if !slot.phase_complete() {
            let mv = ctx.voltage()?;
            let avg = slot.update_voltage(mv);
            if mv > ctx.cfg.voltage.detect_mv {
                if mv.abs_diff(avg) > Self::SETTLED_MV {
                    return Ok(Step::Wait(Self::SETTLE));
                }
                slot.set_phase_complete(true);
                ctx.discharge(true)?;
                tracing::debug!(channel = ctx.channel, mv, "voltage present, probing");
            }
            return Ok(Step::Wait(Self::POLL));
        }

        let i = slot.error_count();
        slot.increment_error_count();
        if i < Self::CURRENT_TRIES {
            if ctx.current()? >= ctx.cfg.voltage.min_discharge_ma {
                ctx.discharge(false)?;
                return Ok(Step::Done);
            }
            Ok(Step::Wait(Self::CURRENT_RETRY))
        } else if i < Self::CURRENT_TRIES + Self::PROBE_TRIES {
            if i == Self::CURRENT_TRIES {
                ctx.discharge(false)?;
            }
            if ctx.probe(i - Self::CURRENT_TRIES)? {
                return Ok(Step::Done);
            }
            Ok(Step::Wait(Self::PROBE_RETRY))
        } else {
            tracing::debug!(channel = ctx.channel, "no cell detected, starting over");
            slot.set_phase_complete(false);
            slot.reset_error_count();
            Ok(Step::Wait(Self::GIVE_UP))
        }
    }
}

// ── Discharge ────────────────────────────────────────────────────────────────

/// Alternate a discharge window with a pause that grows as the cell empties.
#[derive(Debug, Clone)]
pub struct Discharge {
    pause_period: Duration,
}

impl Default for Discharge {
    fn default() -> Self {
        Self {
            pause_period: Self::MIN_PAUSE,
        }
    }
}

impl Discharge {
    const WINDOW: Duration = ms(10_000);
    const MIN_PAUSE: Duration = ms(1000);
    /// The empty verdict is trusted only after a pause at least this long.
    const TRUSTED_PAUSE: Duration = ms(7000);
    const MAX_PAUSE: Duration = ms(30_000);
    /// Resume below the temperature limit by this many tenths.
    const COOL_DOWN: i16 = 50;

    pub fn pause_period(&self) -> Duration {
        self.pause_period
    }

    fn init<H: ChargerHardware + ?Sized>(
        &mut self,
        ctx: &mut PhaseCtx<'_, H>,
        slot: &mut BatterySlot,
    ) -> Result<Option<Duration>> {
        slot.register_overheat(false);
        slot.set_pause(false);
        ctx.discharge(true)?;
        self.pause_period = Self::MIN_PAUSE;
        Ok(Some(ctx.cfg.budget.discharge))
    }

    fn run<H: ChargerHardware + ?Sized>(
        &mut self,
        ctx: &mut PhaseCtx<'_, H>,
        slot: &mut BatterySlot,
    ) -> Result<Step> {
        let t = ctx.temperature()?;
        slot.update_temperature(t);
        let limit = ctx.cfg.thermal.max;
        if slot.overheated() {
            if t < limit.saturating_sub(Self::COOL_DOWN) {
                slot.register_overheat(false);
                slot.set_pause(false);
                tracing::info!(channel = ctx.channel, t, "cooled down, resuming discharge");
            }
            return Ok(Step::Wait(self.pause_period));
        }
        if t > limit {
            slot.register_overheat(true);
            ctx.discharge(false)?;
            tracing::warn!(channel = ctx.channel, t, "overheat, discharge suspended");
            return Ok(Step::Wait(self.pause_period));
        }

        let min_mv = ctx.cfg.voltage.min_mv;
        let min_ma = ctx.cfg.voltage.min_discharge_ma;
        let (empty, next) = if slot.toggle_pause() {
            let mv = ctx.voltage()?;
            let avg = slot.update_voltage(mv);
            if mv > min_mv && mv > avg && self.pause_period > Self::MIN_PAUSE {
                self.pause_period /= 2;
            }
            let mut empty = mv < min_mv && avg < min_mv;
            if empty && self.pause_period < Self::TRUSTED_PAUSE {
                empty = false;
                self.pause_period = (self.pause_period * 2).min(Self::MAX_PAUSE);
            }
            ctx.discharge(true)?;
            (empty, Self::WINDOW)
        } else {
            let ma = ctx.current()?;
            let avg = slot.update_current(ma);
            ctx.discharge(false)?;
            (ma < min_ma && avg < min_ma, self.pause_period)
        };
        if empty {
            ctx.discharge(false)?;
            return Ok(Step::Done);
        }
        Ok(Step::Wait(next))
    }
}

// ── Precharge ────────────────────────────────────────────────────────────────

/// Small pulsed current until a deeply discharged cell recovers.
#[derive(Debug, Clone, Default)]
pub struct Precharge;

impl Precharge {
    const APPLY: Duration = ms(300);
    const PAUSE: Duration = ms(700);
    const SETTLE: Duration = ms(30_000);
    /// Current within this of the target counts as flowing.
    const CURRENT_SLACK: u16 = 2;

    fn init<H: ChargerHardware + ?Sized>(
        &mut self,
        ctx: &mut PhaseCtx<'_, H>,
        slot: &mut BatterySlot,
    ) -> Result<Option<Duration>> {
        ctx.charge_current(ctx.cfg.current.precharge_ma)?;
        slot.set_pause(false);
        let apply = slot.toggle_pause();
        ctx.pause(!apply)?;
        Ok(Some(ctx.cfg.budget.precharge))
    }

    fn run<H: ChargerHardware + ?Sized>(
        &mut self,
        ctx: &mut PhaseCtx<'_, H>,
        slot: &mut BatterySlot,
    ) -> Result<Step> {
        let mut apply = slot.toggle_pause();
        let started = slot.precharge_current_seen();
        let precharged = slot.phase_complete();
        let threshold = ctx.cfg.voltage.precharge_mv;
        let next = if apply {
            let mv = ctx.voltage()?;
            let avg = slot.update_voltage(mv);
            if started && precharged {
                if avg > threshold {
                    return Ok(Step::Done);
                }
                tracing::debug!(channel = ctx.channel, avg, "precharge regressed");
                slot.set_phase_complete(false);
            }
            if started && avg > threshold {
                ctx.pulse()?;
                apply = slot.toggle_pause();
                slot.set_phase_complete(true);
                Self::SETTLE
            } else {
                Self::APPLY
            }
        } else {
            let ma = ctx.current()?;
            slot.update_current(ma);
            let target = ctx.cfg.current.precharge_ma;
            if !started && ma > target.saturating_sub(Self::CURRENT_SLACK) {
                tracing::debug!(channel = ctx.channel, ma, "precharge current flowing");
                slot.set_precharge_current_seen();
            }
            Self::PAUSE
        };
        ctx.pause(!apply)?;
        Ok(Step::Wait(next))
    }
}

// ── Charge ───────────────────────────────────────────────────────────────────

/// Constant-current charge watched for negative delta-V and temperature.
#[derive(Debug, Clone, Default)]
pub struct Charge;

impl Charge {
    const PERIOD: Duration = ms(60_000);
    /// Resume below the temperature limit by this many tenths.
    const COOL_DOWN: i16 = 20;
    /// The temperature ceiling is fixed this long into the session.
    const CEILING_AFTER: Duration = Duration::from_secs(20 * 60);

    fn init<H: ChargerHardware + ?Sized>(
        &mut self,
        ctx: &mut PhaseCtx<'_, H>,
        slot: &mut BatterySlot,
    ) -> Result<Option<Duration>> {
        slot.start_charging();
        let ma = slot.charge_current(ctx.now);
        let budget = slot.remaining(ctx.now);
        slot.set_pause(false);
        ctx.charge_current(ma)?;
        tracing::info!(
            channel = ctx.channel,
            ma,
            schedule = slot.schedule().name(),
            budget_s = budget.as_secs(),
            "charging"
        );
        Ok(Some(budget))
    }

    fn run<H: ChargerHardware + ?Sized>(
        &mut self,
        ctx: &mut PhaseCtx<'_, H>,
        slot: &mut BatterySlot,
    ) -> Result<Step> {
        let schedule = slot.schedule();
        if schedule != Schedule::Fast {
            ctx.pulse()?;
        }
        let mv = ctx.voltage()?;
        let ma = ctx.current()?;
        let t = ctx.temperature()?;
        let avg = slot.update_voltage(mv);
        slot.update_current(ma);
        slot.update_temperature(t);
        tracing::trace!(channel = ctx.channel, mv, avg, ma, t, "charge tick");

        let thermal = &ctx.cfg.thermal;
        if let Some(ceiling) = slot.max_temperature()
            && t >= ceiling
        {
            return Ok(abort(ctx, slot, FinishReason::Overheat, "temperature ceiling reached"));
        }
        if t >= thermal.hot {
            return Ok(abort(ctx, slot, FinishReason::Overheat, "cell hot"));
        }
        if avg >= ctx.cfg.voltage.max_mv {
            return Ok(abort(ctx, slot, FinishReason::MaxVoltage, "maximum voltage"));
        }
        if schedule != Schedule::Restore && slot.voltage_drop() {
            slot.finish_code(FinishReason::Ok, ctx.now);
            tracing::info!(channel = ctx.channel, avg, "voltage drop, cell full");
            return Ok(Step::Done);
        }
        if t > thermal.max {
            slot.register_overheat(true);
            ctx.pause(true)?;
            tracing::warn!(channel = ctx.channel, t, "cell warm, charging paused");
            return Ok(Step::Wait(Self::PERIOD));
        }
        if slot.overheated() && t < thermal.max.saturating_sub(Self::COOL_DOWN) {
            slot.register_overheat(false);
            slot.set_pause(false);
            ctx.pause(false)?;
            tracing::info!(channel = ctx.channel, t, "cooled down, charging resumed");
        }
        if ctx.heat_sink()? > thermal.heatsink_overheat {
            return Ok(abort(
                ctx,
                slot,
                FinishReason::HeatSinkOverheat,
                "heat sink overheat",
            ));
        }
        if slot.max_temperature().is_none() && slot.elapsed(ctx.now) > Self::CEILING_AFTER {
            let ceiling = t.saturating_add(thermal.max_charge_rise).min(thermal.max);
            slot.set_max_temperature(ceiling);
            tracing::debug!(channel = ctx.channel, ceiling, "temperature ceiling set");
        }
        Ok(Step::Wait(Self::PERIOD))
    }
}

fn abort<H: ChargerHardware + ?Sized>(
    ctx: &PhaseCtx<'_, H>,
    slot: &mut BatterySlot,
    reason: FinishReason,
    what: &'static str,
) -> Step {
    slot.finish_code(reason, ctx.now);
    tracing::warn!(channel = ctx.channel, reason = reason.name(), "{what}, charging stopped");
    Step::Abort
}

// ── Postcharge ───────────────────────────────────────────────────────────────

/// Reduced-current top-off after the main charge.
#[derive(Debug, Clone, Default)]
pub struct Postcharge;

impl Postcharge {
    const PERIOD: Duration = ms(60_000);
    const SETTLE: Duration = ms(10_000);

    fn init<H: ChargerHardware + ?Sized>(
        &mut self,
        ctx: &mut PhaseCtx<'_, H>,
        slot: &mut BatterySlot,
    ) -> Result<Option<Duration>> {
        let t = ctx.temperature()?;
        let ma = if t >= ctx.cfg.thermal.hot {
            slot.capacity_mah() / 50
        } else {
            slot.capacity_mah() / 20
        };
        ctx.charge_current(ma)?;
        slot.start_charging();
        slot.set_pause(false);
        Ok(Some(ctx.cfg.budget.postcharge))
    }

    fn run<H: ChargerHardware + ?Sized>(
        &mut self,
        ctx: &mut PhaseCtx<'_, H>,
        slot: &mut BatterySlot,
    ) -> Result<Step> {
        let t = ctx.temperature()?;
        slot.update_temperature(t);
        let ceiling = ctx.cfg.voltage.postcharge_mv;

        if slot.phase_complete() {
            ctx.pulse()?;
            let mv = ctx.voltage()?;
            slot.update_voltage(mv);
            if mv > ceiling {
                return Ok(Step::Done);
            }
            slot.set_phase_complete(false);
        }

        let mut apply = slot.toggle_pause();
        let mut next = Self::PERIOD;
        if apply {
            ctx.pulse()?;
            let mv = ctx.voltage()?;
            slot.update_voltage(mv);
            if mv > ceiling {
                slot.set_phase_complete(true);
                next = Self::SETTLE;
                apply = false;
                slot.set_pause(true);
            }
        } else {
            let ma = ctx.current()?;
            slot.update_current(ma);
        }
        if t > ctx.cfg.thermal.max {
            return Ok(abort(ctx, slot, FinishReason::Overheat, "overheat in postcharge"));
        }
        if slot.voltage_drop() {
            return Ok(Step::Done);
        }
        ctx.pause(!apply)?;
        Ok(Step::Wait(next))
    }
}

// ── Keep ─────────────────────────────────────────────────────────────────────

/// Trickle charge forever.
#[derive(Debug, Clone, Default)]
pub struct Keep;

impl Keep {
    const APPLY: Duration = ms(300);
    const PAUSE: Duration = ms(10_000);

    fn init<H: ChargerHardware + ?Sized>(
        &mut self,
        ctx: &mut PhaseCtx<'_, H>,
        slot: &mut BatterySlot,
    ) -> Result<Option<Duration>> {
        slot.start_charging();
        slot.set_pause(true);
        ctx.charge_current(ctx.cfg.current.keep_ma)?;
        ctx.pause(true)?;
        Ok(None)
    }

    fn run<H: ChargerHardware + ?Sized>(
        &mut self,
        ctx: &mut PhaseCtx<'_, H>,
        slot: &mut BatterySlot,
    ) -> Result<Step> {
        let apply = slot.toggle_pause();
        let next = if apply {
            let mv = ctx.voltage()?;
            slot.update_voltage(mv);
            Self::APPLY
        } else {
            let ma = ctx.current()?;
            slot.update_current(ma);
            Self::PAUSE
        };
        ctx.pause(!apply)?;
        Ok(Step::Wait(next))
    }
}

// ── Dispatch ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum Phase {
    Check(Check),
    Discharge(Discharge),
    Precharge(Precharge),
    Charge(Charge),
    Postcharge(Postcharge),
    Keep(Keep),
}

impl Default for Phase {
    fn default() -> Self {
        Phase::Check(Check)
    }
}

impl Phase {
    /// Fresh state for `kind`.
    pub fn for_kind(kind: PhaseKind) -> Self {
        match kind {
            PhaseKind::Check => Phase::Check(Check),
            PhaseKind::Discharge => Phase::Discharge(Discharge::default()),
            PhaseKind::Precharge => Phase::Precharge(Precharge),
            PhaseKind::Charge => Phase::Charge(Charge),
            PhaseKind::Postcharge => Phase::Postcharge(Postcharge),
            PhaseKind::Keep => Phase::Keep(Keep),
        }
    }

    pub fn kind(&self) -> PhaseKind {
        match self {
            Phase::Check(_) => PhaseKind::Check,
            Phase::Discharge(_) => PhaseKind::Discharge,
            Phase::Precharge(_) => PhaseKind::Precharge,
            Phase::Charge(_) => PhaseKind::Charge,
            Phase::Postcharge(_) => PhaseKind::Postcharge,
            Phase::Keep(_) => PhaseKind::Keep,
        }
    }

    /// Enter the phase. Returns its time budget; `None` is unbounded.
    pub fn init<H: ChargerHardware + ?Sized>(
        &mut self,
        ctx: &mut PhaseCtx<'_, H>,
        slot: &mut BatterySlot,
    ) -> Result<Option<Duration>> {
        match self {
            Phase::Check(_) => Ok(None),
            Phase::Discharge(p) => p.init(ctx, slot),
            Phase::Precharge(p) => p.init(ctx, slot),
            Phase::Charge(p) => p.init(ctx, slot),
            Phase::Postcharge(p) => p.init(ctx, slot),
            Phase::Keep(p) => p.init(ctx, slot),
        }
    }

    pub fn run<H: ChargerHardware + ?Sized>(
        &mut self,
        ctx: &mut PhaseCtx<'_, H>,
        slot: &mut BatterySlot,
    ) -> Result<Step> {
        match self {
            Phase::Check(p) => p.run(ctx, slot),
            Phase::Discharge(p) => p.run(ctx, slot),
            Phase::Precharge(p) => p.run(ctx, slot),
            Phase::Charge(p) => p.run(ctx, slot),
            Phase::Postcharge(p) => p.run(ctx, slot),
            Phase::Keep(p) => p.run(ctx, slot),
        }
    }
}
