//! Cooperative dispatcher over all channels.
//!
//! One [`Charger::tick`] visits channel 0, then 1, and so on. For each it
//! runs one regulation step, enforces the phase budget, and runs the phase
//! if its wake instant has passed. A finished phase hands over to the next
//! one within the same tick; the new phase first runs on the next tick.

use std::sync::Arc;
use std::time::{Duration, Instant};

use charger_traits::{ChargeCounters, ChargerHardware, Clock};
use crossbeam_channel as xch;
use eyre::WrapErr;

use crate::battery::{BatterySlot, FinishReason, PhaseId, PhaseKind};
use crate::config::{ChargerCfg, SlotSettings};
use crate::error::{ChargerError, Result};
use crate::hw_error::map_hw_error;
use crate::phase::{Phase, PhaseCtx, Step};
use crate::util::until;

/// Notifications for observers (display, log, CLI).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotEvent {
    PhaseStarted {
        channel: usize,
        phase: PhaseId,
        /// Time since the charger was built.
        at: Duration,
    },
    /// The slot reached Keep.
    SessionFinished {
        channel: usize,
        reason: FinishReason,
        charged_mah: u32,
        at: Duration,
    },
}

/// Snapshot of one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotStatus {
    pub channel: usize,
    pub phase: PhaseKind,
    pub identity: PhaseId,
    pub settings: SlotSettings,
    pub voltage_mv: u16,
    pub current_ma: u16,
    /// Smoothed, tenths °C.
    pub temperature: i16,
    pub elapsed: Duration,
    pub remaining: Duration,
    pub finish_reason: FinishReason,
    pub counters: ChargeCounters,
}

#[derive(Debug)]
struct Channel {
    slot: BatterySlot,
    phase: Phase,
    wake_at: Instant,
    budget_deadline: Option<Instant>,
    /// Set between a transition and a successful `init` of the new phase.
    init_pending_from: Option<PhaseKind>,
}

impl Channel {
    fn new(cfg: &ChargerCfg, settings: &SlotSettings, now: Instant) -> Self {
        let mut slot = BatterySlot::new(cfg.current.restore_max_ma);
        slot.init(settings);
        Self {
            slot,
            phase: Phase::default(),
            wake_at: now,
            budget_deadline: None,
            init_pending_from: None,
        }
    }
}

pub struct Charger<H: ChargerHardware> {
    pub(crate) hw: H,
    pub(crate) cfg: ChargerCfg,
    pub(crate) clock: Arc<dyn Clock + Send + Sync>,
    pub(crate) epoch: Instant,
    channels: Vec<Channel>,
    events: Option<xch::Sender<SlotEvent>>,
}

impl<H: ChargerHardware> core::fmt::Debug for Charger<H> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Charger")
            .field("channels", &self.channels.len())
            .field(
                "phases",
                &self
                    .channels
                    .iter()
                    .map(|c| c.slot.phase())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl<H: ChargerHardware> Charger<H> {
    pub(crate) fn new(
        hw: H,
        cfg: ChargerCfg,
        clock: Arc<dyn Clock + Send + Sync>,
        settings: &[SlotSettings],
        events: Option<xch::Sender<SlotEvent>>,
    ) -> Self {
        let now = clock.now();
        let channels = (0..hw.channels())
            .map(|i| Channel::new(&cfg, &settings.get(i).copied().unwrap_or_default(), now))
            .collect();
        Self {
            hw,
            cfg,
            clock,
            epoch: now,
            channels,
            events,
        }
    }

    pub fn channels(&self) -> usize {
        self.channels.len()
    }

    pub fn config(&self) -> &ChargerCfg {
        &self.cfg
    }

    pub fn hardware(&self) -> &H {
        &self.hw
    }

    pub fn hardware_mut(&mut self) -> &mut H {
        &mut self.hw
    }

    pub fn slot(&self, channel: usize) -> Option<&BatterySlot> {
        self.channels.get(channel).map(|c| &c.slot)
    }

    pub fn phase(&self, channel: usize) -> Option<PhaseKind> {
        self.slot(channel).map(BatterySlot::phase)
    }

    /// Time since the charger was built.
    pub fn uptime(&self) -> Duration {
        self.clock.now().saturating_duration_since(self.epoch)
    }

    /// True once every channel is trickle charging.
    pub fn all_kept(&self) -> bool {
        self.channels.iter().all(|c| c.slot.phase().is_terminal())
    }

    /// Replace a slot's settings. Only allowed while the slot is in Check.
    pub fn configure(&mut self, channel: usize, settings: &SlotSettings) -> Result<()> {
        let now = self.clock.now();
        let ch = self.channels.get_mut(channel).ok_or_else(|| {
            eyre::Report::new(ChargerError::Config(format!("no channel {channel}")))
        })?;
        if ch.slot.phase() != PhaseKind::Check {
            return Err(eyre::Report::new(ChargerError::State(format!(
                "channel {channel} is in {}, settings can only change in check",
                ch.slot.phase().name()
            ))));
        }
        ch.slot.init(settings);
        ch.phase = Phase::default();
        ch.wake_at = now;
        ch.budget_deadline = None;
        ch.init_pending_from = None;
        if let Err(e) = self.hw.set_discharge(channel, false) {
            tracing::warn!(channel, error = %e, "set_discharge failed on reconfigure");
        }
        self.hw.reset_counters(channel);
        tracing::info!(
            channel,
            capacity_mah = settings.capacity_mah,
            schedule = settings.schedule.name(),
            loops = settings.loops,
            skip_discharge = settings.skip_discharge,
            "slot configured"
        );
        Ok(())
    }

    pub fn status(&self, channel: usize) -> Option<SlotStatus> {
        let now = self.clock.now();
        let counters = self.hw.counters(channel);
        let slot = &self.channels.get(channel)?.slot;
        Some(SlotStatus {
            channel,
            phase: slot.phase(),
            identity: slot.phase_identity(),
            settings: slot.settings(),
            voltage_mv: slot.average_voltage(),
            current_ma: slot.average_current(),
            temperature: slot.average_temperature(),
            elapsed: slot.elapsed(now),
            remaining: slot.time_left(now),
            finish_reason: slot.finish_reason(),
            counters,
        })
    }

    /// One pass over every channel.
    ///
    /// A hardware error in a channel switches that channel off (best effort)
    /// and is returned; channels after it are not visited this tick.
    pub fn tick(&mut self) -> Result<()> {
        let now = self.clock.now();
        for channel in 0..self.channels.len() {
            if let Err(e) = self.tick_channel(channel, now) {
                self.shutdown_channel(channel);
                return Err(e).wrap_err_with(|| format!("channel {channel}"));
            }
        }
        Ok(())
    }

    fn tick_channel(&mut self, channel: usize, now: Instant) -> Result<()> {
        self.hw
            .keep_current(channel)
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("keep_current")?;

        let Some(ch) = self.channels.get_mut(channel) else {
            return Ok(());
        };
        if let Some(from) = ch.init_pending_from {
            tracing::debug!(channel, phase = ch.phase.kind().name(), "retrying phase init");
            return self.start_phase(channel, from, now);
        }
        if let Some(deadline) = ch.budget_deadline
            && now >= deadline
        {
            let kind = ch.phase.kind();
            tracing::warn!(channel, phase = kind.name(), "phase budget expired");
            return self.advance(channel, kind == PhaseKind::Precharge, now);
        }
        if now < ch.wake_at {
            return Ok(());
        }

        let mut ctx = PhaseCtx {
            hw: &mut self.hw,
            channel,
            cfg: &self.cfg,
            now,
        };
        match ch.phase.run(&mut ctx, &mut ch.slot)? {
            Step::Wait(d) => {
                ch.wake_at = now + d;
                Ok(())
            }
            Step::Done => self.advance(channel, false, now),
            Step::Abort => self.advance(channel, true, now),
        }
    }

    fn advance(&mut self, channel: usize, force_finish: bool, now: Instant) -> Result<()> {
        let Some(ch) = self.channels.get_mut(channel) else {
            return Ok(());
        };
        let from = ch.slot.phase();
        let kind = ch.slot.next_phase(force_finish, now);
        if kind == from && kind.is_terminal() {
            return Ok(());
        }
        ch.phase = Phase::for_kind(kind);
        // No budget is armed until init succeeds.
        ch.budget_deadline = None;
        ch.wake_at = now;
        ch.init_pending_from = Some(from);
        self.start_phase(channel, from, now)
    }

    /// Run `init` for the channel's current phase; on error it is retried next tick.
    fn start_phase(&mut self, channel: usize, from: PhaseKind, now: Instant) -> Result<()> {
        let Some(ch) = self.channels.get_mut(channel) else {
            return Ok(());
        };
        let kind = ch.phase.kind();
        let mut ctx = PhaseCtx {
            hw: &mut self.hw,
            channel,
            cfg: &self.cfg,
            now,
        };
        let budget = ch.phase.init(&mut ctx, &mut ch.slot)?;
        ch.init_pending_from = None;
        ch.budget_deadline = budget.map(|d| now + d);
        ch.wake_at = now;

        let identity = ch.slot.phase_identity();
        let reason = ch.slot.finish_reason();
        let at = now.saturating_duration_since(self.epoch);
        tracing::info!(
            channel,
            from = from.name(),
            phase = identity.name(),
            budget_s = budget.map(|d| d.as_secs()),
            "phase started"
        );
        if tracing::enabled!(tracing::Level::DEBUG) {
            let dump: Vec<u16> = ch.slot.voltage_history().samples().collect();
            tracing::debug!(channel, voltage = ?dump, gradient = ch.slot.voltage_history().gradient(), "voltage history");
        }
        self.emit(SlotEvent::PhaseStarted {
            channel,
            phase: identity,
            at,
        });
        if kind.is_terminal() {
            let charged_mah = self.hw.counters(channel).charged_mah;
            tracing::info!(channel, reason = reason.name(), charged_mah, "session finished");
            self.emit(SlotEvent::SessionFinished {
                channel,
                reason,
                charged_mah,
                at,
            });
        }
        Ok(())
    }

    fn emit(&self, ev: SlotEvent) {
        if let Some(tx) = &self.events
            && let Err(e) = tx.try_send(ev)
        {
            tracing::debug!(error = %e, "slot event dropped");
        }
    }

    fn shutdown_channel(&mut self, channel: usize) {
        if let Err(e) = self.hw.set_charge_current(channel, 0) {
            tracing::warn!(channel, error = %e, "set_charge_current(0) failed on shutdown");
        }
        if let Err(e) = self.hw.set_discharge(channel, false) {
            tracing::warn!(channel, error = %e, "set_discharge(false) failed on shutdown");
        }
    }

    /// Switch every channel off (best effort).
    pub fn stop(&mut self) {
        for channel in 0..self.channels.len() {
            self.shutdown_channel(channel);
        }
        tracing::info!("charger stopped");
    }

    /// Time until the earliest channel wants to run.
    pub fn next_wake(&self) -> Duration {
        let now = self.clock.now();
        self.channels
            .iter()
            .map(|c| until(c.wake_at, now))
            .min()
            .unwrap_or(self.cfg.tick)
    }
}
