//! Per-channel battery state.
//!
//! A `BatterySlot` owns everything the phases remember about one cell: its
//! settings, the position in the phase sequence, the session deadline,
//! reading histories and a few phase-scoped flags. Phases mutate it; the
//! transition rule lives in [`BatterySlot::next_phase`].

use std::time::{Duration, Instant};

use charger_config::Schedule;

use crate::config::SlotSettings;
use crate::stat::{ExponentialAverage, SampleHistory};
use crate::util::{SECS_PER_HOUR, hours};

pub const VOLTAGE_HISTORY: usize = 16;
pub const CURRENT_HISTORY: usize = 4;
/// Smoothing length of the reported temperature.
pub const TEMPERATURE_SMOOTHING: u8 = 4;
/// A precharge shorter than this without looping marks a bad cell.
pub const MIN_PRECHARGE: Duration = Duration::from_secs(60);
/// Gradient (x100) that proves the voltage has been rising.
pub const RISING_GRADIENT: i32 = 4;
/// Gradient (x100) that counts as a voltage drop once rising was seen.
pub const DROP_GRADIENT: i32 = -10;

const SLOW_SESSION: Duration = hours(11);
const FAST_SESSION: Duration = hours(5);

/// Position in the treatment sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PhaseKind {
    Check = 0,
    Discharge = 1,
    Precharge = 2,
    Charge = 3,
    Postcharge = 4,
    Keep = 5,
}

impl PhaseKind {
    pub const ALL: [PhaseKind; 6] = [
        PhaseKind::Check,
        PhaseKind::Discharge,
        PhaseKind::Precharge,
        PhaseKind::Charge,
        PhaseKind::Postcharge,
        PhaseKind::Keep,
    ];

    pub const fn index(self) -> u8 {
        self as u8
    }

    pub fn from_index(i: u8) -> Option<Self> {
        Self::ALL.get(usize::from(i)).copied()
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, PhaseKind::Keep)
    }

    pub const fn name(self) -> &'static str {
        match self {
            PhaseKind::Check => "check",
            PhaseKind::Discharge => "discharge",
            PhaseKind::Precharge => "precharge",
            PhaseKind::Charge => "charge",
            PhaseKind::Postcharge => "postcharge",
            PhaseKind::Keep => "keep",
        }
    }

    fn succ(self) -> Self {
        Self::from_index(self.index() + 1).unwrap_or(PhaseKind::Keep)
    }
}

/// Phase as shown to the user: Charge is split by schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhaseId {
    Check = 0,
    Discharge = 1,
    Precharge = 2,
    ChargeSlow = 3,
    ChargeRestore = 4,
    ChargeFast = 5,
    Postcharge = 6,
    Keep = 7,
}

impl PhaseId {
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub const fn name(self) -> &'static str {
        match self {
            PhaseId::Check => "check",
            PhaseId::Discharge => "discharge",
            PhaseId::Precharge => "precharge",
            PhaseId::ChargeSlow => "charge (slow)",
            PhaseId::ChargeRestore => "charge (restore)",
            PhaseId::ChargeFast => "charge (fast)",
            PhaseId::Postcharge => "postcharge",
            PhaseId::Keep => "keep",
        }
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FinishReason {
    #[default]
    Unknown,
    /// Voltage drop detected: the cell is full.
    Ok,
    Overheat,
    MaxVoltage,
    HeatSinkOverheat,
}

impl FinishReason {
    pub const fn name(self) -> &'static str {
        match self {
            FinishReason::Unknown => "unknown",
            FinishReason::Ok => "ok",
            FinishReason::Overheat => "overheat",
            FinishReason::MaxVoltage => "max voltage",
            FinishReason::HeatSinkOverheat => "heat sink overheat",
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatterySlot {
    capacity_mah: u16,
    schedule: Schedule,
    loop_count: u8,
    skip_discharge: bool,
    restore_max_ma: u16,
    phase: PhaseKind,
    start_time: Option<Instant>,
    finish_deadline: Option<Instant>,
    voltage: SampleHistory<VOLTAGE_HISTORY>,
    current: SampleHistory<CURRENT_HISTORY>,
    temperature: ExponentialAverage,
    // phase-scoped
    phase_complete: bool,
    error_count: u8,
    pause: bool,
    overheated: bool,
    max_temperature: Option<i16>,
    precharge_current_seen: bool,
    finish_reason: FinishReason,
    rising_voltage_latched: bool,
}

impl Default for BatterySlot {
    fn default() -> Self {
        Self::new(40)
    }
}

impl BatterySlot {
    /// A slot in Check with default settings. `restore_max_ma` caps the
    /// Restore schedule current.
    pub fn new(restore_max_ma: u16) -> Self {
        let defaults = SlotSettings::default();
        Self {
            capacity_mah: defaults.capacity_mah,
            schedule: defaults.schedule,
            loop_count: defaults.loops,
            skip_discharge: defaults.skip_discharge,
            restore_max_ma: restore_max_ma.max(1),
            phase: PhaseKind::Check,
            start_time: None,
            finish_deadline: None,
            voltage: SampleHistory::new(),
            current: SampleHistory::new(),
            temperature: ExponentialAverage::new(TEMPERATURE_SMOOTHING),
            phase_complete: false,
            error_count: 0,
            pause: false,
            overheated: false,
            max_temperature: None,
            precharge_current_seen: false,
            finish_reason: FinishReason::Unknown,
            rising_voltage_latched: false,
        }
    }

    /// Apply new settings and start over from Check.
    pub fn init(&mut self, settings: &SlotSettings) {
        *self = Self {
            capacity_mah: settings.capacity_mah,
            schedule: settings.schedule,
            loop_count: if settings.skip_discharge {
                0
            } else {
                settings.loops
            },
            skip_discharge: settings.skip_discharge,
            ..Self::new(self.restore_max_ma)
        };
    }

    pub fn settings(&self) -> SlotSettings {
        SlotSettings {
            capacity_mah: self.capacity_mah,
            schedule: self.schedule,
            loops: self.loop_count,
            skip_discharge: self.skip_discharge,
        }
    }

    pub fn capacity_mah(&self) -> u16 {
        self.capacity_mah
    }

    pub fn schedule(&self) -> Schedule {
        self.schedule
    }

    pub fn loop_count(&self) -> u8 {
        self.loop_count
    }

    pub fn skip_discharge(&self) -> bool {
        self.skip_discharge
    }

    pub fn phase(&self) -> PhaseKind {
        self.phase
    }

    pub fn set_phase(&mut self, phase: PhaseKind) {
        self.phase = phase;
    }

    // ── Readings ─────────────────────────────────────────────────────────────

    /// Feed a voltage reading; returns the running average.
    pub fn update_voltage(&mut self, mv: u16) -> u16 {
        self.voltage.average(mv)
    }

    pub fn average_voltage(&self) -> u16 {
        self.voltage.read()
    }

    /// Feed a current reading; returns the running average.
    pub fn update_current(&mut self, ma: u16) -> u16 {
        self.current.average(ma)
    }

    pub fn average_current(&self) -> u16 {
        self.current.read()
    }

    pub fn update_temperature(&mut self, t: i16) -> i16 {
        let avg = self.temperature.average(i32::from(t));
        i16::try_from(avg).unwrap_or(t)
    }

    pub fn average_temperature(&self) -> i16 {
        i16::try_from(self.temperature.read()).unwrap_or(0)
    }

    pub fn voltage_history(&self) -> &SampleHistory<VOLTAGE_HISTORY> {
        &self.voltage
    }

    pub fn current_history(&self) -> &SampleHistory<CURRENT_HISTORY> {
        &self.current
    }

    // ── Phase scratch ────────────────────────────────────────────────────────

    /// Flip the window flag and return it: `true` selects the apply window
    /// (charge or discharge on), `false` the pause/measure window.
    pub fn toggle_pause(&mut self) -> bool {
        self.pause = !self.pause;
        self.pause
    }

    pub fn set_pause(&mut self, pause: bool) {
        self.pause = pause;
    }

    pub fn pause(&self) -> bool {
        self.pause
    }

    /// Latching overheat also forces the window flag on, so the next toggle
    /// lands in the measure window.
    pub fn register_overheat(&mut self, over: bool) {
        self.overheated = over;
        if over {
            self.pause = true;
        }
    }

    pub fn overheated(&self) -> bool {
        self.overheated
    }

    pub fn phase_complete(&self) -> bool {
        self.phase_complete
    }

    pub fn set_phase_complete(&mut self, complete: bool) {
        self.phase_complete = complete;
    }

    pub fn error_count(&self) -> u8 {
        self.error_count
    }

    pub fn reset_error_count(&mut self) {
        self.error_count = 0;
    }

    /// Returns the new count.
    pub fn increment_error_count(&mut self) -> u8 {
        self.error_count = self.error_count.saturating_add(1);
        self.error_count
    }

    pub fn max_temperature(&self) -> Option<i16> {
        self.max_temperature
    }

    pub fn set_max_temperature(&mut self, ceiling: i16) {
        self.max_temperature = Some(ceiling);
    }

    pub fn precharge_current_seen(&self) -> bool {
        self.precharge_current_seen
    }

    pub fn set_precharge_current_seen(&mut self) {
        self.precharge_current_seen = true;
    }

    // ── Session timing ───────────────────────────────────────────────────────

    pub fn start_time(&self) -> Option<Instant> {
        self.start_time
    }

    pub fn finish_deadline(&self) -> Option<Instant> {
        self.finish_deadline
    }

    /// Time since the charging session started (Precharge entry).
    pub fn elapsed(&self, now: Instant) -> Duration {
        self.start_time
            .map_or(Duration::ZERO, |s| now.saturating_duration_since(s))
    }

    /// Time left until the session deadline, without touching it. Zero once
    /// the deadline has passed or the session finished.
    pub fn time_left(&self, now: Instant) -> Duration {
        self.finish_deadline
            .map_or(Duration::ZERO, |d| d.saturating_duration_since(now))
    }

    /// Time left in the session. An expired or cancelled deadline is
    /// recomputed first, so this never returns a stale zero.
    pub fn remaining(&mut self, now: Instant) -> Duration {
        match self.finish_deadline {
            Some(d) if d > now => d - now,
            _ => {
                self.charge_current(now);
                self.finish_deadline
                    .map_or(Duration::ZERO, |d| d.saturating_duration_since(now))
            }
        }
    }

    /// Main charge current for the schedule; also restamps the session deadline.
    pub fn charge_current(&mut self, now: Instant) -> u16 {
        let (current, session) = match self.schedule {
            Schedule::Restore => {
                let current = (self.capacity_mah / 20).min(self.restore_max_ma).max(1);
                let h = u64::from(self.capacity_mah).div_ceil(u64::from(current));
                (current, Duration::from_secs(h * SECS_PER_HOUR))
            }
            Schedule::Slow => (self.capacity_mah / 10, SLOW_SESSION),
            Schedule::Fast => (self.capacity_mah / 4, FAST_SESSION),
        };
        self.finish_deadline = Some(now + session);
        current
    }

    pub fn finish_reason(&self) -> FinishReason {
        self.finish_reason
    }

    pub fn finish_code(&mut self, reason: FinishReason, now: Instant) {
        self.finish_reason = reason;
        self.finish_deadline = Some(now);
    }

    // ── Transitions ──────────────────────────────────────────────────────────

    /// Advance to the next phase and return it.
    ///
    /// `force_finish` jumps straight to Keep. A Precharge that ended within
    /// [`MIN_PRECHARGE`] on a non-looping slot is a bad cell and also goes to
    /// Keep. Postcharge loops back to Check while loops remain.
    pub fn next_phase(&mut self, force_finish: bool, now: Instant) -> PhaseKind {
        if force_finish && !self.phase.is_terminal() {
            self.phase = PhaseKind::Keep;
            self.finish_deadline = None;
        } else if self.phase == PhaseKind::Precharge
            && self.loop_count == 0
            && self.elapsed(now) < MIN_PRECHARGE
        {
            self.phase = PhaseKind::Keep;
            self.finish_deadline = None;
        } else if !self.phase.is_terminal() {
            let mut next = if self.phase == PhaseKind::Postcharge && self.loop_count > 0 {
                self.loop_count -= 1;
                PhaseKind::Check
            } else {
                self.phase.succ()
            };
            if next == PhaseKind::Discharge && self.skip_discharge {
                next = PhaseKind::Precharge;
            }
            if next == PhaseKind::Precharge {
                self.start_time = Some(now);
                self.charge_current(now);
            }
            self.phase = next;
            self.current.reset();
        }
        self.error_count = 0;
        self.phase_complete = false;
        self.max_temperature = None;
        self.precharge_current_seen = false;
        self.phase
    }

    pub fn phase_identity(&self) -> PhaseId {
        match self.phase {
            PhaseKind::Check => PhaseId::Check,
            PhaseKind::Discharge => PhaseId::Discharge,
            PhaseKind::Precharge => PhaseId::Precharge,
            PhaseKind::Charge => match self.schedule {
                Schedule::Slow => PhaseId::ChargeSlow,
                Schedule::Restore => PhaseId::ChargeRestore,
                Schedule::Fast => PhaseId::ChargeFast,
            },
            PhaseKind::Postcharge => PhaseId::Postcharge,
            PhaseKind::Keep => PhaseId::Keep,
        }
    }

    /// Reset charge-scoped state at the start of Charge, Postcharge or Keep.
    pub fn start_charging(&mut self) {
        self.overheated = false;
        self.rising_voltage_latched = false;
        self.voltage.retain_latest();
        self.current.retain_latest();
    }

    /// Negative delta-V detector.
    ///
    /// Needs a half-full voltage history. Reports nothing until a rising
    /// gradient has been seen since charging started, then reports a drop
    /// once the gradient turns clearly negative.
    pub fn voltage_drop(&mut self) -> bool {
        if self.voltage.len() < VOLTAGE_HISTORY / 2 {
            return false;
        }
        let g = self.voltage.gradient();
        if !self.rising_voltage_latched {
            if g > RISING_GRADIENT {
                self.rising_voltage_latched = true;
            }
            return false;
        }
        g < DROP_GRADIENT
    }

    pub fn rising_voltage_latched(&self) -> bool {
        self.rising_voltage_latched
    }
}
