//! Drives a [`Charger`] until told to stop.
//!
//! Interrupt-style inputs (encoder, Ctrl-C, a UI thread) cannot touch the
//! charger directly; they send [`Command`]s over a bounded channel, and the
//! runner drains it between ticks.

use std::time::Duration;

use charger_traits::ChargerHardware;
use crossbeam_channel as xch;
use eyre::WrapErr;

use crate::charger::Charger;
use crate::config::SlotSettings;
use crate::error::Result;

/// Depth of the command queue returned by [`command_channel`].
pub const COMMAND_QUEUE: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Configure {
        channel: usize,
        settings: SlotSettings,
    },
    Stop,
}

/// Why [`Runner::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// A `Stop` command arrived.
    Stopped,
    /// Every channel reached Keep and the runner was asked to stop there.
    AllKept,
    /// The time limit passed.
    TimeLimit,
}

pub fn command_channel() -> (xch::Sender<Command>, xch::Receiver<Command>) {
    xch::bounded(COMMAND_QUEUE)
}

pub struct Runner<H: ChargerHardware> {
    charger: Charger<H>,
    commands: xch::Receiver<Command>,
    stop_when_kept: bool,
}

impl<H: ChargerHardware> core::fmt::Debug for Runner<H> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Runner")
            .field("charger", &self.charger)
            .field("stop_when_kept", &self.stop_when_kept)
            .finish()
    }
}

impl<H: ChargerHardware> Runner<H> {
    pub fn new(charger: Charger<H>, commands: xch::Receiver<Command>) -> Self {
        Self {
            charger,
            commands,
            stop_when_kept: false,
        }
    }

    /// Return `AllKept` once every channel is trickle charging.
    pub fn stop_when_kept(mut self, on: bool) -> Self {
        self.stop_when_kept = on;
        self
    }

    pub fn charger(&self) -> &Charger<H> {
        &self.charger
    }

    pub fn charger_mut(&mut self) -> &mut Charger<H> {
        &mut self.charger
    }

    pub fn into_charger(self) -> Charger<H> {
        self.charger
    }

    /// Run until stopped, all kept (if enabled), or `limit` has passed.
    pub fn run(&mut self, limit: Option<Duration>) -> Result<RunOutcome> {
        self.run_with(limit, |_| {})
    }

    /// Like [`run`](Self::run), calling `on_tick` after every tick.
    pub fn run_with<F>(&mut self, limit: Option<Duration>, mut on_tick: F) -> Result<RunOutcome>
    where
        F: FnMut(&mut Charger<H>),
    {
        let start = self.charger.uptime();
        let tick = self.charger.config().tick;
        tracing::info!(
            channels = self.charger.channels(),
            tick_ms = crate::util::as_millis_u64(tick),
            "runner start"
        );
        loop {
            if self.drain_commands() {
                self.charger.stop();
                return Ok(RunOutcome::Stopped);
            }

            if let Err(e) = self.charger.tick() {
                tracing::error!(error = %e, "tick failed");
                self.charger.stop();
                return Err(e).wrap_err("charger tick");
            }
            on_tick(&mut self.charger);

            if self.stop_when_kept && self.charger.all_kept() {
                tracing::info!("all channels in keep");
                return Ok(RunOutcome::AllKept);
            }
            if let Some(limit) = limit
                && self.charger.uptime().saturating_sub(start) >= limit
            {
                tracing::info!(limit_s = limit.as_secs(), "time limit reached");
                self.charger.stop();
                return Ok(RunOutcome::TimeLimit);
            }
            self.charger.clock.sleep(tick);
        }
    }

    /// Apply queued commands. Returns true when a stop was requested.
    fn drain_commands(&mut self) -> bool {
        loop {
            match self.commands.try_recv() {
                Ok(Command::Stop) => {
                    tracing::info!("stop requested");
                    return true;
                }
                Ok(Command::Configure { channel, settings }) => {
                    if let Err(e) = self.charger.configure(channel, &settings) {
                        tracing::warn!(channel, error = %e, "configure rejected");
                    }
                }
                Err(xch::TryRecvError::Empty | xch::TryRecvError::Disconnected) => return false,
            }
        }
    }
}
