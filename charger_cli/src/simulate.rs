//! `charger simulate`: a full session on the simulated charger.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use charger_config::{Config, RecordStore};
use charger_core::{
    Charger, ChargerCfg, Command, RunOutcome, Runner, SlotEvent, SlotSettings, command_channel,
};
use charger_hardware::{CellSpec, PidGains, SimConfig, SimulatedCharger};
use charger_traits::{ChargerHardware, ManualClock};
use crossbeam_channel as xch;
use eyre::WrapErr;

const EVENT_QUEUE: usize = 64;

#[derive(Debug)]
pub struct Options {
    pub hours: f64,
    pub csv: Option<PathBuf>,
    pub sample_s: u64,
    pub until_kept: bool,
    pub json: bool,
}

pub fn sim_config(cfg: &Config) -> SimConfig {
    SimConfig {
        ambient: cfg.simulation.ambient,
        cells: cfg
            .simulation
            .cells
            .iter()
            .map(|c| CellSpec {
                present: c.present,
                capacity_mah: c.capacity_mah,
                state_of_charge: c.state_of_charge,
            })
            .collect(),
        pid: PidGains {
            kp: cfg.pid.kp,
            ki: cfg.pid.ki,
            denominator_bits: cfg.pid.denominator_bits,
        },
        ..SimConfig::default()
    }
}

/// Build a charger on the simulator with the stored slot settings.
pub fn build_charger(
    cfg: &Config,
    clock: &ManualClock,
    events: Option<xch::Sender<SlotEvent>>,
) -> eyre::Result<Charger<SimulatedCharger>> {
    let store = RecordStore::new(&cfg.store.path);
    let (valid, record) = store.load()?;
    if !valid {
        tracing::warn!(path = %store.path().display(), "no valid slot record, using defaults");
    }

    let sim = SimulatedCharger::new(sim_config(cfg), Arc::new(clock.clone()));
    let slots: Vec<SlotSettings> = record
        .slots
        .iter()
        .take(sim.channels())
        .map(SlotSettings::from)
        .collect();

    let mut builder = Charger::builder()
        .with_config(ChargerCfg::from(cfg))
        .with_clock(Arc::new(clock.clone()))
        .with_slots(slots)
        .with_hardware(sim);
    if let Some(tx) = events {
        builder = builder.with_events(tx);
    }
    builder.build()
}

pub fn run(cfg: &Config, opts: &Options) -> eyre::Result<()> {
    let limit = Duration::try_from_secs_f64(opts.hours.max(0.0) * 3600.0)
        .wrap_err_with(|| format!("--hours {} is out of range", opts.hours))?;
    let sample = Duration::from_secs(opts.sample_s.max(1));

    let clock = ManualClock::new();
    let (event_tx, event_rx) = xch::bounded(EVENT_QUEUE);
    let charger = build_charger(cfg, &clock, Some(event_tx))?;
    let channels = charger.channels();

    let (cmd_tx, cmd_rx) = command_channel();
    let stop_tx = cmd_tx.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(Command::Stop);
    }) {
        tracing::warn!(error = %e, "failed to install Ctrl-C handler");
    }

    let mut trace = match &opts.csv {
        Some(path) => Some(
            csv::Writer::from_path(path)
                .wrap_err_with(|| format!("create trace {}", path.display()))?,
        ),
        None => None,
    };
    if let Some(w) = trace.as_mut() {
        w.write_record([
            "t_s",
            "channel",
            "phase",
            "voltage_mv",
            "current_ma",
            "temperature",
            "remaining_s",
        ])
        .wrap_err("write trace header")?;
    }

    tracing::info!(
        hours = opts.hours,
        channels,
        until_kept = opts.until_kept,
        "simulation start"
    );

    let mut runner = Runner::new(charger, cmd_rx).stop_when_kept(opts.until_kept);
    let mut next_sample = Duration::ZERO;
    let mut trace_err: Option<csv::Error> = None;
    let outcome = runner.run_with(Some(limit), |c| {
        for ev in event_rx.try_iter() {
            print_event(&ev, opts.json);
        }
        let now = clock.elapsed();
        if now < next_sample {
            return;
        }
        next_sample = now + sample;
        if trace_err.is_some() {
            return;
        }
        let Some(w) = trace.as_mut() else { return };
        for ch in 0..c.channels() {
            let Some(s) = c.status(ch) else { continue };
            let row = [
                now.as_secs().to_string(),
                ch.to_string(),
                s.identity.name().to_string(),
                s.voltage_mv.to_string(),
                s.current_ma.to_string(),
                s.temperature.to_string(),
                s.remaining.as_secs().to_string(),
            ];
            if let Err(e) = w.write_record(&row) {
                trace_err = Some(e);
                break;
            }
        }
    });
    // Events published by the last tick.
    for ev in event_rx.try_iter() {
        print_event(&ev, opts.json);
    }
    let outcome = outcome?;

    if let Some(e) = trace_err {
        return Err(eyre::Report::new(e)).wrap_err("write trace row");
    }
    if let Some(mut w) = trace {
        w.flush().wrap_err("flush trace")?;
    }

    let charger = runner.into_charger();
    tracing::info!(?outcome, simulated_s = clock.elapsed().as_secs(), "simulation end");
    print_summary(&charger, outcome, clock.elapsed(), opts.json);
    Ok(())
}

fn print_event(ev: &SlotEvent, json: bool) {
    match *ev {
        SlotEvent::PhaseStarted { channel, phase, at } => {
            if json {
                println!(
                    "{}",
                    serde_json::json!({
                        "event": "phase",
                        "channel": channel,
                        "phase": phase.name(),
                        "at_s": at.as_secs(),
                    })
                );
            } else {
                println!("[{:>6}s] channel {channel}: {}", at.as_secs(), phase.name());
            }
        }
        SlotEvent::SessionFinished {
            channel,
            reason,
            charged_mah,
            at,
        } => {
            if json {
                println!(
                    "{}",
                    serde_json::json!({
                        "event": "finished",
                        "channel": channel,
                        "reason": reason.name(),
                        "charged_mah": charged_mah,
                        "at_s": at.as_secs(),
                    })
                );
            } else {
                println!(
                    "[{:>6}s] channel {channel}: finished ({}), {charged_mah} mAh charged",
                    at.as_secs(),
                    reason.name()
                );
            }
        }
    }
}

fn print_summary(
    charger: &Charger<SimulatedCharger>,
    outcome: RunOutcome,
    simulated: Duration,
    json: bool,
) {
    let outcome_name = match outcome {
        RunOutcome::Stopped => "stopped",
        RunOutcome::AllKept => "all_kept",
        RunOutcome::TimeLimit => "time_limit",
    };
    if !json {
        println!(
            "Simulation ended ({outcome_name}) after {:.2} h",
            simulated.as_secs_f64() / 3600.0
        );
    }
    for ch in 0..charger.channels() {
        let Some(s) = charger.status(ch) else { continue };
        if json {
            println!(
                "{}",
                serde_json::json!({
                    "event": "summary",
                    "outcome": outcome_name,
                    "channel": ch,
                    "phase": s.identity.name(),
                    "reason": s.finish_reason.name(),
                    "charged_mah": s.counters.charged_mah,
                    "discharged_mah": s.counters.discharged_mah,
                    "elapsed_s": s.elapsed.as_secs(),
                })
            );
        } else {
            println!(
                "  channel {ch}: {} ({}), charged {} mAh, discharged {} mAh",
                s.identity.name(),
                s.finish_reason.name(),
                s.counters.charged_mah,
                s.counters.discharged_mah
            );
        }
    }
}
