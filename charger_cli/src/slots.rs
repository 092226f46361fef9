//! `charger config` and `charger self-check`: the persisted slot record.

use charger_config::record::SLOTS;
use charger_config::{Config, ConfigRecord, RecordStore, SlotRecord};
use charger_core::ChargerError;
use charger_traits::ManualClock;
use eyre::WrapErr;

use crate::cli::ConfigAction;
use crate::simulate::build_charger;

pub fn run(cfg: &Config, action: ConfigAction, json: bool) -> eyre::Result<()> {
    let store = RecordStore::new(&cfg.store.path);
    match action {
        ConfigAction::Show => {
            let (valid, record) = store.load()?;
            print_record(&store, valid, &record, json);
        }
        ConfigAction::Set {
            slot,
            capacity,
            schedule,
            loops,
            skip_discharge,
        } => {
            if slot >= SLOTS {
                return Err(eyre::Report::new(ChargerError::Config(format!(
                    "slot {slot} out of range (0..{SLOTS})"
                ))));
            }
            let (_, mut record) = store.load()?;
            let s = &mut record.slots[slot];
            if let Some(c) = capacity {
                s.capacity_mah = c;
            }
            if let Some(sch) = schedule {
                s.schedule = sch;
            }
            if let Some(l) = loops {
                s.loops = l;
            }
            if let Some(skip) = skip_discharge {
                s.set_skip_discharge(skip);
            }
            let saved = store.save(&record)?;
            print_record(&store, true, &saved, json);
        }
    }
    Ok(())
}

/// Config already validated on load; this checks the record and builds a charger.
pub fn self_check(cfg: &Config, json: bool) -> eyre::Result<()> {
    let store = RecordStore::new(&cfg.store.path);
    let record_found = match std::fs::read(store.path()) {
        Ok(bytes) => {
            ConfigRecord::decode(&bytes)
                .map_err(eyre::Report::new)
                .wrap_err_with(|| format!("slot record {}", store.path().display()))?;
            true
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            return Err(e).wrap_err_with(|| format!("read {}", store.path().display()));
        }
    };

    let clock = ManualClock::new();
    let mut charger = build_charger(cfg, &clock, None)?;
    charger.tick().wrap_err("first tick")?;
    charger.stop();

    if json {
        println!(
            "{}",
            serde_json::json!({
                "ok": true,
                "channels": charger.channels(),
                "record": record_found,
            })
        );
    } else {
        if !record_found {
            println!("no slot record at {}, defaults apply", store.path().display());
        }
        println!("self-check ok ({} channels)", charger.channels());
    }
    Ok(())
}

fn print_record(store: &RecordStore, valid: bool, record: &ConfigRecord, json: bool) {
    if json {
        let slots: Vec<_> = record
            .slots
            .iter()
            .enumerate()
            .map(|(i, s)| slot_json(i, s))
            .collect();
        println!(
            "{}",
            serde_json::json!({
                "path": store.path().display().to_string(),
                "valid": valid,
                "slots": slots,
            })
        );
        return;
    }
    if !valid {
        println!("{}: no valid record, showing defaults", store.path().display());
    }
    for (i, s) in record.slots.iter().enumerate() {
        println!(
            "slot {i}: {} mAh, {}, loops {}, skip discharge {}",
            s.capacity_mah,
            s.schedule.name(),
            s.loops,
            if s.skip_discharge() { "yes" } else { "no" }
        );
    }
}

fn slot_json(slot: usize, s: &SlotRecord) -> serde_json::Value {
    serde_json::json!({
        "slot": slot,
        "capacity_mah": s.capacity_mah,
        "schedule": s.schedule.name(),
        "loops": s.loops,
        "skip_discharge": s.skip_discharge(),
    })
}
