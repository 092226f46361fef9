use std::sync::Arc;
use std::time::Duration;

use charger_config::{ConfigRecord, Schedule};
use charger_core::mocks::FakeHardware;
use charger_core::{BuildError, Charger, ChargerBuilder, ChargerCfg, SlotSettings};
use charger_traits::ManualClock;
use rstest::rstest;

fn invalid(err: &eyre::Report) -> &'static str {
    match err.downcast_ref::<BuildError>() {
        Some(BuildError::InvalidConfig(msg)) => *msg,
        other => panic!("expected InvalidConfig, got {other:?}"),
    }
}

#[test]
fn try_build_without_hardware_fails() {
    let err = ChargerBuilder::<FakeHardware>::default()
        .try_build()
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::MissingHardware)
    ));
}

#[test]
fn hardware_without_channels_is_rejected() {
    let err = Charger::builder()
        .with_hardware(FakeHardware::new(0))
        .build()
        .unwrap_err();
    assert!(invalid(&err).contains("no channels"));
}

#[test]
fn more_slots_than_channels_is_rejected() {
    let err = Charger::builder()
        .with_hardware(FakeHardware::new(1))
        .with_slots([SlotSettings::default(); 2])
        .build()
        .unwrap_err();
    assert!(invalid(&err).contains("more slot settings"));
}

#[test]
fn tiny_capacity_is_rejected() {
    let err = Charger::builder()
        .with_hardware(FakeHardware::new(2))
        .with_slots([SlotSettings {
            capacity_mah: 10,
            ..SlotSettings::default()
        }])
        .build()
        .unwrap_err();
    assert!(invalid(&err).contains("capacity"));
}

#[rstest]
#[case::voltage_order(|c: &mut ChargerCfg| c.voltage.min_mv = 50, "voltage thresholds")]
#[case::precharge_current(|c: &mut ChargerCfg| c.current.precharge_ma = 0, "currents")]
#[case::keep_current(|c: &mut ChargerCfg| c.current.keep_ma = 0, "currents")]
#[case::hot_above_max(|c: &mut ChargerCfg| c.thermal.hot = 600, "hot temperature")]
#[case::zero_tick(|c: &mut ChargerCfg| c.tick = Duration::ZERO, "tick")]
fn bad_config_is_rejected(#[case] tweak: fn(&mut ChargerCfg), #[case] needle: &str) {
    let mut cfg = ChargerCfg::default();
    tweak(&mut cfg);
    let err = Charger::builder()
        .with_hardware(FakeHardware::new(2))
        .with_config(cfg)
        .build()
        .unwrap_err();
    assert!(invalid(&err).contains(needle), "{err}");
}

#[test]
fn record_settings_reach_the_slots() {
    let mut record = ConfigRecord::default();
    record.slots[1].capacity_mah = 800;
    record.slots[1].schedule = Schedule::Fast;
    record.slots[1].loops = 2;
    record.slots[1].set_skip_discharge(true);

    let charger = Charger::builder()
        .with_hardware(FakeHardware::new(2))
        .with_clock(Arc::new(ManualClock::new()))
        .with_record(&record)
        .build()
        .unwrap();
    assert_eq!(charger.slot(0).unwrap().settings(), SlotSettings::default());
    let slot = charger.slot(1).unwrap();
    assert_eq!(slot.capacity_mah(), 800);
    assert_eq!(slot.schedule(), Schedule::Fast);
    assert!(slot.skip_discharge());
    assert_eq!(slot.loop_count(), 0);
}

#[test]
fn missing_slot_settings_use_defaults() {
    let charger = Charger::builder()
        .with_hardware(FakeHardware::new(2))
        .with_slots([SlotSettings {
            schedule: Schedule::Restore,
            ..SlotSettings::default()
        }])
        .build()
        .unwrap();
    assert_eq!(charger.channels(), 2);
    assert_eq!(charger.slot(0).unwrap().schedule(), Schedule::Restore);
    assert_eq!(charger.slot(1).unwrap().schedule(), Schedule::Slow);
}
