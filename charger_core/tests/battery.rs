use std::time::{Duration, Instant};

use charger_core::battery::{DROP_GRADIENT, MIN_PRECHARGE};
use charger_core::{BatterySlot, FinishReason, PhaseId, PhaseKind, Schedule, SlotSettings};
use rstest::rstest;

const HOUR: Duration = Duration::from_secs(3600);

fn slot_with(settings: SlotSettings) -> BatterySlot {
    let mut slot = BatterySlot::default();
    slot.init(&settings);
    slot
}

fn settings(capacity_mah: u16, schedule: Schedule) -> SlotSettings {
    SlotSettings {
        capacity_mah,
        schedule,
        ..SlotSettings::default()
    }
}

#[test]
fn fresh_slot_waits_in_check() {
    let slot = BatterySlot::default();
    assert_eq!(slot.phase(), PhaseKind::Check);
    assert_eq!(slot.capacity_mah(), 2000);
    assert_eq!(slot.schedule(), Schedule::Slow);
    assert_eq!(slot.start_time(), None);
    assert_eq!(slot.finish_reason(), FinishReason::Unknown);
}

#[test]
fn phases_advance_in_order() {
    let t0 = Instant::now();
    let mut slot = slot_with(SlotSettings::default());
    assert_eq!(slot.next_phase(false, t0), PhaseKind::Discharge);
    assert_eq!(slot.next_phase(false, t0), PhaseKind::Precharge);
    assert_eq!(slot.start_time(), Some(t0));
    let later = t0 + Duration::from_secs(600);
    assert_eq!(slot.next_phase(false, later), PhaseKind::Charge);
    assert_eq!(slot.next_phase(false, later), PhaseKind::Postcharge);
    assert_eq!(slot.next_phase(false, later), PhaseKind::Keep);
    assert_eq!(slot.next_phase(false, later), PhaseKind::Keep);
}

#[test]
fn skip_discharge_goes_from_check_to_precharge() {
    let mut slot = slot_with(SlotSettings {
        skip_discharge: true,
        loops: 3,
        ..SlotSettings::default()
    });
    assert_eq!(slot.loop_count(), 0, "skipping discharge disables loops");
    assert_eq!(slot.next_phase(false, Instant::now()), PhaseKind::Precharge);
}

#[rstest]
#[case::two_loops(2, PhaseKind::Check, 1)]
#[case::one_loop(1, PhaseKind::Check, 0)]
#[case::no_loops(0, PhaseKind::Keep, 0)]
fn postcharge_loops_back_while_loops_remain(
    #[case] loops: u8,
    #[case] expected: PhaseKind,
    #[case] remaining: u8,
) {
    let mut slot = slot_with(SlotSettings {
        loops,
        ..SlotSettings::default()
    });
    slot.set_phase(PhaseKind::Postcharge);
    assert_eq!(slot.next_phase(false, Instant::now()), expected);
    assert_eq!(slot.loop_count(), remaining);
}

#[rstest]
#[case(PhaseKind::Check)]
#[case(PhaseKind::Discharge)]
#[case(PhaseKind::Charge)]
#[case(PhaseKind::Postcharge)]
fn force_finish_jumps_to_keep(#[case] from: PhaseKind) {
    let now = Instant::now();
    let mut slot = slot_with(SlotSettings::default());
    slot.charge_current(now);
    slot.set_phase(from);
    assert_eq!(slot.next_phase(true, now), PhaseKind::Keep);
    assert_eq!(slot.finish_deadline(), None);
}

#[test]
fn short_precharge_marks_bad_cell() {
    let t0 = Instant::now();
    let mut slot = slot_with(SlotSettings::default());
    slot.set_phase(PhaseKind::Discharge);
    slot.next_phase(false, t0);
    assert_eq!(slot.phase(), PhaseKind::Precharge);
    let early = t0 + MIN_PRECHARGE - Duration::from_secs(1);
    assert_eq!(slot.next_phase(false, early), PhaseKind::Keep);
    assert_eq!(slot.finish_deadline(), None);
}

#[test]
fn short_precharge_is_tolerated_while_looping() {
    let t0 = Instant::now();
    let mut slot = slot_with(SlotSettings {
        loops: 1,
        ..SlotSettings::default()
    });
    slot.set_phase(PhaseKind::Discharge);
    slot.next_phase(false, t0);
    assert_eq!(
        slot.next_phase(false, t0 + Duration::from_secs(5)),
        PhaseKind::Charge
    );
}

#[test]
fn next_phase_clears_phase_scratch() {
    let now = Instant::now();
    let mut slot = slot_with(SlotSettings::default());
    slot.set_phase_complete(true);
    slot.increment_error_count();
    slot.set_max_temperature(400);
    slot.set_precharge_current_seen();
    slot.update_current(500);
    slot.next_phase(false, now);
    assert!(!slot.phase_complete());
    assert_eq!(slot.error_count(), 0);
    assert_eq!(slot.max_temperature(), None);
    assert!(!slot.precharge_current_seen());
    assert!(slot.current_history().is_empty());
}

#[rstest]
#[case::slow(2000, Schedule::Slow, 200, 11)]
#[case::fast(2000, Schedule::Fast, 500, 5)]
#[case::restore_capped(2000, Schedule::Restore, 40, 50)]
#[case::restore_small(600, Schedule::Restore, 30, 20)]
#[case::restore_rounds_hours_up(610, Schedule::Restore, 30, 21)]
#[case::restore_tiny(20, Schedule::Restore, 1, 20)]
fn charge_current_and_session_length(
    #[case] capacity: u16,
    #[case] schedule: Schedule,
    #[case] ma: u16,
    #[case] hours: u32,
) {
    let now = Instant::now();
    let mut slot = slot_with(settings(capacity, schedule));
    assert_eq!(slot.charge_current(now), ma);
    assert_eq!(slot.finish_deadline(), Some(now + HOUR * hours));
}

#[test]
fn remaining_recomputes_expired_deadline() {
    let t0 = Instant::now();
    let mut slot = slot_with(SlotSettings::default());
    slot.finish_code(FinishReason::Ok, t0);
    let later = t0 + Duration::from_secs(10);
    assert_eq!(slot.remaining(later), HOUR * 11);
    assert_eq!(slot.remaining(later + HOUR), HOUR * 10);
}

#[test]
fn time_left_never_restamps_the_deadline() {
    let t0 = Instant::now();
    let mut slot = slot_with(SlotSettings::default());
    slot.charge_current(t0);
    assert_eq!(slot.time_left(t0 + HOUR), HOUR * 10);

    slot.finish_code(FinishReason::Ok, t0);
    let later = t0 + Duration::from_secs(10);
    for _ in 0..3 {
        assert_eq!(slot.time_left(later), Duration::ZERO);
    }
    assert_eq!(slot.finish_deadline(), Some(t0));
}

#[test]
fn elapsed_counts_from_precharge_entry() {
    let t0 = Instant::now();
    let mut slot = slot_with(SlotSettings::default());
    assert_eq!(slot.elapsed(t0), Duration::ZERO);
    slot.set_phase(PhaseKind::Discharge);
    slot.next_phase(false, t0);
    assert_eq!(slot.elapsed(t0 + HOUR), HOUR);
}

#[test]
fn finish_code_records_reason_and_ends_session() {
    let now = Instant::now();
    let mut slot = slot_with(SlotSettings::default());
    slot.charge_current(now);
    slot.finish_code(FinishReason::MaxVoltage, now);
    assert_eq!(slot.finish_reason(), FinishReason::MaxVoltage);
    assert_eq!(slot.finish_deadline(), Some(now));
}

#[rstest]
#[case(Schedule::Slow, PhaseId::ChargeSlow)]
#[case(Schedule::Restore, PhaseId::ChargeRestore)]
#[case(Schedule::Fast, PhaseId::ChargeFast)]
fn charge_identity_depends_on_schedule(#[case] schedule: Schedule, #[case] id: PhaseId) {
    let mut slot = slot_with(settings(2000, schedule));
    slot.set_phase(PhaseKind::Charge);
    assert_eq!(slot.phase_identity(), id);
}

#[test]
fn other_identities_follow_phase() {
    let mut slot = BatterySlot::default();
    for (kind, id) in [
        (PhaseKind::Check, PhaseId::Check),
        (PhaseKind::Discharge, PhaseId::Discharge),
        (PhaseKind::Precharge, PhaseId::Precharge),
        (PhaseKind::Postcharge, PhaseId::Postcharge),
        (PhaseKind::Keep, PhaseId::Keep),
    ] {
        slot.set_phase(kind);
        assert_eq!(slot.phase_identity(), id);
    }
}

#[test]
fn voltage_drop_needs_half_a_history() {
    let mut slot = BatterySlot::default();
    for mv in [1400, 1390, 1380, 1370, 1360, 1350, 1340] {
        slot.update_voltage(mv);
        assert!(!slot.voltage_drop());
    }
}

#[test]
fn voltage_drop_ignored_until_rise_seen() {
    let mut slot = BatterySlot::default();
    for i in 0..12u16 {
        slot.update_voltage(1400 - i * 10);
        assert!(!slot.voltage_drop());
    }
    assert!(!slot.rising_voltage_latched());
}

#[test]
fn voltage_drop_after_rise() {
    let mut slot = BatterySlot::default();
    for i in 0..8u16 {
        slot.update_voltage(1300 + i * 10);
        assert!(!slot.voltage_drop());
    }
    assert!(slot.rising_voltage_latched());
    let mut first_drop = None;
    for i in 0..16u16 {
        slot.update_voltage(1370 - i * 10);
        let dropped = slot.voltage_drop();
        let g = slot.voltage_history().gradient();
        assert_eq!(dropped, g < DROP_GRADIENT, "sample {i}, gradient {g}");
        if dropped && first_drop.is_none() {
            first_drop = Some(i);
        }
    }
    // The fall has to outweigh the rise still in the history first.
    assert_eq!(first_drop, Some(8));
    assert!(slot.voltage_drop());
}

#[test]
fn start_charging_clears_rise_latch() {
    let mut slot = BatterySlot::default();
    for i in 0..8u16 {
        slot.update_voltage(1300 + i * 10);
    }
    slot.voltage_drop();
    assert!(slot.rising_voltage_latched());
    slot.register_overheat(true);
    slot.start_charging();
    assert!(!slot.rising_voltage_latched());
    assert!(!slot.overheated());
    assert_eq!(slot.voltage_history().len(), 1);
    assert_eq!(slot.average_voltage(), 1370);
}

#[test]
fn window_flag_toggles_and_overheat_forces_pause() {
    let mut slot = BatterySlot::default();
    assert!(slot.toggle_pause());
    assert!(!slot.toggle_pause());
    slot.register_overheat(true);
    assert!(slot.pause());
    assert!(!slot.toggle_pause());
}

#[test]
fn init_resets_to_check() {
    let now = Instant::now();
    let mut slot = slot_with(SlotSettings::default());
    slot.next_phase(false, now);
    slot.update_voltage(1200);
    slot.init(&settings(1000, Schedule::Fast));
    assert_eq!(slot.phase(), PhaseKind::Check);
    assert_eq!(slot.capacity_mah(), 1000);
    assert_eq!(slot.schedule(), Schedule::Fast);
    assert!(slot.voltage_history().is_empty());
}
