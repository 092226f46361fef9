use charger_hardware::pid::{DEFAULT_DENOMINATOR_BITS, RESET_POWER};
use charger_hardware::{Gain, PidController};
use rstest::rstest;

fn scaled(power: i64) -> i32 {
    let bits = DEFAULT_DENOMINATOR_BITS;
    ((power + (1 << (bits - 1))) >> bits) as i32
}

#[test]
fn first_call_uses_direct_form() {
    let mut pid = PidController::default();
    let out = pid.request_power(100, 70);
    assert_eq!(pid.i_sum(), 30);
    // 128*30 + 50*30
    assert_eq!(pid.power(), 5340);
    assert_eq!(out, scaled(5340));
}

#[test]
fn overshoot_before_reaching_target_snaps_back_once() {
    let mut pid = PidController::default();
    pid.request_power(100, 70);
    let out = pid.request_power(100, 110);
    assert_eq!(pid.i_sum(), 0);
    assert!(pid.reached());
    assert_eq!(pid.power(), RESET_POWER);
    assert_eq!(out, scaled(i64::from(RESET_POWER)));

    // The latch is one-shot: a second overshoot takes the incremental path.
    let before = pid.power();
    pid.request_power(100, 120);
    assert_eq!(pid.power(), before + 128 * (110 - 120) + 50 * (100 - 120));
}

#[test]
fn incremental_law_after_first_call() {
    let mut pid = PidController::default();
    pid.request_power(100, 70);
    pid.request_power(100, 80);
    // 5340 + 128*(70-80) + 50*(100-80)
    assert_eq!(pid.power(), 5340 - 1280 + 1000);
    assert!(!pid.reached());
}

#[test]
fn reset_clears_history_and_latch() {
    let mut pid = PidController::default();
    pid.request_power(100, 70);
    pid.request_power(100, 110);
    pid.reset();
    assert!(!pid.reached());
    assert_eq!(pid.power(), RESET_POWER);
    pid.request_power(50, 50);
    assert_eq!(pid.power(), 0);
}

#[rstest]
#[case(Gain::Proportional, 128)]
#[case(Gain::Integral, 50)]
fn negative_gain_only_queries(#[case] which: Gain, #[case] default: i32) {
    let mut pid = PidController::default();
    assert_eq!(pid.change_gain(which, -1), default);
    assert_eq!(pid.change_gain(which, 7), 7);
    assert_eq!(pid.change_gain(which, -5), 7);
}
