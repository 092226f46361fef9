use charger_core::{ExponentialAverage, SampleHistory};
use rstest::rstest;

fn history<const N: usize>(values: &[u16]) -> SampleHistory<N> {
    let mut h = SampleHistory::<N>::new();
    for &v in values {
        h.update(v);
    }
    h
}

#[test]
fn ema_first_updates_follow_accumulator() {
    let mut e = ExponentialAverage::new(4);
    assert_eq!(e.average(100), 25);
    assert_eq!(e.average(100), 44);
    e.reset();
    assert_eq!(e.read(), 0);
}

#[test]
fn ema_settles_on_constant_input() {
    let mut e = ExponentialAverage::new(8);
    for _ in 0..500 {
        e.update(1234);
    }
    assert_eq!(e.read(), 1234);
}

#[test]
fn ema_tracks_negative_values() {
    let mut e = ExponentialAverage::new(4);
    for _ in 0..200 {
        e.update(-250);
    }
    assert_eq!(e.read(), -250);
}

#[rstest]
#[case::empty(&[], 0)]
#[case::single(&[1234], 1234)]
#[case::three(&[10, 20, 30], 20)]
#[case::rounds_half_up(&[1, 2], 2)]
#[case::rounds_down(&[1, 1, 2], 1)]
fn history_mean(#[case] values: &[u16], #[case] expected: u16) {
    assert_eq!(history::<16>(values).read(), expected);
}

#[test]
fn gradient_of_ramp_is_slope_times_hundred() {
    let h = history::<16>(&[10, 20, 30]);
    assert_eq!(h.gradient(), 1000);
    let falling = history::<16>(&[30, 20, 10]);
    assert_eq!(falling.gradient(), -1000);
}

#[rstest]
#[case::too_short(&[10, 20])]
#[case::flat(&[1200, 1200, 1200, 1200, 1200])]
fn gradient_is_zero(#[case] values: &[u16]) {
    assert_eq!(history::<16>(values).gradient(), 0);
}

#[test]
fn gradient_uses_ring_order_after_wrap() {
    // Ring of 4 holds 30, 40, 50, 60 after the wrap, oldest first.
    let h = history::<4>(&[100, 90, 30, 40, 50, 60]);
    assert!(h.is_full());
    assert_eq!(h.samples().collect::<Vec<_>>(), vec![30, 40, 50, 60]);
    assert_eq!(h.gradient(), 1000);
    assert_eq!(h.read(), 45);
}

#[test]
fn dispersion_needs_three_samples() {
    assert_eq!(history::<16>(&[]).dispersion(), 1000.0);
    assert_eq!(history::<16>(&[5, 9]).dispersion(), 1000.0);
}

#[test]
fn dispersion_of_constant_is_bias_only() {
    let h = history::<16>(&[500, 500, 500, 500]);
    assert_eq!(h.dispersion(), 2.0);
}

#[test]
fn dispersion_grows_with_spread() {
    let tight = history::<16>(&[1000, 1001, 999, 1000]);
    let loose = history::<16>(&[900, 1100, 950, 1050]);
    assert!(loose.dispersion() > tight.dispersion());
}

#[test]
fn retain_latest_keeps_most_recent() {
    let mut h = history::<4>(&[1, 2, 3, 4, 5, 6]);
    h.retain_latest();
    assert_eq!(h.len(), 1);
    assert_eq!(h.read(), 6);

    let mut empty = SampleHistory::<4>::new();
    empty.retain_latest();
    assert!(empty.is_empty());
}

#[test]
fn reset_empties_history() {
    let mut h = history::<8>(&[7, 8, 9]);
    h.reset();
    assert!(h.is_empty());
    assert_eq!(h.read(), 0);
    assert_eq!(h.latest(), None);
    assert_eq!(SampleHistory::<8>::CAPACITY, 8);
}
