use charger_core::{ExponentialAverage, SampleHistory};
use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};

// Synthetic charge curve: slow rise, a peak, then a small drop, plus noise
fn synth_voltage(n: usize, seed: u32) -> Vec<u16> {
    let mut state = seed.max(1);
    let mut noise = || {
        let mut x = state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        state = x;
        (x % 7) as i32 - 3
    };
    (0..n)
        .map(|i| {
            let t = i as i32;
            let base = if t < 600 { 1200 + t / 3 } else { 1400 - (t - 600) / 2 };
            (base + noise()).clamp(0, i32::from(u16::MAX)) as u16
        })
        .collect()
}

fn configure(g: &mut criterion::BenchmarkGroup<'_, criterion::measurement::WallTime>) {
    // BENCH_SAMPLE_SIZE=10 BENCH_MEAS_MS=50 cargo bench -p charger_core --bench stats
    if let Ok(ss) = std::env::var("BENCH_SAMPLE_SIZE")
        && let Ok(n) = ss.parse::<usize>()
    {
        g.sample_size(n.max(10));
    } else {
        g.sample_size(50);
    }
    if let Ok(ms) = std::env::var("BENCH_MEAS_MS")
        && let Ok(ms_u64) = ms.parse::<u64>()
    {
        g.measurement_time(std::time::Duration::from_millis(ms_u64));
    }
}

pub fn bench_history(c: &mut Criterion) {
    let mut g = c.benchmark_group("sample_history");
    configure(&mut g);
    let trace = synth_voltage(720, 0xC0FFEE);

    g.bench_function("update_and_gradient_16", |b| {
        b.iter_batched(
            SampleHistory::<16>::new,
            |mut h| {
                let mut acc = 0i64;
                for &v in &trace {
                    h.update(black_box(v));
                    acc += i64::from(h.gradient());
                }
                black_box(acc);
            },
            BatchSize::SmallInput,
        )
    });
    g.bench_function("dispersion_16", |b| {
        let mut h = SampleHistory::<16>::new();
        for &v in &trace[..16] {
            h.update(v);
        }
        b.iter(|| black_box(h.dispersion()))
    });
    g.finish();
}

pub fn bench_ema(c: &mut Criterion) {
    let mut g = c.benchmark_group("exponential_average");
    configure(&mut g);
    let trace = synth_voltage(720, 0xBADC0DE);
    for k in [4u8, 8, 16] {
        g.bench_function(format!("k_{k}"), |b| {
            b.iter(|| {
                let mut e = ExponentialAverage::new(k);
                for &v in &trace {
                    e.update(i32::from(black_box(v)));
                }
                black_box(e.read())
            })
        });
    }
    g.finish();
}

criterion_group!(stats, bench_history, bench_ema);
criterion_main!(stats);
