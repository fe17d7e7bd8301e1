//! Measurement benchmarks

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use vq_engine::{Mode, Visqol};

fn sine(freq: f64, rate: u32, seconds: f64) -> Vec<f64> {
    (0..(rate as f64 * seconds) as usize)
        .map(|i| 0.7 * (2.0 * std::f64::consts::PI * freq * i as f64 / rate as f64).sin())
        .collect()
}

fn degrade(signal: &[f64]) -> Vec<f64> {
    signal.iter().map(|s| (s * 1.5).clamp(-0.8, 0.8)).collect()
}

fn bench_audio_high_fidelity(c: &mut Criterion) {
    let engine = Visqol::new(Mode::Audio).unwrap();
    let reference = sine(440.0, 48_000, 3.0);
    let degraded = degrade(&reference);

    c.bench_function("measure_audio_3s", |b| {
        b.iter(|| {
            engine
                .measure(black_box(reference.clone()), black_box(degraded.clone()))
                .unwrap()
        })
    });
}

fn bench_audio_approximate(c: &mut Criterion) {
    let engine = Visqol::builder().probe(|| false).build().unwrap();
    let reference = sine(440.0, 48_000, 3.0);
    let degraded = degrade(&reference);

    c.bench_function("measure_audio_3s_approximate", |b| {
        b.iter(|| {
            engine
                .measure(black_box(reference.clone()), black_box(degraded.clone()))
                .unwrap()
        })
    });
}

fn bench_speech(c: &mut Criterion) {
    let engine = Visqol::new(Mode::Speech).unwrap();
    let reference = sine(300.0, 16_000, 3.0);
    let degraded = degrade(&reference);

    c.bench_function("measure_speech_3s", |b| {
        b.iter(|| {
            engine
                .measure(black_box(reference.clone()), black_box(degraded.clone()))
                .unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_audio_high_fidelity,
    bench_audio_approximate,
    bench_speech
);
criterion_main!(benches);
