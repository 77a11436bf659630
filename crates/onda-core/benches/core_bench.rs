//! Criterion benchmarks for onda-core blocks and the scheduler.
//!
//! - **Resampler**: polyphase throughput for the FM chain ratios
//! - **Modulation**: WFM TX/RX per input chunk
//! - **Scheduler**: tick overhead on the full transmit chain
//!
//! Run with: `cargo bench -p onda-core`
#![allow(missing_docs)]

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use onda_core::blocks::{NullSink, RationalResampler, ToneSource, WfmRcv, WfmTx};
use onda_core::{Block, Complex32, FlowGraph, SchedulerConfig, Samples};

const CHUNK: usize = 4096;

fn bench_resampler(c: &mut Criterion) {
    let mut group = c.benchmark_group("resampler");
    for &(l, m) in &[(10u32, 1u32), (1, 10), (160, 147)] {
        let mut r = RationalResampler::<f32>::new(l, m).unwrap();
        let input: Vec<f32> = (0..CHUNK - CHUNK % m as usize)
            .map(|n| (n as f32 * 0.01).sin())
            .collect();
        let mut output = vec![0.0f32; input.len() * l as usize / m as usize + l as usize];
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{l}/{m}")),
            &input,
            |b, input| {
                b.iter(|| black_box(r.process_slice(black_box(input), &mut output)));
            },
        );
    }
    group.finish();
}

fn bench_modulation(c: &mut Criterion) {
    let mut group = c.benchmark_group("wfm");

    let mut tx = WfmTx::new(48_000.0, 480_000.0, 75e-6, 75e3).unwrap();
    let audio = [Samples::Real(vec![0.25; 480])];
    let mut iq = [Samples::Complex(vec![Complex32::default(); 4_800])];
    group.bench_function("tx_480_in", |b| {
        b.iter(|| tx.process(black_box(&audio), &mut iq).unwrap());
    });

    let mut rx = WfmRcv::new(480_000.0, 10).unwrap();
    let carrier: Vec<Complex32> = (0..4_800)
        .map(|n| Complex32::from_polar(1.0, n as f32 * 0.05))
        .collect();
    let inputs = [Samples::Complex(carrier)];
    let mut pcm = [Samples::Real(vec![0.0; 480])];
    group.bench_function("rx_4800_in", |b| {
        b.iter(|| rx.process(black_box(&inputs), &mut pcm).unwrap());
    });

    group.finish();
}

fn bench_scheduler(c: &mut Criterion) {
    let mut g = FlowGraph::new();
    let tone = g.add_block(ToneSource::real(48_000.0, 1_000.0, 0.5));
    let interp = g.add_block(RationalResampler::<f32>::for_rates(48_000.0, 480_000.0).unwrap());
    let modulator = g.add_block(WfmTx::new(480_000.0, 480_000.0, 75e-6, 5e3).unwrap());
    let sink = g.add_block(NullSink::<Complex32>::new());
    g.connect(tone.output(0), interp.input(0)).unwrap();
    g.connect(interp.output(0), modulator.input(0)).unwrap();
    g.connect(modulator.output(0), sink.input(0)).unwrap();
    let mut scheduler = g.into_scheduler(SchedulerConfig::default()).unwrap();

    c.bench_function("scheduler/tx_chain_tick", |b| {
        b.iter(|| black_box(scheduler.tick().unwrap()));
    });
}

criterion_group!(benches, bench_resampler, bench_modulation, bench_scheduler);
criterion_main!(benches);
