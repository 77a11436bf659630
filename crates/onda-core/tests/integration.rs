//! Integration tests for onda-core: whole graphs driven by the scheduler.

use std::f64::consts::TAU;

use onda_core::blocks::{
    RationalResampler, ToneSource, VectorSink, VectorSource, WfmRcv, WfmTx,
};
use onda_core::{Complex32, FlowGraph, GraphError, SchedulerConfig};

mod common;

use common::fit_tone;

/// Instantaneous frequency in Hz of a complex baseband stream.
fn instantaneous_frequency(iq: &[Complex32], sample_rate: f64) -> Vec<f32> {
    iq.windows(2)
        .map(|w| (w[1] * w[0].conj()).arg() * (sample_rate / TAU) as f32)
        .collect()
}

fn sine(sample_rate: f64, freq: f64, amplitude: f32, len: usize) -> Vec<f32> {
    (0..len)
        .map(|n| amplitude * (TAU * freq * n as f64 / sample_rate).sin() as f32)
        .collect()
}

// ---------------------------------------------------------------------------
// Transmit chain
// ---------------------------------------------------------------------------

#[test]
fn tx_chain_deviation_tracks_tone() {
    let mut g = FlowGraph::new();
    let tone = g.add_block(ToneSource::real(48_000.0, 1_000.0, 0.5));
    let interp = g.add_block(RationalResampler::<f32>::for_rates(48_000.0, 480_000.0).unwrap());
    let modulator = g.add_block(WfmTx::new(480_000.0, 480_000.0, 75e-6, 5e3).unwrap());
    let (sink, captured) = VectorSink::<Complex32>::new();
    let sink = g.add_block(sink.with_rate(480_000.0));
    g.connect(tone.output(0), interp.input(0)).unwrap();
    g.connect(interp.output(0), modulator.input(0)).unwrap();
    g.connect(modulator.output(0), sink.input(0)).unwrap();

    let mut scheduler = g.into_scheduler(SchedulerConfig::default()).unwrap();
    while captured.len() < 96_000 {
        assert!(scheduler.tick().unwrap().progressed());
    }

    let iq = captured.snapshot();
    let freq = instantaneous_frequency(&iq, 480_000.0);
    let steady = &freq[2_000..];
    let (amp, rms) = fit_tone(steady, TAU * 1_000.0 / 480_000.0);

    // 0.5 full scale at 5 kHz deviation, lifted ~1.105x by 75 µs pre-emphasis at 1 kHz.
    let expected = 0.5 * 5e3 * 1.105;
    assert!((amp - expected).abs() / expected < 0.03, "deviation {amp} Hz");
    assert!(rms / amp < 0.01, "residual {rms} Hz");
    assert!(steady.iter().all(|f| f.abs() < 3_000.0));
}

#[test]
fn tx_chain_without_resampler_is_rate_mismatch() {
    let mut g = FlowGraph::new();
    let tone = g.add_block(ToneSource::real(48_000.0, 1_000.0, 0.5));
    let modulator = g.add_block(WfmTx::new(480_000.0, 480_000.0, 75e-6, 5e3).unwrap());
    let (sink, _) = VectorSink::<Complex32>::new();
    let sink = g.add_block(sink);
    g.connect(tone.output(0), modulator.input(0)).unwrap();
    g.connect(modulator.output(0), sink.input(0)).unwrap();

    assert!(matches!(
        g.into_scheduler(SchedulerConfig::default()),
        Err(GraphError::RateMismatch { .. })
    ));
}

// ---------------------------------------------------------------------------
// Receive chain
// ---------------------------------------------------------------------------

#[test]
fn rx_chain_rates_validate() {
    let quad_rate = 500_000.0;
    let audio_rate = 50_000.0;
    let mut g = FlowGraph::new();
    let radio = g.add_block(VectorSource::repeating(
        vec![Complex32::new(1.0, 0.0); 16],
        quad_rate,
    ));
    let demod = g.add_block(WfmRcv::new(quad_rate, (quad_rate / audio_rate) as u32).unwrap());
    let (speaker, _) = VectorSink::<f32>::new();
    let speaker = g.add_block(speaker.with_rate(audio_rate));
    g.connect(radio.output(0), demod.input(0)).unwrap();
    g.connect(demod.output(0), speaker.input(0)).unwrap();

    let plan = g.validate().unwrap();
    assert_eq!(plan.input_rate(speaker), Some(audio_rate));
}

#[test]
fn rx_chain_wrong_audio_rate_fails() {
    let mut g = FlowGraph::new();
    let radio = g.add_block(VectorSource::repeating(
        vec![Complex32::new(1.0, 0.0); 16],
        500_000.0,
    ));
    let demod = g.add_block(WfmRcv::new(500_000.0, 10).unwrap());
    let (speaker, _) = VectorSink::<f32>::new();
    let speaker = g.add_block(speaker.with_rate(48_000.0));
    g.connect(radio.output(0), demod.input(0)).unwrap();
    g.connect(demod.output(0), speaker.input(0)).unwrap();

    let err = g.validate().unwrap_err();
    assert!(err.is_configuration());
    assert!(err.to_string().contains("48000"));
}

// ---------------------------------------------------------------------------
// Round trip
// ---------------------------------------------------------------------------

#[test]
fn fm_round_trip_reproduces_audio() {
    let audio_rate = 48_000.0;
    let quad_rate = 480_000.0;
    let audio = sine(audio_rate, 1_000.0, 0.5, 48_000);

    let mut g = FlowGraph::new();
    let src = g.add_block(VectorSource::new(audio, audio_rate));
    let modulator = g.add_block(WfmTx::new(audio_rate, quad_rate, 75e-6, 75e3).unwrap());
    let demod = g.add_block(WfmRcv::with_params(quad_rate, 10, 75e3, 75e-6).unwrap());
    let (sink, captured) = VectorSink::<f32>::new();
    let sink = g.add_block(sink.with_rate(audio_rate));
    g.connect(src.output(0), modulator.input(0)).unwrap();
    g.connect(modulator.output(0), demod.input(0)).unwrap();
    g.connect(demod.output(0), sink.input(0)).unwrap();

    let mut scheduler = g.into_scheduler(SchedulerConfig::default()).unwrap();
    scheduler.run_until_idle(10_000).unwrap();
    assert!(scheduler.sources_finished());

    let out = captured.snapshot();
    assert_eq!(out.len(), 48_000);
    let (amp, rms) = fit_tone(&out[1_000..], TAU * 1_000.0 / audio_rate);
    assert!((amp - 0.5).abs() < 0.01, "amplitude {amp}");
    let snr_db = 20.0 * (amp / 2f64.sqrt() / rms).log10();
    assert!(snr_db > 40.0, "snr {snr_db} dB");
}

#[test]
fn round_trip_through_fractional_ratio() {
    // 44.1 kHz → 48 kHz is 160/147; the scheduler must keep whole periods.
    let input = sine(44_100.0, 2_000.0, 0.25, 44_100);
    let mut g = FlowGraph::new();
    let src = g.add_block(VectorSource::new(input, 44_100.0));
    let rs = g.add_block(RationalResampler::<f32>::for_rates(44_100.0, 48_000.0).unwrap());
    let (sink, captured) = VectorSink::<f32>::new();
    let sink = g.add_block(sink.with_rate(48_000.0));
    g.connect(src.output(0), rs.input(0)).unwrap();
    g.connect(rs.output(0), sink.input(0)).unwrap();

    let mut scheduler = g.into_scheduler(SchedulerConfig::default()).unwrap();
    scheduler.run_until_idle(1_000).unwrap();
    assert_eq!(captured.len(), 48_000);
    let out = captured.snapshot();
    let (amp, _) = fit_tone(&out[2_000..], TAU * 2_000.0 / 48_000.0);
    assert!((amp - 0.25).abs() < 0.0025, "amplitude {amp}");
}
