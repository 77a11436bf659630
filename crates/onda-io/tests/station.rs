//! End-to-end tests: topologies running on simulated radios under a `Station`.

use std::f64::consts::TAU;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use onda_core::Complex32;
use onda_io::{
    DeviceCapabilities, Error, RadioParams, RxChain, SimSignal, SimulatedRadio, State, ToneChain,
    TransceiveChain, TxChain, WavOutput, baseband_tone, fm_receiver, fm_transmitter, read_wav,
    tone_transceiver,
};

fn usrp() -> DeviceCapabilities {
    DeviceCapabilities::usrp1_rfx900()
}

/// Instantaneous frequency of consecutive samples, in Hz. Pairs touching an
/// underrun gap are skipped.
fn inst_freq(samples: &[Complex32], rate: f64) -> Vec<f64> {
    samples
        .windows(2)
        .filter(|w| w[0].norm() > 0.5 && w[1].norm() > 0.5)
        .map(|w| f64::from((w[1] * w[0].conj()).arg()) * rate / TAU)
        .collect()
}

/// Least-squares amplitude of a sinusoid at `freq`, plus the residual RMS.
fn fit_tone(signal: &[f32], freq: f64, rate: f64) -> (f64, f64) {
    let w = TAU * freq / rate;
    let (mut ss, mut cc, mut sc, mut ys, mut yc) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for (n, &y) in signal.iter().enumerate() {
        let (s, c) = (w * n as f64).sin_cos();
        let y = f64::from(y);
        ss += s * s;
        cc += c * c;
        sc += s * c;
        ys += y * s;
        yc += y * c;
    }
    let det = ss * cc - sc * sc;
    let a = (ys * cc - yc * sc) / det;
    let b = (yc * ss - ys * sc) / det;
    let residual = signal
        .iter()
        .enumerate()
        .map(|(n, &y)| {
            let (s, c) = (w * n as f64).sin_cos();
            (f64::from(y) - a * s - b * c).powi(2)
        })
        .sum::<f64>()
        / signal.len() as f64;
    (a.hypot(b), residual.sqrt())
}

fn wait_for(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    done()
}

#[test]
fn tx_deviation_tracks_tone_and_stops_in_time() {
    let (radio, probe) = SimulatedRadio::new(usrp());
    let tx = fm_transmitter(&TxChain::default(), Box::new(radio), |_| {
        Err(Error::DeviceUnavailable("no microphone in tests".into()))
    })
    .unwrap();

    tx.station.start().unwrap();
    assert!(wait_for(Duration::from_secs(10), || probe.transmitted() >= 150_000));

    let stop_started = Instant::now();
    tx.station.stop().unwrap();
    tx.station.wait().unwrap();
    assert!(stop_started.elapsed() < Duration::from_secs(1));
    assert_eq!(tx.station.state(), State::Stopped);
    assert_eq!(probe.closes(), 1);

    // Skip the zero padding sent before the graph filled the ring and the
    // resampler's start-up transient.
    let captured = probe.captured();
    let first = captured.iter().position(|c| c.norm() > 0.5).unwrap();
    let live = &captured[first + 4_000..];
    assert!(live.len() > 50_000);
    assert!(live.iter().filter(|c| c.norm() > 0.5).all(|c| (c.norm() - 1.0).abs() < 1e-3));

    let freqs = inst_freq(&live[..50_000], 480_000.0);
    assert!(freqs.len() > 10_000);
    let peak = freqs.iter().fold(0.0f64, |m, f| m.max(f.abs()));
    // 0.5 full scale at 5 kHz deviation, lifted 1.105x by 75 µs pre-emphasis at 1 kHz.
    let expected = 0.5 * 5e3 * 1.105;
    assert!((peak - expected).abs() < 0.03 * expected, "peak deviation {peak}");
}

#[test]
fn stop_interrupts_stalled_hardware() {
    let (radio, probe) = SimulatedRadio::new(usrp());
    let topology = baseband_tone(&ToneChain::default(), Box::new(radio.stalled())).unwrap();
    topology.station.start().unwrap();
    thread::sleep(Duration::from_millis(50));
    assert!(probe.is_open());

    let started = Instant::now();
    topology.station.stop().unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(!probe.is_open());
    assert_eq!(probe.transmitted(), 0);
}

#[test]
fn device_failure_ends_run_with_error() {
    let (radio, probe) = SimulatedRadio::new(usrp());
    let radio = radio
        .with_signal(SimSignal::Tone {
            offset: 0.0,
            amplitude: 1.0,
        })
        .failing_after(100_000);
    let dir = tempfile::tempdir().unwrap();
    let output = WavOutput::create(dir.path().join("out.wav"), 50_000, 16).unwrap();
    let rx = fm_receiver(&RxChain::default(), Box::new(radio), Box::new(output)).unwrap();

    rx.station.start().unwrap();
    let started = Instant::now();
    let result = rx.station.wait();
    assert!(started.elapsed() < Duration::from_secs(10));
    match result {
        Err(Error::Device(msg)) => assert!(msg.contains("disconnected"), "{msg}"),
        other => panic!("expected device failure, got {other:?}"),
    }
    assert_eq!(rx.station.state(), State::Stopped);
    assert!(rx.station.failure().is_some());
    assert!(!probe.is_open());
    // A second wait reports the same outcome without blocking.
    assert!(rx.station.wait().is_err());
}

#[test]
fn retune_applies_between_submissions() {
    let (radio, probe) = SimulatedRadio::new(usrp());
    let topology = baseband_tone(&ToneChain::default(), Box::new(radio)).unwrap();
    let handle = topology.station.endpoint("tx").unwrap().clone();
    topology.station.start().unwrap();
    assert!(wait_for(Duration::from_secs(5), || probe.transmitted() >= 20_000));

    handle.set_center_freq(916e6).unwrap();
    handle.set_gain(25.0).unwrap();
    assert!(handle.set_center_freq(2.4e9).unwrap_err().is_configuration());
    assert!(handle.set_antenna("RX2").is_err());
    let mark = probe.transmitted();
    assert!(wait_for(Duration::from_secs(5), || probe.transmitted() >= mark + 20_000));
    topology.station.stop().unwrap();

    let applied = probe.applied();
    assert!(applied.len() >= 2);
    for entry in &applied {
        assert_eq!(entry.at_sample % 4096, 0, "applied mid-submission at {}", entry.at_sample);
        assert!(entry.settings.center_freq < 1e9);
    }
    let last = &applied.last().unwrap().settings;
    assert_eq!(last.center_freq, 916e6);
    assert_eq!(last.gain, 25.0);
    assert_eq!(last.antenna, "TX/RX");
}

#[test]
fn receiver_demodulates_to_wav() {
    let (radio, _) = SimulatedRadio::new(usrp());
    let radio = radio.with_signal(SimSignal::FmTone {
        audio_freq: 1_000.0,
        deviation: 37.5e3,
        amplitude: 1.0,
    });
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rx.wav");
    let chain = RxChain {
        quad_rate: 200_000.0,
        audio_decimation: 4,
        spectrum: None,
        ..RxChain::default()
    };
    let output = WavOutput::create(&path, 50_000, 32).unwrap();
    let rx = fm_receiver(&chain, Box::new(radio), Box::new(output)).unwrap();

    rx.station.start().unwrap();
    thread::sleep(Duration::from_millis(600));
    rx.station.stop().unwrap();
    let stats = rx.station.stats();
    assert_eq!(stats.endpoints.len(), 1);
    assert!(stats.endpoints[0].streamed > 0);

    let (audio, spec) = read_wav(&path).unwrap();
    assert_eq!(spec.sample_rate, 50_000);
    assert!(audio.len() > 12_000, "only {} samples", audio.len());
    let tail = &audio[audio.len() - 8_000..];
    // Half deviation, attenuated 0.905x by 75 µs de-emphasis at 1 kHz.
    let (amp, residual) = fit_tone(tail, 1_000.0, 50_000.0);
    assert!((amp - 0.5 * 0.905).abs() < 0.03, "amplitude {amp}");
    assert!(residual < 0.05, "residual {residual}");
}

#[test]
fn transceive_loopback_shows_tone_in_spectrum() {
    let ((tx, _), (rx, rx_probe)) = SimulatedRadio::loopback(usrp(), 1 << 16);
    let mut topology = tone_transceiver(&TransceiveChain::default(), Box::new(tx), Box::new(rx)).unwrap();
    topology.station.start().unwrap();

    let spectrum = topology.spectrum.as_mut().unwrap();
    let mut peak = None;
    let found = wait_for(Duration::from_secs(5), || {
        if rx_probe.received() < 50_000 {
            return false;
        }
        if let Some((freq, db)) = spectrum.snapshot().and_then(|s| s.peak())
            && db > -20.0
        {
            peak = Some(freq);
            return true;
        }
        false
    });
    let scope_frame = topology.scope.as_ref().unwrap().snapshot();
    topology.station.stop().unwrap();

    assert!(found, "no tone seen in the received spectrum");
    let freq = peak.unwrap();
    assert!((freq - 915.1e6).abs() < 2.0 * 1e6 / 1024.0, "peak at {freq}");
    if let Some(frame) = scope_frame {
        assert_eq!(frame.len(), 1024);
    }
}

#[test]
fn stop_handle_releases_waiter() {
    let (radio, _) = SimulatedRadio::new(usrp());
    let topology = baseband_tone(
        &ToneChain {
            radio: RadioParams {
                gain: 10.0,
                ..RadioParams::default()
            },
            ..ToneChain::default()
        },
        Box::new(radio),
    )
    .unwrap();
    let station = Arc::new(topology.station);
    station.start().unwrap();

    let stopper = station.stop_handle();
    let waiter = {
        let station = Arc::clone(&station);
        thread::spawn(move || station.wait())
    };
    thread::sleep(Duration::from_millis(30));
    stopper.stop();
    stopper.stop();
    assert!(waiter.join().unwrap().is_ok());
    assert_eq!(station.state(), State::Stopped);
}

#[test]
fn unavailable_radio_leaves_station_configured() {
    let (radio, _) = SimulatedRadio::new(usrp());
    let topology = baseband_tone(&ToneChain::default(), Box::new(radio.unplugged())).unwrap();
    let err = topology.station.start().unwrap_err();
    assert!(matches!(err, Error::DeviceUnavailable(_)));
    assert_eq!(topology.station.state(), State::Configured);
    topology.station.stop().unwrap();
    assert_eq!(topology.station.state(), State::Stopped);
}
