//! Wideband FM modulator and demodulator.
//!
//! [`WfmTx`] turns real audio into complex baseband: pre-emphasis at the audio
//! rate, interpolation up to the quadrature rate, then a phase integrator
//!
//! ```text
//! phase += 2π * max_dev * x / quad_rate
//! y      = exp(j * phase)
//! ```
//!
//! [`WfmRcv`] inverts it: a phase-difference discriminator at the quadrature
//! rate, a decimating lowpass down to the audio rate, then de-emphasis.
//!
//! Scaling is symmetric: an audio sample of `1.0` deviates the carrier by
//! `max_dev` Hz, and a carrier deviated by `max_dev` Hz demodulates to `1.0`.

use std::f32::consts::{PI, TAU};

use num_complex::Complex32;

use crate::block::{Block, BlockError, COMPLEX, RateRatio, REAL, SampleKind, Samples, expect_ports};
use crate::firdes::{DeEmphasis, PreEmphasis};
use crate::graph::GraphError;

use super::RationalResampler;

/// Broadcast FM pre/de-emphasis time constant used in the Americas (75 µs).
pub const DEFAULT_TAU: f64 = 75e-6;
/// Broadcast FM peak deviation (75 kHz).
pub const BROADCAST_DEVIATION: f64 = 75e3;

fn check_positive(name: &str, value: f64) -> Result<(), GraphError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(GraphError::InvalidParameter(format!(
            "{name} must be positive and finite, got {value}"
        )))
    }
}

fn integer_factor(high: f64, low: f64, what: &str) -> Result<u32, GraphError> {
    let factor = high / low;
    if factor < 1.0 || (factor - factor.round()).abs() > 1e-9 {
        return Err(GraphError::InvalidParameter(format!(
            "{what}: {high} Hz is not an integer multiple of {low} Hz"
        )));
    }
    Ok(factor.round() as u32)
}

/// Wideband FM modulator: real audio at `audio_rate` → complex baseband at `quad_rate`.
///
/// # Parameters
///
/// - `audio_rate`: Input rate in Hz
/// - `quad_rate`: Output rate in Hz, an integer multiple of `audio_rate`
/// - `tau`: Pre-emphasis time constant in seconds (`0.0` disables it)
/// - `max_dev`: Deviation in Hz for a full-scale input
///
/// # Invariants
///
/// - Output magnitude is always 1.0
/// - `phase` is wrapped into `[-π, π)` after every sample
#[derive(Debug, Clone)]
pub struct WfmTx {
    audio_rate: f64,
    quad_rate: f64,
    max_dev: f64,
    tau: f64,
    preemph: Option<PreEmphasis>,
    interp: Option<RationalResampler<f32>>,
    sensitivity: f32,
    phase: f32,
    emphasized: Vec<f32>,
    upsampled: Vec<f32>,
}

impl WfmTx {
    /// Creates a modulator; fails if the rates are not an integer multiple apart.
    pub fn new(audio_rate: f64, quad_rate: f64, tau: f64, max_dev: f64) -> Result<Self, GraphError> {
        check_positive("audio_rate", audio_rate)?;
        check_positive("quad_rate", quad_rate)?;
        check_positive("max_dev", max_dev)?;
        if tau < 0.0 || !tau.is_finite() {
            return Err(GraphError::InvalidParameter(format!(
                "tau must be non-negative, got {tau}"
            )));
        }
        let factor = integer_factor(quad_rate, audio_rate, "wfm_tx")?;
        let interp = if factor > 1 {
            Some(RationalResampler::new(factor, 1)?)
        } else {
            None
        };
        Ok(Self {
            audio_rate,
            quad_rate,
            max_dev,
            tau,
            preemph: (tau > 0.0).then(|| PreEmphasis::new(tau, audio_rate)),
            interp,
            sensitivity: (std::f64::consts::TAU * max_dev / quad_rate) as f32,
            phase: 0.0,
            emphasized: Vec::new(),
            upsampled: Vec::new(),
        })
    }

    /// Peak deviation in Hz.
    pub fn max_deviation(&self) -> f64 {
        self.max_dev
    }

    /// Pre-emphasis time constant in seconds.
    pub fn tau(&self) -> f64 {
        self.tau
    }

    /// Output rate in Hz.
    pub fn quad_rate(&self) -> f64 {
        self.quad_rate
    }

    fn integrate(&mut self, baseband: &[f32], out: &mut [Complex32]) {
        for (&x, y) in baseband.iter().zip(out.iter_mut()) {
            self.phase += self.sensitivity * x;
            if self.phase >= PI || self.phase < -PI {
                self.phase -= TAU * ((self.phase + PI) / TAU).floor();
            }
            *y = Complex32::from_polar(1.0, self.phase);
        }
    }
}

impl Block for WfmTx {
    fn name(&self) -> &str {
        "wfm_tx"
    }

    fn input_ports(&self) -> &[SampleKind] {
        REAL
    }

    fn output_ports(&self) -> &[SampleKind] {
        COMPLEX
    }

    fn rate_ratio(&self) -> RateRatio {
        self.interp
            .as_ref()
            .map_or(RateRatio::IDENTITY, RationalResampler::ratio)
    }

    fn expected_input_rate(&self) -> Option<f64> {
        Some(self.audio_rate)
    }

    fn process(&mut self, inputs: &[Samples], outputs: &mut [Samples]) -> Result<(), BlockError> {
        expect_ports(inputs, outputs, 1, 1)?;
        let input = inputs[0].as_real()?;
        let out = outputs[0].slice_mut::<Complex32>()?;

        self.emphasized.clear();
        match self.preemph.as_mut() {
            Some(pre) => self
                .emphasized
                .extend(input.iter().map(|&x| pre.process(x))),
            None => self.emphasized.extend_from_slice(input),
        }

        let mut baseband = std::mem::take(&mut self.upsampled);
        let result = match self.interp.as_mut() {
            Some(interp) => {
                baseband.clear();
                baseband.resize(out.len(), 0.0);
                let produced = interp.process_slice(&self.emphasized, &mut baseband);
                if produced == out.len() {
                    self.integrate(&baseband, out);
                    Ok(())
                } else {
                    Err(BlockError::RateViolation {
                        expected: out.len(),
                        produced,
                    })
                }
            }
            None => {
                let emphasized = std::mem::take(&mut self.emphasized);
                let result = if emphasized.len() == out.len() {
                    self.integrate(&emphasized, out);
                    Ok(())
                } else {
                    Err(BlockError::RateViolation {
                        expected: out.len(),
                        produced: emphasized.len(),
                    })
                };
                self.emphasized = emphasized;
                result
            }
        };
        self.upsampled = baseband;
        result
    }
}

/// Wideband FM demodulator: complex baseband at `quad_rate` → real audio at
/// `quad_rate / audio_decimation`.
///
/// # Parameters
///
/// - `quad_rate`: Input rate in Hz
/// - `audio_decimation`: Integer decimation to the audio rate
/// - `max_dev`: Deviation in Hz that maps to a full-scale output
/// - `tau`: De-emphasis time constant in seconds (`0.0` disables it)
#[derive(Debug, Clone)]
pub struct WfmRcv {
    quad_rate: f64,
    audio_decimation: u32,
    gain: f32,
    prev: Complex32,
    decim: RationalResampler<f32>,
    deemph: Option<DeEmphasis>,
    discriminated: Vec<f32>,
}

impl WfmRcv {
    /// Creates a demodulator with broadcast deviation (75 kHz) and 75 µs de-emphasis.
    pub fn new(quad_rate: f64, audio_decimation: u32) -> Result<Self, GraphError> {
        Self::with_params(quad_rate, audio_decimation, BROADCAST_DEVIATION, DEFAULT_TAU)
    }

    /// Creates a demodulator with explicit deviation and de-emphasis.
    pub fn with_params(
        quad_rate: f64,
        audio_decimation: u32,
        max_dev: f64,
        tau: f64,
    ) -> Result<Self, GraphError> {
        check_positive("quad_rate", quad_rate)?;
        check_positive("max_dev", max_dev)?;
        if audio_decimation == 0 {
            return Err(GraphError::InvalidParameter(
                "audio_decimation must be at least 1".into(),
            ));
        }
        if tau < 0.0 || !tau.is_finite() {
            return Err(GraphError::InvalidParameter(format!(
                "tau must be non-negative, got {tau}"
            )));
        }
        let audio_rate = quad_rate / f64::from(audio_decimation);
        Ok(Self {
            quad_rate,
            audio_decimation,
            gain: (quad_rate / (std::f64::consts::TAU * max_dev)) as f32,
            prev: Complex32::new(1.0, 0.0),
            decim: RationalResampler::new(1, audio_decimation)?,
            deemph: (tau > 0.0).then(|| DeEmphasis::new(tau, audio_rate)),
            discriminated: Vec::new(),
        })
    }

    /// Output audio rate in Hz.
    pub fn audio_rate(&self) -> f64 {
        self.quad_rate / f64::from(self.audio_decimation)
    }

    /// Decimation factor from quadrature to audio rate.
    pub fn audio_decimation(&self) -> u32 {
        self.audio_decimation
    }
}

impl Block for WfmRcv {
    fn name(&self) -> &str {
        "wfm_rcv"
    }

    fn input_ports(&self) -> &[SampleKind] {
        COMPLEX
    }

    fn output_ports(&self) -> &[SampleKind] {
        REAL
    }

    fn rate_ratio(&self) -> RateRatio {
        self.decim.ratio()
    }

    fn expected_input_rate(&self) -> Option<f64> {
        Some(self.quad_rate)
    }

    fn process(&mut self, inputs: &[Samples], outputs: &mut [Samples]) -> Result<(), BlockError> {
        expect_ports(inputs, outputs, 1, 1)?;
        let input = inputs[0].as_complex()?;
        let out = outputs[0].slice_mut::<f32>()?;

        self.discriminated.clear();
        for &x in input {
            let delta = (x * self.prev.conj()).arg();
            self.discriminated.push(delta * self.gain);
            self.prev = x;
        }

        let produced = self.decim.process_slice(&self.discriminated, out);
        if produced != out.len() {
            return Err(BlockError::RateViolation {
                expected: out.len(),
                produced,
            });
        }
        if let Some(de) = self.deemph.as_mut() {
            for y in out.iter_mut() {
                *y = de.process(*y);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_tx(tx: &mut WfmTx, audio: &[f32]) -> Vec<Complex32> {
        let n_out = tx.rate_ratio().output_len(audio.len());
        let inputs = [Samples::Real(audio.to_vec())];
        let mut outputs = [Samples::Complex(vec![Complex32::default(); n_out])];
        tx.process(&inputs, &mut outputs).unwrap();
        outputs[0].as_complex().unwrap().to_vec()
    }

    #[test]
    fn constant_input_gives_constant_frequency() {
        let mut tx = WfmTx::new(480_000.0, 480_000.0, 0.0, 5e3).unwrap();
        let out = run_tx(&mut tx, &[0.5; 1_000]);
        for w in out.windows(2).skip(1) {
            let f = (w[1] * w[0].conj()).arg() * 480_000.0 / std::f32::consts::TAU;
            assert!((f - 2_500.0).abs() < 1.0, "{f}");
        }
    }

    #[test]
    fn output_has_unit_magnitude() {
        let mut tx = WfmTx::new(48_000.0, 480_000.0, 75e-6, 75e3).unwrap();
        let audio: Vec<f32> = (0..480).map(|n| (n as f32 * 0.13).sin()).collect();
        let out = run_tx(&mut tx, &audio);
        assert_eq!(out.len(), 4_800);
        for c in out {
            assert!((c.norm() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn rejects_non_integer_rate_relation() {
        assert!(WfmTx::new(44_100.0, 480_000.0, 75e-6, 75e3).is_err());
        assert!(WfmTx::new(48_000.0, 480_000.0, 75e-6, 0.0).is_err());
    }

    #[test]
    fn discriminator_recovers_constant_deviation() {
        let quad = 500_000.0;
        let mut rx = WfmRcv::with_params(quad, 10, 75e3, 0.0).unwrap();
        let step = std::f64::consts::TAU * 30e3 / quad;
        let input: Vec<Complex32> = (0..5_000)
            .map(|n| Complex32::from_polar(1.0, (step * n as f64) as f32))
            .collect();
        let inputs = [Samples::Complex(input)];
        let mut outputs = [Samples::Real(vec![0.0; 500])];
        rx.process(&inputs, &mut outputs).unwrap();
        let audio = outputs[0].as_real().unwrap();
        for &y in &audio[100..] {
            assert!((y - 0.4).abs() < 1e-3, "{y}");
        }
    }

    #[test]
    fn receiver_rate_relation() {
        let rx = WfmRcv::new(500_000.0, 10).unwrap();
        assert_eq!(rx.audio_rate(), 50_000.0);
        assert_eq!(rx.declare_rate(500_000.0), 50_000.0);
        assert!(WfmRcv::new(500_000.0, 0).is_err());
    }
}
