//! Sine test source.
//!
//! The fallback source for the transmit chain when no microphone is available,
//! and the complex carrier generator for loopback tests. A pure phase
//! accumulator: every sample advances the phase by `2π f / fs`, wrapping into
//! `[0, 2π)` so precision does not drift over long runs.

use std::f64::consts::TAU;

use num_complex::Complex32;

use crate::block::{Block, BlockError, COMPLEX, NONE, REAL, SampleKind, Samples, expect_ports};

/// Phase-accumulator sine generator producing real or complex samples.
///
/// # Parameters
///
/// - `sample_rate`: Output rate in Hz
/// - `frequency`: Tone frequency in Hz (negative allowed for complex tones)
/// - `amplitude`: Peak amplitude
///
/// # Invariants
///
/// - `phase` is always in `[0, 2π)`
#[derive(Debug, Clone)]
pub struct ToneSource {
    kind: SampleKind,
    sample_rate: f64,
    frequency: f64,
    amplitude: f32,
    phase: f64,
    phase_inc: f64,
}

impl ToneSource {
    fn new(kind: SampleKind, sample_rate: f64, frequency: f64, amplitude: f32) -> Self {
        Self {
            kind,
            sample_rate,
            frequency,
            amplitude,
            phase: 0.0,
            phase_inc: TAU * frequency / sample_rate,
        }
    }

    /// Real sine `amplitude * sin(phase)`.
    pub fn real(sample_rate: f64, frequency: f64, amplitude: f32) -> Self {
        Self::new(SampleKind::Real, sample_rate, frequency, amplitude)
    }

    /// Complex exponential `amplitude * exp(j * phase)`.
    pub fn complex(sample_rate: f64, frequency: f64, amplitude: f32) -> Self {
        Self::new(SampleKind::Complex, sample_rate, frequency, amplitude)
    }

    /// Tone frequency in Hz.
    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    /// Peak amplitude.
    pub fn amplitude(&self) -> f32 {
        self.amplitude
    }

    /// Current phase in radians, in `[0, 2π)`.
    pub fn phase(&self) -> f64 {
        self.phase
    }

    #[inline]
    fn advance(&mut self) -> f64 {
        let current = self.phase;
        self.phase = (self.phase + self.phase_inc).rem_euclid(TAU);
        current
    }
}

impl Block for ToneSource {
    fn name(&self) -> &str {
        "tone_source"
    }

    fn input_ports(&self) -> &[SampleKind] {
        NONE
    }

    fn output_ports(&self) -> &[SampleKind] {
        match self.kind {
            SampleKind::Real => REAL,
            SampleKind::Complex => COMPLEX,
        }
    }

    fn source_rate(&self) -> Option<f64> {
        Some(self.sample_rate)
    }

    fn process(&mut self, inputs: &[Samples], outputs: &mut [Samples]) -> Result<(), BlockError> {
        expect_ports(inputs, outputs, 0, 1)?;
        let amp = self.amplitude;
        match &mut outputs[0] {
            Samples::Real(out) if self.kind == SampleKind::Real => {
                for y in out.iter_mut() {
                    *y = amp * self.advance().sin() as f32;
                }
            }
            Samples::Complex(out) if self.kind == SampleKind::Complex => {
                for y in out.iter_mut() {
                    let phase = self.advance();
                    *y = Complex32::from_polar(amp, phase as f32);
                }
            }
            other => {
                return Err(BlockError::KindMismatch {
                    expected: self.kind,
                    found: other.kind(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn real_tone_matches_sine() {
        let mut tone = ToneSource::real(48_000.0, 1_000.0, 0.5);
        let mut out = [Samples::Real(vec![0.0; 96])];
        tone.process(&[], &mut out).unwrap();
        let samples = out[0].as_real().unwrap();
        for (n, &y) in samples.iter().enumerate() {
            let expected = 0.5 * (TAU * 1_000.0 * n as f64 / 48_000.0).sin() as f32;
            assert!((y - expected).abs() < 1e-5, "n={n}");
        }
    }

    #[test]
    fn phase_stays_wrapped() {
        let mut tone = ToneSource::real(48_000.0, 7_000.0, 1.0);
        let mut out = [Samples::Real(vec![0.0; 10_000])];
        tone.process(&[], &mut out).unwrap();
        assert!(tone.phase() >= 0.0 && tone.phase() < TAU);
    }

    #[test]
    fn complex_tone_has_constant_magnitude() {
        let mut tone = ToneSource::complex(1e6, 100e3, 0.5);
        let mut out = [Samples::Complex(vec![Complex32::default(); 256])];
        tone.process(&[], &mut out).unwrap();
        for c in out[0].as_complex().unwrap() {
            assert!((c.norm() - 0.5).abs() < 1e-5);
        }
    }

    #[test]
    fn wrong_output_kind_is_rejected() {
        let mut tone = ToneSource::real(48_000.0, 1_000.0, 0.5);
        let mut out = [Samples::Complex(vec![Complex32::default(); 4])];
        assert!(tone.process(&[], &mut out).is_err());
    }

    #[test]
    fn continues_across_chunks() {
        let mut split = ToneSource::real(48_000.0, 440.0, 1.0);
        let mut whole = ToneSource::real(48_000.0, 440.0, 1.0);
        let mut a = [Samples::Real(vec![0.0; 50])];
        let mut b = [Samples::Real(vec![0.0; 50])];
        let mut c = [Samples::Real(vec![0.0; 100])];
        split.process(&[], &mut a).unwrap();
        split.process(&[], &mut b).unwrap();
        whole.process(&[], &mut c).unwrap();
        let joined: Vec<f32> = a[0]
            .as_real()
            .unwrap()
            .iter()
            .chain(b[0].as_real().unwrap())
            .copied()
            .collect();
        assert_eq!(joined.as_slice(), c[0].as_real().unwrap());
    }
}
