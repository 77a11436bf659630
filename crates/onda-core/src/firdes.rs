//! FIR filter design and single-pole emphasis filters.
//!
//! [`design_lowpass`] produces the windowed-sinc prototype used by the rational
//! resampler. [`PreEmphasis`] and [`DeEmphasis`] are the FM broadcast `tau`
//! networks; with the same `tau` and sample rate one is the exact inverse of the
//! other.

use std::f64::consts::PI;

/// Designs a linear-phase lowpass FIR using a Blackman-windowed sinc.
///
/// # Arguments
///
/// * `num_taps` - Filter length (odd lengths give an integer group delay)
/// * `cutoff` - Normalized cutoff, where 1.0 is the Nyquist frequency
///
/// The taps are normalized to unity DC gain. The Blackman window puts the first
/// sidelobe around -74 dB with a transition band of roughly `5.5 / num_taps`
/// (in units of the sample rate).
pub fn design_lowpass(num_taps: usize, cutoff: f64) -> Vec<f32> {
    if num_taps == 0 {
        return Vec::new();
    }

    let m = (num_taps - 1) as f64;
    let mut coeffs: Vec<f64> = (0..num_taps)
        .map(|n| {
            let x = n as f64 - m / 2.0;
            let sinc = if x.abs() < 1e-9 {
                cutoff
            } else {
                (PI * cutoff * x).sin() / (PI * x)
            };
            let window = if num_taps == 1 {
                1.0
            } else {
                let phase = 2.0 * PI * n as f64 / m;
                0.42 - 0.5 * phase.cos() + 0.08 * (2.0 * phase).cos()
            };
            sinc * window
        })
        .collect();

    let sum: f64 = coeffs.iter().sum();
    if sum.abs() > 1e-12 {
        for c in &mut coeffs {
            *c /= sum;
        }
    }

    coeffs.into_iter().map(|c| c as f32).collect()
}

fn emphasis_pole(tau: f64, sample_rate: f64) -> f32 {
    (-1.0 / (tau * sample_rate)).exp() as f32
}

/// FM pre-emphasis: first-order high-frequency boost with time constant `tau`.
///
/// ```text
/// y[n] = (x[n] - a * x[n-1]) / (1 - a),   a = exp(-1 / (tau * fs))
/// ```
///
/// Unity gain at DC, roughly `sqrt(1 + (2π f tau)^2)` at audio frequencies.
#[derive(Debug, Clone)]
pub struct PreEmphasis {
    pole: f32,
    norm: f32,
    prev: f32,
}

impl PreEmphasis {
    /// Creates a pre-emphasis filter for `tau` seconds at `sample_rate` Hz.
    pub fn new(tau: f64, sample_rate: f64) -> Self {
        let pole = emphasis_pole(tau, sample_rate);
        Self {
            pole,
            norm: 1.0 / (1.0 - pole),
            prev: 0.0,
        }
    }

    /// Filters one sample.
    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        let y = (x - self.pole * self.prev) * self.norm;
        self.prev = x;
        y
    }

    /// Clears the filter history.
    pub fn reset(&mut self) {
        self.prev = 0.0;
    }
}

/// FM de-emphasis: one-pole lowpass with time constant `tau`.
///
/// ```text
/// y[n] = (1 - a) * x[n] + a * y[n-1],   a = exp(-1 / (tau * fs))
/// ```
#[derive(Debug, Clone)]
pub struct DeEmphasis {
    pole: f32,
    state: f32,
}

impl DeEmphasis {
    /// Creates a de-emphasis filter for `tau` seconds at `sample_rate` Hz.
    pub fn new(tau: f64, sample_rate: f64) -> Self {
        Self {
            pole: emphasis_pole(tau, sample_rate),
            state: 0.0,
        }
    }

    /// Filters one sample.
    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        self.state = x + self.pole * (self.state - x);
        if self.state.abs() < 1e-20 {
            self.state = 0.0;
        }
        self.state
    }

    /// Clears the filter state.
    pub fn reset(&mut self) {
        self.state = 0.0;
    }
}
