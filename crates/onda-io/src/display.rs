//! Read-only display probes over graph taps.
//!
//! A probe never influences the graph: the scheduler offers samples to the
//! tap without waiting, and the probe takes the newest window whenever it is
//! polled. A slow or absent display only ever loses frames.

use std::f32::consts::PI;
use std::sync::Arc;

use onda_core::{Complex32, SampleKind, Tap};
use rustfft::{Fft, FftPlanner};

/// Points per spectrum frame.
pub const DEFAULT_FFT_SIZE: usize = 1024;
/// Magnitude floor in dB.
const FLOOR_DB: f32 = -200.0;

/// FFT window function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Window {
    /// No windowing.
    Rectangular,
    /// Hamming window.
    #[default]
    Hamming,
    /// 4-term Blackman-Harris window (-92 dB sidelobes).
    BlackmanHarris,
}

impl Window {
    /// Window coefficients for a frame of `size` points.
    pub fn coefficients(&self, size: usize) -> Vec<f32> {
        let n = size as f32;
        (0..size)
            .map(|i| {
                let x = 2.0 * PI * i as f32 / n;
                match self {
                    Self::Rectangular => 1.0,
                    Self::Hamming => 0.54 - 0.46 * x.cos(),
                    Self::BlackmanHarris => {
                        0.35875 - 0.48829 * x.cos() + 0.14128 * (2.0 * x).cos()
                            - 0.01168 * (3.0 * x).cos()
                    }
                }
            })
            .collect()
    }
}

/// One spectrum frame, DC centered.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumSnapshot {
    /// Magnitude per bin in dB relative to a full-scale tone, lowest frequency first.
    pub bins_db: Vec<f32>,
    /// Sample rate of the tapped stream.
    pub sample_rate: f64,
    /// RF frequency of the center bin.
    pub center_freq: f64,
}

impl SpectrumSnapshot {
    /// Absolute frequency of `bin`.
    pub fn frequency(&self, bin: usize) -> f64 {
        let n = self.bins_db.len() as f64;
        self.center_freq + (bin as f64 - n / 2.0) * self.sample_rate / n
    }

    /// Strongest bin as `(frequency, dB)`.
    pub fn peak(&self) -> Option<(f64, f32)> {
        self.bins_db
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(bin, &db)| (self.frequency(bin), db))
    }
}

/// Windowed FFT over the newest samples of a tap.
pub struct SpectrumProbe {
    tap: Tap,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    /// Sum of window coefficients, so a full-scale tone reads 0 dB.
    coherent_gain: f32,
    frame: Vec<Complex32>,
    real_frame: Vec<f32>,
    sample_rate: f64,
    center_freq: f64,
}

impl std::fmt::Debug for SpectrumProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrumProbe")
            .field("size", &self.frame.len())
            .field("sample_rate", &self.sample_rate)
            .finish_non_exhaustive()
    }
}

impl SpectrumProbe {
    /// Creates a probe producing `size`-point frames.
    pub fn new(tap: Tap, size: usize, window: Window, sample_rate: f64, center_freq: f64) -> Self {
        let size = size.max(2);
        let window = window.coefficients(size);
        let coherent_gain = window.iter().sum::<f32>().max(f32::EPSILON);
        Self {
            tap,
            fft: FftPlanner::new().plan_fft_forward(size),
            window,
            coherent_gain,
            frame: vec![Complex32::default(); size],
            real_frame: vec![0.0; size],
            sample_rate,
            center_freq,
        }
    }

    /// Moves the reported center frequency, e.g. after a retune.
    pub fn set_center_freq(&mut self, freq: f64) {
        self.center_freq = freq;
    }

    /// Computes a frame from the newest samples, or `None` if fewer than a
    /// full frame arrived since the last call.
    pub fn snapshot(&mut self) -> Option<SpectrumSnapshot> {
        let size = self.frame.len();
        if self.tap.available() < size {
            return None;
        }
        match self.tap.kind() {
            SampleKind::Complex => {
                self.tap.latest_complex(&mut self.frame);
            }
            SampleKind::Real => {
                self.tap.latest_real(&mut self.real_frame);
                for (c, &x) in self.frame.iter_mut().zip(&self.real_frame) {
                    *c = Complex32::new(x, 0.0);
                }
            }
        }
        for (c, &w) in self.frame.iter_mut().zip(&self.window) {
            *c *= w;
        }
        self.fft.process(&mut self.frame);

        let half = size / 2;
        let bins_db = self.frame[half..]
            .iter()
            .chain(&self.frame[..half])
            .map(|c| {
                let mag = c.norm() / self.coherent_gain;
                if mag > 0.0 {
                    (20.0 * mag.log10()).max(FLOOR_DB)
                } else {
                    FLOOR_DB
                }
            })
            .collect();
        Some(SpectrumSnapshot {
            bins_db,
            sample_rate: self.sample_rate,
            center_freq: self.center_freq,
        })
    }
}

/// Newest-samples view of a tap, for time-domain displays.
#[derive(Debug)]
pub struct TimeProbe {
    tap: Tap,
    size: usize,
}

impl TimeProbe {
    /// Creates a probe returning `size` samples per frame.
    pub fn new(tap: Tap, size: usize) -> Self {
        Self { tap, size }
    }

    /// The newest `size` samples as complex values, or `None` if fewer arrived.
    pub fn snapshot(&self) -> Option<Vec<Complex32>> {
        if self.tap.available() < self.size {
            return None;
        }
        match self.tap.kind() {
            SampleKind::Complex => {
                let mut frame = vec![Complex32::default(); self.size];
                self.tap.latest_complex(&mut frame);
                Some(frame)
            }
            SampleKind::Real => {
                let mut frame = vec![0.0; self.size];
                self.tap.latest_real(&mut frame);
                Some(frame.into_iter().map(|x| Complex32::new(x, 0.0)).collect())
            }
        }
    }
}
